use byteorder::{LittleEndian, ReadBytesExt};
use chrono::{NaiveDate, NaiveDateTime};
use std::fmt;
use std::io::Cursor;

use crate::error::{Error, Result};

/// ZIP compression methods, as stored in the central directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompressionMethod {
    Stored,
    Deflate,
    Deflate64,
    Bzip2,
    Lzma,
    Xz,
    /// WinZip AE-x encryption; the real method lives in the 0x9901 extra field.
    Aes,
    Unknown(u16),
}

impl CompressionMethod {
    /// Placeholder code for a method the external tool named but did not number.
    pub const UNRECOGNIZED: u16 = 0xFFFF;

    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflate,
            9 => CompressionMethod::Deflate64,
            12 => CompressionMethod::Bzip2,
            14 => CompressionMethod::Lzma,
            95 => CompressionMethod::Xz,
            99 => CompressionMethod::Aes,
            _ => CompressionMethod::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflate => 8,
            CompressionMethod::Deflate64 => 9,
            CompressionMethod::Bzip2 => 12,
            CompressionMethod::Lzma => 14,
            CompressionMethod::Xz => 95,
            CompressionMethod::Aes => 99,
            CompressionMethod::Unknown(v) => *v,
        }
    }

    /// Map a 7-Zip style method description (`AES-256 Deflate`, `Store`,
    /// `LZMA:16`, `ZipCrypto Deflate`) onto the same enum.
    pub fn from_tool_label(label: &str) -> Self {
        let label = label.trim();
        if label.contains("AES") {
            return CompressionMethod::Aes;
        }
        // The compression method is the last token; ZipCrypto prefixes it.
        let method = label.split_whitespace().last().unwrap_or_default();
        let method = method.split(':').next().unwrap_or_default();
        match method.to_ascii_lowercase().as_str() {
            "store" | "stored" | "copy" => CompressionMethod::Stored,
            "deflate" => CompressionMethod::Deflate,
            "deflate64" => CompressionMethod::Deflate64,
            "bzip2" => CompressionMethod::Bzip2,
            "lzma" => CompressionMethod::Lzma,
            "xz" => CompressionMethod::Xz,
            other => match other.parse::<u16>() {
                Ok(code) => CompressionMethod::from_u16(code),
                Err(_) => CompressionMethod::Unknown(Self::UNRECOGNIZED),
            },
        }
    }

    pub fn name(&self) -> String {
        match self {
            CompressionMethod::Stored => "Stored".to_string(),
            CompressionMethod::Deflate => "Deflate".to_string(),
            CompressionMethod::Deflate64 => "Deflate64".to_string(),
            CompressionMethod::Bzip2 => "BZIP2".to_string(),
            CompressionMethod::Lzma => "LZMA".to_string(),
            CompressionMethod::Xz => "XZ".to_string(),
            CompressionMethod::Aes => "AES".to_string(),
            CompressionMethod::Unknown(v) => format!("Method {v}"),
        }
    }
}

impl fmt::Display for CompressionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// End of Central Directory (EOCD) - 22 bytes minimum
pub struct EndOfCentralDirectory {
    pub disk_number: u16,
    pub disk_with_cd: u16,
    pub disk_entries: u16,
    pub total_entries: u16,
    pub cd_size: u32,
    pub cd_offset: u32,
    pub comment_len: u16,
}

impl EndOfCentralDirectory {
    pub const SIGNATURE: &'static [u8] = b"PK\x05\x06";
    pub const SIZE: usize = 22;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE || &data[0..4] != Self::SIGNATURE {
            return Err(Error::corrupt("invalid end of central directory"));
        }

        let mut cursor = Cursor::new(&data[4..]);

        Ok(Self {
            disk_number: cursor.read_u16::<LittleEndian>()?,
            disk_with_cd: cursor.read_u16::<LittleEndian>()?,
            disk_entries: cursor.read_u16::<LittleEndian>()?,
            total_entries: cursor.read_u16::<LittleEndian>()?,
            cd_size: cursor.read_u32::<LittleEndian>()?,
            cd_offset: cursor.read_u32::<LittleEndian>()?,
            comment_len: cursor.read_u16::<LittleEndian>()?,
        })
    }

    pub fn is_zip64(&self) -> bool {
        self.disk_entries == 0xFFFF
            || self.total_entries == 0xFFFF
            || self.cd_size == 0xFFFFFFFF
            || self.cd_offset == 0xFFFFFFFF
    }
}

/// ZIP64 End of Central Directory Locator - 20 bytes
pub struct Zip64EOCDLocator {
    pub disk_with_eocd64: u32,
    pub eocd64_offset: u64,
    pub total_disks: u32,
}

impl Zip64EOCDLocator {
    pub const SIGNATURE: &'static [u8] = b"PK\x06\x07";
    pub const SIZE: usize = 20;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE || &data[0..4] != Self::SIGNATURE {
            return Err(Error::corrupt("invalid ZIP64 locator"));
        }

        let mut cursor = Cursor::new(&data[4..]);

        Ok(Self {
            disk_with_eocd64: cursor.read_u32::<LittleEndian>()?,
            eocd64_offset: cursor.read_u64::<LittleEndian>()?,
            total_disks: cursor.read_u32::<LittleEndian>()?,
        })
    }
}

/// ZIP64 End of Central Directory - 56 bytes minimum
pub struct Zip64EOCD {
    pub eocd64_size: u64,
    pub version_made_by: u16,
    pub version_needed: u16,
    pub disk_number: u32,
    pub disk_with_cd: u32,
    pub disk_entries: u64,
    pub total_entries: u64,
    pub cd_size: u64,
    pub cd_offset: u64,
}

impl Zip64EOCD {
    pub const SIGNATURE: &'static [u8] = b"PK\x06\x06";
    pub const MIN_SIZE: usize = 56;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::MIN_SIZE || &data[0..4] != Self::SIGNATURE {
            return Err(Error::corrupt("invalid ZIP64 end of central directory"));
        }

        let mut cursor = Cursor::new(&data[4..]);

        Ok(Self {
            eocd64_size: cursor.read_u64::<LittleEndian>()?,
            version_made_by: cursor.read_u16::<LittleEndian>()?,
            version_needed: cursor.read_u16::<LittleEndian>()?,
            disk_number: cursor.read_u32::<LittleEndian>()?,
            disk_with_cd: cursor.read_u32::<LittleEndian>()?,
            disk_entries: cursor.read_u64::<LittleEndian>()?,
            total_entries: cursor.read_u64::<LittleEndian>()?,
            cd_size: cursor.read_u64::<LittleEndian>()?,
            cd_offset: cursor.read_u64::<LittleEndian>()?,
        })
    }
}

/// Central Directory File Header (CDFH) - 46 bytes minimum
pub const CDFH_SIGNATURE: &[u8] = b"PK\x01\x02";
pub const CDFH_MIN_SIZE: usize = 46;

/// Extra field carrying ZIP64 sizes and offsets.
pub const ZIP64_EXTRA_ID: u16 = 0x0001;
/// Extra field carrying WinZip AES parameters.
pub const AES_EXTRA_ID: u16 = 0x9901;

/// General purpose flag: entry is encrypted.
pub const FLAG_ENCRYPTED: u16 = 0x0001;

/// One central directory record, with the stored name kept as raw bytes.
#[derive(Debug, Clone)]
pub struct CentralRecord {
    pub name_bytes: Vec<u8>,
    pub flags: u16,
    pub compression_method: CompressionMethod,
    /// Method from the AES extra field, when present.
    pub aes_inner_method: Option<CompressionMethod>,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub crc32: u32,
    pub lfh_offset: u64,
    pub last_mod_time: u16,
    pub last_mod_date: u16,
}

impl CentralRecord {
    pub fn is_directory(&self) -> bool {
        self.name_bytes.last() == Some(&b'/')
    }

    pub fn is_encrypted(&self) -> bool {
        self.flags & FLAG_ENCRYPTED != 0 || self.compression_method == CompressionMethod::Aes
    }

    /// Parse modification date to (year, month, day)
    pub fn mod_date(&self) -> (u16, u8, u8) {
        let day = (self.last_mod_date & 0x1F) as u8;
        let month = ((self.last_mod_date >> 5) & 0x0F) as u8;
        let year = ((self.last_mod_date >> 9) & 0x7F) + 1980;
        (year, month, day)
    }

    /// Parse modification time to (hour, minute, second)
    pub fn mod_time(&self) -> (u8, u8, u8) {
        let second = ((self.last_mod_time & 0x1F) * 2) as u8;
        let minute = ((self.last_mod_time >> 5) & 0x3F) as u8;
        let hour = ((self.last_mod_time >> 11) & 0x1F) as u8;
        (hour, minute, second)
    }

    /// DOS timestamp as a calendar value, `None` when the fields are out of range.
    pub fn modified(&self) -> Option<NaiveDateTime> {
        let (year, month, day) = self.mod_date();
        let (hour, minute, second) = self.mod_time();
        NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)?.and_hms_opt(
            hour as u32,
            minute as u32,
            second as u32,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(date: u16, time: u16) -> CentralRecord {
        CentralRecord {
            name_bytes: b"a.txt".to_vec(),
            flags: 0,
            compression_method: CompressionMethod::Stored,
            aes_inner_method: None,
            compressed_size: 0,
            uncompressed_size: 0,
            crc32: 0,
            lfh_offset: 0,
            last_mod_time: time,
            last_mod_date: date,
        }
    }

    #[test]
    fn method_codes_and_names() {
        for (code, name) in [
            (0, "Stored"),
            (8, "Deflate"),
            (9, "Deflate64"),
            (12, "BZIP2"),
            (14, "LZMA"),
            (95, "XZ"),
            (99, "AES"),
            (93, "Method 93"),
        ] {
            let method = CompressionMethod::from_u16(code);
            assert_eq!(method.as_u16(), code);
            assert_eq!(method.name(), name);
        }
    }

    #[test]
    fn tool_labels() {
        use CompressionMethod::*;
        assert_eq!(CompressionMethod::from_tool_label("AES-256 Deflate"), Aes);
        assert_eq!(CompressionMethod::from_tool_label("Store"), Stored);
        assert_eq!(CompressionMethod::from_tool_label("ZipCrypto Deflate"), Deflate);
        assert_eq!(CompressionMethod::from_tool_label("Deflate64"), Deflate64);
        assert_eq!(CompressionMethod::from_tool_label("BZip2"), Bzip2);
        assert_eq!(CompressionMethod::from_tool_label("LZMA:16"), Lzma);
        assert_eq!(CompressionMethod::from_tool_label("XZ"), Xz);
        assert_eq!(CompressionMethod::from_tool_label("93"), Unknown(93));
        assert_eq!(
            CompressionMethod::from_tool_label("PPMd:o8:mem24"),
            Unknown(CompressionMethod::UNRECOGNIZED)
        );
    }

    #[test]
    fn dos_timestamp() {
        // 2024-03-15 10:30:20
        let date = ((2024 - 1980) << 9) | (3 << 5) | 15;
        let time = (10 << 11) | (30 << 5) | 10;
        let modified = record(date, time).modified().unwrap();
        assert_eq!(modified.to_string(), "2024-03-15 10:30:20");
    }

    #[test]
    fn zeroed_timestamp_is_unknown() {
        assert!(record(0, 0).modified().is_none());
    }

    #[test]
    fn directory_and_encryption_flags() {
        let mut rec = record(0, 0);
        assert!(!rec.is_directory());
        assert!(!rec.is_encrypted());
        rec.name_bytes = b"dir/".to_vec();
        rec.flags = FLAG_ENCRYPTED;
        assert!(rec.is_directory());
        assert!(rec.is_encrypted());
    }
}
