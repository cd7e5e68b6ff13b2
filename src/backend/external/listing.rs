use chrono::NaiveDateTime;

use super::diagnostics::normalize;
use crate::entry::{ArchiveEntry, EntryName, dedup_entries};
use crate::zip::CompressionMethod;

/// Marks the end of the archive-level header block in `-slt` output.
const SEPARATOR: &str = "----------";

const TIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"];

#[derive(Debug, Default)]
struct Block {
    path: Option<String>,
    size: u64,
    packed: u64,
    method: Option<CompressionMethod>,
    aes_method: Option<CompressionMethod>,
    modified: Option<NaiveDateTime>,
    folder: bool,
    encrypted: bool,
    crc: Option<u32>,
}

impl Block {
    fn finish(self, out: &mut Vec<ArchiveEntry>) {
        let Some(path) = self.path else {
            return;
        };
        if self.folder || path.is_empty() {
            return;
        }
        out.push(ArchiveEntry {
            name: EntryName::Decoded(path.clone()),
            path,
            uncompressed_size: self.size,
            compressed_size: self.packed,
            method: self
                .method
                .unwrap_or(CompressionMethod::Unknown(CompressionMethod::UNRECOGNIZED)),
            aes_method: self.aes_method,
            modified: self.modified,
            encrypted: self.encrypted,
            crc32: self.crc,
        });
    }
}

/// Parse `7z l -slt` output into entries.
///
/// Directories and repeated paths are dropped; unparsable numbers become 0
/// and unparsable timestamps become unknown.
pub fn parse_listing(output: &str) -> Vec<ArchiveEntry> {
    let mut in_entries = !output.lines().any(|l| l.trim() == SEPARATOR);
    let mut entries = Vec::new();
    let mut block = Block::default();

    for line in output.lines() {
        let line = line.trim_end_matches('\r');
        if !in_entries {
            in_entries = line.trim() == SEPARATOR;
            continue;
        }

        let Some((key, value)) = line.split_once(" = ") else {
            continue;
        };
        match key.trim() {
            "Path" => {
                std::mem::take(&mut block).finish(&mut entries);
                block.path = Some(normalize(value));
            }
            "Size" => block.size = value.trim().parse().unwrap_or(0),
            "Packed Size" => block.packed = value.trim().parse().unwrap_or(0),
            "Method" => {
                let method = CompressionMethod::from_tool_label(value);
                if method == CompressionMethod::Aes {
                    block.aes_method = inner_method(value);
                }
                block.method = Some(method);
            }
            "Modified" => block.modified = parse_time(value.trim()),
            "Folder" => block.folder = value.trim() == "+",
            "Encrypted" => block.encrypted = value.trim() == "+",
            "CRC" => block.crc = u32::from_str_radix(value.trim(), 16).ok(),
            _ => {}
        }
    }
    block.finish(&mut entries);

    dedup_entries(entries)
}

/// `AES-256 Deflate` names the compression after the cipher.
fn inner_method(label: &str) -> Option<CompressionMethod> {
    let last = label.split_whitespace().last()?;
    match CompressionMethod::from_tool_label(last) {
        CompressionMethod::Aes | CompressionMethod::Unknown(_) => None,
        method => Some(method),
    }
}

fn parse_time(value: &str) -> Option<NaiveDateTime> {
    TIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "\
7-Zip 23.01 (x64) : Copyright (c) 1999-2023 Igor Pavlov : 2023-06-20

Scanning the drive for archives:
1 file, 812 bytes (1 KiB)

Listing archive: sample.zip

--
Path = sample.zip
Type = zip
Physical Size = 812

----------
Path = a.txt
Folder = -
Size = 5
Packed Size = 33
Modified = 2024-03-01 10:20:30
Created = 
Attributes = A
Encrypted = +
Comment = 
CRC = 3610A686
Method = AES-256 Deflate
Characteristics = NTFS : Encrypt
Host OS = FAT
Version = 51

Path = b
Folder = +
Size = 0
Packed Size = 0
Modified = 2024-03-01 10:20:30

Path = b/c.txt
Folder = -
Size = 12
Packed Size = 12
Modified = 2024-03-01 10:21
Encrypted = -
CRC = 
Method = Store

Path = a.txt
Folder = -
Size = 99
Packed Size = 99
Method = Store
";

    #[test]
    fn entries_after_separator() {
        let entries = parse_listing(LISTING);
        let paths: Vec<_> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["a.txt", "b/c.txt"]);
    }

    #[test]
    fn fields_are_mapped() {
        let entries = parse_listing(LISTING);
        let a = &entries[0];
        assert_eq!(a.uncompressed_size, 5);
        assert_eq!(a.compressed_size, 33);
        assert_eq!(a.method, CompressionMethod::Aes);
        assert_eq!(a.aes_method, Some(CompressionMethod::Deflate));
        assert_eq!(a.method_label(), "AES (Deflate)");
        assert!(a.encrypted);
        assert_eq!(a.crc32, Some(0x3610_A686));
        assert_eq!(a.modified_label(), "2024-03-01 10:20");

        let c = &entries[1];
        assert_eq!(c.method, CompressionMethod::Stored);
        assert_eq!(c.aes_method, None);
        assert!(!c.encrypted);
        assert_eq!(c.crc32, None);
        assert_eq!(c.modified_label(), "2024-03-01 10:21");
    }

    #[test]
    fn bad_numbers_and_times_degrade() {
        let text = "----------\nPath = x\nSize = lots\nModified = yesterday\n";
        let entries = parse_listing(text);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].uncompressed_size, 0);
        assert_eq!(entries[0].modified, None);
        assert_eq!(
            entries[0].method,
            CompressionMethod::Unknown(CompressionMethod::UNRECOGNIZED)
        );
    }

    #[test]
    fn empty_output_is_empty_listing() {
        assert!(parse_listing("").is_empty());
    }
}
