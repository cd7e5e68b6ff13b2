#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use zip::write::SimpleFileOptions;
use zip::{AesMode, CompressionMethod, ZipWriter};

pub const PASSWORD: &str = "correct horse";

/// Entry content used across tests; the second file is large enough to
/// span several copy buffers.
pub fn sample_files() -> Vec<(&'static str, Vec<u8>)> {
    let big: Vec<u8> = (0..200_000u32).map(|i| (i * 31 % 251) as u8).collect();
    vec![
        ("a.txt", b"hello".to_vec()),
        ("b/c.bin", big),
        ("b/d/e.txt", b"nested entry".to_vec()),
    ]
}

pub fn build_zip(files: &[(&str, Vec<u8>)], password: Option<&str>) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    writer
        .add_directory("b/", SimpleFileOptions::default())
        .unwrap();
    for (name, data) in files {
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        match password {
            Some(password) => {
                writer.start_file(*name, options.with_aes_encryption(AesMode::Aes256, password))
            }
            None => writer.start_file(*name, options),
        }
        .unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Five stored entries; the data of the third is damaged so only its
/// checksum fails.
pub fn build_damaged_zip() -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    for i in 1..=5 {
        writer.start_file(format!("file{i}.txt"), options).unwrap();
        writer
            .write_all(format!("payload number {i} for the checksum test").as_bytes())
            .unwrap();
    }
    let mut bytes = writer.finish().unwrap().into_inner();

    let needle = b"payload number 3";
    let at = find(&bytes, needle).unwrap();
    bytes[at] ^= 0x20;
    bytes
}

/// One stored entry whose name is not valid UTF-8 (`caf\xE9.txt`).
pub fn build_latin1_name_zip() -> Vec<u8> {
    let mut bytes = build_stored_zip(&[("cafX.txt", b"latin1")]);
    rename_all(&mut bytes, b"cafX.txt", b"caf\xE9.txt");
    bytes
}

/// `caf\xE9.txt` and `caf\xE8.txt`, two names that only differ in an
/// undecodable byte.
pub fn build_latin1_pair_zip() -> Vec<u8> {
    let mut bytes = build_stored_zip(&[("cafX.txt", b"first"), ("cafY.txt", b"second")]);
    rename_all(&mut bytes, b"cafX.txt", b"caf\xE9.txt");
    rename_all(&mut bytes, b"cafY.txt", b"caf\xE8.txt");
    bytes
}

/// Two records both named `dup1.txt`, holding `FIRST` then `SECOND`.
pub fn build_duplicate_zip() -> Vec<u8> {
    let mut bytes = build_stored_zip(&[("dup1.txt", b"FIRST"), ("dup2.txt", b"SECOND")]);
    rename_all(&mut bytes, b"dup2.txt", b"dup1.txt");
    bytes
}

pub fn build_stored_zip(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    for (name, data) in files {
        writer.start_file(*name, options).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Replace every occurrence of a name in local and central headers.
pub fn rename_all(bytes: &mut [u8], from: &[u8], to: &[u8]) {
    assert_eq!(from.len(), to.len());
    let mut offset = 0;
    while let Some(at) = find(&bytes[offset..], from) {
        let start = offset + at;
        bytes[start..start + to.len()].copy_from_slice(to);
        offset = start + to.len();
    }
}

pub fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

pub fn write_archive(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

pub fn sha256(data: &[u8]) -> Vec<u8> {
    Sha256::digest(data).to_vec()
}

/// Write an executable shell script standing in for 7z.
#[cfg(unix)]
pub fn fake_tool(dir: &Path, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("7z");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// `a.txt` stored in the clear, `b/c.txt` deflated behind AES-256.
pub fn build_mixed_zip(password: &str) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    writer
        .start_file(
            "a.txt",
            SimpleFileOptions::default().compression_method(CompressionMethod::Stored),
        )
        .unwrap();
    writer.write_all(b"0123456789").unwrap();
    writer
        .start_file(
            "b/c.txt",
            SimpleFileOptions::default()
                .compression_method(CompressionMethod::Deflated)
                .with_aes_encryption(AesMode::Aes256, password),
        )
        .unwrap();
    writer.write_all(b"secret contents, compressed and sealed").unwrap();
    writer.finish().unwrap().into_inner()
}
