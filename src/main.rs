//! Command-line front end for aeszip.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use aeszip::locator::{self, ToolPath};
use aeszip::{AccessStrategy, ArchiveEntry, ArchiveRequest, Cli, Engine, EngineConfig, Outcome};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(&cli);

    let tool = match &cli.tool {
        Some(path) => Some(ToolPath::new(path)),
        None => locator::locate().cloned(),
    };
    let engine = Engine::new(
        EngineConfig::default()
            .with_tool(tool)
            .with_timeout(cli.timeout()),
    );
    let request = ArchiveRequest::new(&cli.file).with_password(cli.password.clone());
    let strategy = AccessStrategy::from(cli.strategy);

    let ok = if cli.test {
        test_archive(&engine, &request, strategy, &cli).await?
    } else if cli.list || cli.verbose {
        list_files(&engine, &request, strategy, &cli).await?
    } else {
        extract_files(&engine, &request, strategy, &cli).await?
    };

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn init_tracing(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_level()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn report_backend<T>(outcome: &Outcome<T>, cli: &Cli) {
    if cli.is_quiet() {
        return;
    }
    if let Some(kind) = outcome.fallback {
        eprintln!("archive tool failed ({kind}), used the {} backend", outcome.backend_used);
    }
}

async fn list_files(
    engine: &Engine,
    request: &ArchiveRequest,
    strategy: AccessStrategy,
    cli: &Cli,
) -> Result<bool> {
    let outcome = engine.list(request, strategy).await?;
    report_backend(&outcome, cli);
    let entries = &outcome.payload;

    if !cli.verbose {
        for entry in entries {
            println!("{}", entry.path);
        }
        return Ok(true);
    }

    println!(
        "{:>10}  {:>10}  {:>5}  {:<9}  {:<16}  Name",
        "Length", "Size", "Cmpr", "Method", "Modified"
    );
    println!("{}", "-".repeat(78));

    for entry in entries {
        println!(
            "{:>10}  {:>10}  {}  {:<9}  {:<16}  {}{}",
            entry.uncompressed_size,
            entry.compressed_size,
            ratio(entry.compressed_size, entry.uncompressed_size),
            entry.method_label(),
            entry.modified_label(),
            entry.path,
            if entry.encrypted { " *" } else { "" },
        );
    }
    let (total_uncompressed, total_compressed) = totals(entries);

    println!("{}", "-".repeat(78));
    println!(
        "{:>10}  {:>10}  {}  {} files, {} ({} backend)",
        total_uncompressed,
        total_compressed,
        ratio(total_compressed, total_uncompressed),
        entries.len(),
        format_size(total_uncompressed),
        outcome.backend_used,
    );

    Ok(true)
}

async fn test_archive(
    engine: &Engine,
    request: &ArchiveRequest,
    strategy: AccessStrategy,
    cli: &Cli,
) -> Result<bool> {
    let outcome = engine.test(request, strategy).await?;
    report_backend(&outcome, cli);

    for result in &outcome.payload {
        if result.success {
            if !cli.is_quiet() {
                println!("    testing: {:<40} OK", result.path);
            }
        } else {
            println!(
                "    testing: {:<40} FAILED ({})",
                result.path,
                result.message.as_deref().unwrap_or("unknown error")
            );
        }
    }

    let failures = outcome.failed().count();
    if !cli.is_very_quiet() {
        if failures == 0 {
            println!("No errors detected in compressed data of {}.", request.archive.display());
        } else {
            println!("{failures} error(s) detected in {}.", request.archive.display());
        }
    }
    Ok(outcome.succeeded())
}

async fn extract_files(
    engine: &Engine,
    request: &ArchiveRequest,
    strategy: AccessStrategy,
    cli: &Cli,
) -> Result<bool> {
    let destination = cli.extract_dir.clone().unwrap_or_else(|| PathBuf::from("."));

    let selection = if cli.files.is_empty() && cli.exclude.is_empty() {
        None
    } else {
        let listed = engine
            .list(request, strategy)
            .await
            .context("listing archive to resolve file selection")?;
        Some(select_entries(&listed.payload, &cli.files, &cli.exclude))
    };

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });

    let outcome = engine
        .extract(request, strategy, &destination, selection.as_deref(), &cancel)
        .await?;
    report_backend(&outcome, cli);

    for result in &outcome.payload {
        if result.success {
            if !cli.is_quiet() {
                println!("  extracting: {}", display_target(&destination, &result.path));
            }
        } else {
            eprintln!(
                "  error: {}: {}",
                result.path,
                result.message.as_deref().unwrap_or("unknown error")
            );
        }
    }

    if !cli.is_very_quiet() {
        let failed = outcome.failed().count();
        let passed = outcome.passed().count();
        match outcome.error {
            None => println!("{passed} file(s) extracted."),
            Some(kind) => eprintln!("{passed} file(s) extracted, {failed} not extracted ({kind})."),
        }
    }
    Ok(outcome.succeeded())
}

fn display_target(destination: &Path, entry: &str) -> String {
    destination.join(entry).display().to_string()
}

/// Resolve positional names and `-x` patterns against a listing.
///
/// Literal names that match nothing are kept so the backend reports them
/// as missing.
fn select_entries(entries: &[ArchiveEntry], files: &[String], exclude: &[String]) -> Vec<String> {
    let excluded = |path: &str| exclude.iter().any(|x| path.contains(x.as_str()) || glob_match(x, path));

    let mut selected: Vec<String> = entries
        .iter()
        .map(|e| e.path.as_str())
        .filter(|path| files.is_empty() || files.iter().any(|f| name_matches(f, path)))
        .filter(|path| !excluded(*path))
        .map(str::to_string)
        .collect();

    for file in files {
        if !has_glob_chars(file) && !entries.iter().any(|e| name_matches(file, &e.path)) {
            selected.push(file.clone());
        }
    }
    selected
}

fn name_matches(pattern: &str, path: &str) -> bool {
    if has_glob_chars(pattern) {
        return glob_match(pattern, path);
    }
    let basename = path.rsplit('/').next().unwrap_or(path);
    path == pattern || basename == pattern
}

fn has_glob_chars(pattern: &str) -> bool {
    pattern.contains('*') || pattern.contains('?')
}

/// `*` matches any run of characters, `?` exactly one.
fn glob_match(pattern: &str, text: &str) -> bool {
    fn do_match(pattern: &[char], text: &[char]) -> bool {
        match (pattern.first(), text.first()) {
            (None, None) => true,
            (Some('*'), _) => {
                do_match(&pattern[1..], text) || (!text.is_empty() && do_match(pattern, &text[1..]))
            }
            (Some('?'), Some(_)) => do_match(&pattern[1..], &text[1..]),
            (Some(p), Some(t)) if p == t => do_match(&pattern[1..], &text[1..]),
            _ => false,
        }
    }

    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    do_match(&pattern, &text)
}

/// Uncompressed and compressed sums, saturating at `u64::MAX`.
fn totals(entries: &[ArchiveEntry]) -> (u64, u64) {
    entries.iter().fold((0u64, 0u64), |(size, packed), e| {
        (
            size.saturating_add(e.uncompressed_size),
            packed.saturating_add(e.compressed_size),
        )
    })
}

fn ratio(compressed: u64, uncompressed: u64) -> String {
    if uncompressed == 0 || compressed >= uncompressed {
        return "  0%".to_string();
    }
    let kept = u128::from(compressed) * 100 / u128::from(uncompressed);
    format!("{:>3}%", 100 - kept)
}

fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{size} bytes")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aeszip::EntryName;
    use aeszip::zip::CompressionMethod;

    fn entry(path: &str) -> ArchiveEntry {
        ArchiveEntry {
            path: path.to_string(),
            name: EntryName::Decoded(path.to_string()),
            uncompressed_size: 1,
            compressed_size: 1,
            method: CompressionMethod::Stored,
            aes_method: None,
            modified: None,
            encrypted: false,
            crc32: None,
        }
    }

    #[test]
    fn glob_wildcards() {
        assert!(glob_match("*.txt", "readme.txt"));
        assert!(glob_match("file?.dat", "file1.dat"));
        assert!(!glob_match("*.txt", "readme.md"));
    }

    #[test]
    fn selection_by_basename_glob_and_exclude() {
        let entries = vec![entry("a.txt"), entry("b/c.txt"), entry("b/d.bin")];
        let files = vec!["c.txt".to_string(), "*.bin".to_string()];
        assert_eq!(select_entries(&entries, &files, &[]), vec!["b/c.txt", "b/d.bin"]);

        let exclude = vec!["*.bin".to_string()];
        assert_eq!(select_entries(&entries, &[], &exclude), vec!["a.txt", "b/c.txt"]);
    }

    #[test]
    fn unmatched_literal_kept() {
        let entries = vec![entry("a.txt")];
        let files = vec!["missing.txt".to_string(), "*.zzz".to_string()];
        assert_eq!(select_entries(&entries, &files, &[]), vec!["missing.txt"]);
    }

    #[test]
    fn sizes_and_ratios() {
        assert_eq!(format_size(500), "500 bytes");
        assert_eq!(format_size(1536), "1.50 KB");
        assert_eq!(format_size(1048576), "1.00 MB");
        assert_eq!(ratio(25, 100), " 75%");
        assert_eq!(ratio(5, 0), "  0%");
    }

    #[test]
    fn zip64_sizes_do_not_overflow() {
        assert_eq!(ratio(1 << 62, 1 << 63), " 50%");
        assert_eq!(ratio(u64::MAX, u64::MAX), "  0%");

        let mut big = entry("big.bin");
        big.uncompressed_size = u64::MAX;
        big.compressed_size = u64::MAX - 1;
        assert_eq!(totals(&[big.clone(), big]), (u64::MAX, u64::MAX));
    }
}
