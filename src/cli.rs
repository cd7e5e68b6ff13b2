use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

use crate::engine::{AccessStrategy, DEFAULT_TIMEOUT};

#[derive(Parser, Debug)]
#[command(name = "aeszip")]
#[command(version)]
#[command(about = "List, test and extract password-protected ZIP archives", long_about = None)]
#[command(after_help = "Examples:\n  \
  aeszip -l secret.zip                 list files\n  \
  aeszip -t -P hunter2 secret.zip      verify every entry\n  \
  aeszip -d out secret.zip '*.txt'     extract matching files into out/\n  \
  aeszip --strategy native secret.zip  never run the external tool")]
pub struct Cli {
    /// ZIP file path
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Files to extract (default: all)
    #[arg(value_name = "FILES")]
    pub files: Vec<String>,

    /// List files (short format)
    #[arg(short = 'l')]
    pub list: bool,

    /// List verbosely
    #[arg(short = 'v')]
    pub verbose: bool,

    /// Test archive entries
    #[arg(short = 't')]
    pub test: bool,

    /// Extract files into exdir
    #[arg(short = 'd', value_name = "DIR")]
    pub extract_dir: Option<PathBuf>,

    /// Exclude files that follow
    #[arg(short = 'x', value_name = "FILE", num_args = 1..)]
    pub exclude: Vec<String>,

    /// Archive password
    #[arg(short = 'P', long, env = "AESZIP_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Which backend to use
    #[arg(long, value_enum, default_value_t = StrategyArg::Auto)]
    pub strategy: StrategyArg,

    /// Path to a 7-Zip compatible executable (skips detection)
    #[arg(long, value_name = "PATH")]
    pub tool: Option<PathBuf>,

    /// Seconds allowed for external listing and testing
    #[arg(long, value_name = "SECS", default_value_t = DEFAULT_TIMEOUT.as_secs())]
    pub timeout: u64,

    /// Quiet mode (-qq => quieter)
    #[arg(short = 'q', action = clap::ArgAction::Count)]
    pub quiet: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StrategyArg {
    Auto,
    Native,
    External,
}

impl From<StrategyArg> for AccessStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Auto => AccessStrategy::Auto,
            StrategyArg::Native => AccessStrategy::ForceNative,
            StrategyArg::External => AccessStrategy::ForceExternal,
        }
    }
}

impl Cli {
    pub fn is_quiet(&self) -> bool {
        self.quiet > 0
    }

    pub fn is_very_quiet(&self) -> bool {
        self.quiet > 1
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Default `tracing` filter when `RUST_LOG` is unset.
    pub fn log_level(&self) -> &'static str {
        match (self.quiet, self.verbose) {
            (0, true) => "info",
            (0, false) => "warn",
            _ => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_maps() {
        let cli = Cli::parse_from(["aeszip", "--strategy", "external", "a.zip"]);
        assert_eq!(AccessStrategy::from(cli.strategy), AccessStrategy::ForceExternal);
        assert_eq!(cli.timeout(), DEFAULT_TIMEOUT);
    }

    #[test]
    fn files_and_excludes() {
        let cli = Cli::parse_from(["aeszip", "-d", "out", "a.zip", "b.txt", "-x", "c.txt"]);
        assert_eq!(cli.files, vec!["b.txt"]);
        assert_eq!(cli.exclude, vec!["c.txt"]);
        assert_eq!(cli.extract_dir, Some(PathBuf::from("out")));
    }

    #[test]
    fn quiet_beats_verbose_for_logging() {
        let cli = Cli::parse_from(["aeszip", "-v", "-q", "a.zip"]);
        assert_eq!(cli.log_level(), "error");
        let cli = Cli::parse_from(["aeszip", "-v", "a.zip"]);
        assert_eq!(cli.log_level(), "info");
    }
}
