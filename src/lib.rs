//! # aeszip
//!
//! Read password-protected ZIP archives, including WinZip AES, through
//! either an in-process codec or an installed 7-Zip compatible tool.
//!
//! The [`Engine`] picks a backend according to an [`AccessStrategy`],
//! falls back from the external tool to the native codec when the tool
//! fails for reasons other than credentials, and reports which backend
//! produced the answer.
//!
//! ## Example
//!
//! ```no_run
//! use aeszip::{AccessStrategy, ArchiveRequest, Engine, EngineConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let engine = Engine::new(EngineConfig::detect());
//!     let request = ArchiveRequest::new("secret.zip").with_password(Some("hunter2"));
//!
//!     let outcome = engine.list(&request, AccessStrategy::Auto).await?;
//!     for entry in &outcome.payload {
//!         println!("{} ({} bytes)", entry.path, entry.uncompressed_size);
//!     }
//!     println!("listed by the {} backend", outcome.backend_used);
//!
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod cli;
pub mod engine;
pub mod entry;
pub mod error;
pub mod io;
pub mod locator;
pub mod outcome;
pub mod sanitize;
pub mod zip;

pub use backend::{ArchiveRequest, Backend, BackendKind, ExternalBackend, NativeBackend, Password};
pub use cli::Cli;
pub use engine::{AccessStrategy, Engine, EngineConfig};
pub use entry::{ArchiveEntry, EntryName, EntryResult};
pub use error::{Error, ErrorKind, Result};
pub use locator::ToolPath;
pub use outcome::{ExtractOutcome, ListOutcome, Outcome, TestOutcome};
