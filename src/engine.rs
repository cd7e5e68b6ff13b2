//! Strategy selection and fallback between backends.

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::backend::{ArchiveRequest, Backend, BackendKind, ExternalBackend, NativeBackend};
use crate::entry::{ArchiveEntry, EntryResult};
use crate::error::{Error, ErrorKind, Result};
use crate::locator::{self, ToolPath};
use crate::outcome::{ExtractOutcome, ListOutcome, Outcome, TestOutcome};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessStrategy {
    /// External tool when one is installed, native codec otherwise or on failure.
    #[default]
    Auto,
    ForceNative,
    ForceExternal,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub tool: Option<ToolPath>,
    /// Bound on external listing and testing.
    pub timeout: Duration,
}

impl EngineConfig {
    /// Use whatever tool the locator finds on this host.
    pub fn detect() -> Self {
        Self {
            tool: locator::locate().cloned(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_tool(mut self, tool: Option<ToolPath>) -> Self {
        self.tool = tool;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tool: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// One engine call, runnable against any backend.
#[async_trait]
trait Operation: Send + Sync {
    type Output: Send;

    const NAME: &'static str;

    async fn call(&self, backend: &dyn Backend, request: &ArchiveRequest) -> Result<Self::Output>;
}

struct ListOp;

#[async_trait]
impl Operation for ListOp {
    type Output = Vec<ArchiveEntry>;
    const NAME: &'static str = "list";

    async fn call(&self, backend: &dyn Backend, request: &ArchiveRequest) -> Result<Self::Output> {
        backend.list(request).await
    }
}

struct TestOp;

#[async_trait]
impl Operation for TestOp {
    type Output = Vec<EntryResult>;
    const NAME: &'static str = "test";

    async fn call(&self, backend: &dyn Backend, request: &ArchiveRequest) -> Result<Self::Output> {
        backend.test(request).await
    }
}

struct ExtractOp<'a> {
    destination: &'a Path,
    selection: Option<&'a [String]>,
    cancel: &'a CancellationToken,
}

#[async_trait]
impl<'a> Operation for ExtractOp<'a> {
    type Output = Vec<EntryResult>;
    const NAME: &'static str = "extract";

    async fn call(&self, backend: &dyn Backend, request: &ArchiveRequest) -> Result<Self::Output> {
        backend
            .extract(request, self.destination, self.selection, self.cancel)
            .await
    }
}

/// Backends to try for one call, in order.
struct Plan {
    first: Option<Box<dyn Backend>>,
    last: Box<dyn Backend>,
}

/// Runs archive operations under an [`AccessStrategy`].
#[derive(Debug, Clone, Default)]
pub struct Engine {
    config: EngineConfig,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub async fn list(&self, request: &ArchiveRequest, strategy: AccessStrategy) -> Result<ListOutcome> {
        self.run(&ListOp, request, strategy).await
    }

    /// `error` on the outcome is the kind of the first failing entry.
    pub async fn test(&self, request: &ArchiveRequest, strategy: AccessStrategy) -> Result<TestOutcome> {
        let mut outcome = self.run(&TestOp, request, strategy).await?;
        outcome.error = outcome.payload.iter().find_map(|r| r.error);
        Ok(outcome)
    }

    /// Extract `selection` (or all entries) into `destination`.
    ///
    /// Entry failures do not abort the run; the outcome carries
    /// `PartialExtractionFailure`, or `Cancelled` if `cancel` fired.
    pub async fn extract(
        &self,
        request: &ArchiveRequest,
        strategy: AccessStrategy,
        destination: &Path,
        selection: Option<&[String]>,
        cancel: &CancellationToken,
    ) -> Result<ExtractOutcome> {
        let op = ExtractOp {
            destination,
            selection,
            cancel,
        };
        let mut outcome = self.run(&op, request, strategy).await?;

        let cancelled = outcome
            .payload
            .iter()
            .any(|r| r.error == Some(ErrorKind::Cancelled));
        outcome.error = if cancelled {
            Some(ErrorKind::Cancelled)
        } else if outcome.payload.iter().any(|r| !r.success) {
            Some(ErrorKind::PartialExtractionFailure)
        } else {
            None
        };
        Ok(outcome)
    }

    fn plan(&self, strategy: AccessStrategy) -> Result<Plan> {
        let external = self.config.tool.clone().map(|tool| {
            Box::new(ExternalBackend::new(tool, self.config.timeout)) as Box<dyn Backend>
        });

        match strategy {
            AccessStrategy::ForceNative => Ok(Plan {
                first: None,
                last: Box::new(NativeBackend::new()),
            }),
            AccessStrategy::ForceExternal => match external {
                Some(external) => Ok(Plan {
                    first: None,
                    last: external,
                }),
                None => Err(Error::BackendUnavailable {
                    backend: BackendKind::External,
                }),
            },
            AccessStrategy::Auto => Ok(Plan {
                first: external,
                last: Box::new(NativeBackend::new()),
            }),
        }
    }

    async fn run<O: Operation>(
        &self,
        op: &O,
        request: &ArchiveRequest,
        strategy: AccessStrategy,
    ) -> Result<Outcome<O::Output>> {
        let plan = self.plan(strategy)?;

        if tokio::fs::metadata(&request.archive).await.is_err() {
            return Err(Error::ArchiveNotFound {
                path: request.archive.clone(),
            });
        }

        let mut fallback = None;
        if let Some(first) = plan.first {
            match op.call(first.as_ref(), request).await {
                Ok(payload) => {
                    return Ok(Outcome {
                        backend_used: first.kind(),
                        payload,
                        error: None,
                        fallback: None,
                    });
                }
                Err(err) if err.kind().is_authentication() || err.kind() == ErrorKind::Cancelled => {
                    return Err(err);
                }
                Err(err) => {
                    warn!(
                        operation = O::NAME,
                        backend = %first.kind(),
                        error = %err,
                        "falling back to {}",
                        plan.last.kind()
                    );
                    fallback = Some(err.kind());
                }
            }
        }

        let payload = op.call(plan.last.as_ref(), request).await?;
        info!(operation = O::NAME, backend = %plan.last.kind(), "operation finished");
        Ok(Outcome {
            backend_used: plan.last.kind(),
            payload,
            error: None,
            fallback,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn force_external_without_tool_is_unavailable() {
        let engine = Engine::new(EngineConfig::default());
        let err = engine.plan(AccessStrategy::ForceExternal).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::BackendUnavailable);
    }

    #[test]
    fn auto_without_tool_is_native_only() {
        let engine = Engine::new(EngineConfig::default());
        let plan = engine.plan(AccessStrategy::Auto).unwrap();
        assert!(plan.first.is_none());
        assert_eq!(plan.last.kind(), BackendKind::Native);
    }

    #[test]
    fn auto_with_tool_tries_external_first() {
        let config = EngineConfig::default().with_tool(Some(ToolPath::new("/usr/bin/7z")));
        let plan = Engine::new(config).plan(AccessStrategy::Auto).unwrap();
        assert_eq!(plan.first.map(|b| b.kind()), Some(BackendKind::External));
        assert_eq!(plan.last.kind(), BackendKind::Native);
    }

    #[test]
    fn force_native_ignores_tool() {
        let config = EngineConfig::default().with_tool(Some(ToolPath::new("/usr/bin/7z")));
        let plan = Engine::new(config).plan(AccessStrategy::ForceNative).unwrap();
        assert!(plan.first.is_none());
        assert_eq!(plan.last.kind(), BackendKind::Native);
    }

    #[tokio::test]
    async fn missing_archive_reported_before_backends_run() {
        let engine = Engine::new(EngineConfig::default());
        let request = ArchiveRequest::new("/nonexistent/archive.zip");
        let err = engine.list(&request, AccessStrategy::Auto).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArchiveNotFound);
    }

    #[tokio::test]
    async fn unavailable_wins_over_missing_archive() {
        let engine = Engine::new(EngineConfig::default());
        let request = ArchiveRequest::new("/nonexistent/archive.zip");
        let err = engine
            .list(&request, AccessStrategy::ForceExternal)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BackendUnavailable);
    }
}
