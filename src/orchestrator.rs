//! Upgrade path orchestration.
//!
//! Paths run one after another and the versions of a path run in order:
//! optional source build, backend install, then the version's test command.
//! A failed version aborts its path since later versions depend on the data
//! it left behind. Whether a failed path aborts the run is decided by
//! `immediate`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::config::{Config, OperatorConfig, UpgradePath, Version};
use crate::controller::error::{Error, Result, ResultExt};
use crate::exec::{CommandRunner, CommandSpec};
use crate::operator::OperatorBackend;
use crate::source::{SourcePipeline, sanitize_path};

/// Test command of the version at `index` within its path.
///
/// An explicit command wins; otherwise the first version seeds data with the
/// prepare command and every later one verifies it with the upgrade command.
pub fn resolve_test_command<'a>(
    version: &'a Version,
    index: usize,
    operator: &'a OperatorConfig,
) -> &'a str {
    match version.test_command() {
        Some(command) => command,
        None if index == 0 => &operator.prepare_command,
        None => &operator.upgrade_command,
    }
}

/// Directory the test command runs in: `base` joined with the version's
/// optional sub-path.
pub fn resolve_workspace(base: &Path, version: &Version) -> PathBuf {
    match version.test_sub_path() {
        Some(sub) => base.join(sub),
        None => base.to_path_buf(),
    }
}

// ============================================================================
// Run report
// ============================================================================

/// Result of one attempted path.
#[derive(Debug)]
pub struct PathOutcome {
    /// Path name
    pub name: String,
    /// The failure that aborted the path, if any
    pub error: Option<Error>,
}

impl PathOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Outcome of a whole run.
#[derive(Debug, Default)]
pub struct RunReport {
    /// Every attempted path, in order
    pub outcomes: Vec<PathOutcome>,
    /// Whether remaining paths were skipped after a failure
    pub aborted: bool,
}

impl RunReport {
    /// Number of failed paths.
    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.succeeded()).count()
    }

    /// Whether every attempted path succeeded.
    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    /// Process exit code: non-zero when any attempted path failed.
    pub fn exit_code(&self) -> u8 {
        if self.is_success() { 0 } else { 1 }
    }
}

// ============================================================================
// Runner
// ============================================================================

/// Sequences upgrade paths against an operator backend.
pub struct UpgradeRunner {
    config: Config,
    backend: Arc<dyn OperatorBackend>,
    runner: Arc<dyn CommandRunner>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for UpgradeRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpgradeRunner")
            .field("paths", &self.config.upgrade_paths.len())
            .field("immediate", &self.config.immediate)
            .field("cleanup", &self.config.cleanup)
            .finish_non_exhaustive()
    }
}

impl UpgradeRunner {
    pub fn new(
        config: Config,
        backend: Arc<dyn OperatorBackend>,
        runner: Arc<dyn CommandRunner>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            backend,
            runner,
            cancel,
        }
    }

    fn workspace(&self) -> &Path {
        &self.config.operator_config.workspace
    }

    /// Source pipeline checking out under `<workspace>/<path name>`.
    fn source_pipeline(&self, path: &UpgradePath) -> SourcePipeline {
        SourcePipeline::new(
            self.workspace().join(sanitize_path(&path.name)),
            self.runner.clone(),
        )
    }

    /// Run every configured path.
    pub async fn run(&self) -> RunReport {
        let mut report = RunReport::default();
        let total = self.config.upgrade_paths.len();

        for (index, path) in self.config.upgrade_paths.iter().enumerate() {
            let start_time = Instant::now();
            let result = self.run_path(path).await;
            let elapsed_ms = start_time.elapsed().as_millis() as u64;

            let stop = match &result {
                Ok(()) => {
                    info!(path = %path.name, elapsed_ms, "Upgrade path succeeded");
                    false
                }
                Err(e) => {
                    error!(
                        path = %path.name,
                        error = %e,
                        category = e.category(),
                        elapsed_ms,
                        "Upgrade path failed"
                    );
                    self.config.immediate || e.is_cancelled()
                }
            };

            report.outcomes.push(PathOutcome {
                name: path.name.clone(),
                error: result.err(),
            });

            if stop {
                let skipped = total - index - 1;
                if skipped > 0 {
                    warn!(skipped, "Aborting run, remaining paths skipped");
                }
                report.aborted = true;
                break;
            }
        }

        info!(
            paths = report.outcomes.len(),
            failed = report.failed(),
            aborted = report.aborted,
            "Upgrade run finished"
        );
        report
    }

    /// Run one path; the first failed version aborts it.
    #[instrument(skip(self, path), fields(path = %path.name))]
    pub async fn run_path(&self, path: &UpgradePath) -> Result<()> {
        info!(versions = path.versions.len(), "Starting upgrade path");
        let pipeline = self.source_pipeline(path);

        for (index, version) in path.versions.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled(format!("starting version {}", version.name)));
            }

            let source_dir = pipeline
                .prepare(version)
                .await
                .with_context(|| format!("building version {} from source", version.name))?;

            let result = self.run_version(index, version).await;

            if self.config.cleanup
                && let Some(dir) = &source_dir
            {
                pipeline.cleanup(dir).await;
            }
            result.with_context(|| format!("version {}", version.name))?;
        }
        Ok(())
    }

    async fn run_version(&self, index: usize, version: &Version) -> Result<()> {
        info!(version = %version.name, index, "Installing version");
        self.backend.install_version(version).await?;

        let command = resolve_test_command(version, index, &self.config.operator_config);
        let dir = resolve_workspace(self.workspace(), version);
        info!(version = %version.name, command = %command, dir = %dir.display(), "Running test");
        self.runner
            .run(&CommandSpec::bash(command).in_dir(&dir))
            .await?;
        info!(version = %version.name, "Test passed");
        Ok(())
    }
}
