//! Local deploy-script backend.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::config::Version;
use crate::controller::error::{Result, ResultExt};
use crate::exec::{CommandRunner, CommandSpec};

use super::OperatorBackend;

/// Installs versions by running a deploy command through `bash -c` in the
/// workspace.
#[derive(Clone)]
pub struct LocalBackend {
    runner: Arc<dyn CommandRunner>,
    workspace: PathBuf,
    command: String,
}

impl std::fmt::Debug for LocalBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalBackend")
            .field("workspace", &self.workspace)
            .field("command", &self.command)
            .finish_non_exhaustive()
    }
}

impl LocalBackend {
    pub fn new(runner: Arc<dyn CommandRunner>, workspace: PathBuf, command: String) -> Self {
        Self {
            runner,
            workspace,
            command,
        }
    }
}

#[async_trait]
impl OperatorBackend for LocalBackend {
    async fn install_version(&self, version: &Version) -> Result<()> {
        info!(version = %version.name, command = %self.command, "Deploying operator");
        self.runner
            .run(&CommandSpec::bash(&self.command).in_dir(&self.workspace))
            .await
            .with_context(|| format!("deploying version {}", version.name))?;
        info!(version = %version.name, "Operator deployed");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "local"
    }
}
