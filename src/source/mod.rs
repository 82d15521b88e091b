//! Source build pipeline.
//!
//! When a version names a git repository, a revision and a build command, the
//! revision is checked out into a per-version directory and the build command
//! produces the bundle before the operator is installed.
//!
//! Checkouts happen in a temporary staging directory and are copied into the
//! target only after `git checkout` succeeded, so a failed clone never leaves
//! a partially-populated target behind.

pub mod path;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::config::{GitSource, Version};
use crate::controller::error::{Error, Result, ResultExt};
use crate::exec::{CommandRunner, CommandSpec};

pub use path::sanitize_path;

/// Clones, builds and cleans up version sources under one base directory.
#[derive(Clone)]
pub struct SourcePipeline {
    base_dir: PathBuf,
    runner: Arc<dyn CommandRunner>,
}

impl std::fmt::Debug for SourcePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourcePipeline")
            .field("base_dir", &self.base_dir)
            .finish_non_exhaustive()
    }
}

/// Whether `version` carries everything needed to build from source.
///
/// A revision and build command without a repository skips the pipeline and
/// the version's static bundle reference is used unchanged.
pub fn applies_to(version: &Version) -> bool {
    version.source_repository().is_some()
        && version.source_revision().is_some()
        && version.build_command().is_some()
}

/// Remote URL with credentials embedded when both username and password are set.
pub fn authenticated_url(git: &GitSource) -> Result<String> {
    if git.username.is_empty() || git.password.is_empty() {
        return Ok(git.repository.clone());
    }
    let mut url = Url::parse(&git.repository).map_err(|e| {
        Error::Configuration(format!("invalid git repository {:?}: {}", git.repository, e))
    })?;
    url.set_username(&git.username)
        .and_then(|_| url.set_password(Some(&git.password)))
        .map_err(|_| {
            Error::Configuration(format!(
                "git repository {:?} cannot carry credentials",
                git.repository
            ))
        })?;
    Ok(url.to_string())
}

/// The repository URL with any embedded password replaced, for logs.
pub fn masked_url(repository: &str) -> String {
    match Url::parse(repository) {
        Ok(mut url) if url.password().is_some() => {
            let _ = url.set_password(Some("***"));
            url.to_string()
        }
        _ => repository.to_string(),
    }
}

impl SourcePipeline {
    /// Pipeline checking out into `base_dir/<sanitized version name>`.
    pub fn new(base_dir: impl Into<PathBuf>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            base_dir: base_dir.into(),
            runner,
        }
    }

    /// Checkout directory of `version_name`.
    pub fn target_dir(&self, version_name: &str) -> PathBuf {
        self.base_dir.join(sanitize_path(version_name))
    }

    /// Clone and build `version` when it applies; returns the checkout directory.
    pub async fn prepare(&self, version: &Version) -> Result<Option<PathBuf>> {
        if !applies_to(version) {
            if version.build_command().is_some() || version.source_revision().is_some() {
                debug!(version = %version.name, "No repository configured, skipping source build");
            }
            return Ok(None);
        }
        let (Some(git), Some(revision), Some(build)) = (
            version.git.as_ref(),
            version.source_revision(),
            version.build_command(),
        ) else {
            return Ok(None);
        };

        let dir = self.clone(&version.name, git, revision).await?;
        self.build(&dir, build).await?;
        Ok(Some(dir))
    }

    /// Check out `revision` of `git` into the version's target directory.
    #[instrument(skip(self, git), fields(repository = %masked_url(&git.repository)))]
    pub async fn clone(&self, version_name: &str, git: &GitSource, revision: &str) -> Result<PathBuf> {
        let target = self.target_dir(version_name);
        let context = || {
            format!(
                "cloning {} at {} into {}",
                masked_url(&git.repository),
                revision,
                target.display()
            )
        };

        if tokio::fs::try_exists(&target).await.unwrap_or(false) {
            debug!(target = %target.display(), "Removing previous checkout");
            tokio::fs::remove_dir_all(&target)
                .await
                .map_err(Error::from)
                .with_context(context)?;
        }
        tokio::fs::create_dir_all(&self.base_dir)
            .await
            .map_err(Error::from)
            .with_context(context)?;

        let staging = tempfile::Builder::new()
            .prefix("git-clone-")
            .tempdir()
            .map_err(Error::from)
            .with_context(context)?;

        self.checkout(staging.path(), git, revision)
            .await
            .with_context(context)?;

        let from = staging.path().to_path_buf();
        let to = target.clone();
        tokio::task::spawn_blocking(move || copy_dir_all(&from, &to))
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e)))
            .and_then(|r| r.map_err(Error::from))
            .with_context(context)?;

        info!(target = %target.display(), revision = %revision, "Checked out source");
        Ok(target)
    }

    async fn checkout(&self, dir: &Path, git: &GitSource, revision: &str) -> Result<()> {
        let git_cmd = |args: &[&str]| CommandSpec::new("git", args.iter().copied()).in_dir(dir);

        self.runner.run(&git_cmd(&["init"])).await?;

        if !git.username.is_empty() && !git.password.is_empty() {
            self.runner
                .run(&git_cmd(&["config", "credential.helper", "store"]))
                .await?;
        }

        let remote = authenticated_url(git)?;
        let add_remote = git_cmd(&["remote", "add", "origin", remote.as_str()])
            .displayed_as(format!("git remote add origin {}", masked_url(&remote)));
        self.runner.run(&add_remote).await?;

        self.runner
            .run(&git_cmd(&["fetch", "origin", revision]))
            .await?;
        self.runner.run(&git_cmd(&["checkout", "FETCH_HEAD"])).await?;
        Ok(())
    }

    /// Run `command` through `sh -c` in `dir`; failures surface verbatim.
    #[instrument(skip(self))]
    pub async fn build(&self, dir: &Path, command: &str) -> Result<()> {
        info!("Building from source");
        self.runner.run(&CommandSpec::sh(command).in_dir(dir)).await?;
        Ok(())
    }

    /// Best-effort recursive removal of a checkout.
    pub async fn cleanup(&self, dir: &Path) {
        match tokio::fs::remove_dir_all(dir).await {
            Ok(()) => info!(dir = %dir.display(), "Removed checkout"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(dir = %dir.display(), error = %e, "Failed to remove checkout"),
        }
    }
}

fn copy_dir_all(from: &Path, to: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(to)?;
    for entry in std::fs::read_dir(from)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let dest = to.join(entry.file_name());
        if file_type.is_dir() {
            copy_dir_all(&entry.path(), &dest)?;
        } else if file_type.is_symlink() {
            copy_symlink(&entry.path(), &dest)?;
        } else {
            std::fs::copy(entry.path(), &dest)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(from: &Path, to: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(std::fs::read_link(from)?, to)
}

#[cfg(not(unix))]
fn copy_symlink(from: &Path, to: &Path) -> std::io::Result<()> {
    std::fs::copy(from, to).map(|_| ())
}
