//! Run configuration.
//!
//! Loaded once from YAML at startup and immutable afterwards. Missing optional
//! fields take the documented defaults; [`Config::validate`] rejects documents
//! that cannot drive a run.
//!
//! ```yaml
//! operatorConfig:
//!   name: demo-operator
//!   namespace: demo-system
//! upgradePaths:
//!   - name: v1.0-to-v1.1
//!     versions:
//!       - name: v1.0
//!         bundleVersion: v1.0.0
//!       - name: v1.1
//!         bundleVersion: v1.1.0
//! ```

pub mod image;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::controller::error::{Error, Result, ResultExt};

pub use image::ImageReference;

/// Default test command for the first version of a path.
pub const DEFAULT_PREPARE_COMMAND: &str = "REPO=allure make prepare";

/// Default test command for every later version of a path.
pub const DEFAULT_UPGRADE_COMMAND: &str = "REPO=allure make upgrade";

/// Default subscription channel.
pub const DEFAULT_CHANNEL: &str = "stable";

/// Default namespace holding artifacts and catalog sources.
pub const DEFAULT_SYSTEM_NAMESPACE: &str = "cpaas-system";

/// Default namespace the operator is installed into.
pub const DEFAULT_OPERATOR_NAMESPACE: &str = "testing-upgrade-namespace";

/// Default artifact name prefix.
pub const DEFAULT_ARTIFACT_PREFIX: &str = "operatorhub";

/// Default catalog source for subscriptions.
pub const DEFAULT_CATALOG_SOURCE: &str = "platform";

/// Default deploy command of the local backend.
pub const DEFAULT_LOCAL_COMMAND: &str = "make deploy";

/// Default subscription create attempts.
pub const DEFAULT_SUBSCRIPTION_RETRIES: u32 = 3;

/// Default delay after the first failed subscription create.
pub const DEFAULT_SUBSCRIPTION_RETRY_DELAY: Duration = Duration::from_secs(1);

// ============================================================================
// Model
// ============================================================================

/// Top-level configuration document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// How the operator under test is installed
    pub operator_config: OperatorConfig,
    /// Upgrade paths, run in order
    pub upgrade_paths: Vec<UpgradePath>,
    /// Abort the whole run on the first failed path
    pub immediate: bool,
    /// Remove cloned sources after each version
    pub cleanup: bool,
    /// Log level, overridden by `--log-level`
    pub log_level: Option<String>,
}

/// Operator backend selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatorType {
    /// Drive the cluster's lifecycle manager
    #[default]
    OperatorHub,
    /// Run a local deploy command
    Local,
}

impl std::fmt::Display for OperatorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperatorType::OperatorHub => write!(f, "operatorhub"),
            OperatorType::Local => write!(f, "local"),
        }
    }
}

/// Operator installation settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OperatorConfig {
    /// Backend type
    #[serde(rename = "type")]
    pub kind: OperatorType,
    /// Namespace the operator is installed into
    pub namespace: String,
    /// Namespace holding artifacts and catalog sources
    pub system_namespace: String,
    /// Operator package name
    pub name: String,
    /// Artifact name; derived from the prefix and name when empty
    pub artifact: Option<String>,
    /// Prefix of the derived artifact name
    pub artifact_prefix: String,
    /// Base workspace for test commands and cloned sources
    pub workspace: PathBuf,
    /// Poll interval
    #[serde(deserialize_with = "deserialize_duration")]
    pub interval: Duration,
    /// Bound on each polled wait
    #[serde(deserialize_with = "deserialize_duration")]
    pub timeout: Duration,
    /// Deploy command of the local backend
    pub command: String,
    /// Catalog source subscriptions install from
    pub catalog_source: String,
    /// Default test command for the first version of a path
    pub prepare_command: String,
    /// Default test command for later versions of a path
    pub upgrade_command: String,
    /// Attempts at creating the subscription, including the first
    pub subscription_retries: u32,
    /// Delay after the first failed subscription create; doubles per attempt
    #[serde(deserialize_with = "deserialize_duration")]
    pub subscription_retry_delay: Duration,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            kind: OperatorType::default(),
            namespace: DEFAULT_OPERATOR_NAMESPACE.to_string(),
            system_namespace: DEFAULT_SYSTEM_NAMESPACE.to_string(),
            name: String::new(),
            artifact: None,
            artifact_prefix: DEFAULT_ARTIFACT_PREFIX.to_string(),
            workspace: PathBuf::from("./"),
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(600),
            command: DEFAULT_LOCAL_COMMAND.to_string(),
            catalog_source: DEFAULT_CATALOG_SOURCE.to_string(),
            prepare_command: DEFAULT_PREPARE_COMMAND.to_string(),
            upgrade_command: DEFAULT_UPGRADE_COMMAND.to_string(),
            subscription_retries: DEFAULT_SUBSCRIPTION_RETRIES,
            subscription_retry_delay: DEFAULT_SUBSCRIPTION_RETRY_DELAY,
        }
    }
}

impl OperatorConfig {
    /// Artifact name: explicit, or `<artifactPrefix>-<name>`.
    pub fn artifact_name(&self) -> String {
        match self.artifact.as_deref().filter(|a| !a.is_empty()) {
            Some(artifact) => artifact.to_string(),
            None => format!("{}-{}", self.artifact_prefix, self.name),
        }
    }
}

/// One upgrade trajectory.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpgradePath {
    /// Path name
    pub name: String,
    /// Versions, installed in order
    pub versions: Vec<Version>,
}

/// One step of an upgrade path.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Version {
    /// Version name
    pub name: String,
    /// Bundle tag published through the existing artifact
    pub bundle_version: Option<String>,
    /// Full bundle image; provisions the artifact from its registry/repository
    pub bundle_image: Option<String>,
    /// Subscription channel
    pub channel: Option<String>,
    /// Explicit test command
    pub test_command: Option<String>,
    /// Sub-directory of the workspace the test command runs in
    pub test_sub_path: Option<String>,
    /// Source revision to build from
    pub revision: Option<String>,
    /// Git source to build from
    pub git: Option<GitSource>,
    /// Command producing the bundle from source
    pub build_command: Option<String>,
}

/// Git source of a version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GitSource {
    /// Remote URL
    pub repository: String,
    /// Revision to fetch
    pub revision: String,
    /// Username for HTTP auth
    pub username: String,
    /// Password or token for HTTP auth
    pub password: String,
}

/// Where a version's bundle comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundleReference {
    /// A tag of the pre-provisioned artifact
    Tag(String),
    /// An image whose registry/repository provision the artifact
    Image(ImageReference),
}

impl BundleReference {
    /// Tag requested from the artifact.
    pub fn tag(&self) -> &str {
        match self {
            BundleReference::Tag(tag) => tag,
            BundleReference::Image(image) => &image.reference,
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl Version {
    /// Bundle reference; the image wins when both are set.
    pub fn bundle_reference(&self) -> Result<BundleReference> {
        if let Some(image) = non_empty(&self.bundle_image) {
            return Ok(BundleReference::Image(image.parse()?));
        }
        if let Some(tag) = non_empty(&self.bundle_version) {
            return Ok(BundleReference::Tag(tag.to_string()));
        }
        Err(Error::Configuration(format!(
            "version {:?} sets neither bundleVersion nor bundleImage",
            self.name
        )))
    }

    /// Subscription channel, `stable` when unset.
    pub fn channel(&self) -> &str {
        non_empty(&self.channel).unwrap_or(DEFAULT_CHANNEL)
    }

    /// Explicit test command, if any.
    pub fn test_command(&self) -> Option<&str> {
        non_empty(&self.test_command)
    }

    /// Test sub-directory, if any.
    pub fn test_sub_path(&self) -> Option<&str> {
        non_empty(&self.test_sub_path)
    }

    /// Build command, if any.
    pub fn build_command(&self) -> Option<&str> {
        non_empty(&self.build_command)
    }

    /// Revision to build: `git.revision`, else the top-level `revision`.
    pub fn source_revision(&self) -> Option<&str> {
        self.git
            .as_ref()
            .map(|g| g.revision.trim())
            .filter(|r| !r.is_empty())
            .or_else(|| non_empty(&self.revision))
    }

    /// Repository to clone, if any.
    pub fn source_repository(&self) -> Option<&str> {
        self.git
            .as_ref()
            .map(|g| g.repository.trim())
            .filter(|r| !r.is_empty())
    }
}

// ============================================================================
// Loading
// ============================================================================

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDuration {
    Seconds(u64),
    Text(String),
}

/// Parse a duration written as integer seconds or text like `5s`, `10m`, `1h30m`.
pub fn parse_duration(text: &str) -> Result<Duration> {
    let signed: jiff::SignedDuration = text
        .trim()
        .parse()
        .map_err(|e| Error::Configuration(format!("invalid duration {:?}: {}", text, e)))?;
    Duration::try_from(signed)
        .map_err(|e| Error::Configuration(format!("invalid duration {:?}: {}", text, e)))
}

fn deserialize_duration<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    match RawDuration::deserialize(deserializer)? {
        RawDuration::Seconds(secs) => Ok(Duration::from_secs(secs)),
        RawDuration::Text(text) => parse_duration(&text).map_err(serde::de::Error::custom),
    }
}

impl Config {
    /// Load, default and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(Error::from)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_yaml(&text).with_context(|| format!("loading config {}", path.display()))
    }

    /// Parse and validate a YAML document.
    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Replace the base workspace, as `--workspace` does.
    pub fn with_workspace(mut self, workspace: impl Into<PathBuf>) -> Self {
        self.operator_config.workspace = workspace.into();
        self
    }

    /// Reject configurations that cannot drive a run.
    pub fn validate(&self) -> Result<()> {
        let op = &self.operator_config;
        if self.upgrade_paths.is_empty() {
            return Err(Error::Configuration("no upgradePaths configured".into()));
        }
        if op.interval.is_zero() || op.timeout.is_zero() {
            return Err(Error::Configuration(
                "operatorConfig.interval and operatorConfig.timeout must be positive".into(),
            ));
        }
        if op.subscription_retries == 0 {
            return Err(Error::Configuration(
                "operatorConfig.subscriptionRetries must be at least 1".into(),
            ));
        }
        if op.kind == OperatorType::OperatorHub {
            if op.name.trim().is_empty() {
                return Err(Error::Configuration("operatorConfig.name is required".into()));
            }
            if op.namespace.trim().is_empty() {
                return Err(Error::Configuration(
                    "operatorConfig.namespace is required".into(),
                ));
            }
        }

        for path in &self.upgrade_paths {
            if path.versions.is_empty() {
                return Err(Error::Configuration(format!(
                    "upgrade path {:?} has no versions",
                    path.name
                )));
            }
            if op.kind == OperatorType::OperatorHub {
                for version in &path.versions {
                    version.bundle_reference().with_context(|| {
                        format!("upgrade path {:?}", path.name)
                    })?;
                }
            }
        }
        Ok(())
    }
}
