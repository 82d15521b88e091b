//! Test fixtures and builder patterns for run configurations.

use std::path::PathBuf;
use std::time::Duration;

use upgrade_test::config::{Config, GitSource, OperatorType, UpgradePath, Version};

/// Builder for a [`Version`].
///
/// # Example
/// ```
/// let version = VersionBuilder::new("v1.1")
///     .bundle_version("v1.1.0")
///     .test_sub_path("testing")
///     .build();
/// ```
#[derive(Clone, Debug)]
pub struct VersionBuilder {
    version: Version,
}

impl VersionBuilder {
    /// A version publishing tag `<name>.0` of the pre-provisioned artifact.
    pub fn new(name: &str) -> Self {
        Self {
            version: Version {
                name: name.to_string(),
                bundle_version: Some(format!("{}.0", name)),
                ..Default::default()
            },
        }
    }

    pub fn bundle_version(mut self, tag: &str) -> Self {
        self.version.bundle_version = Some(tag.to_string());
        self
    }

    /// Publish from a full bundle image instead of a tag.
    pub fn bundle_image(mut self, image: &str) -> Self {
        self.version.bundle_version = None;
        self.version.bundle_image = Some(image.to_string());
        self
    }

    pub fn channel(mut self, channel: &str) -> Self {
        self.version.channel = Some(channel.to_string());
        self
    }

    pub fn test_command(mut self, command: &str) -> Self {
        self.version.test_command = Some(command.to_string());
        self
    }

    pub fn test_sub_path(mut self, sub_path: &str) -> Self {
        self.version.test_sub_path = Some(sub_path.to_string());
        self
    }

    /// Build from `repository` at `revision` with `command`.
    pub fn source(mut self, repository: &str, revision: &str, command: &str) -> Self {
        self.version.git = Some(GitSource {
            repository: repository.to_string(),
            revision: revision.to_string(),
            ..Default::default()
        });
        self.version.build_command = Some(command.to_string());
        self
    }

    /// Revision and build command without a repository.
    pub fn revision_only(mut self, revision: &str, command: &str) -> Self {
        self.version.revision = Some(revision.to_string());
        self.version.build_command = Some(command.to_string());
        self
    }

    pub fn build(self) -> Version {
        self.version
    }
}

/// Builder for a [`Config`] with fast polling suited to paused-time tests.
#[derive(Clone, Debug)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new(operator: &str) -> Self {
        let mut config = Config::default();
        config.operator_config.name = operator.to_string();
        config.operator_config.namespace = format!("{}-ns", operator);
        config.operator_config.workspace = PathBuf::from("/work");
        config.operator_config.interval = Duration::from_secs(1);
        config.operator_config.timeout = Duration::from_secs(30);
        Self { config }
    }

    pub fn local(mut self, command: &str) -> Self {
        self.config.operator_config.kind = OperatorType::Local;
        self.config.operator_config.command = command.to_string();
        self
    }

    pub fn workspace(mut self, workspace: impl Into<PathBuf>) -> Self {
        self.config.operator_config.workspace = workspace.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.operator_config.timeout = timeout;
        self
    }

    pub fn subscription_retries(mut self, attempts: u32) -> Self {
        self.config.operator_config.subscription_retries = attempts;
        self
    }

    pub fn path(mut self, name: &str, versions: Vec<Version>) -> Self {
        self.config.upgrade_paths.push(UpgradePath {
            name: name.to_string(),
            versions,
        });
        self
    }

    pub fn immediate(mut self, immediate: bool) -> Self {
        self.config.immediate = immediate;
        self
    }

    pub fn cleanup(mut self, cleanup: bool) -> Self {
        self.config.cleanup = cleanup;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

/// Two-version path `v1.0 -> v1.1` published by tag.
pub fn two_version_path() -> Vec<Version> {
    vec![
        VersionBuilder::new("v1.0").build(),
        VersionBuilder::new("v1.1").build(),
    ]
}
