//! Cluster credential resolution.
//!
//! Order: `--kubeconfig` flag, then `KUBECONFIG`, then `~/.kube/config` when
//! it exists, then in-cluster service account credentials.

use std::path::{Path, PathBuf};

use kube::Client;
use kube::config::{Config, KubeConfigOptions, Kubeconfig};
use tracing::info;

use crate::controller::error::{Error, Result};

/// Where cluster credentials come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KubeconfigSource {
    /// A kubeconfig file on disk
    File(PathBuf),
    /// The pod's service account
    InCluster,
}

impl KubeconfigSource {
    /// Path to export as `KUBECONFIG` for subprocesses, if any.
    pub fn export_path(&self) -> Option<&Path> {
        match self {
            KubeconfigSource::File(path) => Some(path),
            KubeconfigSource::InCluster => None,
        }
    }
}

/// Resolve the credential source from the flag, `KUBECONFIG` and the home directory.
pub fn resolve(flag: Option<&str>, env: Option<&str>, home: Option<&Path>) -> KubeconfigSource {
    if let Some(path) = flag.filter(|p| !p.is_empty()) {
        return KubeconfigSource::File(PathBuf::from(path));
    }
    if let Some(path) = env.filter(|p| !p.is_empty()) {
        return KubeconfigSource::File(PathBuf::from(path));
    }
    if let Some(home) = home {
        let default = home.join(".kube").join("config");
        if default.exists() {
            return KubeconfigSource::File(default);
        }
    }
    KubeconfigSource::InCluster
}

/// Build a client from the resolved source.
pub async fn connect(source: &KubeconfigSource) -> Result<Client> {
    let config = match source {
        KubeconfigSource::File(path) => {
            info!(kubeconfig = %path.display(), "Loading kubeconfig");
            let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                Error::Configuration(format!("reading kubeconfig {}: {}", path.display(), e))
            })?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| {
                    Error::Configuration(format!("loading kubeconfig {}: {}", path.display(), e))
                })?
        }
        KubeconfigSource::InCluster => {
            info!("Using in-cluster credentials");
            Config::incluster()
                .map_err(|e| Error::Configuration(format!("in-cluster credentials: {}", e)))?
        }
    };
    Ok(Client::try_from(config)?)
}
