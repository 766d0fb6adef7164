//! The test framework main entry point.

use std::path::Path;

use kube::{
    Client, Config,
    config::{KubeConfigOptions, Kubeconfig},
};
use snafu::ResultExt;
use tracing::info;

use crate::{BuildClientSnafu, KubeconfigSnafu, Result, port_forward::PortForwards};

/// Framework wraps the connection to the cluster with an easy-to-use rust API
/// optimized for implementing test steps.
pub struct Framework {
    client: Client,
    pub(crate) port_forwards: PortForwards,
}

impl std::fmt::Debug for Framework {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Framework")
            .field("port_forwards", &self.port_forwards)
            .finish_non_exhaustive()
    }
}

impl Framework {
    /// Create a new [`Framework`] powered by the passed client.
    pub fn new(client: Client) -> Self {
        Self {
            client,
            port_forwards: PortForwards::default(),
        }
    }

    /// Connect using the kube config file at `path`.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let kubeconfig = Kubeconfig::read_from(path).context(KubeconfigSnafu {
            path: path.display().to_string(),
        })?;
        let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .context(KubeconfigSnafu {
                path: path.display().to_string(),
            })?;
        let client = Client::try_from(config).context(BuildClientSnafu)?;
        info!(message = "Connected to Kubernetes cluster.", path = %path.display());
        Ok(Self::new(client))
    }

    /// Connect using the ambient configuration (`KUBECONFIG`, in-cluster).
    pub async fn try_default() -> Result<Self> {
        let client = Client::try_default().await.context(BuildClientSnafu)?;
        Ok(Self::new(client))
    }

    /// The underlying client.
    pub fn client(&self) -> Client {
        self.client.clone()
    }
}
