use crate::error::Result;

/// Probes Kubernetes API reachability.
pub struct Healthz {
    client: kube::Client,
}

impl std::fmt::Debug for Healthz {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Healthz").finish_non_exhaustive()
    }
}

impl Healthz {
    pub fn new(client: kube::Client) -> Self {
        Healthz { client }
    }

    pub async fn check(&self) -> Result<()> {
        let version = self.client.apiserver_version().await?;

        debug!(
            "kubernetes api server reachable (version {}.{})",
            version.major, version.minor
        );

        Ok(())
    }
}
