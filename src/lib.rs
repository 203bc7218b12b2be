#[macro_use]
extern crate log;

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api;

pub mod backoff;
pub mod configurer;
pub mod deployment;
pub mod error;
pub mod eventer;
pub mod framework;
pub mod healthz;
pub mod installer;
pub mod notifier;
pub mod operator;
pub mod resource;
pub mod service;

pub use deployment::DraughtsmanDeployment;
pub use error::{Error, Result};

pub async fn install_crd(
    client: &kube::Client,
    crd: &CustomResourceDefinition,
) -> anyhow::Result<CustomResourceDefinition> {
    let crds: kube::Api<CustomResourceDefinition> = kube::Api::all(client.clone());
    let pp = api::PostParams::default();

    match crds.create(&pp, crd).await {
        Ok(crd) => {
            info!(
                "created custom resource definition {}",
                crd.metadata.name.as_deref().unwrap_or_default()
            );
            debug!("created CRD: {:?}", crd.spec);
            Ok(crd)
        }
        Err(e) => {
            error!(
                "error installing crd:\n{}",
                serde_yaml::to_string(&crd).unwrap_or_default()
            );
            Err(e.into())
        }
    }
}
