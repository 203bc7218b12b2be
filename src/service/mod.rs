/*
 * Copyright 2021 Daniel Bornkessel
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! Assembles the configured components into one bootable service: chat
//! notifier, values providers, package-manager adapter, eventer, the
//! wrapped project resource, the framework and the operator around it.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use kube::config::{
    AuthInfo, Cluster, Context, KubeConfigOptions, Kubeconfig, NamedAuthInfo, NamedCluster,
    NamedContext,
};

use crate::backoff::{error_loop_policy, ExponentialBackoff};
use crate::configurer::{
    self, ConfigMapConfigurer, Configurer, ConfigurerKind, FileConfigurer, SecretConfigurer,
};
use crate::configurer::configmap::ConfigMapConfigurerConfig;
use crate::configurer::file::FileConfigurerConfig;
use crate::configurer::secret::SecretConfigurerConfig;
use crate::error::{Error, Result};
use crate::eventer::github::GithubEventerConfig;
use crate::eventer::{Eventer, EventerKind, GithubEventer};
use crate::framework::{self, Framework, FrameworkConfig, LogResource, MetricsResource, RetryResource};
use crate::healthz::Healthz;
use crate::installer::helm::HelmInstallerConfig;
use crate::installer::{HelmInstaller, Installer, InstallerKind};
use crate::notifier::slack::{SlackClient, SlackNotifierConfig};
use crate::notifier::{Notifier, NotifierKind, SlackNotifier};
use crate::operator::{Operator, OperatorConfig, RESYNC_PERIOD};
use crate::resource::{DeleteSemantics, ProjectResource};
use crate::resource::project::ProjectResourceConfig;

#[derive(Clone, Debug, Default)]
pub struct ConfigurerSettings {
    pub configmap_key: String,
    pub configmap_name: String,
    pub configmap_namespace: String,
    pub file_path: String,
    pub secret_key: String,
    pub secret_name: String,
    pub secret_namespace: String,
    /// Comma separated list of configurer types to activate.
    pub types: String,
}

#[derive(Clone, Debug, Default)]
pub struct EventerSettings {
    pub kind: String,
    pub environment: String,
    pub github_oauth_token: String,
    pub github_organisation: String,
}

#[derive(Clone, Debug, Default)]
pub struct InstallerSettings {
    pub kind: String,
    pub helm_binary_path: String,
    pub helm_organisation: String,
    pub helm_password: String,
    pub helm_registry: String,
    pub helm_username: String,
    pub helm_command_timeout: Duration,
}

#[derive(Clone, Debug, Default)]
pub struct KubernetesSettings {
    pub address: String,
    pub in_cluster: bool,
    pub tls_ca_file: String,
    pub tls_crt_file: String,
    pub tls_key_file: String,
}

#[derive(Clone, Debug, Default)]
pub struct NotifierSettings {
    pub kind: String,
    pub slack_channel: String,
    pub slack_emoji: String,
    pub slack_token: String,
    pub slack_username: String,
}

#[derive(Clone, Debug, Default)]
pub struct Settings {
    pub configurer: ConfigurerSettings,
    pub eventer: EventerSettings,
    pub http_client_timeout: Duration,
    pub installer: InstallerSettings,
    pub kubernetes: KubernetesSettings,
    pub notifier: NotifierSettings,
    pub project_delete_semantics: DeleteSemantics,
}

type WrappedProjectResource = MetricsResource<RetryResource<LogResource<ProjectResource>>>;

pub struct Service {
    healthz: Healthz,
    operator: Operator<WrappedProjectResource>,
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("healthz", &self.healthz)
            .field("operator", &self.operator)
            .finish()
    }
}

impl Service {
    pub async fn new(settings: Settings) -> Result<Service> {
        if settings.http_client_timeout.is_zero() {
            return Err(Error::invalid_config(
                "http client timeout must be greater than zero",
            ));
        }

        let client = kubernetes_client(&settings.kubernetes).await?;

        // GitHub rejects requests that carry no User-Agent.
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("draughtsman-operator/", env!("CARGO_PKG_VERSION")))
            .timeout(settings.http_client_timeout)
            .build()?;

        let notifier: Arc<dyn Notifier> = match settings.notifier.kind.parse::<NotifierKind>()? {
            NotifierKind::Slack => {
                let slack_client =
                    SlackClient::new(http_client.clone(), settings.notifier.slack_token.clone())?;

                Arc::new(
                    SlackNotifier::new(SlackNotifierConfig {
                        slack_client,
                        channel: settings.notifier.slack_channel.clone(),
                        emoji: settings.notifier.slack_emoji.clone(),
                        environment: settings.eventer.environment.clone(),
                        username: settings.notifier.slack_username.clone(),
                    })
                    .await?,
                )
            }
        };

        let configurers = configurers(&settings.configurer, &client)?;

        let installer: Arc<dyn Installer> = match settings.installer.kind.parse::<InstallerKind>()? {
            InstallerKind::Helm => Arc::new(
                HelmInstaller::new(HelmInstallerConfig {
                    configurers,
                    helm_binary_path: PathBuf::from(&settings.installer.helm_binary_path),
                    organisation: settings.installer.helm_organisation.clone(),
                    password: settings.installer.helm_password.clone(),
                    registry: settings.installer.helm_registry.clone(),
                    username: settings.installer.helm_username.clone(),
                    command_timeout: settings.installer.helm_command_timeout,
                })
                .await?,
            ),
        };

        let eventer: Arc<dyn Eventer> = match settings.eventer.kind.parse::<EventerKind>()? {
            EventerKind::Github => Arc::new(GithubEventer::new(GithubEventerConfig {
                client: http_client,
                oauth_token: settings.eventer.github_oauth_token.clone(),
                organisation: settings.eventer.github_organisation.clone(),
            })?),
        };

        let project_resource = ProjectResource::new(ProjectResourceConfig {
            eventer,
            installer,
            notifier,
            delete_semantics: settings.project_delete_semantics,
        })?;

        // Retries sit inside the metrics layer, so observed durations and
        // attempt counts include them.
        let resources = framework::wrap(vec![project_resource], ExponentialBackoff::default());

        let framework = Framework::new(FrameworkConfig {
            resources,
            backoff: error_loop_policy(),
        })?;

        let operator = Operator::new(OperatorConfig {
            client: client.clone(),
            framework,
            boot_backoff: error_loop_policy(),
            resync_period: RESYNC_PERIOD,
        })?;

        Ok(Service {
            healthz: Healthz::new(client),
            operator,
        })
    }

    /// Probes the cluster, then starts the operator. Runs until process
    /// termination.
    pub async fn boot(&self) {
        if let Err(err) = self.healthz.check().await {
            warn!("kubernetes api health probe failed: {}", err);
        }

        self.operator.boot().await;
    }
}

fn configurers(
    settings: &ConfigurerSettings,
    client: &kube::Client,
) -> Result<Vec<Arc<dyn Configurer>>> {
    configurer::parse_kinds(&settings.types)?
        .into_iter()
        .map(|kind| -> Result<Arc<dyn Configurer>> {
            match kind {
                ConfigurerKind::ConfigMap => {
                    Ok(Arc::new(ConfigMapConfigurer::new(ConfigMapConfigurerConfig {
                        client: client.clone(),
                        key: settings.configmap_key.clone(),
                        name: settings.configmap_name.clone(),
                        namespace: settings.configmap_namespace.clone(),
                    })?))
                }
                ConfigurerKind::Secret => {
                    Ok(Arc::new(SecretConfigurer::new(SecretConfigurerConfig {
                        client: client.clone(),
                        key: settings.secret_key.clone(),
                        name: settings.secret_name.clone(),
                        namespace: settings.secret_namespace.clone(),
                    })?))
                }
                ConfigurerKind::File => Ok(Arc::new(FileConfigurer::new(FileConfigurerConfig {
                    path: PathBuf::from(&settings.file_path),
                })?)),
            }
        })
        .collect()
}

pub async fn kubernetes_client(settings: &KubernetesSettings) -> Result<kube::Client> {
    let config = if settings.in_cluster || settings.address.is_empty() {
        debug!("inferring kubernetes config");
        kube::Config::infer()
            .await
            .map_err(|err| Error::invalid_config(format!("error inferring kubernetes config: {}", err)))?
    } else {
        debug!("connecting to kubernetes at '{}'", settings.address);

        let non_empty = |s: &String| {
            if s.is_empty() {
                None
            } else {
                Some(s.clone())
            }
        };

        let kubeconfig = Kubeconfig {
            clusters: vec![NamedCluster {
                name: "default".to_string(),
                cluster: Some(Cluster {
                    server: Some(settings.address.clone()),
                    certificate_authority: non_empty(&settings.tls_ca_file),
                    ..Cluster::default()
                }),
            }],
            auth_infos: vec![NamedAuthInfo {
                name: "default".to_string(),
                auth_info: Some(AuthInfo {
                    client_certificate: non_empty(&settings.tls_crt_file),
                    client_key: non_empty(&settings.tls_key_file),
                    ..AuthInfo::default()
                }),
            }],
            contexts: vec![NamedContext {
                name: "default".to_string(),
                context: Some(Context {
                    cluster: "default".to_string(),
                    user: "default".to_string(),
                    ..Context::default()
                }),
            }],
            current_context: Some("default".to_string()),
            ..Kubeconfig::default()
        };

        kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .map_err(|err| {
                Error::invalid_config(format!("error building kubernetes config: {}", err))
            })?
    };

    Ok(kube::Client::try_from(config)?)
}
