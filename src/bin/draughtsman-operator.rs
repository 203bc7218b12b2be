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

use std::process::exit;
use std::time::Duration;

use anyhow::Context;
use clap::{crate_version, Parser};
use env_logger::Builder;
use kube::CustomResourceExt;
use log::{debug, info, LevelFilter};

use draughtsman_operator::resource::DeleteSemantics;
use draughtsman_operator::service::{
    self, ConfigurerSettings, EventerSettings, InstallerSettings, KubernetesSettings,
    NotifierSettings, Service, Settings,
};
use draughtsman_operator::DraughtsmanDeployment;

const DESCRIPTION: &str = "In-cluster agent that handles Helm based deployments on behalf of the draughtsman deployment resource";

#[derive(Parser)]
#[command(name = "draughtsman-operator", version = crate_version!(), about = DESCRIPTION)]
struct Opts {
    /// Prints the deployment crd to stdout
    #[arg(short = 'c', long)]
    print_crd: bool,

    /// Installs the deployment crd into the cluster
    #[arg(short = 'C', long)]
    install_crd: bool,

    /// verbose level
    #[arg(short, long, default_value = "info", value_parser = ["debug", "info", "warn", "error"])]
    verbosity_level: String,

    /// Key in configmap holding values data.
    #[arg(long = "service.configurer.configmap.key", default_value = "values")]
    configurer_configmap_key: String,

    /// Name of configmap holding values data.
    #[arg(
        long = "service.configurer.configmap.name",
        default_value = "draughtsman-values-configmap"
    )]
    configurer_configmap_name: String,

    /// Namespace of configmap holding values data.
    #[arg(
        long = "service.configurer.configmap.namespace",
        default_value = "draughtsman"
    )]
    configurer_configmap_namespace: String,

    /// Path to values file.
    #[arg(long = "service.configurer.file.path", default_value = "")]
    configurer_file_path: String,

    /// Key in secret holding values data.
    #[arg(long = "service.configurer.secret.key", default_value = "values")]
    configurer_secret_key: String,

    /// Name of secret holding values data.
    #[arg(
        long = "service.configurer.secret.name",
        default_value = "draughtsman-values-secret"
    )]
    configurer_secret_name: String,

    /// Namespace of secret holding values data.
    #[arg(
        long = "service.configurer.secret.namespace",
        default_value = "draughtsman"
    )]
    configurer_secret_namespace: String,

    /// Comma separated list of configurers to use for configuration management.
    #[arg(
        long = "service.configurer.types",
        default_value = "ConfigMapConfigurer,SecretConfigurer"
    )]
    configurer_types: String,

    /// Environment name that draughtsman is running in.
    #[arg(long = "service.eventer.environment", default_value = "")]
    eventer_environment: String,

    /// OAuth token for authenticating against GitHub. Needs 'repo_deployment' scope.
    #[arg(long = "service.eventer.github.oauthToken", default_value = "")]
    eventer_github_oauth_token: String,

    /// Organisation under which to check for deployments.
    #[arg(long = "service.eventer.github.organisation", default_value = "")]
    eventer_github_organisation: String,

    /// Which eventer to use for event management.
    #[arg(long = "service.eventer.type", default_value = "GithubEventer")]
    eventer_type: String,

    /// Timeout in seconds for HTTP requests.
    #[arg(long = "service.httpclient.timeout", default_value_t = 10)]
    http_client_timeout: u64,

    /// Path to Helm binary. Needs CNR registry plugin installed.
    #[arg(long = "service.installer.helm.helmBinaryPath", default_value = "/bin/helm")]
    installer_helm_binary_path: String,

    /// Timeout in seconds for a single Helm invocation.
    #[arg(long = "service.installer.helm.commandTimeout", default_value_t = 300)]
    installer_helm_command_timeout: u64,

    /// Organisation of Helm CNR registry.
    #[arg(long = "service.installer.helm.organisation", default_value = "")]
    installer_helm_organisation: String,

    /// Password for Helm CNR registry.
    #[arg(long = "service.installer.helm.password", default_value = "")]
    installer_helm_password: String,

    /// URL for Helm CNR registry.
    #[arg(long = "service.installer.helm.registry", default_value = "quay.io")]
    installer_helm_registry: String,

    /// Username for Helm CNR registry.
    #[arg(long = "service.installer.helm.username", default_value = "")]
    installer_helm_username: String,

    /// Which installer to use for installation management.
    #[arg(long = "service.installer.type", default_value = "HelmInstaller")]
    installer_type: String,

    /// Address used to connect to Kubernetes. When empty in-cluster config is created.
    #[arg(long = "service.kubernetes.address", default_value = "http://127.0.0.1:6443")]
    kubernetes_address: String,

    /// Whether to use the in-cluster config to authenticate with Kubernetes.
    #[arg(long = "service.kubernetes.inCluster")]
    kubernetes_in_cluster: bool,

    /// Certificate authority file path to use to authenticate with Kubernetes.
    #[arg(long = "service.kubernetes.tls.caFile", default_value = "")]
    kubernetes_tls_ca_file: String,

    /// Certificate file path to use to authenticate with Kubernetes.
    #[arg(long = "service.kubernetes.tls.crtFile", default_value = "")]
    kubernetes_tls_crt_file: String,

    /// Key file path to use to authenticate with Kubernetes.
    #[arg(long = "service.kubernetes.tls.keyFile", default_value = "")]
    kubernetes_tls_key_file: String,

    /// Channel to post Slack notifications to.
    #[arg(long = "service.notifier.slack.channel", default_value = "")]
    notifier_slack_channel: String,

    /// Emoji to use for Slack notifications.
    #[arg(long = "service.notifier.slack.emoji", default_value = ":older_man:")]
    notifier_slack_emoji: String,

    /// Token to post Slack notifications with.
    #[arg(long = "service.notifier.slack.token", default_value = "")]
    notifier_slack_token: String,

    /// Username to post Slack notifications with.
    #[arg(long = "service.notifier.slack.username", default_value = "draughtsman")]
    notifier_slack_username: String,

    /// Which notifier to use for notification management.
    #[arg(long = "service.notifier.type", default_value = "SlackNotifier")]
    notifier_type: String,

    /// How the delete patch enumerates projects: 'legacy' keeps the
    /// historical behavior, 'difference' enumerates current minus desired.
    #[arg(
        long = "service.resource.project.deleteSemantics",
        default_value = "legacy",
        value_parser = ["legacy", "difference"]
    )]
    resource_project_delete_semantics: String,
}

impl Opts {
    fn settings(&self) -> anyhow::Result<Settings> {
        let delete_semantics: DeleteSemantics = self
            .resource_project_delete_semantics
            .parse()
            .context("error parsing delete semantics")?;

        Ok(Settings {
            configurer: ConfigurerSettings {
                configmap_key: self.configurer_configmap_key.clone(),
                configmap_name: self.configurer_configmap_name.clone(),
                configmap_namespace: self.configurer_configmap_namespace.clone(),
                file_path: self.configurer_file_path.clone(),
                secret_key: self.configurer_secret_key.clone(),
                secret_name: self.configurer_secret_name.clone(),
                secret_namespace: self.configurer_secret_namespace.clone(),
                types: self.configurer_types.clone(),
            },
            eventer: EventerSettings {
                kind: self.eventer_type.clone(),
                environment: self.eventer_environment.clone(),
                github_oauth_token: self.eventer_github_oauth_token.clone(),
                github_organisation: self.eventer_github_organisation.clone(),
            },
            http_client_timeout: Duration::from_secs(self.http_client_timeout),
            installer: InstallerSettings {
                kind: self.installer_type.clone(),
                helm_binary_path: self.installer_helm_binary_path.clone(),
                helm_organisation: self.installer_helm_organisation.clone(),
                helm_password: self.installer_helm_password.clone(),
                helm_registry: self.installer_helm_registry.clone(),
                helm_username: self.installer_helm_username.clone(),
                helm_command_timeout: Duration::from_secs(self.installer_helm_command_timeout),
            },
            kubernetes: KubernetesSettings {
                address: self.kubernetes_address.clone(),
                in_cluster: self.kubernetes_in_cluster,
                tls_ca_file: self.kubernetes_tls_ca_file.clone(),
                tls_crt_file: self.kubernetes_tls_crt_file.clone(),
                tls_key_file: self.kubernetes_tls_key_file.clone(),
            },
            notifier: NotifierSettings {
                kind: self.notifier_type.clone(),
                slack_channel: self.notifier_slack_channel.clone(),
                slack_emoji: self.notifier_slack_emoji.clone(),
                slack_token: self.notifier_slack_token.clone(),
                slack_username: self.notifier_slack_username.clone(),
            },
            project_delete_semantics: delete_semantics,
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opts: Opts = Opts::parse();
    let mut builder = Builder::from_default_env();

    let level = match opts.verbosity_level.as_str() {
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        _ => unreachable!(), // guarded by the clap config further up
    };

    builder
        .filter(Some("draughtsman_operator"), level)
        .init();

    info!("starting draughtsman-operator version {}", crate_version!());
    debug!("logging level set to 'debug' -- don't use this in production as it can potentially leak sensitive information");

    if opts.print_crd {
        println!(
            "# draughtsman deployment crd (auto-generated):\n{}\n",
            serde_yaml::to_string(&DraughtsmanDeployment::crd()).unwrap()
        );
        exit(0)
    }

    let settings = opts.settings()?;

    if opts.install_crd {
        info!("installing crd");
        let client = service::kubernetes_client(&settings.kubernetes).await?;
        return draughtsman_operator::install_crd(&client, &DraughtsmanDeployment::crd())
            .await
            .and(Ok(()));
    }

    let service = Service::new(settings)
        .await
        .context("error creating service")?;

    info!("starting operator");
    service.boot().await;

    Ok(())
}
