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

use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics::{counter, histogram};
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::process::Command;

use crate::configurer::Configurer;
use crate::error::{Error, Result};
use crate::installer::{Installer, Project};

/// Matches the leading ref portion of the last dash separated segment of a
/// chart identifier. Rows whose chart carries no such segment (for
/// instance plain semver charts) yield an empty ref.
static REF_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new("^[0-9a-z]{3,}").unwrap());

pub struct HelmInstallerConfig {
    pub configurers: Vec<Arc<dyn Configurer>>,

    pub helm_binary_path: PathBuf,
    pub organisation: String,
    pub password: String,
    pub registry: String,
    pub username: String,
    /// Upper bound for a single helm invocation; expiry maps to the helm
    /// error kind.
    pub command_timeout: Duration,
}

/// An `Installer` that shells out to Helm with the CNR registry plugin.
pub struct HelmInstaller {
    configurers: Vec<Arc<dyn Configurer>>,

    helm_binary_path: PathBuf,
    organisation: String,
    registry: String,
    command_timeout: Duration,
}

impl std::fmt::Debug for HelmInstaller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HelmInstaller")
            .field("configurers_count", &self.configurers.len())
            .field("helm_binary_path", &self.helm_binary_path)
            .field("organisation", &self.organisation)
            .field("registry", &self.registry)
            .field("command_timeout", &self.command_timeout)
            .finish()
    }
}

impl HelmInstaller {
    /// Validates the configuration and logs into the chart registry. A
    /// failing login aborts construction.
    pub async fn new(config: HelmInstallerConfig) -> Result<Self> {
        if config.helm_binary_path.as_os_str().is_empty() {
            return Err(Error::invalid_config(
                "config.helm_binary_path must not be empty",
            ));
        }
        if config.organisation.is_empty() {
            return Err(Error::invalid_config("config.organisation must not be empty"));
        }
        if config.password.is_empty() {
            return Err(Error::invalid_config("config.password must not be empty"));
        }
        if config.registry.is_empty() {
            return Err(Error::invalid_config("config.registry must not be empty"));
        }
        if config.username.is_empty() {
            return Err(Error::invalid_config("config.username must not be empty"));
        }

        if tokio::fs::metadata(&config.helm_binary_path).await.is_err() {
            return Err(Error::invalid_config(format!(
                "helm binary path '{}' does not exist",
                config.helm_binary_path.display()
            )));
        }

        let installer = HelmInstaller {
            configurers: config.configurers,

            helm_binary_path: config.helm_binary_path,
            organisation: config.organisation,
            registry: config.registry,
            command_timeout: config.command_timeout,
        };

        installer
            .login(&config.username, &config.password)
            .await?;

        Ok(installer)
    }

    async fn login(&self, username: &str, password: &str) -> Result<()> {
        debug!(
            "logging into registry '{}' as user '{}'",
            self.registry, username
        );

        self.run_helm_command(
            "login",
            [
                "registry".to_string(),
                "login".to_string(),
                format!("--user={}", username),
                format!("--password={}", password),
                self.registry.clone(),
            ],
        )
        .await?;

        Ok(())
    }

    /// Runs one helm invocation and returns its combined output. Failure
    /// is a non-zero exit, a timeout, or the substring "Error" anywhere in
    /// the combined output. Helm reports some failures on stdout with a
    /// zero exit code, hence the substring check.
    async fn run_helm_command<I>(&self, name: &str, args: I) -> Result<String>
    where
        I: IntoIterator,
        I::Item: AsRef<OsStr>,
    {
        debug!("running helm command '{}'", name);

        let start = std::time::Instant::now();

        let mut command = Command::new(&self.helm_binary_path);
        command.args(args);

        let output = tokio::time::timeout(self.command_timeout, command.output())
            .await
            .map_err(|_| Error::HelmTimeout {
                command: name.to_string(),
                timeout: self.command_timeout,
            })??;

        histogram!(
            "helm_command_duration_seconds",
            start.elapsed().as_secs_f64(),
            "command" => name.to_string()
        );

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        debug!("ran helm command '{}'", name);

        if !output.status.success() {
            counter!("helm_command_errors_total", 1, "command" => name.to_string());
            return Err(Error::helm(format!(
                "{} command failed ({}): {}",
                name, output.status, combined
            )));
        }

        if combined.contains("Error") {
            counter!("helm_command_errors_total", 1, "command" => name.to_string());
            return Err(Error::helm(combined));
        }

        Ok(combined)
    }

    /// Builds the registry address of a versioned chart, e.g.
    /// `quay.io/giantswarm/api-chart@1.0.0-12345`.
    fn versioned_chart_name(&self, project: &Project) -> String {
        format!(
            "{}/{}/{}-chart@1.0.0-{}",
            self.registry, self.organisation, project.name, project.git_ref
        )
    }

    /// Builds the file name the registry plugin writes the pulled chart
    /// to, e.g. `giantswarm_api-chart_1.0.0-12345.tar.gz`.
    fn tarball_name(&self, project: &Project) -> String {
        format!(
            "{}_{}-chart_1.0.0-{}.tar.gz",
            self.organisation, project.name, project.git_ref
        )
    }
}

#[async_trait]
impl Installer for HelmInstaller {
    async fn install(&self, project: &Project) -> Result<()> {
        debug!(
            "ensuring chart is installed: name '{}' ref '{}'",
            project.name, project.git_ref
        );

        // All values files and the tarball land in one scratch dir whose
        // guard removes it again on every exit path.
        let scratch = tempfile::Builder::new()
            .prefix("draughtsman-operator-helm-installer")
            .tempdir()?;

        let tarball_path = scratch.path().join(self.tarball_name(project));
        {
            self.run_helm_command(
                "pull",
                [
                    OsStr::new("registry"),
                    OsStr::new("pull"),
                    OsStr::new("--dest"),
                    scratch.path().as_os_str(),
                    OsStr::new("--tarball"),
                    OsStr::new(&self.versioned_chart_name(project)),
                ],
            )
            .await?;

            if tokio::fs::metadata(&tarball_path).await.is_err() {
                return Err(Error::helm(format!(
                    "could not find downloaded tarball at '{}'",
                    tarball_path.display()
                )));
            }

            debug!("downloaded chart tarball '{}'", tarball_path.display());
        }

        // One values file per configurer, each becoming a --values
        // argument of the upgrade invocation.
        let mut values_args: Vec<String> = Vec::new();
        for configurer in &self.configurers {
            let file_name = scratch.path().join(format!(
                "{}-values.yaml",
                configurer.kind().as_str().to_lowercase()
            ));
            let values = configurer.values().await?;

            tokio::fs::write(&file_name, values).await?;

            values_args.push("--values".to_string());
            values_args.push(file_name.to_string_lossy().into_owned());
        }

        // helm upgrade --install --values ${file1} --values ${file2} ${project} ${tarball_path}
        let mut install_args: Vec<String> =
            vec!["upgrade".to_string(), "--install".to_string()];
        install_args.extend(values_args);
        install_args.push(project.name.clone());
        install_args.push(tarball_path.to_string_lossy().into_owned());

        self.run_helm_command("install", install_args).await?;

        Ok(())
    }

    async fn list(&self) -> Result<Vec<Project>> {
        let output = self.run_helm_command("list", ["list"]).await?;

        Ok(parse_releases(&output))
    }
}

/// Parses the whitespace-columnar release listing.
///
/// The ref is taken from the last dash separated segment of the chart
/// column and may be truncated there; callers must treat it as a
/// potentially incomplete prefix of the deployed ref.
fn parse_releases(output: &str) -> Vec<Project> {
    let mut list = Vec::new();

    for line in output.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() >= 2 && fields[0] == "NAME" && fields[1] == "REVISION" {
            continue;
        }

        // Column nine is the chart identifier; rows that are too short to
        // carry one are ignored.
        let chart = match fields.get(8) {
            Some(chart) => *chart,
            None => continue,
        };

        let last_segment = chart.split('-').last().unwrap_or("");
        let git_ref = REF_PATTERN
            .find(last_segment)
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();

        list.push(Project {
            name: fields[0].to_string(),
            git_ref,
        });
    }

    list
}
