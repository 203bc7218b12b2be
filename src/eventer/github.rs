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

use async_trait::async_trait;
use metrics::{counter, histogram};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::eventer::{DeploymentEvent, Eventer};

#[derive(Clone, Copy, Debug, Serialize)]
#[serde(rename_all = "lowercase")]
enum DeploymentStatusState {
    Failure,
    Success,
}

#[derive(Serialize)]
struct DeploymentStatus {
    state: DeploymentStatusState,
}

pub struct GithubEventerConfig {
    pub client: reqwest::Client,

    pub oauth_token: String,
    pub organisation: String,
}

/// An `Eventer` that closes GitHub deployment events by posting
/// deployment statuses.
#[derive(Debug)]
pub struct GithubEventer {
    client: reqwest::Client,

    oauth_token: String,
    organisation: String,
}

impl GithubEventer {
    pub fn new(config: GithubEventerConfig) -> Result<Self> {
        if config.oauth_token.is_empty() {
            return Err(Error::invalid_config("config.oauth_token must not be empty"));
        }
        if config.organisation.is_empty() {
            return Err(Error::invalid_config("config.organisation must not be empty"));
        }

        Ok(GithubEventer {
            client: config.client,
            oauth_token: config.oauth_token,
            organisation: config.organisation,
        })
    }

    async fn post_deployment_status(
        &self,
        project: &str,
        id: i64,
        state: DeploymentStatusState,
    ) -> Result<()> {
        debug!(
            "posting deployment status for project '{}' id '{}': {:?}",
            project, id, state
        );

        let url = deployment_status_url(&self.organisation, project, id);
        let start = std::time::Instant::now();

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("token {}", self.oauth_token))
            .json(&DeploymentStatus { state })
            .send()
            .await?;

        let status = response.status();

        histogram!(
            "eventer_request_duration_seconds",
            start.elapsed().as_secs_f64(),
            "method" => "POST"
        );
        counter!(
            "eventer_responses_total",
            1,
            "code" => status.as_u16().to_string()
        );

        if status != reqwest::StatusCode::CREATED {
            return Err(Error::UnexpectedStatusCode(status.as_u16()));
        }

        Ok(())
    }
}

#[async_trait]
impl Eventer for GithubEventer {
    async fn set_failed_status(&self, event: &DeploymentEvent) -> Result<()> {
        self.post_deployment_status(&event.name, event.id, DeploymentStatusState::Failure)
            .await
    }

    async fn set_success_status(&self, event: &DeploymentEvent) -> Result<()> {
        self.post_deployment_status(&event.name, event.id, DeploymentStatusState::Success)
            .await
    }
}

// https://developer.github.com/v3/repos/deployments/#create-a-deployment-status
fn deployment_status_url(organisation: &str, project: &str, id: i64) -> String {
    format!(
        "https://api.github.com/repos/{}/{}/deployments/{}/statuses",
        organisation, project, id
    )
}
