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
use metrics::histogram;
use serde::{Deserialize, Serialize};

use crate::deployment::Project;
use crate::error::{Error, Result};
use crate::notifier::Notifier;

// Slack's palette aliases for green and red attachments.
const GOOD_COLOUR: &str = "good";
const DANGER_COLOUR: &str = "danger";

const SUCCESS_MESSAGE: &str = "Successfully deployed";

/// One message attachment as the chat API expects it.
#[derive(Clone, Debug, Default, Serialize)]
pub struct Attachment {
    pub color: String,
    pub title: String,
    pub text: String,
    pub footer: String,
    pub mrkdwn_in: Vec<String>,
}

/// Per-message parameters: who the message appears from and what it
/// carries.
#[derive(Clone, Debug, Default, Serialize)]
pub struct PostMessageParameters {
    pub username: String,
    pub icon_emoji: String,
    pub attachments: Vec<Attachment>,
}

#[derive(Serialize)]
struct PostMessageRequest<'a> {
    channel: &'a str,
    text: &'a str,
    username: &'a str,
    icon_emoji: &'a str,
    attachments: &'a [Attachment],
}

#[derive(Deserialize)]
struct ApiResponse {
    ok: bool,
    error: Option<String>,
}

/// A minimal typed client for the two chat API calls the notifier needs.
#[derive(Debug)]
pub struct SlackClient {
    http: reqwest::Client,
    token: String,
}

impl SlackClient {
    pub fn new(http: reqwest::Client, token: String) -> Result<Self> {
        if token.is_empty() {
            return Err(Error::invalid_config("slack token must not be empty"));
        }

        Ok(SlackClient { http, token })
    }

    /// Verifies the token against the chat API.
    pub async fn auth_test(&self) -> Result<()> {
        self.call("auth.test", &serde_json::json!({})).await
    }

    pub async fn post_message(
        &self,
        channel: &str,
        text: &str,
        params: &PostMessageParameters,
    ) -> Result<()> {
        self.call(
            "chat.postMessage",
            &PostMessageRequest {
                channel,
                text,
                username: &params.username,
                icon_emoji: &params.icon_emoji,
                attachments: &params.attachments,
            },
        )
        .await
    }

    async fn call<B: Serialize>(&self, method: &str, body: &B) -> Result<()> {
        let response = self
            .http
            .post(format!("https://slack.com/api/{}", method))
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await?;

        let response: ApiResponse = response.json().await?;
        if !response.ok {
            return Err(Error::Slack(format!(
                "{} failed: {}",
                method,
                response.error.unwrap_or_else(|| "unknown error".to_string())
            )));
        }

        Ok(())
    }
}

pub struct SlackNotifierConfig {
    pub slack_client: SlackClient,

    pub channel: String,
    pub emoji: String,
    pub environment: String,
    pub username: String,
}

/// A `Notifier` that posts colored attachments to a Slack channel.
pub struct SlackNotifier {
    slack_client: SlackClient,

    channel: String,
    emoji: String,
    environment: String,
    username: String,
}

impl SlackNotifier {
    /// Validates the configuration and probes the chat API; an
    /// unauthenticated client aborts construction.
    pub async fn new(config: SlackNotifierConfig) -> Result<Self> {
        if config.channel.is_empty() {
            return Err(Error::invalid_config("config.channel must not be empty"));
        }
        if config.emoji.is_empty() {
            return Err(Error::invalid_config("config.emoji must not be empty"));
        }
        if config.environment.is_empty() {
            return Err(Error::invalid_config("config.environment must not be empty"));
        }
        if config.username.is_empty() {
            return Err(Error::invalid_config("config.username must not be empty"));
        }

        debug!("checking connection to Slack");
        config.slack_client.auth_test().await?;

        Ok(SlackNotifier {
            slack_client: config.slack_client,
            channel: config.channel,
            emoji: config.emoji,
            environment: config.environment,
            username: config.username,
        })
    }

    async fn post_message(&self, project: &Project, error_message: &str) -> Result<()> {
        let start = std::time::Instant::now();

        let success = error_message.is_empty();

        let attachment = Attachment {
            color: if success { GOOD_COLOUR } else { DANGER_COLOUR }.to_string(),
            title: message_title(project),
            text: if success {
                SUCCESS_MESSAGE.to_string()
            } else {
                failure_text(error_message)
            },
            footer: self.environment.clone(),
            mrkdwn_in: vec!["text".to_string()],
        };

        let params = PostMessageParameters {
            username: self.username.clone(),
            icon_emoji: self.emoji.clone(),
            attachments: vec![attachment],
        };

        let result = self
            .slack_client
            .post_message(&self.channel, "", &params)
            .await;

        histogram!(
            "notifier_post_duration_seconds",
            start.elapsed().as_secs_f64()
        );

        result
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn success(&self, project: &Project) -> Result<()> {
        debug!("sending success message to slack");
        self.post_message(project, "").await
    }

    async fn failed(&self, project: &Project, error_message: &str) -> Result<()> {
        debug!("sending failed message to slack");
        self.post_message(project, error_message).await
    }
}

/// Message titles carry the project name and ref, e.g. `api - 12345`.
fn message_title(project: &Project) -> String {
    format!("{} - {}", project.name, project.git_ref)
}

fn failure_text(error_message: &str) -> String {
    format!("Encountered an error ```{}```", error_message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_carries_name_and_ref() {
        let project = Project {
            id: "7".to_string(),
            name: "api".to_string(),
            git_ref: "12345".to_string(),
        };

        assert_eq!(message_title(&project), "api - 12345");
    }

    #[test]
    fn failure_text_embeds_the_error_in_a_code_block() {
        assert_eq!(
            failure_text("boom"),
            "Encountered an error ```boom```"
        );
    }

    #[test]
    fn post_message_request_serializes_the_chat_payload() {
        let params = PostMessageParameters {
            username: "draughtsman".to_string(),
            icon_emoji: ":older_man:".to_string(),
            attachments: vec![Attachment {
                color: GOOD_COLOUR.to_string(),
                title: "api - 12345".to_string(),
                text: SUCCESS_MESSAGE.to_string(),
                footer: "ghost".to_string(),
                mrkdwn_in: vec!["text".to_string()],
            }],
        };

        let body = serde_json::to_value(PostMessageRequest {
            channel: "#deployments",
            text: "",
            username: &params.username,
            icon_emoji: &params.icon_emoji,
            attachments: &params.attachments,
        })
        .unwrap();

        assert_eq!(body["channel"], "#deployments");
        assert_eq!(body["attachments"][0]["color"], "good");
        assert_eq!(body["attachments"][0]["footer"], "ghost");
        assert_eq!(body["attachments"][0]["mrkdwn_in"][0], "text");
    }

    #[test]
    fn client_construction_requires_a_token() {
        let err = SlackClient::new(reqwest::Client::new(), String::new()).unwrap_err();

        assert!(err.is_invalid_config());
    }
}
