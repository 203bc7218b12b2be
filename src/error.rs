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

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors produced by the operator and its collaborators. Callers match on
/// behavior through the `is_*` predicates rather than on variants, so
/// wrapping layers stay agnostic of where an error originated.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("helm: {0}")]
    Helm(String),

    #[error("helm: {command} command timed out after {}s", timeout.as_secs())]
    HelmTimeout {
        command: String,
        timeout: std::time::Duration,
    },

    #[error("key '{key}' not found in {holder}")]
    KeyMissing { key: String, holder: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("received unexpected status code: {0}")]
    UnexpectedStatusCode(u16),

    #[error("deployment event id '{0}' is not a number")]
    MalformedEventId(String),

    #[error("slack: {0}")]
    Slack(String),

    #[error(transparent)]
    Kube(#[from] kube::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Error::InvalidConfig(message.into())
    }

    pub fn helm(message: impl Into<String>) -> Self {
        Error::Helm(message.into())
    }

    pub fn is_invalid_config(&self) -> bool {
        matches!(self, Error::InvalidConfig(_))
    }

    pub fn is_helm(&self) -> bool {
        matches!(self, Error::Helm(_) | Error::HelmTimeout { .. })
    }

    pub fn is_key_missing(&self) -> bool {
        matches!(self, Error::KeyMissing { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    pub fn is_unexpected_status_code(&self) -> bool {
        matches!(self, Error::UnexpectedStatusCode(_))
    }

    /// Permanent errors recur on every attempt until the offending input
    /// changes, so the retry layer refuses to back off on them.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Error::InvalidConfig(_) | Error::MalformedEventId(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn helm_timeout_matches_the_helm_kind() {
        let err = Error::HelmTimeout {
            command: "install".to_string(),
            timeout: std::time::Duration::from_secs(300),
        };

        assert!(err.is_helm());
        assert!(!err.is_permanent());
    }

    #[test]
    fn malformed_event_id_is_permanent() {
        let err = Error::MalformedEventId("af1234".to_string());

        assert!(err.is_permanent());
        assert!(!err.is_helm());
    }
}
