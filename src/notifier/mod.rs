use async_trait::async_trait;

use crate::deployment::Project;
use crate::error::{Error, Result};

pub mod slack;

pub use slack::SlackNotifier;

/// Posts human readable deployment outcomes to a chat channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Announces a successful deployment of the given project.
    async fn success(&self, project: &Project) -> Result<()>;

    /// Announces a failed deployment of the given project, including the
    /// error message that caused it.
    async fn failed(&self, project: &Project, error_message: &str) -> Result<()>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NotifierKind {
    Slack,
}

impl NotifierKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotifierKind::Slack => "SlackNotifier",
        }
    }
}

impl std::str::FromStr for NotifierKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "SlackNotifier" => Ok(NotifierKind::Slack),
            other => Err(Error::invalid_config(format!(
                "notifier type '{}' not implemented",
                other
            ))),
        }
    }
}
