use async_trait::async_trait;

use crate::error::{Error, Result};

pub mod github;

pub use github::GithubEventer;

/// One upstream deployment event to close with a terminal status.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeploymentEvent {
    pub id: i64,
    pub name: String,
    pub sha: String,
}

/// Reports deployment outcomes against an upstream event provider.
#[async_trait]
pub trait Eventer: Send + Sync {
    /// Marks the given event as failed upstream.
    async fn set_failed_status(&self, event: &DeploymentEvent) -> Result<()>;

    /// Marks the given event as succeeded upstream.
    async fn set_success_status(&self, event: &DeploymentEvent) -> Result<()>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventerKind {
    Github,
}

impl EventerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventerKind::Github => "GithubEventer",
        }
    }
}

impl std::str::FromStr for EventerKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "GithubEventer" => Ok(EventerKind::Github),
            other => Err(Error::invalid_config(format!(
                "eventer type '{}' not implemented",
                other
            ))),
        }
    }
}
