use async_trait::async_trait;

use crate::error::{Error, Result};

pub mod helm;

pub use helm::HelmInstaller;

/// A release as the package manager sees it: no deployment event id, and
/// a ref that may be truncated by the list output.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Project {
    pub name: String,
    pub git_ref: String,
}

/// Drives the external package manager.
#[async_trait]
pub trait Installer: Send + Sync {
    /// Ensures the given project's chart is installed at the given ref.
    /// Safe to re-run: the underlying upgrade verb subsumes installation.
    async fn install(&self, project: &Project) -> Result<()>;

    /// Returns the currently deployed releases.
    async fn list(&self) -> Result<Vec<Project>>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstallerKind {
    Helm,
}

impl InstallerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstallerKind::Helm => "HelmInstaller",
        }
    }
}

impl std::str::FromStr for InstallerKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "HelmInstaller" => Ok(InstallerKind::Helm),
            other => Err(Error::invalid_config(format!(
                "installer type '{}' not implemented",
                other
            ))),
        }
    }
}
