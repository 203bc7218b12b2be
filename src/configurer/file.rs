use std::path::PathBuf;

use async_trait::async_trait;

use crate::configurer::{Configurer, ConfigurerKind};
use crate::error::{Error, Result};

pub struct FileConfigurerConfig {
    pub path: PathBuf,
}

/// A values provider backed by a local file, for running outside a
/// cluster or supplying operator-managed overrides.
#[derive(Debug)]
pub struct FileConfigurer {
    path: PathBuf,
}

impl FileConfigurer {
    pub fn new(config: FileConfigurerConfig) -> Result<Self> {
        if config.path.as_os_str().is_empty() {
            return Err(Error::invalid_config("config.path must not be empty"));
        }

        Ok(FileConfigurer { path: config.path })
    }
}

#[async_trait]
impl Configurer for FileConfigurer {
    fn kind(&self) -> ConfigurerKind {
        ConfigurerKind::File
    }

    async fn values(&self) -> Result<String> {
        debug!("reading configuration from file {}", self.path.display());

        let values = tokio::fs::read_to_string(&self.path).await?;

        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn construction_requires_a_path() {
        let err = FileConfigurer::new(FileConfigurerConfig {
            path: PathBuf::new(),
        })
        .unwrap_err();

        assert!(err.is_invalid_config());
    }

    #[tokio::test]
    async fn values_returns_the_file_contents() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "Installation:\n  V1:\n    Secret: {{}}\n").unwrap();

        let configurer = FileConfigurer::new(FileConfigurerConfig {
            path: file.path().to_path_buf(),
        })
        .unwrap();

        let values = configurer.values().await.unwrap();

        assert!(values.starts_with("Installation:"));
    }
}
