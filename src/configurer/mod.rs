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

use std::fmt;

use async_trait::async_trait;

use crate::error::{Error, Result};

pub mod configmap;
pub mod file;
pub mod secret;

pub use configmap::ConfigMapConfigurer;
pub use file::FileConfigurer;
pub use secret::SecretConfigurer;

/// The kind of a values provider. The lowercased kind also names the
/// values file the installer writes for it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigurerKind {
    ConfigMap,
    Secret,
    File,
}

impl ConfigurerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigurerKind::ConfigMap => "ConfigMapConfigurer",
            ConfigurerKind::Secret => "SecretConfigurer",
            ConfigurerKind::File => "FileConfigurer",
        }
    }
}

impl fmt::Display for ConfigurerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ConfigurerKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ConfigMapConfigurer" => Ok(ConfigurerKind::ConfigMap),
            "SecretConfigurer" => Ok(ConfigurerKind::Secret),
            "FileConfigurer" => Ok(ConfigurerKind::File),
            other => Err(Error::invalid_config(format!(
                "configurer type '{}' not implemented",
                other
            ))),
        }
    }
}

/// Parses the comma separated configurer type list from the configuration.
pub fn parse_kinds(types: &str) -> Result<Vec<ConfigurerKind>> {
    types
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::parse)
        .collect()
}

/// A values provider. Each configured provider yields one opaque values
/// blob per install.
#[async_trait]
pub trait Configurer: Send + Sync {
    fn kind(&self) -> ConfigurerKind;

    async fn values(&self) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_parse_from_a_comma_separated_list() {
        let kinds = parse_kinds("ConfigMapConfigurer,SecretConfigurer").unwrap();

        assert_eq!(kinds, vec![ConfigurerKind::ConfigMap, ConfigurerKind::Secret]);
    }

    #[test]
    fn unknown_kinds_fail_with_invalid_config() {
        let err = parse_kinds("ConfigMapConfigurer,EtcdConfigurer").unwrap_err();

        assert!(err.is_invalid_config());
    }
}
