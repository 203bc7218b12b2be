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
use k8s_openapi::api::core::v1::ConfigMap;
use metrics::histogram;

use crate::configurer::{Configurer, ConfigurerKind};
use crate::error::{Error, Result};

pub struct ConfigMapConfigurerConfig {
    pub client: kube::Client,
    pub key: String,
    pub name: String,
    pub namespace: String,
}

/// A values provider backed by a Kubernetes ConfigMap.
pub struct ConfigMapConfigurer {
    client: kube::Client,
    key: String,
    name: String,
    namespace: String,
}

impl ConfigMapConfigurer {
    pub fn new(config: ConfigMapConfigurerConfig) -> Result<Self> {
        if config.key.is_empty() {
            return Err(Error::invalid_config("config.key must not be empty"));
        }
        if config.name.is_empty() {
            return Err(Error::invalid_config("config.name must not be empty"));
        }
        if config.namespace.is_empty() {
            return Err(Error::invalid_config("config.namespace must not be empty"));
        }

        Ok(ConfigMapConfigurer {
            client: config.client,
            key: config.key,
            name: config.name,
            namespace: config.namespace,
        })
    }
}

#[async_trait]
impl Configurer for ConfigMapConfigurer {
    fn kind(&self) -> ConfigurerKind {
        ConfigurerKind::ConfigMap
    }

    async fn values(&self) -> Result<String> {
        let start = std::time::Instant::now();

        debug!(
            "fetching configuration from configmap {}/{}",
            self.namespace, self.name
        );

        let api = kube::Api::<ConfigMap>::namespaced(self.client.clone(), &self.namespace);
        let configmap = api.get(&self.name).await?;

        let values = configmap
            .data
            .as_ref()
            .and_then(|data| data.get(&self.key))
            .cloned()
            .ok_or_else(|| Error::KeyMissing {
                key: self.key.clone(),
                holder: format!("configmap {}/{}", self.namespace, self.name),
            })?;

        histogram!(
            "configurer_fetch_duration_seconds",
            start.elapsed().as_secs_f64(),
            "configurer" => ConfigurerKind::ConfigMap.as_str()
        );

        Ok(values)
    }
}
