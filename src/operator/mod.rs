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

use std::time::Duration;

use futures::{pin_mut, TryStreamExt};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, ListParams, PostParams};
use kube::runtime::watcher;
use kube::{CustomResourceExt, ResourceExt};
use tokio::sync::{Mutex, OnceCell};

use crate::backoff::{retry_notify, ExponentialBackoff};
use crate::deployment::DraughtsmanDeployment;
use crate::error::Result;
use crate::framework::{Framework, Resource};

/// Interval at which an update event is re-emitted for every live object,
/// so reconciliation converges even without an external change.
pub const RESYNC_PERIOD: Duration = Duration::from_secs(10);

pub struct OperatorConfig<R> {
    pub client: kube::Client,
    pub framework: Framework<R>,

    pub boot_backoff: ExponentialBackoff,
    pub resync_period: Duration,
}

/// Registers the custom resource, watches it, and feeds every event
/// through the framework, one reconcile pass at a time.
pub struct Operator<R> {
    client: kube::Client,
    framework: Framework<R>,

    boot_backoff: ExponentialBackoff,
    resync_period: Duration,

    boot_once: OnceCell<()>,
    // The external systems driven by a pass are not transactional and the
    // package manager must not run concurrently against overlapping
    // releases, so all callbacks share one lock.
    reconcile_mutex: Mutex<()>,
}

impl<R> std::fmt::Debug for Operator<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Operator")
            .field("resync_period", &self.resync_period)
            .finish_non_exhaustive()
    }
}

impl<R: Resource> Operator<R> {
    pub fn new(config: OperatorConfig<R>) -> Result<Self> {
        Ok(Operator {
            client: config.client,
            framework: config.framework,
            boot_backoff: config.boot_backoff,
            resync_period: config.resync_period,
            boot_once: OnceCell::new(),
            reconcile_mutex: Mutex::new(()),
        })
    }

    /// Starts the operator. Runs at most once per process; the body is
    /// retried on a bounded backoff and the process exits non-zero when
    /// the retries are spent.
    pub async fn boot(&self) {
        self.boot_once
            .get_or_init(|| async {
                let result = retry_notify(
                    &self.boot_backoff,
                    || self.boot_with_error(),
                    |err, interval| {
                        warn!(
                            "retrying operator boot in {:.1}s due to error: {}",
                            interval.as_secs_f64(),
                            err
                        )
                    },
                )
                .await;

                if let Err(err) = result {
                    error!("stopping operator boot retries due to too many errors: {}", err);
                    std::process::exit(1);
                }
            })
            .await;
    }

    async fn boot_with_error(&self) -> Result<()> {
        self.ensure_custom_resource_definition().await?;

        debug!("starting list/watch");
        self.run_informer().await
    }

    async fn ensure_custom_resource_definition(&self) -> Result<()> {
        let crds: Api<CustomResourceDefinition> = Api::all(self.client.clone());

        match crds
            .create(&PostParams::default(), &DraughtsmanDeployment::crd())
            .await
        {
            Ok(crd) => {
                info!(
                    "created custom resource definition '{}'",
                    crd.name_any()
                );
                Ok(())
            }
            Err(kube::Error::Api(response)) if response.code == 409 => {
                debug!("custom resource definition already exists");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn run_informer(&self) -> Result<()> {
        let api: Api<DraughtsmanDeployment> = Api::all(self.client.clone());

        let stream = watcher::watcher(api.clone(), watcher::Config::default());
        pin_mut!(stream);

        // The first resync is one period out; the watch delivers the
        // initial object set itself.
        let mut resync = tokio::time::interval_at(
            tokio::time::Instant::now() + self.resync_period,
            self.resync_period,
        );

        loop {
            tokio::select! {
                event = stream.try_next() => {
                    match event {
                        Ok(Some(watcher::Event::Restarted(objects))) => {
                            for object in &objects {
                                self.on_add(object).await;
                            }
                        }
                        Ok(Some(watcher::Event::Applied(object))) => {
                            self.on_update(&object).await;
                        }
                        Ok(Some(watcher::Event::Deleted(object))) => {
                            self.on_delete(&object).await;
                        }
                        Ok(None) => {
                            warn!("watch stream ended");
                            return Ok(());
                        }
                        Err(err) => {
                            warn!("watch stream error, watch will be re-established: {}", err);
                        }
                    }
                }
                _ = resync.tick() => {
                    for object in api.list(&ListParams::default()).await?.items {
                        self.on_update(&object).await;
                    }
                }
            }
        }
    }

    async fn on_add(&self, object: &DraughtsmanDeployment) {
        let _guard = self.reconcile_mutex.lock().await;

        debug!(
            "executing the operator's add callback for '{}'",
            object.name_any()
        );

        if let Err(err) = self.framework.process_create(object).await {
            error!("create event processing failed: {}", err);
        }
    }

    async fn on_update(&self, object: &DraughtsmanDeployment) {
        let _guard = self.reconcile_mutex.lock().await;

        debug!(
            "executing the operator's update callback for '{}'",
            object.name_any()
        );

        if let Err(err) = self.framework.process_update(object).await {
            error!("update event processing failed: {}", err);
        }
    }

    async fn on_delete(&self, object: &DraughtsmanDeployment) {
        let _guard = self.reconcile_mutex.lock().await;

        debug!(
            "executing the operator's delete callback for '{}'",
            object.name_any()
        );

        if let Err(err) = self.framework.process_delete(object).await {
            error!("delete event processing failed: {}", err);
        }
    }
}
