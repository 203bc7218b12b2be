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

use crate::backoff::{retry_notify, ExponentialBackoff};
use crate::deployment::DraughtsmanDeployment;
use crate::error::{Error, Result};

pub mod logresource;
pub mod metricsresource;
pub mod retryresource;

pub use logresource::LogResource;
pub use metricsresource::MetricsResource;
pub use retryresource::RetryResource;

/// The create/update/delete work computed for one resource in one
/// reconcile pass. Patches live for the duration of the pass only.
#[derive(Clone, Debug)]
pub struct Patch<C> {
    pub create: Option<C>,
    pub update: Option<C>,
    pub delete: Option<C>,
}

impl<C> Default for Patch<C> {
    fn default() -> Self {
        Patch {
            create: None,
            update: None,
            delete: None,
        }
    }
}

/// The reconcile contract. A resource computes current and desired state
/// from the observed custom resource, diffs them into a patch, and
/// applies the patch's changes.
///
/// Payload types are carried as associated types, so a resource and its
/// wrapping layers agree on them at compile time.
#[async_trait]
pub trait Resource: Send + Sync {
    type Current: Send + Sync;
    type Desired: Send + Sync;
    type Change: Send + Sync;

    fn name(&self) -> &str;

    async fn current_state(&self, obj: &DraughtsmanDeployment) -> Result<Self::Current>;

    async fn desired_state(&self, obj: &DraughtsmanDeployment) -> Result<Self::Desired>;

    async fn update_patch(
        &self,
        obj: &DraughtsmanDeployment,
        current: &Self::Current,
        desired: &Self::Desired,
    ) -> Result<Patch<Self::Change>>;

    async fn delete_patch(
        &self,
        obj: &DraughtsmanDeployment,
        current: &Self::Current,
        desired: &Self::Desired,
    ) -> Result<Patch<Self::Change>>;

    async fn apply_create_change(
        &self,
        obj: &DraughtsmanDeployment,
        change: &Self::Change,
    ) -> Result<()>;

    async fn apply_update_change(
        &self,
        obj: &DraughtsmanDeployment,
        change: &Self::Change,
    ) -> Result<()>;

    async fn apply_delete_change(
        &self,
        obj: &DraughtsmanDeployment,
        change: &Self::Change,
    ) -> Result<()>;
}

/// Wraps each resource in the standard layer stack, outer to inner:
/// metrics, retry, log, underlying. Retries happen inside the metrics
/// layer, so observed durations and attempt counts include them.
pub fn wrap<R: Resource>(
    resources: Vec<R>,
    retry_policy: ExponentialBackoff,
) -> Vec<MetricsResource<RetryResource<LogResource<R>>>> {
    resources
        .into_iter()
        .map(|resource| {
            MetricsResource::new(RetryResource::new(
                LogResource::new(resource),
                retry_policy.clone(),
            ))
        })
        .collect()
}

pub struct FrameworkConfig<R> {
    pub resources: Vec<R>,
    /// Schedule of the framework's own error loop around a whole pass.
    pub backoff: ExponentialBackoff,
}

/// Drives the reconcile contract over an ordered list of resources for
/// one event at a time.
#[derive(Debug)]
pub struct Framework<R> {
    resources: Vec<R>,
    backoff: ExponentialBackoff,
}

impl<R: Resource> Framework<R> {
    pub fn new(config: FrameworkConfig<R>) -> Result<Self> {
        if config.resources.is_empty() {
            return Err(Error::invalid_config("config.resources must not be empty"));
        }

        Ok(Framework {
            resources: config.resources,
            backoff: config.backoff,
        })
    }

    /// Processes a creation event. Creation events are reconciliation
    /// triggers like updates; the computed patch decides the actual work.
    pub async fn process_create(&self, obj: &DraughtsmanDeployment) -> Result<()> {
        self.with_error_loop("create", || self.reconcile(obj)).await
    }

    pub async fn process_update(&self, obj: &DraughtsmanDeployment) -> Result<()> {
        self.with_error_loop("update", || self.reconcile(obj)).await
    }

    pub async fn process_delete(&self, obj: &DraughtsmanDeployment) -> Result<()> {
        self.with_error_loop("delete", || self.teardown(obj)).await
    }

    async fn reconcile(&self, obj: &DraughtsmanDeployment) -> Result<()> {
        for resource in &self.resources {
            let current = resource.current_state(obj).await?;
            let desired = resource.desired_state(obj).await?;

            let patch = resource.update_patch(obj, &current, &desired).await?;

            if let Some(create) = &patch.create {
                resource.apply_create_change(obj, create).await?;
            }
            if let Some(update) = &patch.update {
                resource.apply_update_change(obj, update).await?;
            }
        }

        Ok(())
    }

    async fn teardown(&self, obj: &DraughtsmanDeployment) -> Result<()> {
        for resource in &self.resources {
            let current = resource.current_state(obj).await?;
            let desired = resource.desired_state(obj).await?;

            let patch = resource.delete_patch(obj, &current, &desired).await?;

            if let Some(delete) = &patch.delete {
                resource.apply_delete_change(obj, delete).await?;
            }
        }

        Ok(())
    }

    async fn with_error_loop<F, Fut>(&self, event: &str, operation: F) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<()>>,
    {
        retry_notify(&self.backoff, operation, |err, interval| {
            warn!(
                "retrying {} event processing in {:.1}s due to error: {}",
                event,
                interval.as_secs_f64(),
                err
            )
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deployment::DraughtsmanDeploymentSpec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    #[derive(Debug)]
    struct RecordingResource {
        calls: Mutex<Vec<String>>,
        current_failures: AtomicUsize,
    }

    impl RecordingResource {
        fn record(&self, call: &str) {
            self.calls.lock().unwrap().push(call.to_string());
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Resource for RecordingResource {
        type Current = Vec<String>;
        type Desired = Vec<String>;
        type Change = Vec<String>;

        fn name(&self) -> &str {
            "recording"
        }

        async fn current_state(&self, _obj: &DraughtsmanDeployment) -> Result<Vec<String>> {
            if self.current_failures.load(Ordering::SeqCst) > 0 {
                self.current_failures.fetch_sub(1, Ordering::SeqCst);
                self.record("current-state(err)");
                return Err(Error::helm("list failed"));
            }
            self.record("current-state");
            Ok(vec!["a".to_string()])
        }

        async fn desired_state(&self, _obj: &DraughtsmanDeployment) -> Result<Vec<String>> {
            self.record("desired-state");
            Ok(vec!["a".to_string(), "b".to_string()])
        }

        async fn update_patch(
            &self,
            _obj: &DraughtsmanDeployment,
            _current: &Vec<String>,
            _desired: &Vec<String>,
        ) -> Result<Patch<Vec<String>>> {
            self.record("update-patch");
            Ok(Patch {
                create: Some(vec!["b".to_string()]),
                update: Some(vec![]),
                delete: None,
            })
        }

        async fn delete_patch(
            &self,
            _obj: &DraughtsmanDeployment,
            _current: &Vec<String>,
            _desired: &Vec<String>,
        ) -> Result<Patch<Vec<String>>> {
            self.record("delete-patch");
            Ok(Patch {
                create: None,
                update: None,
                delete: Some(vec!["a".to_string()]),
            })
        }

        async fn apply_create_change(
            &self,
            _obj: &DraughtsmanDeployment,
            change: &Vec<String>,
        ) -> Result<()> {
            self.record(&format!("apply-create({})", change.join(",")));
            Ok(())
        }

        async fn apply_update_change(
            &self,
            _obj: &DraughtsmanDeployment,
            change: &Vec<String>,
        ) -> Result<()> {
            self.record(&format!("apply-update({})", change.join(",")));
            Ok(())
        }

        async fn apply_delete_change(
            &self,
            _obj: &DraughtsmanDeployment,
            change: &Vec<String>,
        ) -> Result<()> {
            self.record(&format!("apply-delete({})", change.join(",")));
            Ok(())
        }
    }

    fn quick_backoff() -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: std::time::Duration::from_millis(1),
            max_interval: std::time::Duration::from_millis(1),
            multiplier: 1.0,
            randomization_factor: 0.0,
            max_elapsed_time: Some(std::time::Duration::from_millis(100)),
            ..ExponentialBackoff::default()
        }
    }

    fn deployment() -> DraughtsmanDeployment {
        DraughtsmanDeployment::new("draughtsman", DraughtsmanDeploymentSpec::default())
    }

    #[tokio::test]
    async fn update_events_run_the_full_create_update_sequence() {
        let framework = Framework::new(FrameworkConfig {
            resources: vec![RecordingResource::default()],
            backoff: quick_backoff(),
        })
        .unwrap();

        framework.process_update(&deployment()).await.unwrap();

        assert_eq!(
            framework.resources[0].calls(),
            vec![
                "current-state",
                "desired-state",
                "update-patch",
                "apply-create(b)",
                "apply-update()",
            ]
        );
    }

    #[tokio::test]
    async fn delete_events_only_apply_the_delete_change() {
        let framework = Framework::new(FrameworkConfig {
            resources: vec![RecordingResource::default()],
            backoff: quick_backoff(),
        })
        .unwrap();

        framework.process_delete(&deployment()).await.unwrap();

        assert_eq!(
            framework.resources[0].calls(),
            vec![
                "current-state",
                "desired-state",
                "delete-patch",
                "apply-delete(a)",
            ]
        );
    }

    #[tokio::test]
    async fn the_error_loop_retries_a_failing_pass() {
        let resource = RecordingResource::default();
        resource.current_failures.store(1, Ordering::SeqCst);

        let framework = Framework::new(FrameworkConfig {
            resources: vec![resource],
            backoff: quick_backoff(),
        })
        .unwrap();

        framework.process_create(&deployment()).await.unwrap();

        let calls = framework.resources[0].calls();
        assert_eq!(calls[0], "current-state(err)");
        assert_eq!(calls[1], "current-state");
    }

    #[tokio::test]
    async fn a_framework_without_resources_is_invalid() {
        let err = Framework::<RecordingResource>::new(FrameworkConfig {
            resources: vec![],
            backoff: quick_backoff(),
        })
        .unwrap_err();

        assert!(err.is_invalid_config());
    }
}
