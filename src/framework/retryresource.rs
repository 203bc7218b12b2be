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
use crate::framework::{Patch, Resource};

/// Wraps every contract call in a bounded exponential backoff. Each call
/// runs on a fresh schedule; exhaustion surfaces the last error.
/// Permanent errors skip the schedule entirely.
pub struct RetryResource<R> {
    inner: R,
    policy: ExponentialBackoff,
}

impl<R: Resource> RetryResource<R> {
    pub fn new(inner: R, policy: ExponentialBackoff) -> Self {
        RetryResource { inner, policy }
    }

    fn notify(&self, operation: &str) -> impl Fn(&Error, std::time::Duration) + '_ {
        let name = self.inner.name().to_string();
        let operation = operation.to_string();
        move |err, interval| {
            warn!(
                "resource '{}': retrying {} in {:.1}s due to error: {}",
                name,
                operation,
                interval.as_secs_f64(),
                err
            )
        }
    }
}

#[async_trait]
impl<R: Resource> Resource for RetryResource<R> {
    type Current = R::Current;
    type Desired = R::Desired;
    type Change = R::Change;

    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn current_state(&self, obj: &DraughtsmanDeployment) -> Result<Self::Current> {
        retry_notify(
            &self.policy,
            || self.inner.current_state(obj),
            self.notify("current state"),
        )
        .await
    }

    async fn desired_state(&self, obj: &DraughtsmanDeployment) -> Result<Self::Desired> {
        retry_notify(
            &self.policy,
            || self.inner.desired_state(obj),
            self.notify("desired state"),
        )
        .await
    }

    async fn update_patch(
        &self,
        obj: &DraughtsmanDeployment,
        current: &Self::Current,
        desired: &Self::Desired,
    ) -> Result<Patch<Self::Change>> {
        retry_notify(
            &self.policy,
            || self.inner.update_patch(obj, current, desired),
            self.notify("update patch"),
        )
        .await
    }

    async fn delete_patch(
        &self,
        obj: &DraughtsmanDeployment,
        current: &Self::Current,
        desired: &Self::Desired,
    ) -> Result<Patch<Self::Change>> {
        retry_notify(
            &self.policy,
            || self.inner.delete_patch(obj, current, desired),
            self.notify("delete patch"),
        )
        .await
    }

    async fn apply_create_change(
        &self,
        obj: &DraughtsmanDeployment,
        change: &Self::Change,
    ) -> Result<()> {
        retry_notify(
            &self.policy,
            || self.inner.apply_create_change(obj, change),
            self.notify("create change"),
        )
        .await
    }

    async fn apply_update_change(
        &self,
        obj: &DraughtsmanDeployment,
        change: &Self::Change,
    ) -> Result<()> {
        retry_notify(
            &self.policy,
            || self.inner.apply_update_change(obj, change),
            self.notify("update change"),
        )
        .await
    }

    async fn apply_delete_change(
        &self,
        obj: &DraughtsmanDeployment,
        change: &Self::Change,
    ) -> Result<()> {
        retry_notify(
            &self.policy,
            || self.inner.apply_delete_change(obj, change),
            self.notify("delete change"),
        )
        .await
    }
}
