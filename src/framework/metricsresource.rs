use std::future::Future;

use async_trait::async_trait;
use metrics::{counter, histogram};

use crate::deployment::DraughtsmanDeployment;
use crate::error::Result;
use crate::framework::{Patch, Resource};

/// Records a duration histogram and an outcome counter per contract
/// method. Sits outermost in the layer stack, so observed durations
/// include retries.
pub struct MetricsResource<R> {
    inner: R,
}

impl<R: Resource> MetricsResource<R> {
    pub fn new(inner: R) -> Self {
        MetricsResource { inner }
    }

    async fn observe<T, Fut>(&self, operation: &'static str, call: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        let start = std::time::Instant::now();
        let result = call.await;

        histogram!(
            "reconcile_operation_duration_seconds",
            start.elapsed().as_secs_f64(),
            "resource" => self.inner.name().to_string(),
            "operation" => operation
        );
        counter!(
            "reconcile_operation_total",
            1,
            "resource" => self.inner.name().to_string(),
            "operation" => operation,
            "outcome" => if result.is_ok() { "success" } else { "error" }
        );

        result
    }
}

#[async_trait]
impl<R: Resource> Resource for MetricsResource<R> {
    type Current = R::Current;
    type Desired = R::Desired;
    type Change = R::Change;

    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn current_state(&self, obj: &DraughtsmanDeployment) -> Result<Self::Current> {
        self.observe("current-state", self.inner.current_state(obj))
            .await
    }

    async fn desired_state(&self, obj: &DraughtsmanDeployment) -> Result<Self::Desired> {
        self.observe("desired-state", self.inner.desired_state(obj))
            .await
    }

    async fn update_patch(
        &self,
        obj: &DraughtsmanDeployment,
        current: &Self::Current,
        desired: &Self::Desired,
    ) -> Result<Patch<Self::Change>> {
        self.observe("update-patch", self.inner.update_patch(obj, current, desired))
            .await
    }

    async fn delete_patch(
        &self,
        obj: &DraughtsmanDeployment,
        current: &Self::Current,
        desired: &Self::Desired,
    ) -> Result<Patch<Self::Change>> {
        self.observe("delete-patch", self.inner.delete_patch(obj, current, desired))
            .await
    }

    async fn apply_create_change(
        &self,
        obj: &DraughtsmanDeployment,
        change: &Self::Change,
    ) -> Result<()> {
        self.observe(
            "apply-create-change",
            self.inner.apply_create_change(obj, change),
        )
        .await
    }

    async fn apply_update_change(
        &self,
        obj: &DraughtsmanDeployment,
        change: &Self::Change,
    ) -> Result<()> {
        self.observe(
            "apply-update-change",
            self.inner.apply_update_change(obj, change),
        )
        .await
    }

    async fn apply_delete_change(
        &self,
        obj: &DraughtsmanDeployment,
        change: &Self::Change,
    ) -> Result<()> {
        self.observe(
            "apply-delete-change",
            self.inner.apply_delete_change(obj, change),
        )
        .await
    }
}
