use async_trait::async_trait;

use crate::deployment::DraughtsmanDeployment;
use crate::error::Result;
use crate::framework::{Patch, Resource};

/// Emits a debug record on entry and exit of every contract method,
/// tagged with the wrapped resource's name.
pub struct LogResource<R> {
    inner: R,
}

impl<R> LogResource<R> {
    pub fn new(inner: R) -> Self {
        LogResource { inner }
    }
}

#[async_trait]
impl<R: Resource> Resource for LogResource<R> {
    type Current = R::Current;
    type Desired = R::Desired;
    type Change = R::Change;

    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn current_state(&self, obj: &DraughtsmanDeployment) -> Result<Self::Current> {
        debug!("resource '{}': computing current state", self.name());
        let result = self.inner.current_state(obj).await;
        debug!("resource '{}': computed current state", self.name());
        result
    }

    async fn desired_state(&self, obj: &DraughtsmanDeployment) -> Result<Self::Desired> {
        debug!("resource '{}': computing desired state", self.name());
        let result = self.inner.desired_state(obj).await;
        debug!("resource '{}': computed desired state", self.name());
        result
    }

    async fn update_patch(
        &self,
        obj: &DraughtsmanDeployment,
        current: &Self::Current,
        desired: &Self::Desired,
    ) -> Result<Patch<Self::Change>> {
        debug!("resource '{}': computing update patch", self.name());
        let result = self.inner.update_patch(obj, current, desired).await;
        debug!("resource '{}': computed update patch", self.name());
        result
    }

    async fn delete_patch(
        &self,
        obj: &DraughtsmanDeployment,
        current: &Self::Current,
        desired: &Self::Desired,
    ) -> Result<Patch<Self::Change>> {
        debug!("resource '{}': computing delete patch", self.name());
        let result = self.inner.delete_patch(obj, current, desired).await;
        debug!("resource '{}': computed delete patch", self.name());
        result
    }

    async fn apply_create_change(
        &self,
        obj: &DraughtsmanDeployment,
        change: &Self::Change,
    ) -> Result<()> {
        debug!("resource '{}': applying create change", self.name());
        let result = self.inner.apply_create_change(obj, change).await;
        debug!("resource '{}': applied create change", self.name());
        result
    }

    async fn apply_update_change(
        &self,
        obj: &DraughtsmanDeployment,
        change: &Self::Change,
    ) -> Result<()> {
        debug!("resource '{}': applying update change", self.name());
        let result = self.inner.apply_update_change(obj, change).await;
        debug!("resource '{}': applied update change", self.name());
        result
    }

    async fn apply_delete_change(
        &self,
        obj: &DraughtsmanDeployment,
        change: &Self::Change,
    ) -> Result<()> {
        debug!("resource '{}': applying delete change", self.name());
        let result = self.inner.apply_delete_change(obj, change).await;
        debug!("resource '{}': applied delete change", self.name());
        result
    }
}
