//! Field-owned apply strategy (server-side apply)

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use super::{intent_value, record_write, ConvergenceStrategy};
use crate::crd::{MyChildResource, StrategyKind};
use crate::error::Result;
use crate::policy::Policy;
use crate::store::{ObjectKey, PatchSpec, ResourceStore};

/// Sends the desired object as a server-side apply under one field manager.
///
/// Ownership is always forced: the store resolves per-field conflicts in
/// favour of this manager. The manager name must stay stable across passes
/// or ownership fragments between identities.
#[derive(Clone, Debug)]
pub struct FieldOwnedApplyStrategy {
    field_manager: String,
}

impl FieldOwnedApplyStrategy {
    pub fn new(field_manager: impl Into<String>) -> Self {
        Self {
            field_manager: field_manager.into(),
        }
    }

    pub fn field_manager(&self) -> &str {
        &self.field_manager
    }
}

/// Apply body for `desired`.
///
/// Managed fields, creationTimestamp, resourceVersion and status are removed;
/// an apply payload carrying creationTimestamp produces spurious conflicts.
pub fn apply_payload(desired: &MyChildResource) -> Result<Value> {
    let mut desired = desired.clone();
    desired.metadata.managed_fields = None;
    desired.metadata.creation_timestamp = None;
    desired.metadata.resource_version = None;
    desired.status = None;
    intent_value(&desired)
}

#[async_trait]
impl ConvergenceStrategy for FieldOwnedApplyStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::FieldOwnedApply
    }

    async fn converge(
        &self,
        store: &dyn ResourceStore,
        key: &ObjectKey,
        current: Option<MyChildResource>,
        policy: &Policy,
    ) -> Result<MyChildResource> {
        let observed = match current {
            Some(obj) => obj,
            None => store.get(key).await?.unwrap_or_else(|| key.skeleton()),
        };

        let desired = policy.desired(key, &observed);
        let patch = PatchSpec::apply(&self.field_manager, true, apply_payload(&desired)?);

        let written = store.patch(key, &patch).await?;
        record_write(self.kind(), "apply");
        info!(
            key = %key,
            strategy = %self.kind(),
            field_manager = %self.field_manager,
            "Applied child resource"
        );
        Ok(written)
    }
}
