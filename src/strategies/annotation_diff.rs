//! Annotation-diff patch strategy
//!
//! Client-side three-way merge in the style of `kubectl apply`: the desired
//! intent of each pass is recorded in the snapshot annotation, and the next
//! pass patches only the difference between the recorded and the new intent.

use async_trait::async_trait;
use kube::ResourceExt;
use tracing::{debug, info};

use super::{intent_value, record_skip, record_write, ConvergenceStrategy};
use crate::codec::{self, SNAPSHOT_ANNOTATION};
use crate::crd::{MyChildResource, StrategyKind};
use crate::error::{Error, Result};
use crate::merge::merge_patch;
use crate::policy::Policy;
use crate::store::{ObjectKey, PatchSpec, ResourceStore};

/// Writes only when the policy's own intent changes between passes,
/// regardless of drift on the live object.
#[derive(Clone, Copy, Debug, Default)]
pub struct AnnotationDiffStrategy;

#[async_trait]
impl ConvergenceStrategy for AnnotationDiffStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::AnnotationDiff
    }

    async fn converge(
        &self,
        store: &dyn ResourceStore,
        key: &ObjectKey,
        current: Option<MyChildResource>,
        policy: &Policy,
    ) -> Result<MyChildResource> {
        let current = match current {
            Some(obj) => obj,
            None => store
                .get(key)
                .await?
                .ok_or_else(|| Error::NotFound(key.to_string()))?,
        };

        let mut desired = policy.desired(key, &current);
        let desired_state = codec::encode(&desired)?;
        desired
            .annotations_mut()
            .insert(SNAPSHOT_ANNOTATION.to_string(), desired_state.clone());

        let current_state = codec::recorded(&current);
        if desired_state == current_state {
            debug!(key = %key, "Last-applied state unchanged, nothing to patch");
            record_skip(self.kind());
            return Ok(current);
        }

        let original = codec::decode(current_state)?;
        let patch = merge_patch::create(&intent_value(&original)?, &intent_value(&desired)?);

        let written = store.patch(key, &PatchSpec::merge(patch)).await?;
        record_write(self.kind(), "patch");
        info!(key = %key, strategy = %self.kind(), "Patched child from last-applied state");
        Ok(written)
    }
}
