//! Three-way coalesce strategies
//!
//! The policy mutates a clone of the current object; the clone is then
//! coalesced over the untouched current object so fields the policy never
//! sets (including those written by third parties) survive.

use async_trait::async_trait;
use tracing::{debug, info};

use super::{intent_value, obtain, record_skip, record_write, ConvergenceStrategy, Obtained};
use crate::crd::{MyChildResource, StrategyKind};
use crate::error::Result;
use crate::merge::{coalesce, merge_patch, Tree};
use crate::policy::Policy;
use crate::store::{ObjectKey, PatchSpec, ResourceStore};

/// How the coalesced object is written back
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CoalesceMode {
    /// Full update guarded by resourceVersion
    Update,
    /// Merge patch computed against the read copy
    Patch,
}

#[derive(Clone, Copy, Debug)]
pub struct CoalesceStrategy {
    mode: CoalesceMode,
}

impl CoalesceStrategy {
    pub fn new(mode: CoalesceMode) -> Self {
        Self { mode }
    }

    /// Coalesce the policy's target over `current`
    pub fn coalesced(current: &MyChildResource, policy: &Policy) -> Result<MyChildResource> {
        let mut target = current.clone();
        policy.mutate(&mut target);

        let mut target_tree = Tree::from_object(&target)?;
        let mut current_tree = Tree::from_object(current)?;
        target_tree.remove("status");
        current_tree.remove("status");

        let mut merged: MyChildResource = coalesce(target_tree, current_tree).into_object()?;
        merged.status = current.status.clone();
        Ok(merged)
    }
}

#[async_trait]
impl ConvergenceStrategy for CoalesceStrategy {
    fn kind(&self) -> StrategyKind {
        match self.mode {
            CoalesceMode::Update => StrategyKind::CoalesceUpdate,
            CoalesceMode::Patch => StrategyKind::CoalescePatch,
        }
    }

    async fn converge(
        &self,
        store: &dyn ResourceStore,
        key: &ObjectKey,
        current: Option<MyChildResource>,
        policy: &Policy,
    ) -> Result<MyChildResource> {
        let current = match obtain(self.kind(), store, key, current, policy).await? {
            Obtained::Created(obj) => return Ok(obj),
            Obtained::Existing(obj) => obj,
        };

        let merged = Self::coalesced(&current, policy)?;

        let written = match self.mode {
            CoalesceMode::Update => {
                if merged == current {
                    debug!(key = %key, "Coalesced object unchanged");
                    record_skip(self.kind());
                    return Ok(current);
                }
                let written = store.update(&merged).await?;
                record_write(self.kind(), "update");
                written
            }
            CoalesceMode::Patch => {
                let patch = merge_patch::create(&intent_value(&current)?, &intent_value(&merged)?);
                if merge_patch::is_empty(&patch) {
                    debug!(key = %key, "Coalesced patch is empty");
                    record_skip(self.kind());
                    return Ok(current);
                }
                let written = store.patch(key, &PatchSpec::merge(patch)).await?;
                record_write(self.kind(), "patch");
                written
            }
        };

        info!(key = %key, strategy = %self.kind(), "Coalesced child resource");
        Ok(written)
    }
}
