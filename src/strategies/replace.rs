//! Full replace strategy

use async_trait::async_trait;
use tracing::{debug, info};

use super::{obtain, record_skip, record_write, ConvergenceStrategy, Obtained};
use crate::crd::{MyChildResource, StrategyKind};
use crate::error::Result;
use crate::policy::Policy;
use crate::store::{ObjectKey, ResourceStore};

/// Overwrites labels and spec on the read copy and writes it back wholesale.
///
/// Last writer wins: a third-party edit landing between the read and the
/// write surfaces as a conflict, and nothing is merged.
#[derive(Clone, Copy, Debug, Default)]
pub struct ReplaceStrategy;

#[async_trait]
impl ConvergenceStrategy for ReplaceStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Replace
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

        let mut desired = current.clone();
        policy.mutate(&mut desired);

        if desired == current {
            debug!(key = %key, "Child already matches desired state");
            record_skip(self.kind());
            return Ok(current);
        }

        let written = store.update(&desired).await?;
        record_write(self.kind(), "update");
        info!(key = %key, strategy = %self.kind(), "Replaced child resource");
        Ok(written)
    }
}
