//! Convergence strategies
//!
//! Each strategy moves a child resource toward the state derived by the
//! [`Policy`] using a different write primitive:
//! - [`ReplaceStrategy`]: mutate and write the whole object back
//! - [`CoalesceStrategy`]: coalesce desired over current, then update or merge-patch
//! - [`FieldOwnedApplyStrategy`]: server-side apply under a named field manager
//! - [`AnnotationDiffStrategy`]: merge patch against the last-applied snapshot
//!
//! No strategy retries. Conflicts are surfaced and the next scheduled pass
//! re-derives the desired state from a fresh read.

mod annotation_diff;
mod coalesce;
mod field_owned;
mod replace;

pub use annotation_diff::AnnotationDiffStrategy;
pub use coalesce::{CoalesceMode, CoalesceStrategy};
pub use field_owned::{apply_payload, FieldOwnedApplyStrategy};
pub use replace::ReplaceStrategy;

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use crate::crd::{MyChildResource, StrategyKind};
use crate::error::Result;
use crate::metrics;
use crate::policy::Policy;
use crate::store::{ObjectKey, ResourceStore};

/// A convergence algorithm over a (current, desired) pair
#[async_trait]
pub trait ConvergenceStrategy: Send + Sync {
    /// Which strategy this is
    fn kind(&self) -> StrategyKind;

    /// Move the object at `key` toward the policy's desired state.
    ///
    /// `current` is the copy the caller already read, if any. Returns the
    /// object as now persisted.
    async fn converge(
        &self,
        store: &dyn ResourceStore,
        key: &ObjectKey,
        current: Option<MyChildResource>,
        policy: &Policy,
    ) -> Result<MyChildResource>;
}

/// Build the strategy for `kind`
pub fn for_kind(kind: StrategyKind, field_manager: &str) -> Box<dyn ConvergenceStrategy> {
    match kind {
        StrategyKind::Replace => Box::new(ReplaceStrategy),
        StrategyKind::CoalesceUpdate => Box::new(CoalesceStrategy::new(CoalesceMode::Update)),
        StrategyKind::CoalescePatch => Box::new(CoalesceStrategy::new(CoalesceMode::Patch)),
        StrategyKind::FieldOwnedApply => Box::new(FieldOwnedApplyStrategy::new(field_manager)),
        StrategyKind::AnnotationDiff => Box::new(AnnotationDiffStrategy),
    }
}

/// Result of the create-or-read step shared by the read-modify-write strategies
enum Obtained {
    Created(MyChildResource),
    Existing(MyChildResource),
}

/// Use `current` if given, otherwise read it; an absent object is created
/// from the policy's mutation of an empty skeleton.
async fn obtain(
    kind: StrategyKind,
    store: &dyn ResourceStore,
    key: &ObjectKey,
    current: Option<MyChildResource>,
    policy: &Policy,
) -> Result<Obtained> {
    let current = match current {
        Some(obj) => Some(obj),
        None => store.get(key).await?,
    };

    match current {
        Some(obj) => Ok(Obtained::Existing(obj)),
        None => {
            let mut obj = key.skeleton();
            policy.mutate(&mut obj);
            let created = store.create(&obj).await?;
            record_write(kind, "create");
            info!(key = %key, strategy = %kind, "Created child resource");
            Ok(Obtained::Created(created))
        }
    }
}

/// JSON form of the intent-bearing part of an object, status removed
fn intent_value(obj: &MyChildResource) -> Result<Value> {
    let mut value = serde_json::to_value(obj)?;
    if let Value::Object(map) = &mut value {
        map.remove("status");
    }
    Ok(value)
}

fn record_write(kind: StrategyKind, op: &str) {
    metrics::STORE_WRITES
        .with_label_values(&[kind.as_str(), op])
        .inc();
}

fn record_skip(kind: StrategyKind) {
    metrics::CONVERGENCE_SKIPPED
        .with_label_values(&[kind.as_str()])
        .inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn for_kind_builds_matching_strategy() {
        for kind in StrategyKind::ALL {
            assert_eq!(for_kind(kind, "mgr").kind(), kind);
        }
    }

    #[test]
    fn intent_value_drops_status() {
        let mut obj = ObjectKey::new("default", "a").skeleton();
        obj.status = Some(crate::crd::MyChildResourceStatus {
            state: "done".to_string(),
        });
        let value = intent_value(&obj).unwrap();
        assert!(value.get("status").is_none());
        assert!(value.get("spec").is_some());
    }
}
