//! Shared helpers for integration tests

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use child_resource_operator::crd::{MyChildResource, StrategyKind};
use child_resource_operator::policy::{Policy, PolicyProfiles, Profile};
use child_resource_operator::reconcilers::ChildReconciler;
use child_resource_operator::store::{MemoryStore, ObjectKey, ResourceStore};
use child_resource_operator::strategies;

pub const FIELD_MANAGER: &str = "test-manager";

pub fn key(name: &str) -> ObjectKey {
    ObjectKey::new("default", name)
}

pub fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Child as left behind by the bootstrap step
pub fn bootstrapped(name: &str) -> MyChildResource {
    child_resource_operator::reconcilers::child::bootstrap_object(&key(name))
}

pub fn with_labels(mut obj: MyChildResource, pairs: &[(&str, &str)]) -> MyChildResource {
    obj.metadata.labels = Some(labels(pairs));
    obj
}

/// Policy whose profiles never set the marker label, so it always picks
/// the origin profile
pub fn static_policy() -> Policy {
    let defaults = PolicyProfiles::default();
    let origin = Profile {
        name: "steady".to_string(),
        labels: labels(&[("app", "demo"), ("tier", "backend")]),
        spec: defaults.origin.spec.clone(),
    };
    Policy::new(PolicyProfiles {
        origin: origin.clone(),
        modified: origin,
    })
}

pub fn reconciler(
    store: Arc<MemoryStore>,
    kind: StrategyKind,
    policy: Policy,
) -> ChildReconciler {
    let store: Arc<dyn ResourceStore> = store;
    ChildReconciler::new(
        store,
        strategies::for_kind(kind, FIELD_MANAGER),
        Arc::new(policy),
        Duration::from_secs(5),
    )
}

pub fn label<'a>(obj: &'a MyChildResource, name: &str) -> Option<&'a str> {
    obj.metadata
        .labels
        .as_ref()
        .and_then(|l| l.get(name))
        .map(String::as_str)
}
