//! In-process resource store
//!
//! Mirrors the parts of API server behaviour the strategies depend on:
//! resourceVersion-guarded updates, merge patches, and server-side apply
//! with per-manager field ownership. Every call is journaled so callers can
//! assert on the exact traffic a reconciliation produced.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ManagedFieldsEntry, Time};
use k8s_openapi::chrono::{SubsecRound, Utc};
use serde_json::Value;

use super::{unsupported_patch, ObjectKey, PatchKind, PatchSpec, ResourceStore};
use crate::crd::{MyChildResource, MyChildResourceStatus};
use crate::error::{Error, Result};
use crate::merge::merge_patch;

/// Operation recorded in the journal
#[derive(Clone, Debug, PartialEq)]
pub enum StoreOp {
    Get,
    Create,
    Update,
    Patch(PatchKind),
    PatchStatus,
}

/// One journaled store call
#[derive(Clone, Debug, PartialEq)]
pub struct StoreCall {
    pub op: StoreOp,
    pub key: ObjectKey,
    /// Object or patch body sent to the store
    pub body: Option<Value>,
}

impl StoreCall {
    /// Whether the call wrote the main resource (status writes excluded)
    pub fn is_write(&self) -> bool {
        matches!(
            self.op,
            StoreOp::Create | StoreOp::Update | StoreOp::Patch(_)
        )
    }
}

/// Failure injected into the next write
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreFailure {
    Conflict,
    Unavailable,
}

type FieldPath = Vec<String>;

#[derive(Default)]
struct Inner {
    objects: BTreeMap<ObjectKey, MyChildResource>,
    owners: BTreeMap<ObjectKey, BTreeMap<FieldPath, String>>,
    journal: Vec<StoreCall>,
    last_version: u64,
    pending_failure: Option<StoreFailure>,
}

impl Inner {
    fn next_version(&mut self) -> String {
        self.last_version += 1;
        self.last_version.to_string()
    }

    fn record(&mut self, op: StoreOp, key: &ObjectKey, body: Option<Value>) {
        self.journal.push(StoreCall {
            op,
            key: key.clone(),
            body,
        });
    }

    fn take_failure(&mut self, key: &ObjectKey) -> Result<()> {
        match self.pending_failure.take() {
            Some(StoreFailure::Conflict) => Err(Error::Conflict(key.to_string())),
            Some(StoreFailure::Unavailable) => Err(Error::StoreUnavailable(format!(
                "{}: connection refused",
                key
            ))),
            None => Ok(()),
        }
    }

    fn stored(&self, key: &ObjectKey) -> Result<&MyChildResource> {
        self.objects
            .get(key)
            .ok_or_else(|| Error::NotFound(key.to_string()))
    }

    fn insert_new(&mut self, key: &ObjectKey, mut obj: MyChildResource) -> MyChildResource {
        let version = self.next_version();
        obj.metadata.name = Some(key.name.clone());
        obj.metadata.namespace = Some(key.namespace.clone());
        obj.metadata.resource_version = Some(version.clone());
        obj.metadata.uid = Some(format!("uid-{}", version));
        obj.metadata.generation = Some(1);
        obj.metadata.creation_timestamp = Some(now());
        obj.status = None;
        self.objects.insert(key.clone(), obj.clone());
        obj
    }

    /// Store `next` as the new revision of `key`, keeping server-owned fields
    fn commit(&mut self, key: &ObjectKey, mut next: MyChildResource) -> Result<MyChildResource> {
        let stored = self.stored(key)?.clone();
        if next == stored {
            return Ok(stored);
        }

        let generation = stored.metadata.generation.unwrap_or(1);
        next.metadata.generation = Some(if next.spec != stored.spec {
            generation + 1
        } else {
            generation
        });
        next.metadata.name = stored.metadata.name.clone();
        next.metadata.namespace = stored.metadata.namespace.clone();
        next.metadata.uid = stored.metadata.uid.clone();
        next.metadata.creation_timestamp = stored.metadata.creation_timestamp.clone();
        next.status = stored.status.clone();
        next.metadata.resource_version = Some(self.next_version());

        self.objects.insert(key.clone(), next.clone());
        Ok(next)
    }
}

/// [`ResourceStore`] held entirely in memory
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A poisoned journal is still usable for inspection.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Seed an object without journaling it
    pub fn seed(&self, obj: MyChildResource) -> MyChildResource {
        let key = ObjectKey::of(&obj);
        let status = obj.status.clone();
        let mut inner = self.lock();
        let mut stored = inner.insert_new(&key, obj);
        stored.status = status;
        inner.objects.insert(key, stored.clone());
        stored
    }

    /// Current stored copy, without journaling
    pub fn object(&self, key: &ObjectKey) -> Option<MyChildResource> {
        self.lock().objects.get(key).cloned()
    }

    /// Modify a stored object as a third party would, bumping its version
    pub fn edit<F>(&self, key: &ObjectKey, f: F) -> Result<MyChildResource>
    where
        F: FnOnce(&mut MyChildResource),
    {
        let mut inner = self.lock();
        let mut next = inner.stored(key)?.clone();
        f(&mut next);
        let version = inner.next_version();
        next.metadata.resource_version = Some(version);
        inner.objects.insert(key.clone(), next.clone());
        Ok(next)
    }

    /// Fail the next create, update or patch with `failure`
    pub fn fail_next_write(&self, failure: StoreFailure) {
        self.lock().pending_failure = Some(failure);
    }

    /// Every call made so far
    pub fn calls(&self) -> Vec<StoreCall> {
        self.lock().journal.clone()
    }

    /// Number of writes to the main resource so far
    pub fn writes(&self) -> usize {
        self.lock().journal.iter().filter(|c| c.is_write()).count()
    }

    pub fn clear_calls(&self) {
        self.lock().journal.clear();
    }

    /// Field manager owning `path` (dot separated), if any
    pub fn field_owner(&self, key: &ObjectKey, path: &str) -> Option<String> {
        let path: FieldPath = path.split('.').map(str::to_string).collect();
        self.lock()
            .owners
            .get(key)
            .and_then(|owners| owners.get(&path))
            .cloned()
    }

    fn apply_merge_patch(
        inner: &mut Inner,
        key: &ObjectKey,
        body: &Value,
    ) -> Result<MyChildResource> {
        let stored = inner.stored(key)?.clone();

        let expected = body.pointer("/metadata/resourceVersion").and_then(Value::as_str);
        if let Some(expected) = expected {
            if stored.metadata.resource_version.as_deref() != Some(expected) {
                return Err(Error::Conflict(key.to_string()));
            }
        }

        let mut live = serde_json::to_value(&stored)?;
        merge_patch::apply(&mut live, &without_status(body));
        let next: MyChildResource = serde_json::from_value(live)?;
        inner.commit(key, next)
    }

    fn server_side_apply(
        inner: &mut Inner,
        key: &ObjectKey,
        manager: &str,
        force: bool,
        body: &Value,
    ) -> Result<MyChildResource> {
        let body = without_status(body);
        let applied: BTreeSet<FieldPath> = leaf_paths(&body)
            .into_iter()
            .filter(|p| !is_identity_path(p))
            .collect();

        let Some(stored) = inner.objects.get(key).cloned() else {
            let mut base = serde_json::to_value(key.skeleton())?;
            merge_patch::apply(&mut base, &body);
            let obj: MyChildResource = serde_json::from_value(base)?;
            let mut created = inner.insert_new(key, obj);
            let owners = inner.owners.entry(key.clone()).or_default();
            for path in applied {
                owners.insert(path, manager.to_string());
            }
            record_manager(&mut created, manager);
            inner.objects.insert(key.clone(), created.clone());
            return Ok(created);
        };

        let mut live = serde_json::to_value(&stored)?;
        let owners = inner.owners.entry(key.clone()).or_default().clone();

        if !force {
            for path in &applied {
                if let Some(owner) = owners.get(path) {
                    if owner != manager && value_at(&live, path) != value_at(&body, path) {
                        return Err(Error::Conflict(format!(
                            "{}: field {} is owned by {}",
                            key,
                            path.join("."),
                            owner
                        )));
                    }
                }
            }
        }

        let mut next_owners = owners.clone();
        for (path, owner) in &owners {
            if owner == manager && !applied.contains(path) {
                remove_at(&mut live, path);
                next_owners.remove(path);
            }
        }
        for path in &applied {
            next_owners.insert(path.clone(), manager.to_string());
        }

        merge_patch::apply(&mut live, &body);
        let mut next: MyChildResource = serde_json::from_value(live)?;
        next.metadata.managed_fields = stored.metadata.managed_fields.clone();
        record_manager(&mut next, manager);

        inner.owners.insert(key.clone(), next_owners);
        inner.commit(key, next)
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn get(&self, key: &ObjectKey) -> Result<Option<MyChildResource>> {
        let mut inner = self.lock();
        inner.record(StoreOp::Get, key, None);
        Ok(inner.objects.get(key).cloned())
    }

    async fn create(&self, obj: &MyChildResource) -> Result<MyChildResource> {
        let key = ObjectKey::of(obj);
        let mut inner = self.lock();
        inner.record(StoreOp::Create, &key, Some(serde_json::to_value(obj)?));
        inner.take_failure(&key)?;

        if inner.objects.contains_key(&key) {
            return Err(Error::AlreadyExists(key.to_string()));
        }
        Ok(inner.insert_new(&key, obj.clone()))
    }

    async fn update(&self, obj: &MyChildResource) -> Result<MyChildResource> {
        let key = ObjectKey::of(obj);
        let mut inner = self.lock();
        inner.record(StoreOp::Update, &key, Some(serde_json::to_value(obj)?));
        inner.take_failure(&key)?;

        let stored = inner.stored(&key)?;
        if let Some(expected) = obj.metadata.resource_version.as_deref() {
            if stored.metadata.resource_version.as_deref() != Some(expected) {
                return Err(Error::Conflict(key.to_string()));
            }
        }
        inner.commit(&key, obj.clone())
    }

    async fn patch(&self, key: &ObjectKey, patch: &PatchSpec) -> Result<MyChildResource> {
        let mut inner = self.lock();
        inner.record(
            StoreOp::Patch(patch.kind.clone()),
            key,
            Some(patch.body.clone()),
        );
        inner.take_failure(key)?;

        match &patch.kind {
            PatchKind::Merge => Self::apply_merge_patch(&mut inner, key, &patch.body),
            PatchKind::StrategicMerge => Err(unsupported_patch(key, &patch.kind)),
            PatchKind::Apply {
                field_manager,
                force,
            } => Self::server_side_apply(&mut inner, key, field_manager, *force, &patch.body),
        }
    }

    async fn patch_status(
        &self,
        key: &ObjectKey,
        status: &MyChildResourceStatus,
    ) -> Result<MyChildResource> {
        let mut inner = self.lock();
        inner.record(
            StoreOp::PatchStatus,
            key,
            Some(serde_json::json!({ "status": status })),
        );

        let mut next = inner.stored(key)?.clone();
        next.status = Some(status.clone());
        next.metadata.resource_version = Some(inner.next_version());
        inner.objects.insert(key.clone(), next.clone());
        Ok(next)
    }
}

/// API server timestamps carry second precision
fn now() -> Time {
    Time(Utc::now().trunc_subsecs(0))
}

fn without_status(body: &Value) -> Value {
    let mut body = body.clone();
    if let Value::Object(map) = &mut body {
        map.remove("status");
    }
    body
}

fn is_identity_path(path: &FieldPath) -> bool {
    matches!(
        path.iter().map(String::as_str).collect::<Vec<_>>().as_slice(),
        ["apiVersion"] | ["kind"] | ["metadata", "name"] | ["metadata", "namespace"]
    )
}

/// Paths to every non-map value; sequences count as a single leaf
fn leaf_paths(value: &Value) -> Vec<FieldPath> {
    fn walk(value: &Value, prefix: &mut FieldPath, out: &mut Vec<FieldPath>) {
        match value {
            Value::Object(map) if !map.is_empty() => {
                for (key, child) in map {
                    prefix.push(key.clone());
                    walk(child, prefix, out);
                    prefix.pop();
                }
            }
            _ => {
                if !prefix.is_empty() {
                    out.push(prefix.clone());
                }
            }
        }
    }

    let mut out = Vec::new();
    walk(value, &mut Vec::new(), &mut out);
    out
}

fn value_at<'a>(value: &'a Value, path: &FieldPath) -> Option<&'a Value> {
    path.iter().try_fold(value, |node, segment| node.get(segment))
}

fn remove_at(value: &mut Value, path: &FieldPath) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };
    let mut node = value;
    for segment in parents {
        match node.get_mut(segment) {
            Some(child) => node = child,
            None => return,
        }
    }
    if let Value::Object(map) = node {
        map.remove(last);
    }
}

fn record_manager(obj: &mut MyChildResource, manager: &str) {
    let entries = obj.metadata.managed_fields.get_or_insert_with(Vec::new);
    entries.retain(|e| e.manager.as_deref() != Some(manager));
    entries.push(ManagedFieldsEntry {
        manager: Some(manager.to_string()),
        operation: Some("Apply".to_string()),
        api_version: Some("sample.k8s-controller.ad/v1".to_string()),
        fields_type: Some("FieldsV1".to_string()),
        time: Some(now()),
        ..Default::default()
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn child(name: &str) -> MyChildResource {
        ObjectKey::new("default", name).skeleton()
    }

    #[tokio::test]
    async fn create_assigns_version_and_rejects_duplicates() {
        let store = MemoryStore::new();
        let created = store.create(&child("a")).await.unwrap();
        assert_eq!(created.metadata.resource_version.as_deref(), Some("1"));
        assert!(created.metadata.creation_timestamp.is_some());

        let err = store.create(&child("a")).await.unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn stale_update_conflicts() {
        let store = MemoryStore::new();
        let key = ObjectKey::new("default", "a");
        let read = store.create(&child("a")).await.unwrap();

        store
            .edit(&key, |obj| obj.spec.foo = "external".to_string())
            .unwrap();

        let mut stale = read.clone();
        stale.spec.foo = "mine".to_string();
        let err = store.update(&stale).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.object(&key).unwrap().spec.foo, "external");
    }

    #[tokio::test]
    async fn update_of_missing_object_is_not_found() {
        let store = MemoryStore::new();
        let err = store.update(&child("ghost")).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn merge_patch_removes_null_keys_and_ignores_status() {
        let store = MemoryStore::new();
        let key = ObjectKey::new("default", "a");
        let mut obj = child("a");
        obj.metadata.labels = Some(BTreeMap::from([
            ("keep".to_string(), "1".to_string()),
            ("drop".to_string(), "1".to_string()),
        ]));
        store.seed(obj);

        let patched = store
            .patch(
                &key,
                &PatchSpec::merge(json!({
                    "metadata": {"labels": {"drop": null}},
                    "spec": {"foo": "x"},
                    "status": {"state": "sneaky"}
                })),
            )
            .await
            .unwrap();

        let labels = patched.metadata.labels.unwrap();
        assert!(labels.contains_key("keep"));
        assert!(!labels.contains_key("drop"));
        assert_eq!(patched.spec.foo, "x");
        assert!(patched.status.is_none());
    }

    #[tokio::test]
    async fn apply_drops_fields_the_manager_stopped_setting() {
        let store = MemoryStore::new();
        let key = ObjectKey::new("default", "a");
        let body = |labels: Value| {
            json!({
                "apiVersion": "sample.k8s-controller.ad/v1",
                "kind": "MyChildResource",
                "metadata": {"name": "a", "namespace": "default", "labels": labels},
            })
        };

        store
            .patch(&key, &PatchSpec::apply("mgr", true, body(json!({"x": "1", "y": "1"}))))
            .await
            .unwrap();
        let obj = store
            .patch(&key, &PatchSpec::apply("mgr", true, body(json!({"x": "2"}))))
            .await
            .unwrap();

        let labels = obj.metadata.labels.unwrap();
        assert_eq!(labels.get("x").map(String::as_str), Some("2"));
        assert!(!labels.contains_key("y"));
        assert_eq!(
            store.field_owner(&key, "metadata.labels.x").as_deref(),
            Some("mgr")
        );
        let managers = obj.metadata.managed_fields.unwrap();
        assert_eq!(managers.len(), 1);
    }

    #[tokio::test]
    async fn strategic_merge_patch_is_rejected() {
        let store = MemoryStore::new();
        let key = ObjectKey::new("default", "a");
        store.seed(child("a"));

        let err = store
            .patch(
                &key,
                &PatchSpec {
                    kind: PatchKind::StrategicMerge,
                    body: json!({"spec": {"foo": "x"}}),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(store.object(&key).unwrap().spec.foo, "");
    }

    #[tokio::test]
    async fn apply_creates_missing_object_without_spec() {
        let store = MemoryStore::new();
        let key = ObjectKey::new("default", "y");
        let obj = store
            .patch(
                &key,
                &PatchSpec::apply(
                    "mgr",
                    true,
                    json!({
                        "apiVersion": "sample.k8s-controller.ad/v1",
                        "kind": "MyChildResource",
                        "metadata": {"name": "y", "namespace": "default"},
                    }),
                ),
            )
            .await
            .unwrap();

        assert_eq!(obj.metadata.name.as_deref(), Some("y"));
        assert_eq!(obj.spec, crate::crd::MyChildResourceSpec::default());
        assert!(store.object(&key).is_some());
    }

    #[tokio::test]
    async fn apply_without_force_conflicts_with_other_manager() {
        let store = MemoryStore::new();
        let key = ObjectKey::new("default", "a");
        let body = |value: &str| {
            json!({"metadata": {"name": "a", "namespace": "default"}, "spec": {"foo": value}})
        };

        store
            .patch(&key, &PatchSpec::apply("first", true, body("one")))
            .await
            .unwrap();

        let err = store
            .patch(&key, &PatchSpec::apply("second", false, body("two")))
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        let obj = store
            .patch(&key, &PatchSpec::apply("second", true, body("two")))
            .await
            .unwrap();
        assert_eq!(obj.spec.foo, "two");
        assert_eq!(store.field_owner(&key, "spec.foo").as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn injected_failure_hits_next_write_only() {
        let store = MemoryStore::new();
        store.fail_next_write(StoreFailure::Unavailable);

        let err = store.create(&child("a")).await.unwrap_err();
        assert!(matches!(err, Error::StoreUnavailable(_)));
        assert!(store.create(&child("a")).await.is_ok());
        assert_eq!(store.writes(), 2);
    }

    #[tokio::test]
    async fn status_writes_are_not_counted_as_writes() {
        let store = MemoryStore::new();
        let key = ObjectKey::new("default", "a");
        store.seed(child("a"));

        let obj = store
            .patch_status(
                &key,
                &MyChildResourceStatus {
                    state: "origin".to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(obj.status.unwrap().state, "origin");
        assert_eq!(store.writes(), 0);
    }
}
