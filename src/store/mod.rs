//! Resource store client
//!
//! The operator only needs a handful of primitives from the backing store:
//! read, create, full update with optimistic locking, and patch. They are
//! expressed by [`ResourceStore`] so strategies can run against the
//! Kubernetes API ([`KubeStore`]) or an in-process store ([`MemoryStore`]).

mod kube_store;
mod memory;

pub use kube_store::KubeStore;
pub use memory::{MemoryStore, StoreCall, StoreFailure, StoreOp};

use std::fmt;

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde_json::Value;

use crate::crd::{MyChildResource, MyChildResourceSpec, MyChildResourceStatus};
use crate::error::{Error, Result};

/// Identity of a child resource
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key of an existing object, defaulting the namespace
    pub fn of(obj: &MyChildResource) -> Self {
        Self::new(
            obj.metadata.namespace.as_deref().unwrap_or("default"),
            obj.metadata.name.as_deref().unwrap_or_default(),
        )
    }

    /// Object carrying only this identity and an empty spec
    pub fn skeleton(&self) -> MyChildResource {
        MyChildResource {
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                namespace: Some(self.namespace.clone()),
                ..Default::default()
            },
            spec: MyChildResourceSpec::default(),
            status: None,
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Patch flavours understood by the store
#[derive(Clone, Debug, PartialEq)]
pub enum PatchKind {
    /// RFC 7386 JSON merge patch
    Merge,
    /// Kubernetes strategic merge patch.
    ///
    /// Only built-in kinds support it; the API server answers 415 for custom
    /// resources, so both stores reject it for `MyChildResource` before sending.
    StrategicMerge,
    /// Server-side apply on behalf of a field manager
    Apply { field_manager: String, force: bool },
}

impl PatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatchKind::Merge => "merge",
            PatchKind::StrategicMerge => "strategic-merge",
            PatchKind::Apply { .. } => "apply",
        }
    }
}

/// Error for patch flavours a custom resource cannot take
pub(crate) fn unsupported_patch(key: &ObjectKey, kind: &PatchKind) -> Error {
    Error::config(format!(
        "{}: {} patch is not supported for custom resources",
        key,
        kind.as_str()
    ))
}

/// A patch body together with its flavour
#[derive(Clone, Debug, PartialEq)]
pub struct PatchSpec {
    pub kind: PatchKind,
    pub body: Value,
}

impl PatchSpec {
    pub fn merge(body: Value) -> Self {
        Self {
            kind: PatchKind::Merge,
            body,
        }
    }

    pub fn apply(field_manager: impl Into<String>, force: bool, body: Value) -> Self {
        Self {
            kind: PatchKind::Apply {
                field_manager: field_manager.into(),
                force,
            },
            body,
        }
    }
}

/// Backing store holding child resources.
///
/// Writes fail with [`Error::Conflict`](crate::Error::Conflict) when the
/// stored version moved since the object was read, and `create` fails with
/// [`Error::AlreadyExists`](crate::Error::AlreadyExists) for a taken name.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Read an object, `None` when it does not exist
    async fn get(&self, key: &ObjectKey) -> Result<Option<MyChildResource>>;

    /// Create a new object
    async fn create(&self, obj: &MyChildResource) -> Result<MyChildResource>;

    /// Replace an object wholesale, guarded by its resourceVersion
    async fn update(&self, obj: &MyChildResource) -> Result<MyChildResource>;

    /// Patch an object
    async fn patch(&self, key: &ObjectKey, patch: &PatchSpec) -> Result<MyChildResource>;

    /// Merge `status` into the status subresource
    async fn patch_status(
        &self,
        key: &ObjectKey,
        status: &MyChildResourceStatus,
    ) -> Result<MyChildResource>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skeleton_carries_identity_only() {
        let key = ObjectKey::new("team-a", "child");
        let obj = key.skeleton();
        assert_eq!(obj.metadata.name.as_deref(), Some("child"));
        assert_eq!(obj.metadata.namespace.as_deref(), Some("team-a"));
        assert!(obj.metadata.labels.is_none());
        assert!(obj.metadata.annotations.is_none());
        assert!(obj.status.is_none());
        assert_eq!(ObjectKey::of(&obj), key);
    }

    #[test]
    fn unsupported_patch_is_a_config_error() {
        let err = unsupported_patch(&ObjectKey::new("default", "x"), &PatchKind::StrategicMerge);
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("default/x: strategic-merge patch"));
    }

    #[test]
    fn key_displays_as_namespace_slash_name() {
        assert_eq!(ObjectKey::new("default", "x").to_string(), "default/x");
    }
}
