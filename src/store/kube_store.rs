//! Resource store backed by the Kubernetes API

use async_trait::async_trait;
use kube::{
    api::{Patch, PatchParams, PostParams},
    Api, Client,
};
use serde_json::json;
use tracing::debug;

use super::{unsupported_patch, ObjectKey, PatchKind, PatchSpec, ResourceStore};
use crate::crd::{MyChildResource, MyChildResourceStatus};
use crate::error::{Error, Result};

/// [`ResourceStore`] over namespaced `MyChildResource` APIs
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<MyChildResource> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl ResourceStore for KubeStore {
    async fn get(&self, key: &ObjectKey) -> Result<Option<MyChildResource>> {
        self.api(&key.namespace)
            .get_opt(&key.name)
            .await
            .map_err(|e| Error::from_kube(e, &key.to_string()))
    }

    async fn create(&self, obj: &MyChildResource) -> Result<MyChildResource> {
        let key = ObjectKey::of(obj);
        debug!(key = %key, "Creating child resource");
        self.api(&key.namespace)
            .create(&PostParams::default(), obj)
            .await
            .map_err(|e| Error::from_kube(e, &key.to_string()))
    }

    async fn update(&self, obj: &MyChildResource) -> Result<MyChildResource> {
        let key = ObjectKey::of(obj);
        debug!(
            key = %key,
            resource_version = obj.metadata.resource_version.as_deref().unwrap_or_default(),
            "Replacing child resource"
        );
        self.api(&key.namespace)
            .replace(&key.name, &PostParams::default(), obj)
            .await
            .map_err(|e| Error::from_kube(e, &key.to_string()))
    }

    async fn patch(&self, key: &ObjectKey, patch: &PatchSpec) -> Result<MyChildResource> {
        debug!(key = %key, kind = patch.kind.as_str(), "Patching child resource");
        let api = self.api(&key.namespace);
        let result = match &patch.kind {
            PatchKind::Merge => {
                api.patch(&key.name, &PatchParams::default(), &Patch::Merge(&patch.body))
                    .await
            }
            PatchKind::StrategicMerge => return Err(unsupported_patch(key, &patch.kind)),
            PatchKind::Apply {
                field_manager,
                force,
            } => {
                let mut params = PatchParams::apply(field_manager);
                if *force {
                    params = params.force();
                }
                api.patch(&key.name, &params, &Patch::Apply(&patch.body))
                    .await
            }
        };
        result.map_err(|e| Error::from_kube(e, &key.to_string()))
    }

    async fn patch_status(
        &self,
        key: &ObjectKey,
        status: &MyChildResourceStatus,
    ) -> Result<MyChildResource> {
        let body = json!({ "status": status });
        self.api(&key.namespace)
            .patch_status(&key.name, &PatchParams::default(), &Patch::Merge(&body))
            .await
            .map_err(|e| Error::from_kube(e, &key.to_string()))
    }
}
