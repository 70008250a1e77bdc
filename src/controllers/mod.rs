//! Kubernetes controllers for the parent CRD
//!
//! This module contains the controller that watches `MyResource` objects and
//! reconciles their child resources.

mod my_resource_controller;

pub use my_resource_controller::{child_keys, run as run_my_resource_controller};

use std::sync::Arc;

use kube::Client;

use tracing::warn;

use crate::config::{OperatorConfig, StoreBackend};
use crate::policy::Policy;
use crate::store::{KubeStore, MemoryStore, ResourceStore};

/// Shared context for all controllers
pub struct Context {
    /// Kubernetes client
    pub client: Client,
    /// Operator configuration
    pub config: OperatorConfig,
    /// Store the child resources live in
    pub store: Arc<dyn ResourceStore>,
    /// Desired-state policy
    pub policy: Arc<Policy>,
}

impl Context {
    /// Create a new context; children live on the cluster unless dry-running
    pub fn new(client: Client, config: OperatorConfig, policy: Policy) -> Self {
        let store: Arc<dyn ResourceStore> = match config.store_backend() {
            StoreBackend::Kube => Arc::new(KubeStore::new(client.clone())),
            StoreBackend::Memory => {
                warn!("Dry run: child resources are kept in memory only");
                Arc::new(MemoryStore::new())
            }
        };
        Self {
            store,
            client,
            config,
            policy: Arc::new(policy),
        }
    }
}
