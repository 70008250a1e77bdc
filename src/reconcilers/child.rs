//! Child resource reconciler
//!
//! Drives one reconciliation pass for a child resource:
//! - Bootstrap: create the child if absent and stop for this pass
//! - Evaluate the policy against the freshly read child
//! - Delegate convergence to the configured strategy
//! - Record the converged profile in `status.state`
//!
//! Nothing here retries. Errors go back to the scheduler, which decides when
//! the next pass runs.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use kube::{runtime::controller::Action, ResourceExt};
use tracing::{debug, info, instrument, warn};

use crate::crd::{MyChildResource, MyChildResourceStatus};
use crate::error::{Error, Result};
use crate::metrics;
use crate::policy::{Decision, Policy};
use crate::store::{ObjectKey, ResourceStore};
use crate::strategies::ConvergenceStrategy;

/// Label put on a freshly bootstrapped child
pub const BOOTSTRAP_LABEL: &str = "init-label";

/// Annotation put on a freshly bootstrapped child
pub const BOOTSTRAP_ANNOTATION: &str = "init-annotation";

/// Reconciles single child resources with one strategy
pub struct ChildReconciler {
    store: Arc<dyn ResourceStore>,
    strategy: Box<dyn ConvergenceStrategy>,
    policy: Arc<Policy>,
    requeue_after: Duration,
}

impl ChildReconciler {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        strategy: Box<dyn ConvergenceStrategy>,
        policy: Arc<Policy>,
        requeue_after: Duration,
    ) -> Self {
        Self {
            store,
            strategy,
            policy,
            requeue_after,
        }
    }

    pub fn strategy(&self) -> &dyn ConvergenceStrategy {
        self.strategy.as_ref()
    }

    /// Run one pass for `key`, returning when to run the next one
    #[instrument(skip(self, key), fields(key = %key, strategy = %self.strategy.kind()))]
    pub async fn reconcile(&self, key: &ObjectKey) -> Result<Action> {
        let kind = self.strategy.kind();

        let Some(current) = self.ensure_exists(key).await? else {
            metrics::CHILD_PASSES
                .with_label_values(&[kind.as_str(), "bootstrapped"])
                .inc();
            return Ok(Action::requeue(self.requeue_after));
        };

        let profile = match self.policy.decide(current.labels()) {
            Decision::Apply(profile) => Some(profile.name.clone()),
            Decision::Freeze => {
                debug!("Child is frozen by skip label, desired state equals current");
                None
            }
        };

        let converged = match self
            .strategy
            .converge(self.store.as_ref(), key, Some(current), &self.policy)
            .await
        {
            Ok(obj) => obj,
            Err(e) => {
                let outcome = if e.is_conflict() { "conflict" } else { "failed" };
                metrics::CHILD_PASSES
                    .with_label_values(&[kind.as_str(), outcome])
                    .inc();
                warn!(error = %e, "Convergence failed");
                return Err(e);
            }
        };

        if let Some(state) = profile {
            self.record_state(key, &converged, state).await?;
        }

        metrics::CHILD_PASSES
            .with_label_values(&[kind.as_str(), "converged"])
            .inc();
        Ok(Action::requeue(self.requeue_after))
    }

    /// Read the child, creating it with bootstrap metadata when absent.
    ///
    /// Returns `None` when the child was (or was concurrently) created in this
    /// pass; convergence starts on the next one.
    async fn ensure_exists(&self, key: &ObjectKey) -> Result<Option<MyChildResource>> {
        if let Some(current) = self.store.get(key).await? {
            return Ok(Some(current));
        }

        match self.store.create(&bootstrap_object(key)).await {
            Ok(_) => {
                info!("Created child resource with bootstrap metadata");
                metrics::BOOTSTRAPS
                    .with_label_values(&[key.namespace.as_str()])
                    .inc();
                Ok(None)
            }
            Err(Error::AlreadyExists(_)) => {
                debug!("Child created concurrently, converging next pass");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn record_state(
        &self,
        key: &ObjectKey,
        converged: &MyChildResource,
        state: String,
    ) -> Result<()> {
        let recorded = converged.status.as_ref().map(|s| s.state.as_str());
        if recorded == Some(state.as_str()) {
            return Ok(());
        }
        self.store
            .patch_status(key, &MyChildResourceStatus { state })
            .await?;
        Ok(())
    }
}

/// The object created when a child is first found missing
pub fn bootstrap_object(key: &ObjectKey) -> MyChildResource {
    let mut obj = key.skeleton();
    obj.metadata.labels = Some(BTreeMap::from([(
        BOOTSTRAP_LABEL.to_string(),
        "yes".to_string(),
    )]));
    obj.metadata.annotations = Some(BTreeMap::from([(
        BOOTSTRAP_ANNOTATION.to_string(),
        "yes".to_string(),
    )]));
    obj
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::MyChildResourceSpec;

    #[test]
    fn bootstrap_object_has_init_metadata_and_empty_spec() {
        let obj = bootstrap_object(&ObjectKey::new("default", "x"));
        assert_eq!(obj.labels().get(BOOTSTRAP_LABEL).map(String::as_str), Some("yes"));
        assert_eq!(
            obj.annotations().get(BOOTSTRAP_ANNOTATION).map(String::as_str),
            Some("yes")
        );
        assert_eq!(obj.spec, MyChildResourceSpec::default());
        assert!(obj.status.is_none());
    }
}
