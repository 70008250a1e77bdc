//! MyResource controller
//!
//! Watches MyResource objects and reconciles one child per configured
//! strategy on every pass.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use kube::{
    api::ListParams,
    runtime::{
        controller::{Action, Controller},
        watcher::Config as WatcherConfig,
    },
    Api, Client, ResourceExt,
};
use tracing::{error, info, instrument};

use crate::config::OperatorConfig;
use crate::controllers::Context;
use crate::crd::{MyResource, StrategyKind};
use crate::error::{Error, Result};
use crate::metrics;
use crate::reconcilers::ChildReconciler;
use crate::store::ObjectKey;
use crate::strategies;

/// Run the MyResource controller
pub async fn run(client: Client, context: Arc<Context>) {
    let api: Api<MyResource> = Api::all(client.clone());

    // Verify CRD is installed
    if let Err(e) = api.list(&ListParams::default().limit(1)).await {
        error!("MyResource CRD not installed: {}", e);
        return;
    }

    info!("Starting MyResource controller");

    Controller::new(api, WatcherConfig::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, context)
        .for_each(|result| async move {
            match result {
                Ok((obj, _action)) => {
                    info!(
                        name = %obj.name,
                        namespace = obj.namespace.as_deref().unwrap_or("default"),
                        "Reconciled MyResource"
                    );
                }
                Err(e) => {
                    error!(error = %e, "Reconciliation error");
                    metrics::RECONCILIATION_ERRORS
                        .with_label_values(&["MyResource"])
                        .inc();
                }
            }
        })
        .await;
}

/// Child identities a parent drives, paired with their strategy
pub fn child_keys(parent: &MyResource, config: &OperatorConfig) -> Vec<(StrategyKind, ObjectKey)> {
    let namespace = parent.namespace().unwrap_or_else(|| "default".to_string());
    let prefix = parent
        .spec
        .child_prefix
        .as_deref()
        .unwrap_or(&config.child_prefix);
    let strategies = if parent.spec.strategies.is_empty() {
        &config.strategies
    } else {
        &parent.spec.strategies
    };

    strategies
        .iter()
        .map(|kind| {
            let name = format!("{}-{}", prefix, kind.child_suffix());
            (*kind, ObjectKey::new(namespace.clone(), name))
        })
        .collect()
}

/// Main reconciliation function
#[instrument(skip(ctx), fields(name = %obj.name_any(), namespace = obj.namespace()))]
async fn reconcile(obj: Arc<MyResource>, ctx: Arc<Context>) -> Result<Action> {
    let _timer = metrics::RECONCILE_DURATION
        .with_label_values(&["MyResource"])
        .start_timer();
    metrics::RECONCILIATIONS
        .with_label_values(&["MyResource"])
        .inc();

    info!("Reconciling MyResource");

    let mut action = Action::requeue(ctx.config.requeue_after);
    for (kind, key) in child_keys(&obj, &ctx.config) {
        let reconciler = ChildReconciler::new(
            ctx.store.clone(),
            strategies::for_kind(kind, &ctx.config.field_manager),
            ctx.policy.clone(),
            ctx.config.requeue_after,
        );
        action = reconciler.reconcile(&key).await?;
    }

    Ok(action)
}

/// Error policy for the controller
fn error_policy(obj: Arc<MyResource>, error: &Error, _ctx: Arc<Context>) -> Action {
    let name = obj.name_any();
    error!(
        name = %name,
        error = %error,
        "Reconciliation failed, scheduling retry"
    );

    Action::requeue(retry_delay(error))
}

/// Delay before retrying after `error`
pub(crate) fn retry_delay(error: &Error) -> Duration {
    match error {
        Error::Config(_) | Error::Malformed { .. } => Duration::from_secs(300),
        _ => Duration::from_secs(30),
    }
}
