//! Operator configuration
//!
//! Read from `CHILD_OPERATOR_*` environment variables at startup.

use std::path::PathBuf;
use std::time::Duration;

use crate::crd::StrategyKind;
use crate::error::{Error, Result};
use crate::policy::{Policy, PolicyProfiles};

/// Field manager used for server-side apply
pub const DEFAULT_FIELD_MANAGER: &str = "child-resource-operator";

/// Default child name prefix
pub const DEFAULT_CHILD_PREFIX: &str = "example-resource";

/// Default requeue delay after a successful pass
pub const DEFAULT_REQUEUE_SECS: u64 = 5;

/// Default metrics port
pub const DEFAULT_METRICS_PORT: u16 = 8080;

const ENV_STRATEGIES: &str = "CHILD_OPERATOR_STRATEGIES";
const ENV_FIELD_MANAGER: &str = "CHILD_OPERATOR_FIELD_MANAGER";
const ENV_REQUEUE_SECS: &str = "CHILD_OPERATOR_REQUEUE_SECS";
const ENV_METRICS_PORT: &str = "CHILD_OPERATOR_METRICS_PORT";
const ENV_CHILD_PREFIX: &str = "CHILD_OPERATOR_CHILD_PREFIX";
const ENV_PROFILES_PATH: &str = "CHILD_OPERATOR_PROFILES_PATH";
const ENV_DRY_RUN: &str = "CHILD_OPERATOR_DRY_RUN";

/// Where child resources are kept
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    /// The cluster, through the Kubernetes API
    Kube,
    /// An in-process store; parents are still watched on the cluster
    Memory,
}

/// Operator-wide settings
#[derive(Clone, Debug, PartialEq)]
pub struct OperatorConfig {
    /// Strategies to reconcile children with, one child per strategy
    pub strategies: Vec<StrategyKind>,
    /// Field manager identity for server-side apply
    pub field_manager: String,
    /// Delay before the next pass after a successful one
    pub requeue_after: Duration,
    /// Port of the metrics server
    pub metrics_port: u16,
    /// Prefix for child resource names
    pub child_prefix: String,
    /// Optional YAML file overriding the policy profiles
    pub profiles_path: Option<PathBuf>,
    /// Keep child resources in process instead of writing them to the cluster
    pub dry_run: bool,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            strategies: StrategyKind::ALL.to_vec(),
            field_manager: DEFAULT_FIELD_MANAGER.to_string(),
            requeue_after: Duration::from_secs(DEFAULT_REQUEUE_SECS),
            metrics_port: DEFAULT_METRICS_PORT,
            child_prefix: DEFAULT_CHILD_PREFIX.to_string(),
            profiles_path: None,
            dry_run: false,
        }
    }
}

impl OperatorConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let value = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(raw) = value(ENV_STRATEGIES) {
            config.strategies = parse_strategies(&raw)?;
        }
        if let Some(manager) = value(ENV_FIELD_MANAGER) {
            config.field_manager = manager.trim().to_string();
        }
        if let Some(raw) = value(ENV_REQUEUE_SECS) {
            let secs: u64 = raw.trim().parse().map_err(|e| {
                Error::config(format!("Invalid {} '{}': {}", ENV_REQUEUE_SECS, raw, e))
            })?;
            if secs == 0 {
                return Err(Error::config(format!(
                    "{} must be greater than 0",
                    ENV_REQUEUE_SECS
                )));
            }
            config.requeue_after = Duration::from_secs(secs);
        }
        if let Some(raw) = value(ENV_METRICS_PORT) {
            config.metrics_port = raw.trim().parse().map_err(|e| {
                Error::config(format!("Invalid {} '{}': {}", ENV_METRICS_PORT, raw, e))
            })?;
        }
        if let Some(prefix) = value(ENV_CHILD_PREFIX) {
            config.child_prefix = prefix.trim().to_string();
        }
        config.profiles_path = value(ENV_PROFILES_PATH).map(PathBuf::from);
        if let Some(raw) = value(ENV_DRY_RUN) {
            config.dry_run = raw.trim().parse().map_err(|e| {
                Error::config(format!("Invalid {} '{}': {}", ENV_DRY_RUN, raw, e))
            })?;
        }

        Ok(config)
    }

    pub fn store_backend(&self) -> StoreBackend {
        if self.dry_run {
            StoreBackend::Memory
        } else {
            StoreBackend::Kube
        }
    }

    /// Build the desired-state policy, reading profiles from disk if configured
    pub fn load_policy(&self) -> Result<Policy> {
        let profiles = match &self.profiles_path {
            Some(path) => PolicyProfiles::from_yaml_file(path)?,
            None => PolicyProfiles::default(),
        };
        Ok(Policy::new(profiles))
    }
}

/// Parse a comma separated strategy list, dropping duplicates
pub fn parse_strategies(raw: &str) -> Result<Vec<StrategyKind>> {
    let mut strategies = Vec::new();
    for part in raw.split(',').filter(|p| !p.trim().is_empty()) {
        let kind: StrategyKind = part.parse().map_err(Error::config)?;
        if !strategies.contains(&kind) {
            strategies.push(kind);
        }
    }
    if strategies.is_empty() {
        return Err(Error::config("At least one strategy must be configured"));
    }
    Ok(strategies)
}
