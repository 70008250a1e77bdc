//! MyResource Custom Resource Definition
//!
//! The parent object whose reconciliation drives the child resources.

use std::fmt;
use std::str::FromStr;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// MyResource specification
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "sample.k8s-controller.ad",
    version = "v1",
    kind = "MyResource",
    plural = "myresources",
    singular = "myresource",
    namespaced,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct MyResourceSpec {
    /// Strategies to converge children with (empty = operator default)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub strategies: Vec<StrategyKind>,

    /// Prefix for child resource names (defaults to the operator setting)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub child_prefix: Option<String>,
}

/// Convergence strategy used to move a child toward its desired state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    /// Overwrite labels and spec, then write the whole object back
    Replace,
    /// Coalesce desired over current, then write the whole object back
    CoalesceUpdate,
    /// Coalesce desired over current, then send a merge patch
    CoalescePatch,
    /// Server-side apply with a named field manager
    FieldOwnedApply,
    /// Merge patch computed against the last-applied snapshot annotation
    AnnotationDiff,
}

impl StrategyKind {
    /// Every strategy, in the order children are reconciled
    pub const ALL: [StrategyKind; 5] = [
        StrategyKind::FieldOwnedApply,
        StrategyKind::CoalesceUpdate,
        StrategyKind::Replace,
        StrategyKind::CoalescePatch,
        StrategyKind::AnnotationDiff,
    ];

    /// Wire name of the strategy
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Replace => "replace",
            StrategyKind::CoalesceUpdate => "coalesce-update",
            StrategyKind::CoalescePatch => "coalesce-patch",
            StrategyKind::FieldOwnedApply => "field-owned-apply",
            StrategyKind::AnnotationDiff => "annotation-diff",
        }
    }

    /// Suffix appended to the child name prefix
    pub fn child_suffix(&self) -> &'static str {
        match self {
            StrategyKind::Replace => "update-replace",
            StrategyKind::CoalesceUpdate => "update-current",
            StrategyKind::CoalescePatch => "patch-current",
            StrategyKind::FieldOwnedApply => "ssa",
            StrategyKind::AnnotationDiff => "patch-suggested",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StrategyKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s.trim())
            .ok_or_else(|| {
                format!(
                    "Invalid strategy '{}': must be one of: replace, coalesce-update, \
                     coalesce-patch, field-owned-apply, annotation-diff",
                    s
                )
            })
    }
}
