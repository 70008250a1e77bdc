//! MyChildResource Custom Resource Definition
//!
//! The convergence target. Only `metadata` and `spec` take part in
//! convergence; `status` is observed state written by the operator.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// MyChildResource specification
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "sample.k8s-controller.ad",
    version = "v1",
    kind = "MyChildResource",
    plural = "mychildresources",
    singular = "mychildresource",
    namespaced,
    status = "MyChildResourceStatus",
    derive = "PartialEq",
    printcolumn = r#"{"name": "State", "type": "string", "jsonPath": ".status.state"}"#,
    printcolumn = r#"{"name": "Foo", "type": "string", "jsonPath": ".spec.foo"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct MyChildResourceSpec {
    /// Scalar field
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub foo: String,

    /// Mapping field
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    #[schemars(default = "default_foo_map")]
    pub foo_map: BTreeMap<String, String>,

    /// Ordered sequence field
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub foo_list: Vec<String>,

    /// Scalar field defaulted by the API server
    #[serde(default, skip_serializing_if = "String::is_empty")]
    #[schemars(default = "default_foo_value_default")]
    pub foo_value_default: String,
}

fn default_foo_map() -> BTreeMap<String, String> {
    BTreeMap::new()
}

fn default_foo_value_default() -> String {
    "ho-ho-ho".to_string()
}

/// MyChildResource status
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MyChildResourceStatus {
    /// Observed state, set once the child has converged onto a profile
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub state: String,
}
