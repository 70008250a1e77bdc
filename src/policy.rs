//! Desired-state policy
//!
//! Derives the desired labels and spec of a child from its currently observed
//! labels. The policy toggles between two profiles based on a marker label,
//! unless the object carries the skip label, in which case the desired state
//! is the current state.

use std::collections::BTreeMap;
use std::path::Path;

use kube::ResourceExt;
use serde::{Deserialize, Serialize};

use crate::crd::{MyChildResource, MyChildResourceSpec};
use crate::error::{Error, Result};
use crate::store::ObjectKey;

/// Label whose value selects the next profile
pub const MARKER_LABEL: &str = "test-mode";

/// Label that freezes an object against programmatic convergence
pub const SKIP_LABEL: &str = "skip-change";

/// Marker value that flips the policy to the modified profile
pub const ORIGIN_MARKER: &str = "origin";

/// A named desired state: labels plus spec
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub name: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub spec: MyChildResourceSpec,
}

/// The two profiles the policy alternates between
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct PolicyProfiles {
    pub origin: Profile,
    pub modified: Profile,
}

impl PolicyProfiles {
    /// Load profiles from a YAML file
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("Failed to read profiles '{}': {}", path.display(), e))
        })?;
        serde_yaml::from_str(&raw).map_err(|e| {
            Error::config(format!("Invalid profiles file '{}': {}", path.display(), e))
        })
    }
}

impl Default for PolicyProfiles {
    fn default() -> Self {
        Self {
            origin: Profile {
                name: "origin".to_string(),
                labels: string_map(&[
                    ("test-mode", "origin"),
                    ("counter", "0"),
                    ("imOrigin", "yes"),
                ]),
                spec: MyChildResourceSpec {
                    foo: "foo".to_string(),
                    foo_map: string_map(&[("key1", "value1"), ("key2", "value1-2")]),
                    foo_list: vec!["1".to_string(), "2".to_string(), "3".to_string()],
                    foo_value_default: String::new(),
                },
            },
            modified: Profile {
                name: "modified".to_string(),
                labels: string_map(&[("test-mode", "modified"), ("counter", "0")]),
                spec: MyChildResourceSpec {
                    foo: "foo-2".to_string(),
                    foo_map: string_map(&[("key1", "value1")]),
                    foo_list: vec!["1".to_string(), "2".to_string()],
                    foo_value_default: String::new(),
                },
            },
        }
    }
}

fn string_map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Outcome of evaluating the policy against observed labels
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Decision<'a> {
    /// Desired state equals current state
    Freeze,
    /// Converge onto the given profile
    Apply(&'a Profile),
}

/// Toggle policy over two profiles
#[derive(Clone, Debug, Default)]
pub struct Policy {
    profiles: PolicyProfiles,
}

impl Policy {
    pub fn new(profiles: PolicyProfiles) -> Self {
        Self { profiles }
    }

    pub fn profiles(&self) -> &PolicyProfiles {
        &self.profiles
    }

    /// Pick the desired profile from the currently observed labels
    pub fn decide(&self, labels: &BTreeMap<String, String>) -> Decision<'_> {
        if labels.get(SKIP_LABEL).map(String::as_str) == Some("yes") {
            return Decision::Freeze;
        }
        match labels.get(MARKER_LABEL).map(String::as_str) {
            Some(ORIGIN_MARKER) => Decision::Apply(&self.profiles.modified),
            _ => Decision::Apply(&self.profiles.origin),
        }
    }

    /// Overwrite the labels and spec of `obj` in place, based on its own labels
    pub fn mutate(&self, obj: &mut MyChildResource) -> Decision<'_> {
        let decision = self.decide(labels_of(obj));
        if let Decision::Apply(profile) = decision {
            obj.metadata.labels = Some(profile.labels.clone());
            obj.spec = profile.spec.clone();
        }
        decision
    }

    /// Build a fresh desired object for `key` from the observed `current`.
    ///
    /// The result only carries identity, labels and spec; a frozen object
    /// keeps the labels and spec of `current`.
    pub fn desired(&self, key: &ObjectKey, current: &MyChildResource) -> MyChildResource {
        let (labels, spec) = match self.decide(labels_of(current)) {
            Decision::Apply(profile) => (profile.labels.clone(), profile.spec.clone()),
            Decision::Freeze => (labels_of(current).clone(), current.spec.clone()),
        };

        let mut desired = key.skeleton();
        desired.metadata.labels = Some(labels);
        desired.spec = spec;
        desired
    }
}

fn labels_of(obj: &MyChildResource) -> &BTreeMap<String, String> {
    obj.labels()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        string_map(pairs)
    }

    #[test]
    fn origin_marker_selects_modified() {
        let policy = Policy::default();
        let decision = policy.decide(&labels(&[("test-mode", "origin")]));
        assert_eq!(decision, Decision::Apply(&policy.profiles().modified));
    }

    #[test]
    fn any_other_marker_selects_origin() {
        let policy = Policy::default();
        for current in [
            labels(&[("test-mode", "modified")]),
            labels(&[("test-mode", "something-else")]),
            labels(&[]),
        ] {
            assert_eq!(
                policy.decide(&current),
                Decision::Apply(&policy.profiles().origin)
            );
        }
    }

    #[test]
    fn skip_label_freezes() {
        let policy = Policy::default();
        let decision = policy.decide(&labels(&[("skip-change", "yes"), ("test-mode", "origin")]));
        assert_eq!(decision, Decision::Freeze);

        let decision = policy.decide(&labels(&[("skip-change", "no")]));
        assert_ne!(decision, Decision::Freeze);
    }

    #[test]
    fn toggles_when_written_label_is_read_back() {
        let policy = Policy::default();
        let key = ObjectKey::new("default", "child");
        let mut obj = key.skeleton();

        policy.mutate(&mut obj);
        assert_eq!(obj.labels().get("test-mode").unwrap(), "origin");
        policy.mutate(&mut obj);
        assert_eq!(obj.labels().get("test-mode").unwrap(), "modified");
        assert_eq!(obj.spec.foo, "foo-2");
        policy.mutate(&mut obj);
        assert_eq!(obj.labels().get("test-mode").unwrap(), "origin");
    }

    #[test]
    fn desired_for_frozen_object_copies_current() {
        let policy = Policy::default();
        let key = ObjectKey::new("default", "child");
        let mut current = key.skeleton();
        current.metadata.labels = Some(labels(&[("skip-change", "yes"), ("owner", "ops")]));
        current.spec.foo = "hand-edited".to_string();
        current.metadata.resource_version = Some("7".to_string());

        let desired = policy.desired(&key, &current);
        assert_eq!(desired.metadata.labels, current.metadata.labels);
        assert_eq!(desired.spec, current.spec);
        assert!(desired.metadata.resource_version.is_none());
    }

    #[test]
    fn custom_profiles_are_injected() {
        let mut profiles = PolicyProfiles::default();
        profiles.origin.labels = labels(&[("tier", "gold")]);
        profiles.origin.spec.foo = "custom".to_string();
        let policy = Policy::new(profiles);

        let key = ObjectKey::new("default", "child");
        let desired = policy.desired(&key, &key.skeleton());
        assert_eq!(desired.labels().get("tier").unwrap(), "gold");
        assert_eq!(desired.spec.foo, "custom");
    }

    #[test]
    fn loads_profiles_from_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
origin:
  name: blue
  labels:
    test-mode: origin
  spec:
    foo: blue
modified:
  name: green
  labels:
    test-mode: modified
  spec:
    foo: green
    fooList: ["a"]
"#
        )
        .unwrap();

        let profiles = PolicyProfiles::from_yaml_file(file.path()).unwrap();
        assert_eq!(profiles.origin.name, "blue");
        assert_eq!(profiles.modified.spec.foo_list, vec!["a".to_string()]);
    }

    #[test]
    fn invalid_profiles_file_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "origin: [not, a, profile]").unwrap();

        let err = PolicyProfiles::from_yaml_file(file.path()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
