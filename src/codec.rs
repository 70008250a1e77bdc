//! Last-applied state codec
//!
//! Serializes the intent-bearing part of a [`MyChildResource`] (identity,
//! labels, annotations and spec) into the snapshot string stored in the
//! [`SNAPSHOT_ANNOTATION`] annotation, and reads it back.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;
use serde::{Deserialize, Serialize};

use crate::crd::{MyChildResource, MyChildResourceSpec};
use crate::error::{Error, Result};

/// Annotation holding the last-applied snapshot
pub const SNAPSHOT_ANNOTATION: &str = "manifest_applied";

#[derive(Serialize)]
struct SnapshotRef<'a> {
    metadata: SnapshotMetaRef<'a>,
    spec: &'a MyChildResourceSpec,
}

#[derive(Serialize)]
struct SnapshotMetaRef<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    labels: BTreeMap<&'a str, &'a str>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    annotations: BTreeMap<&'a str, &'a str>,
}

#[derive(Deserialize)]
struct Snapshot {
    #[serde(default)]
    metadata: ObjectMeta,
    #[serde(default)]
    spec: MyChildResourceSpec,
}

/// Encode a resource into its snapshot string.
///
/// Status, server-populated bookkeeping and the snapshot annotation itself
/// are never part of the encoding. Maps are ordered, so equal intent always
/// encodes to the same string.
pub fn encode(obj: &MyChildResource) -> Result<String> {
    let snapshot = SnapshotRef {
        metadata: SnapshotMetaRef {
            name: obj.metadata.name.as_deref(),
            namespace: obj.metadata.namespace.as_deref(),
            labels: obj
                .labels()
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect(),
            annotations: obj
                .annotations()
                .iter()
                .filter(|(k, _)| k.as_str() != SNAPSHOT_ANNOTATION)
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect(),
        },
        spec: &obj.spec,
    };
    Ok(serde_json::to_string(&snapshot)?)
}

/// Decode a snapshot string back into a resource.
///
/// An empty string yields a zero-value resource. Anything else that is not a
/// valid snapshot fails with [`Error::Malformed`].
pub fn decode(snapshot: &str) -> Result<MyChildResource> {
    if snapshot.is_empty() {
        return Ok(empty_resource(ObjectMeta::default()));
    }

    let decoded: Snapshot = serde_json::from_str(snapshot)
        .map_err(|e| Error::malformed(SNAPSHOT_ANNOTATION, e.to_string()))?;

    let mut obj = empty_resource(decoded.metadata);
    obj.spec = decoded.spec;
    Ok(obj)
}

/// Read the snapshot recorded on a live resource, empty when absent
pub fn recorded(obj: &MyChildResource) -> &str {
    obj.annotations()
        .get(SNAPSHOT_ANNOTATION)
        .map(String::as_str)
        .unwrap_or_default()
}

fn empty_resource(metadata: ObjectMeta) -> MyChildResource {
    MyChildResource {
        metadata,
        spec: MyChildResourceSpec::default(),
        status: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::MyChildResourceStatus;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
    use k8s_openapi::chrono::{TimeZone, Utc};

    fn resource() -> MyChildResource {
        let mut obj = MyChildResource::new(
            "child",
            MyChildResourceSpec {
                foo: "foo".to_string(),
                foo_map: BTreeMap::from([("key1".to_string(), "value1".to_string())]),
                foo_list: vec!["1".to_string(), "2".to_string()],
                foo_value_default: String::new(),
            },
        );
        obj.metadata.namespace = Some("default".to_string());
        obj.metadata.labels = Some(BTreeMap::from([(
            "test-mode".to_string(),
            "origin".to_string(),
        )]));
        obj
    }

    #[test]
    fn encode_excludes_status() {
        let mut obj = resource();
        obj.status = Some(MyChildResourceStatus {
            state: "modified".to_string(),
        });

        let encoded = encode(&obj).unwrap();
        assert!(!encoded.contains("status"));
        assert!(!encoded.contains("modified"));
    }

    #[test]
    fn encode_excludes_snapshot_annotation_and_bookkeeping() {
        let mut obj = resource();
        obj.metadata.annotations = Some(BTreeMap::from([
            (SNAPSHOT_ANNOTATION.to_string(), "{\"old\":true}".to_string()),
            ("team".to_string(), "core".to_string()),
        ]));
        obj.metadata.resource_version = Some("42".to_string());
        obj.metadata.uid = Some("abc-123".to_string());
        obj.metadata.creation_timestamp =
            Some(Time(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()));

        let encoded = encode(&obj).unwrap();
        assert!(!encoded.contains(SNAPSHOT_ANNOTATION));
        assert!(!encoded.contains("resourceVersion"));
        assert!(!encoded.contains("abc-123"));
        assert!(!encoded.contains("creationTimestamp"));
        assert!(encoded.contains("\"team\":\"core\""));
    }

    #[test]
    fn encode_is_deterministic() {
        assert_eq!(encode(&resource()).unwrap(), encode(&resource()).unwrap());
    }

    #[test]
    fn decode_restores_intent() {
        let obj = resource();
        let decoded = decode(&encode(&obj).unwrap()).unwrap();

        assert_eq!(decoded.metadata.name.as_deref(), Some("child"));
        assert_eq!(decoded.metadata.namespace.as_deref(), Some("default"));
        assert_eq!(decoded.metadata.labels, obj.metadata.labels);
        assert_eq!(decoded.spec, obj.spec);
        assert!(decoded.status.is_none());
    }

    #[test]
    fn decode_empty_is_zero_value() {
        let decoded = decode("").unwrap();
        assert!(decoded.metadata.name.is_none());
        assert_eq!(decoded.spec, MyChildResourceSpec::default());
    }

    #[test]
    fn decode_malformed_fails_closed() {
        let err = decode("{not json").unwrap_err();
        assert!(matches!(err, Error::Malformed { .. }));

        let err = decode("[1, 2]").unwrap_err();
        assert!(matches!(err, Error::Malformed { .. }));
    }

    #[test]
    fn recorded_reads_annotation() {
        let mut obj = resource();
        assert_eq!(recorded(&obj), "");

        obj.metadata.annotations = Some(BTreeMap::from([(
            SNAPSHOT_ANNOTATION.to_string(),
            "snap".to_string(),
        )]));
        assert_eq!(recorded(&obj), "snap");
    }
}
