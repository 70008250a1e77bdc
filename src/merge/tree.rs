//! Attribute tree and right-biased coalescing

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Number, Value};

use crate::error::Result;

/// Leaf value of an attribute tree
#[derive(Clone, Debug, PartialEq)]
pub enum Scalar {
    Bool(bool),
    Number(Number),
    String(String),
}

/// Generic attribute tree over a structured object
#[derive(Clone, Debug, PartialEq)]
pub enum Tree {
    Map(BTreeMap<String, Tree>),
    Sequence(Vec<Tree>),
    Scalar(Scalar),
    Null,
}

impl Tree {
    /// Convert any serializable object into a tree
    pub fn from_object<T: Serialize>(obj: &T) -> Result<Self> {
        Ok(Tree::from(serde_json::to_value(obj)?))
    }

    /// Convert the tree back into a concrete object
    pub fn into_object<T: DeserializeOwned>(self) -> Result<T> {
        Ok(serde_json::from_value(Value::from(self))?)
    }

    /// Look up a nested value by path segments
    pub fn get_path(&self, path: &[&str]) -> Option<&Tree> {
        let mut node = self;
        for segment in path {
            match node {
                Tree::Map(map) => node = map.get(*segment)?,
                _ => return None,
            }
        }
        Some(node)
    }

    /// Drop a top-level key from a map tree
    pub fn remove(&mut self, key: &str) -> Option<Tree> {
        match self {
            Tree::Map(map) => map.remove(key),
            _ => None,
        }
    }
}

impl From<Value> for Tree {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Tree::Null,
            Value::Bool(b) => Tree::Scalar(Scalar::Bool(b)),
            Value::Number(n) => Tree::Scalar(Scalar::Number(n)),
            Value::String(s) => Tree::Scalar(Scalar::String(s)),
            Value::Array(items) => Tree::Sequence(items.into_iter().map(Tree::from).collect()),
            Value::Object(map) => {
                Tree::Map(map.into_iter().map(|(k, v)| (k, Tree::from(v))).collect())
            }
        }
    }
}

impl From<Tree> for Value {
    fn from(tree: Tree) -> Self {
        match tree {
            Tree::Null => Value::Null,
            Tree::Scalar(Scalar::Bool(b)) => Value::Bool(b),
            Tree::Scalar(Scalar::Number(n)) => Value::Number(n),
            Tree::Scalar(Scalar::String(s)) => Value::String(s),
            Tree::Sequence(items) => Value::Array(items.into_iter().map(Value::from).collect()),
            Tree::Map(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect::<Map<String, Value>>(),
            ),
        }
    }
}

/// Coalesce `target` over `current`.
///
/// For every path, a value present in `target` wins; paths only present in
/// `current` keep the current value. Nested maps are merged recursively,
/// sequences and scalars are replaced wholesale. An explicit `Null` in
/// `target` removes the key from the result.
///
/// When the roots are not both maps, `target` wins outright.
pub fn coalesce(target: Tree, current: Tree) -> Tree {
    match (target, current) {
        (Tree::Map(dst), Tree::Map(src)) => Tree::Map(coalesce_maps(dst, src)),
        (target, _) => target,
    }
}

fn coalesce_maps(
    mut dst: BTreeMap<String, Tree>,
    src: BTreeMap<String, Tree>,
) -> BTreeMap<String, Tree> {
    for (key, src_value) in src {
        match dst.remove(&key) {
            None => {
                dst.insert(key, src_value);
            }
            Some(Tree::Null) => {}
            Some(Tree::Map(dst_map)) => {
                let merged = match src_value {
                    Tree::Map(src_map) => Tree::Map(coalesce_maps(dst_map, src_map)),
                    _ => Tree::Map(dst_map),
                };
                dst.insert(key, merged);
            }
            Some(dst_value) => {
                dst.insert(key, dst_value);
            }
        }
    }
    dst.retain(|_, v| !matches!(v, Tree::Null));
    dst
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tree(v: Value) -> Tree {
        Tree::from(v)
    }

    #[test]
    fn target_leaf_wins_over_current() {
        let merged = coalesce(tree(json!({"a": "new"})), tree(json!({"a": "old"})));
        assert_eq!(Value::from(merged), json!({"a": "new"}));
    }

    #[test]
    fn current_only_paths_are_retained() {
        let merged = coalesce(
            tree(json!({"labels": {"mode": "modified"}})),
            tree(json!({"labels": {"mode": "origin", "owner": "ops"}, "extra": 1})),
        );
        assert_eq!(
            Value::from(merged),
            json!({"labels": {"mode": "modified", "owner": "ops"}, "extra": 1})
        );
    }

    #[test]
    fn sequences_are_replaced_not_merged() {
        let merged = coalesce(
            tree(json!({"list": ["1", "2"]})),
            tree(json!({"list": ["1", "2", "3"]})),
        );
        assert_eq!(Value::from(merged), json!({"list": ["1", "2"]}));
    }

    #[test]
    fn null_in_target_removes_key() {
        let merged = coalesce(
            tree(json!({"a": null, "b": 2})),
            tree(json!({"a": 1, "c": 3})),
        );
        assert_eq!(Value::from(merged), json!({"b": 2, "c": 3}));
    }

    #[test]
    fn map_in_target_over_scalar_in_current_keeps_target() {
        let merged = coalesce(tree(json!({"a": {"x": 1}})), tree(json!({"a": "flat"})));
        assert_eq!(Value::from(merged), json!({"a": {"x": 1}}));
    }

    #[test]
    fn scalar_in_target_over_map_in_current_keeps_target() {
        let merged = coalesce(tree(json!({"a": "flat"})), tree(json!({"a": {"x": 1}})));
        assert_eq!(Value::from(merged), json!({"a": "flat"}));
    }

    #[test]
    fn get_path_walks_nested_maps() {
        let t = tree(json!({"metadata": {"labels": {"k": "v"}}}));
        assert_eq!(
            t.get_path(&["metadata", "labels", "k"]),
            Some(&Tree::Scalar(Scalar::String("v".into())))
        );
        assert_eq!(t.get_path(&["metadata", "missing"]), None);
    }
}
