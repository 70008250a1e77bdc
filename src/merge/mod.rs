//! Structural merging over untyped resource trees
//!
//! Resources are converted to a schema-independent [`Tree`] so they can be
//! coalesced path by path, and diffed into RFC 7386 merge patches.

pub mod merge_patch;
mod tree;

pub use tree::{coalesce, Scalar, Tree};
