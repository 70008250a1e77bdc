//! Child Resource Operator
//!
//! This operator converges child resources toward a policy-derived desired
//! state, using one of several interchangeable update strategies.

pub mod codec;
pub mod config;
pub mod controllers;
pub mod crd;
pub mod error;
pub mod merge;
pub mod metrics;
pub mod policy;
pub mod reconcilers;
pub mod store;
pub mod strategies;

pub use error::{Error, Result};
