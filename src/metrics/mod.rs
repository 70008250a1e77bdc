//! Prometheus metrics for the Child Resource Operator
//!
//! This module exposes metrics for monitoring reconciliation traffic and
//! operator health.

mod prometheus;

pub use prometheus::*;
