//! Reconcilers for child resources
//!
//! This module contains the business logic for converging a child resource.
//! Reconcilers are responsible for:
//! - Bootstrapping missing children
//! - Deriving the desired state and delegating to a strategy
//! - Recording the observed state in the child's status

pub mod child;

pub use child::ChildReconciler;
