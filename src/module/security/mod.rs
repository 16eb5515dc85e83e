//! Access control for cross-module calls
//!
//! Per-module allow-lists declared in manifests, plus global allow-lists
//! applied to every caller.

pub mod permissions;

pub use permissions::{PermissionDecision, PermissionsManager};
