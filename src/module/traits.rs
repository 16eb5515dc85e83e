//! Module system shared types
//!
//! Lifecycle status, caller identity and the error enum used across the
//! registry, permission, audit and dispatch layers.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::module::registry::dependencies::DependencyConflict;

/// Identity the orchestrator itself uses when it issues calls.
///
/// Calls carrying this identity (or an empty one) bypass permission checks.
pub const ORCHESTRATOR_IDENTITY: &str = "shell";

/// Module lifecycle status
///
/// ```text
/// pending --load--> loading --ok--> loaded --unload--> pending
///                      \--fail--> error --load--> loading
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleStatus {
    /// Manifest registered, module code not loaded
    Pending,
    /// Load in progress (dependencies or module itself)
    Loading,
    /// Module code loaded and API registered
    Loaded,
    /// Last load attempt failed
    Error,
}

impl ModuleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleStatus::Pending => "pending",
            ModuleStatus::Loading => "loading",
            ModuleStatus::Loaded => "loaded",
            ModuleStatus::Error => "error",
        }
    }
}

impl fmt::Display for ModuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Module system errors
#[derive(Debug, Clone, Error)]
pub enum ModuleError {
    #[error("Dependency conflict: {}", format_conflicts(.0))]
    ManifestConflict(Vec<DependencyConflict>),

    #[error("Module load failed: {0}")]
    LoadFailure(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Module {0} not found or has no registered API")]
    TargetNotFound(String),

    #[error("Method {method} not found on module {module}")]
    MethodNotFound { module: String, method: String },

    #[error("{0}")]
    InvocationFailure(String),

    #[error("Invalid module manifest: {0}")]
    InvalidManifest(String),

    #[error("Module not found: {0}")]
    ModuleNotFound(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Module operation failed: {0}")]
    OperationError(String),
}

fn format_conflicts(conflicts: &[DependencyConflict]) -> String {
    conflicts
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<serde_json::Error> for ModuleError {
    fn from(e: serde_json::Error) -> Self {
        ModuleError::SerializationError(e.to_string())
    }
}

impl From<toml::de::Error> for ModuleError {
    fn from(e: toml::de::Error) -> Self {
        ModuleError::SerializationError(e.to_string())
    }
}

impl From<anyhow::Error> for ModuleError {
    fn from(e: anyhow::Error) -> Self {
        ModuleError::OperationError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&ModuleStatus::Loaded).unwrap();
        assert_eq!(json, "\"loaded\"");
        assert_eq!(ModuleStatus::Error.to_string(), "error");
    }

    #[test]
    fn test_method_not_found_message() {
        let err = ModuleError::MethodNotFound {
            module: "orders".to_string(),
            method: "refund".to_string(),
        };
        assert_eq!(err.to_string(), "Method refund not found on module orders");
    }
}
