//! Permission model for cross-module calls
//!
//! Decides whether a calling module may invoke a method on a target module,
//! using each module's declared allow-lists plus process-wide global lists.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use tracing::{debug, warn};

use crate::module::registry::manifest::{ModuleManifest, PermissionsConfig};
use crate::module::traits::ORCHESTRATOR_IDENTITY;

/// Outcome of a permission check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionDecision {
    pub allowed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl PermissionDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    fn deny(reason: String) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
        }
    }
}

/// Permission manager for validating cross-module access
pub struct PermissionsManager {
    /// Module-specific permission declarations (module name -> config)
    module_permissions: RwLock<HashMap<String, PermissionsConfig>>,
    /// Targets every caller may reach
    global_allowed_modules: RwLock<HashSet<String>>,
    /// Methods (`method` or `target.method`) every caller may invoke
    global_allowed_actions: RwLock<HashSet<String>>,
}

impl PermissionsManager {
    pub fn new() -> Self {
        Self {
            module_permissions: RwLock::new(HashMap::new()),
            global_allowed_modules: RwLock::new(HashSet::new()),
            global_allowed_actions: RwLock::new(HashSet::new()),
        }
    }

    /// Register module-specific permissions
    pub fn register_module_permissions(&self, module: &str, permissions: PermissionsConfig) {
        debug!(
            "Registering permissions for module {}: {:?}",
            module, permissions
        );
        self.module_permissions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(module.to_string(), permissions);
    }

    pub fn remove_module_permissions(&self, module: &str) {
        self.module_permissions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(module);
    }

    pub fn get_permissions(&self, module: &str) -> Option<PermissionsConfig> {
        self.module_permissions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(module)
            .cloned()
    }

    /// Replace the global module allow-list
    pub fn set_global_allowed_modules<I, S>(&self, modules: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self
            .global_allowed_modules
            .write()
            .unwrap_or_else(|e| e.into_inner()) = modules.into_iter().map(Into::into).collect();
    }

    /// Replace the global action allow-list
    pub fn set_global_allowed_actions<I, S>(&self, actions: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self
            .global_allowed_actions
            .write()
            .unwrap_or_else(|e| e.into_inner()) = actions.into_iter().map(Into::into).collect();
    }

    /// Check whether `caller` may invoke `target.method`.
    ///
    /// First matching rule decides: trusted host identity, global lists,
    /// unconfigured caller, module allow-list, action allow-list, allow.
    pub fn can_call_module(&self, caller: &str, target: &str, method: &str) -> PermissionDecision {
        if caller.is_empty() || caller == ORCHESTRATOR_IDENTITY {
            return PermissionDecision::allow();
        }

        let qualified = format!("{}.{}", target, method);
        if self
            .global_allowed_modules
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains(target)
        {
            return PermissionDecision::allow();
        }
        {
            let actions = self
                .global_allowed_actions
                .read()
                .unwrap_or_else(|e| e.into_inner());
            if actions.contains(method) || actions.contains(&qualified) {
                return PermissionDecision::allow();
            }
        }

        let configs = self
            .module_permissions
            .read()
            .unwrap_or_else(|e| e.into_inner());
        let Some(config) = configs.get(caller) else {
            warn!("Module {} has no permissions configured; denying call to {}", caller, qualified);
            return PermissionDecision::deny(format!(
                "Module '{}' has no permissions configured",
                caller
            ));
        };

        if let Some(allowed_modules) = &config.allowed_modules {
            if !allowed_modules.iter().any(|p| matches_module(p, target)) {
                warn!("Module {} denied access to module {}", caller, target);
                return PermissionDecision::deny(format!(
                    "Module '{}' is not allowed to call module '{}'",
                    caller, target
                ));
            }
        }

        if let Some(allowed_actions) = &config.allowed_actions {
            if !allowed_actions
                .iter()
                .any(|a| a == "*" || a == method || *a == qualified)
            {
                warn!("Module {} denied action {}", caller, qualified);
                return PermissionDecision::deny(format!(
                    "Module '{}' is not allowed to call '{}'",
                    caller, qualified
                ));
            }
        }

        debug!("Module {} granted access to {}", caller, qualified);
        PermissionDecision::allow()
    }

    /// Whether the module declared it needs an authenticated session
    pub fn requires_auth(&self, module: &str) -> bool {
        self.get_permissions(module)
            .map(|p| p.requires_auth)
            .unwrap_or(false)
    }

    /// Advisory warnings for overly broad permission requests
    pub fn validate_manifest_permissions(manifest: &ModuleManifest) -> Vec<String> {
        let mut warnings = Vec::new();
        let Some(permissions) = &manifest.permissions else {
            return warnings;
        };

        if permissions
            .allowed_modules
            .as_ref()
            .is_some_and(|m| m.iter().any(|p| p == "*"))
        {
            warnings.push(format!(
                "Module '{}' requests access to all modules (*)",
                manifest.name
            ));
        }
        if permissions
            .allowed_actions
            .as_ref()
            .is_some_and(|a| a.iter().any(|p| p == "*"))
        {
            warnings.push(format!(
                "Module '{}' requests access to all actions (*)",
                manifest.name
            ));
        }
        warnings
    }
}

impl Default for PermissionsManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Exact name, `*`, or `prefix*`
fn matches_module(pattern: &str, target: &str) -> bool {
    if pattern == "*" || pattern == target {
        return true;
    }
    pattern
        .strip_suffix('*')
        .is_some_and(|prefix| target.starts_with(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(modules: Option<&[&str]>, actions: Option<&[&str]>) -> PermissionsConfig {
        PermissionsConfig {
            allowed_modules: modules.map(|m| m.iter().map(|s| s.to_string()).collect()),
            allowed_actions: actions.map(|a| a.iter().map(|s| s.to_string()).collect()),
            requires_auth: false,
        }
    }

    #[test]
    fn test_host_identity_always_allowed() {
        let pm = PermissionsManager::new();
        assert!(pm.can_call_module("", "orders", "openOrder").allowed);
        assert!(pm.can_call_module(ORCHESTRATOR_IDENTITY, "anything", "x").allowed);
    }

    #[test]
    fn test_unconfigured_caller_denied() {
        let pm = PermissionsManager::new();
        let decision = pm.can_call_module("reporting", "orders", "openOrder");
        assert!(!decision.allowed);
        assert!(decision.reason.unwrap().contains("reporting"));
    }

    #[test]
    fn test_prefix_pattern() {
        let pm = PermissionsManager::new();
        pm.register_module_permissions("reporting", config(Some(&["analytics*"]), None));
        assert!(pm.can_call_module("reporting", "analytics-core", "track").allowed);

        let denied = pm.can_call_module("reporting", "orders", "openOrder");
        assert!(!denied.allowed);
        let reason = denied.reason.unwrap();
        assert!(reason.contains("reporting") && reason.contains("orders"));
    }

    #[test]
    fn test_allowed_actions() {
        let pm = PermissionsManager::new();
        pm.register_module_permissions(
            "dashboard",
            config(Some(&["*"]), Some(&["getStats", "orders.listOrders"])),
        );
        assert!(pm.can_call_module("dashboard", "analytics", "getStats").allowed);
        assert!(pm.can_call_module("dashboard", "orders", "listOrders").allowed);
        assert!(!pm.can_call_module("dashboard", "orders", "setStatus").allowed);
        assert!(!pm.can_call_module("dashboard", "auth", "listOrders").allowed);
    }

    #[test]
    fn test_empty_config_allows() {
        let pm = PermissionsManager::new();
        pm.register_module_permissions("open", PermissionsConfig::default());
        assert!(pm.can_call_module("open", "orders", "setStatus").allowed);
    }

    #[test]
    fn test_global_lists_apply_to_every_caller() {
        let pm = PermissionsManager::new();
        pm.set_global_allowed_modules(["auth"]);
        pm.set_global_allowed_actions(["analytics.track"]);
        assert!(pm.can_call_module("stranger", "auth", "ensureAuthenticated").allowed);
        assert!(pm.can_call_module("stranger", "analytics", "track").allowed);
        assert!(!pm.can_call_module("stranger", "analytics", "export").allowed);
    }

    #[test]
    fn test_requires_auth_defaults_false() {
        let pm = PermissionsManager::new();
        assert!(!pm.requires_auth("orders"));
        pm.register_module_permissions(
            "orders",
            PermissionsConfig {
                requires_auth: true,
                ..Default::default()
            },
        );
        assert!(pm.requires_auth("orders"));
    }

    #[test]
    fn test_wildcard_warnings() {
        let manifest = ModuleManifest::new("greedy", "1.0.0", "mem://greedy")
            .with_permissions(config(Some(&["*"]), Some(&["*"])));
        assert_eq!(PermissionsManager::validate_manifest_permissions(&manifest).len(), 2);

        let modest = ModuleManifest::new("modest", "1.0.0", "mem://modest")
            .with_permissions(config(Some(&["auth"]), None));
        assert!(PermissionsManager::validate_manifest_permissions(&modest).is_empty());
    }
}
