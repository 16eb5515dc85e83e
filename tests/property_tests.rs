//! Property tests for registry invariants
//!
//! Audit bounds, trusted caller identities, default-deny for unconfigured
//! callers and missing-dependency reporting.

use proptest::prelude::*;
use serde_json::json;
use std::collections::HashMap;

use mfe_orchestrator::module::audit::AuditLog;
use mfe_orchestrator::module::registry::{
    satisfies_range, ConflictKind, DependencyResolver, ModuleManifest, Version,
};
use mfe_orchestrator::module::{PermissionsManager, ORCHESTRATOR_IDENTITY};

fn module_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_-]{0,15}"
}

proptest! {
    #[test]
    fn test_audit_never_exceeds_max(max in 1usize..50, calls in 0usize..200) {
        let audit = AuditLog::with_max_entries(max);
        for i in 0..calls {
            audit.record("caller", "target", "method", &[json!(i)], None, None, 0);
        }
        let entries = audit.entries();
        prop_assert_eq!(entries.len(), calls.min(max));

        // Oldest evicted first: the survivors are the most recent calls, in order
        let expected: Vec<_> = (calls.saturating_sub(max)..calls).map(|i| vec![json!(i)]).collect();
        let kept: Vec<_> = entries.into_iter().map(|e| e.args).collect();
        prop_assert_eq!(kept, expected);
    }

    #[test]
    fn test_trusted_identities_always_allowed(
        target in module_name(),
        method in "[a-zA-Z]{1,12}",
        restricted in module_name(),
    ) {
        let permissions = PermissionsManager::new();
        permissions.set_global_allowed_modules(Vec::<String>::new());
        permissions.register_module_permissions(
            &restricted,
            mfe_orchestrator::module::PermissionsConfig {
                allowed_modules: Some(Vec::new()),
                allowed_actions: Some(Vec::new()),
                requires_auth: false,
            },
        );
        prop_assert!(permissions.can_call_module("", &target, &method).allowed);
        prop_assert!(permissions.can_call_module(ORCHESTRATOR_IDENTITY, &target, &method).allowed);
    }

    #[test]
    fn test_unconfigured_caller_denied(
        caller in module_name(),
        target in module_name(),
        method in "[a-zA-Z]{1,12}",
    ) {
        prop_assume!(caller != ORCHESTRATOR_IDENTITY);
        let permissions = PermissionsManager::new();
        let decision = permissions.can_call_module(&caller, &target, &method);
        prop_assert!(!decision.allowed);
        prop_assert!(decision.reason.unwrap_or_default().contains(&caller));
    }

    #[test]
    fn test_missing_dependency_single_conflict(
        name in module_name(),
        missing in module_name(),
        present in module_name(),
    ) {
        prop_assume!(name != missing && name != present && missing != present);
        let mut catalog = HashMap::new();
        catalog.insert(present.clone(), ModuleManifest::new(&present, "1.2.3", "mem://present"));

        let manifest = ModuleManifest::new(&name, "1.0.0", "mem://root")
            .with_dependency(&format!("{}@^1.0.0", present))
            .with_dependency(&missing);
        let resolution = DependencyResolver::resolve(&[manifest], &catalog);

        prop_assert_eq!(resolution.conflicts.len(), 1);
        let conflict = &resolution.conflicts[0];
        prop_assert_eq!(&conflict.module, &name);
        prop_assert_eq!(&conflict.required, &missing);
        prop_assert_eq!(conflict.available.as_str(), "not found");
        prop_assert_eq!(conflict.kind, ConflictKind::Missing);
    }

    #[test]
    fn test_version_satisfies_its_own_ranges(
        major in 0u64..20,
        minor in 0u64..50,
        patch in 0u64..50,
    ) {
        let version = Version::new(major, minor, patch).to_string();
        prop_assert!(satisfies_range(&version, &version));
        prop_assert!(satisfies_range(&version, "*"));
        let caret_range = format!("^{}", version);
        let tilde_range = format!("~{}", version);
        let next_major_range = format!("^{}.0.0", major + 1);
        prop_assert!(satisfies_range(&version, &caret_range));
        prop_assert!(satisfies_range(&version, &tilde_range));
        prop_assert!(!satisfies_range(&version, &next_major_range));
    }
}
