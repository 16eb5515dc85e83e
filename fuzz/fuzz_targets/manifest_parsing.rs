#![no_main]
use libfuzzer_sys::fuzz_target;
use mfe_orchestrator::module::registry::{DependencyResolver, ModuleManifest};
use mfe_orchestrator::module::validation::ManifestValidator;
use std::collections::HashMap;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    // Either format must reject garbage with an error, never a panic
    let manifests: Vec<ModuleManifest> = [ModuleManifest::from_json(text), ModuleManifest::from_toml(text)]
        .into_iter()
        .filter_map(Result::ok)
        .collect();

    let validator = ManifestValidator::new();
    for manifest in &manifests {
        let _ = validator.validate(manifest);
        let _ = manifest.dependency_specs();
    }

    // Resolving parsed manifests against each other terminates, cycles included
    let catalog: HashMap<String, ModuleManifest> = manifests
        .iter()
        .map(|m| (m.name.clone(), m.clone()))
        .collect();
    let resolution = DependencyResolver::resolve(&manifests, &catalog);
    assert!(resolution.load_order.len() <= catalog.len());
});
