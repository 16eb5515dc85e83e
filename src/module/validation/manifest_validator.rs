//! Manifest validation
//!
//! Structural checks on a manifest. Results are advisory: the registry logs
//! them at registration time but never rejects a manifest because of them.

use tracing::{debug, warn};

use crate::module::registry::manifest::ModuleManifest;
use crate::module::registry::version::{DependencySpec, Version, VersionRange};

const MAX_NAME_LEN: usize = 64;

/// Validation result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    Valid,
    Invalid(Vec<String>),
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid)
    }

    pub fn errors(&self) -> &[String] {
        match self {
            ValidationResult::Valid => &[],
            ValidationResult::Invalid(errors) => errors,
        }
    }
}

/// Manifest validator
#[derive(Debug, Default)]
pub struct ManifestValidator;

impl ManifestValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validate a module manifest
    pub fn validate(&self, manifest: &ModuleManifest) -> ValidationResult {
        let mut errors = Vec::new();

        if !is_valid_name(&manifest.name) {
            errors.push(format!(
                "Invalid module name: '{}' (1-{} characters: alphanumerics and -_./@)",
                manifest.name, MAX_NAME_LEN
            ));
        }

        if Version::parse(&manifest.version).is_none() {
            errors.push(format!(
                "Invalid version format: '{}' (expected major.minor.patch)",
                manifest.version
            ));
        }

        for raw in &manifest.dependencies {
            let spec = DependencySpec::parse(raw);
            if spec.name.trim().is_empty() {
                errors.push(format!("Dependency '{}' has no module name", raw));
            }
            if VersionRange::parse(&spec.range).is_none() {
                errors.push(format!(
                    "Invalid dependency range: '{}' (for dependency: {})",
                    spec.range, spec.name
                ));
            }
        }

        for method in manifest.api.keys() {
            if method.trim().is_empty() {
                errors.push("API method names cannot be empty".to_string());
            }
        }

        if errors.is_empty() {
            debug!("Manifest validation passed for module: {}", manifest.name);
            ValidationResult::Valid
        } else {
            warn!(
                "Manifest validation failed for module {}: {:?}",
                manifest.name, errors
            );
            ValidationResult::Invalid(errors)
        }
    }
}

#[inline]
fn is_valid_name(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return false;
    }
    name.chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | '@'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::registry::manifest::MethodSignature;

    #[test]
    fn test_valid_manifest() {
        let manifest = ModuleManifest::new("orders", "1.0.0", "http://localhost/orders.js")
            .with_dependency("auth@^1.0.0")
            .with_dependency("@scope/ui")
            .with_method("openOrder", MethodSignature::new(["id"], "Order"));
        assert_eq!(ManifestValidator::new().validate(&manifest), ValidationResult::Valid);
    }

    #[test]
    fn test_collects_every_problem() {
        let manifest = ModuleManifest::new("bad name!", "one", "x")
            .with_dependency("auth@^banana")
            .with_method("", MethodSignature::default());
        let result = ManifestValidator::new().validate(&manifest);
        assert!(!result.is_valid());
        assert_eq!(result.errors().len(), 4);
    }

    #[test]
    fn test_name_length_limit() {
        let long = "a".repeat(65);
        assert!(!is_valid_name(&long));
        assert!(is_valid_name(&"a".repeat(64)));
    }
}
