//! Module manifest parsing
//!
//! A manifest declares a module's identity, load locator, exposed components,
//! callable API surface, dependencies and access-control settings. Manifests
//! are read from JSON or TOML; unknown fields are ignored.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::module::registry::version::DependencySpec;
use crate::module::traits::ModuleError;

/// Description of one callable API method
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodSignature {
    /// Ordered parameter names
    #[serde(default)]
    pub params: Vec<String>,
    /// Return type label (free-form)
    #[serde(default)]
    pub returns: String,
}

impl MethodSignature {
    pub fn new<P: Into<String>>(params: impl IntoIterator<Item = P>, returns: &str) -> Self {
        Self {
            params: params.into_iter().map(Into::into).collect(),
            returns: returns.to_string(),
        }
    }
}

/// Access-control declaration carried by a manifest
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionsConfig {
    /// Exact names, `prefix*` patterns or `*`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_modules: Option<Vec<String>>,
    /// Method names, `target.method` names or `*`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_actions: Option<Vec<String>>,
    /// Hint for callers; not enforced by the orchestrator
    #[serde(default)]
    pub requires_auth: bool,
}

/// Module manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleManifest {
    /// Module name (unique key)
    pub name: String,
    /// Module version (semantic versioning)
    pub version: String,
    /// Where the loader fetches the module from (opaque, e.g. a URL)
    #[serde(default, alias = "url")]
    pub load_locator: String,
    /// UI entry names, opaque to the orchestrator
    #[serde(default, alias = "components")]
    pub component_names: Vec<String>,
    /// Callable API surface
    #[serde(default)]
    pub api: BTreeMap<String, MethodSignature>,
    /// Dependencies as `name@range` strings
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Access-control declaration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<PermissionsConfig>,
}

impl ModuleManifest {
    /// Create a manifest with no components, API or dependencies
    pub fn new(name: &str, version: &str, load_locator: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            load_locator: load_locator.to_string(),
            component_names: Vec::new(),
            api: BTreeMap::new(),
            dependencies: Vec::new(),
            permissions: None,
        }
    }

    /// Synthesize a manifest for a module that never published one
    pub fn synthesize(load_locator: &str) -> Self {
        Self::new(&name_from_locator(load_locator), "0.0.0", load_locator)
    }

    pub fn with_dependency(mut self, spec: &str) -> Self {
        self.dependencies.push(spec.to_string());
        self
    }

    pub fn with_method(mut self, name: &str, signature: MethodSignature) -> Self {
        self.api.insert(name.to_string(), signature);
        self
    }

    pub fn with_component(mut self, name: &str) -> Self {
        self.component_names.push(name.to_string());
        self
    }

    pub fn with_permissions(mut self, permissions: PermissionsConfig) -> Self {
        self.permissions = Some(permissions);
        self
    }

    /// Parsed dependency declarations, in manifest order
    pub fn dependency_specs(&self) -> Vec<DependencySpec> {
        self.dependencies
            .iter()
            .map(|d| DependencySpec::parse(d))
            .collect()
    }

    /// Parse a manifest from a JSON string
    pub fn from_json(contents: &str) -> Result<Self, ModuleError> {
        let manifest: ModuleManifest = serde_json::from_str(contents).map_err(|e| {
            ModuleError::InvalidManifest(format!("Failed to parse manifest JSON: {}", e))
        })?;
        manifest.check_required()?;
        Ok(manifest)
    }

    /// Parse a manifest from a TOML string
    pub fn from_toml(contents: &str) -> Result<Self, ModuleError> {
        let manifest: ModuleManifest = toml::from_str(contents).map_err(|e| {
            ModuleError::InvalidManifest(format!("Failed to parse manifest TOML: {}", e))
        })?;
        manifest.check_required()?;
        Ok(manifest)
    }

    /// Load manifest from file (`.json`, otherwise TOML)
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ModuleError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ModuleError::InvalidManifest(format!("Failed to read manifest file: {}", e))
        })?;

        if is_json(path) {
            Self::from_json(&contents)
        } else {
            Self::from_toml(&contents)
        }
    }

    fn check_required(&self) -> Result<(), ModuleError> {
        if self.name.trim().is_empty() {
            return Err(ModuleError::InvalidManifest(
                "Module name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// A set of manifests shipped as one file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManifestCatalog {
    #[serde(default)]
    pub modules: Vec<ModuleManifest>,
}

impl ManifestCatalog {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ModuleError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ModuleError::InvalidManifest(format!("Failed to read catalog file: {}", e))
        })?;

        let catalog: ManifestCatalog = if is_json(path) {
            serde_json::from_str(&contents)?
        } else {
            toml::from_str(&contents)?
        };

        for manifest in &catalog.modules {
            manifest.check_required()?;
        }
        Ok(catalog)
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

/// Derive a module name from a locator: last path segment without query,
/// fragment or file extension.
pub fn name_from_locator(locator: &str) -> String {
    let without_query = locator
        .split(['?', '#'])
        .next()
        .unwrap_or(locator)
        .trim_end_matches('/');
    let segment = without_query.rsplit('/').next().unwrap_or(without_query);
    let stem = match segment.rfind('.') {
        Some(dot) if dot > 0 => &segment[..dot],
        _ => segment,
    };

    if stem.is_empty() {
        locator.to_string()
    } else {
        stem.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json_manifest_ignores_unknown_fields() {
        let json = r#"{
            "name": "orders",
            "version": "1.0.0",
            "loadLocator": "http://localhost:3002/orders.js",
            "componentNames": ["OrderList"],
            "api": { "openOrder": { "params": ["id"], "returns": "Order" } },
            "dependencies": ["auth@^1.0.0"],
            "permissions": { "allowedModules": ["auth"], "requiresAuth": true },
            "displayColor": "teal"
        }"#;
        let manifest = ModuleManifest::from_json(json).unwrap();
        assert_eq!(manifest.name, "orders");
        assert_eq!(manifest.api["openOrder"].params, vec!["id"]);
        assert_eq!(manifest.dependency_specs()[0].range, "^1.0.0");
        let perms = manifest.permissions.unwrap();
        assert!(perms.requires_auth);
        assert_eq!(perms.allowed_actions, None);
    }

    #[test]
    fn test_parse_toml_manifest() {
        let toml = r#"
            name = "auth"
            version = "1.2.0"
            loadLocator = "http://localhost:3001/auth.js"

            [api.login]
            params = ["user", "password"]
            returns = "Session"
        "#;
        let manifest = ModuleManifest::from_toml(toml).unwrap();
        assert_eq!(manifest.version, "1.2.0");
        assert!(manifest.api.contains_key("login"));
        assert!(manifest.dependencies.is_empty());
    }

    #[test]
    fn test_empty_name_rejected() {
        let err = ModuleManifest::from_json(r#"{"name": "", "version": "1.0.0"}"#).unwrap_err();
        assert!(matches!(err, ModuleError::InvalidManifest(_)));
    }

    #[test]
    fn test_name_from_locator() {
        assert_eq!(name_from_locator("http://cdn/x/remoteEntry.js"), "remoteEntry");
        assert_eq!(name_from_locator("https://host/analytics/?v=2"), "analytics");
        assert_eq!(name_from_locator("orders"), "orders");
        assert_eq!(name_from_locator("/"), "/");
    }

    #[test]
    fn test_synthesized_manifest() {
        let manifest = ModuleManifest::synthesize("http://cdn/widgets.mjs#main");
        assert_eq!(manifest.name, "widgets");
        assert_eq!(manifest.version, "0.0.0");
        assert!(manifest.api.is_empty());
        assert!(manifest.component_names.is_empty());
    }
}
