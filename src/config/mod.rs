//! Configuration management for the orchestrator
//!
//! Handles configuration loading (JSON or TOML by file extension) and
//! validation. Every section is optional in the file; omitted sections take
//! their defaults.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::module::audit::DEFAULT_MAX_ENTRIES;

/// Logging configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive (e.g. `"mfe_orchestrator=debug"`); `RUST_LOG` wins
    #[serde(default)]
    pub filter: Option<String>,

    /// Emit JSON lines (requires the `json-logging` feature)
    #[serde(default)]
    pub json_format: bool,
}

/// Audit log configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Maximum retained entries; oldest are evicted first
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

/// Process-wide permission allow-lists
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PermissionsDefaults {
    /// Targets any caller may reach
    #[serde(default)]
    pub global_allowed_modules: Vec<String>,

    /// Methods (`method` or `target.method`) any caller may invoke
    #[serde(default)]
    pub global_allowed_actions: Vec<String>,
}

/// Intent bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentConfig {
    /// Consult the external model when no rule yields a plan
    #[serde(default = "default_true")]
    pub model_fallback: bool,
}

impl Default for IntentConfig {
    fn default() -> Self {
        Self {
            model_fallback: true,
        }
    }
}

/// Where manifests are pre-registered from
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Directory scanned by `ModuleDiscovery`
    #[serde(default)]
    pub manifests_dir: Option<String>,

    /// Single file holding `{ modules = [...] }`
    #[serde(default)]
    pub catalog_file: Option<String>,
}

/// Orchestrator configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default)]
    pub logging: Option<LoggingConfig>,

    #[serde(default)]
    pub audit: AuditConfig,

    #[serde(default)]
    pub permissions: PermissionsDefaults,

    #[serde(default)]
    pub intent: IntentConfig,

    #[serde(default)]
    pub catalog: CatalogConfig,
}

fn default_true() -> bool {
    true
}

fn default_max_entries() -> usize {
    DEFAULT_MAX_ENTRIES
}

impl OrchestratorConfig {
    /// Load configuration from a `.json` or `.toml` file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));

        let config: OrchestratorConfig = if is_json {
            serde_json::from_str(&content)?
        } else {
            toml::from_str(&content)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to JSON file
    pub fn to_json_file(&self, path: &Path) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.audit.max_entries == 0 {
            return Err(anyhow::anyhow!(
                "audit.max_entries must be greater than 0"
            ));
        }

        if let Some(filter) = self.logging.as_ref().and_then(|l| l.filter.as_deref()) {
            tracing_subscriber::EnvFilter::try_new(filter)
                .map_err(|e| anyhow::anyhow!("Invalid logging filter '{}': {}", filter, e))?;
        }

        for pattern in &self.permissions.global_allowed_modules {
            if pattern.trim().is_empty() {
                return Err(anyhow::anyhow!(
                    "permissions.global_allowed_modules contains an empty entry"
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = OrchestratorConfig::default();
        assert!(config.audit.enabled);
        assert_eq!(config.audit.max_entries, 10_000);
        assert!(config.intent.model_fallback);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_toml_with_partial_sections() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("orchestrator.toml");
        std::fs::write(
            &path,
            r#"
[audit]
max_entries = 50

[permissions]
global_allowed_modules = ["analytics"]

[catalog]
manifests_dir = "manifests"
"#,
        )
        .unwrap();

        let config = OrchestratorConfig::from_file(&path).unwrap();
        assert_eq!(config.audit.max_entries, 50);
        assert!(config.audit.enabled);
        assert_eq!(config.permissions.global_allowed_modules, vec!["analytics"]);
        assert_eq!(config.catalog.manifests_dir.as_deref(), Some("manifests"));
        assert!(config.logging.is_none());
    }

    #[test]
    fn test_json_round_trip_and_validation() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("orchestrator.json");
        let mut config = OrchestratorConfig::default();
        config.intent.model_fallback = false;
        config.to_json_file(&path).unwrap();
        assert!(!OrchestratorConfig::from_file(&path).unwrap().intent.model_fallback);

        config.audit.max_entries = 0;
        config.to_json_file(&path).unwrap();
        assert!(OrchestratorConfig::from_file(&path).is_err());
    }
}
