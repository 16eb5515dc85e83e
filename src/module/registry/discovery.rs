//! Manifest discovery
//!
//! Scans a manifests directory for module manifests. Two layouts are
//! recognised and may be mixed:
//!
//! ```text
//! manifests/
//!   auth/module.toml        # one directory per module
//!   orders/module.json
//!   analytics.json          # or flat files
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::module::registry::manifest::ModuleManifest;
use crate::module::traits::ModuleError;
use crate::module::validation::{ManifestValidator, ValidationResult};

const MANIFEST_FILES: [&str; 2] = ["module.toml", "module.json"];

/// Discovered manifest with the file it came from
#[derive(Debug, Clone)]
pub struct DiscoveredManifest {
    pub path: PathBuf,
    pub manifest: ModuleManifest,
}

/// Manifest directory scanner
pub struct ModuleDiscovery {
    manifests_dir: PathBuf,
}

impl ModuleDiscovery {
    pub fn new<P: AsRef<Path>>(manifests_dir: P) -> Self {
        Self {
            manifests_dir: manifests_dir.as_ref().to_path_buf(),
        }
    }

    pub fn manifests_dir(&self) -> &Path {
        &self.manifests_dir
    }

    /// Discover all manifests, sorted by module name
    ///
    /// A missing directory yields an empty list. Files that fail to parse are
    /// skipped with a warning; validation problems are logged but the
    /// manifest is still returned.
    pub fn discover_manifests(&self) -> Result<Vec<DiscoveredManifest>, ModuleError> {
        info!("Discovering module manifests in {:?}", self.manifests_dir);

        if !self.manifests_dir.exists() {
            debug!("Manifests directory does not exist: {:?}", self.manifests_dir);
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&self.manifests_dir).map_err(|e| {
            ModuleError::OperationError(format!("Failed to read manifests directory: {}", e))
        })?;

        let validator = ManifestValidator::new();
        let mut found = Vec::new();

        for entry in entries {
            let entry = entry.map_err(|e| {
                ModuleError::OperationError(format!("Failed to read directory entry: {}", e))
            })?;
            let path = entry.path();

            let candidate = if path.is_dir() {
                match MANIFEST_FILES
                    .iter()
                    .map(|f| path.join(f))
                    .find(|p| p.is_file())
                {
                    Some(p) => p,
                    None => {
                        debug!("No manifest found in {:?}, skipping", path);
                        continue;
                    }
                }
            } else if is_manifest_file(&path) {
                path
            } else {
                continue;
            };

            match ModuleManifest::from_file(&candidate) {
                Ok(manifest) => {
                    if let ValidationResult::Invalid(errors) = validator.validate(&manifest) {
                        warn!(
                            "Manifest {:?} for module {} has problems: {:?}",
                            candidate, manifest.name, errors
                        );
                    }
                    found.push(DiscoveredManifest {
                        path: candidate,
                        manifest,
                    });
                }
                Err(e) => {
                    warn!("Failed to parse manifest {:?}: {}", candidate, e);
                }
            }
        }

        found.sort_by(|a, b| a.manifest.name.cmp(&b.manifest.name));
        info!("Discovered {} module manifests", found.len());
        Ok(found)
    }

    /// Discover a single module by its directory name
    pub fn discover_manifest(&self, module_name: &str) -> Result<DiscoveredManifest, ModuleError> {
        let module_dir = self.manifests_dir.join(module_name);
        let path = MANIFEST_FILES
            .iter()
            .map(|f| module_dir.join(f))
            .find(|p| p.is_file())
            .ok_or_else(|| {
                ModuleError::ModuleNotFound(format!(
                    "Module {} not found (no manifest in {:?})",
                    module_name, module_dir
                ))
            })?;

        let manifest = ModuleManifest::from_file(&path)?;
        Ok(DiscoveredManifest { path, manifest })
    }
}

fn is_manifest_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json") || e.eq_ignore_ascii_case("toml"))
}
