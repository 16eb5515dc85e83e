//! Module registry building blocks
//!
//! Manifest parsing, version ranges, dependency resolution and on-disk
//! manifest discovery.

pub mod dependencies;
pub mod discovery;
pub mod manifest;
pub mod version;

pub use dependencies::{
    ConflictKind, DependencyConflict, DependencyResolution, DependencyResolver,
};
pub use discovery::{DiscoveredManifest, ModuleDiscovery};
pub use manifest::{ManifestCatalog, MethodSignature, ModuleManifest, PermissionsConfig};
pub use version::{satisfies_range, DependencySpec, Version, VersionRange};
