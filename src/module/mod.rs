//! Module system for the orchestrator
//!
//! Registers module manifests, resolves and loads dependencies through an
//! injected loader, and routes cross-module calls through permission checks
//! and the audit log.
//!
//! ## Architecture
//!
//! - **Registry**: [`ModuleManager`] owns every module's lifecycle record and the dispatch table
//! - **Dependencies**: version ranges are checked and a load order computed before loading
//! - **Permissions**: every call is checked against the caller's declared allow-lists
//! - **Audit**: every call attempt, including denials, is recorded
//! - **Events**: lifecycle and call results are published to subscribers

pub mod api;
pub mod audit;
pub mod loader;
pub mod manager;
pub mod registry;
pub mod security;
pub mod traits;
pub mod validation;

pub use api::{EventManager, EventType, OrchestratorEvent, Subscription};
pub use audit::{AuditLog, AuditLogEntry, AuditQuery, AuditStats};
pub use loader::{api_fn, ApiFunction, Export, ModuleExports, ModuleLoader, StaticModuleLoader};
pub use manager::{LoadedModule, ModuleManager, ModuleSummary, RegistryEntry};
pub use registry::{
    DependencyConflict, DependencyResolution, DependencyResolver, ManifestCatalog,
    ModuleDiscovery, ModuleManifest, PermissionsConfig,
};
pub use security::{PermissionDecision, PermissionsManager};
pub use traits::{ModuleError, ModuleStatus, ORCHESTRATOR_IDENTITY};
