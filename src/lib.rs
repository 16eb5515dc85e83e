//! MFE Orchestrator - runtime orchestration for micro-frontend modules
//!
//! Independently built UI modules are registered by manifest, loaded through
//! an embedder-supplied loader, and call each other through a single
//! dispatch path that enforces permissions and audits every attempt.
//!
//! ## Components
//!
//! - [`module::registry`]: manifests, version ranges, dependency resolution
//! - [`module::security`]: per-caller allow-lists for cross-module calls
//! - [`module::audit`]: bounded log of every call attempt
//! - [`module::ModuleManager`]: lifecycle state machine and call dispatch
//! - [`intent`]: free-text commands to ordered call plans
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mfe_orchestrator::module::{api_fn, ModuleManager, ModuleManifest, StaticModuleLoader};
//! use serde_json::json;
//!
//! # async fn run() -> Result<(), mfe_orchestrator::module::ModuleError> {
//! let loader = StaticModuleLoader::new();
//! loader.register_api("mem://auth", [("whoami", api_fn(|_| async { Ok(json!("alice")) }))]);
//!
//! let manager = Arc::new(ModuleManager::new(Arc::new(loader)));
//! manager
//!     .register_module_manifest(ModuleManifest::new("auth", "1.0.0", "mem://auth"))
//!     .await;
//! manager.load_mfe("mem://auth").await?;
//! let user = manager.call("auth", "whoami", vec![], None).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod intent;
pub mod module;
pub mod utils;

pub use config::OrchestratorConfig;
pub use intent::{IntentBridge, IntentModel};
pub use module::{ModuleError, ModuleManager};
