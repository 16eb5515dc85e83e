//! Module manager: registry, lifecycle and call dispatch
//!
//! The manager owns one [`RegistryEntry`] per registered module name and is
//! the only writer of registry state and of the API dispatch table. Every
//! cross-module call goes through [`ModuleManager::call`], which checks
//! permissions, dispatches, audits and emits an `api:result` event.
//!
//! All operations take `&self`; share the manager as `Arc<ModuleManager>`.
//! Loads of the same module name are serialized, so at most one load per
//! name is in flight.

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::config::OrchestratorConfig;
use crate::module::api::events::{EventManager, EventType, OrchestratorEvent, Subscription};
use crate::module::audit::AuditLog;
use crate::module::loader::{
    extract_api, ApiFunction, Export, ModuleApi, ModuleExports, ModuleLoader, API_EXPORT,
};
use crate::module::registry::dependencies::DependencyResolver;
use crate::module::registry::discovery::ModuleDiscovery;
use crate::module::registry::manifest::{ManifestCatalog, ModuleManifest};
use crate::module::security::PermissionsManager;
use crate::module::traits::{ModuleError, ModuleStatus, ORCHESTRATOR_IDENTITY};
use crate::module::validation::ManifestValidator;
use crate::utils::time::current_timestamp_millis;

const EVENT_SOURCE: &str = "registry";

/// A module whose code has been loaded
#[derive(Clone)]
pub struct LoadedModule {
    pub manifest: ModuleManifest,
    /// Everything the loader returned, including non-API data
    pub exports: ModuleExports,
    /// Callable members of `exports.api`
    pub api: ModuleApi,
    /// Set once the module signals its own initialization finished
    pub ready: bool,
}

impl fmt::Debug for LoadedModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedModule")
            .field("manifest", &self.manifest.name)
            .field("exports", &self.exports.keys().collect::<Vec<_>>())
            .field("api", &self.api.keys().collect::<Vec<_>>())
            .field("ready", &self.ready)
            .finish()
    }
}

/// Runtime record for one registered module
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub manifest: ModuleManifest,
    pub loaded_module: Option<LoadedModule>,
    pub status: ModuleStatus,
    /// Present iff `status == Error`
    pub last_error: Option<String>,
    /// Milliseconds since the Unix epoch; present iff `status == Loaded`
    pub loaded_at: Option<u64>,
}

impl RegistryEntry {
    fn pending(manifest: ModuleManifest) -> Self {
        Self {
            manifest,
            loaded_module: None,
            status: ModuleStatus::Pending,
            last_error: None,
            loaded_at: None,
        }
    }
}

/// Serializable view of a registry entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleSummary {
    pub name: String,
    pub version: String,
    pub load_locator: String,
    pub status: ModuleStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loaded_at: Option<u64>,
    pub ready: bool,
    /// Methods callable right now (empty unless loaded)
    pub methods: Vec<String>,
}

impl From<&RegistryEntry> for ModuleSummary {
    fn from(entry: &RegistryEntry) -> Self {
        Self {
            name: entry.manifest.name.clone(),
            version: entry.manifest.version.clone(),
            load_locator: entry.manifest.load_locator.clone(),
            status: entry.status,
            last_error: entry.last_error.clone(),
            loaded_at: entry.loaded_at,
            ready: entry.loaded_module.as_ref().is_some_and(|m| m.ready),
            methods: entry
                .loaded_module
                .as_ref()
                .map(|m| m.api.keys().cloned().collect())
                .unwrap_or_default(),
        }
    }
}

/// Module manager coordinates registration, loading and calls
pub struct ModuleManager {
    /// Registry entries (name -> entry)
    entries: RwLock<HashMap<String, RegistryEntry>>,
    /// Dispatch table (name -> callable API); only modules exporting an api object
    apis: RwLock<HashMap<String, ModuleApi>>,
    /// Per-name load serialization
    load_locks: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
    loader: Arc<dyn ModuleLoader>,
    permissions: Arc<PermissionsManager>,
    audit: Arc<AuditLog>,
    events: Arc<EventManager>,
    validator: ManifestValidator,
}

enum Lookup {
    Found(ApiFunction),
    NoTarget,
    NoMethod,
}

impl ModuleManager {
    /// Create a manager with fresh permission, audit and event components
    pub fn new(loader: Arc<dyn ModuleLoader>) -> Self {
        Self::with_components(
            loader,
            Arc::new(PermissionsManager::new()),
            Arc::new(AuditLog::new()),
            Arc::new(EventManager::new()),
        )
    }

    /// Create a manager from explicitly constructed collaborators
    pub fn with_components(
        loader: Arc<dyn ModuleLoader>,
        permissions: Arc<PermissionsManager>,
        audit: Arc<AuditLog>,
        events: Arc<EventManager>,
    ) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            apis: RwLock::new(HashMap::new()),
            load_locks: StdMutex::new(HashMap::new()),
            loader,
            permissions,
            audit,
            events,
            validator: ManifestValidator::new(),
        }
    }

    /// Create a manager with audit and permission settings from configuration
    pub fn from_config(loader: Arc<dyn ModuleLoader>, config: &OrchestratorConfig) -> Self {
        let audit = AuditLog::with_max_entries(config.audit.max_entries);
        audit.set_enabled(config.audit.enabled);

        let permissions = PermissionsManager::new();
        permissions.set_global_allowed_modules(config.permissions.global_allowed_modules.clone());
        permissions.set_global_allowed_actions(config.permissions.global_allowed_actions.clone());

        Self::with_components(
            loader,
            Arc::new(permissions),
            Arc::new(audit),
            Arc::new(EventManager::new()),
        )
    }

    pub fn permissions(&self) -> &Arc<PermissionsManager> {
        &self.permissions
    }

    pub fn audit(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    /// Get event manager for subscribing to and publishing events
    pub fn events(&self) -> &Arc<EventManager> {
        &self.events
    }

    /// Subscribe to one event type
    pub fn subscribe<F>(&self, event_type: EventType, callback: F) -> Subscription
    where
        F: Fn(&OrchestratorEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(event_type, callback)
    }

    /// Register a manifest, or replace the stored manifest of a known module
    ///
    /// Replacing leaves the module's status and loaded state untouched.
    /// Validation problems and broad permission requests are logged only.
    pub async fn register_module_manifest(&self, manifest: ModuleManifest) {
        let _ = self.validator.validate(&manifest);
        for warning in PermissionsManager::validate_manifest_permissions(&manifest) {
            warn!("{}", warning);
        }

        match &manifest.permissions {
            Some(permissions) => self
                .permissions
                .register_module_permissions(&manifest.name, permissions.clone()),
            None => self.permissions.remove_module_permissions(&manifest.name),
        }

        let mut entries = self.entries.write().await;
        match entries.get_mut(&manifest.name) {
            Some(entry) => {
                debug!("Replacing manifest for module {}", manifest.name);
                entry.manifest = manifest;
            }
            None => {
                info!("Registered module {}@{}", manifest.name, manifest.version);
                entries.insert(manifest.name.clone(), RegistryEntry::pending(manifest));
            }
        }
    }

    /// Register every manifest in a catalog; returns how many were registered
    pub async fn register_catalog(&self, catalog: ManifestCatalog) -> usize {
        let count = catalog.modules.len();
        for manifest in catalog.modules {
            self.register_module_manifest(manifest).await;
        }
        count
    }

    /// Register every manifest found under `dir`
    pub async fn register_discovered<P: AsRef<Path>>(&self, dir: P) -> Result<usize, ModuleError> {
        let discovered = ModuleDiscovery::new(dir).discover_manifests()?;
        let count = discovered.len();
        for found in discovered {
            self.register_module_manifest(found.manifest).await;
        }
        Ok(count)
    }

    /// Load the module at `locator`, loading its dependencies first
    ///
    /// Uses the registered manifest whose locator matches; otherwise a
    /// minimal manifest is synthesized and registered. A synthesized name
    /// already registered under another locator fails with
    /// `InvalidManifest`. Loading an already-loaded module returns the
    /// existing record.
    pub fn load_mfe<'a>(
        &'a self,
        locator: &'a str,
    ) -> BoxFuture<'a, Result<LoadedModule, ModuleError>> {
        async move {
            let manifest = match self.manifest_for_locator(locator).await {
                Some(manifest) => manifest,
                None => {
                    let manifest = ModuleManifest::synthesize(locator);
                    debug!(
                        "No manifest registered for {}, synthesized {}",
                        locator, manifest.name
                    );
                    manifest
                }
            };
            self.load_manifest(manifest).await
        }
        .boxed()
    }

    /// Load a registered module by name
    pub async fn load_module(&self, name: &str) -> Result<LoadedModule, ModuleError> {
        let manifest = self
            .manifest(name)
            .await
            .ok_or_else(|| ModuleError::ModuleNotFound(name.to_string()))?;
        self.load_manifest(manifest).await
    }

    fn load_manifest(&self, manifest: ModuleManifest) -> BoxFuture<'_, Result<LoadedModule, ModuleError>> {
        async move {
            let name = manifest.name.clone();
            let lock = self.load_lock(&name);
            let _guard = lock.lock().await;

            {
                let mut entries = self.entries.write().await;
                let entry = entries
                    .entry(name.clone())
                    .or_insert_with(|| RegistryEntry::pending(manifest.clone()));
                if entry.manifest.load_locator != manifest.load_locator {
                    warn!(
                        "Refusing to load {} as {}: registered at {}",
                        manifest.load_locator, name, entry.manifest.load_locator
                    );
                    return Err(ModuleError::InvalidManifest(format!(
                        "module {} is registered at {}, not {}",
                        name, entry.manifest.load_locator, manifest.load_locator
                    )));
                }
                if let (ModuleStatus::Loaded, Some(loaded)) = (entry.status, &entry.loaded_module) {
                    if loaded.manifest.load_locator == manifest.load_locator {
                        debug!("Module {} already loaded", name);
                        return Ok(loaded.clone());
                    }
                    info!(
                        "Module {} moved from {} to {}, loading again",
                        name, loaded.manifest.load_locator, manifest.load_locator
                    );
                }
                entry.status = ModuleStatus::Loading;
            }
            info!("Loading module: {}", name);

            match self.load_locked(&manifest).await {
                Ok(loaded) => {
                    let loaded_at = current_timestamp_millis();
                    {
                        let mut apis = self.apis.write().await;
                        if matches!(loaded.exports.get(API_EXPORT), Some(Export::Object(_))) {
                            apis.insert(name.clone(), loaded.api.clone());
                        } else {
                            apis.remove(&name);
                        }
                    }
                    {
                        let mut entries = self.entries.write().await;
                        if let Some(entry) = entries.get_mut(&name) {
                            entry.loaded_module = Some(loaded.clone());
                            entry.status = ModuleStatus::Loaded;
                            entry.last_error = None;
                            entry.loaded_at = Some(loaded_at);
                        }
                    }

                    info!("Module {} loaded successfully", name);
                    self.events.emit(
                        EventType::ModuleLoaded,
                        EVENT_SOURCE,
                        json!({
                            "name": name,
                            "locator": manifest.load_locator,
                            "version": manifest.version,
                        }),
                    );
                    Ok(loaded)
                }
                Err(e) => {
                    let message = e.to_string();
                    self.apis.write().await.remove(&name);
                    {
                        let mut entries = self.entries.write().await;
                        if let Some(entry) = entries.get_mut(&name) {
                            entry.loaded_module = None;
                            entry.status = ModuleStatus::Error;
                            entry.last_error = Some(message.clone());
                            entry.loaded_at = None;
                        }
                    }

                    error!("Module {} failed to load: {}", name, message);
                    self.events.emit(
                        EventType::ModuleError,
                        EVENT_SOURCE,
                        json!({
                            "name": name,
                            "locator": manifest.load_locator,
                            "error": message,
                        }),
                    );
                    Err(e)
                }
            }
        }
        .boxed()
    }

    /// Resolve and load dependencies, then the module itself
    async fn load_locked(&self, manifest: &ModuleManifest) -> Result<LoadedModule, ModuleError> {
        let catalog = self.catalog().await;
        let resolution = DependencyResolver::resolve(std::slice::from_ref(manifest), &catalog);
        if !resolution.is_ok() {
            for conflict in &resolution.conflicts {
                warn!("Dependency conflict loading {}: {}", manifest.name, conflict);
            }
            return Err(ModuleError::ManifestConflict(resolution.conflicts));
        }

        for dep_name in resolution.load_order.iter().filter(|n| **n != manifest.name) {
            if self.is_loaded(dep_name).await {
                continue;
            }
            let Some(dep_manifest) = resolution.resolved.get(dep_name).cloned() else {
                continue;
            };
            debug!("Loading dependency {} of {}", dep_name, manifest.name);
            self.load_manifest(dep_manifest).await.map_err(|e| match e {
                ModuleError::ManifestConflict(_) => e,
                other => ModuleError::LoadFailure(format!(
                    "dependency {} failed: {}",
                    dep_name, other
                )),
            })?;
        }

        let exports = self
            .loader
            .load(&manifest.load_locator)
            .await
            .map_err(|e| ModuleError::LoadFailure(e.to_string()))?;

        let api = extract_api(&exports).unwrap_or_default();
        Ok(LoadedModule {
            manifest: manifest.clone(),
            exports,
            api,
            ready: false,
        })
    }

    /// Unload a module; returns `false` if it was not loaded
    pub async fn unload_mfe(&self, name: &str) -> bool {
        let lock = self.load_lock(name);
        let _guard = lock.lock().await;

        self.apis.write().await.remove(name);
        let unloaded = {
            let mut entries = self.entries.write().await;
            match entries.get_mut(name) {
                Some(entry) if entry.loaded_module.is_some() || entry.status != ModuleStatus::Pending => {
                    let was_loaded = entry.loaded_module.take().is_some();
                    entry.status = ModuleStatus::Pending;
                    entry.last_error = None;
                    entry.loaded_at = None;
                    was_loaded
                }
                _ => false,
            }
        };

        if unloaded {
            info!("Module {} unloaded", name);
            self.events
                .emit(EventType::ModuleUnloaded, EVENT_SOURCE, json!({ "name": name }));
        } else {
            debug!("Module {} was not loaded", name);
        }
        unloaded
    }

    /// Unload and load a registered module again
    pub async fn reload_mfe(&self, name: &str) -> Result<LoadedModule, ModuleError> {
        info!("Reloading module: {}", name);
        self.unload_mfe(name).await;
        self.load_module(name).await
    }

    /// Call `method` on `module` as `caller` (defaults to the orchestrator)
    pub async fn call(
        &self,
        module: &str,
        method: &str,
        args: Vec<Value>,
        caller: Option<&str>,
    ) -> Result<Value, ModuleError> {
        self.dispatch(module, method, args, caller, None).await
    }

    /// Like [`call`](Self::call), failing with `InvocationFailure` after `timeout`
    pub async fn call_with_timeout(
        &self,
        module: &str,
        method: &str,
        args: Vec<Value>,
        caller: Option<&str>,
        timeout: Duration,
    ) -> Result<Value, ModuleError> {
        self.dispatch(module, method, args, caller, Some(timeout)).await
    }

    async fn dispatch(
        &self,
        module: &str,
        method: &str,
        args: Vec<Value>,
        caller: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<Value, ModuleError> {
        let caller = caller.unwrap_or(ORCHESTRATOR_IDENTITY);

        let decision = self.permissions.can_call_module(caller, module, method);
        if !decision.allowed {
            let reason = decision
                .reason
                .unwrap_or_else(|| format!("Module '{}' may not call '{}'", caller, module));
            warn!("Denied call {}.{} from {}: {}", module, method, caller, reason);
            self.audit
                .record(caller, module, method, &args, None, Some(reason.clone()), 0);
            return Err(ModuleError::PermissionDenied(reason));
        }

        let lookup = {
            let apis = self.apis.read().await;
            match apis.get(module) {
                None => Lookup::NoTarget,
                Some(api) => match api.get(method) {
                    Some(function) => Lookup::Found(Arc::clone(function)),
                    None => Lookup::NoMethod,
                },
            }
        };

        let function = match lookup {
            Lookup::Found(function) => function,
            Lookup::NoTarget => {
                let err = ModuleError::TargetNotFound(module.to_string());
                self.audit
                    .record(caller, module, method, &args, None, Some(err.to_string()), 0);
                return Err(err);
            }
            Lookup::NoMethod => {
                let err = ModuleError::MethodNotFound {
                    module: module.to_string(),
                    method: method.to_string(),
                };
                self.audit
                    .record(caller, module, method, &args, None, Some(err.to_string()), 0);
                return Err(err);
            }
        };

        debug!("Dispatching {}.{} from {}", module, method, caller);
        let started = Instant::now();
        let invocation = AssertUnwindSafe(function(args.clone())).catch_unwind();
        let outcome = match timeout {
            Some(limit) => match tokio::time::timeout(limit, invocation).await {
                Ok(outcome) => outcome,
                Err(_) => Ok(Err(format!(
                    "Call to {}.{} timed out after {}ms",
                    module,
                    method,
                    limit.as_millis()
                ))),
            },
            None => invocation.await,
        };
        let outcome = outcome.unwrap_or_else(|_| Err(format!("{}.{} panicked", module, method)));
        let duration = started.elapsed().as_millis() as i64;

        match outcome {
            Ok(result) => {
                self.audit
                    .record(caller, module, method, &args, Some(result.clone()), None, duration);
                self.events.emit(
                    EventType::ApiResult,
                    EVENT_SOURCE,
                    json!({
                        "module": module,
                        "method": method,
                        "caller": caller,
                        "success": true,
                        "result": result,
                        "duration": duration,
                    }),
                );
                Ok(result)
            }
            Err(message) => {
                warn!("Call {}.{} failed: {}", module, method, message);
                self.audit
                    .record(caller, module, method, &args, None, Some(message.clone()), duration);
                self.events.emit(
                    EventType::ApiResult,
                    EVENT_SOURCE,
                    json!({
                        "module": module,
                        "method": method,
                        "caller": caller,
                        "success": false,
                        "error": message,
                        "duration": duration,
                    }),
                );
                Err(ModuleError::InvocationFailure(message))
            }
        }
    }

    /// Full copy of the registry
    pub async fn snapshot(&self) -> HashMap<String, RegistryEntry> {
        self.entries.read().await.clone()
    }

    /// All registered manifests, sorted by name
    pub async fn manifests(&self) -> Vec<ModuleManifest> {
        let mut manifests: Vec<_> = self
            .entries
            .read()
            .await
            .values()
            .map(|e| e.manifest.clone())
            .collect();
        manifests.sort_by(|a, b| a.name.cmp(&b.name));
        manifests
    }

    /// Registered manifests keyed by name
    pub async fn catalog(&self) -> HashMap<String, ModuleManifest> {
        self.entries
            .read()
            .await
            .iter()
            .map(|(name, e)| (name.clone(), e.manifest.clone()))
            .collect()
    }

    pub async fn manifest(&self, name: &str) -> Option<ModuleManifest> {
        self.entries.read().await.get(name).map(|e| e.manifest.clone())
    }

    pub async fn get_loaded_module(&self, name: &str) -> Option<LoadedModule> {
        self.entries
            .read()
            .await
            .get(name)
            .and_then(|e| e.loaded_module.clone())
    }

    pub async fn is_loaded(&self, name: &str) -> bool {
        self.status(name).await == Some(ModuleStatus::Loaded)
    }

    pub async fn status(&self, name: &str) -> Option<ModuleStatus> {
        self.entries.read().await.get(name).map(|e| e.status)
    }

    /// Mark a loaded module ready; returns `false` (no-op) if it is not loaded
    pub async fn mark_ready(&self, name: &str) -> bool {
        let mut entries = self.entries.write().await;
        match entries.get_mut(name).and_then(|e| e.loaded_module.as_mut()) {
            Some(loaded) => {
                loaded.ready = true;
                debug!("Module {} signalled ready", name);
                true
            }
            None => false,
        }
    }

    /// Summaries of every registered module, sorted by name
    pub async fn list_modules(&self) -> Vec<ModuleSummary> {
        let mut summaries: Vec<_> = self
            .entries
            .read()
            .await
            .values()
            .map(ModuleSummary::from)
            .collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }

    /// Names of loaded modules, sorted
    pub async fn loaded_modules(&self) -> Vec<String> {
        let mut names: Vec<_> = self
            .entries
            .read()
            .await
            .values()
            .filter(|e| e.status == ModuleStatus::Loaded)
            .map(|e| e.manifest.name.clone())
            .collect();
        names.sort();
        names
    }

    async fn manifest_for_locator(&self, locator: &str) -> Option<ModuleManifest> {
        self.entries
            .read()
            .await
            .values()
            .filter(|e| e.manifest.load_locator == locator)
            .map(|e| &e.manifest)
            .min_by(|a, b| a.name.cmp(&b.name))
            .cloned()
    }

    fn load_lock(&self, name: &str) -> Arc<Mutex<()>> {
        let mut locks = self.load_locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(locks.entry(name.to_string()).or_default())
    }
}
