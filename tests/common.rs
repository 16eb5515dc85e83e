//! Shared fixtures: an auth / orders / analytics catalog backed by an
//! in-memory loader.
#![allow(dead_code)]

use async_trait::async_trait;
use mfe_orchestrator::module::registry::{MethodSignature, ModuleManifest, PermissionsConfig};
use mfe_orchestrator::module::{
    api_fn, EventType, ModuleExports, ModuleLoader, ModuleManager, OrchestratorEvent,
    StaticModuleLoader,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const AUTH: &str = "mem://auth";
pub const ORDERS: &str = "mem://orders";
pub const ANALYTICS: &str = "mem://analytics";

pub fn auth_manifest() -> ModuleManifest {
    ModuleManifest::new("auth", "1.0.0", AUTH)
        .with_component("LoginForm")
        .with_method("login", MethodSignature::new(["user"], "Session"))
        .with_method("logout", MethodSignature::new(Vec::<String>::new(), "void"))
        .with_method("ensureAuthenticated", MethodSignature::new(Vec::<String>::new(), "Session"))
        .with_method("whoami", MethodSignature::new(Vec::<String>::new(), "string"))
}

pub fn orders_manifest() -> ModuleManifest {
    ModuleManifest::new("orders", "1.0.0", ORDERS)
        .with_component("OrderList")
        .with_dependency("auth@^1.0.0")
        .with_method("openOrder", MethodSignature::new(["id"], "Order"))
        .with_method("setStatus", MethodSignature::new(["status"], "Order"))
        .with_method("listOrders", MethodSignature::new(Vec::<String>::new(), "Order[]"))
        .with_permissions(PermissionsConfig {
            allowed_modules: Some(vec!["auth".to_string()]),
            allowed_actions: None,
            requires_auth: true,
        })
}

pub fn analytics_manifest() -> ModuleManifest {
    ModuleManifest::new("analytics", "1.0.0", ANALYTICS)
        .with_method("showDashboard", MethodSignature::new(Vec::<String>::new(), "void"))
        .with_method("trackEvent", MethodSignature::new(["name"], "void"))
}

/// Caller allowed to reach analytics modules only
pub fn reporting_manifest() -> ModuleManifest {
    ModuleManifest::new("reporting", "1.0.0", "mem://reporting").with_permissions(
        PermissionsConfig {
            allowed_modules: Some(vec!["analytics*".to_string()]),
            allowed_actions: None,
            requires_auth: false,
        },
    )
}

pub fn sample_loader() -> StaticModuleLoader {
    let loader = StaticModuleLoader::new();
    loader.register_api(
        AUTH,
        [
            (
                "login",
                api_fn(|args| async move {
                    let user = args.first().and_then(Value::as_str).unwrap_or("guest").to_string();
                    Ok(json!({ "user": user, "token": "t-1" }))
                }),
            ),
            ("logout", api_fn(|_| async { Ok(Value::Null) })),
            (
                "ensureAuthenticated",
                api_fn(|_| async { Ok(json!({ "user": "alice", "token": "t-1" })) }),
            ),
            ("whoami", api_fn(|_| async { Ok(json!("alice")) })),
        ],
    );
    loader.register_api(
        ORDERS,
        [
            (
                "openOrder",
                api_fn(|args| async move {
                    match args.first() {
                        Some(id) => Ok(json!({ "id": id, "status": "open" })),
                        None => Err("order id required".to_string()),
                    }
                }),
            ),
            (
                "setStatus",
                api_fn(|args| async move {
                    match args.first().and_then(Value::as_str) {
                        Some(status) => Ok(json!({ "status": status })),
                        None => Err("status required".to_string()),
                    }
                }),
            ),
            ("listOrders", api_fn(|_| async { Ok(json!([{ "id": 123 }])) })),
            (
                "slow",
                api_fn(|_| async {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    Ok(Value::Null)
                }),
            ),
        ],
    );
    loader.register_api(
        ANALYTICS,
        [
            ("showDashboard", api_fn(|_| async { Ok(json!({ "widgets": 3 })) })),
            (
                "trackEvent",
                api_fn(|args| async move { Ok(json!({ "tracked": args.first().cloned() })) }),
            ),
        ],
    );
    loader
}

/// Manager with the full sample catalog registered but nothing loaded
pub async fn sample_manager() -> Arc<ModuleManager> {
    let manager = Arc::new(ModuleManager::new(Arc::new(sample_loader())));
    for manifest in [
        auth_manifest(),
        orders_manifest(),
        analytics_manifest(),
        reporting_manifest(),
    ] {
        manager.register_module_manifest(manifest).await;
    }
    manager
}

/// Collect every emitted event
pub fn record_events(manager: &ModuleManager) -> Arc<Mutex<Vec<OrchestratorEvent>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    // Kept alive by the bus; never unsubscribed during a test
    let _subscription = manager.events().subscribe_all(move |event| {
        sink.lock().unwrap().push(event.clone());
    });
    seen
}

pub fn event_types(events: &Mutex<Vec<OrchestratorEvent>>) -> Vec<EventType> {
    events.lock().unwrap().iter().map(|e| e.event_type).collect()
}

/// Loader that counts invocations and delays each load
pub struct CountingLoader {
    pub inner: StaticModuleLoader,
    pub loads: AtomicUsize,
    pub delay: Duration,
}

impl CountingLoader {
    pub fn new(inner: StaticModuleLoader, delay: Duration) -> Self {
        Self {
            inner,
            loads: AtomicUsize::new(0),
            delay,
        }
    }

    pub fn count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModuleLoader for CountingLoader {
    async fn load(&self, locator: &str) -> anyhow::Result<ModuleExports> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.inner.load(locator).await
    }
}
