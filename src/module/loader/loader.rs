//! Module loader capability
//!
//! The orchestrator never fetches or executes module code itself. An embedder
//! supplies a [`ModuleLoader`] that maps a locator to the module's exported
//! symbols. Callable API methods must be exported as
//! [`Export::Function`] values inside an `api` object; everything else is
//! carried as opaque data.

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Invocable API method
///
/// Receives the call arguments and resolves to a result or an error message.
pub type ApiFunction =
    Arc<dyn Fn(Vec<Value>) -> BoxFuture<'static, Result<Value, String>> + Send + Sync>;

/// Wrap an async closure as an [`ApiFunction`]
pub fn api_fn<F, Fut>(f: F) -> ApiFunction
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, String>> + Send + 'static,
{
    Arc::new(move |args| f(args).boxed())
}

/// One exported symbol
#[derive(Clone)]
pub enum Export {
    Function(ApiFunction),
    Object(BTreeMap<String, Export>),
    Data(Value),
}

impl Export {
    pub fn is_function(&self) -> bool {
        matches!(self, Export::Function(_))
    }
}

impl fmt::Debug for Export {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Export::Function(_) => f.write_str("Function(..)"),
            Export::Object(members) => f.debug_map().entries(members.iter()).finish(),
            Export::Data(value) => write!(f, "Data({})", value),
        }
    }
}

/// Exported symbols of one module, keyed by symbol name
pub type ModuleExports = BTreeMap<String, Export>;

/// Callable API methods, keyed by method name
pub type ModuleApi = BTreeMap<String, ApiFunction>;

/// Name of the export that holds a module's API object
pub const API_EXPORT: &str = "api";

/// Extract the callable members of `exports.api`
///
/// Returns `None` when there is no `api` export or it is not an object.
/// Non-function members are skipped.
pub fn extract_api(exports: &ModuleExports) -> Option<ModuleApi> {
    let Some(Export::Object(members)) = exports.get(API_EXPORT) else {
        return None;
    };

    let api = members
        .iter()
        .filter_map(|(name, export)| match export {
            Export::Function(f) => Some((name.clone(), Arc::clone(f))),
            _ => {
                debug!("Skipping non-callable api member {}", name);
                None
            }
        })
        .collect();
    Some(api)
}

/// Capability that fetches a module and returns its exports
#[async_trait]
pub trait ModuleLoader: Send + Sync {
    /// Load the module at `locator`
    ///
    /// Errors are reported to callers as load failures carrying the message.
    async fn load(&self, locator: &str) -> anyhow::Result<ModuleExports>;
}

/// In-memory loader keyed by locator
///
/// Useful for embedding modules compiled into the host and for tests.
#[derive(Default)]
pub struct StaticModuleLoader {
    modules: RwLock<HashMap<String, ModuleExports>>,
}

impl StaticModuleLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register exports under a locator, replacing any previous entry
    pub fn register(&self, locator: &str, exports: ModuleExports) {
        self.modules
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(locator.to_string(), exports);
    }

    /// Register a module whose only export is an `api` object
    pub fn register_api<I>(&self, locator: &str, methods: I)
    where
        I: IntoIterator<Item = (&'static str, ApiFunction)>,
    {
        let api = methods
            .into_iter()
            .map(|(name, f)| (name.to_string(), Export::Function(f)))
            .collect();
        let mut exports = ModuleExports::new();
        exports.insert(API_EXPORT.to_string(), Export::Object(api));
        self.register(locator, exports);
    }

    pub fn remove(&self, locator: &str) -> bool {
        self.modules
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(locator)
            .is_some()
    }
}

#[async_trait]
impl ModuleLoader for StaticModuleLoader {
    async fn load(&self, locator: &str) -> anyhow::Result<ModuleExports> {
        self.modules
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(locator)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("No module registered at {}", locator))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_static_loader_round_trip() {
        let loader = StaticModuleLoader::new();
        loader.register_api(
            "mem://echo",
            [("echo", api_fn(|args| async move { Ok(json!(args)) }))],
        );

        let exports = loader.load("mem://echo").await.unwrap();
        let api = extract_api(&exports).unwrap();
        let result = (api["echo"])(vec![json!(1), json!("two")]).await.unwrap();
        assert_eq!(result, json!([1, "two"]));

        let err = loader.load("mem://missing").await.unwrap_err();
        assert!(err.to_string().contains("mem://missing"));
    }

    #[test]
    fn test_extract_api_skips_data_members() {
        let mut api = BTreeMap::new();
        api.insert(
            "ping".to_string(),
            Export::Function(api_fn(|_| async { Ok(Value::Null) })),
        );
        api.insert("version".to_string(), Export::Data(json!("1.0.0")));
        let mut exports = ModuleExports::new();
        exports.insert(API_EXPORT.to_string(), Export::Object(api));
        exports.insert("default".to_string(), Export::Data(json!({"widget": true})));

        let extracted = extract_api(&exports).unwrap();
        assert_eq!(extracted.keys().collect::<Vec<_>>(), vec!["ping"]);
    }

    #[test]
    fn test_extract_api_requires_object() {
        let mut exports = ModuleExports::new();
        exports.insert(API_EXPORT.to_string(), Export::Data(json!({"ping": true})));
        assert!(extract_api(&exports).is_none());
        assert!(extract_api(&ModuleExports::new()).is_none());
    }
}
