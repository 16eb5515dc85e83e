//! Module loading capability

pub mod loader;

pub use loader::{
    api_fn, extract_api, ApiFunction, Export, ModuleApi, ModuleExports, ModuleLoader,
    StaticModuleLoader, API_EXPORT,
};
