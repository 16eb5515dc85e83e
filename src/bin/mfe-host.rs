//! Operator tool for an MFE module catalog
//!
//! Validates manifests, shows dependency load orders, previews intent plans
//! and answers permission questions without loading any module code.
//!
//! Usage:
//!   mfe-host --catalog manifests/ validate
//!   mfe-host --catalog catalog.toml resolve orders
//!   mfe-host --config orchestrator.toml plan "open order 123 and mark as shipped"
//!   mfe-host --catalog manifests/ check reporting orders openOrder

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use mfe_orchestrator::config::OrchestratorConfig;
use mfe_orchestrator::intent::IntentBridge;
use mfe_orchestrator::module::registry::ManifestCatalog;
use mfe_orchestrator::module::validation::{ManifestValidator, ValidationResult};
use mfe_orchestrator::module::{
    DependencyResolver, ModuleManager, PermissionsManager, StaticModuleLoader,
};
use mfe_orchestrator::utils::init_logging_from_config;

#[derive(Parser, Debug)]
#[command(name = "mfe-host", version, about = "Inspect and exercise an MFE module catalog")]
struct Args {
    /// Orchestrator configuration file (.toml or .json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Manifest directory or catalog file, in addition to the configured sources
    #[arg(long)]
    catalog: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate every registered manifest
    Validate,
    /// Print the load order and conflicts for the named modules
    Resolve {
        #[arg(required = true)]
        modules: Vec<String>,
    },
    /// Show the plan an intent would produce, without executing it
    Plan { text: String },
    /// Check whether `caller` may call `target.method`
    Check {
        caller: String,
        target: String,
        method: String,
    },
    /// List registered modules
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => OrchestratorConfig::from_file(path)
            .with_context(|| format!("Failed to load config {:?}", path))?,
        None => OrchestratorConfig::default(),
    };
    init_logging_from_config(config.logging.as_ref());

    let manager = Arc::new(ModuleManager::from_config(
        Arc::new(StaticModuleLoader::new()),
        &config,
    ));
    let registered = register_sources(&manager, &config, args.catalog.as_deref()).await?;
    info!("Registered {} manifests", registered);

    match args.command {
        Command::Validate => {
            let validator = ManifestValidator::new();
            let mut invalid = 0;
            for manifest in manager.manifests().await {
                match validator.validate(&manifest) {
                    ValidationResult::Valid => println!("ok      {}@{}", manifest.name, manifest.version),
                    ValidationResult::Invalid(errors) => {
                        invalid += 1;
                        println!("invalid {}@{}", manifest.name, manifest.version);
                        for error in errors {
                            println!("        - {}", error);
                        }
                    }
                }
                for warning in PermissionsManager::validate_manifest_permissions(&manifest) {
                    println!("        ! {}", warning);
                }
            }
            if invalid > 0 {
                anyhow::bail!("{} manifest(s) failed validation", invalid);
            }
        }
        Command::Resolve { modules } => {
            let catalog = manager.catalog().await;
            let requested = modules
                .iter()
                .map(|name| {
                    catalog
                        .get(name)
                        .cloned()
                        .with_context(|| format!("Module {} is not registered", name))
                })
                .collect::<anyhow::Result<Vec<_>>>()?;
            let resolution = DependencyResolver::resolve(&requested, &catalog);
            print_json(&json!({
                "loadOrder": resolution.load_order,
                "conflicts": resolution.conflicts,
            }))?;
        }
        Command::Plan { text } => {
            let bridge = IntentBridge::with_config(Arc::clone(&manager), &config.intent);
            print_json(&bridge.process_intent(&text).await)?;
        }
        Command::Check {
            caller,
            target,
            method,
        } => {
            let decision = manager
                .permissions()
                .can_call_module(&caller, &target, &method);
            print_json(&decision)?;
        }
        Command::List => {
            print_json(&manager.list_modules().await)?;
        }
    }

    Ok(())
}

async fn register_sources(
    manager: &ModuleManager,
    config: &OrchestratorConfig,
    extra: Option<&Path>,
) -> anyhow::Result<usize> {
    let mut sources: Vec<PathBuf> = Vec::new();
    if let Some(dir) = &config.catalog.manifests_dir {
        sources.push(PathBuf::from(dir));
    }
    if let Some(file) = &config.catalog.catalog_file {
        sources.push(PathBuf::from(file));
    }
    if let Some(path) = extra {
        sources.push(path.to_path_buf());
    }

    let mut count = 0;
    for source in sources {
        debug!("Registering manifests from {:?}", source);
        if source.is_dir() {
            count += manager.register_discovered(&source).await?;
        } else {
            let catalog = ManifestCatalog::from_file(&source)
                .with_context(|| format!("Failed to load catalog {:?}", source))?;
            count += manager.register_catalog(catalog).await;
        }
    }
    Ok(count)
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
