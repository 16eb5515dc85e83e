//! Module dependency resolution
//!
//! Computes the dependency closure of a set of manifests against a catalog,
//! checks version ranges, and produces a load order with dependencies first.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use tracing::{debug, warn};

use crate::module::registry::manifest::ModuleManifest;
use crate::module::registry::version::satisfies_range;

/// `available` value reported for a dependency missing from the catalog
pub const NOT_FOUND: &str = "not found";

/// `available` value reported for modules caught in a dependency cycle
pub const CIRCULAR: &str = "circular dependency";

/// Why a dependency could not be satisfied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConflictKind {
    /// Dependency absent from the catalog
    Missing,
    /// Dependency present but its version is outside the required range
    VersionMismatch,
    /// Module is part of a dependency cycle
    Cycle,
}

/// One unsatisfiable dependency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyConflict {
    /// Module declaring the dependency
    pub module: String,
    /// The dependency spec as declared (`name@range`)
    pub required: String,
    /// What the catalog offers (`name@version`, or a marker)
    pub available: String,
    pub kind: ConflictKind,
}

impl fmt::Display for DependencyConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} requires {} (available: {})",
            self.module, self.required, self.available
        )
    }
}

/// Dependency resolution result
#[derive(Debug, Clone, Default)]
pub struct DependencyResolution {
    /// Modules in load order (dependencies first)
    pub load_order: Vec<String>,
    /// Every manifest reached by the closure
    pub resolved: HashMap<String, ModuleManifest>,
    /// Unsatisfiable dependencies
    pub conflicts: Vec<DependencyConflict>,
}

impl DependencyResolution {
    pub fn is_ok(&self) -> bool {
        self.conflicts.is_empty()
    }
}

/// Dependency resolver
pub struct DependencyResolver;

impl DependencyResolver {
    /// Resolve the dependency closure of `requested` against `catalog`.
    ///
    /// Requested manifests overlay catalog entries of the same name. Ordering
    /// is deterministic: nodes are visited breadth-first in declaration order
    /// and ties in the topological sort break FIFO.
    pub fn resolve(
        requested: &[ModuleManifest],
        catalog: &HashMap<String, ModuleManifest>,
    ) -> DependencyResolution {
        let overlay: HashMap<&str, &ModuleManifest> = catalog
            .iter()
            .map(|(name, manifest)| (name.as_str(), manifest))
            .chain(requested.iter().map(|m| (m.name.as_str(), m)))
            .collect();

        let mut resolved: HashMap<String, ModuleManifest> = HashMap::new();
        let mut conflicts = Vec::new();
        // First-seen order of processed nodes
        let mut nodes: Vec<String> = Vec::new();
        // Edge A -> B: A depends on B
        let mut edges: Vec<(String, String)> = Vec::new();
        let mut edge_set: HashSet<(String, String)> = HashSet::new();
        let mut enqueued: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<&ModuleManifest> = VecDeque::new();

        for manifest in requested {
            if enqueued.insert(manifest.name.clone()) {
                queue.push_back(manifest);
            }
        }

        while let Some(manifest) = queue.pop_front() {
            if resolved.contains_key(&manifest.name) {
                continue;
            }
            resolved.insert(manifest.name.clone(), manifest.clone());
            nodes.push(manifest.name.clone());

            for (raw, dep) in manifest.dependencies.iter().zip(manifest.dependency_specs()) {
                let Some(dep_manifest) = overlay.get(dep.name.as_str()) else {
                    warn!("{} depends on missing module {}", manifest.name, dep.name);
                    conflicts.push(DependencyConflict {
                        module: manifest.name.clone(),
                        required: raw.clone(),
                        available: NOT_FOUND.to_string(),
                        kind: ConflictKind::Missing,
                    });
                    continue;
                };

                if !satisfies_range(&dep_manifest.version, &dep.range) {
                    warn!(
                        "{} requires {} but {}@{} is available",
                        manifest.name, raw, dep_manifest.name, dep_manifest.version
                    );
                    conflicts.push(DependencyConflict {
                        module: manifest.name.clone(),
                        required: raw.clone(),
                        available: format!("{}@{}", dep_manifest.name, dep_manifest.version),
                        kind: ConflictKind::VersionMismatch,
                    });
                    continue;
                }

                let edge = (manifest.name.clone(), dep_manifest.name.clone());
                if edge_set.insert(edge.clone()) {
                    edges.push(edge);
                }
                if enqueued.insert(dep_manifest.name.clone()) {
                    queue.push_back(*dep_manifest);
                }
            }
        }

        let (load_order, cyclic) = Self::topological_sort(&nodes, &edges);
        for module in cyclic {
            warn!("Module {} is part of a dependency cycle", module);
            conflicts.push(DependencyConflict {
                required: manifest_deps_label(&resolved, &module),
                module,
                available: CIRCULAR.to_string(),
                kind: ConflictKind::Cycle,
            });
        }

        debug!(
            "Dependency resolution complete: order={:?} conflicts={}",
            load_order,
            conflicts.len()
        );

        DependencyResolution {
            load_order,
            resolved,
            conflicts,
        }
    }

    /// Kahn's algorithm over dependency edges.
    ///
    /// In-degree counts how many nodes require a node, so the raw output lists
    /// dependents first; it is reversed before returning. Nodes never reaching
    /// in-degree zero are returned separately as cyclic.
    fn topological_sort(nodes: &[String], edges: &[(String, String)]) -> (Vec<String>, Vec<String>) {
        let mut in_degree: HashMap<&str, usize> =
            nodes.iter().map(|n| (n.as_str(), 0)).collect();
        let mut outgoing: HashMap<&str, Vec<&str>> = HashMap::new();

        for (from, to) in edges {
            outgoing.entry(from.as_str()).or_default().push(to.as_str());
            if let Some(degree) = in_degree.get_mut(to.as_str()) {
                *degree += 1;
            }
        }

        let mut queue: VecDeque<&str> = nodes
            .iter()
            .map(|n| n.as_str())
            .filter(|n| in_degree.get(n).copied() == Some(0))
            .collect();

        let mut sorted = Vec::with_capacity(nodes.len());
        while let Some(node) = queue.pop_front() {
            sorted.push(node.to_string());
            for &dep in outgoing.get(node).map(Vec::as_slice).unwrap_or_default() {
                if let Some(degree) = in_degree.get_mut(dep) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(dep);
                    }
                }
            }
        }

        // Unplaced nodes are cycle members or dependencies behind a cycle;
        // only the ones that can reach themselves are on a cycle.
        let placed: HashSet<&str> = sorted.iter().map(String::as_str).collect();
        let leftover: HashSet<&str> = nodes
            .iter()
            .map(String::as_str)
            .filter(|n| !placed.contains(n))
            .collect();
        let cyclic = nodes
            .iter()
            .filter(|n| leftover.contains(n.as_str()))
            .filter(|n| Self::reaches_itself(n, &outgoing, &leftover))
            .cloned()
            .collect();

        sorted.reverse();
        (sorted, cyclic)
    }

    /// Depth-first search from `start` within `within` looking for `start`
    fn reaches_itself(
        start: &str,
        outgoing: &HashMap<&str, Vec<&str>>,
        within: &HashSet<&str>,
    ) -> bool {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut stack: Vec<&str> = vec![start];
        while let Some(node) = stack.pop() {
            for &next in outgoing.get(node).map(Vec::as_slice).unwrap_or_default() {
                if next == start {
                    return true;
                }
                if within.contains(next) && visited.insert(next) {
                    stack.push(next);
                }
            }
        }
        false
    }

    /// True iff every dependency of `manifest` is present in `loaded` with a
    /// satisfying version.
    pub fn are_dependencies_satisfied(
        manifest: &ModuleManifest,
        loaded: &HashMap<String, ModuleManifest>,
    ) -> bool {
        manifest.dependency_specs().iter().all(|dep| {
            loaded
                .get(&dep.name)
                .map(|m| satisfies_range(&m.version, &dep.range))
                .unwrap_or(false)
        })
    }
}

fn manifest_deps_label(resolved: &HashMap<String, ModuleManifest>, module: &str) -> String {
    resolved
        .get(module)
        .map(|m| m.dependencies.join(", "))
        .unwrap_or_default()
}
