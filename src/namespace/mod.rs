//! Cross-module ownership of logical names (routes, parameters, resources, ...).

use std::sync::Arc;

use anyhow::{anyhow, Context as _, Result};
use indexmap::IndexMap;
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::error::{NamespaceConflict, UnresolvedValue};
use crate::graph::{Module, ModuleGraph};

pub mod loaders;

pub const PAGES: &str = "pages";
pub const STATIC: &str = "static";
pub const PARAMETERS: &str = "parameters";
pub const CONFIG: &str = "config";
pub const RESOURCES: &str = "resources";
pub const OUTPUTS: &str = "outputs";
pub const API: &str = "api";

/// Values one module declares in one namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceDeclaration {
    pub namespace: String,
    pub values: Vec<String>,
}

impl NamespaceDeclaration {
    pub fn new(namespace: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            namespace: namespace.into(),
            values,
        }
    }
}

/// A raw, possibly conflicting declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceClaim {
    pub namespace: String,
    pub value: String,
    pub module: String,
}

/// Inspects one module's own artifacts and reports what it declares.
pub trait NamespaceLoader: Send + Sync {
    fn name(&self) -> &str;

    fn load(&self, module: &Module) -> Result<Vec<NamespaceDeclaration>>;
}

/// Conflict-free ownership map, built once per run.
#[derive(Debug, Clone, Default)]
pub struct ResolvedNamespaces {
    owners: IndexMap<String, IndexMap<String, String>>,
    claims: Vec<NamespaceClaim>,
}

impl ResolvedNamespaces {
    pub fn owner(&self, namespace: &str, value: &str) -> Option<&str> {
        self.owners
            .get(namespace)
            .and_then(|m| m.get(value))
            .map(String::as_str)
    }

    pub fn contains(&self, namespace: &str, value: &str) -> bool {
        self.owner(namespace, value).is_some()
    }

    /// value -> owner for one namespace.
    pub fn values(&self, namespace: &str) -> Option<&IndexMap<String, String>> {
        self.owners.get(namespace)
    }

    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.owners.keys().map(String::as_str)
    }

    pub fn claims(&self) -> &[NamespaceClaim] {
        &self.claims
    }

    /// Everything `module` declared in `namespace`, whether or not it won.
    pub fn module_values(&self, module: &str, namespace: &str) -> Vec<&str> {
        self.claims
            .iter()
            .filter(|c| c.module == module && c.namespace == namespace)
            .map(|c| c.value.as_str())
            .collect()
    }

    /// Values in `namespace` whose resolved owner is `module`.
    pub fn owned_by(&self, module: &str, namespace: &str) -> Vec<&str> {
        self.owners
            .get(namespace)
            .map(|m| {
                m.iter()
                    .filter(|(_, owner)| owner.as_str() == module)
                    .map(|(v, _)| v.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Runs every loader against every module and resolves the resulting claims.
pub async fn resolve_namespaces(
    graph: &ModuleGraph,
    loaders: &[Arc<dyn NamespaceLoader>],
) -> Result<ResolvedNamespaces> {
    let claims = collect_claims(graph, loaders).await?;
    debug!(claims = claims.len(), "namespace claims collected");
    let resolved = resolve_claims(graph, claims)?;
    info!(
        namespaces = resolved.owners.len(),
        "namespace ownership resolved"
    );
    Ok(resolved)
}

async fn collect_claims(
    graph: &ModuleGraph,
    loaders: &[Arc<dyn NamespaceLoader>],
) -> Result<Vec<NamespaceClaim>> {
    let mut tasks = JoinSet::new();

    for (mi, module) in graph.modules().enumerate() {
        for (li, loader) in loaders.iter().enumerate() {
            let loader = Arc::clone(loader);
            let module = module.clone();
            tasks.spawn_blocking(move || {
                let declared = loader.load(&module).with_context(|| {
                    format!(
                        "namespace loader '{}' failed for module '{}'",
                        loader.name(),
                        module.name
                    )
                });
                (mi, li, module.name, declared)
            });
        }
    }

    let mut slots: Vec<(usize, usize, String, Vec<NamespaceDeclaration>)> = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        let (mi, li, module, declared) =
            joined.map_err(|e| anyhow!("namespace loader task failed: {e}"))?;
        slots.push((mi, li, module, declared?));
    }

    // Completion order is arbitrary; graph order then loader order is not.
    slots.sort_by_key(|(mi, li, _, _)| (*mi, *li));

    let mut claims = Vec::new();
    for (_, _, module, declared) in slots {
        for decl in declared {
            for value in decl.values {
                claims.push(NamespaceClaim {
                    namespace: decl.namespace.clone(),
                    value,
                    module: module.clone(),
                });
            }
        }
    }
    Ok(claims)
}

/// Assigns each (namespace, value) to one module. A claimant is dropped when another
/// claimant depends on it, transitively; more than one survivor leaves the value unresolved.
pub fn resolve_claims(
    graph: &ModuleGraph,
    claims: Vec<NamespaceClaim>,
) -> Result<ResolvedNamespaces, NamespaceConflict> {
    let mut groups: IndexMap<(&str, &str), Vec<&str>> = IndexMap::new();
    for c in &claims {
        let claimants = groups
            .entry((c.namespace.as_str(), c.value.as_str()))
            .or_default();
        if !claimants.contains(&c.module.as_str()) {
            claimants.push(c.module.as_str());
        }
    }

    let mut owners: IndexMap<String, IndexMap<String, String>> = IndexMap::new();
    let mut unresolved: Vec<UnresolvedValue> = Vec::new();

    for ((namespace, value), claimants) in groups {
        let survivors: Vec<&str> = claimants
            .iter()
            .copied()
            .filter(|m| {
                !claimants
                    .iter()
                    .any(|other| other != m && graph.is_dependency_of(m, other))
            })
            .collect();

        if let [owner] = survivors.as_slice() {
            owners
                .entry(namespace.to_string())
                .or_default()
                .insert(value.to_string(), owner.to_string());
        } else {
            unresolved.push(UnresolvedValue {
                namespace: namespace.to_string(),
                value: value.to_string(),
                claimants: claimants.iter().map(|m| m.to_string()).collect(),
            });
        }
    }

    if !unresolved.is_empty() {
        return Err(NamespaceConflict { unresolved });
    }

    Ok(ResolvedNamespaces { owners, claims })
}
