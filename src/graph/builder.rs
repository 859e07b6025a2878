use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use indexmap::IndexMap;
use tokio::task::JoinSet;
use tracing::{debug, info};

use super::{Manifest, Module, ModuleGraph, ModuleNode};
use crate::config::GraphConfig;
use crate::error::GraphError;

/// Derives a `ModuleGraph` from the packages materialized under a project directory.
#[derive(Debug, Clone)]
pub struct ModuleGraphBuilder {
    cfg: Arc<GraphConfig>,
}

/// A dependency declaration waiting to be resolved.
#[derive(Debug, Clone)]
struct PendingEdge {
    parent_dir: PathBuf,
    parent_name: String,
    dep: String,
}

#[derive(Debug)]
struct EdgeOutcome {
    parent_dir: PathBuf,
    dep: String,
    child_dir: PathBuf,
    /// Set only for the task that claimed `child_dir` first.
    manifest: Option<Manifest>,
}

type InFlight = Arc<Mutex<HashSet<PathBuf>>>;

impl ModuleGraphBuilder {
    pub fn new(cfg: GraphConfig) -> Self {
        Self { cfg: Arc::new(cfg) }
    }

    pub async fn build(&self, start: &Path) -> Result<ModuleGraph, GraphError> {
        let root_dir = canonical(start).await?;
        let root_manifest = Manifest::read(&root_dir.join(&self.cfg.manifest)).await?;

        if !root_manifest.is_module(&self.cfg.marker) {
            return Err(GraphError::NotAModule {
                path: root_dir,
                marker: self.cfg.marker.clone(),
            });
        }
        root_manifest.validate_name(&root_dir)?;

        let in_flight: InFlight = Arc::new(Mutex::new(HashSet::from([root_dir.clone()])));

        // package dir -> manifest, modules only
        let mut packages: BTreeMap<PathBuf, Manifest> = BTreeMap::new();
        // (parent dir, dependency name) -> resolved package dir
        let mut resolved: HashMap<(PathBuf, String), PathBuf> = HashMap::new();

        let mut wave = pending_edges(&root_dir, &root_manifest);
        packages.insert(root_dir.clone(), root_manifest);

        let mut wave_no = 0usize;
        while !wave.is_empty() {
            wave_no += 1;
            debug!(wave = wave_no, edges = wave.len(), "resolving dependency wave");

            let mut tasks = JoinSet::new();
            for edge in wave.drain(..) {
                let cfg = Arc::clone(&self.cfg);
                let in_flight = Arc::clone(&in_flight);
                tasks.spawn(async move { visit_edge(&cfg, &in_flight, edge).await });
            }

            let mut next = Vec::new();
            while let Some(joined) = tasks.join_next().await {
                let outcome = joined.map_err(|e| GraphError::Task(e.to_string()))??;

                resolved.insert(
                    (outcome.parent_dir.clone(), outcome.dep.clone()),
                    outcome.child_dir.clone(),
                );

                let Some(manifest) = outcome.manifest else {
                    continue;
                };

                if !manifest.is_module(&self.cfg.marker) {
                    debug!(package = %manifest.name, "skipping package without module marker");
                    continue;
                }
                manifest.validate_name(&outcome.child_dir)?;

                next.extend(pending_edges(&outcome.child_dir, &manifest));
                packages.insert(outcome.child_dir, manifest);
            }

            wave = next;
        }

        check_duplicates(&packages)?;

        let mut nodes: Vec<ModuleNode> = Vec::with_capacity(packages.len());
        let mut root_name = String::new();

        for (dir, manifest) in packages.iter() {
            let is_root = *dir == root_dir;
            if is_root {
                root_name = manifest.name.clone();
            }

            let mut children: Vec<String> = Vec::new();
            for dep in manifest.dependencies.keys() {
                let Some(child_dir) = resolved.get(&(dir.clone(), dep.clone())) else {
                    continue;
                };
                let Some(child) = packages.get(child_dir) else {
                    continue;
                };
                if !children.contains(&child.name) {
                    children.push(child.name.clone());
                }
            }

            nodes.push(ModuleNode {
                module: Module {
                    name: manifest.name.clone(),
                    version: manifest.version.clone(),
                    root: dir.clone(),
                    is_root,
                },
                parents: Vec::new(),
                children,
            });
        }

        let graph = ModuleGraph::from_nodes(&root_name, nodes)?;
        info!(root = %root_name, modules = graph.len(), "module graph built");
        Ok(graph)
    }
}

fn pending_edges(dir: &Path, manifest: &Manifest) -> Vec<PendingEdge> {
    manifest
        .dependencies
        .keys()
        .map(|dep| PendingEdge {
            parent_dir: dir.to_path_buf(),
            parent_name: manifest.name.clone(),
            dep: dep.clone(),
        })
        .collect()
}

async fn visit_edge(
    cfg: &GraphConfig,
    in_flight: &InFlight,
    edge: PendingEdge,
) -> Result<EdgeOutcome, GraphError> {
    let child_dir = locate_package(cfg, &edge.parent_dir, &edge.dep)
        .await?
        .ok_or_else(|| GraphError::DependencyNotFound {
            name: edge.dep.clone(),
            parent: edge.parent_name.clone(),
            from: edge.parent_dir.clone(),
        })?;

    let claimed = match in_flight.lock() {
        Ok(mut set) => set.insert(child_dir.clone()),
        Err(poisoned) => poisoned.into_inner().insert(child_dir.clone()),
    };

    let manifest = if claimed {
        Some(Manifest::read(&child_dir.join(&cfg.manifest)).await?)
    } else {
        None
    };

    Ok(EdgeOutcome {
        parent_dir: edge.parent_dir,
        dep: edge.dep,
        child_dir,
        manifest,
    })
}

/// Node-style lookup: `<dir>/<deps_dir>/<name>`, ascending until a manifest is found.
async fn locate_package(
    cfg: &GraphConfig,
    from: &Path,
    name: &str,
) -> Result<Option<PathBuf>, GraphError> {
    for dir in from.ancestors() {
        let candidate = dir.join(&cfg.deps_dir).join(name);
        let manifest = candidate.join(&cfg.manifest);
        let exists = tokio::fs::try_exists(&manifest)
            .await
            .map_err(|source| GraphError::Io {
                path: manifest.clone(),
                source,
            })?;
        if exists {
            return Ok(Some(canonical(&candidate).await?));
        }
    }
    Ok(None)
}

async fn canonical(path: &Path) -> Result<PathBuf, GraphError> {
    tokio::fs::canonicalize(path)
        .await
        .map_err(|source| GraphError::Io {
            path: path.to_path_buf(),
            source,
        })
}

fn check_duplicates(packages: &BTreeMap<PathBuf, Manifest>) -> Result<(), GraphError> {
    let mut by_name: IndexMap<&str, Vec<PathBuf>> = IndexMap::new();
    for (dir, manifest) in packages {
        by_name
            .entry(manifest.name.as_str())
            .or_default()
            .push(dir.clone());
    }

    let dups: Vec<(String, Vec<PathBuf>)> = by_name
        .into_iter()
        .filter(|(_, dirs)| dirs.len() > 1)
        .map(|(name, dirs)| (name.to_string(), dirs))
        .collect();

    if dups.is_empty() {
        Ok(())
    } else {
        Err(GraphError::DuplicateModule(dups))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_pkg(dir: &Path, name: &str, deps: &[&str], module: bool) {
        fs::create_dir_all(dir).unwrap();
        let deps: serde_json::Map<String, serde_json::Value> = deps
            .iter()
            .map(|d| (d.to_string(), serde_json::json!("*")))
            .collect();
        let mut manifest = serde_json::json!({
            "name": name,
            "version": "1.0.0",
            "dependencies": deps,
        });
        if module {
            manifest["mosaic"] = serde_json::json!({});
        }
        fs::write(dir.join("package.json"), manifest.to_string()).unwrap();
    }

    fn builder() -> ModuleGraphBuilder {
        ModuleGraphBuilder::new(GraphConfig::default())
    }

    #[tokio::test]
    async fn diamond_yields_one_node_per_module() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("app");
        let nm = root.join("node_modules");
        write_pkg(&root, "app", &["ui", "api"], true);
        write_pkg(&nm.join("ui"), "ui", &["core"], true);
        write_pkg(&nm.join("api"), "api", &["core"], true);
        write_pkg(&nm.join("core"), "core", &[], true);

        let graph = builder().build(&root).await.unwrap();

        assert_eq!(graph.len(), 4);
        assert_eq!(graph.root_name(), "app");
        assert_eq!(graph.order(), &["app", "ui", "api", "core"]);

        let core = graph.node("core").unwrap();
        assert_eq!(core.parents.len(), 2);
        assert!(core.parents.contains(&"ui".to_string()));
        assert!(core.parents.contains(&"api".to_string()));
    }

    #[tokio::test]
    async fn nested_dependency_is_found_by_ascending() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("app");
        let nm = root.join("node_modules");
        write_pkg(&root, "app", &["ui"], true);
        // ui resolves "core" from its own node_modules first
        write_pkg(&nm.join("ui"), "ui", &["core", "shared"], true);
        write_pkg(&nm.join("ui").join("node_modules").join("core"), "core", &[], true);
        // and "shared" by ascending to the project-level node_modules
        write_pkg(&nm.join("shared"), "shared", &[], true);

        let graph = builder().build(&root).await.unwrap();
        let core = graph.module("core").unwrap();
        assert!(core.root.ends_with("ui/node_modules/core"));
        assert!(graph.contains("shared"));
    }

    #[tokio::test]
    async fn non_module_packages_are_ignored() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("app");
        let nm = root.join("node_modules");
        write_pkg(&root, "app", &["lodash", "ui"], true);
        write_pkg(&nm.join("lodash"), "lodash", &["not-installed"], false);
        write_pkg(&nm.join("ui"), "ui", &[], true);

        let graph = builder().build(&root).await.unwrap();
        assert_eq!(graph.order(), &["app", "ui"]);
        assert_eq!(graph.node("app").unwrap().children, vec!["ui".to_string()]);
    }

    #[tokio::test]
    async fn root_without_marker_is_rejected() {
        let temp = TempDir::new().unwrap();
        write_pkg(temp.path(), "plain", &[], false);

        let err = builder().build(temp.path()).await.unwrap_err();
        assert!(matches!(err, GraphError::NotAModule { .. }));
    }

    #[tokio::test]
    async fn missing_dependency_is_reported() {
        let temp = TempDir::new().unwrap();
        write_pkg(temp.path(), "app", &["ghost"], true);

        let err = builder().build(temp.path()).await.unwrap_err();
        match err {
            GraphError::DependencyNotFound { name, parent, .. } => {
                assert_eq!(name, "ghost");
                assert_eq!(parent, "app");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn same_name_in_two_locations_is_a_duplicate() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("app");
        let nm = root.join("node_modules");
        write_pkg(&root, "app", &["ui", "api"], true);
        write_pkg(&nm.join("ui"), "ui", &["core"], true);
        write_pkg(&nm.join("ui").join("node_modules").join("core"), "core", &[], true);
        write_pkg(&nm.join("api"), "api", &["core"], true);
        write_pkg(&nm.join("core"), "core", &[], true);

        let err = builder().build(&root).await.unwrap_err();
        let msg = err.to_string();
        match err {
            GraphError::DuplicateModule(dups) => {
                assert_eq!(dups.len(), 1);
                assert_eq!(dups[0].0, "core");
                assert_eq!(dups[0].1.len(), 2);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(msg.contains("ui/node_modules/core"));
    }
}
