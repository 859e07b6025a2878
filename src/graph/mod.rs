//! Module dependency graph derived from the packages installed on disk.

use std::collections::{BTreeSet, HashSet, VecDeque};
use std::path::PathBuf;

use indexmap::{IndexMap, IndexSet};

use crate::error::GraphError;

pub mod builder;
pub mod manifest;

pub use builder::ModuleGraphBuilder;
pub use manifest::Manifest;

/// A package participating in composition. One per distinct module name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    pub name: String,
    pub version: String,
    pub root: PathBuf,
    pub is_root: bool,
}

#[derive(Debug, Clone)]
pub struct ModuleNode {
    pub module: Module,
    /// Modules that directly depend on this one.
    pub parents: Vec<String>,
    /// Modules this one directly depends on, in declaration order.
    pub children: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ModuleGraph {
    root: String,
    nodes: IndexMap<String, ModuleNode>,
    order: Vec<String>,
}

impl ModuleGraph {
    /// Assembles a graph from nodes whose `children` are already wired.
    /// `parents` are recomputed from the children edges.
    pub fn from_nodes(root: &str, nodes: Vec<ModuleNode>) -> Result<Self, GraphError> {
        let mut by_name: IndexMap<String, ModuleNode> = IndexMap::with_capacity(nodes.len());
        for mut node in nodes {
            node.parents.clear();
            by_name.insert(node.module.name.clone(), node);
        }

        let edges: Vec<(String, String)> = by_name
            .values()
            .flat_map(|n| {
                n.children
                    .iter()
                    .map(move |c| (n.module.name.clone(), c.clone()))
            })
            .collect();

        for (parent, child) in edges {
            let Some(node) = by_name.get_mut(&child) else {
                return Err(GraphError::Manifest {
                    path: PathBuf::from(&parent),
                    message: format!("edge to unknown module '{child}'"),
                });
            };
            if !node.parents.contains(&parent) {
                node.parents.push(parent);
            }
        }

        if !by_name.contains_key(root) {
            return Err(GraphError::Manifest {
                path: PathBuf::from(root),
                message: "root module is not part of the graph".to_string(),
            });
        }

        let order = topo_order(root, &by_name)?;

        Ok(Self {
            root: root.to_string(),
            nodes: by_name,
            order,
        })
    }

    pub fn root_name(&self) -> &str {
        &self.root
    }

    pub fn root(&self) -> &Module {
        &self.nodes[self.root.as_str()].module
    }

    pub fn node(&self, name: &str) -> Option<&ModuleNode> {
        self.nodes.get(name)
    }

    pub fn module(&self, name: &str) -> Option<&Module> {
        self.nodes.get(name).map(|n| &n.module)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Every module appears before all of its own dependencies.
    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// Position of a module in `order`.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.order.iter().position(|n| n == name)
    }

    /// Modules in `order`.
    pub fn modules(&self) -> impl Iterator<Item = &Module> {
        self.order.iter().map(move |n| &self.nodes[n.as_str()].module)
    }

    /// True if `dep` is reachable from `of` through `children` edges.
    pub fn is_dependency_of(&self, dep: &str, of: &str) -> bool {
        if dep == of {
            return false;
        }
        self.dependencies_of(of).contains(dep)
    }

    /// All transitive dependencies of `name`, breadth-first.
    pub fn dependencies_of(&self, name: &str) -> IndexSet<&str> {
        let mut seen: IndexSet<&str> = IndexSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();

        if let Some(node) = self.nodes.get(name) {
            queue.extend(node.children.iter().map(String::as_str));
        }

        while let Some(next) = queue.pop_front() {
            if next == name || !seen.insert(next) {
                continue;
            }
            if let Some(node) = self.nodes.get(next) {
                queue.extend(node.children.iter().map(String::as_str));
            }
        }

        seen
    }

    /// True if `name` is `of` itself or one of its transitive dependencies.
    pub fn is_visible_from(&self, name: &str, of: &str) -> bool {
        name == of || self.is_dependency_of(name, of)
    }
}

/// Kahn's algorithm seeded by the root; children are released in declaration order,
/// so the result is breadth-first from the root while keeping parents ahead of children.
fn topo_order(root: &str, nodes: &IndexMap<String, ModuleNode>) -> Result<Vec<String>, GraphError> {
    let mut indeg: IndexMap<&str, usize> = nodes
        .iter()
        .map(|(k, n)| (k.as_str(), n.parents.len()))
        .collect();

    let mut ready: VecDeque<&str> = VecDeque::new();
    if indeg.get(root).copied() == Some(0) {
        ready.push_back(root);
    }

    let mut order: Vec<String> = Vec::with_capacity(nodes.len());
    let mut placed: HashSet<&str> = HashSet::new();

    while let Some(name) = ready.pop_front() {
        if !placed.insert(name) {
            continue;
        }
        order.push(name.to_string());

        for child in nodes[name].children.iter() {
            if let Some(d) = indeg.get_mut(child.as_str()) {
                *d -= 1;
                if *d == 0 {
                    ready.push_back(child.as_str());
                }
            }
        }
    }

    if order.len() != nodes.len() {
        let stuck: BTreeSet<String> = nodes
            .keys()
            .filter(|k| !placed.contains(k.as_str()))
            .cloned()
            .collect();
        return Err(GraphError::DependencyCycle(stuck.into_iter().collect()));
    }

    Ok(order)
}

#[cfg(test)]
pub(crate) fn graph_from_edges(root: &str, edges: &[(&str, &[&str])]) -> ModuleGraph {
    let nodes = edges
        .iter()
        .map(|(name, children)| ModuleNode {
            module: Module {
                name: name.to_string(),
                version: "1.0.0".to_string(),
                root: PathBuf::from(format!("/modules/{name}")),
                is_root: *name == root,
            },
            parents: Vec::new(),
            children: children.iter().map(|c| c.to_string()).collect(),
        })
        .collect();
    ModuleGraph::from_nodes(root, nodes).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_keeps_parents_before_children() {
        // root -> a, root -> b, b -> a: plain BFS would emit a before b.
        let g = graph_from_edges("root", &[("root", &["a", "b"]), ("a", &[]), ("b", &["a"])]);
        assert_eq!(g.order(), &["root", "b", "a"]);

        for name in g.order() {
            let node = g.node(name).unwrap();
            for child in &node.children {
                assert!(g.position(name) < g.position(child));
            }
        }
    }

    #[test]
    fn parents_are_derived_from_children() {
        let g = graph_from_edges(
            "m1",
            &[("m1", &["m2", "m3"]), ("m2", &[]), ("m3", &["m4"]), ("m4", &[])],
        );
        assert_eq!(g.node("m4").unwrap().parents, vec!["m3".to_string()]);
        assert_eq!(g.node("m1").unwrap().parents, Vec::<String>::new());
        assert_eq!(g.order(), &["m1", "m2", "m3", "m4"]);
        assert!(g.root().is_root);
    }

    #[test]
    fn reachability_is_transitive() {
        let g = graph_from_edges(
            "m1",
            &[("m1", &["m2", "m3"]), ("m2", &[]), ("m3", &["m4"]), ("m4", &[])],
        );
        assert!(g.is_dependency_of("m4", "m1"));
        assert!(g.is_dependency_of("m4", "m3"));
        assert!(!g.is_dependency_of("m4", "m2"));
        assert!(!g.is_dependency_of("m1", "m1"));
        assert!(g.is_visible_from("m3", "m3"));
    }

    #[test]
    fn cycle_is_reported() {
        let nodes = vec![
            node("root", &["a"]),
            node("a", &["b"]),
            node("b", &["a"]),
        ];
        let err = ModuleGraph::from_nodes("root", nodes).unwrap_err();
        match err {
            GraphError::DependencyCycle(stuck) => assert_eq!(stuck, vec!["a", "b"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    fn node(name: &str, children: &[&str]) -> ModuleNode {
        ModuleNode {
            module: Module {
                name: name.to_string(),
                version: "0.1.0".to_string(),
                root: PathBuf::from(name),
                is_root: name == "root",
            },
            parents: Vec::new(),
            children: children.iter().map(|c| c.to_string()).collect(),
        }
    }
}
