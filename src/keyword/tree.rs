//! Arena-backed JSON tree. Nodes refer to their parent by index so a node's
//! location can be rebuilt for diagnostics without owning back-references.

use std::sync::OnceLock;

use indexmap::IndexMap;
use regex::Regex;
use serde_json::{Map, Value};

pub type NodeId = usize;

/// Where a node sits inside its parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot {
    Root,
    Index(usize),
    Key(String),
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Primitive(Value),
    Array(Vec<NodeId>),
    Object(IndexMap<String, NodeId>),
}

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub slot: Slot,
}

#[derive(Debug, Clone)]
pub struct JsonTree {
    nodes: Vec<Node>,
    root: NodeId,
}

impl JsonTree {
    pub fn parse(value: &Value) -> Self {
        let mut tree = Self {
            nodes: Vec::new(),
            root: 0,
        };
        tree.root = tree.graft(value, None, Slot::Root);
        tree
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Adds `value` to the arena as if it sat at `slot` under `parent`.
    /// The parent is not modified.
    pub fn graft(&mut self, value: &Value, parent: Option<NodeId>, slot: Slot) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node {
            kind: NodeKind::Primitive(Value::Null),
            parent,
            slot,
        });

        let kind = match value {
            Value::Array(items) => NodeKind::Array(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, v)| self.graft(v, Some(id), Slot::Index(i)))
                    .collect(),
            ),
            Value::Object(props) => NodeKind::Object(
                props
                    .iter()
                    .map(|(k, v)| (k.clone(), self.graft(v, Some(id), Slot::Key(k.clone()))))
                    .collect(),
            ),
            other => NodeKind::Primitive(other.clone()),
        };

        self.nodes[id].kind = kind;
        id
    }

    pub fn properties(&self, id: NodeId) -> Option<&IndexMap<String, NodeId>> {
        match &self.nodes[id].kind {
            NodeKind::Object(props) => Some(props),
            _ => None,
        }
    }

    pub fn property(&self, id: NodeId, key: &str) -> Option<NodeId> {
        self.properties(id).and_then(|p| p.get(key).copied())
    }

    /// The property name this node is stored under, if any.
    pub fn key(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id].slot {
            Slot::Key(k) => Some(k),
            _ => None,
        }
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    /// `a.b[0]["odd key"]`; the root is `$`.
    pub fn path(&self, id: NodeId) -> String {
        let mut slots: Vec<&Slot> = Vec::new();
        let mut cur = Some(id);
        while let Some(n) = cur {
            let node = &self.nodes[n];
            if node.slot != Slot::Root {
                slots.push(&node.slot);
            }
            cur = node.parent;
        }

        if slots.is_empty() {
            return "$".to_string();
        }

        let mut out = String::new();
        for slot in slots.into_iter().rev() {
            match slot {
                Slot::Index(i) => out.push_str(&format!("[{i}]")),
                Slot::Key(k) if plain_key_re().is_match(k) => {
                    if !out.is_empty() {
                        out.push('.');
                    }
                    out.push_str(k);
                }
                Slot::Key(k) => {
                    let quoted = serde_json::to_string(k).unwrap_or_else(|_| format!("\"{k}\""));
                    out.push_str(&format!("[{quoted}]"));
                }
                Slot::Root => {}
            }
        }
        out
    }

    /// Rebuilds the plain JSON value below `id`.
    pub fn construct_json(&self, id: NodeId) -> Value {
        match &self.nodes[id].kind {
            NodeKind::Primitive(v) => v.clone(),
            NodeKind::Array(items) => {
                Value::Array(items.iter().map(|c| self.construct_json(*c)).collect())
            }
            NodeKind::Object(props) => {
                let mut map = Map::with_capacity(props.len());
                for (k, c) in props {
                    map.insert(k.clone(), self.construct_json(*c));
                }
                Value::Object(map)
            }
        }
    }
}

fn plain_key_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$\-]*$").expect("plain key pattern is valid"))
}
