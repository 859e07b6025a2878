//! Folds `Extend` markers produced by the `EXTEND` keyword into their targets.

use std::collections::VecDeque;

use indexmap::IndexMap;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::ExtendError;

pub const EXTEND_MARKER: &str = "Extend";

#[derive(Debug, Clone, PartialEq, Eq)]
struct Edge {
    from: String,
    to: String,
}

/// Merges every extending resource into the resource it extends and removes it.
///
/// Chains fold deepest-first: when `A` extends `B` and `B` extends `C`, `A` is merged
/// into `B` before `B` is merged into `C`. Returns the number of merged resources.
pub fn merge_extensions(resources: &mut Map<String, Value>) -> Result<usize, ExtendError> {
    let edges = collect_edges(resources)?;
    if edges.is_empty() {
        return Ok(0);
    }

    for edge in edges.values() {
        match resources.get(&edge.to) {
            None => {
                return Err(ExtendError::MissingTarget {
                    from: edge.from.clone(),
                    to: edge.to.clone(),
                })
            }
            Some(v) if !v.is_object() => return Err(ExtendError::NotAnObject(edge.to.clone())),
            Some(_) => {}
        }
    }

    detect_cycle(&edges)?;

    for edge in merge_order(&edges) {
        let Some(Value::Object(mut body)) = resources.shift_remove(&edge.from) else {
            return Err(ExtendError::NotAnObject(edge.from.clone()));
        };
        body.remove(EXTEND_MARKER);

        let Some(Value::Object(target)) = resources.get_mut(&edge.to) else {
            return Err(ExtendError::NotAnObject(edge.to.clone()));
        };
        deep_merge(target, body);
        debug!(from = %edge.from, to = %edge.to, "resource extension merged");
    }

    Ok(edges.len())
}

/// Extending resources in document order, keyed by their own id.
fn collect_edges(resources: &Map<String, Value>) -> Result<IndexMap<String, Edge>, ExtendError> {
    let mut edges = IndexMap::new();

    for (id, body) in resources {
        let Some(marker) = body.get(EXTEND_MARKER) else {
            continue;
        };
        let malformed = |message: &str| ExtendError::MalformedMarker {
            id: id.clone(),
            message: message.to_string(),
        };

        let from = marker
            .get("from")
            .and_then(Value::as_str)
            .ok_or_else(|| malformed("missing string field \"from\""))?;
        let to = marker
            .get("to")
            .and_then(Value::as_str)
            .ok_or_else(|| malformed("missing string field \"to\""))?;

        if from != id {
            return Err(malformed(&format!("\"from\" is {from}, expected {id}")));
        }
        if to == id {
            return Err(ExtendError::Cycle(vec![id.clone(), id.clone()]));
        }

        edges.insert(
            id.clone(),
            Edge {
                from: from.to_string(),
                to: to.to_string(),
            },
        );
    }

    Ok(edges)
}

/// Every resource extends at most one target, so each chain is a simple walk.
fn detect_cycle(edges: &IndexMap<String, Edge>) -> Result<(), ExtendError> {
    for start in edges.keys() {
        let mut path: Vec<&str> = vec![start.as_str()];
        let mut cur = start.as_str();

        while let Some(edge) = edges.get(cur) {
            let next = edge.to.as_str();
            if let Some(pos) = path.iter().position(|p| *p == next) {
                let mut cycle: Vec<String> = path[pos..].iter().map(|s| s.to_string()).collect();
                cycle.push(next.to_string());
                return Err(ExtendError::Cycle(cycle));
            }
            path.push(next);
            cur = next;
        }
    }
    Ok(())
}

/// An extender becomes ready once everything extending it has been merged in.
fn merge_order(edges: &IndexMap<String, Edge>) -> Vec<&Edge> {
    let mut pending: IndexMap<&str, usize> = edges.keys().map(|k| (k.as_str(), 0)).collect();
    for edge in edges.values() {
        if let Some(n) = pending.get_mut(edge.to.as_str()) {
            *n += 1;
        }
    }

    let mut ready: VecDeque<&str> = pending
        .iter()
        .filter(|(_, n)| **n == 0)
        .map(|(k, _)| *k)
        .collect();
    let mut out = Vec::with_capacity(edges.len());

    while let Some(id) = ready.pop_front() {
        let edge = &edges[id];
        out.push(edge);
        if let Some(n) = pending.get_mut(edge.to.as_str()) {
            *n -= 1;
            if *n == 0 {
                ready.push_back(edge.to.as_str());
            }
        }
    }

    out
}

/// Objects merge key by key; anything else from `overlay` replaces what is there.
pub fn deep_merge(base: &mut Map<String, Value>, overlay: Map<String, Value>) {
    for (k, v) in overlay {
        match (base.get_mut(&k), v) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => deep_merge(existing, incoming),
            (_, v) => {
                base.insert(k, v);
            }
        }
    }
}
