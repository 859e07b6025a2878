use serde_json::{Map, Value};
use tracing::trace;

use crate::error::ProcessingError;

use super::tree::{JsonTree, NodeId, NodeKind};
use super::{keywords_on, Processors, Replacement};

/// Expands every keyword in `tree`, children before parents, and returns plain JSON.
/// A keyword may expand into another keyword at most `max_depth` times in a row.
pub fn process_keywords(
    tree: &mut JsonTree,
    processors: &Processors<'_>,
    max_depth: usize,
) -> Result<Value, ProcessingError> {
    let root = tree.root();
    process_node(tree, root, processors, 0, max_depth)
}

fn process_node(
    tree: &mut JsonTree,
    id: NodeId,
    processors: &Processors<'_>,
    depth: usize,
    max_depth: usize,
) -> Result<Value, ProcessingError> {
    let props = match tree.node(id).kind.clone() {
        NodeKind::Primitive(v) => return Ok(v),
        NodeKind::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(process_node(tree, item, processors, depth, max_depth)?);
            }
            return Ok(Value::Array(out));
        }
        NodeKind::Object(props) => props,
    };

    let found: Vec<String> = keywords_on(&props, processors)
        .into_iter()
        .map(str::to_string)
        .collect();

    match found.as_slice() {
        [] => {
            let mut out = Map::with_capacity(props.len());
            for (k, child) in props {
                let v = process_node(tree, child, processors, depth, max_depth)?;
                out.insert(k, v);
            }
            Ok(Value::Object(out))
        }
        [keyword] => {
            let arg = process_node(tree, props[keyword.as_str()], processors, depth, max_depth)?;
            let processor = &processors[keyword.as_str()];

            let replacement = processor(&*tree, id, arg).map_err(|e| ProcessingError::Keyword {
                path: tree.path(id),
                keyword: keyword.clone(),
                message: format!("{e:#}"),
            })?;

            match replacement {
                Replacement::Terminal(v) => Ok(v),
                Replacement::Keyword(raw) => {
                    if depth + 1 > max_depth {
                        return Err(ProcessingError::ExpansionDepthExceeded {
                            path: tree.path(id),
                            keyword: keyword.clone(),
                            limit: max_depth,
                        });
                    }
                    trace!(path = %tree.path(id), keyword = %keyword, "keyword expanded into another keyword");
                    let node = tree.node(id);
                    let (parent, slot) = (node.parent, node.slot.clone());
                    let next = tree.graft(&Value::Object(raw), parent, slot);
                    process_node(tree, next, processors, depth + 1, max_depth)
                }
            }
        }
        many => Err(ProcessingError::AmbiguousKeywords {
            path: tree.path(id),
            keywords: many.to_vec(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyword::Processor;
    use serde_json::json;

    fn processors() -> Processors<'static> {
        let mut p: Processors<'static> = Processors::new();
        let upper: Processor<'static> = Box::new(|_: &JsonTree, _: NodeId, arg: Value| {
            let s = arg.as_str().unwrap_or_default().to_uppercase();
            Ok(Replacement::Terminal(Value::String(s)))
        });
        p.insert("UPPER", upper);
        let twice: Processor<'static> = Box::new(|_: &JsonTree, _: NodeId, arg: Value| {
            let mut m = Map::new();
            m.insert("UPPER".to_string(), Value::String(format!("{0}{0}", arg.as_str().unwrap_or_default())));
            Ok(Replacement::Keyword(m))
        });
        p.insert("TWICE", twice);
        let forever: Processor<'static> = Box::new(|_: &JsonTree, _: NodeId, arg: Value| {
            let mut m = Map::new();
            m.insert("LOOP".to_string(), arg);
            Ok(Replacement::Keyword(m))
        });
        p.insert("LOOP", forever);
        let fail: Processor<'static> =
            Box::new(|_: &JsonTree, _: NodeId, _: Value| Err(anyhow::anyhow!("no such thing")));
        p.insert("FAIL", fail);
        p
    }

    fn run(doc: Value) -> Result<Value, ProcessingError> {
        let mut tree = JsonTree::parse(&doc);
        process_keywords(&mut tree, &processors(), 8)
    }

    #[test]
    fn nested_keywords_resolve_inside_out() {
        let out = run(json!({"a": {"UPPER": {"UPPER": "x"}}, "b": [1, {"UPPER": "y"}]})).unwrap();
        assert_eq!(out, json!({"a": "X", "b": [1, "Y"]}));
    }

    #[test]
    fn keyword_replacements_are_expanded_again() {
        let out = run(json!({"v": {"TWICE": "ab"}})).unwrap();
        assert_eq!(out, json!({"v": "ABAB"}));
    }

    #[test]
    fn self_expanding_keyword_is_bounded() {
        let err = run(json!({"v": {"LOOP": 1}})).unwrap_err();
        match err {
            ProcessingError::ExpansionDepthExceeded { path, keyword, limit } => {
                assert_eq!(path, "v");
                assert_eq!(keyword, "LOOP");
                assert_eq!(limit, 8);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn processor_failure_carries_path() {
        let err = run(json!({"env": {"MY_ENV1": {"FAIL": null}}})).unwrap_err();
        assert_eq!(
            err.to_string(),
            "at env.MY_ENV1: keyword FAIL failed: no such thing"
        );
    }

    #[test]
    fn ambiguous_objects_are_not_guessed() {
        let err = run(json!({"UPPER": "a", "TWICE": "b"})).unwrap_err();
        assert!(matches!(err, ProcessingError::AmbiguousKeywords { .. }));
    }

    #[test]
    fn expansion_is_idempotent() {
        let doc = json!({"a": {"TWICE": "q"}, "b": {"c": [{"UPPER": "z"}, null]}});
        let once = run(doc).unwrap();
        let twice = run(once.clone()).unwrap();
        assert_eq!(once, twice);
    }
}
