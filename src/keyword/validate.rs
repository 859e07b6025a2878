use crate::error::ValidationIssue;

use super::tree::{JsonTree, NodeId, NodeKind};
use super::{keywords_on, Validators};

/// Visits every node, keyword arguments included, and collects every problem.
pub fn validate_keywords(tree: &JsonTree, validators: &Validators<'_>) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    let mut stack: Vec<NodeId> = vec![tree.root()];

    while let Some(id) = stack.pop() {
        match &tree.node(id).kind {
            NodeKind::Primitive(_) => {}
            NodeKind::Array(items) => stack.extend(items.iter().rev().copied()),
            NodeKind::Object(props) => {
                let found = keywords_on(props, validators);
                match found.as_slice() {
                    [] => {}
                    [keyword] => {
                        let arg = tree.construct_json(props[*keyword]);
                        for message in validators[*keyword](tree, id, &arg) {
                            issues.push(ValidationIssue {
                                path: tree.path(id),
                                message,
                            });
                        }
                    }
                    many => issues.push(ValidationIssue {
                        path: tree.path(id),
                        message: format!("object declares multiple keywords: {}", many.join(", ")),
                    }),
                }
                stack.extend(props.values().rev().copied());
            }
        }
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyword::{Validator, Validators};
    use serde_json::{json, Value};

    fn validators() -> Validators<'static> {
        let mut v: Validators<'static> = Validators::new();
        let not_empty: Validator<'static> = Box::new(|_: &JsonTree, _: NodeId, arg: &Value| {
            match arg.as_array() {
                Some(a) if a.is_empty() => vec!["must contain at least 1 value".to_string()],
                _ => vec![],
            }
        });
        v.insert("AND", not_empty);
        let string_only: Validator<'static> = Box::new(|_: &JsonTree, _: NodeId, arg: &Value| {
            if arg.is_string() {
                vec![]
            } else {
                vec!["must be a string".to_string()]
            }
        });
        v.insert("PARAM", string_only);
        v
    }

    #[test]
    fn every_violation_is_collected_with_its_path() {
        let doc = json!({
            "a": {"AND": []},
            "b": [{"PARAM": 1}],
            "c": {"ok": {"AND": [true]}},
            "d": {"AND": [{"AND": []}]}
        });
        let tree = JsonTree::parse(&doc);
        let issues = validate_keywords(&tree, &validators());
        let paths: Vec<_> = issues.iter().map(|i| i.path.as_str()).collect();
        assert_eq!(paths, vec!["a", "b[0]", "d.AND[0]"]);
        assert_eq!(issues[0].message, "must contain at least 1 value");
    }

    #[test]
    fn multiple_keywords_on_one_object_are_rejected() {
        let tree = JsonTree::parse(&json!({"x": {"AND": [1], "PARAM": "p"}}));
        let issues = validate_keywords(&tree, &validators());
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].path, "x");
        assert!(issues[0].message.contains("AND, PARAM"));
    }

    #[test]
    fn plain_documents_have_no_issues() {
        let tree = JsonTree::parse(&json!({"and": [], "Param": 3, "list": [1, 2]}));
        assert!(validate_keywords(&tree, &validators()).is_empty());
    }
}
