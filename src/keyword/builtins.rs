use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use serde_json::{json, Map, Value};

use super::tree::{JsonTree, NodeId};
use super::{truthy, DocumentMap, Keyword, KeywordContext, Replacement};
use crate::namespace::{OUTPUTS, PARAMETERS, RESOURCES};

pub const PARAM: &str = "PARAM";
pub const AND: &str = "AND";
pub const OR: &str = "OR";
pub const NOT: &str = "NOT";
pub const EQUALS: &str = "EQUALS";
pub const NOT_EQUALS: &str = "NOT_EQUALS";
pub const IF: &str = "IF";
pub const REF: &str = "REF";
pub const EXTEND: &str = "EXTEND";
pub const JSON_PARSE: &str = "JSON_PARSE";
pub const JSON_STRINGIFY: &str = "JSON_STRINGIFY";
pub const SCHEMA: &str = "SCHEMA";

const JSON_SCHEMA_DRAFT: &str = "http://json-schema.org/draft-07/schema#";
const SCHEMA_TYPES: [&str; 7] = ["string", "number", "integer", "boolean", "object", "array", "null"];

pub fn all() -> Vec<Arc<dyn Keyword>> {
    vec![
        Arc::new(Param),
        Arc::new(Junction { name: AND, all: true }),
        Arc::new(Junction { name: OR, all: false }),
        Arc::new(Not),
        Arc::new(Equals { name: EQUALS, negate: false }),
        Arc::new(Equals { name: NOT_EQUALS, negate: true }),
        Arc::new(If),
        Arc::new(Ref),
        Arc::new(Extend),
        Arc::new(JsonParse),
        Arc::new(JsonStringify),
        Arc::new(Schema),
    ]
}

// ---------- shared checks ----------

fn sibling_error(tree: &JsonTree, node: NodeId, keyword: &str) -> Option<String> {
    let props = tree.properties(node)?;
    if props.len() <= 1 {
        return None;
    }
    let others = props
        .keys()
        .filter(|k| k.as_str() != keyword)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    Some(format!("{keyword} must not have sibling properties (found {others})"))
}

/// Array argument checks: `min` items, or exactly `exact` items.
fn array_errors(
    ctx: &KeywordContext<'_>,
    keyword: &str,
    arg: &Value,
    min: usize,
    exact: Option<usize>,
) -> Vec<String> {
    if ctx.is_deferred(arg) {
        return vec![];
    }
    let Some(items) = arg.as_array() else {
        return vec![format!("{keyword} must be an array")];
    };
    match exact {
        Some(n) if items.len() != n => vec![format!("{keyword} must contain exactly {n} values")],
        None if items.len() < min => vec![format!("{keyword} must contain at least {min} value")],
        _ => vec![],
    }
}

fn string_errors(ctx: &KeywordContext<'_>, keyword: &str, arg: &Value) -> Vec<String> {
    if arg.is_string() || ctx.is_deferred(arg) {
        vec![]
    } else {
        vec![format!("{keyword} must be a string")]
    }
}

fn items<'v>(keyword: &str, arg: &'v Value) -> Result<&'v Vec<Value>> {
    arg.as_array()
        .ok_or_else(|| anyhow!("{keyword} expects an array, got {arg}"))
}

fn text<'v>(keyword: &str, arg: &'v Value) -> Result<&'v str> {
    arg.as_str()
        .ok_or_else(|| anyhow!("{keyword} expects a string, got {arg}"))
}

// ---------- parameters ----------

pub struct Param;

impl Keyword for Param {
    fn keyword(&self) -> &'static str {
        PARAM
    }

    fn validate(&self, ctx: &KeywordContext<'_>, tree: &JsonTree, node: NodeId, arg: &Value) -> Vec<String> {
        let mut errs: Vec<String> = sibling_error(tree, node, PARAM).into_iter().collect();
        match arg.as_str() {
            Some(name) if !ctx.namespaces.contains(PARAMETERS, name) => errs.push(format!(
                "parameter {name} referenced in module {} does not exist",
                ctx.module
            )),
            Some(_) => {}
            None => errs.extend(string_errors(ctx, PARAM, arg)),
        }
        errs
    }

    fn process(&self, ctx: &KeywordContext<'_>, _tree: &JsonTree, _node: NodeId, arg: Value) -> Result<Replacement> {
        let name = text(PARAM, &arg)?;
        let value = ctx
            .parameters
            .get(name)
            .cloned()
            .ok_or_else(|| anyhow!("parameter {name} has no resolved value"))?;
        Ok(Replacement::Terminal(value))
    }
}

// ---------- boolean logic ----------

/// `AND` / `OR` over the truthiness of every item.
pub struct Junction {
    name: &'static str,
    all: bool,
}

impl Keyword for Junction {
    fn keyword(&self) -> &'static str {
        self.name
    }

    fn validate(&self, ctx: &KeywordContext<'_>, tree: &JsonTree, node: NodeId, arg: &Value) -> Vec<String> {
        let mut errs = array_errors(ctx, self.name, arg, 1, None);
        errs.extend(sibling_error(tree, node, self.name));
        errs
    }

    fn process(&self, _ctx: &KeywordContext<'_>, _tree: &JsonTree, _node: NodeId, arg: Value) -> Result<Replacement> {
        let items = items(self.name, &arg)?;
        let result = if self.all {
            items.iter().all(truthy)
        } else {
            items.iter().any(truthy)
        };
        Ok(Replacement::Terminal(Value::Bool(result)))
    }
}

pub struct Not;

impl Keyword for Not {
    fn keyword(&self) -> &'static str {
        NOT
    }

    fn validate(&self, _ctx: &KeywordContext<'_>, tree: &JsonTree, node: NodeId, _arg: &Value) -> Vec<String> {
        sibling_error(tree, node, NOT).into_iter().collect()
    }

    fn process(&self, _ctx: &KeywordContext<'_>, _tree: &JsonTree, _node: NodeId, arg: Value) -> Result<Replacement> {
        Ok(Replacement::Terminal(Value::Bool(!truthy(&arg))))
    }
}

/// `EQUALS` compares structurally; `NOT_EQUALS` is rewritten as `NOT` of `EQUALS` over its
/// unexpanded operands, so each operand is expanded exactly once.
pub struct Equals {
    name: &'static str,
    negate: bool,
}

impl Keyword for Equals {
    fn keyword(&self) -> &'static str {
        self.name
    }

    fn validate(&self, ctx: &KeywordContext<'_>, tree: &JsonTree, node: NodeId, arg: &Value) -> Vec<String> {
        let mut errs = array_errors(ctx, self.name, arg, 2, Some(2));
        errs.extend(sibling_error(tree, node, self.name));
        errs
    }

    fn process(&self, _ctx: &KeywordContext<'_>, tree: &JsonTree, node: NodeId, arg: Value) -> Result<Replacement> {
        let pair = items(self.name, &arg)?;
        let [a, b] = pair.as_slice() else {
            bail!("{} expects exactly 2 values, got {}", self.name, pair.len());
        };

        if self.negate {
            let operands = tree
                .property(node, self.name)
                .map(|id| tree.construct_json(id))
                .ok_or_else(|| anyhow!("{} argument is missing from the document", self.name))?;
            let mut raw = Map::new();
            raw.insert(NOT.to_string(), json!({ EQUALS: operands }));
            return Ok(Replacement::Keyword(raw));
        }
        Ok(Replacement::Terminal(Value::Bool(a == b)))
    }
}

/// `[condition, then, else]`.
pub struct If;

impl Keyword for If {
    fn keyword(&self) -> &'static str {
        IF
    }

    fn validate(&self, ctx: &KeywordContext<'_>, tree: &JsonTree, node: NodeId, arg: &Value) -> Vec<String> {
        let mut errs = array_errors(ctx, IF, arg, 3, Some(3));
        errs.extend(sibling_error(tree, node, IF));
        errs
    }

    fn process(&self, _ctx: &KeywordContext<'_>, _tree: &JsonTree, _node: NodeId, arg: Value) -> Result<Replacement> {
        let branches = items(IF, &arg)?;
        let [cond, then, otherwise] = branches.as_slice() else {
            bail!("IF expects [condition, then, else], got {} values", branches.len());
        };
        let chosen = if truthy(cond) { then } else { otherwise };
        Ok(Replacement::Terminal(chosen.clone()))
    }
}

// ---------- cross-module references ----------

/// Reference to a resource or output declared by this module or one of its dependencies.
pub struct Ref;

impl Ref {
    fn owner<'a>(ctx: &KeywordContext<'a>, id: &str) -> Option<&'a str> {
        ctx.namespaces
            .owner(RESOURCES, id)
            .or_else(|| ctx.namespaces.owner(OUTPUTS, id))
    }
}

impl Keyword for Ref {
    fn keyword(&self) -> &'static str {
        REF
    }

    fn validate(&self, ctx: &KeywordContext<'_>, tree: &JsonTree, node: NodeId, arg: &Value) -> Vec<String> {
        let mut errs: Vec<String> = sibling_error(tree, node, REF).into_iter().collect();
        let Some(id) = arg.as_str() else {
            errs.extend(string_errors(ctx, REF, arg));
            return errs;
        };

        match Ref::owner(ctx, id) {
            None => errs.push(format!(
                "resource {id} referenced in module {} does not exist",
                ctx.module
            )),
            Some(owner) if !ctx.graph.is_visible_from(owner, ctx.module) => errs.push(format!(
                "resource {id} is owned by module {owner}, which is not a dependency of {}",
                ctx.module
            )),
            Some(_) => {}
        }
        errs
    }

    fn process(&self, _ctx: &KeywordContext<'_>, _tree: &JsonTree, _node: NodeId, arg: Value) -> Result<Replacement> {
        let id = text(REF, &arg)?;
        Ok(Replacement::Terminal(json!({ "Ref": id })))
    }
}

/// Folds a resource into another one, possibly declared by a dependency:
/// `Resources.<id>: { EXTEND: { resource, module?, properties? } }`.
pub struct Extend;

const EXTEND_FIELDS: [&str; 3] = ["resource", "module", "properties"];

impl Extend {
    /// The resource id, when `node` sits directly under the top-level `Resources`.
    fn resource_id(tree: &JsonTree, node: NodeId) -> Option<&str> {
        let section = tree.parent(node)?;
        let top = tree.parent(section)?;
        if tree.parent(top).is_some() || tree.key(section) != Some("Resources") {
            return None;
        }
        tree.key(node)
    }

    fn find_target(
        ctx: &KeywordContext<'_>,
        docs: &DocumentMap,
        target: &str,
        module: Option<&str>,
    ) -> Result<String, String> {
        let candidates: Vec<&str> = match module {
            Some(m) => {
                if !ctx.graph.is_visible_from(m, ctx.module) {
                    return Err(format!("module {m} is not a dependency of {}", ctx.module));
                }
                vec![m]
            }
            None => docs
                .keys()
                .map(String::as_str)
                .filter(|m| ctx.graph.is_visible_from(m, ctx.module))
                .collect(),
        };

        for m in candidates {
            let declared = docs
                .get(m)
                .and_then(|d| d.get("Resources"))
                .and_then(|r| r.get(target))
                .is_some();
            if declared {
                return Ok(m.to_string());
            }
        }

        Err(match module {
            Some(m) => format!("resource {target} extended in module {} does not exist in module {m}", ctx.module),
            None => format!("resource {target} extended in module {} does not exist", ctx.module),
        })
    }
}

impl Keyword for Extend {
    fn keyword(&self) -> &'static str {
        EXTEND
    }

    fn validate(&self, ctx: &KeywordContext<'_>, tree: &JsonTree, node: NodeId, arg: &Value) -> Vec<String> {
        let mut errs: Vec<String> = sibling_error(tree, node, EXTEND).into_iter().collect();

        let Some(id) = Extend::resource_id(tree, node) else {
            errs.push("EXTEND is only valid directly under Resources".to_string());
            return errs;
        };
        let Some(fields) = arg.as_object() else {
            errs.push("EXTEND must be an object with a \"resource\" field".to_string());
            return errs;
        };

        for key in fields.keys() {
            if !EXTEND_FIELDS.contains(&key.as_str()) {
                errs.push(format!("EXTEND has unknown field \"{key}\""));
            }
        }
        if let Some(p) = fields.get("properties") {
            if !p.is_object() && !ctx.is_deferred(p) {
                errs.push("EXTEND.properties must be an object".to_string());
            }
        }
        let module = match fields.get("module") {
            None => None,
            Some(Value::String(m)) => Some(m.as_str()),
            Some(_) => {
                errs.push("EXTEND.module must be a string".to_string());
                return errs;
            }
        };
        let target = match fields.get("resource") {
            Some(Value::String(t)) => t.as_str(),
            Some(v) if ctx.is_deferred(v) => return errs,
            _ => {
                errs.push("EXTEND.resource must be a string".to_string());
                return errs;
            }
        };

        if target == id {
            errs.push(format!("resource {id} cannot extend a resource with its own id"));
            return errs;
        }

        let Some(docs) = ctx.documents else {
            errs.push("EXTEND is only available in resource documents".to_string());
            return errs;
        };
        if let Err(msg) = Extend::find_target(ctx, docs, target, module) {
            errs.push(msg);
        }
        errs
    }

    fn process(&self, _ctx: &KeywordContext<'_>, tree: &JsonTree, node: NodeId, arg: Value) -> Result<Replacement> {
        let id = Extend::resource_id(tree, node)
            .ok_or_else(|| anyhow!("EXTEND is only valid directly under Resources"))?;
        let target = arg
            .get("resource")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("EXTEND.resource must be a string"))?;
        let properties = arg.get("properties").cloned().unwrap_or_else(|| json!({}));

        Ok(Replacement::Terminal(json!({
            "Extend": { "from": id, "to": target },
            "Properties": properties,
        })))
    }
}

// ---------- JSON ----------

pub struct JsonParse;

impl Keyword for JsonParse {
    fn keyword(&self) -> &'static str {
        JSON_PARSE
    }

    fn validate(&self, ctx: &KeywordContext<'_>, tree: &JsonTree, node: NodeId, arg: &Value) -> Vec<String> {
        let mut errs: Vec<String> = sibling_error(tree, node, JSON_PARSE).into_iter().collect();
        match arg.as_str() {
            Some(s) => {
                if let Err(e) = serde_json::from_str::<Value>(s) {
                    errs.push(format!("JSON_PARSE argument is not valid JSON: {e}"));
                }
            }
            None => errs.extend(string_errors(ctx, JSON_PARSE, arg)),
        }
        errs
    }

    fn process(&self, _ctx: &KeywordContext<'_>, _tree: &JsonTree, _node: NodeId, arg: Value) -> Result<Replacement> {
        let s = text(JSON_PARSE, &arg)?;
        Ok(Replacement::Terminal(serde_json::from_str(s)?))
    }
}

pub struct JsonStringify;

impl Keyword for JsonStringify {
    fn keyword(&self) -> &'static str {
        JSON_STRINGIFY
    }

    fn validate(&self, _ctx: &KeywordContext<'_>, tree: &JsonTree, node: NodeId, _arg: &Value) -> Vec<String> {
        sibling_error(tree, node, JSON_STRINGIFY).into_iter().collect()
    }

    fn process(&self, _ctx: &KeywordContext<'_>, _tree: &JsonTree, _node: NodeId, arg: Value) -> Result<Replacement> {
        Ok(Replacement::Terminal(Value::String(serde_json::to_string(&arg)?)))
    }
}

// ---------- schema ----------

/// Compiles a JSON-schema subset into a closed draft-07 schema.
pub struct Schema;

impl Keyword for Schema {
    fn keyword(&self) -> &'static str {
        SCHEMA
    }

    fn validate(&self, ctx: &KeywordContext<'_>, tree: &JsonTree, node: NodeId, arg: &Value) -> Vec<String> {
        let mut errs: Vec<String> = sibling_error(tree, node, SCHEMA).into_iter().collect();
        if !ctx.is_deferred(arg) {
            check_schema(arg, "$", &mut errs);
        }
        errs
    }

    fn process(&self, _ctx: &KeywordContext<'_>, _tree: &JsonTree, _node: NodeId, arg: Value) -> Result<Replacement> {
        let mut errs = Vec::new();
        check_schema(&arg, "$", &mut errs);
        if !errs.is_empty() {
            bail!("{}", errs.join("; "));
        }

        let mut out = Map::new();
        out.insert("$schema".to_string(), Value::String(JSON_SCHEMA_DRAFT.to_string()));
        if let Value::Object(compiled) = compile_schema(&arg) {
            out.extend(compiled);
        }
        Ok(Replacement::Terminal(Value::Object(out)))
    }
}

fn check_schema(schema: &Value, at: &str, errs: &mut Vec<String>) {
    let Some(obj) = schema.as_object() else {
        errs.push(format!("schema at {at} must be an object"));
        return;
    };

    for (k, v) in obj {
        match k.as_str() {
            "type" => {
                let names: Vec<&Value> = match v {
                    Value::Array(list) => list.iter().collect(),
                    other => vec![other],
                };
                for n in names {
                    if !n.as_str().is_some_and(|t| SCHEMA_TYPES.contains(&t)) {
                        errs.push(format!("schema at {at} has unknown type {n}"));
                    }
                }
            }
            "properties" => match v.as_object() {
                Some(props) => {
                    for (name, sub) in props {
                        check_schema(sub, &format!("{at}.properties.{name}"), errs);
                    }
                }
                None => errs.push(format!("schema at {at}: properties must be an object")),
            },
            "required" => {
                let ok = v.as_array().is_some_and(|a| a.iter().all(Value::is_string));
                if !ok {
                    errs.push(format!("schema at {at}: required must be an array of strings"));
                }
            }
            "items" => check_schema(v, &format!("{at}.items"), errs),
            "enum" => {
                if !v.as_array().is_some_and(|a| !a.is_empty()) {
                    errs.push(format!("schema at {at}: enum must be a non-empty array"));
                }
            }
            "additionalProperties" => {
                if !v.is_boolean() {
                    check_schema(v, &format!("{at}.additionalProperties"), errs);
                }
            }
            "description" | "title" | "default" => {}
            other => errs.push(format!("schema at {at} uses unsupported keyword '{other}'")),
        }
    }
}

fn compile_schema(schema: &Value) -> Value {
    let Some(obj) = schema.as_object() else {
        return schema.clone();
    };

    let mut out = Map::new();
    for (k, v) in obj {
        let compiled = match k.as_str() {
            "properties" => Value::Object(
                v.as_object()
                    .map(|props| {
                        props
                            .iter()
                            .map(|(name, sub)| (name.clone(), compile_schema(sub)))
                            .collect()
                    })
                    .unwrap_or_default(),
            ),
            "items" => compile_schema(v),
            "additionalProperties" if !v.is_boolean() => compile_schema(v),
            "required" => {
                let mut seen: Vec<Value> = Vec::new();
                for r in v.as_array().into_iter().flatten() {
                    if !seen.contains(r) {
                        seen.push(r.clone());
                    }
                }
                Value::Array(seen)
            }
            _ => v.clone(),
        };
        out.insert(k.clone(), compiled);
    }

    let is_object = obj.get("type").and_then(Value::as_str) == Some("object");
    if is_object && !out.contains_key("additionalProperties") {
        out.insert("additionalProperties".to_string(), Value::Bool(false));
    }
    Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExpandError;
    use crate::graph::{graph_from_edges, ModuleGraph};
    use crate::keyword::KeywordRegistry;
    use crate::namespace::{resolve_claims, NamespaceClaim, ResolvedNamespaces};
    use std::path::Path;

    struct Fixture {
        graph: ModuleGraph,
        namespaces: ResolvedNamespaces,
        parameters: Map<String, Value>,
        documents: DocumentMap,
    }

    fn fixture() -> Fixture {
        // app -> auth -> core, app -> billing
        let graph = graph_from_edges(
            "app",
            &[("app", &["auth", "billing"]), ("auth", &["core"]), ("billing", &[]), ("core", &[])],
        );
        let claim = |ns: &str, value: &str, module: &str| NamespaceClaim {
            namespace: ns.to_string(),
            value: value.to_string(),
            module: module.to_string(),
        };
        let namespaces = resolve_claims(
            &graph,
            vec![
                claim(PARAMETERS, "Stage", "app"),
                claim(PARAMETERS, "Debug", "core"),
                claim(RESOURCES, "UserPool", "auth"),
                claim(RESOURCES, "Invoices", "billing"),
                claim(OUTPUTS, "PoolArn", "auth"),
            ],
        )
        .unwrap();

        let mut parameters = Map::new();
        parameters.insert("Stage".to_string(), json!("prod"));
        parameters.insert("Debug".to_string(), json!(false));

        let mut documents = DocumentMap::new();
        documents.insert(
            "auth".to_string(),
            json!({"Resources": {"UserPool": {"Type": "AWS::Cognito::UserPool"}}}),
        );
        documents.insert(
            "billing".to_string(),
            json!({"Resources": {"Invoices": {"Type": "AWS::DynamoDB::Table"}}}),
        );

        Fixture {
            graph,
            namespaces,
            parameters,
            documents,
        }
    }

    fn expand_with(
        registry: &KeywordRegistry,
        fx: &Fixture,
        module: &str,
        doc: Value,
    ) -> Result<Value, ExpandError> {
        let ctx = KeywordContext::new(
            Path::new("/project"),
            module,
            &fx.graph,
            &fx.namespaces,
            &fx.parameters,
        )
        .with_documents(&fx.documents);
        registry.expand(&ctx, "test document", &doc, 16)
    }

    fn expand_in(fx: &Fixture, module: &str, doc: Value) -> Result<Value, ExpandError> {
        expand_with(&KeywordRegistry::builtin(), fx, module, doc)
    }

    fn expand(doc: Value) -> Result<Value, ExpandError> {
        expand_in(&fixture(), "app", doc)
    }

    fn issues(doc: Value) -> Vec<String> {
        match expand(doc) {
            Err(ExpandError::Validation(v)) => v.issues.into_iter().map(|i| i.to_string()).collect(),
            other => panic!("expected validation errors, got {other:?}"),
        }
    }

    #[test]
    fn and_requires_a_value() {
        assert_eq!(issues(json!({"x": {"AND": []}})), vec!["at x: AND must contain at least 1 value"]);
    }

    #[test]
    fn and_uses_truthiness() {
        assert_eq!(expand(json!({"AND": [true, {}]})).unwrap(), json!(true));
        assert_eq!(expand(json!({"AND": [true, false]})).unwrap(), json!(false));
        assert_eq!(expand(json!({"OR": [0, "", "x"]})).unwrap(), json!(true));
    }

    #[test]
    fn and_rejects_siblings() {
        let errs = issues(json!({"AND": [true], "extra": 1}));
        assert_eq!(errs, vec!["at $: AND must not have sibling properties (found extra)"]);
    }

    #[test]
    fn params_resolve_to_catalog_values() {
        let out = expand(json!({"env": {"STAGE": {"PARAM": "Stage"}, "DEBUG": {"PARAM": "Debug"}}})).unwrap();
        assert_eq!(out, json!({"env": {"STAGE": "prod", "DEBUG": false}}));
    }

    #[test]
    fn unknown_param_is_reported_with_path() {
        let errs = issues(json!({"env": {"MY_ENV1": {"PARAM": "Nope"}}}));
        assert_eq!(
            errs,
            vec!["at env.MY_ENV1: parameter Nope referenced in module app does not exist"]
        );
    }

    #[test]
    fn three_violations_make_three_errors() {
        let errs = issues(json!({
            "a": {"AND": []},
            "b": {"EQUALS": [1]},
            "c": {"PARAM": "Missing"}
        }));
        assert_eq!(errs.len(), 3);
    }

    #[test]
    fn conditionals_compose() {
        let doc = json!({
            "debug": {"IF": [{"EQUALS": [{"PARAM": "Stage"}, "prod"]}, "off", "on"]},
            "differs": {"NOT_EQUALS": [{"PARAM": "Stage"}, "dev"]},
            "same": {"NOT_EQUALS": [1, 1]}
        });
        assert_eq!(
            expand(doc).unwrap(),
            json!({"debug": "off", "differs": true, "same": false})
        );
    }

    #[test]
    fn not_equals_negates_keyword_shaped_data() {
        let parsed = json!({"JSON_PARSE": "{\"NOT\": 0}"});
        assert_eq!(
            expand(json!({"v": {"EQUALS": [parsed.clone(), true]}})).unwrap(),
            json!({"v": false})
        );
        assert_eq!(
            expand(json!({"v": {"NOT_EQUALS": [parsed, true]}})).unwrap(),
            json!({"v": true})
        );
    }

    #[test]
    fn unregistered_keyword_shapes_are_not_deferred() {
        let errs = issues(json!({
            "a": {"AND": {"TAGS": [1]}},
            "b": {"AND": []},
            "c": {"PARAM": "Missing"}
        }));
        assert_eq!(
            errs,
            vec![
                "at a: AND must be an array",
                "at b: AND must contain at least 1 value",
                "at c: parameter Missing referenced in module app does not exist",
            ]
        );

        // registered keywords still defer until their argument is expanded
        assert_eq!(
            expand(json!({"a": {"AND": {"JSON_PARSE": "[1, 0]"}}})).unwrap(),
            json!({"a": false})
        );
    }

    #[test]
    fn dropped_keywords_are_plain_data() {
        let fx = fixture();
        let registry = KeywordRegistry::builtin().without(PARAM);
        let err = expand_with(&registry, &fx, "app", json!({"Stage": {"default": {"AND": {"PARAM": "x"}}}}))
            .unwrap_err();
        let ExpandError::Validation(v) = err else {
            panic!("expected validation error");
        };
        assert_eq!(v.issues.len(), 1);
        assert_eq!(v.issues[0].to_string(), "at Stage.default: AND must be an array");
    }

    #[test]
    fn json_helpers() {
        let doc = json!({
            "parsed": {"JSON_PARSE": "{\"a\": [1, 2]}"},
            "text": {"JSON_STRINGIFY": {"stage": {"PARAM": "Stage"}}}
        });
        assert_eq!(
            expand(doc).unwrap(),
            json!({"parsed": {"a": [1, 2]}, "text": "{\"stage\":\"prod\"}"})
        );
        let errs = issues(json!({"bad": {"JSON_PARSE": "{nope"}}));
        assert_eq!(errs.len(), 1);
        assert!(errs[0].starts_with("at bad: JSON_PARSE argument is not valid JSON"));
    }

    #[test]
    fn refs_must_be_visible_from_the_module() {
        assert_eq!(
            expand(json!({"Value": {"REF": "UserPool"}})).unwrap(),
            json!({"Value": {"Ref": "UserPool"}})
        );

        let fx = fixture();
        let err = expand_in(&fx, "auth", json!({"Value": {"REF": "Invoices"}})).unwrap_err();
        let ExpandError::Validation(v) = err else {
            panic!("expected validation error");
        };
        assert_eq!(
            v.issues[0].message,
            "resource Invoices is owned by module billing, which is not a dependency of auth"
        );
    }

    #[test]
    fn extend_produces_a_merge_marker() {
        let doc = json!({
            "Resources": {
                "PoolTweaks": {"EXTEND": {"resource": "UserPool", "properties": {"MfaConfiguration": "ON"}}}
            }
        });
        assert_eq!(
            expand(doc).unwrap(),
            json!({
                "Resources": {
                    "PoolTweaks": {
                        "Extend": {"from": "PoolTweaks", "to": "UserPool"},
                        "Properties": {"MfaConfiguration": "ON"}
                    }
                }
            })
        );
    }

    #[test]
    fn extend_checks_target_and_placement() {
        let errs = issues(json!({
            "Resources": {
                "A": {"EXTEND": {"resource": "Ghost"}},
                "B": {"EXTEND": {"resource": "UserPool", "module": "billing"}},
                "C": {"EXTEND": {"resource": "C"}}
            },
            "Outputs": {"D": {"EXTEND": {"resource": "UserPool"}}}
        }));
        assert_eq!(
            errs,
            vec![
                "at Resources.A: resource Ghost extended in module app does not exist",
                "at Resources.B: resource UserPool extended in module app does not exist in module billing",
                "at Resources.C: resource C cannot extend a resource with its own id",
                "at Outputs.D: EXTEND is only valid directly under Resources",
            ]
        );
    }

    #[test]
    fn schema_compiles_to_a_closed_schema() {
        let doc = json!({"SCHEMA": {
            "type": "object",
            "properties": {"name": {"type": "string"}, "tags": {"type": "array", "items": {"type": "string"}}},
            "required": ["name", "name"]
        }});
        assert_eq!(
            expand(doc).unwrap(),
            json!({
                "$schema": JSON_SCHEMA_DRAFT,
                "type": "object",
                "properties": {"name": {"type": "string"}, "tags": {"type": "array", "items": {"type": "string"}}},
                "required": ["name"],
                "additionalProperties": false
            })
        );

        let errs = issues(json!({"s": {"SCHEMA": {"type": "text"}, "x": 1}}));
        assert_eq!(errs.len(), 2);
    }

    #[test]
    fn expansion_is_idempotent() {
        let doc = json!({
            "flag": {"AND": [{"PARAM": "Stage"}, {"NOT": {"PARAM": "Debug"}}]},
            "ref": {"REF": "PoolArn"},
            "list": [{"IF": [false, 1, 2]}, "plain"]
        });
        let once = expand(doc).unwrap();
        let twice = expand(once.clone()).unwrap();
        assert_eq!(once, twice);
        assert_eq!(once, json!({"flag": true, "ref": {"Ref": "PoolArn"}, "list": [2, "plain"]}));
    }
}
