//! Declarative directives embedded in JSON/YAML documents.
//!
//! A keyword is a reserved upper-case property name. An object carrying one is
//! replaced, bottom-up, by whatever the keyword's processor produces; arguments
//! are expanded before the keyword that owns them.

use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::error::{ExpandError, ValidationErrors};
use crate::graph::ModuleGraph;
use crate::namespace::ResolvedNamespaces;

pub mod builtins;
pub mod process;
pub mod tree;
pub mod validate;

pub use process::process_keywords;
pub use tree::{JsonTree, NodeId, NodeKind, Slot};
pub use validate::validate_keywords;

/// Per-module documents already available while expanding resource documents.
pub type DocumentMap = IndexMap<String, Value>;

/// Result of expanding one keyword occurrence.
#[derive(Debug, Clone, PartialEq)]
pub enum Replacement {
    /// Final value for the node.
    Terminal(Value),
    /// Another raw keyword object that still needs expanding.
    Keyword(Map<String, Value>),
}

/// What a keyword can see while it runs.
#[derive(Debug, Clone, Copy)]
pub struct KeywordContext<'a> {
    pub root_dir: &'a Path,
    pub module: &'a str,
    pub graph: &'a ModuleGraph,
    pub namespaces: &'a ResolvedNamespaces,
    pub parameters: &'a Map<String, Value>,
    pub documents: Option<&'a DocumentMap>,
    /// Keyword names active for the current expansion; filled in by `KeywordRegistry::expand`.
    pub keywords: &'a [&'static str],
}

impl<'a> KeywordContext<'a> {
    pub fn new(
        root_dir: &'a Path,
        module: &'a str,
        graph: &'a ModuleGraph,
        namespaces: &'a ResolvedNamespaces,
        parameters: &'a Map<String, Value>,
    ) -> Self {
        Self {
            root_dir,
            module,
            graph,
            namespaces,
            parameters,
            documents: None,
            keywords: &[],
        }
    }

    pub fn with_documents(mut self, documents: &'a DocumentMap) -> Self {
        self.documents = Some(documents);
        self
    }

    /// True for a single-key object keyed by an active keyword. Validators use it to
    /// defer type checks on arguments that only take their final form after expansion.
    pub fn is_deferred(&self, v: &Value) -> bool {
        match v {
            Value::Object(m) if m.len() == 1 => m.keys().all(|k| self.keywords.contains(&k.as_str())),
            _ => false,
        }
    }
}

pub trait Keyword: Send + Sync {
    fn keyword(&self) -> &'static str;

    /// Messages for every problem with this occurrence; empty when valid.
    fn validate(&self, ctx: &KeywordContext<'_>, tree: &JsonTree, node: NodeId, arg: &Value) -> Vec<String>;

    /// `arg` is the keyword's argument with its own keywords already expanded.
    fn process(
        &self,
        ctx: &KeywordContext<'_>,
        tree: &JsonTree,
        node: NodeId,
        arg: Value,
    ) -> anyhow::Result<Replacement>;
}

pub type Validator<'a> = Box<dyn Fn(&JsonTree, NodeId, &Value) -> Vec<String> + 'a>;
pub type Processor<'a> = Box<dyn Fn(&JsonTree, NodeId, Value) -> anyhow::Result<Replacement> + 'a>;
pub type Validators<'a> = IndexMap<&'static str, Validator<'a>>;
pub type Processors<'a> = IndexMap<&'static str, Processor<'a>>;

#[derive(Clone, Default)]
pub struct KeywordRegistry {
    keywords: IndexMap<&'static str, Arc<dyn Keyword>>,
}

impl KeywordRegistry {
    pub fn builtin() -> Self {
        let mut reg = Self::default();
        for kw in builtins::all() {
            reg.register(kw);
        }
        reg
    }

    /// Adds a keyword, replacing any registered under the same name.
    pub fn register(&mut self, keyword: Arc<dyn Keyword>) {
        self.keywords.insert(keyword.keyword(), keyword);
    }

    pub fn without(&self, name: &str) -> Self {
        let mut keywords = self.keywords.clone();
        keywords.shift_remove(name);
        Self { keywords }
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.keywords.keys().copied()
    }

    pub fn validators<'a>(&'a self, ctx: &'a KeywordContext<'a>) -> Validators<'a> {
        self.keywords
            .iter()
            .map(|(name, kw)| {
                let kw = Arc::clone(kw);
                let v: Validator<'a> =
                    Box::new(move |tree: &JsonTree, node: NodeId, arg: &Value| kw.validate(ctx, tree, node, arg));
                (*name, v)
            })
            .collect()
    }

    pub fn processors<'a>(&'a self, ctx: &'a KeywordContext<'a>) -> Processors<'a> {
        self.keywords
            .iter()
            .map(|(name, kw)| {
                let kw = Arc::clone(kw);
                let p: Processor<'a> =
                    Box::new(move |tree: &JsonTree, node: NodeId, arg: Value| kw.process(ctx, tree, node, arg));
                (*name, p)
            })
            .collect()
    }

    /// Validates, then expands, one document.
    pub fn expand(
        &self,
        ctx: &KeywordContext<'_>,
        document: &str,
        value: &Value,
        max_depth: usize,
    ) -> Result<Value, ExpandError> {
        let names: Vec<&'static str> = self.names().collect();
        let ctx = KeywordContext {
            keywords: &names,
            ..*ctx
        };
        let mut tree = JsonTree::parse(value);

        let issues = validate_keywords(&tree, &self.validators(&ctx));
        if !issues.is_empty() {
            return Err(ExpandError::Validation(ValidationErrors {
                document: document.to_string(),
                issues,
            }));
        }

        let processors = self.processors(&ctx);
        Ok(process_keywords(&mut tree, &processors, max_depth)?)
    }
}

impl std::fmt::Debug for KeywordRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.keywords.keys()).finish()
    }
}

/// Keywords present on an object node, in property order.
pub(crate) fn keywords_on<'k, T>(
    props: &'k IndexMap<String, NodeId>,
    registered: &IndexMap<&'static str, T>,
) -> Vec<&'k str> {
    props
        .keys()
        .filter(|k| registered.contains_key(k.as_str()))
        .map(String::as_str)
        .collect()
}

/// Truthiness as the documents' authors expect it: `null`, `false`, `0`, `""` are false.
pub fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
