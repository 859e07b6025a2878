//! The build pipeline: graph, namespaces, keyword expansion, combination.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context as _, Result};
use serde_json::{json, Map, Value};
use tracing::{debug, error, info, warn};

use crate::context::BuildContext;
use crate::documents::{write_json, DocumentKind, DocumentLocator};
use crate::error::ExpandError;
use crate::extend::merge_extensions;
use crate::graph::{ModuleGraph, ModuleGraphBuilder};
use crate::keyword::builtins::PARAM;
use crate::keyword::{DocumentMap, KeywordContext, KeywordRegistry};
use crate::namespace::loaders::builtin_loaders;
use crate::namespace::{resolve_namespaces, NamespaceLoader, ResolvedNamespaces, CONFIG, OUTPUTS, PARAMETERS, RESOURCES};

/// What a build produced, as written to the output directory.
#[derive(Debug, Clone)]
pub struct BuildOutput {
    pub out_dir: PathBuf,
    pub parameters: Value,
    pub config: Value,
    pub resources: Value,
    pub extensions_merged: usize,
}

/// Builds the module graph for the context's project.
pub async fn build_graph(ctx: &BuildContext) -> Result<ModuleGraph> {
    let graph = ModuleGraphBuilder::new(ctx.config().graph.clone())
        .build(ctx.root_dir())
        .await?;
    Ok(graph)
}

/// Graph plus namespace ownership, using the built-in loaders and any `extra` ones.
pub async fn resolve(
    ctx: &BuildContext,
    extra: &[Arc<dyn NamespaceLoader>],
) -> Result<(ModuleGraph, ResolvedNamespaces)> {
    let graph = build_graph(ctx).await?;
    let mut loaders = builtin_loaders(Arc::new(ctx.locator()));
    loaders.extend(extra.iter().cloned());
    let namespaces = resolve_namespaces(&graph, &loaders).await?;
    Ok((graph, namespaces))
}

/// Runs every phase and writes the combined outputs.
pub async fn build(ctx: &BuildContext) -> Result<BuildOutput> {
    let (graph, namespaces) = resolve(ctx, &[]).await?;
    compose(ctx, graph, namespaces, &KeywordRegistry::builtin()).await
}

pub async fn compose(
    ctx: &BuildContext,
    graph: ModuleGraph,
    namespaces: ResolvedNamespaces,
    registry: &KeywordRegistry,
) -> Result<BuildOutput> {
    let locator = ctx.locator();
    let root = graph.root().clone();
    let max_depth = ctx.config().build.max_expansion_depth;

    // ---------- parameters ----------

    let raw_parameters = locator.load_source(&root, DocumentKind::Parameters)?;
    let parameters_doc = match &raw_parameters {
        Some(raw) => {
            let empty = Map::new();
            let kctx = KeywordContext::new(ctx.root_dir(), &root.name, &graph, &namespaces, &empty);
            let doc = registry
                .without(PARAM)
                .expand(&kctx, &document_name(&root.name, DocumentKind::Parameters), raw, max_depth)?;
            Some(doc)
        }
        None => None,
    };

    let parameter_docs = module_documents(&graph, &locator, DocumentKind::Parameters, parameters_doc.as_ref())?;
    let overrides = ctx.config().parameter_overrides()?;
    let catalog = resolve_parameters(&namespaces, &parameter_docs, &overrides);
    info!(parameters = catalog.len(), "parameter catalog resolved");

    // ---------- config + resources ----------

    let raw_config = locator.load_source(&root, DocumentKind::Config)?;
    let raw_resources = locator.load_source(&root, DocumentKind::Resources)?;

    let mut extend_targets = module_documents(&graph, &locator, DocumentKind::Resources, None)?;
    if let Some(raw) = &raw_resources {
        extend_targets.insert(root.name.clone(), raw.clone());
    }

    let expander = Expander {
        root_dir: ctx.root_dir().to_path_buf(),
        module: root.name.clone(),
        graph: Arc::new(graph),
        namespaces: Arc::new(namespaces),
        parameters: Arc::new(catalog.clone()),
        registry: Arc::new(registry.clone()),
        max_depth,
    };

    let config_task = tokio::task::spawn_blocking({
        let ex = expander.clone();
        move || raw_config.map(|raw| ex.expand(DocumentKind::Config, &raw, None)).transpose()
    });
    let resources_task = tokio::task::spawn_blocking({
        let ex = expander.clone();
        let targets = Arc::new(extend_targets);
        move || {
            raw_resources
                .map(|raw| ex.expand(DocumentKind::Resources, &raw, Some(&targets)))
                .transpose()
        }
    });

    let (config_joined, resources_joined) = tokio::join!(config_task, resources_task);
    let config_result = config_joined.map_err(|e| anyhow!("config expansion task failed: {e}"))?;
    let resources_result = resources_joined.map_err(|e| anyhow!("resources expansion task failed: {e}"))?;

    let (config_doc, resources_doc) = match (config_result, resources_result) {
        (Ok(c), Ok(r)) => (c, r),
        (c, r) => {
            let failures: Vec<String> = [c.err(), r.err()]
                .into_iter()
                .flatten()
                .map(|e| e.to_string())
                .collect();
            for f in &failures {
                error!("{f}");
            }
            bail!("{}", failures.join("\n"));
        }
    };
    debug!(module = %root.name, "root documents expanded");

    // ---------- combine ----------

    let graph = &expander.graph;
    let namespaces = &expander.namespaces;

    let mut parameters = combine_keys(namespaces, PARAMETERS, &parameter_docs, None);
    for (name, entry) in parameters.iter_mut() {
        if let (Value::Object(fields), Some(v)) = (entry, catalog.get(name)) {
            fields.insert("value".to_string(), v.clone());
        }
    }

    let config_docs = module_documents(graph, &locator, DocumentKind::Config, config_doc.as_ref())?;
    let config = combine_keys(namespaces, CONFIG, &config_docs, None);

    let resource_docs = module_documents(graph, &locator, DocumentKind::Resources, resources_doc.as_ref())?;
    let mut resources = combine_keys(namespaces, RESOURCES, &resource_docs, Some("Resources"));
    let outputs = combine_keys(namespaces, OUTPUTS, &resource_docs, Some("Outputs"));

    let extensions_merged = merge_extensions(&mut resources)?;
    info!(
        resources = resources.len(),
        outputs = outputs.len(),
        extensions = extensions_merged,
        "resources combined"
    );

    // ---------- fragments ----------

    // Written only once the combination succeeded.
    for (kind, doc) in [
        (DocumentKind::Parameters, &parameters_doc),
        (DocumentKind::Config, &config_doc),
        (DocumentKind::Resources, &resources_doc),
    ] {
        if let Some(doc) = doc {
            let path = locator.write_fragment(&root, kind, doc)?;
            debug!(path = %path.display(), "fragment written");
        }
    }

    let output = BuildOutput {
        out_dir: ctx.out_dir(),
        parameters: Value::Object(parameters),
        config: Value::Object(config),
        resources: json!({ "Resources": resources, "Outputs": outputs }),
        extensions_merged,
    };
    write_outputs(&output)?;
    Ok(output)
}

/// Owned inputs for expanding one root document on a blocking thread.
#[derive(Clone)]
struct Expander {
    root_dir: PathBuf,
    module: String,
    graph: Arc<ModuleGraph>,
    namespaces: Arc<ResolvedNamespaces>,
    parameters: Arc<Map<String, Value>>,
    registry: Arc<KeywordRegistry>,
    max_depth: usize,
}

impl Expander {
    fn expand(&self, kind: DocumentKind, raw: &Value, documents: Option<&DocumentMap>) -> Result<Value, ExpandError> {
        let mut kctx = KeywordContext::new(
            &self.root_dir,
            &self.module,
            &self.graph,
            &self.namespaces,
            &self.parameters,
        );
        if let Some(docs) = documents {
            kctx = kctx.with_documents(docs);
        }
        self.registry
            .expand(&kctx, &document_name(&self.module, kind), raw, self.max_depth)
    }
}

fn document_name(module: &str, kind: DocumentKind) -> String {
    format!("{kind} document of module {module}")
}

/// One document per module, in graph order. `root_doc` stands in for the root module's fragment.
fn module_documents(
    graph: &ModuleGraph,
    locator: &DocumentLocator,
    kind: DocumentKind,
    root_doc: Option<&Value>,
) -> Result<DocumentMap> {
    let mut out = DocumentMap::new();
    for module in graph.modules() {
        let doc = if module.is_root {
            root_doc.cloned()
        } else {
            locator
                .load_fragment(module, kind)
                .with_context(|| format!("failed to load {kind} fragment of module {}", module.name))?
        };
        if let Some(doc) = doc {
            out.insert(module.name.clone(), doc);
        }
    }
    Ok(out)
}

/// Effective value of every parameter: the owner's `value`, else its `default`, else `null`.
/// Overrides replace the value of declared parameters.
pub fn resolve_parameters(
    namespaces: &ResolvedNamespaces,
    documents: &DocumentMap,
    overrides: &Map<String, Value>,
) -> Map<String, Value> {
    let mut out = Map::new();

    if let Some(owners) = namespaces.values(PARAMETERS) {
        for (name, owner) in owners {
            let entry = documents.get(owner).and_then(|d| d.get(name));
            let value = entry
                .and_then(|e| e.get("value").or_else(|| e.get("default")))
                .cloned()
                .unwrap_or(Value::Null);
            out.insert(name.clone(), value);
        }
    }

    for (name, value) in overrides {
        if out.contains_key(name) {
            out.insert(name.clone(), value.clone());
        } else {
            warn!(parameter = %name, "override does not match any declared parameter");
        }
    }

    out
}

/// Each value of `namespace`, taken from its owner's document (or one of its sections).
fn combine_keys(
    namespaces: &ResolvedNamespaces,
    namespace: &str,
    documents: &DocumentMap,
    section: Option<&str>,
) -> Map<String, Value> {
    let mut out = Map::new();
    let Some(owners) = namespaces.values(namespace) else {
        return out;
    };

    for (key, owner) in owners {
        let doc = documents.get(owner);
        let container = match section {
            Some(s) => doc.and_then(|d| d.get(s)),
            None => doc,
        };
        match container.and_then(|c| c.get(key)) {
            Some(v) => {
                out.insert(key.clone(), v.clone());
            }
            None => warn!(%namespace, %key, %owner, "owner's document does not contain the value it claims"),
        }
    }
    out
}

fn write_outputs(output: &BuildOutput) -> Result<()> {
    for (kind, value) in [
        (DocumentKind::Parameters, &output.parameters),
        (DocumentKind::Config, &output.config),
        (DocumentKind::Resources, &output.resources),
    ] {
        let path = output_path(&output.out_dir, kind);
        write_json(&path, value)?;
        info!(path = %path.display(), "output written");
    }
    Ok(())
}

pub fn output_path(out_dir: &Path, kind: DocumentKind) -> PathBuf {
    out_dir.join(format!("{}.json", kind.stem()))
}
