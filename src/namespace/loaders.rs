//! Namespace loaders for the artifact kinds every module can contribute.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use serde_json::Value;

use super::{NamespaceDeclaration, NamespaceLoader, API, CONFIG, OUTPUTS, PAGES, PARAMETERS, RESOURCES, STATIC};
use crate::documents::{object_keys, DocumentKind, DocumentLocator};
use crate::graph::Module;

const PAGES_DIR: &str = "pages";
const PUBLIC_DIR: &str = "public";

/// Function event types that expose an HTTP route.
const API_EVENT_TYPES: [&str; 2] = ["Api", "HttpApi"];

pub fn builtin_loaders(locator: Arc<DocumentLocator>) -> Vec<Arc<dyn NamespaceLoader>> {
    vec![
        Arc::new(PagesLoader),
        Arc::new(StaticLoader),
        Arc::new(DocumentKeysLoader {
            namespace: PARAMETERS,
            kind: DocumentKind::Parameters,
            section: None,
            locator: Arc::clone(&locator),
        }),
        Arc::new(DocumentKeysLoader {
            namespace: CONFIG,
            kind: DocumentKind::Config,
            section: None,
            locator: Arc::clone(&locator),
        }),
        Arc::new(DocumentKeysLoader {
            namespace: RESOURCES,
            kind: DocumentKind::Resources,
            section: Some("Resources"),
            locator: Arc::clone(&locator),
        }),
        Arc::new(DocumentKeysLoader {
            namespace: OUTPUTS,
            kind: DocumentKind::Resources,
            section: Some("Outputs"),
            locator: Arc::clone(&locator),
        }),
        Arc::new(ApiLoader { locator }),
    ]
}

/// Page routes from `pages/**`: `pages/auth/login.tsx` -> `/auth/login`, `index` collapses.
pub struct PagesLoader;

impl NamespaceLoader for PagesLoader {
    fn name(&self) -> &str {
        PAGES
    }

    fn load(&self, module: &Module) -> Result<Vec<NamespaceDeclaration>> {
        let dir = module.root.join(PAGES_DIR);
        let routes = list_files(&dir)?
            .into_iter()
            .filter_map(|rel| page_route(&rel))
            .collect::<Vec<_>>();
        Ok(declare(PAGES, routes))
    }
}

/// Public asset paths from `public/**`, served from the site root.
pub struct StaticLoader;

impl NamespaceLoader for StaticLoader {
    fn name(&self) -> &str {
        STATIC
    }

    fn load(&self, module: &Module) -> Result<Vec<NamespaceDeclaration>> {
        let dir = module.root.join(PUBLIC_DIR);
        let assets = list_files(&dir)?
            .into_iter()
            .map(|rel| format!("/{rel}"))
            .collect::<Vec<_>>();
        Ok(declare(STATIC, assets))
    }
}

/// Keys of one module document, or of one of its sections.
pub struct DocumentKeysLoader {
    pub namespace: &'static str,
    pub kind: DocumentKind,
    pub section: Option<&'static str>,
    pub locator: Arc<DocumentLocator>,
}

impl NamespaceLoader for DocumentKeysLoader {
    fn name(&self) -> &str {
        self.namespace
    }

    fn load(&self, module: &Module) -> Result<Vec<NamespaceDeclaration>> {
        let Some(doc) = self.locator.load(module, self.kind)? else {
            return Ok(vec![]);
        };
        Ok(declare(self.namespace, object_keys(&doc, self.section)))
    }
}

/// `"<METHOD> <path>"` for every API event of every function resource.
pub struct ApiLoader {
    pub locator: Arc<DocumentLocator>,
}

impl NamespaceLoader for ApiLoader {
    fn name(&self) -> &str {
        API
    }

    fn load(&self, module: &Module) -> Result<Vec<NamespaceDeclaration>> {
        let Some(doc) = self.locator.load(module, DocumentKind::Resources)? else {
            return Ok(vec![]);
        };
        Ok(declare(API, api_routes(&doc)))
    }
}

pub fn api_routes(doc: &Value) -> Vec<String> {
    let mut out = Vec::new();
    let Some(resources) = doc.get("Resources").and_then(Value::as_object) else {
        return out;
    };

    for resource in resources.values() {
        let Some(events) = resource
            .pointer("/Properties/Events")
            .and_then(Value::as_object)
        else {
            continue;
        };

        for event in events.values() {
            let is_api = event
                .get("Type")
                .and_then(Value::as_str)
                .is_some_and(|t| API_EVENT_TYPES.contains(&t));
            if !is_api {
                continue;
            }

            let method = event.pointer("/Properties/Method").and_then(Value::as_str);
            let path = event.pointer("/Properties/Path").and_then(Value::as_str);
            if let (Some(method), Some(path)) = (method, path) {
                let route = format!("{} {}", method.to_ascii_uppercase(), path);
                if !out.contains(&route) {
                    out.push(route);
                }
            }
        }
    }

    out
}

fn declare(namespace: &str, values: Vec<String>) -> Vec<NamespaceDeclaration> {
    if values.is_empty() {
        return vec![];
    }
    vec![NamespaceDeclaration::new(namespace, values)]
}

/// Files below `dir` as `/`-separated relative paths, sorted.
fn list_files(dir: &Path) -> Result<Vec<String>> {
    if !dir.is_dir() {
        return Ok(vec![]);
    }

    let pattern = format!("{}/**/*", glob::Pattern::escape(&dir.to_string_lossy()));
    let mut out = Vec::new();

    for entry in glob::glob(&pattern).with_context(|| format!("invalid glob pattern: {pattern}"))? {
        let path = entry.with_context(|| format!("failed to list {}", dir.display()))?;
        if !path.is_file() {
            continue;
        }
        let Ok(rel) = path.strip_prefix(dir) else {
            continue;
        };
        let rel = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        out.push(rel);
    }

    out.sort();
    Ok(out)
}

fn page_route(rel: &str) -> Option<String> {
    let (dir, file) = match rel.rsplit_once('/') {
        Some((dir, file)) => (Some(dir), file),
        None => (None, rel),
    };
    if file.starts_with('_') || file.starts_with('.') {
        return None;
    }

    let stem = file.rsplit_once('.').map(|(s, _)| s).unwrap_or(file);

    let mut segments: Vec<&str> = dir.map(|d| d.split('/').collect()).unwrap_or_default();
    if stem != "index" {
        segments.push(stem);
    }

    Some(format!("/{}", segments.join("/")))
}
