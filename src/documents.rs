use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context as _, Result};
use serde_json::Value;

use crate::config::DocumentsConfig;
use crate::graph::Module;

const SOURCE_EXTENSIONS: [&str; 3] = ["yml", "yaml", "json"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentKind {
    /// Parameter catalog: `{ Name: { default, value, description, ... } }`.
    Parameters,
    /// UI configuration: `{ key: value }`.
    Config,
    /// Resource template: `{ Resources: { id: {...} }, Outputs: { id: {...} } }`.
    Resources,
}

impl DocumentKind {
    pub fn stem(self) -> &'static str {
        match self {
            DocumentKind::Parameters => "parameters",
            DocumentKind::Config => "config",
            DocumentKind::Resources => "resources",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.stem())
    }
}

/// Where module documents live. The root module is read from raw sources that still
/// need expansion; dependencies ship expanded JSON fragments.
#[derive(Debug, Clone)]
pub struct DocumentLocator {
    source_dir: String,
    dist_dir: String,
}

impl DocumentLocator {
    pub fn new(cfg: &DocumentsConfig) -> Self {
        Self {
            source_dir: cfg.source_dir.clone(),
            dist_dir: cfg.dist_dir.clone(),
        }
    }

    pub fn load(&self, module: &Module, kind: DocumentKind) -> Result<Option<Value>> {
        if module.is_root {
            self.load_source(module, kind)
        } else {
            self.load_fragment(module, kind)
        }
    }

    /// First of `<source_dir>/<kind>.{yml,yaml,json}` that exists.
    pub fn source_path(&self, module: &Module, kind: DocumentKind) -> Option<PathBuf> {
        let dir = module.root.join(&self.source_dir);
        SOURCE_EXTENSIONS
            .iter()
            .map(|ext| dir.join(format!("{}.{ext}", kind.stem())))
            .find(|p| p.is_file())
    }

    pub fn load_source(&self, module: &Module, kind: DocumentKind) -> Result<Option<Value>> {
        let Some(path) = self.source_path(module, kind) else {
            return Ok(None);
        };
        read_document(&path).map(Some)
    }

    pub fn fragment_path(&self, module: &Module, kind: DocumentKind) -> PathBuf {
        module
            .root
            .join(&self.dist_dir)
            .join(format!("{}.json", kind.stem()))
    }

    pub fn load_fragment(&self, module: &Module, kind: DocumentKind) -> Result<Option<Value>> {
        let path = self.fragment_path(module, kind);
        if !path.is_file() {
            return Ok(None);
        }
        read_document(&path).map(Some)
    }

    pub fn write_fragment(&self, module: &Module, kind: DocumentKind, value: &Value) -> Result<PathBuf> {
        let path = self.fragment_path(module, kind);
        write_json(&path, value)?;
        Ok(path)
    }
}

pub fn read_document(path: &Path) -> Result<Value> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read document {}", path.display()))?;
    parse_document(path, &text)
}

/// Parses JSON or YAML, chosen by file extension.
pub fn parse_document(path: &Path, text: &str) -> Result<Value> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    let value = match ext.as_str() {
        "json" => serde_json::from_str(text)
            .with_context(|| format!("invalid JSON in {}", path.display()))?,
        "yml" | "yaml" => serde_yaml::from_str::<Value>(text)
            .with_context(|| format!("invalid YAML in {}", path.display()))?,
        other => bail!("unsupported document type '{other}': {}", path.display()),
    };

    // An empty YAML file parses to null.
    Ok(match value {
        Value::Null => Value::Object(Default::default()),
        v => v,
    })
}

pub fn write_json(path: &Path, value: &Value) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    let mut text = serde_json::to_string_pretty(value)?;
    text.push('\n');
    fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

/// Keys of a top-level object, or of one of its sections.
pub fn object_keys(doc: &Value, section: Option<&str>) -> Vec<String> {
    let target = match section {
        Some(s) => doc.get(s),
        None => Some(doc),
    };
    target
        .and_then(Value::as_object)
        .map(|m| m.keys().cloned().collect())
        .unwrap_or_default()
}
