// src/config/mod.rs
use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context as _, Result};

pub mod build;
pub mod documents;
pub mod graph;

pub use build::BuildConfig;
pub use documents::DocumentsConfig;
pub use graph::GraphConfig;

/// Parameter value overrides keyed by parameter name.
pub type ParameterOverrides = BTreeMap<String, toml::Value>;

const SCHEMA_VERSION: u32 = 1;

fn schema_version() -> u32 {
	SCHEMA_VERSION
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct Config {
	#[serde(default)]
	pub mosaic: MosaicMeta,

	#[serde(default)]
	pub graph: GraphConfig,

	#[serde(default)]
	pub documents: DocumentsConfig,

	#[serde(default)]
	pub build: BuildConfig,

	#[serde(default)]
	pub parameters: ParameterOverrides,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct MosaicMeta {
	#[serde(default = "schema_version")]
	pub schema_version: u32,
}

impl Default for MosaicMeta {
	fn default() -> Self {
		Self {
			schema_version: SCHEMA_VERSION,
		}
	}
}

impl Config {
	pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
		let path = path.as_ref();
		let text = std::fs::read_to_string(path)
			.with_context(|| format!("failed to read config {}", path.display()))?;
		Self::from_toml(&text).with_context(|| format!("invalid config {}", path.display()))
	}

	pub fn from_toml(text: &str) -> Result<Self> {
		let cfg: Config = toml::from_str(text)?;
		if cfg.mosaic.schema_version != SCHEMA_VERSION {
			bail!(
				"unsupported schema_version {} (expected {})",
				cfg.mosaic.schema_version,
				SCHEMA_VERSION
			);
		}
		if cfg.build.max_expansion_depth == 0 {
			bail!("build.max_expansion_depth must be at least 1");
		}
		Ok(cfg)
	}

	/// Parameter overrides converted to JSON values.
	pub fn parameter_overrides(&self) -> Result<serde_json::Map<String, serde_json::Value>> {
		let mut out = serde_json::Map::new();
		for (k, v) in &self.parameters {
			let json = serde_json::to_value(v)
				.with_context(|| format!("parameters.{k}: cannot be represented as JSON"))?;
			out.insert(k.clone(), json);
		}
		Ok(out)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn empty_config_uses_defaults() {
		let cfg = Config::from_toml("").unwrap();
		assert_eq!(cfg.graph.manifest, "package.json");
		assert_eq!(cfg.graph.deps_dir, "node_modules");
		assert_eq!(cfg.graph.marker, "mosaic");
		assert_eq!(cfg.documents.source_dir, "mosaic");
		assert_eq!(cfg.documents.dist_dir, "dist/mosaic");
		assert_eq!(cfg.build.out_dir, ".mosaic");
		assert_eq!(cfg.build.max_expansion_depth, 32);
	}

	#[test]
	fn parameter_overrides_become_json() {
		let cfg = Config::from_toml(
			r#"
[graph]
deps_dir = "deps"

[parameters]
Stage = "prod"
Replicas = 3
"#,
		)
		.unwrap();
		assert_eq!(cfg.graph.deps_dir, "deps");
		let overrides = cfg.parameter_overrides().unwrap();
		assert_eq!(overrides["Stage"], serde_json::json!("prod"));
		assert_eq!(overrides["Replicas"], serde_json::json!(3));
	}

	#[test]
	fn rejects_unknown_schema_version() {
		let err = Config::from_toml("[mosaic]\nschema_version = 9\n").unwrap_err();
		assert!(err.to_string().contains("schema_version"));
	}
}
