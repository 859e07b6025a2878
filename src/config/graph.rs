// src/config/graph.rs

fn default_manifest() -> String {
	"package.json".to_string()
}

fn default_deps_dir() -> String {
	"node_modules".to_string()
}

fn default_marker() -> String {
	"mosaic".to_string()
}

/// How packages are found on disk and recognized as modules.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct GraphConfig {
	/// Manifest file name inside every package directory.
	#[serde(default = "default_manifest")]
	pub manifest: String,

	/// Dependency storage directory searched while ascending the tree.
	#[serde(default = "default_deps_dir")]
	pub deps_dir: String,

	/// Manifest field that marks a package as a module.
	#[serde(default = "default_marker")]
	pub marker: String,
}

impl Default for GraphConfig {
	fn default() -> Self {
		Self {
			manifest: default_manifest(),
			deps_dir: default_deps_dir(),
			marker: default_marker(),
		}
	}
}
