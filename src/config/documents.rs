// src/config/documents.rs

fn default_source_dir() -> String {
	"mosaic".to_string()
}

fn default_dist_dir() -> String {
	"dist/mosaic".to_string()
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct DocumentsConfig {
	/// Raw documents of the root module, relative to its directory.
	#[serde(default = "default_source_dir")]
	pub source_dir: String,

	/// Expanded module-local fragments, relative to each module directory.
	#[serde(default = "default_dist_dir")]
	pub dist_dir: String,
}

impl Default for DocumentsConfig {
	fn default() -> Self {
		Self {
			source_dir: default_source_dir(),
			dist_dir: default_dist_dir(),
		}
	}
}
