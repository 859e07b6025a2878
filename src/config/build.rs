// src/config/build.rs

fn default_out_dir() -> String {
	".mosaic".to_string()
}

fn default_max_expansion_depth() -> usize {
	32
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct BuildConfig {
	/// Combined outputs, relative to the root module.
	#[serde(default = "default_out_dir")]
	pub out_dir: String,

	/// How many times a keyword may expand into another keyword.
	#[serde(default = "default_max_expansion_depth")]
	pub max_expansion_depth: usize,
}

impl Default for BuildConfig {
	fn default() -> Self {
		Self {
			out_dir: default_out_dir(),
			max_expansion_depth: default_max_expansion_depth(),
		}
	}
}
