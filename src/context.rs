use anyhow::{bail, Context as _, Result};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::Config;
use crate::documents::DocumentLocator;

pub const CONFIG_ENV: &str = "MOSAIC_CONFIG";
pub const PROJECT_CONFIG_FILE: &str = "mosaic.toml";

/// Everything one run needs to know about where it is and how it is configured.
/// Passed explicitly to every phase.
#[derive(Debug, Clone)]
pub struct BuildContext {
    root_dir: PathBuf,
    config_path: Option<PathBuf>,
    config: Config,
}

impl BuildContext {
    /// Locates and loads configuration for the project rooted at `root_dir`.
    pub fn load(root_dir: &Path, cli_config: Option<&Path>) -> Result<Self> {
        let env = std::env::var(CONFIG_ENV).ok();
        let config_path = locate_config(root_dir, cli_config, env.as_deref(), user_config_path())?;

        let config = match &config_path {
            Some(p) => Config::load_from_path(p)?,
            None => Config::default(),
        };
        debug!(
            root = %root_dir.display(),
            config = ?config_path,
            "build context ready"
        );

        Ok(Self {
            root_dir: root_dir.to_path_buf(),
            config_path,
            config,
        })
    }

    pub fn with_config(root_dir: &Path, config: Config) -> Self {
        Self {
            root_dir: root_dir.to_path_buf(),
            config_path: None,
            config,
        }
    }

    // ---------- public getters ----------

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    pub fn locator(&self) -> DocumentLocator {
        DocumentLocator::new(&self.config.documents)
    }

    pub fn out_dir(&self) -> PathBuf {
        self.root_dir.join(&self.config.build.out_dir)
    }
}

/// Config path precedence:
/// 1) CLI --config (must exist)
/// 2) MOSAIC_CONFIG (must exist)
/// 3) <root>/mosaic.toml
/// 4) <config_dir>/mosaic/config.toml
/// otherwise built-in defaults (`None`).
pub fn locate_config(
    root_dir: &Path,
    cli_config: Option<&Path>,
    env_config: Option<&str>,
    user_config: Option<PathBuf>,
) -> Result<Option<PathBuf>> {
    if let Some(p) = cli_config {
        if !p.exists() {
            bail!("--config was provided but file does not exist: {}", p.display());
        }
        return Ok(Some(p.to_path_buf()));
    }

    if let Some(p) = env_config.map(str::trim).filter(|s| !s.is_empty()).map(PathBuf::from) {
        if !p.exists() {
            bail!("{CONFIG_ENV} is set but file does not exist: {}", p.display());
        }
        return Ok(Some(p));
    }

    let project = root_dir.join(PROJECT_CONFIG_FILE);
    if project.is_file() {
        return Ok(Some(project));
    }

    Ok(user_config.filter(|p| p.is_file()))
}

pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("mosaic").join("config.toml"))
}

/// Canonical project root, defaulting to the current directory.
pub fn project_root(root: Option<&Path>) -> Result<PathBuf> {
    let dir = match root {
        Some(p) => p.to_path_buf(),
        None => std::env::current_dir().context("could not determine current directory")?,
    };
    dir.canonicalize()
        .with_context(|| format!("project root does not exist: {}", dir.display()))
}
