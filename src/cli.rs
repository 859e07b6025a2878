use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "mosaic", version, about)]
pub struct Args {
    /// Root module directory (defaults to the current directory)
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Path to a config file (overrides MOSAIC_CONFIG, <root>/mosaic.toml and the user config)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print module order and dependency edges
    Graph,

    /// Print which module owns every namespace value
    Namespaces {
        /// Only show this namespace
        #[arg(long)]
        namespace: Option<String>,
    },

    /// Expand the root module's documents and write combined outputs
    Build,

    /// Print a graph and namespace report
    Report {
        #[arg(long, value_enum, default_value_t = ReportMode::Summary)]
        mode: ReportMode,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ReportMode {
    Summary,
    Full,
}
