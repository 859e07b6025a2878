pub mod cli;
pub mod compose;
pub mod config;
pub mod context;
pub mod documents;
pub mod error;
pub mod extend;
pub mod graph;
pub mod keyword;
pub mod namespace;
pub mod report;

pub use compose::{build, BuildOutput};
pub use config::Config;
pub use context::BuildContext;
pub use error::{ExpandError, ExtendError, GraphError, NamespaceConflict, ProcessingError, ValidationErrors};
pub use graph::{Module, ModuleGraph, ModuleGraphBuilder};
pub use keyword::{Keyword, KeywordContext, KeywordRegistry, Replacement};
pub use namespace::{NamespaceLoader, ResolvedNamespaces};
