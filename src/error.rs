use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Fatal problems with the on-disk module layout. Any of these aborts the build.
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("{} is not a module: manifest has no \"{marker}\" field", path.display())]
    NotAModule { path: PathBuf, marker: String },

    #[error("following modules are repeated: {}", format_duplicates(.0))]
    DuplicateModule(Vec<(String, Vec<PathBuf>)>),

    #[error("dependency '{name}' of module '{parent}' not found (searched upward from {})", from.display())]
    DependencyNotFound {
        name: String,
        parent: String,
        from: PathBuf,
    },

    #[error("cycle detected in module dependencies: {}", .0.join(", "))]
    DependencyCycle(Vec<String>),

    #[error("invalid manifest {}: {message}", path.display())]
    Manifest { path: PathBuf, message: String },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("module discovery task failed: {0}")]
    Task(String),
}

fn format_duplicates(dups: &[(String, Vec<PathBuf>)]) -> String {
    dups.iter()
        .map(|(name, paths)| {
            let paths = paths
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ");
            format!("{name} ({paths})")
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// One keyword validation failure, located by its JSON path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub path: String,
    pub message: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "at {}: {}", self.path, self.message)
    }
}

/// Every validation failure found in one document.
#[derive(Error, Debug)]
#[error("{document} has {} invalid keyword usage(s):{}", .issues.len(), format_issues(.issues))]
pub struct ValidationErrors {
    pub document: String,
    pub issues: Vec<ValidationIssue>,
}

fn format_issues(issues: &[ValidationIssue]) -> String {
    issues.iter().map(|issue| format!("\n  {issue}")).collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedValue {
    pub namespace: String,
    pub value: String,
    pub claimants: Vec<String>,
}

/// Namespace values that no single module dominates, collected across all namespaces.
#[derive(Error, Debug)]
#[error("following namespaces are unresolved:{}", format_unresolved(.unresolved))]
pub struct NamespaceConflict {
    pub unresolved: Vec<UnresolvedValue>,
}

fn format_unresolved(unresolved: &[UnresolvedValue]) -> String {
    unresolved
        .iter()
        .map(|u| {
            let claimants: String = u.claimants.iter().map(|m| format!(" - {m}")).collect();
            format!("\n  {} - {}{claimants}", u.namespace, u.value)
        })
        .collect()
}

#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("at {path}: keyword {keyword} failed: {message}")]
    Keyword {
        path: String,
        keyword: String,
        message: String,
    },

    #[error("at {path}: object declares multiple keywords: {}", keywords.join(", "))]
    AmbiguousKeywords { path: String, keywords: Vec<String> },

    #[error("at {path}: keyword {keyword} exceeded the maximum expansion depth of {limit}")]
    ExpansionDepthExceeded {
        path: String,
        keyword: String,
        limit: usize,
    },
}

/// Why one document could not be expanded.
#[derive(Error, Debug)]
pub enum ExpandError {
    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    #[error(transparent)]
    Processing(#[from] ProcessingError),
}

#[derive(Error, Debug)]
pub enum ExtendError {
    #[error("resource '{from}' extends '{to}', which does not exist")]
    MissingTarget { from: String, to: String },

    #[error("resource extension cycle: {}", .0.join(" -> "))]
    Cycle(Vec<String>),

    #[error("resource '{0}' is not an object")]
    NotAnObject(String),

    #[error("resource '{id}' has a malformed Extend marker: {message}")]
    MalformedMarker { id: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_message_lists_every_location() {
        let err = GraphError::DuplicateModule(vec![(
            "auth".to_string(),
            vec![PathBuf::from("/a/node_modules/auth"), PathBuf::from("/b/node_modules/auth")],
        )]);
        let msg = err.to_string();
        assert!(msg.starts_with("following modules are repeated:"));
        assert!(msg.contains("/a/node_modules/auth"));
        assert!(msg.contains("/b/node_modules/auth"));
    }

    #[test]
    fn conflict_message_names_all_claimants() {
        let err = NamespaceConflict {
            unresolved: vec![UnresolvedValue {
                namespace: "api".to_string(),
                value: "GET /mfa".to_string(),
                claimants: vec!["m2".to_string(), "m4".to_string()],
            }],
        };
        assert_eq!(
            err.to_string(),
            "following namespaces are unresolved:\n  api - GET /mfa - m2 - m4"
        );
    }

    #[test]
    fn validation_message_lists_each_issue_on_its_own_line() {
        let err = ValidationErrors {
            document: "config document of module app".to_string(),
            issues: vec![
                ValidationIssue {
                    path: "a".to_string(),
                    message: "AND must be an array".to_string(),
                },
                ValidationIssue {
                    path: "b[0]".to_string(),
                    message: "REF must be a string".to_string(),
                },
            ],
        };
        assert_eq!(
            err.to_string(),
            "config document of module app has 2 invalid keyword usage(s):\n  at a: AND must be an array\n  at b[0]: REF must be a string"
        );
    }
}
