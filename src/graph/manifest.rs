use std::path::Path;
use std::sync::OnceLock;

use indexmap::IndexMap;
use regex::Regex;
use serde::Deserialize;

use crate::error::GraphError;

/// The subset of a node-style package manifest the graph builder reads.
#[derive(Debug, Clone, Deserialize)]
pub struct Manifest {
    pub name: String,

    #[serde(default)]
    pub version: String,

    #[serde(default)]
    pub dependencies: IndexMap<String, String>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Manifest {
    pub fn parse(path: &Path, text: &str) -> Result<Self, GraphError> {
        serde_json::from_str(text).map_err(|e| GraphError::Manifest {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    pub async fn read(path: &Path) -> Result<Self, GraphError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| GraphError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Self::parse(path, &text)
    }

    /// A package is a module when it carries the marker field with a non-null, non-false value.
    pub fn is_module(&self, marker: &str) -> bool {
        match self.extra.get(marker) {
            None | Some(serde_json::Value::Null) | Some(serde_json::Value::Bool(false)) => false,
            Some(_) => true,
        }
    }

    /// Checks the package name against the npm naming rules.
    pub fn validate_name(&self, path: &Path) -> Result<(), GraphError> {
        if package_name_re().is_match(&self.name) {
            return Ok(());
        }
        Err(GraphError::Manifest {
            path: path.to_path_buf(),
            message: format!("invalid module name '{}'", self.name),
        })
    }
}

fn package_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:@[a-z0-9\-*~][a-z0-9\-*._~]*/)?[a-z0-9\-~][a-z0-9\-._~]*$")
            .expect("package name pattern is valid")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_field_decides_membership() {
        let p = Path::new("package.json");
        let m = Manifest::parse(p, r#"{"name":"auth","version":"1.2.0","mosaic":{}}"#).unwrap();
        assert!(m.is_module("mosaic"));

        let m = Manifest::parse(p, r#"{"name":"lodash","version":"4.0.0"}"#).unwrap();
        assert!(!m.is_module("mosaic"));

        let m = Manifest::parse(p, r#"{"name":"x","mosaic":false}"#).unwrap();
        assert!(!m.is_module("mosaic"));
    }

    #[test]
    fn dependencies_keep_declaration_order() {
        let m = Manifest::parse(
            Path::new("package.json"),
            r#"{"name":"app","dependencies":{"zeta":"1","alpha":"2","@org/mid":"3"}}"#,
        )
        .unwrap();
        let names: Vec<_> = m.dependencies.keys().cloned().collect();
        assert_eq!(names, vec!["zeta", "alpha", "@org/mid"]);
    }

    #[test]
    fn validates_scoped_and_plain_names() {
        let p = Path::new("package.json");
        for ok in ["auth", "@org/auth-ui", "a.b_c"] {
            let m = Manifest::parse(p, &format!(r#"{{"name":"{ok}"}}"#)).unwrap();
            assert!(m.validate_name(p).is_ok(), "{ok}");
        }
        for bad in ["Auth", "has space", "@org/"] {
            let m = Manifest::parse(p, &format!(r#"{{"name":"{bad}"}}"#)).unwrap();
            assert!(m.validate_name(p).is_err(), "{bad}");
        }
    }

    #[test]
    fn malformed_json_is_a_manifest_error() {
        let err = Manifest::parse(Path::new("/x/package.json"), "{").unwrap_err();
        assert!(matches!(err, GraphError::Manifest { .. }));
    }
}
