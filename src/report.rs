use crate::cli;
use crate::graph::ModuleGraph;
use crate::namespace::ResolvedNamespaces;

pub fn build_report(graph: &ModuleGraph, namespaces: &ResolvedNamespaces, mode: cli::ReportMode) -> String {
    match mode {
        cli::ReportMode::Summary => summary(graph, namespaces),
        cli::ReportMode::Full => {
            let mut out = graph_report(graph);
            out.push('\n');
            out.push_str(&namespace_report(namespaces, None));
            out
        }
    }
}

/// Build order followed by every module's dependency edges.
pub fn graph_report(graph: &ModuleGraph) -> String {
    let mut out = String::new();

    out.push_str("module graph\n");
    out.push_str("============\n");
    out.push_str(&format!("root: {}\n", graph.root_name()));

    out.push_str("\norder\n");
    for (i, m) in graph.modules().enumerate() {
        out.push_str(&format!("  {:>2}. {}@{} ({})\n", i + 1, m.name, m.version, m.root.display()));
    }

    out.push_str("\nedges\n");
    for name in graph.order() {
        let Some(node) = graph.node(name) else {
            continue;
        };
        if node.children.is_empty() {
            out.push_str(&format!("  {name}\n"));
        } else {
            out.push_str(&format!("  {name} -> {}\n", node.children.join(", ")));
        }
    }

    out
}

/// Owner of every value, grouped by namespace. `only` restricts the output to one namespace.
pub fn namespace_report(namespaces: &ResolvedNamespaces, only: Option<&str>) -> String {
    let mut out = String::new();

    out.push_str("namespaces\n");
    out.push_str("==========\n");

    for ns in namespaces.namespaces() {
        if only.is_some_and(|o| o != ns) {
            continue;
        }
        let Some(values) = namespaces.values(ns) else {
            continue;
        };
        out.push_str(&format!("\n{ns} ({})\n", values.len()));
        for (value, owner) in values {
            out.push_str(&format!("  {value} -> {owner}\n"));
        }
    }

    out
}

fn summary(graph: &ModuleGraph, namespaces: &ResolvedNamespaces) -> String {
    let mut out = String::new();

    out.push_str("mosaic report (summary)\n");
    out.push_str("=======================\n");
    out.push_str(&format!("root: {}\n", graph.root_name()));
    out.push_str(&format!("modules: {}\n", graph.len()));
    out.push_str(&format!("order: {}\n", graph.order().join(" -> ")));

    out.push_str("\nnamespaces\n");
    for ns in namespaces.namespaces() {
        let count = namespaces.values(ns).map(|v| v.len()).unwrap_or(0);
        out.push_str(&format!("  {ns}: {count}\n"));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::graph_from_edges;
    use crate::namespace::{resolve_claims, NamespaceClaim, API};

    fn fixture() -> (ModuleGraph, ResolvedNamespaces) {
        let graph = graph_from_edges("app", &[("app", &["auth"]), ("auth", &[])]);
        let ns = resolve_claims(
            &graph,
            vec![NamespaceClaim {
                namespace: API.to_string(),
                value: "GET /mfa".to_string(),
                module: "auth".to_string(),
            }],
        )
        .unwrap();
        (graph, ns)
    }

    #[test]
    fn summary_counts_modules_and_values() {
        let (graph, ns) = fixture();
        let out = build_report(&graph, &ns, cli::ReportMode::Summary);
        assert!(out.contains("modules: 2"));
        assert!(out.contains("order: app -> auth"));
        assert!(out.contains("  api: 1"));
    }

    #[test]
    fn full_report_lists_edges_and_owners() {
        let (graph, ns) = fixture();
        let out = build_report(&graph, &ns, cli::ReportMode::Full);
        assert!(out.contains("  app -> auth\n"));
        assert!(out.contains("  GET /mfa -> auth\n"));
    }

    #[test]
    fn namespace_filter_hides_others() {
        let (_, ns) = fixture();
        assert!(!namespace_report(&ns, Some("pages")).contains("GET /mfa"));
    }
}
