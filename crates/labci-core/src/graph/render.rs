//! Graphviz DOT export of the package graph.

use std::fs;
use std::path::Path;

use crate::graph::error::{GraphError, GraphResult};
use crate::graph::DependencyGraph;

fn quote(name: &str) -> String {
    format!("\"{}\"", name.replace('\\', "\\\\").replace('"', "\\\""))
}

impl DependencyGraph {
    /// Render every package and edge as a DOT digraph.
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph packages {\n    rankdir=LR;\n    node [shape=box];\n");
        for package in self.packages() {
            out.push_str(&format!("    {};\n", quote(package)));
        }
        for (from, to) in self.edges() {
            out.push_str(&format!("    {} -> {};\n", quote(from), quote(to)));
        }
        out.push_str("}\n");
        out
    }

    /// Write [`to_dot`](Self::to_dot) output to `path`.
    pub fn write_dot(&self, path: &Path) -> GraphResult<()> {
        fs::write(path, self.to_dot()).map_err(|source| GraphError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dot_lists_every_node_and_edge() {
        let mut g = DependencyGraph::new();
        g.add_edge("alpha", "beta");
        g.add_edge("alpha", "gamma");
        g.add_package("lonely");
        let dot = g.to_dot();
        assert!(dot.starts_with("digraph packages {"));
        for node in ["alpha", "beta", "gamma", "lonely"] {
            assert!(dot.contains(&format!("\"{node}\";")), "missing node {node}");
        }
        assert!(dot.contains("\"alpha\" -> \"beta\";"));
        assert!(dot.contains("\"alpha\" -> \"gamma\";"));
    }

    #[test]
    fn test_dot_is_one_statement_per_line() {
        let mut g = DependencyGraph::new();
        g.add_edge("alpha", "beta");
        assert_eq!(
            g.to_dot(),
            "digraph packages {\n    rankdir=LR;\n    node [shape=box];\n    \"alpha\";\n    \"beta\";\n    \"alpha\" -> \"beta\";\n}\n"
        );
    }

    #[test]
    fn test_quotes_are_escaped() {
        let mut g = DependencyGraph::new();
        g.add_package("we\"ird");
        assert!(g.to_dot().contains("\"we\\\"ird\";"));
    }

    #[test]
    fn test_write_dot() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("graph.dot");
        let mut g = DependencyGraph::new();
        g.add_edge("a", "b");
        g.write_dot(&path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), g.to_dot());
    }
}
