use std::collections::BTreeMap;
use std::fmt::Write as _;

use imago_semver::VersionSpecifier;
use petgraph::graph::{Graph, NodeIndex};
use petgraph::visit::EdgeRef;

/// The candidate graph the search walked, kept for Dot rendering.
/// Nodes are `name@version` candidates (or a bare name when no candidate
/// was ever found); rejected nodes render red, failed constraints dashed.
#[derive(Debug, Default)]
pub(crate) struct DiagnosticGraph {
    graph: Graph<DiagNode, DiagEdge>,
    index: BTreeMap<String, NodeIndex>,
}

#[derive(Debug)]
struct DiagNode {
    label: String,
    rejected: bool,
}

#[derive(Debug)]
struct DiagEdge {
    label: String,
    failed: bool,
}

impl DiagnosticGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&mut self, label: &str) -> NodeIndex {
        if let Some(ix) = self.index.get(label) {
            return *ix;
        }

        let ix = self.graph.add_node(DiagNode {
            label: label.to_string(),
            rejected: false,
        });
        self.index.insert(label.to_string(), ix);
        ix
    }

    pub fn reject(&mut self, label: &str) {
        let ix = self.node(label);
        self.graph[ix].rejected = true;
    }

    pub fn edge(&mut self, from: &str, to: &str, specifier: &VersionSpecifier, failed: bool) {
        let from = self.node(from);
        let to = self.node(to);
        let label = specifier.to_string();

        let existing = self
            .graph
            .edges_connecting(from, to)
            .find(|edge| edge.weight().label == label)
            .map(|edge| edge.id());

        if let Some(id) = existing {
            self.graph[id].failed |= failed;
            return;
        }

        self.graph.add_edge(from, to, DiagEdge { label, failed });
    }

    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph image {\n");

        for ix in self.graph.node_indices() {
            let node = &self.graph[ix];
            let _ = write!(out, "    n{} [label=\"{}\"", ix.index(), escape(&node.label));
            if node.rejected {
                out.push_str(", color=red");
            }
            out.push_str("];\n");
        }

        for edge in self.graph.edge_references() {
            let _ = write!(
                out,
                "    n{} -> n{} [label=\"{}\"",
                edge.source().index(),
                edge.target().index(),
                escape(&edge.weight().label)
            );
            if edge.weight().failed {
                out.push_str(", style=dashed");
            }
            out.push_str("];\n");
        }

        out.push_str("}\n");
        out
    }
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_rejections_and_failed_constraints() {
        let mut diag = DiagnosticGraph::new();
        diag.node("A@1.0.0");
        diag.reject("B@2.0.0");
        diag.edge(
            "A@1.0.0",
            "B@2.0.0",
            &VersionSpecifier::parse("^1.0.0").unwrap(),
            true,
        );

        let dot = diag.to_dot();
        assert!(dot.starts_with("digraph image {"));
        assert!(dot.contains("label=\"B@2.0.0\", color=red"));
        assert!(dot.contains("style=dashed"));
        assert!(dot.contains("label=\"^1.0.0\""));
    }

    #[test]
    fn deduplicates_nodes_and_edges() {
        let mut diag = DiagnosticGraph::new();
        let spec = VersionSpecifier::parse("^1.0.0").unwrap();
        diag.edge("A@1.0.0", "B@1.2.0", &spec, false);
        diag.edge("A@1.0.0", "B@1.2.0", &spec, false);

        let dot = diag.to_dot();
        assert_eq!(dot.matches("->").count(), 1);
    }
}
