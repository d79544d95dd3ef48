//! Directed graphs of harvested relations and their GEXF serialization
//!
//! Nodes are users, repositories or organizations; edges are relations such as
//! "contributes to", "follows" or "member of". At most one edge exists per
//! ordered pair of nodes; adding it again updates its attributes.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

pub type Attributes = BTreeMap<String, String>;

#[derive(Debug, Clone, Default)]
pub struct DirectedGraph {
    nodes: BTreeMap<String, Attributes>,
    edges: BTreeMap<(String, String), Attributes>,
}

impl DirectedGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node, merging `attrs` into any existing attributes
    pub fn add_node(&mut self, id: &str, attrs: &[(&str, &str)]) {
        let node = self.nodes.entry(id.to_string()).or_default();
        for (key, value) in attrs {
            node.insert(key.to_string(), value.to_string());
        }
    }

    /// Adds an edge (and any missing endpoint), merging `attrs` into an existing edge
    pub fn add_edge(&mut self, source: &str, target: &str, attrs: &[(&str, &str)]) {
        self.nodes.entry(source.to_string()).or_default();
        self.nodes.entry(target.to_string()).or_default();

        let edge = self
            .edges
            .entry((source.to_string(), target.to_string()))
            .or_default();
        for (key, value) in attrs {
            edge.insert(key.to_string(), value.to_string());
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn has_node(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn has_edge(&self, source: &str, target: &str) -> bool {
        self.edges
            .contains_key(&(source.to_string(), target.to_string()))
    }

    pub fn node_attribute(&self, id: &str, key: &str) -> Option<&str> {
        self.nodes.get(id)?.get(key).map(String::as_str)
    }

    pub fn edge_attribute(&self, source: &str, target: &str, key: &str) -> Option<&str> {
        self.edges
            .get(&(source.to_string(), target.to_string()))?
            .get(key)
            .map(String::as_str)
    }

    /// Serializes the graph as a GEXF 1.2 document
    pub fn to_gexf(&self) -> String {
        let node_keys = attribute_keys(self.nodes.values());
        let edge_keys = attribute_keys(self.edges.values());

        let mut out = String::new();
        out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        out.push_str("<gexf xmlns=\"http://gexf.net/1.2\" version=\"1.2\">\n");
        out.push_str("  <graph defaultedgetype=\"directed\" mode=\"static\">\n");

        write_attribute_declarations(&mut out, "node", &node_keys);
        write_attribute_declarations(&mut out, "edge", &edge_keys);

        out.push_str("    <nodes>\n");
        for (id, attrs) in &self.nodes {
            let id = escape_xml(id);
            let _ = write!(out, "      <node id=\"{}\" label=\"{}\"", id, id);
            write_attribute_values(&mut out, attrs, &node_keys);
            out.push_str("</node>\n");
        }
        out.push_str("    </nodes>\n");

        out.push_str("    <edges>\n");
        for (index, ((source, target), attrs)) in self.edges.iter().enumerate() {
            let _ = write!(
                out,
                "      <edge id=\"{}\" source=\"{}\" target=\"{}\"",
                index,
                escape_xml(source),
                escape_xml(target)
            );
            write_attribute_values(&mut out, attrs, &edge_keys);
            out.push_str("</edge>\n");
        }
        out.push_str("    </edges>\n");

        out.push_str("  </graph>\n");
        out.push_str("</gexf>\n");
        out
    }
}

fn attribute_keys<'a>(attrs: impl Iterator<Item = &'a Attributes>) -> Vec<String> {
    attrs
        .flat_map(|a| a.keys().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn write_attribute_declarations(out: &mut String, class: &str, keys: &[String]) {
    if keys.is_empty() {
        return;
    }
    let _ = writeln!(out, "    <attributes class=\"{}\">", class);
    for (index, key) in keys.iter().enumerate() {
        let _ = writeln!(
            out,
            "      <attribute id=\"{}\" title=\"{}\" type=\"string\"/>",
            index,
            escape_xml(key)
        );
    }
    out.push_str("    </attributes>\n");
}

/// Closes the opening tag and writes `<attvalues>` when there are any
fn write_attribute_values(out: &mut String, attrs: &Attributes, keys: &[String]) {
    out.push('>');
    if attrs.is_empty() {
        return;
    }
    out.push_str("<attvalues>");
    for (index, key) in keys.iter().enumerate() {
        if let Some(value) = attrs.get(key) {
            let _ = write!(
                out,
                "<attvalue for=\"{}\" value=\"{}\"/>",
                index,
                escape_xml(value)
            );
        }
    }
    out.push_str("</attvalues>");
}

fn escape_xml(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
