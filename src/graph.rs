//! Flow graph data model: typed nodes, labeled edges and the document format
//! the external flow editor publishes.
//!
//! A [`FlowGraph`] is immutable once built and shared read-only across any
//! number of sessions. All authoring problems that make a graph unusable are
//! collected at load time; permissive authoring artifacts (a node without a
//! successor for some branch) stay runtime faults so half-finished flows can
//! still be loaded and exercised.

use std::collections::HashMap;

use petgraph::graph::NodeIndex;
use petgraph::prelude::StableDiGraph;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::{FlowError, GraphError, ValidationError};
use crate::registry;

/// Identifier of a node type, defined once at process start in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Start,
    Text,
    Listener,
    Decider,
    Intent,
    Conditional,
    Counter,
    SetValue,
    Validator,
    Ai,
    Qa,
    End,
}

impl NodeKind {
    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "start" => Some(NodeKind::Start),
            "text" => Some(NodeKind::Text),
            "listener" => Some(NodeKind::Listener),
            "decider" => Some(NodeKind::Decider),
            "intent" => Some(NodeKind::Intent),
            "conditional" => Some(NodeKind::Conditional),
            "counter" => Some(NodeKind::Counter),
            "set_value" => Some(NodeKind::SetValue),
            "validator" => Some(NodeKind::Validator),
            "ai" => Some(NodeKind::Ai),
            "qa" => Some(NodeKind::Qa),
            "end" => Some(NodeKind::End),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Start => "start",
            NodeKind::Text => "text",
            NodeKind::Listener => "listener",
            NodeKind::Decider => "decider",
            NodeKind::Intent => "intent",
            NodeKind::Conditional => "conditional",
            NodeKind::Counter => "counter",
            NodeKind::SetValue => "set_value",
            NodeKind::Validator => "validator",
            NodeKind::Ai => "ai",
            NodeKind::Qa => "qa",
            NodeKind::End => "end",
        }
    }
}

/// One node instance inside a graph. The `config` map holds the editor's raw
/// field values and is validated lazily against the registry schema right
/// before the node runs. Placement is kept only for editor round-trips.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Node {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default)]
    pub config: HashMap<String, Value>,
    #[serde(default)]
    pub pos_x: f64,
    #[serde(default)]
    pub pos_y: f64,
}

impl Node {
    /// Raw text of a configuration field, falling back to the registry
    /// default when the editor left it out.
    pub fn raw(&self, field: &str) -> String {
        match self.config.get(field) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => registry::describe(self.kind)
                .field(field)
                .map(|f| f.default.to_string())
                .unwrap_or_default(),
        }
    }

    /// A JSON-encoded key list field, e.g. `saving_keys`.
    pub fn keys(&self, field: &str) -> Result<Vec<String>, FlowError> {
        crate::state::parse_key_list(&self.raw(field))
            .map_err(|e| FlowError::Config(format!("node `{}`: {e}", self.id)))
    }

    pub fn number(&self, field: &str) -> Result<f64, FlowError> {
        let raw = self.raw(field);
        raw.trim().parse::<f64>().map_err(|_| {
            FlowError::Config(format!(
                "node `{}`: field `{field}` is not a number: `{raw}`",
                self.id
            ))
        })
    }
}

/// A directed connection between two ports. Branching node types key their
/// outgoing edges by `label`; unconditional ones leave it unset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Edge {
    pub from: String,
    #[serde(default)]
    pub from_port: u32,
    pub to: String,
    #[serde(default)]
    pub to_port: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Node record as the editor publishes it: the type is an open string so an
/// unknown type becomes a collected validation error instead of a parse
/// failure.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct NodeDoc {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: HashMap<String, Value>,
    #[serde(default)]
    pub pos_x: f64,
    #[serde(default)]
    pub pos_y: f64,
}

/// The graph document produced and persisted by the external flow editor.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GraphDocument {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub nodes: Vec<NodeDoc>,
    pub edges: Vec<Edge>,
}

/// An immutable, validated flow graph.
#[derive(Debug)]
pub struct FlowGraph {
    id: String,
    title: String,
    graph: StableDiGraph<Node, Option<String>>,
    index_of: HashMap<String, NodeIndex>,
    /// Outgoing edges per node in document insertion order; branch lookups
    /// take the first label match, so duplicate labels resolve first-wins.
    successors: HashMap<String, Vec<(Option<String>, String)>>,
    start: String,
    warnings: Vec<String>,
}

impl FlowGraph {
    /// Validates and builds a graph from an editor document. All problems are
    /// collected; any hard error rejects the document as a whole.
    pub fn from_document(doc: GraphDocument) -> Result<Self, GraphError> {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        let mut nodes: Vec<Node> = Vec::with_capacity(doc.nodes.len());
        let mut seen: HashMap<String, ()> = HashMap::new();
        for raw in &doc.nodes {
            if seen.insert(raw.id.clone(), ()).is_some() {
                errors.push(ValidationError::DuplicateNode(raw.id.clone()));
                continue;
            }
            match NodeKind::from_id(&raw.kind) {
                Some(kind) => nodes.push(Node {
                    id: raw.id.clone(),
                    kind,
                    config: raw.data.clone(),
                    pos_x: raw.pos_x,
                    pos_y: raw.pos_y,
                }),
                None => errors.push(ValidationError::UnknownNodeType {
                    node: raw.id.clone(),
                    kind: raw.kind.clone(),
                }),
            }
        }

        let starts: Vec<&Node> = nodes.iter().filter(|n| n.kind == NodeKind::Start).collect();
        let start = match starts.as_slice() {
            [] => {
                errors.push(ValidationError::MissingStart);
                String::new()
            }
            [only] => only.id.clone(),
            many => {
                errors.push(ValidationError::MultipleStart(many.len()));
                String::new()
            }
        };

        let mut incoming: HashMap<&str, usize> = HashMap::new();
        let mut successors: HashMap<String, Vec<(Option<String>, String)>> = HashMap::new();
        let mut labels_seen: HashMap<(String, Option<String>), ()> = HashMap::new();
        for edge in &doc.edges {
            let from_known = seen.contains_key(&edge.from);
            let to_known = seen.contains_key(&edge.to);
            if !from_known || !to_known {
                errors.push(ValidationError::DanglingEdge {
                    from: edge.from.clone(),
                    to: edge.to.clone(),
                });
                continue;
            }
            if labels_seen
                .insert((edge.from.clone(), edge.label.clone()), ())
                .is_some()
            {
                let msg = format!(
                    "node `{}` has more than one outgoing edge labeled {:?}; the first one wins",
                    edge.from, edge.label
                );
                warn!("{msg}");
                warnings.push(msg);
            }
            *incoming.entry(edge.to.as_str()).or_default() += 1;
            successors
                .entry(edge.from.clone())
                .or_default()
                .push((edge.label.clone(), edge.to.clone()));
        }

        for node in &nodes {
            let n_in = incoming.get(node.id.as_str()).copied().unwrap_or(0);
            if node.kind == NodeKind::Start {
                if n_in > 0 {
                    errors.push(ValidationError::StartHasIncoming(node.id.clone()));
                }
            } else if n_in == 0 {
                errors.push(ValidationError::Unreachable(node.id.clone()));
            } else if n_in > 1 {
                let msg = format!("node `{}` has {} incoming edges", node.id, n_in);
                warn!("{msg}");
                warnings.push(msg);
            }
        }

        if !errors.is_empty() {
            return Err(GraphError::Invalid(errors));
        }

        let mut graph = StableDiGraph::new();
        let mut index_of = HashMap::new();
        for node in nodes {
            let id = node.id.clone();
            let idx = graph.add_node(node);
            index_of.insert(id, idx);
        }
        for edge in &doc.edges {
            let (from, to) = (index_of[&edge.from], index_of[&edge.to]);
            graph.add_edge(from, to, edge.label.clone());
        }

        Ok(FlowGraph {
            id: doc.id,
            title: doc.title,
            graph,
            index_of,
            successors,
            start,
            warnings,
        })
    }

    pub fn from_json(text: &str) -> Result<Self, GraphError> {
        let doc: GraphDocument = serde_json::from_str(text)?;
        Self::from_document(doc)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn start_id(&self) -> &str {
        &self.start
    }

    /// Warnings collected at load time (ambiguous labels, fan-in).
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.index_of.get(id).map(|ix| &self.graph[*ix])
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    fn outgoing(&self, id: &str) -> &[(Option<String>, String)] {
        self.successors.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn out_degree(&self, id: &str) -> usize {
        self.outgoing(id).len()
    }

    /// First edge carrying exactly this label, in document order.
    pub fn successor_labeled(&self, id: &str, label: &str) -> Option<&str> {
        self.outgoing(id)
            .iter()
            .find(|(l, _)| l.as_deref() == Some(label))
            .map(|(_, to)| to.as_str())
    }

    /// The unconditional next node: the first unlabeled edge, or the sole
    /// outgoing edge when the author labeled it anyway. A lone `timeout`
    /// edge is reserved for the deadline path and never serves as the
    /// normal-input successor.
    pub fn unconditional_successor(&self, id: &str) -> Option<&str> {
        let edges = self.outgoing(id);
        edges
            .iter()
            .find(|(l, _)| l.is_none())
            .map(|(_, to)| to.as_str())
            .or_else(|| match edges {
                [(label, to)] if label.as_deref() != Some("timeout") => Some(to.as_str()),
                _ => None,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc_node(id: &str, kind: &str) -> NodeDoc {
        NodeDoc {
            id: id.to_string(),
            kind: kind.to_string(),
            data: HashMap::new(),
            pos_x: 0.0,
            pos_y: 0.0,
        }
    }

    fn edge(from: &str, to: &str, label: Option<&str>) -> Edge {
        Edge {
            from: from.to_string(),
            from_port: 0,
            to: to.to_string(),
            to_port: 0,
            label: label.map(str::to_string),
        }
    }

    fn small_doc() -> GraphDocument {
        GraphDocument {
            id: "f1".to_string(),
            title: "small".to_string(),
            nodes: vec![
                doc_node("s", "start"),
                doc_node("t", "text"),
                doc_node("e", "end"),
            ],
            edges: vec![edge("s", "t", None), edge("t", "e", None)],
        }
    }

    #[test]
    fn test_build_small_graph() {
        let graph = FlowGraph::from_document(small_doc()).unwrap();
        assert_eq!(graph.start_id(), "s");
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.unconditional_successor("s"), Some("t"));
        assert_eq!(graph.unconditional_successor("e"), None);
        assert!(graph.warnings().is_empty());
    }

    #[test]
    fn test_missing_start_rejected() {
        let mut doc = small_doc();
        doc.nodes.retain(|n| n.id != "s");
        doc.edges.retain(|e| e.from != "s");
        let err = FlowGraph::from_document(doc).unwrap_err();
        match err {
            GraphError::Invalid(errors) => {
                assert!(errors.contains(&ValidationError::MissingStart));
                // `t` also lost its only incoming edge
                assert!(errors.contains(&ValidationError::Unreachable("t".to_string())));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_multiple_starts_rejected() {
        let mut doc = small_doc();
        doc.nodes.push(doc_node("s2", "start"));
        doc.edges.push(edge("s2", "t", None));
        let err = FlowGraph::from_document(doc).unwrap_err();
        match err {
            GraphError::Invalid(errors) => {
                assert!(errors.contains(&ValidationError::MultipleStart(2)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unknown_node_type_rejected() {
        let mut doc = small_doc();
        doc.nodes.push(doc_node("x", "teleport"));
        doc.edges.push(edge("t", "x", None));
        let err = FlowGraph::from_document(doc).unwrap_err();
        match err {
            GraphError::Invalid(errors) => {
                assert!(errors.iter().any(|e| matches!(
                    e,
                    ValidationError::UnknownNodeType { node, .. } if node == "x"
                )));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_dangling_edge_rejected() {
        let mut doc = small_doc();
        doc.edges.push(edge("t", "ghost", None));
        let err = FlowGraph::from_document(doc).unwrap_err();
        match err {
            GraphError::Invalid(errors) => {
                assert!(errors.iter().any(|e| matches!(e, ValidationError::DanglingEdge { .. })));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_duplicate_label_warns_and_first_wins() {
        let mut doc = small_doc();
        doc.nodes.push(doc_node("t2", "text"));
        doc.edges = vec![
            edge("s", "t", Some("go")),
            edge("s", "t2", Some("go")),
            edge("t", "e", None),
            edge("t2", "e", None),
        ];
        let graph = FlowGraph::from_document(doc).unwrap();
        assert!(!graph.warnings().is_empty());
        assert_eq!(graph.successor_labeled("s", "go"), Some("t"));
    }

    #[test]
    fn test_labeled_single_edge_is_unconditional_fallback() {
        let mut doc = small_doc();
        doc.edges = vec![edge("s", "t", Some("odd")), edge("t", "e", None)];
        let graph = FlowGraph::from_document(doc).unwrap();
        assert_eq!(graph.unconditional_successor("s"), Some("t"));
    }

    #[test]
    fn test_lone_timeout_edge_is_not_the_unconditional_successor() {
        let mut doc = small_doc();
        doc.edges = vec![edge("s", "t", Some("timeout")), edge("t", "e", None)];
        let graph = FlowGraph::from_document(doc).unwrap();
        assert_eq!(graph.unconditional_successor("s"), None);
        assert_eq!(graph.successor_labeled("s", "timeout"), Some("t"));
    }

    #[test]
    fn test_node_raw_falls_back_to_registry_default() {
        let mut doc = small_doc();
        doc.nodes.push(doc_node("q", "qa"));
        doc.edges.push(edge("t", "q", None));
        doc.edges.push(edge("q", "e", Some("success")));
        let graph = FlowGraph::from_document(doc).unwrap();
        let qa = graph.node("q").unwrap();
        assert_eq!(qa.raw("question"), "{last_utterance}");
        assert_eq!(qa.number("num_docs").unwrap(), 5.0);
    }

    #[test]
    fn test_document_round_trip() {
        let doc = small_doc();
        let json = serde_json::to_string(&doc).unwrap();
        let back: GraphDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(back.nodes.len(), 3);
        assert_eq!(back.edges.len(), 2);
    }

    #[test]
    fn test_config_values_read_back() {
        let mut node = doc_node("t", "text");
        node.data.insert("text".to_string(), json!("Hello {name}"));
        let mut doc = small_doc();
        doc.nodes[1] = node;
        let graph = FlowGraph::from_document(doc).unwrap();
        assert_eq!(graph.node("t").unwrap().raw("text"), "Hello {name}");
    }
}
