//! Static catalog of node types: parameter schemas, defaults and port arity.
//!
//! The registry is the single source of truth for node shape. The interpreter
//! never branches on field layout directly; it asks the registry for the
//! schema and validates a node's configuration lazily, right before the node
//! runs. Adding a node type is a data registration here plus one execute
//! variant in the interpreter.

use once_cell::sync::Lazy;

use crate::error::FlowError;
use crate::graph::{Node, NodeKind};

/// Declared value kind of a configuration field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Plain text, taken verbatim.
    Text,
    /// Text resolved against the variable store before use.
    Template,
    /// A list encoded as JSON text, e.g. `["last_utterance"]`.
    JsonList,
    /// Floating-point number.
    Number,
    /// One of a closed set of identifiers.
    Enum(&'static [&'static str]),
}

/// One named configuration field with its kind and default raw value.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub default: &'static str,
}

/// How many outgoing edges a node type routes over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputArity {
    /// Terminal node, no outgoing edges.
    None,
    /// Exactly one unconditional successor.
    Single,
    /// Successors keyed by branch label.
    Labeled,
}

/// Shape of one node type.
#[derive(Debug, Clone)]
pub struct NodeTypeSpec {
    pub kind: NodeKind,
    pub input_ports: u8,
    pub outputs: OutputArity,
    pub fields: &'static [FieldSpec],
}

const TEXT_FIELDS: &[FieldSpec] = &[FieldSpec {
    name: "text",
    kind: FieldKind::Template,
    default: "",
}];

const LISTENER_FIELDS: &[FieldSpec] = &[
    FieldSpec { name: "saving_keys", kind: FieldKind::JsonList, default: r#"["last_utterance"]"# },
    FieldSpec { name: "elements", kind: FieldKind::JsonList, default: "[]" },
    FieldSpec { name: "timeout", kind: FieldKind::Text, default: "" },
];

const DECIDER_FIELDS: &[FieldSpec] = &[FieldSpec {
    name: "intents",
    kind: FieldKind::JsonList,
    default: r#"["help","greeting","goodbye"]"#,
}];

const INTENT_FIELDS: &[FieldSpec] = &[FieldSpec {
    name: "intent",
    kind: FieldKind::Text,
    default: "fail",
}];

const CONDITIONAL_FIELDS: &[FieldSpec] = &[
    FieldSpec { name: "variable", kind: FieldKind::Text, default: "last_utterance" },
    FieldSpec {
        name: "condition",
        kind: FieldKind::Enum(&[
            "equals",
            "not_equals",
            "greater_than",
            "less_than",
            "contains",
            "not_contains",
        ]),
        default: "equals",
    },
    FieldSpec { name: "type", kind: FieldKind::Enum(&["text", "number", "boolean"]), default: "text" },
    FieldSpec { name: "value", kind: FieldKind::Template, default: "" },
];

const COUNTER_FIELDS: &[FieldSpec] = &[
    FieldSpec { name: "saving_keys", kind: FieldKind::JsonList, default: r#"["counter"]"# },
    FieldSpec { name: "add", kind: FieldKind::Number, default: "1" },
];

const SET_VALUE_FIELDS: &[FieldSpec] = &[
    FieldSpec { name: "saving_keys", kind: FieldKind::JsonList, default: r#"["last_utterance"]"# },
    FieldSpec { name: "value", kind: FieldKind::Template, default: "" },
    FieldSpec { name: "type", kind: FieldKind::Enum(&["text", "number", "boolean"]), default: "text" },
];

const VALIDATOR_FIELDS: &[FieldSpec] = &[
    FieldSpec { name: "type", kind: FieldKind::Enum(&["email", "id"]), default: "email" },
    FieldSpec { name: "variable", kind: FieldKind::Text, default: "last_utterance" },
];

const AI_FIELDS: &[FieldSpec] = &[
    FieldSpec { name: "instruction", kind: FieldKind::Template, default: "" },
    FieldSpec { name: "system_message", kind: FieldKind::Template, default: "" },
    FieldSpec { name: "temperature", kind: FieldKind::Number, default: "0.5" },
    FieldSpec { name: "max_tokens", kind: FieldKind::Number, default: "2000" },
    FieldSpec { name: "model", kind: FieldKind::Template, default: "gpt-3.5-turbo" },
    FieldSpec { name: "show", kind: FieldKind::Enum(&["yes", "no"]), default: "yes" },
    FieldSpec { name: "saving_keys", kind: FieldKind::JsonList, default: r#"["last_response"]"# },
];

const QA_FIELDS: &[FieldSpec] = &[
    FieldSpec { name: "collection", kind: FieldKind::Text, default: "" },
    FieldSpec { name: "question", kind: FieldKind::Template, default: "{last_utterance}" },
    FieldSpec { name: "temperature", kind: FieldKind::Number, default: "0.5" },
    FieldSpec { name: "max_tokens", kind: FieldKind::Number, default: "2000" },
    FieldSpec { name: "model", kind: FieldKind::Template, default: "gpt-3.5-turbo" },
    FieldSpec { name: "num_docs", kind: FieldKind::Number, default: "5" },
    FieldSpec {
        name: "fallback",
        kind: FieldKind::Template,
        default: "Sorry, I don't know the answer to that question",
    },
    FieldSpec { name: "saving_keys", kind: FieldKind::JsonList, default: r#"["last_response"]"# },
];

static CATALOG: Lazy<Vec<NodeTypeSpec>> = Lazy::new(|| {
    vec![
        NodeTypeSpec { kind: NodeKind::Start, input_ports: 0, outputs: OutputArity::Single, fields: TEXT_FIELDS },
        NodeTypeSpec { kind: NodeKind::Text, input_ports: 1, outputs: OutputArity::Single, fields: TEXT_FIELDS },
        NodeTypeSpec { kind: NodeKind::Listener, input_ports: 1, outputs: OutputArity::Labeled, fields: LISTENER_FIELDS },
        NodeTypeSpec { kind: NodeKind::Decider, input_ports: 1, outputs: OutputArity::Labeled, fields: DECIDER_FIELDS },
        NodeTypeSpec { kind: NodeKind::Intent, input_ports: 1, outputs: OutputArity::Single, fields: INTENT_FIELDS },
        NodeTypeSpec { kind: NodeKind::Conditional, input_ports: 1, outputs: OutputArity::Labeled, fields: CONDITIONAL_FIELDS },
        NodeTypeSpec { kind: NodeKind::Counter, input_ports: 1, outputs: OutputArity::Single, fields: COUNTER_FIELDS },
        NodeTypeSpec { kind: NodeKind::SetValue, input_ports: 1, outputs: OutputArity::Single, fields: SET_VALUE_FIELDS },
        NodeTypeSpec { kind: NodeKind::Validator, input_ports: 1, outputs: OutputArity::Labeled, fields: VALIDATOR_FIELDS },
        NodeTypeSpec { kind: NodeKind::Ai, input_ports: 1, outputs: OutputArity::Labeled, fields: AI_FIELDS },
        NodeTypeSpec { kind: NodeKind::Qa, input_ports: 1, outputs: OutputArity::Labeled, fields: QA_FIELDS },
        NodeTypeSpec { kind: NodeKind::End, input_ports: 1, outputs: OutputArity::None, fields: TEXT_FIELDS },
    ]
});

/// Returns the schema for a node kind. Every `NodeKind` is registered.
pub fn describe(kind: NodeKind) -> &'static NodeTypeSpec {
    CATALOG
        .iter()
        .find(|spec| spec.kind == kind)
        .expect("every node kind is registered")
}

/// Returns the schema for a node type identifier, or `None` for unknown ids.
pub fn describe_id(id: &str) -> Option<&'static NodeTypeSpec> {
    NodeKind::from_id(id).map(describe)
}

impl NodeTypeSpec {
    pub fn field(&self, name: &str) -> Option<&'static FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Lazy configuration check run right before the node executes.
    ///
    /// Number fields must parse and enum fields must name a registered
    /// alternative. JSON-list fields are left to the node semantics because
    /// some of them tolerate free text (a decider's `intents`, for one).
    pub fn validate(&self, node: &Node) -> Result<(), FlowError> {
        for field in self.fields {
            let raw = node.raw(field.name);
            match field.kind {
                FieldKind::Number => {
                    raw.trim().parse::<f64>().map_err(|_| {
                        FlowError::Config(format!(
                            "node `{}`: field `{}` is not a number: `{}`",
                            node.id, field.name, raw
                        ))
                    })?;
                }
                FieldKind::Enum(options) => {
                    if !options.contains(&raw.as_str()) {
                        return Err(FlowError::Config(format!(
                            "node `{}`: field `{}` must be one of {:?}, got `{}`",
                            node.id, field.name, options, raw
                        )));
                    }
                }
                FieldKind::Text | FieldKind::Template | FieldKind::JsonList => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn node(kind: NodeKind, config: HashMap<String, serde_json::Value>) -> Node {
        Node {
            id: "n1".to_string(),
            kind,
            config,
            pos_x: 0.0,
            pos_y: 0.0,
        }
    }

    #[test]
    fn test_every_kind_is_registered() {
        for kind in [
            NodeKind::Start,
            NodeKind::Text,
            NodeKind::Listener,
            NodeKind::Decider,
            NodeKind::Intent,
            NodeKind::Conditional,
            NodeKind::Counter,
            NodeKind::SetValue,
            NodeKind::Validator,
            NodeKind::Ai,
            NodeKind::Qa,
            NodeKind::End,
        ] {
            assert_eq!(describe(kind).kind, kind);
        }
    }

    #[test]
    fn test_describe_id() {
        assert_eq!(describe_id("set_value").map(|s| s.kind), Some(NodeKind::SetValue));
        assert!(describe_id("teleport").is_none());
    }

    #[test]
    fn test_start_has_no_input_port() {
        assert_eq!(describe(NodeKind::Start).input_ports, 0);
        assert_eq!(describe(NodeKind::End).outputs, OutputArity::None);
        assert_eq!(describe(NodeKind::Conditional).outputs, OutputArity::Labeled);
    }

    #[test]
    fn test_validate_rejects_bad_number() {
        let mut cfg = HashMap::new();
        cfg.insert("add".to_string(), json!("lots"));
        let n = node(NodeKind::Counter, cfg);
        assert!(describe(NodeKind::Counter).validate(&n).is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_enum_value() {
        let mut cfg = HashMap::new();
        cfg.insert("condition".to_string(), json!("roughly_equals"));
        let n = node(NodeKind::Conditional, cfg);
        assert!(describe(NodeKind::Conditional).validate(&n).is_err());
    }

    #[test]
    fn test_validate_accepts_defaults() {
        let n = node(NodeKind::Ai, HashMap::new());
        assert!(describe(NodeKind::Ai).validate(&n).is_ok());
    }
}
