use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while a session is executing nodes.
///
/// `Config` means the graph was authored in a way that cannot express a next
/// step and is always fatal to the session. `Runtime` and `Service` are
/// resolved through a fallback successor when the graph provides one and are
/// fatal otherwise.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize, JsonSchema)]
pub enum FlowError {
    #[error("config error: {0}")]
    Config(String),
    #[error("runtime error: {0}")]
    Runtime(String),
    #[error("external service error: {0}")]
    Service(String),
}

/// A single problem found while validating a flow document at load time.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize, JsonSchema)]
pub enum ValidationError {
    #[error("flow has no start node")]
    MissingStart,
    #[error("flow has {0} start nodes, expected exactly one")]
    MultipleStart(usize),
    #[error("duplicate node id `{0}`")]
    DuplicateNode(String),
    #[error("unknown node type `{kind}` on node `{node}`")]
    UnknownNodeType { node: String, kind: String },
    #[error("edge `{from}` -> `{to}` references an unknown node")]
    DanglingEdge { from: String, to: String },
    #[error("start node `{0}` must not have incoming edges")]
    StartHasIncoming(String),
    #[error("node `{0}` has no incoming edge and is unreachable")]
    Unreachable(String),
}

/// Failure to turn a flow document into a usable [`FlowGraph`].
///
/// [`FlowGraph`]: crate::graph::FlowGraph
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("invalid flow document: {0:?}")]
    Invalid(Vec<ValidationError>),
    #[error("malformed flow document: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Errors surfaced to the session transport, as opposed to errors that
/// transition a session to `Failed`.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown flow `{0}`")]
    FlowNotFound(String),
    #[error("unknown session `{0}`")]
    SessionNotFound(String),
    #[error("session `{0}` is not awaiting input")]
    NotAwaitingInput(String),
    #[error("session `{0}` already reached a terminal state")]
    Terminal(String),
}
