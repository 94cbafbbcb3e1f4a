//! Chatflow turns a drawn conversation graph into a running chat session.
//!
//! A flow is a directed graph of typed nodes (prompts, listeners, branches,
//! counters, AI calls) authored in a visual editor and loaded from its JSON
//! document. The [`runtime::FlowRuntime`] validates and registers flows, then
//! executes them one session per conversation: each turn advances the graph
//! until it suspends for user input, calls out to an external service, or
//! reaches an end node.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use chatflow::adapter::{Adapters, RuleValidator};
//! use chatflow::message::ResumeInput;
//! use chatflow::runtime::{FlowRuntime, RuntimeConfig};
//!
//! # async fn demo(generate: Arc<dyn chatflow::adapter::GenerateAdapter>,
//! #               retrieve: Arc<dyn chatflow::adapter::RetrieveAdapter>,
//! #               flow_json: &str) -> anyhow::Result<()> {
//! let adapters = Adapters {
//!     generate,
//!     retrieve,
//!     validator: Arc::new(RuleValidator),
//! };
//! let runtime = FlowRuntime::new(adapters, RuntimeConfig::default());
//! runtime.register_flow_json(flow_json)?;
//!
//! let opening = runtime.start("onboarding").await?;
//! let reply = runtime
//!     .resume(&opening.session_id, ResumeInput::Utterance("hi".into()))
//!     .await?;
//! # let _ = reply;
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod error;
pub mod graph;
mod interpreter;
pub mod message;
pub mod registry;
pub mod runtime;
pub mod session;
pub mod state;
pub mod template;

pub use error::{EngineError, FlowError, GraphError, ValidationError};
pub use graph::{FlowGraph, Node, NodeKind};
pub use message::{OutboundMessage, ResumeInput, SessionEvent};
pub use runtime::{FlowRuntime, RuntimeConfig};
pub use session::SessionStatus;
pub use state::Variable;
