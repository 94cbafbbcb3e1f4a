//! External capabilities the interpreter calls but does not implement.
//!
//! Text generation and retrieval are abstract async adapters; any retry
//! policy lives behind the adapter, not in the interpreter. Input validation
//! ships with a built-in rule set because the rules are fixed by name.

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum AdapterError {
    #[error("adapter call timed out")]
    Timeout,
    #[error("adapter failure: {0}")]
    Failed(String),
}

/// Parameters for one text-generation call, fully template-resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GenerateRequest {
    pub instruction: String,
    pub system_message: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub model: String,
}

/// Parameters for one knowledge-base retrieval call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RetrieveRequest {
    pub collection: String,
    pub question: String,
    pub num_docs: u32,
    pub temperature: f64,
    pub max_tokens: u32,
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RetrieveReply {
    pub answer: String,
    /// False when retrieval found no supporting documents.
    pub confident: bool,
}

#[async_trait]
pub trait GenerateAdapter: Send + Sync + Debug {
    async fn generate(&self, request: GenerateRequest) -> Result<String, AdapterError>;
}

#[async_trait]
pub trait RetrieveAdapter: Send + Sync + Debug {
    async fn retrieve(&self, request: RetrieveRequest) -> Result<RetrieveReply, AdapterError>;
}

pub trait InputValidator: Send + Sync + Debug {
    fn validate(&self, rule: &str, text: &str) -> bool;
}

static EMAIL: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^@]+@[^@]+\.[^@]+").expect("email pattern"));
static NUMERIC_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]{4,6}$").expect("id pattern"));

/// Validator with the rules the flow editor exposes by name.
#[derive(Debug, Clone, Default)]
pub struct RuleValidator;

impl InputValidator for RuleValidator {
    fn validate(&self, rule: &str, text: &str) -> bool {
        match rule {
            "email" => EMAIL.is_match(text),
            "id" => NUMERIC_ID.is_match(text),
            _ => false,
        }
    }
}

/// The adapter bundle a runtime is constructed with. Adapters are shared and
/// must tolerate concurrent calls from unrelated sessions.
#[derive(Clone)]
pub struct Adapters {
    pub generate: Arc<dyn GenerateAdapter>,
    pub retrieve: Arc<dyn RetrieveAdapter>,
    pub validator: Arc<dyn InputValidator>,
}

impl Debug for Adapters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Adapters").finish_non_exhaustive()
    }
}
