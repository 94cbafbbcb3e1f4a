use dashmap::DashMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::FlowError;

/// The value kinds a flow can declare for stored values and comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Text,
    Number,
    Boolean,
}

impl ValueKind {
    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "text" => Some(ValueKind::Text),
            "number" => Some(ValueKind::Number),
            "boolean" => Some(ValueKind::Boolean),
            _ => None,
        }
    }
}

/// A typed session variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum Variable {
    Text(String),
    Number(f64),
    Boolean(bool),
    List(Vec<String>),
}

impl Variable {
    /// The defined value of a key that was never written.
    pub fn empty() -> Self {
        Variable::Text(String::new())
    }

    /// Renders the value the way it appears inside a chat message.
    pub fn render(&self) -> String {
        match self {
            Variable::Text(s) => s.clone(),
            Variable::Number(n) => {
                if n.fract() == 0.0 && n.is_finite() {
                    format!("{}", *n as i64)
                } else {
                    n.to_string()
                }
            }
            Variable::Boolean(b) => b.to_string(),
            Variable::List(items) => items.join(", "),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Variable::Number(n) => Some(*n),
            Variable::Text(s) => s.trim().parse::<f64>().ok(),
            Variable::Boolean(_) | Variable::List(_) => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Variable::Boolean(b) => Some(*b),
            Variable::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
            Variable::Number(_) | Variable::List(_) => None,
        }
    }

    /// Parses raw editor text into a variable of the declared kind.
    pub fn coerce(raw: &str, kind: ValueKind) -> Result<Variable, FlowError> {
        match kind {
            ValueKind::Text => Ok(Variable::Text(raw.to_string())),
            ValueKind::Number => raw
                .trim()
                .parse::<f64>()
                .map(Variable::Number)
                .map_err(|_| FlowError::Config(format!("`{raw}` is not a number"))),
            ValueKind::Boolean => match raw.trim().to_ascii_lowercase().as_str() {
                "true" => Ok(Variable::Boolean(true)),
                "false" => Ok(Variable::Boolean(false)),
                _ => Err(FlowError::Config(format!("`{raw}` is not a boolean"))),
            },
        }
    }
}

/// Parses a "saving keys" field.
///
/// The editor stores key lists as JSON text (`["last_utterance"]`), but a
/// bare key name is accepted too. Text that looks like JSON and fails to
/// parse is an authoring error.
pub fn parse_key_list(raw: &str) -> Result<Vec<String>, FlowError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    if trimmed.starts_with('[') {
        return serde_json::from_str::<Vec<String>>(trimmed)
            .map_err(|e| FlowError::Config(format!("unparseable key list `{raw}`: {e}")));
    }
    Ok(vec![trimmed.to_string()])
}

/// Per-session key/value store. Created empty; keys spring into existence on
/// first write and reads of unset keys yield [`Variable::empty`].
#[derive(Debug, Default)]
pub struct VariableStore {
    store: DashMap<String, Variable>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self { store: DashMap::new() }
    }

    /// Never fails: absent keys read as the empty value.
    pub fn get(&self, key: &str) -> Variable {
        self.store
            .get(key)
            .map(|v| v.clone())
            .unwrap_or_else(Variable::empty)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.store.contains_key(key)
    }

    pub fn set(&self, key: impl Into<String>, value: Variable) {
        self.store.insert(key.into(), value);
    }

    /// Fans the same value out to every key in the list.
    pub fn set_many(&self, keys: &[String], value: &Variable) {
        for key in keys {
            self.store.insert(key.clone(), value.clone());
        }
    }

    /// Commits a batch of buffered writes.
    pub fn apply(&self, writes: Vec<(String, Variable)>) {
        for (key, value) in writes {
            self.store.insert(key, value);
        }
    }

    pub fn all(&self) -> Vec<(String, Variable)> {
        self.store
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}
