//! Live sessions and the store that caches them.
//!
//! Each session exclusively owns its variable store and execution cursor and
//! sits behind its own async mutex, so one session advances strictly
//! sequentially while unrelated sessions run concurrently. The graph a
//! session references is shared and read-only.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use moka::future::Cache;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::info;

use crate::error::FlowError;
use crate::graph::FlowGraph;
use crate::message::OutboundMessage;
use crate::state::{Variable, VariableStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Running,
    AwaitingInput,
    AwaitingService,
    Ended,
    Failed,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Ended | SessionStatus::Failed)
    }
}

/// One live execution of a flow graph for one end user.
#[derive(Debug)]
pub struct Session {
    pub id: String,
    pub graph: Arc<FlowGraph>,
    pub vars: VariableStore,
    /// Id of the node the session is at (suspended on, or about to run).
    pub cursor: String,
    pub status: SessionStatus,
    /// Label supplied on resume at the most recent decider node, consumed by
    /// the next intent node.
    pub pending_decision: Option<String>,
    /// Listener deadline; input arriving later takes the timeout path.
    pub input_deadline: Option<Instant>,
    pub error: Option<FlowError>,
    /// Everything the session has emitted so far, oldest first.
    pub history: Vec<OutboundMessage>,
    pub created_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(graph: Arc<FlowGraph>) -> Self {
        let id = uuid::Uuid::new_v4().to_string();
        let vars = VariableStore::new();
        vars.set("session_id", Variable::Text(id.clone()));
        Session {
            id,
            cursor: graph.start_id().to_string(),
            graph,
            vars,
            status: SessionStatus::Running,
            pending_decision: None,
            input_deadline: None,
            error: None,
            history: Vec::new(),
            created_at: Utc::now(),
            ended_at: None,
        }
    }
}

pub type SessionHandle = Arc<Mutex<Session>>;

/// Cache of live sessions keyed by session id. Idle sessions expire after the
/// configured TTL; the transport observes an expired session as not found.
#[derive(Clone, Debug)]
pub struct SessionStore {
    cache: Cache<String, SessionHandle>,
}

impl SessionStore {
    /// Creates a new store with the given idle TTL in seconds.
    pub fn new(ttl_secs: u64) -> Self {
        let cache = Cache::builder()
            .time_to_idle(Duration::from_secs(ttl_secs))
            .eviction_listener(|key: Arc<String>, _value: SessionHandle, cause| {
                info!("session evicted: key={}, cause={:?}", key, cause);
            })
            .build();
        Self { cache }
    }

    pub async fn insert(&self, session: Session) -> SessionHandle {
        let id = session.id.clone();
        let handle = Arc::new(Mutex::new(session));
        self.cache.insert(id, handle.clone()).await;
        handle
    }

    pub async fn get(&self, session_id: &str) -> Option<SessionHandle> {
        self.cache.get(session_id).await
    }

    pub async fn remove(&self, session_id: &str) {
        self.cache.invalidate(session_id).await;
    }

    /// Clears all sessions (typically for tests or shutdown).
    pub fn clear(&self) {
        self.cache.invalidate_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Edge, FlowGraph, GraphDocument, NodeDoc};
    use std::collections::HashMap;

    fn tiny_graph() -> Arc<FlowGraph> {
        let doc = GraphDocument {
            id: "f".to_string(),
            title: String::new(),
            nodes: vec![
                NodeDoc {
                    id: "s".to_string(),
                    kind: "start".to_string(),
                    data: HashMap::new(),
                    pos_x: 0.0,
                    pos_y: 0.0,
                },
                NodeDoc {
                    id: "e".to_string(),
                    kind: "end".to_string(),
                    data: HashMap::new(),
                    pos_x: 0.0,
                    pos_y: 0.0,
                },
            ],
            edges: vec![Edge {
                from: "s".to_string(),
                from_port: 0,
                to: "e".to_string(),
                to_port: 0,
                label: None,
            }],
        };
        Arc::new(FlowGraph::from_document(doc).unwrap())
    }

    #[test]
    fn test_new_session_starts_at_start_node() {
        let session = Session::new(tiny_graph());
        assert_eq!(session.cursor, "s");
        assert_eq!(session.status, SessionStatus::Running);
        assert!(session.pending_decision.is_none());
        assert_eq!(
            session.vars.get("session_id"),
            Variable::Text(session.id.clone())
        );
    }

    #[tokio::test]
    async fn test_store_insert_and_retrieve() {
        let store = SessionStore::new(60);
        let handle = store.insert(Session::new(tiny_graph())).await;
        let id = handle.lock().await.id.clone();

        let again = store.get(&id).await.expect("session present");
        assert_eq!(again.lock().await.id, id);
    }

    #[tokio::test]
    async fn test_store_removal() {
        let store = SessionStore::new(60);
        let handle = store.insert(Session::new(tiny_graph())).await;
        let id = handle.lock().await.id.clone();

        store.remove(&id).await;
        assert!(store.get(&id).await.is_none());
    }

    #[tokio::test]
    async fn test_clear_sessions() {
        let store = SessionStore::new(60);
        let handle = store.insert(Session::new(tiny_graph())).await;
        let id = handle.lock().await.id.clone();

        store.clear();
        // moka applies invalidate_all lazily; lookups must miss either way
        store.cache.run_pending_tasks().await;
        assert!(store.get(&id).await.is_none());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(SessionStatus::Ended.is_terminal());
        assert!(SessionStatus::Failed.is_terminal());
        assert!(!SessionStatus::AwaitingInput.is_terminal());
        assert!(!SessionStatus::Running.is_terminal());
        assert!(!SessionStatus::AwaitingService.is_terminal());
    }
}
