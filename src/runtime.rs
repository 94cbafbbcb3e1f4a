//! The embedding surface: a registry of loaded flows plus the session store,
//! exposed as start / resume / expire / cancel operations that transports
//! call into.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use dashmap::DashMap;
use tracing::{info, instrument, warn};

use crate::adapter::Adapters;
use crate::error::{EngineError, GraphError};
use crate::graph::FlowGraph;
use crate::interpreter;
use crate::message::{OutboundMessage, ResumeInput, SessionEvent};
use crate::session::{Session, SessionStatus, SessionStore};

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Idle sessions are evicted after this long without activity.
    pub session_ttl_secs: u64,
    /// Hard cap on a single generation or retrieval call.
    pub service_timeout: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            session_ttl_secs: 30 * 60,
            service_timeout: Duration::from_secs(30),
        }
    }
}

/// Owns the loaded flow graphs and every live session over them.
///
/// The runtime is cheap to clone and safe to share across tasks; flows and
/// sessions both live behind concurrent maps.
#[derive(Clone)]
pub struct FlowRuntime {
    flows: Arc<DashMap<String, Arc<FlowGraph>>>,
    sessions: SessionStore,
    adapters: Adapters,
    config: RuntimeConfig,
}

impl FlowRuntime {
    pub fn new(adapters: Adapters, config: RuntimeConfig) -> Self {
        let sessions = SessionStore::new(config.session_ttl_secs);
        FlowRuntime {
            flows: Arc::new(DashMap::new()),
            sessions,
            adapters,
            config,
        }
    }

    /// Registers a validated graph, replacing any flow with the same id.
    /// Returns the load warnings so the caller can surface them.
    pub fn register_flow(&self, graph: FlowGraph) -> Vec<String> {
        let warnings = graph.warnings().to_vec();
        for warning in &warnings {
            warn!(flow = %graph.id(), "{warning}");
        }
        info!(flow = %graph.id(), nodes = graph.node_count(), "flow registered");
        self.flows.insert(graph.id().to_string(), Arc::new(graph));
        warnings
    }

    /// Parses, validates and registers a flow from its JSON document.
    pub fn register_flow_json(&self, text: &str) -> Result<Vec<String>, GraphError> {
        Ok(self.register_flow(FlowGraph::from_json(text)?))
    }

    /// Loads and registers a flow document from disk.
    pub fn register_flow_path(&self, path: impl AsRef<Path>) -> anyhow::Result<Vec<String>> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading flow document {}", path.display()))?;
        self.register_flow_json(&text)
            .with_context(|| format!("loading flow document {}", path.display()))
    }

    pub fn flow(&self, flow_id: &str) -> Option<Arc<FlowGraph>> {
        self.flows.get(flow_id).map(|entry| entry.value().clone())
    }

    pub fn remove_flow(&self, flow_id: &str) -> bool {
        self.flows.remove(flow_id).is_some()
    }

    pub fn flow_ids(&self) -> Vec<String> {
        self.flows.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Opens a fresh session on a flow and drives it from the start node to
    /// its first suspension point.
    #[instrument(skip(self))]
    pub async fn start(&self, flow_id: &str) -> Result<SessionEvent, EngineError> {
        let graph = self
            .flow(flow_id)
            .ok_or_else(|| EngineError::FlowNotFound(flow_id.to_string()))?;

        let session = Session::new(graph);
        let handle = self.sessions.insert(session).await;

        let mut session = handle.lock().await;
        let messages = interpreter::run(
            &mut session,
            &self.adapters,
            self.config.service_timeout,
        )
        .await;
        let event = self.event(&session, messages);
        drop(session);

        self.sweep(&event).await;
        Ok(event)
    }

    /// Delivers user input to a suspended session.
    #[instrument(skip(self, input))]
    pub async fn resume(
        &self,
        session_id: &str,
        input: ResumeInput,
    ) -> Result<SessionEvent, EngineError> {
        let handle = self
            .sessions
            .get(session_id)
            .await
            .ok_or_else(|| EngineError::SessionNotFound(session_id.to_string()))?;

        let mut session = handle.lock().await;
        match session.status {
            SessionStatus::AwaitingInput => {}
            SessionStatus::Ended | SessionStatus::Failed => {
                return Err(EngineError::Terminal(session_id.to_string()));
            }
            _ => return Err(EngineError::NotAwaitingInput(session_id.to_string())),
        }

        let messages = interpreter::resume(
            &mut session,
            input,
            &self.adapters,
            self.config.service_timeout,
        )
        .await;
        let event = self.event(&session, messages);
        drop(session);

        self.sweep(&event).await;
        Ok(event)
    }

    /// Forces the timeout path of a session stuck waiting for input. The
    /// transport calls this from its own timer.
    #[instrument(skip(self))]
    pub async fn expire(&self, session_id: &str) -> Result<SessionEvent, EngineError> {
        let handle = self
            .sessions
            .get(session_id)
            .await
            .ok_or_else(|| EngineError::SessionNotFound(session_id.to_string()))?;

        let mut session = handle.lock().await;
        if session.status.is_terminal() {
            return Err(EngineError::Terminal(session_id.to_string()));
        }
        if session.status != SessionStatus::AwaitingInput {
            return Err(EngineError::NotAwaitingInput(session_id.to_string()));
        }

        let messages = interpreter::expire(
            &mut session,
            &self.adapters,
            self.config.service_timeout,
        )
        .await;
        let event = self.event(&session, messages);
        drop(session);

        self.sweep(&event).await;
        Ok(event)
    }

    /// Drops a session without running any further nodes. Variables written
    /// so far are discarded with it.
    #[instrument(skip(self))]
    pub async fn cancel(&self, session_id: &str) -> Result<(), EngineError> {
        if self.sessions.get(session_id).await.is_none() {
            return Err(EngineError::SessionNotFound(session_id.to_string()));
        }
        info!(session_id, "session cancelled");
        self.sessions.remove(session_id).await;
        Ok(())
    }

    pub async fn status(&self, session_id: &str) -> Result<SessionStatus, EngineError> {
        let handle = self
            .sessions
            .get(session_id)
            .await
            .ok_or_else(|| EngineError::SessionNotFound(session_id.to_string()))?;
        let session = handle.lock().await;
        Ok(session.status)
    }

    /// Everything a live session has emitted so far, oldest first.
    pub async fn history(&self, session_id: &str) -> Result<Vec<OutboundMessage>, EngineError> {
        let handle = self
            .sessions
            .get(session_id)
            .await
            .ok_or_else(|| EngineError::SessionNotFound(session_id.to_string()))?;
        let session = handle.lock().await;
        Ok(session.history.clone())
    }

    fn event(&self, session: &Session, messages: Vec<OutboundMessage>) -> SessionEvent {
        SessionEvent {
            session_id: session.id.clone(),
            messages,
            status: session.status,
            error: session.error.as_ref().map(|e| e.to_string()),
        }
    }

    /// Terminal sessions leave the store as soon as their final event has
    /// been built; idle ones are left to the TTL.
    async fn sweep(&self, event: &SessionEvent) {
        if event.status.is_terminal() {
            self.sessions.remove(&event.session_id).await;
        }
    }
}

impl std::fmt::Debug for FlowRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowRuntime")
            .field("flows", &self.flow_ids())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
