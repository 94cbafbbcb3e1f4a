//! The session-scoped step executor.
//!
//! One call to [`run`] advances a session node by node until it suspends for
//! user input, reaches an end node, or fails. Every node executes as a single
//! step that buffers its emissions and variable writes into a [`StepOutcome`];
//! nothing is committed until the step resolves, so cancellation or a timeout
//! can never observe partially-applied writes.

use std::time::Duration;

use rand::seq::IndexedRandom;
use tokio::time::Instant;
use tracing::{info, instrument, warn};

use crate::adapter::{AdapterError, Adapters, GenerateRequest, RetrieveRequest};
use crate::error::FlowError;
use crate::graph::{FlowGraph, Node, NodeKind};
use crate::message::{Element, OutboundMessage, ResumeInput};
use crate::registry;
use crate::session::{Session, SessionStatus};
use crate::state::{ValueKind, Variable};
use crate::template;

/// Upper bound on nodes executed in one turn. Graphs are allowed to contain
/// cycles (retry loops), so a runaway flow must be cut off rather than spin.
const MAX_STEPS_PER_TURN: usize = 256;

enum Transition {
    Goto(String),
    Await { deadline: Option<Instant> },
    End,
}

/// The buffered effects of one node execution.
struct StepOutcome {
    emits: Vec<OutboundMessage>,
    writes: Vec<(String, Variable)>,
    set_decision: Option<String>,
    clear_decision: bool,
    transition: Transition,
}

impl StepOutcome {
    fn new(transition: Transition) -> Self {
        StepOutcome {
            emits: Vec::new(),
            writes: Vec::new(),
            set_decision: None,
            clear_decision: false,
            transition,
        }
    }
}

/// Advances the session until it suspends, ends or fails, collecting every
/// emitted message along the way.
#[instrument(skip(session, adapters), fields(session_id = %session.id))]
pub(crate) async fn run(
    session: &mut Session,
    adapters: &Adapters,
    service_timeout: Duration,
) -> Vec<OutboundMessage> {
    let mut emitted = Vec::new();
    let mut steps = 0usize;

    while session.status == SessionStatus::Running {
        steps += 1;
        if steps > MAX_STEPS_PER_TURN {
            fail(
                session,
                FlowError::Runtime(format!(
                    "flow executed more than {MAX_STEPS_PER_TURN} nodes in one turn"
                )),
            );
            break;
        }

        let graph = session.graph.clone();
        let Some(node) = graph.node(&session.cursor).cloned() else {
            fail(
                session,
                FlowError::Config(format!("cursor points at unknown node `{}`", session.cursor)),
            );
            break;
        };

        match step(session, &node, &graph, adapters, service_timeout).await {
            Ok(outcome) => {
                emitted.extend(commit(session, outcome));
            }
            Err(err) => fail(session, err),
        }
    }

    emitted
}

/// Feeds user input into a session suspended at a listener or decider node
/// and keeps running. Input arriving after the configured deadline takes the
/// timeout path instead; its writes are discarded untouched.
#[instrument(skip(session, adapters, input), fields(session_id = %session.id))]
pub(crate) async fn resume(
    session: &mut Session,
    input: ResumeInput,
    adapters: &Adapters,
    service_timeout: Duration,
) -> Vec<OutboundMessage> {
    if let Some(deadline) = session.input_deadline {
        if Instant::now() >= deadline {
            info!(node = %session.cursor, "input arrived after the deadline");
            return expire(session, adapters, service_timeout).await;
        }
    }
    session.input_deadline = None;

    let graph = session.graph.clone();
    let Some(node) = graph.node(&session.cursor).cloned() else {
        fail(
            session,
            FlowError::Config(format!("cursor points at unknown node `{}`", session.cursor)),
        );
        return Vec::new();
    };

    let outcome = match node.kind {
        NodeKind::Listener => listener_input(&node, &graph, &input),
        NodeKind::Decider => decider_input(&node, &graph, &input),
        other => Err(FlowError::Config(format!(
            "node `{}` of type `{}` cannot receive input",
            node.id,
            other.as_str()
        ))),
    };

    match outcome {
        Ok(outcome) => {
            session.status = SessionStatus::Running;
            let mut emitted = commit(session, outcome);
            emitted.extend(run(session, adapters, service_timeout).await);
            emitted
        }
        Err(err) => {
            fail(session, err);
            Vec::new()
        }
    }
}

/// The input deadline elapsed: follow the dedicated `timeout` successor when
/// the graph has one, else the session fails.
#[instrument(skip(session, adapters), fields(session_id = %session.id))]
pub(crate) async fn expire(
    session: &mut Session,
    adapters: &Adapters,
    service_timeout: Duration,
) -> Vec<OutboundMessage> {
    session.input_deadline = None;
    let graph = session.graph.clone();
    match graph.successor_labeled(&session.cursor, "timeout") {
        Some(next) => {
            session.cursor = next.to_string();
            session.status = SessionStatus::Running;
            run(session, adapters, service_timeout).await
        }
        None => {
            fail(
                session,
                FlowError::Runtime(format!(
                    "no input before timeout at node `{}`",
                    session.cursor
                )),
            );
            Vec::new()
        }
    }
}

/// Applies a resolved step to the session. Returns the step's emissions.
fn commit(session: &mut Session, outcome: StepOutcome) -> Vec<OutboundMessage> {
    session.vars.apply(outcome.writes);
    if outcome.clear_decision {
        session.pending_decision = None;
    }
    if let Some(label) = outcome.set_decision {
        session.pending_decision = Some(label);
    }
    match outcome.transition {
        Transition::Goto(next) => session.cursor = next,
        Transition::Await { deadline } => {
            session.status = SessionStatus::AwaitingInput;
            session.input_deadline = deadline;
        }
        Transition::End => finish(session),
    }
    session.history.extend(outcome.emits.iter().cloned());
    outcome.emits
}

fn fail(session: &mut Session, err: FlowError) {
    warn!(session_id = %session.id, node = %session.cursor, error = %err, "session failed");
    session.error = Some(err);
    session.status = SessionStatus::Failed;
    session.ended_at = Some(chrono::Utc::now());
}

fn finish(session: &mut Session) {
    info!(session_id = %session.id, "session ended");
    session.status = SessionStatus::Ended;
    session.ended_at = Some(chrono::Utc::now());
}

async fn step(
    session: &mut Session,
    node: &Node,
    graph: &FlowGraph,
    adapters: &Adapters,
    service_timeout: Duration,
) -> Result<StepOutcome, FlowError> {
    registry::describe(node.kind).validate(node)?;
    match node.kind {
        NodeKind::Start | NodeKind::Text => exec_text(session, node, graph),
        NodeKind::Listener => exec_listener(node),
        NodeKind::Decider => exec_decider(node),
        NodeKind::Intent => exec_intent(session, node, graph),
        NodeKind::Conditional => exec_conditional(session, node, graph),
        NodeKind::Counter => exec_counter(session, node, graph),
        NodeKind::SetValue => exec_set_value(session, node, graph),
        NodeKind::Validator => exec_validator(session, node, graph, adapters),
        NodeKind::Ai => exec_ai(session, node, graph, adapters, service_timeout).await,
        NodeKind::Qa => exec_qa(session, node, graph, adapters, service_timeout).await,
        NodeKind::End => exec_end(session, node),
    }
}

/// The unconditional next node, or a runtime fault for a dead end. Graphs
/// are loaded permissively, so a missing successor surfaces here.
fn advance(graph: &FlowGraph, node: &Node) -> Result<Transition, FlowError> {
    graph
        .unconditional_successor(&node.id)
        .map(|next| Transition::Goto(next.to_string()))
        .ok_or_else(|| FlowError::Runtime(format!("node `{}` has no successor", node.id)))
}

/// A labeled branch that the author must have wired up.
fn branch(graph: &FlowGraph, node: &Node, label: &str) -> Result<Transition, FlowError> {
    graph
        .successor_labeled(&node.id, label)
        .map(|next| Transition::Goto(next.to_string()))
        .ok_or_else(|| {
            FlowError::Config(format!(
                "node `{}` has no successor labeled `{label}`",
                node.id
            ))
        })
}

/// The `text` field may hold a JSON array of variants; one is chosen at
/// random so repeated visits do not sound canned.
fn pick_variant(raw: &str) -> String {
    if raw.trim_start().starts_with('[') {
        if let Ok(variants) = serde_json::from_str::<Vec<String>>(raw) {
            if let Some(choice) = variants.choose(&mut rand::rng()) {
                return choice.clone();
            }
        }
    }
    raw.to_string()
}

/// Nodes with no configured text (a bare `end`, a silent `start`) emit
/// nothing and leave `last_response` alone.
fn emit_text(session: &Session, node: &Node, outcome: &mut StepOutcome) {
    let rendered = template::resolve(&pick_variant(&node.raw("text")), &session.vars);
    if rendered.is_empty() {
        return;
    }
    outcome.writes.push(("last_response".to_string(), Variable::Text(rendered.clone())));
    outcome.emits.push(OutboundMessage::text(rendered));
}

fn exec_text(session: &Session, node: &Node, graph: &FlowGraph) -> Result<StepOutcome, FlowError> {
    let mut outcome = StepOutcome::new(advance(graph, node)?);
    emit_text(session, node, &mut outcome);
    Ok(outcome)
}

fn exec_end(session: &Session, node: &Node) -> Result<StepOutcome, FlowError> {
    let mut outcome = StepOutcome::new(Transition::End);
    emit_text(session, node, &mut outcome);
    Ok(outcome)
}

fn listener_deadline(node: &Node) -> Option<Instant> {
    let raw = node.raw("timeout");
    let secs = raw.trim().parse::<f64>().ok()?;
    (secs > 0.0).then(|| Instant::now() + Duration::from_secs_f64(secs))
}

fn exec_listener(node: &Node) -> Result<StepOutcome, FlowError> {
    let raw = node.raw("elements");
    let elements: Vec<Element> = if raw.trim().is_empty() {
        Vec::new()
    } else {
        serde_json::from_str(&raw).map_err(|e| {
            FlowError::Config(format!("node `{}`: unparseable elements `{raw}`: {e}", node.id))
        })?
    };

    let mut outcome = StepOutcome::new(Transition::Await {
        deadline: listener_deadline(node),
    });
    if !elements.is_empty() {
        outcome.emits.push(OutboundMessage::buttons(elements));
    }
    Ok(outcome)
}

fn listener_input(
    node: &Node,
    graph: &FlowGraph,
    input: &ResumeInput,
) -> Result<StepOutcome, FlowError> {
    let keys = node.keys("saving_keys")?;
    let value = Variable::Text(input.text().to_string());
    let mut outcome = StepOutcome::new(advance(graph, node)?);
    outcome.writes = keys.into_iter().map(|k| (k, value.clone())).collect();
    Ok(outcome)
}

/// Labels a decider offers. An empty or unparseable `intents` list means the
/// configured text is a single free-form expected reply.
fn decider_labels(node: &Node) -> Vec<String> {
    let raw = node.raw("intents");
    match serde_json::from_str::<Vec<String>>(raw.trim()) {
        Ok(labels) => labels,
        Err(_) if raw.trim().is_empty() => Vec::new(),
        Err(_) => vec![raw.trim().to_string()],
    }
}

fn exec_decider(node: &Node) -> Result<StepOutcome, FlowError> {
    let labels = decider_labels(node);
    let mut outcome = StepOutcome::new(Transition::Await { deadline: None });
    if !labels.is_empty() {
        outcome.emits.push(OutboundMessage::buttons(
            labels.into_iter().map(Element::button).collect(),
        ));
    }
    Ok(outcome)
}

fn decider_input(
    node: &Node,
    graph: &FlowGraph,
    input: &ResumeInput,
) -> Result<StepOutcome, FlowError> {
    let label = input.text().to_string();
    let next = graph
        .successor_labeled(&node.id, &label)
        .or_else(|| graph.successor_labeled(&node.id, "default"))
        .ok_or_else(|| {
            FlowError::Config(format!(
                "decider `{}` has no edge labeled `{label}` and no default",
                node.id
            ))
        })?
        .to_string();

    let mut outcome = StepOutcome::new(Transition::Goto(next));
    outcome.writes.push(("current_intent".to_string(), Variable::Text(label.clone())));
    outcome.set_decision = Some(label);
    Ok(outcome)
}

fn exec_intent(session: &Session, node: &Node, graph: &FlowGraph) -> Result<StepOutcome, FlowError> {
    let expected = node.raw("intent");
    match session.pending_decision.as_deref() {
        Some(decision) if decision == expected => {
            let mut outcome = StepOutcome::new(advance(graph, node)?);
            outcome.clear_decision = true;
            Ok(outcome)
        }
        Some(decision) => Err(FlowError::Config(format!(
            "intent node `{}` expects `{expected}` but the pending decision is `{decision}`",
            node.id
        ))),
        None => Err(FlowError::Config(format!(
            "intent node `{}` executed without a pending decision",
            node.id
        ))),
    }
}

fn coerce_right_number(raw: &str) -> Result<f64, FlowError> {
    Variable::coerce(raw, ValueKind::Number)?
        .as_number()
        .ok_or_else(|| FlowError::Config(format!("`{raw}` is not a number")))
}

fn left_number(left: &Variable, var: &str) -> Result<f64, FlowError> {
    left.as_number().ok_or_else(|| {
        FlowError::Runtime(format!("variable `{var}` does not hold a number"))
    })
}

/// The six-operator truth table over {text, number, boolean}.
fn eval_condition(
    left: &Variable,
    var: &str,
    op: &str,
    right: &str,
    kind: ValueKind,
) -> Result<bool, FlowError> {
    match kind {
        ValueKind::Boolean => {
            let l = left.as_bool().ok_or_else(|| {
                FlowError::Runtime(format!("variable `{var}` does not hold a boolean"))
            })?;
            let r = Variable::coerce(right, ValueKind::Boolean)?
                .as_bool()
                .ok_or_else(|| FlowError::Config(format!("`{right}` is not a boolean")))?;
            match op {
                "equals" => Ok(l == r),
                "not_equals" => Ok(l != r),
                other => Err(FlowError::Config(format!(
                    "operator `{other}` is not supported for booleans"
                ))),
            }
        }
        ValueKind::Number => match op {
            "equals" | "not_equals" | "greater_than" | "less_than" => {
                let l = left_number(left, var)?;
                let r = coerce_right_number(right)?;
                Ok(match op {
                    "equals" => l == r,
                    "not_equals" => l != r,
                    "greater_than" => l > r,
                    _ => l < r,
                })
            }
            other => Err(FlowError::Config(format!(
                "operator `{other}` is not supported for numbers"
            ))),
        },
        ValueKind::Text => match op {
            "equals" => Ok(left.render() == right),
            "not_equals" => Ok(left.render() != right),
            // numeric comparison regardless of declared type still requires
            // both sides to coerce
            "greater_than" => Ok(left_number(left, var)? > coerce_right_number(right)?),
            "less_than" => Ok(left_number(left, var)? < coerce_right_number(right)?),
            "contains" | "not_contains" => {
                let hit = match left {
                    Variable::List(items) => items.iter().any(|item| item == right),
                    other => other.render().contains(right),
                };
                Ok(if op == "contains" { hit } else { !hit })
            }
            other => Err(FlowError::Config(format!("unknown operator `{other}`"))),
        },
    }
}

/// The editor historically stored the variable name as a one-element JSON
/// list; both encodings are accepted.
fn conditional_variable(node: &Node) -> Result<String, FlowError> {
    node.keys("variable")?
        .into_iter()
        .next()
        .ok_or_else(|| FlowError::Config(format!("node `{}` names no variable", node.id)))
}

fn exec_conditional(
    session: &Session,
    node: &Node,
    graph: &FlowGraph,
) -> Result<StepOutcome, FlowError> {
    let kind = ValueKind::from_id(&node.raw("type")).ok_or_else(|| {
        FlowError::Config(format!("node `{}`: unknown value type `{}`", node.id, node.raw("type")))
    })?;
    let var = conditional_variable(node)?;
    let left = session.vars.get(&var);
    let right = template::resolve(&node.raw("value"), &session.vars);
    let verdict = eval_condition(&left, &var, &node.raw("condition"), &right, kind)?;
    Ok(StepOutcome::new(branch(
        graph,
        node,
        if verdict { "true" } else { "false" },
    )?))
}

fn exec_counter(session: &Session, node: &Node, graph: &FlowGraph) -> Result<StepOutcome, FlowError> {
    let keys = node.keys("saving_keys")?;
    let key = keys.first().ok_or_else(|| {
        FlowError::Config(format!("counter `{}` has no saving key", node.id))
    })?;
    // absent or unparseable counters read as zero
    let current = session.vars.get(key).as_number().unwrap_or(0.0);
    let value = Variable::Number(current + node.number("add")?);

    let mut outcome = StepOutcome::new(advance(graph, node)?);
    outcome.writes = keys.iter().map(|k| (k.clone(), value.clone())).collect();
    Ok(outcome)
}

fn exec_set_value(
    session: &Session,
    node: &Node,
    graph: &FlowGraph,
) -> Result<StepOutcome, FlowError> {
    let kind = ValueKind::from_id(&node.raw("type")).ok_or_else(|| {
        FlowError::Config(format!("node `{}`: unknown value type `{}`", node.id, node.raw("type")))
    })?;
    let resolved = template::resolve(&node.raw("value"), &session.vars);
    let value = Variable::coerce(&resolved, kind)?;

    let mut outcome = StepOutcome::new(advance(graph, node)?);
    outcome.writes = node
        .keys("saving_keys")?
        .into_iter()
        .map(|k| (k, value.clone()))
        .collect();
    Ok(outcome)
}

fn exec_validator(
    session: &Session,
    node: &Node,
    graph: &FlowGraph,
    adapters: &Adapters,
) -> Result<StepOutcome, FlowError> {
    let rule = node.raw("type");
    let var = node.raw("variable");
    let text = session.vars.get(&var).render();
    let label = if adapters.validator.validate(&rule, &text) {
        "valid"
    } else {
        "invalid"
    };

    match graph.successor_labeled(&node.id, label) {
        Some(next) => Ok(StepOutcome::new(Transition::Goto(next.to_string()))),
        // with a single successor the validator is a passthrough
        None if graph.out_degree(&node.id) == 1 => Ok(StepOutcome::new(advance(graph, node)?)),
        None => Err(FlowError::Config(format!(
            "validator `{}` has no successor labeled `{label}`",
            node.id
        ))),
    }
}

async fn call_generate(
    session: &mut Session,
    adapters: &Adapters,
    service_timeout: Duration,
    request: GenerateRequest,
) -> Result<String, AdapterError> {
    session.status = SessionStatus::AwaitingService;
    let result = tokio::time::timeout(service_timeout, adapters.generate.generate(request)).await;
    session.status = SessionStatus::Running;
    result.unwrap_or(Err(AdapterError::Timeout))
}

async fn call_retrieve(
    session: &mut Session,
    adapters: &Adapters,
    service_timeout: Duration,
    request: RetrieveRequest,
) -> Result<crate::adapter::RetrieveReply, AdapterError> {
    session.status = SessionStatus::AwaitingService;
    let result = tokio::time::timeout(service_timeout, adapters.retrieve.retrieve(request)).await;
    session.status = SessionStatus::Running;
    result.unwrap_or(Err(AdapterError::Timeout))
}

/// Routing shared by the two service-calling nodes: a `fail`-labeled edge is
/// the configured fallback, otherwise the failure is fatal.
fn service_failure(
    graph: &FlowGraph,
    node: &Node,
    err: AdapterError,
) -> Result<StepOutcome, FlowError> {
    warn!(node = %node.id, error = %err, "service adapter gave up");
    match graph.successor_labeled(&node.id, "fail") {
        Some(next) => Ok(StepOutcome::new(Transition::Goto(next.to_string()))),
        None => Err(FlowError::Service(format!(
            "adapter failed at node `{}`: {err}",
            node.id
        ))),
    }
}

fn service_success(graph: &FlowGraph, node: &Node) -> Result<Transition, FlowError> {
    match graph.successor_labeled(&node.id, "success") {
        Some(next) => Ok(Transition::Goto(next.to_string())),
        None => advance(graph, node),
    }
}

#[instrument(skip(session, graph, adapters), fields(node_id = %node.id))]
async fn exec_ai(
    session: &mut Session,
    node: &Node,
    graph: &FlowGraph,
    adapters: &Adapters,
    service_timeout: Duration,
) -> Result<StepOutcome, FlowError> {
    let request = GenerateRequest {
        instruction: template::resolve(&node.raw("instruction"), &session.vars),
        system_message: template::resolve(&node.raw("system_message"), &session.vars),
        temperature: node.number("temperature")?,
        max_tokens: node.number("max_tokens")? as u32,
        model: template::resolve(&node.raw("model"), &session.vars),
    };

    match call_generate(session, adapters, service_timeout, request).await {
        Ok(answer) => {
            let mut outcome = StepOutcome::new(service_success(graph, node)?);
            outcome.writes = node
                .keys("saving_keys")?
                .into_iter()
                .map(|k| (k, Variable::Text(answer.clone())))
                .collect();
            if node.raw("show") == "yes" {
                outcome.emits.push(OutboundMessage::text(answer));
            }
            Ok(outcome)
        }
        Err(err) => service_failure(graph, node, err),
    }
}

#[instrument(skip(session, graph, adapters), fields(node_id = %node.id))]
async fn exec_qa(
    session: &mut Session,
    node: &Node,
    graph: &FlowGraph,
    adapters: &Adapters,
    service_timeout: Duration,
) -> Result<StepOutcome, FlowError> {
    let request = RetrieveRequest {
        collection: node.raw("collection"),
        question: template::resolve(&node.raw("question"), &session.vars),
        num_docs: node.number("num_docs")? as u32,
        temperature: node.number("temperature")?,
        max_tokens: node.number("max_tokens")? as u32,
        model: template::resolve(&node.raw("model"), &session.vars),
    };

    match call_retrieve(session, adapters, service_timeout, request).await {
        Ok(reply) => {
            // an unconfident answer emits the configured fallback text
            // instead of failing
            let answer = if reply.confident {
                reply.answer
            } else {
                template::resolve(&node.raw("fallback"), &session.vars)
            };
            let mut outcome = StepOutcome::new(service_success(graph, node)?);
            outcome.writes = node
                .keys("saving_keys")?
                .into_iter()
                .map(|k| (k, Variable::Text(answer.clone())))
                .collect();
            outcome.emits.push(OutboundMessage::text(answer));
            Ok(outcome)
        }
        Err(err) => service_failure(graph, node, err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(kind: NodeKind, fields: &[(&str, serde_json::Value)]) -> Node {
        Node {
            id: "n1".to_string(),
            kind,
            config: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
            pos_x: 0.0,
            pos_y: 0.0,
        }
    }

    #[test]
    fn test_pick_variant_plain_text() {
        assert_eq!(pick_variant("hello"), "hello");
    }

    #[test]
    fn test_pick_variant_list() {
        let picked = pick_variant(r#"["a","b"]"#);
        assert!(picked == "a" || picked == "b");
    }

    #[test]
    fn test_decider_labels_json_list() {
        let n = node(NodeKind::Decider, &[("intents", json!(r#"["yes","no"]"#))]);
        assert_eq!(decider_labels(&n), vec!["yes".to_string(), "no".to_string()]);
    }

    #[test]
    fn test_decider_labels_free_form_fallback() {
        let n = node(NodeKind::Decider, &[("intents", json!("just say hi"))]);
        assert_eq!(decider_labels(&n), vec!["just say hi".to_string()]);

        let empty = node(NodeKind::Decider, &[("intents", json!("[]"))]);
        assert!(decider_labels(&empty).is_empty());
    }

    #[test]
    fn test_eval_condition_text() {
        let left = Variable::Text("hello world".into());
        assert!(eval_condition(&left, "v", "equals", "hello world", ValueKind::Text).unwrap());
        assert!(eval_condition(&left, "v", "not_equals", "bye", ValueKind::Text).unwrap());
        assert!(eval_condition(&left, "v", "contains", "world", ValueKind::Text).unwrap());
        assert!(eval_condition(&left, "v", "not_contains", "mars", ValueKind::Text).unwrap());
    }

    #[test]
    fn test_eval_condition_list_membership() {
        let left = Variable::List(vec!["red".into(), "green".into()]);
        assert!(eval_condition(&left, "v", "contains", "red", ValueKind::Text).unwrap());
        assert!(!eval_condition(&left, "v", "contains", "blue", ValueKind::Text).unwrap());
        assert!(eval_condition(&left, "v", "not_contains", "blue", ValueKind::Text).unwrap());
    }

    #[test]
    fn test_eval_condition_number() {
        let left = Variable::Number(5.0);
        assert!(eval_condition(&left, "v", "greater_than", "3", ValueKind::Number).unwrap());
        assert!(eval_condition(&left, "v", "less_than", "7.5", ValueKind::Number).unwrap());
        assert!(eval_condition(&left, "v", "equals", "5", ValueKind::Number).unwrap());
        assert!(eval_condition(&left, "v", "not_equals", "4", ValueKind::Number).unwrap());
    }

    #[test]
    fn test_eval_condition_number_rejects_bad_sides() {
        let text = Variable::Text("not a number".into());
        assert!(matches!(
            eval_condition(&text, "v", "greater_than", "3", ValueKind::Number),
            Err(FlowError::Runtime(_))
        ));
        let five = Variable::Number(5.0);
        assert!(matches!(
            eval_condition(&five, "v", "less_than", "abc", ValueKind::Number),
            Err(FlowError::Config(_))
        ));
        assert!(matches!(
            eval_condition(&five, "v", "contains", "5", ValueKind::Number),
            Err(FlowError::Config(_))
        ));
    }

    #[test]
    fn test_eval_condition_boolean() {
        let left = Variable::Boolean(true);
        assert!(eval_condition(&left, "v", "equals", "true", ValueKind::Boolean).unwrap());
        assert!(eval_condition(&left, "v", "not_equals", "false", ValueKind::Boolean).unwrap());
        assert!(matches!(
            eval_condition(&left, "v", "greater_than", "true", ValueKind::Boolean),
            Err(FlowError::Config(_))
        ));
        // text coerces on the left too
        let texty = Variable::Text("TRUE".into());
        assert!(eval_condition(&texty, "v", "equals", "true", ValueKind::Boolean).unwrap());
    }

    #[test]
    fn test_eval_condition_text_numeric_comparison_coerces() {
        let left = Variable::Text("10".into());
        assert!(eval_condition(&left, "v", "greater_than", "9", ValueKind::Text).unwrap());
        let bad = Variable::Text("ten".into());
        assert!(eval_condition(&bad, "v", "greater_than", "9", ValueKind::Text).is_err());
    }

    #[test]
    fn test_listener_deadline_parsing() {
        let with = node(NodeKind::Listener, &[("timeout", json!("120"))]);
        assert!(listener_deadline(&with).is_some());

        // free text that is not a number means no deadline
        let without = node(NodeKind::Listener, &[("timeout", json!("Session timeout"))]);
        assert!(listener_deadline(&without).is_none());

        let zero = node(NodeKind::Listener, &[("timeout", json!("0"))]);
        assert!(listener_deadline(&zero).is_none());
    }

    #[test]
    fn test_conditional_variable_accepts_both_encodings() {
        let listy = node(NodeKind::Conditional, &[("variable", json!(r#"["age"]"#))]);
        assert_eq!(conditional_variable(&listy).unwrap(), "age");

        let bare = node(NodeKind::Conditional, &[("variable", json!("age"))]);
        assert_eq!(conditional_variable(&bare).unwrap(), "age");
    }
}
