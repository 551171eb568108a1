//! Workflow graph and its message-driven scheduler
//!
//! A [`Workflow`] is a static set of [`Node`]s joined by routes. Each node
//! receives exactly one [`Message`], may read and write the run's
//! [`SharedState`], and emits zero or more messages through its
//! [`NodeContext`]. Every emitted message follows the sender's single
//! outgoing route: a plain edge, or a [`SwitchCase`] whose ordered
//! predicates are tried first-match-wins with a mandatory default.
//!
//! The scheduler processes one message to completion before dequeuing the
//! next, so no two nodes ever run at the same time. A run ends when the
//! queue drains; nodes signal completion through
//! [`NodeContext::yield_output`]. Exceeding the step ceiling aborts the run
//! with [`Error::MaxStepsExceeded`].

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use super::message::{Decision, Message};
use super::state::SharedState;
use crate::{Error, Result};

/// Whether a node is backed by an agent or is a plain function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Agent,
    Function,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Agent => write!(f, "agent"),
            NodeKind::Function => write!(f, "function"),
        }
    }
}

/// A vertex of the workflow graph
#[async_trait]
pub trait Node: Send + Sync {
    /// Unique id within the graph
    fn id(&self) -> &str;

    fn kind(&self) -> NodeKind {
        NodeKind::Function
    }

    /// Process one input message
    async fn handle(&self, input: Message, ctx: &mut NodeContext<'_>) -> Result<()>;
}

/// What a node sees while it runs
pub struct NodeContext<'a> {
    /// Run-scoped shared state
    pub state: &'a mut SharedState,
    outbox: Vec<Message>,
    outputs: Vec<String>,
}

impl<'a> NodeContext<'a> {
    pub fn new(state: &'a mut SharedState) -> Self {
        Self {
            state,
            outbox: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// Send a message along this node's outgoing route
    pub fn send_message(&mut self, message: Message) {
        self.outbox.push(message);
    }

    /// Publish a terminal output of the run
    pub fn yield_output(&mut self, output: impl Into<String>) {
        self.outputs.push(output.into());
    }

    pub(crate) fn into_parts(self) -> (Vec<Message>, Vec<String>) {
        (self.outbox, self.outputs)
    }
}

/// Predicate evaluated against an emitted message
pub type Predicate = Arc<dyn Fn(&Message) -> bool + Send + Sync>;

struct Case {
    label: String,
    predicate: Predicate,
    target: String,
}

/// Ordered conditional fan-out with a mandatory default target
pub struct SwitchCase {
    cases: Vec<Case>,
    default: String,
}

impl SwitchCase {
    /// Start a switch that falls through to `default`
    pub fn new(default: impl Into<String>) -> Self {
        Self {
            cases: Vec::new(),
            default: default.into(),
        }
    }

    /// Add a case; cases are tried in the order added
    pub fn case<F>(
        mut self,
        label: impl Into<String>,
        predicate: F,
        target: impl Into<String>,
    ) -> Self
    where
        F: Fn(&Message) -> bool + Send + Sync + 'static,
    {
        self.cases.push(Case {
            label: label.into(),
            predicate: Arc::new(predicate),
            target: target.into(),
        });
        self
    }

    /// Case matching one decision value
    pub fn when_decision(self, decision: Decision, target: impl Into<String>) -> Self {
        self.case(
            decision.as_str(),
            move |msg: &Message| msg.decision() == Some(decision),
            target,
        )
    }

    /// Pick the target for `message`: first matching case, else the default
    pub fn select(&self, message: &Message) -> (&str, &str) {
        self.cases
            .iter()
            .find(|c| (c.predicate)(message))
            .map(|c| (c.label.as_str(), c.target.as_str()))
            .unwrap_or(("default", self.default.as_str()))
    }

    fn targets(&self) -> impl Iterator<Item = &str> {
        self.cases
            .iter()
            .map(|c| c.target.as_str())
            .chain(std::iter::once(self.default.as_str()))
    }
}

impl fmt::Debug for SwitchCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cases: Vec<_> = self
            .cases
            .iter()
            .map(|c| format!("{} -> {}", c.label, c.target))
            .collect();
        f.debug_struct("SwitchCase")
            .field("cases", &cases)
            .field("default", &self.default)
            .finish()
    }
}

/// A node's outgoing route
#[derive(Debug)]
pub enum Route {
    Edge(String),
    Switch(SwitchCase),
}

impl Route {
    fn targets(&self) -> Vec<&str> {
        match self {
            Route::Edge(target) => vec![target.as_str()],
            Route::Switch(switch) => switch.targets().collect(),
        }
    }
}

/// Builder that validates the graph before it can run
#[derive(Default)]
pub struct WorkflowBuilder {
    nodes: Vec<Arc<dyn Node>>,
    routes: Vec<(String, Route)>,
    start: Option<String>,
    max_steps: Option<usize>,
}

/// Step ceiling used when the builder is not given one
pub const DEFAULT_MAX_STEPS: usize = 100;

impl WorkflowBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(mut self, node: impl Node + 'static) -> Self {
        self.nodes.push(Arc::new(node));
        self
    }

    pub fn set_start(mut self, id: impl Into<String>) -> Self {
        self.start = Some(id.into());
        self
    }

    pub fn add_edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.routes.push((from.into(), Route::Edge(to.into())));
        self
    }

    pub fn add_switch(mut self, from: impl Into<String>, switch: SwitchCase) -> Self {
        self.routes.push((from.into(), Route::Switch(switch)));
        self
    }

    pub fn max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = Some(max_steps);
        self
    }

    /// Validate and freeze the graph
    pub fn build(self) -> Result<Workflow> {
        let mut nodes: HashMap<String, Arc<dyn Node>> = HashMap::new();
        for node in self.nodes {
            let id = node.id().to_string();
            if nodes.insert(id.clone(), node).is_some() {
                return Err(Error::Graph(format!("duplicate node id '{}'", id)));
            }
        }

        let mut routes = HashMap::new();
        for (from, route) in self.routes {
            if !nodes.contains_key(&from) {
                return Err(Error::Graph(format!("route from unknown node '{}'", from)));
            }
            if let Some(target) = route.targets().into_iter().find(|t| !nodes.contains_key(*t)) {
                return Err(Error::Graph(format!(
                    "route from '{}' targets unknown node '{}'",
                    from, target
                )));
            }
            if routes.insert(from.clone(), route).is_some() {
                return Err(Error::Graph(format!(
                    "node '{}' has more than one outgoing route",
                    from
                )));
            }
        }

        let start = self
            .start
            .ok_or_else(|| Error::Graph("no start node set".to_string()))?;
        if !nodes.contains_key(&start) {
            return Err(Error::Graph(format!("start node '{}' does not exist", start)));
        }

        let max_steps = self.max_steps.unwrap_or(DEFAULT_MAX_STEPS);
        if max_steps == 0 {
            return Err(Error::Graph("max_steps must be at least 1".to_string()));
        }

        Ok(Workflow {
            nodes,
            routes,
            start,
            max_steps,
        })
    }
}

/// What a finished run produced
#[derive(Debug, Clone, Default)]
pub struct RunOutcome {
    /// Values passed to `yield_output`, in order
    pub outputs: Vec<String>,
    /// Node executions performed
    pub steps: usize,
    /// Node ids in execution order
    pub trace: Vec<String>,
}

/// An immutable, validated workflow graph
pub struct Workflow {
    nodes: HashMap<String, Arc<dyn Node>>,
    routes: HashMap<String, Route>,
    start: String,
    max_steps: usize,
}

impl Workflow {
    pub fn builder() -> WorkflowBuilder {
        WorkflowBuilder::new()
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    pub fn start(&self) -> &str {
        &self.start
    }

    /// Run the graph from the start node with `input`
    pub async fn run(&self, input: Message, state: &mut SharedState) -> Result<RunOutcome> {
        let mut queue: VecDeque<(String, Message)> = VecDeque::new();
        queue.push_back((self.start.clone(), input));
        let mut outcome = RunOutcome::default();

        while let Some((node_id, message)) = queue.pop_front() {
            if outcome.steps >= self.max_steps {
                error!(max_steps = self.max_steps, pending = %node_id, "Step ceiling reached");
                return Err(Error::MaxStepsExceeded {
                    max_steps: self.max_steps,
                });
            }
            outcome.steps += 1;
            state.count_step();

            let node = self.nodes.get(&node_id).ok_or_else(|| {
                Error::Workflow(format!("message addressed to unknown node '{}'", node_id))
            })?;
            info!(
                step = outcome.steps,
                node = %node_id,
                kind = %node.kind(),
                input = message.kind(),
                "Running node"
            );

            let mut ctx = NodeContext::new(state);
            if let Err(e) = node.handle(message, &mut ctx).await {
                error!(node = %node_id, error = %e, "Node failed");
                return Err(e);
            }
            let (sent, outputs) = ctx.into_parts();
            outcome.trace.push(node_id.clone());
            outcome.outputs.extend(outputs);

            for msg in sent {
                match self.routes.get(&node_id) {
                    Some(Route::Edge(target)) => {
                        debug!(from = %node_id, to = %target, "Following edge");
                        queue.push_back((target.clone(), msg));
                    }
                    Some(Route::Switch(switch)) => {
                        let (label, target) = switch.select(&msg);
                        info!(from = %node_id, case = label, to = target, "Switch selected");
                        queue.push_back((target.to_string(), msg));
                    }
                    None => {
                        warn!(
                            node = %node_id,
                            message = msg.kind(),
                            "Message has no route; dropped"
                        );
                    }
                }
            }
        }

        Ok(outcome)
    }
}

impl fmt::Debug for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<_> = self.nodes.keys().collect();
        ids.sort();
        f.debug_struct("Workflow")
            .field("nodes", &ids)
            .field("routes", &self.routes)
            .field("start", &self.start)
            .field("max_steps", &self.max_steps)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkflowSettings;
    use crate::workflow::state::RunArgs;

    /// Emits a fixed list of messages and optionally yields an output
    struct Emit {
        id: String,
        messages: Vec<Message>,
        output: Option<String>,
    }

    impl Emit {
        fn new(id: &str, messages: Vec<Message>) -> Self {
            Self {
                id: id.to_string(),
                messages,
                output: None,
            }
        }

        fn terminal(id: &str) -> Self {
            Self {
                id: id.to_string(),
                messages: Vec::new(),
                output: Some(format!("done:{}", id)),
            }
        }
    }

    #[async_trait]
    impl Node for Emit {
        fn id(&self) -> &str {
            &self.id
        }

        async fn handle(&self, _input: Message, ctx: &mut NodeContext<'_>) -> Result<()> {
            for m in &self.messages {
                ctx.send_message(m.clone());
            }
            if let Some(out) = &self.output {
                ctx.yield_output(out.clone());
            }
            Ok(())
        }
    }

    /// Forwards whatever it receives
    struct Forward(&'static str);

    #[async_trait]
    impl Node for Forward {
        fn id(&self) -> &str {
            self.0
        }

        async fn handle(&self, input: Message, ctx: &mut NodeContext<'_>) -> Result<()> {
            ctx.send_message(input);
            Ok(())
        }
    }

    struct Fail;

    #[async_trait]
    impl Node for Fail {
        fn id(&self) -> &str {
            "fail"
        }

        async fn handle(&self, _input: Message, _ctx: &mut NodeContext<'_>) -> Result<()> {
            Err(Error::Workflow("boom".to_string()))
        }
    }

    fn state() -> SharedState {
        SharedState::new(RunArgs::new("/tmp/repo", WorkflowSettings::default()))
    }

    fn decision_graph(decision: Decision) -> Workflow {
        Workflow::builder()
            .add_node(Emit::new("router", vec![Message::Decision(decision)]))
            .add_node(Emit::terminal("correct"))
            .add_node(Emit::terminal("needed"))
            .set_start("router")
            .add_switch(
                "router",
                SwitchCase::new("needed").when_decision(Decision::TESTS_CORRECT, "correct"),
            )
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_switch_takes_matching_case() {
        let graph = decision_graph(Decision::TESTS_CORRECT);
        let outcome = graph.run(Message::Prompt("go".into()), &mut state()).await.unwrap();
        assert_eq!(outcome.trace, vec!["router", "correct"]);
        assert_eq!(outcome.outputs, vec!["done:correct"]);
    }

    #[tokio::test]
    async fn test_switch_falls_back_to_default() {
        let graph = decision_graph(Decision::TESTS_NEEDED);
        let outcome = graph.run(Message::Prompt("go".into()), &mut state()).await.unwrap();
        assert_eq!(outcome.trace, vec!["router", "needed"]);
    }

    #[tokio::test]
    async fn test_switch_takes_exactly_one_edge() {
        // Both cases match; only the first declared is taken
        let graph = Workflow::builder()
            .add_node(Emit::new("router", vec![Message::Decision(Decision::APPROVED)]))
            .add_node(Emit::terminal("first"))
            .add_node(Emit::terminal("second"))
            .add_node(Emit::terminal("fallback"))
            .set_start("router")
            .add_switch(
                "router",
                SwitchCase::new("fallback")
                    .when_decision(Decision::APPROVED, "first")
                    .case("any", |_| true, "second"),
            )
            .build()
            .unwrap();

        let outcome = graph.run(Message::Prompt("go".into()), &mut state()).await.unwrap();
        assert_eq!(outcome.trace, vec!["router", "first"]);
        assert_eq!(outcome.steps, 2);
    }

    #[test]
    fn test_select_is_total() {
        let switch = SwitchCase::new("default_target")
            .when_decision(Decision::APPROVED, "create_pr")
            .when_decision(Decision::REVISE, "prepare");
        let inputs = [
            Message::Decision(Decision::APPROVED),
            Message::Decision(Decision::REVISE),
            Message::Decision(Decision::TESTS_CORRECT),
            Message::Status("text".into()),
        ];
        let targets: Vec<_> = inputs.iter().map(|m| switch.select(m).1).collect();
        assert_eq!(
            targets,
            vec!["create_pr", "prepare", "default_target", "default_target"]
        );
    }

    #[tokio::test]
    async fn test_messages_processed_in_emission_order() {
        let graph = Workflow::builder()
            .add_node(Emit::new(
                "fan",
                vec![
                    Message::Decision(Decision::APPROVED),
                    Message::Decision(Decision::REVISE),
                ],
            ))
            .add_node(Emit::terminal("a"))
            .add_node(Emit::terminal("b"))
            .set_start("fan")
            .add_switch(
                "fan",
                SwitchCase::new("b").when_decision(Decision::APPROVED, "a"),
            )
            .build()
            .unwrap();

        let outcome = graph.run(Message::Prompt("go".into()), &mut state()).await.unwrap();
        assert_eq!(outcome.trace, vec!["fan", "a", "b"]);
        assert_eq!(outcome.outputs, vec!["done:a", "done:b"]);
    }

    #[tokio::test]
    async fn test_cycle_hits_step_ceiling() {
        let graph = Workflow::builder()
            .add_node(Forward("ping"))
            .add_node(Forward("pong"))
            .set_start("ping")
            .add_edge("ping", "pong")
            .add_edge("pong", "ping")
            .max_steps(7)
            .build()
            .unwrap();

        let err = graph
            .run(Message::Prompt("loop".into()), &mut state())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MaxStepsExceeded { max_steps: 7 }));
        assert!(err.to_string().contains("exceeded max steps"));
    }

    #[tokio::test]
    async fn test_ceiling_not_hit_when_queue_drains_exactly() {
        let graph = Workflow::builder()
            .add_node(Forward("a"))
            .add_node(Emit::terminal("b"))
            .set_start("a")
            .add_edge("a", "b")
            .max_steps(2)
            .build()
            .unwrap();

        let outcome = graph.run(Message::Prompt("x".into()), &mut state()).await.unwrap();
        assert_eq!(outcome.steps, 2);
    }

    #[tokio::test]
    async fn test_unrouted_message_is_dropped() {
        let graph = Workflow::builder()
            .add_node(Forward("only"))
            .set_start("only")
            .build()
            .unwrap();
        let outcome = graph.run(Message::Prompt("x".into()), &mut state()).await.unwrap();
        assert_eq!(outcome.steps, 1);
        assert!(outcome.outputs.is_empty());
    }

    #[tokio::test]
    async fn test_node_error_propagates() {
        let graph = Workflow::builder()
            .add_node(Fail)
            .set_start("fail")
            .build()
            .unwrap();
        let err = graph
            .run(Message::Prompt("x".into()), &mut state())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Workflow(_)));
    }

    #[test]
    fn test_build_rejects_bad_graphs() {
        let dup = Workflow::builder()
            .add_node(Forward("a"))
            .add_node(Forward("a"))
            .set_start("a")
            .build();
        assert!(matches!(dup, Err(Error::Graph(_))));

        let unknown_target = Workflow::builder()
            .add_node(Forward("a"))
            .set_start("a")
            .add_switch("a", SwitchCase::new("missing"))
            .build();
        assert!(unknown_target.unwrap_err().to_string().contains("missing"));

        let two_routes = Workflow::builder()
            .add_node(Forward("a"))
            .add_node(Forward("b"))
            .set_start("a")
            .add_edge("a", "b")
            .add_edge("a", "b")
            .build();
        assert!(two_routes
            .unwrap_err()
            .to_string()
            .contains("more than one outgoing route"));

        let no_start = Workflow::builder().add_node(Forward("a")).build();
        assert!(matches!(no_start, Err(Error::Graph(_))));
    }
}
