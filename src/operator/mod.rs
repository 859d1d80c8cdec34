//! Operators: the computation rules bound to graph nodes.
//!
//! An operator declares the ports it grants a node and evaluates the node's
//! target port values into source port values. The ten built-in kinds live in
//! [`OperatorKind`]; hosts may register their own through [`OperatorMap`].

use crate::error::OperatorError;
use crate::graph::{NodePort, PortShape, Value};
use crate::template::{IoInterface, NodeTemplate};
use serde::{Deserialize, Serialize};

mod builtin;
mod function;
mod registry;

pub use builtin::OperatorKind;
pub use function::*;
pub use registry::OperatorMap;

/// How a node is wired to the outside of its graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorRole {
    /// Receives external input writes.
    Input,
    /// Its target ports make up the external output.
    Output,
    Inner,
}

/// The diagram category an operator is rendered as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    StateNode,
    InputNode,
    OutputNode,
    StreamOperatorNode,
}

/// Why a node is being evaluated.
#[derive(Debug, Clone, Copy)]
pub enum Trigger<'a> {
    /// Initial activation of the owning block.
    Mount,
    /// The target port at this index received a new value.
    Target(usize),
    /// An external write to the source port at this index (Input nodes only).
    External { port: usize, value: &'a Value },
}

/// Everything an operator can read during one evaluation.
#[derive(Debug, Clone, Copy)]
pub struct EvalContext<'a> {
    pub node: &'a NodeTemplate,
    pub target_ports: &'a [NodePort],
    pub source_ports: &'a [NodePort],
    /// Last known value of every target port, in port order.
    pub inputs: &'a [Option<Value>],
    pub state: Option<&'a Value>,
    pub trigger: Trigger<'a>,
}

impl<'a> EvalContext<'a> {
    /// The value on a target port, failing when it has never fired.
    pub fn require_input(&self, index: usize) -> Result<&'a Value, OperatorError> {
        self.inputs
            .get(index)
            .and_then(Option::as_ref)
            .ok_or_else(|| {
                let port = self
                    .target_ports
                    .get(index)
                    .map(|p| p.id.clone())
                    .unwrap_or_else(|| format!("#{}", index));
                OperatorError::MissingInput(port)
            })
    }

    pub fn changed_port(&self) -> Option<usize> {
        match self.trigger {
            Trigger::Target(index) => Some(index),
            _ => None,
        }
    }
}

/// The outcome of one evaluation: new source values plus the node's new state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evaluation {
    /// One slot per source port; `None` means the port does not emit.
    pub outputs: Vec<Option<Value>>,
    pub state: Option<Value>,
}

impl Evaluation {
    /// Emits nothing and keeps the prior state.
    pub fn silent(ctx: &EvalContext<'_>) -> Self {
        Self {
            outputs: Vec::new(),
            state: ctx.state.cloned(),
        }
    }

    /// Emits `value` on the source port at `port`, keeping the prior state.
    pub fn emit(ctx: &EvalContext<'_>, port: usize, value: Value) -> Self {
        let mut outputs = vec![None; ctx.source_ports.len().max(port + 1)];
        outputs[port] = Some(value);
        Self {
            outputs,
            state: ctx.state.cloned(),
        }
    }

    pub fn with_state(mut self, state: Option<Value>) -> Self {
        self.state = state;
        self
    }
}

/// Defines the contract every operator implements.
pub trait Operator: Send + Sync {
    /// The registry key of this operator.
    fn operator_type(&self) -> &str;

    /// The ports this operator grants the given node.
    fn describe_ports(
        &self,
        node: &NodeTemplate,
        io: &IoInterface,
    ) -> Result<PortShape, OperatorError>;

    fn evaluate(&self, ctx: &EvalContext<'_>) -> Result<Evaluation, OperatorError>;

    fn role(&self) -> OperatorRole {
        OperatorRole::Inner
    }

    fn node_kind(&self) -> NodeKind {
        NodeKind::StreamOperatorNode
    }

    /// Whether a target port may have more than one incoming edge.
    fn accepts_multiple_writers(&self, _port: &NodePort) -> bool {
        false
    }

    /// Whether nodes may grow target ports after construction.
    fn supports_dynamic_arity(&self) -> bool {
        false
    }

    /// Whether writes arriving after this node fired are held for the next pass.
    fn defers_reentry(&self) -> bool {
        false
    }

    /// Whether the node evaluates once with [`Trigger::Mount`] when its block mounts.
    fn fires_on_mount(&self, _node: &NodeTemplate) -> bool {
        false
    }

    fn initial_state(&self, _node: &NodeTemplate) -> Option<Value> {
        None
    }
}
