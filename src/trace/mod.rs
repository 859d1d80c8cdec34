//! Records of what happened during propagation passes.

use crate::graph::Value;
use std::fmt;

mod formatter;

pub use formatter::TraceFormatter;

/// What caused a single operator evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum StepTrigger {
    Mount,
    /// An external write to the named input field.
    External(String),
    /// A new value arrived on the named target port.
    Port(String),
}

impl fmt::Display for StepTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepTrigger::Mount => write!(f, "mount"),
            StepTrigger::External(field) => write!(f, "${}", field),
            StepTrigger::Port(port) => write!(f, "{}", port),
        }
    }
}

/// One operator evaluation and the source values it changed.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationStep {
    pub node_id: String,
    pub trigger: StepTrigger,
    /// `(source port id, value)` for every source port whose value changed.
    pub emitted: Vec<(String, Value)>,
}

/// An Effect whose side effect failed. Propagation continued past it.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectFailure {
    pub node_id: String,
    pub message: String,
}

/// Summary of one or more settled propagation passes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassReport {
    pub passes: usize,
    pub evaluations: usize,
    pub steps: Vec<EvaluationStep>,
    pub effect_failures: Vec<EffectFailure>,
    /// Feedback writes held back for the next pass.
    pub deferred: usize,
}

impl PassReport {
    /// Folds a later pass into this report.
    pub fn merge(&mut self, other: PassReport) {
        self.passes += other.passes;
        self.evaluations += other.evaluations;
        self.steps.extend(other.steps);
        self.effect_failures.extend(other.effect_failures);
        self.deferred = other.deferred;
    }

    /// Every evaluation of the given node, in order.
    pub fn steps_for<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a EvaluationStep> {
        self.steps.iter().filter(move |s| s.node_id == node_id)
    }

    pub fn evaluated(&self, node_id: &str) -> bool {
        self.steps_for(node_id).next().is_some()
    }
}
