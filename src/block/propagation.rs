//! The propagation engine.
//!
//! A pass starts from a seed (mount, an external write, or held-back
//! feedback), then repeatedly pops the oldest dirty target port and evaluates
//! the node owning it. Source values that change are pushed to every
//! connected target port; target ports whose value changes become dirty.
//! Nodes whose operator defers re-entry (State) evaluate at most once per
//! pass: later writes to them are held for the next pass.
//!
//! Mount settles in three stages. Initial input goes first, then sources
//! that fire unconditionally (ConstState, target-less Custom nodes), and only
//! then the defaults of State nodes that nothing has reached yet.

use crate::error::{BlockError, OperatorError};
use crate::graph::{NodePort, PortAddress, PortShape, Value};
use crate::operator::{EvalContext, Operator, OperatorRole, Trigger};
use crate::template::{IoInterface, NodeTemplate};
use crate::trace::{EffectFailure, EvaluationStep, PassReport, StepTrigger};
use ahash::{AHashMap, AHashSet};
use std::collections::VecDeque;
use std::sync::Arc;

/// A template node bound to its operator, with resolved port addresses.
pub(super) struct NodeInstance {
    pub template: NodeTemplate,
    pub operator: Arc<dyn Operator>,
    pub ports: PortShape,
    pub target_addresses: Vec<PortAddress>,
    pub source_addresses: Vec<PortAddress>,
}

impl NodeInstance {
    pub fn new(template: NodeTemplate, operator: Arc<dyn Operator>, ports: PortShape) -> Self {
        let address = |port: &NodePort| PortAddress::new(&template.id, &port.id);
        let target_addresses = ports.targets.iter().map(address).collect();
        let source_addresses = ports.sources.iter().map(address).collect();
        Self {
            template,
            operator,
            ports,
            target_addresses,
            source_addresses,
        }
    }
}

/// The fixed wiring of a block.
pub(super) struct Topology {
    pub nodes: Vec<NodeInstance>,
    pub node_index: AHashMap<String, usize>,
    /// Source port -> target ports it feeds, in edge order.
    pub dependents: AHashMap<PortAddress, Vec<PortAddress>>,
    /// Input field -> (node index, source port index) of every Input port exposing it.
    pub input_ports: AHashMap<String, Vec<(usize, usize)>>,
    /// Output field -> Output node target ports collecting it.
    pub output_ports: AHashMap<String, Vec<PortAddress>>,
    pub io: IoInterface,
}

/// Everything a pass mutates. Passes run on a copy that is committed only on success.
#[derive(Debug, Clone, Default)]
pub(super) struct GraphState {
    pub values: AHashMap<PortAddress, Value>,
    pub states: Vec<Option<Value>>,
    pub feedback: VecDeque<(PortAddress, Value)>,
}

pub(super) enum Seed<'a> {
    Mount(&'a AHashMap<String, Value>),
    External { field: &'a str, value: &'a Value },
    /// A value arriving on a target port through a newly connected edge.
    Connect { target: &'a PortAddress, value: &'a Value },
    Feedback,
}

/// Runs one pass to quiescence on `state`.
pub(super) fn run_pass(
    topology: &Topology,
    state: &mut GraphState,
    seed: Seed<'_>,
    limit: usize,
) -> Result<PassReport, BlockError> {
    let feedback = std::mem::take(&mut state.feedback);
    let mut pass = Pass {
        topology,
        state,
        frontier: VecDeque::new(),
        fired: AHashSet::new(),
        deferred: VecDeque::new(),
        report: PassReport {
            passes: 1,
            ..Default::default()
        },
        limit,
    };

    for (target, value) in feedback {
        pass.deliver(target, value);
    }

    match seed {
        Seed::Mount(input) => {
            for (index, node) in topology.nodes.iter().enumerate() {
                if node.operator.role() != OperatorRole::Input {
                    continue;
                }
                for (port, source) in node.ports.sources.iter().enumerate() {
                    if let Some(value) = input.get(&source.id) {
                        pass.evaluate(
                            index,
                            Trigger::External { port, value },
                            StepTrigger::External(source.id.clone()),
                        )?;
                    }
                }
            }
            pass.drain()?;

            for (index, node) in topology.nodes.iter().enumerate() {
                if node.operator.fires_on_mount(&node.template) && !node.operator.defers_reentry() {
                    pass.evaluate(index, Trigger::Mount, StepTrigger::Mount)?;
                }
            }
            pass.drain()?;

            // Defaults only apply to State nodes no other value has reached.
            for (index, node) in topology.nodes.iter().enumerate() {
                if node.operator.fires_on_mount(&node.template)
                    && node.operator.defers_reentry()
                    && !pass.fired.contains(&index)
                {
                    pass.evaluate(index, Trigger::Mount, StepTrigger::Mount)?;
                }
            }
        }
        Seed::External { field, value } => {
            for &(index, port) in topology.input_ports.get(field).into_iter().flatten() {
                pass.evaluate(
                    index,
                    Trigger::External { port, value },
                    StepTrigger::External(field.to_string()),
                )?;
            }
        }
        Seed::Connect { target, value } => pass.deliver(target.clone(), value.clone()),
        Seed::Feedback => {}
    }
    pass.drain()?;

    let Pass {
        mut report,
        deferred,
        state,
        ..
    } = pass;
    report.deferred = deferred.len();
    state.feedback = deferred;
    Ok(report)
}

struct Pass<'a> {
    topology: &'a Topology,
    state: &'a mut GraphState,
    frontier: VecDeque<PortAddress>,
    /// Nodes that defer re-entry and have already evaluated this pass.
    fired: AHashSet<usize>,
    deferred: VecDeque<(PortAddress, Value)>,
    report: PassReport,
    limit: usize,
}

impl Pass<'_> {
    /// Evaluates dirty target ports until the frontier is empty.
    fn drain(&mut self) -> Result<(), BlockError> {
        let topology = self.topology;
        while let Some(target) = self.frontier.pop_front() {
            let Some(&index) = topology.node_index.get(&target.node) else {
                continue;
            };
            // A port queued twice before its node fired was already consumed.
            if self.fired.contains(&index) {
                continue;
            }
            let Some(port) = topology.nodes[index].ports.target_index(&target.port) else {
                continue;
            };
            self.evaluate(index, Trigger::Target(port), StepTrigger::Port(target.port))?;
        }
        Ok(())
    }

    fn evaluate(
        &mut self,
        index: usize,
        trigger: Trigger<'_>,
        cause: StepTrigger,
    ) -> Result<(), BlockError> {
        self.report.evaluations += 1;
        if self.report.evaluations > self.limit {
            log::warn!(
                "propagation exceeded {} evaluations, aborting pass",
                self.limit
            );
            return Err(BlockError::PropagationDiverged { limit: self.limit });
        }

        let topology = self.topology;
        let instance = &topology.nodes[index];
        let node_id = &instance.template.id;
        let inputs: Vec<Option<Value>> = instance
            .target_addresses
            .iter()
            .map(|address| self.state.values.get(address).cloned())
            .collect();
        let ctx = EvalContext {
            node: &instance.template,
            target_ports: &instance.ports.targets,
            source_ports: &instance.ports.sources,
            inputs: &inputs,
            state: self.state.states.get(index).and_then(Option::as_ref),
            trigger,
        };
        log::trace!("evaluating '{}' ({}) on {}", node_id, instance.template.operator_type, cause);

        let result = instance.operator.evaluate(&ctx);
        if instance.operator.defers_reentry() {
            self.fired.insert(index);
        }
        let evaluation = match result {
            Ok(evaluation) => evaluation,
            Err(OperatorError::EffectFailed(message)) => {
                log::warn!("effect on node '{}' failed: {}", node_id, message);
                self.report.effect_failures.push(EffectFailure {
                    node_id: node_id.clone(),
                    message,
                });
                self.report.steps.push(EvaluationStep {
                    node_id: node_id.clone(),
                    trigger: cause,
                    emitted: Vec::new(),
                });
                return Ok(());
            }
            Err(source) => {
                log::warn!("operator on node '{}' failed: {}", node_id, source);
                return Err(BlockError::OperatorEvaluation {
                    node_id: node_id.clone(),
                    source,
                });
            }
        };

        if let Some(slot) = self.state.states.get_mut(index) {
            *slot = evaluation.state;
        }

        let mut emitted = Vec::new();
        for (address, value) in instance
            .source_addresses
            .iter()
            .zip(evaluation.outputs)
            .filter_map(|(address, value)| value.map(|v| (address, v)))
        {
            if self.state.values.get(address) == Some(&value) {
                continue;
            }
            self.state.values.insert(address.clone(), value.clone());
            for target in topology.dependents.get(address).into_iter().flatten() {
                self.deliver(target.clone(), value.clone());
            }
            emitted.push((address.port.clone(), value));
        }

        self.report.steps.push(EvaluationStep {
            node_id: node_id.clone(),
            trigger: cause,
            emitted,
        });
        Ok(())
    }

    /// Writes `value` into a target port, marking it dirty if the value changed.
    fn deliver(&mut self, target: PortAddress, value: Value) {
        let Some(&index) = self.topology.node_index.get(&target.node) else {
            return;
        };
        if self.fired.contains(&index) {
            log::trace!("deferring feedback into {} until the next pass", target);
            self.deferred.push_back((target, value));
            return;
        }
        if self.state.values.get(&target) == Some(&value) {
            return;
        }
        self.state.values.insert(target.clone(), value);
        self.frontier.push_back(target);
    }
}
