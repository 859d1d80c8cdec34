//! Live, mutable instances of a `ModelTemplate`.

use crate::error::{BlockError, GraphValidationError};
use crate::graph::{NodePort, PortAddress, PortDirection, PortShape, Value};
use crate::template::{EdgeTemplate, ModelTemplate, NodeTemplate};
use crate::trace::PassReport;
use ahash::AHashMap;
use std::collections::BTreeMap;
use std::sync::Arc;

mod builder;
mod propagation;
mod queue;

pub use builder::{BlockBuilder, BlockConfig};
pub use queue::InputQueue;

use propagation::{GraphState, NodeInstance, Seed, Topology, run_pass};

/// The settled value of every declared output field.
pub type OutputInterface = BTreeMap<String, Value>;

/// Where a block is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Unmounted,
    Mounted,
    TornDown,
}

/// A running instance of a template.
///
/// A block is constructed unmounted. [`ModelBlock::mount`] seeds the initial
/// input and runs the first pass; afterwards every [`ModelBlock::set_input`]
/// runs one pass to quiescence. A failed pass leaves the block at its last
/// settled values.
pub struct ModelBlock {
    template: Option<Arc<ModelTemplate>>,
    topology: Topology,
    state: GraphState,
    input: AHashMap<String, Value>,
    queue: InputQueue,
    config: BlockConfig,
    lifecycle: Lifecycle,
}

/// Constructs a block from `template` and mounts it, using the global operator registry.
pub fn start(
    template: impl Into<Arc<ModelTemplate>>,
    input: impl IntoIterator<Item = (String, Value)>,
) -> Result<ModelBlock, BlockError> {
    let mut block = ModelBlock::builder(template).input(input).build()?;
    block.mount()?;
    Ok(block)
}

/// Runs a pass on a copy of `state`, committing it only if the pass settles.
fn settle(
    topology: &Topology,
    state: &mut GraphState,
    seed: Seed<'_>,
    limit: usize,
) -> Result<PassReport, BlockError> {
    let mut working = state.clone();
    let report = run_pass(topology, &mut working, seed, limit)?;
    *state = working;
    log::debug!(
        "pass settled after {} evaluations ({} deferred)",
        report.evaluations,
        report.deferred
    );
    Ok(report)
}

impl ModelBlock {
    pub fn builder<'a>(template: impl Into<Arc<ModelTemplate>>) -> BlockBuilder<'a> {
        BlockBuilder::new(template)
    }

    /// Constructs an unmounted block bound against the global operator registry.
    pub fn new(
        template: impl Into<Arc<ModelTemplate>>,
        input: impl IntoIterator<Item = (String, Value)>,
    ) -> Result<Self, BlockError> {
        Self::builder(template).input(input).build()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn config(&self) -> &BlockConfig {
        &self.config
    }

    /// The template this block was built from, `None` once torn down.
    pub fn template(&self) -> Option<&ModelTemplate> {
        self.template.as_deref()
    }

    /// The per-pass evaluation limit.
    pub fn iteration_limit(&self) -> usize {
        self.config.iteration_limit(self.topology.nodes.len())
    }

    /// A handle for posting writes that are applied after the current pass.
    pub fn input_queue(&self) -> InputQueue {
        self.queue.clone()
    }

    fn ensure_mounted(&self) -> Result<(), BlockError> {
        match self.lifecycle {
            Lifecycle::Mounted => Ok(()),
            Lifecycle::Unmounted => Err(BlockError::NotMounted),
            Lifecycle::TornDown => Err(BlockError::TornDown),
        }
    }

    /// Activates the block: seeds the initial input and propagates to quiescence.
    ///
    /// Writes queued during mount are applied before it returns. If any of
    /// these passes fails the block stays unmounted with its state untouched.
    pub fn mount(&mut self) -> Result<PassReport, BlockError> {
        match self.lifecycle {
            Lifecycle::Unmounted => {}
            Lifecycle::Mounted => return Err(BlockError::AlreadyMounted),
            Lifecycle::TornDown => return Err(BlockError::TornDown),
        }
        let snapshot = self.state.clone();
        let input = std::mem::take(&mut self.input);
        let result = self.run(Seed::Mount(&input));
        self.input = input;

        let report = match result {
            Ok(report) => report,
            Err(e) => {
                self.state = snapshot;
                return Err(e);
            }
        };
        self.lifecycle = Lifecycle::Mounted;
        log::info!(
            "mounted block with {} nodes after {} evaluations",
            self.topology.nodes.len(),
            report.evaluations
        );
        Ok(report)
    }

    /// Writes an external input field and propagates to quiescence.
    pub fn set_input(
        &mut self,
        field: &str,
        value: impl Into<Value>,
    ) -> Result<PassReport, BlockError> {
        self.ensure_mounted()?;
        if !self.topology.input_ports.contains_key(field) {
            return Err(BlockError::UnknownInputField(field.to_string()));
        }
        let value = value.into();
        self.run(Seed::External {
            field,
            value: &value,
        })
    }

    /// Runs a pass that only applies feedback held back by the previous pass.
    pub fn tick(&mut self) -> Result<PassReport, BlockError> {
        self.ensure_mounted()?;
        self.run(Seed::Feedback)
    }

    /// Whether a [`ModelBlock::tick`] would apply held-back feedback.
    pub fn has_pending_feedback(&self) -> bool {
        !self.state.feedback.is_empty()
    }

    /// Settles `seed`, then every queued write.
    ///
    /// Writes queued by a failed pass are dropped with it.
    fn run(&mut self, seed: Seed<'_>) -> Result<PassReport, BlockError> {
        let limit = self.iteration_limit();
        let result = settle(&self.topology, &mut self.state, seed, limit).and_then(|mut report| {
            self.drain_queue(&mut report)?;
            Ok(report)
        });
        if result.is_err() {
            self.queue.clear();
        }
        result
    }

    fn drain_queue(&mut self, report: &mut PassReport) -> Result<(), BlockError> {
        let limit = self.iteration_limit();
        while let Some((field, value)) = self.queue.pop() {
            if !self.topology.input_ports.contains_key(&field) {
                return Err(BlockError::UnknownInputField(field));
            }
            let next = settle(
                &self.topology,
                &mut self.state,
                Seed::External {
                    field: &field,
                    value: &value,
                },
                limit,
            )?;
            report.merge(next);
        }
        Ok(())
    }

    /// The settled value of every declared output field, `Null` when never set.
    pub fn get_output(&self) -> Result<OutputInterface, BlockError> {
        self.ensure_mounted()?;
        Ok(self
            .topology
            .io
            .output_fields
            .iter()
            .map(|field| {
                let value = self
                    .topology
                    .output_ports
                    .get(field)
                    .into_iter()
                    .flatten()
                    .find_map(|address| self.state.values.get(address))
                    .cloned()
                    .unwrap_or_default();
                (field.clone(), value)
            })
            .collect())
    }

    /// The settled value on a single port.
    pub fn port_value(&self, address: &PortAddress) -> Option<&Value> {
        self.state.values.get(address)
    }

    /// The operator-private state of a node, e.g. a State node's current value.
    pub fn node_state(&self, node_id: &str) -> Option<&Value> {
        let index = *self.topology.node_index.get(node_id)?;
        self.state.states.get(index)?.as_ref()
    }

    pub fn node_ports(&self, node_id: &str) -> Option<&PortShape> {
        let index = *self.topology.node_index.get(node_id)?;
        Some(&self.topology.nodes[index].ports)
    }

    /// Grows a variable-arity node by one target port and returns the new port.
    pub fn add_target_port(&mut self, node_id: &str) -> Result<NodePort, BlockError> {
        if self.lifecycle == Lifecycle::TornDown {
            return Err(BlockError::TornDown);
        }
        let index = *self
            .topology
            .node_index
            .get(node_id)
            .ok_or_else(|| BlockError::UnknownNode(node_id.to_string()))?;
        let instance = &self.topology.nodes[index];
        if !(instance.operator.supports_dynamic_arity()
            && instance.template.config.allow_add_target_port)
        {
            return Err(BlockError::DynamicArityUnsupported(node_id.to_string()));
        }

        let mut grown: NodeTemplate = instance.template.clone();
        grown.config.arity = Some(instance.ports.targets.len() + 1);
        let invalid = |message: String| {
            BlockError::Validation(GraphValidationError::InvalidNodeConfig {
                node_id: node_id.to_string(),
                message,
            })
        };
        let ports = instance
            .operator
            .describe_ports(&grown, &self.topology.io)
            .map_err(|e| invalid(e.to_string()))?;
        if ports.targets.len() != instance.ports.targets.len() + 1 {
            return Err(invalid(format!(
                "expected {} target ports after growing, found {}",
                instance.ports.targets.len() + 1,
                ports.targets.len()
            )));
        }
        let added = ports.targets[ports.targets.len() - 1].clone();
        let operator = Arc::clone(&instance.operator);
        if let Some(template) = &self.template {
            self.template = Some(Arc::new(template.with_node(grown.clone())));
        }
        self.topology.nodes[index] = NodeInstance::new(grown, operator, ports);
        log::debug!("added target port '{}' to node '{}'", added.id, node_id);
        Ok(added)
    }

    /// Wires a new edge into the block, e.g. into a port added by
    /// [`ModelBlock::add_target_port`].
    ///
    /// On a mounted block whose source port already holds a value, that value
    /// is delivered through the new edge in a pass of its own. If the pass
    /// fails the edge is not added.
    pub fn connect(&mut self, edge: EdgeTemplate) -> Result<PassReport, BlockError> {
        let template = match (self.lifecycle, &self.template) {
            (Lifecycle::TornDown, _) | (_, None) => return Err(BlockError::TornDown),
            (_, Some(template)) => Arc::clone(template),
        };
        self.check_endpoint(&edge, &edge.from, PortDirection::Source)?;
        self.check_endpoint(&edge, &edge.to, PortDirection::Target)?;

        let writers = template.edges().iter().filter(|e| e.to == edge.to).count() + 1;
        if writers > 1 {
            let multi = self.topology.node_index.get(&edge.to.node).is_some_and(|&index| {
                let instance = &self.topology.nodes[index];
                instance
                    .ports
                    .find(&edge.to.port)
                    .is_some_and(|port| instance.operator.accepts_multiple_writers(port))
            });
            if !multi {
                return Err(GraphValidationError::PortArityMismatch {
                    node_id: edge.to.node.clone(),
                    port_id: edge.to.port.clone(),
                    count: writers,
                }
                .into());
            }
        }

        self.topology
            .dependents
            .entry(edge.from.clone())
            .or_default()
            .push(edge.to.clone());

        let current = self.state.values.get(&edge.from).cloned();
        let mut report = match (self.lifecycle, current) {
            (Lifecycle::Mounted, Some(value)) => {
                let limit = self.iteration_limit();
                let seed = Seed::Connect {
                    target: &edge.to,
                    value: &value,
                };
                match settle(&self.topology, &mut self.state, seed, limit) {
                    Ok(report) => report,
                    Err(e) => {
                        if let Some(targets) = self.topology.dependents.get_mut(&edge.from) {
                            targets.pop();
                        }
                        self.queue.clear();
                        return Err(e);
                    }
                }
            }
            _ => PassReport::default(),
        };

        log::debug!("connected {} -> {}", edge.from, edge.to);
        self.template = Some(Arc::new(template.with_edge(edge)));
        if let Err(e) = self.drain_queue(&mut report) {
            self.queue.clear();
            return Err(e);
        }
        Ok(report)
    }

    fn check_endpoint(
        &self,
        edge: &EdgeTemplate,
        address: &PortAddress,
        expected: PortDirection,
    ) -> Result<(), GraphValidationError> {
        let dangling = |missing: String| GraphValidationError::DanglingEdge {
            from_node: edge.from.node.clone(),
            from_port: edge.from.port.clone(),
            to_node: edge.to.node.clone(),
            to_port: edge.to.port.clone(),
            missing,
        };
        let index = *self
            .topology
            .node_index
            .get(&address.node)
            .ok_or_else(|| dangling(format!("node '{}'", address.node)))?;
        let port = self.topology.nodes[index]
            .ports
            .find(&address.port)
            .ok_or_else(|| dangling(format!("port '{}'", address)))?;
        if port.direction != expected {
            return Err(GraphValidationError::DirectionMismatch {
                node_id: address.node.clone(),
                port_id: address.port.clone(),
                expected,
                actual: port.direction,
            });
        }
        Ok(())
    }

    /// Releases all node state and detaches from the template.
    pub fn teardown(&mut self) -> Result<(), BlockError> {
        if self.lifecycle == Lifecycle::TornDown {
            return Err(BlockError::TornDown);
        }
        self.lifecycle = Lifecycle::TornDown;
        self.state = GraphState::default();
        self.queue.clear();
        self.input.clear();
        self.template = None;
        log::info!("tore down block with {} nodes", self.topology.nodes.len());
        Ok(())
    }
}
