use super::propagation::{GraphState, NodeInstance, Topology};
use super::{InputQueue, Lifecycle, ModelBlock};
use crate::error::BlockError;
use crate::graph::{PortAddress, Value};
use crate::operator::{OperatorMap, OperatorRole};
use crate::template::{ModelTemplate, bind_node};
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Tuning knobs for a block's propagation engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockConfig {
    /// Evaluations allowed per pass, per node.
    #[serde(alias = "iterationFactor")]
    pub iteration_factor: usize,
    /// Floor for the per-pass evaluation limit, so tiny graphs still get headroom.
    #[serde(alias = "minIterationLimit")]
    pub min_iteration_limit: usize,
}

impl Default for BlockConfig {
    fn default() -> Self {
        Self {
            iteration_factor: 64,
            min_iteration_limit: 256,
        }
    }
}

impl BlockConfig {
    pub fn iteration_limit(&self, node_count: usize) -> usize {
        node_count
            .saturating_mul(self.iteration_factor)
            .max(self.min_iteration_limit)
    }
}

/// Configures and constructs a [`ModelBlock`].
pub struct BlockBuilder<'a> {
    template: Arc<ModelTemplate>,
    operators: Option<&'a OperatorMap>,
    input: AHashMap<String, Value>,
    config: BlockConfig,
}

impl<'a> BlockBuilder<'a> {
    pub fn new(template: impl Into<Arc<ModelTemplate>>) -> Self {
        Self {
            template: template.into(),
            operators: None,
            input: AHashMap::new(),
            config: BlockConfig::default(),
        }
    }

    /// Binds nodes against `operators` instead of the global registry.
    pub fn operators(mut self, operators: &'a OperatorMap) -> Self {
        self.operators = Some(operators);
        self
    }

    /// Initial external input, applied when the block mounts.
    pub fn input<I, S>(mut self, input: I) -> Self
    where
        I: IntoIterator<Item = (S, Value)>,
        S: Into<String>,
    {
        self.input
            .extend(input.into_iter().map(|(field, value)| (field.into(), value)));
        self
    }

    pub fn with_input(mut self, field: impl Into<String>, value: Value) -> Self {
        self.input.insert(field.into(), value);
        self
    }

    pub fn config(mut self, config: BlockConfig) -> Self {
        self.config = config;
        self
    }

    /// Binds every node to its operator and indexes the wiring. Nothing is evaluated yet.
    pub fn build(self) -> Result<ModelBlock, BlockError> {
        let operators = self.operators.unwrap_or_else(|| OperatorMap::global());
        let template = self.template;

        for node in template.nodes() {
            operators
                .get_operator_from_node(node)
                .map_err(|source| BlockError::TemplateBinding {
                    node_id: node.id.clone(),
                    source,
                })?;
        }
        template.validate(operators)?;

        let mut nodes = Vec::with_capacity(template.nodes().len());
        for node in template.nodes() {
            let bound = bind_node(node, &template, operators)?;
            nodes.push(NodeInstance::new(node.clone(), bound.operator, bound.ports));
        }

        let node_index = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.template.id.clone(), i))
            .collect();

        let mut dependents: AHashMap<PortAddress, Vec<PortAddress>> = AHashMap::new();
        for edge in template.edges() {
            dependents
                .entry(edge.from.clone())
                .or_default()
                .push(edge.to.clone());
        }

        let mut input_ports: AHashMap<String, Vec<(usize, usize)>> = AHashMap::new();
        let mut output_ports: AHashMap<String, Vec<PortAddress>> = AHashMap::new();
        for (index, node) in nodes.iter().enumerate() {
            match node.operator.role() {
                OperatorRole::Input => {
                    for (port, source) in node.ports.sources.iter().enumerate() {
                        input_ports
                            .entry(source.id.clone())
                            .or_default()
                            .push((index, port));
                    }
                }
                OperatorRole::Output => {
                    for (target, address) in node.ports.targets.iter().zip(&node.target_addresses) {
                        output_ports
                            .entry(target.id.clone())
                            .or_default()
                            .push(address.clone());
                    }
                }
                OperatorRole::Inner => {}
            }
        }

        if let Some(field) = self.input.keys().find(|f| !input_ports.contains_key(*f)) {
            return Err(BlockError::UnknownInputField(field.clone()));
        }

        let states = nodes
            .iter()
            .map(|n| n.operator.initial_state(&n.template))
            .collect();

        log::debug!(
            "constructed block with {} nodes and {} edges",
            nodes.len(),
            template.edges().len()
        );

        Ok(ModelBlock {
            topology: Topology {
                nodes,
                node_index,
                dependents,
                input_ports,
                output_ports,
                io: template.io().clone(),
            },
            template: Some(template),
            state: GraphState {
                states,
                ..Default::default()
            },
            input: self.input,
            queue: InputQueue::default(),
            config: self.config,
            lifecycle: Lifecycle::Unmounted,
        })
    }
}
