use crate::graph::{PortAddress, PortSpec, PortType, Value, ValueType};
use crate::operator::{CustomFn, EffectFn, NodeFunction, OperatorKind, TransformFn};
use serde::{Deserialize, Serialize};

/// Static configuration attached to a template node.
///
/// Which fields matter depends on the bound operator; unused fields are ignored.
#[derive(Debug, Clone, Default)]
pub struct NodeConfig {
    /// Initial value of a State node, or the fixed value of a ConstState node.
    pub value: Option<Value>,
    /// Declared type of the value a State node holds.
    pub value_type: Option<ValueType>,
    /// Number of target ports for variable-arity operators.
    pub arity: Option<usize>,
    /// Output keys of a Combine node, one per target port.
    pub keys: Vec<String>,
    /// Interface fields exposed by an Input or Output node.
    /// Empty means "every field of the template interface".
    pub fields: Vec<String>,
    /// Port kind used for the ports of Input and Output nodes.
    pub port_type: Option<PortType>,
    pub allow_add_target_port: bool,
    /// Whether an Effect node forwards its value on a source port.
    pub forward: bool,
    pub target_ports: Vec<PortSpec>,
    pub source_ports: Vec<PortSpec>,
    pub function: Option<NodeFunction>,
}

/// A single node of a template: an id bound to an operator type.
#[derive(Debug, Clone)]
pub struct NodeTemplate {
    pub id: String,
    pub operator_type: String,
    pub label: Option<String>,
    pub config: NodeConfig,
}

impl NodeTemplate {
    pub fn new(id: impl Into<String>, operator_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            operator_type: operator_type.into(),
            label: None,
            config: NodeConfig::default(),
        }
    }

    fn of_kind(id: impl Into<String>, kind: OperatorKind) -> Self {
        Self::new(id, kind.operator_type())
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_config(mut self, config: NodeConfig) -> Self {
        self.config = config;
        self
    }

    /// Lets a variable-arity node grow new target ports after construction.
    pub fn allow_add_target_port(mut self) -> Self {
        self.config.allow_add_target_port = true;
        self
    }

    pub fn with_value_type(mut self, value_type: ValueType) -> Self {
        self.config.value_type = Some(value_type);
        self
    }

    pub fn with_port_type(mut self, port_type: PortType) -> Self {
        self.config.port_type = Some(port_type);
        self
    }

    pub fn input<S: Into<String>>(id: impl Into<String>, fields: impl IntoIterator<Item = S>) -> Self {
        let mut node = Self::of_kind(id, OperatorKind::Input);
        node.config.fields = fields.into_iter().map(Into::into).collect();
        node
    }

    pub fn output<S: Into<String>>(id: impl Into<String>, fields: impl IntoIterator<Item = S>) -> Self {
        let mut node = Self::of_kind(id, OperatorKind::Output);
        node.config.fields = fields.into_iter().map(Into::into).collect();
        node
    }

    pub fn state(id: impl Into<String>, initial: Option<Value>) -> Self {
        let mut node = Self::of_kind(id, OperatorKind::State);
        node.config.value = initial;
        node
    }

    pub fn const_state(id: impl Into<String>, value: Value) -> Self {
        let mut node = Self::of_kind(id, OperatorKind::ConstState);
        node.config.value = Some(value);
        node
    }

    pub fn sum(id: impl Into<String>, arity: usize) -> Self {
        let mut node = Self::of_kind(id, OperatorKind::Sum);
        node.config.arity = Some(arity);
        node
    }

    pub fn combine<S: Into<String>>(id: impl Into<String>, keys: impl IntoIterator<Item = S>) -> Self {
        let mut node = Self::of_kind(id, OperatorKind::Combine);
        node.config.keys = keys.into_iter().map(Into::into).collect();
        node
    }

    pub fn merge(id: impl Into<String>, arity: usize) -> Self {
        let mut node = Self::of_kind(id, OperatorKind::Merge);
        node.config.arity = Some(arity);
        node
    }

    pub fn transform<F>(id: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        let mut node = Self::of_kind(id, OperatorKind::Transform);
        node.config.function = Some(NodeFunction::Transform(TransformFn::new(f)));
        node
    }

    pub fn effect<F>(id: impl Into<String>, forward: bool, f: F) -> Self
    where
        F: Fn(&Value) -> Result<(), String> + Send + Sync + 'static,
    {
        let mut node = Self::of_kind(id, OperatorKind::Effect);
        node.config.forward = forward;
        node.config.function = Some(NodeFunction::Effect(EffectFn::new(f)));
        node
    }

    /// A node whose ports and behavior are entirely template-defined.
    ///
    /// Ports without an explicit id get one generated here, so that every later
    /// port description of this node agrees on the same ids.
    pub fn custom(
        id: impl Into<String>,
        target_ports: Vec<PortSpec>,
        source_ports: Vec<PortSpec>,
        function: CustomFn,
    ) -> Self {
        let mut node = Self::of_kind(id, OperatorKind::Custom);
        node.config.target_ports = with_generated_ids(target_ports);
        node.config.source_ports = with_generated_ids(source_ports);
        node.config.function = Some(NodeFunction::Custom(function));
        node
    }
}

pub(crate) fn with_generated_ids(specs: Vec<PortSpec>) -> Vec<PortSpec> {
    specs
        .into_iter()
        .map(|mut spec| {
            spec.id.get_or_insert_with(|| uuid::Uuid::new_v4().to_string());
            spec.children = with_generated_ids(spec.children);
            spec
        })
        .collect()
}

/// A directed connection from a source port to a target port.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdgeTemplate {
    pub from: PortAddress,
    pub to: PortAddress,
}

impl EdgeTemplate {
    pub fn new(
        from_node: impl Into<String>,
        from_port: impl Into<String>,
        to_node: impl Into<String>,
        to_port: impl Into<String>,
    ) -> Self {
        Self {
            from: PortAddress::new(from_node, from_port),
            to: PortAddress::new(to_node, to_port),
        }
    }
}

/// The named fields a graph exposes to the outside world.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IoInterface {
    #[serde(default, alias = "inputFields")]
    pub input_fields: Vec<String>,
    #[serde(default, alias = "outputFields")]
    pub output_fields: Vec<String>,
}

impl IoInterface {
    pub fn new<I, O, S, T>(input_fields: I, output_fields: O) -> Self
    where
        I: IntoIterator<Item = S>,
        O: IntoIterator<Item = T>,
        S: Into<String>,
        T: Into<String>,
    {
        Self {
            input_fields: input_fields.into_iter().map(Into::into).collect(),
            output_fields: output_fields.into_iter().map(Into::into).collect(),
        }
    }
}

/// An immutable, declarative description of a graph.
///
/// Edits never mutate a template; they produce a new one.
#[derive(Debug, Clone, Default)]
pub struct ModelTemplate {
    nodes: Vec<NodeTemplate>,
    edges: Vec<EdgeTemplate>,
    io: IoInterface,
}

impl ModelTemplate {
    pub fn new(nodes: Vec<NodeTemplate>, edges: Vec<EdgeTemplate>, io: IoInterface) -> Self {
        Self { nodes, edges, io }
    }

    pub fn nodes(&self) -> &[NodeTemplate] {
        &self.nodes
    }

    pub fn edges(&self) -> &[EdgeTemplate] {
        &self.edges
    }

    pub fn io(&self) -> &IoInterface {
        &self.io
    }

    pub fn node(&self, id: &str) -> Option<&NodeTemplate> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Returns a copy of this template with one more edge.
    pub fn with_edge(&self, edge: EdgeTemplate) -> Self {
        let mut next = self.clone();
        next.edges.push(edge);
        next
    }

    /// Returns a copy of this template with the given node replaced.
    pub fn with_node(&self, node: NodeTemplate) -> Self {
        let mut next = self.clone();
        match next.nodes.iter_mut().find(|n| n.id == node.id) {
            Some(existing) => *existing = node,
            None => next.nodes.push(node),
        }
        next
    }
}
