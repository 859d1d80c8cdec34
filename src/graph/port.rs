use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Which way values flow through a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortDirection {
    /// Emits values out of a node.
    Source,
    /// Receives values into a node.
    Target,
}

impl fmt::Display for PortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortDirection::Source => write!(f, "source"),
            PortDirection::Target => write!(f, "target"),
        }
    }
}

/// The semantic kind of a port, as shown by the diagram editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PortType {
    State,
    Event,
    LifeCycle,
    UpdateHandler,
    Value,
    #[default]
    #[serde(rename = "unknown port type")]
    Unknown,
}

/// Partial description of a port. Missing fields are filled in by [`NodePort::create`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortSpec {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, rename = "type")]
    pub port_type: Option<PortType>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub connectable: Option<bool>,
    #[serde(default)]
    pub children: Vec<PortSpec>,
}

impl PortSpec {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Default::default()
        }
    }

    pub fn with_type(mut self, port_type: PortType) -> Self {
        self.port_type = Some(port_type);
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// A typed, directional attachment point on a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePort {
    pub id: String,
    pub direction: PortDirection,
    #[serde(rename = "type")]
    pub port_type: PortType,
    pub label: String,
    pub connectable: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodePort>,
}

impl NodePort {
    /// Builds a port from a partial spec, generating an id when none is given.
    pub fn create(spec: PortSpec, direction: PortDirection) -> Self {
        let id = spec.id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let label = spec.label.unwrap_or_else(|| id.clone());
        Self {
            id,
            direction,
            port_type: spec.port_type.unwrap_or_default(),
            label,
            connectable: spec.connectable.unwrap_or(true),
            children: spec
                .children
                .into_iter()
                .map(|child| NodePort::create(child, direction))
                .collect(),
        }
    }

    pub fn source(id: impl Into<String>, port_type: PortType) -> Self {
        Self::create(PortSpec::new(id).with_type(port_type), PortDirection::Source)
    }

    pub fn target(id: impl Into<String>, port_type: PortType) -> Self {
        Self::create(PortSpec::new(id).with_type(port_type), PortDirection::Target)
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

/// The full set of ports an operator grants a node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PortShape {
    pub targets: Vec<NodePort>,
    pub sources: Vec<NodePort>,
}

impl PortShape {
    pub fn target_index(&self, port_id: &str) -> Option<usize> {
        self.targets.iter().position(|p| p.id == port_id)
    }

    pub fn source_index(&self, port_id: &str) -> Option<usize> {
        self.sources.iter().position(|p| p.id == port_id)
    }

    pub fn find(&self, port_id: &str) -> Option<&NodePort> {
        self.targets
            .iter()
            .chain(self.sources.iter())
            .find(|p| p.id == port_id)
    }
}

/// Addresses a single port inside a graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PortAddress {
    pub node: String,
    pub port: String,
}

impl PortAddress {
    pub fn new(node: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            port: port.into(),
        }
    }
}

impl fmt::Display for PortAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.node, self.port)
    }
}
