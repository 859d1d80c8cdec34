use super::{ModelTemplate, NodeTemplate};
use crate::error::GraphValidationError;
use crate::graph::{PortAddress, PortDirection, PortShape};
use crate::operator::{Operator, OperatorMap, OperatorRole};
use ahash::AHashMap;
use itertools::Itertools;
use std::sync::Arc;

/// A template node resolved against a registry: its operator and its ports.
pub(crate) struct BoundNode<'a> {
    pub node: &'a NodeTemplate,
    pub operator: Arc<dyn Operator>,
    pub ports: PortShape,
}

pub(crate) fn bind_node<'a>(
    node: &'a NodeTemplate,
    template: &ModelTemplate,
    operators: &OperatorMap,
) -> Result<BoundNode<'a>, GraphValidationError> {
    let operator =
        operators
            .get_operator_from_node(node)
            .map_err(|source| GraphValidationError::Binding {
                node_id: node.id.clone(),
                source,
            })?;
    let ports = operator
        .describe_ports(node, template.io())
        .map_err(|e| GraphValidationError::InvalidNodeConfig {
            node_id: node.id.clone(),
            message: e.to_string(),
        })?;
    Ok(BoundNode {
        node,
        operator,
        ports,
    })
}

impl ModelTemplate {
    /// Checks the template's structure against the operators it is bound to.
    pub fn validate(&self, operators: &OperatorMap) -> Result<(), GraphValidationError> {
        if let Some(duplicate) = self.nodes().iter().map(|n| n.id.as_str()).duplicates().next() {
            return Err(GraphValidationError::DuplicateNodeId(duplicate.to_string()));
        }

        let bound: AHashMap<&str, BoundNode<'_>> = self
            .nodes()
            .iter()
            .map(|node| bind_node(node, self, operators).map(|b| (node.id.as_str(), b)))
            .collect::<Result<_, _>>()?;

        for node in self.nodes() {
            let Some(b) = bound.get(node.id.as_str()) else {
                continue;
            };
            let ids = b.ports.targets.iter().chain(&b.ports.sources).map(|p| p.id.as_str());
            if let Some(duplicate) = ids.duplicates().next() {
                return Err(GraphValidationError::DuplicatePortId {
                    node_id: node.id.clone(),
                    port_id: duplicate.to_string(),
                });
            }
        }

        let mut incoming: AHashMap<&PortAddress, usize> = AHashMap::new();
        for edge in self.edges() {
            let dangling = |missing: String| GraphValidationError::DanglingEdge {
                from_node: edge.from.node.clone(),
                from_port: edge.from.port.clone(),
                to_node: edge.to.node.clone(),
                to_port: edge.to.port.clone(),
                missing,
            };
            for (address, expected) in [
                (&edge.from, PortDirection::Source),
                (&edge.to, PortDirection::Target),
            ] {
                let node = bound
                    .get(address.node.as_str())
                    .ok_or_else(|| dangling(format!("node '{}'", address.node)))?;
                let port = node
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
            }
            *incoming.entry(&edge.to).or_default() += 1;
        }

        for (address, count) in incoming.into_iter().sorted() {
            if count < 2 {
                continue;
            }
            let Some(node) = bound.get(address.node.as_str()) else {
                continue;
            };
            let multi = node
                .ports
                .find(&address.port)
                .is_some_and(|port| node.operator.accepts_multiple_writers(port));
            if !multi {
                return Err(GraphValidationError::PortArityMismatch {
                    node_id: address.node.clone(),
                    port_id: address.port.clone(),
                    count,
                });
            }
        }

        self.validate_interface(&bound)
    }

    fn validate_interface(
        &self,
        bound: &AHashMap<&str, BoundNode<'_>>,
    ) -> Result<(), GraphValidationError> {
        let exposes = |role: OperatorRole, direction: PortDirection, field: &str| {
            bound.values().any(|b| {
                b.operator.role() == role
                    && b.ports
                        .find(field)
                        .is_some_and(|port| port.direction == direction)
            })
        };
        for field in &self.io().input_fields {
            if !exposes(OperatorRole::Input, PortDirection::Source, field) {
                return Err(GraphValidationError::UnknownInterfaceField {
                    field: field.clone(),
                    direction: PortDirection::Source,
                    operator_type: "Input".to_string(),
                });
            }
        }
        for field in &self.io().output_fields {
            if !exposes(OperatorRole::Output, PortDirection::Target, field) {
                return Err(GraphValidationError::UnknownInterfaceField {
                    field: field.clone(),
                    direction: PortDirection::Target,
                    operator_type: "Output".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Returns a copy of this template in which `node_id` has one more target port.
    ///
    /// Only nodes whose operator supports dynamic arity and whose configuration
    /// sets `allow_add_target_port` can grow.
    pub fn with_added_target_port(
        &self,
        node_id: &str,
        operators: &OperatorMap,
    ) -> Result<ModelTemplate, GraphValidationError> {
        let node = self
            .node(node_id)
            .ok_or_else(|| GraphValidationError::InvalidNodeConfig {
                node_id: node_id.to_string(),
                message: "node does not exist".to_string(),
            })?;
        let bound = bind_node(node, self, operators)?;
        if !(bound.operator.supports_dynamic_arity() && node.config.allow_add_target_port) {
            return Err(GraphValidationError::InvalidNodeConfig {
                node_id: node_id.to_string(),
                message: "node does not accept additional target ports".to_string(),
            });
        }

        let mut grown = node.clone();
        grown.config.arity = Some(bound.ports.targets.len() + 1);
        let next = self.with_node(grown);
        next.validate(operators)?;
        Ok(next)
    }

    /// The ports of every node, as the bound operators describe them.
    pub fn port_shapes(
        &self,
        operators: &OperatorMap,
    ) -> Result<Vec<(String, PortShape)>, GraphValidationError> {
        self.nodes()
            .iter()
            .map(|node| bind_node(node, self, operators).map(|b| (node.id.clone(), b.ports)))
            .collect()
    }
}
