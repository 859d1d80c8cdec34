use crate::graph::{PortDirection, Value};
use thiserror::Error;

/// Errors raised by the operator registry.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("An operator is already registered under type '{0}'")]
    DuplicateOperatorType(String),

    #[error("No operator is registered under type '{0}'")]
    UnknownOperatorType(String),

    #[error("The global operator map has already been initialized")]
    GlobalAlreadyInitialized,
}

/// Structural errors found while validating a `ModelTemplate`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphValidationError {
    #[error("Node id '{0}' is used by more than one node")]
    DuplicateNodeId(String),

    #[error("Edge {from_node}.{from_port} -> {to_node}.{to_port} references a missing {missing}")]
    DanglingEdge {
        from_node: String,
        from_port: String,
        to_node: String,
        to_port: String,
        missing: String,
    },

    #[error("Port id '{port_id}' is used by more than one port of node '{node_id}'")]
    DuplicatePortId { node_id: String, port_id: String },

    #[error("Target port '{port_id}' on node '{node_id}' accepts one connection, but has {count}")]
    PortArityMismatch {
        node_id: String,
        port_id: String,
        count: usize,
    },

    #[error("Port '{port_id}' on node '{node_id}' is a {actual} port, but the edge needs a {expected} port")]
    DirectionMismatch {
        node_id: String,
        port_id: String,
        expected: PortDirection,
        actual: PortDirection,
    },

    #[error("Interface field '{field}' has no backing {direction} port on any {operator_type} node")]
    UnknownInterfaceField {
        field: String,
        direction: PortDirection,
        operator_type: String,
    },

    #[error("Node '{node_id}' has an invalid configuration: {message}")]
    InvalidNodeConfig { node_id: String, message: String },

    #[error("Node '{node_id}' could not be bound to an operator: {source}")]
    Binding {
        node_id: String,
        #[source]
        source: RegistryError,
    },
}

/// Errors raised by a single operator evaluation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OperatorError {
    #[error("Target port '{0}' has never received a value")]
    MissingInput(String),

    #[error("Type mismatch during '{operation}': expected {expected}, but found value '{found}'")]
    TypeMismatch {
        operation: String,
        expected: String,
        found: Value,
    },

    #[error("The '{0}' operator requires a function, but none was configured")]
    MissingFunction(String),

    #[error("Invalid operator configuration: {0}")]
    InvalidConfig(String),

    #[error("Side effect failed: {0}")]
    EffectFailed(String),

    #[error("{0}")]
    Failed(String),
}

/// Errors raised by a `ModelBlock` during construction, lifecycle changes and propagation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BlockError {
    #[error("Node '{node_id}' could not be bound to an operator: {source}")]
    TemplateBinding {
        node_id: String,
        #[source]
        source: RegistryError,
    },

    #[error("Template failed validation: {0}")]
    Validation(#[from] GraphValidationError),

    #[error("The block is already mounted")]
    AlreadyMounted,

    #[error("The block is not mounted")]
    NotMounted,

    #[error("The block has been torn down")]
    TornDown,

    #[error("Operator on node '{node_id}' failed: {source}")]
    OperatorEvaluation {
        node_id: String,
        #[source]
        source: OperatorError,
    },

    #[error("Propagation did not settle within {limit} evaluations")]
    PropagationDiverged { limit: usize },

    #[error("Input field '{0}' is not exposed by any Input node")]
    UnknownInputField(String),

    #[error("Node '{0}' does not exist in this block")]
    UnknownNode(String),

    #[error("Node '{0}' does not accept additional target ports")]
    DynamicArityUnsupported(String),
}

/// Errors that can occur when converting an external description into a `ModelTemplate`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TemplateConversionError {
    #[error("Failed to parse template JSON: {0}")]
    JsonParseError(String),

    #[error("Node '{node_id}' references unknown function '{name}'")]
    UnknownFunction { node_id: String, name: String },
}
