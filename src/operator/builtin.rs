use super::{EvalContext, Evaluation, NodeFunction, NodeKind, Operator, OperatorRole, Trigger};
use crate::error::OperatorError;
use crate::graph::{NodePort, PortDirection, PortShape, PortType, Value};
use crate::operator::CustomInput;
use crate::template::{IoInterface, NodeTemplate};
use std::collections::BTreeMap;

const UPDATE_HANDLER: &str = "UpdateHandler";
const STATE: &str = "State";
const DEFAULT_STREAM_ARITY: usize = 2;

/// Defines the closed set of built-in operator kinds together with their registry names.
macro_rules! define_operator_kinds {
    ( $( ($variant:ident, $type_name:expr) ),* $(,)? ) => {
        /// The built-in operator kinds.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum OperatorKind {
            $( $variant, )*
        }

        impl OperatorKind {
            /// Every built-in kind, in registration order.
            pub const ALL: &'static [OperatorKind] = &[ $( OperatorKind::$variant, )* ];

            pub fn operator_type(&self) -> &'static str {
                match self {
                    $( OperatorKind::$variant => $type_name, )*
                }
            }

            pub fn from_operator_type(name: &str) -> Option<Self> {
                match name {
                    $( $type_name => Some(OperatorKind::$variant), )*
                    _ => None,
                }
            }
        }
    };
}

define_operator_kinds! {
    (Input, "Input"),
    (Output, "Output"),
    (Custom, "Custom"),
    (State, "State"),
    (ConstState, "ConstState"),
    (Sum, "Sum"),
    (Combine, "Combine"),
    (Transform, "Transform"),
    (Effect, "Effect"),
    (Merge, "Merge"),
}

fn stream_targets(count: usize, labels: &[String]) -> Vec<NodePort> {
    (0..count)
        .map(|i| {
            let port = NodePort::target(format!("input-{}", i), PortType::Value);
            match labels.get(i) {
                Some(label) => port.with_label(label.clone()),
                None => port,
            }
        })
        .collect()
}

fn single_source() -> Vec<NodePort> {
    vec![NodePort::source("output-0", PortType::Value)]
}

fn stream_arity(node: &NodeTemplate, minimum: usize) -> Result<usize, OperatorError> {
    let arity = node
        .config
        .arity
        .unwrap_or(DEFAULT_STREAM_ARITY)
        .max(node.config.keys.len());
    if arity < minimum {
        return Err(OperatorError::InvalidConfig(format!(
            "requires at least {} target ports, but was configured with {}",
            minimum, arity
        )));
    }
    Ok(arity)
}

fn interface_fields<'a>(configured: &'a [String], declared: &'a [String]) -> &'a [String] {
    if configured.is_empty() {
        declared
    } else {
        configured
    }
}

fn check_value_type(node: &NodeTemplate, value: &Value) -> Result<(), OperatorError> {
    match node.config.value_type {
        Some(expected) if !expected.accepts(value) => Err(OperatorError::TypeMismatch {
            operation: node.operator_type.clone(),
            expected: expected.to_string(),
            found: value.clone(),
        }),
        _ => Ok(()),
    }
}

impl OperatorKind {
    fn sum(ctx: &EvalContext<'_>) -> Result<Evaluation, OperatorError> {
        let mut total = 0.0;
        for value in ctx.inputs.iter().flatten() {
            match value {
                Value::Number(n) => total += n,
                Value::Null => {}
                other => {
                    return Err(OperatorError::TypeMismatch {
                        operation: "+".to_string(),
                        expected: "number".to_string(),
                        found: other.clone(),
                    });
                }
            }
        }
        Ok(Evaluation::emit(ctx, 0, Value::Number(total)))
    }

    fn combine(ctx: &EvalContext<'_>) -> Result<Evaluation, OperatorError> {
        let combined: BTreeMap<String, Value> = ctx
            .target_ports
            .iter()
            .zip(ctx.inputs.iter())
            .filter_map(|(port, value)| value.as_ref().map(|v| (port.label.clone(), v.clone())))
            .collect();
        Ok(Evaluation::emit(ctx, 0, Value::Object(combined)))
    }

    fn custom(ctx: &EvalContext<'_>) -> Result<Evaluation, OperatorError> {
        let Some(NodeFunction::Custom(function)) = &ctx.node.config.function else {
            return Err(OperatorError::MissingFunction("Custom".to_string()));
        };
        let output = function
            .call(CustomInput {
                inputs: ctx.inputs,
                changed: ctx.changed_port(),
                state: ctx.state,
            })
            .map_err(OperatorError::Failed)?;
        if output.outputs.len() > ctx.source_ports.len() {
            return Err(OperatorError::InvalidConfig(format!(
                "custom function produced {} outputs for {} source ports",
                output.outputs.len(),
                ctx.source_ports.len()
            )));
        }
        Ok(Evaluation {
            outputs: output.outputs,
            state: output.state,
        })
    }
}

impl Operator for OperatorKind {
    fn operator_type(&self) -> &str {
        OperatorKind::operator_type(self)
    }

    fn describe_ports(
        &self,
        node: &NodeTemplate,
        io: &IoInterface,
    ) -> Result<PortShape, OperatorError> {
        let config = &node.config;
        let shape = match self {
            OperatorKind::Input => PortShape {
                targets: Vec::new(),
                sources: interface_fields(&config.fields, &io.input_fields)
                    .iter()
                    .map(|f| NodePort::source(f.clone(), config.port_type.unwrap_or(PortType::State)))
                    .collect(),
            },
            OperatorKind::Output => PortShape {
                targets: interface_fields(&config.fields, &io.output_fields)
                    .iter()
                    .map(|f| NodePort::target(f.clone(), config.port_type.unwrap_or(PortType::State)))
                    .collect(),
                sources: Vec::new(),
            },
            OperatorKind::Custom => {
                if !matches!(config.function, Some(NodeFunction::Custom(_))) {
                    return Err(OperatorError::MissingFunction("Custom".to_string()));
                }
                PortShape {
                    targets: config
                        .target_ports
                        .iter()
                        .map(|spec| NodePort::create(spec.clone(), PortDirection::Target))
                        .collect(),
                    sources: config
                        .source_ports
                        .iter()
                        .map(|spec| NodePort::create(spec.clone(), PortDirection::Source))
                        .collect(),
                }
            }
            OperatorKind::State => {
                if let Some(initial) = &config.value {
                    check_value_type(node, initial)?;
                }
                PortShape {
                    targets: vec![NodePort::target(UPDATE_HANDLER, PortType::UpdateHandler)],
                    sources: vec![NodePort::source(STATE, PortType::State)],
                }
            }
            OperatorKind::ConstState => {
                let value = config.value.as_ref().ok_or_else(|| {
                    OperatorError::InvalidConfig("ConstState requires a value".to_string())
                })?;
                check_value_type(node, value)?;
                PortShape {
                    targets: Vec::new(),
                    sources: vec![NodePort::source(STATE, PortType::State)],
                }
            }
            OperatorKind::Sum | OperatorKind::Combine | OperatorKind::Merge => PortShape {
                targets: stream_targets(stream_arity(node, 2)?, &config.keys),
                sources: single_source(),
            },
            OperatorKind::Transform => {
                if !matches!(config.function, Some(NodeFunction::Transform(_))) {
                    return Err(OperatorError::MissingFunction("Transform".to_string()));
                }
                PortShape {
                    targets: stream_targets(1, &[]),
                    sources: single_source(),
                }
            }
            OperatorKind::Effect => {
                if !matches!(config.function, Some(NodeFunction::Effect(_))) {
                    return Err(OperatorError::MissingFunction("Effect".to_string()));
                }
                PortShape {
                    targets: stream_targets(1, &[]),
                    sources: if config.forward {
                        single_source()
                    } else {
                        Vec::new()
                    },
                }
            }
        };
        Ok(shape)
    }

    fn evaluate(&self, ctx: &EvalContext<'_>) -> Result<Evaluation, OperatorError> {
        match (self, ctx.trigger) {
            (OperatorKind::Input, Trigger::External { port, value }) => {
                Ok(Evaluation::emit(ctx, port, value.clone()))
            }
            (OperatorKind::Input | OperatorKind::Output, _) => Ok(Evaluation::silent(ctx)),

            (OperatorKind::Custom, _) => Self::custom(ctx),

            (OperatorKind::State, Trigger::Mount) => Ok(match ctx.state {
                Some(value) => Evaluation::emit(ctx, 0, value.clone()),
                None => Evaluation::silent(ctx),
            }),
            (OperatorKind::State, _) => {
                let value = ctx.require_input(0)?.clone();
                check_value_type(ctx.node, &value)?;
                Ok(Evaluation::emit(ctx, 0, value.clone()).with_state(Some(value)))
            }

            (OperatorKind::ConstState, Trigger::Mount) => match &ctx.node.config.value {
                Some(value) => Ok(Evaluation::emit(ctx, 0, value.clone())),
                None => Err(OperatorError::InvalidConfig(
                    "ConstState requires a value".to_string(),
                )),
            },
            (OperatorKind::ConstState, _) => Ok(Evaluation::silent(ctx)),

            (OperatorKind::Sum, _) => Self::sum(ctx),
            (OperatorKind::Combine, _) => Self::combine(ctx),

            (OperatorKind::Transform, _) => {
                let value = ctx.require_input(0)?;
                match &ctx.node.config.function {
                    Some(NodeFunction::Transform(f)) => Ok(Evaluation::emit(ctx, 0, f.call(value))),
                    _ => Err(OperatorError::MissingFunction("Transform".to_string())),
                }
            }

            (OperatorKind::Effect, _) => {
                let value = ctx.require_input(0)?;
                let Some(NodeFunction::Effect(f)) = &ctx.node.config.function else {
                    return Err(OperatorError::MissingFunction("Effect".to_string()));
                };
                f.call(value).map_err(OperatorError::EffectFailed)?;
                if ctx.source_ports.is_empty() {
                    Ok(Evaluation::silent(ctx))
                } else {
                    Ok(Evaluation::emit(ctx, 0, value.clone()))
                }
            }

            (OperatorKind::Merge, Trigger::Target(index)) => {
                let value = ctx.require_input(index)?;
                Ok(Evaluation::emit(ctx, 0, value.clone()))
            }
            (OperatorKind::Merge, _) => Ok(Evaluation::silent(ctx)),
        }
    }

    fn role(&self) -> OperatorRole {
        match self {
            OperatorKind::Input => OperatorRole::Input,
            OperatorKind::Output => OperatorRole::Output,
            _ => OperatorRole::Inner,
        }
    }

    fn node_kind(&self) -> NodeKind {
        match self {
            OperatorKind::Input => NodeKind::InputNode,
            OperatorKind::Output => NodeKind::OutputNode,
            OperatorKind::State | OperatorKind::ConstState => NodeKind::StateNode,
            _ => NodeKind::StreamOperatorNode,
        }
    }

    fn accepts_multiple_writers(&self, port: &NodePort) -> bool {
        match self {
            OperatorKind::Merge => true,
            OperatorKind::State => port.id == UPDATE_HANDLER,
            _ => false,
        }
    }

    fn supports_dynamic_arity(&self) -> bool {
        matches!(
            self,
            OperatorKind::Merge | OperatorKind::Sum | OperatorKind::Combine
        )
    }

    fn defers_reentry(&self) -> bool {
        matches!(self, OperatorKind::State)
    }

    fn fires_on_mount(&self, node: &NodeTemplate) -> bool {
        match self {
            OperatorKind::ConstState => true,
            OperatorKind::State => node.config.value.is_some(),
            OperatorKind::Custom => node.config.target_ports.is_empty(),
            _ => false,
        }
    }

    fn initial_state(&self, node: &NodeTemplate) -> Option<Value> {
        match self {
            OperatorKind::State | OperatorKind::Custom => node.config.value.clone(),
            _ => None,
        }
    }
}
