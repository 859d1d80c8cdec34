use super::definition::with_generated_ids;
use super::{EdgeTemplate, IntoTemplate, IoInterface, ModelTemplate, NodeConfig, NodeTemplate};
use crate::error::TemplateConversionError;
use crate::graph::{PortAddress, PortSpec, PortType, Value, ValueType};
use crate::operator::FunctionTable;
use serde::{Deserialize, Serialize};

/// The serializable form of a template, as written by the diagram editor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateDescription {
    pub nodes: Vec<NodeDescription>,
    #[serde(default)]
    pub edges: Vec<EdgeDescription>,
    #[serde(default)]
    pub io: IoInterface,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDescription {
    pub id: String,
    #[serde(alias = "operatorType")]
    pub operator_type: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub config: ConfigDescription,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigDescription {
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default, alias = "valueType")]
    pub value_type: Option<ValueType>,
    #[serde(default)]
    pub arity: Option<usize>,
    #[serde(default)]
    pub keys: Vec<String>,
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default, alias = "portType")]
    pub port_type: Option<PortType>,
    #[serde(default, alias = "allowAddTargetPort")]
    pub allow_add_target_port: bool,
    #[serde(default)]
    pub forward: bool,
    #[serde(default, alias = "targetPorts")]
    pub target_ports: Vec<PortSpec>,
    #[serde(default, alias = "sourcePorts")]
    pub source_ports: Vec<PortSpec>,
    /// Name of a function in the [`FunctionTable`] used during conversion.
    #[serde(default)]
    pub function: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeDescription {
    pub from: PortAddress,
    pub to: PortAddress,
}

impl TemplateDescription {
    pub fn from_json(json: &str) -> Result<Self, TemplateConversionError> {
        serde_json::from_str(json).map_err(|e| TemplateConversionError::JsonParseError(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, TemplateConversionError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| TemplateConversionError::JsonParseError(e.to_string()))
    }

    /// Converts into a template, resolving named functions through `functions`.
    pub fn resolve(self, functions: &FunctionTable) -> Result<ModelTemplate, TemplateConversionError> {
        let nodes = self
            .nodes
            .into_iter()
            .map(|node| node.resolve(functions))
            .collect::<Result<Vec<_>, _>>()?;
        let edges = self
            .edges
            .into_iter()
            .map(|edge| EdgeTemplate {
                from: edge.from,
                to: edge.to,
            })
            .collect();
        Ok(ModelTemplate::new(nodes, edges, self.io))
    }
}

impl NodeDescription {
    fn resolve(self, functions: &FunctionTable) -> Result<NodeTemplate, TemplateConversionError> {
        let function = match &self.config.function {
            Some(name) => Some(functions.get(name).cloned().ok_or_else(|| {
                TemplateConversionError::UnknownFunction {
                    node_id: self.id.clone(),
                    name: name.clone(),
                }
            })?),
            None => None,
        };
        let config = self.config;
        Ok(NodeTemplate {
            id: self.id,
            operator_type: self.operator_type,
            label: self.label,
            config: NodeConfig {
                value: config.value,
                value_type: config.value_type,
                arity: config.arity,
                keys: config.keys,
                fields: config.fields,
                port_type: config.port_type,
                allow_add_target_port: config.allow_add_target_port,
                forward: config.forward,
                target_ports: with_generated_ids(config.target_ports),
                source_ports: with_generated_ids(config.source_ports),
                function,
            },
        })
    }
}

/// Descriptions that name no functions convert without a function table.
impl IntoTemplate for TemplateDescription {
    fn into_template(self) -> Result<ModelTemplate, TemplateConversionError> {
        self.resolve(&FunctionTable::new())
    }
}
