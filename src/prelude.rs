//! Prelude module for convenient imports
//!
//! This module re-exports the most commonly used types and traits from the nagare crate.
//!
//! # Example
//!
//! ```rust,no_run
//! use nagare::prelude::*;
//!
//! # fn run_example() -> Result<()> {
//! let json = std::fs::read_to_string("path/to/template.json")?;
//! let template = TemplateDescription::from_json(&json)?
//!     .resolve(&FunctionTable::with_standard_functions())?;
//!
//! let mut block = start(template, [("x".to_string(), Value::from(1.0))])?;
//! block.set_input("x", 2.0)?;
//! println!("Outputs: {:?}", block.get_output()?);
//! # Ok(())
//! # }
//! ```

// Runtime
pub use crate::block::{
    BlockBuilder, BlockConfig, InputQueue, Lifecycle, ModelBlock, OutputInterface, start,
};

// Templates
pub use crate::template::{
    EdgeTemplate, IntoTemplate, IoInterface, ModelTemplate, NodeConfig, NodeTemplate,
    TemplateDescription,
};

// Graph primitives
pub use crate::graph::{NodePort, PortAddress, PortDirection, PortSpec, PortType, Value, ValueType};

// Operators
pub use crate::operator::{
    CustomFn, CustomInput, CustomOutput, FunctionTable, Operator, OperatorKind, OperatorMap,
};

// Error types
pub use crate::error::{
    BlockError, GraphValidationError, OperatorError, RegistryError, TemplateConversionError,
};

// Trace formatting
pub use crate::trace::{PassReport, TraceFormatter};

// Result type alias for convenience
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;
