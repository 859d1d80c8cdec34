//! # Nagare - Reactive Operator Graph Runtime
//!
//! **Nagare** runs typed dataflow graphs built from operator nodes. A graph is
//! described once as an immutable [`template::ModelTemplate`] and instantiated
//! as any number of live [`block::ModelBlock`]s. Writing an input field of a
//! block propagates the new value through the graph until every node has
//! settled, and the output fields can be read back at any time.
//!
//! ## Core Workflow
//!
//! 1.  **Describe Your Graph**: Build a `ModelTemplate` in code, parse a
//!     `TemplateDescription` from JSON, or implement `IntoTemplate` for your own editor format.
//! 2.  **Bind**: Use `ModelBlock::builder` to bind every node against an `OperatorMap`
//!     (the global registry by default). Templates are validated here.
//! 3.  **Mount**: `mount()` seeds the initial input and runs the first propagation pass.
//! 4.  **Drive**: Call `set_input` for every external change and read `get_output`.
//!     State nodes that feed back into themselves advance one step per pass.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use nagare::prelude::*;
//!
//! fn main() -> Result<()> {
//!     // total = a + b
//!     let template = ModelTemplate::new(
//!         vec![
//!             NodeTemplate::input("in", ["a", "b"]),
//!             NodeTemplate::sum("sum", 2),
//!             NodeTemplate::output("out", ["total"]),
//!         ],
//!         vec![
//!             EdgeTemplate::new("in", "a", "sum", "input-0"),
//!             EdgeTemplate::new("in", "b", "sum", "input-1"),
//!             EdgeTemplate::new("sum", "output-0", "out", "total"),
//!         ],
//!         IoInterface::new(["a", "b"], ["total"]),
//!     );
//!
//!     let mut block = ModelBlock::builder(template)
//!         .with_input("a", Value::from(1.0))
//!         .with_input("b", Value::from(2.0))
//!         .build()?;
//!     block.mount()?;
//!
//!     let report = block.set_input("b", 5.0)?;
//!     println!("{}", TraceFormatter::format_report(&report));
//!     println!("total = {}", block.get_output()?["total"]);
//!
//!     block.teardown()?;
//!     Ok(())
//! }
//! ```

pub mod block;
pub mod error;
pub mod graph;
pub mod operator;
pub mod prelude;
pub mod template;
pub mod trace;

pub use block::start;
