pub mod conversion;
pub mod definition;
pub mod description;
mod validation;

pub use conversion::*;
pub use definition::*;
pub use description::*;
pub(crate) use validation::bind_node;
