pub mod port;
pub mod value;

pub use port::*;
pub use value::*;
