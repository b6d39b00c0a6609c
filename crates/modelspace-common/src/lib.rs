pub mod error;
pub mod id;
pub mod value;

pub use error::*;
pub use id::*;
pub use value::*;
