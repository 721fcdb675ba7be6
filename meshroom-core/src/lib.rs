pub mod error;
pub mod model;
pub mod traits;

pub use error::CodecError;
pub use model::*;
pub use traits::Record;
