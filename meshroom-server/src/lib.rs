pub mod app;
pub mod config;
pub mod error;
pub mod registry;
pub mod session;
pub mod signaling;

pub use app::*;
pub use config::*;
pub use error::SessionError;
pub use registry::*;
pub use session::*;
pub use signaling::*;
