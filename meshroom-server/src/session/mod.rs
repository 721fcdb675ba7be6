mod coordinator;
mod relay;
mod session_command;

pub use coordinator::*;
pub use relay::*;
pub use session_command::*;
