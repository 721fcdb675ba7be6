mod client_event;
mod continuity;
mod link_command;
mod link_runtime;
mod room_client;
mod room_command;
mod signaling_client;

pub use client_event::*;
pub use continuity::*;
pub use link_command::*;
pub use link_runtime::*;
pub use room_client::*;
pub use room_command::*;
pub use signaling_client::*;
