mod outbound_library;
mod stream;
#[allow(clippy::module_inception)]
mod transfer;
mod transfer_engine;
mod transfer_event;

pub use outbound_library::*;
pub use stream::*;
pub use transfer::*;
pub use transfer_engine::*;
pub use transfer_event::*;
