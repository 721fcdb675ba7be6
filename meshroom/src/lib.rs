pub use meshroom_core::{ConnectionId, Identity, RoomId, TransferId};

pub mod model {
    pub use meshroom_core::*;
}

#[cfg(feature = "server")]
pub mod server {
    pub use meshroom_server::*;
}

#[cfg(feature = "client")]
pub mod client {
    pub use meshroom_client::*;
}
