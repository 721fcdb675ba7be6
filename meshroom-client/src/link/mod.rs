mod negotiation_state;
mod peer_link;
mod transport;

pub use negotiation_state::*;
pub use peer_link::*;
pub use transport::*;
