mod channel;
mod connection;
mod control;
mod room;
mod signaling;
mod transfer;

pub use channel::Channel;
pub use connection::ConnectionId;
pub use control::ControlRecord;
pub use room::{DenyReason, Identity, MemberInfo, Role, RoomId};
pub use signaling::{
    ClientMessage, ErrorCode, IceCandidate, IceServerConfig, SdpType, ServerMessage,
    SessionDescription,
};
pub use transfer::{BulkFrame, TransferId};
