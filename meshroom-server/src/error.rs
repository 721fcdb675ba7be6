use meshroom_core::{ConnectionId, ErrorCode, RoomId};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("only the host of room `{0}` may do that")]
    NotHost(RoomId),

    #[error("room `{0}` does not exist")]
    UnknownRoom(RoomId),

    #[error("{0} is not a member of room `{1}`")]
    NotMember(ConnectionId, RoomId),

    #[error("{0} has no pending knock on room `{1}`")]
    NotPending(ConnectionId, RoomId),
}

impl SessionError {
    pub fn code(&self) -> ErrorCode {
        match self {
            SessionError::NotHost(_) => ErrorCode::NotHost,
            SessionError::UnknownRoom(_) => ErrorCode::UnknownRoom,
            SessionError::NotMember(..) => ErrorCode::NotMember,
            SessionError::NotPending(..) => ErrorCode::NotPending,
        }
    }
}
