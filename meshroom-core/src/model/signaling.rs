use crate::error::CodecError;
use crate::model::connection::ConnectionId;
use crate::model::room::{DenyReason, Identity, MemberInfo, Role, RoomId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IceServerConfig {
    pub urls: Vec<String>,
    pub username: Option<String>,
    pub credential: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
    Pranswer,
    Rollback,
}

/// Opaque session description. The relay never looks inside `sdp`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// Reachability candidate in the shape browsers emit from `RTCIceCandidate.toJSON()`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default)]
    pub sdp_mid: Option<String>,
    #[serde(default)]
    pub sdp_m_line_index: Option<u16>,
    #[serde(default)]
    pub username_fragment: Option<String>,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_m_line_index: None,
            username_fragment: None,
        }
    }
}

/// Machine-readable category carried by [`ServerMessage::Error`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ErrorCode {
    NotHost,
    UnknownRoom,
    NotMember,
    NotPending,
    Malformed,
}

/// Messages a client sends to the signaling server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ClientMessage {
    Join {
        identity: Identity,
        room_id: RoomId,
    },
    Leave {
        room_id: RoomId,
    },
    Lock {
        room_id: RoomId,
        desired: bool,
    },
    Kick {
        target_connection_id: ConnectionId,
        room_id: RoomId,
    },
    Approve {
        requester_connection_id: ConnectionId,
        room_id: RoomId,
    },
    Deny {
        requester_connection_id: ConnectionId,
        room_id: RoomId,
    },
    Call {
        to: ConnectionId,
        offer: SessionDescription,
    },
    CallAccepted {
        to: ConnectionId,
        answer: SessionDescription,
    },
    Renegotiate {
        to: ConnectionId,
        offer: SessionDescription,
    },
    RenegotiateDone {
        to: ConnectionId,
        answer: SessionDescription,
    },
    Candidate {
        to: ConnectionId,
        candidate: IceCandidate,
    },
}

impl ClientMessage {
    /// Parse-or-reject boundary for text frames coming off the socket.
    pub fn parse(text: &str) -> Result<Self, CodecError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String, CodecError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Messages the signaling server sends to a client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ServerMessage {
    Welcome {
        connection_id: ConnectionId,
    },
    IceConfig {
        ice_servers: Vec<IceServerConfig>,
    },
    Joined {
        identity: Identity,
        room_id: RoomId,
        connection_id: ConnectionId,
        existing_members: Vec<MemberInfo>,
        role: Role,
        locked: bool,
    },
    MemberJoined {
        identity: Identity,
        connection_id: ConnectionId,
    },
    MemberLeft {
        connection_id: ConnectionId,
        identity: Identity,
    },
    RoomUpdate {
        total: usize,
        members: Vec<MemberInfo>,
    },
    HostChanged {
        connection_id: ConnectionId,
        identity: Identity,
    },
    Locked {
        state: bool,
    },
    Kicked {
        room_id: RoomId,
    },
    Knock {
        identity: Identity,
        room_id: RoomId,
        requester_connection_id: ConnectionId,
    },
    Waiting,
    Approved {
        room_id: RoomId,
    },
    Denied {
        room_id: RoomId,
        reason: DenyReason,
    },
    IncomingCall {
        from: ConnectionId,
        offer: SessionDescription,
        from_identity: Option<Identity>,
    },
    CallAccepted {
        from: ConnectionId,
        answer: SessionDescription,
    },
    RenegotiateNeeded {
        from: ConnectionId,
        offer: SessionDescription,
    },
    RenegotiateFinal {
        from: ConnectionId,
        answer: SessionDescription,
    },
    Candidate {
        from: ConnectionId,
        candidate: IceCandidate,
    },
    Error {
        code: ErrorCode,
        message: String,
    },
}

impl ServerMessage {
    pub fn parse(text: &str) -> Result<Self, CodecError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String, CodecError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error {
            code,
            message: message.into(),
        }
    }
}
