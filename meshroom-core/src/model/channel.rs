use serde::{Deserialize, Serialize};

/// The two logical data channels every established peer link carries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Chat and other small typed records.
    Control,
    /// File offers, requests and chunk payloads.
    Bulk,
}

impl Channel {
    pub const ALL: [Channel; 2] = [Channel::Control, Channel::Bulk];

    /// Label used when the channel is created on the transport.
    pub fn label(self) -> &'static str {
        match self {
            Channel::Control => "chat",
            Channel::Bulk => "file",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "chat" => Some(Channel::Control),
            "file" => Some(Channel::Bulk),
            _ => None,
        }
    }
}

impl Default for Channel {
    fn default() -> Self {
        Self::Control
    }
}
