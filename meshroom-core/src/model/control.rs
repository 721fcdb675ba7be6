use crate::model::Channel;
use crate::traits::Record;
use serde::{Deserialize, Serialize};

/// Interactive records carried on the control channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ControlRecord {
    Chat { text: String, sent_at: u64 },
    Ping { timestamp: u64 },
    Pong { timestamp: u64 },
}

impl Record for ControlRecord {
    fn channel(&self) -> Channel {
        Channel::Control
    }
}
