use meshroom_core::{ConnectionId, Identity, RoomId};
use std::collections::HashMap;

/// Membership state of a single room.
///
/// `members` keeps join order so that the host role always passes to the
/// longest-present remaining member.
#[derive(Debug)]
pub struct Room {
    pub room_id: RoomId,
    members: Vec<ConnectionId>,
    host: Option<ConnectionId>,
    locked: bool,
    pending: HashMap<ConnectionId, Identity>,
}

impl Room {
    pub(crate) fn new(room_id: RoomId) -> Self {
        Self {
            room_id,
            members: Vec::new(),
            host: None,
            locked: false,
            pending: HashMap::new(),
        }
    }

    pub fn members(&self) -> &[ConnectionId] {
        &self.members
    }

    pub fn host(&self) -> Option<ConnectionId> {
        self.host
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, connection_id: &ConnectionId) -> bool {
        self.members.contains(connection_id)
    }

    pub fn pending(&self) -> &HashMap<ConnectionId, Identity> {
        &self.pending
    }

    /// Adds a member. Returns `true` when the member became host.
    pub(crate) fn insert(&mut self, connection_id: ConnectionId) -> bool {
        if !self.members.contains(&connection_id) {
            self.members.push(connection_id);
        }
        if self.host.is_none() {
            self.host = Some(connection_id);
        }
        self.host == Some(connection_id)
    }

    /// Removes a member and returns the new host if the role moved.
    pub(crate) fn remove(&mut self, connection_id: &ConnectionId) -> Option<ConnectionId> {
        self.members.retain(|m| m != connection_id);

        if self.host.as_ref() != Some(connection_id) {
            return None;
        }

        self.host = self.members.first().copied();
        self.host
    }

    pub(crate) fn set_locked(&mut self, locked: bool) {
        self.locked = locked;
    }

    pub(crate) fn add_pending(&mut self, connection_id: ConnectionId, identity: Identity) {
        self.pending.insert(connection_id, identity);
    }

    pub(crate) fn take_pending(&mut self, connection_id: &ConnectionId) -> Option<Identity> {
        self.pending.remove(connection_id)
    }

    pub(crate) fn drain_pending(&mut self) -> Vec<(ConnectionId, Identity)> {
        self.pending.drain().collect()
    }
}
