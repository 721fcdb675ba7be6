use crate::error::SessionError;
use crate::registry::participant::{AdmissionState, Participant};
use crate::registry::room::Room;
use meshroom_core::{ConnectionId, Identity, MemberInfo, Role, RoomId};
use std::collections::HashMap;
use tracing::{debug, info};

/// Result of admitting a connection into a room.
#[derive(Debug)]
pub struct Admission {
    pub role: Role,
    /// Members other than the admitted connection, in join order.
    pub existing_members: Vec<MemberInfo>,
    pub locked: bool,
    /// `false` when the connection was already a member (re-join).
    pub newly_added: bool,
}

/// What changed when a connection was removed from the registry.
#[derive(Debug)]
pub struct Departure {
    pub room_id: RoomId,
    pub identity: Identity,
    /// `false` when the connection was only knocking.
    pub was_member: bool,
    pub remaining: Vec<ConnectionId>,
    pub new_host: Option<MemberInfo>,
    pub room_closed: bool,
    /// Knocks that were still waiting when the room closed.
    pub orphaned_knocks: Vec<(ConnectionId, Identity)>,
}

/// Authoritative, process-local map of rooms, members and pending knocks.
///
/// Every mutation is synchronous, so one handler invocation always sees and
/// leaves a consistent registry.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: HashMap<RoomId, Room>,
    participants: HashMap<ConnectionId, Participant>,
    identities: HashMap<Identity, ConnectionId>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn room(&self, room_id: &RoomId) -> Option<&Room> {
        self.rooms.get(room_id)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn participant(&self, connection_id: &ConnectionId) -> Option<&Participant> {
        self.participants.get(connection_id)
    }

    pub fn identity_of(&self, connection_id: &ConnectionId) -> Option<&Identity> {
        self.participants.get(connection_id).map(|p| &p.identity)
    }

    /// The connection currently holding `identity`, admitted or knocking.
    pub fn live_connection(&self, identity: &Identity) -> Option<ConnectionId> {
        self.identities.get(identity).copied()
    }

    pub fn is_locked(&self, room_id: &RoomId) -> bool {
        self.rooms.get(room_id).is_some_and(Room::is_locked)
    }

    pub fn is_host(&self, room_id: &RoomId, connection_id: &ConnectionId) -> bool {
        self.rooms
            .get(room_id)
            .is_some_and(|room| room.host().as_ref() == Some(connection_id))
    }

    pub fn host(&self, room_id: &RoomId) -> Option<ConnectionId> {
        self.rooms.get(room_id).and_then(Room::host)
    }

    pub fn member_ids(&self, room_id: &RoomId) -> Vec<ConnectionId> {
        self.rooms
            .get(room_id)
            .map(|room| room.members().to_vec())
            .unwrap_or_default()
    }

    pub fn members(&self, room_id: &RoomId) -> Vec<MemberInfo> {
        self.member_ids(room_id)
            .into_iter()
            .filter_map(|id| self.member_info(&id))
            .collect()
    }

    pub fn member_info(&self, connection_id: &ConnectionId) -> Option<MemberInfo> {
        self.participants.get(connection_id).map(|p| MemberInfo {
            connection_id: p.connection_id,
            identity: p.identity.clone(),
        })
    }

    pub fn pending(&self, room_id: &RoomId) -> Vec<MemberInfo> {
        self.rooms
            .get(room_id)
            .map(|room| {
                room.pending()
                    .iter()
                    .map(|(connection_id, identity)| MemberInfo {
                        connection_id: *connection_id,
                        identity: identity.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Makes `connection_id` a member of `room_id`, creating the room if needed.
    ///
    /// The first member of an empty room becomes host. Admitting an existing
    /// member again does not duplicate the membership. The connection must not
    /// be a member of another room.
    pub fn admit(
        &mut self,
        connection_id: ConnectionId,
        identity: Identity,
        room_id: RoomId,
    ) -> Admission {
        let room = self.rooms.entry(room_id.clone()).or_insert_with(|| {
            info!("Creating room '{}'", room_id);
            Room::new(room_id.clone())
        });

        room.take_pending(&connection_id);
        let newly_added = !room.contains(&connection_id);
        let is_host = room.insert(connection_id);
        let locked = room.is_locked();
        let role = if is_host { Role::Host } else { Role::Guest };

        let other_ids: Vec<ConnectionId> = room
            .members()
            .iter()
            .filter(|m| **m != connection_id)
            .copied()
            .collect();

        self.identities.insert(identity.clone(), connection_id);
        self.participants.insert(
            connection_id,
            Participant {
                identity,
                connection_id,
                room_id,
                role,
                admission: AdmissionState::Admitted,
            },
        );

        let existing_members = other_ids
            .iter()
            .filter_map(|id| self.member_info(id))
            .collect();

        Admission {
            role,
            existing_members,
            locked,
            newly_added,
        }
    }

    /// Records a knock on a locked room and returns the host to notify.
    pub fn enqueue_knock(
        &mut self,
        connection_id: ConnectionId,
        identity: Identity,
        room_id: RoomId,
    ) -> Result<ConnectionId, SessionError> {
        let room = self
            .rooms
            .get_mut(&room_id)
            .ok_or_else(|| SessionError::UnknownRoom(room_id.clone()))?;
        let host = room
            .host()
            .ok_or_else(|| SessionError::UnknownRoom(room_id.clone()))?;

        room.add_pending(connection_id, identity.clone());
        self.identities.insert(identity.clone(), connection_id);
        self.participants.insert(
            connection_id,
            Participant {
                identity,
                connection_id,
                room_id,
                role: Role::Guest,
                admission: AdmissionState::Pending,
            },
        );

        Ok(host)
    }

    /// Consumes a pending knock. Approval and denial are single-use: nothing
    /// about the requester is retained afterwards.
    pub fn take_pending(
        &mut self,
        room_id: &RoomId,
        requester: &ConnectionId,
    ) -> Option<Identity> {
        let identity = self.rooms.get_mut(room_id)?.take_pending(requester)?;
        self.participants.remove(requester);
        self.forget_identity(&identity, requester);
        Some(identity)
    }

    pub fn set_locked(&mut self, room_id: &RoomId, desired: bool) -> Result<(), SessionError> {
        let room = self
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| SessionError::UnknownRoom(room_id.clone()))?;
        room.set_locked(desired);
        Ok(())
    }

    /// Removes a connection wherever it is, member or knocking.
    ///
    /// Hands the host role to the first remaining member when the host
    /// leaves, and discards the room together with its lock once it empties.
    pub fn remove(&mut self, connection_id: &ConnectionId) -> Option<Departure> {
        let participant = self.participants.remove(connection_id)?;
        self.forget_identity(&participant.identity, connection_id);

        let Some(room) = self.rooms.get_mut(&participant.room_id) else {
            return None;
        };

        if !participant.is_admitted() {
            room.take_pending(connection_id);
            return Some(Departure {
                room_id: participant.room_id,
                identity: participant.identity,
                was_member: false,
                remaining: room.members().to_vec(),
                new_host: None,
                room_closed: false,
                orphaned_knocks: Vec::new(),
            });
        }

        let new_host_id = room.remove(connection_id);
        let remaining = room.members().to_vec();
        let room_closed = room.is_empty();

        let mut orphaned_knocks = Vec::new();
        if room_closed {
            orphaned_knocks = room.drain_pending();
            self.rooms.remove(&participant.room_id);
            debug!("Room '{}' is empty, discarded", participant.room_id);
        }

        for (knocker, identity) in &orphaned_knocks {
            self.participants.remove(knocker);
            self.forget_identity(identity, knocker);
        }

        let new_host = new_host_id.and_then(|id| {
            let p = self.participants.get_mut(&id)?;
            p.role = Role::Host;
            Some(MemberInfo {
                connection_id: id,
                identity: p.identity.clone(),
            })
        });

        Some(Departure {
            room_id: participant.room_id,
            identity: participant.identity,
            was_member: true,
            remaining,
            new_host,
            room_closed,
            orphaned_knocks,
        })
    }

    fn forget_identity(&mut self, identity: &Identity, connection_id: &ConnectionId) {
        if self.identities.get(identity) == Some(connection_id) {
            self.identities.remove(identity);
        }
    }
}
