use meshroom_core::{ConnectionId, Identity, Role, RoomId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionState {
    /// Full member of the room.
    Admitted,
    /// Knocked on a locked room and waits for the host.
    Pending,
}

#[derive(Debug, Clone)]
pub struct Participant {
    pub identity: Identity,
    pub connection_id: ConnectionId,
    pub room_id: RoomId,
    pub role: Role,
    pub admission: AdmissionState,
}

impl Participant {
    pub fn is_admitted(&self) -> bool {
        self.admission == AdmissionState::Admitted
    }
}
