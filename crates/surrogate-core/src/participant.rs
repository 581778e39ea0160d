//! Participant view supplied by the host session

use crate::ParticipantId;

/// One participant of the shared session.
///
/// Read-only view; the host owns the real user records.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Participant {
    pub id: ParticipantId,
    /// Holds the privileged role that may mutate tiles directly
    pub elevated: bool,
    /// Currently connected to the session
    pub connected: bool,
}

impl Participant {
    pub fn new(id: impl Into<ParticipantId>, elevated: bool, connected: bool) -> Self {
        Participant {
            id: id.into(),
            elevated,
            connected,
        }
    }

    /// Connected elevated participant
    pub fn elevated(id: impl Into<ParticipantId>) -> Self {
        Self::new(id, true, true)
    }

    /// Connected regular participant
    pub fn player(id: impl Into<ParticipantId>) -> Self {
        Self::new(id, false, true)
    }

    /// Liveness is derived from connectivity alone
    #[inline]
    pub fn is_active(&self) -> bool {
        self.connected
    }

    /// Eligible to act as delegate
    #[inline]
    pub fn is_eligible_authority(&self) -> bool {
        self.is_active() && self.elevated
    }

    pub fn disconnected(mut self) -> Self {
        self.connected = false;
        self
    }
}
