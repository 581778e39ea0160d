//! Session context - who am I, who else is here, what scene am I viewing

use std::sync::Arc;

use parking_lot::RwLock;

use crate::{Participant, ParticipantId, SceneId};

/// Read-only view of the session supplied by the host
pub trait SessionContext: Send + Sync {
    /// The local participant (the actor for every locally issued call)
    fn local(&self) -> Participant;

    /// Every known participant with current role/connectivity flags
    fn participants(&self) -> Vec<Participant>;

    /// Scene the local participant is actively viewing, if any
    fn active_scene(&self) -> Option<SceneId>;
}

/// Session-wide participant list shared by every peer in a process
#[derive(Debug, Default)]
pub struct Roster {
    participants: RwLock<Vec<Participant>>,
}

impl Roster {
    pub fn new(participants: Vec<Participant>) -> Self {
        Roster {
            participants: RwLock::new(participants),
        }
    }

    pub fn snapshot(&self) -> Vec<Participant> {
        self.participants.read().clone()
    }

    pub fn get(&self, id: &ParticipantId) -> Option<Participant> {
        self.participants.read().iter().find(|p| &p.id == id).cloned()
    }

    /// Insert or replace a participant
    pub fn upsert(&self, participant: Participant) {
        let mut participants = self.participants.write();
        match participants.iter_mut().find(|p| p.id == participant.id) {
            Some(existing) => *existing = participant,
            None => participants.push(participant),
        }
    }

    pub fn set_connected(&self, id: &ParticipantId, connected: bool) {
        if let Some(p) = self.participants.write().iter_mut().find(|p| &p.id == id) {
            p.connected = connected;
        }
    }
}

/// Session view of one participant over a shared roster
pub struct LocalSession {
    local_id: ParticipantId,
    roster: Arc<Roster>,
    active_scene: RwLock<Option<SceneId>>,
}

impl LocalSession {
    pub fn new(local_id: impl Into<ParticipantId>, roster: Arc<Roster>) -> Self {
        LocalSession {
            local_id: local_id.into(),
            roster,
            active_scene: RwLock::new(None),
        }
    }

    pub fn with_active_scene(self, scene: impl Into<SceneId>) -> Self {
        *self.active_scene.write() = Some(scene.into());
        self
    }

    /// Switch the viewed scene (canvas change)
    pub fn view_scene(&self, scene: Option<SceneId>) {
        *self.active_scene.write() = scene;
    }

    pub fn roster(&self) -> &Arc<Roster> {
        &self.roster
    }
}

impl SessionContext for LocalSession {
    fn local(&self) -> Participant {
        // A participant missing from the roster is treated as a connected,
        // unprivileged user.
        self.roster
            .get(&self.local_id)
            .unwrap_or_else(|| Participant::player(self.local_id.clone()))
    }

    fn participants(&self) -> Vec<Participant> {
        self.roster.snapshot()
    }

    fn active_scene(&self) -> Option<SceneId> {
        self.active_scene.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_session_reads_shared_roster() {
        let roster = Arc::new(Roster::new(vec![
            Participant::elevated("gm"),
            Participant::player("p1"),
        ]));
        let session = LocalSession::new("p1", roster.clone()).with_active_scene("S1");

        assert!(!session.local().elevated);
        assert_eq!(session.active_scene(), Some(SceneId::new("S1")));

        roster.upsert(Participant::elevated("p1"));
        assert!(session.local().elevated);

        roster.set_connected(&"gm".into(), false);
        assert!(!roster.get(&"gm".into()).unwrap().connected);
        assert_eq!(session.participants().len(), 2);
    }

    #[test]
    fn test_view_scene_switches_context() {
        let session = LocalSession::new("p1", Arc::new(Roster::default()));
        assert_eq!(session.active_scene(), None);
        session.view_scene(Some("S2".into()));
        assert_eq!(session.active_scene(), Some(SceneId::new("S2")));
    }
}
