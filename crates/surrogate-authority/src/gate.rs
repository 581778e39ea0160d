//! Capability gate - must this actor's call be delegated?

use std::sync::Arc;

use surrogate_core::{FeatureFlag, Participant, SceneId, SessionContext};

/// Decides whether an actor's tile operation has to go through an
/// elevated peer. Pure; no side effects.
#[derive(Clone)]
pub struct CapabilityGate {
    flag: Arc<FeatureFlag>,
    session: Arc<dyn SessionContext>,
}

impl CapabilityGate {
    pub fn new(flag: Arc<FeatureFlag>, session: Arc<dyn SessionContext>) -> Self {
        CapabilityGate { flag, session }
    }

    /// Rules, in order:
    /// 1. feature disabled → false
    /// 2. no actor, or actor already elevated → false
    /// 3. otherwise true only if `target` is the scene the local
    ///    participant is actively viewing
    pub fn allowed(&self, actor: Option<&Participant>, target: Option<&SceneId>) -> bool {
        if !self.flag.enabled() {
            return false;
        }
        match actor {
            Some(actor) if !actor.elevated => {}
            _ => return false,
        }
        match (target, self.session.active_scene()) {
            (Some(target), Some(active)) => *target == active,
            _ => false,
        }
    }

    /// Layer capabilities are opened for any non-elevated local participant
    /// while the feature is on, regardless of scene.
    pub fn layer_open(&self) -> bool {
        self.flag.enabled() && !self.session.local().elevated
    }

    pub fn flag(&self) -> &Arc<FeatureFlag> {
        &self.flag
    }

    pub fn session(&self) -> &Arc<dyn SessionContext> {
        &self.session
    }
}
