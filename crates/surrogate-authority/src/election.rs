//! Authority election - which elevated peer executes delegated work

use surrogate_core::Participant;

/// Pick the delegate: the connected elevated participant with the smallest
/// identifier (ordinal comparison), or `None` if there is none.
///
/// Deterministic over the *set* of eligible participants, so every peer
/// reaches the same answer without coordinating. Not cached; callers run it
/// per request to follow role and connectivity churn.
pub fn elect_authority(participants: &[Participant]) -> Option<&Participant> {
    participants
        .iter()
        .filter(|p| p.is_eligible_authority())
        .min_by(|a, b| a.id.cmp(&b.id))
}

/// Owned variant for callers holding a snapshot
pub fn elect_authority_owned(participants: Vec<Participant>) -> Option<Participant> {
    participants
        .into_iter()
        .filter(Participant::is_eligible_authority)
        .min_by(|a, b| a.id.cmp(&b.id))
}
