//! In-process broadcast hub
//!
//! Every participant of a test cluster shares one hub. Link conditions are
//! applied per delivery, so a message can reach some subscribers and not
//! others, and can arrive twice.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;
use tracing::trace;

use surrogate_core::SurrogateResult;

use crate::{BroadcastChannel, MessageReceiver, Subscribers};

/// Per-delivery link behaviour
#[derive(Clone, Debug, PartialEq)]
pub struct LinkConditions {
    /// Probability a delivery is lost (0.0 - 1.0)
    pub drop_rate: f64,
    /// Probability a delivery arrives twice (0.0 - 1.0)
    pub duplicate_rate: f64,
    /// RNG seed, for reproducible runs
    pub seed: u64,
}

impl Default for LinkConditions {
    fn default() -> Self {
        LinkConditions::perfect()
    }
}

impl LinkConditions {
    /// No loss, no duplication
    pub fn perfect() -> Self {
        LinkConditions {
            drop_rate: 0.0,
            duplicate_rate: 0.0,
            seed: 0,
        }
    }

    /// Every delivery arrives twice
    pub fn duplicating(seed: u64) -> Self {
        LinkConditions {
            drop_rate: 0.0,
            duplicate_rate: 1.0,
            seed,
        }
    }

    pub fn lossy(drop_rate: f64, seed: u64) -> Self {
        LinkConditions {
            drop_rate,
            duplicate_rate: 0.0,
            seed,
        }
    }
}

/// Delivery counters
#[derive(Debug, Default)]
pub struct HubStats {
    pub emitted: AtomicU64,
    pub delivered: AtomicU64,
    pub dropped: AtomicU64,
    pub duplicated: AtomicU64,
}

/// Shared in-process broadcast medium
pub struct LocalHub {
    subscribers: Subscribers,
    conditions: Mutex<LinkConditions>,
    rng: Mutex<StdRng>,
    stats: HubStats,
}

impl LocalHub {
    pub fn new() -> Self {
        Self::with_conditions(LinkConditions::perfect())
    }

    pub fn with_conditions(conditions: LinkConditions) -> Self {
        LocalHub {
            subscribers: Subscribers::new(),
            rng: Mutex::new(StdRng::seed_from_u64(conditions.seed)),
            conditions: Mutex::new(conditions),
            stats: HubStats::default(),
        }
    }

    /// Swap link conditions mid-run; reseeds the RNG
    pub fn set_conditions(&self, conditions: LinkConditions) {
        *self.rng.lock() = StdRng::seed_from_u64(conditions.seed);
        *self.conditions.lock() = conditions;
    }

    pub fn stats(&self) -> &HubStats {
        &self.stats
    }

    /// Messages emitted so far, on any event
    pub fn emitted(&self) -> u64 {
        self.stats.emitted.load(Ordering::Relaxed)
    }

    /// How many copies one delivery turns into: 0, 1 or 2
    fn roll_copies(&self) -> usize {
        let conditions = self.conditions.lock().clone();
        let mut rng = self.rng.lock();
        if conditions.drop_rate > 0.0 && rng.gen::<f64>() < conditions.drop_rate {
            return 0;
        }
        if conditions.duplicate_rate > 0.0 && rng.gen::<f64>() < conditions.duplicate_rate {
            return 2;
        }
        1
    }
}

impl Default for LocalHub {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadcastChannel for LocalHub {
    fn emit(&self, event: &str, message: Value) -> SurrogateResult<()> {
        self.stats.emitted.fetch_add(1, Ordering::Relaxed);
        for tx in self.subscribers.senders(event) {
            let copies = self.roll_copies();
            match copies {
                0 => {
                    self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                    trace!(event, "delivery dropped");
                }
                2 => {
                    self.stats.duplicated.fetch_add(1, Ordering::Relaxed);
                }
                _ => {}
            }
            for _ in 0..copies {
                if tx.send(message.clone()).is_ok() {
                    self.stats.delivered.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        Ok(())
    }

    fn subscribe(&self, event: &str) -> MessageReceiver {
        self.subscribers.add(event)
    }
}
