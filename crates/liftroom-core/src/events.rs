use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::rest::RestPhase;

/// Every committed rest-timer state change produces an Event.
/// Interested listeners subscribe through the coordinator handle; this
/// replaces implicit property observation with explicit emission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    RestStarted {
        state_id: Uuid,
        workout_name: String,
        duration_secs: i64,
        at: DateTime<Utc>,
    },
    RestPaused {
        state_id: Uuid,
        remaining_secs: i64,
        at: DateTime<Utc>,
    },
    RestResumed {
        state_id: Uuid,
        remaining_secs: i64,
        at: DateTime<Utc>,
    },
    /// Remaining/total rewritten by an add or set adjustment.
    RestAdjusted {
        state_id: Uuid,
        remaining_secs: i64,
        total_secs: i64,
        at: DateTime<Utc>,
    },
    RestExpired {
        state_id: Uuid,
        workout_name: String,
        at: DateTime<Utc>,
    },
    /// User acknowledged the expiry; state clears after a grace period.
    RestAcknowledged {
        state_id: Uuid,
        at: DateTime<Utc>,
    },
    /// State became absent (cancel or post-acknowledgment cleanup).
    RestCleared {
        at: DateTime<Utc>,
    },
    HeartRateUpdated {
        state_id: Uuid,
        bpm: u32,
        at: DateTime<Utc>,
    },
    /// Persisted state reinstated after a process restart.
    RestRestored {
        state_id: Uuid,
        phase: RestPhase,
        remaining_secs: i64,
        at: DateTime<Utc>,
    },
}
