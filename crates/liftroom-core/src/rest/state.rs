//! Rest timer state model.
//!
//! `RestTimerState` is an immutable-per-update snapshot of one active rest
//! period. The manager is the only writer: it clones the current snapshot,
//! derives the next one through the helpers here, and commits it through its
//! transactional entry point.
//!
//! ## Phase transitions
//!
//! ```text
//! (absent) -> Running <-> Paused
//!                |           |
//!                v           v (remaining forced to 0)
//!             Expired -> Completed -> (absent)
//! ```
//!
//! Any phase can transition to absent via cancel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Plausible physiological heart rate range in BPM.
pub const HEART_RATE_MIN: u32 = 30;
pub const HEART_RATE_MAX: u32 = 250;

/// Allowed skew between `end_date` and `now + total_seconds` before a
/// running state is considered corrupt.
pub const CLOCK_SKEW_TOLERANCE_SECS: i64 = 60;

/// Lifecycle phase of a rest period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RestPhase {
    /// Counting down toward `end_date`.
    Running,
    /// Frozen by the user; `remaining_seconds` holds the stored delta.
    Paused,
    /// Countdown reached zero, waiting for acknowledgment.
    Expired,
    /// Acknowledged; cleared after a short grace period.
    Completed,
}

/// Complete state of one rest period between two exercise sets.
///
/// Serialized as self-describing JSON for crash recovery. Unknown future
/// fields are ignored on decode; optional fields default when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestTimerState {
    /// Identifier of this rest period instance.
    pub id: Uuid,
    /// Owning workout session (foreign reference only).
    pub workout_id: Uuid,
    pub workout_name: String,
    /// Position within the session this rest belongs to.
    pub exercise_index: usize,
    pub set_index: usize,
    /// Wall-clock instant the rest period began.
    pub start_date: DateTime<Utc>,
    /// Wall-clock expiry instant. `Some` iff `phase == Running`.
    pub end_date: Option<DateTime<Utc>>,
    pub total_seconds: i64,
    /// Frozen countdown value. Authoritative while paused; snapshot of the
    /// last commit otherwise (running time derives from `end_date`).
    pub remaining_seconds: i64,
    pub phase: RestPhase,
    /// Timestamp of the most recent mutation, for staleness checks.
    pub last_update: DateTime<Utc>,
    /// Display context for the live status channel.
    #[serde(default)]
    pub current_exercise: Option<String>,
    #[serde(default)]
    pub next_exercise: Option<String>,
    /// Latest applied heart rate sample in BPM.
    #[serde(default)]
    pub heart_rate_bpm: Option<u32>,
}

/// Parameters for starting a new rest period.
#[derive(Debug, Clone)]
pub struct StartRest {
    pub workout_id: Uuid,
    pub workout_name: String,
    pub exercise_index: usize,
    pub set_index: usize,
    pub duration_seconds: i64,
    pub current_exercise: Option<String>,
    pub next_exercise: Option<String>,
}

impl RestTimerState {
    /// Create the state for a freshly started rest period.
    ///
    /// The duration is clamped to >= 0. A zero duration yields a state that
    /// is already `Expired` (immediate-fire edge case).
    pub fn begin(req: StartRest, now: DateTime<Utc>) -> Self {
        let duration = req.duration_seconds.max(0);
        let (phase, end_date) = if duration == 0 {
            (RestPhase::Expired, None)
        } else {
            (
                RestPhase::Running,
                Some(now + chrono::Duration::seconds(duration)),
            )
        };
        Self {
            id: Uuid::new_v4(),
            workout_id: req.workout_id,
            workout_name: req.workout_name,
            exercise_index: req.exercise_index,
            set_index: req.set_index,
            start_date: now,
            end_date,
            total_seconds: duration,
            remaining_seconds: if duration == 0 { 0 } else { duration },
            phase,
            last_update: now,
            current_exercise: req.current_exercise,
            next_exercise: req.next_exercise,
            heart_rate_bpm: None,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// Remaining time in whole seconds at `now`, never negative.
    ///
    /// Derived from `end_date` while running; the stored delta while
    /// paused; zero once expired or completed.
    pub fn remaining_at(&self, now: DateTime<Utc>) -> i64 {
        match self.phase {
            RestPhase::Running => self
                .end_date
                .map(|end| (end - now).num_seconds().max(0))
                .unwrap_or(0),
            RestPhase::Paused => self.remaining_seconds.max(0),
            RestPhase::Expired | RestPhase::Completed => 0,
        }
    }

    /// Elapsed fraction at `now`, 0.0..=1.0.
    pub fn progress_at(&self, now: DateTime<Utc>) -> f64 {
        if self.total_seconds <= 0 {
            return 1.0;
        }
        let elapsed = self.total_seconds - self.remaining_at(now);
        (elapsed as f64 / self.total_seconds as f64).clamp(0.0, 1.0)
    }

    /// Whether the rest period is still counting (running or paused).
    pub fn is_active(&self) -> bool {
        matches!(self.phase, RestPhase::Running | RestPhase::Paused)
    }

    /// Seconds since the last mutation.
    pub fn age_at(&self, now: DateTime<Utc>) -> i64 {
        (now - self.last_update).num_seconds()
    }

    /// Logical consistency check, used before reinstating recovered state.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        if self.total_seconds <= 0 {
            return false;
        }
        if self.remaining_at(now) > self.total_seconds {
            return false;
        }
        if let Some(bpm) = self.heart_rate_bpm {
            if !(HEART_RATE_MIN..=HEART_RATE_MAX).contains(&bpm) {
                return false;
            }
        }
        match self.phase {
            RestPhase::Running => match self.end_date {
                // A running end_date further out than the total duration
                // (plus skew) cannot have been produced by this manager.
                Some(end) => {
                    (end - now).num_seconds() <= self.total_seconds + CLOCK_SKEW_TOLERANCE_SECS
                }
                None => false,
            },
            _ => self.end_date.is_none(),
        }
    }

    // ── Snapshot builders ────────────────────────────────────────────
    //
    // Each returns the next snapshot; the manager decides whether the
    // transition is permitted before calling.

    /// Freeze the countdown: clears `end_date`, stores the remaining delta.
    pub fn freeze(&self, now: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        next.remaining_seconds = self.remaining_at(now);
        next.end_date = None;
        next.phase = RestPhase::Paused;
        next.last_update = now;
        next
    }

    /// Re-arm a paused countdown: `end_date = now + remaining`.
    pub fn rearm(&self, now: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        let remaining = self.remaining_at(now);
        next.end_date = Some(now + chrono::Duration::seconds(remaining));
        next.remaining_seconds = remaining;
        next.phase = RestPhase::Running;
        next.last_update = now;
        next
    }

    /// Rewrite the countdown to `remaining` seconds (clamped to >= 0),
    /// raising `total_seconds` to cover it. Draining to zero forces
    /// `Expired`; otherwise the phase is preserved and a running timer gets
    /// a recomputed `end_date`.
    pub fn with_remaining(
        &self,
        remaining: i64,
        total: Option<i64>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut next = self.clone();
        let remaining = remaining.max(0);
        next.total_seconds = total.unwrap_or(self.total_seconds).max(remaining);
        next.remaining_seconds = remaining;
        next.last_update = now;
        if remaining == 0 {
            next.phase = RestPhase::Expired;
            next.end_date = None;
        } else if self.phase == RestPhase::Running {
            next.end_date = Some(now + chrono::Duration::seconds(remaining));
        }
        next
    }

    /// Transition to `Expired`.
    pub fn expire(&self, now: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        next.phase = RestPhase::Expired;
        next.end_date = None;
        next.remaining_seconds = 0;
        next.last_update = now;
        next
    }

    /// Transition to `Completed` (acknowledged).
    pub fn complete(&self, now: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        next.phase = RestPhase::Completed;
        next.end_date = None;
        next.remaining_seconds = 0;
        next.last_update = now;
        next
    }

    /// Record an applied heart rate sample.
    pub fn with_heart_rate(&self, bpm: u32, now: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        next.heart_rate_bpm = Some(bpm);
        next.last_update = now;
        next
    }
}
