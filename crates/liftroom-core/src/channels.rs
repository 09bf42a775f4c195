//! Collaborator channel interfaces consumed by the rest-timer coordinator.
//!
//! Every channel is an injected capability behind a narrow trait. The
//! coordinator treats them as best-effort: a failing channel is logged and
//! isolated, never rolled back into the authoritative state. The live
//! status surface and the scheduled alert are deliberately separate
//! collaborators -- one is foreground-coupled, the other fires even when
//! the coordinating process is gone.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::rest::RestTimerState;

pub type ChannelResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Snapshot handed to the live status channel on every update.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveStatusView {
    pub workout_name: String,
    pub current_exercise: Option<String>,
    pub next_exercise: Option<String>,
    pub remaining_seconds: i64,
    pub total_seconds: i64,
    /// Present while the countdown is running, so the surface can render
    /// its own ticking clock without round-trips.
    pub end_date: Option<DateTime<Utc>>,
    pub heart_rate_bpm: Option<u32>,
}

impl LiveStatusView {
    pub fn for_state(state: &RestTimerState, now: DateTime<Utc>) -> Self {
        Self {
            workout_name: state.workout_name.clone(),
            current_exercise: state.current_exercise.clone(),
            next_exercise: state.next_exercise.clone(),
            remaining_seconds: state.remaining_at(now),
            total_seconds: state.total_seconds,
            end_date: state.end_date,
            heart_rate_bpm: state.heart_rate_bpm,
        }
    }
}

/// Always-visible glanceable surface showing current rest progress
/// (lock-screen / dynamic-island style widget).
pub trait LiveStatusChannel: Send + Sync {
    fn update(&self, view: &LiveStatusView) -> ChannelResult;
    fn show_expired(&self, workout_name: &str) -> ChannelResult;
    fn clear(&self, workout_name: &str) -> ChannelResult;
}

/// OS-level delayed alert, armed at start/resume. Fires independently of
/// the application lifecycle -- that is its entire purpose.
pub trait AlertScheduler: Send + Sync {
    fn schedule(
        &self,
        after_seconds: i64,
        title: &str,
        body: &str,
        correlation_id: Uuid,
    ) -> ChannelResult;
    fn cancel_scheduled(&self, correlation_id: Uuid) -> ChannelResult;
}

/// In-app expiration overlay. The coordinator does not own the presenter's
/// lifetime; the slot is nullable.
pub trait OverlayPresenter: Send + Sync {
    fn show_expired_overlay(&self, state: &RestTimerState) -> ChannelResult;
}

/// Haptic/audio feedback on expiry.
pub trait FeedbackCue: Send + Sync {
    fn haptic(&self) -> ChannelResult {
        Ok(()) // default no-op
    }
    fn audio(&self) -> ChannelResult {
        Ok(()) // default no-op
    }
}

/// Bundle of channel capabilities injected into the coordinator.
#[derive(Clone)]
pub struct RestTimerChannels {
    pub live_status: Arc<dyn LiveStatusChannel>,
    pub alerts: Arc<dyn AlertScheduler>,
    pub overlay: Option<Arc<dyn OverlayPresenter>>,
    pub cues: Arc<dyn FeedbackCue>,
}

impl Default for RestTimerChannels {
    fn default() -> Self {
        let noop = Arc::new(NoopChannel);
        Self {
            live_status: noop.clone(),
            alerts: noop.clone(),
            overlay: None,
            cues: noop,
        }
    }
}

/// Inert implementation of every channel trait.
pub struct NoopChannel;

impl LiveStatusChannel for NoopChannel {
    fn update(&self, _view: &LiveStatusView) -> ChannelResult {
        Ok(())
    }
    fn show_expired(&self, _workout_name: &str) -> ChannelResult {
        Ok(())
    }
    fn clear(&self, _workout_name: &str) -> ChannelResult {
        Ok(())
    }
}

impl AlertScheduler for NoopChannel {
    fn schedule(
        &self,
        _after_seconds: i64,
        _title: &str,
        _body: &str,
        _correlation_id: Uuid,
    ) -> ChannelResult {
        Ok(())
    }
    fn cancel_scheduled(&self, _correlation_id: Uuid) -> ChannelResult {
        Ok(())
    }
}

impl OverlayPresenter for NoopChannel {
    fn show_expired_overlay(&self, _state: &RestTimerState) -> ChannelResult {
        Ok(())
    }
}

impl FeedbackCue for NoopChannel {}

/// Title for the scheduled expiry alert.
pub fn expiry_alert_title() -> &'static str {
    "Rest over"
}

/// Body for the scheduled expiry alert, preferring the upcoming exercise.
pub fn expiry_alert_body(state: &RestTimerState) -> String {
    match state.next_exercise.as_deref().or(state.current_exercise.as_deref()) {
        Some(exercise) => format!("Up next: {exercise}"),
        None => "Time for your next set!".to_string(),
    }
}
