//! Rest timer coordinator.
//!
//! Single source of truth for the rest period between exercise sets. The
//! coordinator owns the one current `RestTimerState`, applies every
//! mutation transactionally (update, persist, reconfigure timer, fan out),
//! and recovers persisted state after a process restart.
//!
//! ## Architecture
//!
//! ```text
//! RestTimerHandle ──commands──▶ coordinator task (single writer)
//!                                   │
//!                   ┌───────────────┼──────────────┬───────────┐
//!                   ▼               ▼              ▼           ▼
//!              TimerEngine     StateStore    live status   scheduled
//!              (one-shot)      (sync write)  / overlay /   alert
//!                                            cues (async, isolated)
//! ```
//!
//! State mutations execute only on the coordinator task: the public handle,
//! the timer engine's fire callback, and the post-acknowledgment cleanup
//! all re-enter through the same command queue. Channel notifications are
//! dispatched fire-and-forget with a snapshot and can never mutate state.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::channels::{expiry_alert_body, expiry_alert_title, LiveStatusView, RestTimerChannels};
use crate::error::ValidationError;
use crate::events::Event;
use crate::storage::{NotificationsConfig, StateStore};
use crate::timer::TimerEngine;

use super::state::{RestPhase, RestTimerState, StartRest, HEART_RATE_MAX, HEART_RATE_MIN};

/// Persisted state older than this is never resumable.
const MAX_STATE_AGE_SECS: i64 = 24 * 3600;

/// Minimum interval between applied heart rate samples; samples inside the
/// window are coalesced by dropping them.
const HEART_RATE_THROTTLE: Duration = Duration::from_secs(5);

/// Delay between acknowledgment and state cleanup, so UI can animate out.
const COMPLETED_GRACE: Duration = Duration::from_millis(500);

enum Command {
    Start {
        req: StartRest,
        ack: oneshot::Sender<()>,
    },
    Pause {
        ack: oneshot::Sender<()>,
    },
    Resume {
        ack: oneshot::Sender<()>,
    },
    Add {
        delta_seconds: i64,
        ack: oneshot::Sender<()>,
    },
    Set {
        remaining_seconds: i64,
        total_seconds: Option<i64>,
        ack: oneshot::Sender<()>,
    },
    Acknowledge {
        ack: oneshot::Sender<()>,
    },
    Cancel {
        ack: oneshot::Sender<()>,
    },
    HeartRate {
        bpm: u32,
        ack: oneshot::Sender<()>,
    },
    Restore {
        ack: oneshot::Sender<()>,
    },
    SetForegrounded {
        foregrounded: bool,
        ack: oneshot::Sender<()>,
    },
    SetPreferences {
        prefs: NotificationsConfig,
        ack: oneshot::Sender<()>,
    },
    Snapshot {
        reply: oneshot::Sender<Option<RestTimerState>>,
    },
    /// Re-entry from the timer engine's fire callback.
    TimerFired { state_id: Uuid },
    /// Re-entry from the post-acknowledgment grace period.
    FinalizeCompleted { state_id: Uuid },
    Shutdown {
        ack: oneshot::Sender<()>,
    },
}

/// Spawns the rest timer coordinator.
pub struct RestTimerManager;

impl RestTimerManager {
    /// Spawn the coordinator task and return a handle to it.
    ///
    /// Must be called within a tokio runtime. The coordinator runs until
    /// `shutdown` is called on a handle.
    pub fn spawn(
        store: StateStore,
        channels: RestTimerChannels,
        prefs: NotificationsConfig,
    ) -> RestTimerHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(64);
        let coordinator = Coordinator {
            state: None,
            store,
            engine: TimerEngine::new(),
            channels,
            prefs,
            foregrounded: true,
            last_heart_rate_applied: None,
            events: events.clone(),
            tx: tx.clone(),
        };
        tokio::spawn(coordinator.run(rx));
        RestTimerHandle { tx, events }
    }
}

/// Clonable handle to the coordinator.
///
/// Mutators mirror the original manager API: they never return errors to
/// the caller -- invalid requests are rejected inside the coordinator with
/// a logged warning and no state change.
#[derive(Clone)]
pub struct RestTimerHandle {
    tx: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<Event>,
}

impl RestTimerHandle {
    /// Start a new rest period, unconditionally replacing any existing one.
    pub async fn start_rest(&self, req: StartRest) {
        self.call(|ack| Command::Start { req, ack }).await;
    }

    /// Freeze the countdown. No-op unless running.
    pub async fn pause_rest(&self) {
        self.call(|ack| Command::Pause { ack }).await;
    }

    /// Re-arm a paused countdown. No-op unless paused with time remaining.
    pub async fn resume_rest(&self) {
        self.call(|ack| Command::Resume { ack }).await;
    }

    /// Adjust remaining time by `delta_seconds` (may be negative).
    pub async fn add_rest(&self, delta_seconds: i64) {
        self.call(|ack| Command::Add { delta_seconds, ack }).await;
    }

    /// Rewrite remaining (and optionally total) time.
    pub async fn set_rest(&self, remaining_seconds: i64, total_seconds: Option<i64>) {
        self.call(|ack| Command::Set {
            remaining_seconds,
            total_seconds,
            ack,
        })
        .await;
    }

    /// Acknowledge an expired rest period. No-op unless expired.
    pub async fn acknowledge_expired(&self) {
        self.call(|ack| Command::Acknowledge { ack }).await;
    }

    /// Clear any rest period. Idempotent.
    pub async fn cancel_rest(&self) {
        self.call(|ack| Command::Cancel { ack }).await;
    }

    /// Push an externally sampled heart rate in BPM.
    pub async fn update_heart_rate(&self, bpm: u32) {
        self.call(|ack| Command::HeartRate { bpm, ack }).await;
    }

    /// Reinstate persisted state after a process restart.
    pub async fn restore_state(&self) {
        self.call(|ack| Command::Restore { ack }).await;
    }

    /// Host application lifecycle input; gates the in-app overlay.
    pub async fn set_foregrounded(&self, foregrounded: bool) {
        self.call(|ack| Command::SetForegrounded { foregrounded, ack })
            .await;
    }

    /// Replace the channel toggles.
    pub async fn set_preferences(&self, prefs: NotificationsConfig) {
        self.call(|ack| Command::SetPreferences { prefs, ack }).await;
    }

    /// Snapshot of the current state, `None` when no rest period exists.
    pub async fn current_state(&self) -> Option<RestTimerState> {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Command::Snapshot { reply }).is_err() {
            warn!("rest timer coordinator is gone");
            return None;
        }
        rx.await.unwrap_or(None)
    }

    /// Subscribe to committed state-change events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Stop the coordinator task. Pending channel notifications still run.
    pub async fn shutdown(&self) {
        self.call(|ack| Command::Shutdown { ack }).await;
    }

    async fn call(&self, make: impl FnOnce(oneshot::Sender<()>) -> Command) {
        let (ack, done) = oneshot::channel();
        if self.tx.send(make(ack)).is_err() {
            warn!("rest timer coordinator is gone");
            return;
        }
        let _ = done.await;
    }
}

struct Coordinator {
    /// The single current rest period, `None` when absent.
    state: Option<RestTimerState>,
    store: StateStore,
    engine: TimerEngine,
    channels: RestTimerChannels,
    prefs: NotificationsConfig,
    foregrounded: bool,
    last_heart_rate_applied: Option<Instant>,
    events: broadcast::Sender<Event>,
    /// Re-entry sender for the timer callback and the cleanup task.
    tx: mpsc::UnboundedSender<Command>,
}

impl Coordinator {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        info!("rest timer coordinator started");
        while let Some(cmd) = rx.recv().await {
            if self.handle(cmd) {
                break;
            }
        }
        self.engine.stop();
        info!("rest timer coordinator stopped");
    }

    /// Dispatch one command. Returns true on shutdown.
    fn handle(&mut self, cmd: Command) -> bool {
        let now = Utc::now();
        match cmd {
            Command::Start { req, ack } => {
                self.handle_start(req, now);
                let _ = ack.send(());
            }
            Command::Pause { ack } => {
                self.handle_pause(now);
                let _ = ack.send(());
            }
            Command::Resume { ack } => {
                self.handle_resume(now);
                let _ = ack.send(());
            }
            Command::Add { delta_seconds, ack } => {
                self.handle_add(delta_seconds, now);
                let _ = ack.send(());
            }
            Command::Set {
                remaining_seconds,
                total_seconds,
                ack,
            } => {
                self.handle_set(remaining_seconds, total_seconds, now);
                let _ = ack.send(());
            }
            Command::Acknowledge { ack } => {
                self.handle_acknowledge(now);
                let _ = ack.send(());
            }
            Command::Cancel { ack } => {
                self.handle_cancel(now);
                let _ = ack.send(());
            }
            Command::HeartRate { bpm, ack } => {
                self.handle_heart_rate(bpm, now);
                let _ = ack.send(());
            }
            Command::Restore { ack } => {
                self.handle_restore(now);
                let _ = ack.send(());
            }
            Command::SetForegrounded { foregrounded, ack } => {
                self.foregrounded = foregrounded;
                let _ = ack.send(());
            }
            Command::SetPreferences { prefs, ack } => {
                self.prefs = prefs;
                let _ = ack.send(());
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.state.clone());
            }
            Command::TimerFired { state_id } => self.handle_timer_fired(state_id, now),
            Command::FinalizeCompleted { state_id } => self.handle_finalize(state_id, now),
            Command::Shutdown { ack } => {
                let _ = ack.send(());
                return true;
            }
        }
        false
    }

    // ── Command handlers ─────────────────────────────────────────────

    fn handle_start(&mut self, req: StartRest, now: DateTime<Utc>) {
        info!(
            workout = %req.workout_name,
            duration = req.duration_seconds,
            "starting rest timer"
        );
        let state = RestTimerState::begin(req, now);
        let started = Event::RestStarted {
            state_id: state.id,
            workout_name: state.workout_name.clone(),
            duration_secs: state.total_seconds,
            at: now,
        };
        let expired = self.commit(Some(state), now);
        self.emit(started);
        if expired {
            self.on_expired(now);
        }
    }

    fn handle_pause(&mut self, now: DateTime<Utc>) {
        let Some(state) = &self.state else {
            warn!("cannot pause: no active rest timer");
            return;
        };
        if state.phase != RestPhase::Running {
            warn!(phase = ?state.phase, "cannot pause: timer not running");
            return;
        }
        info!("pausing rest timer");
        let next = state.freeze(now);
        let event = Event::RestPaused {
            state_id: next.id,
            remaining_secs: next.remaining_seconds,
            at: now,
        };
        self.commit(Some(next), now);
        self.emit(event);
    }

    fn handle_resume(&mut self, now: DateTime<Utc>) {
        let Some(state) = &self.state else {
            warn!("cannot resume: no active rest timer");
            return;
        };
        if state.phase != RestPhase::Paused || state.remaining_at(now) == 0 {
            warn!(phase = ?state.phase, "cannot resume: timer not paused with time left");
            return;
        }
        info!("resuming rest timer");
        let next = state.rearm(now);
        let event = Event::RestResumed {
            state_id: next.id,
            remaining_secs: next.remaining_seconds,
            at: now,
        };
        self.commit(Some(next), now);
        self.emit(event);
    }

    fn handle_add(&mut self, delta_seconds: i64, now: DateTime<Utc>) {
        let Some(state) = &self.state else {
            warn!("cannot adjust rest: no active rest timer");
            return;
        };
        if !state.is_active() {
            warn!(phase = ?state.phase, "cannot adjust rest: timer already finished");
            return;
        }
        let remaining = state.remaining_at(now).saturating_add(delta_seconds);
        let next = state.with_remaining(remaining, None, now);
        info!(
            delta = delta_seconds,
            remaining = next.remaining_seconds,
            "adjusted rest timer"
        );
        self.adjust(next, now);
    }

    fn handle_set(&mut self, remaining_seconds: i64, total_seconds: Option<i64>, now: DateTime<Utc>) {
        let Some(state) = &self.state else {
            warn!("cannot set rest: no active rest timer");
            return;
        };
        if !state.is_active() {
            warn!(phase = ?state.phase, "cannot set rest: timer already finished");
            return;
        }
        let next = state.with_remaining(remaining_seconds, total_seconds, now);
        info!(
            remaining = next.remaining_seconds,
            total = next.total_seconds,
            "set rest timer"
        );
        self.adjust(next, now);
    }

    /// Shared tail of add/set: commit, emit, fan out on forced expiry.
    fn adjust(&mut self, next: RestTimerState, now: DateTime<Utc>) {
        let event = Event::RestAdjusted {
            state_id: next.id,
            remaining_secs: next.remaining_seconds,
            total_secs: next.total_seconds,
            at: now,
        };
        let expired = self.commit(Some(next), now);
        self.emit(event);
        if expired {
            self.on_expired(now);
        }
    }

    fn handle_acknowledge(&mut self, now: DateTime<Utc>) {
        let Some(state) = &self.state else {
            warn!("cannot acknowledge: no active rest timer");
            return;
        };
        if state.phase != RestPhase::Expired {
            warn!(phase = ?state.phase, "cannot acknowledge: timer not expired");
            return;
        }
        info!("rest timer acknowledged");
        let next = state.complete(now);
        let state_id = next.id;
        let event = Event::RestAcknowledged { state_id, at: now };
        self.commit(Some(next), now);
        self.emit(event);

        // Clear after a short grace period so UI can animate. Keyed by the
        // state id: a new start or a cancel makes this a stale no-op.
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(COMPLETED_GRACE).await;
            let _ = tx.send(Command::FinalizeCompleted { state_id });
        });
    }

    fn handle_cancel(&mut self, now: DateTime<Utc>) {
        info!("rest timer cancelled");
        let had_state = self.state.is_some();
        self.commit(None, now);
        if had_state {
            self.emit(Event::RestCleared { at: now });
        }
    }

    fn handle_heart_rate(&mut self, bpm: u32, now: DateTime<Utc>) {
        let Some(state) = &self.state else {
            warn!("heart rate update with no active rest timer");
            return;
        };
        if !(HEART_RATE_MIN..=HEART_RATE_MAX).contains(&bpm) {
            let err = ValidationError::OutOfRange {
                field: "heart_rate_bpm",
                value: bpm as i64,
                min: HEART_RATE_MIN as i64,
                max: HEART_RATE_MAX as i64,
            };
            warn!("rejected heart rate sample: {err}");
            return;
        }
        if let Some(last) = self.last_heart_rate_applied {
            if last.elapsed() < HEART_RATE_THROTTLE {
                debug!(bpm, "heart rate sample coalesced by throttle");
                return;
            }
        }
        let next = state.with_heart_rate(bpm, now);
        let event = Event::HeartRateUpdated {
            state_id: next.id,
            bpm,
            at: now,
        };
        self.last_heart_rate_applied = Some(Instant::now());
        self.commit(Some(next), now);
        self.emit(event);
        debug!(bpm, "heart rate updated");
    }

    fn handle_timer_fired(&mut self, state_id: Uuid, now: DateTime<Utc>) {
        let Some(state) = &self.state else {
            debug!("timer fired with no current state, ignoring");
            return;
        };
        if state.id != state_id || state.phase != RestPhase::Running {
            debug!("stale timer fire, ignoring");
            return;
        }
        info!("rest timer expired");
        let next = state.expire(now);
        let expired = self.commit(Some(next), now);
        if expired {
            self.on_expired(now);
        }
    }

    fn handle_finalize(&mut self, state_id: Uuid, now: DateTime<Utc>) {
        let is_target = matches!(
            &self.state,
            Some(state) if state.id == state_id && state.phase == RestPhase::Completed
        );
        if !is_target {
            debug!("stale completion cleanup, ignoring");
            return;
        }
        debug!("clearing completed rest timer state");
        self.commit(None, now);
        self.emit(Event::RestCleared { at: now });
    }

    fn handle_restore(&mut self, now: DateTime<Utc>) {
        let loaded = match self.store.load() {
            Ok(Some(state)) => state,
            Ok(None) => {
                info!("no persisted rest timer state");
                return;
            }
            Err(e) => {
                warn!("discarding unreadable rest timer state: {e}");
                self.clear_storage();
                return;
            }
        };

        let age = loaded.age_at(now);
        if age > MAX_STATE_AGE_SECS {
            warn!(age_secs = age, "discarding stale rest timer state");
            self.clear_storage();
            return;
        }
        if !loaded.is_valid_at(now) {
            let err = ValidationError::InvalidState(format!(
                "persisted state {} failed consistency checks",
                loaded.id
            ));
            warn!("discarding rest timer state: {err}");
            self.clear_storage();
            return;
        }
        if loaded.phase == RestPhase::Completed {
            // Crash landed inside the post-acknowledgment grace window;
            // there is nothing left to resume.
            info!("persisted rest timer was already completed, clearing");
            self.clear_storage();
            return;
        }

        let mut state = loaded;
        if state.phase == RestPhase::Running {
            if let Some(end) = state.end_date {
                if end <= now {
                    info!("rest timer expired while process was down");
                    state = state.expire(now);
                }
            }
        }

        let event = Event::RestRestored {
            state_id: state.id,
            phase: state.phase,
            remaining_secs: state.remaining_at(now),
            at: now,
        };
        info!(
            phase = ?state.phase,
            remaining = state.remaining_at(now),
            "restored rest timer state"
        );
        let expired = self.commit(Some(state), now);
        self.emit(event);
        if expired {
            self.on_expired(now);
        }
    }

    // ── Transactional core ───────────────────────────────────────────

    /// The only place `self.state` changes. Updates memory, persists
    /// synchronously, reconfigures the timer engine, then dispatches the
    /// channel fan-out. Returns whether this commit transitioned into
    /// `Expired` so the caller can trigger the expiration fan-out.
    fn commit(&mut self, next: Option<RestTimerState>, now: DateTime<Utc>) -> bool {
        let old = self.state.take();
        self.state = next;

        // Persist before any collaborator can observe the change. A write
        // failure leaves the in-memory state authoritative for this
        // process; recovery is best-effort.
        let persisted = match &self.state {
            Some(state) => self.store.save(state),
            None => self.store.clear(),
        };
        if let Err(e) = persisted {
            error!("failed to persist rest timer state: {e}");
        }

        self.reconfigure_engine();
        self.notify_channels(old.as_ref(), now);

        let old_phase = old.as_ref().map(|s| s.phase);
        let new_phase = self.state.as_ref().map(|s| s.phase);
        debug!(?old_phase, ?new_phase, "rest timer transition committed");

        new_phase == Some(RestPhase::Expired) && old_phase != Some(RestPhase::Expired)
    }

    /// Arm the one-shot engine iff the committed state is running.
    fn reconfigure_engine(&mut self) {
        match &self.state {
            Some(state) if state.phase == RestPhase::Running => {
                if let Some(end) = state.end_date {
                    let tx = self.tx.clone();
                    let state_id = state.id;
                    self.engine.start(end, move || {
                        let _ = tx.send(Command::TimerFired { state_id });
                    });
                }
            }
            _ => self.engine.stop(),
        }
    }

    /// Fan the committed state out to the steady-state channels. Each
    /// notification runs as its own task; failures are logged and isolated.
    /// Disabled channels are skipped, not attempted-then-ignored.
    fn notify_channels(&self, old: Option<&RestTimerState>, now: DateTime<Utc>) {
        // Live status surface.
        if self.prefs.live_status {
            let live = self.channels.live_status.clone();
            match &self.state {
                Some(state) if state.is_active() => {
                    let view = LiveStatusView::for_state(state, now);
                    tokio::spawn(async move {
                        if let Err(e) = live.update(&view) {
                            warn!("live status update failed: {e}");
                        }
                    });
                }
                Some(state) if state.phase == RestPhase::Completed => {
                    let name = state.workout_name.clone();
                    tokio::spawn(async move {
                        if let Err(e) = live.clear(&name) {
                            warn!("live status clear failed: {e}");
                        }
                    });
                }
                // Expired is announced by the expiration fan-out.
                Some(_) => {}
                None => {
                    if let Some(old) = old {
                        let name = old.workout_name.clone();
                        tokio::spawn(async move {
                            if let Err(e) = live.clear(&name) {
                                warn!("live status clear failed: {e}");
                            }
                        });
                    }
                }
            }
        } else {
            debug!("live status channel disabled, skipping");
        }

        // Scheduled alert. Armed while running; cancelled when paused,
        // cancelled, completed or replaced; left to fire on its own once
        // expired.
        if self.prefs.scheduled_alerts {
            let alerts = self.channels.alerts.clone();
            let mut cancel_ids: Vec<Uuid> = Vec::new();
            if let Some(old) = old {
                if self.state.as_ref().map_or(true, |s| s.id != old.id) {
                    cancel_ids.push(old.id);
                }
            }
            let arm = match &self.state {
                Some(state) if state.phase == RestPhase::Running => {
                    cancel_ids.push(state.id);
                    let after = state.remaining_at(now);
                    (after > 0).then(|| {
                        (
                            state.id,
                            after,
                            expiry_alert_title().to_string(),
                            expiry_alert_body(state),
                        )
                    })
                }
                Some(state) if state.phase == RestPhase::Expired => None,
                Some(state) => {
                    cancel_ids.push(state.id);
                    None
                }
                None => None,
            };
            if !cancel_ids.is_empty() || arm.is_some() {
                tokio::spawn(async move {
                    for id in cancel_ids {
                        if let Err(e) = alerts.cancel_scheduled(id) {
                            warn!("alert cancel failed: {e}");
                        }
                    }
                    if let Some((id, after, title, body)) = arm {
                        if let Err(e) = alerts.schedule(after, &title, &body, id) {
                            warn!("alert scheduling failed: {e}");
                        }
                    }
                });
            }
        } else {
            debug!("scheduled alerts disabled, skipping");
        }
    }

    /// Expiration fan-out: live status alert, haptic and audio cues, and
    /// the in-app overlay when the host is foregrounded and the user has
    /// it enabled. The scheduled alert is not re-triggered here -- it was
    /// armed at start/resume and fires independently of this process.
    fn on_expired(&self, now: DateTime<Utc>) {
        let Some(state) = &self.state else { return };
        info!("triggering rest expiration fan-out");

        self.emit(Event::RestExpired {
            state_id: state.id,
            workout_name: state.workout_name.clone(),
            at: now,
        });

        if self.prefs.live_status {
            let live = self.channels.live_status.clone();
            let name = state.workout_name.clone();
            tokio::spawn(async move {
                if let Err(e) = live.show_expired(&name) {
                    warn!("live status expiry alert failed: {e}");
                }
            });
        }

        let cues = self.channels.cues.clone();
        tokio::spawn(async move {
            if let Err(e) = cues.haptic() {
                warn!("haptic cue failed: {e}");
            }
            if let Err(e) = cues.audio() {
                warn!("audio cue failed: {e}");
            }
        });

        if self.foregrounded && self.prefs.in_app_overlay {
            if let Some(overlay) = self.channels.overlay.clone() {
                let snapshot = state.clone();
                tokio::spawn(async move {
                    if let Err(e) = overlay.show_expired_overlay(&snapshot) {
                        warn!("expiry overlay failed: {e}");
                    }
                });
            }
        } else {
            debug!(
                foregrounded = self.foregrounded,
                enabled = self.prefs.in_app_overlay,
                "skipping in-app overlay"
            );
        }
    }

    fn clear_storage(&self) {
        if let Err(e) = self.store.clear() {
            error!("failed to clear rest timer storage: {e}");
        }
    }

    fn emit(&self, event: Event) {
        // Err only means nobody is listening right now.
        let _ = self.events.send(event);
    }
}
