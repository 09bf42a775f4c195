//! Cancellable one-shot countdown primitive.
//!
//! The engine arms a single timer at a wall-clock instant and invokes its
//! callback at most once per `start`. It is the only component that sleeps;
//! the rest-timer coordinator re-enters itself through its command queue
//! from the callback, so state is never mutated off the coordinator task.

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::debug;

struct ArmedTimer {
    end_date: DateTime<Utc>,
    task: JoinHandle<()>,
}

/// One-shot wall-clock timer.
///
/// `start` replaces any armed timer; `stop` is idempotent. A target instant
/// in the past fires immediately. Scheduling tolerance is whatever the
/// tokio timer wheel coalesces to (milliseconds), which is well within the
/// one-second resolution of the rest countdown.
pub struct TimerEngine {
    armed: Option<ArmedTimer>,
}

impl TimerEngine {
    pub fn new() -> Self {
        Self { armed: None }
    }

    /// Arm a one-shot timer that runs `on_fire` at `until`.
    ///
    /// Any previously armed timer is stopped first, so the callback of the
    /// old timer can never fire after this call returns.
    pub fn start<F>(&mut self, until: DateTime<Utc>, on_fire: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.stop();
        let delay = (until - Utc::now())
            .to_std()
            .unwrap_or(std::time::Duration::ZERO);
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            on_fire();
        });
        self.armed = Some(ArmedTimer {
            end_date: until,
            task,
        });
        debug!(end_date = %until, "timer armed");
    }

    /// Cancel the armed timer without firing. Safe to call when nothing is
    /// armed, and immediately after a fire.
    pub fn stop(&mut self) {
        if let Some(armed) = self.armed.take() {
            armed.task.abort();
            debug!("timer stopped");
        }
    }

    /// Whether a timer is armed and has not yet fired.
    pub fn is_armed(&self) -> bool {
        self.armed
            .as_ref()
            .map(|a| !a.task.is_finished())
            .unwrap_or(false)
    }

    /// Target instant of the armed timer, if any.
    pub fn end_date(&self) -> Option<DateTime<Utc>> {
        self.armed.as_ref().map(|a| a.end_date)
    }
}

impl Default for TimerEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TimerEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    #[tokio::test]
    async fn fires_once_at_target() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut engine = TimerEngine::new();
        let until = Utc::now() + chrono::Duration::milliseconds(50);
        engine.start(until, move || {
            let _ = tx.send(());
        });
        assert!(engine.is_armed());
        assert_eq!(engine.end_date(), Some(until));

        timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timer should fire")
            .expect("callback sends once");
        // Sender dropped after the single fire, so the channel closes.
        assert!(timeout(Duration::from_millis(200), rx.recv())
            .await
            .expect("channel should close")
            .is_none());
    }

    #[tokio::test]
    async fn stop_before_fire_never_invokes_callback() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut engine = TimerEngine::new();
        engine.start(Utc::now() + chrono::Duration::milliseconds(100), move || {
            let _ = tx.send(());
        });
        engine.stop();
        assert!(!engine.is_armed());
        assert_eq!(engine.end_date(), None);

        // The aborted task drops the sender without sending.
        assert!(timeout(Duration::from_millis(400), rx.recv())
            .await
            .expect("channel should close without a fire")
            .is_none());
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let mut engine = TimerEngine::new();
        engine.stop();
        engine.stop();
        assert!(!engine.is_armed());
    }

    #[tokio::test]
    async fn start_replaces_armed_timer() {
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        let mut engine = TimerEngine::new();
        engine.start(Utc::now() + chrono::Duration::milliseconds(60), move || {
            let _ = tx_a.send(());
        });
        engine.start(Utc::now() + chrono::Duration::milliseconds(60), move || {
            let _ = tx_b.send(());
        });

        assert!(timeout(Duration::from_millis(500), rx_a.recv())
            .await
            .expect("first timer should be cancelled")
            .is_none());
        timeout(Duration::from_secs(2), rx_b.recv())
            .await
            .expect("replacement timer should fire")
            .expect("callback sends");
    }

    #[tokio::test]
    async fn past_target_fires_immediately() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut engine = TimerEngine::new();
        engine.start(Utc::now() - chrono::Duration::seconds(5), move || {
            let _ = tx.send(());
        });
        timeout(Duration::from_millis(500), rx.recv())
            .await
            .expect("past target should fire immediately")
            .expect("callback sends");
    }

    #[tokio::test]
    async fn restartable_after_fire() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut engine = TimerEngine::new();
        let tx_first = tx.clone();
        engine.start(Utc::now(), move || {
            let _ = tx_first.send(1);
        });
        assert_eq!(
            timeout(Duration::from_secs(2), rx.recv()).await.unwrap(),
            Some(1)
        );

        engine.start(Utc::now() + chrono::Duration::milliseconds(30), move || {
            let _ = tx.send(2);
        });
        assert_eq!(
            timeout(Duration::from_secs(2), rx.recv()).await.unwrap(),
            Some(2)
        );
    }
}
