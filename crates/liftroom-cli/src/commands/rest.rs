use clap::Subcommand;
use uuid::Uuid;

use liftroom_core::channels::{ChannelResult, RestTimerChannels};
use liftroom_core::{
    AlertScheduler, Config, Event, FeedbackCue, LiveStatusChannel, LiveStatusView,
    OverlayPresenter, RestTimerManager, RestTimerState, StartRest, StateStore,
};

#[derive(Subcommand)]
pub enum RestAction {
    /// Run a rest countdown in the foreground until acknowledged
    Run {
        /// Duration in seconds (defaults to rest.default_duration_secs)
        #[arg(long)]
        duration: Option<i64>,
        /// Workout name shown on the status surface
        #[arg(long, default_value = "Workout")]
        workout: String,
        /// Current exercise name
        #[arg(long)]
        current: Option<String>,
        /// Next exercise name
        #[arg(long)]
        next: Option<String>,
    },
    /// Print the persisted rest timer state as JSON
    Status,
    /// Clear the persisted rest timer state
    Clear,
}

/// Console-backed stand-ins for the platform notification channels.
struct ConsoleChannels;

impl LiveStatusChannel for ConsoleChannels {
    fn update(&self, view: &LiveStatusView) -> ChannelResult {
        println!(
            "[status] {}: {}s / {}s remaining",
            view.workout_name, view.remaining_seconds, view.total_seconds
        );
        Ok(())
    }
    fn show_expired(&self, workout_name: &str) -> ChannelResult {
        println!("[status] {workout_name}: rest over");
        Ok(())
    }
    fn clear(&self, workout_name: &str) -> ChannelResult {
        println!("[status] {workout_name}: cleared");
        Ok(())
    }
}

impl AlertScheduler for ConsoleChannels {
    fn schedule(
        &self,
        after_seconds: i64,
        title: &str,
        body: &str,
        _correlation_id: Uuid,
    ) -> ChannelResult {
        println!("[alert] in {after_seconds}s: {title} -- {body}");
        Ok(())
    }
    fn cancel_scheduled(&self, _correlation_id: Uuid) -> ChannelResult {
        Ok(())
    }
}

impl OverlayPresenter for ConsoleChannels {
    fn show_expired_overlay(&self, state: &RestTimerState) -> ChannelResult {
        println!("[overlay] rest over for {}", state.workout_name);
        Ok(())
    }
}

impl FeedbackCue for ConsoleChannels {
    fn audio(&self) -> ChannelResult {
        // Terminal bell stands in for the expiry sound.
        print!("\x07");
        Ok(())
    }
}

pub async fn run(action: RestAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        RestAction::Run {
            duration,
            workout,
            current,
            next,
        } => {
            let config = Config::load()?;
            let duration = duration.unwrap_or(config.rest.default_duration_secs as i64);

            let console = std::sync::Arc::new(ConsoleChannels);
            let handle = RestTimerManager::spawn(
                StateStore::open()?,
                RestTimerChannels {
                    live_status: console.clone(),
                    alerts: console.clone(),
                    overlay: Some(console.clone()),
                    cues: console,
                },
                config.notifications,
            );
            // Pick up anything a previous process left behind, then start
            // the requested countdown (replacing it).
            handle.restore_state().await;

            let mut events = handle.subscribe();
            handle
                .start_rest(StartRest {
                    workout_id: Uuid::new_v4(),
                    workout_name: workout,
                    exercise_index: 0,
                    set_index: 0,
                    duration_seconds: duration,
                    current_exercise: current,
                    next_exercise: next,
                })
                .await;

            loop {
                match events.recv().await {
                    Ok(Event::RestExpired { .. }) => {
                        handle.acknowledge_expired().await;
                    }
                    Ok(Event::RestCleared { .. }) => break,
                    Ok(_) => {}
                    Err(e) => return Err(e.into()),
                }
            }

            handle.shutdown().await;
        }
        RestAction::Status => {
            let store = StateStore::open()?;
            match store.load()? {
                Some(state) => println!("{}", serde_json::to_string_pretty(&state)?),
                None => println!("no active rest timer"),
            }
        }
        RestAction::Clear => {
            StateStore::open()?.clear()?;
            println!("rest timer state cleared");
        }
    }
    Ok(())
}
