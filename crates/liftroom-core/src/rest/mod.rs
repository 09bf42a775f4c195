mod manager;
mod state;

pub use manager::{RestTimerHandle, RestTimerManager};
pub use state::{
    RestPhase, RestTimerState, StartRest, CLOCK_SKEW_TOLERANCE_SECS, HEART_RATE_MAX,
    HEART_RATE_MIN,
};
