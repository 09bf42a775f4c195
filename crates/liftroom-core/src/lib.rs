//! # Liftroom Core Library
//!
//! This library provides the rest-timer coordination core for the Liftroom
//! workout tracker. All operations are available via a standalone CLI
//! binary, with any GUI layer being a thin shell over the same core.
//!
//! ## Architecture
//!
//! - **Rest coordinator**: a single-writer task owning the one current
//!   rest period, applying every mutation transactionally and fanning
//!   updates out to independent notification channels
//! - **Timer engine**: a cancellable one-shot that fires at a wall-clock
//!   instant and re-enters the coordinator through its command queue
//! - **Storage**: JSON-based crash-recovery record and TOML-based
//!   configuration
//! - **Channels**: narrow trait interfaces for the live status surface,
//!   scheduled alerts, in-app overlay and haptic/audio cues
//!
//! ## Key Components
//!
//! - [`RestTimerManager`] / [`RestTimerHandle`]: coordinator and its API
//! - [`TimerEngine`]: one-shot countdown primitive
//! - [`StateStore`]: persisted rest-timer record
//! - [`Config`]: application configuration management

pub mod channels;
pub mod error;
pub mod events;
pub mod rest;
pub mod storage;
pub mod timer;

pub use channels::{
    AlertScheduler, FeedbackCue, LiveStatusChannel, LiveStatusView, OverlayPresenter,
    RestTimerChannels,
};
pub use error::{ConfigError, CoreError, StorageError, ValidationError};
pub use events::Event;
pub use rest::{RestPhase, RestTimerHandle, RestTimerManager, RestTimerState, StartRest};
pub use storage::{Config, NotificationsConfig, RestConfig, StateStore};
pub use timer::TimerEngine;
