mod config;
mod state_store;

pub use config::{Config, NotificationsConfig, RestConfig};
pub use state_store::{StateStore, STORAGE_KEY};

use std::path::PathBuf;

/// Returns `~/.config/liftroom[-dev]/` based on LIFTROOM_ENV.
///
/// Set LIFTROOM_ENV=dev to use the development data directory.
///
/// # Errors
/// Returns an error if the home directory cannot be determined or if
/// creating the config directory fails.
pub fn data_dir() -> Result<PathBuf, Box<dyn std::error::Error>> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("LIFTROOM_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("liftroom-dev")
    } else {
        base_dir.join("liftroom")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
