//! TOML loading for `EngineConfig`.
//!
//! `engine.toml` holds the engine knobs at the top level. Every key is
//! optional; an absent file means all defaults.
//!
//! ```toml
//! base_turn_seconds = 5.0
//! max_ticks = 100
//! outbox_cleanup_interval_ticks = 10
//! max_outbox_age_ticks = 100
//! ```

use std::io::ErrorKind;
use std::path::Path;

use tracing::{debug, info};

use lemming_contracts::{
    config::EngineConfig,
    error::{LemmingError, LemmingResult},
};

/// Loading a config type from TOML.
pub trait LoadToml: Sized {
    /// Parse `s` as TOML.
    ///
    /// Returns `LemmingError::ConfigError` if the TOML is malformed or holds
    /// an invalid value.
    fn from_toml_str(s: &str) -> LemmingResult<Self>;

    /// Read and parse the file at `path`. A missing file is an error here.
    fn from_file(path: &Path) -> LemmingResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| LemmingError::ConfigError {
            reason: format!("failed to read config file '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }
}

impl LoadToml for EngineConfig {
    fn from_toml_str(s: &str) -> LemmingResult<Self> {
        let config: EngineConfig = toml::from_str(s).map_err(|e| LemmingError::ConfigError {
            reason: format!("failed to parse engine TOML: {}", e),
        })?;
        validate(&config)?;
        Ok(config)
    }
}

/// Load `path`, or the defaults when it does not exist.
///
/// A file that exists but cannot be read or parsed is still an error.
pub fn load_or_default(path: &Path) -> LemmingResult<EngineConfig> {
    match std::fs::metadata(path) {
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!(path = %path.display(), "no engine config, using defaults");
            Ok(EngineConfig::default())
        }
        _ => {
            let config = EngineConfig::from_file(path)?;
            debug!(path = %path.display(), ?config, "engine config loaded");
            Ok(config)
        }
    }
}

/// Reject values the engine cannot run with.
pub fn validate(config: &EngineConfig) -> LemmingResult<()> {
    let reason = if config.outbox_cleanup_interval_ticks == 0 {
        Some("outbox_cleanup_interval_ticks must be at least 1".to_string())
    } else if !config.base_turn_seconds.is_finite() || config.base_turn_seconds < 0.0 {
        Some(format!("base_turn_seconds must be a non-negative number, got {}", config.base_turn_seconds))
    } else if !config.temperature.is_finite() || config.temperature < 0.0 {
        Some(format!("temperature must be a non-negative number, got {}", config.temperature))
    } else {
        None
    };

    match reason {
        Some(reason) => Err(LemmingError::ConfigError { reason }),
        None => Ok(()),
    }
}
