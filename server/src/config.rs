//! Validation of the game rules supplied at startup.

use shared::{Alphabet, GameConfig, ParseError};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid colors: {0}")]
    Colors(#[from] ParseError),
    #[error("code length must be at least 1")]
    CodeLength,
    #[error("maximum number of trials must be at least 1")]
    MaxTrials,
    #[error("maximum play time must be at least 1 second")]
    MaxPlaytime,
}

/// Builds the game rules from raw startup values.
pub fn game_config(
    colors: &str,
    code_len: usize,
    max_trials: u32,
    max_playtime: u32,
) -> Result<GameConfig, ConfigError> {
    if code_len == 0 {
        return Err(ConfigError::CodeLength);
    }
    if max_trials == 0 {
        return Err(ConfigError::MaxTrials);
    }
    if max_playtime == 0 {
        return Err(ConfigError::MaxPlaytime);
    }

    Ok(GameConfig {
        max_trials,
        max_playtime,
        alphabet: Alphabet::new(colors)?,
        code_len,
    })
}
