//! Error types for stepcode

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StepcodeError {
    #[error("Nothing to play: the pattern set is empty")]
    NothingToPlay,
    #[error("Audio context not active: {0}")]
    AudioInactive(String),
}

pub type Result<T> = std::result::Result<T, StepcodeError>;
