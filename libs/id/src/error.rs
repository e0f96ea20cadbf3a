//! Error types for ID parsing and validation.

use thiserror::Error;

/// Errors that can occur when parsing or validating IDs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    /// The ID string is empty or only whitespace.
    #[error("ID cannot be empty")]
    Empty,

    /// The ID contains a control character.
    #[error("invalid character {character:?} at byte {position}")]
    InvalidCharacter { character: char, position: usize },
}

impl IdError {
    /// Returns true if this error indicates the input was empty.
    pub fn is_empty(&self) -> bool {
        matches!(self, IdError::Empty)
    }
}
