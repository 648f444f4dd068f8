//! Errors raised while building or validating model values.

/// Errors that can occur when working with media model types.
#[derive(Debug, thiserror::Error)]
pub enum MediaModelError {
    #[error("Invalid cue {id}: {message}")]
    InvalidCue { id: u32, message: String },

    #[error("Invalid color {value:?}: expected #rgb, #rrggbb or #rrggbbaa")]
    InvalidColor { value: String },

    #[error("Invalid caption style: {message}")]
    InvalidStyle { message: String },

    #[error("Invalid audio buffer: {message}")]
    InvalidBuffer { message: String },

    #[error("Invalid range: {message}")]
    InvalidRange { message: String },

    #[error("Parse error: {0}")]
    ParseError(#[from] serde_json::Error),
}
