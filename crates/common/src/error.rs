//! Error types shared across Clipforge crates.

use std::path::PathBuf;

/// Top-level error type for Clipforge operations.
///
/// Every failure aborts the current operation; nothing is retried
/// internally. Use [`ClipforgeError::user_message`] for text meant for
/// people rather than logs.
#[derive(Debug, thiserror::Error)]
pub enum ClipforgeError {
    /// No candidate container/codec is supported by the host encoder.
    #[error("Unsupported output format: {target}")]
    UnsupportedFormat { target: String },

    /// Metadata load, seek, playback start, or decode failed.
    #[error("Source load error: {message}")]
    SourceLoad { message: String },

    /// Trim start >= end, or the range falls outside the source.
    #[error("Invalid range: {message}")]
    InvalidRange { message: String },

    /// The stream or block encoder failed mid-operation.
    #[error("Encoder failure: {message}")]
    EncoderFailure { message: String },

    /// Offline mixing or allocation failure.
    #[error("Render failure: {message}")]
    RenderFailure { message: String },

    /// The caller cancelled the job.
    #[error("Operation cancelled")]
    Cancelled,

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using ClipforgeError.
pub type ClipforgeResult<T> = Result<T, ClipforgeError>;

impl ClipforgeError {
    pub fn unsupported_format(target: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            target: target.into(),
        }
    }

    pub fn source_load(msg: impl Into<String>) -> Self {
        Self::SourceLoad {
            message: msg.into(),
        }
    }

    pub fn invalid_range(msg: impl Into<String>) -> Self {
        Self::InvalidRange {
            message: msg.into(),
        }
    }

    pub fn encoder(msg: impl Into<String>) -> Self {
        Self::EncoderFailure {
            message: msg.into(),
        }
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::RenderFailure {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// One human-readable sentence describing the failure.
    ///
    /// Internal causes are kept out of this text; they belong in logs.
    pub fn user_message(&self) -> String {
        match self {
            Self::UnsupportedFormat { target } => format!(
                "This system cannot encode {target}. Try a Chromium-based browser (Chrome/Edge) \
                 or an ffmpeg build with the matching encoders."
            ),
            Self::SourceLoad { .. } => {
                "The source file could not be loaded. Check that it is a playable media file."
                    .to_string()
            }
            Self::InvalidRange { message } => format!("The selected time range is invalid: {message}."),
            Self::EncoderFailure { .. } => {
                "Encoding stopped unexpectedly. Please start the operation again.".to_string()
            }
            Self::RenderFailure { .. } => {
                "Audio rendering failed, possibly because the combined audio is too long."
                    .to_string()
            }
            Self::Cancelled => "The operation was cancelled.".to_string(),
            Self::Config { message } => format!("Invalid settings: {message}."),
            Self::FileNotFound { path } => format!("File not found: {}", path.display()),
            Self::Io(_) | Self::Json(_) | Self::Other(_) => {
                "An unexpected error occurred. Please try again.".to_string()
            }
        }
    }

    /// Whether this error should be shown as something the user can act on
    /// (change format, change range) rather than a generic failure.
    pub fn is_actionable(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedFormat { .. } | Self::InvalidRange { .. } | Self::FileNotFound { .. }
        )
    }
}
