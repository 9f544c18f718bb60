//! Error kinds surfaced by the refresh session.

use std::path::PathBuf;

/// Errors raised by window lookup, capture, input injection and session setup.
///
/// `Cancelled` is returned by input actions interrupted by the session's
/// cancellation signal; the state machine turns it into a cancelled stop.
///
/// A template score below the confidence threshold is not an error; the
/// matcher reports it as `None`.
#[derive(Debug, thiserror::Error)]
pub enum RefresherError {
    #[error("Could not find a window titled \"{0}\". Is the game running?")]
    WindowNotFound(String),
    #[error("Screen capture failed: {0}")]
    Capture(String),
    #[error("Input injection failed: {0}")]
    InputInjection(String),
    #[error("Failed to load item icon {path}: {source}")]
    TemplateLoad {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("Failed to write refresh history: {0}")]
    History(String),
    #[error("Session setup failed: {0}")]
    Setup(String),
    #[error("Cancelled")]
    Cancelled,
    #[error("{0} is not supported on this platform")]
    Unsupported(&'static str),
}

pub type Result<T> = std::result::Result<T, RefresherError>;
