// ⚠️ Error taxonomy
// Only Configuration is fatal; everything else is caught at the item or run boundary.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MonitorError>;

#[derive(Debug, Error)]
pub enum MonitorError {
    /// Missing or invalid settings/files. Fatal at startup.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// HTTP failure, timeout or malformed response.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Upstream answered, but not with success.
    #[error("API error (status {status}): {message}")]
    Api { status: String, message: String },

    /// State store unreadable or unwritable.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// A single message could not be delivered.
    #[error("Notification error: {0}")]
    Notification(String),
}

impl MonitorError {
    pub fn is_configuration(&self) -> bool {
        matches!(self, MonitorError::Configuration(_))
    }
}

impl From<reqwest::Error> for MonitorError {
    fn from(err: reqwest::Error) -> Self {
        MonitorError::Transport(err.to_string())
    }
}

impl From<rusqlite::Error> for MonitorError {
    fn from(err: rusqlite::Error) -> Self {
        MonitorError::Persistence(err.to_string())
    }
}

impl From<std::io::Error> for MonitorError {
    fn from(err: std::io::Error) -> Self {
        MonitorError::Persistence(err.to_string())
    }
}

impl From<serde_json::Error> for MonitorError {
    fn from(err: serde_json::Error) -> Self {
        MonitorError::Persistence(err.to_string())
    }
}

impl From<tempfile::PersistError> for MonitorError {
    fn from(err: tempfile::PersistError) -> Self {
        MonitorError::Persistence(err.error.to_string())
    }
}
