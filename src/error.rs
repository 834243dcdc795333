//! Error types for parley.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParleyError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Credential errors
    #[error("No API key configured")]
    MissingCredential,

    #[error("Credential store error: {message}")]
    CredentialStore { message: String },

    // Audio device errors
    #[error("Audio device unavailable: {message}")]
    DeviceUnavailable { message: String },

    #[error("Audio output failed: {message}")]
    AudioOutput { message: String },

    // Remote session errors
    #[error("Connection error: {message}")]
    Connection { message: String },

    #[error("Remote session closed{}", reason_suffix(.reason))]
    RemoteClosed { reason: Option<String> },

    #[error("Failed to decode payload: {message}")]
    Decode { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

fn reason_suffix(reason: &Option<String>) -> String {
    reason
        .as_deref()
        .map(|r| format!(": {r}"))
        .unwrap_or_default()
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, ParleyError>;
