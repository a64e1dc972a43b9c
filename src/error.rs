//! Error types for Moodfeed
//!
//! All errors in the crate are converted to `AppError`. Nothing here
//! terminates a session: callers turn an error into a transient [`Notice`]
//! via [`AppError::notice`] and keep going.

use serde::Serialize;
use thiserror::Error;

/// Application-wide error type
#[derive(Debug, Error)]
pub enum AppError {
    /// The action needs a signed-in viewer
    #[error("Sign in required")]
    Unauthenticated,

    /// The viewer is signed in but does not own the resource
    #[error("Access denied")]
    Forbidden,

    /// Resource not found
    #[error("Resource not found")]
    NotFound,

    /// Rejected before any remote call
    #[error("Validation error: {0}")]
    Validation(String),

    /// A toggle on the same subject has not completed yet
    #[error("Update already in progress for {0}")]
    ToggleInFlight(String),

    /// The persistence or identity collaborator answered with an error
    #[error("Remote error: {0}")]
    Remote(String),

    /// The collaborator could not be reached
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// A row could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Blob storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Media element failed to start
    #[error("Playback error: {0}")]
    Playback(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

/// How loudly a notice should be shown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Error,
}

/// Transient, user-visible message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub severity: Severity,
    pub title: String,
    pub description: String,
}

impl Notice {
    pub fn info(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            severity: Severity::Info,
            title: title.into(),
            description: description.into(),
        }
    }

    pub fn error(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            title: title.into(),
            description: description.into(),
        }
    }

    /// Some rows could be shown, but with placeholder data
    pub fn partial_data(description: impl Into<String>) -> Self {
        Self::error("Some details are unavailable", description)
    }
}

impl AppError {
    /// Metric label for this error
    pub fn error_type(&self) -> &'static str {
        match self {
            AppError::Unauthenticated => "unauthenticated",
            AppError::Forbidden => "forbidden",
            AppError::NotFound => "not_found",
            AppError::Validation(_) => "validation",
            AppError::ToggleInFlight(_) => "in_flight",
            AppError::Remote(_) => "remote",
            AppError::HttpClient(_) => "http_client",
            AppError::Serialization(_) => "serialization",
            AppError::Storage(_) => "storage",
            AppError::Playback(_) => "playback",
            AppError::Config(_) => "config",
            AppError::Internal(_) => "internal",
        }
    }

    /// True for failures of a collaborator rather than of the request
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            AppError::Remote(_)
                | AppError::HttpClient(_)
                | AppError::Serialization(_)
                | AppError::Storage(_)
        )
    }

    /// Convert error to a user-facing notice
    ///
    /// Maps each variant to a title and description, and records the
    /// error metric.
    pub fn notice(&self) -> Notice {
        let notice = match self {
            AppError::Unauthenticated => {
                Notice::error("Sign in required", "Please sign in to continue")
            }
            AppError::Forbidden => {
                Notice::error("Not allowed", "You can only change your own content")
            }
            AppError::NotFound => Notice::error("Not found", "It may have been removed"),
            AppError::Validation(msg) => Notice::error("Check your input", msg.clone()),
            AppError::ToggleInFlight(_) => {
                Notice::info("Please wait", "Your previous change is still being saved")
            }
            AppError::Playback(_) => Notice::error("Error", "Failed to play audio"),
            AppError::Config(msg) => Notice::error("Configuration error", msg.clone()),
            AppError::Remote(_)
            | AppError::HttpClient(_)
            | AppError::Serialization(_)
            | AppError::Storage(_)
            | AppError::Internal(_) => {
                Notice::error("Error", "Something went wrong. Please try again.")
            }
        };

        use crate::metrics::ERRORS_TOTAL;
        ERRORS_TOTAL.with_label_values(&[self.error_type()]).inc();

        notice
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
