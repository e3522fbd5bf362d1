// src/error.rs

//! Unified error handling for the sync application.

use std::fmt;

use thiserror::Error;

/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// Bad credentials or the identity provider rejected the login
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Too many redirects while chasing the login or a session page
    #[error("Redirect loop: exceeded {limit} redirects (last URL: {url})")]
    RedirectLoop { url: String, limit: usize },

    /// The redirect chase reached a page it could not classify
    #[error("Redirect could not be resolved: status {status}, URL {url}")]
    RedirectUnresolved { status: u16, url: String },

    /// A single course or card could not be parsed
    #[error("Parse skipped for {context}: {message}")]
    ParseSkip { context: String, message: String },

    /// The remote task no longer exists
    #[error("Task not found in sink: {task_id}")]
    SinkNotFound { task_id: String },

    /// Any other task sink failure
    #[error("Task sink error: {0}")]
    SinkApi(String),

    /// The course-work API rejected a request
    #[error("Course-work API error: {0}")]
    CourseWorkApi(String),

    /// A required user setting is absent
    #[error("Required setting '{0}' is not configured")]
    ConfigMissing(String),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Snapshot write refused because the scan shrank too much
    #[error(
        "Circuit breaker triggered: {previous_count} -> {current_count} rows ({drop_percent:.1}% drop > {threshold_percent}%)"
    )]
    CircuitBreakerTriggered {
        current_count: usize,
        previous_count: usize,
        drop_percent: f64,
        threshold_percent: u8,
    },

    /// A scan returned nothing while storage still holds rows
    #[error("Empty scan result refused over a non-empty snapshot")]
    EmptyScanResult,

    /// Scheduler setup failed
    #[error("Scheduler error: {0}")]
    Scheduler(String),
}

impl AppError {
    /// Create an authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication(message.into())
    }

    /// Create a parse-skip error with context.
    pub fn parse_skip(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::ParseSkip {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Create a task sink error.
    pub fn sink_api(message: impl fmt::Display) -> Self {
        Self::SinkApi(message.to_string())
    }

    /// Create a course-work API error.
    pub fn course_work_api(message: impl fmt::Display) -> Self {
        Self::CourseWorkApi(message.to_string())
    }

    /// Create a missing-setting error.
    pub fn config_missing(key: impl Into<String>) -> Self {
        Self::ConfigMissing(key.into())
    }

    /// Create a selector parsing error.
    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Whether this error must abort the whole run rather than one phase.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ConfigMissing(_) | Self::Config(_))
    }
}
