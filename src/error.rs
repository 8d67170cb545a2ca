use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Crate-level error type for Sproutly
#[derive(Error, Debug)]
pub enum SproutlyError {
    // Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Invalid configuration file: {path}")]
    InvalidConfig { path: String },

    #[error("Output path is not writable: {path} ({reason})")]
    OutputNotWritable { path: String, reason: String },

    // Fetch errors
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Browser error: {message}")]
    Browser { message: String },

    // Export errors
    #[error("Export error: {message}")]
    Export { message: String },

    // Generic errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl SproutlyError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Create a browser error
    pub fn browser(message: impl Into<String>) -> Self {
        Self::Browser { message: message.into() }
    }

    /// Create an export error
    pub fn export(message: impl Into<String>) -> Self {
        Self::Export { message: message.into() }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Check if error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Fetch(fetch) => fetch.is_transient(),
            Self::Browser { .. } => true,

            Self::Configuration { .. }
            | Self::InvalidConfig { .. }
            | Self::OutputNotWritable { .. }
            | Self::Export { .. }
            | Self::Internal { .. } => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::Configuration { .. } | Self::InvalidConfig { .. } | Self::OutputNotWritable { .. } => {
                "configuration"
            }
            Self::Fetch(_) | Self::Browser { .. } => "network",
            Self::Export { .. } => "export",
            Self::Internal { .. } => "internal",
        }
    }
}

/// Result type alias for Sproutly
pub type SproutlyResult<T> = std::result::Result<T, SproutlyError>;

/// Failure to load a page.
///
/// Transient failures (timeouts, connection resets, 5xx, 429) are retried by
/// the retry policy; permanent failures (404, blocked, malformed URL) are
/// surfaced to the caller after a single attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Transient fetch failure for {url}: {reason}")]
    Transient { url: String, reason: String },

    #[error("Permanent fetch failure for {url}: {reason}")]
    Permanent {
        url: String,
        status: Option<u16>,
        reason: String,
    },
}

impl FetchError {
    pub fn transient(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Transient { url: url.into(), reason: reason.into() }
    }

    pub fn permanent(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Permanent { url: url.into(), status: None, reason: reason.into() }
    }

    /// Classify an HTTP status code returned for `url`.
    ///
    /// Returns `None` for success codes.
    pub fn from_status(url: impl Into<String>, status: u16) -> Option<Self> {
        let url = url.into();
        match status {
            200..=399 => None,
            408 | 425 | 429 => Some(Self::Transient {
                url,
                reason: format!("HTTP {}", status),
            }),
            500..=599 => Some(Self::Transient {
                url,
                reason: format!("HTTP {}", status),
            }),
            401 | 403 => Some(Self::Permanent {
                url,
                status: Some(status),
                reason: format!("blocked (HTTP {})", status),
            }),
            _ => Some(Self::Permanent {
                url,
                status: Some(status),
                reason: format!("HTTP {}", status),
            }),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    pub fn url(&self) -> &str {
        match self {
            Self::Transient { url, .. } | Self::Permanent { url, .. } => url,
        }
    }

    /// Suggested minimum pause before retrying a transient failure
    pub fn retry_hint(&self) -> Option<Duration> {
        match self {
            Self::Transient { reason, .. } if reason.contains("429") => Some(Duration::from_secs(5)),
            Self::Transient { .. } => Some(Duration::ZERO),
            Self::Permanent { .. } => None,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        let url = err.url().map(|u| u.to_string()).unwrap_or_default();

        if let Some(status) = err.status() {
            if let Some(classified) = Self::from_status(url.clone(), status.as_u16()) {
                return classified;
            }
        }

        if err.is_builder() {
            Self::permanent(url, err.to_string())
        } else {
            // timeouts, connect failures, truncated bodies
            Self::transient(url, err.to_string())
        }
    }
}

/// A soft failure while extracting one item from a page.
///
/// The item is skipped and the page continues.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ParseWarning {
    pub page: String,
    pub index: usize,
    pub reason: String,
}

impl ParseWarning {
    pub fn new(page: impl Into<String>, index: usize, reason: impl Into<String>) -> Self {
        Self {
            page: page.into(),
            index,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "item {} on {}: {}", self.index, self.page, self.reason)
    }
}

/// Convert anyhow::Error to SproutlyError
impl From<anyhow::Error> for SproutlyError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal { message: err.to_string() }
    }
}
