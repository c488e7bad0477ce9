//! Error types for the capture and generation pipeline

use std::fmt;
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Pipeline stage an operation was in when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Capturing,
    Extracting,
    Composing,
    Generating,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Capturing => "capturing",
            Stage::Extracting => "extracting",
            Stage::Composing => "composing",
            Stage::Generating => "generating",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur while scraping or cloning a page
#[derive(Error, Debug)]
pub enum Error {
    /// The page did not reach DOM-ready before the capture deadline
    #[error("Capture timed out after {after_ms}ms")]
    CaptureTimeout { after_ms: u64 },

    /// Browser launch, navigation or renderer failure
    #[error("Capture failed: {0}")]
    CaptureError(String),

    /// Captured markup (or the base URL) could not be parsed at all
    #[error("Failed to parse captured page: {0}")]
    ParseError(String),

    /// Missing or invalid configuration, e.g. no generation credential
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// The remote generation call errored, timed out or returned a non-success status
    #[error("Generation request failed{}: {message}", .status.map(|s| format!(" with status {s}")).unwrap_or_default())]
    RequestFailed { status: Option<u16>, message: String },

    /// The remote call succeeded but the body lacks the expected structure
    #[error("Invalid response from generation service: {0}")]
    InvalidResponse(String),

    /// The generated text is blank after trimming
    #[error("Generated document is empty")]
    EmptyOutput,
}

impl Error {
    /// Stage of the pipeline this error belongs to.
    pub fn stage(&self) -> Stage {
        match self {
            Error::CaptureTimeout { .. } | Error::CaptureError(_) => Stage::Capturing,
            Error::ParseError(_) => Stage::Extracting,
            Error::ConfigError(_)
            | Error::RequestFailed { .. }
            | Error::InvalidResponse(_)
            | Error::EmptyOutput => Stage::Generating,
        }
    }

    /// Stable machine-readable name of the variant.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::CaptureTimeout { .. } => "capture_timeout",
            Error::CaptureError(_) => "capture_error",
            Error::ParseError(_) => "parse_error",
            Error::ConfigError(_) => "config_error",
            Error::RequestFailed { .. } => "request_failed",
            Error::InvalidResponse(_) => "invalid_response",
            Error::EmptyOutput => "empty_output",
        }
    }

    /// HTTP status an adapter should surface for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::CaptureTimeout { .. } => 504,
            Error::CaptureError(_) => 502,
            Error::ParseError(_) => 422,
            Error::ConfigError(_) => 503,
            Error::RequestFailed { .. } | Error::InvalidResponse(_) | Error::EmptyOutput => 502,
        }
    }

    /// Process exit code used by the CLI; distinct per variant.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::CaptureTimeout { .. } => 10,
            Error::CaptureError(_) => 11,
            Error::ParseError(_) => 12,
            Error::ConfigError(_) => 20,
            Error::RequestFailed { .. } => 21,
            Error::InvalidResponse(_) => 22,
            Error::EmptyOutput => 23,
        }
    }

    /// True for failures that happened before any generation work started.
    pub fn is_capture_failure(&self) -> bool {
        matches!(self.stage(), Stage::Capturing | Stage::Extracting)
    }
}
