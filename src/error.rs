//! Error types for case validation and the completion service.
//!
//! Application plumbing uses `anyhow`; these typed errors exist where
//! callers need to tell failure kinds apart.

use std::path::PathBuf;
use thiserror::Error;

/// Input validation failures, surfaced before the ReAct loop starts.
#[derive(Error, Debug)]
pub enum CaseError {
    #[error("Case description is empty")]
    EmptyDescription,

    #[error("Image not found: {}", .0.display())]
    ImageNotFound(PathBuf),

    #[error("Image path is not a file: {}", .0.display())]
    ImageNotAFile(PathBuf),

    #[error("Image file is empty: {}", .0.display())]
    EmptyImage(PathBuf),

    #[error("Failed to read case file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse case file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Failures talking to the completion service.
///
/// Inside the loop every variant is treated as a zero-gain step; only
/// `MissingCredential` and `Client` are raised at construction time.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("No API key configured. Set OPENAI_API_KEY or pass --api-key")]
    MissingCredential,

    #[error("Failed to build HTTP client: {0}")]
    Client(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Cannot connect to completion service at {0}")]
    Connect(String),

    #[error("Authentication rejected ({0})")]
    Unauthorized(u16),

    #[error("Rate limited by completion service: {0}")]
    RateLimited(String),

    #[error("Completion API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Malformed completion response: {0}")]
    InvalidResponse(String),

    #[error("Failed to send request: {0}")]
    Request(String),

    #[error("Failed to read image {}: {source}", path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ServiceError {
    /// Map an HTTP status and body into the matching variant.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => ServiceError::Unauthorized(status),
            429 => ServiceError::RateLimited(body),
            _ => ServiceError::Api { status, body },
        }
    }
}
