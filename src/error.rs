//! Error types for the embedding and store service seams.
//!
//! These carry the upstream status/message so failures are diagnosable. The
//! retrying store writer treats every variant uniformly as retryable;
//! classification exists for reporting, not for branching.

use thiserror::Error;

/// Failure from a single embedding round trip.
#[derive(Debug, Error)]
pub enum EmbedError {
    /// The API answered with a non-success status.
    #[error("embedding API error {status}: {message}")]
    Api { status: u16, message: String },

    /// The request never completed (connect, timeout, TLS).
    #[error("embedding request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The response body did not have the expected shape.
    #[error("malformed embedding response: {0}")]
    Malformed(String),
}

/// Failure from a single record-store insert.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The API answered with a non-success status.
    #[error("store API error {status}: {message}")]
    Api { status: u16, message: String },

    /// The request never completed (connect, timeout, TLS).
    #[error("store request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The insert succeeded at the HTTP level but returned no rows.
    #[error("store returned no rows for insert")]
    EmptyInsert,
}
