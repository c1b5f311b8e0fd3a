//! Error types for the scrape pipeline, the store and the Letao client.

use std::time::Duration;
use thiserror::Error;

/// Failures talking to the FlareSolverr rendering proxy.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("proxy request failed: {0}")]
    Transport(String),

    #[error("proxy returned HTTP status {0}")]
    Status(u16),

    #[error("proxy reported failure: {0}")]
    Rejected(String),

    #[error("malformed proxy response: {0}")]
    Malformed(String),
}

/// Raised only when a page holds nothing usable. Missing fields degrade to defaults instead.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("empty document")]
    EmptyDocument,

    #[error("anti-bot challenge page returned instead of the listing: {0}")]
    Challenge(String),
}

/// Per-item scrape failure: either the fetch or the extraction step.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error(transparent)]
    Proxy(#[from] ProxyError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),
}

/// Failures of the storage collaborator.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("record already exists: {0}")]
    Conflict(String),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("invalid record: {0}")]
    Invalid(String),

    #[error("storage I/O failed: {0}")]
    Io(String),

    #[error("storage serialization failed: {0}")]
    Serialization(String),
}

/// Login handshake failures.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("login request failed: {0}")]
    Transport(String),

    #[error("login rejected (code {code}): {body}")]
    Rejected { code: String, body: String },

    #[error("login response is missing the session id or its expiry")]
    MissingSession,

    #[error("unrecognised session expiry: {0}")]
    InvalidExpiry(String),
}

/// Cart-add failures that survive the retry budget.
#[derive(Debug, Error)]
pub enum CartError {
    #[error("invalid cart request: {0}")]
    Invalid(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("cart request failed: {0}")]
    Transport(String),
}

/// Run-level failures of the catalog synchronizer.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Scrape(#[from] ScrapeError),

    #[error("url is not tracked: {0}")]
    NotTracked(String),

    #[error("url is already tracked: {0}")]
    AlreadyTracked(String),

    #[error("synchronization timed out after {0:?}")]
    TimedOut(Duration),
}
