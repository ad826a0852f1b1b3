//! Error taxonomy for the bridge pipeline.
//! Only `ValidationError` ever reaches a `translate` caller; upstream, store
//! and refresh failures are logged and degraded locally.

use thiserror::Error;

/// Malformed request. Reported immediately, never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("text is empty")]
    EmptyText,
    #[error("text is {len} characters, maximum is {max}")]
    TooLong { len: usize, max: usize },
    #[error("source and target style are both '{0}'")]
    SameStyle(String),
    #[error("unknown style '{0}'")]
    UnknownStyle(String),
}

/// Completion provider failure (the "upstream" of the pipeline).
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("API error: {0}")]
    Api(String),
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },
    #[error("provider timeout")]
    Timeout,
    #[error("provider returned an empty completion")]
    EmptyResponse,
    #[error("completion cut off at the {max_tokens}-token limit")]
    Truncated { max_tokens: u32 },
    #[error("provider misconfigured: {0}")]
    Config(String),
}

/// Persistent store I/O failure. Callers treat it as a cache miss.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("entry metadata: {0}")]
    Meta(#[from] serde_json::Error),
    #[error("invalid cache key '{0}'")]
    InvalidKey(String),
}

/// Background refresh failure. Logged by the refresh worker, never surfaced.
#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("refresh produced a degraded translation, keeping the stale entry")]
    Degraded,
    #[error("refresh could not be stored: {0}")]
    Store(#[from] StoreError),
}

/// Term catalog could not be loaded.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("catalog IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("catalog parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("catalog term pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Service construction failure.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("provider: {0}")]
    Provider(#[from] ProviderError),
    #[error("result store: {0}")]
    Store(#[from] StoreError),
}

/// Error returned by the public bridge operations.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("invalid request: {0}")]
    Validation(#[from] ValidationError),
}
