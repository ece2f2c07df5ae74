use std::path::PathBuf;

/// All errors in caplint carry enough context to produce a useful diagnostic
/// without a debugger. Each variant names the file, key, or reason for failure.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("parse failed: {}: {reason}", file.display())]
    ParseFailed {
        file: PathBuf,
        reason: String,
    },

    #[error("source is not valid UTF-8: {}", file.display())]
    InvalidUtf8 {
        file: PathBuf,
    },

    #[error("file too large ({size_bytes} bytes, max {max_bytes}): {}", file.display())]
    FileTooLarge {
        file: PathBuf,
        size_bytes: u64,
        max_bytes: u64,
    },

    #[error("invalid config value for `{key}`: `{value}` ({reason})")]
    ConfigInvalid {
        key: String,
        value: String,
        reason: String,
    },

    #[error("invalid query: {reason}")]
    InvalidQuery {
        reason: String,
    },

    #[error("overlapping transformations from `{rule_id}` at bytes {start}..{end}")]
    OverlappingTransformations {
        rule_id: String,
        start: usize,
        end: usize,
    },

    #[error("symbol store failure: {reason}")]
    StoreFailure {
        reason: String,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("toml deserialize: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Collapse any redb error family into the single store failure variant.
/// The store is the only component that talks to redb, so the concrete
/// error type carries no extra information for callers.
pub(crate) fn store_err<E: std::fmt::Display>(e: E) -> Error {
    Error::StoreFailure {
        reason: e.to_string(),
    }
}
