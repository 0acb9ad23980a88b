//! Crate-wide error taxonomy.
//!
//! Each subsystem gets its own `thiserror` enum so call sites can match on
//! the failure kind that actually applies to them; [`RagError`] is the
//! top-level type returned from the public orchestration entry points
//! ([`crate::indexer::Indexer::index_document`],
//! [`crate::retrieval::pipeline::RetrievalPipeline::retrieve`]) and converts
//! from every subsystem error via `#[from]`.

use thiserror::Error;

/// Errors raised while loading or decoding a source document.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// The file path has no recognized extension, or an extension this
    /// crate does not decode.
    #[error("unsupported file format: {extension}")]
    UnsupportedFormat {
        /// Offending extension (without the leading dot).
        extension: String,
    },

    /// The decoded content was empty after whitespace trimming.
    #[error("document at {path} decoded to empty content")]
    EmptyDocument {
        /// Path of the offending document.
        path: String,
    },

    /// The underlying bytes could not be decoded by the selected decoder.
    #[error("failed to decode {path}: {reason}")]
    DecodeFailure {
        /// Path of the offending document.
        path: String,
        /// Human-readable cause.
        reason: String,
    },

    /// I/O failure reading the file from disk.
    #[error("I/O error reading {path}: {source}")]
    Io {
        /// Path of the offending document.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised by path validation, the injection scanner, and the PII
/// sanitizer's strict-mode gate.
#[derive(Debug, Error)]
pub enum SecurityError {
    /// A path resolved outside every configured allowed base path.
    #[error("path '{path}' is not within any allowed base path ({bases})")]
    PathTraversal {
        /// The offending resolved path.
        path: String,
        /// Comma-joined list of allowed bases, for the error message.
        bases: String,
    },

    /// The injection scanner rejected a document under strict mode.
    #[error("document blocked by injection scanner: risk={risk_level} in {path}")]
    BlockedByScanner {
        /// The document's path.
        path: String,
        /// The triggered risk level (`HIGH` or `CRITICAL`).
        risk_level: String,
    },

    /// A where-clause filter value was not a string (the only type the
    /// safe-SQL escaping rule supports).
    #[error("filter value for column '{column}' must be a string")]
    NonStringFilter {
        /// Offending column name.
        column: String,
    },
}

/// Errors raised by the passage store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend failed to open, create, or migrate its schema.
    #[error("failed to open passage store at {path}: {reason}")]
    OpenFailed {
        /// Store path (e.g. sqlite file path).
        path: String,
        /// Underlying cause.
        reason: String,
    },

    /// A read, write, or delete against the store failed.
    #[error("storage operation '{operation}' failed: {reason}")]
    OperationFailed {
        /// Name of the failed operation (`insert`, `delete`, `search`, …).
        operation: String,
        /// Underlying cause.
        reason: String,
    },
}

/// Errors raised while orchestrating retrieval.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// The underlying store failed during a retrieval-time query.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Top-level crate error. Every public orchestration entry point returns
/// `Result<T, RagError>`.
#[derive(Debug, Error)]
pub enum RagError {
    /// See [`LoaderError`].
    #[error(transparent)]
    Loader(#[from] LoaderError),

    /// See [`SecurityError`].
    #[error(transparent)]
    Security(#[from] SecurityError),

    /// See [`StoreError`].
    #[error(transparent)]
    Store(#[from] StoreError),

    /// See [`RetrievalError`].
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    /// The configuration file was named explicitly (via `RAG_CONFIG`) or
    /// expected at the default location but could not be found.
    #[error("configuration file not found: {hint}")]
    ConfigMissing {
        /// A hint telling the caller where the crate looked.
        hint: String,
    },

    /// A lower-level failure occurred during orchestration; wraps the
    /// originating stage name and the underlying message.
    #[error("pipeline failure in stage '{stage}': {reason}")]
    PipelineFailure {
        /// The stage that failed (`chunking`, `context`, `embedding`, …).
        stage: String,
        /// Underlying cause.
        reason: String,
    },
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RagError>;
