use thiserror::Error;

/// An error produced while loading or managing a cached asset.
///
/// This enum is intentionally cloneable and value-comparable: a single decode
/// failure is fanned out to every caller that joined the in-flight load.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// The asset source was unreachable or its bytes could not be decoded.
    ///
    /// The failing entry is dropped from the store, never cached, and a later
    /// request for the same key retries the decode.
    #[error("decode failed: {0}")]
    DecodeFailed(String),
    /// Forced eviction was requested for an entry that still has outstanding
    /// acquisitions.
    #[error("resource busy")]
    ResourceBusy,
    /// A release without a matching acquire.
    ///
    /// This is a programmer error: fatal in debug builds, logged and ignored
    /// in release builds.
    #[error("unbalanced release")]
    UnbalancedRelease,
    /// An unexpected error inside the cache itself.
    ///
    /// Not expected to ever surface in practice.
    #[error("internal error")]
    InternalError,
}

impl CacheError {
    #[track_caller]
    pub fn from_std_error<E: std::error::Error + 'static>(e: E) -> Self {
        let dynerr: &dyn std::error::Error = &e; // tracing expects a `&dyn Error`
        tracing::error!(error = dynerr);
        Self::InternalError
    }
}

/// The contents of a cache lookup, either a value or the error that resolved
/// the entry's load.
pub type CacheContents<T> = Result<T, CacheError>;
