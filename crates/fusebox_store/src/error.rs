// Copyright (c) Microsoft Corporation.

use std::fmt;

/// The result for fallible operations that use the [`Error`] type of the storage contract.
pub type Result<T> = std::result::Result<T, Error>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// An error from a storage backend or a storage wrapper.
///
/// Backend-specific causes (network failures, protocol errors) are wrapped as
/// [`ErrorKind::Backend`]. Wrappers contribute their own kinds: a
/// circuit-guarded backend that is short-circuiting reports
/// [`ErrorKind::Unavailable`], and a fallback chain aggregates the per-backend
/// failures into [`ErrorKind::AllFailed`] or [`ErrorKind::PartialFailure`].
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct Error(ErrorKind);

/// The kinds of storage errors.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The backend itself failed.
    #[error("storage backend error: {0}")]
    Backend(#[source] BoxError),

    /// A circuit guarding the backend is open and the operation was skipped.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// A persisted value could not be decoded.
    #[error("malformed persisted value: {value:?}")]
    Codec {
        /// The raw value that failed to decode.
        value: String,
    },

    /// Every backend in a fallback chain failed.
    #[error("all {} storage backends failed", .0.len())]
    AllFailed(Vec<Error>),

    /// Some, but not all, backends failed during a fan-out write.
    #[error("{} storage backends failed during fan-out", .0.len())]
    PartialFailure(Vec<Error>),
}

impl Error {
    /// Wraps a backend-specific cause.
    pub fn backend(cause: impl Into<BoxError>) -> Self {
        Self(ErrorKind::Backend(cause.into()))
    }

    /// Creates an error for a backend whose guarding circuit is open.
    pub fn unavailable(reason: impl fmt::Display) -> Self {
        Self(ErrorKind::Unavailable(reason.to_string()))
    }

    /// Creates an error for a value that could not be decoded.
    pub fn codec(value: impl Into<String>) -> Self {
        Self(ErrorKind::Codec { value: value.into() })
    }

    /// Aggregates failures from a chain where every backend failed.
    pub fn all_failed(errors: Vec<Self>) -> Self {
        Self(ErrorKind::AllFailed(errors))
    }

    /// Aggregates failures from a fan-out where only some backends failed.
    pub fn partial_failure(errors: Vec<Self>) -> Self {
        Self(ErrorKind::PartialFailure(errors))
    }

    /// Returns the kind of this error.
    #[must_use]
    pub fn kind(&self) -> &ErrorKind {
        &self.0
    }

    /// Returns the aggregated per-backend errors, if this is a chain error.
    #[must_use]
    pub fn backend_errors(&self) -> Option<&[Self]> {
        match &self.0 {
            ErrorKind::AllFailed(errors) | ErrorKind::PartialFailure(errors) => Some(errors),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assert_types() {
        static_assertions::assert_impl_all!(Error: Send, Sync);
    }

    #[test]
    fn backend_preserves_cause() {
        let cause = std::io::Error::new(std::io::ErrorKind::TimedOut, "socket timed out");
        let error = Error::backend(cause);

        assert!(matches!(error.kind(), ErrorKind::Backend(_)));
        assert_eq!(error.to_string(), "storage backend error: socket timed out");
        assert!(std::error::Error::source(&error).is_some());
    }

    #[test]
    fn unavailable_renders_reason() {
        let error = Error::unavailable("circuit open");
        assert_eq!(error.to_string(), "storage unavailable: circuit open");
    }

    #[test]
    fn codec_keeps_raw_value() {
        let error = Error::codec("not-a-timestamp:9");
        assert!(matches!(error.kind(), ErrorKind::Codec { value } if value == "not-a-timestamp:9"));
    }

    #[test]
    fn aggregates_expose_backend_errors() {
        let error = Error::all_failed(vec![Error::unavailable("a"), Error::unavailable("b")]);
        assert_eq!(error.backend_errors().map(<[Error]>::len), Some(2));
        assert_eq!(error.to_string(), "all 2 storage backends failed");

        let error = Error::partial_failure(vec![Error::unavailable("a")]);
        assert_eq!(error.backend_errors().map(<[Error]>::len), Some(1));

        assert!(Error::unavailable("x").backend_errors().is_none());
    }
}
