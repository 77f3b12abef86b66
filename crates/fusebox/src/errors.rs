// Copyright (c) Microsoft Corporation.

use std::sync::Arc;

/// A boxed error as carried through circuits.
///
/// User work can fail with any error type; circuits erase it to this form so
/// that circuits of different user-error types can share storage, registry,
/// and notifier plumbing.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A predicate over user errors, used for failure classification.
///
/// See [`CircuitOptionsBuilder::errors`][crate::CircuitOptionsBuilder::errors]
/// and [`CircuitOptionsBuilder::exclude`][crate::CircuitOptionsBuilder::exclude].
pub type ErrorPredicate = Arc<dyn Fn(&(dyn std::error::Error + Send + Sync + 'static)) -> bool + Send + Sync>;

/// A hook that adapters can install to reshape surfaced circuit errors.
///
/// The mapper runs on every [`Error`] the circuit is about to return (but not
/// on [`Error::Passthrough`], which carries an error the circuit does not
/// own). Dependency-specific wrapping beyond the taxonomy belongs in adapter
/// code via `map_err`.
pub type ErrorMapper = Arc<dyn Fn(Error) -> Error + Send + Sync>;

/// Builds a predicate matching one concrete error type.
///
/// This is the typed rendition of configuring a set of counted error kinds:
/// combine predicates with closures when more than one type participates.
///
/// # Examples
///
/// ```
/// use fusebox::errors::error_kind;
///
/// #[derive(Debug, thiserror::Error)]
/// #[error("connection refused")]
/// struct ConnectionError;
///
/// let predicate = error_kind::<ConnectionError>();
/// assert!(predicate(&ConnectionError));
/// assert!(!predicate(&std::fmt::Error));
/// ```
#[must_use]
pub fn error_kind<E: std::error::Error + Send + Sync + 'static>() -> ErrorPredicate {
    Arc::new(|error| error.is::<E>())
}

/// An error surfaced by a circuit execution.
///
/// Storage and cache failures never appear here; they are routed to the event
/// notifier and degrade the circuit to conservative behavior instead. The
/// user error that caused a failure is carried as the source, so `source()`
/// chains and downcasting keep working through the circuit boundary.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Execution was skipped because the circuit is open or locked open.
    #[error("circuit '{circuit}' is open")]
    Open {
        /// The circuit that rejected the execution.
        circuit: String,
    },

    /// User work failed with a counted error; the circuit remains closed.
    #[error("circuit '{circuit}' recorded a failure")]
    Failure {
        /// The circuit that recorded the failure.
        circuit: String,
        /// The user error that was counted.
        #[source]
        source: BoxError,
    },

    /// User work failed with a counted error and that failure opened (or
    /// re-opened) the circuit.
    #[error("circuit '{circuit}' tripped open")]
    Tripped {
        /// The circuit that tripped.
        circuit: String,
        /// The user error that tripped the circuit.
        #[source]
        source: BoxError,
    },

    /// User work failed with an error the circuit does not count; the
    /// original error is passed through unwrapped and unrecorded.
    #[error(transparent)]
    Passthrough(BoxError),
}

impl Error {
    /// The name of the circuit involved, when the error belongs to one.
    #[must_use]
    pub fn circuit(&self) -> Option<&str> {
        match self {
            Self::Open { circuit } | Self::Failure { circuit, .. } | Self::Tripped { circuit, .. } => Some(circuit),
            Self::Passthrough(_) => None,
        }
    }

    /// True when execution was rejected by an open or locked-open circuit.
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }

    /// True when this failure performed the open (or reopen) transition.
    #[must_use]
    pub fn is_tripped(&self) -> bool {
        matches!(self, Self::Tripped { .. })
    }

    /// Consumes the error, returning the carried user error if there is one.
    #[must_use]
    pub fn into_user_error(self) -> Option<BoxError> {
        match self {
            Self::Open { .. } => None,
            Self::Failure { source, .. } | Self::Tripped { source, .. } => Some(source),
            Self::Passthrough(source) => Some(source),
        }
    }
}
