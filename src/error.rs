use thiserror::Error;

use crate::invoke::ErrorValue;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum Error {
    /// ErrNotOpened indicates an operation executed before the connection
    /// has been accepted or opened.
    #[error("connection not opened yet")]
    ErrNotOpened,

    /// ErrAlreadyOpened indicates an attempt to open a server that is
    /// already listening.
    #[error("connection already opened")]
    ErrAlreadyOpened,

    /// ErrAlreadyClosed indicates an operation executed after the connection
    /// has already been closed.
    #[error("connection already closed")]
    ErrAlreadyClosed,

    /// ErrClosingInProgress indicates an operation executed while a close
    /// is being carried out.
    #[error("closing is in progress")]
    ErrClosingInProgress,

    /// ErrAlreadyAccepted indicates a second accept or reject on the same
    /// acceptor.
    #[error("accept or reject has already been made")]
    ErrAlreadyAccepted,

    /// ErrCommunicatorClosed indicates a call settled or refused because the
    /// communicator has been destructed.
    #[error("communicator closed")]
    ErrCommunicatorClosed,

    /// ErrNoProvider indicates a function invoke arrived while no provider
    /// is registered on this side.
    #[error("no provider registered")]
    ErrNoProvider,

    /// ErrResolve indicates the listener path does not lead to a callable
    /// member of the provider.
    #[error("unable to find the matching function: {listener}")]
    ErrResolve { listener: String },

    /// ErrRemote carries an error raised by the remote provider, with its
    /// original name, message and stack preserved.
    #[error("remote error: {0}")]
    ErrRemote(ErrorValue),

    /// ErrTransport indicates a network or port level failure.
    #[error("transport failure: {reason}")]
    ErrTransport { reason: String },

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Folds a non-clonable source error into the transport kind.
    pub fn transport<E: std::fmt::Display>(err: E) -> Self {
        Error::ErrTransport {
            reason: err.to_string(),
        }
    }

    /// The stable name this error is tagged with when it crosses the wire.
    pub fn name(&self) -> &str {
        match self {
            Error::ErrNotOpened => "NotOpenedError",
            Error::ErrAlreadyOpened => "AlreadyOpenedError",
            Error::ErrAlreadyClosed => "AlreadyClosedError",
            Error::ErrClosingInProgress => "ClosingError",
            Error::ErrAlreadyAccepted => "AlreadyAcceptedError",
            Error::ErrCommunicatorClosed => "CommunicatorClosedError",
            Error::ErrNoProvider => "NoProviderError",
            Error::ErrResolve { .. } => "ResolutionError",
            Error::ErrRemote(value) => &value.name,
            Error::ErrTransport { .. } => "TransportError",
            Error::Other(_) => "Error",
        }
    }

    /// Whether this is a remote failure tagged as a resolution error.
    pub fn is_resolution_error(&self) -> bool {
        match self {
            Error::ErrResolve { .. } => true,
            Error::ErrRemote(value) => value.name == "ResolutionError",
            _ => false,
        }
    }

    /// Whether this is a remote failure tagged as a no-provider error.
    pub fn is_no_provider_error(&self) -> bool {
        match self {
            Error::ErrNoProvider => true,
            Error::ErrRemote(value) => value.name == "NoProviderError",
            _ => false,
        }
    }
}

impl From<&Error> for ErrorValue {
    fn from(err: &Error) -> Self {
        match err {
            Error::ErrRemote(value) => value.clone(),
            _ => ErrorValue::new(err.name(), &err.to_string()),
        }
    }
}

impl From<ErrorValue> for Error {
    fn from(value: ErrorValue) -> Self {
        Error::ErrRemote(value)
    }
}
