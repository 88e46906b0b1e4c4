//! The control channel error type.

use crate::error::FtpsError;
use crate::BoxError;
use derive_more::Display;
use thiserror::Error;

/// The error type returned by control channel command handlers.
#[derive(Debug, Error)]
#[error("control channel error: {kind}")]
pub struct ControlChanError {
    kind: ControlChanErrorKind,
    #[source]
    source: Option<BoxError>,
}

/// Categories of control channel errors.
#[derive(Eq, PartialEq, Debug, Display)]
pub enum ControlChanErrorKind {
    /// A system IO error.
    #[display("failed to perform IO")]
    IoError,
    /// Internal server error - a bug, or an invariant we expected to hold
    /// did not.
    #[display("internal server error")]
    InternalServerError,
    /// The control channel's TLS handshake failed.
    #[display("TLS handshake failed")]
    HandshakeFailed,
    /// The client issued a command out of sequence for the current state
    /// (spec.md §4.10's transition table).
    #[display("command not valid in the current control channel state")]
    IllegalState,
}

impl ControlChanError {
    /// Creates a new error with no further source.
    pub fn new(kind: ControlChanErrorKind) -> Self {
        ControlChanError { kind, source: None }
    }

    /// Returns the kind of error this is.
    pub fn kind(&self) -> &ControlChanErrorKind {
        &self.kind
    }
}

impl From<ControlChanErrorKind> for ControlChanError {
    fn from(kind: ControlChanErrorKind) -> ControlChanError {
        ControlChanError { kind, source: None }
    }
}

impl From<std::io::Error> for ControlChanError {
    fn from(err: std::io::Error) -> ControlChanError {
        ControlChanError {
            kind: ControlChanErrorKind::IoError,
            source: Some(Box::new(err)),
        }
    }
}

impl From<FtpsError> for ControlChanError {
    fn from(err: FtpsError) -> ControlChanError {
        ControlChanError {
            kind: ControlChanErrorKind::HandshakeFailed,
            source: Some(Box::new(err)),
        }
    }
}
