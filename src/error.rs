//! Crate-wide error types for the FTPS security core.

use derive_more::Display;
use std::fmt;

use crate::BoxError;

/// The kinds of errors that can occur while building, running or tearing
/// down the FTPS security core.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum FtpsErrorKind {
    /// A startup-time configuration problem: bad file path, key/cert
    /// mismatch, unparsable cipher list, invalid DH parameters.
    #[display("configuration error")]
    ConfigError,
    /// A passphrase could not be obtained (provider failed or retries
    /// exhausted). Fatal at startup.
    #[display("passphrase unavailable")]
    PassphraseUnavailable,
    /// The handshake deadline elapsed before negotiation completed.
    #[display("handshake timed out")]
    HandshakeTimeout,
    /// The peer spoke a disabled protocol version, offered no shared
    /// cipher, or sent a malformed record.
    #[display("TLS protocol error")]
    HandshakeProtocol,
    /// Peer certificate chain, CRL or OCSP check, or CN/SAN match failed.
    #[display("peer authentication failure")]
    PeerAuthFailure,
    /// A data channel handshake succeeded but did not reuse the control
    /// session.
    #[display("TLS session not reused from control channel")]
    SessionReuseRequired,
    /// The peer closed the connection mid-handshake.
    #[display("unexpected EOF during handshake")]
    UnexpectedEof,
    /// A renegotiation was attempted while policy forbids it.
    #[display("renegotiation requested but disabled")]
    RenegotiationDisabled,
    /// An I/O error occurred on the underlying socket.
    #[display("I/O error")]
    Io,
}

/// An error produced by the FTPS security core.
#[derive(Debug, Display)]
#[display("{kind}")]
pub struct FtpsError {
    kind: FtpsErrorKind,
    source: Option<BoxError>,
}

impl FtpsError {
    /// Constructs a new error of the given kind with no further source.
    pub fn new(kind: FtpsErrorKind) -> Self {
        FtpsError { kind, source: None }
    }

    /// Constructs a new error of the given kind, wrapping `source`.
    pub fn with_source(kind: FtpsErrorKind, source: impl Into<BoxError>) -> Self {
        FtpsError {
            kind,
            source: Some(source.into()),
        }
    }

    /// Returns the kind of error this is.
    pub fn kind(&self) -> FtpsErrorKind {
        self.kind
    }
}

impl std::error::Error for FtpsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<FtpsErrorKind> for FtpsError {
    fn from(kind: FtpsErrorKind) -> Self {
        FtpsError::new(kind)
    }
}

impl From<std::io::Error> for FtpsError {
    fn from(e: std::io::Error) -> Self {
        FtpsError::with_source(FtpsErrorKind::Io, e)
    }
}

impl From<rustls::Error> for FtpsError {
    fn from(e: rustls::Error) -> Self {
        FtpsError::with_source(FtpsErrorKind::HandshakeProtocol, e)
    }
}

/// A fixed-size byte buffer comparison helper used where `fmt::Debug`
/// output must not leak secret material (passphrases, key bytes).
pub(crate) struct Redacted;

impl fmt::Debug for Redacted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}
