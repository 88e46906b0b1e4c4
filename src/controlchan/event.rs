//! The slice of the FTP command vocabulary this crate's state machine
//! needs to reason about. Full command dispatch is an external
//! collaborator's job (spec.md §1 Non-goals); everything else is folded
//! into [`Command::Other`].

/// The `AUTH` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthParam {
    /// `AUTH TLS` / `AUTH TLS-C`.
    Tls,
    /// `AUTH TLS-P`.
    TlsP,
    /// `AUTH SSL`.
    Ssl,
}

/// The `PROT` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtParam {
    /// `PROT C`: clear.
    Clear,
    /// `PROT S`: safe (integrity only) - unsupported.
    Safe,
    /// `PROT E`: confidential (privacy only) - unsupported.
    Confidential,
    /// `PROT P`: private (integrity and privacy).
    Private,
}

/// The `SSCN` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SscnMode {
    /// Query the current mode.
    Query,
    /// Server drives data channels as the TLS server (default).
    Server,
    /// Server drives data channels as the TLS client.
    Client,
}

/// A command relevant to the FTPS security core's state machine.
#[derive(Debug, Clone)]
pub enum Command {
    /// `AUTH <param>`.
    Auth(AuthParam),
    /// `PBSZ <size>`.
    Pbsz(u64),
    /// `PROT <param>`.
    Prot(ProtParam),
    /// `CCC`.
    Ccc,
    /// `SSCN [ON|OFF]`.
    Sscn(SscnMode),
    /// `USER <username>`.
    User(String),
    /// `PASS <password>`.
    Pass(String),
    /// `ACCT <account>`.
    Acct(String),
    /// `PASV`/`EPSV`: opens a data channel in passive mode.
    Pasv,
    /// A data-transfer command (`APPE`/`LIST`/`MLSD`/`NLST`/`RETR`/`STOR`/`STOU`).
    DataTransfer,
    /// Any command outside this crate's scope.
    Other(String),
}

/// An event dispatched through the middleware chain.
#[derive(Debug, Clone)]
pub enum Event {
    /// A parsed client command.
    Command(Command),
    /// An internal message, e.g. signaling that a handshake completed.
    Internal(InternalMsg),
}

/// Messages the command handlers emit to drive side effects that can't
/// happen synchronously inside `handle` (spec.md §4.7/§4.10: the actual TLS
/// handshake runs on its own task once AUTH is accepted).
#[derive(Debug, Clone)]
pub enum InternalMsg {
    /// Run the control channel's TLS handshake now.
    SecureControlChannel,
    /// `CCC` succeeded: shut the control channel's TLS down and resume
    /// reading plaintext commands.
    PlaintextControlChannel,
}
