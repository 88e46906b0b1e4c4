//! Control channel reply construction (RFC 959/2228 status codes).

/// A reply to the FTP client.
#[derive(Debug, Clone)]
pub enum Reply {
    /// No reply should be sent (e.g. an internal message that isn't
    /// itself client-visible).
    None,
    /// A single-line reply.
    CodeAndMsg {
        /// The reply code.
        code: ReplyCode,
        /// The reply message text.
        msg: String,
    },
    /// A multi-line reply (e.g. FEAT).
    MultiLine {
        /// The reply code.
        code: ReplyCode,
        /// The lines of the reply.
        lines: Vec<String>,
    },
}

/// The reply codes this crate's command handlers can produce. Trimmed to
/// the AUTH/PBSZ/PROT/CCC/SSCN and login-gating vocabulary (spec.md §4.10);
/// full FTP command dispatch is out of scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
#[allow(dead_code)]
pub enum ReplyCode {
    /// 200: command accepted.
    CommandOkay = 200,
    /// 221: control connection closing.
    ClosingControlConnection = 221,
    /// 230: user logged in.
    UserLoggedIn = 230,
    /// 234: AUTH accepted, begin the TLS handshake.
    AuthOkayNoDataNeeded = 234,
    /// 431: no certificate is available to secure the connection.
    NoCertificateAvailable = 431,
    /// 331: username okay, password needed.
    NeedPassword = 331,
    /// 500: command not recognized.
    CommandSyntaxError = 500,
    /// 501: command recognized, parameter invalid.
    ParameterSyntaxError = 501,
    /// 502: command recognized but not implemented.
    CommandNotImplemented = 502,
    /// 503: command sent out of sequence.
    BadCommandSequence = 503,
    /// 504: parameter value not implemented for this command.
    CommandNotImplementedForParameter = 504,
    /// 530: not logged in / TLS required but absent.
    NotLoggedIn = 530,
    /// 534: policy requires TLS and it is absent.
    FtpsRequired = 534,
    /// 536: requested PROT level not supported.
    ProtLevelNotSupported = 536,
    /// 550: action not taken (used for the auth-axis TLSRequired rejection).
    ActionNotTaken = 550,
}

impl Reply {
    /// Builds a single-line reply.
    pub fn new(code: ReplyCode, message: impl Into<String>) -> Self {
        Reply::CodeAndMsg { code, msg: message.into() }
    }

    /// No reply.
    pub fn none() -> Self {
        Reply::None
    }
}
