//! The authentication-side interface this crate needs from its host FTP
//! engine. Full authenticator/backend implementations are out of scope
//! (spec.md §1) - only the shape collaborators must present is specified.

use std::fmt::Debug;
use std::path::PathBuf;

/// The minimal view of a logged-in (or logging-in) FTP user that the FTPS
/// core needs: whether `TLSRequired Accounts` applies to them, and where to
/// look for a `.tlslogin` file (spec.md §4.11).
pub trait UserDetail: Debug + Send + Sync {
    /// True if this is the anonymous user, exempting them from
    /// `TLSRequired Accounts` (spec.md §4.10) but never from `TLSRequired All`.
    fn is_anonymous(&self) -> bool {
        false
    }

    /// The user's home directory, used to locate `.tlslogin` (spec.md §4.11).
    fn home_dir(&self) -> Option<PathBuf> {
        None
    }
}

/// A trivial [`UserDetail`] for the anonymous user, used before login and
/// in tests.
#[derive(Debug, Clone, Default)]
pub struct AnonymousUser;

impl UserDetail for AnonymousUser {
    fn is_anonymous(&self) -> bool {
        true
    }
}
