//! The TLS subsystem: C1-C9 and C11 of the FTPS security core.
//!
//! FTP-protocol-level concerns (the command state machine, C10) live in
//! [`crate::controlchan`]; this module is everything underneath it.

pub mod context;
pub mod credentials;
pub mod handshake;
pub mod io_interceptor;
pub mod ocsp;
pub mod passphrase;
pub mod session_cache;
pub mod sni;
pub mod tickets;
pub mod verify;

use nix::sys::mman::{mlock, munlock};
use std::ffi::c_void;
use std::io;

/// Locks the pages backing `secret` in memory, best-effort (spec.md §4.1,
/// §4.4, §9: "mlock-ed when privileges permit"). Returns the underlying
/// error if the platform refused (e.g. missing `CAP_IPC_LOCK`); callers
/// treat failure as non-fatal.
#[allow(unsafe_code)]
pub(crate) fn lock_secret(secret: &[u8]) -> io::Result<()> {
    if secret.is_empty() {
        return Ok(());
    }
    // SAFETY: the pointer and length describe a single live slice for the
    // duration of this call; `mlock` does not retain the pointer afterwards.
    unsafe { mlock(std::ptr::NonNull::new_unchecked(secret.as_ptr() as *mut c_void), secret.len()) }.map_err(io::Error::from)
}

/// Reverses [`lock_secret`]. Best-effort; failure is logged by the caller,
/// never treated as a reason to skip zeroizing the buffer.
#[allow(unsafe_code)]
pub(crate) fn unlock_secret(secret: &[u8]) -> io::Result<()> {
    if secret.is_empty() {
        return Ok(());
    }
    // SAFETY: see `lock_secret`.
    unsafe { munlock(std::ptr::NonNull::new_unchecked(secret.as_ptr() as *mut c_void), secret.len()) }.map_err(io::Error::from)
}
