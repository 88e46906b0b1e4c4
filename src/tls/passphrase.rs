//! C1: Passphrase Store (spec.md §4.1).

use crate::error::{FtpsError, FtpsErrorKind};
use crate::vhost::ServerId;
use dashmap::DashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::Duration;

/// The kind of key material a passphrase unlocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyKind {
    /// An RSA private key.
    Rsa,
    /// An EC private key.
    Ec,
    /// A PKCS12 bundle.
    Pkcs12,
    /// A DSA private key. Recognized for configuration compatibility only:
    /// rustls has no DSA signature scheme or key representation, so this
    /// kind can never be loaded (see [`crate::tls::credentials::load_cert_and_key`]).
    Dsa,
}

/// A page-locked passphrase. Zeroizes and unlocks its backing buffer on
/// drop (spec.md §3 "Passphrase Record", §9 "in-place secret scrubbing").
pub struct Passphrase {
    bytes: Vec<u8>,
}

impl Passphrase {
    /// Wraps raw secret bytes in an mlock-ed, zeroize-on-drop buffer.
    pub fn new(bytes: Vec<u8>) -> Self {
        let _ = crate::tls::lock_secret(&bytes);
        Passphrase { bytes }
    }

    /// Borrows the passphrase bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// A coarse estimate of the entropy carried by this passphrase, for
    /// RNG seeding (spec.md §4.1: "at most 0.25 bits/byte").
    pub fn low_entropy_estimate_bits(&self) -> usize {
        (self.bytes.len() as f64 * 0.25) as usize
    }
}

impl Drop for Passphrase {
    fn drop(&mut self) {
        let _ = crate::tls::unlock_secret(&self.bytes);
        self.bytes.fill(0);
    }
}

impl std::fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Passphrase").field("len", &self.bytes.len()).field("bytes", &crate::error::Redacted).finish()
    }
}

/// Supplies a passphrase interactively or via an external privileged
/// program (spec.md §4.1). Implementations are external collaborators;
/// this crate only defines the contract and the privileged-provider path.
pub trait PassphraseSource: Send + Sync {
    /// Prompts for a passphrase, verifying with `verify` (which attempts
    /// the actual key decryption/MAC check). Returns `None` after
    /// exhausting the allotted attempts.
    fn prompt(&self, kind: KeyKind, path: &Path, verify: &dyn Fn(&[u8]) -> bool) -> Option<Vec<u8>>;
}

/// The external provider program, forked with `(program, "host:port",
/// kind)` as positional arguments (spec.md §9).
#[derive(Debug, Clone)]
pub struct PassphraseProvider {
    program: PathBuf,
    host_port: String,
    timeout: Duration,
}

const PROVIDER_TIMEOUT: Duration = Duration::from_secs(10);

impl PassphraseProvider {
    /// Configures a provider that will be forked with the given
    /// `host:port` argument on each acquisition.
    pub fn new(program: impl Into<PathBuf>, host_port: impl Into<String>) -> Self {
        PassphraseProvider {
            program: program.into(),
            host_port: host_port.into(),
            timeout: PROVIDER_TIMEOUT,
        }
    }

    fn kind_arg(kind: KeyKind) -> &'static str {
        match kind {
            KeyKind::Rsa => "RSA",
            KeyKind::Ec => "EC",
            KeyKind::Pkcs12 => "PKCS12",
            KeyKind::Dsa => "DSA",
        }
    }

    /// Forks the provider, piping stderr to `log_stderr`, reading up to one
    /// page (4096 bytes) from stdout, and enforcing the provider timeout by
    /// killing the child (SIGTERM then SIGKILL) if it overruns.
    pub fn acquire(&self, kind: KeyKind, log_stderr: impl Fn(&str)) -> Result<Vec<u8>, FtpsError> {
        let mut child = Command::new(&self.program)
            .arg(&self.host_port)
            .arg(Self::kind_arg(kind))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| FtpsError::with_source(FtpsErrorKind::PassphraseUnavailable, e))?;

        let deadline = std::time::Instant::now() + self.timeout;
        loop {
            if let Some(_status) = child.try_wait().map_err(|e| FtpsError::with_source(FtpsErrorKind::PassphraseUnavailable, e))? {
                break;
            }
            if std::time::Instant::now() >= deadline {
                kill_provider(&mut child);
                return Err(FtpsError::new(FtpsErrorKind::PassphraseUnavailable));
            }
            std::thread::sleep(Duration::from_millis(20));
        }

        if let Some(mut stderr) = child.stderr.take() {
            let mut buf = String::new();
            let _ = stderr.read_to_string(&mut buf);
            if !buf.is_empty() {
                log_stderr(&buf);
            }
        }

        let mut stdout = child.stdout.take().ok_or_else(|| FtpsError::new(FtpsErrorKind::PassphraseUnavailable))?;
        let mut page = vec![0u8; 4096];
        let n = stdout.read(&mut page).map_err(|e| FtpsError::with_source(FtpsErrorKind::PassphraseUnavailable, e))?;
        page.truncate(n);
        while page.last() == Some(&b'\n') || page.last() == Some(&b'\r') {
            page.pop();
        }
        if page.is_empty() {
            return Err(FtpsError::new(FtpsErrorKind::PassphraseUnavailable));
        }
        Ok(page)
    }
}

#[cfg(unix)]
fn kill_provider(child: &mut std::process::Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;
    if let Ok(pid) = i32::try_from(child.id()) {
        let _ = kill(Pid::from_raw(pid), Signal::SIGTERM);
        std::thread::sleep(Duration::from_millis(200));
        if child.try_wait().ok().flatten().is_none() {
            let _ = kill(Pid::from_raw(pid), Signal::SIGKILL);
        }
    }
    let _ = child.wait();
}

#[cfg(not(unix))]
fn kill_provider(child: &mut std::process::Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// The in-memory passphrase index, keyed by `(sid, kind)` (spec.md §4.1).
#[derive(Debug, Default)]
pub struct PassphraseStore {
    index: DashMap<(ServerId, KeyKind), Arc<(PathBuf, Passphrase)>>,
}

impl PassphraseStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        PassphraseStore::default()
    }

    /// Returns the cached passphrase for `(vh, kind)` if its path still
    /// matches, scrubbing a stale entry otherwise.
    pub fn cached(&self, vh: ServerId, kind: KeyKind, path: &Path) -> Option<Arc<(PathBuf, Passphrase)>> {
        if let Some(entry) = self.index.get(&(vh, kind)) {
            if entry.0 == path {
                return Some(entry.clone());
            }
        }
        self.index.remove(&(vh, kind));
        None
    }

    /// Records a freshly acquired passphrase.
    pub fn insert(&self, vh: ServerId, kind: KeyKind, path: PathBuf, secret: Vec<u8>) {
        self.index.insert((vh, kind), Arc::new((path, Passphrase::new(secret))));
    }

    /// Scrubs every passphrase belonging to `vh` (spec.md §4.1: VH removal).
    pub fn scrub_vh(&self, vh: ServerId) {
        self.index.retain(|(sid, _), _| *sid != vh);
    }

    /// Scrubs every passphrase in the store (spec.md §4.1: process shutdown).
    pub fn scrub_all(&self) {
        self.index.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::num::NonZeroU32;

    fn vh() -> ServerId {
        ServerId(NonZeroU32::new(1).unwrap())
    }

    #[test]
    fn cache_hit_on_matching_path() {
        let store = PassphraseStore::new();
        let path = PathBuf::from("/etc/ftpd/server.key");
        store.insert(vh(), KeyKind::Rsa, path.clone(), b"hunter2".to_vec());
        assert!(store.cached(vh(), KeyKind::Rsa, &path).is_some());
    }

    #[test]
    fn stale_path_evicts_entry() {
        let store = PassphraseStore::new();
        store.insert(vh(), KeyKind::Rsa, PathBuf::from("/old.key"), b"hunter2".to_vec());
        assert!(store.cached(vh(), KeyKind::Rsa, &PathBuf::from("/new.key")).is_none());
        assert!(store.cached(vh(), KeyKind::Rsa, &PathBuf::from("/old.key")).is_none(), "stale entry must have been evicted");
    }

    #[test]
    fn scrub_vh_only_removes_that_vh() {
        let store = PassphraseStore::new();
        let other = ServerId(NonZeroU32::new(2).unwrap());
        store.insert(vh(), KeyKind::Rsa, PathBuf::from("/a.key"), b"x".to_vec());
        store.insert(other, KeyKind::Rsa, PathBuf::from("/b.key"), b"y".to_vec());
        store.scrub_vh(vh());
        assert!(store.cached(vh(), KeyKind::Rsa, &PathBuf::from("/a.key")).is_none());
        assert!(store.cached(other, KeyKind::Rsa, &PathBuf::from("/b.key")).is_some());
    }

    #[test]
    fn entropy_estimate_is_quarter_bit_per_byte() {
        let p = Passphrase::new(b"01234567".to_vec());
        assert_eq!(p.low_entropy_estimate_bits(), 2);
    }
}
