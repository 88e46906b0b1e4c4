//! C4: Session Ticket Key Ring (spec.md §4.4).
//!
//! A process-wide, time-ordered ring of session ticket keys. Newest key
//! encrypts; any key in the ring can decrypt, looked up by its 16-byte
//! name. rustls's [`rustls::server::ProducesTickets`] trait has no hook
//! for "decrypted with an old key, please renew" vs "decrypted with an
//! old key, don't bother": we keep that distinction in [`DecryptOutcome`] for
//! the handshake engine (C7) to act on - the control channel installs the
//! renewing adapter, data channels install the non-renewing one - even
//! though a single rustls connection only consults whichever adapter was
//! installed in its `ServerConfig`.

use getrandom::fill;
use rustls::server::ProducesTickets;
use std::collections::VecDeque;
use std::sync::RwLock;
use std::time::{Duration, Instant};

const KEY_NAME_LEN: usize = 16;
const CIPHER_KEY_LEN: usize = 32;
const HMAC_KEY_LEN: usize = 32;

/// A single session ticket key (spec.md §3 "Session Ticket Key").
#[derive(Clone)]
pub struct TicketKey {
    name: [u8; KEY_NAME_LEN],
    cipher_key: [u8; CIPHER_KEY_LEN],
    hmac_key: [u8; HMAC_KEY_LEN],
    created_at: Instant,
}

impl std::fmt::Debug for TicketKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TicketKey")
            .field("name", &hex_encode(&self.name))
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

impl TicketKey {
    fn generate() -> Self {
        let mut name = [0u8; KEY_NAME_LEN];
        let mut cipher_key = [0u8; CIPHER_KEY_LEN];
        let mut hmac_key = [0u8; HMAC_KEY_LEN];
        fill(&mut name).expect("system RNG must be available to generate ticket key names");
        fill(&mut cipher_key).expect("system RNG must be available to generate ticket keys");
        fill(&mut hmac_key).expect("system RNG must be available to generate ticket keys");
        let key = TicketKey {
            name,
            cipher_key,
            hmac_key,
            created_at: Instant::now(),
        };
        // Best-effort: pages backing secret material should be mlocked where
        // privileges permit (spec.md §4.4, §9). Not fatal if it fails (e.g.
        // inside a container without CAP_IPC_LOCK) - matches `nix::mman` usage
        // elsewhere in this crate (see src/tls/passphrase.rs).
        let _ = crate::tls::lock_secret(&key.cipher_key);
        let _ = crate::tls::lock_secret(&key.hmac_key);
        key
    }

    fn age(&self) -> Duration {
        self.created_at.elapsed()
    }
}

impl Drop for TicketKey {
    fn drop(&mut self) {
        let _ = crate::tls::unlock_secret(&self.cipher_key);
        let _ = crate::tls::unlock_secret(&self.hmac_key);
        self.cipher_key.fill(0);
        self.hmac_key.fill(0);
    }
}

/// What the ring's name-based lookup found, for channel-aware callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecryptOutcome {
    /// Decrypted with the current newest key; no action needed.
    UsedNewest,
    /// Decrypted with an older key; control-channel sessions should request
    /// ticket renewal on the next resumption.
    UsedOlderRenew,
    /// Decrypted with an older key; data-channel transfers should *not*
    /// request renewal (avoids a well-known stall against clients that
    /// haven't started writing yet - spec.md §4.4).
    UsedOlderNoRenew,
    /// No key in the ring matches the requested name.
    NotFound,
}

/// The ticket key ring itself: rotation, eviction and lookup-by-name.
/// Cheap to clone (wrap in `Arc` at the call site - this type holds the
/// lock internally so a single instance is meant to be shared).
pub struct TicketKeyRing {
    keys: RwLock<VecDeque<TicketKey>>,
    max_age: Duration,
    max_count: usize,
}

impl std::fmt::Debug for TicketKeyRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TicketKeyRing")
            .field("max_age", &self.max_age)
            .field("max_count", &self.max_count)
            .field("len", &self.keys.read().unwrap().len())
            .finish()
    }
}

impl TicketKeyRing {
    /// Creates a ring seeded with a single freshly generated key.
    pub fn new(max_age: Duration, max_count: usize) -> Self {
        let ring = TicketKeyRing {
            keys: RwLock::new(VecDeque::new()),
            max_age,
            max_count: max_count.max(1),
        };
        ring.rotate();
        ring
    }

    /// The timer interval this ring wants rotated on (spec.md §4.4:
    /// `min(3600, max_age - 1)` seconds).
    pub fn rotation_interval(&self) -> Duration {
        let cap = Duration::from_secs(3600);
        let almost_max_age = self.max_age.checked_sub(Duration::from_secs(1)).unwrap_or(Duration::from_secs(1));
        cap.min(almost_max_age)
    }

    /// Generates a new key and admits it, evicting stale/excess keys first
    /// (spec.md §4.4 "Admission").
    pub fn rotate(&self) {
        let mut keys = self.keys.write().unwrap();
        keys.retain(|k| k.age() <= self.max_age);
        if keys.len() >= self.max_count {
            keys.pop_back();
        }
        keys.push_front(TicketKey::generate());
        #[cfg(feature = "prometheus")]
        crate::metrics::inc_ticket_rotation();
    }

    /// Number of keys currently retained (invariant: always ≥ 1, ≤ max_count).
    pub fn len(&self) -> usize {
        self.keys.read().unwrap().len()
    }

    /// True if the ring holds no keys - should never happen after `new`.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn newest_name(&self) -> Option<[u8; KEY_NAME_LEN]> {
        self.keys.read().unwrap().front().map(|k| k.name)
    }

    /// Looks up a key by name and classifies the result for a given channel,
    /// without performing any cryptographic operation - used for testing
    /// the admission/eviction/lookup logic independent of AEAD wiring.
    pub fn classify(&self, name: &[u8; KEY_NAME_LEN], is_data_channel: bool) -> DecryptOutcome {
        let keys = self.keys.read().unwrap();
        let Some(found) = keys.iter().find(|k| &k.name == name) else {
            return DecryptOutcome::NotFound;
        };
        if Some(found.name) == self.newest_name() {
            DecryptOutcome::UsedNewest
        } else if is_data_channel {
            DecryptOutcome::UsedOlderNoRenew
        } else {
            DecryptOutcome::UsedOlderRenew
        }
    }
}

/// Adapts a [`TicketKeyRing`] to rustls's [`ProducesTickets`] trait for
/// installation on a control-channel `ServerConfig`.
#[derive(Debug, Clone)]
pub struct ControlChannelTickets {
    ring: std::sync::Arc<TicketKeyRing>,
}

impl ControlChannelTickets {
    /// Wraps `ring` for control-channel use.
    pub fn new(ring: std::sync::Arc<TicketKeyRing>) -> Self {
        ControlChannelTickets { ring }
    }
}

/// As [`ControlChannelTickets`] but for data channels: see the module-level
/// note on why rustls can't be told to skip renewal for a single decrypt.
#[derive(Debug, Clone)]
pub struct DataChannelTickets {
    ring: std::sync::Arc<TicketKeyRing>,
}

impl DataChannelTickets {
    /// Wraps `ring` for data-channel use.
    pub fn new(ring: std::sync::Arc<TicketKeyRing>) -> Self {
        DataChannelTickets { ring }
    }
}

pub(crate) fn encrypt_with_ring(ring: &TicketKeyRing, plain: &[u8]) -> Option<Vec<u8>> {
    let keys = ring.keys.read().unwrap();
    let newest = keys.front()?;
    Some(aead_seal(newest, plain))
}

pub(crate) fn decrypt_with_ring(ring: &TicketKeyRing, cipher: &[u8]) -> Option<Vec<u8>> {
    if cipher.len() < KEY_NAME_LEN {
        return None;
    }
    let (name, body) = cipher.split_at(KEY_NAME_LEN);
    let keys = ring.keys.read().unwrap();
    let key = keys.iter().find(|k| k.name.as_slice() == name)?;
    aead_open(key, body)
}

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type HmacSha256 = hmac::Hmac<sha2::Sha256>;

/// An AES-256-CBC + HMAC-SHA256 encrypt-then-MAC framing, matching the wire
/// shape spec.md §4.4/§6 describes (16-byte name ‖ 32-byte AES key ‖ 32-byte
/// HMAC key per [`TicketKey`]; on the wire: name ‖ iv ‖ ciphertext ‖ tag).
fn aead_seal(key: &TicketKey, plain: &[u8]) -> Vec<u8> {
    use cbc::cipher::{BlockEncryptMut, KeyIvInit};
    use hmac::Mac;

    let mut iv = [0u8; 16];
    fill(&mut iv).expect("system RNG must be available to seal a ticket");
    let ciphertext = Aes256CbcEnc::new(&key.cipher_key.into(), &iv.into()).encrypt_padded_vec_mut::<cbc::cipher::block_padding::Pkcs7>(plain);

    let mut body = Vec::with_capacity(16 + ciphertext.len());
    body.extend_from_slice(&iv);
    body.extend_from_slice(&ciphertext);

    let mut mac = HmacSha256::new_from_slice(&key.hmac_key).expect("HMAC accepts keys of any length");
    mac.update(&body);
    let tag = mac.finalize().into_bytes();

    let mut out = Vec::with_capacity(KEY_NAME_LEN + body.len() + tag.len());
    out.extend_from_slice(&key.name);
    out.extend_from_slice(&body);
    out.extend_from_slice(&tag);
    out
}

fn aead_open(key: &TicketKey, body_and_tag: &[u8]) -> Option<Vec<u8>> {
    use cbc::cipher::{BlockDecryptMut, KeyIvInit};
    use hmac::Mac;

    if body_and_tag.len() < 16 + 32 {
        return None;
    }
    let (body, tag) = body_and_tag.split_at(body_and_tag.len() - 32);

    let mut mac = HmacSha256::new_from_slice(&key.hmac_key).expect("HMAC accepts keys of any length");
    mac.update(body);
    mac.verify_slice(tag).ok()?;

    let (iv, ciphertext) = body.split_at(16);
    Aes256CbcDec::new(&key.cipher_key.into(), iv.into())
        .decrypt_padded_vec_mut::<cbc::cipher::block_padding::Pkcs7>(ciphertext)
        .ok()
}

impl ProducesTickets for ControlChannelTickets {
    fn enabled(&self) -> bool {
        true
    }

    fn lifetime(&self) -> u32 {
        self.ring.max_age.as_secs().min(u32::MAX as u64) as u32
    }

    fn encrypt(&self, plain: &[u8]) -> Option<Vec<u8>> {
        encrypt_with_ring(&self.ring, plain)
    }

    fn decrypt(&self, cipher: &[u8]) -> Option<Vec<u8>> {
        decrypt_with_ring(&self.ring, cipher)
    }
}

impl ProducesTickets for DataChannelTickets {
    fn enabled(&self) -> bool {
        true
    }

    fn lifetime(&self) -> u32 {
        self.ring.max_age.as_secs().min(u32::MAX as u64) as u32
    }

    fn encrypt(&self, plain: &[u8]) -> Option<Vec<u8>> {
        encrypt_with_ring(&self.ring, plain)
    }

    fn decrypt(&self, cipher: &[u8]) -> Option<Vec<u8>> {
        decrypt_with_ring(&self.ring, cipher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_with_exactly_one_key() {
        let ring = TicketKeyRing::new(Duration::from_secs(120), 3);
        assert_eq!(ring.len(), 1);
    }

    #[test]
    fn admission_evicts_oldest_at_capacity() {
        let ring = TicketKeyRing::new(Duration::from_secs(3600), 2);
        ring.rotate();
        assert_eq!(ring.len(), 2);
        ring.rotate();
        assert_eq!(ring.len(), 2, "max_count must never be exceeded");
    }

    #[test]
    fn names_are_unique_across_rotations() {
        let ring = TicketKeyRing::new(Duration::from_secs(3600), 8);
        for _ in 0..7 {
            ring.rotate();
        }
        let keys = ring.keys.read().unwrap();
        let mut names: Vec<_> = keys.iter().map(|k| k.name).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), keys.len());
    }

    #[test]
    fn rotation_interval_caps_at_one_hour() {
        let ring = TicketKeyRing::new(Duration::from_secs(10_000), 3);
        assert_eq!(ring.rotation_interval(), Duration::from_secs(3600));
    }

    #[test]
    fn rotation_interval_respects_short_max_age() {
        let ring = TicketKeyRing::new(Duration::from_secs(120), 3);
        assert_eq!(ring.rotation_interval(), Duration::from_secs(119));
    }

    #[test]
    fn encrypt_then_decrypt_round_trips() {
        let ring = std::sync::Arc::new(TicketKeyRing::new(Duration::from_secs(3600), 3));
        let ctrl = ControlChannelTickets::new(ring);
        let plain = b"opaque rustls session state".to_vec();
        let cipher = ctrl.encrypt(&plain).unwrap();
        let decrypted = ctrl.decrypt(&cipher).unwrap();
        assert_eq!(plain, decrypted);
    }

    #[test]
    fn decrypt_rejects_tampered_ciphertext() {
        let ring = std::sync::Arc::new(TicketKeyRing::new(Duration::from_secs(3600), 3));
        let ctrl = ControlChannelTickets::new(ring);
        let mut cipher = ctrl.encrypt(b"hello").unwrap();
        let last = cipher.len() - 1;
        cipher[last] ^= 0xff;
        assert!(ctrl.decrypt(&cipher).is_none());
    }

    #[test]
    fn classify_distinguishes_newest_from_older() {
        let ring = TicketKeyRing::new(Duration::from_secs(3600), 3);
        let old_name = ring.newest_name().unwrap();
        ring.rotate();
        assert_eq!(ring.classify(&old_name, false), DecryptOutcome::UsedOlderRenew);
        assert_eq!(ring.classify(&old_name, true), DecryptOutcome::UsedOlderNoRenew);
        let newest = ring.newest_name().unwrap();
        assert_eq!(ring.classify(&newest, false), DecryptOutcome::UsedNewest);
    }

    #[test]
    fn classify_not_found_for_unknown_name() {
        let ring = TicketKeyRing::new(Duration::from_secs(3600), 3);
        assert_eq!(ring.classify(&[0xffu8; KEY_NAME_LEN], false), DecryptOutcome::NotFound);
    }
}
