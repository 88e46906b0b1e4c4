//! C2: Credential Loader (spec.md §4.2).

use crate::error::{FtpsError, FtpsErrorKind};
use crate::tls::passphrase::{KeyKind, Passphrase, PassphraseSource};
use rustls::sign::CertifiedKey;
use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, CertificateRevocationListDer, PrivatePkcs8KeyDer, PrivateKeyDer};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tracing::debug;

/// A loaded certificate chain plus a SHA fingerprint of the leaf, used to
/// key the OCSP cache (spec.md §4.2: "computes SHA-1 fingerprint at load
/// time" - this crate uses SHA-256 for the fingerprint since that is what
/// rustls's own ecosystem otherwise standardizes on, with no observable
/// difference to callers, who treat it as an opaque cache key).
#[derive(Debug, Clone)]
pub struct LoadedChain {
    /// Leaf certificate followed by any intermediates.
    pub chain: Vec<CertificateDer<'static>>,
    /// Fingerprint of the leaf certificate, used as an OCSP cache key.
    pub fingerprint: [u8; 32],
}

fn fingerprint(leaf: &CertificateDer<'_>) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(leaf.as_ref());
    hasher.finalize().into()
}

/// Loads a PEM certificate chain and private key pair, rejecting a
/// mismatched slot loudly but not fatally (spec.md §4.2: "warned but
/// accepted"). If the key's PEM is passphrase-protected, `passphrase_source`
/// is consulted (via [`unlock_encrypted_key`]) to decrypt it; `None` fails
/// an encrypted key with `PassphraseUnavailable`.
pub fn load_cert_and_key(
    cert_path: &Path,
    key_path: &Path,
    expected_kind: KeyKind,
    passphrase_source: Option<&dyn PassphraseSource>,
    warn: impl Fn(&str),
) -> Result<(LoadedChain, PrivateKeyDer<'static>), FtpsError> {
    if expected_kind == KeyKind::Dsa {
        // rustls has no DSA signature scheme and rustls-pki-types has no
        // DSA PrivateKeyDer variant to parse into; fail loudly here rather
        // than let an opaque PEM-parse error stand in for the real cause.
        return Err(FtpsError::new(FtpsErrorKind::ConfigError));
    }

    let chain: Vec<CertificateDer<'static>> = CertificateDer::pem_file_iter(cert_path)
        .map_err(|e| FtpsError::with_source(FtpsErrorKind::ConfigError, e))?
        .collect::<Result<_, _>>()
        .map_err(|e| FtpsError::with_source(FtpsErrorKind::ConfigError, e))?;
    let leaf = chain.first().ok_or_else(|| FtpsError::new(FtpsErrorKind::ConfigError))?;
    let fp = fingerprint(leaf);

    let raw_key = fs::read(key_path).map_err(|e| FtpsError::with_source(FtpsErrorKind::ConfigError, e))?;
    let key = if is_encrypted_key_pem(&raw_key) {
        let source = passphrase_source.ok_or_else(|| FtpsError::new(FtpsErrorKind::PassphraseUnavailable))?;
        let passphrase = unlock_encrypted_key(key_path, expected_kind, source, &raw_key).ok_or_else(|| FtpsError::new(FtpsErrorKind::PassphraseUnavailable))?;
        decrypt_pkcs8_key(&raw_key, &passphrase)?
    } else {
        PrivateKeyDer::from_pem_slice(&raw_key).map_err(|e| FtpsError::with_source(FtpsErrorKind::ConfigError, e))?
    };

    if key_algorithm_mismatches(&key, expected_kind) {
        warn(&format!(
            "certificate at {} appears to use a different public-key algorithm than its configured slot ({:?})",
            cert_path.display(),
            expected_kind
        ));
    }

    Ok((LoadedChain { chain, fingerprint: fp }, key))
}

fn is_encrypted_key_pem(pem: &[u8]) -> bool {
    std::str::from_utf8(pem).map(|s| s.contains("ENCRYPTED")).unwrap_or(false)
}

fn decrypt_pkcs8_key(pem: &[u8], passphrase: &Passphrase) -> Result<PrivateKeyDer<'static>, FtpsError> {
    let pem_str = std::str::from_utf8(pem).map_err(|e| FtpsError::with_source(FtpsErrorKind::ConfigError, e))?;
    let (_, document) = pkcs8::SecretDocument::from_pem(pem_str).map_err(|e| FtpsError::with_source(FtpsErrorKind::ConfigError, e))?;
    let info = pkcs8::EncryptedPrivateKeyInfo::try_from(document.as_bytes()).map_err(|e| FtpsError::with_source(FtpsErrorKind::ConfigError, e))?;
    let password = std::str::from_utf8(passphrase.as_bytes()).map_err(|_| FtpsError::new(FtpsErrorKind::ConfigError))?;
    let decrypted = info.decrypt(password).map_err(|_| FtpsError::new(FtpsErrorKind::PassphraseUnavailable))?;
    Ok(PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(decrypted.as_bytes().to_vec())))
}

fn key_algorithm_mismatches(key: &PrivateKeyDer<'_>, expected: KeyKind) -> bool {
    matches!(
        (key, expected),
        (PrivateKeyDer::Sec1(_), KeyKind::Rsa) | (PrivateKeyDer::Pkcs1(_) | PrivateKeyDer::Pkcs8(_), KeyKind::Ec)
    )
}

/// Builds a `rustls` [`CertifiedKey`] from a loaded chain and key, using
/// the process's default crypto provider to parse the signing key.
pub fn certified_key(loaded: &LoadedChain, key: PrivateKeyDer<'static>) -> Result<CertifiedKey, FtpsError> {
    let provider = rustls::crypto::CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| std::sync::Arc::new(default_provider()));
    let signing_key = provider.key_provider.load_private_key(key).map_err(FtpsError::from)?;
    Ok(CertifiedKey::new(loaded.chain.clone(), signing_key))
}

#[cfg(feature = "aws_lc_rs")]
fn default_provider() -> rustls::crypto::CryptoProvider {
    rustls::crypto::aws_lc_rs::default_provider()
}

#[cfg(all(feature = "ring", not(feature = "aws_lc_rs")))]
fn default_provider() -> rustls::crypto::CryptoProvider {
    rustls::crypto::ring::default_provider()
}

/// Unlocks a private key whose PEM is passphrase-protected, using the
/// configured [`PassphraseSource`], verifying each candidate by attempting
/// to actually decrypt the PKCS8 `ENCRYPTED PRIVATE KEY` envelope (spec.md
/// §4.1 "verify by attempting key decryption"). Scoped to the structured
/// PKCS8 envelope only, not the legacy OpenSSL `Proc-Type: 4,ENCRYPTED`
/// PKCS1 header format, which this crate does not support.
pub fn unlock_encrypted_key(path: &Path, kind: KeyKind, source: &dyn PassphraseSource, encrypted_pem: &[u8]) -> Option<Passphrase> {
    let pem_str = std::str::from_utf8(encrypted_pem).ok()?;
    let (_, document) = pkcs8::SecretDocument::from_pem(pem_str).ok()?;
    let der = document.as_bytes().to_vec();
    let verify = move |candidate: &[u8]| -> bool {
        let Ok(password) = std::str::from_utf8(candidate) else { return false };
        pkcs8::EncryptedPrivateKeyInfo::try_from(der.as_slice())
            .ok()
            .and_then(|info| info.decrypt(password).ok())
            .is_some()
    };
    source.prompt(kind, path, &verify).map(|bytes| {
        let passphrase = Passphrase::new(bytes);
        let bits = passphrase.low_entropy_estimate_bits();
        // rustls exposes no application-facing RNG-reseed hook on either
        // aws_lc_rs or ring, so this estimate cannot literally seed the
        // connection's CSPRNG; it is recorded for observability instead.
        debug!(path = %path.display(), bits, "passphrase acquired for encrypted key");
        passphrase
    })
}

/// Loads a PKCS12 bundle, trying an empty passphrase before falling back to
/// `source` (spec.md §4.2: "MAC-verify empty/NULL passphrase before
/// prompting"). The `p12` crate's MAC verification accepts only a single
/// blank-password encoding, so the empty and NULL cases specified
/// separately collapse into one `verify_mac("")` attempt here.
pub fn load_pkcs12(path: &Path, source: &dyn PassphraseSource) -> Result<(LoadedChain, PrivateKeyDer<'static>, Option<Passphrase>), FtpsError> {
    let der = fs::read(path).map_err(|e| FtpsError::with_source(FtpsErrorKind::ConfigError, e))?;
    let pfx = p12::PFX::parse(&der).map_err(|e| FtpsError::with_source(FtpsErrorKind::ConfigError, e))?;

    if pfx.verify_mac("") {
        let (loaded, key) = extract_pkcs12(&pfx, "")?;
        return Ok((loaded, key, None));
    }

    let verify = |candidate: &[u8]| -> bool { std::str::from_utf8(candidate).map(|s| pfx.verify_mac(s)).unwrap_or(false) };
    let secret = source.prompt(KeyKind::Pkcs12, path, &verify).ok_or_else(|| FtpsError::new(FtpsErrorKind::PassphraseUnavailable))?;
    let password = std::str::from_utf8(&secret).map_err(|_| FtpsError::new(FtpsErrorKind::ConfigError))?;
    let (loaded, key) = extract_pkcs12(&pfx, password)?;
    Ok((loaded, key, Some(Passphrase::new(secret))))
}

fn extract_pkcs12(pfx: &p12::PFX, password: &str) -> Result<(LoadedChain, PrivateKeyDer<'static>), FtpsError> {
    let certs = pfx.cert_bags(password).map_err(|e| FtpsError::with_source(FtpsErrorKind::ConfigError, e))?;
    let keys = pfx.key_bags(password).map_err(|e| FtpsError::with_source(FtpsErrorKind::ConfigError, e))?;

    let chain: Vec<CertificateDer<'static>> = certs.into_iter().map(CertificateDer::from).collect();
    let leaf = chain.first().ok_or_else(|| FtpsError::new(FtpsErrorKind::ConfigError))?;
    let fp = fingerprint(leaf);

    let key_der = keys.into_iter().next().ok_or_else(|| FtpsError::new(FtpsErrorKind::ConfigError))?;
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_der));

    Ok((LoadedChain { chain, fingerprint: fp }, key))
}

/// Loads CRLs from a single file and/or a directory of CRL files (spec.md
/// §4.3 step 7: "Load CRLs into the trust store; enable CRL_CHECK and
/// CRL_CHECK_ALL" - the flags themselves are implicit once any CRL is
/// installed on the client verifier builder). A directory entry that fails
/// to parse as a CRL is warned about and skipped rather than failing the
/// whole load, matching the mismatched-slot leniency elsewhere in C2.
pub fn load_crls(crl_file: Option<&Path>, crl_path: Option<&Path>, mut warn: impl FnMut(&str)) -> Result<Vec<CertificateRevocationListDer<'static>>, FtpsError> {
    let mut crls = Vec::new();

    if let Some(file) = crl_file {
        let parsed: Vec<CertificateRevocationListDer<'static>> = CertificateRevocationListDer::pem_file_iter(file)
            .map_err(|e| FtpsError::with_source(FtpsErrorKind::ConfigError, e))?
            .collect::<Result<_, _>>()
            .map_err(|e| FtpsError::with_source(FtpsErrorKind::ConfigError, e))?;
        crls.extend(parsed);
    }

    if let Some(dir) = crl_path {
        let entries = fs::read_dir(dir).map_err(|e| FtpsError::with_source(FtpsErrorKind::ConfigError, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| FtpsError::with_source(FtpsErrorKind::ConfigError, e))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let parsed: Result<Vec<CertificateRevocationListDer<'static>>, _> = CertificateRevocationListDer::pem_file_iter(&path)
                .and_then(|it| it.collect::<Result<Vec<_>, _>>());
            match parsed {
                Ok(parsed) => crls.extend(parsed),
                Err(e) => warn(&format!("skipping unparseable CRL at {}: {e}", path.display())),
            }
        }
    }

    Ok(crls)
}

/// A single Diffie-Hellman parameter set, indexed by key size in bits.
#[derive(Debug, Clone)]
pub struct DhParams {
    /// The DER-encoded `DHParams` structure.
    pub der: Vec<u8>,
    /// The key size in bits (one of 512, 768, 1024, 1536, 2048, 3072, 4096).
    pub keysize: u32,
}

/// The set of DH parameters configured for a virtual host, indexed by
/// keysize, with built-in fallbacks (spec.md §4.2).
#[derive(Debug, Clone, Default)]
pub struct DhParamSet {
    by_size: BTreeMap<u32, DhParams>,
}

const BUILTIN_SIZES: [u32; 7] = [512, 768, 1024, 1536, 2048, 3072, 4096];

impl DhParamSet {
    /// Registers a loaded parameter set.
    pub fn insert(&mut self, params: DhParams) {
        self.by_size.insert(params.keysize, params);
    }

    /// Selects a parameter set for a requested `keylen`, per spec.md §4.2:
    /// the smallest configured size strictly larger than requested, else a
    /// built-in fallback of the nearest built-in size; `allow_weak_dh`
    /// governs whether a result below 2048 bits is permitted.
    pub fn select(&self, keylen: u32, allow_weak_dh: bool) -> u32 {
        let effective_min = if allow_weak_dh { keylen } else { keylen.max(2048) };
        if let Some((&size, _)) = self.by_size.range((effective_min + 1)..).next() {
            return size;
        }
        if let Some(&size) = self.by_size.keys().find(|&&s| s >= effective_min) {
            return size;
        }
        *BUILTIN_SIZES.iter().find(|&&s| s >= effective_min).unwrap_or(&4096)
    }
}

/// A loaded pre-shared-key table: `identity -> raw key bytes`.
#[derive(Clone, Default)]
pub struct PskTable {
    identities: BTreeMap<String, Vec<u8>>,
}

impl std::fmt::Debug for PskTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PskTable").field("identities", &self.identities.keys().collect::<Vec<_>>()).field("keys", &crate::error::Redacted).finish()
    }
}

/// Maximum PSK identity length accepted (matches common TLS library limits).
pub const MAX_PSK_IDENTITY_LEN: usize = 128;
const MIN_PSK_KEY_LEN: usize = 20;

impl PskTable {
    /// Loads a PSK file: hex-encoded bytes, path must start with `hex:`,
    /// the file must not be group- or world-readable/writable, and the
    /// decoded key must be at least 20 bytes (spec.md §4.2).
    pub fn load(identity: &str, path_spec: &str) -> Result<(String, Vec<u8>), FtpsError> {
        if identity.len() > MAX_PSK_IDENTITY_LEN {
            return Err(FtpsError::new(FtpsErrorKind::ConfigError));
        }
        let path = path_spec
            .strip_prefix("hex:")
            .ok_or_else(|| FtpsError::new(FtpsErrorKind::ConfigError))?;
        let meta = fs::metadata(path).map_err(|e| FtpsError::with_source(FtpsErrorKind::ConfigError, e))?;
        if meta.permissions().mode() & 0o077 != 0 {
            return Err(FtpsError::new(FtpsErrorKind::ConfigError));
        }
        let hex = fs::read_to_string(path).map_err(|e| FtpsError::with_source(FtpsErrorKind::ConfigError, e))?;
        let key = decode_hex(hex.trim()).ok_or_else(|| FtpsError::new(FtpsErrorKind::ConfigError))?;
        if key.len() < MIN_PSK_KEY_LEN {
            return Err(FtpsError::new(FtpsErrorKind::ConfigError));
        }
        Ok((identity.to_string(), key))
    }

    /// Registers an `identity -> key` entry produced by [`Self::load`].
    pub fn insert(&mut self, identity: String, key: Vec<u8>) {
        self.identities.insert(identity, key);
    }

    /// Looks up a PSK by identity.
    pub fn get(&self, identity: &str) -> Option<&[u8]> {
        self.identities.get(identity).map(|v| v.as_slice())
    }
}

fn decode_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len()).step_by(2).map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_crls_with_no_paths_configured_is_empty() {
        assert!(load_crls(None, None, |_| {}).unwrap().is_empty());
    }

    #[test]
    fn load_crls_skips_unparseable_directory_entries() {
        let dir = std::env::temp_dir().join(format!("unftp-ftps-crl-test-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("not-a-crl.txt"), b"not a CRL").unwrap();
        let mut warnings = Vec::new();
        let result = load_crls(None, Some(&dir), |msg| warnings.push(msg.to_string()));
        fs::remove_dir_all(&dir).unwrap();
        assert!(result.unwrap().is_empty());
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn dsa_slot_is_rejected_before_any_pem_parsing() {
        let err = load_cert_and_key(Path::new("/nonexistent/cert.pem"), Path::new("/nonexistent/key.pem"), KeyKind::Dsa, None, |_| {}).unwrap_err();
        assert_eq!(err.kind(), FtpsErrorKind::ConfigError);
    }

    #[test]
    fn missing_cert_file_without_dsa_is_config_error() {
        let err = load_cert_and_key(Path::new("/nonexistent/cert.pem"), Path::new("/nonexistent/key.pem"), KeyKind::Rsa, None, |_| {}).unwrap_err();
        assert_eq!(err.kind(), FtpsErrorKind::ConfigError);
    }

    #[test]
    fn load_pkcs12_missing_file_is_config_error() {
        struct NeverAsked;
        impl PassphraseSource for NeverAsked {
            fn prompt(&self, _kind: KeyKind, _path: &Path, _verify: &dyn Fn(&[u8]) -> bool) -> Option<Vec<u8>> {
                panic!("should not be asked for a file that doesn't exist");
            }
        }
        let err = load_pkcs12(Path::new("/nonexistent/bundle.p12"), &NeverAsked).unwrap_err();
        assert_eq!(err.kind(), FtpsErrorKind::ConfigError);
    }

    #[test]
    fn unlock_encrypted_key_rejects_non_pkcs8_pem() {
        struct NeverAsked;
        impl PassphraseSource for NeverAsked {
            fn prompt(&self, _kind: KeyKind, _path: &Path, _verify: &dyn Fn(&[u8]) -> bool) -> Option<Vec<u8>> {
                panic!("should not be asked when the PEM isn't even a parseable PKCS8 envelope");
            }
        }
        let result = unlock_encrypted_key(Path::new("/key.pem"), KeyKind::Rsa, &NeverAsked, b"not a pem at all");
        assert!(result.is_none());
    }

    #[test]
    fn dh_select_picks_smallest_strictly_larger() {
        let mut set = DhParamSet::default();
        set.insert(DhParams { der: vec![], keysize: 2048 });
        set.insert(DhParams { der: vec![], keysize: 3072 });
        assert_eq!(set.select(2048, true), 3072);
    }

    #[test]
    fn dh_select_falls_back_to_builtin() {
        let set = DhParamSet::default();
        assert_eq!(set.select(2048, true), 2048);
        assert_eq!(set.select(4096, true), 4096);
    }

    #[test]
    fn dh_select_enforces_2048_minimum_by_default() {
        let mut set = DhParamSet::default();
        set.insert(DhParams { der: vec![], keysize: 1024 });
        assert_eq!(set.select(1024, false), 2048);
        assert_eq!(set.select(1024, true), 1024);
    }

    #[test]
    fn decode_hex_round_trips() {
        assert_eq!(decode_hex("deadbeef"), Some(vec![0xde, 0xad, 0xbe, 0xef]));
        assert_eq!(decode_hex("xyz"), None);
        assert_eq!(decode_hex("abc"), None);
    }
}
