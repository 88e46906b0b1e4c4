//! C7: Handshake Engine (spec.md §4.7).

use crate::error::{FtpsError, FtpsErrorKind};
use crate::options::RenegotiationPolicy;
use crate::session::{Channel, ChannelSession, TlsSessionState};
use crate::tls::io_interceptor::{renegotiation_timed_out, should_renegotiate, ByteCounters};
use crate::tls::tickets::TicketKeyRing;
use rustls::server::ProducesTickets;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::{TlsAcceptor, TlsConnector};

/// Which side of the handshake this crate plays (spec.md §4.7: `role ∈
/// {server, client}`). Client role is used for SSCN client mode, where the
/// server drives the data channel's TLS as a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Act as the TLS server.
    Server,
    /// Act as the TLS client (SSCN client mode).
    Client,
}

/// Per-connection wiring for the ticket-appdata cross-channel proof
/// (spec.md §4.7 "Ticket appdata trick"). `rustls::server::ProducesTickets`
/// has no native appdata hook, so this crate appends/strips the 32 bytes
/// around the shared [`TicketKeyRing`]'s own encrypt/decrypt, using a
/// *per-connection* ticketer instance (not the shared ring-wide one)
/// installed just for this handshake.
pub struct ControlTicketer {
    ring: Arc<TicketKeyRing>,
    appdata: [u8; 32],
}

impl std::fmt::Debug for ControlTicketer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlTicketer").finish_non_exhaustive()
    }
}

impl ControlTicketer {
    /// Creates a per-connection ticketer that binds `appdata` into every
    /// ticket it issues.
    pub fn new(ring: Arc<TicketKeyRing>, appdata: [u8; 32]) -> Self {
        ControlTicketer { ring, appdata }
    }
}

impl ProducesTickets for ControlTicketer {
    fn enabled(&self) -> bool {
        true
    }

    fn lifetime(&self) -> u32 {
        3600
    }

    fn encrypt(&self, plain: &[u8]) -> Option<Vec<u8>> {
        let mut augmented = plain.to_vec();
        augmented.extend_from_slice(&self.appdata);
        crate::tls::tickets::encrypt_with_ring(&self.ring, &augmented)
    }

    fn decrypt(&self, cipher: &[u8]) -> Option<Vec<u8>> {
        let full = crate::tls::tickets::decrypt_with_ring(&self.ring, cipher)?;
        full.len().checked_sub(32).map(|n| full[..n].to_vec())
    }
}

/// Mirror of [`ControlTicketer`] for the data channel: decrypting a ticket
/// records, via `matched`, whether its trailing appdata equals the control
/// channel's (spec.md Testable Property 2).
pub struct DataTicketer {
    ring: Arc<TicketKeyRing>,
    expected_appdata: [u8; 32],
    matched: Arc<AtomicBool>,
}

impl std::fmt::Debug for DataTicketer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataTicketer").finish_non_exhaustive()
    }
}

impl DataTicketer {
    /// Creates a per-connection ticketer expecting `expected_appdata`;
    /// `matched` is flipped to `true` the first time a decrypted ticket's
    /// appdata equals it.
    pub fn new(ring: Arc<TicketKeyRing>, expected_appdata: [u8; 32], matched: Arc<AtomicBool>) -> Self {
        DataTicketer { ring, expected_appdata, matched }
    }
}

impl ProducesTickets for DataTicketer {
    fn enabled(&self) -> bool {
        true
    }

    fn lifetime(&self) -> u32 {
        3600
    }

    fn encrypt(&self, plain: &[u8]) -> Option<Vec<u8>> {
        // Data-channel uploads must not force ticket renewal (spec.md §4.4):
        // we still honor encrypt requests (rustls may issue one regardless)
        // but data-channel tickets carry no appdata of their own.
        crate::tls::tickets::encrypt_with_ring(&self.ring, plain)
    }

    fn decrypt(&self, cipher: &[u8]) -> Option<Vec<u8>> {
        let full = crate::tls::tickets::decrypt_with_ring(&self.ring, cipher)?;
        let n = full.len().checked_sub(32)?;
        let (session, tail) = full.split_at(n);
        if tail == self.expected_appdata {
            self.matched.store(true, Ordering::SeqCst);
        }
        Some(session.to_vec())
    }
}

/// The outcome of a completed handshake, used to populate a
/// [`ChannelSession`] and run the session-reuse check.
pub struct HandshakeOutcome {
    /// The channel session record, ready for reuse comparison/notes.
    pub session: ChannelSession,
}

/// Performs a server-role TLS handshake on `io`, bounded by
/// `handshake_timeout` (spec.md §4.7). `channel` determines whether
/// control- or data-channel rules apply to the *caller*; this function
/// itself only drives the handshake and reports what was negotiated - the
/// session-reuse enforcement is [`enforce_session_reuse`], run by the
/// caller once both channel sessions are known.
pub async fn server_handshake<IO>(acceptor: &TlsAcceptor, io: IO, channel: Channel, handshake_timeout: Duration) -> Result<(tokio_rustls::server::TlsStream<IO>, HandshakeOutcome), FtpsError>
where
    IO: AsyncRead + AsyncWrite + Unpin,
{
    let outcome = tokio::time::timeout(handshake_timeout, acceptor.accept(io))
        .await
        .map_err(|_| FtpsError::new(FtpsErrorKind::HandshakeTimeout))
        .and_then(|r| r.map_err(classify_io_error));

    #[cfg(feature = "prometheus")]
    crate::metrics::observe_handshake(channel, outcome.is_ok());

    let stream = outcome?;
    let (_, conn) = stream.get_ref();
    let mut session = ChannelSession::new(channel);
    session.negotiated_version = conn.protocol_version().map(protocol_version_name);
    session.negotiated_cipher = conn.negotiated_cipher_suite().map(|cs| format!("{:?}", cs.suite()));

    Ok((stream, HandshakeOutcome { session }))
}

/// Performs a client-role TLS handshake (SSCN client mode, spec.md §4.9).
pub async fn client_handshake<IO>(connector: &TlsConnector, domain: rustls_pki_types::ServerName<'static>, io: IO, handshake_timeout: Duration) -> Result<(tokio_rustls::client::TlsStream<IO>, HandshakeOutcome), FtpsError>
where
    IO: AsyncRead + AsyncWrite + Unpin,
{
    let outcome = tokio::time::timeout(handshake_timeout, connector.connect(domain, io))
        .await
        .map_err(|_| FtpsError::new(FtpsErrorKind::HandshakeTimeout))
        .and_then(|r| r.map_err(classify_io_error));

    #[cfg(feature = "prometheus")]
    crate::metrics::observe_handshake(Channel::Data, outcome.is_ok());

    let stream = outcome?;
    let (_, conn) = stream.get_ref();
    let mut session = ChannelSession::new(Channel::Data);
    session.negotiated_version = conn.protocol_version().map(protocol_version_name);
    session.negotiated_cipher = conn.negotiated_cipher_suite().map(|cs| format!("{:?}", cs.suite()));

    Ok((stream, HandshakeOutcome { session }))
}

fn protocol_version_name(v: rustls::ProtocolVersion) -> &'static str {
    match v {
        rustls::ProtocolVersion::TLSv1_2 => "TLSv1.2",
        rustls::ProtocolVersion::TLSv1_3 => "TLSv1.3",
        _ => "unknown",
    }
}

fn classify_io_error(e: std::io::Error) -> FtpsError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        FtpsError::with_source(FtpsErrorKind::UnexpectedEof, e)
    } else {
        FtpsError::with_source(FtpsErrorKind::HandshakeProtocol, e)
    }
}

/// spec.md Testable Property 2 / §4.7 "enforce session reuse from control":
/// a data channel must either reuse the control session, or one of the two
/// documented escapes applies.
pub fn enforce_session_reuse(data: &ChannelSession, control: &ChannelSession, no_session_reuse_required: bool, have_ccc: bool) -> Result<(), FtpsError> {
    if no_session_reuse_required || have_ccc {
        return Ok(());
    }
    if data.reused_from(control) {
        Ok(())
    } else {
        #[cfg(feature = "prometheus")]
        crate::metrics::inc_session_reuse_failure();
        Err(FtpsError::new(FtpsErrorKind::SessionReuseRequired))
    }
}

/// spec.md §4.7: if the peer cert was sent on the control channel, the
/// data channel's peer cert must be byte-identical.
pub fn enforce_peer_cert_consistency(ctrl_peer_cert: Option<&[u8]>, data_peer_cert: Option<&[u8]>) -> Result<(), FtpsError> {
    match (ctrl_peer_cert, data_peer_cert) {
        (Some(a), Some(b)) if a == b => Ok(()),
        (Some(_), _) => Err(FtpsError::new(FtpsErrorKind::PeerAuthFailure)),
        (None, _) => Ok(()),
    }
}

/// The outcome of evaluating whether a data channel should renegotiate
/// right now, decoupled from actually driving the rustls connection so it
/// can be tested without a live `ServerConnection`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RenegotiationAction {
    /// Nothing to do this tick.
    None,
    /// The byte threshold was crossed; issue a TLS 1.3 key update now.
    KeyUpdate,
    /// A renegotiation was in flight and has timed out.
    TimedOut {
        /// Whether a completed renegotiation was mandatory.
        required: bool,
    },
}

fn decide_data_renegotiation(
    counters: &ByteCounters,
    last_renegotiation_bytes: u64,
    policy: &RenegotiationPolicy,
    renegotiation_started_at: Option<Instant>,
    now: Instant,
) -> RenegotiationAction {
    let RenegotiationPolicy::Enabled { data_bytes, required, timeout, .. } = policy else {
        return RenegotiationAction::None;
    };

    if let Some(started_at) = renegotiation_started_at {
        if renegotiation_timed_out(started_at, *timeout, now) {
            return RenegotiationAction::TimedOut { required: *required };
        }
        return RenegotiationAction::None;
    }

    if should_renegotiate(counters, last_renegotiation_bytes, *data_bytes) {
        RenegotiationAction::KeyUpdate
    } else {
        RenegotiationAction::None
    }
}

/// Drives the data channel's opportunistic TLS 1.3 key update once
/// `RenegotiationPolicy::data_bytes` is crossed (spec.md §1 item 2, §4.9,
/// §6), tracking the in-flight renegotiation via
/// `SessionFlags::DATA_RENEGOTIATING` and
/// `TlsSessionState::renegotiation_started_at`. If a renegotiation was
/// required and timed out, the session fails with `HandshakeProtocol`.
/// Control-channel renegotiation, which spec.md §6 drives by a command
/// count (`ctrl_commands`) rather than a byte count, is the control
/// command dispatch loop's responsibility (C10), not this function's.
pub fn drive_data_renegotiation(
    conn: &mut rustls::ServerConnection,
    counters: &ByteCounters,
    last_renegotiation_bytes: &AtomicU64,
    policy: &RenegotiationPolicy,
    session: &mut TlsSessionState,
    now: Instant,
) -> Result<(), FtpsError> {
    match decide_data_renegotiation(counters, last_renegotiation_bytes.load(Ordering::Relaxed), policy, session.renegotiation_started_at, now) {
        RenegotiationAction::None => Ok(()),
        RenegotiationAction::KeyUpdate => {
            if conn.refresh_traffic_keys().is_ok() {
                last_renegotiation_bytes.store(counters.total(), Ordering::Relaxed);
                session.flags.set_data_renegotiating(true);
                session.renegotiation_started_at = Some(now);
            }
            Ok(())
        }
        RenegotiationAction::TimedOut { required } => {
            session.flags.set_data_renegotiating(false);
            session.renegotiation_started_at = None;
            if required {
                Err(FtpsError::new(FtpsErrorKind::HandshakeProtocol))
            } else {
                Ok(())
            }
        }
    }
}

/// The graceful-shutdown peek heuristic (spec.md §5 "Graceful TLS shutdown
/// edge-case"): peeks up to 3 bytes with a 5s timeout before awaiting
/// close_notify; if every peeked byte is printable ASCII, the peer is
/// presumed to have sent a plaintext command without close_notify and the
/// bidirectional shutdown must stop immediately rather than stall.
pub async fn should_skip_bidirectional_shutdown<F>(peek: F) -> bool
where
    F: std::future::Future<Output = std::io::Result<Vec<u8>>>,
{
    match tokio::time::timeout(Duration::from_secs(5), peek).await {
        Ok(Ok(bytes)) if !bytes.is_empty() => bytes.iter().all(|b| b.is_ascii_graphic() || *b == b' '),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tls::tickets::TicketKeyRing;

    #[test]
    fn control_ticketer_round_trips_and_strips_appdata() {
        let ring = Arc::new(TicketKeyRing::new(Duration::from_secs(3600), 3));
        let ticketer = ControlTicketer::new(ring, [7u8; 32]);
        let cipher = ticketer.encrypt(b"session-state").unwrap();
        assert_eq!(ticketer.decrypt(&cipher).unwrap(), b"session-state");
    }

    #[test]
    fn data_ticketer_detects_matching_appdata() {
        let ring = Arc::new(TicketKeyRing::new(Duration::from_secs(3600), 3));
        let control = ControlTicketer::new(ring.clone(), [9u8; 32]);
        let cipher = control.encrypt(b"session-state").unwrap();

        let matched = Arc::new(AtomicBool::new(false));
        let data = DataTicketer::new(ring, [9u8; 32], matched.clone());
        let plain = data.decrypt(&cipher).unwrap();
        assert_eq!(plain, b"session-state");
        assert!(matched.load(Ordering::SeqCst));
    }

    #[test]
    fn data_ticketer_rejects_mismatched_appdata() {
        let ring = Arc::new(TicketKeyRing::new(Duration::from_secs(3600), 3));
        let control = ControlTicketer::new(ring.clone(), [1u8; 32]);
        let cipher = control.encrypt(b"session-state").unwrap();

        let matched = Arc::new(AtomicBool::new(false));
        let data = DataTicketer::new(ring, [2u8; 32], matched.clone());
        data.decrypt(&cipher).unwrap();
        assert!(!matched.load(Ordering::SeqCst));
    }

    #[test]
    fn session_reuse_escape_hatches() {
        let ctrl = ChannelSession::new(Channel::Ctrl);
        let data = ChannelSession::new(Channel::Data);
        assert!(enforce_session_reuse(&data, &ctrl, true, false).is_ok());
        assert!(enforce_session_reuse(&data, &ctrl, false, true).is_ok());
        assert!(enforce_session_reuse(&data, &ctrl, false, false).is_err());
    }

    #[test]
    fn peer_cert_consistency_requires_byte_equality() {
        assert!(enforce_peer_cert_consistency(Some(&[1, 2]), Some(&[1, 2])).is_ok());
        assert!(enforce_peer_cert_consistency(Some(&[1, 2]), Some(&[1, 3])).is_err());
        assert!(enforce_peer_cert_consistency(None, None).is_ok());
    }

    #[tokio::test]
    async fn printable_ascii_peek_skips_bidirectional_shutdown() {
        let skip = should_skip_bidirectional_shutdown(async { Ok(b"PWD\r\n".to_vec()) }).await;
        assert!(skip);
    }

    #[tokio::test]
    async fn binary_peek_does_not_skip_shutdown() {
        let skip = should_skip_bidirectional_shutdown(async { Ok(vec![0x16, 0x03, 0x03]) }).await;
        assert!(!skip);
    }

    #[test]
    fn renegotiation_disabled_by_policy_is_a_no_op() {
        let counters = ByteCounters::default();
        counters.add_written(1_000_000);
        let now = Instant::now();
        assert_eq!(
            decide_data_renegotiation(&counters, 0, &crate::options::RenegotiationPolicy::None, None, now),
            RenegotiationAction::None
        );
    }

    #[test]
    fn renegotiation_triggers_past_threshold() {
        let counters = ByteCounters::default();
        counters.add_written(1_000_000);
        let policy = crate::options::RenegotiationPolicy::Enabled {
            ctrl_commands: None,
            data_bytes: Some(500_000),
            required: false,
            timeout: Duration::from_secs(5),
        };
        let now = Instant::now();
        assert_eq!(decide_data_renegotiation(&counters, 0, &policy, None, now), RenegotiationAction::KeyUpdate);
        assert_eq!(decide_data_renegotiation(&counters, 900_000, &policy, None, now), RenegotiationAction::None);
    }

    #[test]
    fn required_renegotiation_timeout_fails() {
        let counters = ByteCounters::default();
        let policy = crate::options::RenegotiationPolicy::Enabled {
            ctrl_commands: None,
            data_bytes: Some(500_000),
            required: true,
            timeout: Duration::from_secs(5),
        };
        let started = Instant::now();
        let now = started + Duration::from_secs(6);
        assert_eq!(
            decide_data_renegotiation(&counters, 0, &policy, Some(started), now),
            RenegotiationAction::TimedOut { required: true }
        );
    }

    #[test]
    fn in_flight_renegotiation_within_timeout_is_a_no_op() {
        let counters = ByteCounters::default();
        let policy = crate::options::RenegotiationPolicy::Enabled {
            ctrl_commands: None,
            data_bytes: Some(500_000),
            required: true,
            timeout: Duration::from_secs(5),
        };
        let started = Instant::now();
        assert_eq!(decide_data_renegotiation(&counters, 0, &policy, Some(started), started), RenegotiationAction::None);
    }
}
