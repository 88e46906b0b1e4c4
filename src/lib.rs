//! An FTPS (RFC 2228/4217) security core: TLS session negotiation and
//! lifecycle management for FTP servers, modeled on proftpd's `mod_tls`.
//!
//! This crate owns the control-channel AUTH/PBSZ/PROT/CCC/SSCN state
//! machine and everything underneath it - credential loading, the
//! handshake engine, session ticket and cache management, OCSP stapling,
//! SNI/HOST reconciliation and peer certificate verification. It does not
//! implement a full FTP server: command dispatch outside the TLS-relevant
//! subset, storage backends and authentication backends are external
//! collaborators.
//!
//! ```no_run
//! use std::num::NonZeroU32;
//! use std::sync::Arc;
//! use unftp_ftps::options::TicketPolicy;
//! use unftp_ftps::tls::tickets::{ControlChannelTickets, TicketKeyRing};
//! use unftp_ftps::vhost::{ServerId, VirtualHost};
//!
//! let policy = TicketPolicy::default();
//! let ring = Arc::new(TicketKeyRing::new(policy.max_age, policy.max_count));
//! let _tickets = ControlChannelTickets::new(ring);
//! let _vhost = VirtualHost::new(ServerId(NonZeroU32::new(1).unwrap()), "ftp.example.com");
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]

pub mod auth;
pub mod controlchan;
pub mod error;
pub mod flags;
#[cfg(feature = "prometheus")]
pub mod metrics;
pub mod options;
pub mod session;
pub mod tls;
pub mod vhost;

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub use error::{FtpsError, FtpsErrorKind};
