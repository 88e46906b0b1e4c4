//! C6: OCSP Stapler (spec.md §4.6).

use crate::options::StaplingPolicy;
use moka::sync::Cache;
use std::time::{Duration, Instant};

/// A cached OCSP response (spec.md §3 "OCSP Response Cache Entry").
#[derive(Debug, Clone)]
pub struct CachedResponse {
    /// The DER-encoded OCSP response.
    pub der: Vec<u8>,
    /// When this entry was inserted.
    pub inserted_at: Instant,
    /// The response's `thisUpdate`/`nextUpdate`, if it carried one.
    pub validity: Option<(Instant, Instant)>,
    /// Whether the response was a successful status (vs e.g. `tryLater`).
    pub successful: bool,
    /// Whether this is the fabricated `tryLater` fallback rather than a
    /// real responder answer.
    pub fabricated: bool,
}

const NO_NEXT_UPDATE_STALE_AFTER: Duration = Duration::from_secs(3600);
const ERROR_STALE_AFTER: Duration = Duration::from_secs(300);

impl CachedResponse {
    /// Staleness per spec.md §4.6: past the midpoint of the validity
    /// interval if one is known, past a fixed window otherwise, and past
    /// `nextUpdate` is always stale regardless.
    pub fn is_stale(&self, now: Instant) -> bool {
        if let Some((this_update, next_update)) = self.validity {
            if now >= next_update {
                return true;
            }
            let half_life = next_update.saturating_duration_since(this_update) / 2;
            return now.saturating_duration_since(this_update) >= half_life;
        }
        if !self.successful {
            return now.saturating_duration_since(self.inserted_at) >= ERROR_STALE_AFTER;
        }
        now.saturating_duration_since(self.inserted_at) >= NO_NEXT_UPDATE_STALE_AFTER
    }
}

/// Fetches, verifies and caches OCSP responses for stapling during the
/// handshake. The actual HTTP(S) exchange and DER parsing/verification are
/// external collaborators (an OCSP/HTTP client); this module owns the
/// cache, staleness policy and the must-staple/fake-tryLater fallback
/// logic spec.md describes.
#[derive(Debug)]
pub struct OcspStapler {
    cache: Cache<[u8; 32], CachedResponse>,
    policy: StaplingPolicy,
}

/// What the stapler decided to hand the handshake for this connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StapleDecision {
    /// Session was resumed: RFC 6066 says do not staple.
    NoAck,
    /// A fresh or still-valid cached response.
    Response(Vec<u8>),
    /// No real response available; fabricated per spec.md §4.6 step 7.
    FabricatedTryLater(Vec<u8>),
    /// No stapling configured, or disabled for this connection.
    None,
}

impl OcspStapler {
    /// Creates a stapler with the given cache capacity and policy.
    pub fn new(policy: StaplingPolicy, capacity: u64) -> Self {
        OcspStapler {
            cache: Cache::builder().max_capacity(capacity).build(),
            policy,
        }
    }

    /// Implements the per-handshake selection algorithm (spec.md §4.6
    /// steps 1-3 and 6-7; steps 4-5, the actual network fetch, are driven
    /// by the caller supplying `fetch` only when a cache miss/staleness
    /// demands it).
    pub fn decide(&self, fingerprint: [u8; 32], resumed: bool, must_staple: bool, fetch: impl FnOnce() -> Option<Vec<u8>>, now: Instant) -> StapleDecision {
        if !self.policy.enabled {
            return StapleDecision::None;
        }
        if resumed {
            return StapleDecision::NoAck;
        }
        if let Some(entry) = self.cache.get(&fingerprint) {
            if !entry.is_stale(now) {
                #[cfg(feature = "prometheus")]
                crate::metrics::observe_ocsp_cache("hit");
                return StapleDecision::Response(entry.der);
            }
            #[cfg(feature = "prometheus")]
            crate::metrics::observe_ocsp_cache("stale");
        } else {
            #[cfg(feature = "prometheus")]
            crate::metrics::observe_ocsp_cache("miss");
        }

        if let Some(der) = fetch() {
            self.cache.insert(
                fingerprint,
                CachedResponse {
                    der: der.clone(),
                    inserted_at: now,
                    validity: None,
                    successful: true,
                    fabricated: false,
                },
            );
            return StapleDecision::Response(der);
        }

        if must_staple || !self.policy.no_fake_try_later {
            let fake = fabricated_try_later();
            self.cache.insert(
                fingerprint,
                CachedResponse {
                    der: fake.clone(),
                    inserted_at: now,
                    validity: None,
                    successful: false,
                    fabricated: true,
                },
            );
            return StapleDecision::FabricatedTryLater(fake);
        }

        StapleDecision::None
    }
}

/// A minimal DER `OCSPResponse` with `responseStatus = tryLater (3)` and no
/// `responseBytes`, per RFC 6960 §4.2.1.
fn fabricated_try_later() -> Vec<u8> {
    vec![0x30, 0x03, 0x0A, 0x01, 0x03]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(no_fake: bool) -> StaplingPolicy {
        StaplingPolicy {
            enabled: true,
            no_fake_try_later: no_fake,
            ..Default::default()
        }
    }

    #[test]
    fn resumed_sessions_never_staple() {
        let stapler = OcspStapler::new(policy(false), 16);
        let decision = stapler.decide([0u8; 32], true, false, || Some(vec![1]), Instant::now());
        assert_eq!(decision, StapleDecision::NoAck);
    }

    #[test]
    fn disabled_policy_never_staples() {
        let stapler = OcspStapler::new(StaplingPolicy::default(), 16);
        let decision = stapler.decide([0u8; 32], false, false, || Some(vec![1]), Instant::now());
        assert_eq!(decision, StapleDecision::None);
    }

    #[test]
    fn unreachable_responder_fabricates_try_later_by_default() {
        let stapler = OcspStapler::new(policy(false), 16);
        let decision = stapler.decide([1u8; 32], false, false, || None, Instant::now());
        assert!(matches!(decision, StapleDecision::FabricatedTryLater(_)));
    }

    #[test]
    fn no_fake_try_later_suppresses_fallback_unless_must_staple() {
        let stapler = OcspStapler::new(policy(true), 16);
        let decision = stapler.decide([2u8; 32], false, false, || None, Instant::now());
        assert_eq!(decision, StapleDecision::None);

        let decision = stapler.decide([3u8; 32], false, true, || None, Instant::now());
        assert!(matches!(decision, StapleDecision::FabricatedTryLater(_)), "must-staple certs always get a response");
    }

    #[test]
    fn fresh_cache_entry_is_not_stale_before_midpoint() {
        let now = Instant::now();
        let entry = CachedResponse {
            der: vec![],
            inserted_at: now,
            validity: Some((now, now + Duration::from_secs(100))),
            successful: true,
            fabricated: false,
        };
        assert!(!entry.is_stale(now + Duration::from_secs(10)));
        assert!(entry.is_stale(now + Duration::from_secs(51)));
    }

    #[test]
    fn no_next_update_stale_after_one_hour() {
        let now = Instant::now();
        let entry = CachedResponse {
            der: vec![],
            inserted_at: now,
            validity: None,
            successful: true,
            fabricated: false,
        };
        assert!(!entry.is_stale(now + Duration::from_secs(3000)));
        assert!(entry.is_stale(now + Duration::from_secs(3601)));
    }

    #[test]
    fn error_response_stale_after_five_minutes() {
        let now = Instant::now();
        let entry = CachedResponse {
            der: vec![],
            inserted_at: now,
            validity: None,
            successful: false,
            fabricated: true,
        };
        assert!(entry.is_stale(now + Duration::from_secs(301)));
    }
}
