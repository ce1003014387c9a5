//! HTTP front door adapter.

use std::net::IpAddr;
use std::sync::Arc;

use tracing::{debug, instrument};

use crate::ratelimit::{AdmissionGate, Identity};

/// Header carrying the configured per-minute ceiling.
pub const HEADER_LIMIT: &str = "X-RateLimit-Limit";
/// Header carrying the admissions left in the trailing minute.
pub const HEADER_REMAINING: &str = "X-RateLimit-Remaining";
pub const STATUS_TOO_MANY_REQUESTS: u16 = 429;

/// Outcome of an HTTP admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpDecision {
    /// Continue processing the submission
    Proceed,
    /// Respond with 429 and the rate limit headers
    RateLimited {
        /// Configured per-minute ceiling
        limit: u64,
        /// Admissions left in the trailing minute
        remaining: u64,
    },
}

impl HttpDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, HttpDecision::Proceed)
    }

    /// Status code to answer with, if the request is rejected.
    pub fn status(&self) -> Option<u16> {
        match self {
            HttpDecision::Proceed => None,
            HttpDecision::RateLimited { .. } => Some(STATUS_TOO_MANY_REQUESTS),
        }
    }

    /// Headers to attach to a rejection.
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        match self {
            HttpDecision::Proceed => Vec::new(),
            HttpDecision::RateLimited { limit, remaining } => vec![
                (HEADER_LIMIT, limit.to_string()),
                (HEADER_REMAINING, remaining.to_string()),
            ],
        }
    }
}

/// Admission check run before an API submission is processed.
///
/// Clients are keyed by a hash of their address.
pub struct HttpAdmission<G: AdmissionGate + ?Sized> {
    gate: Arc<G>,
}

impl<G: AdmissionGate + ?Sized> HttpAdmission<G> {
    pub fn new(gate: Arc<G>) -> Self {
        Self { gate }
    }

    #[instrument(skip(self), fields(door = "api"))]
    pub fn check(&self, client: IpAddr) -> HttpDecision {
        let identity = Identity::from_ip(client);

        if self.gate.allow(identity) {
            return HttpDecision::Proceed;
        }

        let decision = HttpDecision::RateLimited {
            limit: self.gate.limits().per_minute,
            remaining: self.gate.remaining_minute(identity),
        };
        debug!(?decision, "API request rejected");
        decision
    }
}

impl<G: AdmissionGate + ?Sized> Clone for HttpAdmission<G> {
    fn clone(&self) -> Self {
        Self {
            gate: Arc::clone(&self.gate),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::SlidingWindowLimiter;
    use std::net::Ipv6Addr;

    #[test]
    fn test_proceed_has_no_headers() {
        let decision = HttpDecision::Proceed;

        assert!(decision.is_allowed());
        assert_eq!(decision.status(), None);
        assert!(decision.headers().is_empty());
    }

    #[test]
    fn test_rate_limited_headers() {
        let decision = HttpDecision::RateLimited {
            limit: 30,
            remaining: 0,
        };

        assert!(!decision.is_allowed());
        assert_eq!(decision.status(), Some(429));
        assert_eq!(
            decision.headers(),
            vec![
                ("X-RateLimit-Limit", "30".to_string()),
                ("X-RateLimit-Remaining", "0".to_string()),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_hour_exhaustion_reports_minute_remaining() {
        let limiter = Arc::new(SlidingWindowLimiter::new(5, 2));
        let api = HttpAdmission::new(limiter);
        let client = IpAddr::V6(Ipv6Addr::LOCALHOST);

        assert!(api.check(client).is_allowed());
        assert!(api.check(client).is_allowed());
        assert_eq!(
            api.check(client),
            HttpDecision::RateLimited {
                limit: 5,
                remaining: 3
            }
        );
    }
}
