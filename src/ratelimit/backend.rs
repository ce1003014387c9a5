//! Admission trait consumed by the front doors.

use std::sync::Arc;

use super::identity::Identity;
use super::limiter::{Limits, SlidingWindowLimiter};

/// Trait for admission-control implementations.
///
/// Front doors depend on this trait rather than on a concrete limiter, so
/// handlers can be exercised against a fixed decision in their own tests.
pub trait AdmissionGate: Send + Sync {
    /// Decide whether one more request from `identity` is admitted.
    fn allow(&self, identity: Identity) -> bool;

    fn remaining_minute(&self, identity: Identity) -> u64;

    fn remaining_hour(&self, identity: Identity) -> u64;

    fn limits(&self) -> Limits;
}

impl AdmissionGate for SlidingWindowLimiter {
    fn allow(&self, identity: Identity) -> bool {
        SlidingWindowLimiter::allow(self, identity)
    }

    fn remaining_minute(&self, identity: Identity) -> u64 {
        SlidingWindowLimiter::remaining_minute(self, identity)
    }

    fn remaining_hour(&self, identity: Identity) -> u64 {
        SlidingWindowLimiter::remaining_hour(self, identity)
    }

    fn limits(&self) -> Limits {
        SlidingWindowLimiter::limits(self)
    }
}

impl<G: AdmissionGate + ?Sized> AdmissionGate for Arc<G> {
    fn allow(&self, identity: Identity) -> bool {
        (**self).allow(identity)
    }

    fn remaining_minute(&self, identity: Identity) -> u64 {
        (**self).remaining_minute(identity)
    }

    fn remaining_hour(&self, identity: Identity) -> u64 {
        (**self).remaining_hour(identity)
    }

    fn limits(&self) -> Limits {
        (**self).limits()
    }
}
