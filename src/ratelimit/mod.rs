//! Rate limiting logic and state management.

mod backend;
mod identity;
mod janitor;
mod limiter;
mod window;

pub use backend::AdmissionGate;
pub use identity::Identity;
pub use janitor::SweepReport;
pub use limiter::{Limits, SlidingWindowLimiter};
pub use window::{TimeWindow, WindowRecord};
