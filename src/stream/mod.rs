//! Stream combinators for connection outputs

mod throttle;

pub use throttle::{Throttle, ThrottleExt};
