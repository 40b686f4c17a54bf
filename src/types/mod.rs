//! Core types flowing through the decode pipeline.
//!
//! ## Architecture
//!
//! - [`RawFrame`] is one delimiter-separated piece of the byte stream
//! - [`FrameKind`] / [`ClassifiedFrame`] tag a frame with its payload kind
//! - [`TimeSample`] and [`Spectrum`] are the two products of a counting run
//! - [`ProtocolEvent`] is the only thing a session hands to its consumers
//! - [`RunSnapshot`] is a read-only view of in-progress accumulation
//!
//! ## Usage Example
//!
//! ```rust
//! use commfil::types::{ProtocolEvent, TimeSample};
//!
//! let event = ProtocolEvent::TimeSample(TimeSample::new(12, 3456.0));
//! assert_eq!(event.name(), "time_sample");
//! assert!(!event.is_anomaly());
//! ```

mod event;
mod frame;
mod sample;
mod spectrum;
mod update_rate;

// Re-export all public types
pub use event::{ProtocolEvent, RunHeader, RunKind, RunSnapshot, RunState, StartTime};
pub use frame::{ClassifiedFrame, FrameKind, RawFrame};
pub use sample::TimeSample;
pub use spectrum::{BitsumCheck, Spectrum};
pub use update_rate::UpdateRate;
