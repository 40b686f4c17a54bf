//! Decoder for the Commfil v.2 serial output of liquid-scintillation counters.
//!
//! Triathler/BetaScout counters stream two kinds of data over RS-232 while
//! they count: a once-per-second count-rate line, and at the end of a run a
//! 1024-channel energy spectrum in a compact binary encoding. This crate
//! turns that byte stream into typed [`ProtocolEvent`]s.
//!
//! # Features
//!
//! - **Chunk-independent decoding**: the same bytes give the same events no
//!   matter how the transport splits them
//! - **Resilient**: malformed frames become in-band [`DecodeError`] events and
//!   decoding carries on
//! - **Async connections**: replay a recorded transcript or read a serial
//!   port (feature `serial`) on a tokio task
//! - **Export**: tab-separated time and spectrum records with autosave
//!
//! # Quick Start
//!
//! Decoding needs no runtime at all:
//!
//! ```rust
//! use commfil::{DecoderConfig, ProtocolEvent, ProtocolSession};
//!
//! let mut session = ProtocolSession::new(&DecoderConfig::default(), Vec::new());
//! session.feed(b"{t      1R:    120\r");
//!
//! assert!(matches!(session.sink()[0], ProtocolEvent::TimeSample(_)));
//! ```
//!
//! ## Example (transcript replay)
//!
//! ```rust,no_run
//! use commfil::{Commfil, ProtocolEvent};
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut connection = Commfil::open("capture.bin").await?;
//!     let mut events = connection.events().expect("first call");
//!
//!     while let Some(event) = events.next().await {
//!         if let ProtocolEvent::SpectrumComplete(spectrum) = event {
//!             println!("{} counts", spectrum.total_counts());
//!         }
//!     }
//!     Ok(())
//! }
//! ```

// Core types and error handling
pub mod config;
mod error;
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Decoding pipeline
pub mod protocol;

// Stream-based connection architecture
pub mod connection;
pub mod driver;
pub mod source;
pub mod sources;
pub mod stream;

// Finished runs
pub mod export;
pub mod recorder;

// Core exports
pub use error::*;
pub use types::*;

pub use config::{AutosaveSettings, Config, DecoderConfig, RepeatedTimePolicy, SerialSettings};
pub use protocol::{CallbackSink, EventSink, ProtocolSession};
pub use source::ByteSource;

// Main API exports
pub use connection::Connection;
pub use recorder::{Autosaver, FinishedRun, RunRecorder};

/// Unified entry point for instrument connections.
///
/// # Examples
///
/// ## Serial port (feature `serial`)
/// ```rust,no_run
/// use commfil::{Commfil, SerialSettings};
///
/// #[tokio::main]
/// async fn main() -> commfil::Result<()> {
///     let connection = Commfil::connect_serial(&SerialSettings::new("/dev/ttyUSB0")).await?;
///     // Use connection...
///     Ok(())
/// }
/// ```
///
/// ## Transcript replay
/// ```rust,no_run
/// use commfil::Commfil;
///
/// #[tokio::main]
/// async fn main() -> commfil::Result<()> {
///     let connection = Commfil::open("capture.bin").await?;
///     // Use connection...
///     Ok(())
/// }
/// ```
pub struct Commfil;

impl Commfil {
    /// Connect to a counter on a serial port.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The crate was built without the `serial` feature
    /// - The port does not exist or is held by another program
    pub async fn connect_serial(settings: &SerialSettings) -> Result<Connection> {
        Connection::connect_serial(settings).await
    }

    /// Replay a raw capture of the counter's serial output at line speed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not exist or is not readable.
    pub async fn open<P: AsRef<std::path::Path>>(path: P) -> Result<Connection> {
        Connection::open(path).await
    }
}
