//! Connection handle over a running decode task

use std::path::Path;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::{ReceiverStream, WatchStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::{DecoderConfig, SerialSettings};
use crate::driver::{Driver, DriverCommand};
use crate::source::ByteSource;
use crate::sources::ReplaySource;
use crate::stream::ThrottleExt;
use crate::types::{ProtocolEvent, RunSnapshot, UpdateRate};
use crate::{CommfilError, Result};


/// Connection to an instrument byte stream
///
/// Owns the decode task: dropping the connection cancels it.
pub struct Connection {
    /// Event receiver until a consumer takes it
    events: Option<mpsc::Receiver<ProtocolEvent>>,

    /// Snapshot watch receiver
    snapshots: watch::Receiver<Arc<RunSnapshot>>,

    /// Control channel into the decode task
    commands: mpsc::Sender<DriverCommand>,

    /// Cancellation token for stopping tasks
    cancel: CancellationToken,

    description: String,
}

impl Connection {
    /// Replay a recorded transcript at line speed.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening transcript: {}", path.display());
        let source = ReplaySource::open(path).await?;
        Ok(Self::from_source(source, DecoderConfig::default()))
    }

    /// Connect to a counter on a serial port.
    #[cfg(feature = "serial")]
    pub async fn connect_serial(settings: &SerialSettings) -> Result<Self> {
        info!("Connecting to instrument on {}", settings.port);
        let source = crate::sources::SerialSource::open(settings)?;
        Ok(Self::from_source(source, DecoderConfig::default()))
    }

    /// Serial input is compiled out without the `serial` feature.
    #[cfg(not(feature = "serial"))]
    pub async fn connect_serial(settings: &SerialSettings) -> Result<Self> {
        debug!("Serial support disabled, cannot open {}", settings.port);
        Err(CommfilError::feature_disabled("Serial input", "serial"))
    }

    /// Decode any byte source with the given instrument constants.
    ///
    /// Must be called from within a tokio runtime.
    pub fn from_source<S: ByteSource>(source: S, config: DecoderConfig) -> Self {
        let description = source.describe();
        let channels = Driver::spawn(source, config);
        info!("Connection established: {}", description);

        Self {
            events: Some(channels.events),
            snapshots: channels.snapshots,
            commands: channels.commands,
            cancel: channels.cancel,
            description,
        }
    }

    /// Take the event stream.
    ///
    /// Events arrive in stream order and the stream ends when the source
    /// does. Returns `None` after the first call. Decoding pauses while the
    /// event buffer is full, so a consumer that only wants snapshots should
    /// call [`Connection::ignore_events`].
    pub fn events(&mut self) -> Option<impl Stream<Item = ProtocolEvent> + use<>> {
        self.events.take().map(ReceiverStream::new)
    }

    /// Drop the event receiver; decoding continues for snapshots.
    pub fn ignore_events(&mut self) {
        self.events = None;
    }

    /// Accumulation snapshots as a stream
    ///
    /// Yields the current snapshot immediately, then each change. Throttled
    /// rates keep only the latest snapshot per interval.
    pub fn snapshots(&self, rate: UpdateRate) -> impl Stream<Item = Arc<RunSnapshot>> + use<> {
        let snapshots = WatchStream::new(self.snapshots.clone());

        match rate.throttle_interval() {
            None => snapshots.boxed(),
            Some(interval) => snapshots.throttle(interval).boxed(),
        }
    }

    /// Get the current snapshot
    pub fn current_snapshot(&self) -> Arc<RunSnapshot> {
        Arc::clone(&self.snapshots.borrow())
    }

    /// Discard all decoding state, as after a reconnect.
    ///
    /// Discarded data is reported as `RunReset` events first.
    pub async fn reset(&self) -> Result<()> {
        self.commands
            .send(DriverCommand::Reset)
            .await
            .map_err(|_| CommfilError::connection_failed("decode task is no longer running"))
    }

    /// Stop decoding.
    ///
    /// A spectrum still waiting for its digest line is settled unverified and
    /// delivered before the event stream ends.
    pub fn close(&self) {
        debug!("Closing connection to {}", self.description);
        self.cancel.cancel();
    }

    /// Whether the decode task has stopped
    pub fn is_finished(&self) -> bool {
        self.commands.is_closed()
    }

    /// Description of the byte source
    pub fn description(&self) -> &str {
        &self.description
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        debug!("Dropping connection to {}", self.description);
        // Cancel tasks on drop for clean shutdown
        self.cancel.cancel();
    }
}
