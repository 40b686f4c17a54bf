//! Driver spawns and manages the decoding task

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::config::DecoderConfig;
use crate::protocol::ProtocolSession;
use crate::source::ByteSource;
use crate::types::{ProtocolEvent, RunSnapshot};

/// Events buffered between the decoder and a slow consumer
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Consecutive source errors tolerated before the driver gives up
const MAX_ERRORS: u32 = 10;

/// Requests handled by the decoding task between chunks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverCommand {
    /// Discard all decoding state, as after a reconnect
    Reset,
}

/// Result of spawning the driver task
pub struct DriverChannels {
    /// Decoded events in stream order; closes when the source ends
    pub events: mpsc::Receiver<ProtocolEvent>,
    /// Latest accumulation snapshot
    pub snapshots: watch::Receiver<Arc<RunSnapshot>>,
    /// Control channel into the task
    pub commands: mpsc::Sender<DriverCommand>,
    /// Cancellation token for graceful shutdown
    pub cancel: CancellationToken,
}

/// Driver spawns and manages the decoding task
///
/// One task exclusively owns the byte source and the [`ProtocolSession`], so
/// decoding sees bytes in strict order and no decoding state is shared.
pub struct Driver;

impl Driver {
    /// Spawn the decoding task for the given source
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<S>(source: S, config: DecoderConfig) -> DriverChannels
    where
        S: ByteSource,
    {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (snapshot_tx, snapshot_rx) = watch::channel(Arc::new(RunSnapshot {
            channel_count: config.channel_count,
            ..RunSnapshot::default()
        }));
        let (command_tx, command_rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            Self::decode_task(source, config, event_tx, snapshot_tx, command_rx, task_cancel).await;
        });

        DriverChannels {
            events: event_rx,
            snapshots: snapshot_rx,
            commands: command_tx,
            cancel,
        }
    }

    /// Decode task - reads chunks, feeds the session, forwards events
    async fn decode_task<S>(
        mut source: S,
        config: DecoderConfig,
        event_tx: mpsc::Sender<ProtocolEvent>,
        snapshot_tx: watch::Sender<Arc<RunSnapshot>>,
        mut commands: mpsc::Receiver<DriverCommand>,
        cancel: CancellationToken,
    ) where
        S: ByteSource,
    {
        info!("Decode task started on {}", source.describe());
        let mut session = ProtocolSession::new(&config, Vec::new());
        let mut forward = Forwarder { event_tx, open: true };
        let mut byte_count = 0u64;
        let mut error_count = 0u32;

        loop {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Decode task cancelled");
                    session.finish();
                    forward.drain_now(&mut session);
                    publish_snapshot(&snapshot_tx, session.snapshot());
                    break;
                }
                Some(command) = commands.recv() => {
                    match command {
                        DriverCommand::Reset => {
                            debug!("Reset requested");
                            session.reset();
                        }
                    }
                    if !forward.drain(&mut session, &cancel).await {
                        break;
                    }
                    publish_snapshot(&snapshot_tx, session.snapshot());
                    continue;
                }
                result = source.next_chunk() => result,
            };

            match result {
                Ok(Some(chunk)) => {
                    error_count = 0; // Reset error count on success
                    if chunk.is_empty() {
                        continue;
                    }
                    byte_count += chunk.len() as u64;

                    let emitted = session.feed(&chunk);
                    trace!("Chunk of {} bytes produced {} events", chunk.len(), emitted);

                    if !forward.drain(&mut session, &cancel).await {
                        break;
                    }
                    publish_snapshot(&snapshot_tx, session.snapshot());
                }
                Ok(None) => {
                    info!("Byte source ended after {} bytes", byte_count);
                    if session.finish() > 0 {
                        forward.drain(&mut session, &cancel).await;
                    }
                    publish_snapshot(&snapshot_tx, session.snapshot());
                    break;
                }
                Err(e) => {
                    // Source error - don't crash on transient failures
                    error_count += 1;
                    error!("Byte source error ({}/{}): {}", error_count, MAX_ERRORS, e);

                    if !e.is_retryable() || error_count >= MAX_ERRORS {
                        error!("Byte source failed, shutting down");
                        break;
                    }

                    // Exponential backoff: 100ms, 200ms, 400ms, ...
                    let backoff = Duration::from_millis(50 * (1 << error_count.min(5)));
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
            }
        }

        info!("Decode task ended (decoded {} bytes)", byte_count);
    }
}

/// Moves events from the session's buffer onto the bounded channel.
struct Forwarder {
    event_tx: mpsc::Sender<ProtocolEvent>,
    /// False once the receiver is gone; decoding continues for snapshots
    open: bool,
}

impl Forwarder {
    /// Returns false if cancelled while waiting on a full channel.
    async fn drain(
        &mut self,
        session: &mut ProtocolSession<Vec<ProtocolEvent>>,
        cancel: &CancellationToken,
    ) -> bool {
        for event in session.sink_mut().drain(..) {
            if !self.open {
                continue;
            }
            tokio::select! {
                _ = cancel.cancelled() => return false,
                sent = self.event_tx.send(event) => {
                    if sent.is_err() {
                        warn!("Event receiver dropped; continuing for snapshots only");
                        self.open = false;
                    }
                }
            }
        }
        true
    }

    /// Hands over what fits without waiting; used once cancelled.
    fn drain_now(&mut self, session: &mut ProtocolSession<Vec<ProtocolEvent>>) {
        for event in session.sink_mut().drain(..) {
            if !self.open {
                continue;
            }
            if let Err(e) = self.event_tx.try_send(event) {
                debug!("Dropping event at shutdown: {}", e);
                self.open = false;
            }
        }
    }
}

fn publish_snapshot(snapshot_tx: &watch::Sender<Arc<RunSnapshot>>, snapshot: RunSnapshot) {
    snapshot_tx.send_if_modified(|current| {
        if **current == snapshot {
            false
        } else {
            *current = Arc::new(snapshot);
            true
        }
    });
}
