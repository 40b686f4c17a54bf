//! Byte source trait for instrument input

use bytes::Bytes;

use crate::Result;

/// Trait for instrument byte sources
///
/// Sources abstract over where the bytes come from (serial port, recorded
/// transcript, memory) and handle their own pacing internally. Chunk
/// boundaries carry no meaning; the decoder reassembles frames itself.
#[async_trait::async_trait]
pub trait ByteSource: Send + 'static {
    /// Get the next chunk of bytes
    ///
    /// Returns:
    /// - `Ok(Some(bytes))` - Bytes received (may be empty after a read timeout)
    /// - `Ok(None)` - Source ended (normal termination)
    /// - `Err(e)` - Error occurred; the driver may retry
    async fn next_chunk(&mut self) -> Result<Option<Bytes>>;

    /// Human-readable description for logs
    fn describe(&self) -> String;
}
