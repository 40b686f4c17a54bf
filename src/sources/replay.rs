//! Replay source for recorded serial transcripts

use std::path::Path;

use bytes::Bytes;
use tokio::time::{Duration, Interval, MissedTickBehavior, interval};
use tracing::{debug, info, trace};

use crate::config::DEFAULT_BAUD_RATE;
use crate::source::ByteSource;
use crate::{CommfilError, Result};

/// Default bytes per replayed chunk
pub const DEFAULT_REPLAY_CHUNK: usize = 64;

/// Replays a raw capture of the instrument's serial output.
///
/// Chunks are paced as a real line would deliver them: 8N1 framing spends
/// ten bit times per byte, so 9600 baud is 960 bytes per second.
pub struct ReplaySource {
    data: Bytes,

    /// Bytes per chunk
    chunk_size: usize,

    /// Playback speed multiplier (1.0 = line speed)
    speed: f64,

    /// Time per chunk; `None` replays as fast as the consumer reads
    period: Option<Duration>,

    /// Created on first read so construction needs no runtime
    interval: Option<Interval>,
}

impl ReplaySource {
    /// Load a transcript file.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = tokio::fs::read(path)
            .await
            .map_err(|e| CommfilError::file_error(path.to_path_buf(), e))?;

        info!("Opened transcript {}: {} bytes", path.display(), data.len());
        Ok(Self::from_bytes(data))
    }

    /// Replay bytes already in memory.
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        let mut source = Self {
            data: data.into(),
            chunk_size: DEFAULT_REPLAY_CHUNK,
            speed: 1.0,
            period: None,
            interval: None,
        };
        source.rebuild_interval();
        source
    }

    /// Set bytes per chunk
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self.rebuild_interval();
        self
    }

    /// Deliver chunks without waiting
    pub fn unpaced(mut self) -> Self {
        self.speed = f64::INFINITY;
        self.period = None;
        self.interval = None;
        self
    }

    /// Set playback speed
    pub fn set_speed(&mut self, speed: f64) {
        self.speed = speed.clamp(0.1, 100.0); // Clamp to reasonable range
        self.rebuild_interval();
        debug!("Replay speed set to {}x", self.speed);
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    fn rebuild_interval(&mut self) {
        self.interval = None;
        if !self.speed.is_finite() {
            return;
        }
        let bytes_per_second = f64::from(DEFAULT_BAUD_RATE) / 10.0 * self.speed;
        self.period = Some(Duration::from_secs_f64(self.chunk_size as f64 / bytes_per_second));
    }

    /// Bytes not yet replayed
    pub fn remaining(&self) -> usize {
        self.data.len()
    }

    /// Total replay time at the current speed
    pub fn duration(&self) -> Duration {
        if !self.speed.is_finite() {
            return Duration::ZERO;
        }
        let bytes_per_second = f64::from(DEFAULT_BAUD_RATE) / 10.0 * self.speed;
        Duration::from_secs_f64(self.data.len() as f64 / bytes_per_second)
    }
}

#[async_trait::async_trait]
impl ByteSource for ReplaySource {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        if self.data.is_empty() {
            debug!("Reached end of transcript");
            return Ok(None);
        }

        // Wait for next chunk timing (pacing)
        if let Some(period) = self.period {
            let ticker = self.interval.get_or_insert_with(|| {
                let mut ticker = interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                ticker
            });
            ticker.tick().await;
        }

        let chunk = self.data.split_to(self.chunk_size.min(self.data.len()));
        trace!("Replayed {} bytes, {} left", chunk.len(), self.data.len());
        Ok(Some(chunk))
    }

    fn describe(&self) -> String {
        format!("transcript replay ({} bytes left, {}x)", self.data.len(), self.speed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn replays_file_contents_in_chunks() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(b"{t      1R:    120\r{t      2R:    118\r").expect("write transcript");

        let mut source = ReplaySource::open(file.path())
            .await
            .expect("transcript opens")
            .with_chunk_size(5)
            .unpaced();

        let mut replayed = Vec::new();
        while let Some(chunk) = source.next_chunk().await.expect("replay cannot fail") {
            assert!(chunk.len() <= 5);
            replayed.extend_from_slice(&chunk);
        }
        assert_eq!(replayed, b"{t      1R:    120\r{t      2R:    118\r");
        assert_eq!(source.remaining(), 0);
    }

    #[tokio::test]
    async fn missing_file_is_a_file_error() {
        let result = ReplaySource::open("/nonexistent/transcript.bin").await;
        assert!(matches!(result, Err(CommfilError::File { .. })));
    }

    #[tokio::test]
    async fn pacing_follows_line_speed() {
        let mut source = ReplaySource::from_bytes(vec![0u8; 960]);
        assert_eq!(source.duration(), Duration::from_secs(1));

        source.set_speed(2.0);
        assert_eq!(source.duration(), Duration::from_millis(500));
        assert_eq!(source.speed(), 2.0);

        source.set_speed(0.0);
        assert_eq!(source.speed(), 0.1);
    }
}
