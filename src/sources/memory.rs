//! In-memory byte source

use std::collections::VecDeque;

use bytes::Bytes;
use tracing::trace;

use crate::Result;
use crate::source::ByteSource;

/// Yields pre-recorded chunks as fast as they are requested.
#[derive(Debug, Default, Clone)]
pub struct MemorySource {
    chunks: VecDeque<Bytes>,
}

impl MemorySource {
    pub fn new<I, B>(chunks: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        Self { chunks: chunks.into_iter().map(Into::into).collect() }
    }

    /// Split one buffer into chunks of `chunk_size` bytes.
    pub fn chunked(bytes: impl Into<Bytes>, chunk_size: usize) -> Self {
        let mut bytes = bytes.into();
        let chunk_size = chunk_size.max(1);
        let mut chunks = VecDeque::new();
        while !bytes.is_empty() {
            chunks.push_back(bytes.split_to(chunk_size.min(bytes.len())));
        }
        Self { chunks }
    }

    pub fn remaining(&self) -> usize {
        self.chunks.len()
    }
}

#[async_trait::async_trait]
impl ByteSource for MemorySource {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        let chunk = self.chunks.pop_front();
        if let Some(chunk) = &chunk {
            trace!("Memory source chunk: {} bytes, {} left", chunk.len(), self.chunks.len());
        }
        Ok(chunk)
    }

    fn describe(&self) -> String {
        format!("memory ({} chunks)", self.chunks.len())
    }
}
