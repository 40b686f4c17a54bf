//! Live serial source (requires the `serial` feature)

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::AsyncReadExt;
use tokio_serial::{
    ClearBuffer, DataBits, FlowControl, Parity, SerialPort, SerialPortBuilderExt, SerialStream,
    StopBits,
};
use tracing::{debug, info, trace};

use crate::config::SerialSettings;
use crate::source::ByteSource;
use crate::{CommfilError, Result};

/// Reads the counter's Commfil v.2 output from a serial port.
pub struct SerialSource {
    port: SerialStream,
    name: String,
    read_size: usize,
}

impl SerialSource {
    /// Long enough that a line terminator has almost certainly arrived
    const READ_TIMEOUT: Duration = Duration::from_secs(2);

    /// Open the port at 8N1 with no flow control.
    ///
    /// Anything the port buffered before opening is discarded; only data
    /// sent after the connection exists is decoded.
    pub fn open(settings: &SerialSettings) -> Result<Self> {
        let port = tokio_serial::new(&settings.port, settings.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .open_native_async()
            .map_err(|e| {
                CommfilError::connection_failed_with_source(
                    format!("cannot open serial port {}", settings.port),
                    Box::new(e),
                )
            })?;

        if let Err(e) = port.clear(ClearBuffer::Input) {
            debug!("Could not clear input buffer on {}: {}", settings.port, e);
        }

        info!("Opened serial port {} at {} baud", settings.port, settings.baud_rate);
        Ok(Self { port, name: settings.port.clone(), read_size: settings.read_size.max(1) })
    }
}

#[async_trait::async_trait]
impl ByteSource for SerialSource {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        let mut buffer = BytesMut::zeroed(self.read_size);

        let read = match tokio::time::timeout(Self::READ_TIMEOUT, self.port.read(&mut buffer)).await
        {
            Ok(read) => read,
            Err(_) => {
                // Idle instrument, not an error
                trace!("Serial read timed out on {}", self.name);
                return Ok(Some(Bytes::new()));
            }
        };

        let count = read.map_err(|e| {
            CommfilError::source_failed(format!("serial read on {}", self.name), Some(Box::new(e)))
        })?;

        if count == 0 {
            info!("Serial port {} closed", self.name);
            return Ok(None);
        }

        buffer.truncate(count);
        trace!("Serial read {} bytes", count);
        Ok(Some(buffer.freeze()))
    }

    fn describe(&self) -> String {
        format!("serial port {}", self.name)
    }
}
