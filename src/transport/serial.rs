//! # Serial Transport
//!
//! USB-connected NIIMBOT printers (B1, B21, D11 with a data cable) show up
//! as a CDC-ACM serial port speaking the same framed protocol as BLE.
//!
//! ## Setup (Linux)
//!
//! ```bash
//! # Printer appears as /dev/ttyACM0 (or /dev/ttyUSB0 through an adapter)
//! $ ls /dev/ttyACM*
//!
//! # Non-root access needs the dialout group
//! $ sudo usermod -aG dialout $USER
//! ```
//!
//! The port is opened at 115200 baud, 8N1. A background task reads the port
//! and forwards every chunk into the inbound queue.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncWriteExt, WriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tokio_util::io::ReaderStream;

use super::{INBOUND_CAPACITY, Inbound, Transport};
use crate::error::NiimbotError;

/// Baud rate of every NIIMBOT USB serial interface
pub const DEFAULT_BAUD: u32 = 115_200;

/// # Serial Printer Transport
///
/// ```no_run
/// # async fn demo() -> Result<(), niimbot::error::NiimbotError> {
/// use niimbot::transport::{SerialTransport, Transport};
///
/// let mut transport = SerialTransport::new("/dev/ttyACM0");
/// let inbound = transport.connect().await?;
/// # Ok(())
/// # }
/// ```
pub struct SerialTransport {
    path: String,
    baud: u32,
    name: String,
    writer: Option<WriteHalf<SerialStream>>,
    reader: Option<JoinHandle<()>>,
}

impl SerialTransport {
    pub fn new(path: impl Into<String>) -> Self {
        Self::with_baud(path, DEFAULT_BAUD)
    }

    pub fn with_baud(path: impl Into<String>, baud: u32) -> Self {
        let path = path.into();
        Self {
            name: format!("serial:{}", path),
            path,
            baud,
            writer: None,
            reader: None,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

/// Forward everything `reader` yields into a fresh inbound queue until EOF,
/// a read error, or the receiver is dropped.
pub(crate) fn spawn_reader<R>(reader: R) -> (Inbound, JoinHandle<()>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<Bytes>(INBOUND_CAPACITY);
    let task = tokio::spawn(async move {
        let mut stream = ReaderStream::new(reader);
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(bytes) => {
                    if tx.send(bytes).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "serial read failed");
                    break;
                }
            }
        }
        tracing::debug!("serial reader finished");
    });
    (rx, task)
}

#[async_trait]
impl Transport for SerialTransport {
    async fn connect(&mut self) -> Result<Inbound, NiimbotError> {
        tracing::debug!(path = %self.path, baud = self.baud, "opening serial port");
        let port = tokio_serial::new(&self.path, self.baud)
            .open_native_async()
            .map_err(|e| {
                NiimbotError::Transport(format!("Failed to open {}: {}", self.path, e))
            })?;

        let (read, write) = tokio::io::split(port);
        let (inbound, task) = spawn_reader(read);
        self.writer = Some(write);
        self.reader = Some(task);
        Ok(inbound)
    }

    async fn disconnect(&mut self) -> Result<(), NiimbotError> {
        if let Some(task) = self.reader.take() {
            task.abort();
        }
        if let Some(mut writer) = self.writer.take() {
            writer
                .shutdown()
                .await
                .map_err(|e| NiimbotError::Transport(format!("Close failed: {}", e)))?;
        }
        Ok(())
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), NiimbotError> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| NiimbotError::Transport(format!("{} is not open", self.path)))?;
        writer
            .write_all(data)
            .await
            .map_err(|e| NiimbotError::Transport(format!("Write failed: {}", e)))?;
        writer
            .flush()
            .await
            .map_err(|e| NiimbotError::Transport(format!("Flush failed: {}", e)))?;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{PacketCodec, commands};
    use bytes::BytesMut;
    use tokio_util::codec::Decoder;

    #[tokio::test]
    async fn test_reader_forwards_chunks() {
        let (mut device, host) = tokio::io::duplex(64);
        let (mut inbound, _task) = spawn_reader(host);

        let frame = commands::print_status().to_bytes().unwrap();
        device.write_all(&frame[..3]).await.unwrap();
        device.write_all(&frame[3..]).await.unwrap();
        drop(device);

        let mut buf = BytesMut::new();
        while let Some(chunk) = inbound.recv().await {
            buf.extend_from_slice(&chunk);
        }
        let pkt = PacketCodec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(pkt, commands::print_status());
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn test_write_requires_connect() {
        let mut transport = SerialTransport::new("/dev/null-niimbot");
        assert_eq!(transport.name(), "serial:/dev/null-niimbot");
        assert!(matches!(
            transport.write(&[0x55]).await,
            Err(NiimbotError::Transport(_))
        ));
        // Disconnect without connect is a no-op
        transport.disconnect().await.unwrap();
    }
}
