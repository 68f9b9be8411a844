//! Peripheral Link
//!
//! Opens the duplex byte channel to the peripheral and runs the reader and
//! writer halves. All results are marshalled back to the owner as
//! [`CoreEvent`]s; nothing here touches manager state directly.

use crate::domain::settings::ControllerSettings;
use crate::error::ControllerError;
use crate::infrastructure::uart::protocol::{self, FrameCodec};
use crate::infrastructure::uart::CoreEvent;
use std::future::Future;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Size of the reader's chunk buffer
pub const READ_CHUNK_LEN: usize = 512;

/// A negotiated link, ready for traffic
pub struct OpenLink<S> {
    pub stream: S,
    /// Largest frame the peripheral accepts in one write, if known
    pub max_write_len: Option<usize>,
}

/// Something that can be negotiated into a duplex byte stream
pub trait UartLink: Send + 'static {
    type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    fn open(self) -> impl Future<Output = Result<OpenLink<Self::Stream>, ControllerError>> + Send;
}

/// An already connected stream
pub struct ReadyStream<S> {
    stream: S,
    max_write_len: Option<usize>,
}

impl<S> ReadyStream<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            max_write_len: None,
        }
    }

    pub fn with_max_write_len(mut self, max_write_len: usize) -> Self {
        self.max_write_len = Some(max_write_len);
        self
    }
}

impl<S> UartLink for ReadyStream<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    type Stream = S;

    async fn open(self) -> Result<OpenLink<S>, ControllerError> {
        Ok(OpenLink {
            stream: self.stream,
            max_write_len: self.max_write_len,
        })
    }
}

/// TCP connection to a BLE-UART bridge
#[derive(Debug, Clone)]
pub struct TcpBridge {
    pub address: String,
    pub connect_timeout: Duration,
    pub max_write_len: Option<usize>,
}

impl TcpBridge {
    pub fn from_settings(settings: &ControllerSettings) -> Self {
        Self {
            address: settings.bridge_address.clone(),
            connect_timeout: settings.connect_timeout(),
            max_write_len: settings.max_write_len,
        }
    }
}

impl UartLink for TcpBridge {
    type Stream = TcpStream;

    async fn open(self) -> Result<OpenLink<TcpStream>, ControllerError> {
        info!("Connecting to peripheral bridge at {}", self.address);
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(&self.address))
            .await
            .map_err(|_| {
                ControllerError::TransportInit(format!(
                    "timed out connecting to {} after {:?}",
                    self.address, self.connect_timeout
                ))
            })?
            .map_err(|e| ControllerError::TransportInit(format!("{}: {}", self.address, e)))?;
        let _ = stream.set_nodelay(true);
        Ok(OpenLink {
            stream,
            max_write_len: self.max_write_len,
        })
    }
}

/// Negotiate the link, report readiness once, then pump both directions
/// until either side stops.
pub(crate) async fn drive<L: UartLink>(
    link: L,
    codec: FrameCodec,
    mut outbound: mpsc::UnboundedReceiver<Vec<u8>>,
    events: mpsc::UnboundedSender<CoreEvent>,
) {
    let OpenLink {
        stream,
        max_write_len,
    } = match link.open().await {
        Ok(open) => {
            info!("UART ready");
            let _ = events.send(CoreEvent::UartReady(Ok(())));
            open
        }
        Err(e) => {
            error!("Error initializing uart: {}", e);
            let _ = events.send(CoreEvent::UartReady(Err(e)));
            return;
        }
    };

    let (mut reader, mut writer) = tokio::io::split(stream);

    // Each half resolves to whether the link itself failed
    let write_events = events.clone();
    let write_loop = async move {
        while let Some(frame) = outbound.recv().await {
            if let Some(max) = max_write_len {
                if frame.len() > max {
                    warn!("Frame of {} bytes exceeds write size {}", frame.len(), max);
                    let _ = write_events.send(CoreEvent::DeliveryFailed(ControllerError::Delivery(
                        format!(
                            "frame of {} bytes exceeds negotiated write size of {}",
                            frame.len(),
                            max
                        ),
                    )));
                    continue;
                }
            }

            #[cfg(debug_assertions)]
            tracing::trace!("TX {:02X?}", frame);

            let written = match writer.write_all(&frame).await {
                Ok(()) => writer.flush().await,
                Err(e) => Err(e),
            };
            if let Err(e) = written {
                error!("Write failed: {}", e);
                let _ = write_events.send(CoreEvent::DeliveryFailed(ControllerError::Delivery(
                    e.to_string(),
                )));
                return true;
            }
        }
        debug!("Writer stopped");
        false
    };

    let read_events = events.clone();
    let read_loop = async move {
        let mut buf = vec![0u8; READ_CHUNK_LEN];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) => {
                    info!("Peripheral closed the link");
                    return true;
                }
                Ok(n) => {
                    let chunk = &buf[..n];
                    let event = match protocol::decode_sensor_report(&codec, chunk) {
                        Some(reading) => CoreEvent::SensorReport(reading),
                        None => CoreEvent::RxBytes(chunk.to_vec()),
                    };
                    if read_events.send(event).is_err() {
                        return false;
                    }
                }
                Err(e) => {
                    error!("Read failed: {}", e);
                    return true;
                }
            }
        }
    };

    let closed = tokio::select! {
        closed = write_loop => closed,
        closed = read_loop => closed,
    };
    if closed {
        let _ = events.send(CoreEvent::LinkClosed);
    }
}
