//! # Transport Abstraction
//!
//! Two boundaries separate a channel from the outside world:
//!
//! - [`MessageSink`]: the synchronous send primitive a channel writes its
//!   outbound messages to. It must not block; callers include both blocked
//!   caller threads and dispatcher workers.
//! - [`Transport`]: an async, byte-oriented pipe. It knows nothing about
//!   calls, values or identities; it moves opaque buffers.
//!
//! [`crate::Connection`] bridges the two.

use std::fmt;

use isowire::FrameConfig;
use isowire::RemoteMessage;
use tokio::io::AsyncRead;
use tokio::io::AsyncWrite;
use tokio::io::AsyncWriteExt;
use tokio::io::ReadHalf;
use tokio::io::WriteHalf;
use tokio::sync::Mutex;

/// Errors that occur at the network/transport layer.
#[derive(Debug, Clone)]
pub enum Error {
    /// The peer is unreachable or the connection was dropped.
    ConnectionLost(String),
    /// Bytes arrived that do not form a valid frame or message.
    Frame(String),
    /// Generic I/O error or internal transport failure.
    Io(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionLost(msg) => write!(f, "Connection lost: {}", msg),
            Self::Frame(msg) => write!(f, "Bad frame: {}", msg),
            Self::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<isowire::Error> for Error {
    fn from(e: isowire::Error) -> Self {
        match e {
            isowire::Error::Io(io) => Self::Io(io.to_string()),
            other => Self::Frame(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// The send primitive a channel is bound to.
///
/// # invariants
/// - Must not block waiting for the peer.
/// - An `Err` means the message was not handed over; the channel treats it
///   as fatal and closes.
pub trait MessageSink: Send + Sync + 'static {
    fn send(&self, message: RemoteMessage) -> Result<()>;
}

impl<F> MessageSink for F
where
    F: Fn(RemoteMessage) -> Result<()> + Send + Sync + 'static,
{
    fn send(&self, message: RemoteMessage) -> Result<()> {
        self(message)
    }
}

/// A bidirectional byte pipe between two isolates.
///
/// This trait is designed to be object-safe (`Arc<dyn Transport>`).
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Sends one payload.
    async fn send(&self, payload: &[u8]) -> Result<()>;

    /// Receives the next payload; `Ok(None)` once the peer has finished.
    async fn recv(&self) -> Result<Option<Vec<u8>>>;

    /// Signals the peer that nothing more will be sent.
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

/// Length-prefixed frames over a pair of tokio byte streams.
///
/// Works with socket halves, a child process's stdio, or
/// `tokio::io::duplex` in tests.
pub struct StreamTransport<R, W> {
    reader: Mutex<R>,
    writer: Mutex<W>,
    config: FrameConfig,
}

impl<R, W> StreamTransport<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self::with_config(reader, writer, FrameConfig::default())
    }

    pub fn with_config(reader: R, writer: W, config: FrameConfig) -> Self {
        Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            config,
        }
    }
}

impl<S> StreamTransport<ReadHalf<S>, WriteHalf<S>>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Splits a duplex stream (e.g. a `TcpStream`) into a transport.
    pub fn from_stream(stream: S) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self::new(reader, writer)
    }
}

#[async_trait::async_trait]
impl<R, W> Transport for StreamTransport<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn send(&self, payload: &[u8]) -> Result<()> {
        let mut writer = self.writer.lock().await;
        isowire::write_frame(&mut *writer, payload, &self.config).await?;
        Ok(())
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>> {
        let mut reader = self.reader.lock().await;
        Ok(isowire::read_frame(&mut *reader, &self.config).await?)
    }

    async fn shutdown(&self) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer.shutdown().await.map_err(|e| Error::Io(e.to_string()))
    }
}
