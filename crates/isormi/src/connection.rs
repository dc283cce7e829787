//! # Connection
//!
//! Binds a [`Channel`] to a byte [`Transport`] with two tasks:
//!
//! - **writer**: drains the channel's outbound queue, encodes each message
//!   and sends it. The queue is the channel's synchronous send primitive, so
//!   blocked callers and dispatcher workers never wait on the network.
//! - **reader**: receives payloads, decodes them and feeds them to
//!   [`Channel::handle_message`].
//!
//! Any transport error, undecodable payload or end of stream closes the
//! channel, and a closed channel stops both tasks.

use std::sync::Arc;

use isowire::RemoteMessage;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::builder::ChannelBuilder;
use crate::channel::Channel;
use crate::transport;
use crate::transport::MessageSink;
use crate::transport::Transport;

struct QueueSink {
    tx: mpsc::UnboundedSender<RemoteMessage>,
}

impl MessageSink for QueueSink {
    fn send(&self, message: RemoteMessage) -> transport::Result<()> {
        self.tx
            .send(message)
            .map_err(|_| transport::Error::ConnectionLost("Writer stopped".into()))
    }
}

/// A channel together with the tasks pumping it over a transport.
pub struct Connection {
    channel: Channel,
    writer: JoinHandle<()>,
    reader: JoinHandle<()>,
}

impl Connection {
    /// Builds a channel from `builder` and starts pumping it over `transport`.
    ///
    /// The tasks keep the channel alive until it closes.
    ///
    /// # Panics
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<T: Transport>(builder: ChannelBuilder, transport: T) -> Self {
        let transport: Arc<dyn Transport> = Arc::new(transport);
        let (tx, rx) = mpsc::unbounded_channel();
        let channel = builder.build(QueueSink { tx });

        let writer = tokio::spawn(write_loop(channel.clone(), rx, transport.clone()));
        let reader = tokio::spawn(read_loop(channel.clone(), transport));

        Self {
            channel,
            writer,
            reader,
        }
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn close(&self) {
        self.channel.close();
    }

    /// Waits until both tasks have stopped.
    pub async fn join(self) {
        if let Err(e) = self.writer.await {
            tracing::warn!(channel = %self.channel.name(), error = %e, "writer task failed");
        }
        if let Err(e) = self.reader.await {
            tracing::warn!(channel = %self.channel.name(), error = %e, "reader task failed");
        }
    }
}

async fn write_loop(
    channel: Channel,
    mut queue: mpsc::UnboundedReceiver<RemoteMessage>,
    transport: Arc<dyn Transport>,
) {
    loop {
        let next = tokio::select! {
            _ = channel.closed() => break,
            next = queue.recv() => next,
        };
        let Some(message) = next else { break };

        let payload = match isowire::encode(&message) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(channel = %channel.name(), message = %message, error = %e, "cannot encode message, closing channel");
                channel.close();
                break;
            }
        };

        if let Err(e) = transport.send(&payload).await {
            tracing::error!(channel = %channel.name(), error = %e, "transport send failed, closing channel");
            channel.close();
            break;
        }
    }

    if let Err(e) = transport.shutdown().await {
        tracing::debug!(channel = %channel.name(), error = %e, "transport shutdown failed");
    }
}

async fn read_loop(channel: Channel, transport: Arc<dyn Transport>) {
    loop {
        let next = tokio::select! {
            _ = channel.closed() => break,
            next = transport.recv() => next,
        };

        match next {
            Ok(Some(payload)) => match isowire::decode(&payload) {
                Ok(message) => {
                    if channel.handle_message(message).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!(channel = %channel.name(), error = %e, "undecodable message, closing channel");
                    channel.close();
                    break;
                }
            },
            Ok(None) => {
                tracing::info!(channel = %channel.name(), "peer finished, closing channel");
                channel.close();
                break;
            }
            Err(e) => {
                tracing::error!(channel = %channel.name(), error = %e, "transport receive failed, closing channel");
                channel.close();
                break;
            }
        }
    }
}
