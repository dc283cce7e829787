//! In-memory transports for tests and same-process wiring.
//!
//! - [`DuplexTransport`]: a byte [`Transport`] pair over tokio channels, for
//!   exercising [`crate::Connection`] without sockets.
//! - [`loopback_pair`]: two channels whose send primitives call straight
//!   into each other, with every exchanged message recorded.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::OnceLock;
use std::sync::PoisonError;

use isowire::RemoteMessage;
use tokio::sync::mpsc;

use crate::builder::ChannelBuilder;
use crate::channel::Channel;
use crate::channel::WeakChannel;
use crate::transport;
use crate::transport::MessageSink;
use crate::transport::Transport;

/// A byte transport backed by a pair of unbounded tokio channels.
///
/// Payloads sent on one end appear on the other end's `recv()`. Dropping
/// an end makes its peer see end of stream.
pub struct DuplexTransport {
    tx: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
}

impl DuplexTransport {
    /// Creates a pair of transports connected to each other.
    pub fn pair() -> (Self, Self) {
        let (tx_a, rx_a) = mpsc::unbounded_channel();
        let (tx_b, rx_b) = mpsc::unbounded_channel();

        let a = Self {
            tx: Mutex::new(Some(tx_a)),
            rx: tokio::sync::Mutex::new(rx_b),
        };
        let b = Self {
            tx: Mutex::new(Some(tx_b)),
            rx: tokio::sync::Mutex::new(rx_a),
        };
        (a, b)
    }

    fn sender(&self) -> Option<mpsc::UnboundedSender<Vec<u8>>> {
        self.tx.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait::async_trait]
impl Transport for DuplexTransport {
    async fn send(&self, payload: &[u8]) -> transport::Result<()> {
        let tx = self
            .sender()
            .ok_or_else(|| transport::Error::ConnectionLost("Transport shut down".into()))?;
        tx.send(payload.to_vec())
            .map_err(|_| transport::Error::ConnectionLost("Peer dropped".into()))
    }

    async fn recv(&self) -> transport::Result<Option<Vec<u8>>> {
        let mut rx = self.rx.lock().await;
        Ok(rx.recv().await)
    }

    async fn shutdown(&self) -> transport::Result<()> {
        self.tx.lock().unwrap_or_else(PoisonError::into_inner).take();
        Ok(())
    }
}

type Traffic = Arc<Mutex<Vec<RemoteMessage>>>;

struct LoopbackSink {
    peer: Arc<OnceLock<WeakChannel>>,
    traffic: Traffic,
}

impl MessageSink for LoopbackSink {
    fn send(&self, message: RemoteMessage) -> transport::Result<()> {
        let peer = self
            .peer
            .get()
            .and_then(WeakChannel::upgrade)
            .filter(|peer| !peer.is_closed())
            .ok_or_else(|| transport::Error::ConnectionLost("Peer closed".into()))?;

        self.traffic
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.clone());

        // a protocol error closes the peer; the message itself was delivered
        let _ = peer.handle_message(message);
        Ok(())
    }
}

/// Two channels wired message-to-message.
pub struct Loopback {
    pub left: Channel,
    pub right: Channel,
    traffic: Traffic,
}

impl Loopback {
    /// Every message sent by either side, in send order.
    pub fn messages(&self) -> Vec<RemoteMessage> {
        self.traffic.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn call_count(&self) -> usize {
        self.count(|m| matches!(m, RemoteMessage::Call(_)))
    }

    pub fn return_count(&self) -> usize {
        self.count(|m| matches!(m, RemoteMessage::Return(_)))
    }

    fn count(&self, pred: impl Fn(&RemoteMessage) -> bool) -> usize {
        self.traffic
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|m| pred(m))
            .count()
    }
}

/// Builds two channels connected without any transport in between.
///
/// Sending to a peer that has closed fails, like a broken transport would.
pub fn loopback_pair(left: ChannelBuilder, right: ChannelBuilder) -> Loopback {
    let traffic: Traffic = Arc::new(Mutex::new(Vec::new()));
    let left_peer = Arc::new(OnceLock::new());
    let right_peer = Arc::new(OnceLock::new());

    let left = left.build(LoopbackSink {
        peer: left_peer.clone(),
        traffic: traffic.clone(),
    });
    let right = right.build(LoopbackSink {
        peer: right_peer.clone(),
        traffic: traffic.clone(),
    });

    let _ = left_peer.set(right.downgrade());
    let _ = right_peer.set(left.downgrade());

    Loopback {
        left,
        right,
        traffic,
    }
}
