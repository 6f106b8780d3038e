//! Channel-backed operator WebSocket peers.
//!
//! The HTTP front-end owns the real browser sockets; the broker core only
//! ever sees a pair of bounded channels per operator.  The front-end pumps
//! frames between the socket and these channels.  A full or closed channel
//! counts as a failed socket write; logcat pruning and pump shutdown both
//! key on that.

use thiserror::Error;
use tokio::sync::mpsc;

/// Frames exchanged with an operator peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsFrame {
    Text(String),
    Binary(Vec<u8>),
    Close,
}

/// Queue depth per operator peer before writes start failing.
pub const OPERATOR_QUEUE_DEPTH: usize = 64;

#[derive(Debug, Error)]
pub enum WsSendError {
    /// The peer's outbound queue is full; it is not draining fast enough.
    #[error("operator peer queue full")]
    Backpressure,
    /// The peer end was dropped.
    #[error("operator peer gone")]
    Closed,
}

/// Outbound handle to one operator peer.
#[derive(Debug, Clone)]
pub struct OperatorWs {
    tx: mpsc::Sender<WsFrame>,
}

impl OperatorWs {
    /// Queue a frame, waiting for capacity.  Fails only when the peer end
    /// was dropped.
    pub async fn send(&self, frame: WsFrame) -> Result<(), WsSendError> {
        self.tx.send(frame).await.map_err(|_| WsSendError::Closed)
    }

    /// Queue a frame without waiting.  A full queue counts as a failed
    /// write; logcat fan-out prunes the subscriber on the spot.
    pub fn try_send(&self, frame: WsFrame) -> Result<(), WsSendError> {
        self.tx.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => WsSendError::Backpressure,
            mpsc::error::TrySendError::Closed(_) => WsSendError::Closed,
        })
    }

    /// Send a close frame, best effort.
    pub async fn close(&self) {
        let _ = self.tx.send(WsFrame::Close).await;
    }
}

/// A paired operator peer as handed to a connection by the registry:
/// the outbound handle plus the inbound frame stream consumed by the
/// WS-input pump in terminal, shell and forward modes.
#[derive(Debug)]
pub struct OperatorConn {
    pub ws: OperatorWs,
    pub input: mpsc::Receiver<WsFrame>,
}

/// The front-end's end of an operator pairing: frames the front-end reads
/// from the browser go into `to_conn`; frames the connection emits come out
/// of `from_conn`.
#[derive(Debug)]
pub struct OperatorSocket {
    pub to_conn: mpsc::Sender<WsFrame>,
    pub from_conn: mpsc::Receiver<WsFrame>,
}

/// Create a connected (connection-side, front-end-side) peer pair.
pub fn operator_channel() -> (OperatorConn, OperatorSocket) {
    operator_channel_with_depth(OPERATOR_QUEUE_DEPTH)
}

/// Same as [`operator_channel`], with an explicit queue depth.  Tests use a
/// tiny depth to provoke backpressure failures.
pub fn operator_channel_with_depth(depth: usize) -> (OperatorConn, OperatorSocket) {
    let (out_tx, out_rx) = mpsc::channel(depth);
    let (in_tx, in_rx) = mpsc::channel(depth);
    (
        OperatorConn {
            ws: OperatorWs { tx: out_tx },
            input: in_rx,
        },
        OperatorSocket {
            to_conn: in_tx,
            from_conn: out_rx,
        },
    )
}
