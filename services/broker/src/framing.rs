//! RPC framing over the ghost control socket.
//!
//! Frames are newline-terminated JSON objects.  The [`Framer`] owns the
//! unparsed byte buffer, the write half of the socket, and the table of
//! requests still waiting for a reply.  Reply correlation delivers the empty
//! string on success, the error status otherwise, and `"command timeout"`
//! when the deadline passes before a reply arrives.
//!
//! Timeouts are swept from a single table on the supervisor tick rather than
//! armed per request, so a connection never accumulates timer tasks.

use ov_protocol::{FRAME_TERMINATOR, RpcFrame, RpcRequest, RpcResponse};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

/// Supervisor tick period; pending requests and ping deadlines are checked
/// at this cadence.
pub const TIMEOUT_CHECK_SECS: u64 = 3;

/// Default deadline for broker-to-ghost requests that expect a reply.
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(5);

/// Status string delivered to the caller when a request expires unanswered.
pub const COMMAND_TIMEOUT: &str = "command timeout";

const READ_BUF_SIZE: usize = 4096;

#[derive(Debug, Error)]
pub enum FramingError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
}

struct Pending {
    reply: oneshot::Sender<String>,
    /// `None` means the request never expires.
    deadline: Option<Instant>,
}

/// Framer for one ghost connection.
pub struct Framer {
    buf: Vec<u8>,
    pending: HashMap<String, Pending>,
    writer: Arc<Mutex<OwnedWriteHalf>>,
}

impl Framer {
    pub fn new(writer: Arc<Mutex<OwnedWriteHalf>>) -> Self {
        Framer {
            buf: Vec::new(),
            pending: HashMap::new(),
            writer,
        }
    }

    /// Append raw socket bytes to the frame buffer.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Parse complete frames out of the buffer.
    ///
    /// With `single_frame_only`, at most one frame is returned and every
    /// byte after its terminator stays in the buffer untouched.  The
    /// registration handshake relies on this: a logcat ghost streams log
    /// bytes immediately after its `register` frame without waiting for the
    /// ACK, and those bytes must survive for the streaming path.
    pub fn parse(&mut self, single_frame_only: bool) -> Result<Vec<RpcFrame>, FramingError> {
        let mut frames = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == FRAME_TERMINATOR) {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = &line[..line.len() - 1];
            if line.is_empty() {
                continue;
            }
            frames.push(serde_json::from_slice::<RpcFrame>(line)?);
            if single_frame_only {
                break;
            }
        }
        Ok(frames)
    }

    /// Take whatever bytes are still sitting unparsed in the buffer.
    pub fn take_leftover(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buf)
    }

    /// Serialize and write a request frame.
    ///
    /// When `reply` is given, the pending table records the correlation id
    /// together with its deadline (`timeout` of `None` means the entry never
    /// expires).  Without `reply` no entry is recorded, the fire-and-forget
    /// equivalent of a −1 timeout.
    pub async fn send_request(
        &mut self,
        req: &RpcRequest,
        reply: Option<(oneshot::Sender<String>, Option<Duration>)>,
    ) -> Result<(), FramingError> {
        self.write_frame(&serde_json::to_vec(req)?).await?;
        if let Some((reply, timeout)) = reply {
            self.pending.insert(
                req.rid.clone(),
                Pending {
                    reply,
                    deadline: timeout.map(|t| Instant::now() + t),
                },
            );
        }
        Ok(())
    }

    /// Serialize and write a response frame.  Fire and forget.
    pub async fn send_response(&mut self, res: &RpcResponse) -> Result<(), FramingError> {
        self.write_frame(&serde_json::to_vec(res)?).await
    }

    /// Correlate an incoming response with its pending request.  Replies
    /// for unknown correlation ids are dropped.
    pub fn resolve(&mut self, res: RpcResponse) {
        match self.pending.remove(&res.rid) {
            Some(pending) => {
                let outcome = if res.is_success() {
                    String::new()
                } else {
                    res.response
                };
                let _ = pending.reply.send(outcome);
            }
            None => debug!(rid = %res.rid, "reply for unknown rid, dropping"),
        }
    }

    /// Expire every pending request whose deadline lies in the past.
    pub fn sweep_timeouts(&mut self, now: Instant) {
        let expired: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, p)| p.deadline.is_some_and(|d| d <= now))
            .map(|(rid, _)| rid.clone())
            .collect();
        for rid in expired {
            debug!(rid = %rid, "request timed out");
            if let Some(pending) = self.pending.remove(&rid) {
                let _ = pending.reply.send(COMMAND_TIMEOUT.to_owned());
            }
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    async fn write_frame(&mut self, json: &[u8]) -> Result<(), FramingError> {
        let mut frame = Vec::with_capacity(json.len() + 1);
        frame.extend_from_slice(json);
        frame.push(FRAME_TERMINATOR);
        let mut writer = self.writer.lock().await;
        writer.write_all(&frame).await?;
        Ok(())
    }
}

/// Spawn the socket reader for one connection.
///
/// Raw chunks go out on `data_tx`; the first I/O error (EOF included) goes
/// out on `err_tx` and ends the task.  Exactly one reader runs per
/// connection.
pub fn spawn_reader(
    mut read_half: OwnedReadHalf,
    data_tx: mpsc::Sender<Vec<u8>>,
    err_tx: mpsc::Sender<std::io::Error>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut buf = [0u8; READ_BUF_SIZE];
        loop {
            match read_half.read(&mut buf).await {
                Ok(0) => {
                    let _ = err_tx
                        .send(std::io::Error::from(std::io::ErrorKind::UnexpectedEof))
                        .await;
                    break;
                }
                Ok(n) => {
                    if data_tx.send(buf[..n].to_vec()).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    let _ = err_tx.send(e).await;
                    break;
                }
            }
        }
    })
}
