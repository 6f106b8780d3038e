//! Logcat broadcast: one ghost log stream fanned out to N operator viewers,
//! with a bounded replay history for late joiners.
//!
//! Writes are best effort per subscriber.  A subscriber whose write fails
//! (queue full or peer gone) is closed and removed in the same pass, so one
//! broken viewer never stalls the rest.

use crate::ws::{OperatorWs, WsFrame};
use ov_protocol::{LogFormat, Mode};
use std::borrow::Cow;
use tracing::debug;

/// Upper bound on the replay history, in bytes.  Oldest bytes evict first.
pub const LOG_BUFSIZ: usize = 16 * 1024;

/// Newline rewrite applied at the transport boundary.
///
/// Only a TEXT-format logcat stream is rewritten (bare LF becomes CRLF, the
/// VT100 convention browser terminals expect).  Shell output routes through
/// here too but always passes untouched, whatever format the connection
/// registered with.
pub fn rewrite_for_transport(mode: Mode, format: LogFormat, chunk: &[u8]) -> Cow<'_, [u8]> {
    if mode != Mode::Logcat || format != LogFormat::Text || !chunk.contains(&b'\n') {
        return Cow::Borrowed(chunk);
    }
    let mut out = Vec::with_capacity(chunk.len() + 8);
    for &b in chunk {
        if b == b'\n' {
            out.push(b'\r');
        }
        out.push(b);
    }
    Cow::Owned(out)
}

/// Per-connection logcat state: format, subscriber list, replay history.
pub struct LogcatContext {
    format: LogFormat,
    history: Vec<u8>,
    subscribers: Vec<OperatorWs>,
}

impl LogcatContext {
    pub fn new(format: LogFormat) -> Self {
        LogcatContext {
            format,
            history: Vec::new(),
            subscribers: Vec::new(),
        }
    }

    pub fn format(&self) -> LogFormat {
        self.format
    }

    /// The current replay buffer.  Stores post-rewrite bytes, so a replay is
    /// byte-identical to what live subscribers saw.
    pub fn history(&self) -> &[u8] {
        &self.history
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Ingest one chunk from the ghost: append to history, then write to
    /// every subscriber, pruning the ones whose write fails.
    pub fn append_and_broadcast(&mut self, chunk: &[u8]) {
        let data = rewrite_for_transport(Mode::Logcat, self.format, chunk);

        self.history.extend_from_slice(&data);
        if self.history.len() > LOG_BUFSIZ {
            let excess = self.history.len() - LOG_BUFSIZ;
            self.history.drain(..excess);
        }

        // Write-then-filter: the subscriber list is rebuilt from the
        // successful writers in the same pass.
        self.subscribers.retain(|ws| {
            match ws.try_send(WsFrame::Binary(data.to_vec())) {
                Ok(()) => true,
                Err(e) => {
                    debug!(error = %e, "dropping logcat subscriber");
                    let _ = ws.try_send(WsFrame::Close);
                    false
                }
            }
        });
    }

    /// Add a viewer.  The current history is replayed as a single write
    /// before the viewer joins the list, so it sees no gap and no duplicate
    /// relative to live chunks.
    pub fn subscribe(&mut self, ws: OperatorWs) {
        if !self.history.is_empty()
            && ws.try_send(WsFrame::Binary(self.history.clone())).is_err()
        {
            let _ = ws.try_send(WsFrame::Close);
            return;
        }
        self.subscribers.push(ws);
    }

    /// Send a close frame to every remaining subscriber.
    pub fn close_all(&mut self) {
        for ws in self.subscribers.drain(..) {
            let _ = ws.try_send(WsFrame::Close);
        }
    }
}
