//! File download handoff between a FILE-mode ghost connection and the
//! operator side.
//!
//! Once the ghost's `request_to_download` is accepted, every byte the reader
//! delivers goes onto a single-slot chunk channel.  The slot doubles as flow
//! control: the connection's event loop blocks on a full slot, which
//! backpressures the TCP socket instead of buffering the file in memory.
//! End of stream is a `None` chunk; the stream side surfaces it (and a
//! dropped producer) as end of iteration.

use tokio::sync::mpsc;

/// Connection-side state of one file download.
pub struct DownloadContext {
    pub filename: String,
    pub size: u64,
    /// The terminal session the download was initiated from.
    pub terminal_sid: String,
    /// Flipped once the operator side has been paired; only then are reader
    /// bytes routed here instead of the RPC parser.
    pub ready: bool,
    tx: mpsc::Sender<Option<Vec<u8>>>,
}

impl DownloadContext {
    /// Forward one chunk of file bytes.  Returns `false` when the operator
    /// side is gone.
    pub async fn push(&self, chunk: Vec<u8>) -> bool {
        self.tx.send(Some(chunk)).await.is_ok()
    }

    /// Signal end of stream.
    pub async fn finish(&self) -> bool {
        self.tx.send(None).await.is_ok()
    }
}

/// Operator-side receiver for one file download.
pub struct DownloadStream {
    pub filename: String,
    pub size: u64,
    rx: mpsc::Receiver<Option<Vec<u8>>>,
}

impl DownloadStream {
    /// Next chunk of file bytes.  `None` means end of stream — either the
    /// explicit EOF sentinel or a torn-down producer.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.rx.recv().await.flatten()
    }
}

/// Create the paired (connection-side, operator-side) download endpoints.
pub fn download_pair(filename: &str, size: u64, terminal_sid: &str) -> (DownloadContext, DownloadStream) {
    let (tx, rx) = mpsc::channel(1);
    (
        DownloadContext {
            filename: filename.to_owned(),
            size,
            terminal_sid: terminal_sid.to_owned(),
            ready: false,
            tx,
        },
        DownloadStream {
            filename: filename.to_owned(),
            size,
            rx,
        },
    )
}
