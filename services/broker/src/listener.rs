//! Ghost control-port accept loop.
//!
//! One [`Connection`](crate::connection::Connection) is spawned per accepted
//! socket; the peer address flows into the connection so registration can
//! stamp the `"ip"` property.

use crate::connection::{ConnTuning, Connection};
use crate::registry::Registry;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

pub struct AgentListener {
    listener: TcpListener,
    registry: Arc<Registry>,
    tuning: ConnTuning,
}

impl AgentListener {
    /// Bind the ghost control port (use port 0 to let the OS choose).
    pub async fn bind(
        addr: &str,
        registry: Arc<Registry>,
        tuning: ConnTuning,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(AgentListener {
            listener,
            registry,
            tuning,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept ghosts until the listener fails.  Each connection runs as its
    /// own task; a failed accept is logged and the loop keeps going.
    pub async fn run(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    info!(peer = %peer, "ghost connected");
                    Connection::spawn(stream, peer, self.registry.clone(), self.tuning.clone());
                }
                Err(e) => {
                    warn!(error = %e, "accept failed");
                }
            }
        }
    }
}
