//! Broker-wide registry: the only state shared across connections.
//!
//! Maps live ghost connections by machine id and session id, parks operator
//! peers until the matching session registers, hands off file transfers, and
//! allocates target SSH forward ports.  Every connection holds a non-owning
//! `Arc<Registry>` handle injected at construction.

use crate::connection::{ConnCommand, ConnectionHandle};
use crate::download::DownloadStream;
use crate::ws::{OperatorConn, OperatorWs, WsFrame};
use ov_protocol::{LogFormat, Mode};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::ops::RangeInclusive;
use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use tracing::{info, warn};

/// Default target SSH forward port range, inclusive.
pub const TARGET_SSH_PORT_START: u16 = 2300;
pub const TARGET_SSH_PORT_END: u16 = 2400;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("duplicate session id: {0}")]
    DuplicateSid(String),
    #[error("cannot register a connection without a mode")]
    InvalidMode,
    #[error("no operator waiting for session {0}")]
    NoOperatorWaiting(String),
    #[error("no free port left in the SSH forward range")]
    PortsExhausted,
    #[error("port {port} outside the SSH forward range {start}-{end}")]
    PortOutOfRange { port: u16, start: u16, end: u16 },
}

/// What a connection presents when it registers.
#[derive(Debug, Clone)]
pub struct RegistrationInfo {
    pub sid: String,
    pub mid: String,
    pub mode: Mode,
    pub format: LogFormat,
    pub properties: serde_json::Map<String, Value>,
}

/// Snapshot of one registered session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub mid: String,
    pub mode: Mode,
}

/// Snapshot of one registered agent for the machine list.
#[derive(Debug, Clone)]
pub struct AgentInfo {
    pub mid: String,
    pub sid: String,
    pub properties: serde_json::Map<String, Value>,
}

struct AgentRecord {
    sid: String,
    handle: ConnectionHandle,
    properties: serde_json::Map<String, Value>,
}

struct SessionEntry {
    mid: String,
    mode: Mode,
    handle: ConnectionHandle,
}

#[derive(Default)]
struct Inner {
    /// Every registered connection, keyed by session id.
    sessions: HashMap<String, SessionEntry>,
    /// AGENT-mode connections, keyed by machine id.
    agents: HashMap<String, AgentRecord>,
    /// LOGCAT-mode connections, keyed by machine id, with the owning
    /// session id alongside so a stale unregister cannot evict a successor.
    logcats: HashMap<String, (String, ConnectionHandle)>,
    /// Operator peers staged by the front-end before the ghost side arrives.
    waiting_operators: HashMap<String, OperatorConn>,
    /// Logcat viewers waiting for their machine's log stream to register.
    waiting_logcat_viewers: HashMap<String, Vec<OperatorWs>>,
    /// File download streams awaiting operator pickup, keyed by session id.
    downloads: HashMap<String, DownloadStream>,
    /// Sessions cleared for upload, awaiting operator pickup.
    upload_requests: HashSet<String>,
    /// Claimed SSH forward ports, by the claiming session id.
    claimed_ports: HashMap<u16, String>,
}

pub struct Registry {
    ssh_ports: RangeInclusive<u16>,
    inner: Mutex<Inner>,
}

impl Registry {
    pub fn new(ssh_ports: RangeInclusive<u16>) -> Self {
        Registry {
            ssh_ports,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Register a connection.
    ///
    /// Terminal, shell and forward sessions are paired with the operator
    /// peer parked under their session id; agent, logcat and file sessions
    /// get no peer here (logcat viewers attach later, file transfers pair
    /// through the download/upload handoff).
    ///
    /// A fresh agent or logcat registration for a machine supersedes a
    /// stale one still in the map; the old connection is force-stopped so
    /// it does not linger until its own EOF or ping timeout.
    pub async fn register(
        &self,
        reg: &RegistrationInfo,
        handle: ConnectionHandle,
    ) -> Result<Option<OperatorConn>, RegistryError> {
        if reg.mode == Mode::None {
            return Err(RegistryError::InvalidMode);
        }
        let (operator, evicted) = {
            let mut inner = self.inner.lock().await;
            if inner.sessions.contains_key(&reg.sid) {
                return Err(RegistryError::DuplicateSid(reg.sid.clone()));
            }

            let operator = match reg.mode {
                Mode::Terminal | Mode::Shell | Mode::Forward => Some(
                    inner
                        .waiting_operators
                        .remove(&reg.sid)
                        .ok_or_else(|| RegistryError::NoOperatorWaiting(reg.sid.clone()))?,
                ),
                _ => None,
            };

            let evicted = match reg.mode {
                Mode::Agent => inner
                    .agents
                    .insert(
                        reg.mid.clone(),
                        AgentRecord {
                            sid: reg.sid.clone(),
                            handle: handle.clone(),
                            properties: reg.properties.clone(),
                        },
                    )
                    .map(|old| {
                        info!(mid = %reg.mid, old_sid = %old.sid, "replacing stale agent registration");
                        old.handle
                    }),
                Mode::Logcat => inner
                    .logcats
                    .insert(reg.mid.clone(), (reg.sid.clone(), handle.clone()))
                    .map(|(old_sid, old_handle)| {
                        info!(mid = %reg.mid, old_sid = %old_sid, "replacing stale logcat registration");
                        old_handle
                    }),
                _ => None,
            };

            inner.sessions.insert(
                reg.sid.clone(),
                SessionEntry {
                    mid: reg.mid.clone(),
                    mode: reg.mode,
                    handle,
                },
            );
            (operator, evicted)
        };

        // Outside the lock: the superseded connection's teardown will call
        // unregister, which needs the registry mutex.
        if let Some(stale) = evicted {
            stale.stop().await;
        }
        Ok(operator)
    }

    /// Force a live session down.  The connection's event loop exits on the
    /// stop signal and its teardown unregisters and closes everything.
    /// Returns `false` when no such session is registered.
    pub async fn force_stop(&self, sid: &str) -> bool {
        let handle = {
            let inner = self.inner.lock().await;
            inner.sessions.get(sid).map(|entry| entry.handle.clone())
        };
        match handle {
            Some(handle) => {
                info!(sid = %sid, "forcing session down");
                handle.stop().await;
                true
            }
            None => false,
        }
    }

    /// Remove a connection.  Idempotent; releases any SSH port the session
    /// still holds and discards un-collected file handoffs.
    pub async fn unregister(&self, sid: &str, mid: &str) {
        let mut inner = self.inner.lock().await;
        inner.sessions.remove(sid);
        if inner.agents.get(mid).is_some_and(|a| a.sid == sid) {
            inner.agents.remove(mid);
        }
        if inner.logcats.get(mid).is_some_and(|(owner, _)| owner == sid) {
            inner.logcats.remove(mid);
        }
        inner.claimed_ports.retain(|_, claimant| claimant != sid);
        inner.downloads.remove(sid);
        inner.upload_requests.remove(sid);
    }

    /// Lowest unused port in the SSH forward range.
    pub async fn suggest_target_ssh_port(&self) -> Result<u16, RegistryError> {
        let inner = self.inner.lock().await;
        self.ssh_ports
            .clone()
            .find(|port| !inner.claimed_ports.contains_key(port))
            .ok_or(RegistryError::PortsExhausted)
    }

    /// Claim `port` for `sid`, releasing any previous claim the session
    /// held.  Out-of-range ports are rejected and leave existing claims
    /// untouched.
    pub async fn claim_target_ssh_port(&self, sid: &str, port: u16) -> Result<(), RegistryError> {
        if !self.ssh_ports.contains(&port) {
            return Err(RegistryError::PortOutOfRange {
                port,
                start: *self.ssh_ports.start(),
                end: *self.ssh_ports.end(),
            });
        }
        let mut inner = self.inner.lock().await;
        inner.claimed_ports.retain(|_, claimant| claimant != sid);
        if let Some(previous) = inner.claimed_ports.insert(port, sid.to_owned()) {
            warn!(port, previous = %previous, claimant = %sid, "ssh port claim overridden");
        }
        Ok(())
    }

    /// Release whatever SSH port `sid` holds.
    pub async fn release_target_ssh_port(&self, sid: &str) {
        let mut inner = self.inner.lock().await;
        inner.claimed_ports.retain(|_, claimant| claimant != sid);
    }

    /// Stage an operator peer for a session the front-end is about to
    /// spawn.  The next `register` with this sid collects it.
    pub async fn park_operator(&self, sid: &str, conn: OperatorConn) {
        let mut inner = self.inner.lock().await;
        if inner.waiting_operators.insert(sid.to_owned(), conn).is_some() {
            warn!(sid = %sid, "replaced an operator already waiting for this session");
        }
    }

    /// Attach a viewer to a machine's log stream.  A live logcat connection
    /// gets the viewer immediately (history replay included); otherwise the
    /// viewer is parked and collected at the stream's registration.
    pub async fn connect_logcat(&self, mid: &str, ws: OperatorWs) {
        let sender = {
            let inner = self.inner.lock().await;
            inner.logcats.get(mid).map(|(_, handle)| handle.cmd_tx.clone())
        };
        match sender {
            Some(tx) => {
                if tx.send(ConnCommand::ConnectLogcat { ws }).await.is_err() {
                    warn!(mid = %mid, "logcat connection went away before viewer attach");
                }
            }
            None => {
                self.inner
                    .lock()
                    .await
                    .waiting_logcat_viewers
                    .entry(mid.to_owned())
                    .or_default()
                    .push(ws);
            }
        }
    }

    /// Collect the viewers parked for `mid`.  Called by a logcat connection
    /// right after it registers, before any log byte is routed.
    pub async fn take_logcat_viewers(&self, mid: &str) -> Vec<OperatorWs> {
        self.inner
            .lock()
            .await
            .waiting_logcat_viewers
            .remove(mid)
            .unwrap_or_default()
    }

    /// Drop an operator that was parked but whose session never arrived.
    pub async fn discard_waiting_operator(&self, sid: &str) {
        if let Some(conn) = self.inner.lock().await.waiting_operators.remove(sid) {
            let _ = conn.ws.try_send(WsFrame::Close);
        }
    }

    /// Hand off a ghost-announced file download for operator pickup.
    pub async fn register_download_request(&self, sid: &str, stream: DownloadStream) {
        self.inner.lock().await.downloads.insert(sid.to_owned(), stream);
    }

    /// Collect a previously announced download stream.
    pub async fn take_download(&self, sid: &str) -> Option<DownloadStream> {
        self.inner.lock().await.downloads.remove(sid)
    }

    /// Record that a ghost is clear to receive upload bytes.
    pub async fn register_upload_request(&self, sid: &str) {
        self.inner.lock().await.upload_requests.insert(sid.to_owned());
    }

    /// Collect (and clear) an upload clearance.
    pub async fn take_upload_request(&self, sid: &str) -> bool {
        self.inner.lock().await.upload_requests.remove(sid)
    }

    /// Command channel of a registered agent, for the front-end to spawn
    /// sessions on it.
    pub async fn agent_command_sender(&self, mid: &str) -> Option<mpsc::Sender<ConnCommand>> {
        self.inner
            .lock()
            .await
            .agents
            .get(mid)
            .map(|a| a.handle.cmd_tx.clone())
    }

    /// Snapshot of all registered agents for the machine list.
    pub async fn list_agents(&self) -> Vec<AgentInfo> {
        let inner = self.inner.lock().await;
        let mut agents: Vec<AgentInfo> = inner
            .agents
            .iter()
            .map(|(mid, record)| AgentInfo {
                mid: mid.clone(),
                sid: record.sid.clone(),
                properties: record.properties.clone(),
            })
            .collect();
        agents.sort_by(|a, b| a.mid.cmp(&b.mid));
        agents
    }

    /// Look up a registered session.
    pub async fn session(&self, sid: &str) -> Option<SessionRecord> {
        self.inner
            .lock()
            .await
            .sessions
            .get(sid)
            .map(|entry| SessionRecord {
                mid: entry.mid.clone(),
                mode: entry.mode,
            })
    }

    /// The port currently claimed by `sid`, if any.
    pub async fn claimed_port(&self, sid: &str) -> Option<u16> {
        self.inner
            .lock()
            .await
            .claimed_ports
            .iter()
            .find(|(_, claimant)| claimant.as_str() == sid)
            .map(|(port, _)| *port)
    }
}
