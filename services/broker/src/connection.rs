//! Per-connection server: owns one ghost TCP socket from accept to
//! teardown.
//!
//! The socket starts in RPC mode.  A successful `register` switches it into
//! the declared operating mode; streaming modes demote it to a raw byte pipe
//! paired with one or more operator peers.  All connection state is mutated
//! from the event-loop task only; the reader, the WS-input pump and the
//! supervisor tick talk to it exclusively through channels.

use crate::download::{DownloadContext, download_pair};
use crate::framing::{DEFAULT_RPC_TIMEOUT, Framer, FramingError, TIMEOUT_CHECK_SECS, spawn_reader};
use crate::logcat::{LogcatContext, rewrite_for_transport};
use crate::registry::{RegistrationInfo, Registry};
use crate::ws::{OperatorWs, WsFrame};
use ov_protocol::{
    ControlMessage, DownloadRequestParams, FileDownloadParams, FileUploadParams, ForwardParams,
    LogFormat, Mode, RegisterParams, RpcFrame, RpcRequest, RpcResponse, ShellParams, SshPortParams,
    TerminalParams, request_names,
};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Seconds between agent pings; the receive deadline is twice this.
pub const PING_TIMEOUT_SECS: u64 = 10;

// ---------------------------------------------------------------------------
// Tuning and commands
// ---------------------------------------------------------------------------

/// Per-connection timing knobs.  Production uses the defaults; tests shrink
/// them to keep the suites fast.
#[derive(Debug, Clone)]
pub struct ConnTuning {
    /// Expected ping cadence; silence beyond twice this terminates an
    /// AGENT connection.
    pub ping_timeout: Duration,
    /// Deadline for broker-to-ghost requests that expect a reply.
    pub rpc_timeout: Duration,
    /// Supervisor tick period.
    pub tick: Duration,
}

impl Default for ConnTuning {
    fn default() -> Self {
        ConnTuning {
            ping_timeout: Duration::from_secs(PING_TIMEOUT_SECS),
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
            tick: Duration::from_secs(TIMEOUT_CHECK_SECS),
        }
    }
}

/// Direction of a spawned file-transfer session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileAction {
    Download,
    Upload,
}

/// Commands the broker side sends to a live connection.
///
/// The spawn variants marshal an RPC request to the ghost and answer on
/// `reply` with the empty string on success, the ghost's error status on
/// failure, or `"command timeout"` when the deadline passes.
#[derive(Debug)]
pub enum ConnCommand {
    SpawnTerminal {
        sid: String,
        tty_device: Option<String>,
        reply: oneshot::Sender<String>,
    },
    SpawnShell {
        sid: String,
        command: String,
        reply: oneshot::Sender<String>,
    },
    SpawnFileServer {
        sid: String,
        action: FileAction,
        filename: String,
        terminal_sid: String,
        reply: oneshot::Sender<String>,
    },
    SpawnForwarder {
        sid: String,
        port: u16,
        reply: oneshot::Sender<String>,
    },
    /// Attach a logcat viewer: replay the history buffer, then subscribe.
    ConnectLogcat { ws: OperatorWs },
    /// Ask the ghost to self-upgrade.  Fire and forget.
    Upgrade,
    /// Tell a FILE-mode ghost the operator is ready for its bytes.  Fire
    /// and forget.
    ClearToDownload,
}

/// Why the event loop ended.
#[derive(Debug, Error)]
pub enum ExitReason {
    #[error("stop requested")]
    Stopped,
    #[error("transport: {0}")]
    Transport(std::io::Error),
    #[error("framing: {0}")]
    Framing(FramingError),
    #[error("registration failed: {0}")]
    RegistrationFailed(String),
    #[error("ping timeout")]
    PingTimeout,
    #[error("operator peer disconnected")]
    OperatorGone,
    #[error("download complete")]
    DownloadComplete,
}

impl From<FramingError> for ExitReason {
    fn from(e: FramingError) -> Self {
        match e {
            FramingError::Io(io) => ExitReason::Transport(io),
            other => ExitReason::Framing(other),
        }
    }
}

/// Remote control for one live connection.  Handed to the registry at
/// registration so it can reach the connection later: commands on `cmd_tx`,
/// forced teardown through [`stop`](Self::stop).
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub cmd_tx: mpsc::Sender<ConnCommand>,
    stop_tx: mpsc::Sender<bool>,
}

impl ConnectionHandle {
    pub(crate) fn new(cmd_tx: mpsc::Sender<ConnCommand>, stop_tx: mpsc::Sender<bool>) -> Self {
        ConnectionHandle { cmd_tx, stop_tx }
    }

    /// Make the connection's event loop exit; its teardown unregisters and
    /// closes everything.
    pub async fn stop(&self) {
        let _ = self.stop_tx.send(true).await;
    }
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

pub struct Connection {
    sid: String,
    mid: String,
    mode: Mode,
    format: LogFormat,
    properties: serde_json::Map<String, Value>,
    target_ssh_port: u16,
    /// Unix seconds of the last ping; 0 until the first one.
    last_ping: u64,
    registered: bool,
    transitioned: bool,
    peer_ip: String,

    registry: Arc<Registry>,
    tuning: ConnTuning,
    framer: Framer,
    writer: Arc<Mutex<OwnedWriteHalf>>,
    logcat: Option<LogcatContext>,
    download: Option<DownloadContext>,
    operator: Option<OperatorWs>,
    operator_input: Option<mpsc::Receiver<WsFrame>>,

    data_rx: mpsc::Receiver<Vec<u8>>,
    err_rx: mpsc::Receiver<std::io::Error>,
    cmd_tx: mpsc::Sender<ConnCommand>,
    cmd_rx: mpsc::Receiver<ConnCommand>,
    stop_tx: mpsc::Sender<bool>,
    stop_rx: mpsc::Receiver<bool>,

    reader_task: JoinHandle<()>,
    pump_task: Option<JoinHandle<()>>,
}

impl Connection {
    /// Take ownership of an accepted ghost socket and run its event loop as
    /// a detached task.  The connection hands its [`ConnectionHandle`] to
    /// the registry when it registers; until then nothing outside can reach
    /// it.
    pub fn spawn(
        stream: TcpStream,
        peer_addr: SocketAddr,
        registry: Arc<Registry>,
        tuning: ConnTuning,
    ) {
        let (read_half, write_half) = stream.into_split();
        let writer = Arc::new(Mutex::new(write_half));

        let (data_tx, data_rx) = mpsc::channel(32);
        let (err_tx, err_rx) = mpsc::channel(4);
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let (stop_tx, stop_rx) = mpsc::channel(4);
        let reader_task = spawn_reader(read_half, data_tx, err_tx);

        let conn = Connection {
            sid: String::new(),
            mid: String::new(),
            mode: Mode::None,
            format: LogFormat::Text,
            properties: serde_json::Map::new(),
            target_ssh_port: 0,
            last_ping: 0,
            registered: false,
            transitioned: false,
            peer_ip: peer_addr.ip().to_string(),
            registry,
            tuning,
            framer: Framer::new(writer.clone()),
            writer,
            logcat: None,
            download: None,
            operator: None,
            operator_input: None,
            data_rx,
            err_rx,
            cmd_tx,
            cmd_rx,
            stop_tx,
            stop_rx,
            reader_task,
            pump_task: None,
        };
        tokio::spawn(conn.run());
    }

    async fn run(mut self) {
        let reason = self.event_loop().await;
        match &reason {
            ExitReason::Stopped | ExitReason::DownloadComplete => {
                info!(sid = %self.sid, mid = %self.mid, peer = %self.peer_ip, reason = %reason, "connection closing");
            }
            other => {
                warn!(sid = %self.sid, mid = %self.mid, peer = %self.peer_ip, reason = %other, "connection closing");
            }
        }
        self.teardown().await;
    }

    async fn event_loop(&mut self) -> ExitReason {
        let mut tick = tokio::time::interval(self.tuning.tick);
        loop {
            tokio::select! {
                biased;
                Some(stop) = self.stop_rx.recv() => {
                    if stop {
                        return ExitReason::Stopped;
                    }
                }
                // Data before errors: chunks already queued at EOF must
                // still reach their sink before the EOF is acted on.
                Some(chunk) = self.data_rx.recv() => {
                    if let Err(reason) = self.on_chunk(chunk).await {
                        return reason;
                    }
                }
                Some(err) = self.err_rx.recv() => {
                    return self.on_reader_error(err).await;
                }
                Some(cmd) = self.cmd_rx.recv() => {
                    if let Err(reason) = self.on_command(cmd).await {
                        return reason;
                    }
                }
                _ = tick.tick() => {
                    if let Err(reason) = self.on_tick() {
                        return reason;
                    }
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Reader input
    // -----------------------------------------------------------------------

    async fn on_reader_error(&mut self, err: std::io::Error) -> ExitReason {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            if let Some(download) = &self.download {
                if download.ready {
                    // EOF is how the ghost marks the end of the file; the
                    // consumer must still see the sentinel before we go.
                    download.finish().await;
                    return ExitReason::DownloadComplete;
                }
            }
        }
        ExitReason::Transport(err)
    }

    /// Route one raw chunk by operating mode.  Streaming modes bypass the
    /// RPC parser entirely.
    async fn on_chunk(&mut self, chunk: Vec<u8>) -> Result<(), ExitReason> {
        match self.mode {
            Mode::Terminal | Mode::Forward => self.write_to_operator(chunk).await,
            Mode::Shell => {
                let data = rewrite_for_transport(Mode::Shell, self.format, &chunk).into_owned();
                self.write_to_operator(data).await
            }
            Mode::Logcat => {
                if let Some(logcat) = self.logcat.as_mut() {
                    logcat.append_and_broadcast(&chunk);
                }
                Ok(())
            }
            Mode::File if self.download.as_ref().is_some_and(|d| d.ready) => {
                let delivered = match &self.download {
                    Some(download) => download.push(chunk).await,
                    None => false,
                };
                if delivered {
                    Ok(())
                } else {
                    Err(ExitReason::OperatorGone)
                }
            }
            _ => self.on_rpc_bytes(&chunk).await,
        }
    }

    async fn on_rpc_bytes(&mut self, chunk: &[u8]) -> Result<(), ExitReason> {
        self.framer.extend(chunk);
        loop {
            // One frame at a time until registration, so bytes trailing the
            // register frame survive for the streaming path.
            let single_frame_only = !self.registered;
            let frames = self.framer.parse(single_frame_only).map_err(ExitReason::from)?;
            if frames.is_empty() {
                return Ok(());
            }
            for frame in frames {
                match frame {
                    RpcFrame::Request(req) => self.dispatch_request(req).await?,
                    RpcFrame::Response(res) => self.framer.resolve(res),
                }
            }
            if self.registered && self.mode.is_streaming() && !self.transitioned {
                self.transitioned = true;
                return self.start_mode_pipe().await;
            }
        }
    }

    /// Enter the just-registered streaming mode: drain residual bytes the
    /// framer buffered past the register frame, and start the WS-input pump
    /// where the mode has one.
    async fn start_mode_pipe(&mut self) -> Result<(), ExitReason> {
        match self.mode {
            Mode::Terminal | Mode::Shell | Mode::Forward => {
                let leftover = self.framer.take_leftover();
                if !leftover.is_empty() {
                    let data = rewrite_for_transport(self.mode, self.format, &leftover).into_owned();
                    self.write_to_operator(data).await?;
                }
                self.pump_task = self.spawn_input_pump();
            }
            Mode::Logcat => {
                // Logcat ghosts stream without waiting for the ACK; the tail
                // after the register frame is log data.
                let leftover = self.framer.take_leftover();
                if !leftover.is_empty() {
                    if let Some(logcat) = self.logcat.as_mut() {
                        logcat.append_and_broadcast(&leftover);
                    }
                }
            }
            Mode::File | Mode::Agent | Mode::None => {}
        }
        Ok(())
    }

    /// Copy operator frames to the ghost socket.  Shell input accepts text
    /// only; binary frames are dropped to keep stray control sequences out
    /// of the shell's stdin.
    fn spawn_input_pump(&mut self) -> Option<JoinHandle<()>> {
        let mut input = self.operator_input.take()?;
        let writer = self.writer.clone();
        let stop_tx = self.stop_tx.clone();
        let mode = self.mode;
        let sid = self.sid.clone();
        Some(tokio::spawn(async move {
            while let Some(frame) = input.recv().await {
                let bytes = match frame {
                    WsFrame::Binary(data) => {
                        if mode == Mode::Shell {
                            warn!(sid = %sid, "dropping binary frame on shell input");
                            continue;
                        }
                        data
                    }
                    WsFrame::Text(text) => text.into_bytes(),
                    WsFrame::Close => break,
                };
                let mut writer = writer.lock().await;
                if writer.write_all(&bytes).await.is_err() {
                    break;
                }
            }
            let _ = stop_tx.send(true).await;
        }))
    }

    async fn write_to_operator(&mut self, data: Vec<u8>) -> Result<(), ExitReason> {
        match &self.operator {
            Some(ws) => ws
                .send(WsFrame::Binary(data))
                .await
                .map_err(|_| ExitReason::OperatorGone),
            None => Err(ExitReason::OperatorGone),
        }
    }

    // -----------------------------------------------------------------------
    // RPC dispatch (ghost -> broker)
    // -----------------------------------------------------------------------

    async fn dispatch_request(&mut self, req: RpcRequest) -> Result<(), ExitReason> {
        match req.name.as_str() {
            request_names::PING => {
                self.touch_ping();
                self.send_response(RpcResponse::success(&req.rid, json!("pong")))
                    .await
            }
            request_names::REGISTER => self.handle_register(req).await,
            request_names::REQUEST_TO_DOWNLOAD => self.handle_download_request(req).await,
            request_names::CLEAR_TO_UPLOAD => {
                // No reply by contract.
                self.registry.register_upload_request(&self.sid).await;
                Ok(())
            }
            request_names::REQUEST_TARGET_SSH_PORT => self.handle_suggest_port(req).await,
            request_names::REGISTER_TARGET_SSH_PORT => self.handle_claim_port(req).await,
            other => {
                // Unknown verbs are ignored without a response, so newer
                // agents keep working against older brokers.
                debug!(name = other, "ignoring unknown request");
                Ok(())
            }
        }
    }

    async fn handle_register(&mut self, req: RpcRequest) -> Result<(), ExitReason> {
        let params: RegisterParams = match serde_json::from_value(req.params.clone()) {
            Ok(params) => params,
            Err(e) => {
                let message = format!("invalid register parameters: {e}");
                return self.fail_registration(&req.rid, message).await;
            }
        };
        if params.sid.is_empty() || params.mid.is_empty() {
            return self
                .fail_registration(&req.rid, "sid and mid must be non-empty".to_owned())
                .await;
        }
        if self.registered {
            return self
                .fail_registration(&req.rid, "connection already registered".to_owned())
                .await;
        }

        let mut properties = params.properties.clone();
        properties.insert("ip".to_owned(), Value::String(self.peer_ip.clone()));
        let info = RegistrationInfo {
            sid: params.sid.clone(),
            mid: params.mid.clone(),
            mode: params.mode,
            format: params.format,
            properties: properties.clone(),
        };

        let handle = ConnectionHandle::new(self.cmd_tx.clone(), self.stop_tx.clone());
        let operator = match self.registry.register(&info, handle).await {
            Ok(operator) => operator,
            Err(e) => return self.fail_registration(&req.rid, e.to_string()).await,
        };

        self.sid = params.sid;
        self.mid = params.mid;
        self.mode = params.mode;
        self.format = params.format;
        self.properties = properties;
        if self.mode == Mode::Logcat {
            // Viewers that arrived ahead of this stream join before any log
            // byte is routed, so the post-register tail reaches them too.
            let mut logcat = LogcatContext::new(self.format);
            for viewer in self.registry.take_logcat_viewers(&self.mid).await {
                logcat.subscribe(viewer);
            }
            self.logcat = Some(logcat);
        }
        if let Some(operator) = operator {
            if self.mode == Mode::Terminal {
                // Announce the session id before any terminal bytes flow.
                let control = serde_json::to_string(&ControlMessage::sid(&self.sid))
                    .map_err(|e| ExitReason::from(FramingError::from(e)))?;
                operator
                    .ws
                    .send(WsFrame::Text(control))
                    .await
                    .map_err(|_| ExitReason::OperatorGone)?;
            }
            self.operator = Some(operator.ws);
            self.operator_input = Some(operator.input);
        }
        self.registered = true;
        self.touch_ping();
        info!(
            sid = %self.sid,
            mid = %self.mid,
            mode = ?self.mode,
            properties = self.properties.len(),
            "ghost registered"
        );
        self.send_response(RpcResponse::success(&req.rid, Value::Null))
            .await
    }

    /// Report a registration error to the ghost, then surface it as the
    /// fatal loop condition.
    async fn fail_registration(&mut self, rid: &str, message: String) -> Result<(), ExitReason> {
        self.send_response(RpcResponse::error(rid, &message)).await?;
        Err(ExitReason::RegistrationFailed(message))
    }

    async fn handle_download_request(&mut self, req: RpcRequest) -> Result<(), ExitReason> {
        let params: DownloadRequestParams = match serde_json::from_value(req.params.clone()) {
            Ok(params) => params,
            Err(e) => {
                let message = format!("invalid download parameters: {e}");
                return self.send_response(RpcResponse::error(&req.rid, &message)).await;
            }
        };
        let (mut context, stream) =
            download_pair(&params.filename, params.size, &params.terminal_sid);
        context.ready = true;
        self.download = Some(context);
        self.registry.register_download_request(&self.sid, stream).await;
        info!(sid = %self.sid, filename = %params.filename, size = params.size, "download announced");
        self.send_response(RpcResponse::success(&req.rid, Value::Null))
            .await
    }

    async fn handle_suggest_port(&mut self, req: RpcRequest) -> Result<(), ExitReason> {
        // The old port is implicitly released by asking for a new one.
        if self.target_ssh_port != 0 {
            debug!(sid = %self.sid, port = self.target_ssh_port, "releasing previously registered port");
        }
        self.target_ssh_port = 0;
        self.registry.release_target_ssh_port(&self.sid).await;
        match self.registry.suggest_target_ssh_port().await {
            Ok(port) => {
                self.send_response(RpcResponse::success(&req.rid, json!({ "port": port })))
                    .await
            }
            Err(e) => {
                warn!(sid = %self.sid, error = %e, "no SSH port to suggest");
                self.send_response(RpcResponse::error(&req.rid, &e.to_string()))
                    .await
            }
        }
    }

    async fn handle_claim_port(&mut self, req: RpcRequest) -> Result<(), ExitReason> {
        let params: SshPortParams = match serde_json::from_value(req.params.clone()) {
            Ok(params) => params,
            Err(e) => {
                let message = format!("invalid port parameters: {e}");
                return self.send_response(RpcResponse::error(&req.rid, &message)).await;
            }
        };
        match self
            .registry
            .claim_target_ssh_port(&self.sid, params.port)
            .await
        {
            Ok(()) => {
                self.target_ssh_port = params.port;
                info!(sid = %self.sid, port = params.port, "target SSH port registered");
                self.send_response(RpcResponse::success(&req.rid, Value::Null))
                    .await
            }
            Err(e) => {
                self.send_response(RpcResponse::error(&req.rid, &e.to_string()))
                    .await
            }
        }
    }

    // -----------------------------------------------------------------------
    // Broker commands (outbound RPC)
    // -----------------------------------------------------------------------

    async fn on_command(&mut self, cmd: ConnCommand) -> Result<(), ExitReason> {
        match cmd {
            ConnCommand::SpawnTerminal {
                sid,
                tty_device,
                reply,
            } => {
                self.send_spawn_request(
                    request_names::TERMINAL,
                    serde_json::to_value(TerminalParams { sid, tty_device })
                        .map_err(|e| ExitReason::from(FramingError::from(e)))?,
                    reply,
                )
                .await
            }
            ConnCommand::SpawnShell { sid, command, reply } => {
                self.send_spawn_request(
                    request_names::SHELL,
                    serde_json::to_value(ShellParams { sid, command })
                        .map_err(|e| ExitReason::from(FramingError::from(e)))?,
                    reply,
                )
                .await
            }
            ConnCommand::SpawnFileServer {
                sid,
                action,
                filename,
                terminal_sid,
                reply,
            } => {
                let (name, params) = match action {
                    FileAction::Download => (
                        request_names::FILE_DOWNLOAD,
                        serde_json::to_value(FileDownloadParams { sid, filename }),
                    ),
                    FileAction::Upload => (
                        request_names::FILE_UPLOAD,
                        serde_json::to_value(FileUploadParams {
                            sid,
                            terminal_sid,
                            filename,
                        }),
                    ),
                };
                let params = params.map_err(|e| ExitReason::from(FramingError::from(e)))?;
                self.send_spawn_request(name, params, reply).await
            }
            ConnCommand::SpawnForwarder { sid, port, reply } => {
                self.send_spawn_request(
                    request_names::FORWARD,
                    serde_json::to_value(ForwardParams { sid, port })
                        .map_err(|e| ExitReason::from(FramingError::from(e)))?,
                    reply,
                )
                .await
            }
            ConnCommand::ConnectLogcat { ws } => {
                match self.logcat.as_mut() {
                    Some(logcat) => logcat.subscribe(ws),
                    None => {
                        warn!(sid = %self.sid, "logcat viewer attached to a non-logcat connection");
                        let _ = ws.try_send(WsFrame::Close);
                    }
                }
                Ok(())
            }
            ConnCommand::Upgrade => self.send_plain_request(request_names::UPGRADE).await,
            ConnCommand::ClearToDownload => {
                self.send_plain_request(request_names::CLEAR_TO_DOWNLOAD).await
            }
        }
    }

    async fn send_spawn_request(
        &mut self,
        name: &str,
        params: Value,
        reply: oneshot::Sender<String>,
    ) -> Result<(), ExitReason> {
        let req = RpcRequest::new(name, params);
        self.framer
            .send_request(&req, Some((reply, Some(self.tuning.rpc_timeout))))
            .await
            .map_err(ExitReason::from)
    }

    async fn send_plain_request(&mut self, name: &str) -> Result<(), ExitReason> {
        let req = RpcRequest::new(name, Value::Null);
        self.framer
            .send_request(&req, None)
            .await
            .map_err(ExitReason::from)
    }

    async fn send_response(&mut self, res: RpcResponse) -> Result<(), ExitReason> {
        self.framer.send_response(&res).await.map_err(ExitReason::from)
    }

    // -----------------------------------------------------------------------
    // Supervisor
    // -----------------------------------------------------------------------

    fn on_tick(&mut self) -> Result<(), ExitReason> {
        self.framer.sweep_timeouts(Instant::now());
        if self.mode == Mode::Agent && self.last_ping != 0 {
            let silence = now_unix().saturating_sub(self.last_ping) as f64;
            if silence > 2.0 * self.tuning.ping_timeout.as_secs_f64() {
                warn!(mid = %self.mid, silence_secs = silence, "agent stopped pinging");
                return Err(ExitReason::PingTimeout);
            }
        }
        Ok(())
    }

    fn touch_ping(&mut self) {
        self.last_ping = self.last_ping.max(now_unix());
    }

    // -----------------------------------------------------------------------
    // Teardown
    // -----------------------------------------------------------------------

    /// Runs on every exit path: unregister, close the socket, close the
    /// operator peer(s).
    async fn teardown(&mut self) {
        if let Some(pump) = self.pump_task.take() {
            pump.abort();
        }
        self.reader_task.abort();
        self.registry.unregister(&self.sid, &self.mid).await;
        if let Some(ws) = self.operator.take() {
            ws.close().await;
        }
        if let Some(logcat) = self.logcat.as_mut() {
            logcat.close_all();
        }
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
