// ov-protocol: Ghost control-channel wire types and serialization.
//
// Ghosts talk to the broker over plaintext TCP using newline-terminated JSON
// objects.  A frame carrying a `name` field is a request; a frame carrying a
// `response` field is a reply.  Discriminants for operating modes and log
// formats are frozen integers for agent compatibility.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Byte terminating every frame on the wire.
pub const FRAME_TERMINATOR: u8 = b'\n';

/// The one response status that means OK; any other string is a
/// human-readable error message.
pub const RESPONSE_SUCCESS: &str = "success";

/// Frozen request verbs.
pub mod request_names {
    // Ghost -> broker
    pub const PING: &str = "ping";
    pub const REGISTER: &str = "register";
    pub const REQUEST_TO_DOWNLOAD: &str = "request_to_download";
    pub const CLEAR_TO_UPLOAD: &str = "clear_to_upload";
    pub const REQUEST_TARGET_SSH_PORT: &str = "request_target_ssh_port";
    pub const REGISTER_TARGET_SSH_PORT: &str = "register_target_ssh_port";

    // Broker -> ghost
    pub const TERMINAL: &str = "terminal";
    pub const SHELL: &str = "shell";
    pub const FILE_DOWNLOAD: &str = "file_download";
    pub const FILE_UPLOAD: &str = "file_upload";
    pub const FORWARD: &str = "forward";
    pub const UPGRADE: &str = "upgrade";
    pub const CLEAR_TO_DOWNLOAD: &str = "clear_to_download";
}

// ---------------------------------------------------------------------------
// Operating mode / log format discriminants
// ---------------------------------------------------------------------------

/// Operating mode of one ghost connection.
///
/// Integer values are part of the wire format and must never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Mode {
    None = 0,
    Agent = 1,
    Terminal = 2,
    Shell = 3,
    Logcat = 4,
    File = 5,
    Forward = 6,
}

impl Mode {
    /// True for modes where the socket becomes a raw byte stream after
    /// registration instead of continuing to carry RPC frames.
    pub fn is_streaming(self) -> bool {
        !matches!(self, Mode::None | Mode::Agent)
    }
}

impl From<Mode> for u8 {
    fn from(mode: Mode) -> u8 {
        mode as u8
    }
}

impl TryFrom<u8> for Mode {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Mode::None),
            1 => Ok(Mode::Agent),
            2 => Ok(Mode::Terminal),
            3 => Ok(Mode::Shell),
            4 => Ok(Mode::Logcat),
            5 => Ok(Mode::File),
            6 => Ok(Mode::Forward),
            other => Err(format!("unknown mode discriminant: {other}")),
        }
    }
}

/// Log stream framing declared by a logcat ghost at registration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum LogFormat {
    /// Plain text; bare LF is rewritten to CRLF for browser terminals.
    #[default]
    Text = 0,
    /// VT100 binary stream; passed through untouched.
    Vt100 = 1,
}

impl From<LogFormat> for u8 {
    fn from(format: LogFormat) -> u8 {
        format as u8
    }
}

impl TryFrom<u8> for LogFormat {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(LogFormat::Text),
            1 => Ok(LogFormat::Vt100),
            other => Err(format!("unknown log format discriminant: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// RPC frames
// ---------------------------------------------------------------------------

/// One RPC request frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Correlation id; echoed back verbatim in the matching response.
    pub rid: String,
    pub name: String,
    #[serde(default)]
    pub params: Value,
}

impl RpcRequest {
    /// Build a request with a freshly generated correlation id.
    pub fn new(name: &str, params: Value) -> Self {
        RpcRequest {
            rid: Uuid::new_v4().to_string(),
            name: name.to_owned(),
            params,
        }
    }
}

/// One RPC response frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub rid: String,
    /// [`RESPONSE_SUCCESS`] or a human-readable error message.
    pub response: String,
    #[serde(default)]
    pub params: Value,
}

impl RpcResponse {
    pub fn success(rid: &str, params: Value) -> Self {
        RpcResponse {
            rid: rid.to_owned(),
            response: RESPONSE_SUCCESS.to_owned(),
            params,
        }
    }

    pub fn error(rid: &str, message: &str) -> Self {
        RpcResponse {
            rid: rid.to_owned(),
            response: message.to_owned(),
            params: Value::Null,
        }
    }

    pub fn is_success(&self) -> bool {
        self.response == RESPONSE_SUCCESS
    }
}

/// Either kind of frame, distinguished by which tag field is present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RpcFrame {
    Request(RpcRequest),
    Response(RpcResponse),
}

// ---------------------------------------------------------------------------
// Ghost -> broker request parameters
// ---------------------------------------------------------------------------

/// Parameters of the `register` handshake request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterParams {
    /// Session id chosen by the ghost; opaque to the broker.
    pub sid: String,
    /// Stable machine id of the ghost-bearing device.
    pub mid: String,
    pub mode: Mode,
    #[serde(default)]
    pub format: LogFormat,
    /// Free-form device properties surfaced in the machine list.
    #[serde(default)]
    pub properties: serde_json::Map<String, Value>,
}

/// Parameters of `request_to_download`, sent by a FILE-mode ghost before it
/// starts streaming file bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadRequestParams {
    /// The terminal session this download was initiated from.
    #[serde(default)]
    pub terminal_sid: String,
    pub filename: String,
    #[serde(default)]
    pub size: u64,
}

/// Parameters of `register_target_ssh_port`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshPortParams {
    pub port: u16,
}

// ---------------------------------------------------------------------------
// Broker -> ghost request parameters
// ---------------------------------------------------------------------------

/// Parameters of the `terminal` spawn request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminalParams {
    pub sid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tty_device: Option<String>,
}

/// Parameters of the `shell` spawn request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShellParams {
    pub sid: String,
    pub command: String,
}

/// Parameters of the `file_download` spawn request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileDownloadParams {
    pub sid: String,
    pub filename: String,
}

/// Parameters of the `file_upload` spawn request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileUploadParams {
    pub sid: String,
    pub terminal_sid: String,
    pub filename: String,
}

/// Parameters of the `forward` spawn request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForwardParams {
    pub sid: String,
    pub port: u16,
}

// ---------------------------------------------------------------------------
// Operator-side control frames
// ---------------------------------------------------------------------------

/// Text control frame sent to the operator WebSocket right after a terminal
/// pairing, announcing the new session id.
///
/// ```json
/// { "type": "sid", "data": "<sid>" }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: String,
}

impl ControlMessage {
    pub fn sid(sid: &str) -> Self {
        ControlMessage {
            kind: "sid".to_owned(),
            data: sid.to_owned(),
        }
    }
}
