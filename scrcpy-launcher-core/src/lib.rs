use std::{collections::BTreeMap, net::Ipv4Addr};

use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub const DEBUG_PORT: u16 = 5555;
pub const MAX_HISTORY_ENTRIES: usize = 10;
pub const MAX_ADDRESS_LEN: usize = 255;
pub const MAX_RPC_MESSAGE_BYTES: usize = 1024 * 1024;
pub const EVENT_PUSH_PROGRESS: &str = "adb-push-progress";
pub const DEFAULT_REMOTE_DIR: &str = "/sdcard/Download/";

pub type RequestId = u64;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub message: String,
}

impl ConnectionStatus {
    pub fn disconnected(message: impl Into<String>) -> Self {
        Self {
            connected: false,
            message: message.into(),
        }
    }
}

/// Structured outcome of a backend action.
///
/// `success: false` is a normal result (device unreachable, pairing refused),
/// not a transport error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandResult {
    pub success: bool,
    pub message: String,
}

impl CommandResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProgressUpdate {
    #[serde(default)]
    pub progress: u32,
    #[serde(default)]
    pub message: String,
}

impl ProgressUpdate {
    pub fn percent(&self) -> u32 {
        self.progress.min(100)
    }
}

fn default_true() -> bool {
    true
}

fn default_theme() -> String {
    "light".to_owned()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GlobalSettings {
    #[serde(default = "default_true")]
    pub filter_installed_apps: bool,
    #[serde(default = "default_theme")]
    pub theme: String,
    /// Fields owned by other screens; carried through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            filter_installed_apps: true,
            theme: default_theme(),
            extra: Map::new(),
        }
    }
}

/// Per-app display overrides passed through to `launch_app`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct AppSettings {
    pub use_full_res_switch: bool,
    pub full_res: String,
    pub dpi: u32,
    pub is_landscape: bool,
}

/// A saved app launch entry, keyed by package name in [`LauncherConfig::apps`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub settings: Option<AppSettings>,
    #[serde(default)]
    pub scrcpy_args: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Full configuration snapshot as returned by `get_config`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct LauncherConfig {
    /// Most recent first, capped at [`MAX_HISTORY_ENTRIES`] by the backend.
    #[serde(default)]
    pub adb_history: Vec<String>,
    #[serde(default)]
    pub first_run: bool,
    #[serde(default)]
    pub global_settings: GlobalSettings,
    #[serde(default)]
    pub apps: BTreeMap<String, AppConfig>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl LauncherConfig {
    pub fn history(&self) -> &[String] {
        let len = self.adb_history.len().min(MAX_HISTORY_ENTRIES);
        &self.adb_history[..len]
    }

    pub fn latest_address(&self) -> Option<&str> {
        self.adb_history.first().map(String::as_str)
    }

    pub fn filter_installed_apps(&self) -> bool {
        self.global_settings.filter_installed_apps
    }

    pub fn app(&self, package: &str) -> Option<&AppConfig> {
        self.apps.get(package)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppEntry {
    pub name: String,
    #[serde(default)]
    pub package_name: Option<String>,
    #[serde(default)]
    pub icon_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "command", content = "args")]
pub enum BackendCall {
    #[serde(rename = "scan_tcp_devices")]
    ScanDevices,
    #[serde(rename = "check_adb_status")]
    CheckStatus,
    #[serde(rename = "get_installed_apps")]
    ListInstalledPackages,
    #[serde(rename = "connect_wireless")]
    ConnectWireless { ip: String },
    #[serde(rename = "get_config")]
    GetConfig,
    #[serde(rename = "enable_tcpip")]
    EnableTcpip,
    #[serde(rename = "disconnect_all")]
    DisconnectAll,
    #[serde(rename = "pair_device")]
    PairDevice { addr: String, code: String },
    #[serde(rename = "adb_push_file", rename_all = "camelCase")]
    PushFile {
        local_path: String,
        remote_path: Option<String>,
    },
    #[serde(rename = "launch_mirror")]
    LaunchMirror,
    #[serde(rename = "launch_audio")]
    LaunchAudio,
    #[serde(rename = "launch_app", rename_all = "camelCase")]
    LaunchApp {
        package: String,
        settings: Option<AppSettings>,
        scrcpy_args: Option<String>,
    },
    #[serde(rename = "kill_scrcpy")]
    KillScrcpy,
}

impl BackendCall {
    pub fn command(&self) -> &'static str {
        match self {
            BackendCall::ScanDevices => "scan_tcp_devices",
            BackendCall::CheckStatus => "check_adb_status",
            BackendCall::ListInstalledPackages => "get_installed_apps",
            BackendCall::ConnectWireless { .. } => "connect_wireless",
            BackendCall::GetConfig => "get_config",
            BackendCall::EnableTcpip => "enable_tcpip",
            BackendCall::DisconnectAll => "disconnect_all",
            BackendCall::PairDevice { .. } => "pair_device",
            BackendCall::PushFile { .. } => "adb_push_file",
            BackendCall::LaunchMirror => "launch_mirror",
            BackendCall::LaunchAudio => "launch_audio",
            BackendCall::LaunchApp { .. } => "launch_app",
            BackendCall::KillScrcpy => "kill_scrcpy",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RpcRequest {
    pub id: RequestId,
    pub call: BackendCall,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RpcOutcome {
    Ok(Value),
    Err(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RpcResponse {
    pub id: RequestId,
    pub outcome: RpcOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackendEvent {
    pub event: String,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireMessage {
    Request(RpcRequest),
    Response(RpcResponse),
    Event(BackendEvent),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Request = 0,
    Response = 1,
    Event = 2,
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("address must not be empty")]
    EmptyAddress,
    #[error("address is too long ({len} > {max} chars)")]
    AddressTooLong { len: usize, max: usize },
    #[error("pairing address must be ip:port")]
    PairAddressMissingPort,
    #[error("pairing code must not be empty")]
    EmptyPairCode,
    #[error("invalid frame length")]
    InvalidFrameLength,
    #[error("frame of {size} bytes exceeds {max} bytes")]
    FrameTooLarge { size: usize, max: usize },
    #[error("unsupported message type {0}")]
    UnsupportedMessageType(u8),
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Trims a user-typed address and checks it is present.
///
/// No port defaulting happens here; a typed address goes to the backend as is.
pub fn normalize_address(input: &str) -> Result<String, CoreError> {
    let address = input.trim();
    if address.is_empty() {
        return Err(CoreError::EmptyAddress);
    }
    if address.len() > MAX_ADDRESS_LEN {
        return Err(CoreError::AddressTooLong {
            len: address.len(),
            max: MAX_ADDRESS_LEN,
        });
    }
    Ok(address.to_owned())
}

/// Address written into the connect field when a scan result is picked.
pub fn scan_selection_address(ip: &str) -> String {
    format!("{}:{}", ip.trim(), DEBUG_PORT)
}

pub fn host_part(address: &str) -> &str {
    address.split_once(':').map_or(address, |(host, _)| host)
}

pub fn is_ipv4_literal(host: &str) -> bool {
    host.parse::<Ipv4Addr>().is_ok()
}

/// Pairing dialog pre-fill: `"<ip>:"` when the connect field holds an IPv4 host.
pub fn pair_prefill(address_field: &str) -> Option<String> {
    let host = host_part(address_field.trim());
    is_ipv4_literal(host).then(|| format!("{host}:"))
}

pub fn validate_pair_request(addr: &str, code: &str) -> Result<(String, String), CoreError> {
    let addr = addr.trim();
    if addr.is_empty() || !addr.contains(':') {
        return Err(CoreError::PairAddressMissingPort);
    }
    let code = code.trim();
    if code.is_empty() {
        return Err(CoreError::EmptyPairCode);
    }
    Ok((addr.to_owned(), code.to_owned()))
}

pub fn encode_frame(message: &WireMessage) -> Result<Vec<u8>, CoreError> {
    let (message_type, payload) = match message {
        WireMessage::Request(request) => (MessageType::Request as u8, to_json(request)?),
        WireMessage::Response(response) => (MessageType::Response as u8, to_json(response)?),
        WireMessage::Event(event) => (MessageType::Event as u8, to_json(event)?),
    };

    let frame_len = 1usize
        .checked_add(payload.len())
        .ok_or(CoreError::InvalidFrameLength)?;
    if frame_len + 4 > MAX_RPC_MESSAGE_BYTES {
        return Err(CoreError::FrameTooLarge {
            size: frame_len + 4,
            max: MAX_RPC_MESSAGE_BYTES,
        });
    }
    let frame_len_u32 = u32::try_from(frame_len).map_err(|_| CoreError::InvalidFrameLength)?;

    let mut out = BytesMut::with_capacity(4 + frame_len);
    out.put_u32_le(frame_len_u32);
    out.put_u8(message_type);
    out.extend_from_slice(&payload);
    Ok(out.to_vec())
}

pub fn decode_frame(frame: &[u8]) -> Result<WireMessage, CoreError> {
    if frame.len() > MAX_RPC_MESSAGE_BYTES {
        return Err(CoreError::FrameTooLarge {
            size: frame.len(),
            max: MAX_RPC_MESSAGE_BYTES,
        });
    }
    if frame.len() < 5 {
        return Err(CoreError::InvalidFrameLength);
    }

    let mut cursor = frame;
    let expected_len = cursor.get_u32_le() as usize;
    if expected_len + 4 != frame.len() {
        return Err(CoreError::InvalidFrameLength);
    }

    let message_type = cursor.get_u8();
    let payload = cursor;

    match message_type {
        x if x == MessageType::Request as u8 => Ok(WireMessage::Request(from_json(payload)?)),
        x if x == MessageType::Response as u8 => Ok(WireMessage::Response(from_json(payload)?)),
        x if x == MessageType::Event as u8 => Ok(WireMessage::Event(from_json(payload)?)),
        other => Err(CoreError::UnsupportedMessageType(other)),
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<Vec<u8>, CoreError> {
    serde_json::to_vec(value).map_err(|err| CoreError::Serialization(err.to_string()))
}

fn from_json<'a, T: Deserialize<'a>>(bytes: &'a [u8]) -> Result<T, CoreError> {
    serde_json::from_slice(bytes).map_err(|err| CoreError::Serialization(err.to_string()))
}
