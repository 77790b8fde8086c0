use std::{
    fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use url::Url;

/// `settings.json` holds two short values; anything larger is not ours.
pub const MAX_SETTINGS_BYTES: u64 = 64 * 1024;
pub const MAX_BACKEND_URL_LEN: usize = 2048;
pub const DEFAULT_BACKEND_URL: &str = "ws://127.0.0.1:8765/rpc";
pub const CONFIG_DIR_ENV: &str = "SCRCPY_LAUNCHER_CONFIG_DIR";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientSettings {
    #[serde(default = "default_backend_url")]
    pub backend_url: String,
    /// App name database used for suggestions.
    #[serde(default)]
    pub app_database: Option<PathBuf>,
}

fn default_backend_url() -> String {
    DEFAULT_BACKEND_URL.to_owned()
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            backend_url: default_backend_url(),
            app_database: None,
        }
    }
}

#[derive(Debug)]
pub enum SettingsLoadError {
    Metadata(io::Error),
    TooLarge { size: u64, max: u64 },
    Read(io::Error),
    Parse(serde_json::Error),
    InvalidBackendUrl(String),
}

impl std::fmt::Display for SettingsLoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettingsLoadError::Metadata(e) => write!(f, "metadata read failed: {e}"),
            SettingsLoadError::TooLarge { size, max } => {
                write!(f, "file too large: {size} bytes (max {max})")
            }
            SettingsLoadError::Read(e) => write!(f, "read failed: {e}"),
            SettingsLoadError::Parse(e) => write!(f, "parse failed: {e}"),
            SettingsLoadError::InvalidBackendUrl(reason) => {
                write!(f, "invalid backend url: {reason}")
            }
        }
    }
}

impl std::error::Error for SettingsLoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SettingsLoadError::Metadata(e) => Some(e),
            SettingsLoadError::Read(e) => Some(e),
            SettingsLoadError::Parse(e) => Some(e),
            SettingsLoadError::TooLarge { .. } | SettingsLoadError::InvalidBackendUrl(_) => None,
        }
    }
}

#[derive(Debug)]
pub enum SettingsSaveError {
    InvalidBackendUrl(String),
    Serialize(serde_json::Error),
    WriteTmp(io::Error),
    Rename(io::Error),
}

impl std::fmt::Display for SettingsSaveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettingsSaveError::InvalidBackendUrl(reason) => {
                write!(f, "invalid backend url: {reason}")
            }
            SettingsSaveError::Serialize(e) => write!(f, "serialize failed: {e}"),
            SettingsSaveError::WriteTmp(e) => write!(f, "tmp write failed: {e}"),
            SettingsSaveError::Rename(e) => write!(f, "rename failed: {e}"),
        }
    }
}

impl std::error::Error for SettingsSaveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SettingsSaveError::Serialize(e) => Some(e),
            SettingsSaveError::WriteTmp(e) => Some(e),
            SettingsSaveError::Rename(e) => Some(e),
            SettingsSaveError::InvalidBackendUrl(_) => None,
        }
    }
}

/// Per-user data directory. `SCRCPY_LAUNCHER_CONFIG_DIR` overrides it.
pub fn app_dir() -> PathBuf {
    let dir = match std::env::var_os(CONFIG_DIR_ENV) {
        Some(override_dir) => PathBuf::from(override_dir),
        None => std::env::var_os("LOCALAPPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ScrcpyLauncher"),
    };
    let _ = fs::create_dir_all(&dir);
    dir
}

pub fn settings_path() -> PathBuf {
    app_dir().join("settings.json")
}

pub fn validate_backend_url(raw: &str) -> Result<Url, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err("backend url is empty".to_owned());
    }
    if raw.len() > MAX_BACKEND_URL_LEN {
        return Err(format!(
            "backend url too long: {} bytes (max {MAX_BACKEND_URL_LEN})",
            raw.len()
        ));
    }
    let url = Url::parse(raw).map_err(|err| format!("{raw}: {err}"))?;
    match url.scheme() {
        "ws" | "wss" => {}
        other => return Err(format!("unsupported scheme `{other}` (expected ws or wss)")),
    }
    if url.host_str().is_none() {
        return Err(format!("{raw}: missing host"));
    }
    Ok(url)
}

pub fn parse_settings_json(data: &str) -> Result<ClientSettings, serde_json::Error> {
    serde_json::from_str::<ClientSettings>(data)
}

pub fn load_settings_from_path(path: &Path) -> Result<ClientSettings, SettingsLoadError> {
    let meta = fs::metadata(path).map_err(SettingsLoadError::Metadata)?;
    if meta.len() > MAX_SETTINGS_BYTES {
        return Err(SettingsLoadError::TooLarge {
            size: meta.len(),
            max: MAX_SETTINGS_BYTES,
        });
    }

    let data = fs::read_to_string(path).map_err(SettingsLoadError::Read)?;
    let settings = parse_settings_json(&data).map_err(SettingsLoadError::Parse)?;
    validate_backend_url(&settings.backend_url).map_err(SettingsLoadError::InvalidBackendUrl)?;
    Ok(settings)
}

/// Loads saved settings. A missing file yields the defaults; any other
/// failure is returned so the caller can report it.
pub fn load_settings(path: &Path) -> Result<ClientSettings, SettingsLoadError> {
    match load_settings_from_path(path) {
        Err(SettingsLoadError::Metadata(err)) if err.kind() == io::ErrorKind::NotFound => {
            Ok(ClientSettings::default())
        }
        other => other,
    }
}

pub fn save_settings_to_path(path: &Path, settings: &ClientSettings) -> Result<(), SettingsSaveError> {
    validate_backend_url(&settings.backend_url).map_err(SettingsSaveError::InvalidBackendUrl)?;

    let tmp = path.with_extension("json.tmp");
    let payload = serde_json::to_string_pretty(settings).map_err(SettingsSaveError::Serialize)?;
    fs::write(&tmp, payload.as_bytes()).map_err(SettingsSaveError::WriteTmp)?;

    if path.exists() {
        let _ = fs::remove_file(path);
    }

    fs::rename(&tmp, path).map_err(SettingsSaveError::Rename)?;
    Ok(())
}

pub fn save_settings_with_retry(
    path: &Path,
    settings: &ClientSettings,
) -> Result<(), SettingsSaveError> {
    const MAX_ATTEMPTS: u32 = 3;
    const BACKOFF_BASE_MS: u64 = 50;

    let mut attempt = 1;
    loop {
        match save_settings_to_path(path, settings) {
            Ok(()) => return Ok(()),
            Err(err @ SettingsSaveError::InvalidBackendUrl(_)) => return Err(err),
            Err(err) if attempt >= MAX_ATTEMPTS => return Err(err),
            Err(err) => {
                tracing::warn!(attempt, "settings save failed: {err}");
                let backoff_ms = BACKOFF_BASE_MS.saturating_mul(1_u64 << (attempt - 1));
                std::thread::sleep(Duration::from_millis(backoff_ms));
                attempt += 1;
            }
        }
    }
}
