use scrcpy_launcher_core::{CommandResult, ConnectionStatus, LauncherConfig, ProgressUpdate};

use crate::{backend::BackendError, connect::WirelessAction, launch::LaunchAction};

/// Completion reports from backend tasks, applied to the session in arrival
/// order by the controller.
///
/// Every variant except [`UiEvent::Progress`] closes exactly one spawned task.
#[derive(Debug)]
pub enum UiEvent {
    ScanFinished {
        generation: u64,
        result: Result<Vec<String>, BackendError>,
    },
    StatusChecked {
        generation: u64,
        result: Result<ConnectionStatus, BackendError>,
    },
    InstalledPackagesSynced {
        epoch: u64,
        result: Result<Vec<String>, BackendError>,
    },
    ConnectFinished {
        address: String,
        result: Result<CommandResult, BackendError>,
        /// Reloaded snapshot; only fetched after a successful connect.
        config: Option<Result<LauncherConfig, BackendError>>,
    },
    WirelessActionFinished {
        action: WirelessAction,
        result: Result<CommandResult, BackendError>,
    },
    LaunchFinished {
        action: LaunchAction,
        result: Result<CommandResult, BackendError>,
    },
    PairFinished {
        addr: String,
        result: Result<CommandResult, BackendError>,
    },
    PushFinished {
        local_path: String,
        result: Result<CommandResult, BackendError>,
    },
    DeviceAppsLoaded {
        result: Result<Vec<String>, BackendError>,
    },
    ConfigLoaded {
        result: Result<LauncherConfig, BackendError>,
    },
    Progress(ProgressUpdate),
    HideProgress {
        token: u64,
    },
}

impl UiEvent {
    pub fn closes_task(&self) -> bool {
        !matches!(self, UiEvent::Progress(_))
    }
}
