use std::{future::Future, sync::Arc, time::Duration};

use scrcpy_launcher_core::{AppEntry, BackendCall, CommandResult, LauncherConfig};
use thiserror::Error;
use tokio::{runtime::Handle, sync::mpsc};
use tracing::{debug, info};

use crate::{
    backend::{Backend, call},
    connect::{self, WirelessAction},
    events::UiEvent,
    launch::{self, LaunchAction},
    progress::{self, PROGRESS_HIDE_DELAY, ProgressSubscription},
    scan,
    session::Session,
    status::{self, StatusFollowup},
    suggest,
};

#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub progress_hide_delay: Duration,
    pub app_database: Vec<AppEntry>,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            progress_hide_delay: PROGRESS_HIDE_DELAY,
            app_database: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Start,
    ReloadConfig,
    RefreshStatus,
    SetAddress(String),
    Connect,
    StartScan,
    SelectScanResult(String),
    DismissScan,
    ToggleHistory,
    SelectHistory(String),
    EnableTcpip,
    DisconnectAll,
    OpenPair,
    Pair {
        addr: String,
        code: String,
    },
    SyncInstalledApps,
    LoadDeviceApps,
    FilterDeviceApps(String),
    PushFile {
        local_path: String,
        remote_path: Option<String>,
    },
    LaunchMirror,
    LaunchAudio,
    LaunchApp(String),
    KillScrcpy,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("unknown action `{0}`")]
    UnknownAction(String),
    #[error("action `{id}` needs an argument: {usage}")]
    MissingArgument { id: String, usage: &'static str },
}

pub type ActionHandler = fn(&mut Controller, &str) -> Result<(), DispatchError>;

/// UI action identifiers and their handlers. The argument is the raw text
/// the UI element carries (field contents, the clicked row), possibly empty.
pub const ACTIONS: &[(&str, ActionHandler)] = &[
    ("start", |c, _| c.dispatch(Action::Start)),
    ("reload-config", |c, _| c.dispatch(Action::ReloadConfig)),
    ("refresh-status", |c, _| c.dispatch(Action::RefreshStatus)),
    ("set-address", |c, arg| {
        c.dispatch(Action::SetAddress(arg.to_owned()))
    }),
    ("connect", |c, _| c.dispatch(Action::Connect)),
    ("scan", |c, _| c.dispatch(Action::StartScan)),
    ("select-scan-result", |c, arg| {
        let ip = required(arg, "select-scan-result", "<ip>")?;
        c.dispatch(Action::SelectScanResult(ip.to_owned()))
    }),
    ("dismiss-scan", |c, _| c.dispatch(Action::DismissScan)),
    ("toggle-history", |c, _| c.dispatch(Action::ToggleHistory)),
    ("select-history", |c, arg| {
        let entry = required(arg, "select-history", "<address>")?;
        c.dispatch(Action::SelectHistory(entry.to_owned()))
    }),
    ("enable-tcpip", |c, _| c.dispatch(Action::EnableTcpip)),
    ("disconnect-all", |c, _| c.dispatch(Action::DisconnectAll)),
    ("open-pair", |c, _| c.dispatch(Action::OpenPair)),
    ("pair", |c, arg| {
        let (addr, code) = arg.trim().split_once(' ').unwrap_or((arg.trim(), ""));
        c.dispatch(Action::Pair {
            addr: addr.to_owned(),
            code: code.to_owned(),
        })
    }),
    ("sync-installed-apps", |c, _| {
        c.dispatch(Action::SyncInstalledApps)
    }),
    ("load-device-apps", |c, _| c.dispatch(Action::LoadDeviceApps)),
    ("filter-device-apps", |c, arg| {
        c.dispatch(Action::FilterDeviceApps(arg.to_owned()))
    }),
    ("push-file", |c, arg| {
        let local_path = required(arg, "push-file", "<local path>")?;
        c.dispatch(Action::PushFile {
            local_path: local_path.to_owned(),
            remote_path: None,
        })
    }),
    ("launch-mirror", |c, _| c.dispatch(Action::LaunchMirror)),
    ("launch-audio", |c, _| c.dispatch(Action::LaunchAudio)),
    ("launch-app", |c, arg| {
        let package = required(arg, "launch-app", "<package>")?;
        c.dispatch(Action::LaunchApp(package.to_owned()))
    }),
    ("kill-scrcpy", |c, _| c.dispatch(Action::KillScrcpy)),
];

fn required<'a>(arg: &'a str, id: &str, usage: &'static str) -> Result<&'a str, DispatchError> {
    let arg = arg.trim();
    if arg.is_empty() {
        return Err(DispatchError::MissingArgument {
            id: id.to_owned(),
            usage,
        });
    }
    Ok(arg)
}

/// Owns the session and runs every workflow against the backend.
///
/// Handlers never block: each backend call runs as a task that reports one
/// [`UiEvent`]. Events are applied by [`Controller::poll_ui_events`] (from a
/// frame loop) or [`Controller::settle`] (await until idle).
pub struct Controller {
    backend: Arc<dyn Backend>,
    runtime: Handle,
    session: Session,
    options: ControllerOptions,
    ui_event_tx: mpsc::UnboundedSender<UiEvent>,
    ui_event_rx: mpsc::UnboundedReceiver<UiEvent>,
    in_flight: usize,
    progress_subscription: Option<ProgressSubscription>,
}

impl Controller {
    pub fn new(backend: Arc<dyn Backend>, runtime: Handle, mut options: ControllerOptions) -> Self {
        let (ui_event_tx, ui_event_rx) = mpsc::unbounded_channel();
        let progress_subscription =
            ProgressSubscription::spawn(&runtime, backend.subscribe(), ui_event_tx.clone());
        let session = Session::with_app_database(std::mem::take(&mut options.app_database));

        Self {
            backend,
            runtime,
            session,
            options,
            ui_event_tx,
            ui_event_rx,
            in_flight: 0,
            progress_subscription: Some(progress_subscription),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// App-name suggestions against the loaded database.
    pub fn suggestions(&self, query: &str, name_only: bool) -> Vec<&AppEntry> {
        suggest::session_suggestions(&self.session, query, name_only)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn is_subscribed(&self) -> bool {
        self.progress_subscription
            .as_ref()
            .is_some_and(ProgressSubscription::is_active)
    }

    /// Tears down the progress subscription. Further progress events from the
    /// backend are not delivered.
    pub fn dispose(&mut self) {
        if self.progress_subscription.take().is_some() {
            info!("progress subscription closed");
        }
    }

    pub fn dispatch_id(&mut self, id: &str, arg: &str) -> Result<(), DispatchError> {
        let handler = ACTIONS
            .iter()
            .find(|(name, _)| *name == id)
            .map(|(_, handler)| *handler)
            .ok_or_else(|| DispatchError::UnknownAction(id.to_owned()))?;
        handler(self, arg)
    }

    pub fn dispatch(&mut self, action: Action) -> Result<(), DispatchError> {
        debug!(?action, "dispatch");
        match action {
            Action::Start => {
                self.reload_config();
                self.refresh_status();
            }
            Action::ReloadConfig => self.reload_config(),
            Action::RefreshStatus => self.refresh_status(),
            Action::SetAddress(address) => connect::set_address(&mut self.session, &address),
            Action::Connect => self.connect(),
            Action::StartScan => self.start_scan(),
            Action::SelectScanResult(ip) => {
                if connect::select_result(&mut self.session, &ip) {
                    self.connect();
                }
            }
            Action::DismissScan => scan::dismiss_scan(&mut self.session),
            Action::ToggleHistory => connect::toggle_history(&mut self.session),
            Action::SelectHistory(entry) => connect::select_history(&mut self.session, &entry),
            Action::EnableTcpip => self.wireless_action(WirelessAction::EnableTcpip),
            Action::DisconnectAll => self.wireless_action(WirelessAction::DisconnectAll),
            Action::OpenPair => connect::open_pair(&mut self.session),
            Action::Pair { addr, code } => self.pair(&addr, &code),
            Action::SyncInstalledApps => self.sync_installed_apps(),
            Action::LoadDeviceApps => self.load_device_apps(),
            Action::FilterDeviceApps(term) => self.session.apps.set_filter(&term),
            Action::PushFile {
                local_path,
                remote_path,
            } => self.push_file(local_path, remote_path),
            Action::LaunchMirror => self.launch(LaunchAction::Mirror),
            Action::LaunchAudio => self.launch(LaunchAction::Audio),
            Action::LaunchApp(package) => self.launch(LaunchAction::App { package }),
            Action::KillScrcpy => self.launch(LaunchAction::KillScrcpy),
        }
        Ok(())
    }

    /// Applies every event that is already queued.
    pub fn poll_ui_events(&mut self) {
        while let Ok(event) = self.ui_event_rx.try_recv() {
            self.apply_event(event);
        }
    }

    /// Waits for the next event and applies it.
    pub async fn step(&mut self) {
        if let Some(event) = self.ui_event_rx.recv().await {
            self.apply_event(event);
        }
    }

    /// Applies events until no backend task is outstanding, including the
    /// follow-up calls the events themselves trigger.
    pub async fn settle(&mut self) {
        while self.in_flight > 0 {
            self.step().await;
        }
        self.poll_ui_events();
    }

    fn spawn_task<F>(&mut self, task: F)
    where
        F: Future<Output = UiEvent> + Send + 'static,
    {
        self.in_flight += 1;
        let ui_event_tx = self.ui_event_tx.clone();
        self.runtime.spawn(async move {
            let event = task.await;
            let _ = ui_event_tx.send(event);
        });
    }

    fn reload_config(&mut self) {
        let backend = Arc::clone(&self.backend);
        self.spawn_task(async move {
            let result = call::<LauncherConfig>(&*backend, BackendCall::GetConfig).await;
            UiEvent::ConfigLoaded { result }
        });
    }

    fn refresh_status(&mut self) {
        let generation = status::begin_refresh(&mut self.session);
        let backend = Arc::clone(&self.backend);
        self.spawn_task(async move {
            let result = call(&*backend, BackendCall::CheckStatus).await;
            UiEvent::StatusChecked { generation, result }
        });
    }

    fn sync_installed_apps(&mut self) {
        let Some(epoch) = self.session.status.begin_sync() else {
            debug!("installed apps already synced or syncing");
            return;
        };
        let backend = Arc::clone(&self.backend);
        self.spawn_task(async move {
            let result = call(&*backend, BackendCall::ListInstalledPackages).await;
            UiEvent::InstalledPackagesSynced { epoch, result }
        });
    }

    fn start_scan(&mut self) {
        let generation = scan::begin_scan(&mut self.session);
        let backend = Arc::clone(&self.backend);
        self.spawn_task(async move {
            let result = call(&*backend, BackendCall::ScanDevices).await;
            UiEvent::ScanFinished { generation, result }
        });
    }

    fn connect(&mut self) {
        let Some(address) = connect::begin_connect(&mut self.session) else {
            return;
        };
        let backend = Arc::clone(&self.backend);
        self.spawn_task(async move {
            let result = call::<CommandResult>(
                &*backend,
                BackendCall::ConnectWireless {
                    ip: address.clone(),
                },
            )
            .await;
            let config = match &result {
                Ok(outcome) if outcome.success => {
                    Some(call::<LauncherConfig>(&*backend, BackendCall::GetConfig).await)
                }
                _ => None,
            };
            UiEvent::ConnectFinished {
                address,
                result,
                config,
            }
        });
    }

    fn wireless_action(&mut self, action: WirelessAction) {
        if !connect::begin_wireless_action(&mut self.session, action) {
            return;
        }
        let backend = Arc::clone(&self.backend);
        let backend_call = match action {
            WirelessAction::EnableTcpip => BackendCall::EnableTcpip,
            WirelessAction::DisconnectAll => BackendCall::DisconnectAll,
        };
        self.spawn_task(async move {
            let result = call(&*backend, backend_call).await;
            UiEvent::WirelessActionFinished { action, result }
        });
    }

    fn pair(&mut self, addr: &str, code: &str) {
        let Some((addr, code)) = connect::begin_pair(&mut self.session, addr, code) else {
            return;
        };
        let backend = Arc::clone(&self.backend);
        self.spawn_task(async move {
            let result = call(
                &*backend,
                BackendCall::PairDevice {
                    addr: addr.clone(),
                    code,
                },
            )
            .await;
            UiEvent::PairFinished { addr, result }
        });
    }

    fn load_device_apps(&mut self) {
        if !suggest::begin_load_device_apps(&mut self.session) {
            return;
        }
        let backend = Arc::clone(&self.backend);
        self.spawn_task(async move {
            let result = call(&*backend, BackendCall::ListInstalledPackages).await;
            UiEvent::DeviceAppsLoaded { result }
        });
    }

    fn push_file(&mut self, local_path: String, remote_path: Option<String>) {
        if !progress::begin_push(&mut self.session, &local_path) {
            return;
        }
        let backend = Arc::clone(&self.backend);
        self.spawn_task(async move {
            let result = call(
                &*backend,
                BackendCall::PushFile {
                    local_path: local_path.clone(),
                    remote_path,
                },
            )
            .await;
            UiEvent::PushFinished { local_path, result }
        });
    }

    fn launch(&mut self, action: LaunchAction) {
        let Some(backend_call) = launch::begin_launch(&mut self.session, &action) else {
            return;
        };
        let backend = Arc::clone(&self.backend);
        self.spawn_task(async move {
            let result = call(&*backend, backend_call).await;
            UiEvent::LaunchFinished { action, result }
        });
    }

    fn schedule_progress_hide(&mut self, token: u64) {
        let delay = self.options.progress_hide_delay;
        self.spawn_task(async move {
            tokio::time::sleep(delay).await;
            UiEvent::HideProgress { token }
        });
    }

    fn apply_event(&mut self, event: UiEvent) {
        if event.closes_task() {
            self.in_flight = self.in_flight.saturating_sub(1);
        }

        match event {
            UiEvent::ScanFinished { generation, result } => {
                scan::apply_scan_result(&mut self.session, generation, result);
            }
            UiEvent::StatusChecked { generation, result } => {
                let followup = status::apply_status(&mut self.session, generation, result);
                if followup == StatusFollowup::SyncInstalledApps {
                    self.sync_installed_apps();
                }
            }
            UiEvent::InstalledPackagesSynced { epoch, result } => {
                self.session.status.apply_sync(epoch, result);
            }
            UiEvent::ConnectFinished {
                address,
                result,
                config,
            } => {
                connect::apply_connect(&mut self.session, &address, result, config);
                self.refresh_status();
                if connect::take_queued_pick(&mut self.session) {
                    self.connect();
                }
            }
            UiEvent::WirelessActionFinished { action, result } => {
                connect::apply_wireless_action(&mut self.session, action, result);
                self.refresh_status();
            }
            UiEvent::LaunchFinished { action, result } => {
                launch::apply_launch(&mut self.session, &action, result);
            }
            UiEvent::PairFinished { addr, result } => {
                connect::apply_pair(&mut self.session, &addr, result);
            }
            UiEvent::PushFinished { local_path, result } => {
                progress::apply_push(&mut self.session, &local_path, result);
            }
            UiEvent::DeviceAppsLoaded { result } => {
                suggest::apply_device_apps(&mut self.session, result);
            }
            UiEvent::ConfigLoaded { result } => match result {
                Ok(config) => self.session.apply_config(config),
                Err(err) => self.session.config_load_failed(&err.to_string()),
            },
            UiEvent::Progress(update) => {
                if let Some(token) = self.session.progress.apply(&update) {
                    self.schedule_progress_hide(token);
                }
            }
            UiEvent::HideProgress { token } => {
                self.session.progress.hide(token);
            }
        }
    }
}
