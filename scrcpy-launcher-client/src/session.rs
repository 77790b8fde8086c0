use scrcpy_launcher_core::{AppEntry, LauncherConfig};
use tracing::{error, info, warn};

use crate::{
    connect::ConnectForm, launch::LaunchPanel, progress::ProgressBar, scan::ScanSurface,
    status::StatusTracker, suggest::DeviceApps,
};

const MAX_NOTICES: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

/// All UI-visible state of one controller session.
///
/// Owned by the controller and handed by reference to each workflow; nothing
/// here persists across restarts.
#[derive(Debug, Default)]
pub struct Session {
    pub status: StatusTracker,
    pub scan: ScanSurface,
    pub form: ConnectForm,
    pub launch: LaunchPanel,
    pub progress: ProgressBar,
    pub apps: DeviceApps,
    pub config: LauncherConfig,
    pub app_database: Vec<AppEntry>,
    notices: Vec<Notice>,
}

impl Session {
    pub fn with_app_database(app_database: Vec<AppEntry>) -> Self {
        Self {
            app_database,
            ..Self::default()
        }
    }

    pub fn notify(&mut self, level: NoticeLevel, text: impl Into<String>) {
        let text = text.into();
        match level {
            NoticeLevel::Error => warn!(notice = %text, "user notice"),
            NoticeLevel::Info | NoticeLevel::Success => info!(notice = %text, "user notice"),
        }

        self.notices.push(Notice { level, text });
        if self.notices.len() > MAX_NOTICES {
            let excess = self.notices.len() - MAX_NOTICES;
            self.notices.drain(..excess);
        }
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    pub fn latest_notice(&self) -> Option<&Notice> {
        self.notices.last()
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    /// Installs a fresh config snapshot and refreshes the history list.
    ///
    /// The address field is only pre-filled when it is still empty.
    pub fn apply_config(&mut self, config: LauncherConfig) {
        self.form.history = config.history().to_vec();
        if self.form.address.trim().is_empty()
            && let Some(latest) = config.latest_address()
        {
            self.form.address = latest.to_owned();
        }
        self.config = config;
    }

    pub fn config_load_failed(&mut self, detail: &str) {
        error!("config reload failed: {detail}");
        self.notify(NoticeLevel::Error, "Failed to load configuration");
    }
}
