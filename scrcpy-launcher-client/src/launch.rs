//! scrcpy launches (mirror, audio-only, saved apps) and stopping them.

use scrcpy_launcher_core::{BackendCall, CommandResult};
use tracing::{debug, info, warn};

use crate::{
    backend::BackendError,
    session::{NoticeLevel, Session},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchAction {
    Mirror,
    Audio,
    App { package: String },
    KillScrcpy,
}

impl LaunchAction {
    fn label(&self) -> &'static str {
        match self {
            LaunchAction::Mirror => "launch mirror",
            LaunchAction::Audio => "launch audio",
            LaunchAction::App { .. } => "launch app",
            LaunchAction::KillScrcpy => "kill scrcpy",
        }
    }
}

/// One busy flag per launch button.
#[derive(Debug, Default)]
pub struct LaunchPanel {
    pub mirror_busy: bool,
    pub audio_busy: bool,
    pub app_busy: bool,
    pub kill_busy: bool,
}

impl LaunchPanel {
    fn busy_flag(&mut self, action: &LaunchAction) -> &mut bool {
        match action {
            LaunchAction::Mirror => &mut self.mirror_busy,
            LaunchAction::Audio => &mut self.audio_busy,
            LaunchAction::App { .. } => &mut self.app_busy,
            LaunchAction::KillScrcpy => &mut self.kill_busy,
        }
    }
}

/// Builds the backend call for `action` and marks its button busy.
///
/// `None` when the same button is already busy, or when an app launch names a
/// package with no saved entry in the config snapshot.
pub fn begin_launch(session: &mut Session, action: &LaunchAction) -> Option<BackendCall> {
    if *session.launch.busy_flag(action) {
        debug!(action = action.label(), "already in flight");
        return None;
    }

    let call = match action {
        LaunchAction::Mirror => BackendCall::LaunchMirror,
        LaunchAction::Audio => BackendCall::LaunchAudio,
        LaunchAction::KillScrcpy => BackendCall::KillScrcpy,
        LaunchAction::App { package } => {
            let package = package.trim();
            let Some(app) = session.config.app(package) else {
                session.notify(
                    NoticeLevel::Error,
                    format!("No saved launch settings for {package}"),
                );
                return None;
            };
            BackendCall::LaunchApp {
                package: package.to_owned(),
                settings: app.settings.clone(),
                scrcpy_args: app.scrcpy_args.clone(),
            }
        }
    };

    *session.launch.busy_flag(action) = true;
    info!(action = action.label(), "launch requested");
    Some(call)
}

pub fn apply_launch(
    session: &mut Session,
    action: &LaunchAction,
    result: Result<CommandResult, BackendError>,
) {
    *session.launch.busy_flag(action) = false;

    match (action, result) {
        (LaunchAction::KillScrcpy, Ok(outcome)) => {
            let level = if outcome.success {
                NoticeLevel::Success
            } else {
                NoticeLevel::Error
            };
            session.notify(level, outcome.message);
        }
        (LaunchAction::KillScrcpy, Err(err)) => {
            warn!("kill scrcpy failed: {err}");
            session.notify(NoticeLevel::Error, format!("Failed: {err}"));
        }
        (_, Ok(outcome)) if outcome.success => {
            session.notify(NoticeLevel::Success, outcome.message);
        }
        (_, Ok(outcome)) => {
            info!(action = action.label(), message = %outcome.message, "launch refused");
            session.notify(NoticeLevel::Error, format!("Error: {}", outcome.message));
        }
        (_, Err(err)) => {
            warn!(action = action.label(), "launch failed: {err}");
            session.notify(NoticeLevel::Error, format!("Launch failed: {err}"));
        }
    }
}
