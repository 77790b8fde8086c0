use std::time::Duration;

use scrcpy_launcher_core::{BackendEvent, CommandResult, EVENT_PUSH_PROGRESS, ProgressUpdate};
use tokio::{
    runtime::Handle,
    sync::{broadcast, mpsc},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    backend::BackendError,
    events::UiEvent,
    session::{NoticeLevel, Session},
};

pub const PROGRESS_HIDE_DELAY: Duration = Duration::from_secs(3);

/// Transfer progress indicator.
#[derive(Debug, Default)]
pub struct ProgressBar {
    visible: bool,
    percent: u32,
    text: String,
    hide_token: u64,
    pushing: bool,
}

impl ProgressBar {
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn percent(&self) -> u32 {
        self.percent
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_pushing(&self) -> bool {
        self.pushing
    }

    /// Shows the bar at 0% with `text`, cancelling any pending hide.
    pub fn reset(&mut self, text: impl Into<String>) {
        self.visible = true;
        self.percent = 0;
        self.text = text.into();
        self.hide_token += 1;
    }

    /// Renders one update as received (no reordering) and returns a hide
    /// token when the update completes the transfer.
    ///
    /// Every update invalidates an earlier hide token, so a transfer that
    /// restarts before the hide fires stays visible.
    pub fn apply(&mut self, update: &ProgressUpdate) -> Option<u64> {
        self.visible = true;
        self.percent = update.percent();
        self.text = if update.message.is_empty() {
            format!("{}%", self.percent)
        } else {
            update.message.clone()
        };

        self.hide_token += 1;
        (self.percent >= 100).then_some(self.hide_token)
    }

    pub fn hide(&mut self, token: u64) -> bool {
        if token != self.hide_token {
            debug!(token, current = self.hide_token, "hide superseded by a newer update");
            return false;
        }
        self.visible = false;
        self.percent = 0;
        true
    }
}

fn file_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// Marks a push as running and resets the bar. Returns `false` while an
/// earlier push is still running.
pub fn begin_push(session: &mut Session, local_path: &str) -> bool {
    let bar = &mut session.progress;
    if bar.pushing {
        debug!(local_path, "push already in flight");
        return false;
    }
    bar.pushing = true;
    bar.reset(format!("Preparing {}...", file_name(local_path)));
    info!(local_path, "push requested");
    true
}

pub fn apply_push(
    session: &mut Session,
    local_path: &str,
    result: Result<CommandResult, BackendError>,
) {
    session.progress.pushing = false;
    match result {
        Ok(outcome) => {
            let level = if outcome.success {
                NoticeLevel::Success
            } else {
                NoticeLevel::Error
            };
            session.notify(level, outcome.message);
        }
        Err(err) => {
            warn!(local_path, "push failed: {err}");
            session.notify(NoticeLevel::Error, format!("Push failed: {err}"));
        }
    }
}

/// Forwards backend progress events into the controller's event queue for as
/// long as it is alive.
pub struct ProgressSubscription {
    task: JoinHandle<()>,
}

impl ProgressSubscription {
    pub fn spawn(
        runtime: &Handle,
        mut events: broadcast::Receiver<BackendEvent>,
        ui_event_tx: mpsc::UnboundedSender<UiEvent>,
    ) -> Self {
        let task = runtime.spawn(async move {
            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "progress events lagged");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                if event.event != EVENT_PUSH_PROGRESS {
                    continue;
                }

                match serde_json::from_value::<ProgressUpdate>(event.payload) {
                    Ok(update) => {
                        if ui_event_tx.send(UiEvent::Progress(update)).is_err() {
                            break;
                        }
                    }
                    Err(err) => warn!("malformed progress payload: {err}"),
                }
            }
        });
        Self { task }
    }

    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for ProgressSubscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}
