//! Connection status tracking and the installed-package cache.
//!
//! The cache fails open: while it is not synced, anything that filters on
//! installed state must treat every app as potentially installed.

use std::collections::HashSet;

use scrcpy_launcher_core::ConnectionStatus;
use tracing::{debug, info, warn};

use crate::{backend::BackendError, session::Session};

pub const STATUS_CHECK_FAILED: &str = "Status check failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFollowup {
    None,
    SyncInstalledApps,
}

#[derive(Debug, Default)]
pub struct StatusTracker {
    connected: bool,
    message: String,
    installed: HashSet<String>,
    synced: bool,
    sync_in_flight: bool,
    issued: u64,
    applied: u64,
    /// Bumped whenever the connection is considered lost so that a sync
    /// started in an earlier session cannot repopulate the cache.
    epoch: u64,
}

impl StatusTracker {
    pub fn connected(&self) -> bool {
        self.connected
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn set_message(&mut self, message: impl Into<String>) {
        self.message = message.into();
    }

    pub fn is_synced(&self) -> bool {
        self.synced
    }

    pub fn sync_in_flight(&self) -> bool {
        self.sync_in_flight
    }

    /// Installed packages, or `None` while the cache is not synced.
    pub fn installed_packages(&self) -> Option<&HashSet<String>> {
        self.synced.then_some(&self.installed)
    }

    pub fn begin_refresh(&mut self) -> u64 {
        self.issued += 1;
        self.issued
    }

    pub fn apply_status(
        &mut self,
        generation: u64,
        result: Result<ConnectionStatus, BackendError>,
        filter_installed_apps: bool,
    ) -> StatusFollowup {
        if generation < self.applied {
            debug!(generation, applied = self.applied, "dropping stale status reply");
            return StatusFollowup::None;
        }
        self.applied = generation;

        match result {
            Ok(status) => {
                self.connected = status.connected;
                self.message = status.message;
                if !status.connected {
                    self.invalidate();
                    return StatusFollowup::None;
                }
                if filter_installed_apps && !self.synced && !self.sync_in_flight {
                    StatusFollowup::SyncInstalledApps
                } else {
                    StatusFollowup::None
                }
            }
            Err(err) => {
                warn!("status check failed: {err}");
                self.connected = false;
                self.message = STATUS_CHECK_FAILED.to_owned();
                self.invalidate();
                StatusFollowup::None
            }
        }
    }

    /// Returns the epoch to tag the sync request with, or `None` when a sync
    /// is not needed.
    pub fn begin_sync(&mut self) -> Option<u64> {
        if self.synced || self.sync_in_flight {
            return None;
        }
        self.sync_in_flight = true;
        Some(self.epoch)
    }

    pub fn apply_sync(&mut self, epoch: u64, result: Result<Vec<String>, BackendError>) {
        if epoch != self.epoch {
            debug!(epoch, current = self.epoch, "dropping sync reply from a lost connection");
            return;
        }
        self.sync_in_flight = false;

        match result {
            Ok(packages) => {
                self.installed = packages.into_iter().collect();
                self.synced = true;
                info!(count = self.installed.len(), "installed apps synced");
            }
            Err(err) => {
                warn!("installed app sync failed: {err}");
                self.installed.clear();
                self.synced = false;
            }
        }
    }

    fn invalidate(&mut self) {
        if self.synced || !self.installed.is_empty() {
            debug!("clearing installed package cache");
        }
        self.installed.clear();
        self.synced = false;
        self.sync_in_flight = false;
        self.epoch += 1;
    }
}

pub fn begin_refresh(session: &mut Session) -> u64 {
    session.status.begin_refresh()
}

pub fn apply_status(
    session: &mut Session,
    generation: u64,
    result: Result<ConnectionStatus, BackendError>,
) -> StatusFollowup {
    let filter = session.config.filter_installed_apps();
    session.status.apply_status(generation, result, filter)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connected() -> Result<ConnectionStatus, BackendError> {
        Ok(ConnectionStatus {
            connected: true,
            message: "Connected: 10.0.0.2:5555".to_owned(),
        })
    }

    #[test]
    fn connected_status_requests_one_sync() {
        let mut tracker = StatusTracker::default();
        let generation = tracker.begin_refresh();
        assert_eq!(
            tracker.apply_status(generation, connected(), true),
            StatusFollowup::SyncInstalledApps
        );

        let epoch = tracker.begin_sync().unwrap();
        assert!(tracker.begin_sync().is_none());

        let generation = tracker.begin_refresh();
        assert_eq!(
            tracker.apply_status(generation, connected(), true),
            StatusFollowup::None
        );

        tracker.apply_sync(epoch, Ok(vec!["com.example".to_owned()]));
        assert!(tracker.is_synced());
        assert!(tracker.begin_sync().is_none());
    }

    #[test]
    fn filter_disabled_never_syncs() {
        let mut tracker = StatusTracker::default();
        let generation = tracker.begin_refresh();
        assert_eq!(
            tracker.apply_status(generation, connected(), false),
            StatusFollowup::None
        );
    }

    #[test]
    fn older_reply_is_ignored() {
        let mut tracker = StatusTracker::default();
        let first = tracker.begin_refresh();
        let second = tracker.begin_refresh();
        tracker.apply_status(second, connected(), false);
        tracker.apply_status(
            first,
            Ok(ConnectionStatus::disconnected("No device")),
            false,
        );
        assert!(tracker.connected());
    }

    #[test]
    fn sync_reply_after_disconnect_is_discarded() {
        let mut tracker = StatusTracker::default();
        let generation = tracker.begin_refresh();
        tracker.apply_status(generation, connected(), true);
        let epoch = tracker.begin_sync().unwrap();

        let generation = tracker.begin_refresh();
        tracker.apply_status(
            generation,
            Ok(ConnectionStatus::disconnected("No device")),
            true,
        );
        tracker.apply_sync(epoch, Ok(vec!["com.example".to_owned()]));

        assert!(!tracker.is_synced());
        assert!(tracker.installed_packages().is_none());
    }

    #[test]
    fn failed_sync_allows_retry() {
        let mut tracker = StatusTracker::default();
        let epoch = tracker.begin_sync().unwrap();
        tracker.apply_sync(epoch, Err(BackendError::Rejected("adb gone".to_owned())));
        assert!(!tracker.is_synced());
        assert!(tracker.begin_sync().is_some());
    }
}
