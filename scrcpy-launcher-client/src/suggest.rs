use std::{collections::HashSet, fs, io, path::Path};

use scrcpy_launcher_core::AppEntry;
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    backend::BackendError,
    session::{NoticeLevel, Session},
};

pub const MAX_SUGGESTIONS: usize = 10;
pub const MAX_APP_DATABASE_BYTES: u64 = 16 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum AppDatabaseError {
    #[error("read failed: {0}")]
    Read(#[from] io::Error),
    #[error("file too large: {size} bytes (max {max})")]
    TooLarge { size: u64, max: u64 },
    #[error("parse failed: {0}")]
    Parse(#[from] serde_json::Error),
}

pub fn load_app_database(path: &Path) -> Result<Vec<AppEntry>, AppDatabaseError> {
    let size = fs::metadata(path)?.len();
    if size > MAX_APP_DATABASE_BYTES {
        return Err(AppDatabaseError::TooLarge {
            size,
            max: MAX_APP_DATABASE_BYTES,
        });
    }
    let data = fs::read_to_string(path)?;
    let entries: Vec<AppEntry> = serde_json::from_str(&data)?;
    info!(count = entries.len(), path = %path.display(), "app database loaded");
    Ok(entries)
}

/// Ranks database entries for an app-name query.
///
/// `installed` is `Some` only while the installed-package cache is synced and
/// the filter preference is on; with `None` nothing is filtered out.
pub fn suggest<'a>(
    database: &'a [AppEntry],
    query: &str,
    name_only: bool,
    installed: Option<&HashSet<String>>,
) -> Vec<&'a AppEntry> {
    let term = query.trim().to_lowercase();
    if term.is_empty() {
        return Vec::new();
    }
    let term_len = term.chars().count() as i64;

    let mut matches: Vec<(&AppEntry, i64)> = Vec::new();
    for app in database {
        let name = app.name.to_lowercase();
        let package = app.package_name.as_deref().unwrap_or_default();
        let pkg = package.to_lowercase();

        let match_name = name.contains(&term);
        let match_pkg = !name_only && pkg.contains(&term);
        if !match_name && !match_pkg {
            continue;
        }

        if let Some(installed) = installed
            && !package.is_empty()
            && !installed.contains(package)
        {
            continue;
        }

        let score = if name == term {
            100
        } else if !name_only && pkg == term {
            90
        } else if name.starts_with(&term) {
            80
        } else if !name_only && pkg.starts_with(&term) {
            70
        } else {
            20 - (name.chars().count() as i64 - term_len).min(20)
        };
        matches.push((app, score));
    }

    matches.sort_by(|a, b| b.1.cmp(&a.1));
    matches
        .into_iter()
        .take(MAX_SUGGESTIONS)
        .map(|(app, _)| app)
        .collect()
}

/// Suggestions for the session, applying the installed-app filter only when
/// it is enabled and the cache is synced.
pub fn session_suggestions<'a>(
    session: &'a Session,
    query: &str,
    name_only: bool,
) -> Vec<&'a AppEntry> {
    let installed = if session.config.filter_installed_apps() {
        session.status.installed_packages()
    } else {
        None
    };
    suggest(&session.app_database, query, name_only, installed)
}

/// Device app browser.
#[derive(Debug, Default)]
pub struct DeviceApps {
    packages: Vec<String>,
    filter: String,
    pub busy: bool,
}

impl DeviceApps {
    pub fn packages(&self) -> &[String] {
        &self.packages
    }

    pub fn set_filter(&mut self, term: &str) {
        self.filter = term.to_owned();
    }

    pub fn visible(&self) -> Vec<&str> {
        let term = self.filter.to_lowercase();
        self.packages
            .iter()
            .filter(|pkg| pkg.to_lowercase().contains(&term))
            .map(String::as_str)
            .collect()
    }
}

pub fn begin_load_device_apps(session: &mut Session) -> bool {
    if session.apps.busy {
        return false;
    }
    session.apps.busy = true;
    true
}

pub fn apply_device_apps(session: &mut Session, result: Result<Vec<String>, BackendError>) {
    session.apps.busy = false;
    match result {
        Ok(mut packages) => {
            packages.sort();
            let count = packages.len();
            session.apps.packages = packages;
            session.notify(NoticeLevel::Success, format!("Loaded {count} apps"));
        }
        Err(err) => {
            warn!("loading device apps failed: {err}");
            session.notify(NoticeLevel::Error, format!("Loading apps failed: {err}"));
        }
    }
}
