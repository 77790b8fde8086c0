use tracing::{debug, info, warn};

use crate::{
    backend::BackendError,
    session::{NoticeLevel, Session},
};

pub const SCAN_PENDING_TEXT: &str = "Scanning the local network...";
pub const NO_DEVICES_FOUND: &str = "No devices with port 5555 open were found";
pub const NO_DEVICES_HINT: &str = "Make sure the phone is on the same Wi-Fi network and has wireless debugging enabled, or run `adb tcpip 5555` over USB first.";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ScanPhase {
    #[default]
    Idle,
    Pending,
    Results(Vec<String>),
    Empty,
    Error(String),
}

/// The scan results surface.
#[derive(Debug, Default)]
pub struct ScanSurface {
    open: bool,
    phase: ScanPhase,
    spinner: bool,
    status_text: String,
    generation: u64,
}

impl ScanSurface {
    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn phase(&self) -> &ScanPhase {
        &self.phase
    }

    pub fn spinner(&self) -> bool {
        self.spinner
    }

    pub fn status_text(&self) -> &str {
        &self.status_text
    }

    /// Selectable rows, in the order the backend returned them.
    pub fn rows(&self) -> &[String] {
        match &self.phase {
            ScanPhase::Results(rows) => rows,
            _ => &[],
        }
    }

    /// Advisory shown in place of rows when nothing was found.
    pub fn empty_hint(&self) -> Option<&'static str> {
        matches!(self.phase, ScanPhase::Empty).then_some(NO_DEVICES_HINT)
    }

    pub fn close(&mut self) {
        self.open = false;
    }
}

/// Opens the surface in the pending state and returns the generation the
/// scan request must carry.
pub fn begin_scan(session: &mut Session) -> u64 {
    let surface = &mut session.scan;
    surface.generation += 1;
    surface.open = true;
    surface.phase = ScanPhase::Pending;
    surface.spinner = true;
    surface.status_text = SCAN_PENDING_TEXT.to_owned();
    info!(generation = surface.generation, "scan started");
    surface.generation
}

/// Applies a scan reply. Replies for any generation but the latest are
/// dropped so a slow earlier scan cannot overwrite a newer one.
pub fn apply_scan_result(
    session: &mut Session,
    generation: u64,
    result: Result<Vec<String>, BackendError>,
) {
    let surface = &mut session.scan;
    if generation != surface.generation {
        debug!(generation, latest = surface.generation, "dropping stale scan reply");
        return;
    }

    match result {
        Ok(devices) if devices.is_empty() => {
            info!("scan finished: no devices");
            surface.phase = ScanPhase::Empty;
            surface.status_text = NO_DEVICES_FOUND.to_owned();
        }
        Ok(devices) => {
            info!(count = devices.len(), "scan finished");
            surface.status_text = format!("Found {} device(s)", devices.len());
            surface.phase = ScanPhase::Results(devices);
        }
        Err(err) => {
            warn!("scan failed: {err}");
            surface.phase = ScanPhase::Error(err.to_string());
            surface.status_text = format!("Scan error: {err}");
            session.notify(NoticeLevel::Error, format!("Scan failed: {err}"));
        }
    }

    session.scan.spinner = false;
}

pub fn dismiss_scan(session: &mut Session) {
    session.scan.close();
}
