//! Connection selection: scan picks, manual addresses, history, and the
//! wireless actions (tcpip, disconnect, pairing) that share its form.
//!
//! Every connect-like action ends with a status refresh; the controller
//! issues it when the completion event is applied.

use scrcpy_launcher_core::{
    CommandResult, CoreError, LauncherConfig, host_part, normalize_address, pair_prefill,
    scan_selection_address, validate_pair_request,
};
use tracing::{debug, info, warn};

use crate::{
    backend::BackendError,
    session::{NoticeLevel, Session},
};

pub const EMPTY_ADDRESS_NOTICE: &str = "Please enter an IP address";
pub const CONNECT_SUCCESS_NOTICE: &str = "Wireless connection succeeded";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WirelessAction {
    EnableTcpip,
    DisconnectAll,
}

impl WirelessAction {
    fn label(self) -> &'static str {
        match self {
            WirelessAction::EnableTcpip => "enable tcpip",
            WirelessAction::DisconnectAll => "disconnect all",
        }
    }
}

#[derive(Debug, Default)]
pub struct PairSurface {
    pub open: bool,
    pub address: String,
    pub code: String,
    pub busy: bool,
}

#[derive(Debug, Default)]
pub struct ConnectForm {
    /// The primary address field.
    pub address: String,
    pub history: Vec<String>,
    pub history_open: bool,
    pub connect_busy: bool,
    /// Scan pick made while another connect was running; sent when it ends.
    pub queued_pick: Option<String>,
    pub tcpip_busy: bool,
    pub disconnect_busy: bool,
    pub pair: PairSurface,
}

impl ConnectForm {
    fn busy_flag(&mut self, action: WirelessAction) -> &mut bool {
        match action {
            WirelessAction::EnableTcpip => &mut self.tcpip_busy,
            WirelessAction::DisconnectAll => &mut self.disconnect_busy,
        }
    }
}

pub fn set_address(session: &mut Session, address: &str) {
    session.form.address = address.to_owned();
}

/// Closes the scan surface and writes `<ip>:5555` into the address field.
///
/// Returns `true` when the caller should follow up with [`begin_connect`].
/// While another connect is running the pick is queued instead and the
/// address field is left alone; [`take_queued_pick`] releases it.
pub fn select_result(session: &mut Session, ip: &str) -> bool {
    session.scan.close();
    let address = scan_selection_address(ip);

    if session.form.connect_busy {
        session.notify(
            NoticeLevel::Info,
            format!("Connection already in progress; {address} will be tried next"),
        );
        session.form.queued_pick = Some(address);
        return false;
    }

    session.form.address = address;
    session.notify(NoticeLevel::Info, format!("Selected device: {}", ip.trim()));
    true
}

/// Moves a queued scan pick into the address field. Returns `true` when the
/// caller should connect to it.
pub fn take_queued_pick(session: &mut Session) -> bool {
    let Some(address) = session.form.queued_pick.take() else {
        return false;
    };
    info!(address = %address, "connecting to queued pick");
    session.form.address = address;
    true
}

/// Validates the address field and marks the connect as in flight.
///
/// Returns the address to send, or `None` when nothing should be sent: the
/// field is empty (a notice is shown) or a connect is already running.
pub fn begin_connect(session: &mut Session) -> Option<String> {
    if session.form.connect_busy {
        debug!("connect already in flight; ignoring trigger");
        return None;
    }

    let address = match normalize_address(&session.form.address) {
        Ok(address) => address,
        Err(CoreError::EmptyAddress) => {
            session.notify(NoticeLevel::Error, EMPTY_ADDRESS_NOTICE);
            return None;
        }
        Err(err) => {
            session.notify(NoticeLevel::Error, err.to_string());
            return None;
        }
    };

    session.form.connect_busy = true;
    session
        .status
        .set_message(format!("Connecting to {address}..."));
    info!(address = %address, "connect requested");
    Some(address)
}

pub fn apply_connect(
    session: &mut Session,
    address: &str,
    result: Result<CommandResult, BackendError>,
    config: Option<Result<LauncherConfig, BackendError>>,
) {
    session.form.connect_busy = false;

    match result {
        Ok(outcome) if outcome.success => {
            info!(address, "connected");
            session.notify(NoticeLevel::Success, CONNECT_SUCCESS_NOTICE);
            match config {
                Some(Ok(config)) => session.apply_config(config),
                Some(Err(err)) => session.config_load_failed(&err.to_string()),
                None => {}
            }
        }
        Ok(outcome) => {
            info!(address, message = %outcome.message, "connect refused");
            session.notify(NoticeLevel::Error, outcome.message);
        }
        Err(err) => {
            warn!(address, "connect call failed: {err}");
            session.notify(NoticeLevel::Error, format!("Connection failed: {err}"));
        }
    }
}

pub fn toggle_history(session: &mut Session) {
    session.form.history_open = !session.form.history_open;
}

pub fn select_history(session: &mut Session, entry: &str) {
    session.form.address = entry.to_owned();
    session.form.history_open = false;
}

/// Returns `false` when the same action is already running.
pub fn begin_wireless_action(session: &mut Session, action: WirelessAction) -> bool {
    let busy = session.form.busy_flag(action);
    if *busy {
        debug!(action = action.label(), "already in flight");
        return false;
    }
    *busy = true;
    if action == WirelessAction::EnableTcpip {
        session.notify(NoticeLevel::Info, "Enabling wireless mode...");
    }
    true
}

pub fn apply_wireless_action(
    session: &mut Session,
    action: WirelessAction,
    result: Result<CommandResult, BackendError>,
) {
    *session.form.busy_flag(action) = false;
    match result {
        Ok(outcome) => {
            info!(action = action.label(), success = outcome.success, "action finished");
            let level = if outcome.success {
                NoticeLevel::Success
            } else {
                NoticeLevel::Error
            };
            session.notify(level, outcome.message);
        }
        Err(err) => {
            warn!(action = action.label(), "action failed: {err}");
            session.notify(NoticeLevel::Error, format!("Failed: {err}"));
        }
    }
}

pub fn open_pair(session: &mut Session) {
    if let Some(prefill) = pair_prefill(&session.form.address) {
        session.form.pair.address = prefill;
    }
    session.form.pair.open = true;
}

pub fn begin_pair(session: &mut Session, addr: &str, code: &str) -> Option<(String, String)> {
    if session.form.pair.busy {
        return None;
    }
    session.form.pair.address = addr.to_owned();
    session.form.pair.code = code.to_owned();

    match validate_pair_request(addr, code) {
        Ok(request) => {
            session.form.pair.busy = true;
            Some(request)
        }
        Err(CoreError::PairAddressMissingPort) => {
            session.notify(NoticeLevel::Error, "Please enter a valid IP:port");
            None
        }
        Err(CoreError::EmptyPairCode) => {
            session.notify(NoticeLevel::Error, "Please enter the pairing code");
            None
        }
        Err(err) => {
            session.notify(NoticeLevel::Error, err.to_string());
            None
        }
    }
}

pub fn apply_pair(session: &mut Session, addr: &str, result: Result<CommandResult, BackendError>) {
    session.form.pair.busy = false;
    match result {
        Ok(outcome) if outcome.success => {
            session.form.pair.open = false;
            session.form.pair.code.clear();
            session.notify(NoticeLevel::Success, outcome.message);

            // The pairing port is not the connect port; leave it for the user.
            let host = host_part(addr);
            session.form.address = format!("{host}:");
            session.notify(
                NoticeLevel::Info,
                format!("Paired. Enter the connect port for {host} on the main screen."),
            );
        }
        Ok(outcome) => session.notify(NoticeLevel::Error, outcome.message),
        Err(err) => {
            warn!(addr, "pair call failed: {err}");
            session.notify(NoticeLevel::Error, format!("Pairing request failed: {err}"));
        }
    }
}
