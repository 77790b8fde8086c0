use std::{io, path::PathBuf, process::ExitCode, sync::Arc};

use clap::{Parser, Subcommand};
use scrcpy_launcher_client::{
    Action, Controller, ControllerOptions, NoticeLevel,
    logging::init_logging,
    scan::ScanPhase,
    settings::{
        ClientSettings, load_settings, save_settings_with_retry, settings_path,
        validate_backend_url,
    },
    suggest::load_app_database,
    ws_backend::WsBackend,
};
use tokio::runtime::Handle;
use tracing::{error, info, warn};

#[derive(Parser, Debug, Clone)]
#[command(name = "scrcpy-launcher")]
struct LauncherArgs {
    /// WebSocket endpoint of the launcher backend.
    #[arg(long)]
    backend_url: Option<String>,
    /// JSON array of `{ name, package_name, icon_url }` entries.
    #[arg(long)]
    app_database: Option<PathBuf>,
    /// Persist `--backend-url` / `--app-database` to settings.json.
    #[arg(long, default_value_t = false)]
    save: bool,
    #[command(subcommand)]
    command: Option<LauncherCommand>,
}

#[derive(Subcommand, Debug, Clone)]
enum LauncherCommand {
    /// Show the device connection status (default).
    Status,
    /// Scan the local network for devices listening on 5555.
    Scan {
        /// Connect to the Nth result (1-based).
        #[arg(long)]
        pick: Option<usize>,
    },
    /// Connect to `ip[:port]`.
    Connect { address: String },
    /// Switch the USB device to wireless debugging.
    Tcpip,
    /// Drop every adb connection.
    Disconnect,
    /// Pair with a device using its pairing address and code.
    Pair { addr: String, code: String },
    /// Push a local file to the device.
    Push {
        path: String,
        #[arg(long)]
        remote: Option<String>,
    },
    /// List packages installed on the device.
    Apps {
        #[arg(long)]
        filter: Option<String>,
    },
    /// Suggest apps from the database for a name query.
    Suggest {
        query: String,
        #[arg(long, default_value_t = false)]
        name_only: bool,
    },
    /// Start screen mirroring.
    Mirror,
    /// Start audio-only forwarding.
    Audio,
    /// Launch a saved app by package name.
    Launch { package: String },
    /// Stop every running scrcpy process.
    Kill,
    /// Read `<action> [arg]` lines from stdin and apply each one.
    Shell,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();
    let args = LauncherArgs::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("launcher failed: {err}");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn resolve_settings(args: &LauncherArgs) -> Result<ClientSettings, String> {
    let path = settings_path();
    let mut settings = match load_settings(&path) {
        Ok(settings) => settings,
        Err(err) => {
            warn!(path = %path.display(), "ignoring saved settings: {err}");
            ClientSettings::default()
        }
    };

    if let Some(url) = &args.backend_url {
        validate_backend_url(url)?;
        settings.backend_url = url.trim().to_owned();
    }
    if let Some(database) = &args.app_database {
        settings.app_database = Some(database.clone());
    }

    if args.save {
        save_settings_with_retry(&path, &settings).map_err(|err| err.to_string())?;
        info!(path = %path.display(), "settings saved");
    }
    Ok(settings)
}

async fn run(args: LauncherArgs) -> Result<(), String> {
    let settings = resolve_settings(&args)?;

    let app_database = match &settings.app_database {
        Some(path) => load_app_database(path)
            .map_err(|err| format!("app database {}: {err}", path.display()))?,
        None => Vec::new(),
    };

    info!(backend_url = %settings.backend_url, "connecting to backend");
    let backend = WsBackend::connect(&settings.backend_url)
        .await
        .map_err(|err| err.to_string())?;

    let mut controller = Controller::new(
        Arc::new(backend),
        Handle::current(),
        ControllerOptions {
            app_database,
            ..ControllerOptions::default()
        },
    );
    apply(&mut controller, Action::Start).await;

    match args.command.unwrap_or(LauncherCommand::Status) {
        LauncherCommand::Status => {}
        LauncherCommand::Scan { pick } => {
            apply(&mut controller, Action::StartScan).await;
            render_scan(&controller);
            if let Some(pick) = pick {
                let Some(ip) = pick
                    .checked_sub(1)
                    .and_then(|index| controller.session().scan.rows().get(index))
                    .cloned()
                else {
                    return Err(format!("no scan result #{pick}"));
                };
                apply(&mut controller, Action::SelectScanResult(ip)).await;
            }
        }
        LauncherCommand::Connect { address } => {
            apply(&mut controller, Action::SetAddress(address)).await;
            apply(&mut controller, Action::Connect).await;
        }
        LauncherCommand::Tcpip => apply(&mut controller, Action::EnableTcpip).await,
        LauncherCommand::Disconnect => apply(&mut controller, Action::DisconnectAll).await,
        LauncherCommand::Pair { addr, code } => {
            apply(&mut controller, Action::Pair { addr, code }).await;
        }
        LauncherCommand::Push { path, remote } => {
            apply(
                &mut controller,
                Action::PushFile {
                    local_path: path,
                    remote_path: remote,
                },
            )
            .await;
        }
        LauncherCommand::Apps { filter } => {
            apply(&mut controller, Action::LoadDeviceApps).await;
            apply(
                &mut controller,
                Action::FilterDeviceApps(filter.unwrap_or_default()),
            )
            .await;
            for package in controller.session().apps.visible() {
                println!("{package}");
            }
        }
        LauncherCommand::Suggest { query, name_only } => {
            for app in controller.suggestions(&query, name_only) {
                match &app.package_name {
                    Some(package) => println!("{}  ({package})", app.name),
                    None => println!("{}", app.name),
                }
            }
        }
        LauncherCommand::Mirror => apply(&mut controller, Action::LaunchMirror).await,
        LauncherCommand::Audio => apply(&mut controller, Action::LaunchAudio).await,
        LauncherCommand::Launch { package } => {
            apply(&mut controller, Action::LaunchApp(package)).await;
        }
        LauncherCommand::Kill => apply(&mut controller, Action::KillScrcpy).await,
        LauncherCommand::Shell => shell(&mut controller).await?,
    }

    render_status(&mut controller);
    controller.dispose();
    Ok(())
}

async fn apply(controller: &mut Controller, action: Action) {
    if let Err(err) = controller.dispatch(action) {
        eprintln!("{err}");
    }
    controller.settle().await;
    print_notices(controller);
}

async fn shell(controller: &mut Controller) -> Result<(), String> {
    loop {
        let line = tokio::task::spawn_blocking(|| {
            let mut line = String::new();
            io::stdin().read_line(&mut line).map(|read| (read, line))
        })
        .await
        .map_err(|err| err.to_string())?
        .map_err(|err| format!("stdin: {err}"))?;

        let (read, line) = line;
        if read == 0 {
            return Ok(());
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "quit" || line == "exit" {
            return Ok(());
        }

        let (id, arg) = line.split_once(' ').unwrap_or((line, ""));
        if let Err(err) = controller.dispatch_id(id, arg) {
            eprintln!("{err}");
            continue;
        }
        controller.settle().await;
        print_notices(controller);
        if id == "scan" {
            render_scan(controller);
        }
    }
}

fn print_notices(controller: &mut Controller) {
    for notice in controller.session_mut().take_notices() {
        let tag = match notice.level {
            NoticeLevel::Info => "info",
            NoticeLevel::Success => "ok",
            NoticeLevel::Error => "error",
        };
        println!("[{tag}] {}", notice.text);
    }
}

fn render_scan(controller: &Controller) {
    let scan = &controller.session().scan;
    println!("{}", scan.status_text());
    match scan.phase() {
        ScanPhase::Results(rows) => {
            for (index, ip) in rows.iter().enumerate() {
                println!("  {}. {ip}", index + 1);
            }
        }
        ScanPhase::Empty => {
            if let Some(hint) = scan.empty_hint() {
                println!("  {hint}");
            }
        }
        ScanPhase::Idle | ScanPhase::Pending | ScanPhase::Error(_) => {}
    }
}

fn render_status(controller: &mut Controller) {
    print_notices(controller);
    let session = controller.session();
    let marker = if session.status.connected() {
        "connected"
    } else {
        "disconnected"
    };
    println!("status: {marker} - {}", session.status.message());
    if !session.form.address.is_empty() {
        println!("address: {}", session.form.address);
    }
    if session.progress.is_visible() {
        println!("transfer: {}", session.progress.text());
    }
}
