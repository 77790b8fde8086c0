use std::time::Duration;

use axum::{
    Router,
    extract::{WebSocketUpgrade, ws::Message},
    response::IntoResponse,
    routing::get,
};
use futures::{SinkExt, StreamExt};
use scrcpy_launcher_client::{
    backend::{Backend, BackendError, call},
    ws_backend::WsBackend,
};
use scrcpy_launcher_core::{
    BackendCall, BackendEvent, CommandResult, ConnectionStatus, EVENT_PUSH_PROGRESS, RpcOutcome,
    RpcResponse, WireMessage, decode_frame, encode_frame,
};
use serde_json::json;
use tokio::{net::TcpListener, sync::oneshot, time::timeout};

async fn start_fake_backend() -> (String, oneshot::Sender<()>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral backend socket");
    let address = listener.local_addr().expect("backend local addr");
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let router = Router::new().route("/rpc", get(ws_handler));
    let server = axum::serve(listener, router).with_graceful_shutdown(async {
        let _ = shutdown_rx.await;
    });
    tokio::spawn(async move {
        let _ = server.await;
    });

    (format!("ws://{address}/rpc"), shutdown_tx)
}

async fn ws_handler(ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(handle_socket)
}

/// Scripted backend:
/// - `check_adb_status` answers after a delay, so later calls overtake it
/// - `scan_tcp_devices` pushes a progress event before replying
/// - `pair_device` is rejected with an error string
/// - `disconnect_all` closes the socket without replying
async fn handle_socket(socket: axum::extract::ws::WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = tokio::sync::mpsc::unbounded_channel::<Message>();

    let writer = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            let closing = matches!(message, Message::Close(_));
            if sender.send(message).await.is_err() || closing {
                break;
            }
        }
    });

    while let Some(Ok(message)) = receiver.next().await {
        let Message::Binary(data) = message else {
            continue;
        };
        let Ok(WireMessage::Request(request)) = decode_frame(&data) else {
            continue;
        };

        let reply = |outcome: RpcOutcome| {
            let frame = encode_frame(&WireMessage::Response(RpcResponse {
                id: request.id,
                outcome,
            }))
            .expect("encode reply");
            Message::Binary(frame.into())
        };

        match request.call {
            BackendCall::CheckStatus => {
                let message = reply(RpcOutcome::Ok(json!({
                    "connected": true,
                    "message": "Connected: 10.0.0.7:5555",
                })));
                let tx = outbound_tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    let _ = tx.send(message);
                });
            }
            BackendCall::ScanDevices => {
                let event = encode_frame(&WireMessage::Event(BackendEvent {
                    event: EVENT_PUSH_PROGRESS.to_owned(),
                    payload: json!({ "progress": 40, "message": "Sending: 40.0%" }),
                }))
                .expect("encode event");
                let _ = outbound_tx.send(Message::Binary(event.into()));
                let _ = outbound_tx.send(reply(RpcOutcome::Ok(json!(["192.168.1.5"]))));
            }
            BackendCall::PairDevice { .. } => {
                let _ = outbound_tx.send(reply(RpcOutcome::Err("wrong pairing code".to_owned())));
            }
            BackendCall::DisconnectAll => {
                let _ = outbound_tx.send(Message::Close(None));
                break;
            }
            _ => {
                let _ = outbound_tx.send(reply(RpcOutcome::Ok(json!({
                    "success": true,
                    "message": "ok",
                }))));
            }
        }
    }

    drop(outbound_tx);
    let _ = writer.await;
}

#[tokio::test]
async fn concurrent_calls_are_matched_by_id() {
    let (url, shutdown_tx) = start_fake_backend().await;
    let backend = WsBackend::connect(&url).await.expect("connect backend");

    let status = call::<ConnectionStatus>(&backend, BackendCall::CheckStatus);
    let tcpip = call::<CommandResult>(&backend, BackendCall::EnableTcpip);
    let (status, tcpip) = timeout(Duration::from_secs(2), async { tokio::join!(status, tcpip) })
        .await
        .expect("both replies arrive");

    assert_eq!(
        status.expect("status reply"),
        ConnectionStatus {
            connected: true,
            message: "Connected: 10.0.0.7:5555".to_owned(),
        }
    );
    assert_eq!(tcpip.expect("tcpip reply"), CommandResult::ok("ok"));

    let _ = shutdown_tx.send(());
}

#[tokio::test]
async fn pushed_events_reach_subscribers() {
    let (url, shutdown_tx) = start_fake_backend().await;
    let backend = WsBackend::connect(&url).await.expect("connect backend");
    let mut events = backend.subscribe();

    let devices: Vec<String> = call(&backend, BackendCall::ScanDevices)
        .await
        .expect("scan reply");
    assert_eq!(devices, vec!["192.168.1.5".to_owned()]);

    let event = timeout(Duration::from_secs(1), events.recv())
        .await
        .expect("event arrives")
        .expect("event channel open");
    assert_eq!(event.event, EVENT_PUSH_PROGRESS);
    assert_eq!(event.payload["progress"], 40);

    let _ = shutdown_tx.send(());
}

#[tokio::test]
async fn rejected_call_surfaces_backend_message() {
    let (url, shutdown_tx) = start_fake_backend().await;
    let backend = WsBackend::connect(&url).await.expect("connect backend");

    let err = backend
        .invoke(BackendCall::PairDevice {
            addr: "192.168.1.5:37001".to_owned(),
            code: "000000".to_owned(),
        })
        .await
        .expect_err("pairing is rejected");
    assert_eq!(err, BackendError::Rejected("wrong pairing code".to_owned()));
    assert_eq!(err.to_string(), "wrong pairing code");

    let _ = shutdown_tx.send(());
}

#[tokio::test]
async fn reply_with_wrong_shape_is_invalid_response() {
    let (url, shutdown_tx) = start_fake_backend().await;
    let backend = WsBackend::connect(&url).await.expect("connect backend");

    let err = call::<Vec<String>>(&backend, BackendCall::GetConfig)
        .await
        .expect_err("object is not a list");
    assert!(
        matches!(err, BackendError::InvalidResponse { command: "get_config", .. }),
        "unexpected error: {err:?}"
    );

    let _ = shutdown_tx.send(());
}

#[tokio::test]
async fn closed_connection_fails_pending_and_later_calls() {
    let (url, shutdown_tx) = start_fake_backend().await;
    let backend = WsBackend::connect(&url).await.expect("connect backend");

    let err = timeout(Duration::from_secs(2), backend.invoke(BackendCall::DisconnectAll))
        .await
        .expect("pending call resolves")
        .expect_err("socket closed before reply");
    assert_eq!(err, BackendError::Closed);

    let err = timeout(Duration::from_secs(2), backend.invoke(BackendCall::CheckStatus))
        .await
        .expect("call fails fast")
        .expect_err("connection is gone");
    assert_eq!(err, BackendError::Closed);

    let _ = shutdown_tx.send(());
}

#[tokio::test]
async fn connect_rejects_malformed_url() {
    let err = WsBackend::connect("not a url")
        .await
        .err()
        .expect("malformed url fails");
    assert!(matches!(err, BackendError::Transport(_)), "unexpected error: {err:?}");
}
