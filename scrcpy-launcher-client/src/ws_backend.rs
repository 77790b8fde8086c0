use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use scrcpy_launcher_core::{
    BackendCall, BackendEvent, RequestId, RpcOutcome, RpcRequest, WireMessage, decode_frame,
    encode_frame,
};
use serde_json::Value;
use tokio::{
    sync::{broadcast, mpsc, oneshot},
    task::JoinHandle,
    time::timeout,
};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::backend::{Backend, BackendError};

const MAX_CONNECT_ATTEMPTS: u32 = 3;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const BACKOFF_BASE_MS: u64 = 200;
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);
const EVENT_CHANNEL_CAPACITY: usize = 64;

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;
type PendingReplies = Arc<Mutex<HashMap<RequestId, oneshot::Sender<RpcOutcome>>>>;

/// [`Backend`] over a WebSocket carrying core wire frames.
///
/// Replies are matched to requests by id, so calls may be in flight
/// concurrently and complete in any order.
pub struct WsBackend {
    next_id: AtomicU64,
    outbound_tx: mpsc::UnboundedSender<Message>,
    pending: PendingReplies,
    closed: Arc<AtomicBool>,
    events_tx: broadcast::Sender<BackendEvent>,
    send_task: JoinHandle<()>,
    receive_task: JoinHandle<()>,
}

impl WsBackend {
    pub async fn connect(backend_url: &str) -> Result<Self, BackendError> {
        Url::parse(backend_url)
            .map_err(|err| BackendError::Transport(format!("invalid backend URL: {err}")))?;

        let ws_stream = connect_with_retry(backend_url).await?;
        info!(backend_url, "backend connected");
        Ok(Self::from_stream(ws_stream))
    }

    fn from_stream(ws_stream: WsStream) -> Self {
        let (write_half, read_half) = ws_stream.split();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<Message>();
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let pending: PendingReplies = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));

        let send_task = tokio::spawn(network_send_task(write_half, outbound_rx));
        let receive_task = tokio::spawn(network_receive_task(
            read_half,
            Arc::clone(&pending),
            Arc::clone(&closed),
            events_tx.clone(),
        ));

        Self {
            next_id: AtomicU64::new(1),
            outbound_tx,
            pending,
            closed,
            events_tx,
            send_task,
            receive_task,
        }
    }

    fn forget(&self, id: RequestId) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.remove(&id);
        }
    }
}

#[async_trait]
impl Backend for WsBackend {
    async fn invoke(&self, call: BackendCall) -> Result<Value, BackendError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let command = call.command();
        let frame = encode_frame(&WireMessage::Request(RpcRequest { id, call }))
            .map_err(|err| BackendError::Transport(err.to_string()))?;

        let (reply_tx, reply_rx) = oneshot::channel();
        self.pending
            .lock()
            .map_err(|_| BackendError::Transport("pending reply map poisoned".to_owned()))?
            .insert(id, reply_tx);

        // The receive task flags `closed` before draining, so a request
        // registered after the drain is caught here.
        if self.closed.load(Ordering::SeqCst) {
            self.forget(id);
            return Err(BackendError::Closed);
        }

        if self.outbound_tx.send(Message::Binary(frame.into())).is_err() {
            self.forget(id);
            return Err(BackendError::Closed);
        }
        debug!(id, command, "request sent");

        match reply_rx.await {
            Ok(RpcOutcome::Ok(value)) => Ok(value),
            Ok(RpcOutcome::Err(message)) => Err(BackendError::Rejected(message)),
            Err(_) => Err(BackendError::Closed),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<BackendEvent> {
        self.events_tx.subscribe()
    }
}

impl Drop for WsBackend {
    fn drop(&mut self) {
        self.send_task.abort();
        self.receive_task.abort();
    }
}

async fn connect_with_retry(backend_url: &str) -> Result<WsStream, BackendError> {
    let mut attempt: u32 = 1;
    loop {
        info!(
            attempt,
            max_attempts = MAX_CONNECT_ATTEMPTS,
            backend_url,
            "connecting to backend"
        );

        let msg = match timeout(CONNECT_TIMEOUT, connect_async(backend_url)).await {
            Ok(Ok((ws_stream, _))) => return Ok(ws_stream),
            Ok(Err(err)) => format!("connect failed: {err}"),
            Err(_) => format!("connect timed out after {:?}", CONNECT_TIMEOUT),
        };
        error!(attempt, backend_url, "{msg}");
        if attempt >= MAX_CONNECT_ATTEMPTS {
            return Err(BackendError::Transport(msg));
        }

        let backoff_ms = BACKOFF_BASE_MS.saturating_mul(1_u64 << (attempt - 1));
        tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
        attempt += 1;
    }
}

async fn network_send_task(
    mut write_half: futures::stream::SplitSink<WsStream, Message>,
    mut outbound_rx: mpsc::UnboundedReceiver<Message>,
) {
    let mut ping_interval = tokio::time::interval(KEEPALIVE_INTERVAL);
    ping_interval.tick().await;

    loop {
        tokio::select! {
            msg = outbound_rx.recv() => {
                let Some(message) = msg else { break };
                if let Err(err) = write_half.send(message).await {
                    warn!("backend send failed: {err}");
                    break;
                }
            }
            _ = ping_interval.tick() => {
                if write_half.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
        }
    }

    let _ = write_half.close().await;
}

async fn network_receive_task(
    mut read_half: futures::stream::SplitStream<WsStream>,
    pending: PendingReplies,
    closed: Arc<AtomicBool>,
    events_tx: broadcast::Sender<BackendEvent>,
) {
    while let Some(next_message) = read_half.next().await {
        let message = match next_message {
            Ok(message) => message,
            Err(err) => {
                warn!("backend receive error: {err}");
                break;
            }
        };

        match message {
            Message::Binary(bytes) => match decode_frame(&bytes) {
                Ok(WireMessage::Response(response)) => {
                    let waiter = pending
                        .lock()
                        .ok()
                        .and_then(|mut pending| pending.remove(&response.id));
                    match waiter {
                        Some(reply_tx) => {
                            let _ = reply_tx.send(response.outcome);
                        }
                        None => warn!(id = response.id, "reply for unknown request"),
                    }
                }
                Ok(WireMessage::Event(event)) => {
                    // No subscribers is fine; the event is simply dropped.
                    let _ = events_tx.send(event);
                }
                Ok(WireMessage::Request(request)) => {
                    warn!(id = request.id, "ignoring request sent by backend");
                }
                Err(err) => warn!("dropping undecodable backend frame: {err}"),
            },
            Message::Close(_) => break,
            Message::Text(_) => warn!("ignoring text frame from backend"),
            _ => {}
        }
    }

    info!("backend connection closed");
    closed.store(true, Ordering::SeqCst);
    if let Ok(mut pending) = pending.lock() {
        // Dropping the senders resolves every waiter with `Closed`.
        pending.clear();
    }
}
