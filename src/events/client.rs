use crate::error::{CompanionError, Result};
use crate::events::parser::SseParser;
use crate::events::types::{ConnectionStatus, EventNotice, ServerEvent};
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const RECONNECT_DELAY: Duration = Duration::from_secs(2);
pub const MAX_RECONNECT_ATTEMPTS: u32 = 10;

const EVENT_CHANNEL_CAPACITY: usize = 256;

struct SharedState {
    connected: AtomicBool,
    connecting: AtomicBool,
    attempts: AtomicU32,
    url: RwLock<Option<String>>,
}

/// Maintains one long-lived connection to the server's `/event` stream
/// and fans frames out to subscribers in arrival order. Connection
/// failures retry on a fixed delay up to a bounded attempt count; past
/// the bound the client stays down until `connect` is called again.
pub struct EventClient {
    http: reqwest::Client,
    shared: Arc<SharedState>,
    task: Mutex<Option<JoinHandle<()>>>,
    tx: broadcast::Sender<EventNotice>,
    reconnect_delay: Duration,
    max_reconnect_attempts: u32,
}

impl EventClient {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            // No read timeout: the stream is meant to stay open forever.
            http: reqwest::Client::new(),
            shared: Arc::new(SharedState {
                connected: AtomicBool::new(false),
                connecting: AtomicBool::new(false),
                attempts: AtomicU32::new(0),
                url: RwLock::new(None),
            }),
            task: Mutex::new(None),
            tx,
            reconnect_delay: RECONNECT_DELAY,
            max_reconnect_attempts: MAX_RECONNECT_ATTEMPTS,
        }
    }

    /// Overrides the reconnect policy; slow or flaky environments may
    /// need something other than the defaults.
    pub fn with_reconnect(mut self, delay: Duration, max_attempts: u32) -> Self {
        self.reconnect_delay = delay;
        self.max_reconnect_attempts = max_attempts;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventNotice> {
        self.tx.subscribe()
    }

    /// Connects to `<base_url>/event`. Connecting to the URL the client
    /// is already connected to is a no-op; a different URL tears the
    /// current connection down first. Resets the reconnect attempt counter.
    pub async fn connect(&self, base_url: &str) {
        {
            let current = self.shared.url.read().await;
            if current.as_deref() == Some(base_url) && self.is_connected() {
                debug!(url = base_url, "already connected");
                return;
            }
        }

        self.disconnect().await;

        info!(url = base_url, "connecting to OpenCode event stream");
        *self.shared.url.write().await = Some(base_url.to_string());
        self.shared.attempts.store(0, Ordering::SeqCst);

        let shared = self.shared.clone();
        let http = self.http.clone();
        let tx = self.tx.clone();
        let delay = self.reconnect_delay;
        let max_attempts = self.max_reconnect_attempts;

        let task = tokio::spawn(async move {
            run_connection_loop(shared, http, tx, delay, max_attempts).await;
        });

        let mut guard = self.task.lock().await;
        if let Some(old) = guard.replace(task) {
            old.abort();
        }
    }

    /// Clears the target URL, cancels any pending reconnect and notifies
    /// subscribers. Reconnection attempts stop observably.
    pub async fn disconnect(&self) {
        let had_url = self.shared.url.write().await.take().is_some();
        self.shared.connected.store(false, Ordering::SeqCst);
        self.shared.connecting.store(false, Ordering::SeqCst);

        if let Some(task) = self.task.lock().await.take() {
            task.abort();
        }

        if had_url {
            info!("disconnected from OpenCode event stream");
            let _ = self.tx.send(EventNotice::ConnectionChanged(false));
        }
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        let attempts = self.shared.attempts.load(Ordering::SeqCst);
        if self.shared.connected.load(Ordering::SeqCst) {
            ConnectionStatus::Connected
        } else if self.shared.connecting.load(Ordering::SeqCst) {
            ConnectionStatus::Connecting
        } else if attempts > 0 && attempts < self.max_reconnect_attempts {
            ConnectionStatus::Reconnecting
        } else if attempts >= self.max_reconnect_attempts {
            ConnectionStatus::Error
        } else {
            ConnectionStatus::Disconnected
        }
    }
}

impl Default for EventClient {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_connection_loop(
    shared: Arc<SharedState>,
    http: reqwest::Client,
    tx: broadcast::Sender<EventNotice>,
    delay: Duration,
    max_attempts: u32,
) {
    loop {
        let Some(url) = shared.url.read().await.clone() else {
            break;
        };

        shared.connecting.store(true, Ordering::SeqCst);
        let _ = tx.send(EventNotice::ConnectionChanged(false));

        let result = stream_events(&shared, &http, &tx, &url).await;

        shared.connecting.store(false, Ordering::SeqCst);
        if shared.connected.swap(false, Ordering::SeqCst) {
            let _ = tx.send(EventNotice::ConnectionChanged(false));
        }

        if let Err(err) = result {
            warn!(error = %err, "event stream connection failed");
            let _ = tx.send(EventNotice::Error(err.to_string()));
        } else {
            warn!("event stream closed by the server");
        }

        if shared.url.read().await.is_none() {
            break; // disconnect() happened while streaming
        }

        let attempts = shared.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempts >= max_attempts {
            warn!(attempts, "max reconnection attempts reached, giving up");
            break;
        }

        info!(
            attempt = attempts,
            max = max_attempts,
            delay_ms = delay.as_millis() as u64,
            "scheduling event stream reconnection"
        );
        tokio::time::sleep(delay).await;
    }
}

async fn stream_events(
    shared: &SharedState,
    http: &reqwest::Client,
    tx: &broadcast::Sender<EventNotice>,
    base_url: &str,
) -> Result<()> {
    let endpoint = format!("{}/event", base_url.trim_end_matches('/'));
    debug!(endpoint = %endpoint, "opening event stream");

    let response = http
        .get(&endpoint)
        .header(reqwest::header::ACCEPT, "text/event-stream")
        .header(reqwest::header::CACHE_CONTROL, "no-cache")
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(CompanionError::Protocol {
            status: status.as_u16(),
            body,
        });
    }

    shared.connecting.store(false, Ordering::SeqCst);
    shared.connected.store(true, Ordering::SeqCst);
    shared.attempts.store(0, Ordering::SeqCst);
    let _ = tx.send(EventNotice::ConnectionChanged(true));
    info!("event stream connection established");

    let mut stream = response.bytes_stream();
    let mut parser = SseParser::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        let text = String::from_utf8_lossy(&chunk);
        for frame in parser.push(&text) {
            let event = ServerEvent::new(frame.event_type, frame.data);
            debug!(event_type = %event.event_type, "received server event");
            let _ = tx.send(EventNotice::Event(event));
        }
    }

    Ok(())
}
