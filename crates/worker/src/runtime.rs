//! Line-delimited JSON event loop driving a `Worker`.
//!
//! Every inbound line is an `Envelope<WorkerEvent>`; every outbound line an
//! `Envelope<Outbound>` echoing the inbound `id`. Events run in their own
//! tasks, except that lifecycle events (install, activate, superseded) wait
//! for the previous lifecycle event to finish so they apply in order.

use std::sync::Arc;

use async_trait::async_trait;
use offcache_client::{UrlError, canonicalize};
use offcache_core::{CacheMode, ControlReply, Destination, Error, Request, RequestMode, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{RwLock, mpsc, oneshot};
use tokio::task::JoinSet;
use url::Url;

use crate::host::{ClientInfo, Host, Notification};
use crate::lifecycle::{ErrorSignal, Worker, WorkerState};

/// Outbound queue depth before event tasks wait on the writer.
pub const OUTPUT_BUFFER: usize = 256;

/// One protocol line with its correlation id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(flatten)]
    pub body: T,
}

/// A request as it arrives on the wire.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FetchRequest {
    #[serde(default = "default_method")]
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub destination: Destination,
    #[serde(default)]
    pub mode: RequestMode,
    #[serde(default)]
    pub cache: CacheMode,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(default)]
    pub body_hex: Option<String>,
}

fn default_method() -> String {
    "GET".into()
}

impl FetchRequest {
    /// Resolve against the app origin. Non-http(s) URLs are kept as parsed so
    /// the interceptor can decline them.
    pub fn into_request(self, origin: &Url) -> Result<Request, Error> {
        let url = match canonicalize(&self.url, origin) {
            Ok(url) => url,
            Err(UrlError::UnsupportedScheme(_)) => {
                origin.join(self.url.trim()).map_err(|e| Error::InvalidUrl(e.to_string()))?
            }
            Err(e) => return Err(Error::InvalidUrl(e.to_string())),
        };

        let mut request = Request::get(url)
            .with_method(&self.method)
            .with_destination(self.destination)
            .with_mode(self.mode)
            .with_cache(self.cache);
        request.headers = self.headers;
        if let Some(body) = self.body_hex {
            let bytes = hex::decode(body.trim()).map_err(|e| Error::InvalidInput(format!("body_hex: {e}")))?;
            request = request.with_body(bytes);
        }
        Ok(request)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum WorkerEvent {
    Install,
    Activate,
    Fetch {
        request: FetchRequest,
    },
    Message {
        #[serde(default)]
        data: Value,
    },
    Push {
        #[serde(default)]
        data: Option<Value>,
    },
    NotificationClick {
        #[serde(default)]
        action: Option<String>,
    },
    Sync {
        tag: String,
    },
    /// The host's current list of open instances.
    Clients {
        clients: Vec<ClientInfo>,
    },
    Superseded,
    Error {
        #[serde(default)]
        message: String,
    },
    UnhandledRejection {
        #[serde(default)]
        reason: String,
    },
}

impl WorkerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            WorkerEvent::Install => "install",
            WorkerEvent::Activate => "activate",
            WorkerEvent::Fetch { .. } => "fetch",
            WorkerEvent::Message { .. } => "message",
            WorkerEvent::Push { .. } => "push",
            WorkerEvent::NotificationClick { .. } => "notificationclick",
            WorkerEvent::Sync { .. } => "sync",
            WorkerEvent::Clients { .. } => "clients",
            WorkerEvent::Superseded => "superseded",
            WorkerEvent::Error { .. } => "error",
            WorkerEvent::UnhandledRejection { .. } => "unhandledrejection",
        }
    }

    fn is_lifecycle(&self) -> bool {
        matches!(self, WorkerEvent::Install | WorkerEvent::Activate | WorkerEvent::Superseded)
    }
}

/// Commands the worker issues to the embedding environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum HostCommand {
    Claim,
    Focus { client_id: String },
    OpenWindow { url: String },
    ShowNotification { notification: Notification },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound {
    Response {
        source: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        status: u16,
        status_text: String,
        headers: Vec<(String, String)>,
        body_hex: String,
    },
    /// A bypassed request whose direct network attempt failed.
    NetworkError {
        error: String,
    },
    Reply {
        reply: ControlReply,
    },
    Seeded {
        bulk: bool,
        stored: Vec<String>,
        failed: Vec<(String, String)>,
    },
    Ack {
        event: String,
    },
    Failed {
        event: String,
        error: String,
    },
    Command {
        command: HostCommand,
    },
    State {
        state: WorkerState,
    },
}

impl Outbound {
    fn response(source: &str, response: Response) -> Self {
        Outbound::Response {
            source: source.to_string(),
            url: response.url.map(String::from),
            status: response.status,
            status_text: response.status_text,
            headers: response.headers,
            body_hex: hex::encode(&response.body),
        }
    }
}

pub type OutboundTx = mpsc::Sender<Envelope<Outbound>>;

/// `Host` that writes commands to the outbound stream and remembers the
/// last reported instance list.
pub struct StdioHost {
    out: OutboundTx,
    clients: RwLock<Vec<ClientInfo>>,
}

impl StdioHost {
    pub fn new(out: OutboundTx) -> Self {
        Self { out, clients: RwLock::new(Vec::new()) }
    }

    pub async fn set_clients(&self, clients: Vec<ClientInfo>) {
        *self.clients.write().await = clients;
    }

    async fn send(&self, command: HostCommand) -> Result<(), Error> {
        self.out
            .send(Envelope { id: None, body: Outbound::Command { command } })
            .await
            .map_err(|_| Error::Host("output stream closed".into()))
    }
}

#[async_trait]
impl Host for StdioHost {
    async fn claim(&self) -> Result<(), Error> {
        self.send(HostCommand::Claim).await
    }

    async fn clients(&self) -> Result<Vec<ClientInfo>, Error> {
        Ok(self.clients.read().await.clone())
    }

    async fn focus(&self, client_id: &str) -> Result<(), Error> {
        self.send(HostCommand::Focus { client_id: client_id.to_string() }).await
    }

    async fn open_window(&self, url: &str) -> Result<(), Error> {
        self.send(HostCommand::OpenWindow { url: url.to_string() }).await
    }

    async fn show_notification(&self, notification: &Notification) -> Result<(), Error> {
        self.send(HostCommand::ShowNotification { notification: notification.clone() }).await
    }
}

fn push_bytes(data: Option<Value>) -> Option<Vec<u8>> {
    match data? {
        Value::Null => None,
        Value::String(text) => Some(text.into_bytes()),
        other => serde_json::to_vec(&other).ok(),
    }
}

pub struct Runtime {
    worker: Arc<Worker>,
    host: Arc<StdioHost>,
    out: OutboundTx,
}

impl Runtime {
    pub fn new(worker: Arc<Worker>, host: Arc<StdioHost>, out: OutboundTx) -> Self {
        Self { worker, host, out }
    }

    /// Process events until end of input, then wait for in-flight handlers
    /// and pending cache writes.
    ///
    /// Undecodable lines (bad UTF-8 included) are logged and skipped; only a
    /// read failure ends the loop early, and in-flight work is still drained.
    pub async fn run<R>(&self, mut input: R) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let states = tokio::spawn(forward_states(self.worker.subscribe(), self.out.clone()));
        let mut tasks = JoinSet::new();
        let mut lifecycle: Option<oneshot::Receiver<()>> = None;
        let mut buf = Vec::new();

        let result = loop {
            buf.clear();
            match input.read_until(b'\n', &mut buf).await {
                Ok(0) => break Ok(()),
                Ok(_) => {}
                Err(e) => break Err(e),
            }
            let line = buf.trim_ascii();
            if line.is_empty() {
                continue;
            }
            let envelope: Envelope<WorkerEvent> = match serde_json::from_slice(line) {
                Ok(envelope) => envelope,
                Err(e) => {
                    tracing::warn!(error = %e, "dropping malformed event line");
                    continue;
                }
            };

            while let Some(result) = tasks.try_join_next() {
                log_task_result(result);
            }

            let previous = if envelope.body.is_lifecycle() {
                let (done, next) = oneshot::channel();
                let previous = lifecycle.replace(next);
                Some((previous, done))
            } else {
                None
            };

            let worker = self.worker.clone();
            let host = self.host.clone();
            let out = self.out.clone();
            tasks.spawn(async move {
                let done = match previous {
                    Some((previous, done)) => {
                        if let Some(previous) = previous {
                            let _ = previous.await;
                        }
                        Some(done)
                    }
                    None => None,
                };
                let Envelope { id, body } = envelope;
                let reply = dispatch(&worker, &host, body).await;
                if out.send(Envelope { id, body: reply }).await.is_err() {
                    tracing::debug!("output stream closed; dropping reply");
                }
                drop(done);
            });
        };

        while let Some(result) = tasks.join_next().await {
            log_task_result(result);
        }
        self.worker.drain().await;
        states.abort();
        match &result {
            Ok(()) => tracing::info!("input closed; worker stopped"),
            Err(e) => tracing::error!(error = %e, "failed reading events; worker stopped"),
        }
        result
    }
}

fn log_task_result(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            tracing::error!("event handler panicked: {e}");
        } else {
            tracing::warn!("event handler cancelled: {e}");
        }
    }
}

async fn forward_states(mut states: tokio::sync::watch::Receiver<WorkerState>, out: OutboundTx) {
    while states.changed().await.is_ok() {
        let state = *states.borrow_and_update();
        if out.send(Envelope { id: None, body: Outbound::State { state } }).await.is_err() {
            break;
        }
    }
}

async fn dispatch(worker: &Worker, host: &StdioHost, event: WorkerEvent) -> Outbound {
    let name = event.name();
    match handle_event(worker, host, event).await {
        Ok(Some(outbound)) => outbound,
        Ok(None) => Outbound::Ack { event: name.to_string() },
        Err(e) => {
            tracing::warn!(event = name, error = %e, "event failed");
            Outbound::Failed { event: name.to_string(), error: e.to_string() }
        }
    }
}

async fn handle_event(worker: &Worker, host: &StdioHost, event: WorkerEvent) -> Result<Option<Outbound>, Error> {
    match event {
        WorkerEvent::Install => {
            let report = worker.install().await?;
            Ok(Some(Outbound::Seeded {
                bulk: report.bulk,
                stored: report.stored.into_iter().map(String::from).collect(),
                failed: report.failed.into_iter().map(|(url, e)| (url.into(), e)).collect(),
            }))
        }
        WorkerEvent::Activate => {
            worker.activate().await?;
            Ok(None)
        }
        WorkerEvent::Fetch { request } => {
            let request = request.into_request(&worker.settings.origin)?;
            let outcome = worker.handle_fetch(&request).await;
            let source = outcome.source();
            if let Some(response) = outcome.into_response() {
                return Ok(Some(Outbound::response(source, response)));
            }
            match worker.network().fetch(&request).await {
                Ok(response) => Ok(Some(Outbound::response(source, response))),
                Err(e) => Ok(Some(Outbound::NetworkError { error: e.to_string() })),
            }
        }
        WorkerEvent::Message { data } => {
            let (tx, rx) = oneshot::channel();
            worker.handle_message(&data, Some(tx)).await?;
            Ok(rx.await.ok().map(|reply| Outbound::Reply { reply }))
        }
        WorkerEvent::Push { data } => {
            worker.handle_push(push_bytes(data).as_deref()).await?;
            Ok(None)
        }
        WorkerEvent::NotificationClick { action } => {
            worker.handle_notification_click(action.as_deref()).await?;
            Ok(None)
        }
        WorkerEvent::Sync { tag } => {
            worker.handle_sync(&tag);
            Ok(None)
        }
        WorkerEvent::Clients { clients } => {
            let released = clients.is_empty();
            host.set_clients(clients).await;
            if released {
                worker.clients_released().await?;
            } else {
                worker.clients_attached();
            }
            Ok(None)
        }
        WorkerEvent::Superseded => {
            worker.supersede();
            Ok(None)
        }
        WorkerEvent::Error { message } => {
            worker.report_error(ErrorSignal::Error, &message);
            Ok(None)
        }
        WorkerEvent::UnhandledRejection { reason } => {
            worker.report_error(ErrorSignal::UnhandledRejection, &reason);
            Ok(None)
        }
    }
}

/// Write each outbound envelope as one JSON line until every sender is gone.
pub async fn write_lines<W>(mut rx: mpsc::Receiver<Envelope<Outbound>>, mut writer: W) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(envelope) = rx.recv().await {
        let mut line = match serde_json::to_vec(&envelope) {
            Ok(line) => line,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode outbound line");
                continue;
            }
        };
        line.push(b'\n');
        writer.write_all(&line).await?;
        writer.flush().await?;
    }
    Ok(())
}
