//! IPC server implementation.
//!
//! Supports both request/response and streaming subscriptions.
//!
//! ## Streaming Subscriptions
//!
//! When a client sends `thread.subscribe`, the connection stays open
//! and receives the thread's event frames as NDJSON lines. The client
//! should:
//!
//! 1. Send `thread.subscribe` with a `thread_id` param
//! 2. Receive the success response
//! 3. Block reading events (NDJSON lines)
//! 4. Send `thread.unsubscribe` or close the connection to stop

use crate::{error_codes, Event, IpcError, IpcResult, Method, Request, Response};
use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{debug, error, info, warn};

/// Handler function type for IPC methods.
pub type HandlerFn =
    Box<dyn Fn(Request) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync>;

/// Callback that opens an event feed for one thread.
///
/// Returns `None` when the thread does not exist. The daemon side
/// bridges its internal broadcast channel into the returned receiver;
/// dropping the receiver tears the bridge down.
pub type SubscribeFn = Box<
    dyn Fn(String) -> Pin<Box<dyn Future<Output = Option<mpsc::Receiver<Event>>> + Send>>
        + Send
        + Sync,
>;

/// IPC server that listens on a Unix domain socket.
pub struct IpcServer {
    socket_path: String,
    handlers: Arc<RwLock<HashMap<Method, HandlerFn>>>,
    shutdown_tx: broadcast::Sender<()>,
    subscribe_fn: Arc<RwLock<Option<SubscribeFn>>>,
}

impl IpcServer {
    /// Create a new IPC server.
    pub fn new(socket_path: &str) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            socket_path: socket_path.to_string(),
            handlers: Arc::new(RwLock::new(HashMap::new())),
            shutdown_tx,
            subscribe_fn: Arc::new(RwLock::new(None)),
        }
    }

    /// Register a handler for a method.
    pub async fn register_handler<F, Fut>(&self, method: Method, handler: F)
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        let boxed_handler: HandlerFn = Box::new(move |req| Box::pin(handler(req)));
        self.handlers.write().await.insert(method, boxed_handler);
    }

    /// Register the callback that opens per-thread event feeds.
    pub async fn register_subscription_handler<F, Fut>(&self, handler: F)
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<mpsc::Receiver<Event>>> + Send + 'static,
    {
        let boxed: SubscribeFn = Box::new(move |thread_id| Box::pin(handler(thread_id)));
        *self.subscribe_fn.write().await = Some(boxed);
    }

    /// Get a shutdown receiver.
    pub fn shutdown_receiver(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Get a shutdown sender (for handlers that need to trigger shutdown).
    pub fn shutdown_sender(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Trigger shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Start the server and listen for connections.
    pub async fn run(&self) -> IpcResult<()> {
        // Remove existing socket file
        let socket_path = Path::new(&self.socket_path);
        if socket_path.exists() {
            std::fs::remove_file(socket_path)?;
        }

        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(&self.socket_path)
            .map_err(|e| IpcError::Socket(format!("failed to bind {}: {e}", self.socket_path)))?;
        info!(path = %self.socket_path, "IPC server listening");

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let handlers = self.handlers.clone();
        let subscribe_fn = self.subscribe_fn.clone();

        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, _)) => {
                            let handlers = handlers.clone();
                            let subscribe_fn = subscribe_fn.clone();
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(stream, handlers, subscribe_fn).await {
                                    error!(error = %e, "Connection error");
                                }
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "Accept error");
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("IPC server shutting down");
                    break;
                }
            }
        }

        // Cleanup socket file
        let _ = std::fs::remove_file(&self.socket_path);

        Ok(())
    }
}

/// Handle a single client connection.
async fn handle_connection(
    stream: UnixStream,
    handlers: Arc<RwLock<HashMap<Method, HandlerFn>>>,
    subscribe_fn: Arc<RwLock<Option<SubscribeFn>>>,
) -> IpcResult<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    debug!("Client connected");

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).await?;

        if bytes_read == 0 {
            debug!("Client disconnected");
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let request = match Request::from_json(trimmed) {
            Ok(req) => req,
            Err(e) => {
                warn!(error = %e, "Failed to parse request");
                let response =
                    Response::error("", error_codes::PARSE_ERROR, &format!("parse error: {e}"));
                write_line(&mut writer, &response.to_json()?).await?;
                continue;
            }
        };

        let request_id = request.id.clone();
        let method = request.method.clone();

        // Handle streaming subscription
        if method == Method::ThreadSubscribe {
            let thread_id = request
                .params
                .as_ref()
                .and_then(|p| p.get("thread_id"))
                .and_then(|v| v.as_str())
                .map(String::from);

            let Some(thread_id) = thread_id else {
                let response = Response::error(
                    &request_id,
                    error_codes::INVALID_PARAMS,
                    "thread_id is required",
                );
                write_line(&mut writer, &response.to_json()?).await?;
                continue;
            };

            let feed = {
                let subscribe = subscribe_fn.read().await;
                match subscribe.as_ref() {
                    Some(f) => f(thread_id.clone()).await,
                    None => None,
                }
            };

            let Some(feed) = feed else {
                let response = Response::error(
                    &request_id,
                    error_codes::NOT_FOUND,
                    &format!("no such thread: {thread_id}"),
                );
                write_line(&mut writer, &response.to_json()?).await?;
                continue;
            };

            // Send success response first
            let response = Response::success(
                &request_id,
                serde_json::json!({
                    "subscribed": true,
                    "thread_id": thread_id,
                }),
            );
            write_line(&mut writer, &response.to_json()?).await?;

            // Enter streaming mode - this consumes the connection
            info!(thread_id = %thread_id, "Client subscribed, entering streaming mode");
            handle_streaming_subscription(reader, writer, feed).await?;
            return Ok(());
        }

        // Handle unsubscribe (no-op in request/response mode, handled in streaming)
        if method == Method::ThreadUnsubscribe {
            let response =
                Response::success(&request_id, serde_json::json!({ "unsubscribed": true }));
            write_line(&mut writer, &response.to_json()?).await?;
            continue;
        }

        // Normal request/response handling
        let response = {
            let handlers = handlers.read().await;
            if let Some(handler) = handlers.get(&method) {
                handler(request).await
            } else {
                Response::error(
                    &request_id,
                    error_codes::METHOD_NOT_FOUND,
                    &format!("method not found: {method:?}"),
                )
            }
        };

        let response_json = response.to_json()?;
        debug!(response = %response_json, "Sending response");
        write_line(&mut writer, &response_json).await?;
    }

    Ok(())
}

/// Handle streaming subscription mode.
///
/// The connection stays open and events are pushed to the client in
/// feed order. The client can send `thread.unsubscribe` to exit, or
/// close the connection.
async fn handle_streaming_subscription(
    mut reader: BufReader<tokio::net::unix::OwnedReadHalf>,
    mut writer: OwnedWriteHalf,
    mut feed: mpsc::Receiver<Event>,
) -> IpcResult<()> {
    let mut line = String::new();

    loop {
        tokio::select! {
            // Forward events to client
            event = feed.recv() => {
                match event {
                    Some(event) => {
                        match event.to_json() {
                            Ok(event_json) => {
                                if write_line(&mut writer, &event_json).await.is_err() {
                                    debug!("Failed to write event, client disconnected");
                                    break;
                                }
                            }
                            Err(e) => {
                                warn!(error = %e, "Failed to serialize event");
                            }
                        }
                    }
                    None => {
                        debug!("Event feed closed");
                        break;
                    }
                }
            }

            // Handle client commands (unsubscribe or disconnect)
            read_result = reader.read_line(&mut line) => {
                match read_result {
                    Ok(0) => {
                        debug!("Client disconnected from subscription");
                        break;
                    }
                    Ok(_) => {
                        let trimmed = line.trim();
                        if !trimmed.is_empty() {
                            if let Ok(request) = Request::from_json(trimmed) {
                                if request.method == Method::ThreadUnsubscribe {
                                    debug!("Client unsubscribed");
                                    let response = Response::success(&request.id, serde_json::json!({
                                        "unsubscribed": true,
                                    }));
                                    if let Ok(json) = response.to_json() {
                                        let _ = write_line(&mut writer, &json).await;
                                    }
                                    break;
                                }
                            }
                        }
                        line.clear();
                    }
                    Err(e) => {
                        debug!(error = %e, "Read error in subscription");
                        break;
                    }
                }
            }
        }
    }

    // Dropping the feed receiver tears down the daemon-side bridge.
    info!("Streaming subscription ended");
    Ok(())
}

async fn write_line(writer: &mut OwnedWriteHalf, json: &str) -> IpcResult<()> {
    writer.write_all(json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

/// IPC client for connecting to the daemon.
pub struct IpcClient {
    socket_path: String,
}

impl IpcClient {
    /// Create a new IPC client.
    pub fn new(socket_path: &str) -> Self {
        Self {
            socket_path: socket_path.to_string(),
        }
    }

    /// Send a request and wait for the response.
    pub async fn call(&self, request: Request) -> IpcResult<Response> {
        let stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(|e| IpcError::Socket(format!("failed to connect: {e}")))?;

        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);

        let request_json = request.to_json()?;
        writer.write_all(request_json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;

        let mut line = String::new();
        reader.read_line(&mut line).await?;

        if line.is_empty() {
            return Err(IpcError::ConnectionClosed);
        }

        Response::from_json(line.trim()).map_err(Into::into)
    }

    /// Send a method call with no parameters.
    pub async fn call_method(&self, method: Method) -> IpcResult<Response> {
        self.call(Request::new(method)).await
    }

    /// Send a method call with parameters.
    pub async fn call_method_with_params(
        &self,
        method: Method,
        params: serde_json::Value,
    ) -> IpcResult<Response> {
        self.call(Request::with_params(method, params)).await
    }

    /// Check if the daemon is running.
    pub async fn is_daemon_running(&self) -> bool {
        self.call_method(Method::Health).await.is_ok()
    }
}
