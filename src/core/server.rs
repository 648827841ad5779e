//! MCP Server Implementation
//!
//! This module contains the request dispatcher shared by both transports and
//! the transports themselves:
//! - `McpService` routes MCP methods to the tool registry and resource providers
//! - HTTP server setup with Actix Web (JSON-RPC over POST, SSE notifications)
//! - STDIO server for line-based communication

use actix_web::{
    App, HttpResponse, HttpServer, Result, web,
    middleware::{Compress, DefaultHeaders, Logger},
};
use bytes::Bytes;
use serde_json::{Value, json};
use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast::error::RecvError;

use crate::core::notify::Notifier;
use crate::core::protocol::{
    MCPNotification, MCPRequest, MCPResource, MCPResponse, PROTOCOL_VERSION, ResourceContents, codes,
    text_result,
};
use crate::core::registry::{ToolContext, ToolRegistry};

/// Server metadata reported in `initialize` responses and the health check.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Server name as reported in MCP initialize responses
    pub server_name: String,
    /// Server version string as reported in MCP initialize responses
    pub server_version: String,
}

/// Source of readable resources (`resources/list`, `resources/read`).
pub trait ResourceProvider: Send + Sync {
    fn list_resources(&self) -> Vec<MCPResource>;

    /// Returns None when the URI does not belong to this provider.
    fn read_resource(&self, uri: &str) -> Option<ResourceContents>;
}

/// Transport-independent MCP request dispatcher.
#[derive(Clone)]
pub struct McpService {
    state: AppState,
    registry: Arc<ToolRegistry>,
    resources: Arc<Vec<Arc<dyn ResourceProvider>>>,
    notifier: Notifier,
}

impl McpService {
    pub fn new(
        state: AppState,
        registry: Arc<ToolRegistry>,
        resources: Vec<Arc<dyn ResourceProvider>>,
        notifier: Notifier,
    ) -> Self {
        Self {
            state,
            registry,
            resources: Arc::new(resources),
            notifier,
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Handle one JSON-RPC message.
    ///
    /// Routes the request to the matching MCP method. Client notifications
    /// (requests without an `id`) are accepted silently.
    ///
    /// # Arguments
    /// * `req` - Parsed JSON-RPC request from either transport
    ///
    /// # Returns
    /// The response to send back, or `None` for a notification.
    pub async fn handle(&self, req: MCPRequest) -> Option<MCPResponse> {
        if req.is_notification() {
            tracing::debug!(method = %req.method, "client notification");
            return None;
        }

        let id = req.id.clone();
        let response = match req.method.as_str() {
            "initialize" => self.handle_initialize(id),
            "ping" => MCPResponse::success(id, json!({})),
            "tools/list" => self.handle_tools_list(id),
            "tools/call" => self.handle_tools_call(id, req.params).await,
            "resources/list" => self.handle_resources_list(id),
            "resources/read" => self.handle_resources_read(id, req.params),
            _ => {
                tracing::debug!(method = %req.method, "method not found");
                MCPResponse::failure(
                    id,
                    codes::METHOD_NOT_FOUND,
                    format!("Method not found: {}", req.method),
                )
            }
        };
        Some(response)
    }

    fn handle_initialize(&self, id: Option<Value>) -> MCPResponse {
        let mut capabilities = json!({
            "tools": { "listChanged": true }
        });
        if !self.resources.is_empty() {
            capabilities["resources"] = json!({ "listChanged": true });
        }
        MCPResponse::success(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": capabilities,
                "serverInfo": {
                    "name": self.state.server_name,
                    "version": self.state.server_version
                }
            }),
        )
    }

    fn handle_tools_list(&self, id: Option<Value>) -> MCPResponse {
        MCPResponse::success(id, json!({ "tools": self.registry.list() }))
    }

    /// Execute a tool. Handler failures and unknown tools come back as
    /// ordinary text results; only a missing `params` object is a protocol error.
    async fn handle_tools_call(&self, id: Option<Value>, params: Option<Value>) -> MCPResponse {
        let Some(tool_params) = params else {
            return MCPResponse::failure(id, codes::INVALID_PARAMS, "Invalid params");
        };

        let tool_name = tool_params
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        let arguments = tool_params
            .get("arguments")
            .filter(|v| !v.is_null())
            .cloned()
            .unwrap_or_else(|| json!({}));
        let progress_token = tool_params
            .get("_meta")
            .and_then(|m| m.get("progressToken"))
            .cloned()
            .or_else(|| id.clone());

        let Some(handler) = self.registry.handler(tool_name) else {
            tracing::warn!(tool = tool_name, "unknown tool");
            return MCPResponse::success(id, text_result(format!("Unknown tool: {tool_name}"), false));
        };

        tracing::info!(tool = tool_name, "tool call");
        let ctx = ToolContext::new(self.notifier.clone(), progress_token);
        let text = match handler(arguments, ctx).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(tool = tool_name, error = %e, "tool failed");
                format!("Error: {e}")
            }
        };
        MCPResponse::success(id, text_result(text, false))
    }

    fn handle_resources_list(&self, id: Option<Value>) -> MCPResponse {
        let resources: Vec<MCPResource> = self
            .resources
            .iter()
            .flat_map(|p| p.list_resources())
            .collect();
        MCPResponse::success(id, json!({ "resources": resources }))
    }

    fn handle_resources_read(&self, id: Option<Value>, params: Option<Value>) -> MCPResponse {
        let Some(uri) = params
            .as_ref()
            .and_then(|p| p.get("uri"))
            .and_then(|v| v.as_str())
        else {
            return MCPResponse::failure(id, codes::INVALID_PARAMS, "Missing required parameter: uri");
        };

        match self.resources.iter().find_map(|p| p.read_resource(uri)) {
            Some(contents) => MCPResponse::success(id, json!({ "contents": [contents] })),
            None => MCPResponse::failure(id, codes::INVALID_PARAMS, format!("Unknown resource: {uri}")),
        }
    }

    /// Tool list rendered for the SSE discovery event.
    fn tools_event(&self) -> String {
        let tools = self.registry.list();
        let data = json!({
            "count": tools.len(),
            "tools": tools,
        });
        format!("data: {data}\n\n")
    }
}

/// Parse and handle one STDIO line.
///
/// # Arguments
/// * `service` - Dispatcher shared with the HTTP transport
/// * `line` - Raw line read from stdin
///
/// # Returns
/// The serialized response, or `None` for blank lines, notifications and
/// unparseable input whose `id` cannot be recovered.
pub async fn process_line(service: &McpService, line: &str) -> Option<String> {
    if line.trim().is_empty() {
        return None;
    }

    let response = match serde_json::from_str::<MCPRequest>(line) {
        Ok(req) => service.handle(req).await?,
        Err(e) => {
            tracing::warn!(error = %e, "parse error");
            // Only answer when the id can be recovered from the raw JSON
            let partial = serde_json::from_str::<Value>(line).ok()?;
            let id = partial.get("id")?.clone();
            MCPResponse::failure(Some(id), codes::PARSE_ERROR, format!("Parse error: {e}"))
        }
    };

    match serde_json::to_string(&response) {
        Ok(json) => Some(json),
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize response");
            None
        }
    }
}

/// Health check endpoint handler.
async fn health(service: web::Data<McpService>) -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(json!({
        "status": "ok",
        "service": service.state().server_name
    })))
}

/// MCP JSON-RPC request handler with metrics tracking.
async fn mcp_handler(
    service: web::Data<McpService>,
    counter: web::Data<AtomicU64>,
    req: web::Json<MCPRequest>,
) -> Result<HttpResponse> {
    // Relaxed: only atomicity is needed for the counter
    counter.fetch_add(1, Ordering::Relaxed);

    match service.handle(req.into_inner()).await {
        Some(response) => Ok(HttpResponse::Ok().json(response)),
        None => Ok(HttpResponse::Accepted().finish()),
    }
}

/// Metrics endpoint handler for monitoring.
async fn metrics_handler(counter: web::Data<AtomicU64>) -> Result<HttpResponse> {
    let count = counter.load(Ordering::Relaxed);
    Ok(HttpResponse::Ok().json(json!({
        "requests_total": count,
        "status": "ok"
    })))
}

fn sse_event(notification: &MCPNotification) -> Option<Bytes> {
    match serde_json::to_string(notification) {
        Ok(json) => Some(Bytes::from(format!("data: {json}\n\n"))),
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize notification");
            None
        }
    }
}

/// Server-Sent Events endpoint.
///
/// Emits the current tool list as the first event, then every server
/// notification (list changes, progress) as it is published.
async fn sse_stream(service: web::Data<McpService>) -> Result<HttpResponse> {
    use actix_web::http::header;
    use futures_util::StreamExt;
    use futures_util::stream;

    let initial = Bytes::from(service.tools_event());
    let rx = service.notifier().subscribe();

    let updates = stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(notification) => {
                    if let Some(event) = sse_event(&notification) {
                        return Some((Ok::<_, Infallible>(event), rx));
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "sse subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });
    let body = stream::once(async move { Ok::<_, Infallible>(initial) }).chain(updates);

    Ok(HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(header::CacheControl(vec![
            header::CacheDirective::NoCache,
            header::CacheDirective::NoStore,
            header::CacheDirective::MustRevalidate,
        ]))
        // Disable nginx buffering for real-time streaming
        .insert_header(("x-accel-buffering", "no"))
        .streaming(body))
}

/// Route table shared by the HTTP server and its tests.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/metrics", web::get().to(metrics_handler))
        .route("/sse", web::get().to(sse_stream))
        .route("/mcp", web::post().to(mcp_handler))
        .route("/", web::post().to(mcp_handler))
        .route("/", web::get().to(health));
}

/// Run the MCP server in HTTP mode.
///
/// Serves JSON-RPC on `POST /mcp` and `POST /`, plus `/health`, `/metrics`
/// and the `/sse` notification stream.
///
/// # Arguments
/// * `service` - Request dispatcher with the registered tools
/// * `host` - Bind address (e.g., "0.0.0.0" for all interfaces)
/// * `port` - Port number to listen on
/// * `workers` - Worker threads; defaults to the CPU count capped at 16
///
/// # Returns
/// Resolves when the server shuts down; binding failures are returned as errors.
pub async fn run_server_http(
    service: McpService,
    host: String,
    port: u16,
    workers: Option<usize>,
) -> std::io::Result<()> {
    use std::time::Duration;

    let bind_addr = format!("{}:{}", host, port);
    let service = web::Data::new(service);
    let request_count = web::Data::new(AtomicU64::new(0));
    let workers = workers.unwrap_or_else(|| num_cpus::get().clamp(1, 16));

    tracing::info!(
        name = %service.state().server_name,
        version = %service.state().server_version,
        bind = %bind_addr,
        workers,
        tools = service.registry().len(),
        "MCP server starting (HTTP mode)"
    );

    HttpServer::new(move || {
        App::new()
            .app_data(service.clone())
            .app_data(request_count.clone())
            // Enable compression for JSON responses (gzip/brotli)
            .wrap(Compress::default())
            .wrap(
                DefaultHeaders::new()
                    .add(("X-Content-Type-Options", "nosniff"))
                    .add(("X-Frame-Options", "DENY"))
                    .add(("X-XSS-Protection", "1; mode=block")),
            )
            // %r = request line, %s = status, %Dms = duration in milliseconds
            .wrap(Logger::new("%r %s %Dms"))
            .configure(configure_routes)
    })
    .workers(workers)
    .max_connections(10000)
    .max_connection_rate(1000)
    .keep_alive(Duration::from_secs(30))
    .client_request_timeout(Duration::from_secs(30))
    .client_disconnect_timeout(Duration::from_secs(2))
    .shutdown_timeout(10)
    .bind(&bind_addr)?
    .run()
    .await
}

/// Run the MCP server in STDIO mode.
///
/// Requests are read line by line from stdin and handled one at a time.
/// Responses and server notifications share a single writer task so that
/// progress notifications reach the client while a tool is still running.
/// All logging goes to stderr.
///
/// # Arguments
/// * `service` - Request dispatcher with the registered tools
///
/// # Returns
/// Resolves once stdin is closed and all pending output is flushed.
pub async fn run_server_stdio(service: McpService) -> std::io::Result<()> {
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
    use tokio::sync::mpsc;

    tracing::info!(
        name = %service.state().server_name,
        version = %service.state().server_version,
        tools = service.registry().len(),
        "MCP server starting (STDIO mode)"
    );

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();

    let writer = tokio::spawn(async move {
        let mut stdout = BufWriter::with_capacity(8192, tokio::io::stdout());
        while let Some(line) = out_rx.recv().await {
            stdout.write_all(line.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            // Flush after each message for low latency
            stdout.flush().await?;
        }
        Ok::<_, std::io::Error>(())
    });

    let mut notifications = service.notifier().subscribe();
    let notify_tx = out_tx.clone();
    let forwarder = tokio::spawn(async move {
        loop {
            match notifications.recv().await {
                Ok(notification) => match serde_json::to_string(&notification) {
                    Ok(line) => {
                        if notify_tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::error!(error = %e, "failed to serialize notification"),
                },
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "stdio notification stream lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut stdin = BufReader::with_capacity(8192, tokio::io::stdin()).lines();
    while let Some(line) = stdin.next_line().await? {
        if let Some(response) = process_line(&service, &line).await {
            if out_tx.send(response).is_err() {
                tracing::error!("stdout writer stopped");
                break;
            }
        }
    }

    tracing::info!("stdin closed, shutting down");
    forwarder.abort();
    drop(out_tx);
    match writer.await {
        Ok(result) => result,
        Err(e) => Err(std::io::Error::other(e)),
    }
}
