//! MCP-compatible HTTP server.
//!
//! Exposes the work item tools via a JSON HTTP API suitable for integration
//! with Cursor, Claude, and other MCP-compatible AI tools, plus a proper
//! MCP Streamable HTTP endpoint mounted at `/mcp`.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/tools/list` | List all registered tools with schemas |
//! | `POST` | `/tools/{name}` | Call any registered tool by name |
//! | `GET`  | `/health` | Health check (returns version) |
//! | `*`    | `/mcp` | MCP Streamable HTTP (JSON-RPC) endpoint |
//!
//! # Error Contract
//!
//! Transport-level errors (unknown tool, malformed request body) return:
//!
//! ```json
//! { "error": { "code": "not_found", "message": "no tool registered with name: x" } }
//! ```
//!
//! Tool-level failures — upstream tracker errors, bad parameters — never
//! surface as HTTP errors: the call returns `200` with a tagged result
//! (`isError` plus the upstream status and body rendered as text), so agent
//! clients always receive presentable content.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! clients and cross-origin MCP tool calls.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use rmcp::transport::streamable_http_server::{
    session::local::LocalSessionManager, StreamableHttpServerConfig, StreamableHttpService,
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::gateway::Gateway;
use crate::mcp::McpBridge;
use crate::notify::Notifier;
use crate::tools::{ToolContext, ToolRegistry};

/// Shared application state passed to all route handlers via Axum's `State`
/// extractor.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    gateway: Arc<Gateway>,
    notifier: Arc<dyn Notifier>,
    tools: Arc<ToolRegistry>,
}

/// Starts the HTTP server with the built-in tools.
///
/// Binds to the address configured in `[server].bind` and registers all
/// route handlers. The server runs indefinitely until the process is
/// terminated.
pub async fn run_server(config: &Config, notifier: Arc<dyn Notifier>) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let config = Arc::new(config.clone());
    let gateway = Arc::new(Gateway::new(&config)?);
    let tools = Arc::new(ToolRegistry::with_builtins());

    let state = AppState {
        config: config.clone(),
        gateway: gateway.clone(),
        notifier: notifier.clone(),
        tools: tools.clone(),
    };

    let bridge = McpBridge::new(config, gateway, notifier.clone(), tools);
    let session_manager: Arc<LocalSessionManager> = Default::default();
    let mcp_service = StreamableHttpService::new(
        move || Ok(bridge.clone()),
        session_manager,
        StreamableHttpServerConfig::default(),
    );

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/tools/list", get(handle_list_tools))
        .route("/tools/{name}", post(handle_tool_call))
        .route("/health", get(handle_health))
        .nest_service("/mcp", mcp_service)
        .layer(cors)
        .with_state(state);

    notifier.info(&format!("listening on http://{}", bind_addr));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

/// JSON error response body for transport-level failures.
#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"bad_request"`, `"not_found"`).
    code: String,
    /// Human-readable error message.
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /tools/list ============

#[derive(Serialize)]
struct ToolInfo {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Serialize)]
struct ToolListResponse {
    tools: Vec<ToolInfo>,
}

/// Handler for `GET /tools/list`.
///
/// Returns all registered tools with their function-calling parameter
/// schemas.
async fn handle_list_tools(State(state): State<AppState>) -> Json<ToolListResponse> {
    let tools = state
        .tools
        .tools()
        .iter()
        .map(|t| ToolInfo {
            name: t.name().to_string(),
            description: t.description().to_string(),
            parameters: t.parameters_schema(),
        })
        .collect();
    Json(ToolListResponse { tools })
}

// ============ POST /tools/{name} ============

/// Handler for `POST /tools/{name}`.
///
/// Unified tool dispatch. Looks up the tool by name and executes it with
/// the request body as parameters. Returns `404` for an unknown tool and
/// `400` when the body is not a JSON object; everything else — including
/// upstream tracker failures — comes back as a `200` tagged result.
async fn handle_tool_call(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(params): Json<Value>,
) -> Result<Json<Value>, AppError> {
    let tool = state
        .tools
        .find(&name)
        .ok_or_else(|| not_found(format!("no tool registered with name: {}", name)))?;

    if !params.is_object() {
        return Err(bad_request("parameters must be a JSON object"));
    }

    let ctx = ToolContext::new(
        state.config.clone(),
        state.gateway.clone(),
        state.notifier.clone(),
    );
    let result = tool.execute(params, &ctx).await;

    Ok(Json(result.to_value()))
}
