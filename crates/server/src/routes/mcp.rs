//! Stateless MCP over JSON-RPC: one request per POST, one JSON response.

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::{Value, json};

use mcpgate_api::mcp::{
    self, INVALID_PARAMS, INVALID_REQUEST, JSONRPC_VERSION, JsonRpcRequest, JsonRpcResponse,
    METHOD_NOT_FOUND, PARSE_ERROR, ToolDescriptor,
};

use super::auth::AuthUser;
use crate::AppConfig;
use crate::context;
use crate::error::ApiErr;

/// POST /mcp — dispatch one JSON-RPC message.
pub async fn handle(
    State(config): State<AppConfig>,
    AuthUser(user): AuthUser,
    body: Bytes,
) -> Response {
    let request: JsonRpcRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            let code = if serde_json::from_slice::<Value>(&body).is_ok() {
                INVALID_REQUEST
            } else {
                PARSE_ERROR
            };
            return Json(JsonRpcResponse::error(Value::Null, code, e.to_string())).into_response();
        }
    };

    if request.jsonrpc != JSONRPC_VERSION {
        let id = request.id.unwrap_or(Value::Null);
        return Json(JsonRpcResponse::error(id, INVALID_REQUEST, "jsonrpc must be \"2.0\""))
            .into_response();
    }

    tracing::debug!(method = %request.method, user_id = %user.id, "MCP request");

    if request.is_notification() {
        return StatusCode::ACCEPTED.into_response();
    }

    Json(dispatch(&config, request)).into_response()
}

/// GET /mcp — no server-initiated stream is offered.
pub async fn no_stream() -> Response {
    let mut response = ApiErr::method_not_allowed("use POST for MCP requests").into_response();
    response
        .headers_mut()
        .insert(header::ALLOW, HeaderValue::from_static("POST"));
    response
}

/// Anything under `/mcp/` other than the endpoint itself.
pub async fn not_found() -> ApiErr {
    ApiErr::not_found("not found")
}

fn dispatch(config: &AppConfig, request: JsonRpcRequest) -> JsonRpcResponse {
    let id = request.id.unwrap_or(Value::Null);
    match request.method.as_str() {
        "initialize" => {
            let requested = request
                .params
                .get("protocolVersion")
                .and_then(Value::as_str);
            JsonRpcResponse::success(
                id,
                json!({
                    "protocolVersion": mcp::negotiate_protocol_version(requested),
                    "capabilities": { "tools": { "listChanged": false } },
                    "serverInfo": { "name": config.app_name, "version": config.app_version },
                }),
            )
        }
        "ping" => JsonRpcResponse::success(id, json!({})),
        "tools/list" => JsonRpcResponse::success(id, json!({ "tools": tool_descriptors() })),
        "tools/call" => match call_tool(config, request.params) {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(message) => JsonRpcResponse::error(id, INVALID_PARAMS, message),
        },
        other => JsonRpcResponse::error(id, METHOD_NOT_FOUND, format!("Method not found: {other}")),
    }
}

// ── Tools ───────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ToolCall {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Deserialize)]
struct SayHelloArgs {
    name: String,
}

fn tool_descriptors() -> Vec<ToolDescriptor> {
    let no_args = json!({ "type": "object", "properties": {} });
    vec![
        ToolDescriptor {
            name: "sayHello".into(),
            title: "Say Hello".into(),
            description: "Greets the user politely.".into(),
            input_schema: json!({
                "type": "object",
                "properties": { "name": { "type": "string" } },
                "required": ["name"],
            }),
        },
        ToolDescriptor {
            name: "healthCheck".into(),
            title: "System Health Check".into(),
            description: "Reports the server status.".into(),
            input_schema: no_args.clone(),
        },
        ToolDescriptor {
            name: "whoami".into(),
            title: "Who Am I".into(),
            description: "Reports the authenticated caller.".into(),
            input_schema: no_args,
        },
    ]
}

/// `Err` is a protocol-level failure (unknown tool, bad arguments).
fn call_tool(config: &AppConfig, params: Value) -> Result<Value, String> {
    let call: ToolCall =
        serde_json::from_value(params).map_err(|e| format!("invalid tools/call params: {e}"))?;

    match call.name.as_str() {
        "sayHello" => {
            let args: SayHelloArgs = serde_json::from_value(call.arguments)
                .map_err(|e| format!("invalid sayHello arguments: {e}"))?;
            Ok(mcp::text_result(
                format!("Hello {}! This response comes from {}.", args.name, config.app_name),
                false,
            ))
        }
        "healthCheck" => Ok(mcp::text_result("MCP server operational.", false)),
        "whoami" => Ok(match context::current_user() {
            Some(user) => mcp::text_result(format!("Authenticated as {}.", user.email), false),
            None => {
                tracing::warn!("whoami invoked without authenticated context");
                mcp::text_result("Unauthorized", true)
            }
        }),
        other => Err(format!("Unknown tool: {other}")),
    }
}
