// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # HTTP/JSON Gateway
//!
//! Declarative translation of HTTP requests into `TodoService` calls. Each RPC
//! is reachable at exactly one route:
//!
//! | RPC | Route |
//! |-----|-------|
//! | `CreateTodo` | `POST /v1/todos` |
//! | `ListTodos` | `GET /v1/todos` |
//! | `UpdateTodo` | `PUT /v1/todos/{id}` |
//! | `DeleteTodo` | `DELETE /v1/todos/{id}` |
//!
//! Anything else falls through to the router's default 404.
//!
//! Two hooks run for every request that reaches the gateway: the metadata
//! annotator (request parts → outgoing call metadata) and the response
//! modifier (final response shaping). Both are plain function values.
//!
//! Metadata the backend returns with a reply is written back as
//! `Grpc-Metadata-<key>` headers.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Request, State},
    http::{header, request::Parts, HeaderName, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, put},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::application::todo_service::{
    CallMetadata, Reply, TodoService, TodoServiceError, IDENTITY_ID_KEY, REQUEST_ID_KEY,
    SESSION_ID_KEY,
};
use crate::domain::identity::Session;
use crate::domain::todo::{Todo, TodoDraft, TodoId};
use crate::presentation::grpc::server::{status_from_error, DELETE_SUCCESS};

/// Prefix for backend response metadata forwarded as HTTP headers
pub const METADATA_HEADER_PREFIX: &str = "grpc-metadata-";

/// Builds the outgoing call metadata from the inbound request
pub type MetadataAnnotator = Arc<dyn Fn(&Parts) -> CallMetadata + Send + Sync>;

/// Shapes every response before it is written
pub type ResponseModifier = Arc<dyn Fn(&mut Response) + Send + Sync>;

#[derive(Clone)]
pub struct GatewayHooks {
    pub metadata_annotator: MetadataAnnotator,
    pub response_modifier: ResponseModifier,
}

impl Default for GatewayHooks {
    fn default() -> Self {
        Self {
            metadata_annotator: Arc::new(default_metadata_annotator),
            response_modifier: Arc::new(default_response_modifier),
        }
    }
}

/// Copies the authenticated identity and a request id into call metadata.
pub fn default_metadata_annotator(parts: &Parts) -> CallMetadata {
    let mut metadata = CallMetadata::new();

    if let Some(session) = parts.extensions.get::<Session>() {
        metadata.insert(IDENTITY_ID_KEY, session.identity.id.clone());
        metadata.insert(SESSION_ID_KEY, session.id.clone());
    }

    let request_id = parts
        .headers
        .get(REQUEST_ID_KEY)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    metadata.insert(REQUEST_ID_KEY, request_id);

    metadata
}

/// Strips internal `grpc-*` headers (forwarded metadata stays) and disables caching.
pub fn default_response_modifier(response: &mut Response) {
    let headers = response.headers_mut();
    let internal: Vec<HeaderName> = headers
        .keys()
        .filter(|name| {
            let name = name.as_str();
            name.starts_with("grpc-") && !name.starts_with(METADATA_HEADER_PREFIX)
        })
        .cloned()
        .collect();
    for name in internal {
        headers.remove(name);
    }
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
}

pub struct AppState {
    pub todo_service: Arc<dyn TodoService>,
}

/// Gateway router over any `TodoService` backend
pub fn app(todo_service: Arc<dyn TodoService>, hooks: GatewayHooks) -> Router {
    let state = Arc::new(AppState { todo_service });

    Router::new()
        .route("/v1/todos", get(list_todos).post(create_todo))
        .route("/v1/todos/{id}", put(update_todo).delete(delete_todo))
        .with_state(state)
        .layer(middleware::from_fn_with_state(hooks, apply_hooks))
}

async fn apply_hooks(
    State(hooks): State<GatewayHooks>,
    request: Request,
    next: Next,
) -> Response {
    let (parts, body) = request.into_parts();
    let metadata = (hooks.metadata_annotator)(&parts);
    let mut request = Request::from_parts(parts, body);
    request.extensions_mut().insert(metadata);

    let mut response = next.run(request).await;
    (hooks.response_modifier)(&mut response);
    response
}

// ============================================================================
// Wire shapes (protojson style: camelCase, RFC 3339 timestamps)
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TodoPayload {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub completed: bool,
    // Accepted so clients can send a fetched todo back; the store owns these
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl TodoPayload {
    fn into_draft(self) -> TodoDraft {
        TodoDraft {
            title: self.title,
            completed: self.completed,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TodoView {
    pub id: String,
    pub title: String,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Todo> for TodoView {
    fn from(todo: Todo) -> Self {
        Self {
            id: todo.id.to_string(),
            title: todo.title,
            completed: todo.completed,
            created_at: todo.created_at,
            updated_at: todo.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct TodoListView {
    pub todos: Vec<TodoView>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct DeleteView {
    pub status: String,
}

/// Error envelope, same shape grpc-gateway writes
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    pub code: i32,
    pub message: String,
    #[serde(default)]
    pub details: Vec<serde_json::Value>,
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("malformed request body: {0}")]
    Decode(String),

    #[error("invalid todo id '{0}'")]
    InvalidId(String),

    #[error(transparent)]
    Service(#[from] TodoServiceError),
}

impl GatewayError {
    fn into_status(self) -> tonic::Status {
        match self {
            GatewayError::Decode(_) | GatewayError::InvalidId(_) => {
                tonic::Status::invalid_argument(self.to_string())
            }
            GatewayError::Service(err) => status_from_error(err),
        }
    }
}

/// HTTP status for a gRPC code, following grpc-gateway's table
pub fn http_status_from_code(code: tonic::Code) -> StatusCode {
    use tonic::Code;
    match code {
        Code::Ok => StatusCode::OK,
        Code::Cancelled => StatusCode::from_u16(499).unwrap_or(StatusCode::BAD_REQUEST),
        Code::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
        Code::InvalidArgument => StatusCode::BAD_REQUEST,
        Code::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        Code::NotFound => StatusCode::NOT_FOUND,
        Code::AlreadyExists => StatusCode::CONFLICT,
        Code::PermissionDenied => StatusCode::FORBIDDEN,
        Code::Unauthenticated => StatusCode::UNAUTHORIZED,
        Code::ResourceExhausted => StatusCode::TOO_MANY_REQUESTS,
        Code::FailedPrecondition => StatusCode::BAD_REQUEST,
        Code::Aborted => StatusCode::CONFLICT,
        Code::OutOfRange => StatusCode::BAD_REQUEST,
        Code::Unimplemented => StatusCode::NOT_IMPLEMENTED,
        Code::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        Code::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        Code::DataLoss => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.into_status();
        let http_status = http_status_from_code(status.code());

        let (code, message) = (status.code(), status.message());
        if http_status.is_server_error() {
            error!(?code, message, "Gateway call failed");
        } else {
            warn!(?code, message, "Gateway call rejected");
        }

        let body = ErrorBody {
            code: status.code() as i32,
            message: status.message().to_string(),
            details: vec![],
        };
        (http_status, Json(body)).into_response()
    }
}

// ============================================================================
// Handlers
// ============================================================================

fn decode(body: &Bytes) -> Result<TodoPayload, GatewayError> {
    serde_json::from_slice(body).map_err(|e| GatewayError::Decode(e.to_string()))
}

fn parse_id(raw: &str) -> Result<TodoId, GatewayError> {
    TodoId::from_string(raw).map_err(|_| GatewayError::InvalidId(raw.to_string()))
}

/// JSON body from the reply value, reply metadata as `Grpc-Metadata-*` headers
fn respond<T, V: Serialize>(reply: Reply<T>, view: impl FnOnce(T) -> V) -> Response {
    let mut response = Json(view(reply.value)).into_response();
    let headers = response.headers_mut();

    for (key, value) in reply.metadata.iter() {
        let name = HeaderName::from_bytes(format!("{METADATA_HEADER_PREFIX}{key}").as_bytes());
        match (name, HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => warn!(key, "Dropping response metadata that is not a valid HTTP header"),
        }
    }

    response
}

async fn create_todo(
    State(state): State<Arc<AppState>>,
    Extension(metadata): Extension<CallMetadata>,
    body: Bytes,
) -> Result<Response, GatewayError> {
    let payload = decode(&body)?;
    let reply = state
        .todo_service
        .create_todo(&metadata, payload.into_draft())
        .await?;
    Ok(respond(reply, TodoView::from))
}

async fn list_todos(
    State(state): State<Arc<AppState>>,
    Extension(metadata): Extension<CallMetadata>,
) -> Result<Response, GatewayError> {
    let reply = state.todo_service.list_todos(&metadata).await?;
    Ok(respond(reply, |todos| TodoListView {
        todos: todos.into_iter().map(Into::into).collect(),
    }))
}

async fn update_todo(
    State(state): State<Arc<AppState>>,
    Extension(metadata): Extension<CallMetadata>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Response, GatewayError> {
    let id = parse_id(&id)?;
    let payload = decode(&body)?;
    let reply = state
        .todo_service
        .update_todo(&metadata, id, payload.into_draft())
        .await?;
    Ok(respond(reply, TodoView::from))
}

async fn delete_todo(
    State(state): State<Arc<AppState>>,
    Extension(metadata): Extension<CallMetadata>,
    Path(id): Path<String>,
) -> Result<Response, GatewayError> {
    let id = parse_id(&id)?;
    let reply = state.todo_service.delete_todo(&metadata, id).await?;
    Ok(respond(reply, |()| DeleteView {
        status: DELETE_SUCCESS.to_string(),
    }))
}
