// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! gRPC Server Implementation for the todolist API
//! Exposes CreateTodo, ListTodos, UpdateTodo, DeleteTodo

use std::future::Future;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::metadata::{Ascii, KeyAndValueRef, MetadataKey, MetadataMap, MetadataValue};
use tonic::{Request, Response, Status};
use tracing::{debug, info, warn};

use crate::application::todo_service::{CallMetadata, Reply, TodoService, TodoServiceError};
use crate::domain::repository::RepositoryError;
use crate::infrastructure::todolist_proto::pb::todolist_api_service_server::{
    TodolistApiService, TodolistApiServiceServer,
};
use crate::infrastructure::todolist_proto::pb::{DeleteResponse, Todo, TodoListResponse};
use crate::infrastructure::todolist_proto::{
    draft_from_proto, todo_id_from_proto, ConversionError,
};

/// Status string returned by a successful DeleteTodo
pub const DELETE_SUCCESS: &str = "success";

/// Implementation of the TodolistAPIService gRPC service
pub struct TodolistGrpcService {
    todo_service: Arc<dyn TodoService>,
}

impl TodolistGrpcService {
    pub fn new(todo_service: Arc<dyn TodoService>) -> Self {
        Self { todo_service }
    }

    /// Create a gRPC server instance
    pub fn into_server(self) -> TodolistApiServiceServer<Self> {
        TodolistApiServiceServer::new(self)
    }
}

/// Header names owned by the HTTP/2 transport; never treated as call metadata
pub fn is_reserved_metadata_key(key: &str) -> bool {
    key.starts_with("grpc-")
        || key.starts_with(':')
        || matches!(key, "content-type" | "date" | "te" | "user-agent")
}

/// Lift printable ASCII metadata entries into a `CallMetadata`
pub fn call_metadata_from(metadata: &MetadataMap) -> CallMetadata {
    metadata
        .iter()
        .filter_map(|entry| match entry {
            KeyAndValueRef::Ascii(key, value) => value
                .to_str()
                .ok()
                .map(|v| (key.as_str().to_string(), v.to_string())),
            KeyAndValueRef::Binary(_, _) => None,
        })
        .filter(|(key, _)| !is_reserved_metadata_key(key))
        .collect()
}

/// Copy call metadata onto the wire, dropping entries gRPC cannot carry
pub fn write_metadata(target: &mut MetadataMap, metadata: &CallMetadata) {
    for (key, value) in metadata.iter() {
        let parsed_key = key.parse::<MetadataKey<Ascii>>();
        let parsed_value = value.parse::<MetadataValue<Ascii>>();
        match (parsed_key, parsed_value) {
            (Ok(k), Ok(v)) => {
                target.insert(k, v);
            }
            _ => warn!(key, "Dropping metadata entry that is not valid gRPC ASCII metadata"),
        }
    }
}

fn reply_to_response<T, M>(reply: Reply<T>, into_message: impl FnOnce(T) -> M) -> Response<M> {
    let mut response = Response::new(into_message(reply.value));
    write_metadata(response.metadata_mut(), &reply.metadata);
    response
}

/// Map service failures onto gRPC status codes. Store messages travel verbatim.
pub fn status_from_error(err: TodoServiceError) -> Status {
    match err {
        TodoServiceError::Store(RepositoryError::NotFound(msg)) => Status::not_found(msg),
        TodoServiceError::Store(other) => Status::internal(other.to_string()),
        TodoServiceError::InvalidArgument(msg) => Status::invalid_argument(msg),
        TodoServiceError::Rpc(status) => status,
    }
}

fn invalid_id(err: ConversionError) -> Status {
    Status::invalid_argument(err.to_string())
}

fn record(method: &'static str) {
    metrics::counter!("todolist_rpc_requests_total", "method" => method).increment(1);
}

#[tonic::async_trait]
impl TodolistApiService for TodolistGrpcService {
    async fn create_todo(&self, request: Request<Todo>) -> Result<Response<Todo>, Status> {
        record("CreateTodo");
        let metadata = call_metadata_from(request.metadata());
        let draft = draft_from_proto(request.get_ref());

        let reply = self
            .todo_service
            .create_todo(&metadata, draft)
            .await
            .map_err(status_from_error)?;

        Ok(reply_to_response(reply, Todo::from))
    }

    async fn list_todos(
        &self,
        request: Request<()>,
    ) -> Result<Response<TodoListResponse>, Status> {
        record("ListTodos");
        let metadata = call_metadata_from(request.metadata());

        let reply = self
            .todo_service
            .list_todos(&metadata)
            .await
            .map_err(status_from_error)?;

        Ok(reply_to_response(reply, |todos| TodoListResponse {
            todos: todos.into_iter().map(Into::into).collect(),
        }))
    }

    async fn update_todo(&self, request: Request<Todo>) -> Result<Response<Todo>, Status> {
        record("UpdateTodo");
        let metadata = call_metadata_from(request.metadata());
        let id = todo_id_from_proto(request.get_ref()).map_err(invalid_id)?;
        let draft = draft_from_proto(request.get_ref());

        let reply = self
            .todo_service
            .update_todo(&metadata, id, draft)
            .await
            .map_err(status_from_error)?;

        Ok(reply_to_response(reply, Todo::from))
    }

    async fn delete_todo(
        &self,
        request: Request<Todo>,
    ) -> Result<Response<DeleteResponse>, Status> {
        record("DeleteTodo");
        let metadata = call_metadata_from(request.metadata());
        let id = todo_id_from_proto(request.get_ref()).map_err(invalid_id)?;

        let reply = self
            .todo_service
            .delete_todo(&metadata, id)
            .await
            .map_err(status_from_error)?;

        debug!(todo_id = %id, "DeleteTodo succeeded");
        Ok(reply_to_response(reply, |()| DeleteResponse {
            status: DELETE_SUCCESS.to_string(),
        }))
    }
}

/// Serve the gRPC API on an already bound listener until `shutdown` resolves
pub async fn serve_grpc<F>(
    listener: TcpListener,
    todo_service: Arc<dyn TodoService>,
    shutdown: F,
) -> Result<(), tonic::transport::Error>
where
    F: Future<Output = ()> + Send,
{
    let addr = listener.local_addr().ok();
    let server = TodolistGrpcService::new(todo_service).into_server();

    info!(address = ?addr, "Starting todolist gRPC server");

    tonic::transport::Server::builder()
        .add_service(server)
        .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::todo_service::{StandardTodoService, IDENTITY_ID_KEY, REQUEST_ID_KEY};
    use crate::domain::todo::TodoId;
    use crate::infrastructure::repositories::InMemoryTodoRepository;

    fn service() -> TodolistGrpcService {
        let todo_service = StandardTodoService::new(Arc::new(InMemoryTodoRepository::new()));
        TodolistGrpcService::new(Arc::new(todo_service))
    }

    fn wire(title: &str) -> Todo {
        Todo {
            title: title.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_status_mapping() {
        let not_found = RepositoryError::NotFound("todo 1".into());
        let status = status_from_error(TodoServiceError::Store(not_found));
        assert_eq!(status.code(), tonic::Code::NotFound);
        assert_eq!(status.message(), "todo 1");

        let constraint = RepositoryError::Constraint("dup".into());
        let status = status_from_error(TodoServiceError::Store(constraint));
        assert_eq!(status.code(), tonic::Code::Internal);
        assert!(status.message().contains("dup"));

        let status = status_from_error(TodoServiceError::InvalidArgument("bad".into()));
        assert_eq!(status.code(), tonic::Code::InvalidArgument);
    }

    #[test]
    fn test_call_metadata_from_ascii_entries() {
        let mut metadata = MetadataMap::new();
        metadata.insert(IDENTITY_ID_KEY, "ident-1".parse().unwrap());
        metadata.insert("content-type", "application/grpc".parse().unwrap());
        metadata.insert("grpc-timeout", "5S".parse().unwrap());
        let call = call_metadata_from(&metadata);
        assert_eq!(call.get(IDENTITY_ID_KEY), Some("ident-1"));
        assert_eq!(call.iter().count(), 1);
    }

    #[tokio::test]
    async fn test_request_id_is_returned_as_response_metadata() {
        let mut request = Request::new(());
        request
            .metadata_mut()
            .insert(REQUEST_ID_KEY, "req-3".parse().unwrap());

        let response = service().list_todos(request).await.unwrap();
        assert_eq!(
            response
                .metadata()
                .get(REQUEST_ID_KEY)
                .and_then(|v| v.to_str().ok()),
            Some("req-3")
        );
    }

    #[tokio::test]
    async fn test_crud_through_handler() {
        let service = service();

        let created = service
            .create_todo(Request::new(wire("ship")))
            .await
            .unwrap()
            .into_inner();
        assert!(TodoId::from_string(&created.id).is_ok());
        assert!(created.created_at.is_some());

        let mut changed = created.clone();
        changed.title = "shipped".to_string();
        changed.completed = true;
        let updated = service
            .update_todo(Request::new(changed))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(updated.id, created.id);
        assert!(updated.completed);

        let listed = service.list_todos(Request::new(())).await.unwrap().into_inner();
        assert_eq!(listed.todos.len(), 1);
        assert_eq!(listed.todos[0].title, "shipped");

        let deleted = service
            .delete_todo(Request::new(created.clone()))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(deleted.status, DELETE_SUCCESS);

        let err = service.delete_todo(Request::new(created)).await.unwrap_err();
        assert_eq!(err.code(), tonic::Code::NotFound);
    }

    #[tokio::test]
    async fn test_update_with_malformed_id() {
        let err = service()
            .update_todo(Request::new(Todo {
                id: "42".to_string(),
                ..Default::default()
            }))
            .await
            .unwrap_err();
        assert_eq!(err.code(), tonic::Code::InvalidArgument);
    }
}
