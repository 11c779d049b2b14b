// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Loopback gRPC client
//!
//! The HTTP gateway never touches the store directly: every translated request
//! is forwarded over a gRPC connection back to this process's own listener.
//! [`GrpcTodoClient`] is that connection, exposed through the same
//! `TodoService` trait the gateway is written against.

use async_trait::async_trait;
use std::net::SocketAddr;
use std::time::Duration;

use tonic::transport::{Channel, Endpoint};
use tonic::{Request, Response};
use tracing::debug;

use crate::application::todo_service::{CallMetadata, Reply, TodoService, TodoServiceError};
use crate::domain::todo::{Todo, TodoDraft, TodoId};
use crate::infrastructure::todolist_proto::pb;
use crate::infrastructure::todolist_proto::pb::todolist_api_service_client::TodolistApiServiceClient;
use crate::presentation::grpc::server::{call_metadata_from, write_metadata};

#[derive(Clone)]
pub struct GrpcTodoClient {
    client: TodolistApiServiceClient<Channel>,
}

impl GrpcTodoClient {
    /// Dial the gRPC listener at `addr`. Each call is bounded by `request_timeout`.
    pub async fn connect(
        addr: SocketAddr,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self, tonic::transport::Error> {
        let endpoint = Endpoint::from_shared(format!("http://{}", addr))?
            .connect_timeout(connect_timeout)
            .timeout(request_timeout);

        debug!(endpoint = %addr, "Dialing loopback gRPC connection");
        let channel = endpoint.connect().await?;

        Ok(Self::from_channel(channel))
    }

    pub fn from_channel(channel: Channel) -> Self {
        Self {
            client: TodolistApiServiceClient::new(channel),
        }
    }
}

fn request_with_metadata<T>(message: T, metadata: &CallMetadata) -> Request<T> {
    let mut request = Request::new(message);
    write_metadata(request.metadata_mut(), metadata);
    request
}

/// Keep the response header metadata alongside the decoded message
fn into_reply<T, M>(
    response: Response<M>,
    convert: impl FnOnce(M) -> Result<T, TodoServiceError>,
) -> Result<Reply<T>, TodoServiceError> {
    let metadata = call_metadata_from(response.metadata());
    let value = convert(response.into_inner())?;
    Ok(Reply::with_metadata(value, metadata))
}

fn into_todo(message: pb::Todo) -> Result<Todo, TodoServiceError> {
    Todo::try_from(message)
        .map_err(|e| TodoServiceError::Rpc(tonic::Status::internal(e.to_string())))
}

fn id_only(id: TodoId) -> pb::Todo {
    pb::Todo {
        id: id.to_string(),
        ..Default::default()
    }
}

#[async_trait]
impl TodoService for GrpcTodoClient {
    async fn create_todo(
        &self,
        metadata: &CallMetadata,
        draft: TodoDraft,
    ) -> Result<Reply<Todo>, TodoServiceError> {
        let message = pb::Todo {
            title: draft.title,
            completed: draft.completed,
            ..Default::default()
        };
        let response = self
            .client
            .clone()
            .create_todo(request_with_metadata(message, metadata))
            .await
            .map_err(TodoServiceError::Rpc)?;
        into_reply(response, into_todo)
    }

    async fn list_todos(&self, metadata: &CallMetadata)
        -> Result<Reply<Vec<Todo>>, TodoServiceError> {
        let response = self
            .client
            .clone()
            .list_todos(request_with_metadata((), metadata))
            .await
            .map_err(TodoServiceError::Rpc)?;
        into_reply(response, |list| list.todos.into_iter().map(into_todo).collect())
    }

    async fn update_todo(
        &self,
        metadata: &CallMetadata,
        id: TodoId,
        draft: TodoDraft,
    ) -> Result<Reply<Todo>, TodoServiceError> {
        let message = pb::Todo {
            title: draft.title,
            completed: draft.completed,
            ..id_only(id)
        };
        let response = self
            .client
            .clone()
            .update_todo(request_with_metadata(message, metadata))
            .await
            .map_err(TodoServiceError::Rpc)?;
        into_reply(response, into_todo)
    }

    async fn delete_todo(
        &self,
        metadata: &CallMetadata,
        id: TodoId,
    ) -> Result<Reply<()>, TodoServiceError> {
        let response = self
            .client
            .clone()
            .delete_todo(request_with_metadata(id_only(id), metadata))
            .await
            .map_err(TodoServiceError::Rpc)?;
        into_reply(response, |_| Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_with_metadata_skips_invalid_entries() {
        let mut metadata = CallMetadata::new();
        metadata.insert("x-identity-id", "ident-1");
        metadata.insert("bad key", "value");
        metadata.insert("x-note", "line\nbreak");

        let request = request_with_metadata((), &metadata);
        assert_eq!(
            request.metadata().get("x-identity-id").and_then(|v| v.to_str().ok()),
            Some("ident-1")
        );
        assert!(request.metadata().get("x-note").is_none());
        assert_eq!(request.metadata().len(), 1);
    }

    #[test]
    fn test_response_metadata_is_kept_with_reply() {
        let mut response = Response::new(pb::DeleteResponse {
            status: "success".to_string(),
        });
        response
            .metadata_mut()
            .insert("x-request-id", "req-5".parse().unwrap());
        response
            .metadata_mut()
            .insert("content-type", "application/grpc".parse().unwrap());

        let reply = into_reply(response, |message| Ok(message.status)).unwrap();
        assert_eq!(reply.value, "success");
        assert_eq!(reply.metadata.get("x-request-id"), Some("req-5"));
        assert!(reply.metadata.get("content-type").is_none());
    }
}
