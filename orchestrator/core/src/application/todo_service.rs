// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Todo Application Service
//!
//! The four CRUD use cases shared by both transports. [`TodoService`] is the
//! seam between transports and the store:
//!
//! - [`StandardTodoService`] runs the use cases against a `TodoRepository`
//!   (what the gRPC handler serves);
//! - `crate::presentation::grpc::client::GrpcTodoClient` forwards them over
//!   the loopback gRPC connection (what the HTTP gateway calls).
//!
//! Every use case issues exactly one repository call. No batching, no
//! transactions, no retries.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::domain::repository::{RepositoryError, TodoRepository};
use crate::domain::todo::{Todo, TodoDraft, TodoId};

/// Identity metadata key written by the gateway's default annotator
pub const IDENTITY_ID_KEY: &str = "x-identity-id";
/// Session metadata key written by the gateway's default annotator
pub const SESSION_ID_KEY: &str = "x-session-id";
/// Request correlation key
pub const REQUEST_ID_KEY: &str = "x-request-id";

/// Request-scoped key/value pairs carried with a call (gRPC metadata on the wire).
///
/// Keys are lowercase ASCII; values are printable ASCII.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallMetadata(BTreeMap<String, String>);

impl CallMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into().to_ascii_lowercase(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, String)> for CallMetadata {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut metadata = CallMetadata::new();
        for (k, v) in iter {
            metadata.insert(k, v);
        }
        metadata
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TodoServiceError {
    #[error(transparent)]
    Store(#[from] RepositoryError),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Failure reported by a remote RPC peer, code and message preserved
    #[error("rpc failed ({}): {}", .0.code(), .0.message())]
    Rpc(tonic::Status),
}

/// A service result plus the metadata the backend attached to it.
///
/// On the gRPC wire this is the response header metadata; the gateway
/// forwards it as `Grpc-Metadata-<key>` HTTP headers.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply<T> {
    pub value: T,
    pub metadata: CallMetadata,
}

impl<T> Reply<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            metadata: CallMetadata::new(),
        }
    }

    pub fn with_metadata(value: T, metadata: CallMetadata) -> Self {
        Self { value, metadata }
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}

#[async_trait]
pub trait TodoService: Send + Sync {
    async fn create_todo(
        &self,
        metadata: &CallMetadata,
        draft: TodoDraft,
    ) -> Result<Reply<Todo>, TodoServiceError>;

    async fn list_todos(&self, metadata: &CallMetadata)
        -> Result<Reply<Vec<Todo>>, TodoServiceError>;

    async fn update_todo(
        &self,
        metadata: &CallMetadata,
        id: TodoId,
        draft: TodoDraft,
    ) -> Result<Reply<Todo>, TodoServiceError>;

    async fn delete_todo(
        &self,
        metadata: &CallMetadata,
        id: TodoId,
    ) -> Result<Reply<()>, TodoServiceError>;
}

pub struct StandardTodoService {
    repository: Arc<dyn TodoRepository>,
}

impl StandardTodoService {
    pub fn new(repository: Arc<dyn TodoRepository>) -> Self {
        Self { repository }
    }
}

/// Echo the caller's request id so both transports can correlate responses.
fn reply<T>(value: T, metadata: &CallMetadata) -> Reply<T> {
    let mut response = CallMetadata::new();
    if let Some(request_id) = metadata.get(REQUEST_ID_KEY) {
        response.insert(REQUEST_ID_KEY, request_id);
    }
    Reply::with_metadata(value, response)
}

#[async_trait]
impl TodoService for StandardTodoService {
    async fn create_todo(
        &self,
        metadata: &CallMetadata,
        draft: TodoDraft,
    ) -> Result<Reply<Todo>, TodoServiceError> {
        let todo = self.repository.create(draft).await?;
        debug!(
            todo_id = %todo.id,
            identity = metadata.get(IDENTITY_ID_KEY).unwrap_or("-"),
            "Todo created"
        );
        Ok(reply(todo, metadata))
    }

    async fn list_todos(&self, metadata: &CallMetadata)
        -> Result<Reply<Vec<Todo>>, TodoServiceError> {
        let todos = self.repository.list().await?;
        debug!(
            count = todos.len(),
            identity = metadata.get(IDENTITY_ID_KEY).unwrap_or("-"),
            "Todos listed"
        );
        Ok(reply(todos, metadata))
    }

    async fn update_todo(
        &self,
        metadata: &CallMetadata,
        id: TodoId,
        draft: TodoDraft,
    ) -> Result<Reply<Todo>, TodoServiceError> {
        let todo = self.repository.update(id, draft).await?;
        debug!(
            todo_id = %todo.id,
            identity = metadata.get(IDENTITY_ID_KEY).unwrap_or("-"),
            "Todo updated"
        );
        Ok(reply(todo, metadata))
    }

    async fn delete_todo(
        &self,
        metadata: &CallMetadata,
        id: TodoId,
    ) -> Result<Reply<()>, TodoServiceError> {
        self.repository.delete(id).await?;
        debug!(
            todo_id = %id,
            identity = metadata.get(IDENTITY_ID_KEY).unwrap_or("-"),
            "Todo deleted"
        );
        Ok(reply((), metadata))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::repositories::InMemoryTodoRepository;

    fn service() -> StandardTodoService {
        StandardTodoService::new(Arc::new(InMemoryTodoRepository::new()))
    }

    #[test]
    fn test_metadata_keys_are_lowercased() {
        let mut metadata = CallMetadata::new();
        metadata.insert("X-Identity-Id", "ident-1");
        assert_eq!(metadata.get(IDENTITY_ID_KEY), Some("ident-1"));
        assert_eq!(metadata.iter().count(), 1);
    }

    #[tokio::test]
    async fn test_create_then_list_contains_created() {
        let service = service();
        let metadata = CallMetadata::new();

        let created = service
            .create_todo(&metadata, TodoDraft::new("read the book", false))
            .await
            .unwrap()
            .into_inner();
        let todos = service.list_todos(&metadata).await.unwrap().into_inner();

        assert_eq!(todos.len(), 1);
        assert_eq!(todos[0].id, created.id);
        assert_eq!(todos[0].title, "read the book");
        assert!(!todos[0].completed);
    }

    #[tokio::test]
    async fn test_update_is_reflected_in_list() {
        let service = service();
        let metadata = CallMetadata::new();
        let created = service
            .create_todo(&metadata, TodoDraft::new("draft", false))
            .await
            .unwrap()
            .into_inner();

        service
            .update_todo(&metadata, created.id, TodoDraft::new("final", true))
            .await
            .unwrap();

        let todos = service.list_todos(&metadata).await.unwrap().into_inner();
        assert_eq!(todos.len(), 1);
        assert_eq!(todos[0].title, "final");
        assert!(todos[0].completed);
    }

    #[tokio::test]
    async fn test_delete_then_missing() {
        let service = service();
        let metadata = CallMetadata::new();
        let created = service
            .create_todo(&metadata, TodoDraft::new("temp", false))
            .await
            .unwrap()
            .into_inner();

        service.delete_todo(&metadata, created.id).await.unwrap();
        assert!(service.list_todos(&metadata).await.unwrap().value.is_empty());

        let err = service.delete_todo(&metadata, created.id).await.unwrap_err();
        assert!(matches!(err, TodoServiceError::Store(RepositoryError::NotFound(_))));

        let err = service
            .update_todo(&metadata, created.id, TodoDraft::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TodoServiceError::Store(RepositoryError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_reply_echoes_request_id_only() {
        let service = service();
        let mut metadata = CallMetadata::new();
        metadata.insert(REQUEST_ID_KEY, "req-9");
        metadata.insert(IDENTITY_ID_KEY, "ident-9");

        let reply = service.list_todos(&metadata).await.unwrap();
        assert_eq!(reply.metadata.get(REQUEST_ID_KEY), Some("req-9"));
        assert!(reply.metadata.get(IDENTITY_ID_KEY).is_none());

        let reply = service.list_todos(&CallMetadata::new()).await.unwrap();
        assert!(reply.metadata.is_empty());
    }
}
