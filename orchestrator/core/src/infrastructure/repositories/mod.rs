// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! Infrastructure implementations of the `TodoRepository` abstraction defined
//! in the domain layer.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Persist and retrieve `Todo` aggregates
//! - **Pattern:** Repository (DDD), Adapter (Hexagonal Architecture)
//!
//! # Available Implementations
//!
//! - **InMemoryTodoRepository** - Lock-protected, insertion-ordered storage
//!   for development and tests
//! - **PostgresTodoRepository** - `todos` table via `sqlx`
//!
//! Both are shared by the gRPC and HTTP transports at the same time and are
//! safe under concurrent calls.

pub mod postgres_todo;

use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;

use crate::domain::repository::{RepositoryError, TodoRepository};
use crate::domain::todo::{Todo, TodoDraft, TodoId};

#[derive(Clone, Default)]
pub struct InMemoryTodoRepository {
    todos: Arc<RwLock<Vec<Todo>>>,
}

impl InMemoryTodoRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TodoRepository for InMemoryTodoRepository {
    async fn create(&self, draft: TodoDraft) -> Result<Todo, RepositoryError> {
        let todo = Todo::from_draft(draft);
        self.todos.write().push(todo.clone());
        Ok(todo)
    }

    async fn list(&self) -> Result<Vec<Todo>, RepositoryError> {
        Ok(self.todos.read().clone())
    }

    async fn update(&self, id: TodoId, draft: TodoDraft) -> Result<Todo, RepositoryError> {
        let mut todos = self.todos.write();
        let todo = todos
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| RepositoryError::NotFound(format!("todo {}", id)))?;
        todo.apply(draft);
        Ok(todo.clone())
    }

    async fn delete(&self, id: TodoId) -> Result<(), RepositoryError> {
        let mut todos = self.todos.write();
        let position = todos
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| RepositoryError::NotFound(format!("todo {}", id)))?;
        todos.remove(position);
        Ok(())
    }
}
