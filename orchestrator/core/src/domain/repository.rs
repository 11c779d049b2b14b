// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interface
//!
//! Persistence contract for the `Todo` aggregate, following the DDD Repository
//! pattern: interface defined in the domain layer, implemented in
//! `crate::infrastructure::repositories`.
//!
//! | Trait | Aggregate | Implementations |
//! |-------|-----------|----------------|
//! | `TodoRepository` | `Todo` | `InMemoryTodoRepository`, `PostgresTodoRepository` |
//!
//! ## Storage Backend Abstraction
//!
//! The concrete implementation is selected once at startup from the `storage`
//! section of the service configuration. Both transports share the same
//! instance, so implementations must be safe under concurrent calls.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::todo::{Todo, TodoDraft, TodoId};

/// Storage backend enum for pluggable persistence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageBackend {
    InMemory,
    PostgreSQL(PostgresConfig),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostgresConfig {
    pub connection_string: String,
}

/// Repository interface for Todo aggregates
#[async_trait]
pub trait TodoRepository: Send + Sync {
    /// Persist a new todo; the store assigns the id and timestamps
    async fn create(&self, draft: TodoDraft) -> Result<Todo, RepositoryError>;

    /// List all todos in store-defined order
    async fn list(&self) -> Result<Vec<Todo>, RepositoryError>;

    /// Replace the client-controlled fields of an existing todo
    async fn update(&self, id: TodoId, draft: TodoDraft) -> Result<Todo, RepositoryError>;

    /// Delete a todo by ID
    async fn delete(&self, id: TodoId) -> Result<(), RepositoryError>;
}

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("Row not found".to_string()),
            sqlx::Error::Database(ref db)
                if db.is_unique_violation()
                    || db.is_check_violation()
                    || db.is_foreign_key_violation() =>
            {
                RepositoryError::Constraint(db.message().to_string())
            }
            _ => RepositoryError::Database(err.to_string()),
        }
    }
}
