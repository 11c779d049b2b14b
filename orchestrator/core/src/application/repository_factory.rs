// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Repository Factory - Application Layer
//!
//! Creates the concrete `TodoRepository` from the storage configuration,
//! keeping the domain layer free of infrastructure dependencies.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Select and open the Data Store once at startup

use std::sync::Arc;

use crate::domain::repository::{StorageBackend, TodoRepository};
use crate::infrastructure::db::Database;
use crate::infrastructure::repositories::postgres_todo::PostgresTodoRepository;
use crate::infrastructure::repositories::InMemoryTodoRepository;

/// Creates a TodoRepository implementation based on the configured backend
pub async fn create_todo_repository(
    backend: &StorageBackend,
) -> anyhow::Result<Arc<dyn TodoRepository>> {
    match backend {
        StorageBackend::InMemory => {
            tracing::info!("Using in-memory todo repository");
            Ok(Arc::new(InMemoryTodoRepository::new()))
        }
        StorageBackend::PostgreSQL(config) => {
            let database = Database::new(&config.connection_string).await?;
            tracing::info!("Using PostgreSQL todo repository");
            Ok(Arc::new(PostgresTodoRepository::new(database.get_pool().clone())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::todo::TodoDraft;

    #[tokio::test]
    async fn test_in_memory_backend() {
        let repo = create_todo_repository(&StorageBackend::InMemory).await.unwrap();
        repo.create(TodoDraft::new("x", false)).await.unwrap();
        assert_eq!(repo.list().await.unwrap().len(), 1);
    }
}
