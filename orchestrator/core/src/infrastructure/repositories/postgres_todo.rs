// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # PostgreSQL Todo Repository
//!
//! Production `TodoRepository` implementation backed by the `todos` table via
//! `sqlx`. Expected schema:
//!
//! ```sql
//! CREATE TABLE todos (
//!     id          UUID PRIMARY KEY,
//!     title       TEXT NOT NULL,
//!     completed   BOOLEAN NOT NULL DEFAULT FALSE,
//!     created_at  TIMESTAMPTZ NOT NULL,
//!     updated_at  TIMESTAMPTZ NOT NULL
//! );
//! ```
//!
//! Rows are listed by `created_at` so both transports see the same order.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

use crate::domain::repository::{RepositoryError, TodoRepository};
use crate::domain::todo::{Todo, TodoDraft, TodoId};

pub struct PostgresTodoRepository {
    pool: PgPool,
}

impl PostgresTodoRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn todo_from_row(row: &PgRow) -> Result<Todo, RepositoryError> {
    let id: uuid::Uuid = row.try_get("id")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at")?;

    Ok(Todo {
        id: TodoId(id),
        title: row.try_get("title")?,
        completed: row.try_get("completed")?,
        created_at,
        updated_at,
    })
}

#[async_trait]
impl TodoRepository for PostgresTodoRepository {
    async fn create(&self, draft: TodoDraft) -> Result<Todo, RepositoryError> {
        let todo = Todo::from_draft(draft);

        sqlx::query(
            r#"
            INSERT INTO todos (id, title, completed, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(todo.id.0)
        .bind(&todo.title)
        .bind(todo.completed)
        .bind(todo.created_at)
        .bind(todo.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(todo)
    }

    async fn list(&self) -> Result<Vec<Todo>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, title, completed, created_at, updated_at
            FROM todos
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(todo_from_row).collect()
    }

    async fn update(&self, id: TodoId, draft: TodoDraft) -> Result<Todo, RepositoryError> {
        let row = sqlx::query(
            r#"
            UPDATE todos
            SET title = $2, completed = $3, updated_at = $4
            WHERE id = $1
            RETURNING id, title, completed, created_at, updated_at
            "#,
        )
        .bind(id.0)
        .bind(&draft.title)
        .bind(draft.completed)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| RepositoryError::NotFound(format!("todo {}", id)))?;

        todo_from_row(&row)
    }

    async fn delete(&self, id: TodoId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM todos WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("todo {}", id)));
        }

        Ok(())
    }
}
