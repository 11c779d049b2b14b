// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Todo Aggregate
//!
//! The single resource type served by both transports. The aggregate is
//! transport-agnostic: the gRPC handler and the HTTP gateway convert to and
//! from their wire shapes at the boundary.
//!
//! Identifiers and timestamps are always assigned by the store; clients only
//! ever supply a [`TodoDraft`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TodoId(pub Uuid);

impl TodoId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for TodoId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TodoId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Todo {
    pub id: TodoId,
    pub title: String,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Todo {
    /// Materialize a draft with a fresh identifier and matching timestamps.
    pub fn from_draft(draft: TodoDraft) -> Self {
        let now = Utc::now();
        Self {
            id: TodoId::new(),
            title: draft.title,
            completed: draft.completed,
            created_at: now,
            updated_at: now,
        }
    }

    /// Overwrite the client-controlled fields and bump `updated_at`.
    /// `id` and `created_at` never change after creation.
    pub fn apply(&mut self, draft: TodoDraft) {
        self.title = draft.title;
        self.completed = draft.completed;
        self.updated_at = Utc::now();
    }
}

/// Client-supplied fields of a todo.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoDraft {
    pub title: String,
    pub completed: bool,
}

impl TodoDraft {
    pub fn new(title: impl Into<String>, completed: bool) -> Self {
        Self {
            title: title.into(),
            completed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_draft_assigns_id_and_timestamps() {
        let todo = Todo::from_draft(TodoDraft::new("write docs", false));
        assert_eq!(todo.title, "write docs");
        assert!(!todo.completed);
        assert_eq!(todo.created_at, todo.updated_at);
    }

    #[test]
    fn test_apply_preserves_identity() {
        let mut todo = Todo::from_draft(TodoDraft::new("write docs", false));
        let id = todo.id;
        let created_at = todo.created_at;

        todo.apply(TodoDraft::new("write better docs", true));

        assert_eq!(todo.id, id);
        assert_eq!(todo.created_at, created_at);
        assert_eq!(todo.title, "write better docs");
        assert!(todo.completed);
        assert!(todo.updated_at >= created_at);
    }

    #[test]
    fn test_id_parsing() {
        let id = TodoId::new();
        assert_eq!(TodoId::from_string(&id.to_string()).unwrap(), id);
        assert!(TodoId::from_string("not-a-uuid").is_err());
    }
}
