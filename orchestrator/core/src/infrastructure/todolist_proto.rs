// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// This file includes the generated protobuf code from tonic/prost and the
// mapping between wire messages and the `Todo` aggregate.

use chrono::{DateTime, Utc};
use prost_types::Timestamp;

use crate::domain::todo::{Todo, TodoDraft, TodoId};

pub mod todolist {
    pub mod v1 {
        tonic::include_proto!("todolist.v1");
    }
}

pub use todolist::v1 as pb;

#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("invalid todo id '{0}'")]
    InvalidId(String),

    #[error("missing or out-of-range timestamp: {0}")]
    InvalidTimestamp(&'static str),
}

pub fn to_timestamp(dt: DateTime<Utc>) -> Timestamp {
    Timestamp {
        seconds: dt.timestamp(),
        nanos: dt.timestamp_subsec_nanos() as i32,
    }
}

pub fn from_timestamp(ts: &Timestamp) -> Option<DateTime<Utc>> {
    let nanos = u32::try_from(ts.nanos).ok()?;
    DateTime::from_timestamp(ts.seconds, nanos)
}

/// Parse the id carried by an update/delete request
pub fn todo_id_from_proto(todo: &pb::Todo) -> Result<TodoId, ConversionError> {
    TodoId::from_string(&todo.id).map_err(|_| ConversionError::InvalidId(todo.id.clone()))
}

/// Client-controlled fields of a wire todo; id and timestamps are ignored
pub fn draft_from_proto(todo: &pb::Todo) -> TodoDraft {
    TodoDraft {
        title: todo.title.clone(),
        completed: todo.completed,
    }
}

impl From<Todo> for pb::Todo {
    fn from(todo: Todo) -> Self {
        pb::Todo {
            id: todo.id.to_string(),
            title: todo.title,
            completed: todo.completed,
            created_at: Some(to_timestamp(todo.created_at)),
            updated_at: Some(to_timestamp(todo.updated_at)),
        }
    }
}

impl TryFrom<pb::Todo> for Todo {
    type Error = ConversionError;

    fn try_from(todo: pb::Todo) -> Result<Self, Self::Error> {
        let id = todo_id_from_proto(&todo)?;
        let created_at = todo
            .created_at
            .as_ref()
            .and_then(from_timestamp)
            .ok_or(ConversionError::InvalidTimestamp("created_at"))?;
        let updated_at = todo
            .updated_at
            .as_ref()
            .and_then(from_timestamp)
            .ok_or(ConversionError::InvalidTimestamp("updated_at"))?;

        Ok(Todo {
            id,
            title: todo.title,
            completed: todo.completed,
            created_at,
            updated_at,
        })
    }
}
