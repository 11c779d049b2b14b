// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod todo_service;
pub mod repository_factory;

pub use todo_service::{CallMetadata, Reply, StandardTodoService, TodoService, TodoServiceError};
