// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Todolist Core
//!
//! Todo CRUD served over gRPC and an authenticated HTTP/JSON gateway.
//!
//! # Architecture
//!
//! - **domain:** `Todo` aggregate, repository and identity contracts, configuration
//! - **application:** `TodoService` use cases, repository factory
//! - **infrastructure:** in-memory/Postgres stores, Kratos client, protobuf bindings
//! - **presentation:** gRPC server and loopback client, HTTP gateway, auth gate
//! - **server:** service handle and lifecycle orchestration

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;
pub mod server;

pub use server::{LifecycleState, ListenAddrs, ServerError, TodolistServer};
