// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Presentation Layer (`todolist-core`)
//!
//! HTTP and gRPC surface that translates external requests into
//! `TodoService` calls. No business logic lives here.
//!
//! | Module | Transport | Description |
//! |--------|-----------|-------------|
//! | [`api`] | HTTP/JSON (Axum) | Gateway routes, hooks, error mapping |
//! | [`auth`] | HTTP (Axum middleware) | Session check against the identity provider |
//! | [`http_server`] | HTTP (hyper) | Accept loop with header-read and idle deadlines |
//! | [`grpc`] | gRPC (Tonic) | `TodolistAPIService` server and loopback client |

pub mod api;
pub mod auth;
pub mod grpc;
pub mod http_server;
