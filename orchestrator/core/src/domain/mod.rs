// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Layer (`todolist-core`)
//!
//! Transport-free types and contracts: the `Todo` aggregate, its repository
//! interface, the Identity Provider contract and the service configuration.

pub mod todo;
pub mod repository;
pub mod identity;
pub mod service_config;
