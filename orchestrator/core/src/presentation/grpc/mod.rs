// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! gRPC transport: the service handler and the gateway's loopback client.

pub mod server;
pub mod client;
