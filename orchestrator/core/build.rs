// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Build Script for todolist-core
//!
//! Compiles the `todolist.v1` Protocol Buffer definitions into tonic server and
//! client stubs. Generated code lands in `OUT_DIR` and is included via
//! `tonic::include_proto!` in `src/infrastructure/todolist_proto.rs`.
//!
//! # Dependencies
//!
//! - **protoc**: Protocol buffer compiler (vendored via `protoc-bin-vendored`),
//!   including the well-known types (`Empty`, `Timestamp`)
//! - **tonic-prost-build**: Code generator for Rust gRPC stubs

use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set PROTOC environment variable to point to the vendored protoc binary
    std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);

    let includes = [
        PathBuf::from("../../proto"),
        protoc_bin_vendored::include_path()?,
    ];
    let protos = [PathBuf::from("../../proto/todolist/v1/todolist.proto")];

    tonic_prost_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(&protos, &includes)?;

    println!("cargo:rerun-if-changed=../../proto/todolist/v1/todolist.proto");

    Ok(())
}
