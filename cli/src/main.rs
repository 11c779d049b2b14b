// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Todolist Service
//!
//! The `todolist` binary serves the todo CRUD API twice: gRPC on
//! `grpc.port` and JSON over HTTP on `http.port`, the latter behind an Ory
//! Kratos session check.
//!
//! Configuration is discovered from `TODOLIST_CONFIG_PATH`,
//! `./todolist-config.yaml`, `~/.todolist/config.yaml` or
//! `/etc/todolist/config.yaml`, then environment overrides apply, then the
//! flags below.
//!
//! The process exits when either listener fails (non-zero) or on
//! Ctrl+C / SIGTERM (graceful drain).

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tokio::signal;
use tracing::{error, info};

use todolist_core::domain::service_config::ServiceConfig;
use todolist_core::TodolistServer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Compact,
    Json,
}

/// Todolist service - gRPC API and HTTP/JSON gateway
#[derive(Parser)]
#[command(name = "todolist")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(short, long, env = "TODOLIST_CONFIG_PATH", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "TODOLIST_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, env = "TODOLIST_LOG_FORMAT", value_enum, default_value = "compact")]
    log_format: LogFormat,

    /// gRPC listener port (overrides config)
    #[arg(long)]
    grpc_port: Option<u16>,

    /// HTTP gateway port (overrides config)
    #[arg(long)]
    http_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level, cli.log_format)?;

    let mut config = ServiceConfig::load_or_default(cli.config.clone())
        .context("Failed to load configuration")?;
    if let Some(port) = cli.grpc_port {
        config.grpc.port = port;
    }
    if let Some(port) = cli.http_port {
        config.http.port = port;
    }
    config.validate().context("Configuration validation failed")?;

    info!(
        grpc = %format!("{}:{}", config.grpc.bind_address, config.grpc.port),
        http = %format!("{}:{}", config.http.bind_address, config.http.port),
        storage = ?config.storage.backend,
        "Starting todolist service"
    );

    let server = TodolistServer::new(config)
        .await
        .context("Failed to initialize todolist service")?;
    server.start()?;

    // The same wait future keeps draining the task group after a signal
    let wait = server.wait();
    tokio::pin!(wait);
    let finished = tokio::select! {
        result = &mut wait => Some(result),
        _ = shutdown_signal() => None,
    };
    let result = match finished {
        Some(result) => result,
        None => {
            server.shutdown();
            wait.await
        }
    };

    if let Err(err) = &result {
        error!(error = %err, "Todolist service terminated");
    }
    result.context("Todolist service failed")
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str, format: LogFormat) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    match format {
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Json => builder.json().init(),
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
