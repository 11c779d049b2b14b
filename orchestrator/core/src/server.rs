// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Service Handle & Lifecycle Orchestrator
//!
//! [`TodolistServer`] owns everything a running process needs: configuration,
//! the store-backed `TodoService`, the identity provider and the gateway
//! hooks. [`TodolistServer::start`] launches two tasks into one group:
//!
//! 1. **gRPC**: bind `grpc.bind_address:grpc.port`, publish the bound address,
//!    serve `TodolistAPIService`.
//! 2. **HTTP**: wait (bounded by `grpc.dial_timeout_seconds`) for the
//!    published gRPC address, dial a loopback client to it, mount the gateway
//!    behind the auth gate, bind and serve.
//!
//! [`TodolistServer::wait`] reports the first failure from either task and
//! cancels the other one. [`TodolistServer::shutdown`] drains both.
//!
//! ```text
//! Idle ──start()──▶ Starting ──both bound──▶ Running ──▶ Stopped { error }
//! ```

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::{http::StatusCode, middleware, Router};
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tower_http::{
    timeout::{RequestBodyTimeoutLayer, TimeoutLayer},
    trace::TraceLayer,
};
use tracing::{debug, error, info};

use crate::application::repository_factory::create_todo_repository;
use crate::application::todo_service::{StandardTodoService, TodoService};
use crate::domain::identity::IdentityProvider;
use crate::domain::service_config::{HttpConfig, ServiceConfig};
use crate::infrastructure::kratos_client::KratosIdentityProvider;
use crate::presentation::api::{self, GatewayHooks};
use crate::presentation::auth::{require_session, AuthGate};
use crate::presentation::grpc::client::GrpcTodoClient;
use crate::presentation::grpc::server::serve_grpc;
use crate::presentation::http_server::{serve_http, ConnectionTimeouts};

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("invalid configuration: {0:#}")]
    Config(anyhow::Error),

    #[error("failed to bind {transport} listener on {addr}: {source}")]
    Bind {
        transport: &'static str,
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("gRPC server failed: {0}")]
    GrpcServe(#[source] tonic::transport::Error),

    #[error("failed to dial loopback gRPC connection to {addr}: {source}")]
    Loopback {
        addr: SocketAddr,
        #[source]
        source: tonic::transport::Error,
    },

    #[error("loopback gRPC dial to {addr} timed out after {timeout:?}")]
    LoopbackTimeout { addr: SocketAddr, timeout: Duration },

    #[error("gRPC listener was not ready after {0:?}")]
    GrpcNotReady(Duration),

    #[error("server task panicked: {0}")]
    TaskPanicked(String),

    #[error("server already started")]
    AlreadyStarted,

    #[error("server not started")]
    NotStarted,

    #[error("server was shut down before it started")]
    Stopped,

    #[error("{0} listener is not running")]
    NotListening(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Starting,
    Running,
    /// `error` holds the message of the failure that stopped the group
    Stopped { error: Option<String> },
}

/// Actually bound addresses of both listeners
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenAddrs {
    pub grpc: SocketAddr,
    pub http: SocketAddr,
}

type AddrSender = watch::Sender<Option<SocketAddr>>;
type AddrReceiver = watch::Receiver<Option<SocketAddr>>;

pub struct TodolistServer {
    config: ServiceConfig,
    todo_service: Arc<dyn TodoService>,
    identity_provider: Arc<dyn IdentityProvider>,
    hooks: GatewayHooks,
    state: Arc<Mutex<LifecycleState>>,
    cancel: CancellationToken,
    tasks: Mutex<Option<JoinSet<Result<(), ServerError>>>>,
    senders: Mutex<Option<(AddrSender, AddrSender)>>,
    grpc_addr: AddrReceiver,
    http_addr: AddrReceiver,
}

impl TodolistServer {
    /// Build the store and identity client described by `config`.
    pub async fn new(config: ServiceConfig) -> anyhow::Result<Self> {
        let backend = config.storage.backend()?;
        let repository = create_todo_repository(&backend).await?;
        let todo_service: Arc<dyn TodoService> = Arc::new(StandardTodoService::new(repository));

        let identity_provider: Arc<dyn IdentityProvider> = Arc::new(KratosIdentityProvider::new(
            config.identity.api_url.clone(),
            config.identity.timeout(),
        )?);

        Ok(Self::from_parts(config, todo_service, identity_provider))
    }

    pub fn from_parts(
        config: ServiceConfig,
        todo_service: Arc<dyn TodoService>,
        identity_provider: Arc<dyn IdentityProvider>,
    ) -> Self {
        let (grpc_tx, grpc_addr) = watch::channel(None);
        let (http_tx, http_addr) = watch::channel(None);

        Self {
            config,
            todo_service,
            identity_provider,
            hooks: GatewayHooks::default(),
            state: Arc::new(Mutex::new(LifecycleState::Idle)),
            cancel: CancellationToken::new(),
            tasks: Mutex::new(None),
            senders: Mutex::new(Some((grpc_tx, http_tx))),
            grpc_addr,
            http_addr,
        }
    }

    pub fn with_hooks(mut self, hooks: GatewayHooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn state(&self) -> LifecycleState {
        self.state.lock().clone()
    }

    /// Launch both transport tasks. Returns without waiting for either to bind.
    pub fn start(&self) -> Result<(), ServerError> {
        {
            let mut state = self.state.lock();
            match *state {
                LifecycleState::Idle => *state = LifecycleState::Starting,
                LifecycleState::Stopped { .. } if self.senders.lock().is_some() => {
                    return Err(ServerError::Stopped);
                }
                _ => return Err(ServerError::AlreadyStarted),
            }
        }

        let (grpc_tx, http_tx) = self
            .senders
            .lock()
            .take()
            .ok_or(ServerError::AlreadyStarted)?;
        let mut tasks = JoinSet::new();

        tasks.spawn(run_grpc(
            self.config.clone(),
            self.todo_service.clone(),
            grpc_tx,
            self.cancel.clone(),
        ));

        tasks.spawn(run_http(HttpTask {
            config: self.config.clone(),
            identity_provider: self.identity_provider.clone(),
            hooks: self.hooks.clone(),
            grpc_addr: self.grpc_addr.clone(),
            http_tx,
            state: self.state.clone(),
            cancel: self.cancel.clone(),
        }));

        *self.tasks.lock() = Some(tasks);
        Ok(())
    }

    /// Block until both tasks have exited. The first failure wins: the other
    /// task is cancelled and the failure is returned.
    ///
    /// The returned future owns the task group; dropping it aborts both tasks.
    pub async fn wait(&self) -> Result<(), ServerError> {
        let mut tasks = self.tasks.lock().take().ok_or(ServerError::NotStarted)?;
        let mut first_error: Option<ServerError> = None;

        while let Some(joined) = tasks.join_next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(join_error) if join_error.is_cancelled() => Ok(()),
                Err(join_error) => Err(ServerError::TaskPanicked(join_error.to_string())),
            };

            if let Err(err) = outcome {
                if first_error.is_none() {
                    error!(error = %err, "Server task failed; stopping remaining tasks");
                    self.cancel.cancel();
                    first_error = Some(err);
                } else {
                    debug!(error = %err, "Additional server task failure after shutdown began");
                }
            }
        }

        self.cancel.cancel();
        *self.state.lock() = LifecycleState::Stopped {
            error: first_error.as_ref().map(ToString::to_string),
        };

        match first_error {
            Some(err) => Err(err),
            None => {
                info!("Todolist server stopped");
                Ok(())
            }
        }
    }

    /// Ask both listeners to drain and exit. `wait()` then returns `Ok(())`.
    /// Called before `start()`, it retires the server for good.
    pub fn shutdown(&self) {
        info!("Shutting down todolist server");
        self.cancel.cancel();

        let mut state = self.state.lock();
        if *state == LifecycleState::Idle {
            *state = LifecycleState::Stopped { error: None };
        }
    }

    /// Resolves once both listeners are bound.
    pub async fn listen_addrs(&self) -> Result<ListenAddrs, ServerError> {
        if self.senders.lock().is_some() {
            return Err(ServerError::NotStarted);
        }

        let grpc = bound_addr(self.grpc_addr.clone())
            .await
            .ok_or(ServerError::NotListening("gRPC"))?;
        let http = bound_addr(self.http_addr.clone())
            .await
            .ok_or(ServerError::NotListening("HTTP"))?;

        Ok(ListenAddrs { grpc, http })
    }
}

async fn bound_addr(mut rx: AddrReceiver) -> Option<SocketAddr> {
    rx.wait_for(Option::is_some).await.ok().and_then(|addr| *addr)
}

/// HTTP application: tracing, timeouts, auth gate, then the gateway.
pub fn http_app(
    todo_service: Arc<dyn TodoService>,
    gate: AuthGate,
    hooks: GatewayHooks,
    http: &HttpConfig,
) -> Router {
    api::app(todo_service, hooks)
        .layer(middleware::from_fn_with_state(gate, require_session))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            http.write_timeout(),
        ))
        .layer(RequestBodyTimeoutLayer::new(http.read_timeout()))
        .layer(TraceLayer::new_for_http())
}

/// Wildcard listener addresses are dialed over loopback.
fn loopback_target(addr: SocketAddr) -> SocketAddr {
    match addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => {
            SocketAddr::new(Ipv4Addr::LOCALHOST.into(), addr.port())
        }
        IpAddr::V6(ip) if ip.is_unspecified() => {
            SocketAddr::new(Ipv6Addr::LOCALHOST.into(), addr.port())
        }
        _ => addr,
    }
}

async fn bind(
    transport: &'static str,
    addr: SocketAddr,
) -> Result<(TcpListener, SocketAddr), ServerError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind {
            transport,
            addr,
            source,
        })?;
    let local = listener.local_addr().map_err(|source| ServerError::Bind {
        transport,
        addr,
        source,
    })?;
    Ok((listener, local))
}

async fn run_grpc(
    config: ServiceConfig,
    todo_service: Arc<dyn TodoService>,
    addr_tx: AddrSender,
    cancel: CancellationToken,
) -> Result<(), ServerError> {
    let addr = config.grpc.socket_addr().map_err(ServerError::Config)?;
    let (listener, local) = bind("gRPC", addr).await?;

    info!(address = %local, "gRPC listener bound");
    addr_tx.send_replace(Some(local));

    serve_grpc(listener, todo_service, async move { cancel.cancelled().await })
        .await
        .map_err(ServerError::GrpcServe)?;

    info!("gRPC server stopped");
    Ok(())
}

struct HttpTask {
    config: ServiceConfig,
    identity_provider: Arc<dyn IdentityProvider>,
    hooks: GatewayHooks,
    grpc_addr: AddrReceiver,
    http_tx: AddrSender,
    state: Arc<Mutex<LifecycleState>>,
    cancel: CancellationToken,
}

async fn run_http(task: HttpTask) -> Result<(), ServerError> {
    let HttpTask {
        config,
        identity_provider,
        hooks,
        grpc_addr,
        http_tx,
        state,
        cancel,
    } = task;

    let dial_timeout = config.grpc.dial_timeout();
    let grpc_addr = tokio::select! {
        _ = cancel.cancelled() => return Ok(()),
        addr = tokio::time::timeout(dial_timeout, bound_addr(grpc_addr)) => {
            addr.map_err(|_| ServerError::GrpcNotReady(dial_timeout))?
        }
    };
    let Some(grpc_addr) = grpc_addr else {
        // The gRPC task exited before binding and reports its own error
        cancel.cancelled().await;
        return Ok(());
    };

    let target = loopback_target(grpc_addr);
    let client = tokio::select! {
        _ = cancel.cancelled() => return Ok(()),
        dialed = tokio::time::timeout(
            dial_timeout,
            GrpcTodoClient::connect(target, dial_timeout, config.grpc.request_timeout()),
        ) => dialed
            .map_err(|_| ServerError::LoopbackTimeout {
                addr: target,
                timeout: dial_timeout,
            })?
            .map_err(|source| ServerError::Loopback {
                addr: target,
                source,
            })?,
    };
    debug!(target = %target, "Loopback gRPC client connected");

    let gate = AuthGate::new(identity_provider, config.identity.ui_url.clone());
    let app = http_app(Arc::new(client), gate, hooks, &config.http);

    let addr = config.http.socket_addr().map_err(ServerError::Config)?;
    let (listener, local) = bind("HTTP", addr).await?;
    {
        let mut state = state.lock();
        if *state == LifecycleState::Starting {
            *state = LifecycleState::Running;
        }
    }
    http_tx.send_replace(Some(local));
    info!(address = %local, grpc = %grpc_addr, "HTTP gateway listening");

    serve_http(listener, app, ConnectionTimeouts::from(&config.http), cancel).await;

    info!("HTTP gateway stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loopback_target_rewrites_wildcards() {
        let any_v4: SocketAddr = "0.0.0.0:50051".parse().unwrap();
        let any_v6: SocketAddr = "[::]:50051".parse().unwrap();
        let fixed: SocketAddr = "10.0.0.5:50051".parse().unwrap();

        assert_eq!(loopback_target(any_v4), "127.0.0.1:50051".parse().unwrap());
        assert_eq!(loopback_target(any_v6), "[::1]:50051".parse().unwrap());
        assert_eq!(loopback_target(fixed), fixed);
    }

    #[tokio::test]
    async fn test_http_task_gives_up_on_silent_grpc_listener() {
        let mut config = ServiceConfig::default();
        config.grpc.dial_timeout_seconds = 1;
        config.http.bind_address = "127.0.0.1".to_string();
        config.http.port = 0;

        // Sender stays alive but never publishes an address
        let (_grpc_tx, grpc_addr) = watch::channel(None);
        let (http_tx, http_addr) = watch::channel(None);
        let identity_provider: Arc<dyn IdentityProvider> = Arc::new(
            KratosIdentityProvider::new("http://127.0.0.1:1", Duration::from_secs(1)).unwrap(),
        );

        let task = run_http(HttpTask {
            config,
            identity_provider,
            hooks: GatewayHooks::default(),
            grpc_addr,
            http_tx,
            state: Arc::new(Mutex::new(LifecycleState::Starting)),
            cancel: CancellationToken::new(),
        });
        let result = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("HTTP task waited past the dial timeout");

        match result {
            Err(ServerError::GrpcNotReady(timeout)) => assert_eq!(timeout, Duration::from_secs(1)),
            other => panic!("expected GrpcNotReady, got {other:?}"),
        }
        assert!(http_addr.borrow().is_none());
    }
}
