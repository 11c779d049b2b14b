// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # HTTP Connection Serving
//!
//! Accept loop for the gateway. Each connection is driven by hyper's auto
//! (HTTP/1.1 + h2) builder so the connection-level budgets can be enforced:
//!
//! - **header read**: a request head must arrive within `read_timeout`
//! - **idle**: a connection with no bytes in either direction for
//!   `idle_timeout` is asked to close
//! - **drain**: once closing, a connection gets `drain_timeout` to finish
//!   in-flight work before it is dropped
//!
//! Per-request budgets (body read, response write) stay in the tower layers
//! built by [`crate::server::http_app`].

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::Router;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto::Builder;
use hyper_util::service::TowerToHyperService;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use crate::domain::service_config::HttpConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionTimeouts {
    pub header_read: Duration,
    pub idle: Duration,
    pub drain: Duration,
}

impl From<&HttpConfig> for ConnectionTimeouts {
    fn from(http: &HttpConfig) -> Self {
        Self {
            header_read: http.read_timeout(),
            idle: http.idle_timeout(),
            drain: http.write_timeout(),
        }
    }
}

/// Serve `app` on `listener` until `shutdown` fires, then drain open
/// connections.
pub async fn serve_http(
    listener: TcpListener,
    app: Router,
    timeouts: ConnectionTimeouts,
    shutdown: CancellationToken,
) {
    let connections = TaskTracker::new();

    loop {
        let (stream, peer) = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(err) => {
                    warn!(error = %err, "Failed to accept HTTP connection");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            },
        };

        connections.spawn(serve_connection(
            stream,
            peer,
            app.clone(),
            timeouts,
            shutdown.clone(),
        ));
    }

    drop(listener);
    connections.close();
    debug!(open = connections.len(), "Draining HTTP connections");
    connections.wait().await;
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    app: Router,
    timeouts: ConnectionTimeouts,
    shutdown: CancellationToken,
) {
    let activity = Activity::new();
    let io = TokioIo::new(ActivityIo {
        inner: stream,
        activity: activity.clone(),
    });

    let mut builder = Builder::new(TokioExecutor::new());
    builder
        .http1()
        .timer(TokioTimer::new())
        .header_read_timeout(timeouts.header_read);

    let conn = builder.serve_connection(io, TowerToHyperService::new(app));
    tokio::pin!(conn);

    let mut drain_deadline: Option<Instant> = None;
    loop {
        let idle_deadline = activity.last() + timeouts.idle;

        tokio::select! {
            result = &mut conn => {
                if let Err(err) = result {
                    debug!(%peer, error = %err, "HTTP connection ended with error");
                }
                return;
            }
            _ = tokio::time::sleep_until(idle_deadline), if drain_deadline.is_none() => {
                if activity.last() + timeouts.idle <= Instant::now() {
                    debug!(%peer, "Closing idle HTTP connection");
                    conn.as_mut().graceful_shutdown();
                    drain_deadline = Some(Instant::now() + timeouts.drain);
                }
            }
            _ = shutdown.cancelled(), if drain_deadline.is_none() => {
                conn.as_mut().graceful_shutdown();
                drain_deadline = Some(Instant::now() + timeouts.drain);
            }
            _ = sleep_until_some(drain_deadline), if drain_deadline.is_some() => {
                debug!(%peer, "Dropping HTTP connection that did not drain in time");
                return;
            }
        }
    }
}

async fn sleep_until_some(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Time of the last byte read from or written to a connection
#[derive(Clone)]
struct Activity(Arc<Mutex<Instant>>);

impl Activity {
    fn new() -> Self {
        Self(Arc::new(Mutex::new(Instant::now())))
    }

    fn touch(&self) {
        *self.0.lock() = Instant::now();
    }

    fn last(&self) -> Instant {
        *self.0.lock()
    }
}

/// Socket wrapper that records traffic on an [`Activity`]
struct ActivityIo<S> {
    inner: S,
    activity: Activity,
}

impl<S: AsyncRead + Unpin> AsyncRead for ActivityIo<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        let polled = Pin::new(&mut this.inner).poll_read(cx, buf);
        if buf.filled().len() > before {
            this.activity.touch();
        }
        polled
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for ActivityIo<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let polled = Pin::new(&mut this.inner).poll_write(cx, buf);
        if matches!(polled, Poll::Ready(Ok(n)) if n > 0) {
            this.activity.touch();
        }
        polled
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let polled = Pin::new(&mut this.inner).poll_write_vectored(cx, bufs);
        if matches!(polled, Poll::Ready(Ok(n)) if n > 0) {
            this.activity.touch();
        }
        polled
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    const TEST_BUDGET: Duration = Duration::from_secs(5);

    async fn spawn_server(
        timeouts: ConnectionTimeouts,
    ) -> (SocketAddr, CancellationToken, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route("/ping", get(|| async { "pong" }));
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(serve_http(listener, app, timeouts, shutdown.clone()));
        (addr, shutdown, handle)
    }

    /// Reads until the peer closes, returning everything received
    async fn read_until_closed(stream: &mut TcpStream) -> String {
        let mut received = Vec::new();
        tokio::time::timeout(TEST_BUDGET, stream.read_to_end(&mut received))
            .await
            .expect("connection was left open")
            .unwrap();
        String::from_utf8_lossy(&received).into_owned()
    }

    #[test]
    fn test_timeouts_follow_http_config() {
        let http = HttpConfig {
            read_timeout_seconds: 3,
            write_timeout_seconds: 4,
            idle_timeout_seconds: 5,
            ..HttpConfig::default()
        };
        let timeouts = ConnectionTimeouts::from(&http);
        assert_eq!(timeouts.header_read, Duration::from_secs(3));
        assert_eq!(timeouts.drain, Duration::from_secs(4));
        assert_eq!(timeouts.idle, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_partial_request_head_is_cut_off() {
        let (addr, shutdown, handle) = spawn_server(ConnectionTimeouts {
            header_read: Duration::from_secs(1),
            idle: Duration::from_secs(60),
            drain: Duration::from_secs(1),
        })
        .await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /ping HTTP/1.1\r\nHost: x\r\n")
            .await
            .unwrap();

        let started = Instant::now();
        read_until_closed(&mut stream).await;
        assert!(started.elapsed() < Duration::from_secs(4));

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_idle_keep_alive_connection_is_closed() {
        let (addr, shutdown, handle) = spawn_server(ConnectionTimeouts {
            header_read: Duration::from_secs(15),
            idle: Duration::from_secs(1),
            drain: Duration::from_secs(1),
        })
        .await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /ping HTTP/1.1\r\nHost: x\r\n\r\n")
            .await
            .unwrap();

        let started = Instant::now();
        let received = read_until_closed(&mut stream).await;
        assert!(received.starts_with("HTTP/1.1 200"), "received: {received}");
        assert!(received.ends_with("pong"));
        assert!(started.elapsed() < Duration::from_secs(4));

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_closes_open_connections() {
        let (addr, shutdown, handle) = spawn_server(ConnectionTimeouts {
            header_read: Duration::from_secs(15),
            idle: Duration::from_secs(60),
            drain: Duration::from_secs(1),
        })
        .await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /ping HTTP/1.1\r\nHost: x\r\n\r\n")
            .await
            .unwrap();
        let mut first = [0u8; 12];
        stream.read_exact(&mut first).await.unwrap();
        assert_eq!(&first, b"HTTP/1.1 200");

        shutdown.cancel();
        tokio::time::timeout(TEST_BUDGET, handle)
            .await
            .expect("serve_http did not drain")
            .unwrap();
        read_until_closed(&mut stream).await;
    }
}
