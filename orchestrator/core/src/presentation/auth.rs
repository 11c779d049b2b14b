// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Auth Gate
//!
//! Axum middleware that resolves the caller's session with the
//! `IdentityProvider` before anything reaches the gateway. Rejected requests
//! are redirected (`303 See Other`) to the provider's login UI and are never
//! forwarded.
//!
//! The gRPC listener is not gated here.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tracing::{debug, warn};

use crate::domain::identity::{IdentityProvider, SessionCredential};

const BEARER_PREFIX: &str = "Bearer ";

#[derive(Clone)]
pub struct AuthGate {
    provider: Arc<dyn IdentityProvider>,
    ui_url: String,
}

impl AuthGate {
    pub fn new(provider: Arc<dyn IdentityProvider>, ui_url: impl Into<String>) -> Self {
        Self {
            provider,
            ui_url: ui_url.into(),
        }
    }

    pub fn ui_url(&self) -> &str {
        &self.ui_url
    }
}

/// Lift the cookie header and bearer token off a request.
pub fn credential_from_headers(headers: &HeaderMap) -> SessionCredential {
    let cookie = headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string);

    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix(BEARER_PREFIX))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string);

    SessionCredential { cookie, token }
}

/// Use with `axum::middleware::from_fn_with_state(gate, require_session)`.
pub async fn require_session(
    State(gate): State<AuthGate>,
    mut request: Request,
    next: Next,
) -> Response {
    let credential = credential_from_headers(request.headers());

    match gate.provider.whoami(&credential).await {
        Ok(session) => {
            debug!(
                identity_id = %session.identity.id,
                session_id = %session.id,
                "Session accepted"
            );
            request.extensions_mut().insert(session);
            next.run(request).await
        }
        Err(err) => {
            let reason = err.reason();
            warn!(
                reason,
                error = %err,
                method = %request.method(),
                path = request.uri().path(),
                "Rejecting unauthenticated request"
            );
            metrics::counter!("todolist_auth_rejections_total", "reason" => reason).increment(1);
            Redirect::to(&gate.ui_url).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::identity::{Identity, IdentityError, Session};
    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{Request as HttpRequest, StatusCode},
        middleware,
        routing::get,
        Extension, Router,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    struct StaticProvider {
        accept_token: &'static str,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl IdentityProvider for StaticProvider {
        async fn whoami(&self, credential: &SessionCredential) -> Result<Session, IdentityError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match credential.token.as_deref() {
                Some(token) if token == self.accept_token => Ok(Session {
                    id: "sess-1".to_string(),
                    active: true,
                    expires_at: None,
                    identity: Identity {
                        id: "ident-1".to_string(),
                        traits: serde_json::Value::Null,
                    },
                }),
                Some(_) => Err(IdentityError::Rejected(401)),
                None => Err(IdentityError::MissingCredential),
            }
        }
    }

    fn gated_router(provider: Arc<StaticProvider>) -> Router {
        let gate = AuthGate::new(provider, "http://login.test/ui");
        Router::new()
            .route(
                "/whoami",
                get(|Extension(session): Extension<Session>| async move { session.identity.id }),
            )
            .layer(middleware::from_fn_with_state(gate, require_session))
    }

    #[test]
    fn test_credential_from_headers() {
        let mut headers = HeaderMap::new();
        assert!(credential_from_headers(&headers).is_empty());

        headers.insert(header::COOKIE, "ory_session=abc".parse().unwrap());
        headers.insert(header::AUTHORIZATION, "Bearer tok-1".parse().unwrap());
        let credential = credential_from_headers(&headers);
        assert_eq!(credential.cookie.as_deref(), Some("ory_session=abc"));
        assert_eq!(credential.token.as_deref(), Some("tok-1"));

        headers.insert(header::AUTHORIZATION, "Basic dXNlcjpwYXNz".parse().unwrap());
        assert!(credential_from_headers(&headers).token.is_none());
    }

    #[tokio::test]
    async fn test_valid_session_reaches_handler() {
        let provider = Arc::new(StaticProvider {
            accept_token: "good",
            calls: AtomicUsize::new(0),
        });
        let response = gated_router(provider.clone())
            .oneshot(
                HttpRequest::builder()
                    .uri("/whoami")
                    .header(header::AUTHORIZATION, "Bearer good")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"ident-1");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rejected_session_redirects_to_login() {
        let provider = Arc::new(StaticProvider {
            accept_token: "good",
            calls: AtomicUsize::new(0),
        });

        for auth in [None, Some("Bearer bad")] {
            let mut builder = HttpRequest::builder().uri("/whoami");
            if let Some(auth) = auth {
                builder = builder.header(header::AUTHORIZATION, auth);
            }
            let response = gated_router(provider.clone())
                .oneshot(builder.body(Body::empty()).unwrap())
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::SEE_OTHER);
            assert_eq!(response.headers()[header::LOCATION], "http://login.test/ui");
        }
    }
}
