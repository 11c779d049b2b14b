// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Kratos Identity Provider Client
//!
//! HTTP adapter for the `IdentityProvider` contract against an Ory Kratos
//! public API (or anything that speaks its whoami dialect).
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Resolve session cookies/tokens into identity claims
//! - **Integration:** Auth gate → `GET {api_url}/sessions/whoami` → Session
//!
//! Every call is a single blocking round-trip bounded by the client timeout;
//! results are never cached and failures are never retried.

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use std::time::Duration;

use crate::domain::identity::{IdentityError, IdentityProvider, Session, SessionCredential};

const WHOAMI_PATH: &str = "/sessions/whoami";
const SESSION_TOKEN_HEADER: &str = "X-Session-Token";

pub struct KratosIdentityProvider {
    whoami_url: String,
    client: Client,
}

impl KratosIdentityProvider {
    /// Create a client for the given public API base URL
    pub fn new(api_url: impl Into<String>, timeout: Duration) -> Result<Self, IdentityError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                IdentityError::Unreachable(format!("failed to build HTTP client: {}", e))
            })?;

        Ok(Self::with_client(api_url, client))
    }

    pub fn with_client(api_url: impl Into<String>, client: Client) -> Self {
        let api_url = api_url.into();
        Self {
            whoami_url: format!("{}{}", api_url.trim_end_matches('/'), WHOAMI_PATH),
            client,
        }
    }

    pub fn whoami_url(&self) -> &str {
        &self.whoami_url
    }
}

#[async_trait]
impl IdentityProvider for KratosIdentityProvider {
    async fn whoami(&self, credential: &SessionCredential) -> Result<Session, IdentityError> {
        if credential.is_empty() {
            return Err(IdentityError::MissingCredential);
        }

        let mut request = self
            .client
            .get(&self.whoami_url)
            .header(header::ACCEPT, "application/json");
        if let Some(cookie) = &credential.cookie {
            request = request.header(header::COOKIE, cookie);
        }
        if let Some(token) = &credential.token {
            request = request.header(SESSION_TOKEN_HEADER, token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| IdentityError::Unreachable(e.to_string()))?;

        match response.status() {
            StatusCode::OK => {
                let session: Session = response
                    .json()
                    .await
                    .map_err(|e| IdentityError::MalformedResponse(e.to_string()))?;
                if !session.is_valid_at(chrono::Utc::now()) {
                    return Err(IdentityError::Inactive);
                }
                Ok(session)
            }
            status => Err(IdentityError::Rejected(status.as_u16())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SESSION_BODY: &str = r#"{
        "id": "sess-42",
        "active": true,
        "identity": {"id": "ident-7", "traits": {"email": "dev@example.com"}}
    }"#;

    fn provider(url: &str) -> KratosIdentityProvider {
        KratosIdentityProvider::new(url, Duration::from_secs(2)).unwrap()
    }

    fn cookie(value: &str) -> SessionCredential {
        SessionCredential {
            cookie: Some(value.to_string()),
            token: None,
        }
    }

    #[test]
    fn test_whoami_url_normalization() {
        assert_eq!(
            provider("http://kratos:4433/").whoami_url(),
            "http://kratos:4433/sessions/whoami"
        );
    }

    #[tokio::test]
    async fn test_valid_cookie_returns_session() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/sessions/whoami")
            .match_header("cookie", "ory_kratos_session=abc")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(SESSION_BODY)
            .create_async()
            .await;

        let session = provider(&server.url())
            .whoami(&cookie("ory_kratos_session=abc"))
            .await
            .unwrap();

        assert_eq!(session.id, "sess-42");
        assert_eq!(session.identity.id, "ident-7");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_bearer_token_forwarded_as_session_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/sessions/whoami")
            .match_header("x-session-token", "tok-1")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(SESSION_BODY)
            .create_async()
            .await;

        let credential = SessionCredential {
            cookie: None,
            token: Some("tok-1".to_string()),
        };
        assert!(provider(&server.url()).whoami(&credential).await.is_ok());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_unauthorized_is_rejected() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/sessions/whoami")
            .with_status(401)
            .create_async()
            .await;

        let err = provider(&server.url())
            .whoami(&cookie("ory_kratos_session=stale"))
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::Rejected(401)));
    }

    #[tokio::test]
    async fn test_inactive_session_is_rejected() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/sessions/whoami")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id": "s", "active": false, "identity": {"id": "i"}}"#)
            .create_async()
            .await;

        let err = provider(&server.url())
            .whoami(&cookie("ory_kratos_session=abc"))
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::Inactive));
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/sessions/whoami")
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let err = provider(&server.url())
            .whoami(&cookie("ory_kratos_session=abc"))
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_missing_credential_skips_network() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/sessions/whoami")
            .expect(0)
            .create_async()
            .await;

        let err = provider(&server.url())
            .whoami(&SessionCredential::default())
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::MissingCredential));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_unreachable_provider() {
        // Bind then drop to get a port with nothing listening on it
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = provider(&format!("http://{}", addr))
            .whoami(&cookie("ory_kratos_session=abc"))
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::Unreachable(_)));
    }
}
