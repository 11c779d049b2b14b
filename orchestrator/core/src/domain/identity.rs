// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Identity Provider Contract
//!
//! The HTTP gateway never authenticates callers itself. Every request is
//! checked against an external Identity Provider (Ory Kratos compatible) which
//! answers a whoami call with the caller's [`Session`].
//!
//! Only the contract lives here; the HTTP adapter is
//! `crate::infrastructure::kratos_client::KratosIdentityProvider`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Credentials lifted off an inbound HTTP request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionCredential {
    /// Raw `Cookie` header, forwarded verbatim
    pub cookie: Option<String>,
    /// Bearer token, forwarded as `X-Session-Token`
    pub token: Option<String>,
}

impl SessionCredential {
    pub fn is_empty(&self) -> bool {
        self.cookie.is_none() && self.token.is_none()
    }
}

/// Session as returned by the provider's whoami endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    #[serde(default)]
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub identity: Identity,
}

impl Session {
    /// A session is usable when the provider marks it active and it has not expired.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.active && self.expires_at.map_or(true, |expires_at| expires_at > now)
    }
}

/// Identity claims attached to a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    #[serde(default)]
    pub traits: serde_json::Value,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolve the credential to a session, or fail.
    async fn whoami(&self, credential: &SessionCredential) -> Result<Session, IdentityError>;
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("no session credential on request")]
    MissingCredential,

    #[error("session rejected by identity provider (status {0})")]
    Rejected(u16),

    #[error("session is inactive or expired")]
    Inactive,

    #[error("identity provider unreachable: {0}")]
    Unreachable(String),

    #[error("malformed identity provider response: {0}")]
    MalformedResponse(String),
}

impl IdentityError {
    /// Short label used for log fields and metric tags.
    pub fn reason(&self) -> &'static str {
        match self {
            IdentityError::MissingCredential => "missing_credential",
            IdentityError::Rejected(_) => "rejected",
            IdentityError::Inactive => "inactive",
            IdentityError::Unreachable(_) => "unreachable",
            IdentityError::MalformedResponse(_) => "malformed_response",
        }
    }
}
