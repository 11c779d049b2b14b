// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Service Configuration Types
//
// Defines the configuration schema for a todolist service process:
// - gRPC listener and loopback dial settings
// - HTTP gateway listener and timeouts
// - Identity Provider endpoints
// - Storage backend selection

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::repository::{PostgresConfig, StorageBackend};

/// Top-level service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// gRPC listener configuration
    #[serde(default)]
    pub grpc: GrpcConfig,

    /// HTTP gateway configuration
    #[serde(default)]
    pub http: HttpConfig,

    /// Identity Provider endpoints
    #[serde(default)]
    pub identity: IdentityConfig,

    /// Storage backend
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrpcConfig {
    /// Network bind address (e.g. "127.0.0.1")
    #[serde(default = "default_grpc_bind_address")]
    pub bind_address: String,

    /// gRPC API port (0 picks an ephemeral port)
    #[serde(default = "default_grpc_port")]
    pub port: u16,

    /// Upper bound for the gateway's loopback dial, including waiting for
    /// the gRPC listener to come up
    #[serde(default = "default_dial_timeout")]
    pub dial_timeout_seconds: u64,

    /// Deadline applied to every loopback call
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for GrpcConfig {
    fn default() -> Self {
        Self {
            bind_address: default_grpc_bind_address(),
            port: default_grpc_port(),
            dial_timeout_seconds: default_dial_timeout(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

impl GrpcConfig {
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        parse_socket_addr(&self.bind_address, self.port)
    }

    pub fn dial_timeout(&self) -> Duration {
        Duration::from_secs(self.dial_timeout_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Network bind address (e.g. "0.0.0.0")
    #[serde(default = "default_http_bind_address")]
    pub bind_address: String,

    /// HTTP gateway port (0 picks an ephemeral port)
    #[serde(default = "default_http_port")]
    pub port: u16,

    /// Budget for receiving a request body
    #[serde(default = "default_read_timeout")]
    pub read_timeout_seconds: u64,

    /// Budget for producing and writing a response
    #[serde(default = "default_write_timeout")]
    pub write_timeout_seconds: u64,

    /// How long a keep-alive connection may sit without traffic
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_seconds: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_address: default_http_bind_address(),
            port: default_http_port(),
            read_timeout_seconds: default_read_timeout(),
            write_timeout_seconds: default_write_timeout(),
            idle_timeout_seconds: default_idle_timeout(),
        }
    }
}

impl HttpConfig {
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        parse_socket_addr(&self.bind_address, self.port)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_seconds)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_seconds)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Public API base URL; `/sessions/whoami` is resolved against it
    #[serde(default = "default_identity_api_url")]
    pub api_url: String,

    /// Login UI that unauthenticated browsers are redirected to
    #[serde(default = "default_identity_ui_url")]
    pub ui_url: String,

    /// Timeout for a single whoami call
    #[serde(default = "default_identity_timeout")]
    pub timeout_seconds: u64,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            api_url: default_identity_api_url(),
            ui_url: default_identity_ui_url(),
            timeout_seconds: default_identity_timeout(),
        }
    }
}

impl IdentityConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorageKind {
    #[default]
    InMemory,
    Postgres,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Backend type
    #[serde(default)]
    pub backend: StorageKind,

    /// Connection string (required for postgres)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl StorageConfig {
    /// Resolve into the domain's backend selector
    pub fn backend(&self) -> anyhow::Result<StorageBackend> {
        match self.backend {
            StorageKind::InMemory => Ok(StorageBackend::InMemory),
            StorageKind::Postgres => {
                let url = self
                    .url
                    .clone()
                    .filter(|u| !u.is_empty())
                    .ok_or_else(|| {
                        anyhow::anyhow!("storage.url is required for the postgres backend")
                    })?;
                Ok(StorageBackend::PostgreSQL(PostgresConfig {
                    connection_string: url,
                }))
            }
        }
    }
}

// Default value functions
fn default_grpc_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_grpc_port() -> u16 {
    50051
}

fn default_dial_timeout() -> u64 {
    10
}

fn default_request_timeout() -> u64 {
    30
}

fn default_http_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    8080
}

fn default_read_timeout() -> u64 {
    15
}

fn default_write_timeout() -> u64 {
    15
}

fn default_idle_timeout() -> u64 {
    60
}

fn default_identity_api_url() -> String {
    "http://127.0.0.1:4433".to_string()
}

fn default_identity_ui_url() -> String {
    "http://127.0.0.1:4455/login".to_string()
}

fn default_identity_timeout() -> u64 {
    10
}

fn parse_socket_addr(host: &str, port: u16) -> anyhow::Result<SocketAddr> {
    let ip: std::net::IpAddr = host
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid bind address '{}': {}", host, e))?;
    Ok(SocketAddr::new(ip, port))
}

impl ServiceConfig {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. TODOLIST_CONFIG_PATH environment variable
    /// 2. ./todolist-config.yaml (working directory)
    /// 3. ~/.todolist/config.yaml (user home)
    /// 4. /etc/todolist/config.yaml (system, Unix)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("TODOLIST_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./todolist-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".todolist").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(unix)]
        {
            let system_config = PathBuf::from("/etc/todolist/config.yaml");
            if system_config.exists() {
                return Some(system_config);
            }
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit CLI path (fail if missing/invalid)
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    /// This allows container deployments to override config via env vars
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(val) = lookup("TODOLIST_GRPC_PORT") {
            match val.parse::<u16>() {
                Ok(port) => {
                    tracing::info!("Environment override: TODOLIST_GRPC_PORT={}", port);
                    self.grpc.port = port;
                }
                Err(_) => {
                    tracing::warn!("Invalid value for TODOLIST_GRPC_PORT: '{}'. Ignoring.", val)
                }
            }
        }

        if let Some(val) = lookup("TODOLIST_HTTP_PORT") {
            match val.parse::<u16>() {
                Ok(port) => {
                    tracing::info!("Environment override: TODOLIST_HTTP_PORT={}", port);
                    self.http.port = port;
                }
                Err(_) => {
                    tracing::warn!("Invalid value for TODOLIST_HTTP_PORT: '{}'. Ignoring.", val)
                }
            }
        }

        if let Some(val) = lookup("KRATOS_API_URL") {
            tracing::info!("Environment override: KRATOS_API_URL={}", val);
            self.identity.api_url = val;
        }

        if let Some(val) = lookup("KRATOS_UI_URL") {
            tracing::info!("Environment override: KRATOS_UI_URL={}", val);
            self.identity.ui_url = val;
        }

        if let Some(val) = lookup("DATABASE_URL") {
            tracing::info!("Environment override: DATABASE_URL (postgres backend)");
            self.storage.backend = StorageKind::Postgres;
            self.storage.url = Some(val);
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        self.grpc.socket_addr()?;
        self.http.socket_addr()?;

        if self.grpc.dial_timeout_seconds == 0 {
            anyhow::bail!("grpc.dial_timeout_seconds must be greater than zero");
        }

        if self.grpc.request_timeout_seconds == 0 {
            anyhow::bail!("grpc.request_timeout_seconds must be greater than zero");
        }

        for (field, seconds) in [
            ("http.read_timeout_seconds", self.http.read_timeout_seconds),
            ("http.write_timeout_seconds", self.http.write_timeout_seconds),
            ("http.idle_timeout_seconds", self.http.idle_timeout_seconds),
        ] {
            if seconds == 0 {
                anyhow::bail!("{} must be greater than zero", field);
            }
        }

        for (field, url) in [
            ("identity.api_url", &self.identity.api_url),
            ("identity.ui_url", &self.identity.ui_url),
        ] {
            if url.is_empty() {
                anyhow::bail!("{} cannot be empty", field);
            }
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                anyhow::bail!("{} must be an http(s) URL, got '{}'", field, url);
            }
        }

        if self.identity.timeout_seconds == 0 {
            anyhow::bail!("identity.timeout_seconds must be greater than zero");
        }

        self.storage.backend()?;

        Ok(())
    }
}
