//! Pacswitch Server - HTTP command API and apply orchestration.
//!
//! This crate exposes the named command interface the UI collaborator
//! drives, plus resource routes for rule and tab management:
//!
//! - `POST /api/commands/updateProxySettings` - validate and store settings, re-apply
//! - `POST /api/commands/updatePacFile` - regenerate and re-apply the policy
//! - `POST /api/commands/updateOptionsSettings` - store options, re-apply
//! - `POST /api/commands/updateTabProxies` - reconcile tab overrides, re-apply
//! - `POST /api/commands/resetSettings` - wipe everything, re-apply
//! - `POST /api/commands/runDiagnostics` - configuration and policy summary
//! - `POST /api/commands/reloadTelegramProxy` - reinstall Telegram rules
//! - `POST /api/commands/diagnoseMTProtoSupport` - MTProto support report
//! - `POST /api/commands/convertMTProtoToSOCKS5` - downgrade MTProto configs
//! - `GET/PUT /api/rules`, `GET/PUT /api/tabs`, `GET /api/policy`
//!
//! Every command responds exactly once with `{success, error?, data?}`;
//! applies behind the commands serialize through a single worker task.
//!
//! ## Example
//!
//! ```no_run
//! use pacswitch_server::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let server = Server::new(ServerConfig::default()).await.unwrap();
//!     server.run().await.unwrap();
//! }
//! ```

pub mod apply;
pub mod error;
mod handlers;
pub mod models;
pub mod state;
pub mod tabs;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::Router;
use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use pacswitch_proxy::MemoryTarget;
use pacswitch_storage::Database;

pub use apply::{ApplyHandle, ApplyOutcome, ApplyTrigger, APPLY_TIMEOUT};
pub use error::{ApiError, Result};
pub use state::AppState;
pub use tabs::{StaticTabProvider, TabInfo, TabProvider};

/// Default server port.
pub const DEFAULT_PORT: u16 = 48650;

/// Default server host (localhost only for security).
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind to (default: 127.0.0.1).
    pub host: String,
    /// Port to bind to.
    pub port: u16,
    /// Database path (None = in-memory).
    pub db_path: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            db_path: None,
        }
    }
}

impl ServerConfig {
    /// Creates a config with a specific database path.
    pub fn with_db_path(path: impl Into<String>) -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            db_path: Some(path.into()),
        }
    }

    /// Sets the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

/// Server error types.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to address.
    #[error("failed to bind to {0}: {1}")]
    BindError(SocketAddr, std::io::Error),

    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] pacswitch_storage::StorageError),

    /// Server runtime error.
    #[error("server error: {0}")]
    Runtime(String),
}

/// The HTTP API server.
pub struct Server {
    router: Router,
    addr: SocketAddr,
}

impl Server {
    /// Creates a new server with the given configuration, a memory
    /// policy target, and an empty tab provider.
    pub async fn new(config: ServerConfig) -> std::result::Result<Self, ServerError> {
        let db = if let Some(ref path) = config.db_path {
            Database::with_path(path)?
        } else {
            Database::in_memory()?
        };

        let state = AppState::new(
            db,
            Arc::new(MemoryTarget::new()),
            Arc::new(StaticTabProvider::new()),
        );
        Self::with_state(config, state)
    }

    /// Creates a server with custom application state.
    pub fn with_state(
        config: ServerConfig,
        state: AppState,
    ) -> std::result::Result<Self, ServerError> {
        // Set up CORS for the browser extension origin
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        let router = build_router(state).layer(cors);

        let addr = format!("{}:{}", config.host, config.port)
            .parse()
            .map_err(|e| ServerError::Runtime(format!("invalid address: {}", e)))?;

        Ok(Self { router, addr })
    }

    /// Returns the server address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Runs the server until shutdown.
    pub async fn run(self) -> std::result::Result<(), ServerError> {
        info!("Starting Pacswitch API server on {}", self.addr);

        // Create socket with SO_REUSEADDR to allow binding even when sockets are lingering
        let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))
            .map_err(|e| ServerError::BindError(self.addr, e))?;

        socket
            .set_reuse_address(true)
            .map_err(|e| ServerError::BindError(self.addr, e))?;

        socket
            .bind(&self.addr.into())
            .map_err(|e| ServerError::BindError(self.addr, e))?;
        socket
            .listen(128)
            .map_err(|e| ServerError::BindError(self.addr, e))?;

        // Set non-blocking for tokio
        socket
            .set_nonblocking(true)
            .map_err(|e| ServerError::BindError(self.addr, e))?;

        let std_listener: std::net::TcpListener = socket.into();
        let listener = tokio::net::TcpListener::from_std(std_listener)
            .map_err(|e| ServerError::BindError(self.addr, e))?;

        axum::serve(listener, self.router)
            .await
            .map_err(|e| ServerError::Runtime(e.to_string()))?;

        Ok(())
    }

    /// Returns the router for testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }
}

/// Builds the API router for the given state.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/commands/updateProxySettings",
            post(handlers::update_proxy_settings),
        )
        .route("/api/commands/updatePacFile", post(handlers::update_pac_file))
        .route(
            "/api/commands/updateOptionsSettings",
            post(handlers::update_options_settings),
        )
        .route(
            "/api/commands/updateTabProxies",
            post(handlers::update_tab_proxies),
        )
        .route("/api/commands/resetSettings", post(handlers::reset_settings))
        .route("/api/commands/runDiagnostics", post(handlers::run_diagnostics))
        .route(
            "/api/commands/reloadTelegramProxy",
            post(handlers::reload_telegram_proxy),
        )
        .route(
            "/api/commands/diagnoseMTProtoSupport",
            post(handlers::diagnose_mtproto_support),
        )
        .route(
            "/api/commands/convertMTProtoToSOCKS5",
            post(handlers::convert_mtproto_to_socks5),
        )
        .route("/api/rules", get(handlers::get_rules))
        .route("/api/rules", put(handlers::replace_rules))
        .route("/api/tabs", get(handlers::get_tabs))
        .route("/api/tabs", put(handlers::replace_tab_rules))
        .route("/api/policy", get(handlers::get_policy))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::json;
    use tower::ServiceExt;

    use pacswitch_core::rules::{DomainRule, ProxyType};

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn post_empty(uri: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_update_proxy_settings_success() {
        let state = AppState::in_memory();
        let app = build_router(state.clone());

        let request = post_json(
            "/api/commands/updateProxySettings",
            json!({"settings": {
                "enabled": true,
                "proxy_type": "http",
                "server": "10.0.0.1",
                "port": 3128,
                "username": "u",
                "password": "p"
            }}),
        );

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["success"], true);

        // The fixed policy landed on the target
        let applied = state.target.policy().unwrap();
        assert_eq!(applied.mode(), "fixed_servers");
    }

    #[tokio::test]
    async fn test_update_proxy_settings_rejects_missing_server() {
        let app = build_router(AppState::in_memory());

        let request = post_json(
            "/api/commands/updateProxySettings",
            json!({"settings": {"enabled": true, "proxy_type": "http"}}),
        );

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["success"], false);
        assert!(json["error"].as_str().unwrap().contains("server"));
    }

    #[tokio::test]
    async fn test_update_proxy_settings_rejects_mtproto_without_secret() {
        let app = build_router(AppState::in_memory());

        let request = post_json(
            "/api/commands/updateProxySettings",
            json!({"settings": {
                "enabled": true,
                "proxy_type": "mtproto",
                "server": "1.2.3.4",
                "port": 443
            }}),
        );

        let response = app.oneshot(request).await.unwrap();
        let json = body_json(response).await;
        assert_eq!(json["success"], false);
        assert!(json["error"].as_str().unwrap().contains("secret"));
    }

    #[tokio::test]
    async fn test_mtproto_settings_install_telegram_rules() {
        let state = AppState::in_memory();
        let app = build_router(state.clone());

        let request = post_json(
            "/api/commands/updateProxySettings",
            json!({"settings": {
                "enabled": true,
                "proxy_type": "mtproto",
                "server": "1.2.3.4",
                "port": 443,
                "mtproto_secret": "dd00ff"
            }}),
        );

        let response = app.oneshot(request).await.unwrap();
        let json = body_json(response).await;
        assert_eq!(json["success"], true);

        let rules = state.db.get_domain_rules().unwrap();
        assert_eq!(rules.len(), 5);
        assert!(rules.iter().all(|r| r.proxy_type == ProxyType::Mtproto));

        // Which forces a PAC policy covering Telegram
        let applied = state.target.policy().unwrap();
        assert_eq!(applied.mode(), "pac_script");
        assert!(applied.script().unwrap().contains("SOCKS5 1.2.3.4:443"));
    }

    #[tokio::test]
    async fn test_update_pac_file_with_rules() {
        let state = AppState::in_memory();
        state
            .db
            .add_domain_rule(
                &DomainRule::new("*.example.com", ProxyType::Socks5).with_server("s", 1080),
            )
            .unwrap();
        let app = build_router(state.clone());

        let response = app
            .oneshot(post_empty("/api/commands/updatePacFile"))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["success"], true);

        let applied = state.target.policy().unwrap();
        assert_eq!(applied.mode(), "pac_script");
        assert!(applied.script().unwrap().contains("SOCKS s:1080"));
    }

    #[tokio::test]
    async fn test_update_options_rejects_bad_custom_pac() {
        let app = build_router(AppState::in_memory());

        let request = post_json(
            "/api/commands/updateOptionsSettings",
            json!({"options": {"use_custom_pac": true, "custom_pac_script": "nope"}}),
        );

        let response = app.oneshot(request).await.unwrap();
        let json = body_json(response).await;
        assert_eq!(json["success"], false);
    }

    #[tokio::test]
    async fn test_update_tab_proxies_with_inline_tabs() {
        let state = AppState::in_memory();
        let rule = DomainRule::new("*.example.com", ProxyType::Socks5).with_server("s", 1080);
        state.db.add_domain_rule(&rule).unwrap();
        state
            .db
            .replace_tab_rules(&[pacswitch_core::rules::TabRule {
                tab_id: 7,
                assignment: pacswitch_core::rules::TabAssignment::Rule(rule.id.clone()),
            }])
            .unwrap();
        let app = build_router(state.clone());

        let request = post_json(
            "/api/commands/updateTabProxies",
            json!({"tabs": [{"id": 7, "url": "https://app.example.com/x", "title": "App"}]}),
        );

        let response = app.oneshot(request).await.unwrap();
        let json = body_json(response).await;
        assert_eq!(json["success"], true);

        let patterns = state.db.get_tab_patterns().unwrap();
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].pattern, "app.example.com");
    }

    #[tokio::test]
    async fn test_update_tab_proxies_without_body_uses_provider() {
        let state = AppState::in_memory();
        let app = build_router(state.clone());

        let response = app
            .oneshot(post_empty("/api/commands/updateTabProxies"))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["success"], true);
        assert!(state.db.get_tab_patterns().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reset_settings_wipes_and_goes_direct() {
        let state = AppState::in_memory();
        state
            .db
            .add_domain_rule(
                &DomainRule::new("*.example.com", ProxyType::Socks5).with_server("s", 1080),
            )
            .unwrap();
        let app = build_router(state.clone());

        let response = app
            .oneshot(post_empty("/api/commands/resetSettings"))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["success"], true);

        assert!(state.db.get_domain_rules().unwrap().is_empty());
        assert_eq!(state.target.policy().unwrap().mode(), "direct");
    }

    #[tokio::test]
    async fn test_run_diagnostics() {
        let app = build_router(AppState::in_memory());

        let response = app
            .oneshot(post_empty("/api/commands/runDiagnostics"))
            .await
            .unwrap();
        let json = body_json(response).await;

        assert_eq!(json["success"], true);
        assert_eq!(json["data"]["settings_enabled"], false);
        assert_eq!(json["data"]["domain_rule_count"], 0);
        assert_eq!(json["data"]["mtproto_active"], false);
    }

    #[tokio::test]
    async fn test_reload_telegram_proxy_without_config_fails() {
        let app = build_router(AppState::in_memory());

        let response = app
            .oneshot(post_empty("/api/commands/reloadTelegramProxy"))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["success"], false);
        assert!(json["error"].as_str().unwrap().contains("MTProto"));
    }

    #[tokio::test]
    async fn test_reload_telegram_proxy_with_mtproto_settings() {
        let state = AppState::in_memory();
        state
            .db
            .set_settings(&pacswitch_core::rules::GlobalSettings {
                enabled: true,
                proxy_type: ProxyType::Mtproto,
                server: "1.2.3.4".to_string(),
                port: 443,
                mtproto_secret: "dd00".to_string(),
                ..Default::default()
            })
            .unwrap();
        let app = build_router(state.clone());

        let response = app
            .oneshot(post_empty("/api/commands/reloadTelegramProxy"))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["data"]["rules_installed"], 5);
    }

    #[tokio::test]
    async fn test_diagnose_mtproto_support_reports_rules() {
        let state = AppState::in_memory();
        state
            .db
            .add_domain_rule(
                &DomainRule::new("*.telegram.org", ProxyType::Mtproto)
                    .with_server("1.2.3.4", 443)
                    .with_secret("dd00"),
            )
            .unwrap();
        let app = build_router(state.clone());

        let response = app
            .oneshot(post_empty("/api/commands/diagnoseMTProtoSupport"))
            .await
            .unwrap();
        let json = body_json(response).await;

        assert_eq!(json["success"], true);
        assert_eq!(json["data"]["telegram_rules"].as_array().unwrap().len(), 1);
        assert!(json["data"]["telegram_pac_matches"].as_u64().unwrap() >= 1);
        assert!(json["data"]["recommendation"].as_str().unwrap().len() > 0);
    }

    #[tokio::test]
    async fn test_convert_mtproto_to_socks5() {
        let state = AppState::in_memory();
        state
            .db
            .add_domain_rule(
                &DomainRule::new("t.me", ProxyType::Mtproto)
                    .with_server("1.2.3.4", 443)
                    .with_secret("dd00"),
            )
            .unwrap();
        let app = build_router(state.clone());

        let response = app
            .oneshot(post_empty("/api/commands/convertMTProtoToSOCKS5"))
            .await
            .unwrap();
        let json = body_json(response).await;

        assert_eq!(json["success"], true);
        assert_eq!(json["data"]["rules_converted"], 1);
        assert_eq!(json["data"]["settings_converted"], false);

        let rules = state.db.get_domain_rules().unwrap();
        assert_eq!(rules[0].proxy_type, ProxyType::Socks5);
        assert!(rules[0].mtproto_secret.is_empty());
    }

    #[tokio::test]
    async fn test_rules_resource_roundtrip() {
        let state = AppState::in_memory();
        let app = build_router(state.clone());

        let rule = DomainRule::new("*.example.com", ProxyType::Socks5).with_server("s", 1080);
        let request = Request::builder()
            .method("PUT")
            .uri("/api/rules")
            .header("content-type", "application/json")
            .body(Body::from(json!({"rules": [rule]}).to_string()))
            .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/api/rules")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["rules"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_replace_rules_validates() {
        let app = build_router(AppState::in_memory());

        // SOCKS5 rule without a server is rejected with 400
        let request = Request::builder()
            .method("PUT")
            .uri("/api/rules")
            .header("content-type", "application/json")
            .body(Body::from(
                json!({"rules": [{"pattern": "*.example.com", "proxy_type": "socks5"}]})
                    .to_string(),
            ))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_get_policy_reflects_target() {
        let state = AppState::in_memory();
        let app = build_router(state.clone());

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/api/policy")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let json = body_json(response).await;
        assert!(json["policy"].is_null());

        app.clone()
            .oneshot(post_empty("/api/commands/updatePacFile"))
            .await
            .unwrap();

        let response = app
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/api/policy")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["policy"]["mode"], "direct");
    }

    #[tokio::test]
    async fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, DEFAULT_PORT);
        assert!(config.db_path.is_none());
    }

    #[tokio::test]
    async fn test_server_config_with_port() {
        let config = ServerConfig::default().with_port(9000);
        assert_eq!(config.port, 9000);
    }
}
