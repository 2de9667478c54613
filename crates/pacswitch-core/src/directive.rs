//! Proxy directive codec.
//!
//! A [`ProxyDirective`] is the value a PAC decision procedure returns
//! for a request: `DIRECT`, `PROXY host:port`, `SOCKS host:port`, or
//! `SOCKS5 host:port`. HTTP and HTTPS directives may embed credentials;
//! the SOCKS directive grammar has no slot for them, so SOCKS
//! credentials are never embedded. MTProto has no native representation
//! in the grammar at all and is downgraded to its SOCKS5 transport —
//! the secret is diagnostic data, never part of the directive.

use serde::{Deserialize, Serialize};

use crate::rules::ProxyType;

/// Credentials embedded into HTTP/HTTPS directives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// A single proxy directive, renderable into PAC return-value syntax.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind")]
pub enum ProxyDirective {
    /// Connect directly.
    Direct,
    /// HTTP proxy, optionally authenticated.
    Http {
        host: String,
        port: u16,
        auth: Option<Credentials>,
    },
    /// HTTPS proxy, optionally authenticated.
    Https {
        host: String,
        port: u16,
        auth: Option<Credentials>,
    },
    /// SOCKS (v4) proxy.
    Socks { host: String, port: u16 },
    /// SOCKS5 proxy.
    Socks5 { host: String, port: u16 },
}

impl ProxyDirective {
    /// Returns true for the `DIRECT` directive.
    pub fn is_direct(&self) -> bool {
        matches!(self, ProxyDirective::Direct)
    }
}

impl std::fmt::Display for ProxyDirective {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProxyDirective::Direct => write!(f, "DIRECT"),
            ProxyDirective::Http { host, port, auth } => {
                write!(f, "HTTP {}{}:{}", auth_prefix(auth), host, port)
            }
            ProxyDirective::Https { host, port, auth } => {
                write!(f, "HTTPS {}{}:{}", auth_prefix(auth), host, port)
            }
            ProxyDirective::Socks { host, port } => write!(f, "SOCKS {host}:{port}"),
            ProxyDirective::Socks5 { host, port } => write!(f, "SOCKS5 {host}:{port}"),
        }
    }
}

fn auth_prefix(auth: &Option<Credentials>) -> String {
    match auth {
        Some(c) => format!("{}:{}@", c.username, c.password),
        None => String::new(),
    }
}

/// Encodes a proxy configuration into its directive.
///
/// Credentials are embedded only for HTTP/HTTPS and only when both the
/// username and password are non-empty.
pub fn encode(
    proxy_type: ProxyType,
    server: &str,
    port: u16,
    username: &str,
    password: &str,
) -> ProxyDirective {
    let auth = if !username.is_empty() && !password.is_empty() {
        Some(Credentials {
            username: username.to_string(),
            password: password.to_string(),
        })
    } else {
        None
    };

    match proxy_type {
        ProxyType::Direct => ProxyDirective::Direct,
        ProxyType::Http => ProxyDirective::Http {
            host: server.to_string(),
            port,
            auth,
        },
        ProxyType::Https => ProxyDirective::Https {
            host: server.to_string(),
            port,
            auth,
        },
        ProxyType::Socks4 | ProxyType::Socks5 => ProxyDirective::Socks {
            host: server.to_string(),
            port,
        },
        // MTProto rides on a SOCKS5 transport; the secret stays out of
        // the directive entirely.
        ProxyType::Mtproto => ProxyDirective::Socks5 {
            host: server.to_string(),
            port,
        },
    }
}
