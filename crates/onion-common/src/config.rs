//! Port layout and hop address resolution.
//!
//! Every service of a run lives at a predictable address: the directory on
//! one port, relay `n` on `base_relay_port + n`, user `n` on
//! `base_user_port + n`. Relays resolve the next hop of a peeled layer
//! through a [`HopResolver`]; the directory only ever stores public keys.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use onion_core::{NextHop, NodeId, UserId};

use crate::error::{Error, Result};

pub const DEFAULT_REGISTRY_PORT: u16 = 8080;
pub const DEFAULT_BASE_RELAY_PORT: u16 = 4000;
pub const DEFAULT_BASE_USER_PORT: u16 = 3000;

pub fn env_bool(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(value) => matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Err(_) => default,
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| Error::config(format!("{} has an invalid value: {:?}", name, value))),
        Err(_) => Ok(default),
    }
}

/// Refuse to bind outside loopback unless explicitly allowed.
pub fn check_public_bind_allowed(addr: SocketAddr) -> Result<()> {
    if addr.ip().is_loopback() {
        return Ok(());
    }
    if env_bool("ONION_ALLOW_PUBLIC_BIND", false) {
        return Ok(());
    }
    Err(Error::config(format!(
        "refusing non-loopback bind to {} without ONION_ALLOW_PUBLIC_BIND=1",
        addr
    )))
}

/// Maps a next hop to the base URL of the service behind it.
pub trait HopResolver: Send + Sync {
    fn relay_url(&self, node_id: NodeId) -> Option<String>;

    fn user_url(&self, user_id: UserId) -> Option<String>;

    fn hop_url(&self, hop: NextHop) -> Option<String> {
        match hop {
            NextHop::Relay(id) => self.relay_url(id),
            NextHop::User(id) => self.user_url(id),
        }
    }
}

/// Fixed port arithmetic shared by every process of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortLayout {
    pub host: IpAddr,
    pub registry_port: u16,
    pub base_relay_port: u16,
    pub base_user_port: u16,
}

impl Default for PortLayout {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            registry_port: DEFAULT_REGISTRY_PORT,
            base_relay_port: DEFAULT_BASE_RELAY_PORT,
            base_user_port: DEFAULT_BASE_USER_PORT,
        }
    }
}

impl PortLayout {
    /// Defaults overridden by `ONION_HOST`, `ONION_REGISTRY_PORT`,
    /// `ONION_BASE_RELAY_PORT` and `ONION_BASE_USER_PORT`.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            host: env_parse("ONION_HOST", defaults.host)?,
            registry_port: env_parse("ONION_REGISTRY_PORT", defaults.registry_port)?,
            base_relay_port: env_parse("ONION_BASE_RELAY_PORT", defaults.base_relay_port)?,
            base_user_port: env_parse("ONION_BASE_USER_PORT", defaults.base_user_port)?,
        })
    }

    pub fn registry_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.registry_port)
    }

    pub fn registry_url(&self) -> String {
        format!("http://{}", self.registry_addr())
    }

    /// `None` if the port would overflow.
    pub fn relay_addr(&self, node_id: NodeId) -> Option<SocketAddr> {
        offset_port(self.base_relay_port, node_id.0).map(|port| SocketAddr::new(self.host, port))
    }

    pub fn user_addr(&self, user_id: UserId) -> Option<SocketAddr> {
        offset_port(self.base_user_port, user_id.0).map(|port| SocketAddr::new(self.host, port))
    }
}

fn offset_port(base: u16, offset: u32) -> Option<u16> {
    u16::try_from(offset).ok().and_then(|o| base.checked_add(o))
}

impl HopResolver for PortLayout {
    fn relay_url(&self, node_id: NodeId) -> Option<String> {
        self.relay_addr(node_id).map(|addr| format!("http://{}", addr))
    }

    fn user_url(&self, user_id: UserId) -> Option<String> {
        self.user_addr(user_id).map(|addr| format!("http://{}", addr))
    }
}

/// Explicit address table, for networks bound to arbitrary ports.
#[derive(Debug, Clone, Default)]
pub struct StaticRoutes {
    relays: HashMap<NodeId, SocketAddr>,
    users: HashMap<UserId, SocketAddr>,
}

impl StaticRoutes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_relay(mut self, node_id: NodeId, addr: SocketAddr) -> Self {
        self.relays.insert(node_id, addr);
        self
    }

    pub fn with_user(mut self, user_id: UserId, addr: SocketAddr) -> Self {
        self.users.insert(user_id, addr);
        self
    }
}

impl HopResolver for StaticRoutes {
    fn relay_url(&self, node_id: NodeId) -> Option<String> {
        self.relays.get(&node_id).map(|addr| format!("http://{}", addr))
    }

    fn user_url(&self, user_id: UserId) -> Option<String> {
        self.users.get(&user_id).map(|addr| format!("http://{}", addr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout_matches_port_convention() {
        let layout = PortLayout::default();
        assert_eq!(layout.registry_url(), "http://127.0.0.1:8080");
        assert_eq!(
            layout.relay_url(NodeId(2)).as_deref(),
            Some("http://127.0.0.1:4002")
        );
        assert_eq!(
            layout.hop_url(NextHop::User(UserId(7))).as_deref(),
            Some("http://127.0.0.1:3007")
        );
    }

    #[test]
    fn test_port_overflow_is_unresolvable() {
        let layout = PortLayout::default();
        assert!(layout.relay_addr(NodeId(70_000)).is_none());
        assert!(layout.user_addr(UserId(u32::MAX)).is_none());
    }

    #[test]
    fn test_static_routes() {
        let addr: SocketAddr = "127.0.0.1:5555".parse().unwrap();
        let routes = StaticRoutes::new().with_relay(NodeId(1), addr);

        assert_eq!(
            routes.hop_url(NextHop::Relay(NodeId(1))).as_deref(),
            Some("http://127.0.0.1:5555")
        );
        assert!(routes.hop_url(NextHop::Relay(NodeId(2))).is_none());
        assert!(routes.hop_url(NextHop::User(UserId(1))).is_none());
    }

    #[test]
    fn test_loopback_bind_always_allowed() {
        assert!(check_public_bind_allowed("127.0.0.1:0".parse().unwrap()).is_ok());
    }
}
