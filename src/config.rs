//
// Copyright 2026 Signal Messenger, LLC
// SPDX-License-Identifier: AGPL-3.0-only
//

//! Environment-supplied configuration, read once at construction time.

use std::env;
use std::time::Duration;

/// Default public STUN resolvers used for ICE candidate discovery.
const DEFAULT_ICE_SERVERS: &[&str] = &[
    "stun:stun.l.google.com:19302",
    "stun:global.stun.twilio.com:3478",
];

const DEFAULT_RELAY_URL: &str = "ws://127.0.0.1:8080";
const DEFAULT_RELAY_PATH: &str = "/ws";

/// How long a session may sit between answer exchange and remote media
/// arrival before it is torn down as failed.
pub const DEFAULT_NEGOTIATION_TIMEOUT: Duration = Duration::from_secs(60);

/// Configuration consumed by the call core.
#[derive(Clone, Debug)]
pub struct CallConfig {
    /// The relay service endpoint, e.g. `wss://relay.example.org`.
    pub relay_url: String,
    /// Path segment for proxying the relay through a shared gateway.
    pub relay_path: String,
    /// ICE server URLs handed to the peer connection.
    pub ice_servers: Vec<String>,
    /// Negotiation timeout; see [`DEFAULT_NEGOTIATION_TIMEOUT`].
    pub negotiation_timeout: Duration,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            relay_url: DEFAULT_RELAY_URL.to_string(),
            relay_path: DEFAULT_RELAY_PATH.to_string(),
            ice_servers: DEFAULT_ICE_SERVERS.iter().map(|s| s.to_string()).collect(),
            negotiation_timeout: DEFAULT_NEGOTIATION_TIMEOUT,
        }
    }
}

impl CallConfig {
    /// Reads `RELAY_URL`, `RELAY_PATH` and `ICE_SERVERS` (comma separated),
    /// falling back to the defaults for anything unset.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            relay_url: env::var("RELAY_URL").unwrap_or(defaults.relay_url),
            relay_path: env::var("RELAY_PATH").unwrap_or(defaults.relay_path),
            ice_servers: env::var("ICE_SERVERS")
                .map(|v| parse_ice_servers(&v))
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.ice_servers),
            negotiation_timeout: defaults.negotiation_timeout,
        }
    }

    /// The full websocket endpoint the signaling client dials.
    pub fn relay_endpoint(&self) -> String {
        let url = self.relay_url.trim_end_matches('/');
        let path = self.relay_path.trim_start_matches('/');
        if path.is_empty() {
            url.to_string()
        } else {
            format!("{}/{}", url, path)
        }
    }
}

fn parse_ice_servers(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_ice_server_list() {
        let servers = parse_ice_servers("stun:a.example.org:3478, stun:b.example.org:3478,");
        assert_eq!(
            servers,
            vec!["stun:a.example.org:3478", "stun:b.example.org:3478"]
        );
        assert!(parse_ice_servers(" , ").is_empty());
    }

    #[test]
    fn relay_endpoint_joins_url_and_path() {
        let config = CallConfig {
            relay_url: "wss://relay.example.org/".to_string(),
            relay_path: "/gateway/ws".to_string(),
            ..CallConfig::default()
        };
        assert_eq!(config.relay_endpoint(), "wss://relay.example.org/gateway/ws");

        let config = CallConfig {
            relay_path: "".to_string(),
            ..CallConfig::default()
        };
        assert_eq!(config.relay_endpoint(), "ws://127.0.0.1:8080");
    }
}
