// ── Connection options handed to a reactor ──
//
// These describe *what* to connect to and the transport tuning the access
// layer forwards. The reactor owns everything about *how*: retries,
// encryption, socket registration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

/// Options for a single channel connection attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectOptions {
    /// Display name for this channel in logs and channel info.
    pub name: String,

    /// Endpoint to connect to (e.g. `omm://feed.example.com:14002`).
    pub endpoint: Url,

    /// Local interface to bind, when the host has several.
    pub interface: Option<String>,

    /// How long establishment may take before the reactor gives up.
    pub connect_timeout: Duration,

    /// Ping interval the reactor negotiates with the peer.
    pub ping_timeout: Duration,

    /// Guaranteed output buffer count requested from the transport.
    pub guaranteed_output_buffers: u32,

    /// Initial high-water mark, applied via ioctl once the channel is up.
    pub high_water_mark: Option<u64>,

    /// Initial compression threshold, applied via ioctl once the channel
    /// is up.
    pub compression_threshold: Option<u64>,

    /// Component version string advertised to the peer.
    pub component_version: Option<String>,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            name: "Channel_1".to_owned(),
            // The placeholder parses unconditionally; real callers override it.
            #[allow(clippy::unwrap_used)]
            endpoint: Url::parse("omm://localhost:14002").unwrap(),
            interface: None,
            connect_timeout: Duration::from_secs(5),
            ping_timeout: Duration::from_secs(30),
            guaranteed_output_buffers: 100,
            high_water_mark: None,
            compression_threshold: None,
            component_version: None,
        }
    }
}

impl ConnectOptions {
    pub fn new(name: impl Into<String>, endpoint: Url) -> Self {
        Self {
            name: name.into(),
            endpoint,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let opts = ConnectOptions::default();
        assert_eq!(opts.endpoint.scheme(), "omm");
        assert_eq!(opts.connect_timeout, Duration::from_secs(5));
        assert!(opts.high_water_mark.is_none());
    }
}
