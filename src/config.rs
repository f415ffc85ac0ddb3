//! Client configuration.
//!
//! Loaded from a TOML key-value file; every key is optional and falls
//! back to its default, so an empty file (or no file at all) yields a
//! usable configuration.
//!
//! # Example
//!
//! ```toml
//! verbosity = 3
//! clt_pub_port = 77778
//! clt_dlr_port = 77777
//! query_timeout = 2000
//! client_name = "DemoClient"
//! ```

use std::time::Duration;

use serde::Deserialize;
use tracing::level_filters::LevelFilter;

use crate::error::Result;

/// Configuration for a [`Client`](crate::Client).
///
/// Field names match the configuration-file keys one to one.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Log filter threshold: 0 = off, 1 = error, 2 = warn, 3 = info,
    /// 4 and up = debug.
    pub verbosity: i32,
    /// Reserved; parsed but not currently honored.
    pub max_retries: u32,
    /// TCP port bound by the PUB socket (write queries).
    pub clt_pub_port: u32,
    /// TCP port bound by the DEALER socket (read queries, responses).
    pub clt_dlr_port: u32,
    /// PUB socket send timeout in milliseconds.
    pub clt_pub_socket_timeout: i32,
    /// DEALER socket send/receive timeout in milliseconds.
    pub clt_dlr_socket_timeout: i32,
    /// Receive-poll timeout in milliseconds.
    pub inpoll_timeout: i64,
    /// Send-poll timeout in milliseconds.
    pub outpoll_timeout: i64,
    /// Default caller deadline in milliseconds.
    pub query_timeout: u64,
    /// Reserved timer for resend attempts; parsed but not wired.
    pub resend_period_ms: u64,
    /// Reserved timer for stats printouts; parsed but not wired.
    pub print_stats_period_ms: u64,
    /// Path to an announcer config file. Reserved; the announcer is
    /// tuned by the `broadcast_*` keys below.
    pub service_discovery_config: Option<String>,
    /// Human-readable name carried in discovery beacons.
    pub client_name: String,
    /// When set, the embedding environment already runs a service
    /// announcer and the client will not start its own.
    pub service_discovery_address: Option<String>,
    /// UDP multicast group for discovery beacons.
    pub broadcast_address: String,
    /// UDP multicast port for discovery beacons.
    pub broadcast_port: u16,
    /// Seconds between discovery beacons.
    pub broadcast_period_secs: u64,
    /// Nominal remote-control port advertised in beacons.
    pub remote_control_port: u16,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            verbosity: 3,
            max_retries: 3,
            clt_pub_port: 77778,
            clt_dlr_port: 77777,
            clt_pub_socket_timeout: 500,
            clt_dlr_socket_timeout: 500,
            inpoll_timeout: 500,
            outpoll_timeout: 500,
            query_timeout: 2000,
            resend_period_ms: 1000,
            print_stats_period_ms: 5000,
            service_discovery_config: None,
            client_name: "DemoClient".to_string(),
            service_discovery_address: None,
            broadcast_address: "239.192.1.1".to_string(),
            broadcast_port: 5000,
            broadcast_period_secs: 5,
            remote_control_port: 24011,
        }
    }
}

impl ClientConfig {
    /// Load configuration from a TOML file.
    pub fn from_path(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Default caller deadline as a [`Duration`].
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout)
    }

    /// Map `verbosity` onto a tracing level filter.
    ///
    /// A message class is logged when its index (error = 0, warn = 1,
    /// info = 2, debug = 3) is below `verbosity`.
    pub fn level_filter(&self) -> LevelFilter {
        match self.verbosity {
            i32::MIN..=0 => LevelFilter::OFF,
            1 => LevelFilter::ERROR,
            2 => LevelFilter::WARN,
            3 => LevelFilter::INFO,
            _ => LevelFilter::DEBUG,
        }
    }
}
