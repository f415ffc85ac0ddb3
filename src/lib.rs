//! # sqlbus
//!
//! Remote SQL-execution client: decouples application code from a
//! database by routing queries over a ZeroMQ message bus to one or
//! more "middleman" processes that actually talk to the database.
//!
//! ## Architecture
//!
//! - **PUB socket**: write queries, broadcast to every subscribed
//!   middleman
//! - **DEALER socket**: read queries dealt round-robin, and all
//!   responses coming back
//! - **Pump**: one background thread owning both sockets, matching
//!   responses to pending requests by message id
//! - **Announcer**: UDP multicast beacons so middlemen can discover
//!   this client and connect
//!
//! Callers see a plain synchronous API with per-query deadlines.
//!
//! ## Example
//!
//! ```ignore
//! use sqlbus::Client;
//!
//! let mut client = Client::initialise("config.toml")?;
//!
//! let rows = client.send_query("rundb", "SELECT max(runnum) FROM run", None)?;
//! println!("latest run: {}", rows[0]);
//!
//! client.send_query("monitoringdb", "INSERT INTO logging VALUES (42)", None)?;
//!
//! client.finalise()?;
//! ```

pub mod config;
pub mod discovery;
pub mod error;
pub mod identity;
pub mod protocol;

mod client;
mod pump;
mod registry;
mod ticket;

pub use client::{Client, ClientBuilder, SERVICE_READ, SERVICE_WRITE};
pub use config::ClientConfig;
pub use error::{Result, SqlBusError};
pub use identity::ClientIdentity;
pub use protocol::{Query, QueryKind, QueryResponse};
pub use registry::QueryStats;
