//! Client builder, lifecycle, and the synchronous query API.
//!
//! The [`Client`] manages the lifecycle:
//! 1. Load configuration and initialise logging
//! 2. Bind the PUB and DEALER sockets
//! 3. Start the service announcer (unless the embedder runs one)
//! 4. Start the background pump
//!
//! Callers then issue blocking [`send_query`](Client::send_query)
//! calls from any number of threads; the pump does all socket I/O and
//! hands results back through one-shot tickets.
//!
//! # Example
//!
//! ```ignore
//! use sqlbus::Client;
//!
//! let mut client = Client::initialise("config.toml")?;
//! let rows = client.send_query("rundb", "SELECT max(runnum) FROM run", None)?;
//! client.finalise()?;
//! ```

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::config::ClientConfig;
use crate::discovery::ServiceAnnouncer;
use crate::error::{Result, SqlBusError};
use crate::identity::ClientIdentity;
use crate::protocol::{Query, SendOutcome};
use crate::pump::Pump;
use crate::registry::{PendingRegistry, QueryStats};

/// Discovery name of the write (PUB) service.
pub const SERVICE_WRITE: &str = "psql_write";
/// Discovery name of the read (DEALER) service.
pub const SERVICE_READ: &str = "psql_read";

/// Hard cap on each internal ticket wait, guarding against a stuck
/// pump or a silent middleman even when the caller deadline is long.
const INTERNAL_WAIT_CAP: Duration = Duration::from_secs(30);

/// Builder for configuring and starting a [`Client`].
///
/// Embedders use it to share facilities the client would otherwise
/// create itself: a `zmq::Context` and a running service announcer.
pub struct ClientBuilder {
    config: Option<ClientConfig>,
    config_path: Option<String>,
    context: Option<zmq::Context>,
    external_discovery: bool,
}

impl ClientBuilder {
    /// Create a builder with nothing configured; `start` will fall
    /// back to the default configuration.
    pub fn new() -> Self {
        Self {
            config: None,
            config_path: None,
            context: None,
            external_discovery: false,
        }
    }

    /// Load configuration from a TOML file at `start` time.
    pub fn config_path(mut self, path: &str) -> Self {
        self.config_path = Some(path.to_string());
        self
    }

    /// Use an already-built configuration. Takes precedence over
    /// [`config_path`](Self::config_path).
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Share the embedder's messaging context instead of creating one.
    /// The context outlives the client; shutdown will not destroy it.
    pub fn context(mut self, context: zmq::Context) -> Self {
        self.context = Some(context);
        self
    }

    /// The embedding environment already runs a service announcer; do
    /// not start one.
    pub fn external_discovery(mut self) -> Self {
        self.external_discovery = true;
        self
    }

    /// Build and start the client: bind sockets, start the announcer
    /// and the pump. Returns an error if any step fails; whatever was
    /// already started is torn down on drop.
    pub fn start(self) -> Result<Client> {
        let config = match (self.config, self.config_path) {
            (Some(config), _) => config,
            (None, Some(path)) => ClientConfig::from_path(&path)?,
            (None, None) => ClientConfig::default(),
        };

        init_logging(&config);

        let identity = ClientIdentity::generate();
        let context = self.context.unwrap_or_else(zmq::Context::new);

        // socket to publish write queries
        let pub_socket = context.socket(zmq::PUB)?;
        pub_socket.set_sndtimeo(config.clt_pub_socket_timeout)?;
        pub_socket.set_linger(0)?;
        pub_socket.bind(&format!("tcp://*:{}", config.clt_pub_port))?;

        // socket to deal read queries and receive responses; its
        // identity is what middlemen address replies to
        let dlr_socket = context.socket(zmq::DEALER)?;
        dlr_socket.set_sndtimeo(config.clt_dlr_socket_timeout)?;
        dlr_socket.set_rcvtimeo(config.clt_dlr_socket_timeout)?;
        dlr_socket.set_linger(0)?;
        dlr_socket.set_identity(&identity.wire_bytes())?;
        dlr_socket.bind(&format!("tcp://*:{}", config.clt_dlr_port))?;

        let announcer = if self.external_discovery || config.service_discovery_address.is_some() {
            info!("assuming the embedding environment runs a service announcer");
            None
        } else {
            let announcer = ServiceAnnouncer::start(&config, &identity)?;
            announcer.register(SERVICE_WRITE, config.clt_pub_port);
            announcer.register(SERVICE_READ, config.clt_dlr_port);
            Some(announcer)
        };

        let registry = Arc::new(PendingRegistry::new());
        let (shutdown_tx, shutdown_rx) = mpsc::channel();
        let pump = Pump {
            pub_socket,
            dlr_socket,
            identity: identity.clone(),
            registry: registry.clone(),
            inpoll_timeout: config.inpoll_timeout,
            outpoll_timeout: config.outpoll_timeout,
            shutdown: shutdown_rx,
        };
        let handle = thread::Builder::new()
            .name("sqlbus-pump".to_string())
            .spawn(move || pump.run())?;

        info!(
            "client {} up: writes on port {}, reads on port {}",
            identity, config.clt_pub_port, config.clt_dlr_port
        );

        Ok(Client {
            config,
            identity,
            _context: context,
            registry,
            stats: QueryStats::default(),
            announcer,
            pump: Some(PumpHandle {
                shutdown: shutdown_tx,
                handle,
            }),
            next_message_id: AtomicU32::new(0),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

struct PumpHandle {
    shutdown: Sender<()>,
    handle: JoinHandle<()>,
}

/// A running sqlbus client.
pub struct Client {
    config: ClientConfig,
    identity: ClientIdentity,
    // shared with the pump's sockets; dropped last
    _context: zmq::Context,
    registry: Arc<PendingRegistry>,
    stats: QueryStats,
    announcer: Option<ServiceAnnouncer>,
    pump: Option<PumpHandle>,
    next_message_id: AtomicU32,
}

impl Client {
    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Load configuration from `config_path` and start the client.
    pub fn initialise(config_path: &str) -> Result<Self> {
        Self::builder().config_path(config_path).start()
    }

    /// Submit a query and block until its response arrives or
    /// `timeout` (default: the configured `query_timeout`) elapses.
    ///
    /// Statements containing `INSERT`, `UPDATE`, or `DELETE` are
    /// broadcast to every subscribed middleman; everything else is
    /// dealt round-robin to one. On success, returns one string per
    /// result row.
    pub fn send_query(
        &self,
        database: &str,
        statement: &str,
        timeout: Option<Duration>,
    ) -> Result<Vec<String>> {
        if self.pump.is_none() {
            return Err(SqlBusError::NotRunning);
        }

        let deadline = timeout.unwrap_or_else(|| self.config.query_timeout());
        let started = Instant::now();

        let message_id = self.next_message_id.fetch_add(1, Ordering::Relaxed) + 1;
        let query = Query::new(database, statement, message_id);
        let kind = query.kind;

        let remaining = deadline.saturating_sub(started.elapsed());
        if remaining.is_zero() {
            self.stats.record_failure(kind);
            return Err(outer_timeout(statement, deadline));
        }

        // hand the query to the pump and wait for the send outcome
        let send_waiter = self.registry.enqueue_send(query);
        let Some(outcome) = send_waiter.wait(INTERNAL_WAIT_CAP.min(remaining)) else {
            self.stats.record_failure(kind);
            if started.elapsed() >= deadline {
                return Err(outer_timeout(statement, deadline));
            }
            warn!("timed out sending query {message_id}");
            return Err(SqlBusError::Timeout("Timed out sending query".to_string()));
        };

        if outcome != SendOutcome::Sent {
            self.stats.record_failure(kind);
            let message = match outcome {
                SendOutcome::PollError => "Error polling out socket, is the socket closed?",
                SendOutcome::NoListener => "No listener on out socket",
                _ => "Error sending query",
            };
            debug!("query {message_id}: {message}");
            return Err(SqlBusError::Send(message.to_string()));
        }

        // sent; now wait for the matching response
        let response_waiter = self.registry.register_response(message_id);
        let remaining = deadline.saturating_sub(started.elapsed());
        if remaining.is_zero() {
            self.registry.forget_response(message_id);
            self.stats.record_failure(kind);
            return Err(outer_timeout(statement, deadline));
        }

        let Some(response) = response_waiter.wait(INTERNAL_WAIT_CAP.min(remaining)) else {
            self.registry.forget_response(message_id);
            self.stats.record_failure(kind);
            if started.elapsed() >= deadline {
                debug!("query {message_id} missed its deadline");
                return Err(outer_timeout(statement, deadline));
            }
            warn!("timed out waiting for response for query {message_id}");
            return Err(SqlBusError::Timeout(
                "Timed out waiting for response".to_string(),
            ));
        };

        if response.success {
            Ok(response.rows)
        } else {
            Err(SqlBusError::Query {
                message: response.error,
                rows: response.rows,
            })
        }
    }

    /// Convenience for queries expected to return a single row.
    ///
    /// Returns the first row (empty string for an empty result set)
    /// and fails if more than one row came back.
    pub fn send_query_single(
        &self,
        database: &str,
        statement: &str,
        timeout: Option<Duration>,
    ) -> Result<String> {
        match self.send_query(database, statement, timeout) {
            Ok(rows) => {
                if rows.len() > 1 {
                    return Err(SqlBusError::Query {
                        message: format!(". Query returned {} rows!", rows.len()),
                        rows,
                    });
                }
                Ok(rows.into_iter().next().unwrap_or_default())
            }
            Err(SqlBusError::Query { message, rows }) if rows.len() > 1 => {
                Err(SqlBusError::Query {
                    message: format!("{}. Query returned {} rows!", message, rows.len()),
                    rows,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Failure counters, split by read/write.
    pub fn stats(&self) -> &QueryStats {
        &self.stats
    }

    /// This client's identity, as advertised to middlemen.
    pub fn identity(&self) -> &ClientIdentity {
        &self.identity
    }

    /// The configuration the client is running with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Shut down: stop the pump (closing both sockets), unregister
    /// services, and stop the announcer. Idempotent; also performed on
    /// drop.
    pub fn finalise(&mut self) -> Result<()> {
        let Some(pump) = self.pump.take() else {
            return Ok(());
        };

        debug!("signalling pump to terminate");
        let _ = pump.shutdown.send(());
        if pump.handle.join().is_err() {
            error!("pump thread panicked during shutdown");
        }

        if let Some(mut announcer) = self.announcer.take() {
            announcer.unregister(SERVICE_WRITE);
            announcer.unregister(SERVICE_READ);
            announcer.stop();
        }

        debug!("client {} shut down", self.identity);
        Ok(())
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        let _ = self.finalise();
    }
}

/// The caller-facing deadline error.
fn outer_timeout(statement: &str, deadline: Duration) -> SqlBusError {
    SqlBusError::Timeout(format!(
        "Timed out after waiting {}ms for response from query '{}'",
        deadline.as_millis(),
        statement
    ))
}

/// Install a fmt subscriber filtered by the configured verbosity,
/// unless the embedder already installed one.
fn init_logging(config: &ClientConfig) {
    let _ = tracing_subscriber::fmt()
        .with_max_level(config.level_filter())
        .try_init();
}
