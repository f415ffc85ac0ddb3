//! Service announcer.
//!
//! Periodically emits one UDP datagram per registered service to a
//! multicast group, so middlemen can discover this client and connect
//! to its sockets. Each beacon is a small JSON object carrying the
//! client UUID, the client name, the service name, and its port.
//!
//! The announcer runs on its own timer thread and never touches the
//! request path. It is optional: an embedding environment that already
//! runs an announcer can tell the client to skip creating one.

use std::collections::HashMap;
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde_json::json;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::Result;
use crate::identity::ClientIdentity;

/// Service name the nominal remote-control port is advertised under.
const REMOTE_CONTROL_SERVICE: &str = "remote_control";

/// Periodic UDP multicast beacon emitter.
pub struct ServiceAnnouncer {
    services: Arc<Mutex<HashMap<String, u32>>>,
    shutdown: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl ServiceAnnouncer {
    /// Bind a UDP socket and start the beacon thread.
    ///
    /// The set of advertised services starts with the nominal
    /// remote-control port; callers add their own with
    /// [`register`](Self::register).
    pub fn start(config: &ClientConfig, identity: &ClientIdentity) -> Result<Self> {
        let destination: SocketAddr =
            format!("{}:{}", config.broadcast_address, config.broadcast_port)
                .parse()
                .map_err(|e| {
                    io::Error::new(
                        io::ErrorKind::InvalidInput,
                        format!("bad broadcast address: {e}"),
                    )
                })?;
        let socket = UdpSocket::bind(("0.0.0.0", 0))?;

        let mut initial = HashMap::new();
        initial.insert(
            REMOTE_CONTROL_SERVICE.to_string(),
            config.remote_control_port as u32,
        );
        let services = Arc::new(Mutex::new(initial));

        let (shutdown_tx, shutdown_rx) = mpsc::channel();
        let period = Duration::from_secs(config.broadcast_period_secs.max(1));
        let uuid = identity.as_str().to_string();
        let client_name = config.client_name.clone();
        let thread_services = services.clone();

        let handle = thread::Builder::new()
            .name("sqlbus-announcer".to_string())
            .spawn(move || {
                debug!("announcer broadcasting to {destination} every {period:?}");
                loop {
                    match shutdown_rx.recv_timeout(period) {
                        Err(RecvTimeoutError::Timeout) => {
                            broadcast(&socket, destination, &uuid, &client_name, &thread_services);
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                debug!("announcer stopped");
            })?;

        Ok(Self {
            services,
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// Advertise `name` on `port` starting with the next beacon.
    pub fn register(&self, name: &str, port: u32) {
        self.services.lock().unwrap().insert(name.to_string(), port);
    }

    /// Stop advertising `name` from the next beacon on.
    pub fn unregister(&self, name: &str) {
        self.services.lock().unwrap().remove(name);
    }

    /// Signal the beacon thread and wait for it to finish.
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ServiceAnnouncer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Emit one datagram per currently registered service.
fn broadcast(
    socket: &UdpSocket,
    destination: SocketAddr,
    uuid: &str,
    client_name: &str,
    services: &Mutex<HashMap<String, u32>>,
) {
    let snapshot: Vec<(String, u32)> = services
        .lock()
        .unwrap()
        .iter()
        .map(|(name, port)| (name.clone(), *port))
        .collect();

    for (service, port) in snapshot {
        let beacon = json!({
            "uuid": uuid,
            "client": client_name,
            "service": service,
            "port": port,
        })
        .to_string();

        if let Err(e) = socket.send_to(beacon.as_bytes(), destination) {
            warn!("failed to send discovery beacon for {service}: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Point beacons at a plain localhost listener so the test does
    /// not depend on multicast routing.
    fn listener_config(port: u16) -> ClientConfig {
        let mut config = ClientConfig::default();
        config.broadcast_address = "127.0.0.1".to_string();
        config.broadcast_port = port;
        config.broadcast_period_secs = 1;
        config
    }

    fn recv_beacons(listener: &UdpSocket, want: usize) -> Vec<serde_json::Value> {
        let mut beacons = Vec::new();
        let mut buf = [0u8; 1024];
        while beacons.len() < want {
            let (n, _) = listener.recv_from(&mut buf).expect("beacon not received");
            beacons.push(serde_json::from_slice(&buf[..n]).unwrap());
        }
        beacons
    }

    #[test]
    fn test_beacons_carry_registered_services() {
        let listener = UdpSocket::bind(("127.0.0.1", 48311)).unwrap();
        listener
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();

        let identity = ClientIdentity::generate();
        let mut announcer =
            ServiceAnnouncer::start(&listener_config(48311), &identity).unwrap();
        announcer.register("psql_write", 7001);
        announcer.register("psql_read", 7002);

        // two full ticks of three services each
        let beacons = recv_beacons(&listener, 6);
        announcer.stop();

        let mut seen: HashMap<String, u64> = HashMap::new();
        for beacon in &beacons {
            assert_eq!(beacon["uuid"], identity.as_str());
            assert_eq!(beacon["client"], "DemoClient");
            seen.insert(
                beacon["service"].as_str().unwrap().to_string(),
                beacon["port"].as_u64().unwrap(),
            );
        }
        assert_eq!(seen.get("psql_write"), Some(&7001));
        assert_eq!(seen.get("psql_read"), Some(&7002));
        assert_eq!(seen.get("remote_control"), Some(&24011));
    }

    #[test]
    fn test_unregister_removes_service() {
        let listener = UdpSocket::bind(("127.0.0.1", 48312)).unwrap();
        listener
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();

        let identity = ClientIdentity::generate();
        let mut announcer =
            ServiceAnnouncer::start(&listener_config(48312), &identity).unwrap();
        announcer.unregister(REMOTE_CONTROL_SERVICE);
        announcer.register("psql_read", 7002);

        let beacons = recv_beacons(&listener, 3);
        announcer.stop();

        for beacon in &beacons {
            assert_eq!(beacon["service"], "psql_read");
        }
    }

    #[test]
    fn test_stop_joins_thread() {
        let identity = ClientIdentity::generate();
        let mut announcer =
            ServiceAnnouncer::start(&listener_config(48313), &identity).unwrap();
        announcer.stop();
        // second stop is a no-op
        announcer.stop();
    }

    #[test]
    fn test_bad_broadcast_address_rejected() {
        let mut config = ClientConfig::default();
        config.broadcast_address = "not an address".to_string();
        let identity = ClientIdentity::generate();
        assert!(ServiceAnnouncer::start(&config, &identity).is_err());
    }
}
