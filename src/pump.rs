//! Background pump: the single owner of both sockets.
//!
//! ZeroMQ sockets are not thread-safe, so all socket I/O funnels
//! through this one worker. Each loop iteration checks for shutdown,
//! drains at most one pending response, and emits at most one pending
//! send. Submitters interact with it only through the registry.

use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::identity::ClientIdentity;
use crate::protocol::codec::{self, Received, SendOutcome};
use crate::protocol::QueryResponse;
use crate::registry::PendingRegistry;

/// How long each iteration waits on the shutdown channel.
const SHUTDOWN_POLL: Duration = Duration::from_millis(10);

pub(crate) struct Pump {
    /// PUB socket: write queries out to every subscribed middleman.
    pub pub_socket: zmq::Socket,
    /// DEALER socket: read queries out round-robin, all responses in.
    pub dlr_socket: zmq::Socket,
    pub identity: ClientIdentity,
    pub registry: Arc<PendingRegistry>,
    pub inpoll_timeout: i64,
    pub outpoll_timeout: i64,
    pub shutdown: Receiver<()>,
}

impl Pump {
    /// Run until the shutdown channel fires or disconnects. Consumes
    /// the pump, so the sockets close when this returns.
    pub fn run(self) {
        debug!("pump starting");
        loop {
            match self.shutdown.recv_timeout(SHUTDOWN_POLL) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    debug!("pump received terminate signal");
                    break;
                }
                Err(RecvTimeoutError::Timeout) => {}
            }

            self.receive_next_response();
            self.send_next_query();
        }
        debug!("pump stopped");
    }

    /// Drain one response from the DEALER socket, if any, and deliver
    /// it to the waiter registered under its message id.
    fn receive_next_response(&self) {
        let received = match codec::poll_and_receive(&self.dlr_socket, self.inpoll_timeout) {
            Ok(received) => received,
            Err(e) => {
                error!("error polling in socket, is the socket closed? ({e})");
                return;
            }
        };

        let (parts, truncated) = match received {
            Received::Idle => return,
            Received::Complete(parts) => (parts, false),
            Received::Truncated(parts) => {
                warn!("last received part had the more flag set but no part followed");
                (parts, true)
            }
        };

        if parts.is_empty() {
            error!("received empty response");
            return;
        }

        let slices: Vec<&[u8]> = parts.iter().map(|part| &part[..]).collect();
        let Some(response) = QueryResponse::parse(&slices, truncated) else {
            error!("response frame too short to carry a message id, dropping");
            return;
        };
        if !response.error.is_empty() {
            warn!("{}", response.error);
        }

        let message_id = response.message_id;
        if !self.registry.complete_response(response) {
            // late response after a timeout, or a duplicate
            error!("unknown message id {message_id} with no waiting query");
        }
    }

    /// Transmit the next queued query, if any, and report the outcome
    /// through its send ticket. The query is consumed regardless of
    /// outcome; the submitter decides what to do with a failure.
    fn send_next_query(&self) {
        let Some((query, send_ticket)) = self.registry.pop_next_send() else {
            return;
        };
        debug!("sending query {}", query.message_id);

        let outcome = if query.kind.is_write() {
            codec::poll_and_send(
                &self.pub_socket,
                self.outpoll_timeout,
                &query.write_parts(&self.identity),
            )
        } else {
            codec::poll_and_send(&self.dlr_socket, self.outpoll_timeout, &query.read_parts())
        };

        if outcome != SendOutcome::Sent {
            warn!(
                "send of query {} did not complete (code {})",
                query.message_id,
                outcome.code()
            );
        }
        send_ticket.fulfil(outcome);
    }
}
