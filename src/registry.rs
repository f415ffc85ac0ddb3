//! Pending-request registry.
//!
//! The only state shared between submitting threads and the pump: a
//! FIFO queue of queries awaiting transmission and a table of queries
//! awaiting their response, each entry tagged with a one-shot ticket.
//! The queue and the table sit behind separate locks so senders and
//! receivers never contend with each other.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::protocol::{Query, QueryKind, QueryResponse, SendOutcome};
use crate::ticket::{ticket, Ticket, TicketWaiter};

/// Shared pending state between submitters and the pump.
#[derive(Debug, Default)]
pub(crate) struct PendingRegistry {
    /// Queries awaiting transmission, in submission order.
    send_queue: Mutex<VecDeque<(Query, Ticket<SendOutcome>)>>,
    /// Queries awaiting a response, keyed by message id.
    waiting: Mutex<HashMap<u32, Ticket<QueryResponse>>>,
}

impl PendingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a query onto the send queue; the returned waiter resolves
    /// once the pump has attempted transmission.
    pub fn enqueue_send(&self, query: Query) -> TicketWaiter<SendOutcome> {
        let (tx, rx) = ticket();
        self.send_queue.lock().unwrap().push_back((query, tx));
        rx
    }

    /// Take the next query to transmit. Called only by the pump.
    pub fn pop_next_send(&self) -> Option<(Query, Ticket<SendOutcome>)> {
        self.send_queue.lock().unwrap().pop_front()
    }

    /// Register interest in the response for `message_id`.
    pub fn register_response(&self, message_id: u32) -> TicketWaiter<QueryResponse> {
        let (tx, rx) = ticket();
        self.waiting.lock().unwrap().insert(message_id, tx);
        rx
    }

    /// Deliver a response to its sole waiter. Returns `false` if no
    /// waiter exists (already completed, timed out, or never known).
    pub fn complete_response(&self, response: QueryResponse) -> bool {
        let entry = self.waiting.lock().unwrap().remove(&response.message_id);
        match entry {
            Some(tx) => {
                tx.fulfil(response);
                true
            }
            None => false,
        }
    }

    /// Submitter-side eviction after a timeout; any late response will
    /// then fail the lookup and be dropped by the pump.
    pub fn forget_response(&self, message_id: u32) {
        self.waiting.lock().unwrap().remove(&message_id);
    }
}

/// Counters of failed queries, split by routing class.
///
/// Exposed for future periodic reporting; nothing in the core reads
/// them back.
#[derive(Debug, Default)]
pub struct QueryStats {
    reads_failed: AtomicU64,
    writes_failed: AtomicU64,
}

impl QueryStats {
    pub(crate) fn record_failure(&self, kind: QueryKind) {
        match kind {
            QueryKind::Read => self.reads_failed.fetch_add(1, Ordering::Relaxed),
            QueryKind::Write => self.writes_failed.fetch_add(1, Ordering::Relaxed),
        };
    }

    /// Number of read queries that have failed so far.
    pub fn reads_failed(&self) -> u64 {
        self.reads_failed.load(Ordering::Relaxed)
    }

    /// Number of write queries that have failed so far.
    pub fn writes_failed(&self) -> u64 {
        self.writes_failed.load(Ordering::Relaxed)
    }
}
