//! One-shot tickets between submitters and the pump.
//!
//! A ticket is a single-producer, single-consumer fulfillment handle:
//! the pump sets a value exactly once, one submitter waits for it with
//! a deadline. Built on a rendezvous-free `sync_channel(1)`, so
//! fulfilling never blocks the pump and a fulfillment racing a
//! dropped waiter is silently discarded.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::time::Duration;

/// Create a connected ticket pair.
pub fn ticket<T>() -> (Ticket<T>, TicketWaiter<T>) {
    let (tx, rx) = mpsc::sync_channel(1);
    (Ticket { tx }, TicketWaiter { rx })
}

/// Producer half: fulfilled exactly once by the pump.
#[derive(Debug)]
pub struct Ticket<T> {
    tx: SyncSender<T>,
}

impl<T> Ticket<T> {
    /// Deliver the value to the waiter.
    ///
    /// If the waiter has already given up and dropped its half, the
    /// value is discarded.
    pub fn fulfil(self, value: T) {
        let _ = self.tx.try_send(value);
    }
}

/// Consumer half: awaited exactly once by the submitter.
#[derive(Debug)]
pub struct TicketWaiter<T> {
    rx: Receiver<T>,
}

impl<T> TicketWaiter<T> {
    /// Block until the ticket is fulfilled or `timeout` elapses.
    ///
    /// Returns `None` on timeout or if the producer half was dropped
    /// unfulfilled.
    pub fn wait(self, timeout: Duration) -> Option<T> {
        match self.rx.recv_timeout(timeout) {
            Ok(value) => Some(value),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Instant;

    use super::*;

    #[test]
    fn test_fulfil_then_wait() {
        let (tx, rx) = ticket();
        tx.fulfil(42);
        assert_eq!(rx.wait(Duration::from_millis(10)), Some(42));
    }

    #[test]
    fn test_wait_times_out() {
        let (_tx, rx) = ticket::<i32>();
        let start = Instant::now();
        assert_eq!(rx.wait(Duration::from_millis(20)), None);
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_dropped_producer_unblocks_waiter() {
        let (tx, rx) = ticket::<i32>();
        drop(tx);
        // no fulfillment will ever come; waiter returns promptly
        let start = Instant::now();
        assert_eq!(rx.wait(Duration::from_secs(5)), None);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_fulfil_after_waiter_gone_is_discarded() {
        let (tx, rx) = ticket();
        drop(rx);
        tx.fulfil("late".to_string());
    }

    #[test]
    fn test_cross_thread_delivery() {
        let (tx, rx) = ticket();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            tx.fulfil("hello".to_string());
        });
        assert_eq!(
            rx.wait(Duration::from_secs(1)),
            Some("hello".to_string())
        );
        handle.join().unwrap();
    }
}
