//! Multipart codec over ZeroMQ sockets.
//!
//! Encodes scalars and strings into message parts and moves whole
//! multipart messages across a socket. Strings gain a trailing NUL for
//! compatibility with the middleman's C-string consumption; scalars
//! travel as their little-endian byte image.
//!
//! The poll wrappers bound every socket operation: nothing in this
//! module blocks longer than the poll timeout plus the socket's own
//! send/receive timeout.

use bytes::Bytes;

use crate::error::{Result, SqlBusError};

/// Outcome of one poll-and-send attempt, delivered to the submitter
/// through its send ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum SendOutcome {
    /// All parts were handed to the socket.
    Sent = 0,
    /// The send call itself failed.
    SendFailed = -1,
    /// Poll returned without `POLLOUT`; nobody is listening.
    NoListener = -2,
    /// Poll errored; the socket is likely closed.
    PollError = -3,
}

impl SendOutcome {
    /// The integer status code carried on the wire ticket.
    #[inline]
    pub fn code(self) -> i32 {
        self as i32
    }
}

/// Result of one poll-and-receive attempt.
pub enum Received {
    /// A complete multipart message.
    Complete(Vec<zmq::Message>),
    /// The receive failed while the previous part had the "more" flag
    /// set; the parts that did arrive are preserved so the caller can
    /// fail-fast whatever waiter the frame identifies.
    Truncated(Vec<zmq::Message>),
    /// Nothing was waiting to be read.
    Idle,
}

impl Received {
    /// Strict view for callers that cannot use a partial message:
    /// a truncated receive becomes [`SqlBusError::Incomplete`] and an
    /// idle one an empty part list.
    pub fn into_complete(self) -> Result<Vec<zmq::Message>> {
        match self {
            Received::Complete(parts) => Ok(parts),
            Received::Truncated(_) => Err(SqlBusError::Incomplete),
            Received::Idle => Ok(Vec::new()),
        }
    }
}

impl std::fmt::Debug for Received {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Received::Complete(parts) => write!(f, "Complete({} parts)", parts.len()),
            Received::Truncated(parts) => write!(f, "Truncated({} parts)", parts.len()),
            Received::Idle => f.write_str("Idle"),
        }
    }
}

/// Encode a string as a NUL-terminated message part.
pub fn encode_str(value: &str) -> Bytes {
    let mut buf = Vec::with_capacity(value.len() + 1);
    buf.extend_from_slice(value.as_bytes());
    buf.push(0);
    Bytes::from(buf)
}

/// Encode a u32 as a 4-byte little-endian message part.
pub fn encode_u32(value: u32) -> Bytes {
    Bytes::copy_from_slice(&value.to_le_bytes())
}

/// Decode a little-endian u32 from the front of a message part.
///
/// Returns `None` if the part is shorter than 4 bytes.
pub fn decode_u32(part: &[u8]) -> Option<u32> {
    let bytes: [u8; 4] = part.get(..4)?.try_into().ok()?;
    Some(u32::from_le_bytes(bytes))
}

/// Decode a result-row part: strip one trailing NUL if present, then
/// interpret the rest as (lossy) UTF-8.
pub fn decode_row(part: &[u8]) -> String {
    let trimmed = part.strip_suffix(&[0]).unwrap_or(part);
    String::from_utf8_lossy(trimmed).into_owned()
}

/// Send all `parts` as one multipart message.
///
/// Every part except the last is sent with the "more parts following"
/// flag. Passing `more = true` sets it on the last part as well,
/// signalling that the caller will append further parts itself.
pub fn send_frames(socket: &zmq::Socket, parts: &[Bytes], more: bool) -> Result<()> {
    for (i, part) in parts.iter().enumerate() {
        let last = i + 1 == parts.len();
        let flags = if !last || more { zmq::SNDMORE } else { 0 };
        socket.send(&part[..], flags)?;
    }
    Ok(())
}

/// Receive all parts of one multipart message.
///
/// Drains parts until the "more" flag on the last received part is
/// clear. A receive failure after at least one part yields
/// [`Received::Truncated`]; a timeout before the first part yields
/// [`Received::Idle`].
pub fn receive_frames(socket: &zmq::Socket) -> Result<Received> {
    let mut parts: Vec<zmq::Message> = Vec::new();
    loop {
        match socket.recv_msg(0) {
            Ok(msg) => {
                let more = msg.get_more();
                parts.push(msg);
                if !more {
                    return Ok(Received::Complete(parts));
                }
            }
            Err(zmq::Error::EAGAIN) if parts.is_empty() => return Ok(Received::Idle),
            Err(_) if !parts.is_empty() => return Ok(Received::Truncated(parts)),
            Err(e) => return Err(e.into()),
        }
    }
}

/// Poll `socket` for readability, then receive one multipart message.
pub fn poll_and_receive(socket: &zmq::Socket, timeout_ms: i64) -> Result<Received> {
    if socket.poll(zmq::POLLIN, timeout_ms)? == 0 {
        return Ok(Received::Idle);
    }
    receive_frames(socket)
}

/// Poll `socket` for writability, then send one multipart message.
///
/// Never returns an error: every failure mode maps onto a
/// [`SendOutcome`] for the submitter's ticket.
pub fn poll_and_send(socket: &zmq::Socket, timeout_ms: i64, parts: &[Bytes]) -> SendOutcome {
    match socket.poll(zmq::POLLOUT, timeout_ms) {
        Err(_) => SendOutcome::PollError,
        Ok(0) => SendOutcome::NoListener,
        Ok(_) => match send_frames(socket, parts, false) {
            Ok(()) => SendOutcome::Sent,
            Err(_) => SendOutcome::SendFailed,
        },
    }
}
