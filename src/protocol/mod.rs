//! Wire protocol: query framing and the multipart codec.

pub mod codec;
pub mod query;

pub use codec::{
    poll_and_receive, poll_and_send, receive_frames, send_frames, Received, SendOutcome,
};
pub use query::{Query, QueryKind, QueryResponse, INCOMPLETE_RESPONSE};
