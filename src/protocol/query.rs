//! Query and response types with their wire layouts.
//!
//! A write query travels over the PUB socket as four parts (identity,
//! message id, database, statement); a read query travels over the
//! DEALER socket as three (the DEALER prepends identity itself). A
//! response arrives on the DEALER socket as message id, success flag,
//! then one part per result row.

use bytes::Bytes;

use super::codec;
use crate::identity::ClientIdentity;

/// Error string attached to a response whose frame could not be fully
/// received or parsed.
pub const INCOMPLETE_RESPONSE: &str = "Received incomplete zmq response";

/// Routing classification of a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    /// Dispatched round-robin over the DEALER socket.
    Read,
    /// Broadcast to all subscribed middlemen over the PUB socket.
    Write,
}

impl QueryKind {
    /// Classify a statement as read or write.
    ///
    /// A statement containing `INSERT`, `UPDATE`, or `DELETE`
    /// (case-sensitive, anywhere in the text) is a write; everything
    /// else is a read. Crude on purpose: lowercase writes route as
    /// reads, and a read mentioning e.g. a table named `deletes`
    /// routes as a write.
    pub fn classify(statement: &str) -> Self {
        const WRITE_MARKERS: [&str; 3] = ["INSERT", "UPDATE", "DELETE"];
        if WRITE_MARKERS.iter().any(|marker| statement.contains(marker)) {
            QueryKind::Write
        } else {
            QueryKind::Read
        }
    }

    /// Whether this query goes out over the PUB socket.
    #[inline]
    pub fn is_write(self) -> bool {
        matches!(self, QueryKind::Write)
    }
}

/// One outgoing request unit.
#[derive(Debug, Clone)]
pub struct Query {
    /// Logical database name the middleman must target.
    pub database: String,
    /// Opaque SQL text.
    pub statement: String,
    /// Routing classification, derived from the statement.
    pub kind: QueryKind,
    /// Correlation key, monotonic within a client instance.
    pub message_id: u32,
}

impl Query {
    /// Build a query, classifying the statement.
    pub fn new(database: &str, statement: &str, message_id: u32) -> Self {
        Self {
            database: database.to_string(),
            statement: statement.to_string(),
            kind: QueryKind::classify(statement),
            message_id,
        }
    }

    /// Wire parts for the PUB socket. The subscribing socket does not
    /// prepend the sender identity, so part 1 carries it explicitly.
    pub fn write_parts(&self, identity: &ClientIdentity) -> Vec<Bytes> {
        vec![
            identity.wire_bytes(),
            codec::encode_u32(self.message_id),
            codec::encode_str(&self.database),
            codec::encode_str(&self.statement),
        ]
    }

    /// Wire parts for the DEALER socket, which prepends identity
    /// automatically.
    pub fn read_parts(&self) -> Vec<Bytes> {
        vec![
            codec::encode_u32(self.message_id),
            codec::encode_str(&self.database),
            codec::encode_str(&self.statement),
        ]
    }
}

/// A parsed response, routed back to the submitter by message id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryResponse {
    /// Correlation key echoed by the middleman.
    pub message_id: u32,
    /// Middleman-reported outcome.
    pub success: bool,
    /// One entry per returned row.
    pub rows: Vec<String>,
    /// Failure reason; empty on success.
    pub error: String,
}

impl QueryResponse {
    /// Parse a response from its received parts.
    ///
    /// Returns `None` when not even a message id can be recovered, in
    /// which case the frame is undeliverable and must be dropped. A
    /// frame that is `truncated` or lacks the success part still
    /// parses, flagged as a failure with [`INCOMPLETE_RESPONSE`], so
    /// the waiting query can be failed fast.
    pub fn parse(parts: &[&[u8]], truncated: bool) -> Option<Self> {
        let message_id = codec::decode_u32(parts.first()?)?;

        let success_part = parts.get(1).and_then(|part| codec::decode_u32(part));
        let (success, error) = match success_part {
            Some(value) if !truncated => (value != 0, String::new()),
            _ => (false, INCOMPLETE_RESPONSE.to_string()),
        };

        let rows = parts
            .iter()
            .skip(2)
            .map(|part| codec::decode_row(part))
            .collect();

        Some(Self {
            message_id,
            success,
            rows,
            error,
        })
    }

    /// Wire parts of this response, as a middleman would send them.
    pub fn to_parts(&self) -> Vec<Bytes> {
        let mut parts = vec![
            codec::encode_u32(self.message_id),
            codec::encode_u32(self.success as u32),
        ];
        parts.extend(self.rows.iter().map(|row| codec::encode_str(row)));
        parts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_writes() {
        assert_eq!(
            QueryKind::classify("INSERT INTO logging VALUES (1)"),
            QueryKind::Write
        );
        assert_eq!(QueryKind::classify("UPDATE run SET n = 2"), QueryKind::Write);
        assert_eq!(QueryKind::classify("DELETE FROM run"), QueryKind::Write);
    }

    #[test]
    fn test_classify_reads() {
        assert_eq!(
            QueryKind::classify("SELECT max(runnum) FROM run"),
            QueryKind::Read
        );
        assert_eq!(QueryKind::classify(""), QueryKind::Read);
    }

    #[test]
    fn test_classify_is_case_sensitive() {
        // lowercase writes are (mis)classified as reads, by contract
        assert_eq!(QueryKind::classify("insert into x values (1)"), QueryKind::Read);
    }

    #[test]
    fn test_classify_matches_substrings() {
        // a read over an unluckily named table routes as a write, by contract
        assert_eq!(QueryKind::classify("SELECT * FROM DELETES"), QueryKind::Write);
    }

    #[test]
    fn test_write_parts_layout() {
        let identity = ClientIdentity::generate();
        let query = Query::new("rundb", "INSERT INTO run VALUES (1)", 5);
        let parts = query.write_parts(&identity);

        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], identity.wire_bytes());
        assert_eq!(&parts[1][..], &5u32.to_le_bytes());
        assert_eq!(&parts[2][..], b"rundb\0");
        assert_eq!(&parts[3][..], b"INSERT INTO run VALUES (1)\0");
    }

    #[test]
    fn test_read_parts_layout() {
        let query = Query::new("rundb", "SELECT 1", 9);
        let parts = query.read_parts();

        assert_eq!(parts.len(), 3);
        assert_eq!(&parts[0][..], &9u32.to_le_bytes());
        assert_eq!(&parts[1][..], b"rundb\0");
        assert_eq!(&parts[2][..], b"SELECT 1\0");
    }

    #[test]
    fn test_response_round_trip() {
        let response = QueryResponse {
            message_id: 17,
            success: true,
            rows: vec!["42".to_string(), "43".to_string()],
            error: String::new(),
        };

        let parts = response.to_parts();
        let slices: Vec<&[u8]> = parts.iter().map(|p| &p[..]).collect();
        let parsed = QueryResponse::parse(&slices, false).unwrap();

        assert_eq!(parsed, response);
    }

    #[test]
    fn test_response_empty_result_set() {
        let id = 1u32.to_le_bytes();
        let one = 1u32.to_le_bytes();
        let parts = [&id[..], &one[..]];
        let parsed = QueryResponse::parse(&parts, false).unwrap();

        assert_eq!(parsed.message_id, 1);
        assert!(parsed.success);
        assert!(parsed.rows.is_empty());
        assert!(parsed.error.is_empty());
    }

    #[test]
    fn test_response_message_id_only() {
        let id = 33u32.to_le_bytes();
        let parts = [&id[..]];
        let parsed = QueryResponse::parse(&parts, false).unwrap();

        assert_eq!(parsed.message_id, 33);
        assert!(!parsed.success);
        assert_eq!(parsed.error, INCOMPLETE_RESPONSE);
    }

    #[test]
    fn test_response_truncated_flag_forces_failure() {
        let id = 2u32.to_le_bytes();
        let one = 1u32.to_le_bytes();
        let parts = [&id[..], &one[..]];
        let parsed = QueryResponse::parse(&parts, true).unwrap();

        assert!(!parsed.success);
        assert_eq!(parsed.error, INCOMPLETE_RESPONSE);
    }

    #[test]
    fn test_response_unreadable_message_id() {
        assert!(QueryResponse::parse(&[], false).is_none());
        let short = [&[0x01u8, 0x02][..]];
        assert!(QueryResponse::parse(&short, false).is_none());
    }

    #[test]
    fn test_middleman_failure_keeps_rows() {
        let id = 4u32.to_le_bytes();
        let zero = 0u32.to_le_bytes();
        let parts = [&id[..], &zero[..], &b"permission denied\0"[..]];
        let parsed = QueryResponse::parse(&parts, false).unwrap();

        assert!(!parsed.success);
        assert!(parsed.error.is_empty());
        assert_eq!(parsed.rows, vec!["permission denied".to_string()]);
    }
}
