//! Client identity.
//!
//! A UUID generated once at startup. The DEALER socket uses it as its
//! ZeroMQ identity so the middleman's router can address replies; write
//! queries embed the same bytes as their first part because the
//! subscribing socket does not prepend identity automatically.

use bytes::Bytes;
use uuid::Uuid;

/// Unique identity of one client instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    id: String,
}

impl ClientIdentity {
    /// Generate a fresh random identity.
    pub fn generate() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
        }
    }

    /// The identity as a display string.
    pub fn as_str(&self) -> &str {
        &self.id
    }

    /// Wire form: the UUID string with a trailing NUL. Used both as
    /// the DEALER socket identity and as part 1 of write-query frames,
    /// so the two always match byte for byte.
    pub fn wire_bytes(&self) -> Bytes {
        let mut buf = Vec::with_capacity(self.id.len() + 1);
        buf.extend_from_slice(self.id.as_bytes());
        buf.push(0);
        Bytes::from(buf)
    }
}

impl std::fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identities_are_unique() {
        assert_ne!(ClientIdentity::generate(), ClientIdentity::generate());
    }

    #[test]
    fn test_wire_bytes_nul_terminated() {
        let identity = ClientIdentity::generate();
        let wire = identity.wire_bytes();
        assert_eq!(wire.len(), identity.as_str().len() + 1);
        assert_eq!(wire[wire.len() - 1], 0);
        assert_eq!(&wire[..wire.len() - 1], identity.as_str().as_bytes());
    }
}
