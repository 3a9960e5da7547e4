//! Node identity (spec.md §3): a normalized, 32-byte digest of a peer's
//! public key, independent of whatever key type the overlay network
//! handed us.

pub mod randomart;

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};

use crate::error::{Error, ErrorKind, Result};

type Blake2b256 = Blake2b<U32>;

/// Minimum length of a topic (full node ID or short suffix) accepted as
/// a receiver-side identifier (spec.md §8 boundary behavior).
pub const MIN_TOPIC_LEN: usize = 7;

/// Number of trailing characters of the Base58 node ID used as the
/// short rendezvous topic in non-strict (PIN) mode.
pub const SHORT_TOPIC_LEN: usize = 7;

/// BLAKE2b-256 digest of a peer's raw public key, Base58-encoded for
/// display. Not the transport layer's own peer identifier: hashing
/// normalizes IDs across whatever key type the overlay library used.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId([u8; 32]);

impl NodeId {
    pub fn from_public_key_bytes(raw_public_key: &[u8]) -> Self {
        let mut hasher = Blake2b256::new();
        hasher.update(raw_public_key);
        let digest = hasher.finalize();
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        NodeId(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// The full Base58 identifier (the *strong identifier*, spec.md §3).
    pub fn to_base58(&self) -> String {
        bs58::encode(&self.0).into_string()
    }

    /// The last [`SHORT_TOPIC_LEN`] characters of the Base58 form, used
    /// as the rendezvous topic in PIN mode.
    pub fn short_topic(&self) -> String {
        let full = self.to_base58();
        let start = full.len().saturating_sub(SHORT_TOPIC_LEN);
        full[start..].to_string()
    }

    /// The topic advertised on discovery services: the full ID in
    /// strict mode, the short suffix otherwise.
    pub fn topic(&self, strict: bool) -> String {
        if strict {
            self.to_base58()
        } else {
            self.short_topic()
        }
    }

    /// Returns `true` if `self`'s Base58 form ends with `identifier`,
    /// i.e. whether `self` is a valid match for a receiver that was
    /// given `identifier` (spec.md §4.2 "Finding", §8 "Topic filter").
    pub fn matches_identifier(&self, identifier: &str) -> bool {
        self.to_base58().ends_with(identifier)
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_base58())
    }
}

impl std::fmt::Debug for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NodeId({})", self.to_base58())
    }
}

/// Validates a receiver-supplied identifier string (spec.md §6, §8).
pub fn validate_identifier(identifier: &str) -> Result<()> {
    if identifier.len() < MIN_TOPIC_LEN {
        return Err(Error::wrapped(
            ErrorKind::Validation,
            format!(
                "identifier must be at least {} characters long",
                MIN_TOPIC_LEN
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_topic_is_suffix_of_full_id() {
        let id = NodeId::from_public_key_bytes(b"some public key bytes");
        let full = id.to_base58();
        let short = id.short_topic();
        assert_eq!(short.len(), SHORT_TOPIC_LEN);
        assert!(full.ends_with(&short));
    }

    #[test]
    fn matches_identifier_checks_suffix() {
        let id = NodeId::from_public_key_bytes(b"another key");
        let full = id.to_base58();
        assert!(id.matches_identifier(&full));
        assert!(id.matches_identifier(&full[full.len() - 7..]));
        assert!(!id.matches_identifier("definitely-not-a-suffix"));
    }

    #[test]
    fn distinct_keys_yield_distinct_ids() {
        let a = NodeId::from_public_key_bytes(b"key a");
        let b = NodeId::from_public_key_bytes(b"key b");
        assert_ne!(a, b);
    }

    #[test]
    fn validate_identifier_enforces_minimum_length() {
        assert!(validate_identifier("1234567").is_ok());
        assert!(validate_identifier("123456").is_err());
    }
}
