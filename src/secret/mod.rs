//! The shared authentication secret (spec.md §3, §4.3): a 6-digit PIN
//! in normal mode, a strong token in strict mode. Only its BLAKE2b-256
//! hash ever crosses the wire.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use rand::Rng;

use crate::error::{Error, ErrorKind, Result};

type Blake2b256 = Blake2b<U32>;

/// Minimum accepted secret length on the receiver side (spec.md §8).
pub const MIN_SECRET_LEN: usize = 6;

/// Minimum length of a strict-mode token (spec.md §3).
pub const MIN_STRONG_SECRET_LEN: usize = 26;

/// 32-symbol alphabet (Crockford base32, sans padding) used for strict-mode
/// tokens: unambiguous at a glance, unlike the full base62/base64 ranges.
const STRONG_SECRET_ALPHABET: &[u8] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

/// Generates a 6-digit decimal PIN.
pub fn generate_pin() -> String {
    let mut rng = rand::thread_rng();
    (0..MIN_SECRET_LEN)
        .map(|_| char::from(b'0' + rng.gen_range(0..10)))
        .collect()
}

/// Generates a strict-mode strong token, `MIN_STRONG_SECRET_LEN` symbols
/// long, impractical to brute-force over the lifetime of a session.
pub fn generate_strong_secret() -> String {
    let mut rng = rand::thread_rng();
    (0..MIN_STRONG_SECRET_LEN)
        .map(|_| {
            let idx = rng.gen_range(0..STRONG_SECRET_ALPHABET.len());
            char::from(STRONG_SECRET_ALPHABET[idx])
        })
        .collect()
}

/// BLAKE2b-256 hash of a secret's UTF-8 bytes; this is the only form of
/// the secret that ever appears on the wire.
pub fn compute_hash(secret: &str) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    hasher.update(secret.as_bytes());
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// Validates a receiver-supplied secret before it's hashed and sent.
pub fn validate_secret(secret: &str) -> Result<()> {
    if secret.len() < MIN_SECRET_LEN {
        return Err(Error::wrapped(
            ErrorKind::Validation,
            format!("secret must be at least {} characters long", MIN_SECRET_LEN),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pin_is_six_decimal_digits() {
        let pin = generate_pin();
        assert_eq!(pin.len(), 6);
        assert!(pin.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn strong_secret_meets_minimum_length() {
        let token = generate_strong_secret();
        assert!(token.len() >= MIN_STRONG_SECRET_LEN);
        assert!(token.chars().all(|c| STRONG_SECRET_ALPHABET.contains(&(c as u8))));
    }

    #[test]
    fn hash_is_deterministic_and_32_bytes() {
        let a = compute_hash("123456");
        let b = compute_hash("123456");
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn distinct_secrets_hash_differently() {
        assert_ne!(compute_hash("123456"), compute_hash("654321"));
    }

    #[test]
    fn validate_secret_enforces_minimum_length() {
        assert!(validate_secret("123456").is_ok());
        assert!(validate_secret("12345").is_err());
    }
}
