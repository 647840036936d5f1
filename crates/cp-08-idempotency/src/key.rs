//! Idempotency key derivation.

use crate::KEY_BODY_CAP;
use sha2::{Digest, Sha256};
use shared_types::UserId;
use std::fmt;

/// A derived or client-supplied idempotency key, namespaced per user.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Derive a key from the request shape.
    ///
    /// Only the first [`KEY_BODY_CAP`] body bytes contribute, so oversized
    /// bodies cannot force unbounded hashing work.
    #[must_use]
    pub fn derive(user: &UserId, method: &str, path: &str, query: &str, body: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(user.as_str().as_bytes());
        hasher.update(b"|");
        hasher.update(method.as_bytes());
        hasher.update(b"|");
        hasher.update(path.as_bytes());
        hasher.update(b"|");
        hasher.update(query.as_bytes());
        hasher.update(b"|");
        hasher.update(&body[..body.len().min(KEY_BODY_CAP)]);
        Self(hex::encode(hasher.finalize()))
    }

    /// Use a client-supplied `Idempotency-Key` header value.
    ///
    /// Still namespaced by user: one client's key can never collide with
    /// another's.
    #[must_use]
    pub fn explicit(user: &UserId, header_value: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(user.as_str().as_bytes());
        hasher.update(b"!");
        hasher.update(header_value.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// The key as `&str` (64 hex characters).
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> UserId {
        UserId::from("U1")
    }

    #[test]
    fn test_same_request_same_key() {
        let a = IdempotencyKey::derive(&user(), "POST", "/api/v1/barcodes", "", b"{\"x\":1}");
        let b = IdempotencyKey::derive(&user(), "POST", "/api/v1/barcodes", "", b"{\"x\":1}");
        assert_eq!(a, b);
    }

    #[test]
    fn test_any_component_changes_key() {
        let base = IdempotencyKey::derive(&user(), "POST", "/p", "q=1", b"body");
        assert_ne!(
            base,
            IdempotencyKey::derive(&UserId::from("U2"), "POST", "/p", "q=1", b"body")
        );
        assert_ne!(
            base,
            IdempotencyKey::derive(&user(), "PATCH", "/p", "q=1", b"body")
        );
        assert_ne!(
            base,
            IdempotencyKey::derive(&user(), "POST", "/p2", "q=1", b"body")
        );
        assert_ne!(
            base,
            IdempotencyKey::derive(&user(), "POST", "/p", "q=2", b"body")
        );
        assert_ne!(
            base,
            IdempotencyKey::derive(&user(), "POST", "/p", "q=1", b"other")
        );
    }

    #[test]
    fn test_body_cap() {
        let big_a = vec![b'a'; KEY_BODY_CAP + 100];
        let mut big_b = big_a.clone();
        // Difference beyond the cap is invisible to the key.
        let len = big_b.len();
        big_b[len - 1] = b'z';
        let a = IdempotencyKey::derive(&user(), "POST", "/p", "", &big_a);
        let b = IdempotencyKey::derive(&user(), "POST", "/p", "", &big_b);
        assert_eq!(a, b);

        // Difference inside the cap changes the key.
        let mut big_c = big_a.clone();
        big_c[0] = b'z';
        let c = IdempotencyKey::derive(&user(), "POST", "/p", "", &big_c);
        assert_ne!(a, c);
    }

    #[test]
    fn test_explicit_key_is_user_scoped() {
        let a = IdempotencyKey::explicit(&UserId::from("U1"), "K1");
        let b = IdempotencyKey::explicit(&UserId::from("U2"), "K1");
        assert_ne!(a, b);
        assert_eq!(a, IdempotencyKey::explicit(&UserId::from("U1"), "K1"));
    }
}
