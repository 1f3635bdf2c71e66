//! API key hashing and verification using bcrypt.

use bcrypt::{hash, verify, DEFAULT_COST};

/// Hash an API key for storage in the credentials table.
pub fn hash_key(key: &str) -> Result<String, bcrypt::BcryptError> {
    hash(key, DEFAULT_COST)
}

/// Verify a supplied API key against a stored bcrypt hash.
///
/// Malformed stored hashes verify as false rather than erroring; an empty
/// credential row can never authenticate anything.
pub fn verify_key(key: &str, stored_hash: &str) -> bool {
    verify(key, stored_hash).unwrap_or(false)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify() {
        let hash = hash_key("mysecret").unwrap();
        assert!(verify_key("mysecret", &hash));
        assert!(!verify_key("wrongkey", &hash));
    }

    #[test]
    fn empty_stored_hash_never_verifies() {
        assert!(!verify_key("anything", ""));
        assert!(!verify_key("", ""));
    }

    #[test]
    fn different_keys_different_hashes() {
        let h1 = hash_key("key1").unwrap();
        let h2 = hash_key("key2").unwrap();
        assert_ne!(h1, h2);
    }
}
