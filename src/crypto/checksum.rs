use sha2::{Digest, Sha256};

/// Computes the keyed checksum the loyalty backend authenticates requests
/// with: SHA-256 over the concatenated request fields followed by the shared
/// secret, rendered as lowercase hex.
///
/// Field order is part of the contract and differs per endpoint; callers
/// pass the parts in the order the backend documents.
pub fn checksum(parts: &[&str], secret: &str) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
    }
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_matches_known_sha256() {
        // SHA-256 of the empty string.
        assert_eq!(
            checksum(&[], ""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn concatenation_order_matters() {
        assert_ne!(checksum(&["a", "b"], "s"), checksum(&["b", "a"], "s"));
        // Splitting the same bytes across parts must not change the digest.
        assert_eq!(checksum(&["ab"], "s"), checksum(&["a", "b"], "s"));
    }

    #[test]
    fn secret_is_appended_last() {
        assert_eq!(checksum(&["user", "pass"], "key"), checksum(&["user", "pass", "key"], ""));
    }
}
