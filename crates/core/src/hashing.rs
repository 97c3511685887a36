//! SHA-256 hex digests for image fingerprints and idempotency keys.

use sha2::{Digest, Sha256};

/// Separator fed between parts so that `("ab", "c")` and `("a", "bc")`
/// never produce the same digest.
const PART_SEPARATOR: u8 = 0x1f;

/// Compute a SHA-256 hex digest of the given bytes.
pub fn sha256_hex(data: &[u8]) -> String {
    let hash = Sha256::digest(data);
    format!("{hash:x}")
}

/// Compute a SHA-256 hex digest over several string parts.
pub fn sha256_hex_parts(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update([PART_SEPARATOR]);
        }
        hasher.update(part.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_produces_known_hash() {
        let hash = sha256_hex(b"");
        assert_eq!(
            hash,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn parts_are_length_delimited() {
        assert_ne!(sha256_hex_parts(&["ab", "c"]), sha256_hex_parts(&["a", "bc"]));
    }

    #[test]
    fn single_part_matches_plain_digest() {
        assert_eq!(sha256_hex_parts(&["photo"]), sha256_hex(b"photo"));
    }
}
