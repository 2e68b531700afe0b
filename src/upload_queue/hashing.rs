//! SHA256 digests of submitted evidence.

use sha2::{Digest, Sha256};

/// Hex-encoded SHA256 of the given bytes
pub fn sha256_hex(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digest() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_digest_shape() {
        let hash = sha256_hex(b"evidence");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, sha256_hex(b"evidence"));
        assert_ne!(hash, sha256_hex(b"evidence2"));
    }
}
