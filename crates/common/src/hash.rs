//! Hashing utilities for certificate fingerprints.

use sha2::{Digest, Sha256};

/// SHA256 fingerprint in the colon-separated upper-case form printed by
/// `openssl x509 -fingerprint`.
pub fn sha256_fingerprint(der: &[u8]) -> String {
    Sha256::digest(der)
        .iter()
        .map(|b| hex::encode_upper([*b]))
        .collect::<Vec<_>>()
        .join(":")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_fingerprint() {
        let fp = sha256_fingerprint(b"hello world");
        assert!(fp.starts_with("B9:4D:27:B9"));
        assert_eq!(fp.len(), 32 * 3 - 1);
        assert_eq!(
            fp.replace(':', ""),
            "B94D27B9934D3E08A52E52D7DA7DABFAC484EFE37A5380EE9088F7ACE2EFCDE9"
        );
    }
}
