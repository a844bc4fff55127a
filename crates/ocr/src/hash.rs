use sha2::{Digest, Sha256};

/// Hex characters kept in a fingerprint; enough to find an upload in the logs.
const FINGERPRINT_LEN: usize = 12;

/// Compute SHA-256 of an in-memory byte slice.
pub fn sha256_bytes(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Encode a raw 32-byte hash as a lowercase hex string (64 chars).
pub fn to_hex(hash: &[u8; 32]) -> String {
    hash.iter().map(|b| format!("{b:02x}")).collect()
}

/// Short, stable identifier for an uploaded image, used as log context.
pub fn fingerprint(data: &[u8]) -> String {
    let mut hex = to_hex(&sha256_bytes(data));
    hex.truncate(FINGERPRINT_LEN);
    hex
}
