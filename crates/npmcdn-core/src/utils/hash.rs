//! Blake3 hashing utilities.
//!
//! Used to turn arbitrary cache keys into fixed-length, filesystem-safe names.

/// Compute Blake3 hash of data as lowercase hex
pub fn blake3_hash(data: &[u8]) -> String {
    let hash = blake3::hash(data);
    hash.to_hex().to_string()
}
