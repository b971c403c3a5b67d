use sha2::{Digest, Sha256};

/// Length in hex characters of every value returned by [`hash_string`].
pub const DIGEST_HEX_LEN: usize = 64;

/// One-way hash of an arbitrary string: hex(sha256(input)).
///
/// Deterministic and stateless; the empty string hashes like any other input.
pub fn hash_string(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex_encode(&hasher.finalize())
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{:02x}", b));
    }
    s
}
