/// The length of a BLAKE3 digest in bytes.
pub const HASH_LEN: usize = 32;

/// 32-byte BLAKE3 digest of the provided bytes.
pub fn digest(data: impl AsRef<[u8]>) -> [u8; HASH_LEN] {
    *blake3::hash(data.as_ref()).as_bytes()
}

/// Keyed BLAKE3 (MAC mode) with a 32-byte key.
pub fn keyed_digest(key: &[u8; HASH_LEN], data: impl AsRef<[u8]>) -> [u8; HASH_LEN] {
    *blake3::keyed_hash(key, data.as_ref()).as_bytes()
}

/// BLAKE3 derive-key mode: fills `out` from `ikm` under a context label.
///
/// The context string names the key purpose and must be unique per use.
pub fn derive(context: &str, ikm: &[u8], out: &mut [u8]) {
    let mut hasher = blake3::Hasher::new_derive_key(context);
    hasher.update(ikm);
    hasher.finalize_xof().fill(out);
}
