//! Cryptographic primitives.
//!
//! Everything above this module (identifiers, identities, content objects,
//! X3DH, the ratchet) bottoms out here:
//! - OS CSPRNG access
//! - BLAKE3 hashing (plain, keyed, derive)
//! - Ed25519 signatures
//! - X25519 key agreement
//! - XChaCha20-Poly1305 AEAD
//! - HKDF-SHA256 and the Argon2id password KDF

pub mod aead;
pub mod hash;
pub mod kdf;
pub mod random;
pub mod sign;

mod x25519;
pub use x25519::{X25519PublicKey, X25519Secret, X25519_KEY_LEN};
