use ed25519_dalek::ed25519::SignatureBytes;
use ed25519_dalek::{SecretKey, Signature, SigningKey, Verifier, VerifyingKey};

use crate::crypto::hash;
use crate::error::Error;

/// Length of an Ed25519 public key.
pub const PUBLIC_KEY_LEN: usize = 32;
/// Length of an Ed25519 seed.
pub const SEED_LEN: usize = 32;
/// Length of a full private key (seed followed by public key).
pub const KEYPAIR_LEN: usize = 64;
/// Length of an Ed25519 signature.
pub const SIGNATURE_LEN: usize = 64;

/// Accepts either a 32-byte seed or a 64-byte seed-and-public private key.
fn signing_key_from_private(private: &[u8]) -> Result<SigningKey, Error> {
    match private.len() {
        SEED_LEN => {
            let mut seed = [0u8; SEED_LEN];
            seed.copy_from_slice(private);
            Ok(SigningKey::from_bytes(&SecretKey::from(seed)))
        }
        KEYPAIR_LEN => {
            let mut seed = [0u8; SEED_LEN];
            seed.copy_from_slice(&private[..SEED_LEN]);
            Ok(SigningKey::from_bytes(&SecretKey::from(seed)))
        }
        other => Err(Error::InputValidation(format!(
            "signing key must be {SEED_LEN} or {KEYPAIR_LEN} bytes, got {other}"
        ))),
    }
}

/// Signs a message with Ed25519.
pub fn sign(private: &[u8], message: &[u8]) -> Result<[u8; SIGNATURE_LEN], Error> {
    use ed25519_dalek::Signer;

    let key = signing_key_from_private(private)?;
    Ok(key.sign(message).to_bytes())
}

/// Verifies an Ed25519 signature.
///
/// Returns `false` on any malformed input; never raises.
pub fn verify(public: &[u8], message: &[u8], signature: &[u8]) -> bool {
    let Ok(public): Result<[u8; PUBLIC_KEY_LEN], _> = public.try_into() else {
        return false;
    };
    let Ok(verifying_key) = VerifyingKey::from_bytes(&public) else {
        return false;
    };
    let Ok(signature): Result<[u8; SIGNATURE_LEN], _> = signature.try_into() else {
        return false;
    };
    let signature = Signature::from_bytes(&SignatureBytes::from(signature));

    verifying_key.verify(message, &signature).is_ok()
}

/// BLAKE3-then-sign: hashes the data and signs the 32-byte digest.
pub fn sign_hash(private: &[u8], data: &[u8]) -> Result<[u8; SIGNATURE_LEN], Error> {
    sign(private, &hash::digest(data))
}

/// Companion to [`sign_hash`]: hashes the data and verifies over the digest.
pub fn verify_hash(public: &[u8], data: &[u8], signature: &[u8]) -> bool {
    verify(public, &hash::digest(data), signature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::random::random_seed;

    #[test]
    fn sign_verify_roundtrip() {
        let seed = random_seed().unwrap();
        let key = SigningKey::from_bytes(&SecretKey::from(seed));
        let public = key.verifying_key().to_bytes();

        let signature = sign(&seed, b"a message").unwrap();
        assert!(verify(&public, b"a message", &signature));
        assert!(!verify(&public, b"another message", &signature));
    }

    #[test]
    fn full_private_key_signs_like_seed() {
        let seed = random_seed().unwrap();
        let key = SigningKey::from_bytes(&SecretKey::from(seed));
        let keypair = key.to_keypair_bytes();

        let from_seed = sign(&seed, b"msg").unwrap();
        let from_keypair = sign(&keypair, b"msg").unwrap();
        assert_eq!(from_seed, from_keypair);
    }

    #[test]
    fn wrong_length_key_is_rejected() {
        assert!(matches!(
            sign(&[0u8; 31], b"msg"),
            Err(Error::InputValidation(_))
        ));
    }

    #[test]
    fn verify_never_raises_on_garbage() {
        assert!(!verify(&[0u8; 3], b"msg", &[0u8; 64]));
        assert!(!verify(&[0u8; 32], b"msg", &[0u8; 12]));
        assert!(!verify(&[255u8; 32], b"msg", &[255u8; 64]));
    }

    #[test]
    fn hash_then_sign_composes() {
        let seed = random_seed().unwrap();
        let key = SigningKey::from_bytes(&SecretKey::from(seed));
        let public = key.verifying_key().to_bytes();

        let signature = sign_hash(&seed, b"payload").unwrap();
        assert!(verify_hash(&public, b"payload", &signature));
        assert!(!verify_hash(&public, b"tampered", &signature));
    }
}
