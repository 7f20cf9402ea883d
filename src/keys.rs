//! Key material owned by an identity: an Ed25519 signing pair and an
//! X25519 encryption pair, generated fresh or derived from a 32-byte seed.

use ed25519_dalek::{SecretKey, Signer, SigningKey};
use zeroize::Zeroize;

use crate::crypto::kdf::{self, ENCRYPTION_KEY_INFO, SIGNING_KEY_INFO};
use crate::crypto::random::random_seed;
use crate::crypto::sign::{KEYPAIR_LEN, SEED_LEN, SIGNATURE_LEN};
use crate::crypto::{X25519PublicKey, X25519Secret};
use crate::error::Error;

/// Ed25519 signing key pair.
///
/// The "full" private form is 64 bytes: the seed followed by the public key.
#[derive(Clone)]
pub struct SigningKeyPair {
    key: SigningKey,
}

impl SigningKeyPair {
    pub fn generate() -> Result<Self, Error> {
        let mut seed = random_seed()?;
        let pair = Self::from_seed(&seed);
        seed.zeroize();
        Ok(pair)
    }

    pub fn from_seed(seed: &[u8; SEED_LEN]) -> Self {
        Self {
            key: SigningKey::from_bytes(&SecretKey::from(*seed)),
        }
    }

    /// Restores a pair from the 64-byte seed-and-public form.
    pub fn from_keypair_bytes(bytes: &[u8; KEYPAIR_LEN]) -> Result<Self, Error> {
        let key = SigningKey::from_keypair_bytes(bytes)
            .map_err(|_| Error::InputValidation("inconsistent signing key pair".to_string()))?;
        Ok(Self { key })
    }

    pub fn public(&self) -> [u8; 32] {
        self.key.verifying_key().to_bytes()
    }

    /// The 64-byte private form: seed followed by public key.
    pub fn keypair_bytes(&self) -> [u8; KEYPAIR_LEN] {
        self.key.to_keypair_bytes()
    }

    pub fn sign(&self, message: &[u8]) -> [u8; SIGNATURE_LEN] {
        self.key.sign(message).to_bytes()
    }

    /// BLAKE3-then-sign over arbitrary data.
    pub fn sign_hash(&self, data: &[u8]) -> [u8; SIGNATURE_LEN] {
        self.sign(&crate::crypto::hash::digest(data))
    }
}

impl std::fmt::Debug for SigningKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKeyPair")
            .field("public", &self.public())
            .finish()
    }
}

/// X25519 encryption key pair.
#[derive(Clone, Debug)]
pub struct EncryptionKeyPair {
    secret: X25519Secret,
}

impl EncryptionKeyPair {
    pub fn generate() -> Result<Self, Error> {
        Ok(Self {
            secret: X25519Secret::generate()?,
        })
    }

    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            secret: X25519Secret::from(*seed),
        }
    }

    pub fn public(&self) -> X25519PublicKey {
        self.secret.public_key()
    }

    pub fn secret(&self) -> &X25519Secret {
        &self.secret
    }

    pub(crate) fn secret_bytes(&self) -> [u8; 32] {
        self.secret.to_bytes()
    }
}

impl Zeroize for EncryptionKeyPair {
    fn zeroize(&mut self) {
        self.secret.zeroize();
    }
}

/// The signing and encryption pairs owned by one identity.
#[derive(Clone, Debug)]
pub struct KeySet {
    pub signing: SigningKeyPair,
    pub encryption: EncryptionKeyPair,
}

impl KeySet {
    pub fn generate() -> Result<Self, Error> {
        Ok(Self {
            signing: SigningKeyPair::generate()?,
            encryption: EncryptionKeyPair::generate()?,
        })
    }

    /// Derives both pairs from a 32-byte seed.
    ///
    /// Each private half is HKDF of the seed under its own purpose info, so
    /// the two keys stay independent even with a shared seed.
    pub fn from_seed(seed: &[u8; 32]) -> Result<Self, Error> {
        let mut signing_material = kdf::hkdf_key(seed, SIGNING_KEY_INFO)?;
        let mut encryption_material = kdf::hkdf_key(seed, ENCRYPTION_KEY_INFO)?;

        let key_set = Self {
            signing: SigningKeyPair::from_seed(&signing_material),
            encryption: EncryptionKeyPair::from_seed(&encryption_material),
        };

        signing_material.zeroize();
        encryption_material.zeroize();

        Ok(key_set)
    }
}
