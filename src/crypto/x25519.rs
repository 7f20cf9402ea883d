use std::fmt;

use subtle::ConstantTimeEq;
use x25519_dalek::{PublicKey, SharedSecret, StaticSecret};
use zeroize::Zeroize;

use crate::crypto::random::random_seed;
use crate::error::Error;

/// Length of an X25519 public point or scalar.
pub const X25519_KEY_LEN: usize = 32;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct X25519PublicKey(PublicKey);

impl X25519PublicKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    /// Constant-time equality; use this wherever the comparison selects an
    /// identity or steers the ratchet.
    pub fn ct_eq(&self, other: &X25519PublicKey) -> bool {
        bool::from(self.0.as_bytes().ct_eq(other.0.as_bytes()))
    }
}

impl From<[u8; 32]> for X25519PublicKey {
    fn from(bytes: [u8; 32]) -> Self {
        Self(PublicKey::from(bytes))
    }
}

impl From<PublicKey> for X25519PublicKey {
    fn from(value: PublicKey) -> Self {
        Self(value)
    }
}

impl TryFrom<&[u8]> for X25519PublicKey {
    type Error = Error;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let bytes: [u8; 32] = value.try_into().map_err(|_| {
            Error::InputValidation(format!(
                "X25519 public key must be {X25519_KEY_LEN} bytes, got {}",
                value.len()
            ))
        })?;
        Ok(Self::from(bytes))
    }
}

impl AsRef<PublicKey> for X25519PublicKey {
    fn as_ref(&self) -> &PublicKey {
        &self.0
    }
}

#[derive(Clone)]
pub struct X25519Secret(StaticSecret);

impl X25519Secret {
    /// A fresh key pair from the OS CSPRNG.
    pub fn generate() -> Result<Self, Error> {
        let mut seed = random_seed()?;
        let secret = Self::from(seed);
        seed.zeroize();
        Ok(secret)
    }

    pub fn dh(&self, public_key: &X25519PublicKey) -> SharedSecret {
        self.0.diffie_hellman(public_key.as_ref())
    }

    pub fn public_key(&self) -> X25519PublicKey {
        PublicKey::from(&self.0).into()
    }

    pub(crate) fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }

    pub(crate) fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }
}

impl From<[u8; 32]> for X25519Secret {
    fn from(bytes: [u8; 32]) -> Self {
        Self(StaticSecret::from(bytes))
    }
}

impl AsRef<StaticSecret> for X25519Secret {
    fn as_ref(&self) -> &StaticSecret {
        &self.0
    }
}

impl Zeroize for X25519Secret {
    fn zeroize(&mut self) {
        self.0.zeroize()
    }
}

impl fmt::Debug for X25519Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("X25519Secret").field("scalar", &"***").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ecdh_agrees() {
        let a = X25519Secret::generate().unwrap();
        let b = X25519Secret::generate().unwrap();

        let ab = a.dh(&b.public_key());
        let ba = b.dh(&a.public_key());
        assert_eq!(ab.as_bytes(), ba.as_bytes());
    }

    #[test]
    fn public_key_parse_rejects_wrong_length() {
        assert!(X25519PublicKey::try_from([0u8; 31].as_slice()).is_err());
        assert!(X25519PublicKey::try_from([0u8; 32].as_slice()).is_ok());
    }

    #[test]
    fn ct_eq_matches_plain_eq() {
        let a = X25519Secret::generate().unwrap().public_key();
        let b = X25519Secret::generate().unwrap().public_key();
        assert!(a.ct_eq(&a));
        assert!(!a.ct_eq(&b));
    }

    #[test]
    fn debug_never_prints_scalar() {
        let secret = X25519Secret::generate().unwrap();
        let rendered = format!("{secret:?}");
        assert!(rendered.contains("***"));
    }
}
