use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::kdf::{hkdf_key, CHAIN_KEY_INFO, MESSAGE_KEY_INFO};
use crate::error::Error;

/// A symmetric ratchet chain.
///
/// Each step derives one message key and the successor chain key from the
/// current chain key, under separate HKDF infos.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub(crate) struct ChainKey {
    key: Box<[u8; 32]>,
}

impl ChainKey {
    pub(crate) fn new(key: Box<[u8; 32]>) -> Self {
        Self { key }
    }

    /// Advances the chain and returns the message key for this step.
    pub(crate) fn next(&mut self) -> Result<Box<[u8; 32]>, Error> {
        let mut message_key = hkdf_key(self.key.as_slice(), MESSAGE_KEY_INFO)?;
        let mut next_chain = hkdf_key(self.key.as_slice(), CHAIN_KEY_INFO)?;

        self.key.copy_from_slice(&next_chain);
        next_chain.zeroize();

        let boxed = Box::new(message_key);
        message_key.zeroize();
        Ok(boxed)
    }

    pub(crate) fn to_bytes(&self) -> [u8; 32] {
        *self.key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_advances_deterministically() {
        let mut a = ChainKey::new(Box::new([9u8; 32]));
        let mut b = ChainKey::new(Box::new([9u8; 32]));

        for _ in 0..5 {
            assert_eq!(a.next().unwrap(), b.next().unwrap());
        }
    }

    #[test]
    fn message_keys_differ_per_step() {
        let mut chain = ChainKey::new(Box::new([1u8; 32]));
        let first = chain.next().unwrap();
        let second = chain.next().unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn message_key_is_not_the_chain_key() {
        let mut chain = ChainKey::new(Box::new([2u8; 32]));
        let message_key = chain.next().unwrap();
        assert_ne!(*message_key, chain.to_bytes());
        assert_ne!(*message_key, [2u8; 32]);
    }
}
