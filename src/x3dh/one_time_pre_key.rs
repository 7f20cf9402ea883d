use std::collections::HashMap;

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::random::random_array;
use crate::crypto::{X25519PublicKey, X25519Secret};
use crate::error::Error;

/// A single-use X25519 prekey.
///
/// Consumed keys stay in the set with `used = true` so a replayed handshake
/// referencing the same id fails instead of silently reusing the key.
#[derive(Clone)]
pub struct OneTimePreKey {
    secret: X25519Secret,
    id: u32,
    used: bool,
}

impl OneTimePreKey {
    pub(crate) fn new(id: u32, secret: X25519Secret) -> Self {
        Self {
            secret,
            id,
            used: false,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn is_used(&self) -> bool {
        self.used
    }

    pub fn public_key(&self) -> X25519PublicKey {
        self.secret.public_key()
    }

    pub(crate) fn secret_bytes(&self) -> [u8; 32] {
        self.secret.to_bytes()
    }

    pub(crate) fn restore(id: u32, secret: X25519Secret, used: bool) -> Self {
        Self { secret, id, used }
    }
}

impl Zeroize for OneTimePreKey {
    fn zeroize(&mut self) {
        self.secret.zeroize();
        self.id = 0;
        self.used = false;
    }
}

impl ZeroizeOnDrop for OneTimePreKey {}

/// Pool of one-time prekeys with random ids.
pub(crate) struct OneTimePreKeyStore {
    keys: HashMap<u32, OneTimePreKey>,
    max_keys: usize,
}

impl OneTimePreKeyStore {
    pub(crate) fn new(max_keys: usize) -> Self {
        Self {
            keys: HashMap::with_capacity(max_keys),
            max_keys,
        }
    }

    pub(crate) fn generate(&mut self, count: usize) -> Result<(), Error> {
        for _ in 0..count {
            let id = self.fresh_id()?;
            self.keys
                .insert(id, OneTimePreKey::new(id, X25519Secret::generate()?));
        }
        Ok(())
    }

    fn fresh_id(&self) -> Result<u32, Error> {
        loop {
            let id = u32::from_be_bytes(random_array::<4>()?);
            if !self.keys.contains_key(&id) {
                return Ok(id);
            }
        }
    }

    /// Marks the key used and hands out its secret; a second call with the
    /// same id fails.
    pub(crate) fn use_key(&mut self, id: u32) -> Result<X25519Secret, Error> {
        match self.keys.get_mut(&id) {
            Some(key) if !key.used => {
                key.used = true;
                Ok(key.secret.clone())
            }
            _ => Err(Error::UnknownOneTimePrekey(id)),
        }
    }

    /// Public halves of the keys that are still unused.
    pub(crate) fn unused_public_keys(&self) -> Vec<(u32, X25519PublicKey)> {
        let mut keys: Vec<(u32, X25519PublicKey)> = self
            .keys
            .values()
            .filter(|key| !key.used)
            .map(|key| (key.id, key.public_key()))
            .collect();
        keys.sort_by_key(|(id, _)| *id);
        keys
    }

    pub(crate) fn unused_count(&self) -> usize {
        self.keys.values().filter(|key| !key.used).count()
    }

    /// Tops the pool back up to its configured size, dropping spent keys.
    pub(crate) fn replenish(&mut self) -> Result<usize, Error> {
        self.keys.retain(|_, key| !key.used);
        let needed = self.max_keys.saturating_sub(self.keys.len());
        self.generate(needed)?;
        Ok(needed)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &OneTimePreKey> {
        self.keys.values()
    }

    pub(crate) fn max_keys(&self) -> usize {
        self.max_keys
    }

    pub(crate) fn restore(max_keys: usize, keys: Vec<OneTimePreKey>) -> Self {
        Self {
            keys: keys.into_iter().map(|key| (key.id, key)).collect(),
            max_keys,
        }
    }
}

impl Zeroize for OneTimePreKeyStore {
    fn zeroize(&mut self) {
        for key in self.keys.values_mut() {
            key.zeroize();
        }
        self.keys.clear();
        self.max_keys = 0;
    }
}

impl ZeroizeOnDrop for OneTimePreKeyStore {}
