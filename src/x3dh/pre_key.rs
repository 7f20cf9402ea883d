use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::random::random_array;
use crate::crypto::sign::{self, SIGNATURE_LEN};
use crate::crypto::{X25519PublicKey, X25519Secret};
use crate::error::Error;
use crate::keys::{KeySet, SigningKeyPair};
use crate::time::{now_millis, SIGNED_PREKEY_ROTATION_MS};
use crate::x3dh::one_time_pre_key::{OneTimePreKey, OneTimePreKeyStore};

/// Medium-term X25519 prekey, signed by the identity's Ed25519 key.
///
/// The signature is over the raw 32-byte public key, with no pre-hash; that
/// exact transcript is part of the wire surface.
pub struct SignedPreKey {
    secret: X25519Secret,
    id: u32,
    created: u64,
    signature: [u8; SIGNATURE_LEN],
}

impl SignedPreKey {
    pub(crate) fn generate(signing: &SigningKeyPair) -> Result<Self, Error> {
        let secret = X25519Secret::generate()?;
        let id = u32::from_be_bytes(random_array::<4>()?);
        let signature = signing.sign(secret.public_key().as_bytes());

        Ok(Self {
            secret,
            id,
            created: now_millis(),
            signature,
        })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn created(&self) -> u64 {
        self.created
    }

    pub fn public_key(&self) -> X25519PublicKey {
        self.secret.public_key()
    }

    pub fn signature(&self) -> &[u8; SIGNATURE_LEN] {
        &self.signature
    }

    /// Clones the full key pair, for seeding the receiver-side ratchet.
    pub fn key_pair(&self) -> X25519Secret {
        self.secret.clone()
    }

    pub(crate) fn secret_bytes(&self) -> [u8; 32] {
        self.secret.to_bytes()
    }

    /// True once the key is older than the rotation window.
    pub fn needs_rotation(&self, now: u64, window_ms: u64) -> bool {
        now.saturating_sub(self.created) > window_ms
    }

    pub(crate) fn restore(
        id: u32,
        created: u64,
        signature: [u8; SIGNATURE_LEN],
        secret: X25519Secret,
    ) -> Self {
        Self {
            secret,
            id,
            created,
            signature,
        }
    }
}

impl Zeroize for SignedPreKey {
    fn zeroize(&mut self) {
        self.secret.zeroize();
        self.id = 0;
        self.created = 0;
        self.signature.zeroize();
    }
}

impl ZeroizeOnDrop for SignedPreKey {}

/// Public half of a signed prekey as published in a bundle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedPrekeyPublic {
    pub id: u32,
    pub public_key: [u8; 32],
    pub signature: Vec<u8>,
    pub created: u64,
}

/// Public half of a one-time prekey as published in a bundle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OneTimePrekeyPublic {
    pub id: u32,
    pub public_key: [u8; 32],
}

/// Public projection of a prekey set: no private keys, only unused one-time
/// prekeys. This is the snapshot an initiator fetches from discovery.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrekeyBundle {
    /// The owner's X25519 identity (encryption) public key.
    pub identity_key: [u8; 32],
    pub signed_prekey: SignedPrekeyPublic,
    pub one_time_prekeys: Vec<OneTimePrekeyPublic>,
}

impl PrekeyBundle {
    /// Checks the signed prekey's signature against the owner's Ed25519 key.
    pub fn verify(&self, signing_public: &[u8; 32]) -> Result<(), Error> {
        if sign::verify(
            signing_public,
            &self.signed_prekey.public_key,
            &self.signed_prekey.signature,
        ) {
            Ok(())
        } else {
            Err(Error::Authentication)
        }
    }
}

/// An identity's prekey material: one signed prekey plus a pool of one-time
/// prekeys.
pub struct PrekeySet {
    signed_prekey: SignedPreKey,
    one_time: OneTimePreKeyStore,
}

impl PrekeySet {
    /// Generates a signed prekey and `one_time_count` one-time prekeys.
    pub fn generate(key_set: &KeySet, one_time_count: usize) -> Result<Self, Error> {
        let signed_prekey = SignedPreKey::generate(&key_set.signing)?;
        let mut one_time = OneTimePreKeyStore::new(one_time_count);
        one_time.generate(one_time_count)?;

        Ok(Self {
            signed_prekey,
            one_time,
        })
    }

    pub fn signed_prekey(&self) -> &SignedPreKey {
        &self.signed_prekey
    }

    /// The publishable snapshot of this set.
    pub fn bundle(&self, key_set: &KeySet) -> PrekeyBundle {
        PrekeyBundle {
            identity_key: key_set.encryption.public().to_bytes(),
            signed_prekey: SignedPrekeyPublic {
                id: self.signed_prekey.id(),
                public_key: self.signed_prekey.public_key().to_bytes(),
                signature: self.signed_prekey.signature().to_vec(),
                created: self.signed_prekey.created(),
            },
            one_time_prekeys: self
                .one_time
                .unused_public_keys()
                .into_iter()
                .map(|(id, public_key)| OneTimePrekeyPublic {
                    id,
                    public_key: public_key.to_bytes(),
                })
                .collect(),
        }
    }

    /// True when the signed prekey is past its 7-day window.
    pub fn needs_signed_prekey_rotation(&self) -> bool {
        self.signed_prekey
            .needs_rotation(now_millis(), SIGNED_PREKEY_ROTATION_MS)
    }

    /// Replaces the signed prekey with a freshly signed one.
    pub fn rotate_signed_prekey(&mut self, signing: &SigningKeyPair) -> Result<&SignedPreKey, Error> {
        self.signed_prekey = SignedPreKey::generate(signing)?;
        Ok(&self.signed_prekey)
    }

    /// Refills the one-time pool; returns how many keys were added.
    pub fn replenish_one_time_prekeys(&mut self) -> Result<usize, Error> {
        self.one_time.replenish()
    }

    pub fn unused_one_time_count(&self) -> usize {
        self.one_time.unused_count()
    }

    pub(crate) fn use_one_time(&mut self, id: u32) -> Result<X25519Secret, Error> {
        self.one_time.use_key(id)
    }

    pub(crate) fn one_time_store(&self) -> &OneTimePreKeyStore {
        &self.one_time
    }

    pub(crate) fn restore(signed_prekey: SignedPreKey, one_time: OneTimePreKeyStore) -> Self {
        Self {
            signed_prekey,
            one_time,
        }
    }
}

impl Zeroize for PrekeySet {
    fn zeroize(&mut self) {
        self.signed_prekey.zeroize();
        self.one_time.zeroize();
    }
}

impl ZeroizeOnDrop for PrekeySet {}

/// Serialized form of a prekey set, for session-state persistence. The same
/// bundle must stay valid across restarts, so private halves and used flags
/// are carried in full.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PrekeySetRepr {
    pub signed_prekey_id: u32,
    pub signed_prekey_created: u64,
    pub signed_prekey_signature: Vec<u8>,
    pub signed_prekey_private: [u8; 32],
    pub one_time_prekeys: Vec<OneTimePrekeyRepr>,
    pub one_time_capacity: usize,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct OneTimePrekeyRepr {
    pub id: u32,
    pub used: bool,
    pub private: [u8; 32],
}

impl Zeroize for PrekeySetRepr {
    fn zeroize(&mut self) {
        self.signed_prekey_signature.zeroize();
        self.signed_prekey_private.zeroize();
        for key in &mut self.one_time_prekeys {
            key.private.zeroize();
        }
    }
}

impl PrekeySet {
    pub(crate) fn to_repr(&self) -> PrekeySetRepr {
        let mut one_time_prekeys: Vec<OneTimePrekeyRepr> = self
            .one_time
            .iter()
            .map(|key| OneTimePrekeyRepr {
                id: key.id(),
                used: key.is_used(),
                private: key.secret_bytes(),
            })
            .collect();
        one_time_prekeys.sort_by_key(|key| key.id);

        PrekeySetRepr {
            signed_prekey_id: self.signed_prekey.id(),
            signed_prekey_created: self.signed_prekey.created(),
            signed_prekey_signature: self.signed_prekey.signature().to_vec(),
            signed_prekey_private: self.signed_prekey.secret_bytes(),
            one_time_prekeys,
            one_time_capacity: self.one_time.max_keys(),
        }
    }

    pub(crate) fn from_repr(mut repr: PrekeySetRepr) -> Result<Self, Error> {
        let signature: [u8; SIGNATURE_LEN] =
            repr.signed_prekey_signature.as_slice().try_into().map_err(|_| {
                Error::InputValidation("signed prekey signature must be 64 bytes".to_string())
            })?;

        let signed_prekey = SignedPreKey::restore(
            repr.signed_prekey_id,
            repr.signed_prekey_created,
            signature,
            X25519Secret::from(repr.signed_prekey_private),
        );

        let keys = repr
            .one_time_prekeys
            .iter()
            .map(|key| OneTimePreKey::restore(key.id, X25519Secret::from(key.private), key.used))
            .collect();
        let one_time = OneTimePreKeyStore::restore(repr.one_time_capacity, keys);

        repr.zeroize();
        Ok(Self::restore(signed_prekey, one_time))
    }
}
