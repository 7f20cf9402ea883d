//! X3DH key agreement: asynchronous session establishment from a published
//! prekey bundle.
//!
//! The initiator and responder compute the same `DH1 ‖ DH2 ‖ DH3 [‖ DH4]`
//! transcript with private/public pairings swapped, then expand it with
//! HKDF-SHA256 under the `x3dh-v1` info and the default zero salt.

mod one_time_pre_key;
pub use one_time_pre_key::OneTimePreKey;

mod pre_key;
pub(crate) use pre_key::PrekeySetRepr;
pub use pre_key::{
    OneTimePrekeyPublic, PrekeyBundle, PrekeySet, SignedPreKey, SignedPrekeyPublic,
};

use subtle::ConstantTimeEq;
use x25519_dalek::SharedSecret;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::kdf::{hkdf_expand, X3DH_INFO};
use crate::crypto::{X25519PublicKey, X25519Secret};
use crate::error::Error;
use crate::keys::KeySet;

/// The 32-byte secret both sides derive from the handshake.
pub struct X3dhSharedSecret(Box<[u8; 32]>);

impl X3dhSharedSecret {
    pub(crate) fn from_bytes(bytes: Box<[u8; 32]>) -> Self {
        Self(bytes)
    }

    pub(crate) fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl PartialEq for X3dhSharedSecret {
    fn eq(&self, other: &Self) -> bool {
        bool::from(self.0.ct_eq(other.0.as_slice()))
    }
}

impl Eq for X3dhSharedSecret {}

impl Zeroize for X3dhSharedSecret {
    fn zeroize(&mut self) {
        self.0.zeroize();
    }
}

impl Drop for X3dhSharedSecret {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl ZeroizeOnDrop for X3dhSharedSecret {}

impl std::fmt::Debug for X3dhSharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("X3dhSharedSecret").field("secret", &"***").finish()
    }
}

/// The initiator's half of the handshake: the shared secret plus everything
/// the responder needs to repeat the computation.
#[derive(Debug)]
pub struct X3dhInitiation {
    pub shared_secret: X3dhSharedSecret,
    pub ephemeral_public: X25519PublicKey,
    pub used_signed_prekey_id: u32,
    pub used_one_time_prekey_id: Option<u32>,
}

/// Initiates key agreement against a peer's published bundle.
///
/// The bundle's signed prekey signature is checked against the peer's
/// Ed25519 key before any DH is computed. The first unused one-time prekey
/// in the bundle, if any, is consumed.
pub fn initiate(
    key_set: &KeySet,
    bundle: &PrekeyBundle,
    peer_signing_public: &[u8; 32],
) -> Result<X3dhInitiation, Error> {
    bundle.verify(peer_signing_public)?;

    let peer_identity = X25519PublicKey::from(bundle.identity_key);
    let peer_signed_prekey = X25519PublicKey::from(bundle.signed_prekey.public_key);
    let one_time = bundle.one_time_prekeys.first();

    let ephemeral = X25519Secret::generate()?;

    // DH1 = DH(IKa, SPKb)
    let dh1 = key_set.encryption.secret().dh(&peer_signed_prekey);
    // DH2 = DH(EKa, IKb)
    let dh2 = ephemeral.dh(&peer_identity);
    // DH3 = DH(EKa, SPKb)
    let dh3 = ephemeral.dh(&peer_signed_prekey);
    // DH4 = DH(EKa, OPKb)
    let dh4 = one_time.map(|key| ephemeral.dh(&X25519PublicKey::from(key.public_key)));

    let shared_secret = derive_shared_secret(dh1, dh2, dh3, dh4)?;

    Ok(X3dhInitiation {
        shared_secret,
        ephemeral_public: ephemeral.public_key(),
        used_signed_prekey_id: bundle.signed_prekey.id,
        used_one_time_prekey_id: one_time.map(|key| key.id),
    })
}

/// The responder's half: recomputes the secret from the initiator's keys
/// and the prekey ids they used.
///
/// A referenced one-time prekey is atomically marked used; accepting the
/// same id twice fails with [`Error::UnknownOneTimePrekey`].
pub fn respond(
    key_set: &KeySet,
    prekeys: &mut PrekeySet,
    peer_identity_public: &X25519PublicKey,
    peer_ephemeral_public: &X25519PublicKey,
    signed_prekey_id: u32,
    one_time_prekey_id: Option<u32>,
) -> Result<X3dhSharedSecret, Error> {
    if prekeys.signed_prekey().id() != signed_prekey_id {
        return Err(Error::UnknownSignedPrekey(signed_prekey_id));
    }

    let one_time_secret = match one_time_prekey_id {
        Some(id) => Some(prekeys.use_one_time(id)?),
        None => None,
    };

    let signed_prekey = prekeys.signed_prekey();

    // DH1 = DH(SPKb, IKa)
    let dh1 = signed_prekey.key_pair().dh(peer_identity_public);
    // DH2 = DH(IKb, EKa)
    let dh2 = key_set.encryption.secret().dh(peer_ephemeral_public);
    // DH3 = DH(SPKb, EKa)
    let dh3 = signed_prekey.key_pair().dh(peer_ephemeral_public);
    // DH4 = DH(OPKb, EKa)
    let dh4 = one_time_secret.map(|secret| secret.dh(peer_ephemeral_public));

    derive_shared_secret(dh1, dh2, dh3, dh4)
}

fn derive_shared_secret(
    dh1: SharedSecret,
    dh2: SharedSecret,
    dh3: SharedSecret,
    dh4: Option<SharedSecret>,
) -> Result<X3dhSharedSecret, Error> {
    // IKM = DH1 || DH2 || DH3 [|| DH4]; the optional part is absent, not
    // zero-filled, so both arities produce distinct transcripts.
    let mut ikm = Vec::with_capacity(128);
    ikm.extend_from_slice(dh1.as_bytes());
    ikm.extend_from_slice(dh2.as_bytes());
    ikm.extend_from_slice(dh3.as_bytes());
    if let Some(dh4) = &dh4 {
        ikm.extend_from_slice(dh4.as_bytes());
    }

    let mut secret = Box::new([0u8; 32]);
    let expanded = hkdf_expand(&ikm, None, X3DH_INFO, secret.as_mut_slice());
    ikm.zeroize();
    expanded?;

    Ok(X3dhSharedSecret(secret))
}
