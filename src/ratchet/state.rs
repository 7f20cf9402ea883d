use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::{X25519PublicKey, X25519Secret};
use crate::ratchet::chain::ChainKey;

/// Mutable per-conversation ratchet state.
///
/// Owned exclusively by one session; mutated on every send and receive.
#[derive(Clone)]
pub(crate) struct RatchetState {
    /// Our current DH ratchet key pair.
    pub(crate) dh_send: X25519Secret,
    /// The peer's current DH ratchet public key, once one has been seen.
    pub(crate) dh_receive: Option<X25519PublicKey>,
    pub(crate) root_key: Box<[u8; 32]>,
    pub(crate) send_chain: Option<ChainKey>,
    pub(crate) receive_chain: Option<ChainKey>,
    pub(crate) send_n: u32,
    pub(crate) receive_n: u32,
    pub(crate) previous_send_n: u32,
}

impl Zeroize for RatchetState {
    fn zeroize(&mut self) {
        self.dh_send.zeroize();
        self.root_key.zeroize();
        if let Some(chain) = self.send_chain.as_mut() {
            chain.zeroize();
        }
        if let Some(chain) = self.receive_chain.as_mut() {
            chain.zeroize();
        }
    }
}

impl Drop for RatchetState {
    fn drop(&mut self) {
        self.zeroize();
    }
}

impl ZeroizeOnDrop for RatchetState {}

impl std::fmt::Debug for RatchetState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RatchetState")
            .field("dh_send", &self.dh_send.public_key())
            .field("dh_receive", &self.dh_receive)
            .field("send_n", &self.send_n)
            .field("receive_n", &self.receive_n)
            .field("previous_send_n", &self.previous_send_n)
            .finish()
    }
}

/// Serialized ratchet, private halves included; for storage only, never for
/// the wire.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RatchetRepr {
    pub dh_send_private: [u8; 32],
    pub dh_receive: Option<[u8; 32]>,
    pub root_key: [u8; 32],
    pub send_chain_key: Option<[u8; 32]>,
    pub receive_chain_key: Option<[u8; 32]>,
    pub send_n: u32,
    pub receive_n: u32,
    pub previous_send_n: u32,
    pub skipped_keys: Vec<SkippedKeyRepr>,
    pub max_skip: u32,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SkippedKeyRepr {
    pub dh_public: [u8; 32],
    pub n: u32,
    pub message_key: [u8; 32],
}

impl Zeroize for RatchetRepr {
    fn zeroize(&mut self) {
        self.dh_send_private.zeroize();
        self.root_key.zeroize();
        if let Some(key) = self.send_chain_key.as_mut() {
            key.zeroize();
        }
        if let Some(key) = self.receive_chain_key.as_mut() {
            key.zeroize();
        }
        for entry in &mut self.skipped_keys {
            entry.message_key.zeroize();
        }
    }
}

impl Drop for RatchetRepr {
    fn drop(&mut self) {
        self.zeroize();
    }
}

impl ZeroizeOnDrop for RatchetRepr {}
