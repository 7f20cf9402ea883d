use serde::{Deserialize, Serialize};

use crate::canonical;
use crate::crypto::aead::NONCE_LEN;
use crate::error::Error;

/// Clear ratchet header: the sender's current DH public key and the chain
/// counters the receiver needs to line up its state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageHeader {
    pub dh_public: [u8; 32],
    /// Message number within the sender's current chain.
    pub n: u32,
    /// Length of the sender's previous chain.
    pub pn: u32,
}

/// A ratchet-encrypted message as it travels on the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedMessage {
    pub header: MessageHeader,
    pub nonce: [u8; NONCE_LEN],
    pub ciphertext: Vec<u8>,
}

impl EncryptedMessage {
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        canonical::to_bytes(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        canonical::from_bytes(bytes)
    }
}
