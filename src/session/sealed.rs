use serde::{Deserialize, Serialize};

use crate::content::payload::{open_box, seal_box};
use crate::crypto::aead::NONCE_LEN;
use crate::crypto::X25519PublicKey;
use crate::error::Error;
use crate::keys::EncryptionKeyPair;

const SEALED_VERSION: u32 = 2;
const SEALED_TYPE: &str = "sealed";

/// One-shot anonymous envelope: no session, and no sender metadata on the
/// wire. The recipient learns the sender only from the decrypted content,
/// if it names one.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SealedMessage {
    pub version: u32,
    #[serde(rename = "type")]
    pub message_type: String,
    pub ephemeral_public: [u8; 32],
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; NONCE_LEN],
}

/// Seals a plaintext to a recipient's encryption public key.
pub fn sealed_send(
    recipient: &X25519PublicKey,
    plaintext: &[u8],
) -> Result<SealedMessage, Error> {
    let boxed = seal_box(recipient, plaintext)?;
    Ok(SealedMessage {
        version: SEALED_VERSION,
        message_type: SEALED_TYPE.to_string(),
        ephemeral_public: boxed.ephemeral_public,
        ciphertext: boxed.ciphertext,
        nonce: boxed.nonce,
    })
}

/// Opens a sealed envelope with the recipient's encryption pair.
pub fn sealed_receive(
    encryption: &EncryptionKeyPair,
    message: &SealedMessage,
) -> Result<Vec<u8>, Error> {
    if message.version != SEALED_VERSION {
        return Err(Error::Protocol(format!(
            "unsupported sealed message version {}",
            message.version
        )));
    }
    if message.message_type != SEALED_TYPE {
        return Err(Error::Protocol(format!(
            "unexpected message type {:?}",
            message.message_type
        )));
    }

    open_box(
        encryption.secret(),
        &message.ephemeral_public,
        &message.nonce,
        &message.ciphertext,
    )
}
