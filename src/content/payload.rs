use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::crypto::aead;
use crate::crypto::kdf::{hkdf_key, KEY_WRAP_INFO, SEALED_BOX_INFO};
use crate::crypto::random::random_array;
use crate::crypto::{X25519PublicKey, X25519Secret};
use crate::error::Error;

/// Requested payload protection level.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadEncryption {
    #[default]
    None,
    Zone,
    Recipients,
    #[serde(rename = "self")]
    Sealed,
}

/// Per-recipient wrapping of the content key.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipientEntry {
    pub did: String,
    pub recipient_public_key: [u8; 32],
    pub encrypted_key: Vec<u8>,
    pub nonce: [u8; aead::NONCE_LEN],
}

/// The payload union carried by a content object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Payload {
    #[serde(rename_all = "camelCase")]
    Clear { data: Vec<u8> },
    #[serde(rename_all = "camelCase")]
    Recipients {
        ephemeral_public: [u8; 32],
        recipients: Vec<RecipientEntry>,
        ciphertext: Vec<u8>,
        nonce: [u8; aead::NONCE_LEN],
    },
    #[serde(rename_all = "camelCase")]
    Sealed {
        ephemeral_public: [u8; 32],
        ciphertext: Vec<u8>,
        nonce: [u8; aead::NONCE_LEN],
    },
}

/// Output of a sealed-box encryption.
pub(crate) struct SealedBox {
    pub ephemeral_public: [u8; 32],
    pub nonce: [u8; aead::NONCE_LEN],
    pub ciphertext: Vec<u8>,
}

/// Anonymous encryption to an X25519 public key: ephemeral ECDH, HKDF under
/// the sealed-box info, then AEAD.
pub(crate) fn seal_box(
    recipient: &X25519PublicKey,
    plaintext: &[u8],
) -> Result<SealedBox, Error> {
    let ephemeral = X25519Secret::generate()?;
    let ephemeral_public = ephemeral.public_key().to_bytes();

    let shared = ephemeral.dh(recipient);
    let mut key = hkdf_key(shared.as_bytes(), SEALED_BOX_INFO)?;
    drop(shared);

    let nonce = aead::generate_nonce()?;
    let ciphertext = aead::encrypt(&key, &nonce, plaintext, &[]);
    key.zeroize();

    Ok(SealedBox {
        ephemeral_public,
        nonce,
        ciphertext: ciphertext?,
    })
}

/// Opens a sealed box with the recipient's private key.
pub(crate) fn open_box(
    secret: &X25519Secret,
    ephemeral_public: &[u8; 32],
    nonce: &[u8; aead::NONCE_LEN],
    ciphertext: &[u8],
) -> Result<Vec<u8>, Error> {
    let shared = secret.dh(&X25519PublicKey::from(*ephemeral_public));
    let mut key = hkdf_key(shared.as_bytes(), SEALED_BOX_INFO)?;
    drop(shared);

    let plaintext = aead::decrypt(&key, nonce, ciphertext, &[]);
    key.zeroize();
    plaintext
}

/// Encrypts a payload to a set of recipients.
///
/// A fresh content key encrypts the payload once; one ephemeral X25519 pair
/// wraps that key separately for every recipient.
pub(crate) fn encrypt_for_recipients(
    plaintext: &[u8],
    recipients: &[(String, X25519PublicKey)],
) -> Result<Payload, Error> {
    if recipients.is_empty() {
        return Err(Error::Protocol(
            "recipient encryption requires at least one recipient".to_string(),
        ));
    }

    let mut content_key = random_array::<32>()?;
    let ephemeral = X25519Secret::generate()?;
    let ephemeral_public = ephemeral.public_key().to_bytes();

    let mut entries = Vec::with_capacity(recipients.len());
    for (did, public) in recipients {
        let shared = ephemeral.dh(public);
        let mut wrap_key = hkdf_key(shared.as_bytes(), KEY_WRAP_INFO)?;
        drop(shared);

        let nonce = aead::generate_nonce()?;
        let encrypted_key = aead::encrypt(&wrap_key, &nonce, &content_key, &[]);
        wrap_key.zeroize();

        entries.push(RecipientEntry {
            did: did.clone(),
            recipient_public_key: public.to_bytes(),
            encrypted_key: encrypted_key?,
            nonce,
        });
    }

    let nonce = aead::generate_nonce()?;
    let ciphertext = aead::encrypt(&content_key, &nonce, plaintext, &[]);
    content_key.zeroize();

    Ok(Payload::Recipients {
        ephemeral_public,
        recipients: entries,
        ciphertext: ciphertext?,
        nonce,
    })
}

/// Unwraps and decrypts a multi-recipient payload.
///
/// The recipient list is scanned in full with a constant-time key
/// comparison; there is no early exit on a match, so timing does not reveal
/// which entry is ours.
pub(crate) fn decrypt_recipients(
    secret: &X25519Secret,
    ephemeral_public: &[u8; 32],
    recipients: &[RecipientEntry],
    ciphertext: &[u8],
    nonce: &[u8; aead::NONCE_LEN],
) -> Result<Vec<u8>, Error> {
    let our_public = secret.public_key();

    let mut matched: Option<usize> = None;
    for (index, entry) in recipients.iter().enumerate() {
        let is_ours = X25519PublicKey::from(entry.recipient_public_key).ct_eq(&our_public);
        if is_ours && matched.is_none() {
            matched = Some(index);
        }
    }
    let entry = match matched {
        Some(index) => &recipients[index],
        None => return Err(Error::NotRecipient),
    };

    let shared = secret.dh(&X25519PublicKey::from(*ephemeral_public));
    let mut wrap_key = hkdf_key(shared.as_bytes(), KEY_WRAP_INFO)?;
    drop(shared);

    let content_key = aead::decrypt(&wrap_key, &entry.nonce, &entry.encrypted_key, &[]);
    wrap_key.zeroize();
    let mut content_key = content_key?;
    if content_key.len() != 32 {
        content_key.zeroize();
        return Err(Error::Authentication);
    }
    let mut key = [0u8; 32];
    key.copy_from_slice(&content_key);
    content_key.zeroize();

    let plaintext = aead::decrypt(&key, nonce, ciphertext, &[]);
    key.zeroize();
    plaintext
}
