//! Signed, content-addressed objects with optional payload encryption.
//!
//! A content object is canonically serialized, hash-then-signed by its
//! author, and addressed by the CID of its signed form. The signature covers
//! every field except `id` and `signature`; the CID covers every field
//! except `id`.

pub(crate) mod payload;
pub use payload::{Payload, PayloadEncryption, RecipientEntry};

use serde::{Deserialize, Serialize};

use crate::canonical;
use crate::cid::ContentId;
use crate::crypto::hash;
use crate::crypto::sign::{self, SIGNATURE_LEN};
use crate::crypto::X25519PublicKey;
use crate::did::{Did, DidKeyKind};
use crate::error::Error;
use crate::identity::Identity;
use crate::time::{now_millis, MAX_CLOCK_DRIFT_MS};

/// Current content object format version.
pub const CONTENT_VERSION: u32 = 2;

/// A recipient of a `recipients`-encrypted payload.
#[derive(Clone, Debug)]
pub struct Recipient {
    pub did: String,
    pub encryption_public: X25519PublicKey,
}

impl Recipient {
    /// The recipient descriptor of a local identity.
    pub fn for_identity(identity: &Identity) -> Self {
        Self {
            did: identity.did().to_string(),
            encryption_public: identity.encryption_public(),
        }
    }
}

/// Inputs for creating a content object; payload bytes travel separately.
#[derive(Clone, Debug, Default)]
pub struct ContentInput {
    pub zone: String,
    pub content_type: String,
    pub encryption: PayloadEncryption,
    pub recipients: Vec<Recipient>,
    pub expires_at: Option<u64>,
    pub parent: Option<String>,
    pub thread: Option<String>,
    pub mentions: Vec<String>,
    pub tags: Vec<String>,
    pub language: Option<String>,
    pub extensions: Option<serde_json::Value>,
}

/// An immutable signed content object. Edits are new objects referencing
/// their parent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentObject {
    pub version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub author: String,
    pub timestamp: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
    pub zone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread: Option<String>,
    pub mentions: Vec<String>,
    pub content_type: String,
    pub payload_encryption: PayloadEncryption,
    pub payload: Payload,
    pub payload_hash: [u8; 32],
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<Vec<u8>>,
}

/// One content verification failure; `verify` reports all that apply.
#[derive(thiserror::Error, Clone, Debug, PartialEq, Eq)]
pub enum ContentError {
    #[error("unsupported content object version")]
    InvalidVersion,

    #[error("content id does not match the signed bytes")]
    InvalidCid,

    #[error("author DID could not be parsed")]
    InvalidAuthorDid,

    #[error("author keys could not be resolved")]
    AuthorKeyNotFound,

    #[error("signature verification failed")]
    InvalidSignature,

    #[error("timestamp is too far in the future")]
    FutureTimestamp,

    #[error("content object has expired")]
    Expired,

    #[error("payload hash does not match the payload")]
    InvalidPayloadHash,
}

/// Outcome of content verification.
#[derive(Clone, Debug, PartialEq)]
pub struct ContentVerification {
    pub valid: bool,
    pub errors: Vec<ContentError>,
}

/// Public keys a DID resolves to.
#[derive(Clone, Debug)]
pub struct ResolvedKeys {
    pub signing: [u8; 32],
    pub encryption: Option<X25519PublicKey>,
}

/// Capability interface mapping a DID to its current public keys.
///
/// The core never caches resolutions, so key rotation is visible on the
/// next verification.
pub trait DidResolver {
    fn resolve(&self, did: &str) -> Result<ResolvedKeys, Error>;
}

/// Resolver for the `key` method: the signing key is embedded in the DID
/// itself; no encryption key is derivable.
pub struct KeyMethodResolver;

impl DidResolver for KeyMethodResolver {
    fn resolve(&self, did: &str) -> Result<ResolvedKeys, Error> {
        let did: Did = did.parse()?;
        if did.kind() != DidKeyKind::Ed25519 {
            return Err(Error::InputValidation(
                "author DID must embed an Ed25519 key".to_string(),
            ));
        }
        Ok(ResolvedKeys {
            signing: *did.public_key(),
            encryption: None,
        })
    }
}

impl ContentObject {
    /// Creates, signs, and addresses a content object.
    pub fn create(
        payload: &[u8],
        input: ContentInput,
        identity: &Identity,
    ) -> Result<Self, Error> {
        let payload_hash = hash::digest(payload);

        let payload = match input.encryption {
            PayloadEncryption::None => Payload::Clear {
                data: payload.to_vec(),
            },
            PayloadEncryption::Recipients => {
                let recipients: Vec<(String, X25519PublicKey)> = input
                    .recipients
                    .iter()
                    .map(|recipient| (recipient.did.clone(), recipient.encryption_public))
                    .collect();
                payload::encrypt_for_recipients(payload, &recipients)?
            }
            PayloadEncryption::Sealed => {
                let boxed = payload::seal_box(&identity.encryption_public(), payload)?;
                Payload::Sealed {
                    ephemeral_public: boxed.ephemeral_public,
                    ciphertext: boxed.ciphertext,
                    nonce: boxed.nonce,
                }
            }
            PayloadEncryption::Zone => return Err(Error::ZoneKeyRequired),
        };

        let mut object = Self {
            version: CONTENT_VERSION,
            id: None,
            author: identity.did().to_string(),
            timestamp: now_millis(),
            expires_at: input.expires_at,
            zone: input.zone,
            parent: input.parent,
            thread: input.thread,
            mentions: input.mentions,
            content_type: input.content_type,
            payload_encryption: input.encryption,
            payload,
            payload_hash,
            tags: input.tags,
            language: input.language,
            extensions: input.extensions,
            signature: None,
        };

        // Sign without id and signature, then address the signed form
        // without id.
        let signature = identity.key_set().signing.sign_hash(&object.signing_bytes()?);
        object.signature = Some(signature.to_vec());
        object.id = Some(ContentId::for_bytes(object.cid_bytes()?).to_string());

        Ok(object)
    }

    /// Canonical bytes without `id` and `signature`: the signature
    /// transcript.
    pub fn signing_bytes(&self) -> Result<Vec<u8>, Error> {
        let mut stripped = self.clone();
        stripped.id = None;
        stripped.signature = None;
        canonical::to_bytes(&stripped)
    }

    /// Canonical bytes without `id` only: the CID transcript.
    pub fn cid_bytes(&self) -> Result<Vec<u8>, Error> {
        let mut stripped = self.clone();
        stripped.id = None;
        canonical::to_bytes(&stripped)
    }

    /// Verifies structure, address, signature, and freshness, accumulating
    /// every applicable failure.
    pub fn verify(&self, resolver: Option<&dyn DidResolver>) -> ContentVerification {
        let now = now_millis();
        let mut errors = Vec::new();

        if self.version != CONTENT_VERSION {
            errors.push(ContentError::InvalidVersion);
        }

        match (self.id.as_deref(), self.cid_bytes()) {
            (Some(id), Ok(bytes)) => {
                if !crate::cid::verify_cid(id, &bytes) {
                    errors.push(ContentError::InvalidCid);
                }
            }
            _ => errors.push(ContentError::InvalidCid),
        }

        let signing_key = match resolver {
            Some(resolver) => match resolver.resolve(&self.author) {
                Ok(keys) => Some(keys.signing),
                Err(_) => {
                    errors.push(ContentError::AuthorKeyNotFound);
                    None
                }
            },
            None => match KeyMethodResolver.resolve(&self.author) {
                Ok(keys) => Some(keys.signing),
                Err(_) => {
                    errors.push(ContentError::InvalidAuthorDid);
                    None
                }
            },
        };

        if let Some(signing_key) = signing_key {
            let signature_ok = match (&self.signature, self.signing_bytes()) {
                (Some(signature), Ok(bytes)) => {
                    signature.len() == SIGNATURE_LEN
                        && sign::verify_hash(&signing_key, &bytes, signature)
                }
                _ => false,
            };
            if !signature_ok {
                errors.push(ContentError::InvalidSignature);
            }
        }

        if self.timestamp > now + MAX_CLOCK_DRIFT_MS {
            errors.push(ContentError::FutureTimestamp);
        }

        if let Some(expires_at) = self.expires_at {
            if expires_at < now {
                errors.push(ContentError::Expired);
            }
        }

        if let Payload::Clear { data } = &self.payload {
            if hash::digest(data) != self.payload_hash {
                errors.push(ContentError::InvalidPayloadHash);
            }
        }

        ContentVerification {
            valid: errors.is_empty(),
            errors,
        }
    }

    /// Decrypts the payload for the given identity and checks it against
    /// the bound payload hash.
    pub fn decrypt(&self, identity: &Identity) -> Result<Vec<u8>, Error> {
        let plaintext = match &self.payload {
            Payload::Clear { data } => data.clone(),
            Payload::Sealed {
                ephemeral_public,
                ciphertext,
                nonce,
            } => payload::open_box(
                identity.key_set().encryption.secret(),
                ephemeral_public,
                nonce,
                ciphertext,
            )?,
            Payload::Recipients {
                ephemeral_public,
                recipients,
                ciphertext,
                nonce,
            } => payload::decrypt_recipients(
                identity.key_set().encryption.secret(),
                ephemeral_public,
                recipients,
                ciphertext,
                nonce,
            )?,
        };

        if hash::digest(&plaintext) != self.payload_hash {
            return Err(Error::Protocol(
                "decrypted payload does not match payload hash".to_string(),
            ));
        }

        Ok(plaintext)
    }

    /// Reads the payload as UTF-8 text, decrypting if an identity is given.
    pub fn read_text(&self, identity: Option<&Identity>) -> Result<String, Error> {
        let bytes = match (&self.payload, identity) {
            (Payload::Clear { data }, _) => data.clone(),
            (_, Some(identity)) => self.decrypt(identity)?,
            (_, None) => {
                return Err(Error::Protocol(
                    "encrypted payload requires an identity to read".to_string(),
                ));
            }
        };
        String::from_utf8(bytes)
            .map_err(|_| Error::InputValidation("payload is not valid UTF-8".to_string()))
    }
}

/// Verifies a content object. See [`ContentObject::verify`].
pub fn verify_content(
    object: &ContentObject,
    resolver: Option<&dyn DidResolver>,
) -> ContentVerification {
    object.verify(resolver)
}
