use serde::{Deserialize, Serialize};

use crate::canonical;
use crate::crypto::sign::{self, SIGNATURE_LEN};
use crate::crypto::X25519PublicKey;
use crate::did::Did;
use crate::error::Error;
use crate::keys::{KeySet, SigningKeyPair};
use crate::time::{now_millis, MAX_CLOCK_DRIFT_MS};

/// Current identity document format version.
pub const DOCUMENT_VERSION: u32 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityType {
    Ephemeral,
    Persistent,
    Recoverable,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyPurpose {
    Signing,
    Encryption,
}

/// One public key published in an identity document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyEntry {
    /// Key identifier of the form `<did>#key-N`.
    pub id: String,
    pub purpose: KeyPurpose,
    pub public_key: Vec<u8>,
    pub created: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked: Option<bool>,
}

/// Ed25519 proof over the canonical document without this field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentProof {
    #[serde(rename = "type")]
    pub proof_type: String,
    pub created: u64,
    /// Key id (`<did>#key-N`) that produced the signature.
    pub verification_method: String,
    pub signature: Vec<u8>,
}

/// Self-describing identity document, emitted at creation and at each key
/// rotation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityDocument {
    pub version: u32,
    pub did: String,
    #[serde(rename = "type")]
    pub identity_type: IdentityType,
    pub public_keys: Vec<PublicKeyEntry>,
    pub created: u64,
    pub updated: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof: Option<DocumentProof>,
}

/// One verification failure; `verify` accumulates all that apply.
#[derive(thiserror::Error, Clone, Debug, PartialEq, Eq)]
pub enum DocumentError {
    #[error("unsupported document version {0}")]
    UnsupportedVersion(u32),

    #[error("document carries no proof")]
    MissingProof,

    #[error("document has no usable signing key")]
    MissingSigningKey,

    #[error("DID does not match the initial signing key")]
    DidMismatch,

    #[error("proof signature is invalid")]
    InvalidSignature,

    #[error("document creation time is in the future")]
    FutureCreated,

    #[error("key {0} has expired")]
    KeyExpired(String),

    #[error("key {0} is revoked")]
    KeyRevoked(String),
}

/// Outcome of document verification: an overall flag plus every failure
/// found, so callers can tell a version mismatch from a bad signature.
#[derive(Clone, Debug, PartialEq)]
pub struct DocumentVerification {
    pub valid: bool,
    pub errors: Vec<DocumentError>,
}

impl IdentityDocument {
    /// Builds the unsigned document for a fresh identity: `#key-1` signing,
    /// `#key-2` encryption, both stamped with `created`.
    pub(crate) fn build(
        did: &Did,
        identity_type: IdentityType,
        key_set: &KeySet,
        created: u64,
    ) -> Self {
        let did = did.to_string();
        Self {
            version: DOCUMENT_VERSION,
            public_keys: vec![
                PublicKeyEntry {
                    id: format!("{did}#key-1"),
                    purpose: KeyPurpose::Signing,
                    public_key: key_set.signing.public().to_vec(),
                    created,
                    expires: None,
                    revoked: None,
                },
                PublicKeyEntry {
                    id: format!("{did}#key-2"),
                    purpose: KeyPurpose::Encryption,
                    public_key: key_set.encryption.public().as_bytes().to_vec(),
                    created,
                    expires: None,
                    revoked: None,
                },
            ],
            did,
            identity_type,
            created,
            updated: created,
            proof: None,
        }
    }

    /// Canonical bytes of the document without its proof field; this is the
    /// signature transcript.
    pub fn signing_bytes(&self) -> Result<Vec<u8>, Error> {
        let mut unsigned = self.clone();
        unsigned.proof = None;
        canonical::to_bytes(&unsigned)
    }

    /// Hash-then-sign the document and embed the proof.
    pub(crate) fn sign_with(
        &mut self,
        signing: &SigningKeyPair,
        verification_method: String,
        now: u64,
    ) -> Result<(), Error> {
        self.proof = None;
        let bytes = self.signing_bytes()?;
        let signature = signing.sign_hash(&bytes);
        self.proof = Some(DocumentProof {
            proof_type: "Ed25519Signature".to_string(),
            created: now,
            verification_method,
            signature: signature.to_vec(),
        });
        Ok(())
    }

    fn latest_entry(&self, purpose: KeyPurpose) -> Option<&PublicKeyEntry> {
        self.public_keys
            .iter()
            .rev()
            .find(|entry| entry.purpose == purpose)
    }

    /// The currently active signing key entry.
    pub fn signing_entry(&self) -> Option<&PublicKeyEntry> {
        self.latest_entry(KeyPurpose::Signing)
    }

    /// The currently active encryption key entry.
    pub fn encryption_entry(&self) -> Option<&PublicKeyEntry> {
        self.latest_entry(KeyPurpose::Encryption)
    }

    /// The active X25519 encryption public key.
    pub fn encryption_public(&self) -> Result<X25519PublicKey, Error> {
        let entry = self
            .encryption_entry()
            .ok_or_else(|| Error::Protocol("document has no encryption key".to_string()))?;
        X25519PublicKey::try_from(entry.public_key.as_slice())
    }

    fn entry_by_id(&self, id: &str) -> Option<&PublicKeyEntry> {
        self.public_keys.iter().find(|entry| entry.id == id)
    }

    /// Verifies the document, reporting every failure rather than the first.
    pub fn verify(&self) -> DocumentVerification {
        let now = now_millis();
        let mut errors = Vec::new();

        if self.version != DOCUMENT_VERSION {
            errors.push(DocumentError::UnsupportedVersion(self.version));
        }

        // The DID is bound to the first signing key; rotations append new
        // entries but never rewrite #key-1.
        let initial_signing = self
            .public_keys
            .iter()
            .find(|entry| entry.purpose == KeyPurpose::Signing);
        match (initial_signing, self.did.parse::<Did>()) {
            (Some(entry), Ok(did)) => {
                if entry.public_key.as_slice() != did.public_key() {
                    errors.push(DocumentError::DidMismatch);
                }
            }
            (Some(_), Err(_)) => errors.push(DocumentError::DidMismatch),
            (None, _) => errors.push(DocumentError::MissingSigningKey),
        }

        match &self.proof {
            None => errors.push(DocumentError::MissingProof),
            Some(proof) => {
                // The proof key may itself be revoked in a successor
                // document; revocation takes effect after the proof.
                match self.entry_by_id(&proof.verification_method) {
                    None => errors.push(DocumentError::MissingSigningKey),
                    Some(entry) => match self.signing_bytes() {
                        Ok(bytes) => {
                            if proof.signature.len() != SIGNATURE_LEN
                                || !sign::verify_hash(&entry.public_key, &bytes, &proof.signature)
                            {
                                errors.push(DocumentError::InvalidSignature);
                            }
                        }
                        Err(_) => errors.push(DocumentError::InvalidSignature),
                    },
                }
            }
        }

        if self.created > now + MAX_CLOCK_DRIFT_MS {
            errors.push(DocumentError::FutureCreated);
        }

        for purpose in [KeyPurpose::Signing, KeyPurpose::Encryption] {
            if let Some(entry) = self.latest_entry(purpose) {
                if entry.revoked == Some(true) {
                    errors.push(DocumentError::KeyRevoked(entry.id.clone()));
                }
                if let Some(expires) = entry.expires {
                    if expires < now {
                        errors.push(DocumentError::KeyExpired(entry.id.clone()));
                    }
                }
            }
        }

        DocumentVerification {
            valid: errors.is_empty(),
            errors,
        }
    }
}

/// Verifies an identity document. See [`IdentityDocument::verify`].
pub fn verify_identity_document(document: &IdentityDocument) -> DocumentVerification {
    document.verify()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{Identity, IdentityOptions};

    fn fresh_document() -> IdentityDocument {
        Identity::create(IdentityOptions::default())
            .unwrap()
            .document()
            .clone()
    }

    #[test]
    fn fresh_document_verifies() {
        let report = fresh_document().verify();
        assert!(report.valid, "unexpected errors: {:?}", report.errors);
    }

    #[test]
    fn version_mismatch_is_reported() {
        let mut document = fresh_document();
        document.version = 1;
        let report = document.verify();
        assert!(!report.valid);
        assert!(report.errors.contains(&DocumentError::UnsupportedVersion(1)));
    }

    #[test]
    fn flipped_key_byte_breaks_did_or_signature() {
        let mut document = fresh_document();
        document.public_keys[0].public_key[0] ^= 1;
        let report = document.verify();
        assert!(!report.valid);
        assert!(
            report.errors.contains(&DocumentError::DidMismatch)
                || report.errors.contains(&DocumentError::InvalidSignature)
        );
    }

    #[test]
    fn tampered_entry_invalidates_signature() {
        let mut document = fresh_document();
        document.public_keys[1].created += 1;
        let report = document.verify();
        assert!(report.errors.contains(&DocumentError::InvalidSignature));
    }

    #[test]
    fn missing_proof_is_reported() {
        let mut document = fresh_document();
        document.proof = None;
        let report = document.verify();
        assert!(report.errors.contains(&DocumentError::MissingProof));
    }

    #[test]
    fn future_created_is_reported() {
        let mut document = fresh_document();
        document.created = now_millis() + MAX_CLOCK_DRIFT_MS + 60_000;
        let report = document.verify();
        // The timestamp change also breaks the proof; both must be present.
        assert!(report.errors.contains(&DocumentError::FutureCreated));
        assert!(report.errors.contains(&DocumentError::InvalidSignature));
    }

    #[test]
    fn expired_key_is_reported() {
        let identity = Identity::create(IdentityOptions::default()).unwrap();
        let mut document = identity.document().clone();
        document.public_keys[1].expires = Some(1);
        let report = document.verify();
        assert!(report
            .errors
            .iter()
            .any(|err| matches!(err, DocumentError::KeyExpired(_))));
    }

    #[test]
    fn errors_accumulate() {
        let mut document = fresh_document();
        document.version = 3;
        document.proof = None;
        let report = document.verify();
        assert!(report.errors.len() >= 2);
    }
}
