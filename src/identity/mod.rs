//! Self-sovereign identities: key material, DID, and the signed identity
//! document, plus password-encrypted export.

mod document;
pub use document::{
    verify_identity_document, DocumentError, DocumentProof, DocumentVerification,
    IdentityDocument, IdentityType, KeyPurpose, PublicKeyEntry, DOCUMENT_VERSION,
};

mod export;
pub use export::{export_identity, import_identity, ExportedIdentity};

use zeroize::Zeroize;

use crate::crypto::sign::SIGNATURE_LEN;
use crate::crypto::X25519PublicKey;
use crate::did::Did;
use crate::error::Error;
use crate::keys::KeySet;
use crate::time::now_millis;

/// Options for identity creation.
#[derive(Clone, Debug)]
pub struct IdentityOptions {
    pub identity_type: IdentityType,
    /// When set, both key pairs derive deterministically from this seed.
    pub seed: Option<[u8; 32]>,
}

impl Default for IdentityOptions {
    fn default() -> Self {
        Self {
            identity_type: IdentityType::Persistent,
            seed: None,
        }
    }
}

/// A self-sovereign identity and its private key material.
///
/// The DID is bound to the Ed25519 signing public key; the document carries
/// both public keys and an Ed25519 proof over itself.
pub struct Identity {
    did: Did,
    identity_type: IdentityType,
    document: IdentityDocument,
    key_set: KeySet,
    created: u64,
}

impl Identity {
    /// Creates an identity, either from the given seed or from fresh OS
    /// randomness.
    pub fn create(options: IdentityOptions) -> Result<Self, Error> {
        let key_set = match &options.seed {
            Some(seed) => KeySet::from_seed(seed)?,
            None => KeySet::generate()?,
        };

        let now = now_millis();
        let did = Did::from_signing_public(key_set.signing.public());

        let mut document = IdentityDocument::build(&did, options.identity_type, &key_set, now);
        let method = format!("{did}#key-1");
        document.sign_with(&key_set.signing, method, now)?;

        Ok(Self {
            did,
            identity_type: options.identity_type,
            document,
            key_set,
            created: now,
        })
    }

    pub fn did(&self) -> &Did {
        &self.did
    }

    pub fn identity_type(&self) -> IdentityType {
        self.identity_type
    }

    pub fn document(&self) -> &IdentityDocument {
        &self.document
    }

    pub fn key_set(&self) -> &KeySet {
        &self.key_set
    }

    pub fn created(&self) -> u64 {
        self.created
    }

    pub fn signing_public(&self) -> [u8; 32] {
        self.key_set.signing.public()
    }

    pub fn encryption_public(&self) -> X25519PublicKey {
        self.key_set.encryption.public()
    }

    /// Ed25519 signature over the raw message bytes.
    pub fn sign(&self, data: &[u8]) -> [u8; SIGNATURE_LEN] {
        self.key_set.signing.sign(data)
    }

    /// Rotates to a fresh key set by emitting a successor document.
    ///
    /// Existing entries are marked revoked, new `#key-N` entries are
    /// appended, and the successor is signed with the *previous* signing key
    /// so holders of the old document can validate the transition.
    pub fn rotate_keys(&mut self) -> Result<&IdentityDocument, Error> {
        let now = now_millis();
        let next_keys = KeySet::generate()?;

        let previous_method = self
            .document
            .signing_entry()
            .map(|entry| entry.id.clone())
            .ok_or_else(|| Error::Protocol("document has no signing key".to_string()))?;

        for entry in &mut self.document.public_keys {
            entry.revoked = Some(true);
        }

        let next_index = self.document.public_keys.len() + 1;
        self.document.public_keys.push(PublicKeyEntry {
            id: format!("{}#key-{next_index}", self.did),
            purpose: KeyPurpose::Signing,
            public_key: next_keys.signing.public().to_vec(),
            created: now,
            expires: None,
            revoked: None,
        });
        self.document.public_keys.push(PublicKeyEntry {
            id: format!("{}#key-{}", self.did, next_index + 1),
            purpose: KeyPurpose::Encryption,
            public_key: next_keys.encryption.public().as_bytes().to_vec(),
            created: now,
            expires: None,
            revoked: None,
        });
        self.document.updated = now;

        self.document
            .sign_with(&self.key_set.signing, previous_method, now)?;

        let mut previous = std::mem::replace(&mut self.key_set, next_keys);
        previous.encryption.zeroize();

        Ok(&self.document)
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("did", &self.did)
            .field("type", &self.identity_type)
            .field("created", &self.created)
            .finish()
    }
}
