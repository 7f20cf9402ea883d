//! Portable, password-encrypted identity envelope.
//!
//! The identity record (DID, type, document, both private keys, creation
//! time) is canonically serialized, wrapped with XChaCha20-Poly1305 under an
//! Argon2id-derived key, and shipped as `nonce ‖ ciphertext` together with
//! the KDF parameters. A wrong passphrase surfaces as the AEAD
//! authentication error, never as a decode error.

use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::canonical;
use crate::crypto::aead::{self, NONCE_LEN};
use crate::crypto::kdf::{derive_password_key, PasswordKdfParams};
use crate::did::Did;
use crate::error::Error;
use crate::identity::{Identity, IdentityDocument, IdentityType};
use crate::keys::{EncryptionKeyPair, KeySet, SigningKeyPair};

const EXPORT_VERSION: u32 = 2;

/// The export envelope: KDF parameters travel with the ciphertext.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedIdentity {
    pub version: u32,
    pub encrypted: bool,
    /// 24-byte nonce followed by ciphertext and tag.
    pub data: Vec<u8>,
    pub kdf: PasswordKdfParams,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeySetRecord {
    signing_private: Vec<u8>,
    encryption_private: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdentityRecord {
    did: String,
    #[serde(rename = "type")]
    identity_type: IdentityType,
    document: IdentityDocument,
    key_set: KeySetRecord,
    created: u64,
}

impl Zeroize for KeySetRecord {
    fn zeroize(&mut self) {
        self.signing_private.zeroize();
        self.encryption_private.zeroize();
    }
}

/// Encrypts an identity under a passphrase.
pub fn export_identity(identity: &Identity, passphrase: &str) -> Result<ExportedIdentity, Error> {
    let mut record = IdentityRecord {
        did: identity.did().to_string(),
        identity_type: identity.identity_type(),
        document: identity.document().clone(),
        key_set: KeySetRecord {
            signing_private: identity.key_set().signing.keypair_bytes().to_vec(),
            encryption_private: identity.key_set().encryption.secret_bytes().to_vec(),
        },
        created: identity.created(),
    };

    let mut plaintext = canonical::to_bytes(&record)?;
    record.key_set.zeroize();

    let kdf = PasswordKdfParams::generate()?;
    let wrap_key = derive_password_key(passphrase.as_bytes(), &kdf)?;
    let nonce = aead::generate_nonce()?;

    let ciphertext = aead::encrypt(wrap_key.as_bytes(), &nonce, &plaintext, &[]);
    plaintext.zeroize();
    let ciphertext = ciphertext?;

    let mut data = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    data.extend_from_slice(&nonce);
    data.extend_from_slice(&ciphertext);

    Ok(ExportedIdentity {
        version: EXPORT_VERSION,
        encrypted: true,
        data,
        kdf,
    })
}

/// Decrypts and reconstructs an identity from its export envelope.
pub fn import_identity(exported: &ExportedIdentity, passphrase: &str) -> Result<Identity, Error> {
    if exported.version != EXPORT_VERSION {
        return Err(Error::Protocol(format!(
            "unsupported export version {}",
            exported.version
        )));
    }
    if !exported.encrypted {
        return Err(Error::Protocol(
            "export envelope must be encrypted".to_string(),
        ));
    }
    if exported.data.len() < NONCE_LEN + aead::TAG_LEN {
        return Err(Error::InputValidation(
            "export data is too short".to_string(),
        ));
    }

    let wrap_key = derive_password_key(passphrase.as_bytes(), &exported.kdf)?;

    let mut nonce = [0u8; NONCE_LEN];
    nonce.copy_from_slice(&exported.data[..NONCE_LEN]);
    let mut plaintext = aead::decrypt(
        wrap_key.as_bytes(),
        &nonce,
        &exported.data[NONCE_LEN..],
        &[],
    )?;

    let record: Result<IdentityRecord, Error> = canonical::from_bytes(&plaintext);
    plaintext.zeroize();
    let mut record = record?;

    let signing_private: [u8; 64] =
        record.key_set.signing_private.as_slice().try_into().map_err(|_| {
            Error::InputValidation("signing private key must be 64 bytes".to_string())
        })?;
    let encryption_private: [u8; 32] = record
        .key_set
        .encryption_private
        .as_slice()
        .try_into()
        .map_err(|_| {
            Error::InputValidation("encryption private key must be 32 bytes".to_string())
        })?;
    record.key_set.zeroize();

    let key_set = KeySet {
        signing: SigningKeyPair::from_keypair_bytes(&signing_private)?,
        encryption: EncryptionKeyPair::from_seed(&encryption_private),
    };

    let did: Did = record.did.parse()?;
    if did.public_key() != &key_set.signing.public() {
        return Err(Error::Protocol(
            "imported DID does not match signing key".to_string(),
        ));
    }

    let report = record.document.verify();
    if !report.valid {
        return Err(Error::Protocol(format!(
            "imported identity document is invalid: {:?}",
            report.errors
        )));
    }

    Ok(Identity::restore(
        did,
        record.identity_type,
        record.document,
        key_set,
        record.created,
    ))
}

impl Identity {
    pub(crate) fn restore(
        did: Did,
        identity_type: IdentityType,
        document: IdentityDocument,
        key_set: KeySet,
        created: u64,
    ) -> Self {
        Self {
            did,
            identity_type,
            document,
            key_set,
            created,
        }
    }

    /// See [`export_identity`].
    pub fn export(&self, passphrase: &str) -> Result<ExportedIdentity, Error> {
        export_identity(self, passphrase)
    }

    /// See [`import_identity`].
    pub fn import(exported: &ExportedIdentity, passphrase: &str) -> Result<Identity, Error> {
        import_identity(exported, passphrase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::IdentityOptions;

    #[test]
    fn export_import_roundtrip() {
        let identity = Identity::create(IdentityOptions::default()).unwrap();
        let exported = identity.export("correct horse").unwrap();

        assert_eq!(exported.version, 2);
        assert!(exported.encrypted);
        assert_eq!(exported.kdf.algorithm, "argon2id");

        let imported = Identity::import(&exported, "correct horse").unwrap();
        assert_eq!(imported.did().to_string(), identity.did().to_string());
        assert_eq!(
            imported.encryption_public().as_bytes(),
            identity.encryption_public().as_bytes()
        );
        assert!(imported.document().verify().valid);
    }

    #[test]
    fn wrong_passphrase_is_authentication_error() {
        let identity = Identity::create(IdentityOptions::default()).unwrap();
        let exported = identity.export("correct horse").unwrap();

        assert_eq!(
            Identity::import(&exported, "staple").unwrap_err(),
            Error::Authentication
        );
    }

    #[test]
    fn corrupted_ciphertext_is_authentication_error() {
        let identity = Identity::create(IdentityOptions::default()).unwrap();
        let mut exported = identity.export("pw").unwrap();
        let last = exported.data.len() - 1;
        exported.data[last] ^= 1;

        assert_eq!(
            Identity::import(&exported, "pw").unwrap_err(),
            Error::Authentication
        );
    }

    #[test]
    fn envelope_roundtrips_through_canonical_bytes() {
        let identity = Identity::create(IdentityOptions::default()).unwrap();
        let exported = identity.export("pw").unwrap();

        let bytes = crate::canonical::to_bytes(&exported).unwrap();
        let parsed: ExportedIdentity = crate::canonical::from_bytes(&bytes).unwrap();
        let imported = Identity::import(&parsed, "pw").unwrap();
        assert_eq!(imported.did().to_string(), identity.did().to_string());
    }

    #[test]
    fn truncated_data_is_rejected_before_kdf() {
        let identity = Identity::create(IdentityOptions::default()).unwrap();
        let mut exported = identity.export("pw").unwrap();
        exported.data.truncate(10);

        assert!(matches!(
            Identity::import(&exported, "pw"),
            Err(Error::InputValidation(_))
        ));
    }
}
