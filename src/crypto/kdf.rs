use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::random::random_array;
use crate::error::Error;

/// HKDF info for the X3DH shared-secret derivation.
pub const X3DH_INFO: &[u8] = b"x3dh-v1";
/// HKDF info for per-message keys in the ratchet chain.
pub const MESSAGE_KEY_INFO: &[u8] = b"rootless-message-key-v2";
/// HKDF info for advancing a ratchet chain key.
pub const CHAIN_KEY_INFO: &[u8] = b"rootless-chain-key-v2";
/// HKDF info for advancing the ratchet root key.
pub const ROOT_KEY_INFO: &[u8] = b"rootless-root-key-v2";
/// HKDF info for deriving signing-key material from an identity seed.
pub const SIGNING_KEY_INFO: &[u8] = b"rootless-signing-key-v2";
/// HKDF info for deriving encryption-key material from an identity seed.
pub const ENCRYPTION_KEY_INFO: &[u8] = b"rootless-encryption-key-v2";
/// HKDF info for sealed-box (anonymous) encryption.
pub const SEALED_BOX_INFO: &[u8] = b"rootless-sealed-box-v2";
/// HKDF info for wrapping the content key per recipient.
pub const KEY_WRAP_INFO: &[u8] = b"rootless-multi-recipient-wrap-v2";

/// Expands `ikm` into `out` with HKDF-SHA256.
///
/// An unset salt means the HKDF default of 32 zero bytes. Every purpose gets
/// its own info constant above; new purposes get new strings, never an
/// overload of an existing one.
pub fn hkdf_expand(
    ikm: &[u8],
    salt: Option<&[u8]>,
    info: &[u8],
    out: &mut [u8],
) -> Result<(), Error> {
    let hkdf = Hkdf::<Sha256>::new(salt, ikm);
    hkdf.expand(info, out)
        .map_err(|_| Error::InputValidation("HKDF output length too large".to_string()))
}

/// Derives a single 32-byte key with HKDF-SHA256 and the default salt.
pub fn hkdf_key(ikm: &[u8], info: &[u8]) -> Result<[u8; 32], Error> {
    let mut out = [0u8; 32];
    hkdf_expand(ikm, None, info, &mut out)?;
    Ok(out)
}

/// Length of the password-KDF salt.
pub const PASSWORD_SALT_LEN: usize = 16;

const ARGON2_ALGORITHM: &str = "argon2id";
const ARGON2_MEMORY_KIB: u32 = 262_144; // 256 MiB
const ARGON2_TIME_COST: u32 = 3;
const ARGON2_PARALLELISM: u32 = 4;

/// Argon2id parameters as persisted in the export envelope.
///
/// The parameters travel with the ciphertext and are honored verbatim on
/// import; an implementation that cannot provide Argon2id must refuse rather
/// than substitute a weaker scheme.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordKdfParams {
    pub algorithm: String,
    pub salt: Vec<u8>,
    pub memory_cost: u32,
    pub time_cost: u32,
    pub parallelism: u32,
}

impl PasswordKdfParams {
    /// Fresh default parameters with a new random 16-byte salt.
    pub fn generate() -> Result<Self, Error> {
        Ok(Self {
            algorithm: ARGON2_ALGORITHM.to_string(),
            salt: random_array::<PASSWORD_SALT_LEN>()?.to_vec(),
            memory_cost: ARGON2_MEMORY_KIB,
            time_cost: ARGON2_TIME_COST,
            parallelism: ARGON2_PARALLELISM,
        })
    }
}

/// A 32-byte wrap key derived from a passphrase; zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey([u8; 32]);

impl DerivedKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// Derives a 32-byte wrap key from a passphrase with Argon2id.
pub fn derive_password_key(
    passphrase: &[u8],
    params: &PasswordKdfParams,
) -> Result<DerivedKey, Error> {
    if params.algorithm != ARGON2_ALGORITHM {
        return Err(Error::InputValidation(format!(
            "unsupported password KDF algorithm: {}",
            params.algorithm
        )));
    }
    if params.salt.len() != PASSWORD_SALT_LEN {
        return Err(Error::InputValidation(format!(
            "password KDF salt must be {PASSWORD_SALT_LEN} bytes, got {}",
            params.salt.len()
        )));
    }

    let argon2_params = argon2::Params::new(
        params.memory_cost,
        params.time_cost,
        params.parallelism,
        Some(32),
    )
    .map_err(|err| Error::InputValidation(format!("invalid Argon2 parameters: {err}")))?;

    let argon2 = argon2::Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        argon2_params,
    );

    let mut out = [0u8; 32];
    argon2
        .hash_password_into(passphrase, &params.salt, &mut out)
        .map_err(|err| Error::Protocol(format!("Argon2id derivation failed: {err}")))?;

    Ok(DerivedKey(out))
}
