//! Decentralized identifiers for the `key` method.
//!
//! Text form is `did:rootless:key:` followed by multibase base58btc of
//! `codec 0x01 publicKey`, where the codec byte is `0xed` for Ed25519 and
//! `0xec` for X25519.

use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Error;

/// Scheme-and-method prefix shared by all identifiers here.
pub const DID_PREFIX: &str = "did:rootless:key:";

const ED25519_CODEC: u8 = 0xed;
const X25519_CODEC: u8 = 0xec;
const CODEC_TAIL: u8 = 0x01;

/// Kind of public key embedded in a DID.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DidKeyKind {
    Ed25519,
    X25519,
}

impl DidKeyKind {
    fn codec(&self) -> u8 {
        match self {
            DidKeyKind::Ed25519 => ED25519_CODEC,
            DidKeyKind::X25519 => X25519_CODEC,
        }
    }
}

/// A parsed `did:rootless:key` identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Did {
    kind: DidKeyKind,
    public_key: [u8; 32],
}

impl Did {
    pub fn new(kind: DidKeyKind, public_key: [u8; 32]) -> Self {
        Self { kind, public_key }
    }

    /// The identifier of an identity, from its Ed25519 signing public key.
    pub fn from_signing_public(public_key: [u8; 32]) -> Self {
        Self::new(DidKeyKind::Ed25519, public_key)
    }

    pub fn kind(&self) -> DidKeyKind {
        self.kind
    }

    /// The public key embedded in the identifier.
    pub fn public_key(&self) -> &[u8; 32] {
        &self.public_key
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut bytes = [0u8; 34];
        bytes[0] = self.kind.codec();
        bytes[1] = CODEC_TAIL;
        bytes[2..].copy_from_slice(&self.public_key);
        write!(
            f,
            "{DID_PREFIX}{}",
            multibase::encode(multibase::Base::Base58Btc, bytes)
        )
    }
}

impl fmt::Debug for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Did").field(&self.to_string()).finish()
    }
}

impl FromStr for Did {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = value.split(':').collect();
        if parts.len() != 4 || parts[0] != "did" || parts[1] != "rootless" || parts[2] != "key" {
            return Err(Error::InputValidation(format!(
                "DID must have the form {DID_PREFIX}<multibase-key>"
            )));
        }

        let (base, bytes) = multibase::decode(parts[3])
            .map_err(|_| Error::InputValidation("DID key is not valid multibase".to_string()))?;
        if base != multibase::Base::Base58Btc {
            return Err(Error::InputValidation(
                "DID key must be base58btc encoded".to_string(),
            ));
        }
        if bytes.len() != 34 || bytes[1] != CODEC_TAIL {
            return Err(Error::InputValidation(
                "DID key has an invalid multicodec envelope".to_string(),
            ));
        }

        let kind = match bytes[0] {
            ED25519_CODEC => DidKeyKind::Ed25519,
            X25519_CODEC => DidKeyKind::X25519,
            other => {
                return Err(Error::InputValidation(format!(
                    "unsupported DID key codec 0x{other:02x}"
                )));
            }
        };

        let mut public_key = [0u8; 32];
        public_key.copy_from_slice(&bytes[2..]);
        Ok(Self { kind, public_key })
    }
}

impl Serialize for Did {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Did {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(D::Error::custom)
    }
}

/// Boolean wrapper around DID parsing.
pub fn is_valid_did(value: &str) -> bool {
    value.parse::<Did>().is_ok()
}
