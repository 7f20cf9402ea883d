//! Content identifiers: CIDv1, raw codec, BLAKE3 multihash.
//!
//! Binary form is `0x01 0x55 0x1e 0x20` followed by the 32-byte BLAKE3
//! digest; the text form is that byte string in multibase base32-lower.

use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use subtle::ConstantTimeEq;

use crate::crypto::hash;
use crate::error::Error;

const CID_VERSION: u8 = 0x01;
const RAW_CODEC: u8 = 0x55;
const BLAKE3_MULTIHASH: u8 = 0x1e;
const DIGEST_LEN: u8 = 0x20;

/// Length of the binary CID: 4 prefix bytes plus the digest.
pub const CID_BINARY_LEN: usize = 4 + hash::HASH_LEN;

/// Content identifier over arbitrary bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentId([u8; hash::HASH_LEN]);

impl ContentId {
    /// The identifier of the given bytes.
    pub fn for_bytes(bytes: impl AsRef<[u8]>) -> Self {
        Self(hash::digest(bytes))
    }

    /// The embedded BLAKE3 digest.
    pub fn digest(&self) -> &[u8; hash::HASH_LEN] {
        &self.0
    }

    /// Binary form: version, codec, multihash code, digest length, digest.
    pub fn to_binary(&self) -> [u8; CID_BINARY_LEN] {
        let mut out = [0u8; CID_BINARY_LEN];
        out[0] = CID_VERSION;
        out[1] = RAW_CODEC;
        out[2] = BLAKE3_MULTIHASH;
        out[3] = DIGEST_LEN;
        out[4..].copy_from_slice(&self.0);
        out
    }

    /// Recomputes the identifier of `bytes` and compares in constant time.
    pub fn matches(&self, bytes: impl AsRef<[u8]>) -> bool {
        bool::from(self.0.ct_eq(&hash::digest(bytes)))
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            multibase::encode(multibase::Base::Base32Lower, self.to_binary())
        )
    }
}

impl fmt::Debug for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ContentId").field(&self.to_string()).finish()
    }
}

impl FromStr for ContentId {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (base, bytes) = multibase::decode(value)
            .map_err(|_| Error::InputValidation("CID is not valid multibase".to_string()))?;

        if base != multibase::Base::Base32Lower {
            return Err(Error::InputValidation(
                "CID must be base32-lower encoded".to_string(),
            ));
        }
        if bytes.len() != CID_BINARY_LEN {
            return Err(Error::InputValidation(format!(
                "CID must decode to {CID_BINARY_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        if bytes[0] != CID_VERSION
            || bytes[1] != RAW_CODEC
            || bytes[2] != BLAKE3_MULTIHASH
            || bytes[3] != DIGEST_LEN
        {
            return Err(Error::InputValidation(
                "CID prefix is not CIDv1/raw/BLAKE3".to_string(),
            ));
        }

        let mut digest = [0u8; hash::HASH_LEN];
        digest.copy_from_slice(&bytes[4..]);
        Ok(Self(digest))
    }
}

impl Serialize for ContentId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ContentId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(D::Error::custom)
    }
}

/// Recomputes the CID of `bytes` and compares against the text form.
pub fn verify_cid(cid: &str, bytes: impl AsRef<[u8]>) -> bool {
    match cid.parse::<ContentId>() {
        Ok(parsed) => parsed.matches(bytes),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_form_roundtrips() {
        let cid = ContentId::for_bytes(b"some content");
        let text = cid.to_string();
        assert!(text.starts_with('b'));

        let parsed: ContentId = text.parse().unwrap();
        assert_eq!(parsed, cid);
    }

    #[test]
    fn deterministic_and_collision_free() {
        assert_eq!(
            ContentId::for_bytes(b"abc").to_string(),
            ContentId::for_bytes(b"abc").to_string()
        );
        assert_ne!(
            ContentId::for_bytes(b"abc").to_string(),
            ContentId::for_bytes(b"abd").to_string()
        );
    }

    #[test]
    fn binary_prefix_is_fixed() {
        let binary = ContentId::for_bytes(b"x").to_binary();
        assert_eq!(&binary[..4], &[0x01, 0x55, 0x1e, 0x20]);
    }

    #[test]
    fn rejects_foreign_shapes() {
        // Wrong multibase alphabet.
        let base58 = multibase::encode(multibase::Base::Base58Btc, [0u8; CID_BINARY_LEN]);
        assert!(base58.parse::<ContentId>().is_err());

        // Wrong codec byte.
        let mut bytes = ContentId::for_bytes(b"x").to_binary();
        bytes[1] = 0x70;
        let text = multibase::encode(multibase::Base::Base32Lower, bytes);
        assert!(text.parse::<ContentId>().is_err());

        // Truncated.
        let short = multibase::encode(multibase::Base::Base32Lower, &[0x01, 0x55, 0x1e]);
        assert!(short.parse::<ContentId>().is_err());

        assert!("not a cid".parse::<ContentId>().is_err());
    }

    #[test]
    fn verify_cid_matches_content() {
        let cid = ContentId::for_bytes(b"payload").to_string();
        assert!(verify_cid(&cid, b"payload"));
        assert!(!verify_cid(&cid, b"other payload"));
        assert!(!verify_cid("garbage", b"payload"));
    }
}
