#[derive(thiserror::Error, Debug, Clone, Eq, PartialEq)]
pub enum Error {
    #[error("invalid input: {0}")]
    InputValidation(String),

    #[error("authentication failed")]
    Authentication,

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("payload is not addressed to this identity")]
    NotRecipient,

    #[error("zone key required for zone-encrypted payloads")]
    ZoneKeyRequired,

    #[error("ratchet has no sending chain yet")]
    RatchetNotReady,

    #[error("too many skipped messages: {requested} requested, {max} allowed")]
    TooManySkipped { requested: u32, max: u32 },

    #[error("unknown signed prekey id {0}")]
    UnknownSignedPrekey(u32),

    #[error("unknown or already used one-time prekey id {0}")]
    UnknownOneTimePrekey(u32),

    #[error("object has expired")]
    Expired,

    #[error("timestamp is too far in the future")]
    FutureTimestamp,

    #[error("random number generation failed")]
    Random,

    #[error("serialization/deserialization failed: {0}")]
    Serde(String),
}
