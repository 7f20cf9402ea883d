//! # rootless-core
//!
//! The cryptographic session and object layer of the RootlessNet protocol:
//! self-sovereign identities with signed documents and password-encrypted
//! export, canonical signed content objects addressed by CID, X3DH session
//! establishment from published prekey bundles, and Double Ratchet message
//! encryption with out-of-order tolerance.
//!
//! Transport, discovery, and storage are external collaborators; this crate
//! is pure compute and owns no I/O beyond the OS random source.

pub mod canonical;
pub mod crypto;

mod cid;
pub use cid::{verify_cid, ContentId, CID_BINARY_LEN};

mod did;
pub use did::{is_valid_did, Did, DidKeyKind, DID_PREFIX};

mod error;
pub use error::Error;

mod keys;
pub use keys::{EncryptionKeyPair, KeySet, SigningKeyPair};

mod identity;
pub use identity::{
    export_identity, import_identity, verify_identity_document, DocumentError, DocumentProof,
    DocumentVerification, ExportedIdentity, Identity, IdentityDocument, IdentityOptions,
    IdentityType, KeyPurpose, PublicKeyEntry, DOCUMENT_VERSION,
};

mod content;
pub use content::{
    verify_content, ContentError, ContentInput, ContentObject, ContentVerification, DidResolver,
    KeyMethodResolver, Payload, PayloadEncryption, Recipient, RecipientEntry, ResolvedKeys,
    CONTENT_VERSION,
};

mod x3dh;
pub use x3dh::{
    initiate as x3dh_initiate, respond as x3dh_respond, OneTimePreKey, OneTimePrekeyPublic,
    PrekeyBundle, PrekeySet, SignedPreKey, SignedPrekeyPublic, X3dhInitiation, X3dhSharedSecret,
};

mod ratchet;
pub use ratchet::{DoubleRatchet, EncryptedMessage, MessageHeader, DEFAULT_MAX_SKIP};

mod session;
pub use session::{
    sealed_receive, sealed_send, Conversation, DirectMessage, HandshakeKeys, SealedMessage,
    SendOptions, SessionConfig, SessionManager,
};

mod time;
pub use time::{MAX_CLOCK_DRIFT_MS, SIGNED_PREKEY_ROTATION_MS};
