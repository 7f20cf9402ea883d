//! Session management: one identity, its prekey set, and a map of
//! ratchet-backed conversations, plus the sealed-envelope side channel.

mod sealed;
pub use sealed::{sealed_receive, sealed_send, SealedMessage};

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::canonical;
use crate::cid::ContentId;
use crate::crypto::X25519PublicKey;
use crate::did::Did;
use crate::error::Error;
use crate::identity::Identity;
use crate::ratchet::{DoubleRatchet, EncryptedMessage, DEFAULT_MAX_SKIP};
use crate::time::{now_millis, SIGNED_PREKEY_ROTATION_MS};
use crate::x3dh::{self, PrekeyBundle, PrekeySet, PrekeySetRepr};

const MESSAGE_VERSION: u32 = 2;
const DIRECT_TYPE: &str = "direct";
const STATE_VERSION: u32 = 2;

/// Tunables for a session manager.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Out-of-order tolerance per conversation.
    pub max_skip: u32,
    /// Size of the one-time prekey pool.
    pub one_time_prekey_count: usize,
    /// Signed-prekey rotation window in milliseconds.
    pub signed_prekey_rotation_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_skip: DEFAULT_MAX_SKIP,
            one_time_prekey_count: 100,
            signed_prekey_rotation_ms: SIGNED_PREKEY_ROTATION_MS,
        }
    }
}

/// X3DH material the initiator must transmit alongside early messages so
/// the peer can run its side of the handshake. Cleared once the peer's
/// first reply proves the session is established.
#[derive(Clone, Debug)]
pub struct HandshakeKeys {
    pub ephemeral_public: X25519PublicKey,
    pub signed_prekey_id: u32,
    pub one_time_prekey_id: Option<u32>,
}

/// One ratchet-backed conversation.
pub struct Conversation {
    pub id: String,
    pub participants: Vec<String>,
    pub created: u64,
    pub last_message: Option<u64>,
    ratchet: DoubleRatchet,
    handshake: Option<HandshakeKeys>,
}

impl Conversation {
    /// Handshake keys still awaiting acknowledgement, if any.
    pub fn handshake_keys(&self) -> Option<&HandshakeKeys> {
        self.handshake.as_ref()
    }
}

/// A direct message on the wire. Unlike sealed messages, the sender DID is
/// carried in the clear.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectMessage {
    pub version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub conversation_id: String,
    pub sender: String,
    #[serde(rename = "type")]
    pub message_type: String,
    pub encrypted: EncryptedMessage,
    pub timestamp: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
}

/// Optional per-message settings.
#[derive(Clone, Debug, Default)]
pub struct SendOptions {
    pub reply_to: Option<String>,
    pub expires_at: Option<u64>,
}

/// Wires an identity, its prekey set, and the per-conversation ratchets
/// together.
pub struct SessionManager {
    identity: Identity,
    prekeys: PrekeySet,
    conversations: HashMap<String, Conversation>,
    config: SessionConfig,
}

impl SessionManager {
    pub fn new(identity: Identity, config: SessionConfig) -> Result<Self, Error> {
        let prekeys = PrekeySet::generate(identity.key_set(), config.one_time_prekey_count)?;
        Ok(Self {
            identity,
            prekeys,
            conversations: HashMap::new(),
            config,
        })
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The bundle to publish to discovery.
    pub fn publish_bundle(&self) -> PrekeyBundle {
        self.prekeys.bundle(self.identity.key_set())
    }

    /// Rotates the signed prekey when due and refills the one-time pool.
    ///
    /// Returns `true` when the published bundle changed and should be
    /// republished.
    pub fn maintain_prekeys(&mut self) -> Result<bool, Error> {
        let mut changed = false;
        if self
            .prekeys
            .signed_prekey()
            .needs_rotation(now_millis(), self.config.signed_prekey_rotation_ms)
        {
            self.prekeys
                .rotate_signed_prekey(&self.identity.key_set().signing)?;
            changed = true;
        }
        if self.prekeys.replenish_one_time_prekeys()? > 0 {
            changed = true;
        }
        Ok(changed)
    }

    /// Starts a conversation from a peer's published bundle.
    pub fn initiate(
        &mut self,
        peer_did: &str,
        bundle: &PrekeyBundle,
        peer_signing_public: &[u8; 32],
    ) -> Result<String, Error> {
        peer_did.parse::<Did>()?;

        let initiation = x3dh::initiate(self.identity.key_set(), bundle, peer_signing_public)?;
        let ratchet = DoubleRatchet::initialize_for_sender(
            initiation.shared_secret,
            &X25519PublicKey::from(bundle.signed_prekey.public_key),
            self.config.max_skip,
        )?;

        let my_did = self.identity.did().to_string();
        let id = derive_conversation_id(&my_did, peer_did, &initiation.ephemeral_public);
        let now = now_millis();

        self.conversations.insert(
            id.clone(),
            Conversation {
                id: id.clone(),
                participants: vec![my_did, peer_did.to_string()],
                created: now,
                last_message: None,
                ratchet,
                handshake: Some(HandshakeKeys {
                    ephemeral_public: initiation.ephemeral_public,
                    signed_prekey_id: initiation.used_signed_prekey_id,
                    one_time_prekey_id: initiation.used_one_time_prekey_id,
                }),
            },
        );

        Ok(id)
    }

    /// Accepts a conversation initiated by a peer, consuming the referenced
    /// prekeys.
    pub fn accept(
        &mut self,
        initiator_did: &str,
        initiator_identity_key: &X25519PublicKey,
        initiator_ephemeral: &X25519PublicKey,
        signed_prekey_id: u32,
        one_time_prekey_id: Option<u32>,
    ) -> Result<String, Error> {
        initiator_did.parse::<Did>()?;

        let shared_secret = x3dh::respond(
            self.identity.key_set(),
            &mut self.prekeys,
            initiator_identity_key,
            initiator_ephemeral,
            signed_prekey_id,
            one_time_prekey_id,
        )?;

        let ratchet = DoubleRatchet::initialize_for_receiver(
            shared_secret,
            self.prekeys.signed_prekey().key_pair(),
            self.config.max_skip,
        );

        let my_did = self.identity.did().to_string();
        let id = derive_conversation_id(initiator_did, &my_did, initiator_ephemeral);
        let now = now_millis();

        self.conversations.insert(
            id.clone(),
            Conversation {
                id: id.clone(),
                participants: vec![initiator_did.to_string(), my_did],
                created: now,
                last_message: None,
                ratchet,
                handshake: None,
            },
        );

        Ok(id)
    }

    pub fn conversation(&self, id: &str) -> Option<&Conversation> {
        self.conversations.get(id)
    }

    pub fn conversation_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.conversations.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Encrypts a plaintext into a direct message for the conversation.
    pub fn send(
        &mut self,
        conversation_id: &str,
        plaintext: &[u8],
        options: SendOptions,
    ) -> Result<DirectMessage, Error> {
        let conversation = self
            .conversations
            .get_mut(conversation_id)
            .ok_or_else(|| Error::Protocol(format!("unknown conversation {conversation_id}")))?;

        let encrypted = conversation.ratchet.encrypt(plaintext)?;
        let now = now_millis();
        conversation.last_message = Some(now);

        let mut message = DirectMessage {
            version: MESSAGE_VERSION,
            id: None,
            conversation_id: conversation_id.to_string(),
            sender: self.identity.did().to_string(),
            message_type: DIRECT_TYPE.to_string(),
            encrypted,
            timestamp: now,
            reply_to: options.reply_to,
            expires_at: options.expires_at,
        };
        message.id = Some(ContentId::for_bytes(canonical::to_bytes(&message)?).to_string());

        Ok(message)
    }

    /// Decrypts a received direct message.
    ///
    /// Expiry is enforced here, at receipt; an expired message is rejected
    /// before it touches the ratchet.
    pub fn receive(&mut self, message: &DirectMessage) -> Result<Vec<u8>, Error> {
        if message.version != MESSAGE_VERSION {
            return Err(Error::Protocol(format!(
                "unsupported message version {}",
                message.version
            )));
        }
        if let Some(expires_at) = message.expires_at {
            if expires_at < now_millis() {
                return Err(Error::Expired);
            }
        }

        let conversation = self
            .conversations
            .get_mut(&message.conversation_id)
            .ok_or_else(|| {
                Error::Protocol(format!("unknown conversation {}", message.conversation_id))
            })?;

        let plaintext = conversation.ratchet.decrypt(&message.encrypted)?;
        conversation.last_message = Some(now_millis());
        // Any successful receive proves the peer holds the session.
        conversation.handshake = None;

        Ok(plaintext)
    }

    /// One-shot sealed envelope to any encryption key; no session state.
    pub fn sealed_send(
        &self,
        recipient: &X25519PublicKey,
        plaintext: &[u8],
    ) -> Result<SealedMessage, Error> {
        sealed::sealed_send(recipient, plaintext)
    }

    /// Opens a sealed envelope addressed to this identity.
    pub fn sealed_receive(&self, message: &SealedMessage) -> Result<Vec<u8>, Error> {
        sealed::sealed_receive(&self.identity.key_set().encryption, message)
    }

    /// Serializes the prekey set and every conversation to the canonical
    /// storage form. The prekey set travels too, so bundles published
    /// before a restart stay answerable after it.
    pub fn export_state(&self) -> Result<Vec<u8>, Error> {
        let mut conversations: Vec<ConversationRepr> = self
            .conversations
            .values()
            .map(|conversation| ConversationRepr {
                id: conversation.id.clone(),
                participants: conversation.participants.clone(),
                created: conversation.created,
                last_message: conversation.last_message,
                handshake: conversation.handshake.as_ref().map(|keys| HandshakeRepr {
                    ephemeral_public: keys.ephemeral_public.to_bytes(),
                    signed_prekey_id: keys.signed_prekey_id,
                    one_time_prekey_id: keys.one_time_prekey_id,
                }),
                ratchet: conversation.ratchet.to_repr(),
            })
            .collect();
        conversations.sort_by(|a, b| a.id.cmp(&b.id));

        let mut state = SessionState {
            version: STATE_VERSION,
            prekeys: self.prekeys.to_repr(),
            conversations,
        };
        let bytes = canonical::to_bytes(&state);
        state.zeroize();
        bytes
    }

    /// Restores a session manager from [`SessionManager::export_state`]
    /// output and the owning identity.
    pub fn import_state(
        identity: Identity,
        bytes: &[u8],
        config: SessionConfig,
    ) -> Result<Self, Error> {
        let state: SessionState = canonical::from_bytes(bytes)?;
        let SessionState {
            version,
            prekeys,
            conversations: conversation_reprs,
        } = state;

        if version != STATE_VERSION {
            let mut prekeys = prekeys;
            prekeys.zeroize();
            let mut conversation_reprs = conversation_reprs;
            for repr in &mut conversation_reprs {
                repr.ratchet.zeroize();
            }
            return Err(Error::Protocol(format!(
                "unsupported session state version {version}"
            )));
        }

        let prekeys = PrekeySet::from_repr(prekeys)?;

        let mut conversations = HashMap::with_capacity(conversation_reprs.len());
        for repr in conversation_reprs {
            let conversation = Conversation {
                id: repr.id.clone(),
                participants: repr.participants,
                created: repr.created,
                last_message: repr.last_message,
                handshake: repr.handshake.map(|keys| HandshakeKeys {
                    ephemeral_public: X25519PublicKey::from(keys.ephemeral_public),
                    signed_prekey_id: keys.signed_prekey_id,
                    one_time_prekey_id: keys.one_time_prekey_id,
                }),
                ratchet: DoubleRatchet::from_repr(repr.ratchet),
            };
            conversations.insert(repr.id, conversation);
        }

        Ok(Self {
            identity,
            prekeys,
            conversations,
            config,
        })
    }
}

/// Both ends derive the same conversation id from the sorted participant
/// DIDs and the handshake ephemeral key.
fn derive_conversation_id(did_a: &str, did_b: &str, ephemeral: &X25519PublicKey) -> String {
    let (first, second) = if did_a <= did_b {
        (did_a, did_b)
    } else {
        (did_b, did_a)
    };

    let mut transcript = Vec::with_capacity(first.len() + second.len() + 34);
    transcript.extend_from_slice(first.as_bytes());
    transcript.push(b'|');
    transcript.extend_from_slice(second.as_bytes());
    transcript.push(b'|');
    transcript.extend_from_slice(ephemeral.as_bytes());

    ContentId::for_bytes(&transcript).to_string()
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionState {
    version: u32,
    prekeys: PrekeySetRepr,
    conversations: Vec<ConversationRepr>,
}

impl Zeroize for SessionState {
    fn zeroize(&mut self) {
        self.prekeys.zeroize();
        for conversation in &mut self.conversations {
            conversation.ratchet.zeroize();
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConversationRepr {
    id: String,
    participants: Vec<String>,
    created: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_message: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    handshake: Option<HandshakeRepr>,
    ratchet: crate::ratchet::RatchetRepr,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HandshakeRepr {
    ephemeral_public: [u8; 32],
    signed_prekey_id: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    one_time_prekey_id: Option<u32>,
}
