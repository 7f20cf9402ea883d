//! Double Ratchet: forward-secret, out-of-order-tolerant message
//! encryption.
//!
//! A DH ratchet step runs whenever a message arrives under a new remote DH
//! key; between steps, symmetric chains derive one key per message. Keys
//! for not-yet-arrived messages are cached, bounded by `max_skip`, so
//! delivery may be reordered within that window.

mod chain;
mod message;
mod state;

pub use message::{EncryptedMessage, MessageHeader};
pub(crate) use state::RatchetRepr;

use std::collections::{HashMap, VecDeque};

use x25519_dalek::SharedSecret;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::canonical;
use crate::crypto::aead;
use crate::crypto::kdf::{hkdf_key, CHAIN_KEY_INFO, ROOT_KEY_INFO};
use crate::crypto::{X25519PublicKey, X25519Secret};
use crate::error::Error;
use crate::ratchet::chain::ChainKey;
use crate::ratchet::state::{RatchetState, SkippedKeyRepr};
use crate::x3dh::X3dhSharedSecret;

/// Default bound on the skipped-key cache and on a single skip.
pub const DEFAULT_MAX_SKIP: u32 = 1000;

/// Message keys for skipped (not yet arrived) messages, keyed by the
/// sender's DH public key and message number. FIFO-bounded: when the table
/// overflows, the oldest entry is zeroized and evicted.
#[derive(Clone, Default)]
struct SkippedKeys {
    map: HashMap<([u8; 32], u32), Box<[u8; 32]>>,
    order: VecDeque<([u8; 32], u32)>,
}

impl SkippedKeys {
    fn insert(&mut self, key: ([u8; 32], u32), message_key: Box<[u8; 32]>, max: u32) {
        if self.map.insert(key, message_key).is_none() {
            self.order.push_back(key);
        }
        while self.map.len() > max as usize {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            if let Some(mut evicted) = self.map.remove(&oldest) {
                evicted.zeroize();
            }
        }
    }

    fn take(&mut self, key: &([u8; 32], u32)) -> Option<Box<[u8; 32]>> {
        // Stale entries in `order` are skipped during eviction.
        self.map.remove(key)
    }

    fn len(&self) -> usize {
        self.map.len()
    }
}

impl Zeroize for SkippedKeys {
    fn zeroize(&mut self) {
        for (_, mut message_key) in self.map.drain() {
            message_key.zeroize();
        }
        self.order.clear();
    }
}

impl Drop for SkippedKeys {
    fn drop(&mut self) {
        self.zeroize();
    }
}

impl ZeroizeOnDrop for SkippedKeys {}

/// One side of a Double Ratchet conversation.
pub struct DoubleRatchet {
    state: RatchetState,
    skipped: SkippedKeys,
    max_skip: u32,
}

impl DoubleRatchet {
    /// Initializes the side that ran the X3DH initiation.
    ///
    /// The first DH ratchet runs immediately against the peer's signed
    /// prekey, so the sender has a sending chain before any reply arrives.
    pub fn initialize_for_sender(
        shared_secret: X3dhSharedSecret,
        peer_signed_prekey: &X25519PublicKey,
        max_skip: u32,
    ) -> Result<Self, Error> {
        let dh_send = X25519Secret::generate()?;
        let dh_out = dh_send.dh(peer_signed_prekey);
        let (root_key, send_chain) = kdf_root_key(shared_secret.as_bytes(), dh_out)?;

        Ok(Self {
            state: RatchetState {
                dh_send,
                dh_receive: Some(*peer_signed_prekey),
                root_key,
                send_chain: Some(ChainKey::new(send_chain)),
                receive_chain: None,
                send_n: 0,
                receive_n: 0,
                previous_send_n: 0,
            },
            skipped: SkippedKeys::default(),
            max_skip,
        })
    }

    /// Initializes the side that accepted the X3DH handshake.
    ///
    /// No chains exist yet; the first incoming message carries a fresh DH
    /// public key and triggers the first ratchet step.
    pub fn initialize_for_receiver(
        shared_secret: X3dhSharedSecret,
        signed_prekey_pair: X25519Secret,
        max_skip: u32,
    ) -> Self {
        Self {
            state: RatchetState {
                dh_send: signed_prekey_pair,
                dh_receive: None,
                root_key: Box::new(*shared_secret.as_bytes()),
                send_chain: None,
                receive_chain: None,
                send_n: 0,
                receive_n: 0,
                previous_send_n: 0,
            },
            skipped: SkippedKeys::default(),
            max_skip,
        }
    }

    /// Our current DH ratchet public key.
    pub fn public_key(&self) -> X25519PublicKey {
        self.state.dh_send.public_key()
    }

    pub fn max_skip(&self) -> u32 {
        self.max_skip
    }

    /// Number of cached skipped-message keys.
    pub fn skipped_key_count(&self) -> usize {
        self.skipped.len()
    }

    /// Encrypts a message under the next key of the sending chain.
    pub fn encrypt(&mut self, plaintext: &[u8]) -> Result<EncryptedMessage, Error> {
        let header = MessageHeader {
            dh_public: self.state.dh_send.public_key().to_bytes(),
            n: self.state.send_n,
            pn: self.state.previous_send_n,
        };

        let chain = self.state.send_chain.as_mut().ok_or(Error::RatchetNotReady)?;
        let mut message_key = chain.next()?;

        let nonce = aead::generate_nonce()?;
        let ciphertext = aead::encrypt(&message_key, &nonce, plaintext, &[]);
        message_key.zeroize();

        self.state.send_n = self.state.send_n.wrapping_add(1);

        Ok(EncryptedMessage {
            header,
            nonce,
            ciphertext: ciphertext?,
        })
    }

    /// Decrypts a message, ratcheting and skipping as the header demands.
    ///
    /// On any failure the previous state is restored, so a forged or
    /// corrupted message cannot desynchronize the conversation.
    pub fn decrypt(&mut self, message: &EncryptedMessage) -> Result<Vec<u8>, Error> {
        let state_snapshot = self.state.clone();
        let skipped_snapshot = self.skipped.clone();

        let result = self.decrypt_inner(message);
        if result.is_err() {
            self.state = state_snapshot;
            self.skipped = skipped_snapshot;
        }
        result
    }

    fn decrypt_inner(&mut self, message: &EncryptedMessage) -> Result<Vec<u8>, Error> {
        let header = &message.header;

        // A message we already skipped past: use and discard its cached key.
        if let Some(mut message_key) = self.skipped.take(&(header.dh_public, header.n)) {
            let plaintext =
                aead::decrypt(&message_key, &message.nonce, &message.ciphertext, &[]);
            message_key.zeroize();
            return plaintext;
        }

        let incoming = X25519PublicKey::from(header.dh_public);
        let new_chain = match &self.state.dh_receive {
            Some(current) => !current.ct_eq(&incoming),
            None => true,
        };

        if new_chain {
            // Close out the current receive chain up to the sender's
            // previous-chain length, then turn the DH ratchet.
            self.skip_message_keys(header.pn)?;
            self.dh_ratchet(&incoming)?;
        }

        self.skip_message_keys(header.n)?;

        let chain = self
            .state
            .receive_chain
            .as_mut()
            .ok_or(Error::RatchetNotReady)?;
        let mut message_key = chain.next()?;
        self.state.receive_n = self.state.receive_n.wrapping_add(1);

        let plaintext = aead::decrypt(&message_key, &message.nonce, &message.ciphertext, &[]);
        message_key.zeroize();
        plaintext
    }

    /// Derives and caches receive-chain keys up to (excluding) `until`.
    fn skip_message_keys(&mut self, until: u32) -> Result<(), Error> {
        if until <= self.state.receive_n {
            return Ok(());
        }
        if self.state.receive_n + self.max_skip < until {
            return Err(Error::TooManySkipped {
                requested: until - self.state.receive_n,
                max: self.max_skip,
            });
        }

        let Some(their_dh) = self.state.dh_receive.map(|public| public.to_bytes()) else {
            return Ok(());
        };
        let Some(chain) = self.state.receive_chain.as_mut() else {
            return Ok(());
        };

        while self.state.receive_n < until {
            let message_key = chain.next()?;
            self.skipped
                .insert((their_dh, self.state.receive_n), message_key, self.max_skip);
            self.state.receive_n = self.state.receive_n.wrapping_add(1);
        }

        Ok(())
    }

    /// The DH ratchet step: new receive chain from their new key, fresh DH
    /// pair of our own, new send chain.
    fn dh_ratchet(&mut self, incoming: &X25519PublicKey) -> Result<(), Error> {
        self.state.previous_send_n = self.state.send_n;
        self.state.send_n = 0;
        self.state.receive_n = 0;
        self.state.dh_receive = Some(*incoming);

        let dh_out = self.state.dh_send.dh(incoming);
        let (root_key, receive_chain) = kdf_root_key(&self.state.root_key, dh_out)?;
        self.state.root_key.zeroize();
        self.state.root_key = root_key;
        self.state.receive_chain = Some(ChainKey::new(receive_chain));

        // The replaced pair zeroizes on drop.
        self.state.dh_send = X25519Secret::generate()?;

        let dh_out = self.state.dh_send.dh(incoming);
        let (root_key, send_chain) = kdf_root_key(&self.state.root_key, dh_out)?;
        self.state.root_key.zeroize();
        self.state.root_key = root_key;
        self.state.send_chain = Some(ChainKey::new(send_chain));

        Ok(())
    }

    /// Serializes the full ratchet (state, skipped keys, bound) to the
    /// canonical storage form.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        let mut repr = self.to_repr();
        let bytes = canonical::to_bytes(&repr);
        repr.zeroize();
        bytes
    }

    /// Restores a ratchet serialized by [`DoubleRatchet::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let repr: RatchetRepr = canonical::from_bytes(bytes)?;
        Ok(Self::from_repr(repr))
    }

    pub(crate) fn to_repr(&self) -> RatchetRepr {
        let mut skipped_keys: Vec<SkippedKeyRepr> = self
            .skipped
            .map
            .iter()
            .map(|((dh_public, n), message_key)| SkippedKeyRepr {
                dh_public: *dh_public,
                n: *n,
                message_key: **message_key,
            })
            .collect();
        skipped_keys.sort_by(|a, b| (a.dh_public, a.n).cmp(&(b.dh_public, b.n)));

        RatchetRepr {
            dh_send_private: self.state.dh_send.to_bytes(),
            dh_receive: self.state.dh_receive.map(|public| public.to_bytes()),
            root_key: *self.state.root_key,
            send_chain_key: self.state.send_chain.as_ref().map(|chain| chain.to_bytes()),
            receive_chain_key: self
                .state
                .receive_chain
                .as_ref()
                .map(|chain| chain.to_bytes()),
            send_n: self.state.send_n,
            receive_n: self.state.receive_n,
            previous_send_n: self.state.previous_send_n,
            skipped_keys,
            max_skip: self.max_skip,
        }
    }

    pub(crate) fn from_repr(repr: RatchetRepr) -> Self {
        let mut skipped = SkippedKeys::default();
        for entry in &repr.skipped_keys {
            skipped.insert(
                (entry.dh_public, entry.n),
                Box::new(entry.message_key),
                repr.max_skip,
            );
        }

        Self {
            state: RatchetState {
                dh_send: X25519Secret::from(repr.dh_send_private),
                dh_receive: repr.dh_receive.map(X25519PublicKey::from),
                root_key: Box::new(repr.root_key),
                send_chain: repr
                    .send_chain_key
                    .map(|key| ChainKey::new(Box::new(key))),
                receive_chain: repr
                    .receive_chain_key
                    .map(|key| ChainKey::new(Box::new(key))),
                send_n: repr.send_n,
                receive_n: repr.receive_n,
                previous_send_n: repr.previous_send_n,
            },
            skipped,
            max_skip: repr.max_skip,
        }
    }
}

impl Zeroize for DoubleRatchet {
    fn zeroize(&mut self) {
        self.state.zeroize();
        self.skipped.zeroize();
    }
}

impl ZeroizeOnDrop for DoubleRatchet {}

/// Root-key KDF: two keys from `root ‖ dh_output`, under the root-key and
/// chain-key infos respectively.
fn kdf_root_key(
    root_key: &[u8; 32],
    dh_output: SharedSecret,
) -> Result<(Box<[u8; 32]>, Box<[u8; 32]>), Error> {
    let mut ikm = [0u8; 64];
    ikm[..32].copy_from_slice(root_key);
    ikm[32..].copy_from_slice(dh_output.as_bytes());

    let new_root = hkdf_key(&ikm, ROOT_KEY_INFO);
    let chain = hkdf_key(&ikm, CHAIN_KEY_INFO);
    ikm.zeroize();

    let mut new_root = new_root?;
    let mut chain = chain?;
    let boxed_root = Box::new(new_root);
    let boxed_chain = Box::new(chain);
    new_root.zeroize();
    chain.zeroize();

    Ok((boxed_root, boxed_chain))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::random::random_seed;

    fn ratchet_pair(max_skip: u32) -> (DoubleRatchet, DoubleRatchet) {
        let shared = Box::new(random_seed().unwrap());
        let receiver_prekey = X25519Secret::generate().unwrap();

        let sender = DoubleRatchet::initialize_for_sender(
            X3dhSharedSecret::from_bytes(shared.clone()),
            &receiver_prekey.public_key(),
            max_skip,
        )
        .unwrap();
        let receiver = DoubleRatchet::initialize_for_receiver(
            X3dhSharedSecret::from_bytes(shared),
            receiver_prekey,
            max_skip,
        );

        (sender, receiver)
    }

    #[test]
    fn basic_two_way_exchange() {
        let (mut alice, mut bob) = ratchet_pair(DEFAULT_MAX_SKIP);

        let to_bob = alice.encrypt(b"Hello, Bob!").unwrap();
        assert_eq!(bob.decrypt(&to_bob).unwrap(), b"Hello, Bob!");

        let to_alice = bob.encrypt(b"Hello, Alice!").unwrap();
        assert_eq!(alice.decrypt(&to_alice).unwrap(), b"Hello, Alice!");
    }

    #[test]
    fn receiver_cannot_send_before_first_ratchet() {
        let (_, mut bob) = ratchet_pair(DEFAULT_MAX_SKIP);
        assert_eq!(bob.encrypt(b"too early").unwrap_err(), Error::RatchetNotReady);
    }

    #[test]
    fn out_of_order_within_window() {
        let (mut alice, mut bob) = ratchet_pair(DEFAULT_MAX_SKIP);

        let messages: Vec<EncryptedMessage> = (0..4)
            .map(|i| alice.encrypt(format!("m{i}").as_bytes()).unwrap())
            .collect();

        // Arrival order: m2, m0, m3, m1.
        assert_eq!(bob.decrypt(&messages[2]).unwrap(), b"m2");
        assert_eq!(bob.decrypt(&messages[0]).unwrap(), b"m0");
        assert_eq!(bob.decrypt(&messages[3]).unwrap(), b"m3");
        assert_eq!(bob.decrypt(&messages[1]).unwrap(), b"m1");
        assert_eq!(bob.skipped_key_count(), 0);
    }

    #[test]
    fn skipped_key_is_consumed_on_use() {
        let (mut alice, mut bob) = ratchet_pair(DEFAULT_MAX_SKIP);

        let m0 = alice.encrypt(b"m0").unwrap();
        let m1 = alice.encrypt(b"m1").unwrap();

        assert_eq!(bob.decrypt(&m1).unwrap(), b"m1");
        assert_eq!(bob.skipped_key_count(), 1);

        assert_eq!(bob.decrypt(&m0).unwrap(), b"m0");
        assert_eq!(bob.skipped_key_count(), 0);

        // The message key was zeroized and dropped; replaying fails.
        assert!(bob.decrypt(&m0).is_err());
    }

    #[test]
    fn dh_ratchet_resets_counters_and_tracks_previous_chain() {
        let (mut alice, mut bob) = ratchet_pair(DEFAULT_MAX_SKIP);

        for i in 0..3 {
            let message = alice.encrypt(format!("a{i}").as_bytes()).unwrap();
            bob.decrypt(&message).unwrap();
        }

        // Bob's first reply turns the ratchet on Alice's side.
        let reply = bob.encrypt(b"first reply").unwrap();
        assert_eq!(reply.header.n, 0);
        let alice_key_before = alice.public_key();
        assert_eq!(alice.decrypt(&reply).unwrap(), b"first reply");
        assert!(!alice.public_key().ct_eq(&alice_key_before));

        // Alice's next message opens a fresh chain and reports the closed
        // chain's length.
        let next = alice.encrypt(b"post-ratchet").unwrap();
        assert_eq!(next.header.n, 0);
        assert_eq!(next.header.pn, 3);
        assert_eq!(bob.decrypt(&next).unwrap(), b"post-ratchet");
    }

    #[test]
    fn too_many_skipped_in_one_step() {
        let (mut alice, mut bob) = ratchet_pair(2);

        let mut messages = Vec::new();
        for i in 0..5 {
            messages.push(alice.encrypt(format!("m{i}").as_bytes()).unwrap());
        }

        bob.decrypt(&messages[0]).unwrap();

        // Jumping to m4 needs 3 skips with a bound of 2.
        assert!(matches!(
            bob.decrypt(&messages[4]).unwrap_err(),
            Error::TooManySkipped { max: 2, .. }
        ));

        // The failure must not have advanced the chain: m3 still works.
        assert_eq!(bob.decrypt(&messages[3]).unwrap(), b"m3");
    }

    #[test]
    fn cache_overflow_evicts_oldest_first() {
        let (mut alice, mut bob) = ratchet_pair(3);

        let mut messages = Vec::new();
        for i in 0..7 {
            messages.push(alice.encrypt(format!("m{i}").as_bytes()).unwrap());
        }

        // Jump to m3: caches m0..m2 (table full at 3).
        bob.decrypt(&messages[3]).unwrap();
        assert_eq!(bob.skipped_key_count(), 3);

        // Jump to m6: caches m4 and m5, evicting m0 and m1.
        bob.decrypt(&messages[6]).unwrap();
        assert_eq!(bob.skipped_key_count(), 3);

        assert!(bob.decrypt(&messages[0]).is_err());
        assert!(bob.decrypt(&messages[1]).is_err());
        assert_eq!(bob.decrypt(&messages[2]).unwrap(), b"m2");
        assert_eq!(bob.decrypt(&messages[4]).unwrap(), b"m4");
        assert_eq!(bob.decrypt(&messages[5]).unwrap(), b"m5");
    }

    #[test]
    fn corrupted_ciphertext_fails_and_state_recovers() {
        let (mut alice, mut bob) = ratchet_pair(DEFAULT_MAX_SKIP);

        let good = alice.encrypt(b"good").unwrap();
        let mut bad = good.clone();
        bad.ciphertext[0] ^= 1;

        assert_eq!(bob.decrypt(&bad).unwrap_err(), Error::Authentication);
        assert_eq!(bob.decrypt(&good).unwrap(), b"good");
    }

    #[test]
    fn long_conversation_with_alternating_turns() {
        let (mut alice, mut bob) = ratchet_pair(DEFAULT_MAX_SKIP);

        for round in 0..6 {
            let from_alice = format!("alice round {round}");
            let message = alice.encrypt(from_alice.as_bytes()).unwrap();
            assert_eq!(bob.decrypt(&message).unwrap(), from_alice.as_bytes());

            let from_bob = format!("bob round {round}");
            let message = bob.encrypt(from_bob.as_bytes()).unwrap();
            assert_eq!(alice.decrypt(&message).unwrap(), from_bob.as_bytes());
        }
    }

    #[test]
    fn serialization_preserves_a_live_conversation() {
        let (mut alice, mut bob) = ratchet_pair(DEFAULT_MAX_SKIP);

        let m0 = alice.encrypt(b"before save").unwrap();
        let m1 = alice.encrypt(b"skipped").unwrap();
        let m2 = alice.encrypt(b"after skip").unwrap();
        bob.decrypt(&m0).unwrap();
        bob.decrypt(&m2).unwrap();
        assert_eq!(bob.skipped_key_count(), 1);

        let mut restored = DoubleRatchet::from_bytes(&bob.to_bytes().unwrap()).unwrap();
        assert_eq!(restored.skipped_key_count(), 1);
        assert_eq!(restored.decrypt(&m1).unwrap(), b"skipped");

        // The restored side keeps ratcheting with the live peer.
        let reply = restored.encrypt(b"from the restored state").unwrap();
        assert_eq!(alice.decrypt(&reply).unwrap(), b"from the restored state");
    }

    #[test]
    fn large_and_empty_messages() {
        let (mut alice, mut bob) = ratchet_pair(DEFAULT_MAX_SKIP);

        let large = vec![b'A'; 100 * 1024];
        let message = alice.encrypt(&large).unwrap();
        assert_eq!(bob.decrypt(&message).unwrap(), large);

        let empty = alice.encrypt(b"").unwrap();
        assert_eq!(bob.decrypt(&empty).unwrap(), b"");
    }
}
