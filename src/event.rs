//! Protocol event encoding, signing, and validation.
//!
//! Events follow the NIP-01 wire shape: a JSON object with exact field
//! names `id, pubkey, created_at, kind, tags, content, sig`. The id is
//! the SHA-256 of the canonical serialization `[0, pubkey, created_at,
//! kind, tags, content]`; byte-exact reproduction across implementations
//! is required, so the canonical bytes come from `serde_json` (which does
//! no HTML or slash escaping).
//!
//! `sig` is optional only for rumors, which are never transmitted as
//! top-level relay messages.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::{ProtocolError, Result};
use crate::keys::{self, Keypair};

/// Profile metadata.
pub const KIND_METADATA: u16 = 0;
/// Public text note.
pub const KIND_TEXT_NOTE: u16 = 1;
/// Seal: middle gift-wrap layer, signed by the real sender key.
pub const KIND_SEAL: u16 = 13;
/// Direct message rumor: innermost unsigned plaintext event.
pub const KIND_DIRECT_MESSAGE: u16 = 14;
/// File message rumor.
pub const KIND_FILE_MESSAGE: u16 = 15;
/// Gift wrap: outermost layer, signed by a single-use ephemeral key.
pub const KIND_GIFT_WRAP: u16 = 1059;
/// Ephemeral public channel message.
pub const KIND_EPHEMERAL_MESSAGE: u16 = 20000;
/// Presence heartbeat.
pub const KIND_PRESENCE: u16 = 20001;

/// A protocol event in relay wire format.
///
/// Lifecycle: constructed unsigned with a computed id, then signed (sig
/// set), then transmitted. Immutable thereafter — any field change
/// requires a new id and signature.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Event {
    /// Event id: SHA-256 of the canonical serialization, hex-encoded.
    pub id: String,

    /// Signer's x-only public key (32 bytes, hex-encoded).
    pub pubkey: String,

    /// Unix timestamp in seconds.
    pub created_at: i64,

    /// Event kind.
    pub kind: u16,

    /// Ordered tag list; each tag is an ordered list of strings.
    pub tags: Vec<Vec<String>>,

    /// Event content (plaintext or an encrypted envelope).
    pub content: String,

    /// BIP-340 Schnorr signature over the id (64 bytes, hex-encoded).
    /// Absent only on rumors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sig: Option<String>,
}

impl Event {
    /// Creates a new unsigned event timestamped now, with its id computed.
    ///
    /// # Errors
    ///
    /// Returns an error if canonical serialization fails.
    pub fn new(pubkey: &str, kind: u16, tags: Vec<Vec<String>>, content: String) -> Result<Self> {
        Self::with_created_at(pubkey, kind, tags, content, Utc::now().timestamp())
    }

    /// Creates a new unsigned event with an explicit timestamp.
    ///
    /// Gift-wrap layers use this to randomize `created_at` into the past.
    ///
    /// # Errors
    ///
    /// Returns an error if canonical serialization fails.
    pub fn with_created_at(
        pubkey: &str,
        kind: u16,
        tags: Vec<Vec<String>>,
        content: String,
        created_at: i64,
    ) -> Result<Self> {
        let mut event = Self {
            id: String::new(),
            pubkey: pubkey.to_string(),
            created_at,
            kind,
            tags,
            content,
            sig: None,
        };
        event.id = event.compute_id()?;
        Ok(event)
    }

    /// Computes the canonical event id.
    ///
    /// SHA-256 over the serialized array `[0, pubkey, created_at, kind,
    /// tags, content]`, hex-encoded.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn compute_id(&self) -> Result<String> {
        let serialized = serde_json::to_string(&(
            0,
            &self.pubkey,
            self.created_at,
            self.kind,
            &self.tags,
            &self.content,
        ))?;

        let mut hasher = Sha256::new();
        hasher.update(serialized.as_bytes());
        Ok(hex::encode(hasher.finalize()))
    }

    /// Returns the id as raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MalformedInput`] if the id field is not
    /// 32 hex-encoded bytes.
    pub fn id_bytes(&self) -> Result<[u8; 32]> {
        hex::decode(&self.id)?
            .try_into()
            .map_err(|_| ProtocolError::MalformedInput("event id must be 32 bytes".to_string()))
    }

    /// Recomputes the id and signs it with `keys`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Signing`] if the event's `pubkey` does not
    /// match the signing key, or if signing fails.
    pub fn sign(&mut self, keys: &Keypair) -> Result<()> {
        if self.pubkey != keys.pubkey_hex() {
            return Err(ProtocolError::Signing(
                "event pubkey does not match signing key".to_string(),
            ));
        }
        self.id = self.compute_id()?;
        self.sig = Some(keys.sign(&self.id_bytes()?)?);
        Ok(())
    }

    /// Verifies event structure, id, and signature.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidEvent`] for structural problems,
    /// and [`ProtocolError::InvalidSignature`] when the id does not match
    /// the content hash or the signature does not verify.
    pub fn verify(&self) -> Result<()> {
        if self.pubkey.is_empty() {
            return Err(ProtocolError::InvalidEvent("empty pubkey".to_string()));
        }
        if self.content.is_empty() {
            return Err(ProtocolError::InvalidEvent("empty content".to_string()));
        }
        if self.created_at <= 0 {
            return Err(ProtocolError::InvalidEvent(
                "non-positive timestamp".to_string(),
            ));
        }
        let pubkey_bytes = hex::decode(&self.pubkey)?;
        if !keys::is_valid_public_key(&pubkey_bytes) {
            return Err(ProtocolError::InvalidEvent("invalid pubkey".to_string()));
        }

        // Constant-time id comparison to avoid leaking hash prefixes
        let computed = self.compute_id()?;
        if !bool::from(computed.as_bytes().ct_eq(self.id.as_bytes())) {
            return Err(ProtocolError::InvalidSignature);
        }

        let Some(sig) = &self.sig else {
            return Err(ProtocolError::InvalidEvent("missing signature".to_string()));
        };
        keys::verify_schnorr(&self.id_bytes()?, sig, &self.pubkey)
    }

    /// Returns `true` if the event passes [`Self::verify`].
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.verify().is_ok()
    }

    /// Serializes this event to relay wire JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(ProtocolError::from)
    }

    /// Deserializes an event from relay wire JSON.
    ///
    /// Missing required fields are a [`ProtocolError::MalformedInput`],
    /// never silently defaulted: a valid-but-empty event would mask a real
    /// protocol violation.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MalformedInput`] on any schema violation.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| ProtocolError::MalformedInput(format!("invalid event JSON: {e}")))
    }

    /// Returns the first value of the first tag named `name`.
    #[must_use]
    pub fn tag_value(&self, name: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|tag| tag.first().map(String::as_str) == Some(name))
            .and_then(|tag| tag.get(1).map(String::as_str))
    }

    /// Returns the recipient public key from the `p` tag, if present.
    #[must_use]
    pub fn recipient(&self) -> Option<&str> {
        self.tag_value("p")
    }
}
