//! Three-layer gift-wrap envelope for private messages.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │ Gift Wrap (kind 1059) - PUBLIC                      │
//! │ • Signed by a single-use ephemeral key              │
//! │ • Timestamp randomized into the past                │
//! │ • Only reveals: recipient (p-tag)                   │
//! │  ┌───────────────────────────────────────────────┐  │
//! │  │ Seal (kind 13) - ENCRYPTED                    │  │
//! │  │ • Encrypted for the recipient                 │  │
//! │  │ • Signed by sender's real or derived key      │  │
//! │  │  ┌─────────────────────────────────────────┐  │  │
//! │  │  │ Rumor (kind 14) - UNSIGNED              │  │  │
//! │  │  │ • Plaintext message content             │  │  │
//! │  │  └─────────────────────────────────────────┘  │  │
//! │  └───────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! Only the seal, visible after one successful decryption, reveals the
//! real sender; anyone observing the gift wrap sees a throwaway key. The
//! randomized `created_at` on both inner layers prevents timing
//! correlation.
//!
//! Unwrap failures are ordinary outcomes on a public relay: most gift
//! wraps are simply addressed to someone else. Callers drop the event on
//! error and never retry — wraps are immutable, so a malformed one will
//! never succeed later.

use chrono::Utc;
use rand::Rng;
use tracing::debug;

use crate::error::{ProtocolError, Result};
use crate::event::{Event, KIND_GIFT_WRAP, KIND_SEAL};
use crate::keys::Keypair;
use crate::nip44;

/// Maximum seconds a seal or gift-wrap timestamp is shifted into the
/// past. Past-only so relays never see a future-dated event.
pub const TIMESTAMP_RANDOM_WINDOW: i64 = 48 * 60 * 60;

/// Result of fully unwrapping a gift-wrapped message.
#[derive(Debug, Clone)]
pub struct UnwrappedMessage {
    /// The sender's real public key, authenticated via the seal.
    pub sender_pubkey: String,

    /// The id of the outer gift wrap (for deduplication bookkeeping).
    pub wrapper_id: String,

    /// The unsigned plaintext rumor.
    pub rumor: Event,
}

fn randomized_created_at() -> i64 {
    Utc::now().timestamp() - rand::thread_rng().gen_range(0..TIMESTAMP_RANDOM_WINDOW)
}

/// Builds an unsigned rumor addressed to `recipient_pubkey_hex`.
///
/// # Errors
///
/// Returns an error if canonical serialization fails.
pub fn create_rumor(
    sender: &Keypair,
    recipient_pubkey_hex: &str,
    kind: u16,
    content: &str,
) -> Result<Event> {
    Event::new(
        &sender.pubkey_hex(),
        kind,
        vec![vec!["p".to_string(), recipient_pubkey_hex.to_string()]],
        content.to_string(),
    )
}

/// Seals a rumor: encrypts its JSON for the recipient and signs the
/// resulting kind 13 event with the sender's real (or context-derived)
/// key. `created_at` is randomized into the past.
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidEvent`] if the rumor is signed, or an
/// encryption/signing error.
pub fn seal_rumor(rumor: &Event, sender: &Keypair, recipient_pubkey_hex: &str) -> Result<Event> {
    if rumor.sig.is_some() {
        return Err(ProtocolError::InvalidEvent(
            "rumor must be unsigned".to_string(),
        ));
    }

    let plaintext = rumor.to_json()?;
    let content = nip44::encrypt(&plaintext, recipient_pubkey_hex, sender)?;

    let mut seal = Event::with_created_at(
        &sender.pubkey_hex(),
        KIND_SEAL,
        vec![],
        content,
        randomized_created_at(),
    )?;
    seal.sign(sender)?;
    Ok(seal)
}

/// Wraps a seal in the outer kind 1059 envelope.
///
/// A fresh ephemeral keypair encrypts and signs the wrap, then goes out
/// of scope — it exists only for this one event. The recipient is named
/// in a `p` tag so their client can subscribe to inbound wraps.
///
/// # Errors
///
/// Returns an encryption or signing error.
pub fn wrap_seal(seal: &Event, recipient_pubkey_hex: &str) -> Result<Event> {
    let ephemeral = Keypair::generate();
    let content = nip44::encrypt(&seal.to_json()?, recipient_pubkey_hex, &ephemeral)?;

    let mut wrap = Event::with_created_at(
        &ephemeral.pubkey_hex(),
        KIND_GIFT_WRAP,
        vec![vec!["p".to_string(), recipient_pubkey_hex.to_string()]],
        content,
        randomized_created_at(),
    )?;
    wrap.sign(&ephemeral)?;
    Ok(wrap)
}

/// Composes rumor → seal → gift wrap in one call.
///
/// # Errors
///
/// Propagates any layer's construction error.
pub fn wrap_message(
    sender: &Keypair,
    recipient_pubkey_hex: &str,
    kind: u16,
    content: &str,
) -> Result<Event> {
    let rumor = create_rumor(sender, recipient_pubkey_hex, kind, content)?;
    let seal = seal_rumor(&rumor, sender, recipient_pubkey_hex)?;
    wrap_seal(&seal, recipient_pubkey_hex)
}

/// Removes the outer gift-wrap layer, yielding the verified seal.
///
/// Decrypts the wrap's content using the wrap's own (ephemeral) pubkey as
/// the sender and the recipient's private key, then verifies the seal's
/// signature.
///
/// # Errors
///
/// Returns [`ProtocolError::DecryptionFailed`] when the wrap is not
/// addressed to this key (or was tampered with), and
/// [`ProtocolError::Unwrap`] for wrong kinds or a malformed inner layer.
pub fn unwrap(gift_wrap: &Event, recipient: &Keypair) -> Result<Event> {
    if gift_wrap.kind != KIND_GIFT_WRAP {
        return Err(ProtocolError::Unwrap(format!(
            "expected kind {KIND_GIFT_WRAP}, got {}",
            gift_wrap.kind
        )));
    }

    let plaintext = nip44::decrypt(&gift_wrap.content, &gift_wrap.pubkey, recipient)?;
    let seal = Event::from_json(&plaintext)
        .map_err(|e| ProtocolError::Unwrap(format!("inner layer is not a valid event: {e}")))?;

    if seal.kind != KIND_SEAL {
        return Err(ProtocolError::Unwrap(format!(
            "inner layer is kind {}, expected {KIND_SEAL}",
            seal.kind
        )));
    }
    seal.verify()?;

    Ok(seal)
}

/// Opens a verified seal, yielding the rumor.
///
/// Decrypts the seal's content using the seal's pubkey as the sender. The
/// rumor's pubkey must match the seal's signer — an authentic seal must
/// not be able to smuggle a rumor attributed to someone else.
///
/// # Errors
///
/// Returns [`ProtocolError::DecryptionFailed`] on authentication failure
/// and [`ProtocolError::Open`] for shape or attribution violations.
pub fn open(seal: &Event, recipient: &Keypair) -> Result<Event> {
    if seal.kind != KIND_SEAL {
        return Err(ProtocolError::Open(format!(
            "expected kind {KIND_SEAL}, got {}",
            seal.kind
        )));
    }

    let plaintext = nip44::decrypt(&seal.content, &seal.pubkey, recipient)?;
    let rumor = Event::from_json(&plaintext)
        .map_err(|e| ProtocolError::Open(format!("sealed payload is not a valid event: {e}")))?;

    if rumor.pubkey != seal.pubkey {
        return Err(ProtocolError::Open(
            "rumor pubkey does not match seal signer".to_string(),
        ));
    }

    Ok(rumor)
}

/// Fully unwraps a gift wrap: outer layer, then seal, strictly in order.
///
/// # Errors
///
/// Propagates [`unwrap`] and [`open`] errors; the caller drops the event
/// on any of them.
pub fn unwrap_and_open(gift_wrap: &Event, recipient: &Keypair) -> Result<UnwrappedMessage> {
    let seal = unwrap(gift_wrap, recipient).inspect_err(|e| {
        debug!(wrapper_id = %gift_wrap.id, error = %e, "dropping gift wrap");
    })?;
    let rumor = open(&seal, recipient).inspect_err(|e| {
        debug!(wrapper_id = %gift_wrap.id, error = %e, "dropping sealed message");
    })?;

    Ok(UnwrappedMessage {
        sender_pubkey: seal.pubkey,
        wrapper_id: gift_wrap.id.clone(),
        rumor,
    })
}
