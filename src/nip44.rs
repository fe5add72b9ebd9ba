//! Authenticated encryption for event payloads.
//!
//! Derives a conversation key from the x-only ECDH shared point via
//! HKDF-SHA256 and encrypts with XChaCha20-Poly1305 (24-byte extended
//! nonce). The wire format is `"v2:" + base64url_nopad(nonce ‖ ciphertext
//! ‖ tag)`.
//!
//! Because x-only public keys are parity-ambiguous, encryption always
//! lifts the recipient key to even-y while decryption tries even-y first
//! and falls back to odd-y before reporting failure. This trial order is
//! a compatibility contract with deployed peers, not a cryptographic
//! choice, and must be preserved exactly.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use secp256k1::Parity;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::{ProtocolError, Result};
use crate::keys::{self, Keypair};

/// Version prefix carried by every ciphertext.
pub const VERSION_PREFIX: &str = "v2:";

/// HKDF info string binding derived keys to this scheme.
const HKDF_INFO: &[u8] = b"nip44-v2";

/// XChaCha20-Poly1305 nonce length in bytes.
const NONCE_LEN: usize = 24;

/// Poly1305 authentication tag length in bytes.
const TAG_LEN: usize = 16;

/// Derives the 32-byte conversation key from a compressed shared point.
///
/// HKDF-SHA256 with empty salt and info `"nip44-v2"`. A single expand
/// step suffices since only 32 bytes are needed.
#[must_use]
pub fn derive_conversation_key(shared_point: &[u8; 33]) -> Zeroizing<[u8; 32]> {
    let hk = Hkdf::<Sha256>::new(None, shared_point);
    let mut okm = Zeroizing::new([0u8; 32]);
    hk.expand(HKDF_INFO, okm.as_mut())
        .expect("32 bytes is a valid HKDF-SHA256 output length");
    okm
}

/// Encrypts `plaintext` for `recipient_pubkey_hex` using the sender's key.
///
/// The shared point is derived with the even-y lift of the recipient key.
///
/// # Errors
///
/// Returns [`ProtocolError::MalformedInput`] for a bad recipient key and
/// [`ProtocolError::Encryption`] if the cipher fails.
pub fn encrypt(plaintext: &str, recipient_pubkey_hex: &str, sender: &Keypair) -> Result<String> {
    let recipient = parse_pubkey(recipient_pubkey_hex)?;
    let shared = keys::shared_point(&sender.secret_bytes(), &recipient, Parity::Even)?;
    let key = derive_conversation_key(&shared);

    let cipher = XChaCha20Poly1305::new(Key::from_slice(key.as_ref()));
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(XNonce::from_slice(&nonce), plaintext.as_bytes())
        .map_err(|e| ProtocolError::Encryption(e.to_string()))?;

    let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    combined.extend_from_slice(&nonce);
    combined.extend_from_slice(&ciphertext);

    Ok(format!("{VERSION_PREFIX}{}", URL_SAFE_NO_PAD.encode(combined)))
}

/// Decrypts a `"v2:"`-prefixed ciphertext from `sender_pubkey_hex`.
///
/// Tries the even-y lift of the sender key first, then odd-y, and fails
/// with [`ProtocolError::DecryptionFailed`] only after both parities fail
/// authentication — the ordinary outcome for events addressed to someone
/// else.
///
/// # Errors
///
/// Returns [`ProtocolError::UnsupportedVersion`] for any other prefix,
/// [`ProtocolError::MalformedInput`] for undecodable payloads, and
/// [`ProtocolError::DecryptionFailed`] on authentication failure.
pub fn decrypt(ciphertext: &str, sender_pubkey_hex: &str, recipient: &Keypair) -> Result<String> {
    let Some(encoded) = ciphertext.strip_prefix(VERSION_PREFIX) else {
        let prefix: String = ciphertext.chars().take(8).collect();
        return Err(ProtocolError::UnsupportedVersion(prefix));
    };

    let combined = URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|e| ProtocolError::MalformedInput(format!("base64 decode failed: {e}")))?;
    if combined.len() < NONCE_LEN + TAG_LEN {
        return Err(ProtocolError::MalformedInput(
            "ciphertext shorter than nonce and tag".to_string(),
        ));
    }
    let (nonce, payload) = combined.split_at(NONCE_LEN);

    let sender = parse_pubkey(sender_pubkey_hex)?;

    // X-only keys are ambiguous: try even-y, then odd-y
    for parity in [Parity::Even, Parity::Odd] {
        let shared = keys::shared_point(&recipient.secret_bytes(), &sender, parity)?;
        let key = derive_conversation_key(&shared);
        let cipher = XChaCha20Poly1305::new(Key::from_slice(key.as_ref()));

        if let Ok(plaintext) = cipher.decrypt(XNonce::from_slice(nonce), payload) {
            return String::from_utf8(plaintext)
                .map_err(|e| ProtocolError::MalformedInput(format!("invalid UTF-8: {e}")));
        }
    }

    Err(ProtocolError::DecryptionFailed)
}

fn parse_pubkey(pubkey_hex: &str) -> Result<[u8; 32]> {
    hex::decode(pubkey_hex)?
        .try_into()
        .map_err(|_| ProtocolError::MalformedInput("public key must be 32 bytes".to_string()))
}
