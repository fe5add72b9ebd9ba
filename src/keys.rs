//! secp256k1 key management for protocol events.
//!
//! Provides [`Keypair`] for both long-lived identities and single-use
//! ephemeral keys, BIP-340 Schnorr signing/verification, and the x-only
//! Diffie-Hellman agreement used by the NIP-44 cipher. Secret material is
//! zeroized on drop and never printed by `Debug`.

use std::sync::LazyLock;

use secp256k1::rand::rngs::OsRng;
use secp256k1::schnorr::Signature;
use secp256k1::{
    All, Keypair as SecpKeypair, Message, Parity, PublicKey, Scalar, Secp256k1, SecretKey,
    XOnlyPublicKey,
};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::{ProtocolError, Result};
use crate::nip19;

/// Global secp256k1 context for cryptographic operations.
///
/// Creating a `Secp256k1` context is expensive as it precomputes tables
/// for signing and verification. This shared context is initialized once
/// and reused across all operations. The context is `Send + Sync`.
pub static SECP: LazyLock<Secp256k1<All>> = LazyLock::new(Secp256k1::new);

/// A secp256k1 keypair with an x-only (BIP-340) public key.
///
/// Used both for the long-lived account identity and for the single-use
/// ephemeral keys that sign gift wraps. The secret key bytes are
/// automatically zeroized when dropped; ephemeral instances are simply
/// dropped after the one event they sign.
///
/// # Example
///
/// ```
/// use drift_core::keys::Keypair;
///
/// let keypair = Keypair::generate();
/// assert_eq!(keypair.pubkey_hex().len(), 64);
/// ```
#[derive(ZeroizeOnDrop)]
pub struct Keypair {
    /// The secret key bytes (zeroized on drop).
    secret_bytes: [u8; 32],

    /// Cached x-only public key bytes (not sensitive, skip zeroization).
    #[zeroize(skip)]
    pubkey_bytes: [u8; 32],
}

impl Keypair {
    /// Generates a new random keypair.
    ///
    /// Uses the operating system's secure random number generator.
    #[must_use]
    pub fn generate() -> Self {
        let keypair = SecpKeypair::new(&SECP, &mut OsRng);

        let secret_bytes = keypair.secret_key().secret_bytes();
        let (public_key, _parity) = keypair.x_only_public_key();
        let pubkey_bytes = public_key.serialize();

        Self {
            secret_bytes,
            pubkey_bytes,
        }
    }

    /// Creates a keypair from raw secret key bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::KeyDerivation`] if the bytes are not a
    /// valid secret scalar (zero, or at/above the curve order).
    pub fn from_secret_bytes(secret_bytes: [u8; 32]) -> Result<Self> {
        let secret_key = SecretKey::from_slice(&secret_bytes)
            .map_err(|e| ProtocolError::KeyDerivation(e.to_string()))?;
        let keypair = SecpKeypair::from_secret_key(&SECP, &secret_key);
        let (public_key, _parity) = keypair.x_only_public_key();
        let pubkey_bytes = public_key.serialize();

        Ok(Self {
            secret_bytes,
            pubkey_bytes,
        })
    }

    /// Imports a keypair from an `nsec1…` bech32 string.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MalformedInput`] for invalid bech32 and
    /// [`ProtocolError::KeyDerivation`] for an out-of-range scalar.
    pub fn from_nsec(nsec: &str) -> Result<Self> {
        let mut secret_bytes = nip19::decode_nsec(nsec)?;
        let result = Self::from_secret_bytes(secret_bytes);
        secret_bytes.zeroize();
        result
    }

    /// Exports the secret key as an `nsec1…` bech32 string.
    ///
    /// Only use for user-initiated backup; the returned string is as
    /// sensitive as the key itself.
    #[must_use]
    pub fn to_nsec(&self) -> String {
        nip19::encode_nsec(&self.secret_bytes)
    }

    /// Returns the public key as an `npub1…` bech32 string.
    #[must_use]
    pub fn npub(&self) -> String {
        nip19::encode_npub(&self.pubkey_bytes)
    }

    /// Returns the public key as a 64-character hex string, the format
    /// used in event `pubkey` fields.
    #[must_use]
    pub fn pubkey_hex(&self) -> String {
        hex::encode(self.pubkey_bytes)
    }

    /// Returns the raw x-only public key bytes.
    #[must_use]
    pub const fn pubkey_bytes(&self) -> [u8; 32] {
        self.pubkey_bytes
    }

    /// Signs a 32-byte message hash with a BIP-340 Schnorr signature.
    ///
    /// Returns the 64-byte signature as a 128-character hex string.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Signing`] if the stored secret bytes fail
    /// to reconstruct a keypair.
    pub fn sign(&self, message_hash: &[u8; 32]) -> Result<String> {
        let mut secret_bytes_copy = self.secret_bytes;

        let result = (|| {
            let secret_key = SecretKey::from_slice(&secret_bytes_copy)
                .map_err(|e| ProtocolError::Signing(e.to_string()))?;
            let keypair = SecpKeypair::from_secret_key(&SECP, &secret_key);
            let message = Message::from_digest(*message_hash);
            let signature = SECP.sign_schnorr(&message, &keypair);
            Ok(hex::encode(signature.serialize()))
        })();

        // Zeroize the temporary copy regardless of success/failure
        secret_bytes_copy.zeroize();

        result
    }

    /// Returns the raw secret key bytes wrapped in `Zeroizing`.
    #[must_use]
    pub(crate) fn secret_bytes(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(self.secret_bytes)
    }
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print the secret key
        f.debug_struct("Keypair")
            .field("pubkey", &self.pubkey_hex())
            .finish()
    }
}

/// Verifies a BIP-340 Schnorr signature over a 32-byte message hash.
///
/// # Errors
///
/// Returns [`ProtocolError::MalformedInput`] for hex/length problems with
/// the signature or public key and [`ProtocolError::InvalidSignature`]
/// when the signature does not verify.
pub fn verify_schnorr(message_hash: &[u8; 32], sig_hex: &str, pubkey_hex: &str) -> Result<()> {
    let sig_bytes: [u8; 64] = hex::decode(sig_hex)?
        .try_into()
        .map_err(|_| ProtocolError::MalformedInput("signature must be 64 bytes".to_string()))?;
    let signature = Signature::from_slice(&sig_bytes)
        .map_err(|e| ProtocolError::MalformedInput(format!("invalid signature: {e}")))?;

    let pubkey = parse_xonly(pubkey_hex)?;
    let message = Message::from_digest(*message_hash);

    SECP.verify_schnorr(&signature, &message, &pubkey)
        .map_err(|_| ProtocolError::InvalidSignature)
}

/// Computes the x-only Diffie-Hellman shared point.
///
/// Lifts the counterparty's x-only public key to a full curve point with
/// the requested y-parity, multiplies by the local secret scalar, and
/// returns the compressed 33-byte point (parity prefix + x-coordinate).
/// The compressed point, not the bare x-coordinate, is the key-derivation
/// input for compatibility with peer implementations.
///
/// X-only keys are parity-ambiguous: encryption always lifts to even-y,
/// and decryption retries with odd-y when the first attempt fails to
/// authenticate. This trial order matches deployed peers and must not
/// change.
///
/// # Errors
///
/// Returns [`ProtocolError::KeyDerivation`] if either key is invalid or
/// the multiplication degenerates (e.g. zero scalar).
pub fn shared_point(
    secret_bytes: &[u8; 32],
    counterparty_xonly: &[u8; 32],
    parity: Parity,
) -> Result<[u8; 33]> {
    // Validate the scalar through SecretKey before treating it as a tweak
    SecretKey::from_slice(secret_bytes)
        .map_err(|e| ProtocolError::KeyDerivation(e.to_string()))?;
    let scalar = Scalar::from_be_bytes(*secret_bytes)
        .map_err(|e| ProtocolError::KeyDerivation(e.to_string()))?;

    let xonly = XOnlyPublicKey::from_slice(counterparty_xonly)
        .map_err(|e| ProtocolError::KeyDerivation(format!("invalid public key: {e}")))?;
    let full = PublicKey::from_x_only_public_key(xonly, parity);

    let shared = full
        .mul_tweak(&SECP, &scalar)
        .map_err(|e| ProtocolError::KeyDerivation(format!("point multiplication failed: {e}")))?;

    Ok(shared.serialize())
}

/// Checks whether `bytes` is a valid secret scalar (32 bytes, nonzero,
/// below the curve order).
#[must_use]
pub fn is_valid_private_key(bytes: &[u8]) -> bool {
    bytes.len() == 32 && SecretKey::from_slice(bytes).is_ok()
}

/// Checks whether `bytes` is a valid x-only public key (32 bytes that
/// decode to a curve point).
#[must_use]
pub fn is_valid_public_key(bytes: &[u8]) -> bool {
    bytes.len() == 32 && XOnlyPublicKey::from_slice(bytes).is_ok()
}

/// Parses a 64-character hex string into an x-only public key.
pub(crate) fn parse_xonly(pubkey_hex: &str) -> Result<XOnlyPublicKey> {
    let pubkey_bytes: [u8; 32] = hex::decode(pubkey_hex)?
        .try_into()
        .map_err(|_| ProtocolError::MalformedInput("public key must be 32 bytes".to_string()))?;
    XOnlyPublicKey::from_slice(&pubkey_bytes)
        .map_err(|e| ProtocolError::MalformedInput(format!("invalid public key: {e}")))
}
