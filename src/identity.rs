//! Deterministic per-context identity derivation.
//!
//! Given a persistent device seed and a context label (a topic or
//! channel name), derives a stable [`Keypair`] distinct from the account
//! identity, so activity in one context cannot be linked to another.
//! Candidates come from HMAC-SHA256 over the label and a counter until
//! one lands in the valid scalar range; a SHA-256 chain serves as a
//! bounded fallback. The seed itself is owned and stored by the caller.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::error::{ProtocolError, Result};
use crate::keys::Keypair;

type HmacSha256 = Hmac<Sha256>;

/// Candidate attempts per derivation strategy. A valid scalar is found
/// on the first try except with negligible probability (~2^-128 per
/// candidate), so the bound exists for termination, not for practice.
const MAX_CANDIDATE_ATTEMPTS: u32 = 64;

/// Derives a deterministic keypair for `context` from `seed`.
///
/// The same seed and context always yield the same keypair; different
/// contexts yield unlinkable ones.
///
/// # Errors
///
/// Returns [`ProtocolError::KeyDerivation`] only if every HMAC candidate
/// and every fallback hash candidate is out of range, which does not
/// happen with honest inputs.
pub fn derive_keypair(seed: &[u8], context: &str) -> Result<Keypair> {
    for counter in 0..MAX_CANDIDATE_ATTEMPTS {
        let mut mac = HmacSha256::new_from_slice(seed)
            .map_err(|e| ProtocolError::KeyDerivation(e.to_string()))?;
        mac.update(context.as_bytes());
        mac.update(&counter.to_be_bytes());

        let mut candidate: [u8; 32] = mac.finalize().into_bytes().into();
        let result = Keypair::from_secret_bytes(candidate);
        candidate.zeroize();
        if let Ok(keypair) = result {
            return Ok(keypair);
        }
    }

    // Hash-chain fallback: rehash until a valid scalar appears
    let mut hasher = Sha256::new();
    hasher.update(seed);
    hasher.update(context.as_bytes());
    let mut candidate: [u8; 32] = hasher.finalize().into();

    for _ in 0..MAX_CANDIDATE_ATTEMPTS {
        candidate = Sha256::digest(candidate).into();
        let result = Keypair::from_secret_bytes(candidate);
        if let Ok(keypair) = result {
            candidate.zeroize();
            return Ok(keypair);
        }
    }
    candidate.zeroize();

    Err(ProtocolError::KeyDerivation(
        "no valid scalar found for context".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic() {
        let seed = b"device-seed-0123456789abcdef";

        let a = derive_keypair(seed, "topic:rust").unwrap();
        let b = derive_keypair(seed, "topic:rust").unwrap();

        assert_eq!(a.pubkey_hex(), b.pubkey_hex());
    }

    #[test]
    fn different_contexts_yield_different_keys() {
        let seed = b"device-seed-0123456789abcdef";

        let a = derive_keypair(seed, "topic:rust").unwrap();
        let b = derive_keypair(seed, "topic:go").unwrap();

        assert_ne!(a.pubkey_hex(), b.pubkey_hex());
    }

    #[test]
    fn different_seeds_yield_different_keys() {
        let a = derive_keypair(b"seed-one", "topic").unwrap();
        let b = derive_keypair(b"seed-two", "topic").unwrap();

        assert_ne!(a.pubkey_hex(), b.pubkey_hex());
    }

    #[test]
    fn derived_key_signs_and_verifies() {
        let keypair = derive_keypair(b"seed", "context").unwrap();
        let hash = [0x11u8; 32];

        let sig = keypair.sign(&hash).unwrap();
        assert!(crate::keys::verify_schnorr(&hash, &sig, &keypair.pubkey_hex()).is_ok());
    }

    #[test]
    fn empty_seed_still_derives() {
        // An empty seed is a caller bug but must not panic or loop
        assert!(derive_keypair(b"", "context").is_ok());
    }

    #[test]
    fn empty_context_still_derives() {
        assert!(derive_keypair(b"seed", "").is_ok());
    }
}
