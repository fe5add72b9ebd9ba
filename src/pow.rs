//! Proof-of-work spam deterrence for public channel events.
//!
//! Difficulty is the count of leading zero bits in an event's id. Mining
//! attaches a `["nonce", value, target]` tag and recomputes the id until
//! the target is reached or the iteration cap fires. The cap is mandatory
//! — it is the cancellation mechanism — and mining never runs on the
//! event-delivery path; use [`mine_detached`] to push it onto a blocking
//! worker and await the result.

use chrono::Utc;
use tracing::debug;

use crate::error::{ProtocolError, Result};
use crate::event::Event;

/// Tag name carrying the mining nonce and committed difficulty.
pub const NONCE_TAG: &str = "nonce";

/// Counts leading zero bits of a hex-encoded event id.
///
/// Four bits per nibble; the first nonzero nibble contributes its own
/// leading-zero-bit count and stops the scan.
#[must_use]
pub fn difficulty(id_hex: &str) -> u32 {
    let mut bits = 0;
    for c in id_hex.chars() {
        let Some(nibble) = c.to_digit(16) else {
            break;
        };
        if nibble == 0 {
            bits += 4;
        } else {
            bits += nibble.leading_zeros() - 28;
            break;
        }
    }
    bits
}

/// Returns `true` if the event carries a nonce tag.
///
/// Callers that require proof-of-work must reject events without one;
/// [`validate`] deliberately passes them through.
#[must_use]
pub fn has_nonce_tag(event: &Event) -> bool {
    event
        .tags
        .iter()
        .any(|tag| tag.first().map(String::as_str) == Some(NONCE_TAG))
}

/// Mines `event` until its id has at least `target` leading zero bits.
///
/// Each iteration replaces the nonce tag, refreshes `created_at`, and
/// recomputes the id. Any existing signature is cleared: the mined event
/// must be re-signed. A `target` of zero short-circuits to success with
/// the event unchanged.
///
/// Expected work is `2^target` attempts, so this is CPU-bound for
/// user-perceptible durations at realistic targets; call it through
/// [`mine_detached`] anywhere near the event-delivery path.
///
/// # Errors
///
/// Returns [`ProtocolError::MiningExhausted`] after `max_iterations`
/// attempts without success.
pub fn mine(event: Event, target: u32, max_iterations: u64) -> Result<Event> {
    if target == 0 {
        return Ok(event);
    }

    let mut event = event;
    event.sig = None;
    event.tags.retain(|tag| tag.first().map(String::as_str) != Some(NONCE_TAG));
    event.tags.push(vec![
        NONCE_TAG.to_string(),
        String::new(),
        target.to_string(),
    ]);
    let nonce_slot = event.tags.len() - 1;

    for nonce in 0..max_iterations {
        event.tags[nonce_slot][1] = nonce.to_string();
        event.created_at = Utc::now().timestamp();
        event.id = event.compute_id()?;

        if difficulty(&event.id) >= target {
            debug!(target, nonce, id = %event.id, "proof-of-work target reached");
            return Ok(event);
        }
    }

    Err(ProtocolError::MiningExhausted {
        iterations: max_iterations,
    })
}

/// Mines on a blocking worker thread, keeping the async runtime free.
///
/// # Errors
///
/// Returns [`ProtocolError::MiningExhausted`] when the iteration cap is
/// reached, or [`ProtocolError::Signing`] if the worker is cancelled.
pub async fn mine_detached(event: Event, target: u32, max_iterations: u64) -> Result<Event> {
    tokio::task::spawn_blocking(move || mine(event, target, max_iterations))
        .await
        .map_err(|e| ProtocolError::Signing(format!("mining worker failed: {e}")))?
}

/// Validates an event's proof-of-work against a minimum difficulty.
///
/// A minimum of zero always passes. An event without a nonce tag is "not
/// proof-of-work" and passes through; callers enforcing proof-of-work
/// must additionally check [`has_nonce_tag`]. When present, the achieved
/// difficulty must meet the minimum, and a committed difficulty in the
/// tag must itself meet the minimum — an accidental overshoot of a low
/// commitment does not count, and a malformed commitment is rejected
/// rather than ignored.
#[must_use]
pub fn validate(event: &Event, minimum: u32) -> bool {
    if minimum == 0 {
        return true;
    }

    let Some(nonce_tag) = event
        .tags
        .iter()
        .find(|tag| tag.first().map(String::as_str) == Some(NONCE_TAG))
    else {
        // Not proof-of-work at all; pass-through by design
        return true;
    };

    if difficulty(&event.id) < minimum {
        return false;
    }

    match nonce_tag.get(2) {
        None => true,
        Some(committed) => committed
            .parse::<u32>()
            .map_or(false, |c| c >= minimum),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::KIND_EPHEMERAL_MESSAGE;
    use crate::keys::Keypair;

    fn test_event() -> Event {
        let keys = Keypair::generate();
        Event::new(
            &keys.pubkey_hex(),
            KIND_EPHEMERAL_MESSAGE,
            vec![],
            "hello channel".to_string(),
        )
        .unwrap()
    }

    #[test]
    fn difficulty_of_all_zero_prefix() {
        assert_eq!(difficulty(&"0".repeat(64)), 256);
        assert_eq!(difficulty("00000fff"), 20);
    }

    #[test]
    fn difficulty_nibble_boundaries() {
        assert_eq!(difficulty("1fff"), 3);
        assert_eq!(difficulty("2fff"), 2);
        assert_eq!(difficulty("3fff"), 2);
        assert_eq!(difficulty("4fff"), 1);
        assert_eq!(difficulty("7fff"), 1);
        assert_eq!(difficulty("8fff"), 0);
        assert_eq!(difficulty("ffff"), 0);
        assert_eq!(difficulty("01ff"), 7);
    }

    #[test]
    fn difficulty_of_empty_string() {
        assert_eq!(difficulty(""), 0);
    }

    #[test]
    fn twenty_bits_means_five_zero_nibbles() {
        let id = format!("00000{}", "f".repeat(59));
        assert!(difficulty(&id) >= 20);

        let id = format!("0000{}", "f".repeat(60));
        assert!(difficulty(&id) < 20);
    }

    #[test]
    fn mine_reaches_low_target() {
        let event = test_event();
        let mined = mine(event, 8, 2_000_000).unwrap();

        assert!(difficulty(&mined.id) >= 8);
        assert!(has_nonce_tag(&mined));
        assert_eq!(mined.id, mined.compute_id().unwrap());
    }

    #[test]
    fn mine_zero_target_returns_unchanged() {
        let event = test_event();
        let original_id = event.id.clone();
        let mined = mine(event, 0, 10).unwrap();

        assert_eq!(mined.id, original_id);
        assert!(!has_nonce_tag(&mined));
    }

    #[test]
    fn mine_exhausts_iteration_cap() {
        let event = test_event();
        // 2^60 bits in 4 attempts is effectively impossible
        let result = mine(event, 60, 4);

        assert!(matches!(
            result,
            Err(ProtocolError::MiningExhausted { iterations: 4 })
        ));
    }

    #[test]
    fn mine_replaces_existing_nonce_tag() {
        let mut event = test_event();
        event.tags.push(vec![
            NONCE_TAG.to_string(),
            "999".to_string(),
            "1".to_string(),
        ]);

        let mined = mine(event, 4, 2_000_000).unwrap();
        let nonce_tags: Vec<_> = mined
            .tags
            .iter()
            .filter(|tag| tag.first().map(String::as_str) == Some(NONCE_TAG))
            .collect();

        assert_eq!(nonce_tags.len(), 1);
        assert_eq!(nonce_tags[0][2], "4");
    }

    #[test]
    fn mined_event_validates_against_target() {
        let mined = mine(test_event(), 8, 2_000_000).unwrap();
        assert!(validate(&mined, 8));
    }

    #[test]
    fn validate_zero_minimum_always_passes() {
        assert!(validate(&test_event(), 0));
    }

    #[test]
    fn validate_missing_nonce_tag_passes_through() {
        // Lenient by design: no nonce tag means "not proof-of-work"
        let event = test_event();
        assert!(!has_nonce_tag(&event));
        assert!(validate(&event, 16));
    }

    #[test]
    fn validate_rejects_insufficient_difficulty() {
        let mined = mine(test_event(), 4, 2_000_000).unwrap();
        // A 4-bit id will essentially never reach 64 bits
        assert!(!validate(&mined, 64));
    }

    #[test]
    fn validate_rejects_low_commitment() {
        // Mined higher than committed: the low commitment disqualifies it
        let mut mined = mine(test_event(), 8, 2_000_000).unwrap();
        for tag in &mut mined.tags {
            if tag.first().map(String::as_str) == Some(NONCE_TAG) {
                tag[2] = "1".to_string();
            }
        }

        assert!(!validate(&mined, 8));
    }

    #[test]
    fn validate_rejects_malformed_commitment() {
        let mut mined = mine(test_event(), 4, 2_000_000).unwrap();
        for tag in &mut mined.tags {
            if tag.first().map(String::as_str) == Some(NONCE_TAG) {
                tag[2] = "not-a-number".to_string();
            }
        }

        assert!(!validate(&mined, 4));
    }

    #[tokio::test]
    async fn mine_detached_reaches_target() {
        let mined = mine_detached(test_event(), 8, 2_000_000).await.unwrap();
        assert!(difficulty(&mined.id) >= 8);
    }
}
