//! Fragmentation and reassembly for oversized payloads.
//!
//! Payloads too large for one transport frame are split into ordered
//! fragments sharing a random message key. Reassembly tolerates
//! out-of-order and duplicated arrivals, and abandoned transfers are
//! purged after a timeout so adversarial partial sends cannot grow memory
//! without bound.
//!
//! Two independently-keyed transports (mesh radio and relay) share this
//! wire format but must each own their own [`FragmentReassembler`], so
//! one transport's in-flight state can never be corrupted or starved by
//! the other's traffic.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ProtocolError, Result};

/// How long a partial transfer is retained before being abandoned.
pub const DEFAULT_FRAGMENT_TIMEOUT: Duration = Duration::from_secs(30);

/// One piece of a fragmented payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Fragment {
    /// Random key shared by all fragments of one logical message.
    pub message_key: String,

    /// Zero-based position of this fragment.
    pub index: u32,

    /// Total number of fragments in the message.
    pub total: u32,

    /// This fragment's slice of the payload.
    pub data: Vec<u8>,
}

/// Splits `payload` into ordered fragments of at most
/// `max_fragment_size` bytes under a fresh random message key.
///
/// An empty payload yields a single empty fragment so the receiver still
/// observes a complete message.
///
/// # Errors
///
/// Returns [`ProtocolError::MalformedInput`] if `max_fragment_size` is
/// zero.
pub fn fragment(payload: &[u8], max_fragment_size: usize) -> Result<Vec<Fragment>> {
    if max_fragment_size == 0 {
        return Err(ProtocolError::MalformedInput(
            "fragment size must be nonzero".to_string(),
        ));
    }

    let mut key_bytes = [0u8; 8];
    OsRng.fill_bytes(&mut key_bytes);
    let message_key = hex::encode(key_bytes);

    let chunks: Vec<&[u8]> = if payload.is_empty() {
        vec![payload]
    } else {
        payload.chunks(max_fragment_size).collect()
    };
    let total = u32::try_from(chunks.len())
        .map_err(|_| ProtocolError::MalformedInput("payload yields too many fragments".to_string()))?;

    Ok(chunks
        .into_iter()
        .enumerate()
        .map(|(index, data)| Fragment {
            message_key: message_key.clone(),
            index: u32::try_from(index).unwrap_or(u32::MAX),
            total,
            data: data.to_vec(),
        })
        .collect())
}

struct FragmentState {
    total: u32,
    received: HashMap<u32, Vec<u8>>,
    first_seen_at: Instant,
}

/// Reassembles fragmented payloads from out-of-order, possibly-duplicated
/// arrivals.
///
/// Shared state is serialized behind a single mutex; the struct is safe
/// to call from multiple relay-listener tasks concurrently. Construct one
/// per transport and pass references — there is deliberately no global
/// instance.
pub struct FragmentReassembler {
    timeout: Duration,
    states: Mutex<HashMap<String, FragmentState>>,
}

impl FragmentReassembler {
    /// Creates a reassembler with the default 30-second abandonment
    /// timeout.
    #[must_use]
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_FRAGMENT_TIMEOUT)
    }

    /// Creates a reassembler with a custom abandonment timeout.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Stores one fragment, returning the assembled payload once all
    /// indices are present.
    ///
    /// Duplicate fragments are idempotent no-ops. Fragments with a zero
    /// total, an out-of-range index, or a total that disagrees with the
    /// existing state for the same message key are dropped.
    pub fn handle_fragment(&self, fragment: &Fragment) -> Option<Vec<u8>> {
        if fragment.total == 0 || fragment.index >= fragment.total {
            debug!(
                message_key = %fragment.message_key,
                index = fragment.index,
                total = fragment.total,
                "dropping out-of-range fragment"
            );
            return None;
        }

        let mut states = self.states.lock().expect("fragment state lock poisoned");

        let state = states
            .entry(fragment.message_key.clone())
            .or_insert_with(|| FragmentState {
                total: fragment.total,
                received: HashMap::new(),
                first_seen_at: Instant::now(),
            });

        if state.total != fragment.total {
            debug!(
                message_key = %fragment.message_key,
                claimed = fragment.total,
                expected = state.total,
                "dropping fragment with inconsistent total"
            );
            return None;
        }

        state
            .received
            .entry(fragment.index)
            .or_insert_with(|| fragment.data.clone());

        if state.received.len() < state.total as usize {
            return None;
        }

        // All indices 0..total are present: assemble in order and drop state
        let state = states
            .remove(&fragment.message_key)
            .expect("state present under held lock");
        let mut payload = Vec::new();
        for index in 0..state.total {
            payload.extend_from_slice(&state.received[&index]);
        }
        Some(payload)
    }

    /// Removes every partial transfer older than the timeout, regardless
    /// of progress. Returns the number purged.
    ///
    /// Partial transfers are expected under unreliable delivery, so this
    /// is silent cleanup, not an error.
    pub fn purge_expired(&self) -> usize {
        let mut states = self.states.lock().expect("fragment state lock poisoned");
        let before = states.len();
        states.retain(|key, state| {
            let keep = state.first_seen_at.elapsed() <= self.timeout;
            if !keep {
                debug!(message_key = %key, received = state.received.len(), total = state.total,
                    "abandoning stale partial transfer");
            }
            keep
        });
        before - states.len()
    }

    /// Number of in-flight partial transfers.
    pub fn pending(&self) -> usize {
        self.states.lock().expect("fragment state lock poisoned").len()
    }

    /// Spawns a background task that purges expired transfers on an
    /// interval. Aborts with the returned handle.
    #[must_use]
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let reassembler = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                reassembler.purge_expired();
            }
        })
    }
}

impl Default for FragmentReassembler {
    fn default() -> Self {
        Self::new()
    }
}
