//! Drift Core Library
//!
//! Cryptographic transport protocol stack for Drift - encrypted,
//! censorship-resistant messaging over the Nostr relay network, with a
//! store-and-forward path for peers unreachable over the local mesh
//! transport.
//!
//! The crate provides canonical event encoding and signing, secp256k1
//! key agreement, authenticated encryption, the three-layer gift-wrap
//! privacy protocol, proof-of-work spam deterrence, payload
//! fragmentation/reassembly, and event deduplication. Relay connections,
//! the mesh radio, and UI state live in the surrounding application and
//! consume this crate through [`event::Event`] and the fragment
//! interface.
//!
//! Outbound flow: encode → [`fragment`] if oversized → [`giftwrap`] each
//! piece (optionally [`pow`]-mined for public channels) → hand to the
//! relay transport. Inbound: [`dedup`] → [`giftwrap`] unwrap/open →
//! [`fragment`] reassembly → application.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![deny(unsafe_code)]

pub mod dedup;
pub mod error;
pub mod event;
pub mod fragment;
pub mod giftwrap;
pub mod identity;
pub mod keys;
pub mod nip19;
pub mod nip44;
pub mod pow;

pub use dedup::{EventDeduplicator, DEFAULT_DEDUP_CAPACITY};
pub use error::{ProtocolError, Result};
pub use event::Event;
pub use fragment::{Fragment, FragmentReassembler, DEFAULT_FRAGMENT_TIMEOUT};
pub use giftwrap::UnwrappedMessage;
pub use keys::Keypair;
