//! NIP-19 bech32 encoding for keys (`npub…` / `nsec…`).
//!
//! Human-readable, checksummed key encoding. The charset and generator
//! constants come from the `bech32` crate and match every other deployed
//! implementation; the checksums are not self-describing, so exact
//! reproduction is what makes `npub` strings interchangeable between
//! clients.

use bech32::{Bech32, Hrp};

use crate::error::{ProtocolError, Result};

/// Human-readable part for public keys.
pub const NPUB_HRP: &str = "npub";

/// Human-readable part for secret keys.
pub const NSEC_HRP: &str = "nsec";

/// Encodes arbitrary bytes under the given human-readable part.
///
/// The data is regrouped from 8-bit to 5-bit words and joined as
/// `hrp + "1" + payload + checksum`.
///
/// # Errors
///
/// Returns [`ProtocolError::MalformedInput`] if the human-readable part is
/// empty, non-ASCII, or the encoded string would exceed the bech32 length
/// limit.
pub fn encode(hrp: &str, data: &[u8]) -> Result<String> {
    let hrp = Hrp::parse(hrp)
        .map_err(|e| ProtocolError::MalformedInput(format!("invalid bech32 hrp: {e}")))?;
    bech32::encode::<Bech32>(hrp, data)
        .map_err(|e| ProtocolError::MalformedInput(format!("bech32 encoding failed: {e}")))
}

/// Decodes a bech32 string into its human-readable part and payload bytes.
///
/// # Errors
///
/// Returns [`ProtocolError::MalformedInput`] if the separator is absent,
/// any character is outside the charset, fewer than 6 checksum symbols
/// remain, or the checksum does not verify.
pub fn decode(s: &str) -> Result<(String, Vec<u8>)> {
    let (hrp, data) = bech32::decode(s)
        .map_err(|e| ProtocolError::MalformedInput(format!("bech32 decoding failed: {e}")))?;
    Ok((hrp.to_lowercase(), data))
}

/// Encodes a 32-byte x-only public key as `npub1…`.
#[must_use]
pub fn encode_npub(pubkey: &[u8; 32]) -> String {
    const HRP: Hrp = Hrp::parse_unchecked(NPUB_HRP);
    bech32::encode::<Bech32>(HRP, pubkey)
        .expect("bech32 encode of 32-byte pubkey with valid HRP is infallible")
}

/// Encodes a 32-byte secret key as `nsec1…`.
#[must_use]
pub fn encode_nsec(secret: &[u8; 32]) -> String {
    const HRP: Hrp = Hrp::parse_unchecked(NSEC_HRP);
    bech32::encode::<Bech32>(HRP, secret)
        .expect("bech32 encode of 32-byte secret with valid HRP is infallible")
}

/// Decodes an `npub1…` string into raw public key bytes.
///
/// # Errors
///
/// Returns [`ProtocolError::MalformedInput`] if the string is not valid
/// bech32, carries the wrong human-readable part, or the payload is not
/// exactly 32 bytes.
pub fn decode_npub(npub: &str) -> Result<[u8; 32]> {
    decode_fixed(npub, NPUB_HRP)
}

/// Decodes an `nsec1…` string into raw secret key bytes.
///
/// # Errors
///
/// Returns [`ProtocolError::MalformedInput`] under the same conditions as
/// [`decode_npub`].
pub fn decode_nsec(nsec: &str) -> Result<[u8; 32]> {
    decode_fixed(nsec, NSEC_HRP)
}

fn decode_fixed(s: &str, expected_hrp: &str) -> Result<[u8; 32]> {
    let (hrp, data) = decode(s)?;
    if hrp != expected_hrp {
        return Err(ProtocolError::MalformedInput(format!(
            "expected hrp '{expected_hrp}', got '{hrp}'"
        )));
    }
    data.try_into().map_err(|bytes: Vec<u8>| {
        ProtocolError::MalformedInput(format!("expected 32-byte payload, got {}", bytes.len()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrip() {
        let data = [0xABu8; 32];
        let encoded = encode("test", &data).unwrap();
        let (hrp, decoded) = decode(&encoded).unwrap();

        assert_eq!(hrp, "test");
        assert_eq!(decoded, data);
    }

    #[test]
    fn npub_roundtrip() {
        let pubkey = [0x42u8; 32];
        let npub = encode_npub(&pubkey);

        assert!(npub.starts_with("npub1"));
        assert_eq!(decode_npub(&npub).unwrap(), pubkey);
    }

    #[test]
    fn nsec_roundtrip() {
        let secret = [0x07u8; 32];
        let nsec = encode_nsec(&secret);

        assert!(nsec.starts_with("nsec1"));
        assert_eq!(decode_nsec(&nsec).unwrap(), secret);
    }

    #[test]
    fn decode_rejects_missing_separator() {
        assert!(decode("nosigilhere").is_err());
    }

    #[test]
    fn decode_rejects_bad_checksum() {
        let mut npub = encode_npub(&[0x42u8; 32]);
        // Corrupt the final checksum character
        let last = npub.pop().unwrap();
        let replacement = if last == 'q' { 'p' } else { 'q' };
        npub.push(replacement);

        assert!(decode(&npub).is_err());
    }

    #[test]
    fn decode_rejects_invalid_charset() {
        // 'i' and 'o' are outside the bech32 charset
        assert!(decode("test1ioioio").is_err());
    }

    #[test]
    fn decode_npub_rejects_nsec_hrp() {
        let nsec = encode_nsec(&[0x07u8; 32]);
        let result = decode_npub(&nsec);

        assert!(matches!(result, Err(ProtocolError::MalformedInput(_))));
    }

    #[test]
    fn decode_npub_rejects_short_payload() {
        let encoded = encode(NPUB_HRP, &[0u8; 16]).unwrap();
        assert!(decode_npub(&encoded).is_err());
    }

    #[test]
    fn encode_rejects_empty_hrp() {
        assert!(encode("", &[0u8; 4]).is_err());
    }

    #[test]
    fn encode_rejects_non_ascii_hrp() {
        assert!(encode("héllo", &[0u8; 4]).is_err());
    }

    #[test]
    fn known_vector_npub() {
        // Reference vector: pubkey of the NIP-19 example nsec
        let pubkey =
            hex::decode("3bf0c63fcb93463407af97a5e5ee64fa883d107ef9e558472c4eb9aaaefa459d")
                .unwrap();
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&pubkey);

        assert_eq!(
            encode_npub(&bytes),
            "npub180cvv07tjdrrgpa0j7j7tmnyl2yr6yr7l8j4s3evf6u64th6gkwsyjh6w6"
        );
    }
}
