//! Crockford base32 encoding.
//!
//! Every byte string that crosses a JSON boundary (salts, keys, uuids,
//! ciphertexts, hashes) is rendered with this alphabet, without padding.
//! Decoding is lenient in the Crockford way: lowercase is accepted, `O`
//! reads as `0`, `I`/`L` read as `1` and `U` reads as `V`. Trailing bits
//! that do not fill a whole byte are discarded.

use std::sync::LazyLock;

use data_encoding::{Encoding, Specification};

use crate::error::CryptoError;

const SYMBOLS: &str = "0123456789ABCDEFGHJKMNPQRSTVWXYZ";

static CROCKFORD: LazyLock<Encoding> = LazyLock::new(|| {
    let mut spec = Specification::new();
    spec.symbols.push_str(SYMBOLS);
    spec.check_trailing_bits = false;
    spec.translate.from.push_str("abcdefghjkmnpqrstvwxyzOoIiLlUu");
    spec.translate.to.push_str("ABCDEFGHJKMNPQRSTVWXYZ001111VV");
    spec.encoding().expect("crockford symbols form a valid base32 specification")
});

/// Encode bytes as Crockford base32.
pub fn encode(data: &[u8]) -> String {
    CROCKFORD.encode(data)
}

/// Decode a Crockford base32 string into `floor(len * 5 / 8)` bytes.
pub fn decode(encoded: &str) -> Result<Vec<u8>, CryptoError> {
    // every ASCII letter and digit is a symbol or translates to one
    if let Some(c) = encoded.chars().find(|c| !c.is_ascii_alphanumeric()) {
        return Err(CryptoError::InvalidEncoding(c));
    }
    let input = encoded.as_bytes();
    // a last symbol that only carries partial-byte bits is dropped
    let usable = match input.len() % 8 {
        1 | 3 | 6 => input.len() - 1,
        _ => input.len(),
    };
    CROCKFORD
        .decode(&input[..usable])
        .map_err(|e| CryptoError::InvalidEncoding(input.get(e.position).map_or('?', |b| *b as char)))
}

/// Decode into a fixed-size array, rejecting any other length.
pub fn decode_array<const N: usize>(encoded: &str) -> Result<[u8; N], CryptoError> {
    let bytes = decode(encoded)?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| CryptoError::InvalidLength { expected: N, got: bytes.len() })
}

/// Serde adapter for `Vec<u8>` fields rendered as Crockford base32.
pub mod serde_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(d)?;
        super::decode(&text).map_err(serde::de::Error::custom)
    }
}

/// Serde adapter for `[u8; N]` fields rendered as Crockford base32.
pub mod serde_array {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer, const N: usize>(bytes: &[u8; N], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>, const N: usize>(d: D) -> Result<[u8; N], D::Error> {
        let text = String::deserialize(d)?;
        super::decode_array::<N>(&text).map_err(serde::de::Error::custom)
    }
}
