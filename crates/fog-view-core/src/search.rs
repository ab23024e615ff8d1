//! TxOut search outcomes
//!
//! ## Size Invariant
//!
//! Every outcome for a given search key encodes to the same number of bytes,
//! whatever its result code:
//! - the result code is always a fixed 4-byte little-endian field, in the
//!   explicit byte codec and under serde alike (never a varint)
//! - non-Found outcomes carry a zero-filled ciphertext of the same length a
//!   Found ciphertext has
//!
//! ## Byte format
//! ```text
//! key_len:u32 | key | code:u32 | ciphertext_len:u32 | ciphertext
//! ```

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{Error, Result, SearchKey};

/// Result code of a single search key lookup.
///
/// Code 0 is reserved and never produced by the service. Unknown codes from
/// newer peers decode to [`TxOutSearchResultCode::Unrecognized`] rather than
/// failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxOutSearchResultCode {
    Found,
    NotFound,
    /// Malformed key. Permanent: retrying the same key cannot succeed.
    BadSearchKey,
    /// Lookup failed inside the service. Retry later.
    InternalError,
    /// The service shed this lookup. Retry later with the same key.
    RateLimited,
    Unrecognized(u32),
}

impl TxOutSearchResultCode {
    /// Width of the encoded code in bytes
    pub const ENCODED_LEN: usize = 4;

    /// Client may retry the same key later
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::InternalError | Self::RateLimited)
    }

    /// Retrying the same key will never change the outcome
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::BadSearchKey)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Found => "found",
            Self::NotFound => "not_found",
            Self::BadSearchKey => "bad_search_key",
            Self::InternalError => "internal_error",
            Self::RateLimited => "rate_limited",
            Self::Unrecognized(_) => "unrecognized",
        }
    }

    pub fn to_le_bytes(self) -> [u8; Self::ENCODED_LEN] {
        u32::from(self).to_le_bytes()
    }

    pub fn from_le_bytes(bytes: [u8; Self::ENCODED_LEN]) -> Self {
        Self::from(u32::from_le_bytes(bytes))
    }
}

impl From<u32> for TxOutSearchResultCode {
    fn from(value: u32) -> Self {
        match value {
            1 => Self::Found,
            2 => Self::NotFound,
            3 => Self::BadSearchKey,
            4 => Self::InternalError,
            5 => Self::RateLimited,
            other => Self::Unrecognized(other),
        }
    }
}

impl From<TxOutSearchResultCode> for u32 {
    fn from(code: TxOutSearchResultCode) -> Self {
        match code {
            TxOutSearchResultCode::Found => 1,
            TxOutSearchResultCode::NotFound => 2,
            TxOutSearchResultCode::BadSearchKey => 3,
            TxOutSearchResultCode::InternalError => 4,
            TxOutSearchResultCode::RateLimited => 5,
            TxOutSearchResultCode::Unrecognized(other) => other,
        }
    }
}

impl std::fmt::Display for TxOutSearchResultCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unrecognized(code) => write!(f, "unrecognized({})", code),
            other => f.write_str(other.as_str()),
        }
    }
}

// Serialized as a 4-byte array, not an integer: serde formats are free to
// varint-encode integers, but never arrays of u8.
impl Serialize for TxOutSearchResultCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_le_bytes().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TxOutSearchResultCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let bytes = <[u8; Self::ENCODED_LEN]>::deserialize(deserializer)?;
        Ok(Self::from_le_bytes(bytes))
    }
}

/// Outcome of one search key
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutSearchResult {
    /// Echo of the requested key
    pub search_key: SearchKey,
    pub result_code: TxOutSearchResultCode,
    /// Encrypted TxOut record when Found, zero padding otherwise
    pub ciphertext: Vec<u8>,
}

impl TxOutSearchResult {
    const LEN_PREFIX: usize = 4;

    pub fn found(search_key: SearchKey, ciphertext: Vec<u8>) -> Self {
        Self {
            search_key,
            result_code: TxOutSearchResultCode::Found,
            ciphertext,
        }
    }

    /// Outcome without a payload; the ciphertext is `ciphertext_len` zero bytes
    pub fn padded(
        search_key: SearchKey,
        result_code: TxOutSearchResultCode,
        ciphertext_len: usize,
    ) -> Self {
        Self {
            search_key,
            result_code,
            ciphertext: vec![0u8; ciphertext_len],
        }
    }

    pub fn is_found(&self) -> bool {
        self.result_code == TxOutSearchResultCode::Found
    }

    /// Size of [`Self::to_bytes`] output
    pub fn encoded_len(&self) -> usize {
        Self::LEN_PREFIX
            + self.search_key.len()
            + TxOutSearchResultCode::ENCODED_LEN
            + Self::LEN_PREFIX
            + self.ciphertext.len()
    }

    /// Serialize with fixed-width integers throughout
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(self.encoded_len());
        data.extend_from_slice(&(self.search_key.len() as u32).to_le_bytes());
        data.extend_from_slice(&self.search_key);
        data.extend_from_slice(&self.result_code.to_le_bytes());
        data.extend_from_slice(&(self.ciphertext.len() as u32).to_le_bytes());
        data.extend_from_slice(&self.ciphertext);
        data
    }

    /// Parse bytes produced by [`Self::to_bytes`]; the input must be consumed exactly
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(data);

        let key_len = reader.read_u32("search key length")? as usize;
        let search_key = reader.take("search key", key_len)?.to_vec();
        let code = reader.take_array::<{ TxOutSearchResultCode::ENCODED_LEN }>("result code")?;
        let ct_len = reader.read_u32("ciphertext length")? as usize;
        let ciphertext = reader.take("ciphertext", ct_len)?.to_vec();

        if reader.remaining() != 0 {
            return Err(Error::TrailingBytes {
                what: "search result",
                count: reader.remaining(),
            });
        }

        Ok(Self {
            search_key,
            result_code: TxOutSearchResultCode::from_le_bytes(code),
            ciphertext,
        })
    }
}

// Keys and ciphertexts are sensitive; only print their sizes.
impl std::fmt::Debug for TxOutSearchResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxOutSearchResult")
            .field("search_key_len", &self.search_key.len())
            .field("result_code", &self.result_code)
            .field("ciphertext_len", &self.ciphertext.len())
            .finish()
    }
}

struct Reader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    fn take(&mut self, what: &'static str, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(Error::Truncated {
                what,
                expected: len,
                actual: self.remaining(),
            });
        }
        let slice = &self.data[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self, what: &'static str) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(what, N)?);
        Ok(out)
    }

    fn read_u32(&mut self, what: &'static str) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take_array::<4>(what)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_CODES: [TxOutSearchResultCode; 5] = [
        TxOutSearchResultCode::Found,
        TxOutSearchResultCode::NotFound,
        TxOutSearchResultCode::BadSearchKey,
        TxOutSearchResultCode::InternalError,
        TxOutSearchResultCode::RateLimited,
    ];

    fn outcome(code: TxOutSearchResultCode) -> TxOutSearchResult {
        let key = vec![0xabu8; 16];
        match code {
            TxOutSearchResultCode::Found => TxOutSearchResult::found(key, vec![0x5au8; 176]),
            other => TxOutSearchResult::padded(key, other, 176),
        }
    }

    #[test]
    fn test_code_values() {
        let raw: Vec<u32> = ALL_CODES.iter().map(|c| u32::from(*c)).collect();
        assert_eq!(raw, vec![1, 2, 3, 4, 5]);
        for code in ALL_CODES {
            assert_eq!(TxOutSearchResultCode::from(u32::from(code)), code);
        }
    }

    #[test]
    fn test_reserved_and_unknown_codes_decode() {
        assert_eq!(
            TxOutSearchResultCode::from(0),
            TxOutSearchResultCode::Unrecognized(0)
        );
        assert_eq!(
            TxOutSearchResultCode::from(42),
            TxOutSearchResultCode::Unrecognized(42)
        );
        assert_eq!(u32::from(TxOutSearchResultCode::Unrecognized(42)), 42);
        assert_eq!(TxOutSearchResultCode::Unrecognized(42).to_string(), "unrecognized(42)");
    }

    #[test]
    fn test_retry_classification() {
        assert!(TxOutSearchResultCode::RateLimited.is_retryable());
        assert!(TxOutSearchResultCode::InternalError.is_retryable());
        assert!(!TxOutSearchResultCode::BadSearchKey.is_retryable());
        assert!(TxOutSearchResultCode::BadSearchKey.is_permanent());
        assert!(!TxOutSearchResultCode::NotFound.is_permanent());
    }

    #[test]
    fn test_outcome_size_constant_across_codes() {
        let sizes: Vec<usize> = ALL_CODES.iter().map(|c| outcome(*c).to_bytes().len()).collect();
        assert!(sizes.iter().all(|s| *s == sizes[0]), "sizes differ: {:?}", sizes);
        assert_eq!(sizes[0], outcome(TxOutSearchResultCode::Found).encoded_len());
    }

    #[test]
    fn test_outcome_size_constant_under_varint_bincode() {
        use bincode::Options;

        let options = bincode::DefaultOptions::new().with_varint_encoding();
        let sizes: Vec<usize> = ALL_CODES
            .iter()
            .map(|c| options.serialize(&outcome(*c)).unwrap().len())
            .collect();
        assert!(sizes.iter().all(|s| *s == sizes[0]), "sizes differ: {:?}", sizes);
    }

    #[test]
    fn test_outcome_size_constant_under_json() {
        let codes = [
            TxOutSearchResultCode::NotFound,
            TxOutSearchResultCode::RateLimited,
        ];
        let sizes: Vec<usize> = codes
            .iter()
            .map(|c| serde_json::to_vec(&outcome(*c)).unwrap().len())
            .collect();
        assert_eq!(sizes[0], sizes[1]);
    }

    #[test]
    fn test_code_serializes_as_fixed_bytes() {
        let bytes = bincode::serialize(&TxOutSearchResultCode::NotFound).unwrap();
        assert_eq!(bytes, vec![2, 0, 0, 0]);
        let decoded: TxOutSearchResultCode = bincode::deserialize(&[9, 0, 0, 0]).unwrap();
        assert_eq!(decoded, TxOutSearchResultCode::Unrecognized(9));
    }

    #[test]
    fn test_from_bytes_parses_found() {
        let original = outcome(TxOutSearchResultCode::Found);
        let parsed = TxOutSearchResult::from_bytes(&original.to_bytes()).unwrap();
        assert_eq!(parsed, original);
        assert!(parsed.is_found());
    }

    #[test]
    fn test_from_bytes_truncated() {
        let bytes = outcome(TxOutSearchResultCode::NotFound).to_bytes();
        let result = TxOutSearchResult::from_bytes(&bytes[..bytes.len() - 1]);
        assert!(matches!(
            result,
            Err(Error::Truncated { what: "ciphertext", .. })
        ));

        let result = TxOutSearchResult::from_bytes(&[1, 0]);
        assert!(matches!(
            result,
            Err(Error::Truncated { what: "search key length", expected: 4, actual: 2 })
        ));
    }

    #[test]
    fn test_from_bytes_rejects_trailing() {
        let mut bytes = outcome(TxOutSearchResultCode::NotFound).to_bytes();
        bytes.push(0);
        let result = TxOutSearchResult::from_bytes(&bytes);
        assert!(matches!(result, Err(Error::TrailingBytes { count: 1, .. })));
    }

    #[test]
    fn test_debug_hides_key_material() {
        let rendered = format!("{:?}", outcome(TxOutSearchResultCode::Found));
        assert!(rendered.contains("search_key_len: 16"));
        assert!(!rendered.contains("171"), "key byte 0xab leaked: {}", rendered);
    }
}
