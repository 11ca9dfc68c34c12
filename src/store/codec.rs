//! Text encoding for string-keyed header maps.
//!
//! Stores persist headers in a `TEXT` column through a [`HeaderCodec`]. The
//! default [`JsonHeaderCodec`] writes a JSON object; deployments that already
//! hold rows in another format plug in their own codec.

use std::collections::BTreeMap;
use std::fmt;

use super::error::{StoreError, StoreResult};

/// String-keyed message headers, ordered for deterministic encoding.
pub type Headers = BTreeMap<String, String>;

/// Encode/decode contract for header maps.
pub trait HeaderCodec: fmt::Debug + Send + Sync {
    /// Encodes headers into the text stored in the `headers` column.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Serialization`] when encoding fails.
    fn encode(&self, headers: &Headers) -> StoreResult<String>;

    /// Decodes the text stored in the `headers` column.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Serialization`] when the text is not valid for
    /// this codec.
    fn decode(&self, text: &str) -> StoreResult<Headers>;
}

/// Header codec writing a flat JSON object.
///
/// # Examples
///
/// ```
/// use quay::store::{HeaderCodec, Headers, JsonHeaderCodec};
///
/// let mut headers = Headers::new();
/// headers.insert("message-id".to_owned(), "42".to_owned());
///
/// let text = JsonHeaderCodec.encode(&headers).expect("encodable");
/// assert_eq!(text, r#"{"message-id":"42"}"#);
/// assert_eq!(JsonHeaderCodec.decode(&text).expect("decodable"), headers);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JsonHeaderCodec;

impl HeaderCodec for JsonHeaderCodec {
    fn encode(&self, headers: &Headers) -> StoreResult<String> {
        serde_json::to_string(headers).map_err(|e| StoreError::serialization(e.to_string()))
    }

    fn decode(&self, text: &str) -> StoreResult<Headers> {
        serde_json::from_str(text).map_err(|e| StoreError::serialization(e.to_string()))
    }
}
