//! Binary payload fields that travel as base64url text.
//!
//! Browsers and client libraries disagree on which base64 alphabet and padding
//! they emit, so decoding is forgiving while encoding is always URL safe
//! without padding, as the webauthn wire format expects.

use serde::de::{Error, SeqAccess, Unexpected, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::convert::TryFrom;
use std::fmt;

static ACCEPTED_ALPHABETS: &[base64::Config] = &[
    base64::URL_SAFE_NO_PAD,
    base64::URL_SAFE,
    base64::STANDARD,
    base64::STANDARD_NO_PAD,
];

fn decode_forgiving(input: &str) -> Option<Vec<u8>> {
    ACCEPTED_ALPHABETS
        .iter()
        .find_map(|config| base64::decode_config(input, *config).ok())
}

/// Owned bytes that serialise as unpadded base64url, and deserialise from any
/// common base64 flavour or from a plain JSON array of octets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Base64UrlSafeData(pub Vec<u8>);

impl Base64UrlSafeData {
    /// Number of raw bytes held.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no bytes are held.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Base64UrlSafeData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&base64::encode_config(&self.0, base64::URL_SAFE_NO_PAD))
    }
}

impl From<Vec<u8>> for Base64UrlSafeData {
    fn from(v: Vec<u8>) -> Self {
        Base64UrlSafeData(v)
    }
}

impl From<&[u8]> for Base64UrlSafeData {
    fn from(v: &[u8]) -> Self {
        Base64UrlSafeData(v.to_vec())
    }
}

impl From<Base64UrlSafeData> for Vec<u8> {
    fn from(d: Base64UrlSafeData) -> Self {
        d.0
    }
}

impl AsRef<[u8]> for Base64UrlSafeData {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl std::borrow::Borrow<[u8]> for Base64UrlSafeData {
    fn borrow(&self) -> &[u8] {
        self.0.as_slice()
    }
}

impl TryFrom<&str> for Base64UrlSafeData {
    type Error = base64::DecodeError;

    fn try_from(v: &str) -> Result<Self, Self::Error> {
        match decode_forgiving(v) {
            Some(data) => Ok(Base64UrlSafeData(data)),
            // Report the error from the canonical alphabet.
            None => base64::decode_config(v, base64::URL_SAFE_NO_PAD).map(Base64UrlSafeData),
        }
    }
}

struct Base64UrlSafeDataVisitor;

impl<'de> Visitor<'de> for Base64UrlSafeDataVisitor {
    type Value = Base64UrlSafeData;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        write!(formatter, "a base64 encoded string or an array of bytes")
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: Error,
    {
        decode_forgiving(v)
            .map(Base64UrlSafeData)
            .ok_or_else(|| Error::invalid_value(Unexpected::Str(v), &self))
    }

    fn visit_bytes<E>(self, v: &[u8]) -> Result<Self::Value, E>
    where
        E: Error,
    {
        Ok(Base64UrlSafeData(v.to_vec()))
    }

    fn visit_seq<A>(self, mut v: A) -> Result<Self::Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut data = Vec::with_capacity(v.size_hint().unwrap_or(0));
        while let Some(i) = v.next_element::<u8>()? {
            data.push(i)
        }
        Ok(Base64UrlSafeData(data))
    }
}

impl<'de> Deserialize<'de> for Base64UrlSafeData {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(Base64UrlSafeDataVisitor)
    }
}

impl Serialize for Base64UrlSafeData {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
