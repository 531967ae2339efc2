//! Ceremony challenges.

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::base64_data::Base64UrlSafeData;
use crate::constants::CHALLENGE_SIZE_BYTES;
use crate::error::{WebauthnError, WebauthnResult};

/// A one-time random value bound to a single ceremony. Compared bytewise.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge(Base64UrlSafeData);

impl Challenge {
    /// Generate a fresh challenge from the thread local CSPRNG, which is
    /// periodically reseeded from the operating system.
    pub fn generate() -> WebauthnResult<Self> {
        let mut rng = rand::thread_rng();
        let mut buf = [0u8; CHALLENGE_SIZE_BYTES];
        rng.try_fill_bytes(&mut buf).map_err(|e| {
            error!(?e, "unable to draw challenge bytes");
            WebauthnError::EntropyUnavailable
        })?;
        Ok(Challenge(Base64UrlSafeData(buf.to_vec())))
    }

    /// Wrap known challenge bytes. Only useful for replaying captured ceremonies.
    pub fn new(bytes: Vec<u8>) -> Self {
        Challenge(Base64UrlSafeData(bytes))
    }

    /// The raw challenge bytes.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl AsRef<[u8]> for Challenge {
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl From<Challenge> for Base64UrlSafeData {
    fn from(c: Challenge) -> Self {
        c.0
    }
}

impl std::fmt::Debug for Challenge {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "Challenge({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn challenges_are_fresh() {
        let a = Challenge::generate().unwrap();
        let b = Challenge::generate().unwrap();
        assert_eq!(a.as_bytes().len(), CHALLENGE_SIZE_BYTES);
        assert_ne!(a, b);
    }

    #[test]
    fn challenge_serialises_as_base64url() {
        let c = Challenge::new(vec![0xfb, 0xff, 0xbf]);
        assert_eq!(serde_json::to_string(&c).unwrap(), "\"-_-_\"");
    }
}
