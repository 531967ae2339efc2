//! Ceremony state handed to the caller between Begin and Finish.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::base64_data::Base64UrlSafeData;
use crate::challenge::Challenge;
use crate::error::{WebauthnError, WebauthnResult};
use crate::proto::{COSEAlgorithm, CredentialID, UserVerificationPolicy};

/// The server side record of one ceremony. The caller keeps it in a [`SessionStore`]
/// (or a signed cookie, or a database row) and returns it at Finish.
///
/// It must be consumed at most once. A second Finish with the same session is a replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionData {
    /// The challenge issued at Begin.
    pub challenge: Challenge,
    /// The user the ceremony was started for.
    pub user_id: Base64UrlSafeData,
    /// Credentials allowed to answer an authentication. Empty for registration.
    pub allowed_credential_ids: Vec<CredentialID>,
    /// The user verification requirement of this ceremony.
    pub user_verification: UserVerificationPolicy,
    /// Algorithms offered in pubKeyCredParams. Empty for authentication.
    #[serde(default)]
    pub credential_algorithms: Vec<COSEAlgorithm>,
    /// After this instant the session is no longer accepted.
    pub expires: SystemTime,
}

impl SessionData {
    /// True once `now` has reached the expiry.
    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        now >= self.expires
    }

    pub(crate) fn assert_live(&self) -> WebauthnResult<()> {
        if self.is_expired_at(SystemTime::now()) {
            debug!(expires = ?self.expires, "session expired");
            Err(WebauthnError::SessionExpired)
        } else {
            Ok(())
        }
    }
}

/// Where a caller keeps [`SessionData`] between Begin and Finish.
///
/// `load_and_invalidate` must remove the session atomically with reading it, so that
/// concurrent Finish calls presenting the same token see it at most once.
pub trait SessionStore {
    /// The opaque handle given to the client.
    type Token;
    /// Storage failure.
    type Error;

    /// Keep `session`, returning the token the client will present at Finish.
    fn store(&self, session: SessionData) -> Result<Self::Token, Self::Error>;

    /// Take the session for `token`, removing it. `Ok(None)` if it is absent or was
    /// already taken.
    fn load_and_invalidate(&self, token: &Self::Token) -> Result<Option<SessionData>, Self::Error>;
}
