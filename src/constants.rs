// Length of freshly generated ceremony challenges.
pub const CHALLENGE_SIZE_BYTES: usize = 32;

// Shortest challenge accepted back from a stored session.
pub const CHALLENGE_MIN_BYTES: usize = 16;

// Milliseconds the client is told to wait for the authenticator.
pub const AUTHENTICATOR_TIMEOUT: u32 = 60000;

// Seconds a SessionData remains valid after Begin.
pub const SESSION_TTL_SECS: u64 = 300;

// https://www.w3.org/TR/webauthn-2/#user-handle
pub const USER_ID_MAX_BYTES: usize = 64;

pub const CLIENT_DATA_TYPE_CREATE: &str = "webauthn.create";
pub const CLIENT_DATA_TYPE_GET: &str = "webauthn.get";
pub const PUBLIC_KEY_CREDENTIAL_TYPE: &str = "public-key";

// rpIdHash (32) + flags (1) + signCount (4)
pub const AUTHENTICATOR_DATA_MIN_BYTES: usize = 37;
