//! The capability a caller's user record must provide to take part in a ceremony.

use crate::interface::CredentialDescriptor;

/// A user that can register and authenticate credentials.
///
/// The id is an opaque, stable handle of 1 to 64 bytes. It is stored on the
/// authenticator, so it must not be derived from an email address or username.
pub trait WebauthnUser {
    /// The user handle.
    fn webauthn_id(&self) -> &[u8];

    /// An account name, such as "claire@example.com".
    fn webauthn_name(&self) -> &str;

    /// A friendly name, such as "Claire".
    fn webauthn_display_name(&self) -> &str;

    /// An icon URL for the account, if any.
    fn webauthn_icon(&self) -> Option<&str> {
        None
    }

    /// Credentials already registered to this user.
    fn webauthn_credentials(&self) -> Vec<CredentialDescriptor>;
}
