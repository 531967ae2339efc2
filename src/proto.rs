//! JSON protocol structs exchanged with the browser's credential API.
//!
//! Every binary field travels as base64url text via [`Base64UrlSafeData`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::convert::TryFrom;

use crate::base64_data::Base64UrlSafeData;
use crate::error::WebauthnError;

/// A credential ID type. Opaque bytes chosen by the authenticator.
pub type CredentialID = Base64UrlSafeData;

/// Client extension inputs, passed through to the browser untouched.
pub type RequestExtensions = BTreeMap<String, serde_json::Value>;

/// A COSE signature algorithm identifier.
/// <https://www.iana.org/assignments/cose/cose.xhtml#algorithms>
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum COSEAlgorithm {
    /// ECDSA over P-256 with SHA-256.
    ES256 = -7,
    /// ECDSA over P-384 with SHA-384.
    ES384 = -35,
    /// ECDSA over P-521 with SHA-512.
    ES512 = -36,
    /// RSASSA-PKCS1-v1_5 with SHA-256.
    RS256 = -257,
    /// RSASSA-PKCS1-v1_5 with SHA-384.
    RS384 = -258,
    /// RSASSA-PKCS1-v1_5 with SHA-512.
    RS512 = -259,
    /// Pure EdDSA, Ed25519 or Ed448 depending on the key curve.
    EDDSA = -8,
    /// RSASSA-PKCS1-v1_5 with SHA-1. Only ever seen in TPM attestation quotes.
    INSECURE_RS1 = -65535,
}

impl TryFrom<i128> for COSEAlgorithm {
    type Error = WebauthnError;

    fn try_from(i: i128) -> Result<Self, Self::Error> {
        match i {
            -7 => Ok(COSEAlgorithm::ES256),
            -35 => Ok(COSEAlgorithm::ES384),
            -36 => Ok(COSEAlgorithm::ES512),
            -257 => Ok(COSEAlgorithm::RS256),
            -258 => Ok(COSEAlgorithm::RS384),
            -259 => Ok(COSEAlgorithm::RS512),
            -8 => Ok(COSEAlgorithm::EDDSA),
            -65535 => Ok(COSEAlgorithm::INSECURE_RS1),
            _ => Err(WebauthnError::COSEKeyInvalidAlgorithm),
        }
    }
}

impl From<COSEAlgorithm> for i64 {
    fn from(a: COSEAlgorithm) -> i64 {
        a as i32 as i64
    }
}

impl COSEAlgorithm {
    /// The algorithms offered to authenticators unless configured otherwise.
    pub fn secure_algs() -> Vec<COSEAlgorithm> {
        vec![
            COSEAlgorithm::ES256,
            COSEAlgorithm::RS256,
            COSEAlgorithm::EDDSA,
        ]
    }
}

/// <https://w3c.github.io/webauthn/#enumdef-userverificationrequirement>
///
/// Verification means the authenticator performed an extra check of who the user
/// is, such as a PIN or a biometric, on top of proving presence with a touch.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserVerificationPolicy {
    /// Fail the ceremony unless the UV flag is set.
    Required,
    /// Ask for verification, accept its absence.
    #[default]
    Preferred,
    /// Ask the authenticator not to verify. Some authenticators verify anyway.
    Discouraged,
}

/// The rp entity of creation options.
#[derive(Debug, Serialize, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelyingParty {
    /// Human readable name shown by the browser.
    pub name: String,
    /// The rp id credentials are scoped to.
    pub id: String,
    /// An optional image for the relying party.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

/// User Entity
#[derive(Debug, Serialize, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// The user's opaque handle. Must be stable and free of personal information.
    pub id: Base64UrlSafeData,
    /// The user's account name.
    pub name: String,
    /// The user's preferred name for display.
    pub display_name: String,
    /// An optional image for the user.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

/// One entry of pubKeyCredParams.
#[derive(Debug, Serialize, Clone, Deserialize, PartialEq, Eq)]
pub struct PubKeyCredParams {
    /// Always "public-key".
    #[serde(rename = "type")]
    pub type_: String,
    /// The COSE algorithm identifier.
    pub alg: i64,
}

/// <https://www.w3.org/TR/webauthn/#enumdef-attestationconveyancepreference>
#[derive(Debug, Serialize, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AttestationConveyancePreference {
    /// Attestation is not wanted.
    #[default]
    None,
    /// The client may replace attestation with an anonymised form.
    Indirect,
    /// Attestation exactly as the authenticator produced it.
    Direct,
}

/// <https://www.w3.org/TR/webauthn/#enumdef-authenticatortransport>
#[derive(Debug, Serialize, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuthenticatorTransport {
    /// USB token.
    Usb,
    /// NFC token.
    Nfc,
    /// Bluetooth low energy token.
    Ble,
    /// Platform authenticator built into the client device.
    Internal,
    /// Another device reached over a hybrid (caBLE) channel.
    Hybrid,
}

/// <https://www.w3.org/TR/webauthn/#dictdef-publickeycredentialdescriptor>
#[derive(Debug, Serialize, Clone, Deserialize, PartialEq, Eq)]
pub struct PublicKeyCredentialDescriptor {
    /// Always "public-key".
    #[serde(rename = "type")]
    pub type_: String,
    /// Id of an existing credential.
    pub id: CredentialID,
    /// Transport hints. Not enforced.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transports: Option<Vec<AuthenticatorTransport>>,
}

/// <https://www.w3.org/TR/webauthn/#attachment>
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum AuthenticatorAttachment {
    /// An authenticator built into the client device.
    #[serde(rename = "platform")]
    Platform,
    /// A removable authenticator such as a security key.
    #[serde(rename = "cross-platform")]
    CrossPlatform,
}

/// <https://www.w3.org/TR/webauthn/#dictdef-authenticatorselectioncriteria>
#[derive(Debug, Serialize, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorSelectionCriteria {
    /// Attachment hint. Not enforced.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authenticator_attachment: Option<AuthenticatorAttachment>,
    /// Resident key hint. Can not be validated server side.
    pub require_resident_key: bool,
    /// The user verification level requested during registration.
    pub user_verification: UserVerificationPolicy,
}

/// The data collected and hashed by the client.
/// <https://www.w3.org/TR/webauthn-2/#dictdef-collectedclientdata>
#[derive(Debug, Serialize, Clone, Deserialize)]
pub struct CollectedClientData {
    /// "webauthn.create" or "webauthn.get"
    #[serde(rename = "type")]
    pub type_: String,
    /// The challenge, base64url encoded by the client.
    pub challenge: Base64UrlSafeData,
    /// The origin as the browser understood it.
    pub origin: url::Url,
    /// True when the call came from a cross origin iframe.
    #[serde(rename = "crossOrigin", skip_serializing_if = "Option::is_none")]
    pub cross_origin: Option<bool>,
    /// Token binding state, unused.
    #[serde(rename = "tokenBinding", skip_serializing_if = "Option::is_none")]
    pub token_binding: Option<TokenBinding>,
    /// Clients may add members; never compare against a template.
    #[serde(flatten)]
    pub unknown_keys: BTreeMap<String, serde_json::value::Value>,
}

/// Token binding state reported by the client.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TokenBinding {
    /// status
    pub status: String,
    /// id
    pub id: Option<String>,
}

/// <https://w3c.github.io/webauthn/#dictionary-makecredentialoptions>
#[derive(Debug, Serialize, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyCredentialCreationOptions {
    /// Who is asking.
    pub rp: RelyingParty,
    /// The user.
    pub user: User,
    /// Fresh random bytes for this ceremony.
    pub challenge: Base64UrlSafeData,
    /// Acceptable credential algorithms, most preferred first.
    pub pub_key_cred_params: Vec<PubKeyCredParams>,
    /// Milliseconds before the client abandons the operation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u32>,
    /// How much attestation the relying party wants.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attestation: Option<AttestationConveyancePreference>,
    /// Credentials already bound to this user, which the authenticator should refuse.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclude_credentials: Option<Vec<PublicKeyCredentialDescriptor>>,
    /// Constraints on which authenticators may take part.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authenticator_selection: Option<AuthenticatorSelectionCriteria>,
    /// Client extension inputs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<RequestExtensions>,
}

/// The registration challenge sent to the browser, to be passed to
/// `navigator.credentials.create()`.
#[derive(Debug, Serialize, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreationChallengeResponse {
    /// Creation options for the browser.
    pub public_key: PublicKeyCredentialCreationOptions,
}

/// <https://w3c.github.io/webauthn/#authenticatorattestationresponse>
#[derive(Debug, Serialize, Clone, Deserialize)]
pub struct AuthenticatorAttestationResponseRaw {
    /// CBOR attestation object.
    #[serde(rename = "attestationObject")]
    pub attestation_object: Base64UrlSafeData,
    /// The exact client data bytes that were hashed.
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: Base64UrlSafeData,
    /// <https://w3c.github.io/webauthn/#dom-authenticatorattestationresponse-gettransports>
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transports: Option<Vec<AuthenticatorTransport>>,
}

/// A client response to a registration challenge.
/// <https://w3c.github.io/webauthn/#iface-pkcredential>
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RegisterPublicKeyCredential {
    /// The credential id as base64url text. Never trusted; the id is read from
    /// the attested credential data.
    pub id: String,
    /// The credential id as bytes. Never trusted, as above.
    #[serde(rename = "rawId")]
    pub raw_id: Base64UrlSafeData,
    /// <https://w3c.github.io/webauthn/#dom-publickeycredential-response>
    pub response: AuthenticatorAttestationResponseRaw,
    /// Must be "public-key".
    #[serde(rename = "type")]
    pub type_: String,
}

/// Options for `navigator.credentials.get()`.
#[derive(Debug, Serialize, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyCredentialRequestOptions {
    /// Fresh random bytes for this ceremony.
    pub challenge: Base64UrlSafeData,
    /// Milliseconds before the client abandons the operation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u32>,
    /// The rp id the assertion must be scoped to.
    pub rp_id: String,
    /// Credentials that may answer. An empty list permits discoverable credentials.
    pub allow_credentials: Vec<PublicKeyCredentialDescriptor>,
    /// The user verification requirement sent to the client.
    pub user_verification: UserVerificationPolicy,
    /// Client extension inputs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<RequestExtensions>,
}

/// The authentication challenge sent to the browser, to be passed to
/// `navigator.credentials.get()`.
#[derive(Debug, Serialize, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestChallengeResponse {
    /// Request options for the browser.
    pub public_key: PublicKeyCredentialRequestOptions,
}

/// <https://w3c.github.io/webauthn/#authenticatorassertionresponse>
#[derive(Debug, Serialize, Clone, Deserialize)]
pub struct AuthenticatorAssertionResponseRaw {
    /// The authenticator data exactly as signed.
    #[serde(rename = "authenticatorData")]
    pub authenticator_data: Base64UrlSafeData,
    /// The exact client data bytes that were hashed.
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: Base64UrlSafeData,
    /// Signature over authenticatorData || sha256(clientDataJSON).
    pub signature: Base64UrlSafeData,
    /// The user handle the authenticator stored with the credential.
    #[serde(rename = "userHandle", default)]
    pub user_handle: Option<Base64UrlSafeData>,
}

/// A client response to an authentication challenge.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PublicKeyCredential {
    /// The credential id as base64url text.
    pub id: String,
    /// The credential id as bytes.
    #[serde(rename = "rawId")]
    pub raw_id: Base64UrlSafeData,
    /// <https://w3c.github.io/webauthn/#dom-publickeycredential-response>
    pub response: AuthenticatorAssertionResponseRaw,
    /// Must be "public-key".
    #[serde(rename = "type")]
    pub type_: String,
}
