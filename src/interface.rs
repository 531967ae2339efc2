//! Extended structs and representations for Webauthn operations. The credential
//! types in here are designed to be persisted by the caller and should not change.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::base64_data::Base64UrlSafeData;
use crate::constants::PUBLIC_KEY_CREDENTIAL_TYPE;
use crate::proto::*;

/// The 16 byte authenticator model identifier.
pub type Aaguid = [u8; 16];

/// An EDDSACurve identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EDDSACurve {
    // RFC 8152 table 22. OKP curves, valid only with EdDSA.
    /// Ed25519.
    ED25519 = 6,
    /// Ed448.
    ED448 = 7,
}

impl EDDSACurve {
    /// Length in bytes of the public key for this curve.
    pub fn coordinate_size(self) -> usize {
        match self {
            EDDSACurve::ED25519 => 32,
            EDDSACurve::ED448 => 57,
        }
    }
}

/// An ECDSACurve identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ECDSACurve {
    // RFC 8152 table 22. EC2 curves.
    /// NIST P-256, prime256v1 to openssl.
    SECP256R1 = 1,
    /// NIST P-384.
    SECP384R1 = 2,
    /// NIST P-521.
    SECP521R1 = 3,
}

impl ECDSACurve {
    /// Length in bytes of each affine coordinate on this curve.
    pub fn coordinate_size(self) -> usize {
        match self {
            ECDSACurve::SECP256R1 => 32,
            ECDSACurve::SECP384R1 => 48,
            ECDSACurve::SECP521R1 => 66,
        }
    }
}

/// A COSE EC2 public key: a point on a NIST prime curve.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct COSEEC2Key {
    /// Curve of the point.
    pub curve: ECDSACurve,
    /// Affine x, big endian.
    pub x: Base64UrlSafeData,
    /// Affine y, big endian.
    pub y: Base64UrlSafeData,
}

/// A COSE OKP public key, as used by EdDSA.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct COSEOKPKey {
    /// Curve of the point.
    pub curve: EDDSACurve,
    /// The encoded public key.
    pub x: Base64UrlSafeData,
}

/// A COSE RSA public key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct COSERSAKey {
    /// An RSA modulus, big endian.
    pub n: Base64UrlSafeData,
    /// An RSA exponent, big endian.
    pub e: Base64UrlSafeData,
}

/// The key material held within a COSE key.
#[allow(non_camel_case_types)]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum COSEKeyType {
    /// An octet key pair
    EC_OKP(COSEOKPKey),
    /// An elliptic curve point with x and y coordinates
    EC_EC2(COSEEC2Key),
    /// An RSA key
    RSA(COSERSAKey),
}

/// The numeric kty values used in the CBOR encoding.
#[allow(non_camel_case_types)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(i64)]
pub enum COSEKeyTypeId {
    /// OKP, a single public point.
    EC_OKP = 1,
    /// EC2, affine x and y.
    EC_EC2 = 2,
    /// RSA
    EC_RSA = 3,
}

/// A credential public key as provided by the authenticator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct COSEKey {
    /// The signature algorithm this key is bound to
    pub type_: COSEAlgorithm,
    /// Key material.
    pub key: COSEKeyType,
}

/// How the attestation statement vouched for the credential.
/// <https://www.w3.org/TR/webauthn-2/#sctn-attestation-types>
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttestationType {
    /// Signed by a vendor attestation certificate.
    Basic,
    /// Signed by the credential key itself.
    Self_,
    /// Signed by a key certified by an attestation CA.
    AttCa,
    /// Signed by an anonymisation CA.
    AnonCa,
    /// No attestation was supplied.
    None,
    /// A statement was supplied but could not be classified.
    Uncertain,
}

/// The processed attestation from the authenticator, holding the certificate
/// chain when one was presented, leaf first.
#[derive(Debug, Clone)]
pub enum ParsedAttestationData {
    /// Vendor attestation certificate chain.
    Basic(Vec<openssl::x509::X509>),
    /// Self attestation, signed by the credential key.
    Self_,
    /// Attestation CA chain, as issued for TPM quotes.
    AttCa(Vec<openssl::x509::X509>),
    /// Anonymisation CA chain.
    AnonCa(Vec<openssl::x509::X509>),
    /// No attestation was provided with this credential.
    None,
    /// Uncertain attestation, which may not be trustworthy.
    Uncertain,
}

impl ParsedAttestationData {
    /// The attestation type of this result.
    pub fn attestation_type(&self) -> AttestationType {
        match self {
            ParsedAttestationData::Basic(_) => AttestationType::Basic,
            ParsedAttestationData::Self_ => AttestationType::Self_,
            ParsedAttestationData::AttCa(_) => AttestationType::AttCa,
            ParsedAttestationData::AnonCa(_) => AttestationType::AnonCa,
            ParsedAttestationData::None => AttestationType::None,
            ParsedAttestationData::Uncertain => AttestationType::Uncertain,
        }
    }

    /// The certificate chain, leaf first, if this attestation carries one.
    pub fn trust_path(&self) -> &[openssl::x509::X509] {
        match self {
            ParsedAttestationData::Basic(chain)
            | ParsedAttestationData::AttCa(chain)
            | ParsedAttestationData::AnonCa(chain) => chain.as_slice(),
            _ => &[],
        }
    }
}

/// Format specific details extracted while verifying an attestation statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttestationMetadata {
    /// No metadata available
    None,
    /// Packed attestation with a certificate
    Packed {
        /// The authenticator model.
        aaguid: Uuid,
    },
    /// TPM attestation
    Tpm {
        /// The authenticator model.
        aaguid: Uuid,
        /// The TPM firmware version.
        firmware_version: u64,
    },
    /// Android SafetyNet attestation
    AndroidSafetyNet {
        /// The package name of the app that called SafetyNet.
        apk_package_name: String,
        /// Digests of the signing certificates of that app.
        apk_certificate_digest_sha256: Vec<Base64UrlSafeData>,
        /// The device passed Android compatibility testing.
        cts_profile_match: bool,
        /// The device has not been tampered with.
        basic_integrity: bool,
        /// How the verdict was reached.
        evaluation_type: Option<String>,
    },
}

/// The serialisable outcome of attestation verification, kept with the credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationSummary {
    /// The attestation statement format identifier, such as "packed".
    pub format: String,
    /// How the statement vouched for the credential.
    pub type_: AttestationType,
    /// DER certificates of the trust path, leaf first.
    pub trust_path: Vec<Base64UrlSafeData>,
    /// Format specific details.
    pub metadata: AttestationMetadata,
}

/// A user's authenticator credential, returned from a successful registration
/// and updated by every successful authentication. The caller persists this.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Credential {
    /// Credential id as chosen by the authenticator.
    pub cred_id: CredentialID,
    /// Verifies assertions for this credential.
    pub cred: COSEKey,
    /// The last signature counter value seen from the authenticator.
    pub counter: u32,
    /// Transports the client reported for this credential.
    pub transports: Option<Vec<AuthenticatorTransport>>,
    /// The authenticator model.
    pub aaguid: Uuid,
    /// Whether the last ceremony with this credential verified the user.
    pub user_verified: bool,
    /// The credential may be synced between devices.
    pub backup_eligible: bool,
    /// The credential is currently backed up.
    pub backup_state: bool,
    /// The verification policy requested when this credential was registered.
    pub registration_policy: UserVerificationPolicy,
    /// Attestation outcome from registration.
    pub attestation: AttestationSummary,
    /// Set when an authentication saw a counter that did not advance and the
    /// relying party chose to warn instead of fail.
    #[serde(default)]
    pub clone_warning: bool,
}

/// A credential handle as presented in allow and exclude lists.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialDescriptor {
    /// Credential id.
    pub id: CredentialID,
    /// Transport hints.
    pub transports: Option<Vec<AuthenticatorTransport>>,
}

impl From<&Credential> for CredentialDescriptor {
    fn from(cred: &Credential) -> Self {
        CredentialDescriptor {
            id: cred.cred_id.clone(),
            transports: cred.transports.clone(),
        }
    }
}

impl From<CredentialDescriptor> for PublicKeyCredentialDescriptor {
    fn from(cd: CredentialDescriptor) -> Self {
        PublicKeyCredentialDescriptor {
            type_: PUBLIC_KEY_CREDENTIAL_TYPE.to_string(),
            id: cd.id,
            transports: cd.transports,
        }
    }
}

/// The attestedCredentialData block of authenticator data.
#[derive(Debug, Clone)]
pub struct AttestedCredentialData {
    /// Authenticator model. All zero when the model is not disclosed.
    pub aaguid: Aaguid,
    /// Credential id, up to 1023 bytes.
    pub credential_id: CredentialID,
    /// The credential public key, still in CBOR form.
    pub credential_pk: serde_cbor_2::Value,
}

/// Parsed authenticator data.
/// <https://www.w3.org/TR/webauthn-2/#sctn-authenticator-data>
#[derive(Debug, Clone)]
pub struct AuthenticatorData {
    /// SHA-256 of the rp id the authenticator scoped the operation to.
    pub rp_id_hash: [u8; 32],
    /// The raw flags byte.
    pub flags: u8,
    /// Signature counter. Zero if the authenticator keeps none.
    pub counter: u32,
    /// UP flag.
    pub user_present: bool,
    /// Flag if the user verified to the device. Implies presence.
    pub user_verified: bool,
    /// Flag if the credential may be backed up.
    pub backup_eligible: bool,
    /// Flag if the credential is backed up.
    pub backup_state: bool,
    /// Present when the AT flag is set.
    pub acd: Option<AttestedCredentialData>,
    /// Present when the ED flag is set.
    pub extensions: Option<serde_cbor_2::Value>,
}

/// A decoded attestation object.
#[derive(Debug, Clone)]
pub struct AttestationObject {
    /// Format name, used to pick the verifier.
    pub fmt: String,
    /// The parsed authenticator data.
    pub auth_data: AuthenticatorData,
    /// The authenticator data exactly as signed.
    pub auth_data_bytes: Vec<u8>,
    /// The format specific statement.
    pub att_stmt: serde_cbor_2::Value,
}
