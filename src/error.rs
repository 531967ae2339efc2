//! Possible errors that may occur during Webauthn Operation processing.

use thiserror::Error;

/// A wrapper for `Result<T, WebauthnError>`
pub type WebauthnResult<T> = core::result::Result<T, WebauthnError>;

/// The coarse class of a [`WebauthnError`]. Callers that only need to decide how to
/// respond (reject the request, ask the user to retry, raise an alert) should match
/// on this instead of the individual variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A wire field was malformed, missing or failed a structural check.
    ValidationError,
    /// The challenge in the client data does not match the session.
    ChallengeMismatch,
    /// The client data origin is not an allowed origin of this relying party.
    OriginMismatch,
    /// A signature failed to verify.
    SignatureInvalid,
    /// The attestation format is not known to this relying party.
    UnsupportedFormat,
    /// The signature counter went backwards. The authenticator may be cloned.
    CounterRegression,
    /// The session for this ceremony has lapsed.
    SessionExpired,
    /// An internal failure such as entropy exhaustion or a crypto backend error.
    InternalError,
}

/// Possible errors that may occur during Webauthn Operation processing.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum WebauthnError {
    #[error("The configuration was invalid")]
    Configuration,

    #[error("The relying party id is not valid for the supplied origin")]
    InvalidRpId,

    #[error("The user id must be between 1 and 64 bytes")]
    InvalidUserId,

    #[error("The credential type was not public-key")]
    InvalidCredentialType,

    #[error("The user id does not match the session this ceremony was started for")]
    MismatchedUserId,

    #[error("The user handle in the assertion does not match the user")]
    MismatchedUserHandle,

    #[error("The session for this ceremony has expired")]
    SessionExpired,

    #[error("The session data is malformed")]
    InvalidSessionData,

    #[error("The JSON from the client did not indicate webauthn.<method> correctly")]
    InvalidClientDataType,

    #[error("The client response challenge differs from the latest challenge issued to the userId")]
    MismatchedChallenge,

    #[error("The clients relying party origin does not match our servers information")]
    InvalidRPOrigin,

    #[error("The clients relying party id hash does not match the hash of our relying party id")]
    InvalidRPIDHash,

    #[error("The user present bit is not set, and required")]
    UserNotPresent,

    #[error("The user verified bit is not set, and required by policy")]
    UserNotVerified,

    #[error("The extensions are unknown to this server")]
    InvalidExtensions,

    #[error("The required attestation data is not present in the response")]
    MissingAttestationCredentialData,

    #[error("The attestation format requested is not able to be processed by this server")]
    AttestationNotSupported,

    #[error("The attestation statement map is not valid")]
    AttestationStatementMapInvalid,

    #[error("The attestation statement response is not present")]
    AttestationStatementResponseMissing,

    #[error("The attestation statement response is not valid")]
    AttestationStatementResponseInvalid,

    #[error("The attestation statement signature is not present")]
    AttestationStatementSigMissing,

    #[error("The attestation statement signature is not valid")]
    AttestationStatementSigInvalid,

    #[error("The attestation statement version is not present")]
    AttestationStatementVerMissing,

    #[error("The attestation statement version is not valid")]
    AttestationStatementVerInvalid,

    #[error("The attestation statement version not supported")]
    AttestationStatementVerUnsupported,

    #[error("The attestation statement x5c (trust root) is not present")]
    AttestationStatementX5CMissing,

    #[error("The attestation statement x5c (trust root) is not valid")]
    AttestationStatementX5CInvalid,

    #[error("The attestation statement algorithm is not present")]
    AttestationStatementAlgMissing,

    #[error("The attestation statement algorithm is not valid")]
    AttestationStatementAlgInvalid,

    #[error("The attestation statement algorithm does not match the credential")]
    AttestationStatementAlgMismatch,

    #[error("The attestation statement certInfo is not present")]
    AttestationStatementCertInfoMissing,

    #[error("The attestation statement pubArea is not present")]
    AttestationStatementPubAreaMissing,

    #[error("The attestation statement ecdaaKeyId is not supported")]
    AttestationStatementEcdaaUnsupported,

    #[error("The attestation certificate did not contain a required extension")]
    AttestationStatementMissingExtension,

    #[error("The attestation certificate did not meet the format requirements")]
    AttestationCertificateRequirementsNotMet,

    #[error("The attestation certificate aaguid does not match the authenticator data")]
    AttestationCertificateAAGUIDMismatch,

    #[error("The fido-u2f attestation certificate key is not a P-256 key")]
    AttestationCertificateNotP256,

    #[error("The TPM attestation type is not TPM_ST_ATTEST_CERTIFY")]
    AttestationTpmStInvalid,

    #[error("The TPM attestation and key algorithms do not match")]
    AttestationTpmPubAreaMismatch,

    #[error("The TPM attestation extraData is missing or invalid")]
    AttestationTpmExtraDataInvalid,

    #[error("The TPM attestation extraData does not match the hash of the verification data")]
    AttestationTpmExtraDataMismatch,

    #[error("The TPM requested hash over pubArea is unknown")]
    AttestationTpmPubAreaHashUnknown,

    #[error("The TPM requested hash over pubArea is invalid")]
    AttestationTpmPubAreaHashInvalid,

    #[error("The TPM's attested name is not a digest")]
    AttestationTpmAttestNameInvalid,

    #[error("The TPM structure could not be parsed")]
    AttestationTpmStructureInvalid,

    #[error("The attestation trust path could not be verified")]
    AttestationNotVerifiable,

    #[error("The attestation ca list is empty")]
    AttestationCertificateTrustStoreEmpty,

    #[error("The attestation leaf certificate is missing")]
    AttestationLeafCertMissing,

    #[error("The attestation chain is not trusted: {0}")]
    AttestationChainNotTrusted(String),

    #[error("The attestation was not able to be checked against a trust anchor")]
    AttestationTrustFailure,

    #[error("The credential key algorithm was not one offered in the request")]
    CredentialAlteredAlgFromRequest,

    #[error("The credential algorithm uses insecure cryptography")]
    CredentialInsecureCryptography,

    #[error("The credential id is not in the allowed credentials for this ceremony")]
    CredentialNotAllowed,

    #[error("The assertion was made by a different credential than the one supplied")]
    CredentialIdMismatch,

    #[error("The sign counter did not advance, the credential may be cloned")]
    CredentialPossibleCompromise,

    #[error("The user has no credentials to authenticate with")]
    NoCredentials,

    #[error("The COSEKey contains invalid CBOR which can not be processed")]
    COSEKeyInvalidCBORValue,

    #[error("The COSEKey type is not supported by this implementation")]
    COSEKeyInvalidType,

    #[error("The COSEKey algorithm is not supported by this implementation")]
    COSEKeyInvalidAlgorithm,

    #[error("The COSEKey contains an X or Y coordinate of the wrong length for its curve")]
    COSEKeyECDSAXYInvalid,

    #[error("The COSEKey uses a curve that is not supported by this implementation")]
    COSEKeyECDSAInvalidCurve,

    #[error("The COSEKey contains an OKP coordinate of the wrong length for its curve")]
    COSEKeyEDDSAXInvalid,

    #[error("The COSEKey uses an OKP curve that is not supported by this implementation")]
    COSEKeyEDDSAInvalidCurve,

    #[error("The COSEKey contains an invalid RSA modulus or exponent")]
    COSEKeyRSANEInvalid,

    #[error("The public key does not lie on its curve")]
    COSEKeyPointInvalid,

    #[error("The assertion signature is not valid")]
    SignatureInvalid,

    #[error("The authenticator data is shorter than its fixed header")]
    ParseInsufficientBytesAvailable,

    #[error("The authenticator data contains bytes not described by its flags")]
    ParseTrailingBytes,

    #[error("The authenticator data flags are inconsistent")]
    ParseInvalidFlags,

    #[error("A binary structure could not be parsed")]
    ParseNOMFailure,

    #[error("Unable to decode base64 data: {0}")]
    ParseBase64Failure(#[from] base64::DecodeError),

    #[error("Unable to parse CBOR data: {0}")]
    ParseCBORFailure(#[from] serde_cbor_2::Error),

    #[error("Unable to parse JSON data: {0}")]
    ParseJSONFailure(#[from] serde_json::Error),

    #[error("The system random source is unavailable")]
    EntropyUnavailable,

    #[error("The system clock is not usable: {0}")]
    Time(#[from] std::time::SystemTimeError),

    #[error("OpenSSL Error: {0}")]
    OpenSSLError(#[from] openssl::error::ErrorStack),

    #[error("The OpenSSL key has no curve name")]
    OpenSSLErrorNoCurveName,
}

impl WebauthnError {
    /// Classify this error into its [`ErrorKind`].
    pub fn kind(&self) -> ErrorKind {
        use WebauthnError::*;
        match self {
            SessionExpired => ErrorKind::SessionExpired,
            MismatchedChallenge => ErrorKind::ChallengeMismatch,
            InvalidRPOrigin => ErrorKind::OriginMismatch,
            SignatureInvalid | AttestationStatementSigInvalid => ErrorKind::SignatureInvalid,
            AttestationNotSupported | AttestationStatementEcdaaUnsupported => {
                ErrorKind::UnsupportedFormat
            }
            CredentialPossibleCompromise => ErrorKind::CounterRegression,
            Configuration | EntropyUnavailable | Time(_) | OpenSSLError(_)
            | OpenSSLErrorNoCurveName => ErrorKind::InternalError,
            _ => ErrorKind::ValidationError,
        }
    }
}
