//! Attestation information and verification procedures.
//!
//! Each attestation statement format is handled by an [`AttestationVerifier`]. The
//! verifiers are held in an [`AttestationFormats`] table keyed by the format identifier
//! found in the attestation object, so a relying party may add or replace formats
//! without changes to the ceremony logic.

use std::collections::{BTreeMap, BTreeSet};
use std::convert::TryFrom;
use std::sync::Arc;

use openssl::hash::MessageDigest;
use openssl::{stack, x509};
use serde_cbor_2::Value;
use uuid::Uuid;
use x509_parser::oid_registry::Oid;

use crate::base64_data::Base64UrlSafeData;
use crate::crypto::{
    assert_packed_attest_req, assert_tpm_attest_req, compute_sha256, only_hash_from_type,
    verify_signature, x509_is_secp256r1,
};
use crate::error::{WebauthnError, WebauthnResult};
use crate::interface::*;
use crate::proto::COSEAlgorithm;
use crate::tpm::{Tpm2bName, TpmSt, TpmiEccCurve, TpmsAttest, TpmtPublic, TpmuAttest};
use crate::tpm::{TpmuPublicId, TpmuPublicParms};

/// Everything a verifier needs from the registration response.
#[derive(Debug)]
pub struct AttestationContext<'a> {
    /// The attested credential data from the authenticator data.
    pub acd: &'a AttestedCredentialData,
    /// The attestation object, holding the raw authenticator data and statement.
    pub att_obj: &'a AttestationObject,
    /// SHA-256 of the raw client data JSON.
    pub client_data_hash: &'a [u8],
    /// The decoded credential public key.
    pub credential_key: &'a COSEKey,
}

impl AttestationContext<'_> {
    /// attToBeSigned: authenticatorData || clientDataHash
    fn verification_data(&self) -> Vec<u8> {
        self.att_obj
            .auth_data_bytes
            .iter()
            .chain(self.client_data_hash.iter())
            .copied()
            .collect()
    }

    fn statement(&self) -> WebauthnResult<&BTreeMap<Value, Value>> {
        cbor_try_map!(&self.att_obj.att_stmt)
            .map_err(|_| WebauthnError::AttestationStatementMapInvalid)
    }
}

/// Verifies one attestation statement format.
pub trait AttestationVerifier: Send + Sync {
    /// Verify the statement in `ctx`, returning the attestation type with its trust
    /// path and any format specific metadata.
    fn verify(
        &self,
        ctx: &AttestationContext<'_>,
    ) -> WebauthnResult<(ParsedAttestationData, AttestationMetadata)>;
}

/// The table of attestation statement formats this relying party understands.
#[derive(Clone)]
pub struct AttestationFormats {
    verifiers: BTreeMap<String, Arc<dyn AttestationVerifier>>,
}

impl std::fmt::Debug for AttestationFormats {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_set().entries(self.verifiers.keys()).finish()
    }
}

impl Default for AttestationFormats {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl AttestationFormats {
    /// A table with no formats at all.
    pub fn empty() -> Self {
        AttestationFormats {
            verifiers: BTreeMap::new(),
        }
    }

    /// The formats supported out of the box: none, packed, fido-u2f, tpm and
    /// android-safetynet.
    pub fn with_defaults() -> Self {
        let mut formats = Self::empty();
        formats.register("none", Arc::new(NoneVerifier));
        formats.register("packed", Arc::new(PackedVerifier));
        formats.register("fido-u2f", Arc::new(FidoU2fVerifier));
        formats.register("tpm", Arc::new(TpmVerifier));
        formats.register(
            "android-safetynet",
            Arc::new(AndroidSafetyNetVerifier::default()),
        );
        formats
    }

    /// Add or replace the verifier for `format`, returning the one it displaced.
    pub fn register(
        &mut self,
        format: impl Into<String>,
        verifier: Arc<dyn AttestationVerifier>,
    ) -> Option<Arc<dyn AttestationVerifier>> {
        self.verifiers.insert(format.into(), verifier)
    }

    /// True if `format` has a verifier.
    pub fn contains(&self, format: &str) -> bool {
        self.verifiers.contains_key(format)
    }

    /// The verifier registered for `format`.
    pub fn get(&self, format: &str) -> Option<&Arc<dyn AttestationVerifier>> {
        self.verifiers.get(format)
    }

    /// Dispatch to the verifier for `format`.
    pub fn verify(
        &self,
        format: &str,
        ctx: &AttestationContext<'_>,
    ) -> WebauthnResult<(ParsedAttestationData, AttestationMetadata)> {
        match self.verifiers.get(format) {
            Some(verifier) => verifier.verify(ctx),
            None => {
                debug!(?format, "no verifier for attestation format");
                Err(WebauthnError::AttestationNotSupported)
            }
        }
    }
}

/// x509 certificate extensions are validated by checking that the value of the
/// extension is equal to some other value.
pub trait AttestationX509Extension {
    /// the type of the value in the certificate extension
    type Output: Eq;

    /// the oid of the extension
    const OID: Oid<'static>;

    /// how to parse the value out of the certificate extension
    fn parse(i: &[u8]) -> der_parser::error::BerResult<Self::Output>;

    /// if `true`, then validating this certificate fails if this extension is
    /// missing
    const IS_REQUIRED: bool;

    /// what error to return if the value does not match
    const VALIDATION_ERROR: WebauthnError;
}

/// The FIDO AAGUID x509 extension, id-fido-gen-ce-aaguid.
pub struct FidoGenCeAaguid;

impl AttestationX509Extension for FidoGenCeAaguid {
    const OID: Oid<'static> = der_parser::oid!(1.3.6 .1 .4 .1 .45724 .1 .1 .4);

    type Output = Aaguid;

    fn parse(i: &[u8]) -> der_parser::error::BerResult<Self::Output> {
        let (rem, aaguid) = der_parser::der::parse_der_octetstring(i)?;
        let aaguid: Aaguid = aaguid
            .as_slice()?
            .try_into()
            .map_err(|_| der_parser::error::BerError::InvalidLength)?;
        Ok((rem, aaguid))
    }

    const IS_REQUIRED: bool = false;

    const VALIDATION_ERROR: WebauthnError = WebauthnError::AttestationCertificateAAGUIDMismatch;
}

/// Check an x509 extension of type `T` in `x509` against `data`.
pub fn validate_extension<T>(
    x509: &x509::X509Ref,
    data: &<T as AttestationX509Extension>::Output,
) -> WebauthnResult<()>
where
    T: AttestationX509Extension,
{
    let der_bytes = x509.to_der()?;
    x509_parser::parse_x509_certificate(&der_bytes)
        .map_err(|_| WebauthnError::AttestationStatementX5CInvalid)?
        .1
        .extensions()
        .iter()
        .find(|extension| extension.oid == T::OID)
        .map(|extension| {
            T::parse(extension.value)
                .map_err(|_| WebauthnError::AttestationStatementX5CInvalid)
                .and_then(|(_, output)| {
                    if &output == data {
                        Ok(())
                    } else {
                        Err(T::VALIDATION_ERROR)
                    }
                })
        })
        .unwrap_or(if T::IS_REQUIRED {
            Err(WebauthnError::AttestationStatementMissingExtension)
        } else {
            Ok(())
        })
}

fn statement_alg(att_stmt_map: &BTreeMap<Value, Value>) -> WebauthnResult<COSEAlgorithm> {
    let alg_value =
        cbor_map_get!(att_stmt_map, "alg").ok_or(WebauthnError::AttestationStatementAlgMissing)?;

    cbor_try_i128!(alg_value)
        .map_err(|_| WebauthnError::AttestationStatementAlgInvalid)
        .and_then(|v| {
            COSEAlgorithm::try_from(v).map_err(|_| WebauthnError::AttestationStatementAlgInvalid)
        })
}

fn statement_sig(att_stmt_map: &BTreeMap<Value, Value>) -> WebauthnResult<&[u8]> {
    cbor_map_get!(att_stmt_map, "sig")
        .ok_or(WebauthnError::AttestationStatementSigMissing)
        .and_then(|s| {
            cbor_try_bytes!(s).map_err(|_| WebauthnError::AttestationStatementSigMissing)
        })
        .map(|s| s.as_slice())
}

// x5c: [ attestnCert: bytes, * (caCert: bytes) ]
fn x5c_chain(x5c: &Value) -> WebauthnResult<Vec<x509::X509>> {
    let x5c_array_ref =
        cbor_try_array!(x5c).map_err(|_| WebauthnError::AttestationStatementX5CInvalid)?;

    let arr_x509 = x5c_array_ref
        .iter()
        .map(|values| {
            cbor_try_bytes!(values)
                .map_err(|_| WebauthnError::AttestationStatementX5CInvalid)
                .and_then(|b| {
                    x509::X509::from_der(b).map_err(|e| {
                        debug!(?e, "x5c entry is not a DER certificate");
                        WebauthnError::AttestationStatementX5CInvalid
                    })
                })
        })
        .collect::<WebauthnResult<Vec<_>>>()?;

    if arr_x509.is_empty() {
        return Err(WebauthnError::AttestationStatementX5CInvalid);
    }
    Ok(arr_x509)
}

/// The "none" format. Nothing to verify.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoneVerifier;

impl AttestationVerifier for NoneVerifier {
    fn verify(
        &self,
        _ctx: &AttestationContext<'_>,
    ) -> WebauthnResult<(ParsedAttestationData, AttestationMetadata)> {
        Ok((ParsedAttestationData::None, AttestationMetadata::None))
    }
}

/// The "packed" format.
/// <https://w3c.github.io/webauthn/#sctn-packed-attestation>
#[derive(Debug, Default, Clone, Copy)]
pub struct PackedVerifier;

impl AttestationVerifier for PackedVerifier {
    fn verify(
        &self,
        ctx: &AttestationContext<'_>,
    ) -> WebauthnResult<(ParsedAttestationData, AttestationMetadata)> {
        let att_stmt_map = ctx.statement()?;
        let alg = statement_alg(att_stmt_map)?;
        let sig = statement_sig(att_stmt_map)?;
        let verification_data = ctx.verification_data();

        match (
            cbor_map_get!(att_stmt_map, "x5c"),
            cbor_map_get!(att_stmt_map, "ecdaaKeyId"),
        ) {
            (Some(x5c), _) => {
                let arr_x509 = x5c_chain(x5c)?;
                let attestn_cert = arr_x509
                    .first()
                    .ok_or(WebauthnError::AttestationStatementX5CInvalid)?;

                // sig must be valid over attToBeSigned using the key in attestnCert.
                if !verify_signature(alg, attestn_cert, sig, &verification_data)? {
                    debug!("packed x509 signature invalid");
                    return Err(WebauthnError::AttestationStatementSigInvalid);
                }

                assert_packed_attest_req(attestn_cert)?;
                validate_extension::<FidoGenCeAaguid>(attestn_cert, &ctx.acd.aaguid)?;

                Ok((
                    ParsedAttestationData::Basic(arr_x509),
                    AttestationMetadata::Packed {
                        aaguid: Uuid::from_bytes(ctx.acd.aaguid),
                    },
                ))
            }
            (None, Some(_ecdaa_key_id)) => {
                debug!("ecdaa packed attestation is not supported");
                Err(WebauthnError::AttestationStatementEcdaaUnsupported)
            }
            (None, None) => {
                // Self attestation: alg must match the credential key.
                if alg != ctx.credential_key.type_ {
                    debug!(?alg, cred_alg = ?ctx.credential_key.type_, "self attestation alg mismatch");
                    return Err(WebauthnError::AttestationStatementAlgMismatch);
                }

                if !ctx
                    .credential_key
                    .verify_signature(sig, &verification_data)?
                {
                    debug!("invalid self attestation signature");
                    return Err(WebauthnError::AttestationStatementSigInvalid);
                }

                Ok((ParsedAttestationData::Self_, AttestationMetadata::None))
            }
        }
    }
}

/// The "fido-u2f" format.
/// <https://w3c.github.io/webauthn/#sctn-fido-u2f-attestation>
#[derive(Debug, Default, Clone, Copy)]
pub struct FidoU2fVerifier;

impl AttestationVerifier for FidoU2fVerifier {
    fn verify(
        &self,
        ctx: &AttestationContext<'_>,
    ) -> WebauthnResult<(ParsedAttestationData, AttestationMetadata)> {
        let att_stmt_map = ctx.statement()?;
        let sig = statement_sig(att_stmt_map)?;

        // x5c must hold exactly one certificate.
        let x5c =
            cbor_map_get!(att_stmt_map, "x5c").ok_or(WebauthnError::AttestationStatementX5CMissing)?;
        let arr_x509 = x5c_chain(x5c)?;
        if arr_x509.len() != 1 {
            debug!(len = arr_x509.len(), "fido-u2f x5c must have one certificate");
            return Err(WebauthnError::AttestationStatementX5CInvalid);
        }
        let att_cert = arr_x509
            .first()
            .ok_or(WebauthnError::AttestationStatementX5CInvalid)?;

        if !x509_is_secp256r1(att_cert)? {
            return Err(WebauthnError::AttestationCertificateNotP256);
        }

        // ANSI X9.62 uncompressed point of the credential key.
        let public_key_u2f = ctx.credential_key.get_alg_key_ecc_x962_raw()?;

        // 0x00 || rpIdHash || clientDataHash || credentialId || publicKeyU2F
        let verification_data: Vec<u8> = std::iter::once(0x00)
            .chain(ctx.att_obj.auth_data.rp_id_hash.iter().copied())
            .chain(ctx.client_data_hash.iter().copied())
            .chain(ctx.acd.credential_id.as_ref().iter().copied())
            .chain(public_key_u2f.iter().copied())
            .collect();

        if !verify_signature(COSEAlgorithm::ES256, att_cert, sig, &verification_data)? {
            error!("fido-u2f signature verification failed");
            return Err(WebauthnError::AttestationStatementSigInvalid);
        }

        Ok((
            ParsedAttestationData::Basic(arr_x509),
            AttestationMetadata::None,
        ))
    }
}

/// The "tpm" format.
/// <https://w3c.github.io/webauthn/#sctn-tpm-attestation>
#[derive(Debug, Default, Clone, Copy)]
pub struct TpmVerifier;

impl AttestationVerifier for TpmVerifier {
    fn verify(
        &self,
        ctx: &AttestationContext<'_>,
    ) -> WebauthnResult<(ParsedAttestationData, AttestationMetadata)> {
        let att_stmt_map = ctx.statement()?;

        let ver = cbor_map_get!(att_stmt_map, "ver")
            .ok_or(WebauthnError::AttestationStatementVerMissing)
            .and_then(|v| {
                cbor_try_string!(v).map_err(|_| WebauthnError::AttestationStatementVerInvalid)
            })?;
        if ver != "2.0" {
            return Err(WebauthnError::AttestationStatementVerUnsupported);
        }

        let alg = statement_alg(att_stmt_map)?;

        let certinfo_bytes = cbor_map_get!(att_stmt_map, "certInfo")
            .ok_or(WebauthnError::AttestationStatementCertInfoMissing)
            .and_then(|v| {
                cbor_try_bytes!(v).map_err(|_| WebauthnError::AttestationStatementCertInfoMissing)
            })?;
        let certinfo = TpmsAttest::try_from(certinfo_bytes.as_slice())?;

        let pubarea_bytes = cbor_map_get!(att_stmt_map, "pubArea")
            .ok_or(WebauthnError::AttestationStatementPubAreaMissing)
            .and_then(|v| {
                cbor_try_bytes!(v).map_err(|_| WebauthnError::AttestationStatementPubAreaMissing)
            })?;
        let pubarea = TpmtPublic::try_from(pubarea_bytes.as_slice())?;

        let sig = statement_sig(att_stmt_map)?;

        let x5c =
            cbor_map_get!(att_stmt_map, "x5c").ok_or(WebauthnError::AttestationStatementX5CMissing)?;
        let arr_x509 = x5c_chain(x5c)?;
        let aik_cert = arr_x509
            .first()
            .ok_or(WebauthnError::AttestationStatementX5CInvalid)?;

        // The key in pubArea must be the credential public key.
        match (&ctx.credential_key.key, &pubarea.parameters, &pubarea.unique) {
            (COSEKeyType::RSA(cose_rsa), TpmuPublicParms::Rsa(_), TpmuPublicId::Rsa(modulus)) => {
                // The exponent is not compared: TPMs commonly report 0 for the default.
                if cose_rsa.n.as_ref() != modulus.as_slice() {
                    debug!("tpm rsa modulus mismatch");
                    return Err(WebauthnError::AttestationTpmPubAreaMismatch);
                }
            }
            (
                COSEKeyType::EC_EC2(COSEEC2Key { curve, x, y }),
                TpmuPublicParms::Ecc(ecc_parms),
                TpmuPublicId::Ecc(point),
            ) => {
                match (curve, ecc_parms.curve_id) {
                    (ECDSACurve::SECP256R1, TpmiEccCurve::NistP256)
                    | (ECDSACurve::SECP384R1, TpmiEccCurve::NistP384)
                    | (ECDSACurve::SECP521R1, TpmiEccCurve::NistP521) => {}
                    c_mismatch => {
                        debug!(?c_mismatch, "tpm ecc curve mismatch");
                        return Err(WebauthnError::AttestationTpmPubAreaMismatch);
                    }
                }
                if x.as_ref() != point.x.as_slice() || y.as_ref() != point.y.as_slice() {
                    debug!("tpm ecc point mismatch");
                    return Err(WebauthnError::AttestationTpmPubAreaMismatch);
                }
            }
            ex => {
                debug!(?ex, "unrecognised tpm key combination");
                return Err(WebauthnError::AttestationTpmPubAreaMismatch);
            }
        }

        if certinfo.type_ != TpmSt::AttestCertify {
            return Err(WebauthnError::AttestationTpmStInvalid);
        }

        // extraData is the hash of attToBeSigned with the hash of "alg".
        let extra_data = certinfo
            .extra_data
            .as_ref()
            .ok_or(WebauthnError::AttestationTpmExtraDataInvalid)?;
        let hash_verification_data = only_hash_from_type(alg, &ctx.verification_data())?;
        if &hash_verification_data != extra_data {
            return Err(WebauthnError::AttestationTpmExtraDataMismatch);
        }

        // attested.name is nameAlg || H_nameAlg(pubArea).
        match &certinfo.typeattested {
            TpmuAttest::AttestCertify(Tpm2bName::Digest(name), _qname) => {
                let md = pubarea
                    .name_alg
                    .digest()
                    .ok_or(WebauthnError::AttestationTpmPubAreaHashUnknown)?;
                let digest = openssl::hash::hash(md, pubarea_bytes)?;
                let expected: Vec<u8> = (pubarea.name_alg as u16)
                    .to_be_bytes()
                    .iter()
                    .chain(digest.iter())
                    .copied()
                    .collect();
                if &expected != name {
                    return Err(WebauthnError::AttestationTpmPubAreaHashInvalid);
                }
            }
            TpmuAttest::AttestCertify(_, _) => {
                return Err(WebauthnError::AttestationTpmAttestNameInvalid)
            }
            TpmuAttest::Unsupported => return Err(WebauthnError::AttestationTpmStInvalid),
        }

        // sig is over certInfo with the AIK.
        if !verify_signature(alg, aik_cert, sig, certinfo_bytes)? {
            debug!("tpm certInfo signature invalid");
            return Err(WebauthnError::AttestationStatementSigInvalid);
        }

        assert_tpm_attest_req(aik_cert)?;
        validate_extension::<FidoGenCeAaguid>(aik_cert, &ctx.acd.aaguid)?;

        Ok((
            ParsedAttestationData::AttCa(arr_x509),
            AttestationMetadata::Tpm {
                aaguid: Uuid::from_bytes(ctx.acd.aaguid),
                firmware_version: certinfo.firmware_version,
            },
        ))
    }
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct SafetyNetAttestResponse {
    timestamp_ms: u64,
    nonce: Base64UrlSafeData,
    apk_package_name: String,
    apk_certificate_digest_sha256: Vec<Base64UrlSafeData>,
    cts_profile_match: bool,
    basic_integrity: bool,
    evaluation_type: Option<String>,
}

#[derive(Debug, thiserror::Error)]
enum SafetyNetError {
    #[error("JWT error")]
    Jwt(#[from] compact_jwt::JwtError),

    #[error("No cert in chain")]
    MissingCertChain,

    #[error("Invalid Cert")]
    BadCert,

    #[error("openssl")]
    OpenSSL(#[from] openssl::error::ErrorStack),

    #[error("nonce mismatch")]
    NonceMismatch,

    #[error("hostname invalid")]
    InvalidHostname,

    #[error("False CTS Profile Match")]
    CtsProfileMatchFailed,

    #[error("Timestamp too far in the future")]
    Expired,

    #[error("Time error: {0}")]
    Time(#[from] std::time::SystemTimeError),
}

/// The "android-safetynet" format.
/// <https://www.w3.org/TR/webauthn/#sctn-android-safetynet-attestation>
#[derive(Debug, Default, Clone, Copy)]
pub struct AndroidSafetyNetVerifier {
    /// Skip the response timestamp check. Only for replaying captured responses.
    pub danger_ignore_timestamp: bool,
}

impl AndroidSafetyNetVerifier {
    fn verify_response(
        &self,
        token: &str,
        nonce: &[u8],
    ) -> Result<(Vec<x509::X509>, SafetyNetAttestResponse), SafetyNetError> {
        use std::str::FromStr;
        trace!(?token);
        let jwsu = compact_jwt::JwsUnverified::from_str(token)?;

        let certs = jwsu
            .get_x5c_chain()?
            .ok_or(SafetyNetError::MissingCertChain)?;
        let leaf_cert = certs.first().ok_or(SafetyNetError::BadCert)?;

        // Verified against the embedded leaf certificate.
        let jws: compact_jwt::Jws<SafetyNetAttestResponse> = jwsu.validate_embeded()?;
        let claims = jws.into_inner();

        // nonce is SHA-256(authenticatorData || clientDataHash)
        if claims.nonce.as_ref() != nonce {
            return Err(SafetyNetError::NonceMismatch);
        }

        let common_name = {
            let name = leaf_cert
                .subject_name()
                .entries_by_nid(openssl::nid::Nid::COMMONNAME)
                .next()
                .ok_or(SafetyNetError::InvalidHostname)?;
            name.data().as_utf8()?.to_string()
        };
        if common_name.as_str() != "attest.android.com" {
            return Err(SafetyNetError::InvalidHostname);
        }

        if !claims.cts_profile_match {
            return Err(SafetyNetError::CtsProfileMatchFailed);
        }

        if !self.danger_ignore_timestamp {
            let limit = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH)?
                + std::time::Duration::from_secs(60);
            if claims.timestamp_ms as u128 > limit.as_millis() {
                return Err(SafetyNetError::Expired);
            }
        }

        Ok((certs, claims))
    }
}

impl AttestationVerifier for AndroidSafetyNetVerifier {
    fn verify(
        &self,
        ctx: &AttestationContext<'_>,
    ) -> WebauthnResult<(ParsedAttestationData, AttestationMetadata)> {
        let att_stmt_map = ctx.statement()?;

        // Only one version exists, and it is reserved for future use.
        let _ver = cbor_map_get!(att_stmt_map, "ver")
            .ok_or(WebauthnError::AttestationStatementVerMissing)
            .and_then(|v| {
                cbor_try_string!(v).map_err(|_| WebauthnError::AttestationStatementVerInvalid)
            })?;

        let response = cbor_map_get!(att_stmt_map, "response")
            .ok_or(WebauthnError::AttestationStatementResponseMissing)
            .and_then(|v| {
                cbor_try_bytes!(v).map_err(|_| WebauthnError::AttestationStatementResponseMissing)
            })?;

        let response_str = std::str::from_utf8(response.as_slice())
            .map_err(|_| WebauthnError::AttestationStatementResponseInvalid)?;

        let nonce = compute_sha256(&ctx.verification_data());

        let (x5c, claims) = self.verify_response(response_str, &nonce).map_err(|e| {
            error!(?e, "safetynet response rejected");
            WebauthnError::AttestationStatementResponseInvalid
        })?;

        Ok((
            ParsedAttestationData::Basic(x5c),
            AttestationMetadata::AndroidSafetyNet {
                apk_package_name: claims.apk_package_name,
                apk_certificate_digest_sha256: claims.apk_certificate_digest_sha256,
                cts_profile_match: claims.cts_profile_match,
                basic_integrity: claims.basic_integrity,
                evaluation_type: claims.evaluation_type,
            },
        ))
    }
}

/// A trusted attestation root, optionally restricted to some authenticator models.
#[derive(Debug, Clone)]
pub struct AttestationCa {
    /// The x509 root CA of the attestation chain.
    pub ca: x509::X509,
    /// If not empty, only these AAGUIDs are trusted under this CA.
    pub aaguids: BTreeSet<Uuid>,
}

impl AttestationCa {
    /// Load a CA from DER.
    pub fn new_from_der(data: &[u8]) -> WebauthnResult<Self> {
        Ok(AttestationCa {
            ca: x509::X509::from_der(data)?,
            aaguids: BTreeSet::default(),
        })
    }

    /// Load a CA from PEM.
    pub fn new_from_pem(data: &[u8]) -> WebauthnResult<Self> {
        Ok(AttestationCa {
            ca: x509::X509::from_pem(data)?,
            aaguids: BTreeSet::default(),
        })
    }

    /// Allow `aaguid` under this CA.
    pub fn insert_aaguid(&mut self, aaguid: Uuid) {
        self.aaguids.insert(aaguid);
    }

    /// The sha256 digest of the CA certificate, used as its key.
    pub fn get_kid(&self) -> WebauthnResult<Vec<u8>> {
        Ok(self.ca.digest(MessageDigest::sha256())?.to_vec())
    }

    /// True if `aaguid` is trusted under this CA.
    pub fn allows(&self, aaguid: &Uuid) -> bool {
        self.aaguids.is_empty() || self.aaguids.contains(aaguid)
    }
}

/// The set of attestation roots a relying party trusts.
#[derive(Debug, Default, Clone)]
pub struct AttestationCaList {
    /// CAs keyed by the sha256 digest of their certificate.
    pub cas: BTreeMap<Base64UrlSafeData, AttestationCa>,
}

impl AttestationCaList {
    /// True if no CA is present.
    pub fn is_empty(&self) -> bool {
        self.cas.is_empty()
    }

    /// Add a CA, returning any CA with the same digest that it replaced.
    pub fn insert(&mut self, att_ca: AttestationCa) -> WebauthnResult<Option<AttestationCa>> {
        let kid = att_ca.get_kid()?;
        Ok(self.cas.insert(kid.into(), att_ca))
    }
}

/// Verify the trust path of `att_data` chains to a CA in `ca_list`, returning the CA
/// used. Self and None attestations carry no chain and yield `Ok(None)`.
pub fn verify_attestation_ca_chain<'a>(
    att_data: &ParsedAttestationData,
    ca_list: &'a AttestationCaList,
    danger_disable_certificate_time_checks: bool,
) -> WebauthnResult<Option<&'a AttestationCa>> {
    if ca_list.is_empty() {
        return Err(WebauthnError::AttestationCertificateTrustStoreEmpty);
    }

    let fullchain = match att_data {
        ParsedAttestationData::Basic(chain)
        | ParsedAttestationData::AttCa(chain)
        | ParsedAttestationData::AnonCa(chain) => chain,
        ParsedAttestationData::Self_ | ParsedAttestationData::None => return Ok(None),
        ParsedAttestationData::Uncertain => return Err(WebauthnError::AttestationNotVerifiable),
    };

    let (leaf, chain) = fullchain
        .split_first()
        .ok_or(WebauthnError::AttestationLeafCertMissing)?;

    let mut chain_stack = stack::Stack::new()?;
    for crt in chain.iter() {
        chain_stack.push(crt.clone())?;
    }

    let mut ca_store = x509::store::X509StoreBuilder::new()?;
    if danger_disable_certificate_time_checks {
        ca_store.set_flags(x509::verify::X509VerifyFlags::NO_CHECK_TIME)?;
    }
    for ca_crt in ca_list.cas.values() {
        ca_store.add_cert(ca_crt.ca.clone())?;
    }
    let ca_store = ca_store.build();

    let mut ca_ctx = x509::X509StoreContext::new()?;

    // The closure must return an ErrorStack, so our verdict rides inside it.
    let res: WebauthnResult<openssl::hash::DigestBytes> =
        ca_ctx.init(&ca_store, leaf, &chain_stack, |ca_ctx_ref| {
            ca_ctx_ref.verify_cert().map(|_| {
                let res = ca_ctx_ref.error();
                if res == x509::X509VerifyResult::OK {
                    ca_ctx_ref
                        .chain()
                        .and_then(|chain| chain.iter().last())
                        .and_then(|ca_cert| ca_cert.digest(MessageDigest::sha256()).ok())
                        .ok_or(WebauthnError::AttestationTrustFailure)
                } else {
                    debug!(
                        depth = ca_ctx_ref.error_depth(),
                        "attestation chain verification failed"
                    );
                    Err(WebauthnError::AttestationChainNotTrusted(res.to_string()))
                }
            })
        })?;

    res.and_then(|dgst| {
        ca_list
            .cas
            .get(dgst.as_ref())
            .ok_or_else(|| {
                WebauthnError::AttestationChainNotTrusted("Invalid CA digest maps".to_string())
            })
            .map(Some)
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::panic)]

    use super::*;
    use openssl::{asn1, bn, ec, hash, nid, pkey, sign};

    fn p256_key() -> pkey::PKey<pkey::Private> {
        let group = ec::EcGroup::from_curve_name(nid::Nid::X9_62_PRIME256V1).unwrap();
        pkey::PKey::from_ec_key(ec::EcKey::generate(&group).unwrap()).unwrap()
    }

    fn cose_from(key: &pkey::PKeyRef<pkey::Private>) -> COSEKey {
        let ec = key.ec_key().unwrap();
        let mut ctx = bn::BigNumContext::new().unwrap();
        let mut x = bn::BigNum::new().unwrap();
        let mut y = bn::BigNum::new().unwrap();
        ec.public_key()
            .affine_coordinates(ec.group(), &mut x, &mut y, &mut ctx)
            .unwrap();
        COSEKey {
            type_: COSEAlgorithm::ES256,
            key: COSEKeyType::EC_EC2(COSEEC2Key {
                curve: ECDSACurve::SECP256R1,
                x: x.to_vec_padded(32).unwrap().into(),
                y: y.to_vec_padded(32).unwrap().into(),
            }),
        }
    }

    fn sign(key: &pkey::PKeyRef<pkey::Private>, data: &[u8]) -> Vec<u8> {
        let mut signer = sign::Signer::new(hash::MessageDigest::sha256(), key).unwrap();
        signer.update(data).unwrap();
        signer.sign_to_vec().unwrap()
    }

    fn cert(
        subject_cn: &str,
        key: &pkey::PKeyRef<pkey::Private>,
        issuer: Option<(&x509::X509Ref, &pkey::PKeyRef<pkey::Private>)>,
        ca: bool,
    ) -> x509::X509 {
        let mut name = x509::X509NameBuilder::new().unwrap();
        name.append_entry_by_nid(nid::Nid::COMMONNAME, subject_cn)
            .unwrap();
        let name = name.build();

        let mut builder = x509::X509Builder::new().unwrap();
        builder.set_version(2).unwrap();
        let serial = bn::BigNum::from_u32(1).unwrap().to_asn1_integer().unwrap();
        builder.set_serial_number(&serial).unwrap();
        builder.set_subject_name(&name).unwrap();
        builder.set_pubkey(key).unwrap();
        builder
            .set_not_before(&asn1::Asn1Time::days_from_now(0).unwrap())
            .unwrap();
        builder
            .set_not_after(&asn1::Asn1Time::days_from_now(1).unwrap())
            .unwrap();
        if ca {
            builder
                .append_extension(
                    x509::extension::BasicConstraints::new()
                        .critical()
                        .ca()
                        .build()
                        .unwrap(),
                )
                .unwrap();
            builder
                .append_extension(
                    x509::extension::KeyUsage::new()
                        .key_cert_sign()
                        .build()
                        .unwrap(),
                )
                .unwrap();
        }
        match issuer {
            Some((issuer_cert, issuer_key)) => {
                builder.set_issuer_name(issuer_cert.subject_name()).unwrap();
                builder.sign(issuer_key, MessageDigest::sha256()).unwrap();
            }
            None => {
                builder.set_issuer_name(&name).unwrap();
                builder.sign(key, MessageDigest::sha256()).unwrap();
            }
        }
        builder.build()
    }

    fn att_obj(fmt: &str, att_stmt: Value, acd: &AttestedCredentialData) -> AttestationObject {
        let auth_data_bytes = vec![0x41; 37];
        AttestationObject {
            fmt: fmt.to_string(),
            auth_data: AuthenticatorData {
                rp_id_hash: [0x41; 32],
                flags: 0x41,
                counter: 0,
                user_present: true,
                user_verified: false,
                backup_eligible: false,
                backup_state: false,
                acd: Some(acd.clone()),
                extensions: None,
            },
            auth_data_bytes,
            att_stmt,
        }
    }

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    #[test]
    fn dispatch_table() {
        struct AlwaysUncertain;
        impl AttestationVerifier for AlwaysUncertain {
            fn verify(
                &self,
                _ctx: &AttestationContext<'_>,
            ) -> WebauthnResult<(ParsedAttestationData, AttestationMetadata)> {
                Ok((ParsedAttestationData::Uncertain, AttestationMetadata::None))
            }
        }

        let key = p256_key();
        let cose = cose_from(&key);
        let acd = AttestedCredentialData {
            aaguid: [0; 16],
            credential_id: vec![1, 2, 3].into(),
            credential_pk: Value::from(&cose),
        };
        let ao = att_obj("apple", Value::Map(BTreeMap::new()), &acd);
        let ctx = AttestationContext {
            acd: &acd,
            att_obj: &ao,
            client_data_hash: &[0; 32],
            credential_key: &cose,
        };

        let mut formats = AttestationFormats::with_defaults();
        assert!(formats.contains("tpm"));
        assert!(matches!(
            formats.verify("apple", &ctx),
            Err(WebauthnError::AttestationNotSupported)
        ));
        assert!(matches!(
            formats.verify("none", &ctx),
            Ok((ParsedAttestationData::None, AttestationMetadata::None))
        ));

        assert!(formats
            .register("apple", Arc::new(AlwaysUncertain))
            .is_none());
        assert!(matches!(
            formats.verify("apple", &ctx),
            Ok((ParsedAttestationData::Uncertain, _))
        ));
    }

    #[test]
    fn packed_self_attestation() {
        let key = p256_key();
        let cose = cose_from(&key);
        let acd = AttestedCredentialData {
            aaguid: [0; 16],
            credential_id: vec![9; 16].into(),
            credential_pk: Value::from(&cose),
        };
        let client_data_hash = [7u8; 32];

        let mut ao = att_obj("packed", Value::Null, &acd);
        let tbs: Vec<u8> = ao
            .auth_data_bytes
            .iter()
            .chain(client_data_hash.iter())
            .copied()
            .collect();

        let mut stmt = BTreeMap::new();
        stmt.insert(text("alg"), Value::Integer(-7));
        stmt.insert(text("sig"), Value::Bytes(sign(&key, &tbs)));
        ao.att_stmt = Value::Map(stmt.clone());

        let ctx = AttestationContext {
            acd: &acd,
            att_obj: &ao,
            client_data_hash: &client_data_hash,
            credential_key: &cose,
        };
        let (parsed, _) = PackedVerifier.verify(&ctx).unwrap();
        assert_eq!(parsed.attestation_type(), AttestationType::Self_);

        // alg must match the credential
        stmt.insert(text("alg"), Value::Integer(-257));
        let ao_bad = AttestationObject {
            att_stmt: Value::Map(stmt.clone()),
            ..ao.clone()
        };
        let ctx = AttestationContext {
            acd: &acd,
            att_obj: &ao_bad,
            client_data_hash: &client_data_hash,
            credential_key: &cose,
        };
        assert!(matches!(
            PackedVerifier.verify(&ctx),
            Err(WebauthnError::AttestationStatementAlgMismatch)
        ));

        // signature over other data
        stmt.insert(text("alg"), Value::Integer(-7));
        stmt.insert(text("sig"), Value::Bytes(sign(&key, b"other")));
        let ao_bad = AttestationObject {
            att_stmt: Value::Map(stmt.clone()),
            ..ao.clone()
        };
        let ctx = AttestationContext {
            acd: &acd,
            att_obj: &ao_bad,
            client_data_hash: &client_data_hash,
            credential_key: &cose,
        };
        assert_eq!(
            PackedVerifier.verify(&ctx).unwrap_err().kind(),
            crate::error::ErrorKind::SignatureInvalid
        );

        // ecdaa
        stmt.insert(text("ecdaaKeyId"), Value::Bytes(vec![0; 4]));
        let ao_bad = AttestationObject {
            att_stmt: Value::Map(stmt),
            ..ao
        };
        let ctx = AttestationContext {
            acd: &acd,
            att_obj: &ao_bad,
            client_data_hash: &client_data_hash,
            credential_key: &cose,
        };
        assert_eq!(
            PackedVerifier.verify(&ctx).unwrap_err().kind(),
            crate::error::ErrorKind::UnsupportedFormat
        );
    }

    #[test]
    fn packed_malformed_x5c_is_client_error() {
        let key = p256_key();
        let cose = cose_from(&key);
        let acd = AttestedCredentialData {
            aaguid: [0; 16],
            credential_id: vec![9; 16].into(),
            credential_pk: Value::from(&cose),
        };
        let client_data_hash = [7u8; 32];

        let mut stmt = BTreeMap::new();
        stmt.insert(text("alg"), Value::Integer(-7));
        stmt.insert(text("sig"), Value::Bytes(vec![0x30, 0x00]));
        stmt.insert(
            text("x5c"),
            Value::Array(vec![Value::Bytes(vec![0xde, 0xad])]),
        );
        let ao = att_obj("packed", Value::Map(stmt), &acd);
        let ctx = AttestationContext {
            acd: &acd,
            att_obj: &ao,
            client_data_hash: &client_data_hash,
            credential_key: &cose,
        };

        let err = PackedVerifier.verify(&ctx).unwrap_err();
        assert!(matches!(err, WebauthnError::AttestationStatementX5CInvalid));
        assert_eq!(err.kind(), crate::error::ErrorKind::ValidationError);
    }

    #[test]
    fn fido_u2f_with_generated_certificate() {
        let att_key = p256_key();
        let att_cert = cert("U2F Test Token", &att_key, None, false);

        let cred_key = p256_key();
        let cose = cose_from(&cred_key);
        let acd = AttestedCredentialData {
            aaguid: [0; 16],
            credential_id: vec![5; 32].into(),
            credential_pk: Value::from(&cose),
        };
        let client_data_hash = [3u8; 32];
        let mut ao = att_obj("fido-u2f", Value::Null, &acd);

        let verification_data: Vec<u8> = std::iter::once(0x00)
            .chain(ao.auth_data.rp_id_hash.iter().copied())
            .chain(client_data_hash.iter().copied())
            .chain(acd.credential_id.as_ref().iter().copied())
            .chain(cose.get_alg_key_ecc_x962_raw().unwrap())
            .collect();

        let mut stmt = BTreeMap::new();
        stmt.insert(text("sig"), Value::Bytes(sign(&att_key, &verification_data)));
        stmt.insert(
            text("x5c"),
            Value::Array(vec![Value::Bytes(att_cert.to_der().unwrap())]),
        );
        ao.att_stmt = Value::Map(stmt.clone());

        let ctx = AttestationContext {
            acd: &acd,
            att_obj: &ao,
            client_data_hash: &client_data_hash,
            credential_key: &cose,
        };
        let (parsed, _) = FidoU2fVerifier.verify(&ctx).unwrap();
        assert_eq!(parsed.attestation_type(), AttestationType::Basic);
        assert_eq!(parsed.trust_path().len(), 1);

        // exactly one certificate
        stmt.insert(
            text("x5c"),
            Value::Array(vec![
                Value::Bytes(att_cert.to_der().unwrap()),
                Value::Bytes(att_cert.to_der().unwrap()),
            ]),
        );
        let ao_bad = AttestationObject {
            att_stmt: Value::Map(stmt),
            ..ao
        };
        let ctx = AttestationContext {
            acd: &acd,
            att_obj: &ao_bad,
            client_data_hash: &client_data_hash,
            credential_key: &cose,
        };
        assert!(matches!(
            FidoU2fVerifier.verify(&ctx),
            Err(WebauthnError::AttestationStatementX5CInvalid)
        ));
    }

    fn rsa_key() -> pkey::PKey<pkey::Private> {
        pkey::PKey::from_rsa(openssl::rsa::Rsa::generate(2048).unwrap()).unwrap()
    }

    // A compact RS256 JWS carrying `leaf` in its x5c header.
    fn safetynet_jws(
        key: &pkey::PKeyRef<pkey::Private>,
        leaf: &x509::X509Ref,
        claims: &serde_json::Value,
    ) -> String {
        let header = serde_json::json!({
            "alg": "RS256",
            "x5c": [base64::encode(leaf.to_der().unwrap())],
        });
        let signing_input = format!(
            "{}.{}",
            base64::encode_config(header.to_string(), base64::URL_SAFE_NO_PAD),
            base64::encode_config(claims.to_string(), base64::URL_SAFE_NO_PAD)
        );
        let sig = sign(key, signing_input.as_bytes());
        format!(
            "{}.{}",
            signing_input,
            base64::encode_config(sig, base64::URL_SAFE_NO_PAD)
        )
    }

    fn safetynet_claims(
        nonce: &[u8],
        cts_profile_match: bool,
        timestamp_ms: u64,
    ) -> serde_json::Value {
        serde_json::json!({
            "timestampMs": timestamp_ms,
            "nonce": base64::encode(nonce),
            "apkPackageName": "com.google.android.gms",
            "apkCertificateDigestSha256": [base64::encode([0x55; 32])],
            "ctsProfileMatch": cts_profile_match,
            "basicIntegrity": true,
            "evaluationType": "BASIC",
        })
    }

    fn now_ms() -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_millis() as u64
    }

    #[test]
    fn android_safetynet_response() {
        let _ = tracing_subscriber::fmt::try_init();
        let jws_key = rsa_key();
        let leaf = cert("attest.android.com", &jws_key, None, false);

        let cred_key = p256_key();
        let cose = cose_from(&cred_key);
        let acd = AttestedCredentialData {
            aaguid: [0; 16],
            credential_id: vec![4; 32].into(),
            credential_pk: Value::from(&cose),
        };
        let client_data_hash = [9u8; 32];
        let mut ao = att_obj("android-safetynet", Value::Null, &acd);
        let nonce = compute_sha256(
            &ao.auth_data_bytes
                .iter()
                .chain(client_data_hash.iter())
                .copied()
                .collect::<Vec<u8>>(),
        );

        let token = safetynet_jws(&jws_key, &leaf, &safetynet_claims(&nonce, true, now_ms()));
        let mut stmt = BTreeMap::new();
        stmt.insert(text("ver"), text("200616037"));
        stmt.insert(text("response"), Value::Bytes(token.into_bytes()));
        ao.att_stmt = Value::Map(stmt);

        let ctx = AttestationContext {
            acd: &acd,
            att_obj: &ao,
            client_data_hash: &client_data_hash,
            credential_key: &cose,
        };
        let (parsed, metadata) = AndroidSafetyNetVerifier::default().verify(&ctx).unwrap();
        assert_eq!(parsed.attestation_type(), AttestationType::Basic);
        assert_eq!(parsed.trust_path().len(), 1);
        match metadata {
            AttestationMetadata::AndroidSafetyNet {
                apk_package_name,
                cts_profile_match,
                ..
            } => {
                assert_eq!(apk_package_name, "com.google.android.gms");
                assert!(cts_profile_match);
            }
            other => panic!("unexpected metadata {:?}", other),
        }

        // The same token presented for other client data.
        let ctx = AttestationContext {
            client_data_hash: &[8u8; 32],
            ..ctx
        };
        assert!(matches!(
            AndroidSafetyNetVerifier::default().verify(&ctx),
            Err(WebauthnError::AttestationStatementResponseInvalid)
        ));
    }

    #[test]
    fn android_safetynet_rejections() {
        let jws_key = rsa_key();
        let leaf = cert("attest.android.com", &jws_key, None, false);
        let nonce = [0x42u8; 32];
        let verifier = AndroidSafetyNetVerifier::default();

        let good = safetynet_jws(&jws_key, &leaf, &safetynet_claims(&nonce, true, now_ms()));
        assert!(verifier.verify_response(&good, &nonce).is_ok());

        assert!(matches!(
            verifier.verify_response(&good, &[0x43; 32]),
            Err(SafetyNetError::NonceMismatch)
        ));

        let other_host = cert("attest.example.com", &jws_key, None, false);
        let token = safetynet_jws(
            &jws_key,
            &other_host,
            &safetynet_claims(&nonce, true, now_ms()),
        );
        assert!(matches!(
            verifier.verify_response(&token, &nonce),
            Err(SafetyNetError::InvalidHostname)
        ));

        let token = safetynet_jws(&jws_key, &leaf, &safetynet_claims(&nonce, false, now_ms()));
        assert!(matches!(
            verifier.verify_response(&token, &nonce),
            Err(SafetyNetError::CtsProfileMatchFailed)
        ));

        // Signed by a key other than the one in x5c.
        let token = safetynet_jws(&rsa_key(), &leaf, &safetynet_claims(&nonce, true, now_ms()));
        assert!(matches!(
            verifier.verify_response(&token, &nonce),
            Err(SafetyNetError::Jwt(_))
        ));

        // An hour in the future.
        let future = now_ms() + 3_600_000;
        let token = safetynet_jws(&jws_key, &leaf, &safetynet_claims(&nonce, true, future));
        assert!(matches!(
            verifier.verify_response(&token, &nonce),
            Err(SafetyNetError::Expired)
        ));
        let lenient = AndroidSafetyNetVerifier {
            danger_ignore_timestamp: true,
        };
        assert!(lenient.verify_response(&token, &nonce).is_ok());
    }

    #[test]
    fn ca_chain_trust() {
        let root_key = p256_key();
        let root = cert("Test Attestation Root", &root_key, None, true);
        let leaf_key = p256_key();
        let leaf = cert("Test Attestation Leaf", &leaf_key, Some((&root, &root_key)), false);

        let other_key = p256_key();
        let other_root = cert("Other Root", &other_key, None, true);

        let mut trusted = AttestationCaList::default();
        assert!(matches!(
            verify_attestation_ca_chain(
                &ParsedAttestationData::Basic(vec![leaf.clone()]),
                &trusted,
                false
            ),
            Err(WebauthnError::AttestationCertificateTrustStoreEmpty)
        ));

        trusted
            .insert(AttestationCa::new_from_der(&root.to_der().unwrap()).unwrap())
            .unwrap();

        let ca = verify_attestation_ca_chain(
            &ParsedAttestationData::Basic(vec![leaf.clone()]),
            &trusted,
            false,
        )
        .unwrap()
        .unwrap();
        assert!(ca.allows(&Uuid::nil()));

        assert!(
            verify_attestation_ca_chain(&ParsedAttestationData::Self_, &trusted, false)
                .unwrap()
                .is_none()
        );

        let mut untrusted = AttestationCaList::default();
        untrusted
            .insert(AttestationCa::new_from_der(&other_root.to_der().unwrap()).unwrap())
            .unwrap();
        assert!(matches!(
            verify_attestation_ca_chain(&ParsedAttestationData::Basic(vec![leaf]), &untrusted, false),
            Err(WebauthnError::AttestationChainNotTrusted(_))
        ));
    }

    #[test]
    fn aaguid_extension_absent_is_accepted() {
        let key = p256_key();
        let c = cert("No Extensions", &key, None, false);
        assert!(validate_extension::<FidoGenCeAaguid>(&c, &[0; 16]).is_ok());
    }
}
