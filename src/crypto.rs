//! Cryptographic operation wrapper for Webauthn. This module exists to
//! allow ease of auditing, safe operation wrappers for the webauthn library,
//! and cryptographic provider abstraction. This module currently uses OpenSSL
//! as the cryptographic primitive provider.

#![allow(non_camel_case_types)]

use std::collections::BTreeMap;
use std::convert::TryFrom;

use openssl::{bn, ec, hash, nid, pkey, rsa, sha, sign, x509};
use serde_cbor_2::Value;
use x509_parser::extensions::{GeneralName, ParsedExtension};
use x509_parser::oid_registry::Oid;

use crate::error::{WebauthnError, WebauthnResult};
use crate::interface::*;
use crate::proto::COSEAlgorithm;

// https://trustedcomputinggroup.org/wp-content/uploads/Credential_Profile_EK_V2.0_R14_published.pdf
const TCG_AT_TPM_MANUFACTURER: Oid<'static> = der_parser::oid!(2.23.133 .2 .1);
const TCG_AT_TPM_MODEL: Oid<'static> = der_parser::oid!(2.23.133 .2 .2);
const TCG_AT_TPM_VERSION: Oid<'static> = der_parser::oid!(2.23.133 .2 .3);
const TCG_KP_AIK_CERTIFICATE: Oid<'static> = der_parser::oid!(2.23.133 .8 .3);

impl TryFrom<i128> for ECDSACurve {
    type Error = WebauthnError;
    fn try_from(u: i128) -> Result<Self, Self::Error> {
        match u {
            1 => Ok(ECDSACurve::SECP256R1),
            2 => Ok(ECDSACurve::SECP384R1),
            3 => Ok(ECDSACurve::SECP521R1),
            _ => Err(WebauthnError::COSEKeyECDSAInvalidCurve),
        }
    }
}

impl TryFrom<i128> for EDDSACurve {
    type Error = WebauthnError;
    fn try_from(u: i128) -> Result<Self, Self::Error> {
        match u {
            6 => Ok(EDDSACurve::ED25519),
            7 => Ok(EDDSACurve::ED448),
            _ => Err(WebauthnError::COSEKeyEDDSAInvalidCurve),
        }
    }
}

impl ECDSACurve {
    fn to_openssl_nid(self) -> nid::Nid {
        match self {
            ECDSACurve::SECP256R1 => nid::Nid::X9_62_PRIME256V1,
            ECDSACurve::SECP384R1 => nid::Nid::SECP384R1,
            ECDSACurve::SECP521R1 => nid::Nid::SECP521R1,
        }
    }
}

impl EDDSACurve {
    fn to_openssl_id(self) -> pkey::Id {
        match self {
            EDDSACurve::ED25519 => pkey::Id::ED25519,
            EDDSACurve::ED448 => pkey::Id::ED448,
        }
    }
}

/// The digest an algorithm signs over. EdDSA hashes internally and has none.
fn digest_for(alg: COSEAlgorithm) -> Option<hash::MessageDigest> {
    match alg {
        COSEAlgorithm::ES256 | COSEAlgorithm::RS256 => Some(hash::MessageDigest::sha256()),
        COSEAlgorithm::ES384 | COSEAlgorithm::RS384 => Some(hash::MessageDigest::sha384()),
        COSEAlgorithm::ES512 | COSEAlgorithm::RS512 => Some(hash::MessageDigest::sha512()),
        COSEAlgorithm::INSECURE_RS1 => Some(hash::MessageDigest::sha1()),
        COSEAlgorithm::EDDSA => None,
    }
}

/// Verify `signature` over `verification_data` with `pkey`. A signature that is
/// malformed or does not match yields `Ok(false)`.
fn verify_with_pkey(
    alg: COSEAlgorithm,
    pkey: &pkey::PKeyRef<pkey::Public>,
    signature: &[u8],
    verification_data: &[u8],
) -> WebauthnResult<bool> {
    let res = match digest_for(alg) {
        Some(md) => sign::Verifier::new(md, pkey).and_then(|mut verifier| {
            verifier.update(verification_data)?;
            verifier.verify(signature)
        }),
        None => sign::Verifier::new_without_digest(pkey)
            .and_then(|mut verifier| verifier.verify_oneshot(signature, verification_data)),
    };

    match res {
        Ok(valid) => Ok(valid),
        Err(e) => {
            debug!(?e, "signature rejected by openssl");
            Ok(false)
        }
    }
}

/// Validate an x509 signature is valid for the supplied data
pub(crate) fn verify_signature(
    alg: COSEAlgorithm,
    certificate: &x509::X509Ref,
    signature: &[u8],
    verification_data: &[u8],
) -> WebauthnResult<bool> {
    let pkey = certificate.public_key()?;
    verify_with_pkey(alg, &pkey, signature, verification_data)
}

/// Hash `input` with the digest `alg` signs over.
pub(crate) fn only_hash_from_type(alg: COSEAlgorithm, input: &[u8]) -> WebauthnResult<Vec<u8>> {
    if alg == COSEAlgorithm::INSECURE_RS1 {
        warn!("INSECURE SHA1 USAGE DETECTED");
    }
    match digest_for(alg) {
        Some(md) => Ok(hash::hash(md, input)?.to_vec()),
        None => {
            debug!(?alg, "algorithm has no standalone digest");
            Err(WebauthnError::COSEKeyInvalidType)
        }
    }
}

/// Compute the sha256 of a slice of data.
pub fn compute_sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = sha::Sha256::new();
    hasher.update(data);
    hasher.finish()
}

/// True when the certificate carries a P-256 public key.
pub(crate) fn x509_is_secp256r1(certificate: &x509::X509Ref) -> WebauthnResult<bool> {
    let pk = certificate.public_key()?;
    let ec_key = match pk.ec_key() {
        Ok(k) => k,
        Err(_) => return Ok(false),
    };
    ec_key.check_key()?;
    let ec_curve = ec_key
        .group()
        .curve_name()
        .ok_or(WebauthnError::OpenSSLErrorNoCurveName)?;
    Ok(ec_curve == nid::Nid::X9_62_PRIME256V1)
}

fn with_parsed_certificate<T, F>(certificate: &x509::X509Ref, f: F) -> WebauthnResult<T>
where
    F: FnOnce(&x509_parser::certificate::X509Certificate<'_>) -> WebauthnResult<T>,
{
    let der_bytes = certificate.to_der()?;
    let (_, parsed) = x509_parser::parse_x509_certificate(&der_bytes)
        .map_err(|_| WebauthnError::AttestationStatementX5CInvalid)?;
    f(&parsed)
}

fn is_ca_certificate(parsed: &x509_parser::certificate::X509Certificate<'_>) -> bool {
    parsed
        .extensions()
        .iter()
        .any(|ext| matches!(ext.parsed_extension(), ParsedExtension::BasicConstraints(bc) if bc.ca))
}

fn first_entry_utf8(name: &x509::X509NameRef, nid: nid::Nid) -> Option<String> {
    name.entries_by_nid(nid)
        .next()
        .and_then(|e| e.data().as_utf8().ok())
        .map(|s| s.to_string())
}

/// Verify that an attestation certificate meets the requirements in § 8.2.1 Packed
/// Attestation Statement Certificate Requirements.
/// <https://w3c.github.io/webauthn/#sctn-packed-attestation-cert-requirements>
pub(crate) fn assert_packed_attest_req(certificate: &x509::X509Ref) -> WebauthnResult<()> {
    // Version MUST be set to 3 (which is indicated by an ASN.1 INTEGER with value 2).
    if certificate.version() != 2 {
        debug!(version = certificate.version(), "packed attestation cert is not v3");
        return Err(WebauthnError::AttestationCertificateRequirementsNotMet);
    }

    // Subject-C, Subject-O, Subject-CN present. Subject-OU is the literal
    // "Authenticator Attestation".
    let subject = certificate.subject_name();
    let subject_c = first_entry_utf8(subject, nid::Nid::COUNTRYNAME);
    let subject_o = first_entry_utf8(subject, nid::Nid::ORGANIZATIONNAME);
    let subject_ou = first_entry_utf8(subject, nid::Nid::ORGANIZATIONALUNITNAME);
    let subject_cn = first_entry_utf8(subject, nid::Nid::COMMONNAME);

    if subject_c.is_none() || subject_o.is_none() || subject_cn.is_none() {
        debug!("packed attestation cert subject is incomplete");
        return Err(WebauthnError::AttestationCertificateRequirementsNotMet);
    }

    if subject_ou.as_deref() != Some("Authenticator Attestation") {
        debug!(?subject_ou, "packed attestation cert OU is wrong");
        return Err(WebauthnError::AttestationCertificateRequirementsNotMet);
    }

    // The Basic Constraints extension MUST have the CA component set to false.
    with_parsed_certificate(certificate, |parsed| {
        if is_ca_certificate(parsed) {
            debug!("packed attestation cert is a CA");
            Err(WebauthnError::AttestationCertificateRequirementsNotMet)
        } else {
            Ok(())
        }
    })
}

/// Verify that an AIK certificate meets the requirements in § 8.3.1 TPM Attestation
/// Statement Certificate Requirements.
/// <https://w3c.github.io/webauthn/#sctn-tpm-cert-requirements>
pub(crate) fn assert_tpm_attest_req(certificate: &x509::X509Ref) -> WebauthnResult<()> {
    // Version MUST be set to 3.
    if certificate.version() != 2 {
        return Err(WebauthnError::AttestationCertificateRequirementsNotMet);
    }

    // Subject field MUST be set to empty.
    if certificate.subject_name().entries().next().is_some() {
        debug!("aik cert subject is not empty");
        return Err(WebauthnError::AttestationCertificateRequirementsNotMet);
    }

    with_parsed_certificate(certificate, |parsed| {
        let mut san_ok = false;
        let mut eku_ok = false;

        for ext in parsed.extensions() {
            match ext.parsed_extension() {
                // The Subject Alternative Name extension MUST be set as defined in
                // [TPMv2-EK-Profile] section 3.2.9.
                ParsedExtension::SubjectAlternativeName(san) => {
                    san_ok = san.general_names.iter().any(|gn| match gn {
                        GeneralName::DirectoryName(dn) => {
                            let has = |oid: &Oid<'static>| {
                                dn.iter_attributes().any(|attr| attr.attr_type() == oid)
                            };
                            has(&TCG_AT_TPM_MANUFACTURER)
                                && has(&TCG_AT_TPM_MODEL)
                                && has(&TCG_AT_TPM_VERSION)
                        }
                        _ => false,
                    });
                }
                // The Extended Key Usage extension MUST contain the OID
                // 2.23.133.8.3 ("joint-iso-itu-t(2) internationalorganizations(23)
                // 133 tcg-kp(8) tcg-kp-AIKCertificate(3)").
                ParsedExtension::ExtendedKeyUsage(eku) => {
                    eku_ok = eku.other.iter().any(|oid| *oid == TCG_KP_AIK_CERTIFICATE);
                }
                _ => {}
            }
        }

        // The Basic Constraints extension MUST have the CA component set to false.
        if !san_ok || !eku_ok || is_ca_certificate(parsed) {
            debug!(?san_ok, ?eku_ok, "aik cert requirements not met");
            return Err(WebauthnError::AttestationCertificateRequirementsNotMet);
        }
        Ok(())
    })
}

fn cose_map_get<'a>(m: &'a BTreeMap<Value, Value>, k: i128) -> WebauthnResult<&'a Value> {
    m.get(&Value::Integer(k))
        .ok_or(WebauthnError::COSEKeyInvalidCBORValue)
}

impl TryFrom<&Value> for COSEKey {
    type Error = WebauthnError;
    fn try_from(d: &Value) -> Result<COSEKey, Self::Error> {
        let m = cbor_try_map!(d)?;

        // See also https://tools.ietf.org/html/rfc8152#section-3.1
        // These values look like:
        // Map({
        //     Integer(1): Integer(2),   // kty
        //     Integer(3): Integer(-7),  // alg
        //     Integer(-1): Integer(1),  // crv, or n for RSA
        //     Integer(-2): Bytes([..]), // x, or e for RSA
        //     Integer(-3): Bytes([..]), // y
        // })
        // Negative labels are specific to the key type.
        let key_type = cose_map_get(m, 1).and_then(|v| cbor_try_i128!(v))?;

        let type_ = cose_map_get(m, 3)
            .and_then(|v| cbor_try_i128!(v))
            .and_then(|alg| {
                COSEAlgorithm::try_from(alg).map_err(|_| WebauthnError::COSEKeyInvalidAlgorithm)
            })?;

        let key = if key_type == COSEKeyTypeId::EC_EC2 as i128
            && matches!(
                type_,
                COSEAlgorithm::ES256 | COSEAlgorithm::ES384 | COSEAlgorithm::ES512
            ) {
            let curve = cose_map_get(m, -1)
                .and_then(|v| cbor_try_i128!(v))
                .and_then(ECDSACurve::try_from)?;

            // Each ESxxx identifier names one curve.
            let paired = match type_ {
                COSEAlgorithm::ES256 => ECDSACurve::SECP256R1,
                COSEAlgorithm::ES384 => ECDSACurve::SECP384R1,
                _ => ECDSACurve::SECP521R1,
            };
            if curve != paired {
                debug!(?type_, ?curve, "ecdsa alg and curve disagree");
                return Err(WebauthnError::COSEKeyECDSAInvalidCurve);
            }

            let x = cose_map_get(m, -2).and_then(|v| cbor_try_bytes!(v))?;
            let y = cose_map_get(m, -3).and_then(|v| cbor_try_bytes!(v))?;

            let coord_len = curve.coordinate_size();
            if x.len() != coord_len || y.len() != coord_len {
                return Err(WebauthnError::COSEKeyECDSAXYInvalid);
            }

            COSEKeyType::EC_EC2(COSEEC2Key {
                curve,
                x: x.clone().into(),
                y: y.clone().into(),
            })
        } else if key_type == COSEKeyTypeId::EC_RSA as i128
            && matches!(
                type_,
                COSEAlgorithm::RS256 | COSEAlgorithm::RS384 | COSEAlgorithm::RS512
            )
        {
            let n = cose_map_get(m, -1).and_then(|v| cbor_try_bytes!(v))?;
            let e = cose_map_get(m, -2).and_then(|v| cbor_try_bytes!(v))?;

            // 2048 to 4096 bit moduli.
            if !(256..=512).contains(&n.len()) || e.is_empty() || e.len() > 8 {
                return Err(WebauthnError::COSEKeyRSANEInvalid);
            }

            COSEKeyType::RSA(COSERSAKey {
                n: n.clone().into(),
                e: e.clone().into(),
            })
        } else if key_type == COSEKeyTypeId::EC_OKP as i128 && type_ == COSEAlgorithm::EDDSA {
            // https://datatracker.ietf.org/doc/html/rfc8152#section-13.2
            let curve = cose_map_get(m, -1)
                .and_then(|v| cbor_try_i128!(v))
                .and_then(EDDSACurve::try_from)?;
            let x = cose_map_get(m, -2).and_then(|v| cbor_try_bytes!(v))?;

            if x.len() != curve.coordinate_size() {
                return Err(WebauthnError::COSEKeyEDDSAXInvalid);
            }

            COSEKeyType::EC_OKP(COSEOKPKey {
                curve,
                x: x.clone().into(),
            })
        } else {
            debug!(?key_type, ?type_, "WebauthnError::COSEKeyInvalidType");
            return Err(WebauthnError::COSEKeyInvalidType);
        };

        let cose_key = COSEKey { type_, key };

        // The rfc additionally states:
        //   "   Applications MUST check that the curve and the key type are
        //     consistent and reject a key if they are not."
        // this means feeding the values to openssl to validate them for us!
        cose_key.validate()?;
        Ok(cose_key)
    }
}

impl From<&COSEKey> for Value {
    fn from(k: &COSEKey) -> Value {
        let mut m = BTreeMap::new();
        m.insert(Value::Integer(3), Value::Integer(i64::from(k.type_) as i128));
        match &k.key {
            COSEKeyType::EC_EC2(ec2k) => {
                m.insert(Value::Integer(1), Value::Integer(COSEKeyTypeId::EC_EC2 as i128));
                m.insert(Value::Integer(-1), Value::Integer(ec2k.curve as i128));
                m.insert(Value::Integer(-2), Value::Bytes(ec2k.x.0.clone()));
                m.insert(Value::Integer(-3), Value::Bytes(ec2k.y.0.clone()));
            }
            COSEKeyType::RSA(rsak) => {
                m.insert(Value::Integer(1), Value::Integer(COSEKeyTypeId::EC_RSA as i128));
                m.insert(Value::Integer(-1), Value::Bytes(rsak.n.0.clone()));
                m.insert(Value::Integer(-2), Value::Bytes(rsak.e.0.clone()));
            }
            COSEKeyType::EC_OKP(okpk) => {
                m.insert(Value::Integer(1), Value::Integer(COSEKeyTypeId::EC_OKP as i128));
                m.insert(Value::Integer(-1), Value::Integer(okpk.curve as i128));
                m.insert(Value::Integer(-2), Value::Bytes(okpk.x.0.clone()));
            }
        }
        Value::Map(m)
    }
}

impl COSEKey {
    /// Encode this key as a CBOR COSE_Key map.
    pub fn to_cbor_bytes(&self) -> WebauthnResult<Vec<u8>> {
        serde_cbor_2::to_vec(&Value::from(self)).map_err(WebauthnError::ParseCBORFailure)
    }

    /// Decode a CBOR COSE_Key map, validating the key.
    pub fn from_cbor_bytes(data: &[u8]) -> WebauthnResult<Self> {
        let v: Value = serde_cbor_2::from_slice(data)?;
        COSEKey::try_from(&v)
    }

    /// Let publicKeyU2F be the concatenation 0x04 || x || y.
    /// Note: This signifies uncompressed ECC key format.
    pub(crate) fn get_alg_key_ecc_x962_raw(&self) -> WebauthnResult<Vec<u8>> {
        match &self.key {
            COSEKeyType::EC_EC2(ecpk) => Ok(std::iter::once(0x04)
                .chain(ecpk.x.0.iter().copied())
                .chain(ecpk.y.0.iter().copied())
                .collect()),
            _ => {
                debug!("get_alg_key_ecc_x962_raw");
                Err(WebauthnError::COSEKeyInvalidType)
            }
        }
    }

    pub(crate) fn validate(&self) -> WebauthnResult<()> {
        self.get_openssl_pkey().map(|_| ())
    }

    fn get_openssl_pkey(&self) -> WebauthnResult<pkey::PKey<pkey::Public>> {
        match &self.key {
            COSEKeyType::EC_EC2(ec2k) => {
                let ec_group = ec::EcGroup::from_curve_name(ec2k.curve.to_openssl_nid())?;
                let xbn = bn::BigNum::from_slice(ec2k.x.as_ref())?;
                let ybn = bn::BigNum::from_slice(ec2k.y.as_ref())?;

                // This also checks the point lies on the curve.
                let ec_key = ec::EcKey::from_public_key_affine_coordinates(&ec_group, &xbn, &ybn)
                    .map_err(|e| {
                        debug!(?e, "ec point rejected");
                        WebauthnError::COSEKeyPointInvalid
                    })?;
                ec_key
                    .check_key()
                    .map_err(|_| WebauthnError::COSEKeyPointInvalid)?;

                Ok(pkey::PKey::from_ec_key(ec_key)?)
            }
            COSEKeyType::RSA(rsak) => {
                let nbn = bn::BigNum::from_slice(rsak.n.as_ref())?;
                let ebn = bn::BigNum::from_slice(rsak.e.as_ref())?;
                let rsa_key = rsa::Rsa::from_public_components(nbn, ebn)?;
                Ok(pkey::PKey::from_rsa(rsa_key)?)
            }
            COSEKeyType::EC_OKP(okpk) => {
                pkey::PKey::public_key_from_raw_bytes(okpk.x.as_ref(), okpk.curve.to_openssl_id())
                    .map_err(|e| {
                        debug!(?e, "okp key rejected");
                        WebauthnError::COSEKeyPointInvalid
                    })
            }
        }
    }

    /// Verifies data was signed with this [COSEKey].
    pub fn verify_signature(
        &self,
        signature: &[u8],
        verification_data: &[u8],
    ) -> WebauthnResult<bool> {
        let pkey = self.get_openssl_pkey()?;
        verify_with_pkey(self.type_, &pkey, signature, verification_data)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::panic)]

    use super::*;
    use hex_literal::hex;

    #[test]
    fn cbor_es256() {
        let hex_data = hex!(
                "A5"         // Map - 5 elements
                "01 02"      //   1:   2,  ; kty: EC2 key type
                "03 26"      //   3:  -7,  ; alg: ES256 signature algorithm
                "20 01"      //  -1:   1,  ; crv: P-256 curve
                "21 58 20   65eda5a12577c2bae829437fe338701a10aaa375e1bb5b5de108de439c08551d" // -2:   x,  ; x-coordinate
                "22 58 20   1e52ed75701163f7f9e40ddf9f341b3dc9ba860af7e0ca7ca7e9eecd0084d19c" // -3:   y,  ; y-coordinate
        );

        let val: Value = serde_cbor_2::from_slice(&hex_data).unwrap();
        let key = COSEKey::try_from(&val).unwrap();

        assert_eq!(key.type_, COSEAlgorithm::ES256);
        match key.key {
            COSEKeyType::EC_EC2(pkey) => {
                assert_eq!(
                    pkey.x.as_ref(),
                    hex!("65eda5a12577c2bae829437fe338701a10aaa375e1bb5b5de108de439c08551d")
                );
                assert_eq!(pkey.curve, ECDSACurve::SECP256R1);
            }
            _ => panic!("Key should be parsed EC2 key"),
        }
    }

    #[test]
    fn cbor_es384() {
        let hex_data = hex!(
                "A5"         // Map - 5 elements
                "01 02"      //   1:   2,  ; kty: EC2 key type
                "03 38 22"   //   3:  -35,  ; alg: ES384 signature algorithm
                "20 02"      //  -1:   2,  ; crv: P-384 curve
                "21 58 30   ceeaf818731db7af2d02e029854823d71bdbf65fb0c6ff69" // -2: x, ; x-coordinate
                           "42c9cf891efe18ea81430517d777f5c43550da801be5bf2f"
                "22 58 30   dda1d0ead72e042efb7c36a38cc021abb2ca1a2e38159edd" // -3: y ; y-coordinate
                           "a8c25f391e9a38d79dd56b9427d1c7c70cfa778ab849b087"
        );

        let val: Value = serde_cbor_2::from_slice(&hex_data).unwrap();
        let key = COSEKey::try_from(&val).unwrap();
        assert_eq!(key.type_, COSEAlgorithm::ES384);
        assert!(matches!(
            key.key,
            COSEKeyType::EC_EC2(COSEEC2Key {
                curve: ECDSACurve::SECP384R1,
                ..
            })
        ));
    }

    #[test]
    fn cbor_ecdsa_alg_must_match_curve() {
        // alg ES256 (-7) carrying the P-384 key from cbor_es384
        let hex_data = hex!(
                "A5"
                "01 02"
                "03 26"
                "20 02"
                "21 58 30   ceeaf818731db7af2d02e029854823d71bdbf65fb0c6ff69"
                           "42c9cf891efe18ea81430517d777f5c43550da801be5bf2f"
                "22 58 30   dda1d0ead72e042efb7c36a38cc021abb2ca1a2e38159edd"
                           "a8c25f391e9a38d79dd56b9427d1c7c70cfa778ab849b087"
        );
        let val: Value = serde_cbor_2::from_slice(&hex_data).unwrap();
        assert!(matches!(
            COSEKey::try_from(&val),
            Err(WebauthnError::COSEKeyECDSAInvalidCurve)
        ));

        // alg ES384 (-35) carrying the P-256 key from cbor_es256
        let hex_data = hex!(
                "A5"
                "01 02"
                "03 38 22"
                "20 01"
                "21 58 20   65eda5a12577c2bae829437fe338701a10aaa375e1bb5b5de108de439c08551d"
                "22 58 20   1e52ed75701163f7f9e40ddf9f341b3dc9ba860af7e0ca7ca7e9eecd0084d19c"
        );
        let val: Value = serde_cbor_2::from_slice(&hex_data).unwrap();
        assert!(matches!(
            COSEKey::try_from(&val),
            Err(WebauthnError::COSEKeyECDSAInvalidCurve)
        ));
    }

    #[test]
    fn cbor_ed25519() {
        // RFC 8032 test 1 public key.
        let hex_data = hex!(
            "A4"         // Map - 4 elements
            "01 01"      //   1:   1,  ; kty: OKP key type
            "03 27"      //   3:  -8,  ; alg: EDDSA signature algorithm
            "20 06"      //  -1:   6,  ; crv: Ed25519 curve
            "21 58 20   d75a980182b10ab7d54bfed3c964073a0ee172f3daa62325af021a68f707511a" // -2: x
        );
        let val: Value = serde_cbor_2::from_slice(&hex_data).unwrap();
        let key = COSEKey::try_from(&val).unwrap();
        assert_eq!(key.type_, COSEAlgorithm::EDDSA);

        // RFC 8032 test 1, empty message.
        let sig = hex!(
            "e5564300c360ac729086e2cc806e828a84877f1eb8e5d974d873e06522490155"
            "5fb8821590a33bacc61e39701cf9b46bd25bf5f0595bbe24655141438e7a100b"
        );
        assert!(key.verify_signature(&sig, b"").unwrap());
        assert!(!key.verify_signature(&sig, b"x").unwrap());
    }

    #[test]
    fn cbor_rejects_bad_shapes() {
        // ES256 with a 31 byte x coordinate
        let short_x = hex!(
            "A5 01 02 03 26 20 01"
            "21 58 1f   eda5a12577c2bae829437fe338701a10aaa375e1bb5b5de108de439c08551d"
            "22 58 20   1e52ed75701163f7f9e40ddf9f341b3dc9ba860af7e0ca7ca7e9eecd0084d19c"
        );
        let val: Value = serde_cbor_2::from_slice(&short_x).unwrap();
        assert!(matches!(
            COSEKey::try_from(&val),
            Err(WebauthnError::COSEKeyECDSAXYInvalid)
        ));

        // kty EC2 claiming EdDSA
        let mismatch = hex!(
            "A5 01 02 03 27 20 01"
            "21 58 20   65eda5a12577c2bae829437fe338701a10aaa375e1bb5b5de108de439c08551d"
            "22 58 20   1e52ed75701163f7f9e40ddf9f341b3dc9ba860af7e0ca7ca7e9eecd0084d19c"
        );
        let val: Value = serde_cbor_2::from_slice(&mismatch).unwrap();
        assert!(matches!(
            COSEKey::try_from(&val),
            Err(WebauthnError::COSEKeyInvalidType)
        ));

        // A point that is not on P-256
        let off_curve = hex!(
            "A5 01 02 03 26 20 01"
            "21 58 20   65eda5a12577c2bae829437fe338701a10aaa375e1bb5b5de108de439c08551d"
            "22 58 20   1e52ed75701163f7f9e40ddf9f341b3dc9ba860af7e0ca7ca7e9eecd0084d19d"
        );
        let val: Value = serde_cbor_2::from_slice(&off_curve).unwrap();
        assert!(COSEKey::try_from(&val).is_err());

        assert!(COSEKey::try_from(&Value::Integer(1)).is_err());
    }

    #[test]
    fn cose_encode_decode_still_verifies() {
        let group = ec::EcGroup::from_curve_name(nid::Nid::X9_62_PRIME256V1).unwrap();
        let eckey = ec::EcKey::generate(&group).unwrap();
        let private = pkey::PKey::from_ec_key(eckey.clone()).unwrap();

        let mut ctx = bn::BigNumContext::new().unwrap();
        let mut x = bn::BigNum::new().unwrap();
        let mut y = bn::BigNum::new().unwrap();
        eckey
            .public_key()
            .affine_coordinates(&group, &mut x, &mut y, &mut ctx)
            .unwrap();

        let key = COSEKey {
            type_: COSEAlgorithm::ES256,
            key: COSEKeyType::EC_EC2(COSEEC2Key {
                curve: ECDSACurve::SECP256R1,
                x: x.to_vec_padded(32).unwrap().into(),
                y: y.to_vec_padded(32).unwrap().into(),
            }),
        };

        let data = b"authenticator data and client data hash";
        let mut signer = sign::Signer::new(hash::MessageDigest::sha256(), &private).unwrap();
        signer.update(data).unwrap();
        let sig = signer.sign_to_vec().unwrap();
        assert!(key.verify_signature(&sig, data).unwrap());

        let decoded = COSEKey::from_cbor_bytes(&key.to_cbor_bytes().unwrap()).unwrap();
        assert_eq!(decoded, key);
        assert!(decoded.verify_signature(&sig, data).unwrap());
        assert!(!decoded.verify_signature(&sig, b"other data").unwrap());
    }

    #[test]
    fn rsa_key_roundtrip_verifies() {
        let private = rsa::Rsa::generate(2048).unwrap();
        let key = COSEKey {
            type_: COSEAlgorithm::RS256,
            key: COSEKeyType::RSA(COSERSAKey {
                n: private.n().to_vec().into(),
                e: private.e().to_vec().into(),
            }),
        };
        let private = pkey::PKey::from_rsa(private).unwrap();

        let data = b"rs256 signed data";
        let mut signer = sign::Signer::new(hash::MessageDigest::sha256(), &private).unwrap();
        signer.update(data).unwrap();
        let sig = signer.sign_to_vec().unwrap();

        let decoded = COSEKey::from_cbor_bytes(&key.to_cbor_bytes().unwrap()).unwrap();
        assert!(decoded.verify_signature(&sig, data).unwrap());
    }

    #[test]
    fn sha256_known_answer() {
        assert_eq!(
            compute_sha256(b"localhost"),
            hex!("49960de5880e8c687434170f6476605b8fe4aeb9a28632c7995cf3ba831d9763")
        );
    }
}
