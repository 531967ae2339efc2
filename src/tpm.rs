//! TPM 2.0 structures carried in a "tpm" attestation statement.
//! <https://trustedcomputinggroup.org/wp-content/uploads/TCG_TPM2_r1p59_Part2_Structures_pub.pdf>

use std::convert::TryFrom;

use nom::bytes::complete::{tag, take};
use nom::number::complete::{be_u16, be_u32, be_u64, u8 as nom_u8};

use crate::error::WebauthnError;

// 0xFF || "TCG"
const TPM_GENERATED_VALUE: [u8; 4] = [0xff, 0x54, 0x43, 0x47];

/// TPM_ALG_ID values we recognise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum TpmAlgId {
    /// TPM_ALG_RSA
    Rsa = 0x0001,
    /// TPM_ALG_SHA1
    Sha1 = 0x0004,
    /// TPM_ALG_HMAC
    Hmac = 0x0005,
    /// TPM_ALG_AES
    Aes = 0x0006,
    /// TPM_ALG_SHA256
    Sha256 = 0x000b,
    /// TPM_ALG_SHA384
    Sha384 = 0x000c,
    /// TPM_ALG_SHA512
    Sha512 = 0x000d,
    /// TPM_ALG_NULL
    Null = 0x0010,
    /// TPM_ALG_RSASSA
    RsaSsa = 0x0014,
    /// TPM_ALG_RSAPSS
    RsaPss = 0x0016,
    /// TPM_ALG_ECDSA
    Ecdsa = 0x0018,
    /// TPM_ALG_ECDAA
    Ecdaa = 0x001a,
    /// TPM_ALG_ECC
    Ecc = 0x0023,
    /// TPM_ALG_CFB
    Cfb = 0x0043,
}

impl TryFrom<u16> for TpmAlgId {
    type Error = ();

    fn try_from(v: u16) -> Result<Self, Self::Error> {
        match v {
            0x0001 => Ok(TpmAlgId::Rsa),
            0x0004 => Ok(TpmAlgId::Sha1),
            0x0005 => Ok(TpmAlgId::Hmac),
            0x0006 => Ok(TpmAlgId::Aes),
            0x000b => Ok(TpmAlgId::Sha256),
            0x000c => Ok(TpmAlgId::Sha384),
            0x000d => Ok(TpmAlgId::Sha512),
            0x0010 => Ok(TpmAlgId::Null),
            0x0014 => Ok(TpmAlgId::RsaSsa),
            0x0016 => Ok(TpmAlgId::RsaPss),
            0x0018 => Ok(TpmAlgId::Ecdsa),
            0x001a => Ok(TpmAlgId::Ecdaa),
            0x0023 => Ok(TpmAlgId::Ecc),
            0x0043 => Ok(TpmAlgId::Cfb),
            _ => Err(()),
        }
    }
}

impl TpmAlgId {
    /// The digest used to compute a Name with this algorithm, if it is a hash.
    pub(crate) fn digest(self) -> Option<openssl::hash::MessageDigest> {
        match self {
            TpmAlgId::Sha1 => Some(openssl::hash::MessageDigest::sha1()),
            TpmAlgId::Sha256 => Some(openssl::hash::MessageDigest::sha256()),
            TpmAlgId::Sha384 => Some(openssl::hash::MessageDigest::sha384()),
            TpmAlgId::Sha512 => Some(openssl::hash::MessageDigest::sha512()),
            _ => None,
        }
    }
}

/// TPM_ST structure tags for attestation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum TpmSt {
    /// TPM_ST_ATTEST_NV
    AttestNv = 0x8014,
    /// TPM_ST_ATTEST_COMMAND_AUDIT
    AttestCommandAudit = 0x8015,
    /// TPM_ST_ATTEST_SESSION_AUDIT
    AttestSessionAudit = 0x8016,
    /// TPM_ST_ATTEST_CERTIFY
    AttestCertify = 0x8017,
    /// TPM_ST_ATTEST_QUOTE
    AttestQuote = 0x8018,
    /// TPM_ST_ATTEST_TIME
    AttestTime = 0x8019,
    /// TPM_ST_ATTEST_CREATION
    AttestCreation = 0x801a,
}

impl TryFrom<u16> for TpmSt {
    type Error = ();

    fn try_from(v: u16) -> Result<Self, Self::Error> {
        match v {
            0x8014 => Ok(TpmSt::AttestNv),
            0x8015 => Ok(TpmSt::AttestCommandAudit),
            0x8016 => Ok(TpmSt::AttestSessionAudit),
            0x8017 => Ok(TpmSt::AttestCertify),
            0x8018 => Ok(TpmSt::AttestQuote),
            0x8019 => Ok(TpmSt::AttestTime),
            0x801a => Ok(TpmSt::AttestCreation),
            _ => Err(()),
        }
    }
}

/// A TPM2B_NAME. Either empty, a handle, or nameAlg || digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tpm2bName {
    /// No name.
    None,
    /// A TPM_HANDLE.
    Handle(u32),
    /// The digest form, still prefixed with its two byte algorithm id.
    Digest(Vec<u8>),
}

/// TPMS_CLOCK_INFO
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmsClockInfo {
    /// Milliseconds the TPM has been powered.
    pub clock: u64,
    /// TPM resets since clear.
    pub reset_count: u32,
    /// TPM restarts since the last reset.
    pub restart_count: u32,
    /// The clock has not gone backwards.
    pub safe: bool,
}

/// The attested portion of a TPMS_ATTEST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TpmuAttest {
    /// TPMS_CERTIFY_INFO { name, qualifiedName }
    AttestCertify(Tpm2bName, Tpm2bName),
    /// Any other attestation type, which we do not interpret.
    Unsupported,
}

/// TPMS_ATTEST, signed by the AIK.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmsAttest {
    /// The structure tag.
    pub type_: TpmSt,
    /// Qualified name of the signing key.
    pub qualified_signer: Tpm2bName,
    /// Caller supplied data. For webauthn, the hash of attToBeSigned.
    pub extra_data: Option<Vec<u8>>,
    /// Clock state when signed.
    pub clock_info: TpmsClockInfo,
    /// Vendor specific firmware version.
    pub firmware_version: u64,
    /// The attested data.
    pub typeattested: TpmuAttest,
}

/// Curves a TPM may hold an ECC key on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TpmiEccCurve {
    /// TPM_ECC_NIST_P256
    NistP256,
    /// TPM_ECC_NIST_P384
    NistP384,
    /// TPM_ECC_NIST_P521
    NistP521,
    /// Any other curve id.
    Other(u16),
}

impl From<u16> for TpmiEccCurve {
    fn from(v: u16) -> Self {
        match v {
            0x0003 => TpmiEccCurve::NistP256,
            0x0004 => TpmiEccCurve::NistP384,
            0x0005 => TpmiEccCurve::NistP521,
            o => TpmiEccCurve::Other(o),
        }
    }
}

/// TPMS_RSA_PARMS
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmsRsaParms {
    /// Modulus size in bits.
    pub key_bits: u16,
    /// Public exponent. Zero means the default of 65537.
    pub exponent: u32,
}

/// TPMS_ECC_PARMS
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmsEccParms {
    /// The curve of the key.
    pub curve_id: TpmiEccCurve,
}

/// TPMU_PUBLIC_PARMS
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TpmuPublicParms {
    /// RSA key parameters.
    Rsa(TpmsRsaParms),
    /// ECC key parameters.
    Ecc(TpmsEccParms),
}

/// TPMS_ECC_POINT
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmsEccPoint {
    /// X coordinate.
    pub x: Vec<u8>,
    /// Y coordinate.
    pub y: Vec<u8>,
}

/// TPMU_PUBLIC_ID
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TpmuPublicId {
    /// The RSA modulus.
    Rsa(Vec<u8>),
    /// The ECC public point.
    Ecc(TpmsEccPoint),
}

/// TPMT_PUBLIC, the public area of the credential key inside the TPM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmtPublic {
    /// Key type, RSA or ECC.
    pub type_: TpmAlgId,
    /// The hash used to compute this object's Name.
    pub name_alg: TpmAlgId,
    /// TPMA_OBJECT bits.
    pub object_attributes: u32,
    /// Policy digest, possibly empty.
    pub auth_policy: Vec<u8>,
    /// Key parameters.
    pub parameters: TpmuPublicParms,
    /// The public key.
    pub unique: TpmuPublicId,
}

fn verify_failure(i: &[u8]) -> nom::Err<nom::error::Error<&[u8]>> {
    nom::Err::Failure(nom::error::Error::new(i, nom::error::ErrorKind::Verify))
}

fn tpm_alg_id_parser(i: &[u8]) -> nom::IResult<&[u8], TpmAlgId> {
    let (r, v) = be_u16(i)?;
    let alg = TpmAlgId::try_from(v).map_err(|_| verify_failure(i))?;
    Ok((r, alg))
}

fn tpm2b_parser(i: &[u8]) -> nom::IResult<&[u8], &[u8]> {
    let (i, size) = be_u16(i)?;
    take(size as usize)(i)
}

fn tpm2b_name_parser(i: &[u8]) -> nom::IResult<&[u8], Tpm2bName> {
    let (i, name) = tpm2b_parser(i)?;
    let name = match name.len() {
        0 => Tpm2bName::None,
        4 => {
            let (_, h) = be_u32(name)?;
            Tpm2bName::Handle(h)
        }
        _ => Tpm2bName::Digest(name.to_vec()),
    };
    Ok((i, name))
}

fn tpms_clock_info_parser(i: &[u8]) -> nom::IResult<&[u8], TpmsClockInfo> {
    let (i, clock) = be_u64(i)?;
    let (i, reset_count) = be_u32(i)?;
    let (i, restart_count) = be_u32(i)?;
    let (i, safe) = nom_u8(i)?;
    Ok((
        i,
        TpmsClockInfo {
            clock,
            reset_count,
            restart_count,
            safe: safe == 1,
        },
    ))
}

fn tpms_attest_parser(i: &[u8]) -> nom::IResult<&[u8], TpmsAttest> {
    let (i, _magic) = tag(TPM_GENERATED_VALUE)(i)?;
    let type_at = i;
    let (i, st) = be_u16(i)?;
    let type_ = TpmSt::try_from(st).map_err(|_| verify_failure(type_at))?;
    let (i, qualified_signer) = tpm2b_name_parser(i)?;
    let (i, extra_data) = tpm2b_parser(i)?;
    let (i, clock_info) = tpms_clock_info_parser(i)?;
    let (i, firmware_version) = be_u64(i)?;

    let (i, typeattested) = match type_ {
        TpmSt::AttestCertify => {
            let (i, name) = tpm2b_name_parser(i)?;
            let (i, qualified_name) = tpm2b_name_parser(i)?;
            (i, TpmuAttest::AttestCertify(name, qualified_name))
        }
        // The remainder is type specific and never used here.
        _ => (&i[i.len()..], TpmuAttest::Unsupported),
    };

    Ok((
        i,
        TpmsAttest {
            type_,
            qualified_signer,
            extra_data: if extra_data.is_empty() {
                None
            } else {
                Some(extra_data.to_vec())
            },
            clock_info,
            firmware_version,
            typeattested,
        },
    ))
}

// TPMT_SYM_DEF_OBJECT: algorithm, then keyBits and mode unless NULL.
fn tpmt_sym_def_object_parser(i: &[u8]) -> nom::IResult<&[u8], TpmAlgId> {
    let (i, alg) = tpm_alg_id_parser(i)?;
    if alg == TpmAlgId::Null {
        Ok((i, alg))
    } else {
        let (i, _key_bits) = be_u16(i)?;
        let (i, _mode) = be_u16(i)?;
        Ok((i, alg))
    }
}

// TPMT_RSA_SCHEME / TPMT_ECC_SCHEME / TPMT_KDF_SCHEME: scheme, then a hash
// algorithm unless NULL. ECDAA carries an extra count.
fn tpmt_scheme_parser(i: &[u8]) -> nom::IResult<&[u8], TpmAlgId> {
    let (i, scheme) = tpm_alg_id_parser(i)?;
    match scheme {
        TpmAlgId::Null => Ok((i, scheme)),
        TpmAlgId::Ecdaa => {
            let (i, _hash) = be_u16(i)?;
            let (i, _count) = be_u16(i)?;
            Ok((i, scheme))
        }
        _ => {
            let (i, _hash) = be_u16(i)?;
            Ok((i, scheme))
        }
    }
}

fn tpmt_public_parser(i: &[u8]) -> nom::IResult<&[u8], TpmtPublic> {
    let type_at = i;
    let (i, type_) = tpm_alg_id_parser(i)?;
    let (i, name_alg) = tpm_alg_id_parser(i)?;
    let (i, object_attributes) = be_u32(i)?;
    let (i, auth_policy) = tpm2b_parser(i)?;

    let (i, parameters, unique) = match type_ {
        TpmAlgId::Rsa => {
            let (i, _symmetric) = tpmt_sym_def_object_parser(i)?;
            let (i, _scheme) = tpmt_scheme_parser(i)?;
            let (i, key_bits) = be_u16(i)?;
            let (i, exponent) = be_u32(i)?;
            let (i, modulus) = tpm2b_parser(i)?;
            (
                i,
                TpmuPublicParms::Rsa(TpmsRsaParms { key_bits, exponent }),
                TpmuPublicId::Rsa(modulus.to_vec()),
            )
        }
        TpmAlgId::Ecc => {
            let (i, _symmetric) = tpmt_sym_def_object_parser(i)?;
            let (i, _scheme) = tpmt_scheme_parser(i)?;
            let (i, curve_id) = be_u16(i)?;
            let (i, _kdf) = tpmt_scheme_parser(i)?;
            let (i, x) = tpm2b_parser(i)?;
            let (i, y) = tpm2b_parser(i)?;
            (
                i,
                TpmuPublicParms::Ecc(TpmsEccParms {
                    curve_id: curve_id.into(),
                }),
                TpmuPublicId::Ecc(TpmsEccPoint {
                    x: x.to_vec(),
                    y: y.to_vec(),
                }),
            )
        }
        _ => return Err(verify_failure(type_at)),
    };

    Ok((
        i,
        TpmtPublic {
            type_,
            name_alg,
            object_attributes,
            auth_policy: auth_policy.to_vec(),
            parameters,
            unique,
        },
    ))
}

impl TryFrom<&[u8]> for TpmsAttest {
    type Error = WebauthnError;

    fn try_from(data: &[u8]) -> Result<TpmsAttest, WebauthnError> {
        match tpms_attest_parser(data) {
            Ok((rem, attest)) if rem.is_empty() => Ok(attest),
            Ok((rem, _)) => {
                debug!(trailing = rem.len(), "TPMS_ATTEST has trailing bytes");
                Err(WebauthnError::AttestationTpmStructureInvalid)
            }
            Err(e) => {
                debug!(?e, "try_from tpms_attest_parser");
                Err(WebauthnError::AttestationTpmStructureInvalid)
            }
        }
    }
}

impl TryFrom<&[u8]> for TpmtPublic {
    type Error = WebauthnError;

    fn try_from(data: &[u8]) -> Result<TpmtPublic, WebauthnError> {
        match tpmt_public_parser(data) {
            Ok((rem, public)) if rem.is_empty() => Ok(public),
            Ok((rem, _)) => {
                debug!(trailing = rem.len(), "TPMT_PUBLIC has trailing bytes");
                Err(WebauthnError::AttestationTpmStructureInvalid)
            }
            Err(e) => {
                debug!(?e, "try_from tpmt_public_parser");
                Err(WebauthnError::AttestationTpmStructureInvalid)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    // From a Windows Hello registration.
    const CERT_INFO: [u8; 161] = hex!(
        "ff54434780170022000bae4a98460157bf9c604ab1dd2584060865237cd855ad55c37389c2f7913d5228"
        "0014ea6290319227632f2c527330402898e0e32a3f8500000002dbd78926bb6ab70864916ac8015605dc"
        "5176ea838d0022000bef3570fffd0cbda810fd0a956c071fd48f15990707996349cd615a6eb67804fa00"
        "22000bf948e054106093c5a7c36eb54dcf931022408bb978bec4d1d51d01884cebdff7"
    );

    const PUB_AREA: [u8; 310] = hex!(
        "0001000b0006047200209dffcbf36c383ae699fb9868dc6dcb89d7153884be2803922c124158bfad22ae"
        "001000100800000000000100dc14f372fb8e5aec11ccb5df0848e6d17a2c5a37608645107d8b70519ae6"
        "85d381254bd0de46d2efd1bc985ddede9aa9d9a05af387971957f0b26a77965917df9e586b48653db884"
        "136e906b16b2fcce32cf0bb189238b44d49479f9322359342f1a17060f739b7f3ba8d0c44e7dcd00622b"
        "dfe941896702e323516bf7e6ba6f1b04392adc201db59f06b0b65ebfded4eb3c655356d9cb97fbfedbcc"
        "c30a4a93051ba77f7595f59d5c7c02c4d66bf6e4abe564d44358d74b21b7c733abd2d5412d6060e21d82"
        "fe3a5cfc85cf693f9cd0958e095301c1d9f423892b8a898c52e7c391d5e6b9f568693e8e7c22099da7bc"
        "f37068f83f321335ad450c27fc0945df"
    );

    #[test]
    fn tpms_attest_certify() {
        let attest = TpmsAttest::try_from(&CERT_INFO[..]).unwrap();
        assert_eq!(attest.type_, TpmSt::AttestCertify);
        assert_eq!(
            attest.extra_data.as_deref(),
            Some(&hex!("ea6290319227632f2c527330402898e0e32a3f85")[..])
        );
        assert_eq!(attest.clock_info.clock, 0x0000_0002_dbd7_8926);
        assert!(attest.clock_info.safe);
        assert_eq!(attest.firmware_version, 0x5605_dc51_76ea_838d);

        match attest.typeattested {
            TpmuAttest::AttestCertify(Tpm2bName::Digest(name), _) => {
                let mut expect = vec![0x00, 0x0b];
                expect.extend_from_slice(&crate::crypto::compute_sha256(&PUB_AREA));
                assert_eq!(name, expect);
            }
            other => panic!("unexpected attested data {:?}", other),
        }
    }

    #[test]
    fn tpmt_public_rsa() {
        let public = TpmtPublic::try_from(&PUB_AREA[..]).unwrap();
        assert_eq!(public.type_, TpmAlgId::Rsa);
        assert_eq!(public.name_alg, TpmAlgId::Sha256);
        assert_eq!(public.auth_policy.len(), 32);
        assert_eq!(
            public.parameters,
            TpmuPublicParms::Rsa(TpmsRsaParms {
                key_bits: 2048,
                exponent: 0
            })
        );
        match public.unique {
            TpmuPublicId::Rsa(n) => {
                assert_eq!(n.len(), 256);
                assert_eq!(n[0], 0xdc);
            }
            other => panic!("unexpected unique {:?}", other),
        }
    }

    #[test]
    fn tpmt_public_ecc() {
        let mut area = Vec::new();
        area.extend_from_slice(&hex!("0023 000b 00060472 0000"));
        // symmetric NULL, scheme NULL, curve P256, kdf NULL
        area.extend_from_slice(&hex!("0010 0010 0003 0010"));
        area.extend_from_slice(&32u16.to_be_bytes());
        area.extend_from_slice(&[0x11; 32]);
        area.extend_from_slice(&32u16.to_be_bytes());
        area.extend_from_slice(&[0x22; 32]);

        let public = TpmtPublic::try_from(area.as_slice()).unwrap();
        assert_eq!(
            public.parameters,
            TpmuPublicParms::Ecc(TpmsEccParms {
                curve_id: TpmiEccCurve::NistP256
            })
        );
        assert_eq!(
            public.unique,
            TpmuPublicId::Ecc(TpmsEccPoint {
                x: vec![0x11; 32],
                y: vec![0x22; 32]
            })
        );
    }

    #[test]
    fn malformed_structures() {
        let mut bad_magic = CERT_INFO;
        bad_magic[0] = 0xfe;
        assert!(matches!(
            TpmsAttest::try_from(&bad_magic[..]),
            Err(WebauthnError::AttestationTpmStructureInvalid)
        ));

        assert!(TpmsAttest::try_from(&CERT_INFO[..100]).is_err());
        assert!(TpmtPublic::try_from(&PUB_AREA[..309]).is_err());

        let mut trailing = PUB_AREA.to_vec();
        trailing.push(0);
        assert!(TpmtPublic::try_from(trailing.as_slice()).is_err());

        let mut keyedhash = PUB_AREA;
        keyedhash[1] = 0x08;
        assert!(TpmtPublic::try_from(&keyedhash[..]).is_err());
    }
}
