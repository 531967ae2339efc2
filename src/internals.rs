//! Parsers for the binary and JSON structures an authenticator and client hand back.

use std::convert::TryFrom;

use nom::bytes::complete::take;
use nom::error::ErrorKind;
use nom::number::complete::{be_u16, be_u32, u8 as nom_u8};
use serde_cbor_2::Value;

use crate::constants::AUTHENTICATOR_DATA_MIN_BYTES;
use crate::error::{WebauthnError, WebauthnResult};
use crate::interface::*;
use crate::proto::CollectedClientData;

const FLAG_USER_PRESENT: u8 = 0x01;
const FLAG_USER_VERIFIED: u8 = 0x04;
const FLAG_BACKUP_ELIGIBLE: u8 = 0x08;
const FLAG_BACKUP_STATE: u8 = 0x10;
const FLAG_ATTESTED_CRED_DATA: u8 = 0x40;
const FLAG_EXTENSION_DATA: u8 = 0x80;

/// Parse one CBOR item from the front of the input, returning the bytes after it.
fn cbor_parser(i: &[u8]) -> nom::IResult<&[u8], Value> {
    let mut deserializer = serde_cbor_2::Deserializer::from_slice(i);
    let v: Value = serde::de::Deserialize::deserialize(&mut deserializer).map_err(|e| {
        debug!(?e, "cbor item rejected");
        nom::Err::Failure(nom::error::Error::new(i, ErrorKind::Verify))
    })?;

    let consumed = deserializer.byte_offset();
    let (i, _) = take(consumed)(i)?;
    Ok((i, v))
}

fn acd_parser(i: &[u8]) -> nom::IResult<&[u8], AttestedCredentialData> {
    let (i, aaguid_raw) = take(16usize)(i)?;
    let (i, cred_id_len) = be_u16(i)?;
    let (i, cred_id) = take(cred_id_len as usize)(i)?;
    let (i, credential_pk) = cbor_parser(i)?;

    let mut aaguid: Aaguid = [0; 16];
    aaguid.copy_from_slice(aaguid_raw);

    Ok((
        i,
        AttestedCredentialData {
            aaguid,
            credential_id: cred_id.to_vec().into(),
            credential_pk,
        },
    ))
}

fn authenticator_data_parser(i: &[u8]) -> nom::IResult<&[u8], AuthenticatorData> {
    let (i, rp_id_hash_raw) = take(32usize)(i)?;
    let (i, flags) = nom_u8(i)?;
    let (i, counter) = be_u32(i)?;

    let (i, acd) = if flags & FLAG_ATTESTED_CRED_DATA != 0 {
        let (i, acd) = acd_parser(i)?;
        (i, Some(acd))
    } else {
        (i, None)
    };

    let (i, extensions) = if flags & FLAG_EXTENSION_DATA != 0 {
        let (i, ext) = cbor_parser(i)?;
        (i, Some(ext))
    } else {
        (i, None)
    };

    let mut rp_id_hash = [0; 32];
    rp_id_hash.copy_from_slice(rp_id_hash_raw);

    Ok((
        i,
        AuthenticatorData {
            rp_id_hash,
            flags,
            counter,
            user_present: flags & FLAG_USER_PRESENT != 0,
            user_verified: flags & FLAG_USER_VERIFIED != 0,
            backup_eligible: flags & FLAG_BACKUP_ELIGIBLE != 0,
            backup_state: flags & FLAG_BACKUP_STATE != 0,
            acd,
            extensions,
        },
    ))
}

impl TryFrom<&[u8]> for AuthenticatorData {
    type Error = WebauthnError;

    fn try_from(auth_data_bytes: &[u8]) -> WebauthnResult<Self> {
        if auth_data_bytes.len() < AUTHENTICATOR_DATA_MIN_BYTES {
            debug!(len = auth_data_bytes.len(), "authenticator data too short");
            return Err(WebauthnError::ParseInsufficientBytesAvailable);
        }

        let (rem, ad) = authenticator_data_parser(auth_data_bytes).map_err(|e| {
            debug!(?e, "try_from authenticator_data_parser");
            WebauthnError::ParseNOMFailure
        })?;

        if !rem.is_empty() {
            debug!(trailing = rem.len(), "authenticator data has trailing bytes");
            return Err(WebauthnError::ParseTrailingBytes);
        }

        // A credential can not be backed up if it is not eligible for backup.
        if ad.backup_state && !ad.backup_eligible {
            return Err(WebauthnError::ParseInvalidFlags);
        }

        Ok(ad)
    }
}

impl TryFrom<&[u8]> for AttestationObject {
    type Error = WebauthnError;

    fn try_from(data: &[u8]) -> WebauthnResult<Self> {
        let aov: Value = serde_cbor_2::from_slice(data)?;
        let m = cbor_try_map!(&aov).map_err(|_| WebauthnError::AttestationStatementMapInvalid)?;

        let fmt = cbor_map_get!(m, "fmt")
            .ok_or(WebauthnError::AttestationStatementMapInvalid)
            .and_then(|v| {
                cbor_try_string!(v).map_err(|_| WebauthnError::AttestationStatementMapInvalid)
            })?
            .clone();

        let auth_data_bytes = cbor_map_get!(m, "authData")
            .ok_or(WebauthnError::AttestationStatementMapInvalid)
            .and_then(|v| {
                cbor_try_bytes!(v).map_err(|_| WebauthnError::AttestationStatementMapInvalid)
            })?
            .clone();

        let att_stmt = cbor_map_get!(m, "attStmt")
            .cloned()
            .ok_or(WebauthnError::AttestationStatementMapInvalid)?;

        let auth_data = AuthenticatorData::try_from(auth_data_bytes.as_slice())?;

        Ok(AttestationObject {
            fmt,
            auth_data,
            auth_data_bytes,
            att_stmt,
        })
    }
}

impl TryFrom<&[u8]> for CollectedClientData {
    type Error = WebauthnError;

    fn try_from(data: &[u8]) -> WebauthnResult<CollectedClientData> {
        let ccd: CollectedClientData = serde_json::from_slice(data)?;
        Ok(ccd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    const RP_HASH: [u8; 32] =
        hex!("49960de5880e8c687434170f6476605b8fe4aeb9a28632c7995cf3ba831d9763");

    const ES256_KEY: [u8; 77] = hex!(
        "A5 01 02 03 26 20 01"
        "21 58 20   65eda5a12577c2bae829437fe338701a10aaa375e1bb5b5de108de439c08551d"
        "22 58 20   1e52ed75701163f7f9e40ddf9f341b3dc9ba860af7e0ca7ca7e9eecd0084d19c"
    );

    // {"credProtect": 2}
    const CRED_PROTECT_EXT: [u8; 14] = hex!("A1 6B 6372656450726F74656374 02");

    fn header(flags: u8, counter: u32) -> Vec<u8> {
        let mut v = RP_HASH.to_vec();
        v.push(flags);
        v.extend_from_slice(&counter.to_be_bytes());
        v
    }

    fn with_acd(mut v: Vec<u8>) -> Vec<u8> {
        v.extend_from_slice(&[0xAA; 16]);
        v.extend_from_slice(&4u16.to_be_bytes());
        v.extend_from_slice(&[1, 2, 3, 4]);
        v.extend_from_slice(&ES256_KEY);
        v
    }

    #[test]
    fn assertion_header_only() {
        let bytes = header(0x05, 20);
        let ad = AuthenticatorData::try_from(bytes.as_slice()).unwrap();
        assert_eq!(ad.rp_id_hash, RP_HASH);
        assert_eq!(ad.counter, 20);
        assert!(ad.user_present);
        assert!(ad.user_verified);
        assert!(!ad.backup_eligible);
        assert!(ad.acd.is_none());
        assert!(ad.extensions.is_none());
    }

    #[test]
    fn short_input_is_an_error_not_a_panic() {
        for len in 0..AUTHENTICATOR_DATA_MIN_BYTES {
            let bytes = vec![0x41; len];
            assert!(matches!(
                AuthenticatorData::try_from(bytes.as_slice()),
                Err(WebauthnError::ParseInsufficientBytesAvailable)
            ));
        }
    }

    #[test]
    fn trailing_bytes_rejected() {
        let mut bytes = header(0x01, 1);
        bytes.push(0x00);
        assert!(matches!(
            AuthenticatorData::try_from(bytes.as_slice()),
            Err(WebauthnError::ParseTrailingBytes)
        ));

        // Bytes after the credential key without the ED flag set.
        let mut bytes = with_acd(header(0x41, 0));
        bytes.extend_from_slice(&CRED_PROTECT_EXT);
        assert!(matches!(
            AuthenticatorData::try_from(bytes.as_slice()),
            Err(WebauthnError::ParseTrailingBytes)
        ));
    }

    #[test]
    fn attested_credential_data_and_extensions() {
        let mut bytes = with_acd(header(0xC5, 0));
        bytes.extend_from_slice(&CRED_PROTECT_EXT);
        let ad = AuthenticatorData::try_from(bytes.as_slice()).unwrap();

        let acd = ad.acd.unwrap();
        assert_eq!(acd.aaguid, [0xAA; 16]);
        assert_eq!(acd.credential_id.as_ref(), &[1, 2, 3, 4]);
        assert!(matches!(acd.credential_pk, Value::Map(_)));

        let ext = ad.extensions.unwrap();
        let m = cbor_try_map!(&ext).unwrap();
        assert_eq!(
            cbor_map_get!(m, "credProtect"),
            Some(&Value::Integer(2))
        );
    }

    #[test]
    fn truncated_credential_data_rejected() {
        let mut bytes = header(0x41, 0);
        bytes.extend_from_slice(&[0xAA; 16]);
        bytes.extend_from_slice(&64u16.to_be_bytes());
        bytes.extend_from_slice(&[1, 2, 3]);
        assert!(matches!(
            AuthenticatorData::try_from(bytes.as_slice()),
            Err(WebauthnError::ParseNOMFailure)
        ));

        // ED set with no extension map following.
        let bytes = header(0x81, 0);
        assert!(matches!(
            AuthenticatorData::try_from(bytes.as_slice()),
            Err(WebauthnError::ParseNOMFailure)
        ));
    }

    #[test]
    fn backup_flags() {
        let ad = AuthenticatorData::try_from(header(0x19, 0).as_slice()).unwrap();
        assert!(ad.backup_eligible);
        assert!(ad.backup_state);

        assert!(matches!(
            AuthenticatorData::try_from(header(0x11, 0).as_slice()),
            Err(WebauthnError::ParseInvalidFlags)
        ));
    }

    #[test]
    fn attestation_object_none() {
        let auth_data = with_acd(header(0x41, 0));
        let mut m = std::collections::BTreeMap::new();
        m.insert(Value::Text("fmt".into()), Value::Text("none".into()));
        m.insert(Value::Text("authData".into()), Value::Bytes(auth_data.clone()));
        m.insert(
            Value::Text("attStmt".into()),
            Value::Map(std::collections::BTreeMap::new()),
        );
        let bytes = serde_cbor_2::to_vec(&Value::Map(m)).unwrap();

        let ao = AttestationObject::try_from(bytes.as_slice()).unwrap();
        assert_eq!(ao.fmt, "none");
        assert_eq!(ao.auth_data_bytes, auth_data);
        assert!(ao.auth_data.acd.is_some());

        assert!(matches!(
            AttestationObject::try_from(&[0xA0][..]),
            Err(WebauthnError::AttestationStatementMapInvalid)
        ));
    }

    #[test]
    fn client_data_from_json() {
        let json = br#"{"type":"webauthn.get","challenge":"AAECAw","origin":"https://example.com","crossOrigin":false,"other_keys_can_be_added_here":"do not compare clientDataJSON against a template"}"#;
        let ccd = CollectedClientData::try_from(&json[..]).unwrap();
        assert_eq!(ccd.type_, "webauthn.get");
        assert_eq!(ccd.challenge.as_ref(), &[0, 1, 2, 3]);
        assert_eq!(ccd.origin.as_str(), "https://example.com/");
        assert_eq!(ccd.cross_origin, Some(false));
        assert!(ccd
            .unknown_keys
            .contains_key("other_keys_can_be_added_here"));

        assert!(CollectedClientData::try_from(&b"{not json"[..]).is_err());
    }
}
