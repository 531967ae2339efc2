//! The ceremony engine. This drives registration and authentication of credentials
//! for a relying party.
//!
//! Every ceremony is two calls. Begin returns the options to send to the browser and a
//! [`SessionData`] the caller must keep. Finish takes that session back with the
//! browser's response and either returns a verified [`Credential`] or an error. The
//! engine holds nothing between the two calls, so a [`Webauthn`] can be shared freely
//! between threads.

use std::time::SystemTime;

use tracing::instrument;
use uuid::Uuid;

use crate::attestation::{verify_attestation_ca_chain, AttestationContext};
use crate::base64_data::Base64UrlSafeData;
use crate::challenge::Challenge;
use crate::config::{CounterPolicy, LoginOptions, RegistrationOptions, WebauthnConfig};
use crate::constants::{
    CHALLENGE_MIN_BYTES, CLIENT_DATA_TYPE_CREATE, CLIENT_DATA_TYPE_GET,
    PUBLIC_KEY_CREDENTIAL_TYPE, USER_ID_MAX_BYTES,
};
use crate::crypto::compute_sha256;
use crate::error::{WebauthnError, WebauthnResult};
use crate::interface::*;
use crate::proto::*;
use crate::session::SessionData;
use crate::user::WebauthnUser;

/// The relying party. Construct it with [`WebauthnBuilder`](crate::config::WebauthnBuilder).
#[derive(Debug, Clone)]
pub struct Webauthn {
    config: WebauthnConfig,
}

fn assert_user_id(user_id: &[u8]) -> WebauthnResult<()> {
    if user_id.is_empty() || user_id.len() > USER_ID_MAX_BYTES {
        error!(len = user_id.len(), "user id must be between 1 and 64 bytes");
        Err(WebauthnError::InvalidUserId)
    } else {
        Ok(())
    }
}

fn assert_credential_type(type_: &str) -> WebauthnResult<()> {
    if type_ != PUBLIC_KEY_CREDENTIAL_TYPE {
        debug!(%type_, "credential type is not public-key");
        Err(WebauthnError::InvalidCredentialType)
    } else {
        Ok(())
    }
}

impl Webauthn {
    pub(crate) fn new(config: WebauthnConfig) -> Self {
        Webauthn { config }
    }

    /// The configuration this relying party was built with.
    pub fn config(&self) -> &WebauthnConfig {
        &self.config
    }

    fn new_session(
        &self,
        user_id: &[u8],
        challenge: Challenge,
        allowed_credential_ids: Vec<CredentialID>,
        user_verification: UserVerificationPolicy,
        credential_algorithms: Vec<COSEAlgorithm>,
    ) -> WebauthnResult<SessionData> {
        let expires = SystemTime::now()
            .checked_add(self.config.session_ttl)
            .ok_or(WebauthnError::Configuration)?;

        Ok(SessionData {
            challenge,
            user_id: user_id.into(),
            allowed_credential_ids,
            user_verification,
            credential_algorithms,
            expires,
        })
    }

    /// Start registering a new credential for `user`.
    ///
    /// The returned [`CreationChallengeResponse`] serialises to the JSON the browser
    /// passes to `navigator.credentials.create()`. The [`SessionData`] must be kept
    /// server side, bound to this user, and handed back exactly once to
    /// [`finish_registration`](Self::finish_registration).
    ///
    /// Unless `options` overrides it, the credentials from
    /// [`WebauthnUser::webauthn_credentials`] are sent as the exclusion list so an
    /// authenticator is not registered to the same user twice.
    #[instrument(level = "debug", skip_all)]
    pub fn begin_registration(
        &self,
        user: &impl WebauthnUser,
        options: &RegistrationOptions,
    ) -> WebauthnResult<(CreationChallengeResponse, SessionData)> {
        let user_id = user.webauthn_id();
        assert_user_id(user_id)?;

        let user_verification = options
            .user_verification
            .unwrap_or(self.config.user_verification);

        let credential_algorithms = options
            .credential_algorithms
            .clone()
            .unwrap_or_else(|| self.config.credential_algorithms.clone());

        let exclude_credentials = options
            .exclude_credentials
            .clone()
            .unwrap_or_else(|| user.webauthn_credentials());

        let challenge = Challenge::generate()?;
        trace!(?challenge, "registration challenge");

        let ccr = CreationChallengeResponse {
            public_key: PublicKeyCredentialCreationOptions {
                rp: RelyingParty {
                    name: self.config.rp_name.clone(),
                    id: self.config.rp_id.clone(),
                    icon: self.config.rp_icon.clone(),
                },
                user: User {
                    id: user_id.into(),
                    name: user.webauthn_name().to_string(),
                    display_name: user.webauthn_display_name().to_string(),
                    icon: user.webauthn_icon().map(str::to_string),
                },
                challenge: challenge.clone().into(),
                pub_key_cred_params: credential_algorithms
                    .iter()
                    .map(|alg| PubKeyCredParams {
                        type_: PUBLIC_KEY_CREDENTIAL_TYPE.to_string(),
                        alg: i64::from(*alg),
                    })
                    .collect(),
                timeout: Some(self.config.timeout),
                attestation: Some(
                    options
                        .attestation_preference
                        .unwrap_or(self.config.attestation_preference),
                ),
                exclude_credentials: if exclude_credentials.is_empty() {
                    None
                } else {
                    Some(
                        exclude_credentials
                            .into_iter()
                            .map(PublicKeyCredentialDescriptor::from)
                            .collect(),
                    )
                },
                authenticator_selection: Some(AuthenticatorSelectionCriteria {
                    authenticator_attachment: options
                        .authenticator_attachment
                        .or(self.config.authenticator_attachment),
                    require_resident_key: options
                        .require_resident_key
                        .unwrap_or(self.config.require_resident_key),
                    user_verification,
                }),
                extensions: options.extensions.clone(),
            },
        };

        let session = self.new_session(
            user_id,
            challenge,
            Vec::new(),
            user_verification,
            credential_algorithms,
        )?;

        debug!(user = %user.webauthn_name(), "registration started");
        Ok((ccr, session))
    }

    /// Complete a registration from the browser's response to
    /// `navigator.credentials.create()`.
    ///
    /// `session` is consumed. Whatever the outcome the caller must not present it
    /// again; take it from a [`SessionStore`](crate::session::SessionStore) with
    /// `load_and_invalidate`.
    ///
    /// On success the returned [`Credential`] must be persisted against the user.
    /// Checking that its id is not already registered to another user is up to the
    /// caller.
    #[instrument(level = "debug", skip_all)]
    pub fn finish_registration(
        &self,
        user: &impl WebauthnUser,
        session: SessionData,
        reg: &RegisterPublicKeyCredential,
    ) -> WebauthnResult<Credential> {
        session.assert_live()?;
        assert_credential_type(&reg.type_)?;
        self.assert_session_user(user, &session)?;

        let client_data_hash = self.verify_client_data(
            reg.response.client_data_json.as_ref(),
            CLIENT_DATA_TYPE_CREATE,
            &session,
        )?;

        let att_obj = AttestationObject::try_from(reg.response.attestation_object.as_ref())?;
        self.verify_authenticator_data(&att_obj.auth_data, session.user_verification)?;

        let acd = att_obj.auth_data.acd.as_ref().ok_or_else(|| {
            debug!("registration without attested credential data");
            WebauthnError::MissingAttestationCredentialData
        })?;

        let credential_key = COSEKey::try_from(&acd.credential_pk)?;

        // An empty list comes from a session created before algorithms were recorded.
        let offered = if session.credential_algorithms.is_empty() {
            &self.config.credential_algorithms
        } else {
            &session.credential_algorithms
        };
        if !offered.contains(&credential_key.type_) {
            debug!(alg = ?credential_key.type_, ?offered, "credential algorithm was not offered");
            return Err(WebauthnError::CredentialAlteredAlgFromRequest);
        }

        let ctx = AttestationContext {
            acd,
            att_obj: &att_obj,
            client_data_hash: &client_data_hash,
            credential_key: &credential_key,
        };
        let (attestation, metadata) = self.verify_attestation(&att_obj.fmt, &ctx)?;

        let aaguid = Uuid::from_bytes(acd.aaguid);
        self.assert_attestation_trusted(&attestation, &aaguid)?;

        let trust_path = attestation
            .trust_path()
            .iter()
            .map(|cert| cert.to_der().map(Base64UrlSafeData::from))
            .collect::<Result<Vec<_>, _>>()?;

        let credential = Credential {
            cred_id: acd.credential_id.clone(),
            cred: credential_key,
            counter: att_obj.auth_data.counter,
            transports: reg.response.transports.clone(),
            aaguid,
            user_verified: att_obj.auth_data.user_verified,
            backup_eligible: att_obj.auth_data.backup_eligible,
            backup_state: att_obj.auth_data.backup_state,
            registration_policy: session.user_verification,
            attestation: AttestationSummary {
                format: att_obj.fmt.clone(),
                type_: attestation.attestation_type(),
                trust_path,
                metadata,
            },
            clone_warning: false,
        };

        debug!(
            cred_id = %credential.cred_id,
            fmt = %credential.attestation.format,
            type_ = ?credential.attestation.type_,
            "registration complete"
        );
        Ok(credential)
    }

    /// Start authenticating `user`.
    ///
    /// `allowed_credentials` lists the credentials that may answer. If it is empty the
    /// user's [`webauthn_credentials`](WebauthnUser::webauthn_credentials) are used, and
    /// if those are empty too the ceremony can not succeed and
    /// [`WebauthnError::NoCredentials`] is returned.
    #[instrument(level = "debug", skip_all)]
    pub fn begin_login(
        &self,
        user: &impl WebauthnUser,
        allowed_credentials: &[CredentialDescriptor],
        options: &LoginOptions,
    ) -> WebauthnResult<(RequestChallengeResponse, SessionData)> {
        let user_id = user.webauthn_id();
        assert_user_id(user_id)?;

        let allowed = if allowed_credentials.is_empty() {
            user.webauthn_credentials()
        } else {
            allowed_credentials.to_vec()
        };

        if allowed.is_empty() {
            debug!(user = %user.webauthn_name(), "no credentials to authenticate with");
            return Err(WebauthnError::NoCredentials);
        }

        let user_verification = options
            .user_verification
            .unwrap_or(self.config.user_verification);

        let challenge = Challenge::generate()?;
        trace!(?challenge, "authentication challenge");

        let allowed_credential_ids = allowed.iter().map(|cd| cd.id.clone()).collect();

        let rcr = RequestChallengeResponse {
            public_key: PublicKeyCredentialRequestOptions {
                challenge: challenge.clone().into(),
                timeout: Some(self.config.timeout),
                rp_id: self.config.rp_id.clone(),
                allow_credentials: allowed
                    .into_iter()
                    .map(PublicKeyCredentialDescriptor::from)
                    .collect(),
                user_verification,
                extensions: options.extensions.clone(),
            },
        };

        let session = self.new_session(
            user_id,
            challenge,
            allowed_credential_ids,
            user_verification,
            Vec::new(),
        )?;

        debug!(user = %user.webauthn_name(), "authentication started");
        Ok((rcr, session))
    }

    /// Complete an authentication from the browser's response to
    /// `navigator.credentials.get()`.
    ///
    /// `credential` is the stored credential whose id matches `rsp.raw_id`. On success
    /// an updated copy is returned with the new counter and flags, which the caller
    /// must persist in place of the old one.
    #[instrument(level = "debug", skip_all)]
    pub fn finish_login(
        &self,
        user: &impl WebauthnUser,
        session: SessionData,
        rsp: &PublicKeyCredential,
        credential: &Credential,
    ) -> WebauthnResult<Credential> {
        session.assert_live()?;
        assert_credential_type(&rsp.type_)?;
        self.assert_session_user(user, &session)?;

        if !session.allowed_credential_ids.is_empty()
            && !session.allowed_credential_ids.contains(&rsp.raw_id)
        {
            debug!(cred_id = %rsp.raw_id, "credential not in the allow list of this session");
            return Err(WebauthnError::CredentialNotAllowed);
        }

        if rsp.raw_id != credential.cred_id {
            debug!(presented = %rsp.raw_id, stored = %credential.cred_id, "credential id mismatch");
            return Err(WebauthnError::CredentialIdMismatch);
        }

        if let Some(user_handle) = &rsp.response.user_handle {
            if user_handle.as_ref() != user.webauthn_id() {
                debug!("user handle does not match the user");
                return Err(WebauthnError::MismatchedUserHandle);
            }
        }

        let client_data_hash = self.verify_client_data(
            rsp.response.client_data_json.as_ref(),
            CLIENT_DATA_TYPE_GET,
            &session,
        )?;

        let auth_data = AuthenticatorData::try_from(rsp.response.authenticator_data.as_ref())?;
        self.verify_authenticator_data(&auth_data, session.user_verification)?;

        let verification_data: Vec<u8> = rsp
            .response
            .authenticator_data
            .as_ref()
            .iter()
            .chain(client_data_hash.iter())
            .copied()
            .collect();

        let verified = credential
            .cred
            .verify_signature(rsp.response.signature.as_ref(), &verification_data)?;

        if !verified {
            debug!(cred_id = %credential.cred_id, "assertion signature invalid");
            return Err(WebauthnError::SignatureInvalid);
        }

        let mut updated = credential.clone();

        // A counter of zero on both sides means the authenticator does not keep one.
        let regressed = (auth_data.counter > 0 || credential.counter > 0)
            && auth_data.counter <= credential.counter;

        if regressed {
            match self.config.counter_policy {
                CounterPolicy::Strict => {
                    error!(
                        cred_id = %credential.cred_id,
                        stored = credential.counter,
                        presented = auth_data.counter,
                        "signature counter did not advance, the authenticator may be cloned"
                    );
                    return Err(WebauthnError::CredentialPossibleCompromise);
                }
                CounterPolicy::Warn => {
                    warn!(
                        cred_id = %credential.cred_id,
                        stored = credential.counter,
                        presented = auth_data.counter,
                        "signature counter did not advance, the authenticator may be cloned"
                    );
                    updated.clone_warning = true;
                }
            }
        } else {
            updated.counter = auth_data.counter;
        }

        updated.user_verified = auth_data.user_verified;
        updated.backup_state = auth_data.backup_state;

        debug!(cred_id = %updated.cred_id, counter = updated.counter, "authentication complete");
        Ok(updated)
    }

    fn assert_session_user(
        &self,
        user: &impl WebauthnUser,
        session: &SessionData,
    ) -> WebauthnResult<()> {
        if session.challenge.as_bytes().len() < CHALLENGE_MIN_BYTES {
            error!("session challenge is too short to have been issued here");
            return Err(WebauthnError::InvalidSessionData);
        }

        if user.webauthn_id() != session.user_id.as_ref() {
            error!(user = %user.webauthn_name(), "session was started for a different user");
            return Err(WebauthnError::MismatchedUserId);
        }

        Ok(())
    }

    /// Check the type, challenge and origin of the raw client data, returning its hash.
    fn verify_client_data(
        &self,
        client_data_json: &[u8],
        expected_type: &str,
        session: &SessionData,
    ) -> WebauthnResult<[u8; 32]> {
        let client_data = CollectedClientData::try_from(client_data_json)?;

        if client_data.type_ != expected_type {
            debug!(type_ = %client_data.type_, %expected_type, "client data type mismatch");
            return Err(WebauthnError::InvalidClientDataType);
        }

        if client_data.challenge.as_ref() != session.challenge.as_bytes() {
            debug!("client data challenge does not match the session");
            return Err(WebauthnError::MismatchedChallenge);
        }

        if !self.config.origin_allowed(&client_data.origin) {
            debug!(origin = %client_data.origin, allowed = ?self.config.allowed_origins, "origin not allowed");
            return Err(WebauthnError::InvalidRPOrigin);
        }

        if client_data.cross_origin == Some(true) {
            debug!(origin = %client_data.origin, "ceremony ran in a cross origin frame");
        }

        Ok(compute_sha256(client_data_json))
    }

    fn verify_authenticator_data(
        &self,
        auth_data: &AuthenticatorData,
        policy: UserVerificationPolicy,
    ) -> WebauthnResult<()> {
        if auth_data.rp_id_hash != self.config.rp_id_hash {
            debug!("rp id hash does not match this relying party");
            return Err(WebauthnError::InvalidRPIDHash);
        }

        if !auth_data.user_present {
            debug!("user present flag not set");
            return Err(WebauthnError::UserNotPresent);
        }

        if policy == UserVerificationPolicy::Required && !auth_data.user_verified {
            debug!("user verification required but not performed");
            return Err(WebauthnError::UserNotVerified);
        }

        if let Some(ext) = &auth_data.extensions {
            debug!(?ext, "authenticator extension outputs");
        }

        Ok(())
    }

    fn verify_attestation(
        &self,
        fmt: &str,
        ctx: &AttestationContext<'_>,
    ) -> WebauthnResult<(ParsedAttestationData, AttestationMetadata)> {
        let formats = &self.config.attestation_formats;

        if !formats.contains(fmt)
            && self.config.allow_unsupported_attestation_formats
            && self.config.attestation_ca_list.is_none()
        {
            warn!(%fmt, "accepting unsupported attestation format as uncertain");
            return Ok((ParsedAttestationData::Uncertain, AttestationMetadata::None));
        }

        formats.verify(fmt, ctx)
    }

    fn assert_attestation_trusted(
        &self,
        attestation: &ParsedAttestationData,
        aaguid: &Uuid,
    ) -> WebauthnResult<()> {
        let ca_list = match &self.config.attestation_ca_list {
            Some(ca_list) => ca_list,
            None => return Ok(()),
        };

        let ca = verify_attestation_ca_chain(
            attestation,
            ca_list,
            self.config.danger_disable_certificate_time_checks,
        )?
        .ok_or_else(|| {
            debug!(
                type_ = ?attestation.attestation_type(),
                "attestation has no certificate chain to verify"
            );
            WebauthnError::AttestationNotVerifiable
        })?;

        if !ca.allows(aaguid) {
            debug!(%aaguid, "authenticator model is not trusted under this ca");
            return Err(WebauthnError::AttestationCertificateAAGUIDMismatch);
        }

        Ok(())
    }
}
