//! Relying party configuration, fixed when the [`Webauthn`] instance is built.

use std::collections::BTreeSet;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use url::{Host, Url};

use crate::attestation::{
    AndroidSafetyNetVerifier, AttestationCaList, AttestationFormats, AttestationVerifier,
};
use crate::constants::{AUTHENTICATOR_TIMEOUT, SESSION_TTL_SECS};
use crate::core::Webauthn;
use crate::error::{WebauthnError, WebauthnResult};
use crate::interface::CredentialDescriptor;
use crate::proto::*;

/// What to do when an authentication reports a signature counter that did not advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CounterPolicy {
    /// Fail the ceremony.
    #[default]
    Strict,
    /// Accept the assertion, flag the credential with `clone_warning`, and keep the
    /// stored counter.
    Warn,
}

/// The immutable relying party configuration owned by a [`Webauthn`] instance.
#[derive(Debug, Clone)]
pub struct WebauthnConfig {
    pub(crate) rp_id: String,
    pub(crate) rp_name: String,
    pub(crate) rp_icon: Option<String>,
    pub(crate) rp_id_hash: [u8; 32],
    pub(crate) allowed_origins: BTreeSet<Url>,
    pub(crate) allow_subdomains: bool,
    pub(crate) allow_any_port: bool,
    pub(crate) timeout: u32,
    pub(crate) session_ttl: Duration,
    pub(crate) attestation_preference: AttestationConveyancePreference,
    pub(crate) credential_algorithms: Vec<COSEAlgorithm>,
    pub(crate) user_verification: UserVerificationPolicy,
    pub(crate) authenticator_attachment: Option<AuthenticatorAttachment>,
    pub(crate) require_resident_key: bool,
    pub(crate) counter_policy: CounterPolicy,
    pub(crate) allow_unsupported_attestation_formats: bool,
    pub(crate) attestation_ca_list: Option<AttestationCaList>,
    pub(crate) danger_disable_certificate_time_checks: bool,
    pub(crate) attestation_formats: AttestationFormats,
}

impl WebauthnConfig {
    /// The relying party id credentials are bound to.
    pub fn rp_id(&self) -> &str {
        &self.rp_id
    }

    /// The relying party name shown to users.
    pub fn rp_name(&self) -> &str {
        &self.rp_name
    }

    /// Origins client data may claim.
    pub fn allowed_origins(&self) -> &BTreeSet<Url> {
        &self.allowed_origins
    }

    /// The default algorithm list offered at registration, in preference order.
    pub fn credential_algorithms(&self) -> &[COSEAlgorithm] {
        &self.credential_algorithms
    }

    /// How long a session stays valid after Begin.
    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    /// The counter regression policy.
    pub fn counter_policy(&self) -> CounterPolicy {
        self.counter_policy
    }

    /// True if `origin` matches one of the allowed origins under this configuration's
    /// subdomain and port rules.
    pub fn origin_allowed(&self, origin: &Url) -> bool {
        self.allowed_origins.iter().any(|allowed| {
            if allowed.scheme() != origin.scheme() {
                return false;
            }

            let host_ok = match (allowed.host_str(), origin.host()) {
                (Some(a), Some(host)) if self.allow_subdomains => host_within(&host, a),
                (Some(a), Some(_)) => origin.host_str() == Some(a),
                _ => false,
            };

            host_ok
                && (self.allow_any_port
                    || allowed.port_or_known_default() == origin.port_or_known_default())
        })
    }
}

// A domain is within `parent` if it equals it or is a subdomain of it. We need the
// '.' so that myexample.com != example.com. IP literals have no parent domains and
// only ever match exactly.
fn host_within(host: &Host<&str>, parent: &str) -> bool {
    match host {
        Host::Domain(d) if parent.parse::<IpAddr>().is_ok() => *d == parent,
        Host::Domain(d) => *d == parent || d.ends_with(&format!(".{}", parent)),
        Host::Ipv4(ip) => parent == ip.to_string(),
        Host::Ipv6(ip) => parent == ip.to_string() || parent == format!("[{}]", ip),
    }
}

fn rp_id_valid_for(rp_id: &str, origin: &Url) -> bool {
    origin
        .host()
        .map(|host| host_within(&host, rp_id))
        .unwrap_or(false)
}

/// A builder for a [`Webauthn`] instance. All settings are validated at [`build`](Self::build).
#[derive(Debug)]
pub struct WebauthnBuilder<'a> {
    rp_id: &'a str,
    rp_origin: &'a Url,
    rp_name: Option<&'a str>,
    rp_icon: Option<&'a str>,
    extra_origins: Vec<Url>,
    allow_subdomains: bool,
    allow_any_port: bool,
    timeout: u32,
    session_ttl: Duration,
    attestation_preference: AttestationConveyancePreference,
    algorithms: Vec<COSEAlgorithm>,
    user_verification: UserVerificationPolicy,
    authenticator_attachment: Option<AuthenticatorAttachment>,
    require_resident_key: bool,
    counter_policy: CounterPolicy,
    allow_unsupported_attestation_formats: bool,
    attestation_ca_list: Option<AttestationCaList>,
    danger_disable_certificate_time_checks: bool,
    attestation_formats: AttestationFormats,
    custom_formats: BTreeSet<String>,
}

impl<'a> WebauthnBuilder<'a> {
    /// Initiate a new builder from the relying party id and primary origin.
    ///
    /// rp_id is what credentials bind themselves to. It can NOT be changed later
    /// without breaking every credential registered under it.
    ///
    /// # Errors
    ///
    /// rp_id must be an effective domain of rp_origin. If you are hosting
    /// `https://idm.example.com`, rp_id must be `idm.example.com` or `example.com`.
    pub fn new(rp_id: &'a str, rp_origin: &'a Url) -> WebauthnResult<Self> {
        if rp_id.is_empty() || !rp_id_valid_for(rp_id, rp_origin) {
            error!(%rp_id, %rp_origin, "rp_id is not an effective domain of rp_origin");
            return Err(WebauthnError::InvalidRpId);
        }

        Ok(WebauthnBuilder {
            rp_id,
            rp_origin,
            rp_name: None,
            rp_icon: None,
            extra_origins: Vec::new(),
            allow_subdomains: false,
            allow_any_port: false,
            timeout: AUTHENTICATOR_TIMEOUT,
            session_ttl: Duration::from_secs(SESSION_TTL_SECS),
            attestation_preference: AttestationConveyancePreference::None,
            algorithms: COSEAlgorithm::secure_algs(),
            user_verification: UserVerificationPolicy::Preferred,
            authenticator_attachment: None,
            require_resident_key: false,
            counter_policy: CounterPolicy::Strict,
            allow_unsupported_attestation_formats: false,
            attestation_ca_list: None,
            danger_disable_certificate_time_checks: false,
            attestation_formats: AttestationFormats::with_defaults(),
            custom_formats: BTreeSet::new(),
        })
    }

    /// Set the relying party name. Defaults to rp_id.
    pub fn rp_name(mut self, rp_name: &'a str) -> Self {
        self.rp_name = Some(rp_name);
        self
    }

    /// Set an icon URL for the relying party.
    pub fn rp_icon(mut self, rp_icon: &'a str) -> Self {
        self.rp_icon = Some(rp_icon);
        self
    }

    /// Accept client data from another origin. It must also have rp_id as an effective
    /// domain, which is checked at build.
    pub fn append_allowed_origin(mut self, origin: &Url) -> Self {
        self.extra_origins.push(origin.clone());
        self
    }

    /// Consider subdomains of the allowed origins valid, such as `https://au.idm.example.com`
    /// for `https://idm.example.com`. Defaults to false.
    pub fn allow_subdomains(mut self, allow: bool) -> Self {
        self.allow_subdomains = allow;
        self
    }

    /// Skip port checks on origin matches. Defaults to false.
    pub fn allow_any_port(mut self, allow: bool) -> Self {
        self.allow_any_port = allow;
        self
    }

    /// Milliseconds the client is told to wait for the authenticator.
    pub fn timeout(mut self, timeout_ms: u32) -> Self {
        self.timeout = timeout_ms;
        self
    }

    /// How long a session is valid after Begin.
    pub fn session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// The default attestation conveyance preference.
    pub fn attestation_preference(mut self, pref: AttestationConveyancePreference) -> Self {
        self.attestation_preference = pref;
        self
    }

    /// The algorithms offered at registration, most preferred first.
    pub fn credential_algorithms(mut self, algorithms: Vec<COSEAlgorithm>) -> Self {
        self.algorithms = algorithms;
        self
    }

    /// The default user verification requirement.
    pub fn user_verification(mut self, policy: UserVerificationPolicy) -> Self {
        self.user_verification = policy;
        self
    }

    /// Restrict registration to platform or cross-platform authenticators.
    pub fn authenticator_attachment(mut self, attachment: Option<AuthenticatorAttachment>) -> Self {
        self.authenticator_attachment = attachment;
        self
    }

    /// Request a discoverable credential at registration.
    pub fn require_resident_key(mut self, require: bool) -> Self {
        self.require_resident_key = require;
        self
    }

    /// What to do with a counter that did not advance.
    pub fn counter_policy(mut self, policy: CounterPolicy) -> Self {
        self.counter_policy = policy;
        self
    }

    /// Accept registrations whose attestation format has no verifier, treating them
    /// as uncertain attestation. Defaults to false. Has no effect with a CA list.
    pub fn allow_unsupported_attestation_formats(mut self, allow: bool) -> Self {
        self.allow_unsupported_attestation_formats = allow;
        self
    }

    /// Only accept registrations whose attestation chains to one of these CAs.
    pub fn attestation_ca_list(mut self, ca_list: AttestationCaList) -> Self {
        self.attestation_ca_list = Some(ca_list);
        self
    }

    /// Register or replace the verifier for an attestation format.
    pub fn attestation_format(
        mut self,
        format: &str,
        verifier: Arc<dyn AttestationVerifier>,
    ) -> Self {
        self.attestation_formats.register(format, verifier);
        self.custom_formats.insert(format.to_string());
        self
    }

    /// Disable certificate and response timestamp validity checks. Only for replaying
    /// captured ceremonies.
    ///
    /// This swaps in a safetynet verifier that skips the response timestamp, unless a
    /// verifier for "android-safetynet" was given to
    /// [`attestation_format`](Self::attestation_format), which is kept as is.
    pub fn danger_disable_certificate_time_checks(mut self, disable: bool) -> Self {
        self.danger_disable_certificate_time_checks = disable;
        self
    }

    /// Validate the settings and construct the [`Webauthn`] instance.
    pub fn build(self) -> WebauthnResult<Webauthn> {
        let mut allowed_origins = BTreeSet::new();
        allowed_origins.insert(self.rp_origin.clone());
        for origin in self.extra_origins {
            if !rp_id_valid_for(self.rp_id, &origin) {
                error!(%origin, "allowed origin is not within rp_id");
                return Err(WebauthnError::InvalidRpId);
            }
            allowed_origins.insert(origin);
        }

        if self.algorithms.is_empty() {
            error!("no credential algorithms configured");
            return Err(WebauthnError::Configuration);
        }

        if self.algorithms.contains(&COSEAlgorithm::INSECURE_RS1) {
            error!("RS1 can not be offered as a credential algorithm");
            return Err(WebauthnError::CredentialInsecureCryptography);
        }

        if matches!(&self.attestation_ca_list, Some(l) if l.is_empty()) {
            error!("an empty attestation ca list would reject every registration");
            return Err(WebauthnError::AttestationCertificateTrustStoreEmpty);
        }

        let mut attestation_formats = self.attestation_formats;
        if self.danger_disable_certificate_time_checks
            && !self.custom_formats.contains("android-safetynet")
        {
            attestation_formats.register(
                "android-safetynet",
                Arc::new(AndroidSafetyNetVerifier {
                    danger_ignore_timestamp: true,
                }),
            );
        }

        let config = WebauthnConfig {
            rp_id: self.rp_id.to_string(),
            rp_name: self.rp_name.unwrap_or(self.rp_id).to_string(),
            rp_icon: self.rp_icon.map(str::to_string),
            rp_id_hash: crate::crypto::compute_sha256(self.rp_id.as_bytes()),
            allowed_origins,
            allow_subdomains: self.allow_subdomains,
            allow_any_port: self.allow_any_port,
            timeout: self.timeout,
            session_ttl: self.session_ttl,
            attestation_preference: self.attestation_preference,
            credential_algorithms: self.algorithms,
            user_verification: self.user_verification,
            authenticator_attachment: self.authenticator_attachment,
            require_resident_key: self.require_resident_key,
            counter_policy: self.counter_policy,
            allow_unsupported_attestation_formats: self.allow_unsupported_attestation_formats,
            attestation_ca_list: self.attestation_ca_list,
            danger_disable_certificate_time_checks: self.danger_disable_certificate_time_checks,
            attestation_formats,
        };

        Ok(Webauthn::new(config))
    }
}

/// Per-ceremony overrides for registration. Unset fields fall back to the
/// [`WebauthnConfig`] defaults.
#[derive(Debug, Clone, Default)]
pub struct RegistrationOptions {
    pub(crate) user_verification: Option<UserVerificationPolicy>,
    pub(crate) attestation_preference: Option<AttestationConveyancePreference>,
    pub(crate) authenticator_attachment: Option<AuthenticatorAttachment>,
    pub(crate) require_resident_key: Option<bool>,
    pub(crate) credential_algorithms: Option<Vec<COSEAlgorithm>>,
    pub(crate) exclude_credentials: Option<Vec<CredentialDescriptor>>,
    pub(crate) extensions: Option<RequestExtensions>,
}

impl RegistrationOptions {
    /// Start building a set of overrides.
    pub fn builder() -> RegistrationOptionsBuilder {
        RegistrationOptionsBuilder::default()
    }
}

/// Builder for [`RegistrationOptions`].
#[derive(Debug, Clone, Default)]
pub struct RegistrationOptionsBuilder {
    inner: RegistrationOptions,
}

impl RegistrationOptionsBuilder {
    /// The user verification requirement for this ceremony.
    pub fn user_verification(mut self, policy: UserVerificationPolicy) -> Self {
        self.inner.user_verification = Some(policy);
        self
    }

    /// The attestation conveyance preference for this ceremony.
    pub fn attestation(mut self, pref: AttestationConveyancePreference) -> Self {
        self.inner.attestation_preference = Some(pref);
        self
    }

    /// Restrict to a class of authenticator.
    pub fn authenticator_attachment(mut self, attachment: AuthenticatorAttachment) -> Self {
        self.inner.authenticator_attachment = Some(attachment);
        self
    }

    /// Request a discoverable credential.
    pub fn require_resident_key(mut self, require: bool) -> Self {
        self.inner.require_resident_key = Some(require);
        self
    }

    /// Offer these algorithms instead of the configured ones.
    pub fn credential_algorithms(mut self, algorithms: Vec<COSEAlgorithm>) -> Self {
        self.inner.credential_algorithms = Some(algorithms);
        self
    }

    /// Exclude these credentials instead of the user's registered credentials.
    pub fn exclude_credentials(mut self, creds: Vec<CredentialDescriptor>) -> Self {
        self.inner.exclude_credentials = Some(creds);
        self
    }

    /// Client extensions to request.
    pub fn extensions(mut self, extensions: RequestExtensions) -> Self {
        self.inner.extensions = Some(extensions);
        self
    }

    /// Validate and finish.
    pub fn build(self) -> WebauthnResult<RegistrationOptions> {
        if let Some(algs) = &self.inner.credential_algorithms {
            if algs.is_empty() {
                return Err(WebauthnError::Configuration);
            }
            if algs.contains(&COSEAlgorithm::INSECURE_RS1) {
                return Err(WebauthnError::CredentialInsecureCryptography);
            }
        }
        Ok(self.inner)
    }
}

/// Per-ceremony overrides for authentication.
#[derive(Debug, Clone, Default)]
pub struct LoginOptions {
    pub(crate) user_verification: Option<UserVerificationPolicy>,
    pub(crate) extensions: Option<RequestExtensions>,
}

impl LoginOptions {
    /// Start building a set of overrides.
    pub fn builder() -> LoginOptionsBuilder {
        LoginOptionsBuilder::default()
    }
}

/// Builder for [`LoginOptions`].
#[derive(Debug, Clone, Default)]
pub struct LoginOptionsBuilder {
    inner: LoginOptions,
}

impl LoginOptionsBuilder {
    /// The user verification requirement for this ceremony.
    pub fn user_verification(mut self, policy: UserVerificationPolicy) -> Self {
        self.inner.user_verification = Some(policy);
        self
    }

    /// Client extensions to request.
    pub fn extensions(mut self, extensions: RequestExtensions) -> Self {
        self.inner.extensions = Some(extensions);
        self
    }

    /// Finish.
    pub fn build(self) -> LoginOptions {
        self.inner
    }
}
