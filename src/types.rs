use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use serde::{Deserialize, Serialize};
use url::Url;

/// Length of the random nonce issued per login attempt.
const NONCE_LEN: usize = 8;

/// Normalize a user-supplied URL the way OpenID 1.x expects identity URLs to
/// be compared: the scheme defaults to `http` when absent, the host is
/// lowercased, default ports are elided, and an empty path becomes `/`.
pub(crate) fn normalize_url(value: &str) -> Result<Url, url::ParseError> {
    let trimmed = value.trim();
    let prefix = trimmed.get(..8).unwrap_or(trimmed).to_ascii_lowercase();
    if prefix.starts_with("http://") || prefix.starts_with("https://") {
        Url::parse(trimmed)
    } else {
        Url::parse(&format!("http://{trimmed}"))
    }
}

new_url_type![
    /// A claimed identity URL, as entered by the user or asserted by the
    /// provider, in normalized form.
    IdentityUrl
];

new_url_type![
    /// An identity provider endpoint, discovered from an `openid.server`
    /// link tag.
    ServerUrl
];

new_url_type![
    /// The URL on the relying party that the provider redirects back to.
    ReturnUrl
];

new_url_type![
    /// A URL the user must visit to complete setup with the provider, returned
    /// when an immediate-mode request needs user interaction.
    SetupUrl
];

new_type![
    /// The URL pattern identifying this relying party to the user when they
    /// authorize it. May contain a wildcard (e.g. `http://*.example.com/`),
    /// so it is not held to URL syntax.
    #[derive(Deserialize, Serialize)]
    TrustRoot(String)
];

new_type![
    /// Opaque association identifier assigned by the provider.
    #[derive(Deserialize, Eq, Hash, Serialize)]
    AssociationHandle(String)
];

new_secret_type![
    /// Single-use random value issued per login attempt to block callback
    /// replay.
    #[derive(Deserialize, Serialize)]
    Nonce(String)
    impl {
        /// Generate a new random nonce of 8 alphanumeric characters.
        pub fn new_random() -> Self {
            let value: String = thread_rng()
                .sample_iter(&Alphanumeric)
                .take(NONCE_LEN)
                .map(char::from)
                .collect();
            Nonce::new(value)
        }
    }
];

new_secret_type![
    /// The MAC secret negotiated with a provider as part of an association.
    #[derive(Deserialize, Serialize)]
    MacKey(Vec<u8>)
];

new_secret_type![
    /// The store-held secret used to authenticate bridge tokens. Must be
    /// high-entropy, server-private, and stable for the store's lifetime:
    /// rotating it invalidates every outstanding token.
    #[derive(Deserialize, Serialize)]
    AuthKey(Vec<u8>)
];

/// Association MAC algorithm. OpenID 1.x defines exactly one.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum AssociationType {
    /// `HMAC-SHA1`
    #[serde(rename = "HMAC-SHA1")]
    HmacSha1,
}
impl AssociationType {
    /// The wire representation of this association type.
    pub fn as_str(&self) -> &'static str {
        "HMAC-SHA1"
    }
}

/// Association session type, governing how the MAC secret is protected in
/// transit during the associate exchange.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum SessionType {
    /// `DH-SHA1`
    #[serde(rename = "DH-SHA1")]
    DhSha1,
}
impl SessionType {
    /// The wire representation of this session type.
    pub fn as_str(&self) -> &'static str {
        "DH-SHA1"
    }
}

/// Outcome of verifying a provider callback.
///
/// This is a closed set: every callback maps to exactly one of these, and the
/// library never panics or raises on a hostile callback.
#[derive(Clone, Debug, PartialEq)]
pub enum AuthenticationResult {
    /// Verified login. Carries the claimed identity URL that was verified.
    Success(IdentityUrl),
    /// The user declined to authorize this relying party.
    Cancelled,
    /// An immediate-mode request needs user interaction; redirect the user to
    /// the carried URL and retry with a `checkid_setup` request.
    SetupNeeded(SetupUrl),
    /// Any negative outcome: tampered or expired token, signature mismatch,
    /// nonce replay, provider-reported error, or missing required fields.
    /// Carries the claimed identity URL when the token survived verification.
    Failure(Option<IdentityUrl>),
}

/// Bridge state for one login attempt, returned by
/// [`Consumer::begin_auth`](crate::Consumer::begin_auth).
///
/// The caller is responsible for carrying the [token](Self::token) across
/// requests (in a session, a cookie, or a `return_to` query argument) and
/// handing it back to [`Consumer::complete_auth`](crate::Consumer::complete_auth)
/// when the provider redirects the browser back. The token is
/// HMAC-authenticated and time-bounded, so it may safely travel through the
/// browser.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AuthRequest {
    token: String,
    server_id: IdentityUrl,
    server_url: ServerUrl,
    nonce: Nonce,
}
impl AuthRequest {
    pub(crate) fn new(
        token: String,
        server_id: IdentityUrl,
        server_url: ServerUrl,
        nonce: Nonce,
    ) -> Self {
        Self {
            token,
            server_id,
            server_url,
            nonce,
        }
    }

    /// The opaque, tamper-evident token binding this login attempt together.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// The identity URL the provider will assert (the delegate when one was
    /// discovered, otherwise the claimed identity URL).
    pub fn server_id(&self) -> &IdentityUrl {
        &self.server_id
    }

    /// The provider endpoint discovered for this identity.
    pub fn server_url(&self) -> &ServerUrl {
        &self.server_url
    }

    /// The single-use nonce issued for this login attempt.
    pub fn nonce(&self) -> &Nonce {
        &self.nonce
    }
}
