//! The relying-party facade: three operations that together drive one
//! browser-redirect login.
//!
//! [`Consumer::begin_auth`] discovers the provider behind a claimed identity
//! URL and mints the bridge token; [`Consumer::construct_redirect`] builds the
//! URL to send the browser to; [`Consumer::complete_auth`] reconciles the
//! provider's callback against the token, the stored association (or a
//! `check_authentication` recheck), and the single-use nonce.

use crate::association::{self, Association};
use crate::discovery::{self, DiscoveryError};
use crate::fetchers::Fetcher;
use crate::kvform;
use crate::store::Store;
use crate::token::{self, TokenFields};
use crate::types::{
    AssociationHandle, AuthRequest, AuthenticationResult, Nonce, ReturnUrl, ServerUrl, SetupUrl,
    TrustRoot,
};

use log::{debug, warn};
use url::Url;

use std::collections::{HashMap, HashSet};

#[cfg(test)]
mod tests;

// Fields admitted into the check_authentication request even when the
// provider did not list them in `openid.signed`.
const CHECK_AUTH_WHITELIST: [&str; 4] = ["assoc_handle", "sig", "signed", "invalidate_handle"];

/// An OpenID 1.x relying party.
///
/// Holds nothing per-login: concurrent logins share only the store and the
/// fetcher, and each login is linked across its two HTTP legs solely by the
/// minted token and the nonce recorded in the store.
pub struct Consumer<S, F> {
    store: S,
    fetcher: F,
    immediate: bool,
}

impl<S, F> Consumer<S, F>
where
    S: Store,
    F: Fetcher,
{
    /// Create a consumer over the given store and fetcher, issuing
    /// `checkid_setup` requests.
    pub fn new(store: S, fetcher: F) -> Self {
        Self {
            store,
            fetcher,
            immediate: false,
        }
    }

    /// Request non-interactive (`checkid_immediate`) authentication. When the
    /// provider needs user interaction it answers with a setup URL, surfaced
    /// as [`AuthenticationResult::SetupNeeded`].
    pub fn set_immediate(mut self, immediate: bool) -> Self {
        self.immediate = immediate;
        self
    }

    /// Start a login for a user-entered identity URL.
    ///
    /// Runs discovery against the claimed URL and, on success, binds the
    /// discovered triple and a fresh nonce into an [`AuthRequest`] whose
    /// token the caller must carry to the callback request.
    pub fn begin_auth(&self, user_url: &str) -> Result<AuthRequest, DiscoveryError> {
        let discovered = discovery::discover(&self.fetcher, user_url)?;
        let nonce = Nonce::new_random();
        let token = token::mint(
            &self.store.auth_key(),
            &nonce,
            &discovered.consumer_id,
            &discovered.server_id,
            &discovered.server_url,
        );
        Ok(AuthRequest::new(
            token,
            discovered.server_id,
            discovered.server_url,
            nonce,
        ))
    }

    /// Build the provider URL to redirect the user's browser to.
    ///
    /// Negotiates (or refreshes) an association so the callback can be
    /// verified locally, records the login's nonce in the store, and appends
    /// the `checkid` query onto the provider endpoint, preserving any query
    /// the endpoint already carries.
    pub fn construct_redirect(
        &self,
        auth_request: &AuthRequest,
        return_to: &ReturnUrl,
        trust_root: &TrustRoot,
    ) -> Url {
        let association = association::get_association(
            &self.store,
            &self.fetcher,
            auth_request.server_url(),
            true,
        );
        self.store.store_nonce(auth_request.nonce());

        let mode = if self.immediate {
            "checkid_immediate"
        } else {
            "checkid_setup"
        };

        let mut redirect = auth_request.server_url().url().clone();
        {
            let mut query = redirect.query_pairs_mut();
            query.append_pair("openid.identity", auth_request.server_id().as_str());
            query.append_pair("openid.return_to", return_to.as_str());
            query.append_pair("openid.trust_root", trust_root.as_str());
            query.append_pair("openid.mode", mode);
            if let Some(association) = &association {
                query.append_pair("openid.assoc_handle", association.handle().as_str());
            }
        }
        redirect
    }

    /// Verify the provider's callback.
    ///
    /// `token` is the value minted by [`begin_auth`](Self::begin_auth);
    /// `query` is the parsed callback query string. Never panics; every
    /// outcome, including hostile input, maps onto
    /// [`AuthenticationResult`]. The caller remains responsible for checking
    /// that `openid.return_to` matches the URL actually hit.
    pub fn complete_auth(
        &self,
        token: &str,
        query: &HashMap<String, String>,
    ) -> AuthenticationResult {
        let query = canonicalize_query(query);
        match query.get("openid.mode").map(String::as_str) {
            Some("cancel") => AuthenticationResult::Cancelled,
            Some("error") => {
                warn!(
                    "provider returned error: {}",
                    query
                        .get("openid.error")
                        .map(String::as_str)
                        .unwrap_or("<no error field>")
                );
                AuthenticationResult::Failure(None)
            }
            Some("id_res") => self.complete_id_res(token, &query),
            other => {
                debug!("unhandled openid.mode {other:?}");
                AuthenticationResult::Failure(None)
            }
        }
    }

    fn complete_id_res(
        &self,
        token: &str,
        query: &HashMap<String, String>,
    ) -> AuthenticationResult {
        let Ok(fields) = token::verify(&self.store.auth_key(), token) else {
            return AuthenticationResult::Failure(None);
        };
        let TokenFields {
            nonce,
            consumer_id,
            server_id,
            server_url,
        } = fields;

        let (Some(_return_to), Some(identity), Some(assoc_handle)) = (
            query.get("openid.return_to"),
            query.get("openid.identity"),
            query.get("openid.assoc_handle"),
        ) else {
            return AuthenticationResult::Failure(Some(consumer_id));
        };
        if identity != server_id.as_str() {
            debug!("callback asserted {identity}, expected {}", server_id.as_str());
            return AuthenticationResult::Failure(Some(consumer_id));
        }

        // An immediate-mode request the provider could not answer without
        // user interaction.
        if let Some(setup_url) = query.get("openid.user_setup_url") {
            return match SetupUrl::new(setup_url.clone()) {
                Ok(setup_url) => AuthenticationResult::SetupNeeded(setup_url),
                Err(_) => AuthenticationResult::Failure(Some(consumer_id)),
            };
        }

        let association = self
            .store
            .get_association(&server_url)
            .filter(|association| {
                association.handle().as_str() == assoc_handle && !association.is_expired()
            });

        let verified = match association {
            Some(association) => self.verify_directly(&association, query),
            None => self.check_auth(query, &server_url),
        };
        if !verified {
            return AuthenticationResult::Failure(Some(consumer_id));
        }

        // The nonce is the last gate: a valid signature with a spent nonce is
        // a replayed callback.
        if !self.store.use_nonce(&nonce) {
            debug!("nonce already used; rejecting replayed callback");
            return AuthenticationResult::Failure(Some(consumer_id));
        }
        AuthenticationResult::Success(consumer_id)
    }

    /// Smart mode: check the signature locally against the stored
    /// association.
    fn verify_directly(&self, association: &Association, query: &HashMap<String, String>) -> bool {
        let (Some(signature), Some(signed)) =
            (query.get("openid.sig"), query.get("openid.signed"))
        else {
            return false;
        };
        let signed_fields: Vec<&str> = signed.split(',').collect();
        association.verify_signature(&signed_fields, query, signature)
    }

    /// Dumb mode: no usable association, so ask the provider itself whether
    /// it issued this signature.
    fn check_auth(&self, query: &HashMap<String, String>, server_url: &ServerUrl) -> bool {
        let Some(signed) = query.get("openid.signed") else {
            return false;
        };
        let mut allowed: HashSet<&str> = signed.split(',').collect();
        allowed.extend(CHECK_AUTH_WHITELIST);

        let mut form = url::form_urlencoded::Serializer::new(String::new());
        for (key, value) in query {
            let Some(field) = key.strip_prefix("openid.") else {
                continue;
            };
            // The mode is overridden below; everything else passes through
            // only if the provider signed it or the whitelist admits it.
            if field == "mode" || !allowed.contains(field) {
                continue;
            }
            form.append_pair(key, value);
        }
        form.append_pair("openid.mode", "check_authentication");
        let body = form.finish();

        let response = match self.fetcher.post(server_url.url(), body.as_bytes()) {
            Ok(response) => response,
            Err(err) => {
                warn!(
                    "check_authentication request to {} failed: {err}",
                    server_url.as_str()
                );
                return false;
            }
        };
        let results = kvform::to_map(&response.body_str());

        if results.get("is_valid").map(String::as_str) != Some("true") {
            if let Some(error) = results.get("error") {
                warn!("check_authentication error: {error}");
            }
            return false;
        }

        // The provider may name a stale association to drop.
        if let Some(invalidate_handle) = results.get("invalidate_handle") {
            self.store.remove_association(
                server_url,
                &AssociationHandle::new(invalidate_handle.clone()),
            );
        }
        true
    }
}

// Form decoders commonly rewrite `.` in parameter names to `_`; put the
// `openid.` prefix back. The rewrite is limited to that prefix so unrelated
// keys cannot collide.
fn canonicalize_query(query: &HashMap<String, String>) -> HashMap<String, String> {
    query
        .iter()
        .map(|(key, value)| match key.strip_prefix("openid_") {
            Some(rest) => (format!("openid.{rest}"), value.clone()),
            None => (key.clone(), value.clone()),
        })
        .collect()
}
