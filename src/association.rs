//! Associations: the HMAC-SHA1 secrets shared with a provider, the signing
//! routine that uses them, and the Diffie–Hellman associate exchange that
//! negotiates them.

use crate::crypto;
use crate::dh::DiffieHellman;
use crate::fetchers::Fetcher;
use crate::kvform;
use crate::store::Store;
use crate::token::TOKEN_LIFETIME_SECS;
use crate::types::{AssociationHandle, AssociationType, MacKey, ServerUrl, SessionType};

use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use http::StatusCode;
use log::warn;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use std::collections::HashMap;

/// A MAC secret negotiated with one provider endpoint.
///
/// An association is valid while [`expires_in`](Self::expires_in) is positive
/// and its handle matches the one the provider cites in a callback; callbacks
/// naming an unknown or expired handle fall back to the
/// `check_authentication` recheck.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Association {
    handle: AssociationHandle,
    secret: MacKey,
    assoc_type: AssociationType,
    issued: DateTime<Utc>,
    /// Lifetime in seconds, as granted by the provider.
    lifetime: i64,
}

impl Association {
    /// Reassemble an association, e.g. when loading one from a persistent
    /// store.
    pub fn new(
        handle: AssociationHandle,
        secret: MacKey,
        assoc_type: AssociationType,
        issued: DateTime<Utc>,
        lifetime: i64,
    ) -> Self {
        Self {
            handle,
            secret,
            assoc_type,
            issued,
            lifetime,
        }
    }

    /// The opaque handle the provider assigned to this association.
    pub fn handle(&self) -> &AssociationHandle {
        &self.handle
    }

    /// The MAC algorithm; always HMAC-SHA1 in OpenID 1.x.
    pub fn assoc_type(&self) -> AssociationType {
        self.assoc_type
    }

    /// When the association was issued.
    pub fn issued(&self) -> DateTime<Utc> {
        self.issued
    }

    /// Time remaining before expiry; non-positive once expired.
    pub fn expires_in(&self) -> Duration {
        self.expires_in_at(Utc::now())
    }

    pub(crate) fn expires_in_at(&self, now: DateTime<Utc>) -> Duration {
        self.issued + Duration::seconds(self.lifetime) - now
    }

    /// Whether this association has outlived its granted lifetime.
    pub fn is_expired(&self) -> bool {
        self.expires_in() <= Duration::zero()
    }

    /// Sign the named query fields, in order: the base string is the KV-form
    /// of `name:value-of-openid.<name>` records (an absent field signs as
    /// empty), MACed with this association's secret and base64-encoded.
    pub fn sign(&self, signed_fields: &[&str], query: &HashMap<String, String>) -> String {
        let base = signature_base(signed_fields, query);
        BASE64_STANDARD.encode(crypto::hmac_sha1(self.secret.secret(), base.as_bytes()))
    }

    /// Recompute the signature over the named fields and compare it against
    /// `signature` (standard base64) in constant time.
    pub fn verify_signature(
        &self,
        signed_fields: &[&str],
        query: &HashMap<String, String>,
        signature: &str,
    ) -> bool {
        let Ok(provided) = BASE64_STANDARD.decode(signature) else {
            return false;
        };
        let base = signature_base(signed_fields, query);
        let expected = crypto::hmac_sha1(self.secret.secret(), base.as_bytes());
        expected.ct_eq(&provided).into()
    }
}

fn signature_base(signed_fields: &[&str], query: &HashMap<String, String>) -> String {
    let pairs: Vec<(&str, &str)> = signed_fields
        .iter()
        .map(|name| {
            let value = query
                .get(&format!("openid.{name}"))
                .map(String::as_str)
                .unwrap_or("");
            (*name, value)
        })
        .collect();
    kvform::encode(pairs)
}

/// Produce a usable association for a provider endpoint, or `None` when the
/// consumer must fall back to dumb mode.
///
/// A dumb store disables association caching outright. Otherwise the stored
/// association is reused unless there is none, or `replace` is requested and
/// it would expire within the token lifetime; in those cases a fresh one is
/// negotiated. Concurrent callers may negotiate redundantly; the last one
/// stored wins.
pub(crate) fn get_association<S, F>(
    store: &S,
    fetcher: &F,
    server_url: &ServerUrl,
    replace: bool,
) -> Option<Association>
where
    S: Store,
    F: Fetcher,
{
    if store.is_dumb() {
        return None;
    }
    if let Some(existing) = store.get_association(server_url) {
        let expiring = existing.expires_in() < Duration::seconds(TOKEN_LIFETIME_SECS);
        if !(replace && expiring) {
            return Some(existing);
        }
    }
    associate(store, fetcher, server_url)
}

/// Run the associate exchange against `server_url` and store the result.
fn associate<S, F>(store: &S, fetcher: &F, server_url: &ServerUrl) -> Option<Association>
where
    S: Store,
    F: Fetcher,
{
    let dh = DiffieHellman::new_default();

    let mut form = url::form_urlencoded::Serializer::new(String::new());
    form.append_pair("openid.mode", "associate");
    form.append_pair("openid.assoc_type", AssociationType::HmacSha1.as_str());
    form.append_pair("openid.session_type", SessionType::DhSha1.as_str());
    form.append_pair(
        "openid.dh_consumer_public",
        &crypto::long_to_base64(&dh.public()),
    );
    if !dh.is_default() {
        form.append_pair("openid.dh_modulus", &crypto::long_to_base64(dh.modulus()));
        form.append_pair("openid.dh_gen", &crypto::long_to_base64(dh.generator()));
    }
    let body = form.finish();

    let response = match fetcher.post(server_url.url(), body.as_bytes()) {
        Ok(response) => response,
        Err(err) => {
            warn!("associate request to {} failed: {err}", server_url.as_str());
            return None;
        }
    };
    let results = kvform::to_map(&response.body_str());

    if response.status == StatusCode::BAD_REQUEST {
        // A structured provider error.
        warn!(
            "associate error from {}: {}",
            server_url.as_str(),
            results.get("error").map(String::as_str).unwrap_or("<no error field>")
        );
        return None;
    }
    if response.status != StatusCode::OK {
        warn!(
            "associate with {} returned HTTP {}",
            server_url.as_str(),
            response.status
        );
        return None;
    }

    let association = parse_association(&dh, &results)?;
    store.store_association(server_url, association.clone());
    Some(association)
}

fn parse_association(
    dh: &DiffieHellman,
    results: &HashMap<String, String>,
) -> Option<Association> {
    let required = |key: &str| {
        let value = results.get(key);
        if value.is_none() {
            warn!("associate response missing `{key}`");
        }
        value
    };

    let assoc_type = required("assoc_type")?;
    if assoc_type != AssociationType::HmacSha1.as_str() {
        warn!("unsupported assoc_type `{assoc_type}`");
        return None;
    }
    let handle = required("assoc_handle")?;

    let lifetime = match results
        .get("expires_in")
        .map(String::as_str)
        .unwrap_or("0")
        .parse::<i64>()
    {
        Ok(lifetime) => lifetime,
        Err(_) => {
            warn!("associate response carried a non-numeric `expires_in`");
            return None;
        }
    };

    let secret = match results.get("session_type").map(String::as_str) {
        // An unprotected session: the MAC key arrives in the clear.
        None => match BASE64_STANDARD.decode(required("mac_key")?) {
            Ok(secret) => secret,
            Err(_) => {
                warn!("associate response carried undecodable `mac_key`");
                return None;
            }
        },
        Some(session_type) if session_type == SessionType::DhSha1.as_str() => {
            let server_public = match crypto::base64_to_long(required("dh_server_public")?) {
                Some(server_public) => server_public,
                None => {
                    warn!("associate response carried undecodable `dh_server_public`");
                    return None;
                }
            };
            let enc_mac_key = match BASE64_STANDARD.decode(required("enc_mac_key")?) {
                Ok(enc_mac_key) => enc_mac_key,
                Err(_) => {
                    warn!("associate response carried undecodable `enc_mac_key`");
                    return None;
                }
            };
            match dh.xor_secret(&server_public, &enc_mac_key) {
                Some(secret) => secret,
                None => {
                    warn!(
                        "associate response `enc_mac_key` length {} does not match the digest",
                        enc_mac_key.len()
                    );
                    return None;
                }
            }
        }
        Some(session_type) => {
            warn!("unsupported session_type `{session_type}`");
            return None;
        }
    };

    Some(Association::new(
        AssociationHandle::new(handle.clone()),
        MacKey::new(secret),
        AssociationType::HmacSha1,
        Utc::now(),
        lifetime,
    ))
}
