//! Mints and verifies the opaque token that carries the bridge state for one
//! login attempt across the browser redirect.
//!
//! Almost nothing can be held in memory between the two legs of a login, so
//! the token packs the five bridge fields into a NUL-joined string,
//! authenticates it with HMAC-SHA1 under the store's auth key, and hands the
//! result to the caller as standard base64. Verification is the only way back
//! in: the MAC must check out and the embedded timestamp must be fresh.

use crate::crypto::{self, SHA1_LEN};
use crate::types::{AuthKey, IdentityUrl, Nonce, ServerUrl};

use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};

/// Tokens older than this many seconds are rejected.
pub(crate) const TOKEN_LIFETIME_SECS: i64 = 300;

#[derive(Debug, PartialEq)]
pub(crate) enum TokenError {
    /// Not valid base64.
    Encoding,
    /// The MAC did not verify under the store's auth key.
    Signature,
    /// Too short, wrong field count, or fields that fail to re-parse.
    Malformed,
    /// Minted more than [`TOKEN_LIFETIME_SECS`] ago.
    Expired,
}

/// The bridge fields recovered from a verified token. The timestamp is
/// dropped once the freshness check passes.
#[derive(Debug)]
pub(crate) struct TokenFields {
    pub(crate) nonce: Nonce,
    pub(crate) consumer_id: IdentityUrl,
    pub(crate) server_id: IdentityUrl,
    pub(crate) server_url: ServerUrl,
}

pub(crate) fn mint(
    auth_key: &AuthKey,
    nonce: &Nonce,
    consumer_id: &IdentityUrl,
    server_id: &IdentityUrl,
    server_url: &ServerUrl,
) -> String {
    mint_at(Utc::now(), auth_key, nonce, consumer_id, server_id, server_url)
}

fn mint_at(
    now: DateTime<Utc>,
    auth_key: &AuthKey,
    nonce: &Nonce,
    consumer_id: &IdentityUrl,
    server_id: &IdentityUrl,
    server_url: &ServerUrl,
) -> String {
    let joined = [
        now.timestamp().to_string().as_str(),
        nonce.secret().as_str(),
        consumer_id.as_str(),
        server_id.as_str(),
        server_url.as_str(),
    ]
    .join("\0");
    let mut raw = crypto::hmac_sha1(auth_key.secret(), joined.as_bytes());
    raw.extend_from_slice(joined.as_bytes());
    BASE64_STANDARD.encode(raw)
}

pub(crate) fn verify(auth_key: &AuthKey, token: &str) -> Result<TokenFields, TokenError> {
    verify_at(Utc::now(), auth_key, token)
}

fn verify_at(
    now: DateTime<Utc>,
    auth_key: &AuthKey,
    token: &str,
) -> Result<TokenFields, TokenError> {
    let raw = BASE64_STANDARD
        .decode(token.trim())
        .map_err(|_| TokenError::Encoding)?;
    if raw.len() < SHA1_LEN {
        return Err(TokenError::Malformed);
    }
    let (sig, joined) = raw.split_at(SHA1_LEN);
    if !crypto::hmac_sha1_verify(auth_key.secret(), joined, sig) {
        return Err(TokenError::Signature);
    }

    let joined = std::str::from_utf8(joined).map_err(|_| TokenError::Malformed)?;
    let parts: Vec<&str> = joined.split('\0').collect();
    let &[timestamp, nonce, consumer_id, server_id, server_url] = parts.as_slice() else {
        return Err(TokenError::Malformed);
    };

    let timestamp: i64 = timestamp.parse().map_err(|_| TokenError::Malformed)?;
    if timestamp == 0 {
        return Err(TokenError::Malformed);
    }
    if timestamp + TOKEN_LIFETIME_SECS < now.timestamp() {
        return Err(TokenError::Expired);
    }

    Ok(TokenFields {
        nonce: Nonce::new(nonce.to_string()),
        consumer_id: IdentityUrl::new(consumer_id.to_string())
            .map_err(|_| TokenError::Malformed)?,
        server_id: IdentityUrl::new(server_id.to_string()).map_err(|_| TokenError::Malformed)?,
        server_url: ServerUrl::new(server_url.to_string()).map_err(|_| TokenError::Malformed)?,
    })
}

#[cfg(test)]
mod tests {
    use super::{mint_at, verify_at, TokenError, TOKEN_LIFETIME_SECS};
    use crate::crypto;
    use crate::types::{AuthKey, IdentityUrl, Nonce, ServerUrl};

    use base64::prelude::BASE64_STANDARD;
    use base64::Engine;
    use chrono::{DateTime, Duration, Utc};

    fn auth_key() -> AuthKey {
        AuthKey::new(b"sekrit".to_vec())
    }

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn mint_sample(at: DateTime<Utc>, key: &AuthKey) -> String {
        mint_at(
            at,
            key,
            &Nonce::new("arandomn".to_string()),
            &IdentityUrl::new("http://alice.example/".to_string()).unwrap(),
            &IdentityUrl::new("http://alice.id.example/".to_string()).unwrap(),
            &ServerUrl::new("http://idp.example/op".to_string()).unwrap(),
        )
    }

    // Forge a token whose MAC is valid but whose payload is arbitrary.
    fn forge(key: &AuthKey, joined: &str) -> String {
        let mut raw = crypto::hmac_sha1(key.secret(), joined.as_bytes());
        raw.extend_from_slice(joined.as_bytes());
        BASE64_STANDARD.encode(raw)
    }

    #[test]
    fn test_round_trip() {
        let key = auth_key();
        let minted = now();
        let token = mint_sample(minted, &key);
        let fields = verify_at(minted + Duration::seconds(299), &key, &token).unwrap();
        assert_eq!(fields.nonce.secret(), "arandomn");
        assert_eq!(fields.consumer_id.as_str(), "http://alice.example/");
        assert_eq!(fields.server_id.as_str(), "http://alice.id.example/");
        assert_eq!(fields.server_url.as_str(), "http://idp.example/op");
    }

    #[test]
    fn test_lifetime_boundary() {
        let key = auth_key();
        let minted = now();
        let token = mint_sample(minted, &key);
        // Exactly TOKEN_LIFETIME old is still acceptable; one second past is not.
        assert!(verify_at(
            minted + Duration::seconds(TOKEN_LIFETIME_SECS),
            &key,
            &token
        )
        .is_ok());
        assert_eq!(
            verify_at(
                minted + Duration::seconds(TOKEN_LIFETIME_SECS + 1),
                &key,
                &token
            )
            .unwrap_err(),
            TokenError::Expired
        );
    }

    #[test]
    fn test_wrong_key_rejected() {
        let minted = now();
        let token = mint_sample(minted, &auth_key());
        assert_eq!(
            verify_at(minted, &AuthKey::new(b"other key".to_vec()), &token).unwrap_err(),
            TokenError::Signature
        );
    }

    #[test]
    fn test_every_byte_mutation_rejected() {
        let key = auth_key();
        let minted = now();
        let token = mint_sample(minted, &key);
        let raw = BASE64_STANDARD.decode(&token).unwrap();
        for position in 0..raw.len() {
            let mut mutated = raw.clone();
            mutated[position] ^= 0x01;
            let mutated_token = BASE64_STANDARD.encode(&mutated);
            assert!(
                verify_at(minted, &key, &mutated_token).is_err(),
                "mutation at byte {position} was accepted"
            );
        }
    }

    #[test]
    fn test_not_base64() {
        assert_eq!(
            verify_at(now(), &auth_key(), "!!! not a token !!!").unwrap_err(),
            TokenError::Encoding
        );
    }

    #[test]
    fn test_too_short() {
        let short = BASE64_STANDARD.encode(b"short");
        assert_eq!(
            verify_at(now(), &auth_key(), &short).unwrap_err(),
            TokenError::Malformed
        );
    }

    #[test]
    fn test_wrong_field_count() {
        let key = auth_key();
        let joined = format!("{}\0nonce\0http://a.example/", now().timestamp());
        assert_eq!(
            verify_at(now(), &key, &forge(&key, &joined)).unwrap_err(),
            TokenError::Malformed
        );
    }

    #[test]
    fn test_zero_timestamp() {
        let key = auth_key();
        let joined = "0\0nonce\0http://a.example/\0http://a.example/\0http://idp.example/";
        assert_eq!(
            verify_at(now(), &key, &forge(&key, joined)).unwrap_err(),
            TokenError::Malformed
        );
    }
}
