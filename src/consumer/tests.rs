use super::{canonicalize_query, Consumer};
use crate::fetchers::{FetchError, FetchResponse, Fetcher};
use crate::store::{MemoryStore, Store};
use crate::types::{AuthenticationResult, ReturnUrl, TrustRoot};

use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use http::StatusCode;
use url::Url;

use std::collections::HashMap;
use std::sync::Mutex;

const IDENTITY_PAGE: &str =
    "<html><head><link rel=\"openid.server\" href=\"http://idp.example/op\"></head></html>";

/// Serves the identity page on GET and a canned associate response on POST.
struct StubFetcher {
    associate_body: String,
    posts: Mutex<Vec<String>>,
}

impl StubFetcher {
    fn new() -> Self {
        Self {
            associate_body: format!(
                "assoc_type:HMAC-SHA1\nassoc_handle:stub-handle\nexpires_in:3600\nmac_key:{}\n",
                BASE64_STANDARD.encode(b"twenty byte mac key!")
            ),
            posts: Mutex::new(Vec::new()),
        }
    }
}

impl Fetcher for StubFetcher {
    fn get(&self, url: &Url) -> Result<FetchResponse, FetchError> {
        Ok(FetchResponse::new(
            StatusCode::OK,
            url.clone(),
            IDENTITY_PAGE.as_bytes().to_vec(),
        ))
    }

    fn post(&self, url: &Url, body: &[u8]) -> Result<FetchResponse, FetchError> {
        self.posts
            .lock()
            .unwrap()
            .push(String::from_utf8_lossy(body).into_owned());
        Ok(FetchResponse::new(
            StatusCode::OK,
            url.clone(),
            self.associate_body.clone().into_bytes(),
        ))
    }
}

fn consumer(store: &MemoryStore) -> Consumer<&MemoryStore, StubFetcher> {
    Consumer::new(store, StubFetcher::new())
}

fn return_to() -> ReturnUrl {
    ReturnUrl::new("http://rp.example/done".to_string()).unwrap()
}

fn trust_root() -> TrustRoot {
    TrustRoot::new("http://rp.example/".to_string())
}

fn query_of(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn test_canonicalize_query() {
    let canonical = canonicalize_query(&query_of(&[
        ("openid_mode", "id_res"),
        ("openid.identity", "http://a.example/"),
        ("openid_assoc_handle", "h_1"),
        ("unrelated_key", "kept"),
    ]));
    assert_eq!(canonical.get("openid.mode").unwrap(), "id_res");
    assert_eq!(canonical.get("openid.identity").unwrap(), "http://a.example/");
    // Only the prefix is rewritten; inner underscores survive.
    assert_eq!(canonical.get("openid.assoc_handle").unwrap(), "h_1");
    assert_eq!(canonical.get("unrelated_key").unwrap(), "kept");
}

#[test]
fn test_begin_auth() {
    let store = MemoryStore::new();
    let request = consumer(&store).begin_auth("alice.example").unwrap();
    assert_eq!(request.server_id().as_str(), "http://alice.example/");
    assert_eq!(request.server_url().as_str(), "http://idp.example/op");
    assert_eq!(request.nonce().secret().len(), 8);
    assert!(!request.token().is_empty());
}

#[test]
fn test_construct_redirect() {
    let store = MemoryStore::new();
    let consumer = consumer(&store);
    let request = consumer.begin_auth("alice.example").unwrap();
    let redirect = consumer.construct_redirect(&request, &return_to(), &trust_root());

    // Exactly one associate exchange went out.
    let posts = consumer.fetcher.posts.lock().unwrap();
    assert_eq!(posts.len(), 1);
    assert!(posts[0].contains("openid.mode=associate"));
    drop(posts);

    let query: HashMap<String, String> = redirect.query_pairs().into_owned().collect();
    assert_eq!(redirect.host_str(), Some("idp.example"));
    assert_eq!(query.get("openid.mode").unwrap(), "checkid_setup");
    assert_eq!(query.get("openid.identity").unwrap(), "http://alice.example/");
    assert_eq!(query.get("openid.return_to").unwrap(), "http://rp.example/done");
    assert_eq!(query.get("openid.trust_root").unwrap(), "http://rp.example/");
    assert_eq!(query.get("openid.assoc_handle").unwrap(), "stub-handle");

    // The nonce is now recorded for the callback to consume.
    assert!(store.use_nonce(request.nonce()));
}

#[test]
fn test_construct_redirect_immediate_mode() {
    let store = MemoryStore::new();
    let consumer = Consumer::new(&store, StubFetcher::new()).set_immediate(true);
    let request = consumer.begin_auth("alice.example").unwrap();
    let redirect = consumer.construct_redirect(&request, &return_to(), &trust_root());
    let query: HashMap<String, String> = redirect.query_pairs().into_owned().collect();
    assert_eq!(query.get("openid.mode").unwrap(), "checkid_immediate");
}

#[test]
fn test_construct_redirect_preserves_existing_query() {
    let store = MemoryStore::new();
    let fetcher = StubFetcher::new();
    // An endpoint that already carries a query string.
    struct QueryEndpointFetcher(StubFetcher);
    impl Fetcher for QueryEndpointFetcher {
        fn get(&self, url: &Url) -> Result<FetchResponse, FetchError> {
            Ok(FetchResponse::new(
                StatusCode::OK,
                url.clone(),
                "<head><link rel=\"openid.server\" href=\"http://idp.example/op?tenant=7\"></head>"
                    .as_bytes()
                    .to_vec(),
            ))
        }
        fn post(&self, url: &Url, body: &[u8]) -> Result<FetchResponse, FetchError> {
            self.0.post(url, body)
        }
    }

    let consumer = Consumer::new(&store, QueryEndpointFetcher(fetcher));
    let request = consumer.begin_auth("alice.example").unwrap();
    let redirect = consumer.construct_redirect(&request, &return_to(), &trust_root());
    let query: HashMap<String, String> = redirect.query_pairs().into_owned().collect();
    assert_eq!(query.get("tenant").unwrap(), "7");
    assert_eq!(query.get("openid.mode").unwrap(), "checkid_setup");
}

#[test]
fn test_complete_auth_cancel() {
    let store = MemoryStore::new();
    let result = consumer(&store).complete_auth("ignored", &query_of(&[("openid.mode", "cancel")]));
    assert_eq!(result, AuthenticationResult::Cancelled);
}

#[test]
fn test_complete_auth_provider_error() {
    let store = MemoryStore::new();
    let result = consumer(&store).complete_auth(
        "ignored",
        &query_of(&[("openid.mode", "error"), ("openid.error", "server fire")]),
    );
    assert_eq!(result, AuthenticationResult::Failure(None));
}

#[test]
fn test_complete_auth_unknown_mode() {
    let store = MemoryStore::new();
    let consumer = consumer(&store);
    assert_eq!(
        consumer.complete_auth("ignored", &query_of(&[("openid.mode", "checkid_setup")])),
        AuthenticationResult::Failure(None)
    );
    assert_eq!(
        consumer.complete_auth("ignored", &query_of(&[])),
        AuthenticationResult::Failure(None)
    );
}

#[test]
fn test_complete_auth_bad_token() {
    let store = MemoryStore::new();
    let result = consumer(&store).complete_auth(
        "bm90IGEgcmVhbCB0b2tlbiwgYnV0IGxvbmcgZW5vdWdoIHRvIHNwbGl0",
        &query_of(&[("openid.mode", "id_res")]),
    );
    assert_eq!(result, AuthenticationResult::Failure(None));
}

#[test]
fn test_complete_auth_missing_fields() {
    let store = MemoryStore::new();
    let consumer = consumer(&store);
    let request = consumer.begin_auth("alice.example").unwrap();

    let result = consumer.complete_auth(
        request.token(),
        &query_of(&[("openid.mode", "id_res"), ("openid.identity", "http://alice.example/")]),
    );
    // The token survived, so the failure names the claimed identity.
    match result {
        AuthenticationResult::Failure(Some(consumer_id)) => {
            assert_eq!(consumer_id.as_str(), "http://alice.example/")
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn test_complete_auth_identity_mismatch() {
    let store = MemoryStore::new();
    let consumer = consumer(&store);
    let request = consumer.begin_auth("alice.example").unwrap();

    let result = consumer.complete_auth(
        request.token(),
        &query_of(&[
            ("openid.mode", "id_res"),
            ("openid.identity", "http://mallory.example/"),
            ("openid.return_to", "http://rp.example/done"),
            ("openid.assoc_handle", "stub-handle"),
        ]),
    );
    assert!(matches!(result, AuthenticationResult::Failure(Some(_))));
}

#[test]
fn test_complete_auth_setup_needed() {
    let store = MemoryStore::new();
    let consumer = Consumer::new(&store, StubFetcher::new()).set_immediate(true);
    let request = consumer.begin_auth("alice.example").unwrap();

    let result = consumer.complete_auth(
        request.token(),
        &query_of(&[
            ("openid.mode", "id_res"),
            ("openid.identity", "http://alice.example/"),
            ("openid.return_to", "http://rp.example/done"),
            ("openid.assoc_handle", "stub-handle"),
            ("openid.user_setup_url", "http://idp.example/setup?x=1"),
        ]),
    );
    match result {
        AuthenticationResult::SetupNeeded(setup_url) => {
            assert_eq!(setup_url.as_str(), "http://idp.example/setup?x=1")
        }
        other => panic!("unexpected result: {other:?}"),
    }
}
