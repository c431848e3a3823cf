#![warn(missing_docs)]
//!
//! [OpenID 1.x](http://openid.net/specs/openid-authentication-1_1.html)
//! relying-party (consumer) library.
//!
//! This library drives browser-redirect identity verification against an
//! OpenID 1.x identity provider: it discovers the provider behind a claimed
//! identity URL, negotiates an HMAC-SHA1 association over Diffie–Hellman,
//! and verifies the provider's signed callback, falling back to a
//! `check_authentication` round trip ("dumb mode") when no association is
//! usable. A login spans two unrelated HTTP requests on the relying party;
//! the state bridging them travels through the browser as an opaque,
//! HMAC-authenticated, time-bounded token.
//!
//! # Contents
//!  * [Importing `openid1`: selecting an HTTP fetcher](#importing-openid1-selecting-an-http-fetcher)
//!  * [Stores](#stores)
//!  * [Driving a login](#driving-a-login)
//!  * [Comparing secrets securely](#comparing-secrets-securely)
//!
//! # Importing `openid1`: selecting an HTTP fetcher
//!
//! All outbound HTTP (the discovery GET, the associate POST, and the
//! `check_authentication` POST) goes through the [`Fetcher`] trait. A
//! blocking [`reqwest`] implementation is enabled by default via the
//! `reqwest-blocking` feature; disable default features to supply your own:
//!
//! ```toml
//! openid1 = { version = "...", default-features = false }
//! ```
//!
//! Unlike OAuth2-family flows, OpenID 1.x discovery *requires* following
//! redirects: the post-redirect URL is the identity the relying party
//! ultimately trusts, which is why [`Fetcher::get`] reports the final URL.
//!
//! # Stores
//!
//! The [`Store`] is the only state shared between the two legs of a login:
//! it holds the token auth key, cached [`Association`]s, and the set of
//! outstanding nonces. [`MemoryStore`] suits single-process relying parties
//! and tests; [`DumbStore`] keeps no state at all and forces every callback
//! through the provider recheck. Production deployments with multiple
//! processes should implement [`Store`] over shared persistence.
//!
//! # Driving a login
//!
//! ```rust,no_run
//! use openid1::{AuthenticationResult, Consumer, MemoryStore, ReturnUrl, TrustRoot};
//! # #[cfg(feature = "reqwest-blocking")]
//! use openid1::reqwest;
//! use std::collections::HashMap;
//!
//! # #[cfg(feature = "reqwest-blocking")]
//! # fn err_wrapper() -> Result<(), Box<dyn std::error::Error>> {
//! let http_client = reqwest::blocking::Client::new();
//! let consumer = Consumer::new(MemoryStore::new(), http_client);
//!
//! // Leg one: the user submitted their identity URL.
//! let auth_request = consumer.begin_auth("alice.example")?;
//!
//! // Stash auth_request.token() in the user's session, then send the
//! // browser to the provider.
//! let redirect = consumer.construct_redirect(
//!     &auth_request,
//!     &ReturnUrl::new("https://rp.example/openid/return".to_string())?,
//!     &TrustRoot::new("https://rp.example/".to_string()),
//! );
//! println!("redirect the browser to: {redirect}");
//!
//! // Leg two: the provider redirected back. Recover the token from the
//! // session and hand it the callback query.
//! let token: String = unimplemented!("load from session");
//! let query: HashMap<String, String> = unimplemented!("parse callback query");
//! match consumer.complete_auth(&token, &query) {
//!     AuthenticationResult::Success(identity) => {
//!         println!("verified as {}", identity.as_str())
//!     }
//!     AuthenticationResult::Cancelled => println!("user declined"),
//!     AuthenticationResult::SetupNeeded(setup_url) => {
//!         println!("provider needs interaction at {}", setup_url.as_str())
//!     }
//!     AuthenticationResult::Failure(_) => println!("not verified"),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! The library itself never checks that `openid.return_to` matches the URL
//! the callback actually hit; the calling application must do that, since
//! only it knows its own routing.
//!
//! # Comparing secrets securely
//!
//! Callback verification compares HMAC values received from the network. To
//! avoid [timing side-channels](https://en.wikipedia.org/wiki/Timing_attack),
//! those comparisons are performed in constant time internally, and the
//! secret-carrying types ([`Nonce`], [`MacKey`], [`AuthKey`]) deliberately do
//! not implement `PartialEq`, to prompt callers to think before comparing
//! them.

// Defined first since other modules need the macros, and definition order is
// significant for macros. This module is private.
#[macro_use]
mod macros;

mod association;
mod consumer;
mod crypto;
mod dh;
mod discovery;
mod fetchers;
mod kvform;
mod parse;
mod store;
mod token;
mod types;

pub use crate::association::Association;
pub use crate::consumer::Consumer;
pub use crate::crypto::{base64_to_long, bytes_to_long, long_to_base64, long_to_bytes};
pub use crate::dh::DiffieHellman;
pub use crate::discovery::{discover, Discovered, DiscoveryError};
pub use crate::fetchers::{FetchError, FetchResponse, Fetcher};
pub use crate::store::{DumbStore, MemoryStore, Store};
pub use crate::types::{
    AssociationHandle, AssociationType, AuthKey, AuthRequest, AuthenticationResult, IdentityUrl,
    MacKey, Nonce, ReturnUrl, ServerUrl, SessionType, SetupUrl, TrustRoot,
};

/// Public re-exports of crates used in this library's interfaces.
pub use http;
pub use url;

#[cfg(feature = "reqwest-blocking")]
pub use reqwest;
