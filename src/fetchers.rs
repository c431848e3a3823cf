//! Pluggable HTTP fetcher contract.
//!
//! The consumer never talks to the network directly; every outbound request
//! (discovery GET, associate POST, `check_authentication` POST) goes through
//! a caller-supplied [`Fetcher`]. A blocking [`reqwest`] implementation is
//! provided behind the `reqwest-blocking` feature flag (enabled by default).

use http::StatusCode;
use thiserror::Error;
use url::Url;

use std::borrow::Cow;
use std::error::Error as StdError;

/// A response captured by a [`Fetcher`], after following redirects.
#[derive(Clone, Debug)]
pub struct FetchResponse {
    /// Final HTTP status code.
    pub status: StatusCode,
    /// The URL that actually served the response, after redirects.
    pub final_url: Url,
    /// Raw response body.
    pub body: Vec<u8>,
}

impl FetchResponse {
    /// Create a response from its parts.
    pub fn new(status: StatusCode, final_url: Url, body: Vec<u8>) -> Self {
        Self {
            status,
            final_url,
            body,
        }
    }

    /// The body as text, with invalid UTF-8 replaced.
    pub fn body_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

/// Transport-level failure reported by a [`Fetcher`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FetchError {
    /// The request could not be sent or the response could not be read.
    #[error("request failed")]
    Transport(#[source] Box<dyn StdError + Send + Sync + 'static>),
    /// An unexpected error occurred.
    #[error("{0}")]
    Other(String),
}

/// Blocking HTTP client contract.
///
/// Implementations should enforce a sensible deadline; the consumer performs
/// no internal retries and treats any error as a transport failure.
pub trait Fetcher {
    /// Perform an HTTP GET, following redirects, and report the post-redirect
    /// URL alongside the body.
    fn get(&self, url: &Url) -> Result<FetchResponse, FetchError>;

    /// Perform an HTTP POST with an `application/x-www-form-urlencoded` body.
    fn post(&self, url: &Url, body: &[u8]) -> Result<FetchResponse, FetchError>;
}

impl<F: Fetcher + ?Sized> Fetcher for &F {
    fn get(&self, url: &Url) -> Result<FetchResponse, FetchError> {
        (**self).get(url)
    }

    fn post(&self, url: &Url, body: &[u8]) -> Result<FetchResponse, FetchError> {
        (**self).post(url, body)
    }
}

#[cfg(feature = "reqwest-blocking")]
mod reqwest_client {
    use super::{FetchError, FetchResponse, Fetcher};

    use http::header::CONTENT_TYPE;
    use http::Method;
    use url::Url;

    const MIME_TYPE_FORM: &str = "application/x-www-form-urlencoded";

    impl Fetcher for reqwest::blocking::Client {
        fn get(&self, url: &Url) -> Result<FetchResponse, FetchError> {
            let response = self
                .request(Method::GET, url.clone())
                .send()
                .map_err(|err| FetchError::Transport(Box::new(err)))?;
            read_response(response)
        }

        fn post(&self, url: &Url, body: &[u8]) -> Result<FetchResponse, FetchError> {
            let response = self
                .request(Method::POST, url.clone())
                .header(CONTENT_TYPE, MIME_TYPE_FORM)
                .body(body.to_vec())
                .send()
                .map_err(|err| FetchError::Transport(Box::new(err)))?;
            read_response(response)
        }
    }

    fn read_response(response: reqwest::blocking::Response) -> Result<FetchResponse, FetchError> {
        let status = response.status();
        let final_url = response.url().clone();
        let body = response
            .bytes()
            .map_err(|err| FetchError::Transport(Box::new(err)))?
            .to_vec();
        Ok(FetchResponse::new(status, final_url, body))
    }
}
