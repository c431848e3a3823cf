//! Identity URL discovery: fetch the claimed identity page and extract the
//! provider endpoint (and optional delegated identity) from its link tags.

use crate::fetchers::{FetchError, Fetcher};
use crate::parse;
use crate::types::{IdentityUrl, ServerUrl};

use http::StatusCode;
use thiserror::Error;


/// Error discovering the provider behind a claimed identity URL.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DiscoveryError {
    /// The identity page could not be fetched at all.
    #[error("request failed")]
    Request(#[source] FetchError),
    /// The identity page answered with a non-success status.
    #[error("HTTP status code {0}")]
    Response(StatusCode),
    /// The identity page does not advertise an `openid.server` link, so the
    /// claimed URL is not an OpenID identity.
    #[error("no openid.server link found on the identity page")]
    NoOpenIdServer,
    /// The claimed identity URL, or a URL advertised by the page, failed to
    /// parse.
    #[error("failed to parse URL")]
    UrlParse(#[source] url::ParseError),
}

/// The canonical identity triple produced by discovery.
#[derive(Clone, Debug, PartialEq)]
pub struct Discovered {
    /// The claimed identity URL: the user's input, normalized, after
    /// following any redirects. This is the identity the relying party
    /// ultimately trusts.
    pub consumer_id: IdentityUrl,
    /// The identity the provider will assert: the `openid.delegate` when the
    /// page names one, otherwise the claimed identity itself.
    pub server_id: IdentityUrl,
    /// The provider endpoint from the `openid.server` link.
    pub server_url: ServerUrl,
}

/// Fetch a user-entered identity URL and read the OpenID link tags off it.
///
/// [`Consumer::begin_auth`](crate::Consumer::begin_auth) calls this
/// internally; it is exposed for relying parties that want to probe an
/// identity URL without starting a login.
pub fn discover<F: Fetcher>(
    fetcher: &F,
    user_url: &str,
) -> Result<Discovered, DiscoveryError> {
    let claimed = IdentityUrl::new(user_url.to_string()).map_err(DiscoveryError::UrlParse)?;

    let response = fetcher.get(claimed.url()).map_err(DiscoveryError::Request)?;
    if response.status != StatusCode::OK {
        return Err(DiscoveryError::Response(response.status));
    }

    let links = parse::find_openid_links(&response.body_str());
    let server = links.server.ok_or(DiscoveryError::NoOpenIdServer)?;

    let consumer_id = IdentityUrl::new(response.final_url.to_string())
        .map_err(DiscoveryError::UrlParse)?;
    let server_id = match links.delegate {
        Some(delegate) => IdentityUrl::new(delegate).map_err(DiscoveryError::UrlParse)?,
        None => consumer_id.clone(),
    };
    let server_url = ServerUrl::new(server).map_err(DiscoveryError::UrlParse)?;

    Ok(Discovered {
        consumer_id,
        server_id,
        server_url,
    })
}
