//! Checks that a stored site URL is something the prober can request.
//!
//! The front end enforces a non-empty URL but nothing more, so anything
//! that reaches a sweep has to be re-checked before a request is built.

use thiserror::Error;
use url::Url;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidUrl {
    #[error("URL is empty")]
    Empty,
    #[error("URL does not parse: {0}")]
    Parse(#[from] url::ParseError),
    #[error("unsupported scheme for a liveness check: {0}")]
    Scheme(String),
    #[error("URL has no host")]
    MissingHost,
}

/// Parse a site URL, accepting only http and https targets with a host
pub fn validate_site_url(raw: &str) -> Result<Url, InvalidUrl> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(InvalidUrl::Empty);
    }

    let url = Url::parse(raw)?;

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(InvalidUrl::Scheme(other.to_string())),
    }

    if url.host_str().is_none_or(str::is_empty) {
        return Err(InvalidUrl::MissingHost);
    }

    Ok(url)
}
