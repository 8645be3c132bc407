use std::net::IpAddr;
use thiserror::Error;
use url::Url;

/// Errors produced while validating the API base URL.
#[derive(Error, Debug)]
pub enum BaseUrlError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// Plain HTTP pointed at a non-loopback host.
    #[error("Insecure base URL: HTTPS required (except localhost for testing)")]
    Insecure,
    /// The URL carries a query or fragment that endpoint joining would discard.
    #[error("Base URL must not contain a query or fragment")]
    HasQuery,
}

/// Validates the API root used by the HTTP sources.
///
/// The returned URL always ends in `/` so that relative endpoint paths
/// (`sections`, `section/products`) join underneath it instead of replacing
/// its last path segment.
///
/// # Errors
///
/// - [`BaseUrlError::InvalidUrl`] if the string does not parse
/// - [`BaseUrlError::UnsupportedScheme`] for anything but http/https
/// - [`BaseUrlError::Insecure`] for `http://` on a non-loopback host
/// - [`BaseUrlError::HasQuery`] if a query string or fragment is present
pub fn validate_base_url(url_str: &str) -> Result<Url, BaseUrlError> {
    let mut url = Url::parse(url_str.trim())?;

    match url.scheme() {
        "https" => {}
        "http" => {
            if !is_loopback_host(&url) {
                tracing::error!(base_url = %url, "Rejecting non-HTTPS base URL");
                return Err(BaseUrlError::Insecure);
            }
            tracing::warn!(base_url = %url, "Using non-HTTPS base URL (loopback only)");
        }
        scheme => return Err(BaseUrlError::UnsupportedScheme(scheme.to_owned())),
    }

    if url.query().is_some() || url.fragment().is_some() {
        return Err(BaseUrlError::HasQuery);
    }

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }

    Ok(url)
}

fn is_loopback_host(url: &Url) -> bool {
    match url.host_str() {
        Some("localhost") => true,
        Some(host) => {
            let host = host
                .strip_prefix('[')
                .and_then(|h| h.strip_suffix(']'))
                .unwrap_or(host);
            host.parse::<IpAddr>().is_ok_and(|ip| ip.is_loopback())
        }
        None => false,
    }
}
