//! `reqwest`-backed transport.

use async_trait::async_trait;
use tincture_boot::host::{HttpClient, HttpError};
use url::Url;

/// HTTP client resolving relative URLs against the page location.
///
/// Without a base, only absolute URLs can be requested.
#[derive(Clone)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
    base: Option<Url>,
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            base: None,
        }
    }

    /// Client for a page served at `base`.
    pub fn with_base(base: &str) -> Result<Self, HttpError> {
        let base = Url::parse(base).map_err(|e| HttpError::InvalidUrl {
            url: base.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self {
            client: reqwest::Client::new(),
            base: Some(base),
        })
    }

    /// `scheme://host[:port]` of the base, as a page would report it.
    pub fn origin(&self) -> Option<String> {
        let base = self.base.as_ref()?;
        let origin = base.origin();
        origin.is_tuple().then(|| origin.ascii_serialization())
    }

    pub fn resolve(&self, url: &str) -> Result<Url, HttpError> {
        let invalid = |e: url::ParseError| HttpError::InvalidUrl {
            url: url.to_string(),
            message: e.to_string(),
        };
        match Url::parse(url) {
            Ok(absolute) => Ok(absolute),
            Err(url::ParseError::RelativeUrlWithoutBase) => match &self.base {
                Some(base) => base.join(url).map_err(invalid),
                None => Err(invalid(url::ParseError::RelativeUrlWithoutBase)),
            },
            Err(e) => Err(invalid(e)),
        }
    }

    fn network_error(url: &Url, e: reqwest::Error) -> HttpError {
        HttpError::Network {
            url: url.to_string(),
            message: e.to_string(),
        }
    }

    fn check_status(url: &Url, response: &reqwest::Response) -> Result<(), HttpError> {
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(HttpError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            })
        }
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn head(&self, url: &str) -> Result<bool, HttpError> {
        let url = self.resolve(url)?;
        tracing::debug!("HEAD {}", url);
        let response = self
            .client
            .head(url.clone())
            .send()
            .await
            .map_err(|e| Self::network_error(&url, e))?;
        Ok(response.status().is_success())
    }

    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, HttpError> {
        let url = self.resolve(url)?;
        tracing::debug!("GET {}", url);
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| Self::network_error(&url, e))?;
        Self::check_status(&url, &response)?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| Self::network_error(&url, e))?;
        Ok(bytes.to_vec())
    }

    async fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<(), HttpError> {
        let url = self.resolve(url)?;
        let response = self
            .client
            .post(url.clone())
            .json(body)
            .send()
            .await
            .map_err(|e| Self::network_error(&url, e))?;
        Self::check_status(&url, &response)
    }
}
