use crate::error::{BookingError, Result};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Authenticated JSON client for the marketplace REST API.
///
/// Paths are given as segments and percent-encoded one by one, so an id can
/// never reach into another resource.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl ApiClient {
    /// Create a client for `base_url` with a per-request timeout
    pub fn new(base_url: impl AsRef<str>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BookingError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url_from(base_url.as_ref())?,
            token: None,
        })
    }

    /// Attach the caller's bearer token to every request
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn request(&self, method: Method, segments: &[&str]) -> RequestBuilder {
        let url = join_segments(&self.base_url, segments);
        debug!("{} {}", method, url);

        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T> {
        self.get_json_query(segments, &[]).await
    }

    pub async fn get_json_query<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, &str)],
    ) -> Result<T> {
        let response = self.request(Method::GET, segments).query(query).send().await?;
        let response = Self::check(response)?;
        Ok(response.json().await?)
    }

    pub async fn post_json<B, T>(&self, segments: &[&str], body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.request(Method::POST, segments).json(body).send().await?;
        let response = Self::check(response)?;
        Ok(response.json().await?)
    }

    /// PUT without a body, ignoring the response payload
    pub async fn put(&self, segments: &[&str]) -> Result<()> {
        let response = self.request(Method::PUT, segments).send().await?;
        Self::check(response)?;
        Ok(())
    }

    fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let path = response.url().path().to_string();
        warn!("API returned status {} for {}", status, path);
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(BookingError::Forbidden(path)),
            StatusCode::NOT_FOUND => Err(BookingError::NotFound(path)),
            _ => Err(BookingError::Api(format!("{path} returned {status}"))),
        }
    }
}

/// Parse a base URL that path segments can be appended to
pub(crate) fn base_url_from(raw: &str) -> Result<Url> {
    let url = Url::parse(raw).map_err(|e| BookingError::Config(format!("invalid URL {raw}: {e}")))?;
    if url.cannot_be_a_base() {
        return Err(BookingError::Config(format!("{raw} cannot be used as a base URL")));
    }
    Ok(url)
}

/// Append percent-encoded path segments to `base`
pub(crate) fn join_segments(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    // base_url_from rejected URLs without a path to extend
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segments_are_encoded_one_by_one() {
        let base = base_url_from("https://api.test/v1/").unwrap();
        let url = join_segments(&base, &["properties", "a/b?c"]);
        assert_eq!(url.as_str(), "https://api.test/v1/properties/a%2Fb%3Fc");
    }

    #[test]
    fn opaque_urls_are_rejected() {
        assert!(matches!(
            base_url_from("mailto:owner@example.com"),
            Err(BookingError::Config(_))
        ));
        assert!(matches!(base_url_from("not a url"), Err(BookingError::Config(_))));
    }
}
