// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! JSON REST client shared by the vendor providers.
//!
//! Wraps `reqwest` with the pieces every appliance API needs: a base URL, one of
//! the supported authentication styles, the certificate validation toggle and
//! typed errors that keep the HTTP status so providers can treat 404 as "absent".
//! There is no retry here; the caller of the backend session owns retry policy.

use crate::constants::HTTP_REQUEST_TIMEOUT_SECS;
use crate::errors::ProviderError;
use crate::provider::ProviderResult;
use reqwest::{Client as HttpClient, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tracing::{debug, error};
use url::Url;

/// How requests authenticate against the appliance.
#[derive(Clone)]
pub enum Auth {
    None,
    /// HTTP basic authentication.
    Basic { username: String, password: String },
    /// Static headers sent with every request (e.g. `X-NITRO-USER`).
    Headers(Vec<(String, String)>),
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Auth::None => f.write_str("None"),
            Auth::Basic { username, .. } => write!(f, "Basic({username})"),
            Auth::Headers(headers) => {
                let names: Vec<&str> = headers.iter().map(|(k, _)| k.as_str()).collect();
                write!(f, "Headers({names:?})")
            }
        }
    }
}

/// Build an appliance base URL from a configured host.
///
/// `host` may carry its own scheme (`https://lb.example.com`); otherwise
/// `default_scheme` is used. An explicit `port` overrides any port in `host`, and
/// `default_port` applies when neither gives one. `prefix` is the API root path.
///
/// # Errors
///
/// Returns [`ProviderError::InvalidConfiguration`] if the result is not a valid URL.
pub fn build_base_url(
    host: &str,
    port: Option<u16>,
    default_scheme: &str,
    default_port: u16,
    prefix: &str,
) -> ProviderResult<Url> {
    let host = host.trim().trim_end_matches('/');
    if host.is_empty() {
        return Err(ProviderError::InvalidConfiguration {
            reason: "appliance host is empty".to_string(),
        });
    }

    let raw = if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("{default_scheme}://{host}")
    };

    let mut url = Url::parse(&raw).map_err(|e| ProviderError::InvalidConfiguration {
        reason: format!("invalid appliance host '{host}': {e}"),
    })?;

    match (port, url.port()) {
        (Some(p), _) => {
            url.set_port(Some(p))
                .map_err(|()| ProviderError::InvalidConfiguration {
                    reason: format!("cannot set port {p} on '{host}'"),
                })?;
        }
        (None, None) if url.port_or_known_default() != Some(default_port) => {
            url.set_port(Some(default_port))
                .map_err(|()| ProviderError::InvalidConfiguration {
                    reason: format!("cannot set port {default_port} on '{host}'"),
                })?;
        }
        _ => {}
    }

    url.set_path(prefix.trim_end_matches('/'));
    Ok(url)
}

/// JSON REST client bound to one appliance.
#[derive(Clone)]
pub struct RestClient {
    client: HttpClient,
    base_url: Url,
    auth: Auth,
    debug: bool,
}

impl RestClient {
    /// Create a client for `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::InvalidConfiguration`] if the TLS client cannot be built.
    pub fn new(base_url: Url, auth: Auth, validate_certs: bool, debug: bool) -> ProviderResult<Self> {
        let client = HttpClient::builder()
            .danger_accept_invalid_certs(!validate_certs)
            .timeout(Duration::from_secs(HTTP_REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| ProviderError::InvalidConfiguration {
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            base_url,
            auth,
            debug,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve `path` below the base URL and append `query` pairs.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::InvalidConfiguration`] if the path does not form a URL.
    pub fn url(&self, path: &str, query: &[(&str, &str)]) -> ProviderResult<Url> {
        let raw = format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        let mut url = Url::parse(&raw).map_err(|e| ProviderError::InvalidConfiguration {
            reason: format!("invalid request path '{path}': {e}"),
        })?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    /// Send a request and return the response body.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Connection`] when no response arrives and
    /// [`ProviderError::Http`] for any non-2xx status.
    pub async fn request<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: Url,
        body: Option<&B>,
    ) -> ProviderResult<String> {
        let url_text = url.to_string();
        debug!(method = %method, url = %url_text, "Load balancer API request");
        if self.debug {
            if let Some(body) = body {
                debug!(
                    method = %method,
                    url = %url_text,
                    body = %serde_json::to_string(body).unwrap_or_default(),
                    "Load balancer API request body"
                );
            }
        }

        let mut request = self.client.request(method.clone(), url);
        if let Some(body) = body {
            request = request.json(body);
        }
        request = match &self.auth {
            Auth::None => request,
            Auth::Basic { username, password } => request.basic_auth(username, Some(password)),
            Auth::Headers(headers) => headers
                .iter()
                .fold(request, |req, (name, value)| req.header(name.as_str(), value.as_str())),
        };

        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::Connection {
                method: method.to_string(),
                url: url_text.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::Connection {
                method: method.to_string(),
                url: url_text.clone(),
                reason: format!("failed to read response body: {e}"),
            })?;

        if !status.is_success() {
            if status != StatusCode::NOT_FOUND {
                error!(
                    method = %method,
                    url = %url_text,
                    status = %status,
                    error = %text,
                    "Load balancer API request failed"
                );
            }
            return Err(ProviderError::Http {
                method: method.to_string(),
                url: url_text,
                status: status.as_u16(),
                message: text,
            });
        }

        if self.debug {
            debug!(method = %method, url = %url_text, status = %status, body = %text, "Load balancer API response");
        }
        Ok(text)
    }

    /// `GET` a JSON document; HTTP 404 yields `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns any non-404 request error, or [`ProviderError::MalformedResponse`].
    pub async fn get_json<T: DeserializeOwned>(&self, url: Url) -> ProviderResult<Option<T>> {
        let url_text = url.to_string();
        match self.request::<()>(Method::GET, url, None).await {
            Ok(text) => parse_json(&url_text, &text).map(Some),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Send `body` and parse the JSON response.
    ///
    /// # Errors
    ///
    /// Returns any request error, or [`ProviderError::MalformedResponse`].
    pub async fn send_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: Option<&B>,
    ) -> ProviderResult<T> {
        let url_text = url.to_string();
        let text = self.request(method, url, body).await?;
        parse_json(&url_text, &text)
    }

    /// Send a request whose response body is not needed.
    ///
    /// # Errors
    ///
    /// Returns any request error.
    pub async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: Url,
        body: Option<&B>,
    ) -> ProviderResult<()> {
        self.request(method, url, body).await.map(|_| ())
    }
}

impl fmt::Debug for RestClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestClient")
            .field("base_url", &self.base_url.as_str())
            .field("auth", &self.auth)
            .field("debug", &self.debug)
            .finish_non_exhaustive()
    }
}

fn parse_json<T: DeserializeOwned>(url: &str, text: &str) -> ProviderResult<T> {
    serde_json::from_str(text).map_err(|e| ProviderError::MalformedResponse {
        url: url.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod http_tests;
