// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! HTTP client for the Tailscale v2 API.
//!
//! Every setter replaces the whole list on the control plane, so calling it twice
//! with the same content leaves a single copy behind.

use super::types::{
    Device, DeviceList, NameserversBody, RoutesRequest, RoutesResponse, SearchPathsBody,
};
use super::DeviceRegistry;
use crate::constants::{TAILSCALE_API_BASE_URL, TAILSCALE_API_TIMEOUT_SECS};
use crate::errors::MeshError;
use reqwest::{Client as HttpClient, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error};
use url::Url;

/// Authenticated client bound to one tailnet.
#[derive(Clone)]
pub struct TailscaleClient {
    http: HttpClient,
    base_url: Url,
    tailnet: String,
    api_key: String,
}

impl std::fmt::Debug for TailscaleClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TailscaleClient")
            .field("base_url", &self.base_url.as_str())
            .field("tailnet", &self.tailnet)
            .finish_non_exhaustive()
    }
}

impl TailscaleClient {
    /// Create a client for `tailnet` against the public API.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(api_key: &str, tailnet: &str) -> Result<Self, MeshError> {
        let http = HttpClient::builder()
            .timeout(Duration::from_secs(TAILSCALE_API_TIMEOUT_SECS))
            .build()
            .map_err(|e| MeshError::Transport {
                endpoint: TAILSCALE_API_BASE_URL.to_string(),
                reason: e.to_string(),
            })?;

        Self::with_http_client(http, TAILSCALE_API_BASE_URL, api_key, tailnet)
    }

    /// Create a client with a custom HTTP client and base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if `base_url` is not a valid absolute URL.
    pub fn with_http_client(
        http: HttpClient,
        base_url: &str,
        api_key: &str,
        tailnet: &str,
    ) -> Result<Self, MeshError> {
        let base_url = Url::parse(base_url.trim_end_matches('/')).map_err(|e| {
            MeshError::Transport {
                endpoint: base_url.to_string(),
                reason: e.to_string(),
            }
        })?;

        Ok(Self {
            http,
            base_url,
            tailnet: tailnet.to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// The tailnet this client operates on.
    #[must_use]
    pub fn tailnet(&self) -> &str {
        &self.tailnet
    }

    /// Build an endpoint URL below the base URL, percent-encoding each segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, MeshError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| MeshError::Transport {
                endpoint: self.base_url.to_string(),
                reason: "base URL cannot carry a path".into(),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Send a request and return the raw response body.
    async fn request<B: Serialize + std::fmt::Debug>(
        &self,
        method: Method,
        url: Url,
        body: Option<&B>,
    ) -> Result<String, MeshError> {
        debug!(
            method = %method,
            url = %url,
            body = ?body,
            "HTTP API request to Tailscale"
        );

        let mut request = self
            .http
            .request(method.clone(), url.clone())
            .bearer_auth(&self.api_key);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| MeshError::Transport {
            endpoint: url.to_string(),
            reason: e.to_string(),
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| MeshError::Transport {
            endpoint: url.to_string(),
            reason: e.to_string(),
        })?;

        if !status.is_success() {
            error!(
                method = %method,
                url = %url,
                status = %status,
                error = %text,
                "Tailscale API request failed"
            );
            return Err(MeshError::UnexpectedStatus {
                endpoint: url.to_string(),
                status_code: status.as_u16(),
                body: text,
            });
        }

        debug!(
            method = %method,
            url = %url,
            status = %status,
            response_len = text.len(),
            "Tailscale API request successful"
        );

        Ok(text)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, MeshError> {
        let text = self.request(Method::GET, url.clone(), None::<&()>).await?;
        serde_json::from_str(&text).map_err(|e| MeshError::MalformedResponse {
            endpoint: url.to_string(),
            reason: e.to_string(),
        })
    }

    /// List every device in the tailnet.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response cannot be decoded.
    pub async fn devices(&self) -> Result<Vec<Device>, MeshError> {
        let url = self.endpoint(&["tailnet", &self.tailnet, "devices"])?;
        let list: DeviceList = self.get_json(url).await?;
        Ok(list.devices)
    }

    /// Enabled subnet routes of a device, or `None` if the device no longer exists.
    ///
    /// # Errors
    ///
    /// Returns an error for any failure other than HTTP 404.
    pub async fn device_routes(
        &self,
        device_id: &str,
    ) -> Result<Option<Vec<String>>, MeshError> {
        let url = self.endpoint(&["device", device_id, "routes"])?;
        match self.get_json::<RoutesResponse>(url).await {
            Ok(routes) => Ok(Some(routes.enabled_routes)),
            Err(e) if e.status_code() == Some(StatusCode::NOT_FOUND.as_u16()) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Replace the enabled subnet routes of a device.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn set_device_routes(
        &self,
        device_id: &str,
        routes: &[String],
    ) -> Result<(), MeshError> {
        let url = self.endpoint(&["device", device_id, "routes"])?;
        self.request(Method::POST, url, Some(&RoutesRequest { routes }))
            .await?;
        Ok(())
    }

    /// Tailnet DNS nameservers.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response cannot be decoded.
    pub async fn nameservers(&self) -> Result<Vec<String>, MeshError> {
        let url = self.endpoint(&["tailnet", &self.tailnet, "dns", "nameservers"])?;
        let body: NameserversBody = self.get_json(url).await?;
        Ok(body.dns)
    }

    /// Replace the tailnet DNS nameservers.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn set_nameservers(&self, nameservers: &[String]) -> Result<(), MeshError> {
        let url = self.endpoint(&["tailnet", &self.tailnet, "dns", "nameservers"])?;
        let body = NameserversBody {
            dns: nameservers.to_vec(),
        };
        self.request(Method::POST, url, Some(&body)).await?;
        Ok(())
    }

    /// Tailnet DNS search paths.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response cannot be decoded.
    pub async fn search_paths(&self) -> Result<Vec<String>, MeshError> {
        let url = self.endpoint(&["tailnet", &self.tailnet, "dns", "searchpaths"])?;
        let body: SearchPathsBody = self.get_json(url).await?;
        Ok(body.search_paths)
    }

    /// Replace the tailnet DNS search paths.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn set_search_paths(&self, search_paths: &[String]) -> Result<(), MeshError> {
        let url = self.endpoint(&["tailnet", &self.tailnet, "dns", "searchpaths"])?;
        let body = SearchPathsBody {
            search_paths: search_paths.to_vec(),
        };
        self.request(Method::POST, url, Some(&body)).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl DeviceRegistry for TailscaleClient {
    async fn list_devices(&self, name_prefix: &str) -> Result<Vec<Device>, MeshError> {
        let devices = self.devices().await?;
        let total = devices.len();
        let matching: Vec<Device> = devices
            .into_iter()
            .filter(|device| device.name.starts_with(name_prefix))
            .collect();

        debug!(
            name_prefix = %name_prefix,
            total,
            matching = matching.len(),
            "Listed tailnet devices"
        );

        Ok(matching)
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod client_tests;
