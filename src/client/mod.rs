//! Transport client for the PetFriends REST API
//!
//! Every call returns an [`ApiResponse`] whatever the status code; only
//! transport failures (timeouts, refused connections) are errors, and
//! those are retried a bounded number of times first. A POST is only
//! re-sent when the connection itself failed.

mod types;

pub use types::{
    lookup, pet_id, ApiResponse, CredentialKind, Credentials, ListFilter, PetFields, PetRecord,
    Photo,
};

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::common::config::Config;
use crate::common::{Error, Result};

/// Operations of the pet service the harness exercises
#[async_trait]
pub trait PetApi: Send + Sync {
    /// `GET /api/key`
    async fn authenticate(&self, credentials: &Credentials) -> Result<ApiResponse>;

    /// `GET /api/pets`
    async fn list_pets(&self, key: &str, filter: ListFilter) -> Result<ApiResponse>;

    /// `POST /api/pets` with a photo, `POST /api/create_pet_simple` without
    async fn create_pet(
        &self,
        key: &str,
        fields: &PetFields,
        photo: Option<&Photo>,
    ) -> Result<ApiResponse>;

    /// `PUT /api/pets/{id}`
    async fn update_pet(&self, key: &str, id: &str, fields: &PetFields) -> Result<ApiResponse>;

    /// `POST /api/pets/set_photo/{id}`
    async fn update_photo(&self, key: &str, id: &str, photo: &Photo) -> Result<ApiResponse>;

    /// `DELETE /api/pets/{id}`
    async fn delete_pet(&self, key: &str, id: &str) -> Result<ApiResponse>;
}

/// reqwest-backed client for one service endpoint
pub struct PetFriendsClient {
    http: reqwest::Client,
    base_url: String,
    timeout_secs: u64,
    attempts: u32,
}

impl PetFriendsClient {
    /// Create a client; `timeout` bounds every call, `attempts` covers retries
    pub fn new(base_url: &str, timeout: Duration, attempts: u32) -> Result<Self> {
        reqwest::Url::parse(base_url)
            .map_err(|e| Error::Config(format!("Invalid base_url '{}': {}", base_url, e)))?;

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("petcheck/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout_secs: timeout.as_secs(),
            attempts: attempts.max(1),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            &config.service.base_url,
            config.request_timeout(),
            config.retry.transport_attempts,
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a request built by `build`, retrying transport failures
    ///
    /// `build` runs once per attempt because multipart bodies cannot be
    /// cloned.
    async fn send<F>(&self, method: &str, url: &str, build: F) -> Result<ApiResponse>
    where
        F: Fn() -> Result<reqwest::RequestBuilder> + Send + Sync,
    {
        let mut attempt = 1;
        loop {
            let request = build()?;
            match self.attempt(method, url, request).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable(method) && attempt < self.attempts => {
                    warn!(method, url, attempt, error = %e, "retrying request");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn attempt(
        &self,
        method: &str,
        url: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<ApiResponse> {
        let response = request
            .send()
            .await
            .map_err(|e| Error::transport(method, url, &e, self.timeout_secs))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| Error::transport(method, url, &e, self.timeout_secs))?;

        debug!(method, url, status, "response received");
        Ok(ApiResponse::from_text(status, &text))
    }

    fn multipart_fields(fields: &PetFields) -> reqwest::multipart::Form {
        fields
            .as_pairs()
            .into_iter()
            .fold(reqwest::multipart::Form::new(), |form, (name, value)| {
                form.text(name, value.to_string())
            })
    }
}

#[async_trait]
impl PetApi for PetFriendsClient {
    async fn authenticate(&self, credentials: &Credentials) -> Result<ApiResponse> {
        let url = self.url("/api/key");
        self.send("GET", &url, || {
            Ok(self
                .http
                .get(&url)
                .header("email", credentials.email.as_str())
                .header("password", credentials.password.as_str()))
        })
        .await
    }

    async fn list_pets(&self, key: &str, filter: ListFilter) -> Result<ApiResponse> {
        let url = self.url("/api/pets");
        self.send("GET", &url, || {
            Ok(self
                .http
                .get(&url)
                .header("auth_key", key)
                .query(&[("filter", filter.as_query())]))
        })
        .await
    }

    async fn create_pet(
        &self,
        key: &str,
        fields: &PetFields,
        photo: Option<&Photo>,
    ) -> Result<ApiResponse> {
        match photo {
            Some(photo) => {
                let url = self.url("/api/pets");
                self.send("POST", &url, || {
                    let form = Self::multipart_fields(fields).part("pet_photo", photo.to_part()?);
                    Ok(self.http.post(&url).header("auth_key", key).multipart(form))
                })
                .await
            }
            None => {
                let url = self.url("/api/create_pet_simple");
                self.send("POST", &url, || {
                    Ok(self
                        .http
                        .post(&url)
                        .header("auth_key", key)
                        .form(&fields.as_pairs()[..]))
                })
                .await
            }
        }
    }

    async fn update_pet(&self, key: &str, id: &str, fields: &PetFields) -> Result<ApiResponse> {
        let url = self.url(&format!("/api/pets/{}", id));
        self.send("PUT", &url, || {
            Ok(self
                .http
                .put(&url)
                .header("auth_key", key)
                .form(&fields.as_pairs()[..]))
        })
        .await
    }

    async fn update_photo(&self, key: &str, id: &str, photo: &Photo) -> Result<ApiResponse> {
        let url = self.url(&format!("/api/pets/set_photo/{}", id));
        self.send("POST", &url, || {
            let form = reqwest::multipart::Form::new().part("pet_photo", photo.to_part()?);
            Ok(self.http.post(&url).header("auth_key", key).multipart(form))
        })
        .await
    }

    async fn delete_pet(&self, key: &str, id: &str) -> Result<ApiResponse> {
        let url = self.url(&format!("/api/pets/{}", id));
        self.send("DELETE", &url, || {
            Ok(self.http.delete(&url).header("auth_key", key))
        })
        .await
    }
}
