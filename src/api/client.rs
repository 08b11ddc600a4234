// HTTP client for the remote content API
use once_cell::sync::Lazy;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use super::error::ApiError;
use super::models::{
    AdminLoginRequest, AdminSession, ApiErrorBody, BasilicaInfo, Language, SiteSettings, TourStop,
};

static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(reqwest::Client::new);

/// Client for the tour content API. The base URL points at the API root
/// (typically `https://<host>/api`); media paths are resolved relative to it.
#[derive(Debug, Clone)]
pub struct ContentClient {
    base_url: String,
}

impl ContentClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Scheme + host part of the base URL, without the `/api` suffix.
    fn origin(&self) -> &str {
        self.base_url
            .strip_suffix("/api")
            .unwrap_or(&self.base_url)
    }

    /// Resolve an audio or image reference from the API into a fetchable URL.
    ///
    /// Absolute URLs pass through unchanged. Paths under `/api` resolve
    /// against the origin; every other relative path (e.g.
    /// `/uploads/audio/en-1.mp3`) resolves against the API base.
    pub fn resolve_media_url(&self, path: &str) -> String {
        if path.starts_with("http") {
            return path.to_string();
        }
        if path.starts_with("/api") {
            return format!("{}{}", self.origin(), path);
        }
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        let response = HTTP_CLIENT.get(&url).send().await?;
        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
        let status = response.status();
        if !status.is_success() {
            let detail = response
                .json::<ApiErrorBody>()
                .await
                .ok()
                .and_then(|body| body.detail);
            return Err(ApiError::Status {
                status: status.as_u16(),
                detail,
            });
        }
        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    /// Active languages for the selection screen, sorted by display order.
    pub async fn get_languages(&self) -> Result<Vec<Language>, ApiError> {
        let mut languages: Vec<Language> = self.get_json("/languages").await?;
        languages.retain(|l| l.is_active);
        languages.sort_by_key(|l| l.order);
        Ok(languages)
    }

    pub async fn get_tour_stops(&self) -> Result<Vec<TourStop>, ApiError> {
        self.get_json("/tour-stops").await
    }

    pub async fn get_site_settings(&self) -> Result<SiteSettings, ApiError> {
        self.get_json("/site-settings").await
    }

    pub async fn get_basilica_info(&self, language: &str) -> Result<BasilicaInfo, ApiError> {
        let url = format!("{}/basilica-info", self.base_url);
        let response = HTTP_CLIENT
            .get(&url)
            .query(&[("language", language)])
            .send()
            .await?;
        Self::decode(response).await
    }

    /// Authenticate against the admin area. A rejected login surfaces the
    /// server's `detail` message through [`ApiError::Status`].
    pub async fn admin_login(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AdminSession, ApiError> {
        let url = format!("{}/admin/login", self.base_url);
        let response = HTTP_CLIENT
            .post(&url)
            .json(&AdminLoginRequest {
                email: email.trim().to_string(),
                password: password.trim().to_string(),
            })
            .send()
            .await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            let detail = response
                .json::<ApiErrorBody>()
                .await
                .ok()
                .and_then(|body| body.detail);
            return Err(ApiError::Status {
                status: 401,
                detail,
            });
        }
        Self::decode(response).await
    }
}
