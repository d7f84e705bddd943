use std::sync::Arc;
use std::time::Duration;

use casewatch_core::{CaseId, CaseStatus, ErrorKind, ProcessingUpdate, StatusError};
use casewatch_logging::watch_debug;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::SessionProvider;

pub const API_URL_ENV: &str = "CASEWATCH_API_URL";
pub const DEFAULT_API_URL: &str = "http://localhost:8000/api";

#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub base_url: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(20),
        }
    }
}

impl ClientSettings {
    /// Defaults, with the base URL taken from `CASEWATCH_API_URL` when set.
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        if let Some(url) = std::env::var(API_URL_ENV)
            .ok()
            .filter(|url| !url.trim().is_empty())
        {
            settings.base_url = url.trim().to_string();
        }
        settings
    }
}

/// The backend status API.
#[async_trait::async_trait]
pub trait StatusClient: Send + Sync {
    /// `GET /cases/{id}/status`
    async fn fetch_case_status(&self, case_id: &CaseId) -> Result<CaseStatus, StatusError>;

    /// `GET /cases/status`
    async fn fetch_all_statuses(&self) -> Result<Vec<CaseStatus>, StatusError>;

    /// `GET /cases/{id}/updates?lastUpdate=...`
    async fn fetch_updates_since(
        &self,
        case_id: &CaseId,
        since: DateTime<Utc>,
    ) -> Result<Vec<ProcessingUpdate>, StatusError>;

    /// `GET /realtime/stats`
    async fn realtime_available(&self) -> Result<bool, StatusError>;

    /// Raw body of any GET endpoint below the base URL.
    async fn fetch_raw(&self, path: &str) -> Result<Vec<u8>, StatusError>;
}

#[derive(Debug, Deserialize)]
struct RealtimeStats {
    available: bool,
}

pub struct ReqwestStatusClient {
    settings: ClientSettings,
    session: Arc<dyn SessionProvider>,
    http: reqwest::Client,
}

impl ReqwestStatusClient {
    pub fn new(
        settings: ClientSettings,
        session: Arc<dyn SessionProvider>,
    ) -> Result<Self, StatusError> {
        let http = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .build()
            .map_err(|err| StatusError::new(ErrorKind::General, err.to_string()))?;
        Ok(Self {
            settings,
            session,
            http,
        })
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, StatusError> {
        let mut url = Url::parse(&self.settings.base_url).map_err(|err| {
            StatusError::new(
                ErrorKind::General,
                format!("invalid base url {}: {err}", self.settings.base_url),
            )
        })?;
        url.path_segments_mut()
            .map_err(|_| {
                StatusError::new(
                    ErrorKind::General,
                    format!("base url cannot carry a path: {}", self.settings.base_url),
                )
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_bytes(&self, url: Url) -> Result<Vec<u8>, StatusError> {
        let token = self
            .session
            .access_token()
            .ok_or_else(|| StatusError::new(ErrorKind::Auth, "no session token"))?;

        watch_debug!("GET {}", url);
        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(StatusError::from_http_status(
                status.as_u16(),
                status.to_string(),
            ));
        }

        let body = response.bytes().await.map_err(map_reqwest_error)?;
        Ok(body.to_vec())
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, StatusError> {
        let body = self.get_bytes(url).await?;
        serde_json::from_slice(&body).map_err(|err| {
            StatusError::new(ErrorKind::General, format!("unexpected response body: {err}"))
        })
    }
}

#[async_trait::async_trait]
impl StatusClient for ReqwestStatusClient {
    async fn fetch_case_status(&self, case_id: &CaseId) -> Result<CaseStatus, StatusError> {
        let url = self.endpoint(&["cases", case_id.as_str(), "status"])?;
        self.get_json(url).await
    }

    async fn fetch_all_statuses(&self) -> Result<Vec<CaseStatus>, StatusError> {
        let url = self.endpoint(&["cases", "status"])?;
        self.get_json(url).await
    }

    async fn fetch_updates_since(
        &self,
        case_id: &CaseId,
        since: DateTime<Utc>,
    ) -> Result<Vec<ProcessingUpdate>, StatusError> {
        let mut url = self.endpoint(&["cases", case_id.as_str(), "updates"])?;
        url.query_pairs_mut().append_pair(
            "lastUpdate",
            &since.to_rfc3339_opts(SecondsFormat::Millis, true),
        );
        self.get_json(url).await
    }

    async fn realtime_available(&self) -> Result<bool, StatusError> {
        let url = self.endpoint(&["realtime", "stats"])?;
        let stats: RealtimeStats = self.get_json(url).await?;
        Ok(stats.available)
    }

    async fn fetch_raw(&self, path: &str) -> Result<Vec<u8>, StatusError> {
        let segments: Vec<&str> = path.split('/').filter(|part| !part.is_empty()).collect();
        let url = self.endpoint(&segments)?;
        self.get_bytes(url).await
    }
}

fn map_reqwest_error(err: reqwest::Error) -> StatusError {
    if err.is_timeout() {
        return StatusError::new(ErrorKind::Network, format!("request timed out: {err}"));
    }
    StatusError::new(ErrorKind::Network, err.to_string())
}
