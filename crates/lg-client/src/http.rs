// http.rs — HttpBackend: the episode and analysis services over HTTP.
//
// Endpoints, relative to the configured base url:
//   GET  /works/{work}/episodes                              list
//   GET  /works/{work}/episodes/{episode}                    fetch
//   PUT  /works/{work}/episodes/{episode}                    save content
//   POST /episodes/{episode}/keywords                        extract keywords
//   POST /works/{work}/settings/analyze                      settings diff
//   POST /works/{work}/episodes/{episode}/settings/confirm   publish reviewed diff
//
// A save rejected with 423 Locked or 409 Conflict means the episode is
// read-only on the server.

use std::time::Duration;

use lg_episode::{BackendError, Episode, EpisodeBackend, EpisodeId, WorkId};
use lg_lorebook::{KeywordSet, SettingsDiff};
use lg_workflow::{AnalysisBackend, BackendConfig};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use crate::error::ClientError;

/// Longest server error body kept in an error message.
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Clone)]
pub struct HttpBackend {
    base_url: String,
    token: Option<String>,
    client: Client,
}

impl HttpBackend {
    /// Build a backend from config. The bearer token is read from the
    /// configured environment variable; requests go unauthenticated without it.
    pub fn new(config: &BackendConfig) -> Result<Self, ClientError> {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        let parsed = reqwest::Url::parse(&base_url).map_err(|e| ClientError::InvalidBaseUrl {
            url: config.base_url.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ClientError::InvalidBaseUrl {
                url: config.base_url.clone(),
                reason: format!("unsupported scheme {}", parsed.scheme()),
            });
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(ClientError::Build)?;
        let token = config.token();
        if token.is_none() {
            tracing::warn!(token_env = %config.token_env, "no API token set; requests are unauthenticated");
        }

        Ok(Self {
            base_url,
            token,
            client,
        })
    }

    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn send(&self, url: &str, request: RequestBuilder) -> Result<Response, ClientError> {
        tracing::debug!(%url, "sending request");
        let response = self
            .authorize(request)
            .send()
            .map_err(|source| ClientError::Request {
                url: url.to_string(),
                source,
            })?;
        check_status(url, response)
    }

    fn send_json<T: DeserializeOwned>(
        &self,
        url: &str,
        request: RequestBuilder,
    ) -> Result<T, ClientError> {
        self.send(url, request)?
            .json()
            .map_err(|source| ClientError::Decode {
                url: url.to_string(),
                source,
            })
    }
}

fn check_status(url: &str, response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let mut message = response.text().unwrap_or_default();
    if message.len() > MAX_ERROR_BODY {
        let mut end = MAX_ERROR_BODY;
        while !message.is_char_boundary(end) {
            end -= 1;
        }
        message.truncate(end);
    }
    if message.is_empty() {
        message = status.canonical_reason().unwrap_or("no reason").to_string();
    }
    Err(ClientError::Status {
        url: url.to_string(),
        status: status.as_u16(),
        message,
    })
}

fn episodes_path(work_id: WorkId) -> String {
    format!("works/{work_id}/episodes")
}

fn episode_path(work_id: WorkId, episode_id: EpisodeId) -> String {
    format!("works/{work_id}/episodes/{episode_id}")
}

fn keywords_path(episode_id: EpisodeId) -> String {
    format!("episodes/{episode_id}/keywords")
}

fn analyze_path(work_id: WorkId) -> String {
    format!("works/{work_id}/settings/analyze")
}

fn confirm_path(work_id: WorkId, episode_id: EpisodeId) -> String {
    format!("works/{work_id}/episodes/{episode_id}/settings/confirm")
}

fn is_locked(status: u16) -> bool {
    status == StatusCode::LOCKED.as_u16() || status == StatusCode::CONFLICT.as_u16()
}

impl EpisodeBackend for HttpBackend {
    fn get_episode(&self, work_id: WorkId, episode_id: EpisodeId) -> Result<Episode, BackendError> {
        let url = self.url(&episode_path(work_id, episode_id));
        Ok(self.send_json(&url, self.client.get(&url))?)
    }

    fn update_episode(
        &self,
        work_id: WorkId,
        episode_id: EpisodeId,
        content: &str,
    ) -> Result<(), BackendError> {
        let url = self.url(&episode_path(work_id, episode_id));
        let body = serde_json::json!({ "content": content });
        match self.send(&url, self.client.put(&url).json(&body)) {
            Ok(_) => Ok(()),
            Err(e) if e.status().is_some_and(is_locked) => {
                tracing::warn!(episode_id = %episode_id, "server rejected save of read-only episode");
                Err(BackendError::ReadOnly { episode_id })
            }
            Err(e) => Err(e.into()),
        }
    }

    fn list_episodes(&self, work_id: WorkId) -> Result<Vec<Episode>, BackendError> {
        let url = self.url(&episodes_path(work_id));
        Ok(self.send_json(&url, self.client.get(&url))?)
    }
}

impl AnalysisBackend for HttpBackend {
    fn extract_keywords(&self, episode_id: EpisodeId) -> Result<KeywordSet, BackendError> {
        let url = self.url(&keywords_path(episode_id));
        Ok(self.send_json(&url, self.client.post(&url))?)
    }

    fn analyze(&self, work_id: WorkId, selection: &KeywordSet) -> Result<SettingsDiff, BackendError> {
        let url = self.url(&analyze_path(work_id));
        Ok(self.send_json(&url, self.client.post(&url).json(selection))?)
    }

    fn confirm_publish(
        &self,
        work_id: WorkId,
        episode_id: EpisodeId,
        diff: &SettingsDiff,
    ) -> Result<(), BackendError> {
        let url = self.url(&confirm_path(work_id, episode_id));
        self.send(&url, self.client.post(&url).json(diff))?;
        Ok(())
    }

    fn name(&self) -> &str {
        "http"
    }
}
