//! Call session backend client — start/join/leave calls, moderation REST.
//!
//! The backend owns session identity and credential issuance for the media
//! engine. Everything here is request/response; push notifications arrive
//! separately through the signaling channel.

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::BackendError;

/// Credentials for one media-engine session.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineCredentials {
    #[serde(rename = "engineToken")]
    pub engine_token: String,
    #[serde(rename = "engineServerUrl")]
    pub engine_server_url: String,
}

/// Response to starting a new call: the session identity plus engine
/// credentials for the initiator.
#[derive(Debug, Clone, Deserialize)]
pub struct CallTicket {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    #[serde(rename = "engineToken")]
    pub engine_token: String,
    #[serde(rename = "engineServerUrl")]
    pub engine_server_url: String,
}

impl CallTicket {
    pub fn credentials(&self) -> EngineCredentials {
        EngineCredentials {
            engine_token: self.engine_token.clone(),
            engine_server_url: self.engine_server_url.clone(),
        }
    }
}

/// The call session backend contract.
///
/// `start_call` creates the session and rings the conversation's other
/// members; the caller learns about accept/decline through the signaling
/// channel, not through this interface.
#[async_trait]
pub trait CallBackend: Send + Sync {
    async fn start_call(&self, conversation_id: &str) -> Result<CallTicket, BackendError>;

    async fn join_call(&self, session_id: &str) -> Result<EngineCredentials, BackendError>;

    async fn leave_call(&self, session_id: &str) -> Result<(), BackendError>;

    async fn end_for_all(&self, session_id: &str) -> Result<(), BackendError>;

    async fn mute_participant(
        &self,
        session_id: &str,
        participant_id: &str,
    ) -> Result<(), BackendError>;

    async fn stop_participant_video(
        &self,
        session_id: &str,
        participant_id: &str,
    ) -> Result<(), BackendError>;

    async fn remove_participant(
        &self,
        session_id: &str,
        participant_id: &str,
    ) -> Result<(), BackendError>;
}

/// HTTP implementation against the Huddle call service.
pub struct HttpCallBackend {
    http: reqwest::Client,
    base_url: String,
    access_token: String,
}

impl HttpCallBackend {
    pub fn new(base_url: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            access_token: access_token.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    /// POST with bearer auth; non-2xx becomes `BackendError::Status`.
    async fn post(&self, url: &str, body: &serde_json::Value) -> Result<reqwest::Response, BackendError> {
        tracing::debug!("Backend POST {}", url);

        let resp = self
            .http
            .post(url)
            .bearer_auth(&self.access_token)
            .json(body)
            .send()
            .await
            .map_err(|source| BackendError::Transport {
                url: url.to_string(),
                source,
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                url: url.to_string(),
                body,
            });
        }
        Ok(resp)
    }

    async fn post_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<T, BackendError> {
        let resp = self.post(url, body).await?;
        resp.json().await.map_err(|e| BackendError::Decode {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl CallBackend for HttpCallBackend {
    async fn start_call(&self, conversation_id: &str) -> Result<CallTicket, BackendError> {
        let url = self.url("/v1/calls");
        let body = serde_json::json!({ "conversationId": conversation_id });
        let ticket: CallTicket = self.post_json(&url, &body).await?;
        tracing::info!("Started call {} in {}", ticket.session_id, conversation_id);
        Ok(ticket)
    }

    async fn join_call(&self, session_id: &str) -> Result<EngineCredentials, BackendError> {
        let url = self.url(&format!("/v1/calls/{}/join", session_id));
        let creds: EngineCredentials = self.post_json(&url, &serde_json::json!({})).await?;
        tracing::info!("Joined call {}", session_id);
        Ok(creds)
    }

    async fn leave_call(&self, session_id: &str) -> Result<(), BackendError> {
        let url = self.url(&format!("/v1/calls/{}/leave", session_id));
        self.post(&url, &serde_json::json!({})).await?;
        tracing::info!("Left call {}", session_id);
        Ok(())
    }

    async fn end_for_all(&self, session_id: &str) -> Result<(), BackendError> {
        let url = self.url(&format!("/v1/calls/{}/end", session_id));
        self.post(&url, &serde_json::json!({})).await?;
        tracing::info!("Ended call {} for all participants", session_id);
        Ok(())
    }

    async fn mute_participant(
        &self,
        session_id: &str,
        participant_id: &str,
    ) -> Result<(), BackendError> {
        let url = self.url(&format!(
            "/v1/calls/{}/participants/{}/mute",
            session_id, participant_id
        ));
        self.post(&url, &serde_json::json!({})).await?;
        Ok(())
    }

    async fn stop_participant_video(
        &self,
        session_id: &str,
        participant_id: &str,
    ) -> Result<(), BackendError> {
        let url = self.url(&format!(
            "/v1/calls/{}/participants/{}/stop-video",
            session_id, participant_id
        ));
        self.post(&url, &serde_json::json!({})).await?;
        Ok(())
    }

    async fn remove_participant(
        &self,
        session_id: &str,
        participant_id: &str,
    ) -> Result<(), BackendError> {
        let url = self.url(&format!(
            "/v1/calls/{}/participants/{}/remove",
            session_id, participant_id
        ));
        self.post(&url, &serde_json::json!({})).await?;
        Ok(())
    }
}
