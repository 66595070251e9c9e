//! HTTP client for the MindStash chat backend.
//!
//! The backend is reached through the `ChatBackend` trait so the session
//! layer can run against a scripted fake in tests; `ApiClient` is the real
//! implementation over reqwest.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// Chunked byte body of one turn's streamed response.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>>> + Send>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub message_count: usize,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMessage {
    pub id: String,
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct SessionListResponse {
    sessions: Vec<SessionSummary>,
    #[allow(dead_code)]
    total: usize,
}

#[derive(Serialize)]
struct TurnRequest<'a> {
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<&'a str>,
}

/// Remote operations the assistant core consumes.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Open one turn's streamed response.
    async fn send_turn(&self, message: &str, session_id: Option<&str>) -> Result<ByteStream>;

    /// Sessions ordered by most recent activity.
    async fn list_sessions(&self, limit: usize) -> Result<Vec<SessionSummary>>;

    /// Messages of one session, oldest first.
    async fn session_messages(&self, session_id: &str, limit: usize)
        -> Result<Vec<SessionMessage>>;
}

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn from_env() -> Self {
        let base = std::env::var("MINDSTASH_API_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:8000".to_string());
        let token = std::env::var("MINDSTASH_API_TOKEN")
            .ok()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        Self::new(base, token)
    }

    pub fn new(base_url: String, token: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: normalize_base_url(&base_url),
            token,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut builder = self.http.request(method, url);
        if let Some(token) = self.token.as_deref() {
            builder = builder.bearer_auth(token);
        }
        builder
    }
}

#[async_trait]
impl ChatBackend for ApiClient {
    async fn send_turn(&self, message: &str, session_id: Option<&str>) -> Result<ByteStream> {
        let response = self
            .request(reqwest::Method::POST, "/api/chat/")
            .json(&TurnRequest {
                message,
                session_id,
            })
            .send()
            .await
            .context("POST /api/chat/ failed")?
            .error_for_status()
            .context("POST /api/chat/ rejected")?;

        let stream = response.bytes_stream().map(|chunk| {
            chunk
                .map(|bytes| bytes.to_vec())
                .map_err(|error| anyhow::Error::new(error).context("chat stream read failed"))
        });
        Ok(Box::pin(stream))
    }

    async fn list_sessions(&self, limit: usize) -> Result<Vec<SessionSummary>> {
        let response = self
            .request(reqwest::Method::GET, "/api/chat/sessions")
            .query(&[("limit", limit)])
            .send()
            .await?
            .error_for_status()
            .context("GET /api/chat/sessions failed")?
            .json::<SessionListResponse>()
            .await
            .context("Failed to decode session list")?;

        Ok(response.sessions)
    }

    async fn session_messages(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<SessionMessage>> {
        self.request(
            reqwest::Method::GET,
            &format!("/api/chat/sessions/{}/messages", session_id),
        )
        .query(&[("limit", limit)])
        .send()
        .await?
        .error_for_status()
        .with_context(|| format!("GET /api/chat/sessions/{}/messages failed", session_id))?
        .json::<Vec<SessionMessage>>()
        .await
        .context("Failed to decode chat history")
    }
}

fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        "http://127.0.0.1:8000".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_base_url() {
        assert_eq!(normalize_base_url("http://x:1/"), "http://x:1");
        assert_eq!(normalize_base_url(""), "http://127.0.0.1:8000");
        assert_eq!(
            normalize_base_url("  https://api.example.com  "),
            "https://api.example.com"
        );
    }

    #[test]
    fn api_client_normalizes_its_base_url() {
        let client = ApiClient::new("http://127.0.0.1:8000/".to_string(), None);
        assert_eq!(client.base_url(), "http://127.0.0.1:8000");
    }

    #[test]
    fn turn_request_omits_absent_session_id() {
        let without = serde_json::to_value(TurnRequest {
            message: "hello",
            session_id: None,
        })
        .expect("serialize");
        assert_eq!(without, serde_json::json!({"message": "hello"}));

        let with = serde_json::to_value(TurnRequest {
            message: "hello",
            session_id: Some("s1"),
        })
        .expect("serialize");
        assert_eq!(
            with,
            serde_json::json!({"message": "hello", "session_id": "s1"})
        );
    }

    #[test]
    fn session_list_deserializes_server_payload() {
        let payload = serde_json::json!({
            "sessions": [{
                "id": "9f3a",
                "title": "Grocery ideas",
                "agent_type": "default",
                "is_active": true,
                "created_at": "2026-08-28T06:17:38.096788Z",
                "last_active_at": "2026-08-29T10:02:11.000000Z",
                "message_count": 7
            }],
            "total": 1
        });

        let parsed: SessionListResponse =
            serde_json::from_value(payload).expect("decode session list");
        assert_eq!(parsed.sessions.len(), 1);
        assert_eq!(parsed.sessions[0].message_count, 7);
        assert_eq!(parsed.sessions[0].title.as_deref(), Some("Grocery ideas"));
    }

    #[test]
    fn session_message_tolerates_null_content() {
        let payload = serde_json::json!({
            "id": "m1",
            "role": "assistant",
            "content": null,
            "tool_calls": [{"id": "t1", "name": "search_items", "input": {}}],
            "created_at": "2026-08-29T10:02:11Z"
        });

        let parsed: SessionMessage = serde_json::from_value(payload).expect("decode message");
        assert_eq!(parsed.content, None);
        assert_eq!(parsed.role, "assistant");
    }
}
