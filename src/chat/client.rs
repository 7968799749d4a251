use crate::chat::types::{MessageEnvelope, MessageRequest, SessionInfo};
use crate::config::OpenCodeConfig;
use crate::error::{CompanionError, Result};
use crate::server::manager::ServerManager;
use crate::server::types::ServerStatus;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Request/response chat on top of the managed server. Each request
/// creates a fresh remote session before posting the message; that
/// trades a little latency for never hitting a stale session. Reusing a
/// cached session across a conversation is a possible optimization, not
/// something callers may rely on.
pub struct ChatClient {
    http: reqwest::Client,
    manager: Arc<ServerManager>,
    config: RwLock<OpenCodeConfig>,
}

impl ChatClient {
    pub fn new(manager: Arc<ServerManager>, config: OpenCodeConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            manager,
            config: RwLock::new(config),
        }
    }

    pub async fn config(&self) -> OpenCodeConfig {
        self.config.read().await.clone()
    }

    pub async fn set_config(&self, config: OpenCodeConfig) {
        *self.config.write().await = config;
    }

    /// Sends a prompt (optionally with a code excerpt) and returns the
    /// assistant's reply text. Transport and protocol failures surface
    /// here and leave the server lifecycle untouched.
    pub async fn send_request(&self, prompt: &str, code: Option<&str>) -> Result<String> {
        let config = self.config.read().await.clone();
        let base_url = self.resolve_base_url(&config).await?;

        let session = self.create_session(&base_url).await?;
        debug!(session_id = %session.id, "created chat session");

        let text = compose_prompt(prompt, code);
        let request = MessageRequest::text(text, config.provider_id(), config.model_id());

        let url = format!(
            "{}/session/{}/message",
            base_url.trim_end_matches('/'),
            session.id
        );
        info!(url = %url, "sending chat request");

        let response = self
            .http
            .post(&url)
            .json(&request)
            .timeout(config.request_timeout())
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() != 200 {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %body, "chat request failed");
            return Err(CompanionError::Protocol {
                status: status.as_u16(),
                body,
            });
        }

        let envelope: MessageEnvelope = response.json().await?;
        let reply = envelope.text_content();
        info!(chars = reply.len(), "received assistant reply");
        Ok(reply)
    }

    pub async fn explain_code(&self, code: &str) -> Result<String> {
        self.send_request("Please explain what this code does:", Some(code))
            .await
    }

    pub async fn optimize_code(&self, code: &str) -> Result<String> {
        self.send_request("Please optimize this code:", Some(code))
            .await
    }

    /// A custom base URL means an externally-managed server; otherwise
    /// the local lifecycle manager must be Running (a start in flight is
    /// awaited, a stopped or errored server is started) before its live
    /// endpoint is used.
    async fn resolve_base_url(&self, config: &OpenCodeConfig) -> Result<String> {
        if let Some(url) = config.custom_base_url() {
            debug!(url = %url, "using configured external server");
            return Ok(url);
        }

        if self.manager.status() != ServerStatus::Running {
            info!("server not running, starting it for this request");
            if !self.manager.start().await {
                return Err(CompanionError::ServerUnavailable(
                    "OpenCode server is not running and could not be started".to_string(),
                ));
            }
        }

        self.manager.base_url().await.ok_or_else(|| {
            CompanionError::ServerUnavailable("no server endpoint available".to_string())
        })
    }

    async fn create_session(&self, base_url: &str) -> Result<SessionInfo> {
        let url = format!("{}/session", base_url.trim_end_matches('/'));

        let response = self
            .http
            .post(&url)
            .json(&serde_json::json!({}))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %body, "session creation failed");
            return Err(CompanionError::Protocol {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await?)
    }
}

/// Prompt text with the code excerpt, when present, under a labelled
/// section.
fn compose_prompt(prompt: &str, code: Option<&str>) -> String {
    match code {
        Some(code) if !code.trim().is_empty() => format!("{}\n\nCode:\n{}", prompt, code),
        _ => prompt.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn external_client(uri: &str) -> ChatClient {
        let manager = Arc::new(ServerManager::new(std::env::temp_dir()));
        let config = OpenCodeConfig {
            base_url: uri.to_string(),
            ..Default::default()
        };
        ChatClient::new(manager, config)
    }

    async fn mount_session(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/session"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "ses_123",
                "title": "New session"
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_send_request_concatenates_text_parts() {
        let server = MockServer::start().await;
        mount_session(&server).await;

        Mock::given(method("POST"))
            .and(path("/session/ses_123/message"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "info": {
                    "id": "msg_1",
                    "sessionID": "ses_123",
                    "role": "assistant",
                    "time": {"created": 1, "completed": 2}
                },
                "parts": [
                    {"type": "step-start"},
                    {"type": "text", "text": "Hello"},
                    {"type": "text", "text": " world"}
                ]
            })))
            .mount(&server)
            .await;

        let client = external_client(&server.uri());
        let reply = client.send_request("say hi", None).await.unwrap();
        assert_eq!(reply, "Hello world");
    }

    #[tokio::test]
    async fn test_request_body_carries_prompt_code_and_model() {
        let server = MockServer::start().await;
        mount_session(&server).await;

        let expected_body = json!({
            "parts": [{"type": "text", "text": "explain\n\nCode:\nx=1"}],
            "model": {
                "providerID": "anthropic",
                "modelID": "claude-3-5-sonnet-20241022"
            }
        });

        Mock::given(method("POST"))
            .and(path("/session/ses_123/message"))
            .and(body_json(&expected_body))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "info": {"id": "msg_1", "role": "assistant"},
                "parts": [{"type": "text", "text": "ok"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = external_client(&server.uri());
        let reply = client.send_request("explain", Some("x=1")).await.unwrap();
        assert_eq!(reply, "ok");
    }

    #[tokio::test]
    async fn test_server_error_surfaces_status_without_touching_lifecycle() {
        let server = MockServer::start().await;
        mount_session(&server).await;

        Mock::given(method("POST"))
            .and(path("/session/ses_123/message"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = external_client(&server.uri());
        let status_before = client.manager.status();
        let err = client.send_request("hi", None).await.unwrap_err();

        let message = err.to_string();
        assert!(message.contains("500"), "error was: {}", message);
        assert_eq!(client.manager.status(), status_before);
    }

    #[tokio::test]
    async fn test_garbled_response_is_an_error() {
        let server = MockServer::start().await;
        mount_session(&server).await;

        Mock::given(method("POST"))
            .and(path("/session/ses_123/message"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let client = external_client(&server.uri());
        assert!(client.send_request("hi", None).await.is_err());
    }

    #[tokio::test]
    async fn test_session_creation_failure_stops_the_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/session"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = external_client(&server.uri());
        let err = client.send_request("hi", None).await.unwrap_err();
        assert!(err.to_string().contains("503"));
    }

    #[test]
    fn test_compose_prompt_labels_code_section() {
        assert_eq!(
            compose_prompt("explain", Some("x=1")),
            "explain\n\nCode:\nx=1"
        );
        assert_eq!(compose_prompt("explain", None), "explain");
        assert_eq!(compose_prompt("explain", Some("  ")), "explain");
    }
}
