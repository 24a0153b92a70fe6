use std::time::Duration;

use tracing::debug;

use crate::api::{ChatMessage, ChatRequest, ChatResponse};
use crate::core::config::Config;
use crate::core::message::{Message, Role};

/// The one remote collaborator: the DeepSeek chat completion endpoint.
pub const COMPLETION_ENDPOINT: &str = "https://api.deepseek.com/v1/chat/completions";

/// Fixed system prompt prepended to every request.
const SYSTEM_PROMPT: &str = "You are a helpful assistant.";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Performs the single request/response exchange with the completion
/// endpoint.
///
/// Every outcome is a [`Message`] ready to append to the transcript:
/// a reply on success, a system-role notice on API or transport failure.
/// Nothing escapes this boundary as an error — failures become visible
/// chat entries, never faults in the shell. Exactly one request per
/// call: no retries, no streaming.
pub struct CompletionGateway {
    client: reqwest::Client,
    endpoint: String,
}

impl Default for CompletionGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionGateway {
    pub fn new() -> Self {
        Self::with_endpoint(COMPLETION_ENDPOINT)
    }

    /// Point the gateway at an alternate endpoint (used by tests).
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    /// Reduce the session transcript to the wire shape: the fixed system
    /// prompt first, then every message as `{role, content}` with
    /// timestamps dropped.
    pub fn build_wire_messages(history: &[Message]) -> Vec<ChatMessage> {
        let mut wire = Vec::with_capacity(history.len() + 1);
        wire.push(ChatMessage {
            role: Role::System.as_str().to_string(),
            content: SYSTEM_PROMPT.to_string(),
        });
        for message in history {
            wire.push(ChatMessage {
                role: message.role.as_str().to_string(),
                content: message.content.clone(),
            });
        }
        wire
    }

    pub async fn complete(&self, history: &[Message], config: &Config) -> Message {
        let request = ChatRequest {
            model: config.model.clone(),
            messages: Self::build_wire_messages(history),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            top_p: config.top_p,
            frequency_penalty: config.frequency_penalty,
            presence_penalty: config.presence_penalty,
        };

        debug!(
            model = %request.model,
            messages = request.messages.len(),
            "sending completion request"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", config.api_key))
            .timeout(REQUEST_TIMEOUT)
            .json(&request)
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                debug!("completion request failed in transport: {e}");
                return Message::system(format!("Network error: {e}"));
            }
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                debug!("failed to read completion response body: {e}");
                return Message::system(format!("Network error: {e}"));
            }
        };

        if status.is_success() {
            match Self::extract_reply(&body) {
                Ok(content) => Message::assistant(content),
                Err(detail) => Message::system(format!(
                    "API error: {detail} (status code: {})",
                    status.as_u16()
                )),
            }
        } else {
            debug!(status = status.as_u16(), "completion request rejected");
            Message::system(format!(
                "API error: {body} (status code: {})",
                status.as_u16()
            ))
        }
    }

    fn extract_reply(body: &str) -> Result<String, String> {
        let parsed: ChatResponse =
            serde_json::from_str(body).map_err(|e| format!("unexpected response body: {e}"))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| "response contained no choices".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config() -> Config {
        Config {
            api_key: "sk-test".to_string(),
            ..Config::default()
        }
    }

    fn gateway_for(server: &MockServer) -> CompletionGateway {
        CompletionGateway::with_endpoint(format!("{}/v1/chat/completions", server.uri()))
    }

    #[tokio::test]
    async fn successful_completion_yields_assistant_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("Authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "hello"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let history = vec![Message::user("hi")];
        let reply = gateway_for(&server).complete(&history, &test_config()).await;

        assert_eq!(reply.role, Role::Assistant);
        assert_eq!(reply.content, "hello");
        assert!(reply.timestamp.is_some());
    }

    #[tokio::test]
    async fn request_carries_sampling_parameters_verbatim() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "model": "deepseek-chat",
                "temperature": 0.7,
                "max_tokens": 2048,
                "top_p": 0.95,
                "frequency_penalty": 0,
                "presence_penalty": 0
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "ok"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let reply = gateway_for(&server)
            .complete(&[Message::user("hi")], &test_config())
            .await;

        assert_eq!(reply.role, Role::Assistant);
    }

    #[tokio::test]
    async fn api_error_embeds_raw_body_and_status_code() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("server error"))
            .mount(&server)
            .await;

        let reply = gateway_for(&server)
            .complete(&[Message::user("hi")], &test_config())
            .await;

        assert_eq!(reply.role, Role::System);
        assert!(reply.content.contains("server error"));
        assert!(reply.content.contains("500"));
        assert!(reply.timestamp.is_some());
    }

    #[tokio::test]
    async fn success_without_choices_is_reported_as_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let reply = gateway_for(&server)
            .complete(&[Message::user("hi")], &test_config())
            .await;

        assert_eq!(reply.role, Role::System);
        assert!(reply.content.contains("no choices"));
        assert!(reply.content.contains("200"));
    }

    #[tokio::test]
    async fn transport_failure_yields_network_error_message() {
        let server = MockServer::start().await;
        let endpoint = format!("{}/v1/chat/completions", server.uri());
        drop(server);

        let gateway = CompletionGateway::with_endpoint(endpoint);
        let reply = gateway
            .complete(&[Message::user("hi")], &test_config())
            .await;

        assert_eq!(reply.role, Role::System);
        assert!(reply.content.starts_with("Network error: "));
    }

    #[test]
    fn wire_messages_lead_with_the_fixed_system_prompt() {
        let history = vec![Message::user("first"), Message::assistant("second")];

        let wire = CompletionGateway::build_wire_messages(&history);

        assert_eq!(wire.len(), 3);
        assert_eq!(wire[0].role, "system");
        assert_eq!(wire[0].content, SYSTEM_PROMPT);
        assert_eq!(wire[1].role, "user");
        assert_eq!(wire[1].content, "first");
        assert_eq!(wire[2].role, "assistant");
    }

    #[test]
    fn wire_messages_drop_timestamps() {
        let wire = CompletionGateway::build_wire_messages(&[Message::user("hi")]);
        let serialized = serde_json::to_string(&wire).expect("serialize failed");
        assert!(!serialized.contains("timestamp"));
    }
}
