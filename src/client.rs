use crate::conflict::ConflictSet;
use crate::error::ClientError;
use crate::plan::{self, MessageBody, Section};
use crate::session::SessionId;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";

#[derive(Serialize)]
struct ChatRequest<'a> {
    message: &'a str,
    session_id: &'a SessionId,
}

#[derive(Serialize)]
struct DigRequest<'a> {
    session_id: &'a SessionId,
    topic: &'a str,
}

#[derive(Serialize)]
struct EditSectionRequest<'a> {
    session_id: &'a SessionId,
    section: &'a str,
    new_content: &'a str,
}

#[derive(Serialize)]
struct ResetSessionRequest<'a> {
    session_id: &'a SessionId,
}

/// Reply shape shared by `/chat` and `/edit-section`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub reply: Option<String>,
    #[serde(default)]
    pub account_plan: Option<Value>,
    #[serde(default)]
    pub conflicts: Option<ConflictSet>,
    #[serde(skip)]
    pub raw: Value,
}

impl ChatResponse {
    pub fn has_plan(&self) -> bool {
        !matches!(self.account_plan, None | Some(Value::Null) | Some(Value::Bool(false)))
    }

    pub fn body(&self) -> MessageBody {
        plan::format_reply(self.account_plan.as_ref(), self.reply.as_deref())
    }

    /// Conflicts worth showing; an empty set counts as none
    pub fn conflicts(&self) -> Option<&ConflictSet> {
        self.conflicts.as_ref().filter(|set| !set.is_empty())
    }

    /// The reply text, or the whole response as JSON when there is none
    pub fn reply_or_raw(&self) -> String {
        match self.reply.as_deref() {
            Some(reply) if !reply.is_empty() => reply.to_string(),
            _ => self.raw.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DigResponse {
    #[serde(default)]
    pub reconciliation: Option<String>,
    #[serde(default)]
    pub reply: Option<String>,
    #[serde(skip)]
    pub raw: Value,
}

impl DigResponse {
    pub fn text(&self) -> String {
        [self.reconciliation.as_deref(), self.reply.as_deref()]
            .into_iter()
            .flatten()
            .find(|text| !text.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| self.raw.to_string())
    }
}

/// JSON-over-HTTP client for the planner backend
#[derive(Clone)]
pub struct BackendClient {
    client: Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn chat(&self, session: &SessionId, message: &str) -> Result<ChatResponse, ClientError> {
        let value = self
            .post_json("/chat", &ChatRequest { message, session_id: session })
            .await?;
        decode("/chat", value)
    }

    pub async fn dig_deeper(&self, session: &SessionId, topic: &str) -> Result<DigResponse, ClientError> {
        let value = self
            .post_json("/dig-deeper", &DigRequest { session_id: session, topic })
            .await?;
        let mut response: DigResponse = serde_json::from_value(value.clone())
            .map_err(|source| ClientError::Decode { endpoint: "/dig-deeper", source })?;
        response.raw = value;
        Ok(response)
    }

    pub async fn edit_section(
        &self,
        session: &SessionId,
        section: Section,
        new_content: &str,
    ) -> Result<ChatResponse, ClientError> {
        let request = EditSectionRequest {
            session_id: session,
            section: section.as_str(),
            new_content,
        };
        let value = self.post_json("/edit-section", &request).await?;
        decode("/edit-section", value)
    }

    pub async fn reset_session(&self, session: &SessionId) -> Result<(), ClientError> {
        self.post("/reset-session", &ResetSessionRequest { session_id: session })
            .await
            .map(|_| ())
    }

    /// Legacy reset that clears the backend's default session
    pub async fn reset(&self) -> Result<(), ClientError> {
        self.post("/reset", &serde_json::json!({})).await.map(|_| ())
    }

    /// Reset the session, falling back to `/reset` on backends without `/reset-session`
    pub async fn reset_with_fallback(&self, session: &SessionId) -> Result<(), ClientError> {
        match self.reset_session(session).await {
            Err(err) if err.is_not_found() => {
                tracing::info!("/reset-session not found, falling back to /reset");
                self.reset().await
            }
            other => other,
        }
    }

    async fn post<T: Serialize + ?Sized>(
        &self,
        endpoint: &'static str,
        body: &T,
    ) -> Result<reqwest::Response, ClientError> {
        let url = format!("{}{}", self.base_url, endpoint);
        tracing::debug!(%url, "POST");

        // .json() sets Content-Type; keep the header explicit like the web client did
        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status { endpoint, status });
        }
        Ok(response)
    }

    async fn post_json<T: Serialize + ?Sized>(
        &self,
        endpoint: &'static str,
        body: &T,
    ) -> Result<Value, ClientError> {
        let bytes = self.post(endpoint, body).await?.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|source| ClientError::Decode { endpoint, source })
    }
}

fn decode(endpoint: &'static str, value: Value) -> Result<ChatResponse, ClientError> {
    let mut response: ChatResponse =
        serde_json::from_value(value.clone()).map_err(|source| ClientError::Decode { endpoint, source })?;
    response.raw = value;
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn chat_posts_message_and_session() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat"))
            .and(header("content-type", "application/json"))
            .and(body_json(json!({ "message": "Research Zoom", "session_id": "default-session" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "reply": "Working on it",
                "conflicts": { "budget": [{ "value": "10k" }, { "value": "20k" }] }
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = BackendClient::new(&mock_server.uri());
        let response = client.chat(&SessionId::default(), "Research Zoom").await.unwrap();

        assert_eq!(response.reply.as_deref(), Some("Working on it"));
        assert!(!response.has_plan());
        assert_eq!(response.conflicts().unwrap().summary(), "budget: 10k / 20k");
    }

    #[tokio::test]
    async fn server_error_is_a_status_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "detail": "boom" })))
            .mount(&mock_server)
            .await;

        let client = BackendClient::new(&mock_server.uri());
        let err = client.chat(&SessionId::default(), "hi").await.unwrap_err();
        assert!(matches!(err, ClientError::Status { endpoint: "/chat", .. }));
    }

    #[tokio::test]
    async fn non_json_body_is_a_decode_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&mock_server)
            .await;

        let client = BackendClient::new(&mock_server.uri());
        let err = client.chat(&SessionId::default(), "hi").await.unwrap_err();
        assert!(matches!(err, ClientError::Decode { .. }));
    }

    #[tokio::test]
    async fn edit_section_sends_wire_section_name() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/edit-section"))
            .and(body_json(json!({
                "session_id": "acme",
                "section": "key_stakeholders",
                "new_content": "CTO: Jane Doe"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "ok" })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = BackendClient::new(&mock_server.uri());
        let response = client
            .edit_section(&SessionId::new("acme"), Section::KeyStakeholders, "CTO: Jane Doe")
            .await
            .unwrap();

        assert_eq!(response.reply_or_raw(), r#"{"status":"ok"}"#);
    }

    #[tokio::test]
    async fn dig_deeper_prefers_reconciliation() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/dig-deeper"))
            .and(body_json(json!({ "session_id": "default-session", "topic": "budget" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "reconciliation": "Budget is 15k per the latest filing",
                "reply": "fallback"
            })))
            .mount(&mock_server)
            .await;

        let client = BackendClient::new(&mock_server.uri());
        let response = client.dig_deeper(&SessionId::default(), "budget").await.unwrap();
        assert_eq!(response.text(), "Budget is 15k per the latest filing");
    }

    #[tokio::test]
    async fn reset_falls_back_when_reset_session_is_missing() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/reset-session"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/reset"))
            .and(body_json(json!({})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "reply": "Session reset successfully." })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = BackendClient::new(&format!("{}/", mock_server.uri()));
        client.reset_with_fallback(&SessionId::default()).await.unwrap();
    }

    #[tokio::test]
    async fn reset_session_does_not_fall_back_on_success() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/reset-session"))
            .and(body_json(json!({ "session_id": "default-session" })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/reset"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        let client = BackendClient::new(&mock_server.uri());
        client.reset_with_fallback(&SessionId::default()).await.unwrap();
    }

    #[test]
    fn dig_text_falls_back_to_raw_json() {
        let response = DigResponse {
            raw: json!({ "status": "unknown" }),
            ..Default::default()
        };
        assert_eq!(response.text(), r#"{"status":"unknown"}"#);
    }
}
