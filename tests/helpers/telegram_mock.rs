//! Mock Telegram Bot API server for testing
//!
//! Uses wiremock to answer `sendMessage` the way the Bot API does.

use serde_json::json;
use wiremock::{
    matchers::{method, path_regex},
    Mock, MockServer, ResponseTemplate,
};

pub const TEST_BOT_TOKEN: &str = "12345:test_token";
pub const TEST_CHAT_ID: i64 = -1001234567890;

/// Mock Telegram API server for testing
pub struct TelegramMockServer {
    pub server: MockServer,
}

impl TelegramMockServer {
    pub async fn new() -> Self {
        Self { server: MockServer::start().await }
    }

    /// Base URL to hand to the bot in place of api.telegram.org
    pub fn api_url(&self) -> url::Url {
        url::Url::parse(&self.server.uri()).expect("mock server uri")
    }

    /// Setup mock for sendMessage endpoint; the Bot API matches method names case-insensitively
    pub async fn mock_send_message(&self, success: bool) {
        let body = if success {
            json!({
                "ok": true,
                "result": {
                    "message_id": 123,
                    "from": {
                        "id": 12345,
                        "is_bot": true,
                        "first_name": "EventDeskBot",
                        "username": "eventdesk_bot"
                    },
                    "chat": {
                        "id": TEST_CHAT_ID,
                        "title": "EventDesk Ops",
                        "type": "supergroup"
                    },
                    "date": 1640995200,
                    "text": "Test message"
                }
            })
        } else {
            json!({
                "ok": false,
                "error_code": 400,
                "description": "Bad Request: chat not found"
            })
        };

        Mock::given(method("POST"))
            .and(path_regex(format!("(?i)^/bot{}/sendmessage$", regex::escape(TEST_BOT_TOKEN))))
            .respond_with(ResponseTemplate::new(if success { 200 } else { 400 }).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Bodies of every sendMessage request received so far
    pub async fn sent_messages(&self) -> Vec<serde_json::Value> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|request| request.url.path().to_lowercase().ends_with("/sendmessage"))
            .filter_map(|request| serde_json::from_slice(&request.body).ok())
            .collect()
    }
}
