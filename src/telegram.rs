//! Telegram Bot API gateway client
//!
//! Implements the [`MessagingGateway`] seam over the Bot API's `getUpdates`
//! and `sendMessage` methods. Inbound updates are mapped to [`ChatUpdate`]s;
//! updates carrying neither a message nor a callback selection are dropped.

use crate::core::{ChatUpdate, MessageMode, MessagingGateway, OutboundMessage, UpdateKind};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, trace};

/// Errors surfaced by the messaging gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("gateway returned status {status}: {body}")]
    Api {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("gateway response did not parse: {0}")]
    Parse(#[from] serde_json::Error),
}

// Wire structs for the subset of the Bot API the gateway uses.

#[derive(Deserialize)]
struct UpdatesResponse {
    result: Vec<WireUpdate>,
}

#[derive(Deserialize)]
struct WireUpdate {
    update_id: i64,
    message: Option<WireMessage>,
    callback_query: Option<WireCallback>,
}

#[derive(Deserialize)]
struct WireMessage {
    chat: WireChat,
}

#[derive(Deserialize)]
struct WireChat {
    id: i64,
    username: Option<String>,
}

#[derive(Deserialize)]
struct WireCallback {
    from: WireUser,
    data: String,
}

#[derive(Deserialize)]
struct WireUser {
    id: i64,
}

#[derive(Serialize)]
struct WireKeyboardButton<'a> {
    text: &'a str,
    callback_data: &'a str,
}

/// Maps one wire update to the domain representation, if it carries
/// anything the ingestion loop acts on.
fn map_update(update: WireUpdate) -> Option<ChatUpdate> {
    let kind = if let Some(message) = update.message {
        UpdateKind::NewChat {
            chat_id: message.chat.id,
            display_name: message.chat.username.unwrap_or_default(),
        }
    } else if let Some(callback) = update.callback_query {
        UpdateKind::Selection {
            chat_id: callback.from.id,
            region: callback.data,
        }
    } else {
        return None;
    };
    Some(ChatUpdate {
        update_id: update.update_id,
        kind,
    })
}

/// HTTP client for the Telegram Bot API.
pub struct TelegramClient {
    api_url: String,
    token: String,
    client: reqwest::Client,
}

impl TelegramClient {
    /// Creates a new gateway client with a bounded per-request timeout.
    ///
    /// # Arguments
    /// * `api_url` - Base URL up to and including the `/bot` prefix
    /// * `token` - The bot token appended to the base URL
    pub fn new(api_url: String, token: String, timeout: Duration) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            api_url,
            token,
            client,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}{}/{}", self.api_url, self.token, method)
    }

    fn send_payload(message: &OutboundMessage) -> serde_json::Value {
        let mut payload = json!({
            "chat_id": message.chat_id,
            "text": message.text,
        });
        match &message.mode {
            MessageMode::Plain => {}
            MessageMode::MarkdownV2 => {
                payload["parse_mode"] = json!("MarkdownV2");
            }
            MessageMode::Keyboard(keyboard) => {
                let rows: Vec<Vec<WireKeyboardButton>> = keyboard
                    .rows
                    .iter()
                    .map(|row| {
                        row.iter()
                            .map(|button| WireKeyboardButton {
                                text: &button.label,
                                callback_data: &button.callback_data,
                            })
                            .collect()
                    })
                    .collect();
                payload["reply_markup"] = json!({ "inline_keyboard": rows });
            }
        }
        payload
    }
}

#[async_trait]
impl MessagingGateway for TelegramClient {
    async fn poll_updates(&self, offset: Option<i64>) -> Result<Vec<ChatUpdate>, GatewayError> {
        let mut request = self.client.get(self.method_url("getUpdates"));
        if let Some(last_seen) = offset {
            // The API's offset parameter is the first id we want back.
            request = request.query(&[("offset", last_seen + 1)]);
        }
        let response = request.send().await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(GatewayError::Api { status, body });
        }

        let updates: UpdatesResponse = serde_json::from_str(&body)?;
        let mapped: Vec<ChatUpdate> = updates.result.into_iter().filter_map(map_update).collect();
        trace!(count = mapped.len(), "Polled gateway updates");
        Ok(mapped)
    }

    async fn send(&self, message: &OutboundMessage) -> Result<(), GatewayError> {
        let payload = Self::send_payload(message);
        let response = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Api { status, body });
        }
        debug!(chat_id = message.chat_id, "Sent gateway message");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{InlineKeyboard, KeyboardButton};
    use wiremock::matchers::{body_partial_json, method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(server: &MockServer) -> TelegramClient {
        TelegramClient::new(
            format!("{}/bot", server.uri()),
            "TOKEN".to_string(),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_poll_updates_maps_messages_and_callbacks() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/botTOKEN/getUpdates"))
            .and(query_param_is_missing("offset"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{
                    "ok": true,
                    "result": [
                        {
                            "update_id": 7,
                            "message": {"message_id": 1, "chat": {"id": 42, "username": "alice"}}
                        },
                        {
                            "update_id": 8,
                            "callback_query": {"from": {"id": 42}, "data": "us"}
                        },
                        {"update_id": 9}
                    ]
                }"#,
            ))
            .mount(&server)
            .await;

        let updates = test_client(&server).poll_updates(None).await.unwrap();
        assert_eq!(updates.len(), 2);
        assert_eq!(
            updates[0],
            ChatUpdate {
                update_id: 7,
                kind: UpdateKind::NewChat {
                    chat_id: 42,
                    display_name: "alice".to_string()
                }
            }
        );
        assert_eq!(
            updates[1],
            ChatUpdate {
                update_id: 8,
                kind: UpdateKind::Selection {
                    chat_id: 42,
                    region: "us".to_string()
                }
            }
        );
    }

    #[tokio::test]
    async fn test_poll_updates_requests_ids_after_the_offset() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/botTOKEN/getUpdates"))
            .and(query_param("offset", "8"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"ok": true, "result": []}"#),
            )
            .mount(&server)
            .await;

        let updates = test_client(&server).poll_updates(Some(7)).await.unwrap();
        assert!(updates.is_empty());
    }

    #[tokio::test]
    async fn test_poll_updates_transport_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/botTOKEN/getUpdates"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let result = test_client(&server).poll_updates(None).await;
        assert!(matches!(result, Err(GatewayError::Api { status, .. }) if status.as_u16() == 502));
    }

    #[tokio::test]
    async fn test_send_markdown_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/sendMessage"))
            .and(body_partial_json(json!({
                "chat_id": 42,
                "text": "*hello*",
                "parse_mode": "MarkdownV2"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"ok": true}"#))
            .mount(&server)
            .await;

        let message = OutboundMessage::markdown(42, "*hello*");
        test_client(&server).send(&message).await.unwrap();
    }

    #[tokio::test]
    async fn test_send_plain_message_has_no_parse_mode() {
        let payload = TelegramClient::send_payload(&OutboundMessage::plain(1, "hi"));
        assert_eq!(payload, json!({"chat_id": 1, "text": "hi"}));
    }

    #[tokio::test]
    async fn test_send_keyboard_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/sendMessage"))
            .and(body_partial_json(json!({
                "chat_id": 42,
                "text": "pick one",
                "reply_markup": {
                    "inline_keyboard": [
                        [{"text": "🇺🇸 USA", "callback_data": "us"}],
                        [{"text": "🌍 Global", "callback_data": "all"}]
                    ]
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"ok": true}"#))
            .mount(&server)
            .await;

        let keyboard = InlineKeyboard {
            rows: vec![
                vec![KeyboardButton {
                    label: "🇺🇸 USA".to_string(),
                    callback_data: "us".to_string(),
                }],
                vec![KeyboardButton {
                    label: "🌍 Global".to_string(),
                    callback_data: "all".to_string(),
                }],
            ],
        };
        let message = OutboundMessage::with_keyboard(42, "pick one", keyboard);
        test_client(&server).send(&message).await.unwrap();
    }

    #[tokio::test]
    async fn test_send_surfaces_api_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/sendMessage"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_string(r#"{"ok": false, "description": "can't parse entities"}"#),
            )
            .mount(&server)
            .await;

        let result = test_client(&server)
            .send(&OutboundMessage::markdown(42, "broken *"))
            .await;
        assert!(matches!(result, Err(GatewayError::Api { status, .. }) if status.as_u16() == 400));
    }
}
