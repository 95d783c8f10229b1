//! Telegram transport: Bot API calls for sending, editing, buttons and getUpdates long polling.

use crate::gateway::{ChatTransport, GatewayError};
use crate::models::{ChatId, InboundEvent, InteractivePrompt, MessageHandle, Priority};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

const TELEGRAM_API_BASE: &str = "https://api.telegram.org/bot";
const LONG_POLL_TIMEOUT_SECS: u64 = 30;
/// Bot API hard limit for message text
const MAX_MESSAGE_CHARS: usize = 4096;
const TRUNCATION_MARKER: &str = "\n…(truncated)";

/// Telegram transport bound to one chat. Token and chat_id from config/env; never log the token.
pub struct TelegramTransport {
    token: String,
    chat_id: String,
    api_base: String,
    client: Client,
    /// Next offset for getUpdates (last_update_id + 1).
    next_offset: AtomicI64,
}

impl TelegramTransport {
    pub fn new(token: String, chat_id: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(LONG_POLL_TIMEOUT_SECS + 10))
            .build()
            .unwrap_or_else(|err| {
                tracing::warn!(error = %err, "falling back to default HTTP client");
                Client::new()
            });
        Self {
            token,
            chat_id,
            api_base: TELEGRAM_API_BASE.to_string(),
            client,
            next_offset: AtomicI64::new(0),
        }
    }

    /// Point at a different Bot API server (self-hosted server or test double).
    /// The base is followed directly by the token, e.g. `http://localhost:8081/bot`.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    async fn call<R: DeserializeOwned>(
        &self,
        method: &str,
        body: serde_json::Value,
    ) -> Result<R, GatewayError> {
        let url = format!("{}{}/{}", self.api_base, self.token, method);
        let res = self.client.post(&url).json(&body).send().await?;
        let status = res.status().as_u16();
        let raw = res.text().await?;
        let envelope: ApiResponse<R> =
            serde_json::from_str(&raw).map_err(|err| GatewayError::Api {
                status,
                description: format!("unreadable {} response: {}", method, err),
            })?;
        envelope.into_result(status)
    }

    fn parse_message_id(handle: &MessageHandle) -> Result<i64, GatewayError> {
        handle
            .as_str()
            .parse()
            .map_err(|_| GatewayError::Rejected(format!("not a Telegram message id: {}", handle)))
    }
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send_text(
        &self,
        text: &str,
        priority: Priority,
    ) -> Result<MessageHandle, GatewayError> {
        let body = serde_json::json!({
            "chat_id": self.chat_id,
            "text": truncate_message(text),
            "disable_notification": priority == Priority::Low,
        });
        let sent: SentMessage = self.call("sendMessage", body).await?;
        Ok(MessageHandle::from(sent.message_id))
    }

    async fn edit_text(&self, handle: &MessageHandle, text: &str) -> Result<(), GatewayError> {
        let body = serde_json::json!({
            "chat_id": self.chat_id,
            "message_id": Self::parse_message_id(handle)?,
            "text": truncate_message(text),
        });
        match self.call::<serde_json::Value>("editMessageText", body).await {
            Ok(_) => Ok(()),
            // Editing to identical text is reported as an error by the Bot API.
            Err(GatewayError::Api { description, .. })
                if description.contains("message is not modified") =>
            {
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    async fn send_prompt(&self, prompt: &InteractivePrompt) -> Result<MessageHandle, GatewayError> {
        let body = serde_json::json!({
            "chat_id": self.chat_id,
            "text": truncate_message(&prompt.render_text()),
            "reply_markup": inline_keyboard(prompt),
        });
        let sent: SentMessage = self.call("sendMessage", body).await?;
        Ok(MessageHandle::from(sent.message_id))
    }

    async fn answer_callback(
        &self,
        callback_id: &str,
        text: Option<&str>,
    ) -> Result<(), GatewayError> {
        let mut body = serde_json::json!({ "callback_query_id": callback_id });
        if let Some(text) = text {
            body["text"] = serde_json::Value::String(text.to_string());
        }
        self.call::<bool>("answerCallbackQuery", body).await.map(|_| ())
    }

    async fn set_reaction(
        &self,
        chat: &ChatId,
        handle: &MessageHandle,
        emoji: &str,
    ) -> Result<(), GatewayError> {
        let body = serde_json::json!({
            "chat_id": chat.as_str(),
            "message_id": Self::parse_message_id(handle)?,
            "reaction": [{ "type": "emoji", "emoji": emoji }],
        });
        self.call::<bool>("setMessageReaction", body).await.map(|_| ())
    }

    async fn poll_events(&self) -> Result<Vec<InboundEvent>, GatewayError> {
        let offset = self.next_offset.load(Ordering::Relaxed);
        let body = serde_json::json!({
            "offset": offset,
            "timeout": LONG_POLL_TIMEOUT_SECS,
            "allowed_updates": ["message", "callback_query"],
        });
        let updates: Vec<TelegramUpdate> = self.call("getUpdates", body).await?;
        if let Some(last) = updates.iter().map(|u| u.update_id).max() {
            self.next_offset.store(last + 1, Ordering::Relaxed);
        }
        Ok(updates
            .into_iter()
            .filter_map(into_event)
            .filter(|event| event.chat().as_str() == self.chat_id)
            .collect())
    }
}

/// One button row per choice; the callback data is the choice token.
fn inline_keyboard(prompt: &InteractivePrompt) -> serde_json::Value {
    let rows: Vec<serde_json::Value> = prompt
        .choices
        .iter()
        .map(|choice| {
            serde_json::json!([{
                "text": choice.label,
                "callback_data": choice.token,
            }])
        })
        .collect();
    serde_json::json!({ "inline_keyboard": rows })
}

fn truncate_message(text: &str) -> String {
    if text.chars().count() <= MAX_MESSAGE_CHARS {
        return text.to_string();
    }
    let keep = MAX_MESSAGE_CHARS - TRUNCATION_MARKER.chars().count();
    let mut truncated: String = text.chars().take(keep).collect();
    truncated.push_str(TRUNCATION_MARKER);
    truncated
}

// --- Bot API payloads ---

#[derive(serde::Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    error_code: Option<u16>,
    #[serde(default)]
    parameters: Option<ResponseParameters>,
}

impl<T> ApiResponse<T> {
    fn into_result(self, http_status: u16) -> Result<T, GatewayError> {
        if self.ok {
            return self.result.ok_or_else(|| GatewayError::Api {
                status: http_status,
                description: "response carried no result".to_string(),
            });
        }
        let status = self.error_code.unwrap_or(http_status);
        if let Some(retry_after) = self.parameters.and_then(|p| p.retry_after) {
            return Err(GatewayError::RateLimited {
                retry_after: Duration::from_secs(retry_after),
            });
        }
        if status == 429 {
            return Err(GatewayError::RateLimited {
                retry_after: Duration::from_secs(1),
            });
        }
        Err(GatewayError::Api {
            status,
            description: self.description.unwrap_or_default(),
        })
    }
}

#[derive(serde::Deserialize)]
struct ResponseParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}

#[derive(serde::Deserialize)]
struct SentMessage {
    message_id: i64,
}

#[derive(serde::Deserialize)]
struct TelegramUpdate {
    update_id: i64,
    #[serde(default)]
    message: Option<TelegramMessage>,
    #[serde(default)]
    callback_query: Option<CallbackQuery>,
}

#[derive(serde::Deserialize)]
struct TelegramMessage {
    message_id: i64,
    chat: TelegramChat,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    reply_to_message: Option<ReplyToMessage>,
}

#[derive(serde::Deserialize)]
struct TelegramChat {
    id: i64,
}

#[derive(serde::Deserialize)]
struct ReplyToMessage {
    message_id: i64,
}

#[derive(serde::Deserialize)]
struct CallbackQuery {
    id: String,
    #[serde(default)]
    data: Option<String>,
    #[serde(default)]
    message: Option<TelegramMessage>,
}

/// Updates without text or without a source message carry nothing we can route.
fn into_event(update: TelegramUpdate) -> Option<InboundEvent> {
    if let Some(query) = update.callback_query {
        let message = query.message?;
        return Some(InboundEvent::Callback {
            callback_id: query.id,
            chat: ChatId::from(message.chat.id),
            message: MessageHandle::from(message.message_id),
            data: query.data.unwrap_or_default(),
        });
    }
    let message = update.message?;
    let text = message.text?;
    Some(InboundEvent::Text {
        chat: ChatId::from(message.chat.id),
        message: MessageHandle::from(message.message_id),
        text,
        reply_to: message
            .reply_to_message
            .map(|r| MessageHandle::from(r.message_id)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ApprovalOption;

    fn parse_updates(raw: &str) -> Vec<InboundEvent> {
        let response: ApiResponse<Vec<TelegramUpdate>> = serde_json::from_str(raw).unwrap();
        response
            .into_result(200)
            .unwrap()
            .into_iter()
            .filter_map(into_event)
            .collect()
    }

    #[test]
    fn test_callback_query_becomes_callback_event() {
        let events = parse_updates(
            r#"{"ok":true,"result":[{"update_id":10,"callback_query":{
                "id":"cbq-1","data":"1",
                "message":{"message_id":42,"chat":{"id":555},"text":"Proceed?"}}}]}"#,
        );
        assert_eq!(
            events,
            vec![InboundEvent::Callback {
                callback_id: "cbq-1".to_string(),
                chat: ChatId::from(555),
                message: MessageHandle::from(42),
                data: "1".to_string(),
            }]
        );
    }

    #[test]
    fn test_text_message_becomes_text_event() {
        let events = parse_updates(
            r#"{"ok":true,"result":[
                {"update_id":11,"message":{"message_id":43,"chat":{"id":555},"text":"ship it",
                 "reply_to_message":{"message_id":42,"chat":{"id":555}}}},
                {"update_id":12,"message":{"message_id":44,"chat":{"id":555}}}]}"#,
        );
        assert_eq!(
            events,
            vec![InboundEvent::Text {
                chat: ChatId::from(555),
                message: MessageHandle::from(43),
                text: "ship it".to_string(),
                reply_to: Some(MessageHandle::from(42)),
            }]
        );
    }

    #[test]
    fn test_rate_limit_response_maps_retry_after() {
        let response: ApiResponse<SentMessage> = serde_json::from_str(
            r#"{"ok":false,"error_code":429,"description":"Too Many Requests: retry after 7",
                "parameters":{"retry_after":7}}"#,
        )
        .unwrap();
        assert_eq!(
            response.into_result(429).err(),
            Some(GatewayError::RateLimited {
                retry_after: Duration::from_secs(7)
            })
        );
    }

    #[test]
    fn test_api_error_keeps_description() {
        let response: ApiResponse<SentMessage> = serde_json::from_str(
            r#"{"ok":false,"error_code":400,"description":"Bad Request: chat not found"}"#,
        )
        .unwrap();
        match response.into_result(400) {
            Err(GatewayError::Api { status, description }) => {
                assert_eq!(status, 400);
                assert!(description.contains("chat not found"));
            }
            _ => panic!("expected API error"),
        }
    }

    fn decode<R: DeserializeOwned>(raw: &str) -> Result<R, GatewayError> {
        serde_json::from_str::<ApiResponse<R>>(raw).unwrap().into_result(200)
    }

    #[test]
    fn test_result_payload_needs_no_default() {
        let sent: SentMessage = decode(r#"{"ok":true,"result":{"message_id":42}}"#).unwrap();
        assert_eq!(sent.message_id, 42);

        match decode::<SentMessage>(r#"{"ok":true}"#) {
            Err(GatewayError::Api { status, description }) => {
                assert_eq!(status, 200);
                assert_eq!(description, "response carried no result");
            }
            _ => panic!("expected missing result to be an API error"),
        }
    }

    #[test]
    fn test_inline_keyboard_has_one_row_per_choice() {
        let prompt = InteractivePrompt::from_options(
            None,
            "Proceed?",
            &[ApprovalOption::new("Yes"), ApprovalOption::new("No")],
        );
        let keyboard = inline_keyboard(&prompt);
        let rows = keyboard["inline_keyboard"].as_array().unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0][0]["text"], "Yes");
        assert_eq!(rows[0][0]["callback_data"], "0");
        assert_eq!(rows[2][0]["callback_data"], "other");
    }

    #[test]
    fn test_truncate_message() {
        assert_eq!(truncate_message("short"), "short");
        let long = "x".repeat(MAX_MESSAGE_CHARS + 50);
        let truncated = truncate_message(&long);
        assert_eq!(truncated.chars().count(), MAX_MESSAGE_CHARS);
        assert!(truncated.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn test_telegram_transport_name() {
        let transport = TelegramTransport::new("token".into(), "chat".into());
        assert_eq!(transport.name(), "telegram");
        assert_eq!(transport.chat_id(), "chat");
    }

    #[test]
    fn test_rejects_non_numeric_handle() {
        let err = TelegramTransport::parse_message_id(&MessageHandle::new("abc")).unwrap_err();
        assert!(matches!(err, GatewayError::Rejected(_)));
    }
}
