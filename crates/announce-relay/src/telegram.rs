//! Telegram Bot API client and update mapping.
//!
//! Only the handful of methods the bot needs are bound: `getMe`,
//! `getUpdates` (long polling), `sendMessage`, `sendPhoto`,
//! `answerCallbackQuery` and `editMessageText`.

use std::time::Duration;

use announce_core::action::ActionPayload;
use announce_core::{
    Action, CandidateMessage, InboundEvent, MessageEvent, Profile, PromptRef, RecipientId,
    Transport, TransportError,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde_json::{Value, json};
use tracing::warn;
use url::Url;

/// Attempts per call when the API answers 429.
const MAX_ATTEMPTS: u32 = 3;

/// Longest `retry_after` we are willing to sleep through inside one call.
const MAX_RETRY_AFTER_SECS: u64 = 60;

/// Slack on top of the long-poll timeout before the HTTP request gives up.
const HTTP_TIMEOUT_SLACK_SECS: u64 = 15;

/// Envelope of every Bot API response.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<i64>,
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    retry_after: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub from: Option<User>,
    pub chat: Chat,
    pub text: Option<String>,
    pub photo: Option<Vec<PhotoSize>>,
    pub caption: Option<String>,
    /// Set on every message of an album.
    pub media_group_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
    pub language_code: Option<String>,
}

impl User {
    fn profile(&self) -> Profile {
        Profile {
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            username: self.username.clone(),
            language_code: self.language_code.clone(),
        }
    }
}

/// One resolution of a photo; Telegram lists them smallest first.
#[derive(Debug, Clone, Deserialize)]
pub struct PhotoSize {
    pub file_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    /// The message carrying the pressed button. Only its location is needed,
    /// which is present even when the message is no longer accessible.
    pub message: Option<PromptMessage>,
    pub data: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PromptMessage {
    pub message_id: i64,
    pub chat: Chat,
}

/// What to do with one update.
#[derive(Debug)]
pub enum Routed {
    Event(InboundEvent),
    /// A button press whose data is not one of ours; it still has to be
    /// answered so the client stops spinning.
    UnknownCallback(String),
    Ignored,
}

/// Map a raw update onto the coordinator's event model.
pub fn route(update: Update) -> Routed {
    if let Some(msg) = update.message {
        let Some(from) = msg.from.as_ref() else {
            return Routed::Ignored;
        };
        if from.is_bot {
            return Routed::Ignored;
        }
        return Routed::Event(InboundEvent::Message(MessageEvent {
            sender: from.id,
            chat: msg.chat.id,
            profile: from.profile(),
            body: message_body(&msg),
            source_id: msg.message_id,
        }));
    }

    if let Some(query) = update.callback_query {
        let prompt = query.message.as_ref().map(|m| PromptRef {
            chat: m.chat.id,
            message_id: m.message_id,
        });
        return match query.data.as_deref().and_then(ActionPayload::parse) {
            Some(payload) => Routed::Event(payload.into_event(query.id, prompt, query.from.id)),
            None => Routed::UnknownCallback(query.id),
        };
    }

    Routed::Ignored
}

/// Text, or a single photo outside an album. Anything else is unsupported.
fn message_body(msg: &Message) -> Option<CandidateMessage> {
    if let Some(text) = &msg.text {
        return Some(CandidateMessage::Text(text.clone()));
    }
    if msg.media_group_id.is_some() {
        return None;
    }
    let largest = msg.photo.as_ref()?.last()?;
    Some(CandidateMessage::Image {
        image_ref: largest.file_id.clone(),
        caption: msg.caption.clone(),
    })
}

/// Render a single row of buttons as an inline keyboard.
fn inline_keyboard(actions: &[Action]) -> Value {
    let row: Vec<Value> = actions
        .iter()
        .map(|action| match action {
            Action::Callback { label, data } => json!({ "text": label, "callback_data": data }),
            Action::Link { label, url } => json!({ "text": label, "url": url }),
        })
        .collect();
    json!({ "inline_keyboard": [row] })
}

/// Bot identity returned by `getMe`.
#[derive(Debug, Clone, Deserialize)]
pub struct BotInfo {
    pub id: i64,
    pub username: Option<String>,
}

/// HTTP client bound to one bot token.
pub struct TelegramClient {
    http: reqwest::Client,
    base: String,
    parse_mode: Option<String>,
}

impl TelegramClient {
    pub fn new(
        api_url: &Url,
        token: &str,
        parse_mode: Option<String>,
        poll_timeout_secs: u64,
    ) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(poll_timeout_secs + HTTP_TIMEOUT_SLACK_SECS))
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;
        let base = format!("{}/bot{token}", api_url.as_str().trim_end_matches('/'));
        Ok(Self { http, base, parse_mode })
    }

    pub async fn get_me(&self) -> Result<BotInfo, TransportError> {
        self.call("getMe", &json!({})).await
    }

    /// Long-poll for updates after `offset`.
    pub async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>, TransportError> {
        self.call(
            "getUpdates",
            &json!({
                "offset": offset,
                "timeout": timeout_secs,
                "allowed_updates": ["message", "callback_query"],
            }),
        )
        .await
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: &Value) -> Result<T, TransportError> {
        let url = format!("{}/{method}", self.base);
        let mut attempt = 1;
        loop {
            let resp = self
                .http
                .post(&url)
                .json(body)
                .send()
                .await
                // The URL carries the bot token; keep it out of errors and logs.
                .map_err(|e| TransportError::Network(e.without_url().to_string()))?;

            let parsed: ApiResponse<T> = resp
                .json()
                .await
                .map_err(|e| TransportError::Malformed(e.without_url().to_string()))?;

            if parsed.ok {
                return parsed
                    .result
                    .ok_or_else(|| TransportError::Malformed(format!("{method}: missing result")));
            }

            let code = parsed.error_code.unwrap_or_default();
            let description = parsed.description.unwrap_or_default();
            let retry_after = parsed.parameters.and_then(|p| p.retry_after);

            match retry_after {
                Some(secs) if code == 429 && attempt < MAX_ATTEMPTS && secs <= MAX_RETRY_AFTER_SECS => {
                    warn!("{method} rate limited, retrying in {secs}s (attempt {attempt})");
                    tokio::time::sleep(Duration::from_secs(secs)).await;
                    attempt += 1;
                }
                Some(secs) if code == 429 => return Err(TransportError::RateLimited { retry_after: secs }),
                _ => return Err(TransportError::Api { code, description }),
            }
        }
    }
}

#[async_trait]
impl Transport for TelegramClient {
    async fn reply(&self, chat: i64, text: &str, actions: &[Action]) -> Result<(), TransportError> {
        let mut body = json!({ "chat_id": chat, "text": text });
        if !actions.is_empty() {
            body["reply_markup"] = inline_keyboard(actions);
        }
        self.call::<IgnoredAny>("sendMessage", &body).await.map(|_| ())
    }

    async fn send_text(
        &self,
        recipient: RecipientId,
        text: &str,
        actions: &[Action],
    ) -> Result<(), TransportError> {
        let mut body = json!({
            "chat_id": recipient,
            "text": text,
            "reply_markup": inline_keyboard(actions),
        });
        if let Some(mode) = &self.parse_mode {
            body["parse_mode"] = json!(mode);
        }
        self.call::<IgnoredAny>("sendMessage", &body).await.map(|_| ())
    }

    async fn send_image(
        &self,
        recipient: RecipientId,
        image_ref: &str,
        caption: &str,
        actions: &[Action],
    ) -> Result<(), TransportError> {
        let mut body = json!({
            "chat_id": recipient,
            "photo": image_ref,
            "caption": caption,
            "reply_markup": inline_keyboard(actions),
        });
        if let Some(mode) = &self.parse_mode {
            body["parse_mode"] = json!(mode);
        }
        self.call::<IgnoredAny>("sendPhoto", &body).await.map(|_| ())
    }

    async fn acknowledge_decision(&self, callback_id: &str, text: &str) -> Result<(), TransportError> {
        let body = json!({ "callback_query_id": callback_id, "text": text });
        self.call::<IgnoredAny>("answerCallbackQuery", &body).await.map(|_| ())
    }

    async fn edit_prompt(&self, prompt: &PromptRef, text: &str) -> Result<(), TransportError> {
        // Without reply_markup the buttons are removed along with the old text.
        let body = json!({
            "chat_id": prompt.chat,
            "message_id": prompt.message_id,
            "text": text,
        });
        self.call::<IgnoredAny>("editMessageText", &body).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use announce_core::DraftHandle;

    fn update(value: Value) -> Update {
        serde_json::from_value(value).unwrap()
    }

    fn sender() -> Value {
        json!({ "id": 42, "is_bot": false, "first_name": "Anna", "username": "anna", "language_code": "ru" })
    }

    #[test]
    fn text_message_becomes_text_draft() {
        let routed = route(update(json!({
            "update_id": 1,
            "message": { "message_id": 77, "from": sender(), "chat": { "id": 42 }, "date": 0, "text": "Hello" }
        })));
        let Routed::Event(InboundEvent::Message(msg)) = routed else { panic!("expected message") };
        assert_eq!(msg.sender, 42);
        assert_eq!(msg.chat, 42);
        assert_eq!(msg.source_id, 77);
        assert_eq!(msg.profile.username.as_deref(), Some("anna"));
        assert_eq!(msg.body, Some(CandidateMessage::Text("Hello".to_string())));
    }

    #[test]
    fn photo_uses_largest_size() {
        let routed = route(update(json!({
            "update_id": 2,
            "message": {
                "message_id": 78, "from": sender(), "chat": { "id": 42 }, "date": 0,
                "photo": [
                    { "file_id": "small", "file_unique_id": "s", "width": 90, "height": 90 },
                    { "file_id": "large", "file_unique_id": "l", "width": 1280, "height": 1280 }
                ],
                "caption": "Look"
            }
        })));
        let Routed::Event(InboundEvent::Message(msg)) = routed else { panic!("expected message") };
        assert_eq!(
            msg.body,
            Some(CandidateMessage::Image { image_ref: "large".to_string(), caption: Some("Look".to_string()) })
        );
    }

    #[test]
    fn albums_and_documents_are_unsupported() {
        let album = route(update(json!({
            "update_id": 3,
            "message": {
                "message_id": 79, "from": sender(), "chat": { "id": 42 }, "date": 0,
                "media_group_id": "g1",
                "photo": [{ "file_id": "a", "width": 1, "height": 1 }]
            }
        })));
        let document = route(update(json!({
            "update_id": 4,
            "message": {
                "message_id": 80, "from": sender(), "chat": { "id": 42 }, "date": 0,
                "document": { "file_id": "doc" }
            }
        })));
        for routed in [album, document] {
            let Routed::Event(InboundEvent::Message(msg)) = routed else { panic!("expected message") };
            assert_eq!(msg.body, None);
        }
    }

    #[test]
    fn callback_becomes_decision() {
        let routed = route(update(json!({
            "update_id": 5,
            "callback_query": {
                "id": "cb1", "from": sender(), "chat_instance": "x", "data": "send_77",
                "message": { "message_id": 90, "chat": { "id": 42 }, "date": 0 }
            }
        })));
        let Routed::Event(InboundEvent::Confirm(decision)) = routed else { panic!("expected confirm") };
        assert_eq!(decision.handle, DraftHandle(77));
        assert_eq!(decision.callback_id, "cb1");
        assert_eq!(decision.prompt, Some(PromptRef { chat: 42, message_id: 90 }));
    }

    #[test]
    fn foreign_callback_data_is_answered_but_not_routed() {
        let routed = route(update(json!({
            "update_id": 6,
            "callback_query": { "id": "cb2", "from": sender(), "chat_instance": "x", "data": "like_1" }
        })));
        assert!(matches!(routed, Routed::UnknownCallback(id) if id == "cb2"));
    }

    #[test]
    fn bot_and_anonymous_messages_are_ignored() {
        let from_bot = route(update(json!({
            "update_id": 7,
            "message": {
                "message_id": 1, "chat": { "id": 1 }, "date": 0, "text": "hi",
                "from": { "id": 1, "is_bot": true, "first_name": "Bot" }
            }
        })));
        let anonymous = route(update(json!({
            "update_id": 8,
            "message": { "message_id": 2, "chat": { "id": -100 }, "date": 0, "text": "hi" }
        })));
        assert!(matches!(from_bot, Routed::Ignored));
        assert!(matches!(anonymous, Routed::Ignored));
    }

    #[test]
    fn keyboard_is_one_row() {
        let kb = inline_keyboard(&[
            Action::Callback { label: "Yes, send".to_string(), data: "send_1".to_string() },
            Action::Link { label: "Channel".to_string(), url: "https://t.me/x".to_string() },
        ]);
        assert_eq!(
            kb,
            json!({ "inline_keyboard": [[
                { "text": "Yes, send", "callback_data": "send_1" },
                { "text": "Channel", "url": "https://t.me/x" }
            ]] })
        );
    }

    #[test]
    fn error_envelope_parses() {
        let parsed: ApiResponse<IgnoredAny> = serde_json::from_value(json!({
            "ok": false,
            "error_code": 429,
            "description": "Too Many Requests: retry after 3",
            "parameters": { "retry_after": 3 }
        }))
        .unwrap();
        assert!(!parsed.ok);
        assert_eq!(parsed.error_code, Some(429));
        assert_eq!(parsed.parameters.and_then(|p| p.retry_after), Some(3));
    }
}
