//! Recipients, candidate messages and the inbound event model.

use serde::{Deserialize, Serialize};

/// Platform-unique numeric user id.
pub type RecipientId = i64;

/// Identifies a draft awaiting a confirm/cancel decision.
///
/// Derived from the id of the message the draft was captured from, which
/// is unique among pending drafts on a single update stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DraftHandle(pub i64);

impl std::fmt::Display for DraftHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Display fields of a sender as reported by the platform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
    pub language_code: Option<String>,
}

/// A registered user. Only authorized recipients may submit broadcasts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub id: RecipientId,
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
    pub language_code: Option<String>,
    pub authorized: bool,
}

impl Recipient {
    /// A new, unauthorized recipient built from a sender profile.
    pub fn from_profile(id: RecipientId, profile: &Profile) -> Self {
        Self {
            id,
            first_name: profile.first_name.clone(),
            last_name: profile.last_name.clone(),
            username: profile.username.clone(),
            language_code: profile.language_code.clone(),
            authorized: false,
        }
    }
}

/// The payload submitted for broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateMessage {
    Text(String),
    Image {
        /// Platform file reference of the largest available size.
        image_ref: String,
        caption: Option<String>,
    },
}

impl CandidateMessage {
    /// The text that follows the intro line: the body, or the caption
    /// (empty when an image has none).
    pub fn body(&self) -> &str {
        match self {
            CandidateMessage::Text(body) => body,
            CandidateMessage::Image { caption, .. } => caption.as_deref().unwrap_or(""),
        }
    }
}

/// Who submitted a draft, and where to talk back to them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Author {
    pub id: RecipientId,
    pub chat: i64,
}

/// Location of the confirm/cancel prompt, so it can be edited afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptRef {
    pub chat: i64,
    pub message_id: i64,
}

/// A message sent to the bot.
#[derive(Debug, Clone)]
pub struct MessageEvent {
    pub sender: RecipientId,
    /// Chat the message arrived in; replies go here.
    pub chat: i64,
    pub profile: Profile,
    /// `None` when the content is anything but text or a single image.
    pub body: Option<CandidateMessage>,
    /// The platform id of the message itself.
    pub source_id: i64,
}

/// A press of the confirm or cancel button on a prompt.
#[derive(Debug, Clone)]
pub struct DecisionEvent {
    /// Platform id of the button press, used to acknowledge it.
    pub callback_id: String,
    pub handle: DraftHandle,
    pub prompt: Option<PromptRef>,
    pub sender: RecipientId,
}

/// Everything the coordinator reacts to.
#[derive(Debug, Clone)]
pub enum InboundEvent {
    Message(MessageEvent),
    Confirm(DecisionEvent),
    Cancel(DecisionEvent),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_without_caption_has_empty_body() {
        let msg = CandidateMessage::Image {
            image_ref: "file-1".to_string(),
            caption: None,
        };
        assert_eq!(msg.body(), "");
    }

    #[test]
    fn recipient_from_profile_starts_unauthorized() {
        let profile = Profile {
            first_name: "Anna".to_string(),
            username: Some("anna".to_string()),
            ..Profile::default()
        };
        let r = Recipient::from_profile(42, &profile);
        assert_eq!(r.id, 42);
        assert_eq!(r.first_name, "Anna");
        assert!(!r.authorized);
    }
}
