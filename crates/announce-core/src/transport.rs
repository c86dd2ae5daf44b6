//! Outbound side of the chat platform.

use async_trait::async_trait;

use crate::error::TransportError;
use crate::types::{PromptRef, RecipientId};

/// A button attached to an outbound message. All buttons of a message are
/// rendered as a single row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Reports back to the bot with `data` when pressed.
    Callback { label: String, data: String },
    /// Opens an external link.
    Link { label: String, url: String },
}

/// Outbound operations the coordinator needs from the platform.
///
/// Implementations own retries and rate limiting; every call either
/// completes or fails within a bounded time.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Answer in the chat a message came from.
    async fn reply(&self, chat: i64, text: &str, actions: &[Action]) -> Result<(), TransportError>;

    /// Deliver a broadcast text to one recipient.
    async fn send_text(
        &self,
        recipient: RecipientId,
        text: &str,
        actions: &[Action],
    ) -> Result<(), TransportError>;

    /// Deliver a broadcast image to one recipient.
    async fn send_image(
        &self,
        recipient: RecipientId,
        image_ref: &str,
        caption: &str,
        actions: &[Action],
    ) -> Result<(), TransportError>;

    /// Close the loading state of a pressed button with a short notice.
    async fn acknowledge_decision(&self, callback_id: &str, text: &str) -> Result<(), TransportError>;

    /// Replace the text (and buttons) of a confirm/cancel prompt.
    async fn edit_prompt(&self, prompt: &PromptRef, text: &str) -> Result<(), TransportError>;
}
