//! Button payload encoding.
//!
//! The confirm/cancel prompt carries two callback buttons whose data is
//! `send_<handle>` and `cancel_<handle>`, `<handle>` being the decimal
//! draft handle. Buttons already delivered to clients replay exactly these
//! strings, so the format must not change.

use std::sync::LazyLock;

use regex::Regex;

use crate::types::{DecisionEvent, DraftHandle, InboundEvent, PromptRef, RecipientId};

static SEND_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^send_(\d+)$").expect("valid send pattern"));

static CANCEL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^cancel_(\d+)$").expect("valid cancel pattern"));

/// What the author decided about a draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Send,
    Cancel,
}

/// Decoded callback data of a prompt button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionPayload {
    pub decision: Decision,
    pub handle: DraftHandle,
}

impl ActionPayload {
    pub fn send(handle: DraftHandle) -> Self {
        Self { decision: Decision::Send, handle }
    }

    pub fn cancel(handle: DraftHandle) -> Self {
        Self { decision: Decision::Cancel, handle }
    }

    /// Encode as callback data.
    pub fn encode(&self) -> String {
        match self.decision {
            Decision::Send => format!("send_{}", self.handle),
            Decision::Cancel => format!("cancel_{}", self.handle),
        }
    }

    /// Decode callback data. Returns `None` for anything that is not an
    /// exact `send_<digits>` / `cancel_<digits>` string.
    pub fn parse(data: &str) -> Option<Self> {
        let (decision, caps) = if let Some(caps) = SEND_PATTERN.captures(data) {
            (Decision::Send, caps)
        } else {
            (Decision::Cancel, CANCEL_PATTERN.captures(data)?)
        };
        // Digits that overflow i64 cannot name a real message.
        let id = caps[1].parse::<i64>().ok()?;
        Some(Self { decision, handle: DraftHandle(id) })
    }

    /// Turn a button press into the matching coordinator event.
    pub fn into_event(
        self,
        callback_id: String,
        prompt: Option<PromptRef>,
        sender: RecipientId,
    ) -> InboundEvent {
        let event = DecisionEvent {
            callback_id,
            handle: self.handle,
            prompt,
            sender,
        };
        match self.decision {
            Decision::Send => InboundEvent::Confirm(event),
            Decision::Cancel => InboundEvent::Cancel(event),
        }
    }
}
