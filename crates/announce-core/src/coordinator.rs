//! The broadcast confirmation state machine.
//!
//! Per draft handle: NONE -> PENDING -> SENT | CANCELLED.
//!
//! 1. A message from an unauthorized sender registers them (unauthorized)
//!    and gets a refusal. No draft is created.
//! 2. A text or single-image message from an authorized sender becomes a
//!    pending draft, and the sender gets a prompt with "send" and "cancel"
//!    buttons.
//! 3. "Send" resolves the draft and fans it out to the audience as read at
//!    that moment. Failed deliveries are counted and logged; they never stop
//!    the remaining sends.
//! 4. "Cancel" resolves the draft and drops it.
//!
//! A decision for a handle that is unknown or already resolved is answered
//! with a notice, not treated as an error.

use std::str::FromStr;
use std::sync::Arc;

use futures::{StreamExt, stream};
use tracing::{error, info, warn};

use crate::action::ActionPayload;
use crate::compose::{IntroTemplate, compose};
use crate::directory::UserDirectory;
use crate::error::{Error, Result, TransportError};
use crate::registry::{PendingDraft, PendingRegistry};
use crate::transport::{Action, Transport};
use crate::types::{
    Author, CandidateMessage, DecisionEvent, DraftHandle, InboundEvent, MessageEvent, Recipient,
    RecipientId,
};

pub const NOT_AUTHORIZED_TEXT: &str = "Sorry, you are not authorized to send messages.";
pub const UNSUPPORTED_TEXT: &str =
    "Currently, I can only process text messages or messages with a single image.";
pub const CONFIRM_PROMPT_TEXT: &str = "Do you want to send this message to everyone?";
pub const CONFIRM_LABEL: &str = "Yes, send";
pub const CANCEL_LABEL: &str = "No, cancel";
pub const SENT_ACK_TEXT: &str = "Message sent to all users.";
pub const SENT_PROMPT_TEXT: &str = "Message has been sent to all users.";
pub const CANCELLED_ACK_TEXT: &str = "Sending cancelled.";
pub const CANCELLED_PROMPT_TEXT: &str = "Sending has been cancelled.";
pub const NOT_AVAILABLE_TEXT: &str = "This message is no longer available.";

/// Default number of recipients sent to at the same time.
pub const DEFAULT_FANOUT_CONCURRENCY: usize = 8;

/// Who receives a confirmed broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Audience {
    /// Recipients whose authorization flag is set.
    #[default]
    Authorized,
    /// Every registered recipient.
    All,
}

impl FromStr for Audience {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "authorized" => Ok(Audience::Authorized),
            "all" => Ok(Audience::All),
            other => Err(format!("unknown audience '{other}' (expected 'authorized' or 'all')")),
        }
    }
}

/// What every broadcast looks like and who gets it.
#[derive(Debug, Clone)]
pub struct BroadcastSettings {
    pub intro: IntroTemplate,
    /// External link buttons attached to every broadcast.
    pub links: Vec<Action>,
    pub audience: Audience,
    /// Upper bound on concurrent sends during a fan-out.
    pub fanout_concurrency: usize,
}

impl BroadcastSettings {
    pub fn new(intro: IntroTemplate, links: Vec<Action>) -> Self {
        Self {
            intro,
            links,
            audience: Audience::default(),
            fanout_concurrency: DEFAULT_FANOUT_CONCURRENCY,
        }
    }
}

/// Result of one fan-out.
#[derive(Debug, Default)]
pub struct FanoutReport {
    pub delivered: usize,
    pub failed: Vec<(RecipientId, TransportError)>,
}

impl FanoutReport {
    pub fn attempted(&self) -> usize {
        self.delivered + self.failed.len()
    }
}

/// How an event was resolved.
#[derive(Debug)]
pub enum Outcome {
    /// Sender is not authorized; they were registered and told so.
    NotAuthorized,
    /// Neither text nor a single image.
    Unsupported,
    /// A draft is now waiting for its author's decision.
    Pending(DraftHandle),
    Sent(FanoutReport),
    Cancelled,
    /// The decision named a draft that is not pending.
    HandleNotFound,
}

/// Drives drafts from submission to fan-out.
pub struct Coordinator {
    directory: Arc<dyn UserDirectory>,
    transport: Arc<dyn Transport>,
    registry: Arc<PendingRegistry>,
    settings: BroadcastSettings,
}

impl Coordinator {
    pub fn new(
        directory: Arc<dyn UserDirectory>,
        transport: Arc<dyn Transport>,
        registry: Arc<PendingRegistry>,
        settings: BroadcastSettings,
    ) -> Self {
        Self { directory, transport, registry, settings }
    }

    pub fn registry(&self) -> &Arc<PendingRegistry> {
        &self.registry
    }

    /// Apply one inbound event.
    ///
    /// Errors are limited to directory failures, failed replies, and
    /// duplicate draft handles; the registry is consistent afterwards.
    pub async fn handle(&self, event: InboundEvent) -> Result<Outcome> {
        match event {
            InboundEvent::Message(msg) => self.on_message(msg).await,
            InboundEvent::Confirm(decision) => self.on_confirm(decision).await,
            InboundEvent::Cancel(decision) => self.on_cancel(decision).await,
        }
    }

    async fn on_message(&self, msg: MessageEvent) -> Result<Outcome> {
        if !self.directory.is_authorized(msg.sender).await? {
            // Register before replying so a failed reply does not lose the contact.
            if self.directory.register_if_absent(msg.sender, &msg.profile).await? {
                info!("Registered new user {} ({})", msg.sender, msg.profile.first_name);
            }
            self.transport.reply(msg.chat, NOT_AUTHORIZED_TEXT, &[]).await?;
            return Ok(Outcome::NotAuthorized);
        }

        let Some(message) = msg.body else {
            self.transport.reply(msg.chat, UNSUPPORTED_TEXT, &[]).await?;
            return Ok(Outcome::Unsupported);
        };

        let handle = DraftHandle(msg.source_id);
        let draft = PendingDraft {
            message,
            author: Author { id: msg.sender, chat: msg.chat },
        };
        if let Err(e) = self.registry.register(handle, draft) {
            error!("Refusing draft from {}: {e}", msg.sender);
            return Err(e);
        }

        let actions = [
            Action::Callback {
                label: CONFIRM_LABEL.to_string(),
                data: ActionPayload::send(handle).encode(),
            },
            Action::Callback {
                label: CANCEL_LABEL.to_string(),
                data: ActionPayload::cancel(handle).encode(),
            },
        ];
        if let Err(e) = self.transport.reply(msg.chat, CONFIRM_PROMPT_TEXT, &actions).await {
            // Nobody can ever press buttons that were not delivered.
            self.registry.resolve(handle);
            return Err(e.into());
        }

        info!("Draft {handle} from {} awaiting confirmation", msg.sender);
        Ok(Outcome::Pending(handle))
    }

    async fn on_confirm(&self, decision: DecisionEvent) -> Result<Outcome> {
        // Stale decisions never touch the directory.
        if !self.registry.contains(decision.handle) {
            self.acknowledge(&decision, NOT_AVAILABLE_TEXT).await?;
            return Ok(Outcome::HandleNotFound);
        }

        // Read the audience before taking the draft, so a directory failure
        // leaves the draft pending.
        let recipients = match self.settings.audience {
            Audience::Authorized => self.directory.list_authorized_recipients().await?,
            Audience::All => self.directory.list_recipients().await?,
        };

        let Some(draft) = self.registry.resolve(decision.handle) else {
            self.acknowledge(&decision, NOT_AVAILABLE_TEXT).await?;
            return Ok(Outcome::HandleNotFound);
        };

        let report = self.fan_out(&draft.message, recipients).await;
        info!(
            "Draft {} sent: {} delivered, {} failed",
            decision.handle,
            report.delivered,
            report.failed.len()
        );

        // The draft is already gone; a failed acknowledgement cannot change that.
        if let Err(e) = self.transport.acknowledge_decision(&decision.callback_id, SENT_ACK_TEXT).await {
            warn!("Failed to acknowledge send of draft {}: {e}", decision.handle);
        }
        self.edit_prompt(&decision, SENT_PROMPT_TEXT).await;

        Ok(Outcome::Sent(report))
    }

    async fn on_cancel(&self, decision: DecisionEvent) -> Result<Outcome> {
        if self.registry.resolve(decision.handle).is_some() {
            info!("Draft {} cancelled", decision.handle);
        }
        self.acknowledge(&decision, CANCELLED_ACK_TEXT).await?;
        self.edit_prompt(&decision, CANCELLED_PROMPT_TEXT).await;
        Ok(Outcome::Cancelled)
    }

    /// Send the draft to every recipient, at most `fanout_concurrency` at a time.
    async fn fan_out(&self, message: &CandidateMessage, recipients: Vec<Recipient>) -> FanoutReport {
        let transport = self.transport.as_ref();
        let intro = &self.settings.intro;
        let links = self.settings.links.as_slice();

        let results: Vec<(RecipientId, std::result::Result<(), TransportError>)> =
            stream::iter(recipients)
                .map(move |recipient| async move {
                    let text = compose(intro, &recipient, message);
                    let sent = match message {
                        CandidateMessage::Text(_) => {
                            transport.send_text(recipient.id, &text, links).await
                        }
                        CandidateMessage::Image { image_ref, .. } => {
                            transport.send_image(recipient.id, image_ref, &text, links).await
                        }
                    };
                    (recipient.id, sent)
                })
                .buffer_unordered(self.settings.fanout_concurrency.max(1))
                .collect()
                .await;

        let mut report = FanoutReport::default();
        for (id, sent) in results {
            match sent {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!("Broadcast to {id} failed: {e}");
                    report.failed.push((id, e));
                }
            }
        }
        report
    }

    async fn acknowledge(&self, decision: &DecisionEvent, text: &str) -> Result<()> {
        self.transport
            .acknowledge_decision(&decision.callback_id, text)
            .await
            .map_err(Error::from)
    }

    async fn edit_prompt(&self, decision: &DecisionEvent, text: &str) {
        let Some(prompt) = decision.prompt else { return };
        if let Err(e) = self.transport.edit_prompt(&prompt, text).await {
            warn!("Failed to update prompt for draft {}: {e}", decision.handle);
        }
    }
}
