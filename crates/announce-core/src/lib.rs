//! # announce-core
//!
//! Core of the Announce broadcast bot:
//! - Recipient, candidate message and inbound event types
//! - The `send_<id>` / `cancel_<id>` action payload encoding
//! - The in-memory registry of drafts awaiting confirmation
//! - The coordinator state machine that drives the fan-out
//!
//! This crate has no network code and no storage code. The platform
//! binding and the recipient store plug in through the [`Transport`] and
//! [`UserDirectory`] traits.

pub mod action;
pub mod compose;
pub mod coordinator;
pub mod directory;
pub mod error;
pub mod registry;
pub mod transport;
pub mod types;

pub use coordinator::{Audience, BroadcastSettings, Coordinator, FanoutReport, Outcome};
pub use directory::{InMemoryDirectory, UserDirectory};
pub use error::{DirectoryError, Error, Result, TransportError};
pub use registry::{PendingDraft, PendingRegistry};
pub use transport::{Action, Transport};
pub use types::{
    Author, CandidateMessage, DecisionEvent, DraftHandle, InboundEvent, MessageEvent, Profile,
    PromptRef, Recipient, RecipientId,
};
