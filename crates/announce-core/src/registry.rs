//! Drafts awaiting a confirm/cancel decision.
//!
//! A handle is present exactly while a decision is outstanding for it.
//! [`PendingRegistry::resolve`] removes and returns an entry under one lock
//! acquisition, so however many decisions race for a handle, only one of
//! them ever gets the draft.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::{Error, Result};
use crate::types::{Author, CandidateMessage, DraftHandle};

/// A captured message and who submitted it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDraft {
    pub message: CandidateMessage,
    pub author: Author,
}

/// In-memory table of pending drafts. Lost on restart.
#[derive(Debug, Default)]
pub struct PendingRegistry {
    drafts: Mutex<HashMap<DraftHandle, PendingDraft>>,
}

impl PendingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a draft. A pending draft is never overwritten.
    pub fn register(&self, handle: DraftHandle, draft: PendingDraft) -> Result<()> {
        let mut drafts = self.lock();
        if drafts.contains_key(&handle) {
            return Err(Error::DuplicateHandle(handle));
        }
        drafts.insert(handle, draft);
        Ok(())
    }

    /// Atomically remove and return a draft. `None` if it was never
    /// registered or has already been resolved.
    pub fn resolve(&self, handle: DraftHandle) -> Option<PendingDraft> {
        self.lock().remove(&handle)
    }

    pub fn contains(&self, handle: DraftHandle) -> bool {
        self.lock().contains_key(&handle)
    }

    /// Number of outstanding drafts.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<DraftHandle, PendingDraft>> {
        // The map is never left half-updated, so a poisoned lock is still usable.
        self.drafts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
