//! The recipient store seam.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::error::DirectoryError;
use crate::types::{Profile, Recipient, RecipientId};

/// Authoritative store of known recipients and their authorization flag.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Whether the user may submit broadcasts. Unknown users are not.
    async fn is_authorized(&self, id: RecipientId) -> Result<bool, DirectoryError>;

    /// Insert an unauthorized record unless one exists. Existing records are
    /// never overwritten. Returns whether a record was created.
    async fn register_if_absent(&self, id: RecipientId, profile: &Profile)
    -> Result<bool, DirectoryError>;

    /// Every known recipient, authorized or not.
    async fn list_recipients(&self) -> Result<Vec<Recipient>, DirectoryError>;

    /// Authorized recipients as of this call. No ordering guarantee.
    async fn list_authorized_recipients(&self) -> Result<Vec<Recipient>, DirectoryError>;

    /// Set the authorization flag. Returns the number of records changed,
    /// zero when the id is unknown.
    async fn set_authorized(&self, id: RecipientId, authorized: bool)
    -> Result<usize, DirectoryError>;

    async fn get(&self, id: RecipientId) -> Result<Option<Recipient>, DirectoryError>;
}

/// Volatile directory kept in process memory.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    recipients: Mutex<BTreeMap<RecipientId, Recipient>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a record as-is.
    pub fn insert(&self, recipient: Recipient) {
        self.lock().insert(recipient.id, recipient);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<RecipientId, Recipient>> {
        self.recipients.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl UserDirectory for InMemoryDirectory {
    async fn is_authorized(&self, id: RecipientId) -> Result<bool, DirectoryError> {
        Ok(self.lock().get(&id).is_some_and(|r| r.authorized))
    }

    async fn register_if_absent(
        &self,
        id: RecipientId,
        profile: &Profile,
    ) -> Result<bool, DirectoryError> {
        let mut recipients = self.lock();
        if recipients.contains_key(&id) {
            return Ok(false);
        }
        recipients.insert(id, Recipient::from_profile(id, profile));
        Ok(true)
    }

    async fn list_recipients(&self) -> Result<Vec<Recipient>, DirectoryError> {
        Ok(self.lock().values().cloned().collect())
    }

    async fn list_authorized_recipients(&self) -> Result<Vec<Recipient>, DirectoryError> {
        Ok(self.lock().values().filter(|r| r.authorized).cloned().collect())
    }

    async fn set_authorized(
        &self,
        id: RecipientId,
        authorized: bool,
    ) -> Result<usize, DirectoryError> {
        match self.lock().get_mut(&id) {
            Some(r) => {
                r.authorized = authorized;
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn get(&self, id: RecipientId) -> Result<Option<Recipient>, DirectoryError> {
        Ok(self.lock().get(&id).cloned())
    }
}
