//! Persistence seam for ingested emails.
//!
//! The library only needs to hand a finished [`EmailRecord`] over and read
//! it back by id. [`MemoryStore`] is the in-process implementation used by
//! the CLI and tests.

pub mod memory;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::email::EmailRecord;

pub use memory::MemoryStore;

/// Identity of a stored email.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EmailId(pub u64);

/// Identity of a stored sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SenderId(pub u64);

/// Identity of a stored inbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InboxId(pub u64);

impl fmt::Display for EmailId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A record together with the identities assigned on insert.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEmail {
    pub id: EmailId,
    pub sender_id: SenderId,
    pub inbox_id: InboxId,
    pub record: EmailRecord,
}

/// Storage for ingested emails.
pub trait EmailStore {
    /// Store a record, creating its sender and inbox when unknown.
    ///
    /// A deduplicating store returns the id of the copy already stored when
    /// a message with the same fingerprint is delivered again.
    fn insert(&mut self, record: EmailRecord) -> Result<EmailId>;

    fn get(&self, id: EmailId) -> Result<&StoredEmail>;

    /// Retrieve for display, stamping `read_at` with `now` the first time.
    fn open_at(&mut self, id: EmailId, now: DateTime<Utc>) -> Result<&StoredEmail>;

    fn set_favorite(&mut self, id: EmailId, favorite: bool) -> Result<()>;

    /// [`EmailStore::open_at`] with the current time.
    fn open(&mut self, id: EmailId) -> Result<&StoredEmail> {
        self.open_at(id, Utc::now())
    }
}
