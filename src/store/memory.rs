//! In-memory [`EmailStore`].

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::{EmailId, EmailStore, InboxId, SenderId, StoredEmail};
use crate::error::{PostboxError, Result};
use crate::model::email::{EmailRecord, Inbox, Sender};

/// Every delivery is stored as its own email unless the store was built
/// with [`MemoryStore::deduplicating`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    emails: BTreeMap<EmailId, StoredEmail>,
    senders: HashMap<String, (SenderId, Sender)>,
    inboxes: HashMap<String, (InboxId, Inbox)>,
    /// Fingerprint to id, present only when deduplicating.
    fingerprints: Option<HashMap<String, EmailId>>,
    next_id: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that collapses re-deliveries of byte-identical messages.
    pub fn deduplicating() -> Self {
        Self {
            fingerprints: Some(HashMap::new()),
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.emails.len()
    }

    pub fn is_empty(&self) -> bool {
        self.emails.is_empty()
    }

    pub fn sender_count(&self) -> usize {
        self.senders.len()
    }

    pub fn inbox_count(&self) -> usize {
        self.inboxes.len()
    }

    /// Stored emails in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &StoredEmail> {
        self.emails.values()
    }

    fn allocate(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn sender_id(&mut self, sender: &Sender) -> SenderId {
        let key = sender.key();
        if let Some((id, _)) = self.senders.get(&key) {
            return *id;
        }
        let id = SenderId(self.allocate());
        debug!(email = %sender.email, "Creating sender");
        self.senders.insert(key, (id, sender.clone()));
        id
    }

    fn inbox_id(&mut self, inbox: &Inbox) -> InboxId {
        let key = inbox.key();
        if let Some((id, _)) = self.inboxes.get(&key) {
            return *id;
        }
        let id = InboxId(self.allocate());
        debug!(email = %inbox.email, "Creating inbox");
        self.inboxes.insert(key, (id, inbox.clone()));
        id
    }

    fn get_mut(&mut self, id: EmailId) -> Result<&mut StoredEmail> {
        self.emails
            .get_mut(&id)
            .ok_or(PostboxError::EmailNotFound(id))
    }
}

impl EmailStore for MemoryStore {
    fn insert(&mut self, record: EmailRecord) -> Result<EmailId> {
        let fingerprint = match &self.fingerprints {
            Some(seen) => {
                let fingerprint = record.fingerprint();
                if let Some(id) = seen.get(&fingerprint) {
                    debug!(%id, "Message already stored");
                    return Ok(*id);
                }
                Some(fingerprint)
            }
            None => None,
        };

        let sender_id = self.sender_id(&record.sender);
        let inbox_id = self.inbox_id(&record.inbox);
        let id = EmailId(self.allocate());
        info!(
            %id,
            subject = %record.subject,
            attachments = record.attachments.len(),
            "Stored email"
        );

        if let (Some(seen), Some(fingerprint)) = (self.fingerprints.as_mut(), fingerprint) {
            seen.insert(fingerprint, id);
        }
        self.emails.insert(
            id,
            StoredEmail {
                id,
                sender_id,
                inbox_id,
                record,
            },
        );
        Ok(id)
    }

    fn get(&self, id: EmailId) -> Result<&StoredEmail> {
        self.emails.get(&id).ok_or(PostboxError::EmailNotFound(id))
    }

    fn open_at(&mut self, id: EmailId, now: DateTime<Utc>) -> Result<&StoredEmail> {
        let stored = self.get_mut(id)?;
        if stored.record.read_at.is_none() {
            stored.record.read_at = Some(now);
        }
        Ok(&*stored)
    }

    fn set_favorite(&mut self, id: EmailId, favorite: bool) -> Result<()> {
        self.get_mut(id)?.record.favorite = favorite;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ingest_with;
    use crate::parser::MimeDecoder;
    use chrono::TimeZone;

    fn record(raw: &str) -> EmailRecord {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        ingest_with(&MimeDecoder::default(), raw.as_bytes(), now).unwrap()
    }

    #[test]
    fn test_insert_and_get() {
        let mut store = MemoryStore::new();
        let id = store
            .insert(record("From: a@example.com\nTo: box@example.com\nSubject: one\n\nbody"))
            .unwrap();
        let stored = store.get(id).unwrap();
        assert_eq!(stored.id, id);
        assert_eq!(stored.record.subject, "one");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_sender_and_inbox_reused_case_insensitively() {
        let mut store = MemoryStore::new();
        let a = store
            .insert(record("From: Alice@Example.com\nTo: Box@example.com\nSubject: 1\n\nx"))
            .unwrap();
        let b = store
            .insert(record("From: alice@example.com\nTo: box@EXAMPLE.com\nSubject: 2\n\ny"))
            .unwrap();
        assert_ne!(a, b);
        assert_eq!(store.get(a).unwrap().sender_id, store.get(b).unwrap().sender_id);
        assert_eq!(store.get(a).unwrap().inbox_id, store.get(b).unwrap().inbox_id);
        assert_eq!(store.sender_count(), 1);
        assert_eq!(store.inbox_count(), 1);
    }

    #[test]
    fn test_each_delivery_is_stored() {
        let mut store = MemoryStore::new();
        let raw = "From: a@example.com\nSubject: again\n\nbody";
        let first = store.insert(record(raw)).unwrap();
        let second = store.insert(record(raw)).unwrap();
        assert_ne!(first, second);
        assert_eq!(store.len(), 2);
        assert_eq!(store.sender_count(), 1);
        let ids: Vec<EmailId> = store.iter().map(|stored| stored.id).collect();
        assert_eq!(ids, vec![first, second]);
    }

    #[test]
    fn test_deduplicating_store_returns_existing_id() {
        let mut store = MemoryStore::deduplicating();
        let raw = "From: a@example.com\nSubject: dup\n\nbody";
        let first = store.insert(record(raw)).unwrap();
        let second = store.insert(record(raw)).unwrap();
        assert_eq!(first, second);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_open_sets_read_at_once() {
        let mut store = MemoryStore::new();
        let id = store.insert(record("Subject: read\n\nbody")).unwrap();
        assert!(store.get(id).unwrap().record.read_at.is_none());

        let first = Utc.with_ymd_and_hms(2024, 2, 1, 9, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        store.open_at(id, first).unwrap();
        let stored = store.open_at(id, later).unwrap();
        assert_eq!(stored.record.read_at, Some(first));
    }

    #[test]
    fn test_set_favorite() {
        let mut store = MemoryStore::new();
        let id = store.insert(record("Subject: fav\n\nbody")).unwrap();
        store.set_favorite(id, true).unwrap();
        assert!(store.get(id).unwrap().record.favorite);
        store.set_favorite(id, false).unwrap();
        assert!(!store.get(id).unwrap().record.favorite);
    }

    #[test]
    fn test_unknown_id_is_not_found() {
        let mut store = MemoryStore::new();
        let missing = EmailId(42);
        assert!(matches!(
            store.get(missing),
            Err(PostboxError::EmailNotFound(EmailId(42)))
        ));
        assert!(store.open(missing).is_err());
        assert!(store.set_favorite(missing, true).is_err());
    }
}
