//! Canonical email entities handed to the persistence layer.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use super::address::EmailAddress;
use super::attachment::AttachmentRef;
use crate::negotiate::RepresentationSet;

/// The author of a message, keyed on its lowercase address.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Sender {
    pub email: String,
    pub name: String,
}

/// The mailbox a message was delivered to, keyed on its lowercase address.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Inbox {
    pub email: String,
}

impl Sender {
    pub fn key(&self) -> String {
        self.email.to_lowercase()
    }
}

impl Inbox {
    pub fn key(&self) -> String {
        self.email.to_lowercase()
    }
}

impl From<&EmailAddress> for Sender {
    fn from(addr: &EmailAddress) -> Self {
        Self {
            email: addr.address.clone(),
            name: addr.display_name.clone(),
        }
    }
}

impl From<&EmailAddress> for Inbox {
    fn from(addr: &EmailAddress) -> Self {
        Self {
            email: addr.address.clone(),
        }
    }
}

/// One ingested message.
///
/// Built once and immutable afterwards, except for `read_at` and `favorite`,
/// which belong to the persistence layer.
#[derive(Debug, Clone, PartialEq)]
pub struct EmailRecord {
    /// Decoded subject line (RFC 2047 encoded-words resolved).
    pub subject: String,

    pub sender: Sender,

    pub inbox: Inbox,

    /// Every `To:` address, in header order.
    pub recipients: Vec<EmailAddress>,

    /// The `Message-ID` header value, empty when missing.
    pub message_id: String,

    /// Top-level header block as text.
    pub raw_headers: String,

    pub html_body: Option<String>,

    pub text_body: Option<String>,

    /// The original message bytes, verbatim.
    pub raw_source: Vec<u8>,

    pub attachments: Vec<AttachmentRef>,

    /// Parsed `Date:` header, if it could be read.
    pub sent_at: Option<DateTime<Utc>>,

    /// `sent_at`, or the ingestion time when the date was unusable.
    pub received_at: DateTime<Utc>,

    /// Set on first retrieval.
    pub read_at: Option<DateTime<Utc>>,

    pub favorite: bool,
}

impl EmailRecord {
    pub fn has_html(&self) -> bool {
        self.html_body.is_some()
    }

    pub fn has_text(&self) -> bool {
        self.text_body.is_some()
    }

    /// Representations this record can be served as. Raw is always available.
    pub fn representations(&self) -> RepresentationSet {
        RepresentationSet {
            html: self.has_html(),
            text: self.has_text(),
            raw: true,
        }
    }

    /// Hex SHA-256 of the raw source.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.raw_source);
        format!("{:x}", hasher.finalize())
    }

    /// Total decoded size of all attachments.
    pub fn attachments_size(&self) -> u64 {
        self.attachments.iter().map(|a| a.size_in_bytes).sum()
    }
}
