//! Core data model types for email records, addresses, and attachments.

pub mod address;
pub mod attachment;
pub mod email;

pub use address::EmailAddress;
pub use attachment::AttachmentRef;
pub use email::{EmailRecord, Inbox, Sender};
