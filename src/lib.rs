//! `postbox`: mailbox ingestion core.
//!
//! Raw RFC 2822 messages are decoded into a MIME part tree, resolved into
//! HTML/text bodies and attachments, and mapped onto an [`model::EmailRecord`].
//! Stored records are served back through `Accept`-header content negotiation.

pub mod builder;
pub mod config;
pub mod error;
pub mod model;
pub mod negotiate;
pub mod parser;
pub mod resolver;
pub mod store;
