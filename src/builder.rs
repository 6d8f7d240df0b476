//! Email record building: map decoded headers and resolved bodies onto
//! the canonical [`EmailRecord`].

use std::path::Path;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::{PostboxError, Result};
use crate::model::address::EmailAddress;
use crate::model::email::{EmailRecord, Inbox, Sender};
use crate::parser::header::{decode_encoded_words, extract_angle_bracket, parse_date, HeaderMap};
use crate::parser::mime::{self, MimeDecoder, MimePart};
use crate::resolver::{self, ResolvedBody};

/// Headers consulted, in order, when `To:` yields no address.
const DELIVERY_HEADERS: [&str; 2] = ["delivered-to", "x-original-to"];

/// Build a record, using the current time when the `Date:` header is unusable.
pub fn build(root: &MimePart, resolved: ResolvedBody, source: &[u8]) -> EmailRecord {
    build_at(root, resolved, source, Utc::now())
}

/// Build a record with an explicit ingestion time.
pub fn build_at(
    root: &MimePart,
    resolved: ResolvedBody,
    source: &[u8],
    now: DateTime<Utc>,
) -> EmailRecord {
    let headers = &root.headers;

    let subject = headers
        .get("subject")
        .map(decode_encoded_words)
        .unwrap_or_default();

    let from = headers
        .get("from")
        .map(|raw| EmailAddress::parse(&decode_encoded_words(raw)))
        .unwrap_or_default();

    let recipients = address_list(headers, "to");
    let inbox = recipients
        .first()
        .cloned()
        .or_else(|| {
            DELIVERY_HEADERS
                .iter()
                .find_map(|name| address_list(headers, name).into_iter().next())
        })
        .unwrap_or_default();

    let message_id = headers
        .get("message-id")
        .map(extract_angle_bracket)
        .unwrap_or_default();

    let sent_at = headers.get("date").and_then(parse_date);
    if sent_at.is_none() {
        debug!(%now, "No usable Date header, using ingestion time");
    }

    EmailRecord {
        subject,
        sender: Sender::from(&from),
        inbox: Inbox::from(&inbox),
        recipients,
        message_id,
        raw_headers: mime::raw_header_block(source),
        html_body: resolved.html,
        text_body: resolved.text,
        raw_source: source.to_vec(),
        attachments: resolved.attachments,
        sent_at,
        received_at: sent_at.unwrap_or(now),
        read_at: None,
        favorite: false,
    }
}

/// Decode, resolve and build in one step.
pub fn ingest(raw: &[u8]) -> Result<EmailRecord> {
    ingest_with(&MimeDecoder::default(), raw, Utc::now())
}

/// [`ingest`] with an explicit decoder and ingestion time.
pub fn ingest_with(decoder: &MimeDecoder, raw: &[u8], now: DateTime<Utc>) -> Result<EmailRecord> {
    let root = decoder.decode(raw)?;
    let resolved = resolver::resolve(&root);
    Ok(build_at(&root, resolved, raw, now))
}

/// Read a message file, refusing anything larger than `max_size` bytes.
pub fn read_source(path: &Path, max_size: u64) -> Result<Vec<u8>> {
    let meta = std::fs::metadata(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => PostboxError::FileNotFound(path.to_path_buf()),
        _ => PostboxError::io(path, e),
    })?;
    if meta.len() > max_size {
        return Err(PostboxError::MessageTooLarge {
            size: meta.len(),
            limit: max_size,
        });
    }
    std::fs::read(path).map_err(|e| PostboxError::io(path, e))
}

/// All addresses across every occurrence of `name`.
fn address_list(headers: &HeaderMap, name: &str) -> Vec<EmailAddress> {
    headers
        .get_all(name)
        .flat_map(|raw| EmailAddress::parse_list(&decode_encoded_words(raw)))
        .collect()
}
