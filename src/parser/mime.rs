//! MIME decoding: raw message bytes into a tree of [`MimePart`]s.
//!
//! Decoding is deliberately permissive. The only hard failure is a root
//! message whose header block never ends; every other irregularity takes a
//! named fallback:
//!
//! - multipart without a `boundary` parameter → opaque leaf
//! - multipart whose boundary never appears in the body → opaque leaf
//! - nesting deeper than the configured maximum → opaque leaf
//! - child segment without a blank line → headers only, empty body
//! - missing closing delimiter → last part runs to the end of input
//! - unknown `Content-Transfer-Encoding` → kept as `Unknown`, passed through

use tracing::{debug, warn};

use crate::error::{PostboxError, Result};
use crate::parser::content_type::{ContentType, Disposition};
use crate::parser::encoding::TransferEncoding;
use crate::parser::header::{self, HeaderMap};

/// Default maximum multipart nesting depth.
pub const DEFAULT_MAX_DEPTH: usize = 20;

/// One node of the part tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MimePart {
    pub headers: HeaderMap,
    pub content_type: ContentType,
    pub transfer_encoding: TransferEncoding,
    pub disposition: Disposition,
    pub body: PartBody,
}

/// Either raw, still transfer-encoded content or ordered child parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartBody {
    Leaf(Vec<u8>),
    Multipart(Vec<MimePart>),
}

impl MimePart {
    pub fn is_leaf(&self) -> bool {
        matches!(self.body, PartBody::Leaf(_))
    }

    /// Raw body bytes of a leaf; `None` for containers.
    pub fn leaf_body(&self) -> Option<&[u8]> {
        match &self.body {
            PartBody::Leaf(bytes) => Some(bytes),
            PartBody::Multipart(_) => None,
        }
    }

    /// Child parts of a container; empty for leaves.
    pub fn children(&self) -> &[MimePart] {
        match &self.body {
            PartBody::Leaf(_) => &[],
            PartBody::Multipart(parts) => parts,
        }
    }

    /// Visit this part and its descendants in pre-order, left to right.
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a MimePart, usize)) {
        self.walk_at(0, visit);
    }

    fn walk_at<'a>(&'a self, depth: usize, visit: &mut dyn FnMut(&'a MimePart, usize)) {
        visit(self, depth);
        for child in self.children() {
            child.walk_at(depth + 1, visit);
        }
    }
}

/// Decoder with a bounded recursion depth.
#[derive(Debug, Clone, Copy)]
pub struct MimeDecoder {
    max_depth: usize,
}

impl Default for MimeDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DEPTH)
    }
}

impl MimeDecoder {
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    /// Decode a complete raw message into its root part.
    pub fn decode(&self, raw: &[u8]) -> Result<MimePart> {
        let data = skip_envelope(raw);
        let (header_end, body_start) = header::split_header_block(data).ok_or_else(|| {
            PostboxError::malformed("no blank line separates the headers from the body")
        })?;
        Ok(self.decode_part(&data[..header_end], &data[body_start..], 0))
    }

    fn decode_segment(&self, segment: &[u8], depth: usize) -> MimePart {
        match header::split_header_block(segment) {
            Some((header_end, body_start)) => {
                self.decode_part(&segment[..header_end], &segment[body_start..], depth)
            }
            None => {
                debug!(depth, "Part without a blank line, reading it as headers only");
                self.decode_part(segment, &[], depth)
            }
        }
    }

    fn decode_part(&self, header_bytes: &[u8], body: &[u8], depth: usize) -> MimePart {
        let headers = HeaderMap::parse(&header::decode_header_bytes(header_bytes));
        let content_type = headers
            .get("content-type")
            .and_then(ContentType::parse)
            .unwrap_or_default();
        let transfer_encoding = headers
            .get("content-transfer-encoding")
            .map(TransferEncoding::parse)
            .unwrap_or_default();
        let disposition = Disposition::parse(headers.get("content-disposition"));

        let body = if content_type.is_multipart() {
            self.decode_multipart(&content_type, body, depth)
        } else {
            PartBody::Leaf(body.to_vec())
        };

        MimePart {
            headers,
            content_type,
            transfer_encoding,
            disposition,
            body,
        }
    }

    fn decode_multipart(&self, content_type: &ContentType, body: &[u8], depth: usize) -> PartBody {
        let Some(boundary) = content_type.boundary() else {
            warn!(
                media_type = content_type.media_type(),
                "Multipart without boundary, keeping body as a single part"
            );
            return PartBody::Leaf(body.to_vec());
        };

        if depth >= self.max_depth {
            warn!(
                depth,
                max_depth = self.max_depth,
                "Multipart nesting too deep, keeping body as a single part"
            );
            return PartBody::Leaf(body.to_vec());
        }

        match split_multipart(body, boundary) {
            Some(segments) => PartBody::Multipart(
                segments
                    .into_iter()
                    .map(|segment| self.decode_segment(segment, depth + 1))
                    .collect(),
            ),
            None => {
                warn!(
                    boundary,
                    "Boundary never appears in the body, keeping body as a single part"
                );
                PartBody::Leaf(body.to_vec())
            }
        }
    }
}

/// Decode a message with the default depth limit.
pub fn decode(raw: &[u8]) -> Result<MimePart> {
    MimeDecoder::default().decode(raw)
}

/// The top-level header block of a raw message, as text.
///
/// Everything is returned when no blank line exists.
pub fn raw_header_block(raw: &[u8]) -> String {
    let data = skip_envelope(raw);
    let end = header::split_header_block(data)
        .map(|(end, _)| end)
        .unwrap_or(data.len());
    let text = header::decode_header_bytes(&data[..end]);
    text.trim_end_matches(['\r', '\n']).to_string()
}

/// Split a multipart body into the segments between delimiter lines.
///
/// Returns `None` when no opening delimiter exists. Preamble and epilogue
/// are dropped. The line break preceding a delimiter belongs to the
/// delimiter, not to the segment.
fn split_multipart<'a>(body: &'a [u8], boundary: &str) -> Option<Vec<&'a [u8]>> {
    let open = format!("--{boundary}");
    let close = format!("--{boundary}--");

    let mut segments = Vec::new();
    let mut current: Option<usize> = None;
    let mut seen_open = false;
    let mut closed = false;

    let mut line_start = 0;
    while line_start < body.len() {
        let (line_end, next_start) = match body[line_start..].iter().position(|&b| b == b'\n') {
            Some(pos) => (line_start + pos, line_start + pos + 1),
            None => (body.len(), body.len()),
        };
        let line = trim_line_end(&body[line_start..line_end]);

        let is_close = line == close.as_bytes();
        if is_close || line == open.as_bytes() {
            if let Some(start) = current.take() {
                segments.push(&body[start..strip_break(body, start, line_start)]);
            }
            if is_close {
                closed = true;
                break;
            }
            seen_open = true;
            current = Some(next_start);
        }

        line_start = next_start;
    }

    if !seen_open {
        return None;
    }
    if let Some(start) = current {
        if !closed {
            debug!(boundary, "Missing closing delimiter, last part runs to end of input");
        }
        segments.push(&body[start.min(body.len())..]);
    }
    Some(segments)
}

/// Drop trailing spaces, tabs and CR from a delimiter candidate.
fn trim_line_end(line: &[u8]) -> &[u8] {
    let mut end = line.len();
    while end > 0 && matches!(line[end - 1], b' ' | b'\t' | b'\r') {
        end -= 1;
    }
    &line[..end]
}

/// End of a segment starting at `start` whose delimiter line begins at `delim`.
fn strip_break(body: &[u8], start: usize, delim: usize) -> usize {
    let mut end = delim;
    if end > start && body[end - 1] == b'\n' {
        end -= 1;
    }
    if end > start && body[end - 1] == b'\r' {
        end -= 1;
    }
    end
}

/// Skip a UTF-8 BOM and a leading mbox `From ` envelope line.
fn skip_envelope(data: &[u8]) -> &[u8] {
    let data = data.strip_prefix(b"\xEF\xBB\xBF".as_slice()).unwrap_or(data);
    if data.starts_with(b"From ") {
        if let Some(pos) = data.iter().position(|&b| b == b'\n') {
            return &data[pos + 1..];
        }
    }
    data
}
