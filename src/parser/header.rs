//! RFC 5322 header parsing: block splitting, folding, encoded-words (RFC 2047)
//! and tolerant date parsing.

use base64::Engine;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use tracing::{debug, warn};

use crate::parser::encoding::{self, MIME_BASE64};

/// Ordered header list with case-insensitive name lookup.
///
/// Repeated names are all retained. [`HeaderMap::get`] returns the first
/// occurrence, which is authoritative for singular headers such as
/// `Subject`, `Date`, `From` and the `Content-*` family.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    entries: Vec<(String, String)>,
}

impl HeaderMap {
    /// Parse an unfolded-or-folded header block.
    ///
    /// Continuation lines (starting with space or tab) are appended to the
    /// previous header. Lines without a colon are skipped.
    pub fn parse(block: &str) -> Self {
        let mut entries: Vec<(String, String)> = Vec::new();

        for line in block.lines() {
            if line.starts_with(' ') || line.starts_with('\t') {
                if let Some(last) = entries.last_mut() {
                    let folded = line.trim();
                    if !folded.is_empty() {
                        if !last.1.is_empty() {
                            last.1.push(' ');
                        }
                        last.1.push_str(folded);
                    }
                }
            } else if let Some(colon_pos) = line.find(':') {
                let name = line[..colon_pos].trim();
                if name.is_empty() {
                    continue;
                }
                let value = line[colon_pos + 1..].trim().to_string();
                entries.push((name.to_string(), value));
            }
        }

        Self { entries }
    }

    /// First value for `name` (case-insensitive).
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Every value for `name`, in message order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Locate the blank line that ends the header block.
///
/// Returns `(header_end, body_start)`: the header block is
/// `data[..header_end]` and the body is `data[body_start..]`.
/// A message that starts with a blank line has no headers.
pub fn split_header_block(data: &[u8]) -> Option<(usize, usize)> {
    if data.starts_with(b"\r\n") {
        return Some((0, 2));
    }
    if data.starts_with(b"\n") {
        return Some((0, 1));
    }

    let mut i = 0;
    while i < data.len() {
        if data[i] == b'\n' {
            match (data.get(i + 1), data.get(i + 2)) {
                (Some(b'\n'), _) => return Some((i, i + 2)),
                (Some(b'\r'), Some(b'\n')) => return Some((i, i + 3)),
                _ => {}
            }
        }
        i += 1;
    }
    None
}

/// Decode raw header bytes to a string.
///
/// Tries UTF-8 first, then falls back to Windows-1252 (which accepts every byte).
pub fn decode_header_bytes(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            decoded.into_owned()
        }
    }
}

/// Decode RFC 2047 encoded-words in a header value.
///
/// Example: `"=?UTF-8?B?SG9sYQ==?= =?UTF-8?B?IG11bmRv?="` → `"Hola mundo"`
///
/// Tokens that fail to decode are kept verbatim.
pub fn decode_encoded_words(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut remaining = input;
    let mut last_was_encoded = false;

    while let Some(start) = remaining.find("=?") {
        let gap = &remaining[..start];
        // Whitespace between two adjacent encoded-words is dropped (RFC 2047 §6.2)
        if !last_was_encoded || !gap.trim().is_empty() {
            result.push_str(gap);
        }

        let token = &remaining[start + 2..];
        match decode_one_word(token) {
            Some((text, consumed)) => {
                result.push_str(&text);
                remaining = &token[consumed..];
                last_was_encoded = true;
            }
            None => {
                result.push_str("=?");
                remaining = token;
                last_was_encoded = false;
            }
        }
    }

    result.push_str(remaining);
    result
}

/// Longest encoded word body searched after `=?`. RFC 2047 allows 75 bytes
/// per word; real senders overshoot, so the window is wider.
const MAX_ENCODED_WORD_LEN: usize = 256;

/// Decode `charset?encoding?text?=` (the leading `=?` already stripped).
///
/// Only the first [`MAX_ENCODED_WORD_LEN`] bytes are examined, which keeps
/// a header full of unterminated `=?` tokens linear.
/// Returns the decoded text and the number of bytes consumed.
fn decode_one_word(s: &str) -> Option<(String, usize)> {
    let mut limit = s.len().min(MAX_ENCODED_WORD_LEN);
    while !s.is_char_boundary(limit) {
        limit -= 1;
    }
    let s = &s[..limit];

    let (charset, rest) = s.split_once('?')?;
    let (scheme, rest) = rest.split_once('?')?;
    let end = rest.find("?=")?;
    let payload = &rest[..end];
    if payload.contains(char::is_whitespace) {
        return None;
    }

    // RFC 2231 language suffix: "utf-8*en"
    let charset = charset.split('*').next().unwrap_or(charset);

    let bytes = match scheme {
        "B" | "b" => MIME_BASE64.decode(payload.as_bytes()).ok()?,
        "Q" | "q" => decode_q_encoding(payload),
        _ => return None,
    };

    let consumed = s.len() - rest.len() + end + 2;
    Some((encoding::decode_text(&bytes, Some(charset)), consumed))
}

/// Decode Q-encoding (RFC 2047): underscores → spaces, `=XX` → byte.
fn decode_q_encoding(input: &str) -> Vec<u8> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'_' => out.push(b' '),
            b'=' if i + 2 < bytes.len() => {
                match (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                    (Some(hi), Some(lo)) => {
                        out.push((hi << 4) | lo);
                        i += 3;
                        continue;
                    }
                    _ => out.push(b'='),
                }
            }
            b => out.push(b),
        }
        i += 1;
    }
    out
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Extract content between `<` and `>` (for Message-ID).
pub fn extract_angle_bracket(s: &str) -> String {
    let trimmed = s.trim();
    if let Some(start) = trimmed.find('<') {
        if let Some(end) = trimmed[start..].find('>') {
            return trimmed[start..start + end + 1].to_string();
        }
    }
    trimmed.to_string()
}

const DATE_FORMATS: [&str; 8] = [
    "%d %b %Y %H:%M:%S %z",
    "%d %b %Y %H:%M %z",
    "%d %b %Y %H:%M:%S",
    "%b %d %H:%M:%S %Y",
    "%Y-%m-%d %H:%M:%S %z",
    "%Y-%m-%d %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
];

const NAMED_ZONES: [(&str, &str); 13] = [
    ("EST", "-0500"),
    ("EDT", "-0400"),
    ("CST", "-0600"),
    ("CDT", "-0500"),
    ("MST", "-0700"),
    ("MDT", "-0600"),
    ("PST", "-0800"),
    ("PDT", "-0700"),
    ("GMT", "+0000"),
    ("UTC", "+0000"),
    ("UT", "+0000"),
    ("CEST", "+0200"),
    ("CET", "+0100"),
];

/// Parse an email date string in the formats seen in real mail.
///
/// Supports RFC 2822, RFC 3339, a missing day-of-week, trailing comments
/// such as `(PDT)`, named zones and IMAP-style `16-JUL-2025` dates.
/// Returns `None` when nothing matches; callers pick their own fallback.
pub fn parse_date(date_str: &str) -> Option<DateTime<Utc>> {
    let trimmed = date_str.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }

    let cleaned = normalize_date(trimmed);
    for candidate in [cleaned.clone(), replace_named_zone(&cleaned)] {
        for fmt in DATE_FORMATS {
            if let Ok(dt) = DateTime::parse_from_str(&candidate, fmt) {
                return Some(dt.with_timezone(&Utc));
            }
            if let Ok(ndt) = NaiveDateTime::parse_from_str(&candidate, fmt) {
                return Some(Utc.from_utc_datetime(&ndt));
            }
        }
    }

    if let Some(dt) = mail_parser_date(trimmed) {
        debug!(date = trimmed, "Date parsed by mail-parser fallback");
        return Some(dt);
    }

    warn!(date = trimmed, "Could not parse date");
    None
}

/// Drop the weekday and trailing comment, and turn `16-JUL-2025` into `16 Jul 2025`.
fn normalize_date(s: &str) -> String {
    let mut s = s;
    if let Some(paren) = s.find('(') {
        s = s[..paren].trim_end();
    }
    if let Some((head, rest)) = s.split_once(|c: char| c == ',' || c == ' ') {
        if head.len() == 3 && head.chars().all(|c| c.is_ascii_alphabetic()) && !is_month(head) {
            s = rest.trim_start();
        }
    }

    let mut out = String::with_capacity(s.len());
    for (i, token) in s.split(' ').filter(|t| !t.is_empty()).enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let parts: Vec<&str> = token.split('-').collect();
        if parts.len() == 3 && is_month(parts[1]) {
            out.push_str(parts[0]);
            out.push(' ');
            out.push_str(&title_case(parts[1]));
            out.push(' ');
            out.push_str(parts[2]);
        } else if is_month(token) {
            out.push_str(&title_case(token));
        } else {
            out.push_str(token);
        }
    }
    out
}

fn is_month(s: &str) -> bool {
    const MONTHS: [&str; 12] = [
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ];
    MONTHS.iter().any(|m| m.eq_ignore_ascii_case(s))
}

fn title_case(s: &str) -> String {
    let lower = s.to_ascii_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

/// Replace a trailing zone abbreviation with its numeric offset.
fn replace_named_zone(s: &str) -> String {
    for (name, offset) in NAMED_ZONES {
        if let Some(head) = s.strip_suffix(name) {
            if head.ends_with(' ') {
                return format!("{head}{offset}");
            }
        }
    }
    s.to_string()
}

/// Last resort: let `mail-parser` try its own date grammar.
fn mail_parser_date(input: &str) -> Option<DateTime<Utc>> {
    let fake_msg = format!("Date: {input}\n\n");
    let parsed = mail_parser::MessageParser::default().parse(fake_msg.as_bytes())?;
    let dt = parsed.date()?.to_rfc3339();
    DateTime::parse_from_rfc3339(&dt)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_map_folding_and_case() {
        let block = "Subject: This is a long\n\tsubject line\nfrom: user@example.com\n";
        let headers = HeaderMap::parse(block);
        assert_eq!(headers.len(), 2);
        assert_eq!(headers.get("SUBJECT"), Some("This is a long subject line"));
        assert_eq!(headers.get("From"), Some("user@example.com"));
    }

    #[test]
    fn test_header_map_first_occurrence_wins() {
        let headers = HeaderMap::parse("Subject: first\nTo: a@b.com\nSubject: second\nTo: c@d.com\n");
        assert_eq!(headers.get("subject"), Some("first"));
        let to: Vec<&str> = headers.get_all("to").collect();
        assert_eq!(to, vec!["a@b.com", "c@d.com"]);
    }

    #[test]
    fn test_header_map_skips_garbage_lines() {
        let headers = HeaderMap::parse("not a header\nX-Ok: yes\n: empty name\n");
        assert_eq!(headers.len(), 1);
        assert!(headers.contains("x-ok"));
    }

    #[test]
    fn test_split_header_block_lf() {
        let data = b"From: a@b.com\nSubject: Hi\n\nBody\n";
        let (end, body) = split_header_block(data).unwrap();
        assert_eq!(&data[..end], b"From: a@b.com\nSubject: Hi");
        assert_eq!(&data[body..], b"Body\n");
    }

    #[test]
    fn test_split_header_block_crlf() {
        let data = b"From: a@b.com\r\nSubject: Hi\r\n\r\nBody\r\n";
        let (end, body) = split_header_block(data).unwrap();
        assert_eq!(&data[..end], b"From: a@b.com\r\nSubject: Hi\r");
        assert_eq!(&data[body..], b"Body\r\n");
    }

    #[test]
    fn test_split_header_block_no_headers() {
        assert_eq!(split_header_block(b"\nBody"), Some((0, 1)));
        assert_eq!(split_header_block(b"\r\nBody"), Some((0, 2)));
    }

    #[test]
    fn test_split_header_block_missing() {
        assert_eq!(split_header_block(b"Subject: no body here\n"), None);
    }

    #[test]
    fn test_decode_base64_encoded_word() {
        assert_eq!(decode_encoded_words("=?UTF-8?B?SG9sYSBtdW5kbw==?="), "Hola mundo");
    }

    #[test]
    fn test_decode_q_encoded_word() {
        assert_eq!(decode_encoded_words("=?ISO-8859-1?Q?caf=E9?="), "café");
    }

    #[test]
    fn test_decode_adjacent_encoded_words() {
        let input = "=?UTF-8?B?SG9sYQ==?= =?UTF-8?B?IG11bmRv?=";
        assert_eq!(decode_encoded_words(input), "Hola mundo");
    }

    #[test]
    fn test_decode_mixed_plain_and_encoded() {
        let input = "Re: =?UTF-8?Q?Mail_avec_fichier_attach=C3=A9?= now";
        assert_eq!(decode_encoded_words(input), "Re: Mail avec fichier attaché now");
    }

    #[test]
    fn test_decode_broken_encoded_word_kept() {
        assert_eq!(decode_encoded_words("=?UTF-8?X?abc?="), "=?UTF-8?X?abc?=");
        assert_eq!(decode_encoded_words("50% =? off"), "50% =? off");
    }

    #[test]
    fn test_decode_unterminated_words_is_linear() {
        let input = "=?a?Q?x".repeat(40_000);
        let start = std::time::Instant::now();
        assert_eq!(decode_encoded_words(&input), input);
        assert!(start.elapsed() < std::time::Duration::from_secs(5));

        let tail = format!("{}=?UTF-8?Q?ok?=", "=?".repeat(50_000));
        assert!(decode_encoded_words(&tail).ends_with("ok"));
    }

    #[test]
    fn test_decode_overlong_word_kept() {
        let word = format!("=?UTF-8?Q?{}?=", "a".repeat(400));
        assert_eq!(decode_encoded_words(&word), word);
    }

    #[test]
    fn test_decode_header_bytes_latin1() {
        assert_eq!(decode_header_bytes(b"Subject: caf\xe9"), "Subject: café");
    }

    #[test]
    fn test_parse_date_rfc2822() {
        let dt = parse_date("Thu, 04 Jan 2024 10:00:00 +0000").unwrap();
        assert_eq!(dt.format("%Y-%m-%d %H:%M").to_string(), "2024-01-04 10:00");
    }

    #[test]
    fn test_parse_date_with_comment() {
        let dt = parse_date("Sun, 02 Oct 2016 07:06:22 -0700 (PDT)").unwrap();
        assert_eq!(dt.format("%Y-%m-%d %H").to_string(), "2016-10-02 14");
    }

    #[test]
    fn test_parse_date_named_zone() {
        let dt = parse_date("04 Jan 2024 10:00:00 EST").unwrap();
        assert_eq!(dt.format("%H").to_string(), "15");
    }

    #[test]
    fn test_parse_date_imap_style() {
        let dt = parse_date("16-JUL-2025 03:01:03").unwrap();
        assert_eq!(dt.format("%Y-%m-%d").to_string(), "2025-07-16");
    }

    #[test]
    fn test_parse_date_iso8601() {
        assert!(parse_date("2024-01-04T10:00:00Z").is_some());
    }

    #[test]
    fn test_parse_date_garbage() {
        assert!(parse_date("sometime last week").is_none());
        assert!(parse_date("   ").is_none());
    }

    #[test]
    fn test_extract_angle_bracket() {
        assert_eq!(extract_angle_bracket(" <msg001@example.com> "), "<msg001@example.com>");
        assert_eq!(extract_angle_bracket("bare@id"), "bare@id");
    }
}
