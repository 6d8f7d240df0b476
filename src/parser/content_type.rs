//! `Content-Type` (RFC 2045 §5) and `Content-Disposition` (RFC 2183) values,
//! including RFC 2231 extended parameters.

use std::collections::BTreeMap;

use crate::parser::encoding;

/// A parsed media type with its parameters.
///
/// The media type and parameter names are lowercase; values keep their case.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ContentType {
    media_type: String,
    params: BTreeMap<String, String>,
}

impl ContentType {
    /// Parse a header value. `None` when the media type is not `type/subtype`.
    pub fn parse(value: &str) -> Option<Self> {
        let (head, rest) = match value.split_once(';') {
            Some((head, rest)) => (head, rest),
            None => (value, ""),
        };
        let (primary, sub) = head.trim().split_once('/')?;
        if !is_token(primary) || !is_token(sub) {
            return None;
        }
        Some(Self {
            media_type: format!("{primary}/{sub}").to_ascii_lowercase(),
            params: parse_parameters(rest),
        })
    }

    /// `text/plain; charset=us-ascii`, the RFC 2045 default.
    pub fn text_plain() -> Self {
        let mut params = BTreeMap::new();
        params.insert("charset".to_string(), "us-ascii".to_string());
        Self {
            media_type: "text/plain".to_string(),
            params,
        }
    }

    /// The lowercase `type/subtype`.
    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn primary_type(&self) -> &str {
        self.media_type
            .split_once('/')
            .map(|(p, _)| p)
            .unwrap_or(&self.media_type)
    }

    pub fn sub_type(&self) -> &str {
        self.media_type
            .split_once('/')
            .map(|(_, s)| s)
            .unwrap_or("")
    }

    pub fn is(&self, media_type: &str) -> bool {
        self.media_type.eq_ignore_ascii_case(media_type)
    }

    pub fn is_multipart(&self) -> bool {
        self.primary_type() == "multipart"
    }

    pub fn is_text(&self) -> bool {
        self.primary_type() == "text"
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn charset(&self) -> Option<&str> {
        self.param("charset").filter(|c| !c.is_empty())
    }

    pub fn boundary(&self) -> Option<&str> {
        self.param("boundary").filter(|b| !b.is_empty())
    }

    pub fn name(&self) -> Option<&str> {
        self.param("name").filter(|n| !n.trim().is_empty())
    }
}

impl Default for ContentType {
    fn default() -> Self {
        Self::text_plain()
    }
}

/// The disposition type of a part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum DispositionKind {
    Inline,
    Attachment,
    /// No `Content-Disposition` header.
    #[default]
    None,
}

/// A parsed `Content-Disposition`.
#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct Disposition {
    pub kind: DispositionKind,
    pub filename: Option<String>,
}

impl Disposition {
    /// Parse an optional header value.
    ///
    /// Unrecognized disposition types are treated as `attachment` (RFC 2183 §2.8).
    pub fn parse(value: Option<&str>) -> Self {
        let Some(value) = value else {
            return Self::default();
        };
        let (head, rest) = value.split_once(';').unwrap_or((value, ""));
        let kind = match head.trim().to_ascii_lowercase().as_str() {
            "" => DispositionKind::None,
            "inline" => DispositionKind::Inline,
            _ => DispositionKind::Attachment,
        };
        let filename = parse_parameters(rest)
            .remove("filename")
            .filter(|f| !f.trim().is_empty());
        Self { kind, filename }
    }
}

/// RFC 2045 token: printable ASCII without spaces or tspecials.
fn is_token(s: &str) -> bool {
    const TSPECIALS: &[u8] = b"()<>@,;:\\\"/[]?=";
    !s.is_empty()
        && s.bytes()
            .all(|b| b.is_ascii_graphic() && !TSPECIALS.contains(&b))
}

/// Parse `; name=value; name="quoted value"` into a lowercase-keyed map.
///
/// RFC 2231 sections (`name*0=`, `name*1=`) are joined and extended values
/// (`name*=charset'lang'%XX`) are percent-decoded; they win over a plain
/// parameter of the same name. The first plain occurrence of a name wins.
fn parse_parameters(s: &str) -> BTreeMap<String, String> {
    let mut params = BTreeMap::new();
    let mut sections: BTreeMap<String, Vec<(u32, bool, String)>> = BTreeMap::new();

    for (name, value) in split_parameters(s) {
        let name = name.to_ascii_lowercase();
        match name.split_once('*') {
            Some((base, suffix)) => {
                let extended = suffix.is_empty() || suffix.ends_with('*');
                let index = suffix.trim_end_matches('*').parse::<u32>().unwrap_or(0);
                sections
                    .entry(base.to_string())
                    .or_default()
                    .push((index, extended, value));
            }
            None => {
                params.entry(name).or_insert(value);
            }
        }
    }

    for (base, mut parts) in sections {
        parts.sort_by_key(|(index, _, _)| *index);
        let mut charset: Option<String> = None;
        let mut bytes = Vec::new();
        for (i, (_, extended, value)) in parts.iter().enumerate() {
            if !extended {
                bytes.extend_from_slice(value.as_bytes());
                continue;
            }
            let mut encoded = value.as_str();
            if i == 0 {
                let mut pieces = value.splitn(3, '\'');
                if let (Some(cs), Some(_lang), Some(rest)) =
                    (pieces.next(), pieces.next(), pieces.next())
                {
                    charset = Some(cs.to_string()).filter(|c| !c.is_empty());
                    encoded = rest;
                }
            }
            bytes.extend(percent_decode(encoded));
        }
        params.insert(base, encoding::decode_text(&bytes, charset.as_deref()));
    }

    params
}

/// Split on `;` outside quotes and unquote each `name=value`.
fn split_parameters(s: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let mut chars = s.chars().peekable();

    loop {
        while matches!(chars.peek(), Some(c) if *c == ';' || c.is_whitespace()) {
            chars.next();
        }
        if chars.peek().is_none() {
            break;
        }

        let mut name = String::new();
        while let Some(&c) = chars.peek() {
            if c == '=' || c == ';' {
                break;
            }
            name.push(c);
            chars.next();
        }
        if chars.next() != Some('=') {
            // "name" without a value
            continue;
        }
        while matches!(chars.peek(), Some(c) if c.is_whitespace()) {
            chars.next();
        }

        let mut value = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            while let Some(c) = chars.next() {
                match c {
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            value.push(escaped);
                        }
                    }
                    '"' => break,
                    _ => value.push(c),
                }
            }
            // Skip anything between the closing quote and the next ';'
            while let Some(&c) = chars.peek() {
                if c == ';' {
                    break;
                }
                chars.next();
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c == ';' {
                    break;
                }
                value.push(c);
                chars.next();
            }
            value = value.trim().to_string();
        }

        let name = name.trim();
        if !name.is_empty() {
            out.push((name.to_string(), value));
        }
    }

    out
}

fn percent_decode(s: &str) -> Vec<u8> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = [bytes[i + 1], bytes[i + 2]];
            if let Some(byte) = std::str::from_utf8(&hex)
                .ok()
                .and_then(|h| u8::from_str_radix(h, 16).ok())
            {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    out
}
