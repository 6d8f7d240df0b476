//! Content-Transfer-Encoding codecs (RFC 2045 §6) and charset conversion to UTF-8.

use std::borrow::Cow;
use std::fmt;

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use thiserror::Error;
use tracing::{debug, warn};

/// Base64 engine tolerant of the padding quirks found in real mail.
pub(crate) const MIME_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Encoded line length for base64 bodies.
const BASE64_LINE_LEN: usize = 76;

/// A part's `Content-Transfer-Encoding`.
#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum TransferEncoding {
    #[default]
    SevenBit,
    EightBit,
    Binary,
    Base64,
    QuotedPrintable,
    /// An encoding we do not know; its body is passed through untouched.
    Unknown(String),
}

impl TransferEncoding {
    /// Parse a header value case-insensitively. Never fails.
    pub fn parse(value: &str) -> Self {
        let token = value.split(';').next().unwrap_or("").trim();
        match token.to_ascii_lowercase().as_str() {
            "" | "7bit" => Self::SevenBit,
            "8bit" => Self::EightBit,
            "binary" => Self::Binary,
            "base64" => Self::Base64,
            "quoted-printable" => Self::QuotedPrintable,
            _ => Self::Unknown(token.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::SevenBit => "7bit",
            Self::EightBit => "8bit",
            Self::Binary => "binary",
            Self::Base64 => "base64",
            Self::QuotedPrintable => "quoted-printable",
            Self::Unknown(name) => name,
        }
    }
}

impl fmt::Display for TransferEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A body that could not be transfer-decoded.
///
/// Callers keep the raw bytes when they see this.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("invalid quoted-printable: {0}")]
    QuotedPrintable(String),
}

/// Undo the transfer encoding of a leaf body.
pub fn decode_transfer<'a>(
    encoding: &TransferEncoding,
    raw: &'a [u8],
) -> Result<Cow<'a, [u8]>, DecodeError> {
    match encoding {
        TransferEncoding::Base64 => {
            let compact: Vec<u8> = raw
                .iter()
                .copied()
                .filter(|b| !b.is_ascii_whitespace())
                .collect();
            Ok(Cow::Owned(decode_base64_runs(&compact)?))
        }
        TransferEncoding::QuotedPrintable => {
            quoted_printable::decode(raw, quoted_printable::ParseMode::Robust)
                .map(Cow::Owned)
                .map_err(|e| DecodeError::QuotedPrintable(e.to_string()))
        }
        TransferEncoding::SevenBit | TransferEncoding::EightBit | TransferEncoding::Binary => {
            Ok(Cow::Borrowed(raw))
        }
        TransferEncoding::Unknown(name) => {
            debug!(encoding = %name, "Unknown transfer encoding, passing body through");
            Ok(Cow::Borrowed(raw))
        }
    }
}

/// Decode base64 that may be several separately padded chunks glued
/// together (`QQ==Qg==`). Each run ending in `=` is decoded on its own.
fn decode_base64_runs(compact: &[u8]) -> Result<Vec<u8>, base64::DecodeError> {
    let mut out = Vec::with_capacity(compact.len() / 4 * 3);
    let mut start = 0;
    let mut i = 0;
    while i < compact.len() {
        if compact[i] == b'=' {
            while i < compact.len() && compact[i] == b'=' {
                i += 1;
            }
            MIME_BASE64.decode_vec(&compact[start..i], &mut out)?;
            start = i;
        } else {
            i += 1;
        }
    }
    if start < compact.len() {
        MIME_BASE64.decode_vec(&compact[start..], &mut out)?;
    }
    Ok(out)
}

/// Decode, keeping the raw bytes when the body is corrupt.
pub fn decode_transfer_lossy<'a>(encoding: &TransferEncoding, raw: &'a [u8]) -> Cow<'a, [u8]> {
    match decode_transfer(encoding, raw) {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!(encoding = %encoding, error = %e, "Keeping undecoded body");
            Cow::Borrowed(raw)
        }
    }
}

/// Apply a transfer encoding. Inverse of [`decode_transfer`].
pub fn encode_transfer(encoding: &TransferEncoding, data: &[u8]) -> Vec<u8> {
    match encoding {
        TransferEncoding::Base64 => {
            let encoded = base64::engine::general_purpose::STANDARD.encode(data);
            let mut out = Vec::with_capacity(encoded.len() + encoded.len() / BASE64_LINE_LEN * 2);
            for (i, line) in encoded.as_bytes().chunks(BASE64_LINE_LEN).enumerate() {
                if i > 0 {
                    out.extend_from_slice(b"\r\n");
                }
                out.extend_from_slice(line);
            }
            out
        }
        TransferEncoding::QuotedPrintable => quoted_printable::encode(data),
        TransferEncoding::SevenBit
        | TransferEncoding::EightBit
        | TransferEncoding::Binary
        | TransferEncoding::Unknown(_) => data.to_vec(),
    }
}

/// Convert text bytes in `charset` to UTF-8.
///
/// A missing or `us-ascii` charset reads valid UTF-8 as UTF-8 and anything
/// else as Windows-1252. Unknown labels fall back to lossy UTF-8.
pub fn decode_text(bytes: &[u8], charset: Option<&str>) -> String {
    let label = charset.map(|c| c.trim().trim_matches('"')).unwrap_or("");
    let lower = label.to_ascii_lowercase();

    match lower.as_str() {
        "" | "us-ascii" | "ascii" | "us_ascii" | "ansi_x3.4-1968" => match std::str::from_utf8(bytes)
        {
            Ok(s) => s.to_string(),
            Err(_) => {
                let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
                decoded.into_owned()
            }
        },
        "utf-8" | "utf8" => String::from_utf8_lossy(bytes).into_owned(),
        _ => match encoding_rs::Encoding::for_label(label.as_bytes()) {
            Some(encoding) => {
                let (decoded, _, _) = encoding.decode(bytes);
                decoded.into_owned()
            }
            None => {
                warn!(charset = label, "Unknown charset, falling back to UTF-8 lossy");
                String::from_utf8_lossy(bytes).into_owned()
            }
        },
    }
}
