//! Turn a negotiation outcome into an HTTP-style response.

use serde::Serialize;

use super::{negotiate, Negotiation, Representation};
use crate::model::email::EmailRecord;

pub const STATUS_OK: u16 = 200;
pub const STATUS_NOT_ACCEPTABLE: u16 = 406;

/// A response ready to hand to any HTTP layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rendered {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

impl Rendered {
    fn not_acceptable() -> Self {
        Self {
            status: STATUS_NOT_ACCEPTABLE,
            content_type: None,
            body: String::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == STATUS_OK
    }
}

/// Negotiate against `accept` and render the chosen representation.
pub fn render(record: &EmailRecord, accept: Option<&str>) -> Rendered {
    match negotiate(accept, record.representations()) {
        Negotiation::Selected(rep) => Rendered {
            status: STATUS_OK,
            content_type: Some(rep.content_type()),
            body: representation_body(record, rep),
        },
        Negotiation::NotAcceptable => Rendered::not_acceptable(),
    }
}

fn representation_body(record: &EmailRecord, rep: Representation) -> String {
    match rep {
        Representation::Html => record.html_body.clone().unwrap_or_default(),
        Representation::Text => record.text_body.clone().unwrap_or_default(),
        Representation::Raw => escape_html(&String::from_utf8_lossy(&record.raw_source)),
    }
}

/// Escape `& < > " '` for safe embedding in HTML.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}
