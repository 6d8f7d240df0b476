//! Content negotiation between an HTTP `Accept` header and the
//! representations a stored email can be served as.
//!
//! Candidates are tried in a fixed priority order (HTML, plain text, raw
//! source). Each candidate scores the highest `q` among the exact,
//! `type/*` and `*/*` entries matching it; an exact entry with `q=0`
//! rules it out regardless of wildcards. The strictly highest score wins
//! and ties go to the earlier candidate.

pub mod render;

use std::fmt;

use tracing::debug;

pub use render::{escape_html, render, Rendered};

/// A servable view of an email.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Representation {
    Html,
    Text,
    Raw,
}

impl Representation {
    /// Candidates in priority order.
    pub const ALL: [Representation; 3] = [Self::Html, Self::Text, Self::Raw];

    pub fn media_type(&self) -> &'static str {
        match self {
            Self::Html => "text/html",
            Self::Text => "text/plain",
            Self::Raw => "message/rfc2822",
        }
    }

    /// `Content-Type` header value sent with this representation.
    pub fn content_type(&self) -> String {
        format!("{}; charset=UTF-8", self.media_type())
    }
}

impl fmt::Display for Representation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.media_type())
    }
}

/// Which representations are available for one record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepresentationSet {
    pub html: bool,
    pub text: bool,
    pub raw: bool,
}

impl RepresentationSet {
    pub fn contains(&self, rep: Representation) -> bool {
        match rep {
            Representation::Html => self.html,
            Representation::Text => self.text,
            Representation::Raw => self.raw,
        }
    }

    /// Available representations in priority order.
    pub fn iter(&self) -> impl Iterator<Item = Representation> + '_ {
        Representation::ALL
            .into_iter()
            .filter(move |rep| self.contains(*rep))
    }
}

/// One `Accept` entry.
#[derive(Debug, Clone, PartialEq)]
pub struct AcceptPreference {
    /// Lowercased `type/subtype`, possibly with wildcards.
    pub media_type: String,
    pub q: f32,
}

impl AcceptPreference {
    fn is_exact(&self) -> bool {
        !self.media_type.ends_with("/*")
    }

    fn matches(&self, media_type: &str) -> bool {
        if self.media_type == "*/*" {
            return true;
        }
        match self.media_type.strip_suffix("/*") {
            Some(primary) => media_type
                .split_once('/')
                .is_some_and(|(ty, _)| ty == primary),
            None => self.media_type == media_type,
        }
    }
}

/// Outcome of negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Negotiation {
    Selected(Representation),
    NotAcceptable,
}

/// Parse an `Accept` header.
///
/// Entries that are not `type/subtype`, or whose `q` is not a number in
/// `[0, 1]`, are dropped. A bare `*` reads as `*/*`. Parameters other
/// than `q` are ignored.
pub fn parse_accept(header: &str) -> Vec<AcceptPreference> {
    split_unquoted(header, ',')
        .into_iter()
        .filter_map(|entry| {
            let mut pieces = split_unquoted(entry, ';').into_iter();
            let media_type = pieces.next()?.trim().to_ascii_lowercase();
            let media_type = if media_type == "*" {
                "*/*".to_string()
            } else {
                media_type
            };
            let (ty, sub) = media_type.split_once('/')?;
            if ty.is_empty() || sub.is_empty() || (ty == "*" && sub != "*") {
                debug!(entry, "Dropping malformed Accept entry");
                return None;
            }

            let mut q = 1.0;
            for param in pieces {
                let Some((name, value)) = param.split_once('=') else {
                    continue;
                };
                if name.trim().eq_ignore_ascii_case("q") {
                    match value.trim().parse::<f32>() {
                        Ok(v) if (0.0..=1.0).contains(&v) => q = v,
                        _ => {
                            debug!(entry, "Dropping Accept entry with invalid q");
                            return None;
                        }
                    }
                }
            }

            Some(AcceptPreference { media_type, q })
        })
        .collect()
}

/// Split on `sep`, ignoring separators inside quoted strings.
fn split_unquoted(input: &str, sep: char) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    let mut escaped = false;

    for (i, ch) in input.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            c if c == sep && !in_quotes => {
                pieces.push(&input[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    pieces.push(&input[start..]);
    pieces
}

/// Score one candidate media type: `None` when excluded or unmatched.
fn score(prefs: &[AcceptPreference], media_type: &str) -> Option<f32> {
    let mut best: Option<f32> = None;
    for pref in prefs.iter().filter(|p| p.matches(media_type)) {
        if pref.is_exact() && pref.q == 0.0 {
            return None;
        }
        best = Some(best.map_or(pref.q, |b| b.max(pref.q)));
    }
    best
}

/// Choose the representation to serve.
///
/// An absent, blank or wholly unparseable header accepts everything.
pub fn negotiate(accept: Option<&str>, available: RepresentationSet) -> Negotiation {
    let prefs = accept.map(parse_accept).unwrap_or_default();
    let prefs = if prefs.is_empty() {
        vec![AcceptPreference {
            media_type: "*/*".to_string(),
            q: 1.0,
        }]
    } else {
        prefs
    };

    let mut chosen: Option<(Representation, f32)> = None;
    for rep in available.iter() {
        let Some(q) = score(&prefs, rep.media_type()) else {
            continue;
        };
        if q > 0.0 && chosen.map_or(true, |(_, best)| q > best) {
            chosen = Some((rep, q));
        }
    }

    match chosen {
        Some((rep, q)) => {
            debug!(%rep, q, "Negotiated representation");
            Negotiation::Selected(rep)
        }
        None => Negotiation::NotAcceptable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: RepresentationSet = RepresentationSet {
        html: true,
        text: true,
        raw: true,
    };
    const TEXT_ONLY: RepresentationSet = RepresentationSet {
        html: false,
        text: true,
        raw: true,
    };
    const HTML_ONLY: RepresentationSet = RepresentationSet {
        html: true,
        text: false,
        raw: true,
    };

    fn pick(accept: &str, available: RepresentationSet) -> Negotiation {
        negotiate(Some(accept), available)
    }

    #[test]
    fn test_parse_accept() {
        let prefs = parse_accept("text/html;level=1, text/*;q=0.5, */*;q=0.1");
        assert_eq!(prefs.len(), 3);
        assert_eq!(prefs[0].media_type, "text/html");
        assert_eq!(prefs[0].q, 1.0);
        assert_eq!(prefs[1].q, 0.5);
        assert_eq!(prefs[2].media_type, "*/*");
    }

    #[test]
    fn test_parse_accept_drops_invalid_entries() {
        let prefs = parse_accept("text/html;q=abc, garbage, text/plain;q=2, */html, TEXT/PLAIN;Q=0.3");
        assert_eq!(
            prefs,
            vec![AcceptPreference {
                media_type: "text/plain".to_string(),
                q: 0.3
            }]
        );
    }

    #[test]
    fn test_quoted_separators_stay_in_entry() {
        let prefs = parse_accept(r#"text/html;foo="a,b;c";q=0.1, text/plain;q=0.5"#);
        assert_eq!(prefs.len(), 2);
        assert_eq!(prefs[0].media_type, "text/html");
        assert_eq!(prefs[0].q, 0.1);
        assert_eq!(
            pick(r#"text/html;foo="a,b";q=0.1, text/plain;q=0.5"#, ALL),
            Negotiation::Selected(Representation::Text)
        );
    }

    #[test]
    fn test_bare_star_is_wildcard() {
        let prefs = parse_accept("*");
        assert_eq!(prefs[0].media_type, "*/*");
    }

    #[test]
    fn test_wildcard_prefers_html() {
        assert_eq!(pick("*/*", ALL), Negotiation::Selected(Representation::Html));
    }

    #[test]
    fn test_missing_or_blank_header_prefers_html() {
        assert_eq!(negotiate(None, ALL), Negotiation::Selected(Representation::Html));
        assert_eq!(pick("  ", ALL), Negotiation::Selected(Representation::Html));
        assert_eq!(pick(";;;", TEXT_ONLY), Negotiation::Selected(Representation::Text));
    }

    #[test]
    fn test_text_wildcard_html_zero() {
        assert_eq!(
            pick("text/*, text/html;q=0", ALL),
            Negotiation::Selected(Representation::Text)
        );
    }

    #[test]
    fn test_higher_q_wins() {
        assert_eq!(
            pick("text/html;q=0.5, text/plain;q=0.9", ALL),
            Negotiation::Selected(Representation::Text)
        );
    }

    #[test]
    fn test_tie_goes_to_priority() {
        assert_eq!(
            pick("text/plain, text/html", ALL),
            Negotiation::Selected(Representation::Html)
        );
    }

    #[test]
    fn test_lower_q_loses_even_when_listed_first() {
        assert_eq!(
            pick("text/plain; q=0.5, text/html", ALL),
            Negotiation::Selected(Representation::Html)
        );
        assert_eq!(
            pick("text/html; q=0.5, text/plain", ALL),
            Negotiation::Selected(Representation::Text)
        );
    }

    #[test]
    fn test_rfc822_is_not_served() {
        assert_eq!(pick("message/rfc822", ALL), Negotiation::NotAcceptable);
    }

    #[test]
    fn test_raw_requested_explicitly() {
        assert_eq!(
            pick("message/rfc2822", ALL),
            Negotiation::Selected(Representation::Raw)
        );
        assert_eq!(
            pick("message/*", TEXT_ONLY),
            Negotiation::Selected(Representation::Raw)
        );
    }

    #[test]
    fn test_html_only_record_with_text_plain_request() {
        assert_eq!(pick("text/plain", HTML_ONLY), Negotiation::NotAcceptable);
    }

    #[test]
    fn test_unavailable_representation_is_skipped() {
        assert_eq!(
            pick("text/html, */*;q=0.1", TEXT_ONLY),
            Negotiation::Selected(Representation::Text)
        );
    }

    #[test]
    fn test_everything_zero_is_not_acceptable() {
        assert_eq!(pick("*/*;q=0", ALL), Negotiation::NotAcceptable);
        assert_eq!(pick("image/png", ALL), Negotiation::NotAcceptable);
    }

    #[test]
    fn test_exact_zero_overrides_wildcard() {
        assert_eq!(
            pick("*/*, text/html;q=0, text/plain;q=0", ALL),
            Negotiation::Selected(Representation::Raw)
        );
    }

    #[test]
    fn test_representation_set_order() {
        let reps: Vec<_> = TEXT_ONLY.iter().collect();
        assert_eq!(reps, vec![Representation::Text, Representation::Raw]);
    }
}
