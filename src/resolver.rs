//! Body resolution: pick the HTML body, the plain-text body and the
//! attachments out of a decoded part tree.

use tracing::debug;

use crate::model::attachment::AttachmentRef;
use crate::parser::content_type::DispositionKind;
use crate::parser::encoding::{decode_text, decode_transfer_lossy};
use crate::parser::header::decode_encoded_words;
use crate::parser::mime::MimePart;

/// The displayable content of a message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedBody {
    pub html: Option<String>,
    pub text: Option<String>,
    pub attachments: Vec<AttachmentRef>,
}

/// What a leaf part contributes to the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafRole {
    Html,
    Text,
    Attachment,
}

/// Classify a leaf. `sole` is true when the leaf is the whole message.
pub fn classify(part: &MimePart, sole: bool) -> LeafRole {
    let ct = &part.content_type;
    if part.disposition.kind == DispositionKind::Attachment {
        LeafRole::Attachment
    } else if ct.is("text/html") {
        LeafRole::Html
    } else if ct.is("text/plain") {
        LeafRole::Text
    } else if sole && (ct.is_text() || ct.is_multipart()) {
        // Lone text/* or a multipart that degraded to a single leaf
        LeafRole::Text
    } else {
        LeafRole::Attachment
    }
}

/// Walk the tree in pre-order, left to right, and collect the bodies.
///
/// The first `text/html` and the first `text/plain` leaf win; later ones are
/// ignored. Everything else that is not displayable becomes an attachment.
pub fn resolve(root: &MimePart) -> ResolvedBody {
    let mut resolved = ResolvedBody::default();
    let sole = root.is_leaf();

    root.walk(&mut |part, depth| {
        if !part.is_leaf() {
            return;
        }
        match classify(part, sole) {
            LeafRole::Html => match resolved.html {
                None => resolved.html = Some(decode_text_part(part)),
                Some(_) => debug!(depth, "Ignoring additional text/html part"),
            },
            LeafRole::Text => match resolved.text {
                None => resolved.text = Some(decode_text_part(part)),
                Some(_) => debug!(depth, "Ignoring additional text/plain part"),
            },
            LeafRole::Attachment => {
                let index = resolved.attachments.len();
                resolved.attachments.push(extract_attachment(part, index));
            }
        }
    });

    resolved
}

/// Transfer-decode a text leaf and convert it to UTF-8.
fn decode_text_part(part: &MimePart) -> String {
    let raw = part.leaf_body().unwrap_or_default();
    let bytes = decode_transfer_lossy(&part.transfer_encoding, raw);
    decode_text(&bytes, part.content_type.charset())
}

/// Build an attachment from a leaf, keeping raw bytes if decoding fails.
fn extract_attachment(part: &MimePart, index: usize) -> AttachmentRef {
    let raw = part.leaf_body().unwrap_or_default();
    let payload = decode_transfer_lossy(&part.transfer_encoding, raw).into_owned();
    AttachmentRef::new(
        attachment_name(part, index),
        part.content_type.media_type().to_string(),
        payload,
    )
}

/// Disposition `filename`, else content-type `name`, else `attachment_{index}`.
fn attachment_name(part: &MimePart, index: usize) -> String {
    part.disposition
        .filename
        .as_deref()
        .or_else(|| part.content_type.name())
        .map(|name| decode_encoded_words(name).trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| format!("attachment_{index}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::decode;

    fn resolve_raw(raw: &str) -> ResolvedBody {
        resolve(&decode(raw.as_bytes()).unwrap())
    }

    #[test]
    fn test_single_text_part() {
        let body = resolve_raw("Subject: x\n\nHello there\n");
        assert_eq!(body.text.as_deref(), Some("Hello there\n"));
        assert!(body.html.is_none());
        assert!(body.attachments.is_empty());
    }

    #[test]
    fn test_first_found_wins() {
        let body = resolve_raw(concat!(
            "Content-Type: multipart/mixed; boundary=b\n\n",
            "--b\nContent-Type: text/plain\n\nfirst text\n",
            "--b\nContent-Type: text/html\n\n<b>first html</b>\n",
            "--b\nContent-Type: text/plain\n\nsecond text\n",
            "--b\nContent-Type: text/html\n\n<b>second html</b>\n",
            "--b--\n",
        ));
        assert_eq!(body.text.as_deref(), Some("first text"));
        assert_eq!(body.html.as_deref(), Some("<b>first html</b>"));
        assert!(body.attachments.is_empty());
    }

    #[test]
    fn test_transfer_and_charset_decoding() {
        let body = resolve_raw(concat!(
            "Content-Type: multipart/alternative; boundary=b\n\n",
            "--b\nContent-Type: text/plain; charset=iso-8859-1\n",
            "Content-Transfer-Encoding: quoted-printable\n\ncaf=E9\n",
            "--b\nContent-Type: text/html; charset=utf-8\n",
            "Content-Transfer-Encoding: base64\n\nPHA+Y2Fmw6k8L3A+\n",
            "--b--\n",
        ));
        assert_eq!(body.text.as_deref(), Some("café"));
        assert_eq!(body.html.as_deref(), Some("<p>café</p>"));
    }

    #[test]
    fn test_attachment_filename_order() {
        let body = resolve_raw(concat!(
            "Content-Type: multipart/mixed; boundary=b\n\n",
            "--b\nContent-Type: application/pdf; name=from-type.pdf\n",
            "Content-Disposition: attachment; filename=from-disposition.pdf\n\nA\n",
            "--b\nContent-Type: application/pdf; name=\"=?UTF-8?Q?r=C3=A9sum=C3=A9.pdf?=\"\n\nB\n",
            "--b\nContent-Type: image/png\n\nC\n",
            "--b--\n",
        ));
        let names: Vec<&str> = body.attachments.iter().map(|a| a.file_name.as_str()).collect();
        assert_eq!(names, vec!["from-disposition.pdf", "résumé.pdf", "attachment_2"]);
        assert_eq!(body.attachments[2].content_type, "image/png");
    }

    #[test]
    fn test_text_with_attachment_disposition_is_attachment() {
        let body = resolve_raw(concat!(
            "Content-Type: multipart/mixed; boundary=b\n\n",
            "--b\nContent-Type: text/plain\n\nbody\n",
            "--b\nContent-Type: text/plain\nContent-Disposition: attachment; filename=notes.txt\n\nnotes\n",
            "--b--\n",
        ));
        assert_eq!(body.text.as_deref(), Some("body"));
        assert_eq!(body.attachments.len(), 1);
        assert_eq!(body.attachments[0].file_name, "notes.txt");
        assert_eq!(body.attachments[0].payload, b"notes");
    }

    #[test]
    fn test_base64_attachment_size() {
        let body = resolve_raw(concat!(
            "Content-Type: multipart/mixed; boundary=b\n\n",
            "--b\nContent-Type: application/octet-stream\n",
            "Content-Transfer-Encoding: base64\n\nAAECAwQF\nBgcICQ==\n",
            "--b--\n",
        ));
        assert_eq!(body.attachments[0].size_in_bytes, 10);
        assert_eq!(body.attachments[0].payload, (0u8..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_chunked_base64_attachment_size() {
        let body = resolve_raw(concat!(
            "Content-Type: multipart/mixed; boundary=b\n\n",
            "--b\nContent-Type: application/octet-stream\n",
            "Content-Transfer-Encoding: base64\n\nQQ==\nQg==\n",
            "--b--\n",
        ));
        assert_eq!(body.attachments[0].payload, b"AB");
        assert_eq!(body.attachments[0].size_in_bytes, 2);
    }

    #[test]
    fn test_corrupt_base64_attachment_keeps_raw_bytes() {
        let body = resolve_raw(concat!(
            "Content-Type: multipart/mixed; boundary=b\n\n",
            "--b\nContent-Type: application/zip\n",
            "Content-Transfer-Encoding: base64\n\n!!not base64!!\n",
            "--b--\n",
        ));
        assert_eq!(body.attachments[0].payload, b"!!not base64!!");
    }

    #[test]
    fn test_missing_boundary_yields_single_body() {
        let body = resolve_raw("Content-Type: multipart/mixed\n\n--x\n\nhello\n--x--\n");
        assert_eq!(body.text.as_deref(), Some("--x\n\nhello\n--x--\n"));
        assert!(body.attachments.is_empty());
    }

    #[test]
    fn test_sole_non_text_content_is_attachment() {
        let body = resolve_raw(concat!(
            "Content-Type: application/pdf; name=doc.pdf\n",
            "Content-Transfer-Encoding: base64\n\nJVBERg==\n",
        ));
        assert!(body.text.is_none());
        assert_eq!(body.attachments.len(), 1);
        assert_eq!(body.attachments[0].payload, b"%PDF");
    }

    #[test]
    fn test_inline_image_in_related_is_attachment() {
        let body = resolve_raw(concat!(
            "Content-Type: multipart/related; boundary=b\n\n",
            "--b\nContent-Type: text/html\n\n<img src=cid:logo>\n",
            "--b\nContent-Type: image/gif\nContent-Disposition: inline\n\nGIF89a\n",
            "--b--\n",
        ));
        assert!(body.html.is_some());
        assert_eq!(body.attachments.len(), 1);
        assert_eq!(body.attachments[0].content_type, "image/gif");
    }

    #[test]
    fn test_classify_sole_calendar() {
        let root = decode(b"Content-Type: text/calendar\n\nBEGIN:VCALENDAR\n").unwrap();
        assert_eq!(classify(&root, true), LeafRole::Text);
        assert_eq!(classify(&root, false), LeafRole::Attachment);
    }
}
