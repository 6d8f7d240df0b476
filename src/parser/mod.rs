//! Email parsing: header decoding, content types, transfer codecs and the MIME part tree.

pub mod content_type;
pub mod encoding;
pub mod header;
pub mod mime;

pub use mime::{decode, MimeDecoder, MimePart, PartBody};
