//! Attachments extracted from a message.

/// A decoded attachment.
///
/// The payload is never serialized alongside the metadata.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AttachmentRef {
    /// From the disposition `filename`, the content-type `name`, or generated.
    pub file_name: String,

    /// MIME content type (e.g. `"application/octet-stream"`).
    pub content_type: String,

    /// Length of the decoded payload.
    pub size_in_bytes: u64,

    #[serde(skip)]
    pub payload: Vec<u8>,
}

impl AttachmentRef {
    pub fn new(file_name: String, content_type: String, payload: Vec<u8>) -> Self {
        Self {
            file_name,
            content_type,
            size_in_bytes: payload.len() as u64,
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_tracks_payload() {
        let att = AttachmentRef::new("a.bin".into(), "application/octet-stream".into(), vec![0; 173]);
        assert_eq!(att.size_in_bytes, 173);
    }

    #[test]
    fn test_payload_not_serialized() {
        let att = AttachmentRef::new("a.txt".into(), "text/plain".into(), b"secret".to_vec());
        let json = serde_json::to_value(&att).unwrap();
        assert_eq!(json["file_name"], "a.txt");
        assert_eq!(json["size_in_bytes"], 6);
        assert!(json.get("payload").is_none());
    }
}
