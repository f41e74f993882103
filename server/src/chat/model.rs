//! Message records and the typed payloads they are built from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MessagingError;

/// Delivery lifecycle. Declaration order is the lifecycle order, so the
/// derived `Ord` is what monotonicity checks compare against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sent,
    Delivered,
    Read,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Read => "read",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sent" => Some(Self::Sent),
            "delivered" => Some(Self::Delivered),
            "read" => Some(Self::Read),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
    Audio,
    Video,
    File,
    Sticker,
    Emoji,
    Location,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Audio => "audio",
            Self::Video => "video",
            Self::File => "file",
            Self::Sticker => "sticker",
            Self::Emoji => "emoji",
            Self::Location => "location",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(Self::Text),
            "image" => Some(Self::Image),
            "audio" => Some(Self::Audio),
            "video" => Some(Self::Video),
            "file" => Some(Self::File),
            "sticker" => Some(Self::Sticker),
            "emoji" => Some(Self::Emoji),
            "location" => Some(Self::Location),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub filename: String,
    pub url: String,
    pub size: u64,
    pub media_type: String,
}

/// A persisted direct message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub from_user_id: String,
    pub to_user_id: String,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub status: MessageStatus,
    pub read: bool,
    pub read_at: Option<DateTime<Utc>>,
}

impl Message {
    /// Move the status forward. Returns false (and changes nothing) when
    /// `next` is not strictly later than the current status.
    pub fn advance_to(&mut self, next: MessageStatus, at: DateTime<Utc>) -> bool {
        if next <= self.status {
            return false;
        }
        self.status = next;
        if next == MessageStatus::Read {
            self.read = true;
            if self.read_at.is_none() {
                self.read_at = Some(at);
            }
        }
        true
    }

    pub fn is_between(&self, a: &str, b: &str) -> bool {
        (self.from_user_id == a && self.to_user_id == b)
            || (self.from_user_id == b && self.to_user_id == a)
    }

    pub fn involves(&self, user_id: &str) -> bool {
        self.from_user_id == user_id || self.to_user_id == user_id
    }

    pub fn is_unread_for(&self, user_id: &str) -> bool {
        self.to_user_id == user_id && !self.read
    }
}

/// What a sender may submit. Each variant carries only its own fields.
#[derive(Debug, Clone, PartialEq)]
pub enum MessagePayload {
    Text { content: String },
    Image { caption: String, attachments: Vec<Attachment> },
    Audio { caption: String, attachments: Vec<Attachment> },
    Video { caption: String, attachments: Vec<Attachment> },
    File { caption: String, attachments: Vec<Attachment> },
    Sticker { sticker_id: String },
    Emoji { emoji: String },
    Location { latitude: f64, longitude: f64, label: Option<String> },
}

/// Record fields derived from a validated payload.
#[derive(Debug, Clone, PartialEq)]
pub struct PayloadParts {
    pub kind: MessageKind,
    pub content: String,
    pub attachments: Vec<Attachment>,
    pub metadata: Option<serde_json::Value>,
}

impl MessagePayload {
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Text { .. } => MessageKind::Text,
            Self::Image { .. } => MessageKind::Image,
            Self::Audio { .. } => MessageKind::Audio,
            Self::Video { .. } => MessageKind::Video,
            Self::File { .. } => MessageKind::File,
            Self::Sticker { .. } => MessageKind::Sticker,
            Self::Emoji { .. } => MessageKind::Emoji,
            Self::Location { .. } => MessageKind::Location,
        }
    }

    pub fn validate(&self) -> Result<(), MessagingError> {
        let invalid = |reason: &str| Err(MessagingError::InvalidMessage(reason.to_string()));
        match self {
            Self::Text { content } if content.trim().is_empty() => {
                invalid("text message content must not be empty")
            }
            Self::Emoji { emoji } if emoji.trim().is_empty() => invalid("emoji must not be empty"),
            Self::Image { attachments, .. }
            | Self::Audio { attachments, .. }
            | Self::Video { attachments, .. }
            | Self::File { attachments, .. }
                if attachments.is_empty() =>
            {
                invalid("media message requires at least one attachment")
            }
            Self::Sticker { sticker_id } if sticker_id.trim().is_empty() => {
                invalid("sticker message requires a sticker id")
            }
            Self::Location {
                latitude,
                longitude,
                ..
            } if !(-90.0..=90.0).contains(latitude) || !(-180.0..=180.0).contains(longitude) => {
                invalid("location coordinates out of range")
            }
            _ => Ok(()),
        }
    }

    pub fn into_parts(self) -> PayloadParts {
        let kind = self.kind();
        let (content, attachments, metadata) = match self {
            Self::Text { content } | Self::Emoji { emoji: content } => {
                (content.trim().to_string(), Vec::new(), None)
            }
            Self::Image { caption, attachments }
            | Self::Audio { caption, attachments }
            | Self::Video { caption, attachments }
            | Self::File { caption, attachments } => (caption.trim().to_string(), attachments, None),
            Self::Sticker { sticker_id } => (
                String::new(),
                Vec::new(),
                Some(serde_json::json!({ "stickerId": sticker_id })),
            ),
            Self::Location {
                latitude,
                longitude,
                label,
            } => (
                label.clone().unwrap_or_default(),
                Vec::new(),
                Some(serde_json::json!({
                    "latitude": latitude,
                    "longitude": longitude,
                    "label": label,
                })),
            ),
        };
        PayloadParts {
            kind,
            content,
            attachments,
            metadata,
        }
    }
}

/// A payload plus whatever free-form metadata the client attached to it.
/// Keys the payload itself owns (`stickerId`, coordinates) win over
/// client-supplied ones.
#[derive(Debug, Clone, PartialEq)]
pub struct Draft {
    pub payload: MessagePayload,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl From<MessagePayload> for Draft {
    fn from(payload: MessagePayload) -> Self {
        Self {
            payload,
            metadata: serde_json::Map::new(),
        }
    }
}

impl Draft {
    /// Build a draft from the flat wire fields (`type`, `content`,
    /// `attachments`, `metadata`) and validate it. `metadata`, when
    /// present, must be a JSON object.
    pub fn from_wire(
        kind: MessageKind,
        content: String,
        attachments: Vec<Attachment>,
        metadata: Option<serde_json::Value>,
    ) -> Result<Self, MessagingError> {
        let metadata = match metadata {
            None | Some(serde_json::Value::Null) => serde_json::Map::new(),
            Some(serde_json::Value::Object(map)) => map,
            Some(_) => {
                return Err(MessagingError::InvalidMessage(
                    "metadata must be a JSON object".to_string(),
                ))
            }
        };
        let meta_str = |key: &str| {
            metadata
                .get(key)
                .and_then(|v| v.as_str())
                .map(str::to_string)
        };
        let meta_f64 = |key: &str| metadata.get(key).and_then(|v| v.as_f64());

        let payload = match kind {
            MessageKind::Text => MessagePayload::Text { content },
            MessageKind::Image => MessagePayload::Image { caption: content, attachments },
            MessageKind::Audio => MessagePayload::Audio { caption: content, attachments },
            MessageKind::Video => MessagePayload::Video { caption: content, attachments },
            MessageKind::File => MessagePayload::File { caption: content, attachments },
            MessageKind::Sticker => MessagePayload::Sticker {
                sticker_id: meta_str("stickerId").unwrap_or_default(),
            },
            MessageKind::Emoji => MessagePayload::Emoji { emoji: content },
            MessageKind::Location => {
                let (latitude, longitude) = match (meta_f64("latitude"), meta_f64("longitude")) {
                    (Some(lat), Some(lon)) => (lat, lon),
                    _ => {
                        return Err(MessagingError::InvalidMessage(
                            "location requires latitude and longitude".to_string(),
                        ))
                    }
                };
                MessagePayload::Location {
                    latitude,
                    longitude,
                    label: meta_str("label").or_else(|| {
                        let c = content.trim();
                        (!c.is_empty()).then(|| c.to_string())
                    }),
                }
            }
        };
        payload.validate()?;
        Ok(Self { payload, metadata })
    }

    pub fn validate(&self) -> Result<(), MessagingError> {
        self.payload.validate()
    }

    /// Record fields with the client's metadata merged under the
    /// payload's own keys.
    pub fn into_parts(self) -> PayloadParts {
        let mut parts = self.payload.into_parts();
        let mut merged = self.metadata;
        if let Some(serde_json::Value::Object(own)) = parts.metadata.take() {
            merged.extend(own);
        }
        parts.metadata = (!merged.is_empty()).then_some(serde_json::Value::Object(merged));
        parts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(status: MessageStatus) -> Message {
        Message {
            id: "m1".to_string(),
            from_user_id: "a".to_string(),
            to_user_id: "b".to_string(),
            content: "hi".to_string(),
            kind: MessageKind::Text,
            attachments: vec![],
            metadata: None,
            created_at: Utc::now(),
            status,
            read: status == MessageStatus::Read,
            read_at: None,
        }
    }

    #[test]
    fn test_status_never_regresses() {
        let mut msg = sample(MessageStatus::Delivered);
        assert!(!msg.advance_to(MessageStatus::Sent, Utc::now()));
        assert!(!msg.advance_to(MessageStatus::Delivered, Utc::now()));
        assert_eq!(msg.status, MessageStatus::Delivered);

        assert!(msg.advance_to(MessageStatus::Read, Utc::now()));
        assert!(!msg.advance_to(MessageStatus::Delivered, Utc::now()));
        assert_eq!(msg.status, MessageStatus::Read);
        assert!(msg.read);
    }

    #[test]
    fn test_read_at_set_once() {
        let mut msg = sample(MessageStatus::Sent);
        let first = Utc::now();
        msg.advance_to(MessageStatus::Read, first);
        let later = first + chrono::Duration::seconds(5);
        msg.advance_to(MessageStatus::Read, later);
        assert_eq!(msg.read_at, Some(first));
    }

    #[test]
    fn test_empty_text_rejected() {
        let err = MessagePayload::text("   ").validate().unwrap_err();
        assert!(matches!(err, MessagingError::InvalidMessage(_)));
    }

    #[test]
    fn test_media_requires_attachment() {
        let result = Draft::from_wire(MessageKind::Image, String::new(), vec![], None);
        assert!(matches!(result, Err(MessagingError::InvalidMessage(_))));

        let attachment = Attachment {
            filename: "cat.png".to_string(),
            url: "/uploads/cat.png".to_string(),
            size: 1024,
            media_type: "image/png".to_string(),
        };
        let payload =
            Draft::from_wire(MessageKind::Image, String::new(), vec![attachment], None)
                .unwrap();
        let parts = payload.into_parts();
        assert_eq!(parts.kind, MessageKind::Image);
        assert_eq!(parts.content, "");
        assert_eq!(parts.attachments.len(), 1);
    }

    #[test]
    fn test_location_from_metadata() {
        let meta = serde_json::json!({ "latitude": 43.24, "longitude": 76.89 });
        let payload =
            Draft::from_wire(MessageKind::Location, "Almaty".into(), vec![], Some(meta))
                .unwrap();
        let parts = payload.into_parts();
        assert_eq!(parts.content, "Almaty");
        assert_eq!(parts.metadata.unwrap()["latitude"], 43.24);

        let bad = serde_json::json!({ "latitude": 123.0, "longitude": 0.0 });
        let result = Draft::from_wire(MessageKind::Location, String::new(), vec![], Some(bad));
        assert!(result.is_err());
    }

    #[test]
    fn test_sticker_id_moves_to_metadata() {
        let meta = serde_json::json!({ "stickerId": "wave-01" });
        let parts = Draft::from_wire(MessageKind::Sticker, String::new(), vec![], Some(meta))
            .unwrap()
            .into_parts();
        assert_eq!(parts.content, "");
        assert_eq!(parts.metadata.unwrap()["stickerId"], "wave-01");
    }

    #[test]
    fn test_client_metadata_is_kept() {
        let attachment = Attachment {
            filename: "clip.mp4".to_string(),
            url: "/uploads/clip.mp4".to_string(),
            size: 4096,
            media_type: "video/mp4".to_string(),
        };
        let meta = serde_json::json!({ "durationMs": 5200, "width": 640 });
        let parts = Draft::from_wire(MessageKind::Video, String::new(), vec![attachment], Some(meta))
            .unwrap()
            .into_parts();
        let metadata = parts.metadata.unwrap();
        assert_eq!(metadata["durationMs"], 5200);
        assert_eq!(metadata["width"], 640);

        let meta = serde_json::json!({ "stickerId": "wave-01", "pack": "animals" });
        let metadata = Draft::from_wire(MessageKind::Sticker, String::new(), vec![], Some(meta))
            .unwrap()
            .into_parts()
            .metadata
            .unwrap();
        assert_eq!(metadata["stickerId"], "wave-01");
        assert_eq!(metadata["pack"], "animals");

        let parts = Draft::from(MessagePayload::text("plain")).into_parts();
        assert!(parts.metadata.is_none());
    }

    #[test]
    fn test_non_object_metadata_rejected() {
        let result = Draft::from_wire(
            MessageKind::Text,
            "hi".to_string(),
            vec![],
            Some(serde_json::json!("loose string")),
        );
        assert!(matches!(result, Err(MessagingError::InvalidMessage(_))));
    }

    #[test]
    fn test_wire_shape_is_camel_case() {
        let json = serde_json::to_value(sample(MessageStatus::Sent)).unwrap();
        assert_eq!(json["fromUserId"], "a");
        assert_eq!(json["type"], "text");
        assert_eq!(json["status"], "sent");
        assert_eq!(json["read"], false);
        assert!(json["readAt"].is_null());
        assert!(json.get("metadata").is_none());
    }
}
