/*
 * SPDX-FileCopyrightText: 2026 Gramlink Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

pub type ChatId = i64;
pub type MessageId = i64;
pub type UserId = i64;

/// A (chat, message) pair, the unit every mapping table speaks in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

impl MessageRef {
    pub fn new(chat_id: ChatId, message_id: MessageId) -> Self {
        Self {
            chat_id,
            message_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatKind {
    Private,
    Group,
    Supergroup,
    Channel,
}

impl ChatKind {
    pub fn is_group(self) -> bool {
        matches!(self, ChatKind::Group | ChatKind::Supergroup)
    }
}

#[derive(Debug, Clone)]
pub struct ChatRef {
    pub id: ChatId,
    pub kind: ChatKind,
    pub title: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SenderRef {
    pub id: UserId,
    pub username: Option<String>,
    pub display_name: String,
}

impl SenderRef {
    /// Attribution snapshot stored alongside forwarded messages.
    pub fn handle(&self) -> String {
        match &self.username {
            Some(u) => format!("@{u}"),
            None => self.display_name.clone(),
        }
    }
}

/// Inbound content, tagged by media kind. Platform file references are kept
/// opaque; `Other` covers every kind the relay does not model and falls back
/// to a generic platform copy of the source message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageContent {
    Text {
        text: String,
    },
    Sticker {
        file_id: String,
    },
    Photo {
        file_id: String,
        caption: Option<String>,
    },
    Video {
        file_id: String,
        caption: Option<String>,
    },
    Document {
        file_id: String,
        caption: Option<String>,
    },
    Audio {
        file_id: String,
        caption: Option<String>,
    },
    Voice {
        file_id: String,
        caption: Option<String>,
    },
    Animation {
        file_id: String,
        caption: Option<String>,
    },
    Other,
}

impl MessageContent {
    pub fn kind(&self) -> &'static str {
        match self {
            MessageContent::Text { .. } => "text",
            MessageContent::Sticker { .. } => "sticker",
            MessageContent::Photo { .. } => "photo",
            MessageContent::Video { .. } => "video",
            MessageContent::Document { .. } => "document",
            MessageContent::Audio { .. } => "audio",
            MessageContent::Voice { .. } => "voice",
            MessageContent::Animation { .. } => "animation",
            MessageContent::Other => "other",
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            MessageContent::Text { text } => Some(text),
            _ => None,
        }
    }

    pub fn caption(&self) -> Option<&str> {
        match self {
            MessageContent::Photo { caption, .. }
            | MessageContent::Video { caption, .. }
            | MessageContent::Document { caption, .. }
            | MessageContent::Audio { caption, .. }
            | MessageContent::Voice { caption, .. }
            | MessageContent::Animation { caption, .. } => caption.as_deref(),
            _ => None,
        }
    }

    /// Human-readable one-liner used in the selection prompt. Text previews
    /// are truncated at 100 characters.
    pub fn preview(&self) -> String {
        match self {
            MessageContent::Text { text } => truncate_preview(text),
            MessageContent::Other => "[attachment]".to_string(),
            other => match other.caption() {
                Some(c) if !c.is_empty() => {
                    format!("[{}] {}", other.kind(), truncate_preview(c))
                }
                _ => format!("[{}]", other.kind()),
            },
        }
    }
}

const PREVIEW_MAX_CHARS: usize = 100;

fn truncate_preview(text: &str) -> String {
    if text.chars().count() <= PREVIEW_MAX_CHARS {
        return text.to_string();
    }
    let mut out: String = text.chars().take(PREVIEW_MAX_CHARS).collect();
    out.push('…');
    out
}

#[derive(Debug, Clone)]
pub struct ReplyRef {
    pub message_id: MessageId,
    pub sender_id: Option<UserId>,
}

/// A normalized inbound message, private or group. The platform layer fills
/// `mentions` with the lowercased handles of every mention entity so the core
/// never parses entity offsets itself.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub chat: ChatRef,
    pub message_id: MessageId,
    pub sender: SenderRef,
    pub content: MessageContent,
    pub reply_to: Option<ReplyRef>,
    pub mentions: Vec<String>,
}

impl IncomingMessage {
    pub fn message_ref(&self) -> MessageRef {
        MessageRef::new(self.chat.id, self.message_id)
    }
}

/// A reaction change; `reactions` is the full new set on the message, so an
/// empty vec means the reactions were cleared.
#[derive(Debug, Clone)]
pub struct ReactionEvent {
    pub chat: ChatRef,
    pub message_id: MessageId,
    pub actor_id: Option<UserId>,
    pub reactions: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CallbackEvent {
    pub id: String,
    pub from_id: UserId,
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub data: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_truncates_long_text() {
        let long: String = "x".repeat(101);
        let p = MessageContent::Text { text: long }.preview();
        assert_eq!(p.chars().count(), 101);
        assert!(p.ends_with('…'));

        let exact: String = "y".repeat(100);
        let p = MessageContent::Text {
            text: exact.clone(),
        }
        .preview();
        assert_eq!(p, exact);
    }

    #[test]
    fn preview_labels_media_kinds() {
        let p = MessageContent::Photo {
            file_id: "f".into(),
            caption: Some("holiday".into()),
        }
        .preview();
        assert_eq!(p, "[photo] holiday");
        assert_eq!(MessageContent::Other.preview(), "[attachment]");
        assert_eq!(
            MessageContent::Sticker { file_id: "s".into() }.preview(),
            "[sticker]"
        );
    }

    #[test]
    fn sender_handle_prefers_username() {
        let s = SenderRef {
            id: 1,
            username: Some("alice".into()),
            display_name: "Alice".into(),
        };
        assert_eq!(s.handle(), "@alice");
        let s = SenderRef {
            id: 2,
            username: None,
            display_name: "Bob".into(),
        };
        assert_eq!(s.handle(), "Bob");
    }
}
