/*
 * SPDX-FileCopyrightText: 2026 Gramlink Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Serde models for the Bot API subset the relay uses, plus conversion into
//! the core event types. Entity offsets are UTF-16 code units on the wire;
//! the conversion handles that here so the core never sees it.

use gramlink_core::types::{
    ChatKind, ChatRef, IncomingMessage, MessageContent, ReplyRef, SenderRef,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    pub edited_message: Option<Message>,
    pub callback_query: Option<CallbackQuery>,
    pub message_reaction: Option<MessageReactionUpdated>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    pub is_bot: bool,
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

impl User {
    pub fn display_name(&self) -> String {
        match &self.last_name {
            Some(last) => format!("{} {}", self.first_name, last),
            None => self.first_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: Option<String>,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageEntity {
    #[serde(rename = "type")]
    pub kind: String,
    pub offset: usize,
    pub length: usize,
    pub user: Option<User>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Sticker {
    pub file_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PhotoSize {
    pub file_id: String,
    pub width: i64,
    pub height: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Video {
    pub file_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Document {
    pub file_id: String,
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Audio {
    pub file_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Voice {
    pub file_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Animation {
    pub file_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub from: Option<User>,
    pub chat: Chat,
    pub date: i64,
    pub text: Option<String>,
    pub caption: Option<String>,
    pub entities: Option<Vec<MessageEntity>>,
    pub caption_entities: Option<Vec<MessageEntity>>,
    pub reply_to_message: Option<Box<Message>>,
    pub sticker: Option<Sticker>,
    pub photo: Option<Vec<PhotoSize>>,
    pub video: Option<Video>,
    pub document: Option<Document>,
    pub audio: Option<Audio>,
    pub voice: Option<Voice>,
    pub animation: Option<Animation>,
    pub location: Option<serde_json::Value>,
    pub contact: Option<serde_json::Value>,
    pub poll: Option<serde_json::Value>,
    pub venue: Option<serde_json::Value>,
    pub dice: Option<serde_json::Value>,
    pub video_note: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    pub message: Option<Message>,
    pub data: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReactionType {
    #[serde(rename = "type")]
    pub kind: String,
    pub emoji: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageReactionUpdated {
    pub chat: Chat,
    pub message_id: i64,
    pub user: Option<User>,
    pub actor_chat: Option<Chat>,
    pub date: i64,
    pub old_reaction: Vec<ReactionType>,
    pub new_reaction: Vec<ReactionType>,
}

/// copyMessage returns only the new message id.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageIdResult {
    pub message_id: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct InlineKeyboardMarkup {
    pub inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InlineKeyboardButton {
    pub text: String,
    pub callback_data: String,
}

fn chat_kind(kind: &str) -> ChatKind {
    match kind {
        "private" => ChatKind::Private,
        "group" => ChatKind::Group,
        "supergroup" => ChatKind::Supergroup,
        _ => ChatKind::Channel,
    }
}

pub fn chat_ref(chat: &Chat) -> ChatRef {
    ChatRef {
        id: chat.id,
        kind: chat_kind(&chat.kind),
        title: chat.title.clone(),
    }
}

/// Slice `text` by UTF-16 code-unit offsets, the unit Telegram entities use.
fn utf16_slice(text: &str, offset: usize, length: usize) -> Option<String> {
    let units: Vec<u16> = text.encode_utf16().collect();
    let end = offset.checked_add(length)?;
    if end > units.len() {
        return None;
    }
    String::from_utf16(&units[offset..end]).ok()
}

impl Message {
    /// Classify the message content by media kind. Returns `None` for pure
    /// service messages (joins, pins, ...), which the relay never forwards.
    pub fn content(&self) -> Option<MessageContent> {
        if let Some(text) = &self.text {
            return Some(MessageContent::Text { text: text.clone() });
        }
        if let Some(sticker) = &self.sticker {
            return Some(MessageContent::Sticker {
                file_id: sticker.file_id.clone(),
            });
        }
        if let Some(sizes) = &self.photo {
            // sizes are ordered smallest to largest
            let best = sizes.last()?;
            return Some(MessageContent::Photo {
                file_id: best.file_id.clone(),
                caption: self.caption.clone(),
            });
        }
        if let Some(video) = &self.video {
            return Some(MessageContent::Video {
                file_id: video.file_id.clone(),
                caption: self.caption.clone(),
            });
        }
        if let Some(document) = &self.document {
            return Some(MessageContent::Document {
                file_id: document.file_id.clone(),
                caption: self.caption.clone(),
            });
        }
        if let Some(audio) = &self.audio {
            return Some(MessageContent::Audio {
                file_id: audio.file_id.clone(),
                caption: self.caption.clone(),
            });
        }
        if let Some(voice) = &self.voice {
            return Some(MessageContent::Voice {
                file_id: voice.file_id.clone(),
                caption: self.caption.clone(),
            });
        }
        if let Some(animation) = &self.animation {
            return Some(MessageContent::Animation {
                file_id: animation.file_id.clone(),
                caption: self.caption.clone(),
            });
        }
        if self.location.is_some()
            || self.contact.is_some()
            || self.poll.is_some()
            || self.venue.is_some()
            || self.dice.is_some()
            || self.video_note.is_some()
        {
            return Some(MessageContent::Other);
        }
        None
    }

    /// Lowercased handles of every mention entity, without the `@`.
    pub fn mention_handles(&self) -> Vec<String> {
        let mut out = Vec::new();
        let sources = [
            (self.text.as_deref(), self.entities.as_deref()),
            (self.caption.as_deref(), self.caption_entities.as_deref()),
        ];
        for (body, entities) in sources {
            let (Some(body), Some(entities)) = (body, entities) else {
                continue;
            };
            for entity in entities {
                match entity.kind.as_str() {
                    "mention" => {
                        if let Some(m) = utf16_slice(body, entity.offset, entity.length) {
                            out.push(m.trim_start_matches('@').to_lowercase());
                        }
                    }
                    "text_mention" => {
                        if let Some(u) = entity.user.as_ref().and_then(|u| u.username.as_ref()) {
                            out.push(u.to_lowercase());
                        }
                    }
                    _ => {}
                }
            }
        }
        out
    }

    pub fn to_incoming(&self) -> Option<IncomingMessage> {
        let from = self.from.as_ref()?;
        let content = self.content()?;
        Some(IncomingMessage {
            chat: chat_ref(&self.chat),
            message_id: self.message_id,
            sender: SenderRef {
                id: from.id,
                username: from.username.clone(),
                display_name: from.display_name(),
            },
            content,
            reply_to: self.reply_to_message.as_ref().map(|r| ReplyRef {
                message_id: r.message_id,
                sender_id: r.from.as_ref().map(|u| u.id),
            }),
            mentions: self.mention_handles(),
        })
    }
}

impl MessageReactionUpdated {
    /// Emoji reactions of the new set; custom and paid reactions have no
    /// portable representation and are dropped.
    pub fn new_emojis(&self) -> Vec<String> {
        self.new_reaction
            .iter()
            .filter(|r| r.kind == "emoji")
            .filter_map(|r| r.emoji.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_update_round_trips() {
        let raw = r#"{
            "update_id": 10,
            "message": {
                "message_id": 5,
                "from": {"id": 42, "is_bot": false, "first_name": "Ada", "username": "ada"},
                "chat": {"id": 42, "type": "private", "first_name": "Ada"},
                "date": 1700000000,
                "text": "hello @relay_bot",
                "entities": [{"type": "mention", "offset": 6, "length": 10}]
            }
        }"#;
        let update: Update = serde_json::from_str(raw).unwrap();
        let msg = update.message.unwrap();
        let incoming = msg.to_incoming().unwrap();
        assert_eq!(incoming.chat.kind, ChatKind::Private);
        assert_eq!(incoming.content.text(), Some("hello @relay_bot"));
        assert_eq!(incoming.mentions, vec!["relay_bot".to_string()]);
    }

    #[test]
    fn media_message_maps_to_its_kind() {
        let raw = r#"{
            "message_id": 6,
            "from": {"id": 42, "is_bot": false, "first_name": "Ada"},
            "chat": {"id": -100, "type": "supergroup", "title": "g"},
            "date": 1700000000,
            "caption": "pic",
            "photo": [
                {"file_id": "small", "width": 90, "height": 90},
                {"file_id": "large", "width": 800, "height": 800}
            ]
        }"#;
        let msg: Message = serde_json::from_str(raw).unwrap();
        match msg.content().unwrap() {
            MessageContent::Photo { file_id, caption } => {
                assert_eq!(file_id, "large");
                assert_eq!(caption.as_deref(), Some("pic"));
            }
            other => panic!("wrong kind: {other:?}"),
        }
    }

    #[test]
    fn service_message_has_no_content() {
        let raw = r#"{
            "message_id": 7,
            "from": {"id": 42, "is_bot": false, "first_name": "Ada"},
            "chat": {"id": -100, "type": "supergroup", "title": "g"},
            "date": 1700000000
        }"#;
        let msg: Message = serde_json::from_str(raw).unwrap();
        assert!(msg.content().is_none());
        assert!(msg.to_incoming().is_none());
    }

    #[test]
    fn mention_offsets_are_utf16() {
        // "héllo" plus an emoji before the mention: offsets count UTF-16 units
        let body = "🦀 hi @relay_bot";
        let msg = Message {
            message_id: 1,
            from: None,
            chat: Chat {
                id: 1,
                kind: "private".into(),
                title: None,
                username: None,
            },
            date: 0,
            text: Some(body.to_string()),
            caption: None,
            entities: Some(vec![MessageEntity {
                kind: "mention".into(),
                offset: 6,
                length: 10,
                user: None,
            }]),
            caption_entities: None,
            reply_to_message: None,
            sticker: None,
            photo: None,
            video: None,
            document: None,
            audio: None,
            voice: None,
            animation: None,
            location: None,
            contact: None,
            poll: None,
            venue: None,
            dice: None,
            video_note: None,
        };
        assert_eq!(msg.mention_handles(), vec!["relay_bot".to_string()]);
    }

    #[test]
    fn reaction_update_extracts_emoji_set() {
        let raw = r#"{
            "chat": {"id": -100, "type": "supergroup", "title": "g"},
            "message_id": 9,
            "user": {"id": 42, "is_bot": false, "first_name": "Ada"},
            "date": 1700000000,
            "old_reaction": [],
            "new_reaction": [
                {"type": "emoji", "emoji": "👍"},
                {"type": "custom_emoji", "custom_emoji_id": "555"}
            ]
        }"#;
        let ev: MessageReactionUpdated = serde_json::from_str(raw).unwrap();
        assert_eq!(ev.new_emojis(), vec!["👍".to_string()]);
    }
}
