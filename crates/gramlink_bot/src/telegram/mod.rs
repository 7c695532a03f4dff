/*
 * SPDX-FileCopyrightText: 2026 Gramlink Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Bot API client over reqwest long polling. Implements the core
//! `ChatGateway` capability; each media kind maps onto its dedicated send
//! method, everything else goes through copyMessage.

pub mod wire;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use gramlink_core::gateway::{ChatGateway, ChatInfo, PromptKeyboard, SelfIdentity};
use gramlink_core::types::{ChatId, MessageContent, MessageId, MessageRef};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

pub struct TelegramApi {
    http: reqwest::Client,
    base: String,
    poll_timeout_secs: u64,
}

impl TelegramApi {
    pub fn new(http: reqwest::Client, token: &str, poll_timeout_secs: u64) -> Self {
        Self {
            http,
            base: format!("https://api.telegram.org/bot{token}"),
            poll_timeout_secs,
        }
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: Value) -> Result<T> {
        self.call_with_timeout(method, body, None).await
    }

    async fn call_with_timeout<T: DeserializeOwned>(
        &self,
        method: &str,
        body: Value,
        timeout: Option<Duration>,
    ) -> Result<T> {
        let mut req = self.http.post(format!("{}/{method}", self.base)).json(&body);
        if let Some(t) = timeout {
            req = req.timeout(t);
        }
        let resp = req
            .send()
            .await
            .with_context(|| format!("telegram {method}: request failed"))?;
        let api: wire::ApiResponse<T> = resp
            .json()
            .await
            .with_context(|| format!("telegram {method}: bad response body"))?;
        if !api.ok {
            return Err(anyhow!(
                "telegram {method}: {}",
                api.description.unwrap_or_else(|| "unknown error".to_string())
            ));
        }
        api.result
            .ok_or_else(|| anyhow!("telegram {method}: empty result"))
    }

    pub async fn get_me(&self) -> Result<wire::User> {
        self.call("getMe", json!({})).await
    }

    /// Long poll for updates. The per-request timeout exceeds the server-side
    /// poll window so the client never cuts a healthy poll short.
    pub async fn get_updates(&self, offset: i64) -> Result<Vec<wire::Update>> {
        let body = json!({
            "offset": offset,
            "timeout": self.poll_timeout_secs,
            "allowed_updates": ["message", "edited_message", "callback_query", "message_reaction"],
        });
        self.call_with_timeout(
            "getUpdates",
            body,
            Some(Duration::from_secs(self.poll_timeout_secs + 10)),
        )
        .await
    }

    async fn send_message_raw(
        &self,
        chat_id: ChatId,
        text: &str,
        reply_to: Option<MessageId>,
        markup: Option<wire::InlineKeyboardMarkup>,
    ) -> Result<wire::Message> {
        let mut body = json!({"chat_id": chat_id, "text": text});
        if let Some(id) = reply_to {
            body["reply_parameters"] =
                json!({"message_id": id, "allow_sending_without_reply": true});
        }
        if let Some(m) = markup {
            body["reply_markup"] = serde_json::to_value(m)?;
        }
        self.call("sendMessage", body).await
    }

    /// sendSticker, sendPhoto, ... all share the same shape apart from the
    /// method name and the file-reference field.
    async fn send_file_ref(
        &self,
        method: &str,
        field: &str,
        chat_id: ChatId,
        file_id: &str,
        caption: Option<&str>,
        reply_to: Option<MessageId>,
    ) -> Result<wire::Message> {
        let mut body = json!({"chat_id": chat_id});
        body[field] = json!(file_id);
        if let Some(c) = caption {
            body["caption"] = json!(c);
        }
        if let Some(id) = reply_to {
            body["reply_parameters"] =
                json!({"message_id": id, "allow_sending_without_reply": true});
        }
        self.call(method, body).await
    }

    fn keyboard_markup(keyboard: &PromptKeyboard) -> wire::InlineKeyboardMarkup {
        wire::InlineKeyboardMarkup {
            inline_keyboard: keyboard
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|b| wire::InlineKeyboardButton {
                            text: b.label.clone(),
                            callback_data: b.data.clone(),
                        })
                        .collect()
                })
                .collect(),
        }
    }
}

#[async_trait]
impl ChatGateway for TelegramApi {
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef> {
        let msg = self.send_message_raw(chat_id, text, None, None).await?;
        Ok(MessageRef::new(chat_id, msg.message_id))
    }

    async fn send_content(
        &self,
        chat_id: ChatId,
        content: &MessageContent,
        reply_to: Option<MessageId>,
    ) -> Result<MessageRef> {
        let msg = match content {
            MessageContent::Text { text } => {
                self.send_message_raw(chat_id, text, reply_to, None).await?
            }
            MessageContent::Sticker { file_id } => {
                self.send_file_ref("sendSticker", "sticker", chat_id, file_id, None, reply_to)
                    .await?
            }
            MessageContent::Photo { file_id, caption } => {
                self.send_file_ref(
                    "sendPhoto",
                    "photo",
                    chat_id,
                    file_id,
                    caption.as_deref(),
                    reply_to,
                )
                .await?
            }
            MessageContent::Video { file_id, caption } => {
                self.send_file_ref(
                    "sendVideo",
                    "video",
                    chat_id,
                    file_id,
                    caption.as_deref(),
                    reply_to,
                )
                .await?
            }
            MessageContent::Document { file_id, caption } => {
                self.send_file_ref(
                    "sendDocument",
                    "document",
                    chat_id,
                    file_id,
                    caption.as_deref(),
                    reply_to,
                )
                .await?
            }
            MessageContent::Audio { file_id, caption } => {
                self.send_file_ref(
                    "sendAudio",
                    "audio",
                    chat_id,
                    file_id,
                    caption.as_deref(),
                    reply_to,
                )
                .await?
            }
            MessageContent::Voice { file_id, caption } => {
                self.send_file_ref(
                    "sendVoice",
                    "voice",
                    chat_id,
                    file_id,
                    caption.as_deref(),
                    reply_to,
                )
                .await?
            }
            MessageContent::Animation { file_id, caption } => {
                self.send_file_ref(
                    "sendAnimation",
                    "animation",
                    chat_id,
                    file_id,
                    caption.as_deref(),
                    reply_to,
                )
                .await?
            }
            MessageContent::Other => {
                return Err(anyhow!("no dedicated send method for this content kind"));
            }
        };
        Ok(MessageRef::new(chat_id, msg.message_id))
    }

    async fn copy_message(
        &self,
        to_chat: ChatId,
        from: MessageRef,
        reply_to: Option<MessageId>,
    ) -> Result<MessageRef> {
        let mut body = json!({
            "chat_id": to_chat,
            "from_chat_id": from.chat_id,
            "message_id": from.message_id,
        });
        if let Some(id) = reply_to {
            body["reply_parameters"] =
                json!({"message_id": id, "allow_sending_without_reply": true});
        }
        let result: wire::MessageIdResult = self.call("copyMessage", body).await?;
        Ok(MessageRef::new(to_chat, result.message_id))
    }

    async fn forward_message(&self, to_chat: ChatId, from: MessageRef) -> Result<MessageRef> {
        let msg: wire::Message = self
            .call(
                "forwardMessage",
                json!({
                    "chat_id": to_chat,
                    "from_chat_id": from.chat_id,
                    "message_id": from.message_id,
                }),
            )
            .await?;
        Ok(MessageRef::new(to_chat, msg.message_id))
    }

    async fn edit_message_text(&self, target: MessageRef, text: &str) -> Result<()> {
        let _: Value = self
            .call(
                "editMessageText",
                json!({
                    "chat_id": target.chat_id,
                    "message_id": target.message_id,
                    "text": text,
                }),
            )
            .await?;
        Ok(())
    }

    async fn set_reaction(&self, target: MessageRef, reactions: &[String]) -> Result<()> {
        let reaction: Vec<Value> = reactions
            .iter()
            .map(|e| json!({"type": "emoji", "emoji": e}))
            .collect();
        let _: bool = self
            .call(
                "setMessageReaction",
                json!({
                    "chat_id": target.chat_id,
                    "message_id": target.message_id,
                    "reaction": reaction,
                }),
            )
            .await?;
        Ok(())
    }

    async fn get_chat(&self, chat_id: ChatId) -> Result<ChatInfo> {
        let chat: wire::Chat = self.call("getChat", json!({"chat_id": chat_id})).await?;
        let member_count: Option<i64> = match self
            .call("getChatMemberCount", json!({"chat_id": chat_id}))
            .await
        {
            Ok(n) => Some(n),
            Err(e) => {
                debug!("getChatMemberCount for {chat_id} failed: {e:#}");
                None
            }
        };
        Ok(ChatInfo {
            id: chat.id,
            kind: chat.kind,
            title: chat.title,
            username: chat.username,
            member_count,
        })
    }

    async fn self_identity(&self) -> Result<SelfIdentity> {
        let me = self.get_me().await?;
        Ok(SelfIdentity {
            id: me.id,
            username: me.username.unwrap_or_default(),
        })
    }

    async fn send_prompt(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: &PromptKeyboard,
    ) -> Result<MessageRef> {
        let msg = self
            .send_message_raw(chat_id, text, None, Some(Self::keyboard_markup(keyboard)))
            .await?;
        Ok(MessageRef::new(chat_id, msg.message_id))
    }

    async fn edit_prompt(
        &self,
        target: MessageRef,
        text: &str,
        keyboard: &PromptKeyboard,
    ) -> Result<()> {
        let _: Value = self
            .call(
                "editMessageText",
                json!({
                    "chat_id": target.chat_id,
                    "message_id": target.message_id,
                    "text": text,
                    "reply_markup": Self::keyboard_markup(keyboard),
                }),
            )
            .await?;
        Ok(())
    }

    async fn ack_callback(&self, callback_id: &str) -> Result<()> {
        let _: bool = self
            .call(
                "answerCallbackQuery",
                json!({"callback_query_id": callback_id}),
            )
            .await?;
        Ok(())
    }
}
