/*
 * SPDX-FileCopyrightText: 2026 Gramlink Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Capability interface to the chat platform. The core never touches wire
//! types; the service crate implements this trait over the Bot API.

use crate::types::{ChatId, MessageContent, MessageId, MessageRef, UserId};
use anyhow::Result;
use async_trait::async_trait;

#[derive(Debug, Clone)]
pub struct ChatInfo {
    pub id: ChatId,
    pub kind: String,
    pub title: Option<String>,
    pub username: Option<String>,
    pub member_count: Option<i64>,
}

impl ChatInfo {
    pub fn display_title(&self) -> String {
        self.title
            .clone()
            .unwrap_or_else(|| self.id.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct SelfIdentity {
    pub id: UserId,
    pub username: String,
}

/// One inline button of the selection affordance, platform-neutral.
/// `data` round-trips through the platform's callback mechanism.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptButton {
    pub label: String,
    pub data: String,
}

pub type PromptKeyboard = Vec<Vec<PromptButton>>;

#[async_trait]
pub trait ChatGateway: Send + Sync {
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef>;

    /// Send typed content with the media-kind-appropriate platform
    /// primitive. Implementations may reject `MessageContent::Other`; the
    /// core falls back to `copy_message` for that kind.
    async fn send_content(
        &self,
        chat_id: ChatId,
        content: &MessageContent,
        reply_to: Option<MessageId>,
    ) -> Result<MessageRef>;

    async fn copy_message(
        &self,
        to_chat: ChatId,
        from: MessageRef,
        reply_to: Option<MessageId>,
    ) -> Result<MessageRef>;

    async fn forward_message(&self, to_chat: ChatId, from: MessageRef) -> Result<MessageRef>;

    async fn edit_message_text(&self, target: MessageRef, text: &str) -> Result<()>;

    /// Replace the reaction set on a message. An empty slice clears it.
    async fn set_reaction(&self, target: MessageRef, reactions: &[String]) -> Result<()>;

    async fn get_chat(&self, chat_id: ChatId) -> Result<ChatInfo>;

    async fn self_identity(&self) -> Result<SelfIdentity>;

    async fn send_prompt(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: &PromptKeyboard,
    ) -> Result<MessageRef>;

    async fn edit_prompt(
        &self,
        target: MessageRef,
        text: &str,
        keyboard: &PromptKeyboard,
    ) -> Result<()>;

    async fn ack_callback(&self, callback_id: &str) -> Result<()>;
}
