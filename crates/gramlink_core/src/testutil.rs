/*
 * SPDX-FileCopyrightText: 2026 Gramlink Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Test fixtures: a recording mock of the platform gateway plus builders for
//! relay state and inbound events.

use crate::gateway::{ChatGateway, ChatInfo, PromptKeyboard, SelfIdentity};
use crate::state::RelayState;
use crate::store::ConnectionStore;
use crate::types::{
    CallbackEvent, ChatId, ChatKind, ChatRef, IncomingMessage, MessageContent, MessageId,
    MessageRef, ReactionEvent, ReplyRef, SenderRef, UserId,
};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

pub const OWNER: UserId = 4242;
pub const BOT: UserId = 999;

#[derive(Debug, Clone)]
pub enum GatewayCall {
    SendText {
        chat_id: ChatId,
        text: String,
    },
    SendContent {
        chat_id: ChatId,
        kind: String,
        reply_to: Option<MessageId>,
        sent: MessageRef,
    },
    CopyMessage {
        to_chat: ChatId,
        from: MessageRef,
        reply_to: Option<MessageId>,
        sent: MessageRef,
    },
    ForwardMessage {
        to_chat: ChatId,
        from: MessageRef,
        sent: MessageRef,
    },
    EditMessageText {
        target: MessageRef,
        text: String,
    },
    SetReaction {
        target: MessageRef,
        reactions: Vec<String>,
    },
    GetChat {
        chat_id: ChatId,
    },
    SendPrompt {
        chat_id: ChatId,
        text: String,
        sent: MessageRef,
    },
    EditPrompt {
        target: MessageRef,
        text: String,
    },
    AckCallback {
        id: String,
    },
}

#[derive(Default)]
pub struct MockGateway {
    calls: Mutex<Vec<GatewayCall>>,
    failing_chats: Mutex<HashSet<ChatId>>,
    next_message_id: AtomicI64,
}

impl MockGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            failing_chats: Mutex::new(HashSet::new()),
            next_message_id: AtomicI64::new(1000),
        })
    }

    /// Every outbound operation targeting this chat fails from now on.
    pub fn fail_chat(&self, chat_id: ChatId) {
        self.failing_chats.lock().unwrap().insert(chat_id);
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn texts_to(&self, chat_id: ChatId) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                GatewayCall::SendText {
                    chat_id: c_id,
                    text,
                } if c_id == chat_id => Some(text),
                _ => None,
            })
            .collect()
    }

    /// (chat, content kind, reply_to) of every send_content call.
    pub fn content_sends(&self) -> Vec<(ChatId, String, Option<MessageId>)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                GatewayCall::SendContent {
                    chat_id,
                    kind,
                    reply_to,
                    ..
                } => Some((chat_id, kind, reply_to)),
                _ => None,
            })
            .collect()
    }

    /// (to_chat, from, sent) of every forward call.
    pub fn forwards(&self) -> Vec<(ChatId, MessageRef, MessageRef)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                GatewayCall::ForwardMessage { to_chat, from, sent } => {
                    Some((to_chat, from, sent))
                }
                _ => None,
            })
            .collect()
    }

    pub fn edit_calls(&self) -> Vec<(MessageRef, String)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                GatewayCall::EditMessageText { target, text } => Some((target, text)),
                _ => None,
            })
            .collect()
    }

    pub fn reaction_calls(&self) -> Vec<MessageRef> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                GatewayCall::SetReaction { target, .. } => Some(target),
                _ => None,
            })
            .collect()
    }

    pub fn last_prompt_edit(&self) -> Option<String> {
        self.calls()
            .into_iter()
            .rev()
            .find_map(|c| match c {
                GatewayCall::EditPrompt { text, .. } => Some(text),
                _ => None,
            })
    }

    fn record(&self, call: GatewayCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn check(&self, chat_id: ChatId) -> Result<()> {
        if self.failing_chats.lock().unwrap().contains(&chat_id) {
            return Err(anyhow!("chat {chat_id} unreachable"));
        }
        Ok(())
    }

    fn next_ref(&self, chat_id: ChatId) -> MessageRef {
        MessageRef::new(chat_id, self.next_message_id.fetch_add(1, Ordering::Relaxed))
    }
}

#[async_trait]
impl ChatGateway for MockGateway {
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef> {
        self.check(chat_id)?;
        let sent = self.next_ref(chat_id);
        self.record(GatewayCall::SendText {
            chat_id,
            text: text.to_string(),
        });
        Ok(sent)
    }

    async fn send_content(
        &self,
        chat_id: ChatId,
        content: &MessageContent,
        reply_to: Option<MessageId>,
    ) -> Result<MessageRef> {
        self.check(chat_id)?;
        let sent = self.next_ref(chat_id);
        self.record(GatewayCall::SendContent {
            chat_id,
            kind: content.kind().to_string(),
            reply_to,
            sent,
        });
        Ok(sent)
    }

    async fn copy_message(
        &self,
        to_chat: ChatId,
        from: MessageRef,
        reply_to: Option<MessageId>,
    ) -> Result<MessageRef> {
        self.check(to_chat)?;
        let sent = self.next_ref(to_chat);
        self.record(GatewayCall::CopyMessage {
            to_chat,
            from,
            reply_to,
            sent,
        });
        Ok(sent)
    }

    async fn forward_message(&self, to_chat: ChatId, from: MessageRef) -> Result<MessageRef> {
        self.check(to_chat)?;
        let sent = self.next_ref(to_chat);
        self.record(GatewayCall::ForwardMessage { to_chat, from, sent });
        Ok(sent)
    }

    async fn edit_message_text(&self, target: MessageRef, text: &str) -> Result<()> {
        self.record(GatewayCall::EditMessageText {
            target,
            text: text.to_string(),
        });
        self.check(target.chat_id)?;
        Ok(())
    }

    async fn set_reaction(&self, target: MessageRef, reactions: &[String]) -> Result<()> {
        self.check(target.chat_id)?;
        self.record(GatewayCall::SetReaction {
            target,
            reactions: reactions.to_vec(),
        });
        Ok(())
    }

    async fn get_chat(&self, chat_id: ChatId) -> Result<ChatInfo> {
        self.check(chat_id)?;
        self.record(GatewayCall::GetChat { chat_id });
        Ok(ChatInfo {
            id: chat_id,
            kind: "supergroup".to_string(),
            title: Some(format!("chat {chat_id}")),
            username: None,
            member_count: Some(3),
        })
    }

    async fn self_identity(&self) -> Result<SelfIdentity> {
        Ok(SelfIdentity {
            id: BOT,
            username: "gramlink_bot".to_string(),
        })
    }

    async fn send_prompt(
        &self,
        chat_id: ChatId,
        text: &str,
        _keyboard: &PromptKeyboard,
    ) -> Result<MessageRef> {
        self.check(chat_id)?;
        let sent = self.next_ref(chat_id);
        self.record(GatewayCall::SendPrompt {
            chat_id,
            text: text.to_string(),
            sent,
        });
        Ok(sent)
    }

    async fn edit_prompt(
        &self,
        target: MessageRef,
        text: &str,
        _keyboard: &PromptKeyboard,
    ) -> Result<()> {
        self.check(target.chat_id)?;
        self.record(GatewayCall::EditPrompt {
            target,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn ack_callback(&self, callback_id: &str) -> Result<()> {
        self.record(GatewayCall::AckCallback {
            id: callback_id.to_string(),
        });
        Ok(())
    }
}

/// Fresh relay state with the given groups already connected for OWNER.
pub fn setup(groups: &[(ChatId, &str)]) -> (RelayState, Arc<MockGateway>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store = ConnectionStore::open(dir.path().join("relay.db")).unwrap();
    for (group_id, title) in groups {
        store.upsert_connection(OWNER, *group_id, title, None).unwrap();
    }
    let gateway = MockGateway::new();
    let state = RelayState::new(
        OWNER,
        SelfIdentity {
            id: BOT,
            username: "gramlink_bot".to_string(),
        },
        gateway.clone(),
        store,
    );
    (state, gateway, dir)
}

static NEXT_INBOUND_ID: AtomicI64 = AtomicI64::new(1);

fn next_inbound_id() -> MessageId {
    NEXT_INBOUND_ID.fetch_add(1, Ordering::Relaxed)
}

pub fn owner_text_message(state: &RelayState, text: &str) -> IncomingMessage {
    IncomingMessage {
        chat: ChatRef {
            id: state.owner_chat(),
            kind: ChatKind::Private,
            title: None,
        },
        message_id: next_inbound_id(),
        sender: SenderRef {
            id: state.owner_id,
            username: Some("owner".to_string()),
            display_name: "Owner".to_string(),
        },
        content: MessageContent::Text {
            text: text.to_string(),
        },
        reply_to: None,
        mentions: Vec::new(),
    }
}

pub fn group_message(
    group_id: ChatId,
    text: &str,
    reply_to: Option<ReplyRef>,
    mentions: &[&str],
) -> IncomingMessage {
    IncomingMessage {
        chat: ChatRef {
            id: group_id,
            kind: ChatKind::Supergroup,
            title: Some(format!("group {group_id}")),
        },
        message_id: next_inbound_id(),
        sender: SenderRef {
            id: 12345,
            username: Some("alice".to_string()),
            display_name: "Alice".to_string(),
        },
        content: MessageContent::Text {
            text: text.to_string(),
        },
        reply_to,
        mentions: mentions.iter().map(|m| m.to_string()).collect(),
    }
}

pub fn reaction(
    chat_id: ChatId,
    message_id: MessageId,
    actor_id: Option<UserId>,
    emojis: &[&str],
) -> ReactionEvent {
    ReactionEvent {
        chat: ChatRef {
            id: chat_id,
            kind: if chat_id > 0 {
                ChatKind::Private
            } else {
                ChatKind::Supergroup
            },
            title: None,
        },
        message_id,
        actor_id,
        reactions: emojis.iter().map(|e| e.to_string()).collect(),
    }
}

pub fn callback(prompt: MessageRef, data: &str) -> CallbackEvent {
    CallbackEvent {
        id: "cb-1".to_string(),
        from_id: OWNER,
        chat_id: prompt.chat_id,
        message_id: prompt.message_id,
        data: data.to_string(),
    }
}
