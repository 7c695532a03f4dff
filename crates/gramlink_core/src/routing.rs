/*
 * SPDX-FileCopyrightText: 2026 Gramlink Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Inbound event classification and the reply/edit/reaction resolution rules.
//! Every handler is a function of (event, mapping tables, store snapshot) ->
//! (gateway calls, table mutations); tables are only touched after the
//! corresponding platform call succeeded.

use crate::commands;
use crate::error::RelayError;
use crate::maps::ForwardEntry;
use crate::selection;
use crate::state::RelayState;
use crate::store::stat;
use crate::types::{
    ChatId, IncomingMessage, MessageContent, MessageId, MessageRef, ReactionEvent,
};
use anyhow::Result;
use futures_util::future::join_all;
use tracing::{error, warn};

/// Classify a private-chat message: authorization gate, command dispatch,
/// reply routing into the origin group, or staging for group selection.
pub async fn handle_private_message(state: &RelayState, msg: &IncomingMessage) -> Result<()> {
    if msg.sender.id != state.owner_id {
        if let Err(e) = state
            .gateway
            .send_text(msg.chat.id, &RelayError::Unauthorized.to_string())
            .await
        {
            warn!("authorization notice failed: {e:#}");
        }
        return Ok(());
    }

    if let Some(text) = msg.content.text() {
        if text.starts_with('/') {
            return commands::handle_command(state, text).await;
        }
    }

    let groups = state.store.list_active(state.owner_id)?;
    if groups.is_empty() {
        state
            .notify_owner(&RelayError::NotConnected.to_string())
            .await;
        return Ok(());
    }

    if let Some(reply) = &msg.reply_to {
        let entry = state.maps().resolve_forward(reply.message_id);
        return match entry {
            Some(entry) => route_owner_reply(state, msg, reply.message_id, entry).await,
            None => {
                state
                    .notify_owner(&RelayError::MappingMiss("reply").to_string())
                    .await;
                Ok(())
            }
        };
    }

    selection::stage_message(state, msg, &groups).await
}

/// Deliver the owner's reply into the group the replied-to message came
/// from, threaded onto the origin message.
async fn route_owner_reply(
    state: &RelayState,
    msg: &IncomingMessage,
    reply_target: MessageId,
    entry: ForwardEntry,
) -> Result<()> {
    let Some(conn) = state.store.get_active(state.owner_id, entry.group_id)? else {
        state
            .notify_owner(&format!(
                "⚠️ No longer connected to group {} — reply not delivered.",
                entry.group_id
            ))
            .await;
        return Ok(());
    };

    let sent = match &msg.content {
        MessageContent::Other => {
            state
                .gateway
                .copy_message(conn.group_id, msg.message_ref(), Some(entry.group_message_id))
                .await
        }
        content => {
            state
                .gateway
                .send_content(conn.group_id, content, Some(entry.group_message_id))
                .await
        }
    };

    match sent {
        Ok(group_msg) => {
            {
                let mut maps = state.maps();
                maps.record_dispatch(msg.message_ref(), (conn.group_id, group_msg.message_id));
                maps.backfill_group_origin(
                    (entry.group_id, entry.group_message_id),
                    MessageRef::new(state.owner_chat(), reply_target),
                );
            }
            state.bump_stat(stat::REPLY);
            state
                .notify_owner(&format!(
                    "↩️ Reply delivered to {} (re {}).",
                    conn.title, entry.sender
                ))
                .await;
        }
        Err(e) => {
            warn!("reply into {} failed: {e:#}", conn.group_id);
            state
                .notify_owner(&format!(
                    "❌ Could not deliver the reply to {}: {e:#}",
                    conn.title
                ))
                .await;
        }
    }
    Ok(())
}

/// Admission control plus forwarding for group traffic. Only bot-related
/// messages in connected groups ever reach the owner.
pub async fn handle_group_message(state: &RelayState, msg: &IncomingMessage) -> Result<()> {
    if state
        .store
        .get_active(state.owner_id, msg.chat.id)?
        .is_none()
    {
        return Ok(());
    }
    if !is_bot_related(state, msg) {
        return Ok(());
    }

    // For replies to the bot, forward the replied-to message first so the
    // owner sees what the member responded to.
    if let Some(reply) = &msg.reply_to {
        if reply.sender_id == Some(state.identity.id) {
            if let Err(e) = state
                .gateway
                .forward_message(
                    state.owner_chat(),
                    MessageRef::new(msg.chat.id, reply.message_id),
                )
                .await
            {
                warn!("context forward from {} failed: {e:#}", msg.chat.id);
            }
        }
    }

    match state
        .gateway
        .forward_message(state.owner_chat(), msg.message_ref())
        .await
    {
        Ok(private_copy) => {
            {
                let mut maps = state.maps();
                maps.insert_forward(
                    private_copy.message_id,
                    ForwardEntry {
                        group_id: msg.chat.id,
                        group_message_id: msg.message_id,
                        sender: msg.sender.handle(),
                    },
                );
                maps.insert_reaction_target((msg.chat.id, msg.message_id), private_copy);
            }
            state.bump_stat(stat::FORWARD);
        }
        Err(e) => error!("forward to owner failed for group {}: {e:#}", msg.chat.id),
    }
    Ok(())
}

fn is_bot_related(state: &RelayState, msg: &IncomingMessage) -> bool {
    if let Some(reply) = &msg.reply_to {
        if reply.sender_id == Some(state.identity.id) {
            return true;
        }
    }
    let handle = state.identity.username.to_lowercase();
    if msg.mentions.iter().any(|m| m.to_lowercase() == handle) {
        return true;
    }
    let needle = format!("@{handle}");
    msg.content
        .text()
        .map(|t| t.to_lowercase().contains(&needle))
        .unwrap_or(false)
        || msg
            .content
            .caption()
            .map(|c| c.to_lowercase().contains(&needle))
            .unwrap_or(false)
}

/// Propagate an owner edit to every group copy of the edited message. Only
/// text edits are supported; media edits are reported as unsupported.
pub async fn handle_private_edit(state: &RelayState, msg: &IncomingMessage) -> Result<()> {
    if msg.sender.id != state.owner_id {
        return Ok(());
    }

    let targets = state.maps().edit_targets_for(msg.message_ref());
    let Some(targets) = targets else {
        state
            .notify_owner(&RelayError::MappingMiss("edit").to_string())
            .await;
        return Ok(());
    };

    let Some(text) = msg.content.text() else {
        state
            .notify_owner("⚠️ Only text edits propagate to group copies; media edits are not supported.")
            .await;
        return Ok(());
    };

    let attempts = targets.iter().map(|(group_id, message_id)| async move {
        match state
            .gateway
            .edit_message_text(MessageRef::new(*group_id, *message_id), text)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!("edit of {}/{} failed: {e:#}", group_id, message_id);
                Err(*group_id)
            }
        }
    });
    let outcomes = join_all(attempts).await;

    let total = outcomes.len();
    let failed: Vec<ChatId> = outcomes.into_iter().filter_map(|r| r.err()).collect();
    let ok = total - failed.len();
    if ok > 0 {
        state.bump_stat(stat::EDIT);
    }

    let mut summary = format!("✏️ Edit propagated: {ok} succeeded, {} failed.", failed.len());
    if !failed.is_empty() {
        let mut names = Vec::new();
        for group_id in &failed {
            let name = state
                .store
                .get_active(state.owner_id, *group_id)?
                .map(|c| c.title)
                .unwrap_or_else(|| group_id.to_string());
            names.push(name);
        }
        summary.push_str(&format!("\n❌ Failed: {}", names.join(", ")));
    }
    state.notify_owner(&summary).await;
    Ok(())
}

/// Mirror a reaction across every mapped counterpart of the reacted message.
/// All matching tables apply, never just the first; identical targets are
/// mirrored once.
pub async fn handle_reaction(state: &RelayState, ev: &ReactionEvent) -> Result<()> {
    // Reactions the relay itself set come back as events; dropping them
    // breaks the mirror loop between paired messages.
    if ev.actor_id == Some(state.identity.id) {
        return Ok(());
    }

    let mut targets: Vec<MessageRef> = Vec::new();
    if ev.chat.id == state.owner_chat() {
        if ev.actor_id.is_some() && ev.actor_id != Some(state.owner_id) {
            return Ok(());
        }
        let maps = state.maps();
        if let Some(entry) = maps.resolve_forward(ev.message_id) {
            targets.push(MessageRef::new(entry.group_id, entry.group_message_id));
        }
        for (chat_id, message_id) in
            maps.group_copies_of(MessageRef::new(ev.chat.id, ev.message_id))
        {
            let target = MessageRef::new(chat_id, message_id);
            if !targets.contains(&target) {
                targets.push(target);
            }
        }
    } else {
        if state
            .store
            .get_active(state.owner_id, ev.chat.id)?
            .is_none()
        {
            return Ok(());
        }
        let maps = state.maps();
        let key = (ev.chat.id, ev.message_id);
        if let Some(private) = maps.reaction_target(key) {
            targets.push(private);
        }
        if let Some(private) = maps.group_source(key) {
            if !targets.contains(&private) {
                targets.push(private);
            }
        }
    }

    if targets.is_empty() {
        return Ok(());
    }

    let mut mirrored = false;
    for target in targets {
        match state.gateway.set_reaction(target, &ev.reactions).await {
            Ok(()) => mirrored = true,
            Err(e) => warn!(
                "reaction mirror to {}/{} failed: {e:#}",
                target.chat_id, target.message_id
            ),
        }
    }
    if mirrored {
        state.bump_stat(stat::REACTION);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{
        group_message, owner_text_message, reaction, setup, GatewayCall, OWNER,
    };
    use crate::types::{ReplyRef, SenderRef};

    const BOT_ID: i64 = 999;

    #[tokio::test]
    async fn non_owner_gets_fixed_notice_and_nothing_else() {
        let (state, gw, _dir) = setup(&[(-100, "alpha")]);
        let mut msg = owner_text_message(&state, "hi");
        msg.sender = SenderRef {
            id: OWNER + 1,
            username: None,
            display_name: "Mallory".into(),
        };
        handle_private_message(&state, &msg).await.unwrap();

        let calls = gw.calls();
        assert_eq!(calls.len(), 1);
        match &calls[0] {
            GatewayCall::SendText { text, .. } => {
                assert!(text.contains("not authorized"))
            }
            other => panic!("unexpected call {other:?}"),
        }
        assert!(state.maps().pending().is_none());
    }

    #[tokio::test]
    async fn no_connections_reports_not_connected() {
        let (state, gw, _dir) = setup(&[]);
        let msg = owner_text_message(&state, "hello");
        handle_private_message(&state, &msg).await.unwrap();

        let notices = gw.texts_to(OWNER);
        assert!(notices.iter().any(|t| t.contains("/connect")));
        assert!(state.maps().pending().is_none());
    }

    #[tokio::test]
    async fn owner_reply_threads_into_origin_group() {
        let (state, gw, _dir) = setup(&[(-100, "alpha")]);
        {
            let mut maps = state.maps();
            maps.insert_forward(
                50,
                ForwardEntry {
                    group_id: -100,
                    group_message_id: 7,
                    sender: "@alice".into(),
                },
            );
        }

        let mut msg = owner_text_message(&state, "answer");
        msg.reply_to = Some(ReplyRef {
            message_id: 50,
            sender_id: Some(BOT_ID),
        });
        handle_private_message(&state, &msg).await.unwrap();

        let sends = gw.content_sends();
        assert_eq!(sends.len(), 1);
        assert_eq!(sends[0].0, -100);
        assert_eq!(sends[0].2, Some(7), "reply must be threaded");

        let maps = state.maps();
        // new group copy mapped both ways
        let copies = maps.group_copies_of(msg.message_ref());
        assert_eq!(copies.len(), 1);
        assert_eq!(copies[0].0, -100);
        assert_eq!(maps.edit_targets_for(msg.message_ref()).unwrap().len(), 1);
        // origin backfilled to the forwarded copy
        assert_eq!(
            maps.group_source((-100, 7)),
            Some(MessageRef::new(OWNER, 50))
        );
    }

    #[tokio::test]
    async fn reply_to_unmapped_message_cannot_correlate() {
        let (state, gw, _dir) = setup(&[(-100, "alpha")]);
        let mut msg = owner_text_message(&state, "answer");
        msg.reply_to = Some(ReplyRef {
            message_id: 51,
            sender_id: Some(BOT_ID),
        });
        handle_private_message(&state, &msg).await.unwrap();

        assert!(gw.content_sends().is_empty());
        let notices = gw.texts_to(OWNER);
        assert!(notices.iter().any(|t| t.contains("can't correlate")));
        assert!(state.maps().pending().is_none());
    }

    #[tokio::test]
    async fn reply_to_disconnected_group_is_not_delivered() {
        let (state, gw, _dir) = setup(&[(-100, "alpha"), (-200, "beta")]);
        {
            let mut maps = state.maps();
            maps.insert_forward(
                50,
                ForwardEntry {
                    group_id: -100,
                    group_message_id: 7,
                    sender: "@alice".into(),
                },
            );
        }
        state.store.deactivate_connection(OWNER, -100).unwrap();

        let mut msg = owner_text_message(&state, "answer");
        msg.reply_to = Some(ReplyRef {
            message_id: 50,
            sender_id: Some(BOT_ID),
        });
        handle_private_message(&state, &msg).await.unwrap();

        assert!(gw.content_sends().is_empty());
        let notices = gw.texts_to(OWNER);
        assert!(notices.iter().any(|t| t.contains("No longer connected")));
    }

    #[tokio::test]
    async fn unrelated_group_message_is_ignored_entirely() {
        let (state, gw, _dir) = setup(&[(-100, "alpha")]);
        let msg = group_message(-100, "just chatting", None, &[]);
        handle_group_message(&state, &msg).await.unwrap();

        assert!(gw.calls().is_empty());
        assert!(state.maps().resolve_forward(1).is_none());
    }

    #[tokio::test]
    async fn message_in_unconnected_group_is_ignored() {
        let (state, gw, _dir) = setup(&[(-100, "alpha")]);
        let msg = group_message(-300, "hey @gramlink_bot", None, &["gramlink_bot"]);
        handle_group_message(&state, &msg).await.unwrap();
        assert!(gw.calls().is_empty());
    }

    #[tokio::test]
    async fn reply_to_bot_forwards_context_then_message() {
        let (state, gw, _dir) = setup(&[(-100, "alpha")]);
        let msg = group_message(
            -100,
            "responding to you",
            Some(ReplyRef {
                message_id: 40,
                sender_id: Some(BOT_ID),
            }),
            &[],
        );
        handle_group_message(&state, &msg).await.unwrap();

        let forwards = gw.forwards();
        assert_eq!(forwards.len(), 2);
        assert_eq!(forwards[0].1, MessageRef::new(-100, 40));
        assert_eq!(forwards[1].1, msg.message_ref());

        let maps = state.maps();
        let private_copy = forwards[1].2;
        let entry = maps.resolve_forward(private_copy.message_id).unwrap();
        assert_eq!(entry.group_id, -100);
        assert_eq!(entry.group_message_id, msg.message_id);
        assert_eq!(
            maps.reaction_target((-100, msg.message_id)),
            Some(private_copy)
        );
    }

    #[tokio::test]
    async fn mention_forwards_without_context() {
        let (state, gw, _dir) = setup(&[(-100, "alpha")]);
        let msg = group_message(-100, "ping @Gramlink_Bot", None, &["gramlink_bot"]);
        handle_group_message(&state, &msg).await.unwrap();

        let forwards = gw.forwards();
        assert_eq!(forwards.len(), 1);
        assert_eq!(forwards[0].1, msg.message_ref());
    }

    #[tokio::test]
    async fn edit_without_mapping_calls_no_group_edit() {
        let (state, gw, _dir) = setup(&[(-100, "alpha")]);
        let msg = owner_text_message(&state, "edited text");
        handle_private_edit(&state, &msg).await.unwrap();

        assert_eq!(gw.edit_calls().len(), 0);
        let notices = gw.texts_to(OWNER);
        assert!(notices.iter().any(|t| t.contains("can't correlate")));
    }

    #[tokio::test]
    async fn edit_fanout_aggregates_partial_failure() {
        let (state, gw, _dir) = setup(&[(-100, "alpha"), (-200, "beta")]);
        let msg = owner_text_message(&state, "fixed typo");
        {
            let mut maps = state.maps();
            maps.record_dispatch(msg.message_ref(), (-100, 70));
            maps.record_dispatch(msg.message_ref(), (-200, 71));
        }
        gw.fail_chat(-200);

        handle_private_edit(&state, &msg).await.unwrap();

        assert_eq!(gw.edit_calls().len(), 2);
        let notices = gw.texts_to(OWNER);
        assert!(notices.iter().any(|t| t.contains("1 succeeded, 1 failed")));
        assert!(notices.iter().any(|t| t.contains("beta")));
        let stats = state.store.query_stats(OWNER).unwrap();
        assert_eq!(
            stats.iter().find(|(k, _)| k == "edit").map(|(_, n)| *n),
            Some(1)
        );
    }

    #[tokio::test]
    async fn non_text_edit_is_reported_unsupported() {
        let (state, gw, _dir) = setup(&[(-100, "alpha")]);
        let mut msg = owner_text_message(&state, "ignored");
        {
            let mut maps = state.maps();
            maps.record_dispatch(msg.message_ref(), (-100, 70));
        }
        msg.content = MessageContent::Photo {
            file_id: "f".into(),
            caption: Some("new caption".into()),
        };
        handle_private_edit(&state, &msg).await.unwrap();

        assert_eq!(gw.edit_calls().len(), 0);
        let notices = gw.texts_to(OWNER);
        assert!(notices.iter().any(|t| t.contains("Only text edits")));
    }

    #[tokio::test]
    async fn private_reaction_mirrors_into_both_tables() {
        let (state, gw, _dir) = setup(&[(-100, "alpha"), (-200, "beta")]);
        {
            let mut maps = state.maps();
            maps.insert_forward(
                60,
                ForwardEntry {
                    group_id: -100,
                    group_message_id: 7,
                    sender: "@alice".into(),
                },
            );
            // the same private message also fanned out to another group
            maps.record_dispatch(MessageRef::new(OWNER, 60), (-200, 90));
        }

        let ev = reaction(OWNER, 60, Some(OWNER), &["👍"]);
        handle_reaction(&state, &ev).await.unwrap();

        let mirrored = gw.reaction_calls();
        assert_eq!(mirrored.len(), 2);
        assert!(mirrored.contains(&MessageRef::new(-100, 7)));
        assert!(mirrored.contains(&MessageRef::new(-200, 90)));
    }

    #[tokio::test]
    async fn group_reaction_mirrors_to_private_counterparts() {
        let (state, gw, _dir) = setup(&[(-100, "alpha")]);
        {
            let mut maps = state.maps();
            maps.insert_reaction_target((-100, 7), MessageRef::new(OWNER, 60));
            maps.record_dispatch(MessageRef::new(OWNER, 61), (-100, 7));
        }

        let ev = reaction(-100, 7, Some(12345), &["🔥"]);
        handle_reaction(&state, &ev).await.unwrap();

        let mirrored = gw.reaction_calls();
        assert_eq!(mirrored.len(), 2);
        assert!(mirrored.contains(&MessageRef::new(OWNER, 60)));
        assert!(mirrored.contains(&MessageRef::new(OWNER, 61)));
    }

    #[tokio::test]
    async fn bot_originated_reaction_is_dropped() {
        let (state, gw, _dir) = setup(&[(-100, "alpha")]);
        {
            let mut maps = state.maps();
            maps.insert_reaction_target((-100, 7), MessageRef::new(OWNER, 60));
        }
        let ev = reaction(-100, 7, Some(BOT_ID), &["👍"]);
        handle_reaction(&state, &ev).await.unwrap();
        assert!(gw.reaction_calls().is_empty());
    }

    #[tokio::test]
    async fn unmapped_reaction_is_a_no_op() {
        let (state, gw, _dir) = setup(&[(-100, "alpha")]);
        let ev = reaction(-100, 7, Some(12345), &["👍"]);
        handle_reaction(&state, &ev).await.unwrap();
        assert!(gw.reaction_calls().is_empty());
        let stats = state.store.query_stats(OWNER).unwrap();
        assert!(stats.iter().all(|(k, _)| k != "reaction"));
    }
}
