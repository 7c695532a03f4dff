/*
 * SPDX-FileCopyrightText: 2026 Gramlink Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Long-poll loop: fetch update batches, convert them into core events and
//! hand them to the routing engine in arrival order.

use crate::telegram::{wire, TelegramApi};
use anyhow::Result;
use gramlink_core::state::RelayState;
use gramlink_core::types::{CallbackEvent, ChatKind, ReactionEvent};
use gramlink_core::{routing, selection};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, error, info};

pub async fn run(api: &TelegramApi, state: &RelayState, ready: &AtomicBool) -> Result<()> {
    let mut offset: i64 = 0;
    ready.store(true, Ordering::Relaxed);
    info!("update polling started");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        let batch = tokio::select! {
            _ = &mut ctrl_c => {
                info!("shutdown signal received, stopping poller");
                break;
            }
            r = api.get_updates(offset) => r,
        };
        let updates = match batch {
            Ok(u) => u,
            Err(e) => {
                error!("getUpdates failed: {e:#}");
                tokio::time::sleep(Duration::from_secs(3)).await;
                continue;
            }
        };
        for update in updates {
            offset = offset.max(update.update_id + 1);
            if let Err(e) = handle_update(state, update).await {
                error!("update handling failed: {e:#}");
            }
        }
    }
    Ok(())
}

async fn handle_update(state: &RelayState, update: wire::Update) -> Result<()> {
    if let Some(msg) = &update.message {
        let Some(incoming) = msg.to_incoming() else {
            debug!("skipping update {} without routable content", update.update_id);
            return Ok(());
        };
        if incoming.chat.kind == ChatKind::Private {
            return routing::handle_private_message(state, &incoming).await;
        }
        if incoming.chat.kind.is_group() {
            return routing::handle_group_message(state, &incoming).await;
        }
        return Ok(());
    }

    if let Some(msg) = &update.edited_message {
        let Some(incoming) = msg.to_incoming() else {
            return Ok(());
        };
        // Group-side edits are not mirrored: the private copy is a forward
        // snapshot and cannot be edited.
        if incoming.chat.kind == ChatKind::Private {
            return routing::handle_private_edit(state, &incoming).await;
        }
        return Ok(());
    }

    if let Some(cb) = &update.callback_query {
        let Some(msg) = &cb.message else {
            debug!("callback {} without accessible message", cb.id);
            return Ok(());
        };
        let event = CallbackEvent {
            id: cb.id.clone(),
            from_id: cb.from.id,
            chat_id: msg.chat.id,
            message_id: msg.message_id,
            data: cb.data.clone().unwrap_or_default(),
        };
        return selection::handle_callback(state, &event).await;
    }

    if let Some(reaction) = &update.message_reaction {
        let event = ReactionEvent {
            chat: wire::chat_ref(&reaction.chat),
            message_id: reaction.message_id,
            actor_id: reaction.user.as_ref().map(|u| u.id),
            reactions: reaction.new_emojis(),
        };
        return routing::handle_reaction(state, &event).await;
    }

    Ok(())
}
