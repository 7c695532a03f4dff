/*
 * SPDX-FileCopyrightText: 2026 Gramlink Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Staged-dispatch flow: a forwardable owner message is parked with an
//! inline group picker; toggle/select-all callbacks mutate the staged set and
//! re-render the prompt in place; send fans the payload out to every selected
//! group; cancel drops the draft.

use crate::gateway::{PromptButton, PromptKeyboard};
use crate::state::RelayState;
use crate::store::{stat, Connection};
use crate::types::{CallbackEvent, ChatId, IncomingMessage, MessageContent, MessageRef, UserId};
use anyhow::Result;
use futures_util::future::join_all;
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// The owner's staged outbound message. At most one exists at a time; a new
/// forwardable message replaces it silently (last write wins).
#[derive(Debug, Clone)]
pub struct PendingSelection {
    pub owner_id: UserId,
    pub source: MessageRef,
    pub content: MessageContent,
    pub preview: String,
    pub selected: BTreeSet<ChatId>,
    pub prompt: Option<MessageRef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SelectionAction {
    Toggle(ChatId),
    SelectAll,
    Dispatch,
    Cancel,
}

impl SelectionAction {
    fn parse(data: &str) -> Option<Self> {
        match data {
            "sel:all" => Some(SelectionAction::SelectAll),
            "sel:send" => Some(SelectionAction::Dispatch),
            "sel:cancel" => Some(SelectionAction::Cancel),
            _ => data
                .strip_prefix("sel:toggle:")
                .and_then(|id| id.parse::<ChatId>().ok())
                .map(SelectionAction::Toggle),
        }
    }
}

fn render_prompt(pending: &PendingSelection, groups: &[Connection]) -> (String, PromptKeyboard) {
    let selected = pending
        .selected
        .iter()
        .filter(|id| groups.iter().any(|g| g.group_id == **id))
        .count();
    let text = format!(
        "📨 Staged for relay:\n{}\n\nSelected {} of {} group(s).",
        pending.preview,
        selected,
        groups.len()
    );
    let mut keyboard: PromptKeyboard = groups
        .iter()
        .map(|g| {
            let mark = if pending.selected.contains(&g.group_id) {
                "✅"
            } else {
                "⬜"
            };
            vec![PromptButton {
                label: format!("{mark} {}", g.title),
                data: format!("sel:toggle:{}", g.group_id),
            }]
        })
        .collect();
    keyboard.push(vec![PromptButton {
        label: format!("📤 Send to selected ({selected})"),
        data: "sel:send".to_string(),
    }]);
    keyboard.push(vec![
        PromptButton {
            label: "☑️ Select all".to_string(),
            data: "sel:all".to_string(),
        },
        PromptButton {
            label: "✖️ Cancel".to_string(),
            data: "sel:cancel".to_string(),
        },
    ]);
    (text, keyboard)
}

/// Park a forwardable owner message and present the group picker. Replaces
/// any previously staged message without warning.
pub async fn stage_message(
    state: &RelayState,
    msg: &IncomingMessage,
    groups: &[Connection],
) -> Result<()> {
    let mut pending = PendingSelection {
        owner_id: msg.sender.id,
        source: msg.message_ref(),
        content: msg.content.clone(),
        preview: msg.content.preview(),
        selected: BTreeSet::new(),
        prompt: None,
    };
    let (text, keyboard) = render_prompt(&pending, groups);
    let prompt = state
        .gateway
        .send_prompt(state.owner_chat(), &text, &keyboard)
        .await?;
    pending.prompt = Some(prompt);
    state.maps().set_pending(pending);
    Ok(())
}

/// Route a selection callback. Unknown data, non-owner presses and presses on
/// an outdated prompt are acknowledged and dropped.
pub async fn handle_callback(state: &RelayState, ev: &CallbackEvent) -> Result<()> {
    if let Err(e) = state.gateway.ack_callback(&ev.id).await {
        debug!("callback ack failed: {e:#}");
    }
    if ev.from_id != state.owner_id {
        debug!("callback from non-owner {} ignored", ev.from_id);
        return Ok(());
    }
    let Some(action) = SelectionAction::parse(&ev.data) else {
        debug!("unknown callback data: {}", ev.data);
        return Ok(());
    };

    let pressed = MessageRef::new(ev.chat_id, ev.message_id);
    let current_prompt = state.maps().pending().and_then(|p| p.prompt);
    if current_prompt != Some(pressed) {
        // Buttons of a replaced or pre-restart draft.
        let _ = state
            .gateway
            .edit_prompt(pressed, "⌛ This selection is no longer active.", &Vec::new())
            .await;
        return Ok(());
    }

    match action {
        SelectionAction::Toggle(group_id) => {
            let groups = state.store.list_active(state.owner_id)?;
            let rendered = {
                let mut maps = state.maps();
                let Some(pending) = maps.pending_mut() else {
                    return Ok(());
                };
                if !pending.selected.remove(&group_id) {
                    pending.selected.insert(group_id);
                }
                Some(render_prompt(pending, &groups))
            };
            if let Some((text, keyboard)) = rendered {
                state.gateway.edit_prompt(pressed, &text, &keyboard).await?;
            }
        }
        SelectionAction::SelectAll => {
            let groups = state.store.list_active(state.owner_id)?;
            let rendered = {
                let mut maps = state.maps();
                let Some(pending) = maps.pending_mut() else {
                    return Ok(());
                };
                pending.selected = groups.iter().map(|g| g.group_id).collect();
                Some(render_prompt(pending, &groups))
            };
            if let Some((text, keyboard)) = rendered {
                state.gateway.edit_prompt(pressed, &text, &keyboard).await?;
            }
        }
        SelectionAction::Dispatch => dispatch_pending(state).await?,
        SelectionAction::Cancel => {
            state.maps().take_pending();
            state
                .gateway
                .edit_prompt(pressed, "🚫 Cancelled.", &Vec::new())
                .await?;
        }
    }
    Ok(())
}

/// Fan the staged payload out to every selected group. Per-group sends run
/// concurrently and fail independently; each success appends both dispatch
/// views under one lock acquisition before the next await point.
async fn dispatch_pending(state: &RelayState) -> Result<()> {
    let groups = state.store.list_active(state.owner_id)?;
    let (pending, targets) = {
        let mut maps = state.maps();
        let Some(p) = maps.pending() else {
            return Ok(());
        };
        let targets: Vec<Connection> = groups
            .into_iter()
            .filter(|g| p.selected.contains(&g.group_id))
            .collect();
        if targets.is_empty() {
            drop(maps);
            state
                .notify_owner("⚠️ Select at least one group before sending.")
                .await;
            return Ok(());
        }
        (maps.take_pending().expect("pending checked above"), targets)
    };

    let sends = targets.iter().map(|conn| {
        let content = pending.content.clone();
        let source = pending.source;
        async move {
            let res = match &content {
                MessageContent::Other => {
                    state.gateway.copy_message(conn.group_id, source, None).await
                }
                c => state.gateway.send_content(conn.group_id, c, None).await,
            };
            match res {
                Ok(sent) => {
                    state
                        .maps()
                        .record_dispatch(source, (conn.group_id, sent.message_id));
                    state.bump_stat(stat::DISPATCH);
                    Ok(())
                }
                Err(e) => {
                    warn!("dispatch to {} ({}) failed: {e:#}", conn.title, conn.group_id);
                    Err(conn.title.clone())
                }
            }
        }
    });
    let outcomes = join_all(sends).await;

    let total = outcomes.len();
    let failed: Vec<String> = outcomes.into_iter().filter_map(|r| r.err()).collect();
    let ok = total - failed.len();
    let mut summary = format!("📤 Dispatch complete: {ok} succeeded, {} failed.", failed.len());
    if !failed.is_empty() {
        summary.push_str(&format!("\n❌ Failed: {}", failed.join(", ")));
    }

    match pending.prompt {
        Some(prompt) => {
            if let Err(e) = state.gateway.edit_prompt(prompt, &summary, &Vec::new()).await {
                warn!("summary edit failed: {e:#}");
                state.notify_owner(&summary).await;
            }
        }
        None => state.notify_owner(&summary).await,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{callback, owner_text_message, setup, GatewayCall, OWNER};

    #[tokio::test]
    async fn toggle_then_dispatch_sends_to_one_group() {
        let (state, gw, _dir) = setup(&[(-100, "alpha"), (-200, "beta")]);
        let msg = owner_text_message(&state, "hello");
        crate::routing::handle_private_message(&state, &msg).await.unwrap();

        {
            let maps = state.maps();
            let pending = maps.pending().expect("staged");
            assert_eq!(pending.preview, "hello");
            assert!(pending.selected.is_empty());
        }

        let prompt = state.maps().pending().unwrap().prompt.unwrap();
        handle_callback(&state, &callback(prompt, "sel:toggle:-100"))
            .await
            .unwrap();
        handle_callback(&state, &callback(prompt, "sel:send"))
            .await
            .unwrap();

        let sends = gw.content_sends();
        assert_eq!(sends.len(), 1);
        assert_eq!(sends[0].0, -100);
        assert_eq!(sends[0].1, "text");

        let summary = gw.last_prompt_edit().unwrap();
        assert!(summary.contains("1 succeeded, 0 failed"), "{summary}");

        let maps = state.maps();
        assert!(maps.pending().is_none());
        assert_eq!(maps.dispatch_edge_count(), 1);
        assert_eq!(maps.group_copies_of(msg.message_ref()).len(), 1);
        assert_eq!(maps.group_copies_of(msg.message_ref())[0].0, -100);
    }

    #[tokio::test]
    async fn select_all_is_idempotent() {
        let (state, _gw, _dir) = setup(&[(-100, "alpha"), (-200, "beta")]);
        let msg = owner_text_message(&state, "fan out");
        crate::routing::handle_private_message(&state, &msg).await.unwrap();
        let prompt = state.maps().pending().unwrap().prompt.unwrap();

        handle_callback(&state, &callback(prompt, "sel:all")).await.unwrap();
        let once: Vec<ChatId> = state
            .maps()
            .pending()
            .unwrap()
            .selected
            .iter()
            .copied()
            .collect();
        handle_callback(&state, &callback(prompt, "sel:all")).await.unwrap();
        let twice: Vec<ChatId> = state
            .maps()
            .pending()
            .unwrap()
            .selected
            .iter()
            .copied()
            .collect();

        assert_eq!(once, vec![-200, -100]);
        assert_eq!(once, twice);
    }

    #[tokio::test]
    async fn dispatch_with_empty_selection_changes_nothing() {
        let (state, gw, _dir) = setup(&[(-100, "alpha")]);
        let msg = owner_text_message(&state, "draft");
        crate::routing::handle_private_message(&state, &msg).await.unwrap();
        let prompt = state.maps().pending().unwrap().prompt.unwrap();

        handle_callback(&state, &callback(prompt, "sel:send")).await.unwrap();

        assert!(gw.content_sends().is_empty());
        assert!(state.maps().pending().is_some(), "draft must stay staged");
        let notices = gw.texts_to(OWNER);
        assert!(notices.iter().any(|t| t.contains("at least one group")));
    }

    #[tokio::test]
    async fn partial_failure_is_aggregated_per_group() {
        let (state, gw, _dir) = setup(&[(-100, "alpha"), (-200, "beta")]);
        gw.fail_chat(-200);
        let msg = owner_text_message(&state, "to everyone");
        crate::routing::handle_private_message(&state, &msg).await.unwrap();
        let prompt = state.maps().pending().unwrap().prompt.unwrap();

        handle_callback(&state, &callback(prompt, "sel:all")).await.unwrap();
        handle_callback(&state, &callback(prompt, "sel:send")).await.unwrap();

        let summary = gw.last_prompt_edit().unwrap();
        assert!(summary.contains("1 succeeded, 1 failed"), "{summary}");
        assert!(summary.contains("beta"), "{summary}");

        // only the successful send got a mapping entry
        let maps = state.maps();
        assert_eq!(maps.dispatch_edge_count(), 1);
        assert_eq!(
            maps.edit_targets_for(msg.message_ref()).unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn new_message_silently_replaces_the_draft() {
        let (state, gw, _dir) = setup(&[(-100, "alpha")]);
        let first = owner_text_message(&state, "first");
        crate::routing::handle_private_message(&state, &first).await.unwrap();
        let second = owner_text_message(&state, "second");
        crate::routing::handle_private_message(&state, &second).await.unwrap();

        let maps = state.maps();
        let pending = maps.pending().unwrap();
        assert_eq!(pending.preview, "second");
        assert_eq!(pending.source, second.message_ref());
        drop(maps);

        // buttons of the replaced prompt are dead
        let old_prompt = {
            let calls = gw.calls();
            calls
                .iter()
                .find_map(|c| match c {
                    GatewayCall::SendPrompt { sent, .. } => Some(*sent),
                    _ => None,
                })
                .unwrap()
        };
        handle_callback(&state, &callback(old_prompt, "sel:toggle:-100"))
            .await
            .unwrap();
        assert!(state.maps().pending().unwrap().selected.is_empty());
    }
}
