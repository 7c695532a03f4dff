/*
 * SPDX-FileCopyrightText: 2026 Gramlink Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Owner command surface. Callers have already verified the sender is the
//! owner and the chat is private; group-chat command invocations never reach
//! this module.

use crate::error::RelayError;
use crate::state::RelayState;
use crate::store::stat;
use crate::types::ChatId;
use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Connect(Option<String>),
    Disconnect(Option<String>),
    Groups,
    Stats,
    Unknown(String),
}

/// Parse a `/command [arg]` line. The command token may carry an `@botname`
/// suffix, which is stripped.
pub fn parse(text: &str) -> Option<Command> {
    let rest = text.trim().strip_prefix('/')?;
    let mut parts = rest.split_whitespace();
    let head = parts.next()?;
    let name = head.split('@').next().unwrap_or(head).to_lowercase();
    let arg = parts.next().map(|s| s.to_string());
    Some(match name.as_str() {
        "start" => Command::Start,
        "help" => Command::Help,
        "connect" => Command::Connect(arg),
        "disconnect" => Command::Disconnect(arg),
        "groups" => Command::Groups,
        "stats" => Command::Stats,
        other => Command::Unknown(other.to_string()),
    })
}

const HELP_TEXT: &str = "🤖 Gramlink relay commands:\n\
/connect <group_id> — link a group and start relaying\n\
/disconnect [group_id] — unlink a group\n\
/groups — list linked groups\n\
/stats — relay statistics\n\
/help — this text\n\n\
Send me any message and I'll ask which groups to relay it to. \
Reply to a forwarded message to answer in its group.\n\n\
⚠️ Only you (the owner) can use this bot.";

pub async fn handle_command(state: &RelayState, text: &str) -> Result<()> {
    let Some(cmd) = parse(text) else {
        return Ok(());
    };
    match cmd {
        Command::Start | Command::Help => state.notify_owner(HELP_TEXT).await,
        Command::Connect(None) => {
            state
                .notify_owner("Please provide a group ID. Usage: /connect <group_id>")
                .await
        }
        Command::Connect(Some(arg)) => match arg.parse::<ChatId>() {
            Ok(group_id) => connect_group(state, group_id).await?,
            Err(_) => {
                state
                    .notify_owner(
                        &RelayError::Validation(
                            "Invalid group ID. Must be an integer.".to_string(),
                        )
                        .to_string(),
                    )
                    .await
            }
        },
        Command::Disconnect(arg) => disconnect_group(state, arg).await?,
        Command::Groups => list_groups(state).await?,
        Command::Stats => show_stats(state).await?,
        Command::Unknown(name) => {
            state
                .notify_owner(&format!("Unknown command /{name}. /help lists available commands."))
                .await
        }
    }
    Ok(())
}

async fn connect_group(state: &RelayState, group_id: ChatId) -> Result<()> {
    match state.gateway.get_chat(group_id).await {
        Ok(info) => {
            state.store.upsert_connection(
                state.owner_id,
                group_id,
                &info.display_title(),
                info.username.as_deref(),
            )?;
            state.bump_stat(stat::CONNECT);
            state
                .notify_owner(&format!(
                    "✅ Connected to {} ({group_id})!\nSend me any message and I'll relay it there.",
                    info.display_title()
                ))
                .await;
        }
        Err(e) => {
            warn!("getChat for {group_id} failed: {e:#}");
            state
                .notify_owner(&format!(
                    "❌ Could not reach group {group_id}. Make sure:\n\
                     1. I'm added to the group\n\
                     2. The group ID is correct (use the negative ID for supergroups)\n\
                     3. I have permission to send messages\n\
                     4. Then try /connect again"
                ))
                .await;
        }
    }
    Ok(())
}

async fn disconnect_group(state: &RelayState, arg: Option<String>) -> Result<()> {
    let group_id = match arg {
        Some(arg) => match arg.parse::<ChatId>() {
            Ok(id) => id,
            Err(_) => {
                state
                    .notify_owner(
                        &RelayError::Validation(
                            "Invalid group ID. Must be an integer.".to_string(),
                        )
                        .to_string(),
                    )
                    .await;
                return Ok(());
            }
        },
        None => {
            let active = state.store.list_active(state.owner_id)?;
            match active.as_slice() {
                [] => {
                    state
                        .notify_owner(&RelayError::NotConnected.to_string())
                        .await;
                    return Ok(());
                }
                [only] => only.group_id,
                many => {
                    let lines: Vec<String> = many
                        .iter()
                        .map(|c| format!("• {} ({})", c.title, c.group_id))
                        .collect();
                    state
                        .notify_owner(&format!(
                            "Several groups are connected, specify one:\n{}\n\nUsage: /disconnect <group_id>",
                            lines.join("\n")
                        ))
                        .await;
                    return Ok(());
                }
            }
        }
    };

    if state.store.deactivate_connection(state.owner_id, group_id)? {
        state.bump_stat(stat::DISCONNECT);
        state
            .notify_owner(&format!("🔌 Disconnected from group {group_id}."))
            .await;
    } else {
        state
            .notify_owner(&format!("⚠️ No active connection with group {group_id}."))
            .await;
    }
    Ok(())
}

async fn list_groups(state: &RelayState) -> Result<()> {
    let active = state.store.list_active(state.owner_id)?;
    if active.is_empty() {
        state
            .notify_owner(&RelayError::NotConnected.to_string())
            .await;
        return Ok(());
    }
    let lines: Vec<String> = active
        .iter()
        .map(|c| match &c.username {
            Some(u) => format!("• {} ({}, @{u})", c.title, c.group_id),
            None => format!("• {} ({})", c.title, c.group_id),
        })
        .collect();
    state
        .notify_owner(&format!("🔗 Connected groups:\n{}", lines.join("\n")))
        .await;
    Ok(())
}

async fn show_stats(state: &RelayState) -> Result<()> {
    let stats = state.store.query_stats(state.owner_id)?;
    let active = state.store.list_active(state.owner_id)?;
    let mut lines = vec!["📊 Relay statistics:".to_string()];
    if stats.is_empty() {
        lines.push("(no activity recorded yet)".to_string());
    } else {
        for (kind, count) in &stats {
            lines.push(format!("{kind}: {count}"));
        }
    }
    lines.push(format!("Active connections: {}", active.len()));
    if let Some(first_ms) = state.store.first_connected_at_ms(state.owner_id)? {
        if let Some(ts) = DateTime::<Utc>::from_timestamp_millis(first_ms) {
            lines.push(format!("First connected: {}", ts.format("%Y-%m-%d")));
        }
    }
    state.notify_owner(&lines.join("\n")).await;
    Ok(())
}
