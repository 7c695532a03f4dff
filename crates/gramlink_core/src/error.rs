/*
 * SPDX-FileCopyrightText: 2026 Gramlink Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Owner-facing failure taxonomy. The display text of each variant is the
//! notice sent back to the owner, so a correlation miss reads differently
//! from a transient platform failure.

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("❌ You are not authorized to use this bot.")]
    Unauthorized,

    #[error("{0}")]
    Validation(String),

    #[error("⚠️ You're not connected to any group! Use /connect <group_id> first.")]
    NotConnected,

    /// The relay has no mapping entry for the referenced message. Mappings
    /// live in process memory only, so this also covers anything sent before
    /// the last restart.
    #[error("🔎 I can't correlate that {0} with a relayed message. Only messages the relay itself delivered can be targeted, and mappings do not survive a restart.")]
    MappingMiss(&'static str),

    #[error(transparent)]
    Gateway(#[from] anyhow::Error),
}
