/*
 * SPDX-FileCopyrightText: 2026 Gramlink Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use crate::gateway::{ChatGateway, SelfIdentity};
use crate::maps::MessageMaps;
use crate::store::ConnectionStore;
use crate::types::{ChatId, UserId};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::warn;

/// Shared relay state: the owner identity, the bot's own identity, the
/// platform gateway, the durable connection store and the in-memory mapping
/// tables. The maps mutex is never held across a gateway call.
pub struct RelayState {
    pub owner_id: UserId,
    pub identity: SelfIdentity,
    pub gateway: Arc<dyn ChatGateway>,
    pub store: ConnectionStore,
    maps: Mutex<MessageMaps>,
}

impl RelayState {
    pub fn new(
        owner_id: UserId,
        identity: SelfIdentity,
        gateway: Arc<dyn ChatGateway>,
        store: ConnectionStore,
    ) -> Self {
        Self {
            owner_id,
            identity,
            gateway,
            store,
            maps: Mutex::new(MessageMaps::new()),
        }
    }

    pub fn maps(&self) -> MutexGuard<'_, MessageMaps> {
        self.maps.lock().expect("maps mutex poisoned")
    }

    /// The owner's private chat id equals the owner's user id on the
    /// platform this relay targets.
    pub fn owner_chat(&self) -> ChatId {
        self.owner_id
    }

    /// Best-effort notice to the owner; a failed notice is logged, never
    /// escalated.
    pub async fn notify_owner(&self, text: &str) {
        if let Err(e) = self.gateway.send_text(self.owner_chat(), text).await {
            warn!("owner notice failed: {e:#}");
        }
    }

    pub fn bump_stat(&self, kind: &str) {
        if let Err(e) = self.store.increment_stat(self.owner_id, kind) {
            warn!("stat increment failed for {kind}: {e:#}");
        }
    }
}
