/*
 * SPDX-FileCopyrightText: 2026 Gramlink Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! In-memory correspondence tables between private-chat and group-side
//! messages. All four tables plus the staged-selection slot live behind one
//! mutex owned by the relay state; entries last for the lifetime of the
//! process and are deliberately never garbage collected (owner-only traffic
//! keeps them small). Nothing here survives a restart.

use crate::selection::PendingSelection;
use crate::types::{ChatId, MessageId, MessageRef};
use std::collections::HashMap;

/// Origin of a message forwarded into the private chat, keyed by the id the
/// forwarded copy received there.
#[derive(Debug, Clone)]
pub struct ForwardEntry {
    pub group_id: ChatId,
    pub group_message_id: MessageId,
    pub sender: String,
}

#[derive(Debug, Default)]
pub struct MessageMaps {
    /// private message id -> origin group message (owner-reply correspondence)
    forwarded: HashMap<MessageId, ForwardEntry>,
    /// (group, group message) -> private source (dispatch edge, group-keyed view)
    group_to_private: HashMap<(ChatId, MessageId), MessageRef>,
    /// private source -> every group copy, in dispatch order (private-keyed view)
    edit_targets: HashMap<(ChatId, MessageId), Vec<(ChatId, MessageId)>>,
    /// (group, group message) -> private forwarded copy (group-initiated edge)
    reaction_targets: HashMap<(ChatId, MessageId), MessageRef>,
    pending: Option<PendingSelection>,
}

impl MessageMaps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_forward(&mut self, private_message_id: MessageId, entry: ForwardEntry) {
        self.forwarded.insert(private_message_id, entry);
    }

    pub fn resolve_forward(&self, private_message_id: MessageId) -> Option<ForwardEntry> {
        self.forwarded.get(&private_message_id).cloned()
    }

    pub fn insert_reaction_target(&mut self, group: (ChatId, MessageId), private: MessageRef) {
        self.reaction_targets.insert(group, private);
    }

    pub fn reaction_target(&self, group: (ChatId, MessageId)) -> Option<MessageRef> {
        self.reaction_targets.get(&group).copied()
    }

    /// Record one successful send of `source` into a group: both views of the
    /// dispatch edge are appended under the same borrow, so no reader can
    /// observe one without the other.
    pub fn record_dispatch(&mut self, source: MessageRef, group_copy: (ChatId, MessageId)) {
        self.group_to_private.insert(group_copy, source);
        self.edit_targets
            .entry((source.chat_id, source.message_id))
            .or_default()
            .push(group_copy);
    }

    /// Map an origin group message back to its private forwarded copy unless
    /// a dispatch already claimed that key.
    pub fn backfill_group_origin(&mut self, group: (ChatId, MessageId), private: MessageRef) {
        self.group_to_private.entry(group).or_insert(private);
    }

    pub fn group_source(&self, group: (ChatId, MessageId)) -> Option<MessageRef> {
        self.group_to_private.get(&group).copied()
    }

    pub fn edit_targets_for(&self, source: MessageRef) -> Option<Vec<(ChatId, MessageId)>> {
        self.edit_targets
            .get(&(source.chat_id, source.message_id))
            .cloned()
    }

    /// Every group copy whose dispatch source is `private`. Linear scan over
    /// the dispatch table; the table is bounded by owner traffic.
    pub fn group_copies_of(&self, private: MessageRef) -> Vec<(ChatId, MessageId)> {
        let mut out: Vec<(ChatId, MessageId)> = self
            .group_to_private
            .iter()
            .filter(|(_, v)| **v == private)
            .map(|(k, _)| *k)
            .collect();
        out.sort();
        out
    }

    pub fn dispatch_edge_count(&self) -> usize {
        self.group_to_private.len()
    }

    pub fn pending(&self) -> Option<&PendingSelection> {
        self.pending.as_ref()
    }

    pub fn pending_mut(&mut self) -> Option<&mut PendingSelection> {
        self.pending.as_mut()
    }

    /// Stage a new selection, replacing any previous one (last write wins).
    pub fn set_pending(&mut self, pending: PendingSelection) {
        self.pending = Some(pending);
    }

    pub fn take_pending(&mut self) -> Option<PendingSelection> {
        self.pending.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn private(id: MessageId) -> MessageRef {
        MessageRef::new(10, id)
    }

    #[test]
    fn dispatch_keeps_both_views_in_step() {
        let mut maps = MessageMaps::new();
        maps.record_dispatch(private(1), (-100, 7));
        maps.record_dispatch(private(1), (-200, 9));

        assert_eq!(maps.group_source((-100, 7)), Some(private(1)));
        assert_eq!(maps.group_source((-200, 9)), Some(private(1)));
        assert_eq!(
            maps.edit_targets_for(private(1)),
            Some(vec![(-100, 7), (-200, 9)])
        );
        assert_eq!(maps.dispatch_edge_count(), 2);
    }

    #[test]
    fn backfill_never_overwrites_a_dispatch_edge() {
        let mut maps = MessageMaps::new();
        maps.record_dispatch(private(1), (-100, 7));
        maps.backfill_group_origin((-100, 7), private(99));
        assert_eq!(maps.group_source((-100, 7)), Some(private(1)));

        maps.backfill_group_origin((-100, 8), private(99));
        assert_eq!(maps.group_source((-100, 8)), Some(private(99)));
    }

    #[test]
    fn group_copies_scan_matches_by_value() {
        let mut maps = MessageMaps::new();
        maps.record_dispatch(private(1), (-100, 7));
        maps.record_dispatch(private(1), (-200, 9));
        maps.record_dispatch(private(2), (-100, 8));

        assert_eq!(maps.group_copies_of(private(1)), vec![(-200, 9), (-100, 7)]);
        assert_eq!(maps.group_copies_of(private(3)), Vec::<(ChatId, MessageId)>::new());
    }

    #[test]
    fn forward_and_reaction_entries_resolve() {
        let mut maps = MessageMaps::new();
        maps.insert_forward(
            42,
            ForwardEntry {
                group_id: -100,
                group_message_id: 7,
                sender: "@alice".into(),
            },
        );
        maps.insert_reaction_target((-100, 7), private(42));

        let entry = maps.resolve_forward(42).unwrap();
        assert_eq!(entry.group_id, -100);
        assert_eq!(entry.group_message_id, 7);
        assert_eq!(maps.reaction_target((-100, 7)), Some(private(42)));
        assert!(maps.resolve_forward(43).is_none());
    }
}
