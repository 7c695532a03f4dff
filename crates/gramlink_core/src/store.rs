/*
 * SPDX-FileCopyrightText: 2026 Gramlink Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Durable owner->group associations plus per-owner event counters.
//! Disconnecting never deletes a row; it flips `is_active` so history stays
//! available to `/stats`.

use anyhow::{Context, Result};
use rusqlite::{params, Connection as SqlConnection, OptionalExtension};
use std::path::{Path, PathBuf};

/// Stat event kinds tracked per owner.
pub mod stat {
    pub const CONNECT: &str = "connect";
    pub const DISCONNECT: &str = "disconnect";
    pub const DISPATCH: &str = "dispatch";
    pub const REPLY: &str = "reply";
    pub const EDIT: &str = "edit";
    pub const REACTION: &str = "reaction";
    pub const FORWARD: &str = "forward";
}

#[derive(Debug, Clone)]
pub struct Connection {
    pub owner_id: i64,
    pub group_id: i64,
    pub title: String,
    pub username: Option<String>,
    pub connected_at_ms: i64,
    pub is_active: bool,
}

#[derive(Clone)]
pub struct ConnectionStore {
    path: PathBuf,
}

impl ConnectionStore {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let path = db_path.as_ref().to_path_buf();
        let conn = SqlConnection::open(&path)
            .with_context(|| format!("open db: {}", path.display()))?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            CREATE TABLE IF NOT EXISTS connections (
              owner_id INTEGER NOT NULL,
              group_id INTEGER NOT NULL,
              title TEXT NOT NULL,
              username TEXT NULL,
              connected_at_ms INTEGER NOT NULL,
              is_active INTEGER NOT NULL DEFAULT 1,
              PRIMARY KEY(owner_id, group_id)
            );
            CREATE INDEX IF NOT EXISTS idx_connections_active ON connections(owner_id, is_active);

            CREATE TABLE IF NOT EXISTS relay_stats (
              owner_id INTEGER NOT NULL,
              kind TEXT NOT NULL,
              count INTEGER NOT NULL DEFAULT 0,
              PRIMARY KEY(owner_id, kind)
            );
            "#,
        )?;
        Ok(Self { path })
    }

    /// Create or reactivate the owner->group link. Reconnecting refreshes the
    /// title/username snapshot; the connect timestamp is only reset when the
    /// row was inactive.
    pub fn upsert_connection(
        &self,
        owner_id: i64,
        group_id: i64,
        title: &str,
        username: Option<&str>,
    ) -> Result<()> {
        let conn = SqlConnection::open(&self.path)?;
        conn.execute(
            r#"
            INSERT INTO connections(owner_id, group_id, title, username, connected_at_ms, is_active)
            VALUES (?1, ?2, ?3, ?4, ?5, 1)
            ON CONFLICT(owner_id, group_id) DO UPDATE SET
              title=excluded.title,
              username=excluded.username,
              connected_at_ms=(CASE WHEN connections.is_active=0 THEN excluded.connected_at_ms ELSE connections.connected_at_ms END),
              is_active=1
            "#,
            params![owner_id, group_id, title, username, now_ms()],
        )?;
        Ok(())
    }

    /// Soft-delete. Returns false when no active link existed.
    pub fn deactivate_connection(&self, owner_id: i64, group_id: i64) -> Result<bool> {
        let conn = SqlConnection::open(&self.path)?;
        let n = conn.execute(
            "UPDATE connections SET is_active=0 WHERE owner_id=?1 AND group_id=?2 AND is_active=1",
            params![owner_id, group_id],
        )?;
        Ok(n > 0)
    }

    pub fn list_active(&self, owner_id: i64) -> Result<Vec<Connection>> {
        let conn = SqlConnection::open(&self.path)?;
        let mut stmt = conn.prepare(
            r#"
            SELECT owner_id, group_id, title, username, connected_at_ms, is_active
            FROM connections
            WHERE owner_id=?1 AND is_active=1
            ORDER BY connected_at_ms ASC, group_id ASC
            "#,
        )?;
        let rows = stmt.query_map(params![owner_id], row_to_connection)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    pub fn get_active(&self, owner_id: i64, group_id: i64) -> Result<Option<Connection>> {
        let conn = SqlConnection::open(&self.path)?;
        let row = conn
            .query_row(
                r#"
                SELECT owner_id, group_id, title, username, connected_at_ms, is_active
                FROM connections
                WHERE owner_id=?1 AND group_id=?2 AND is_active=1
                "#,
                params![owner_id, group_id],
                row_to_connection,
            )
            .optional()?;
        Ok(row)
    }

    pub fn increment_stat(&self, owner_id: i64, kind: &str) -> Result<()> {
        let conn = SqlConnection::open(&self.path)?;
        conn.execute(
            r#"
            INSERT INTO relay_stats(owner_id, kind, count) VALUES (?1, ?2, 1)
            ON CONFLICT(owner_id, kind) DO UPDATE SET count = count + 1
            "#,
            params![owner_id, kind],
        )?;
        Ok(())
    }

    pub fn query_stats(&self, owner_id: i64) -> Result<Vec<(String, u64)>> {
        let conn = SqlConnection::open(&self.path)?;
        let mut stmt = conn.prepare(
            "SELECT kind, count FROM relay_stats WHERE owner_id=?1 ORDER BY kind ASC",
        )?;
        let rows = stmt.query_map(params![owner_id], |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)? as u64))
        })?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    /// Earliest connect timestamp across all rows, active or not.
    pub fn first_connected_at_ms(&self, owner_id: i64) -> Result<Option<i64>> {
        let conn = SqlConnection::open(&self.path)?;
        let v: Option<i64> = conn
            .query_row(
                "SELECT MIN(connected_at_ms) FROM connections WHERE owner_id=?1",
                params![owner_id],
                |r| r.get(0),
            )
            .optional()?
            .flatten();
        Ok(v)
    }
}

fn row_to_connection(r: &rusqlite::Row<'_>) -> rusqlite::Result<Connection> {
    Ok(Connection {
        owner_id: r.get(0)?,
        group_id: r.get(1)?,
        title: r.get(2)?,
        username: r.get(3)?,
        connected_at_ms: r.get(4)?,
        is_active: r.get::<_, i64>(5)? != 0,
    })
}

pub(crate) fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
