//! Link store: which chats watch which workspaces, and which Telegram
//! users map to which Kan accounts.
//!
//! Both tables are written by the bot's linking commands; the scheduler
//! only reads them, once per tick.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, params};

use crate::error::Result;

/// A chat subscribed to a workspace's reminders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceLink {
    pub chat_id: i64,
    pub workspace_public_id: String,
    pub workspace_name: String,
}

/// A Telegram identity linked to a Kan account email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserLink {
    pub telegram_user_id: i64,
    pub telegram_username: Option<String>,
    pub kan_user_email: String,
}

/// Per-tick lookup of user links by lowercased Kan email.
pub type UserLinkMap = HashMap<String, UserLink>;

/// Build the email-keyed lookup shared read-only across one tick.
pub fn user_links_by_email(links: Vec<UserLink>) -> UserLinkMap {
    links
        .into_iter()
        .map(|link| (link.kan_user_email.to_lowercase(), link))
        .collect()
}

/// SQLite-backed store for chat/workspace and user/account links.
pub struct LinkStore {
    db: Mutex<Connection>,
}

impl LinkStore {
    /// Open or create the store at the given path. Safe to point at the
    /// same file as the reminder ledger; the tables are disjoint.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Connection::open(path)?;
        Self::init_schema(&db)?;
        Ok(Self { db: Mutex::new(db) })
    }

    /// Open an in-memory store, for tests.
    pub fn open_in_memory() -> Result<Self> {
        let db = Connection::open_in_memory()?;
        Self::init_schema(&db)?;
        Ok(Self { db: Mutex::new(db) })
    }

    fn init_schema(db: &Connection) -> Result<()> {
        db.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS workspace_links (
                chat_id INTEGER PRIMARY KEY,
                workspace_public_id TEXT NOT NULL,
                workspace_name TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS user_links (
                telegram_user_id INTEGER PRIMARY KEY,
                telegram_username TEXT,
                kan_user_email TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    /// All chat -> workspace subscriptions.
    pub fn all_workspace_links(&self) -> Result<Vec<WorkspaceLink>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT chat_id, workspace_public_id, workspace_name FROM workspace_links",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(WorkspaceLink {
                chat_id: row.get(0)?,
                workspace_public_id: row.get(1)?,
                workspace_name: row.get(2)?,
            })
        })?;

        let mut links = Vec::new();
        for row in rows {
            links.push(row?);
        }
        Ok(links)
    }

    /// All Telegram user -> Kan account mappings.
    pub fn all_user_links(&self) -> Result<Vec<UserLink>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT telegram_user_id, telegram_username, kan_user_email FROM user_links",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(UserLink {
                telegram_user_id: row.get(0)?,
                telegram_username: row.get(1)?,
                kan_user_email: row.get(2)?,
            })
        })?;

        let mut links = Vec::new();
        for row in rows {
            links.push(row?);
        }
        Ok(links)
    }

    /// Subscribe a chat to a workspace (insert or replace).
    pub fn upsert_workspace_link(&self, link: &WorkspaceLink) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT OR REPLACE INTO workspace_links (chat_id, workspace_public_id, workspace_name)
             VALUES (?1, ?2, ?3)",
            params![link.chat_id, link.workspace_public_id, link.workspace_name],
        )?;
        Ok(())
    }

    /// Map a Telegram user to a Kan account (insert or replace).
    pub fn upsert_user_link(&self, link: &UserLink) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT OR REPLACE INTO user_links (telegram_user_id, telegram_username, kan_user_email)
             VALUES (?1, ?2, ?3)",
            params![link.telegram_user_id, link.telegram_username, link.kan_user_email],
        )?;
        Ok(())
    }
}

impl std::fmt::Debug for LinkStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkStore").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ws_link(chat_id: i64, workspace: &str) -> WorkspaceLink {
        WorkspaceLink {
            chat_id,
            workspace_public_id: workspace.to_string(),
            workspace_name: format!("{workspace} name"),
        }
    }

    #[test]
    fn test_empty_store() {
        let store = LinkStore::open_in_memory().unwrap();
        assert!(store.all_workspace_links().unwrap().is_empty());
        assert!(store.all_user_links().unwrap().is_empty());
    }

    #[test]
    fn test_workspace_link_round_trip() {
        let store = LinkStore::open_in_memory().unwrap();
        store.upsert_workspace_link(&ws_link(100, "ws_1")).unwrap();
        store.upsert_workspace_link(&ws_link(200, "ws_2")).unwrap();

        let links = store.all_workspace_links().unwrap();
        assert_eq!(links.len(), 2);
        assert!(links.contains(&ws_link(100, "ws_1")));
    }

    #[test]
    fn test_workspace_link_replaces_per_chat() {
        let store = LinkStore::open_in_memory().unwrap();
        store.upsert_workspace_link(&ws_link(100, "ws_1")).unwrap();
        store.upsert_workspace_link(&ws_link(100, "ws_2")).unwrap();

        let links = store.all_workspace_links().unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].workspace_public_id, "ws_2");
    }

    #[test]
    fn test_user_link_round_trip() {
        let store = LinkStore::open_in_memory().unwrap();
        store
            .upsert_user_link(&UserLink {
                telegram_user_id: 7,
                telegram_username: Some("ada".to_string()),
                kan_user_email: "Ada@Example.com".to_string(),
            })
            .unwrap();
        store
            .upsert_user_link(&UserLink {
                telegram_user_id: 8,
                telegram_username: None,
                kan_user_email: "bob@example.com".to_string(),
            })
            .unwrap();

        let links = store.all_user_links().unwrap();
        assert_eq!(links.len(), 2);
    }

    #[test]
    fn test_user_links_by_email_lowercases() {
        let map = user_links_by_email(vec![UserLink {
            telegram_user_id: 7,
            telegram_username: Some("ada".to_string()),
            kan_user_email: "Ada@Example.com".to_string(),
        }]);

        assert!(map.contains_key("ada@example.com"));
        assert!(!map.contains_key("Ada@Example.com"));
    }

    #[test]
    fn test_shares_file_with_ledger() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("kanbot.db");

        let store = LinkStore::open(&path).unwrap();
        store.upsert_workspace_link(&ws_link(100, "ws_1")).unwrap();

        let ledger = crate::ledger::ReminderLedger::open(&path).unwrap();
        assert!(ledger.is_empty().unwrap());
        assert_eq!(store.all_workspace_links().unwrap().len(), 1);
    }
}
