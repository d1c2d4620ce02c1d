//! Kanbot - task board hygiene reminders over Telegram
//!
//! Kanbot periodically scans linked Kan workspaces for board hygiene
//! problems (overdue, stale, unassigned, undated, or vague cards, and
//! members with nothing assigned) and nags the linked chats, with
//! per-issue cooldowns so nobody gets spammed.

pub mod config;
pub mod detect;
pub mod domain;
pub mod error;
pub mod kan;
pub mod ledger;
pub mod llm;
pub mod notify;
pub mod render;
pub mod scheduler;
pub mod sprint;
pub mod store;
pub mod vagueness;

pub use error::{KanbotError, Result};
