//! Core domain types: issue classification and dedup identity.

use serde::{Deserialize, Serialize};

use crate::kan::Card;

/// The six kinds of board problems the bot nags about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    Overdue,
    NoDueDate,
    Vague,
    Stale,
    Unassigned,
    NoTasks,
}

impl IssueType {
    /// Stable string form used as the ledger's `reminder_type` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueType::Overdue => "overdue",
            IssueType::NoDueDate => "no_due_date",
            IssueType::Vague => "vague",
            IssueType::Stale => "stale",
            IssueType::Unassigned => "unassigned",
            IssueType::NoTasks => "no_tasks",
        }
    }

    /// Minimum hours between two reminders for the same subject and chat.
    pub fn cooldown_hours(&self) -> i64 {
        match self {
            IssueType::Overdue => 24,
            IssueType::NoDueDate => 24, // only runs in planning window anyway
            IssueType::Vague => 24,     // only runs in planning window anyway
            IssueType::Stale => 48,
            IssueType::Unassigned => 48,
            IssueType::NoTasks => 24, // only runs in planning window anyway
        }
    }

    /// Whether this type only runs during the sprint planning window.
    pub fn planning_window_only(&self) -> bool {
        matches!(
            self,
            IssueType::NoDueDate | IssueType::Vague | IssueType::NoTasks
        )
    }

    /// All issue types, in dispatch order.
    pub fn all() -> [IssueType; 6] {
        [
            IssueType::Overdue,
            IssueType::NoDueDate,
            IssueType::Vague,
            IssueType::Stale,
            IssueType::Unassigned,
            IssueType::NoTasks,
        ]
    }
}

impl std::fmt::Display for IssueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a reminder is about, for dedup purposes.
///
/// Card issues key on the card's public id; member issues use a synthetic
/// key so both kinds share the same ledger mechanism.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DedupSubject {
    Card(String),
    Member(String),
}

impl DedupSubject {
    /// Deterministic storage key for the ledger.
    pub fn storage_key(&self) -> String {
        match self {
            DedupSubject::Card(id) => id.clone(),
            DedupSubject::Member(id) => format!("no_tasks:{id}"),
        }
    }
}

/// A card flagged by a detector, with enough board context to render the
/// reminder. Reconstructed on every scan tick, never persisted.
#[derive(Debug, Clone)]
pub struct CardIssue {
    pub card: Card,
    pub board_name: String,
    pub board_slug: String,
    pub list_name: String,
    /// Days since last activity, set by the stale detector only.
    pub days_in_list: Option<i64>,
    /// Why the classifier judged the card vague, set by the vague pipeline.
    pub vague_reason: Option<String>,
}

impl CardIssue {
    pub fn subject(&self) -> DedupSubject {
        DedupSubject::Card(self.card.public_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_type_strings() {
        assert_eq!(IssueType::Overdue.as_str(), "overdue");
        assert_eq!(IssueType::NoDueDate.as_str(), "no_due_date");
        assert_eq!(IssueType::Vague.as_str(), "vague");
        assert_eq!(IssueType::Stale.as_str(), "stale");
        assert_eq!(IssueType::Unassigned.as_str(), "unassigned");
        assert_eq!(IssueType::NoTasks.as_str(), "no_tasks");
    }

    #[test]
    fn test_cooldowns() {
        assert_eq!(IssueType::Overdue.cooldown_hours(), 24);
        assert_eq!(IssueType::NoDueDate.cooldown_hours(), 24);
        assert_eq!(IssueType::Vague.cooldown_hours(), 24);
        assert_eq!(IssueType::Stale.cooldown_hours(), 48);
        assert_eq!(IssueType::Unassigned.cooldown_hours(), 48);
        assert_eq!(IssueType::NoTasks.cooldown_hours(), 24);
    }

    #[test]
    fn test_planning_window_gating() {
        assert!(!IssueType::Overdue.planning_window_only());
        assert!(!IssueType::Stale.planning_window_only());
        assert!(!IssueType::Unassigned.planning_window_only());
        assert!(IssueType::NoDueDate.planning_window_only());
        assert!(IssueType::Vague.planning_window_only());
        assert!(IssueType::NoTasks.planning_window_only());
    }

    #[test]
    fn test_all_covers_every_type() {
        let all = IssueType::all();
        assert_eq!(all.len(), 6);
        let strs: std::collections::HashSet<_> = all.iter().map(|t| t.as_str()).collect();
        assert_eq!(strs.len(), 6);
    }

    #[test]
    fn test_serde_snake_case() {
        let json = serde_json::to_string(&IssueType::NoDueDate).unwrap();
        assert_eq!(json, "\"no_due_date\"");
        let back: IssueType = serde_json::from_str("\"stale\"").unwrap();
        assert_eq!(back, IssueType::Stale);
    }

    #[test]
    fn test_card_subject_key_is_public_id() {
        let subject = DedupSubject::Card("card_abc123".to_string());
        assert_eq!(subject.storage_key(), "card_abc123");
    }

    #[test]
    fn test_member_subject_key_is_prefixed() {
        let subject = DedupSubject::Member("mem_42".to_string());
        assert_eq!(subject.storage_key(), "no_tasks:mem_42");
    }

    #[test]
    fn test_subject_keys_cannot_collide() {
        let card = DedupSubject::Card("mem_42".to_string());
        let member = DedupSubject::Member("mem_42".to_string());
        assert_ne!(card.storage_key(), member.storage_key());
    }
}
