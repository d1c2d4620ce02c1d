//! Issue detectors.
//!
//! Each detector independently pulls the full board graph for a workspace
//! and scans it for one issue type. The scans themselves are pure functions
//! over a fetched graph so tests can drive them with constructed boards;
//! the async wrappers only add the fetch.
//!
//! List names are mapped to a role exactly once, in [`list_role`], so the
//! detectors cannot drift in their substring sets.

use chrono::{DateTime, Utc};
use std::collections::HashSet;

use crate::domain::CardIssue;
use crate::error::Result;
use crate::kan::{Board, BoardSource, MemberStatus, WorkspaceMember};

/// What a list is for, inferred from its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListRole {
    /// Finished work ("done", "complete").
    Done,
    /// Archived work.
    Archive,
    /// Unscheduled work.
    Backlog,
    /// Work underway ("in progress", "doing", "working", "review").
    InProgress,
    /// Anything else: actionable but not started.
    Active,
}

/// Classify a list by name. Case-insensitive substring matching, first
/// match wins in the order Done > Archive > Backlog > InProgress.
///
/// A name matching several substrings gets exactly one role, so a list
/// like "Backlog Review" is `Backlog` and exempt from the stale check:
/// finished/parked readings deliberately win over in-progress ones.
pub fn list_role(name: &str) -> ListRole {
    let lower = name.to_lowercase();
    if lower.contains("done") || lower.contains("complete") {
        ListRole::Done
    } else if lower.contains("archive") {
        ListRole::Archive
    } else if lower.contains("backlog") {
        ListRole::Backlog
    } else if lower.contains("progress")
        || lower.contains("doing")
        || lower.contains("working")
        || lower.contains("review")
    {
        ListRole::InProgress
    } else {
        ListRole::Active
    }
}

impl ListRole {
    /// Lists whose cards count as live work (everything not finished or
    /// archived).
    pub fn is_open(&self) -> bool {
        !matches!(self, ListRole::Done | ListRole::Archive)
    }

    /// Lists whose cards should already be scheduled and assigned.
    pub fn is_schedulable(&self) -> bool {
        self.is_open() && !matches!(self, ListRole::Backlog)
    }
}

fn card_issue(board: &Board, list_name: &str, card: &crate::kan::Card) -> CardIssue {
    CardIssue {
        card: card.clone(),
        board_name: board.name.clone(),
        board_slug: board.slug.clone(),
        list_name: list_name.to_string(),
        days_in_list: None,
        vague_reason: None,
    }
}

/// Cards with a due date in the past, outside done/archive lists.
pub fn scan_overdue(boards: &[Board], now: DateTime<Utc>) -> Vec<CardIssue> {
    let mut issues = Vec::new();
    for board in boards {
        for list in &board.lists {
            if !list_role(&list.name).is_open() {
                continue;
            }
            for card in &list.cards {
                if card.due_date.is_some_and(|due| due < now) {
                    issues.push(card_issue(board, &list.name, card));
                }
            }
        }
    }
    issues
}

/// Cards with no due date in lists where work should be scheduled.
pub fn scan_no_due_date(boards: &[Board]) -> Vec<CardIssue> {
    let mut issues = Vec::new();
    for board in boards {
        for list in &board.lists {
            if !list_role(&list.name).is_schedulable() {
                continue;
            }
            for card in &list.cards {
                if card.due_date.is_none() {
                    issues.push(card_issue(board, &list.name, card));
                }
            }
        }
    }
    issues
}

/// Candidates for the LLM vagueness check: open cards with short or
/// missing descriptions. The pre-filter keeps classifier calls bounded;
/// the real verdict comes from the evaluator.
pub fn scan_vague_candidates(boards: &[Board]) -> Vec<CardIssue> {
    let mut issues = Vec::new();
    for board in boards {
        for list in &board.lists {
            if !list_role(&list.name).is_open() {
                continue;
            }
            for card in &list.cards {
                let desc_len = card
                    .description
                    .as_deref()
                    .map(|d| d.trim().len())
                    .unwrap_or(0);
                if desc_len < 100 {
                    issues.push(card_issue(board, &list.name, card));
                }
            }
        }
    }
    issues
}

/// Cards sitting in an in-progress list with no activity for `stale_days`.
/// Last activity is the card's update time, else its creation time; cards
/// exposing neither are skipped.
pub fn scan_stale(boards: &[Board], stale_days: i64, now: DateTime<Utc>) -> Vec<CardIssue> {
    let threshold = now - chrono::Duration::days(stale_days);
    let mut issues = Vec::new();
    for board in boards {
        for list in &board.lists {
            if list_role(&list.name) != ListRole::InProgress {
                continue;
            }
            for card in &list.cards {
                let Some(last_activity) = card.updated_at.or(card.created_at) else {
                    continue;
                };
                if last_activity < threshold {
                    let days_in_list = (now - last_activity).num_days();
                    let mut issue = card_issue(board, &list.name, card);
                    issue.days_in_list = Some(days_in_list);
                    issues.push(issue);
                }
            }
        }
    }
    issues
}

/// Cards with no assignees in lists where work should have an owner.
pub fn scan_unassigned(boards: &[Board]) -> Vec<CardIssue> {
    let mut issues = Vec::new();
    for board in boards {
        for list in &board.lists {
            if !list_role(&list.name).is_schedulable() {
                continue;
            }
            for card in &list.cards {
                if card.members.is_empty() {
                    issues.push(card_issue(board, &list.name, card));
                }
            }
        }
    }
    issues
}

/// Active workspace members who appear in no open card's assignee set
/// across any board.
pub fn scan_members_with_no_tasks(
    members: &[WorkspaceMember],
    boards: &[Board],
) -> Vec<WorkspaceMember> {
    let mut members_with_tasks: HashSet<&str> = HashSet::new();
    for board in boards {
        for list in &board.lists {
            if !list_role(&list.name).is_open() {
                continue;
            }
            for card in &list.cards {
                for assignee in &card.members {
                    members_with_tasks.insert(assignee.public_id.as_str());
                }
            }
        }
    }

    members
        .iter()
        .filter(|m| {
            m.status == MemberStatus::Active && !members_with_tasks.contains(m.public_id.as_str())
        })
        .cloned()
        .collect()
}

/// Fetch the workspace graph and scan for overdue cards.
pub async fn overdue_cards(
    source: &dyn BoardSource,
    workspace_public_id: &str,
    now: DateTime<Utc>,
) -> Result<Vec<CardIssue>> {
    let boards = source.get_boards_with_cards(workspace_public_id).await?;
    Ok(scan_overdue(&boards, now))
}

/// Fetch the workspace graph and scan for cards without due dates.
pub async fn no_due_date_cards(
    source: &dyn BoardSource,
    workspace_public_id: &str,
) -> Result<Vec<CardIssue>> {
    let boards = source.get_boards_with_cards(workspace_public_id).await?;
    Ok(scan_no_due_date(&boards))
}

/// Fetch the workspace graph and scan for vagueness candidates.
pub async fn vague_candidates(
    source: &dyn BoardSource,
    workspace_public_id: &str,
) -> Result<Vec<CardIssue>> {
    let boards = source.get_boards_with_cards(workspace_public_id).await?;
    Ok(scan_vague_candidates(&boards))
}

/// Fetch the workspace graph and scan for stale in-progress cards.
pub async fn stale_cards(
    source: &dyn BoardSource,
    workspace_public_id: &str,
    stale_days: i64,
    now: DateTime<Utc>,
) -> Result<Vec<CardIssue>> {
    let boards = source.get_boards_with_cards(workspace_public_id).await?;
    Ok(scan_stale(&boards, stale_days, now))
}

/// Fetch the workspace graph and scan for unassigned cards.
pub async fn unassigned_cards(
    source: &dyn BoardSource,
    workspace_public_id: &str,
) -> Result<Vec<CardIssue>> {
    let boards = source.get_boards_with_cards(workspace_public_id).await?;
    Ok(scan_unassigned(&boards))
}

/// Fetch the workspace roster and graph and scan for members with no
/// open assigned work.
pub async fn members_with_no_tasks(
    source: &dyn BoardSource,
    workspace_public_id: &str,
) -> Result<Vec<WorkspaceMember>> {
    let workspace = source.get_workspace(workspace_public_id).await?;
    let boards = source.get_boards_with_cards(workspace_public_id).await?;
    Ok(scan_members_with_no_tasks(&workspace.members, &boards))
}
