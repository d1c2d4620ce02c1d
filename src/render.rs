//! Reminder message rendering (Telegram MarkdownV2).

use chrono::{DateTime, Utc};

use crate::domain::CardIssue;

/// Escape MarkdownV2 special characters.
pub fn escape_markdown(text: &str) -> String {
    const SPECIAL: &[char] = &[
        '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!',
    ];
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if SPECIAL.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Human-friendly due date with relative context.
pub fn format_due_date(due: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let date_str = if due.format("%Y").to_string() == now.format("%Y").to_string() {
        due.format("%b %-d").to_string()
    } else {
        due.format("%b %-d, %Y").to_string()
    };

    let diff_days = (due.date_naive() - now.date_naive()).num_days();
    match diff_days {
        d if d < 0 => {
            let overdue = -d;
            let plural = if overdue == 1 { "" } else { "s" };
            format!("{date_str} ({overdue} day{plural} overdue)")
        }
        0 => format!("{date_str} (today)"),
        1 => format!("{date_str} (tomorrow)"),
        d if d <= 7 => format!("{date_str} (in {d} days)"),
        _ => date_str,
    }
}

fn card_link(issue: &CardIssue, base_url: &str, workspace_slug: &str) -> String {
    format!(
        "{base_url}/{workspace_slug}/{}?card={}",
        issue.board_slug, issue.card.public_id
    )
}

fn mentions(assignee_usernames: &[String]) -> String {
    if assignee_usernames.is_empty() {
        return String::new();
    }
    let tags: Vec<String> = assignee_usernames
        .iter()
        .map(|u| format!("@{}", escape_markdown(u)))
        .collect();
    format!("\ncc {}", tags.join(" "))
}

fn card_context(issue: &CardIssue, base_url: &str, workspace_slug: &str) -> String {
    format!(
        "List: {} in {}\n[View in Kan]({})",
        escape_markdown(&issue.list_name),
        escape_markdown(&issue.board_name),
        card_link(issue, base_url, workspace_slug)
    )
}

pub fn format_overdue_reminder(
    issue: &CardIssue,
    assignee_usernames: &[String],
    base_url: &str,
    workspace_slug: &str,
    now: DateTime<Utc>,
) -> String {
    let due = issue
        .card
        .due_date
        .map(|d| escape_markdown(&format_due_date(d, now)))
        .unwrap_or_else(|| "unknown".to_string());
    format!(
        "⏰ *Overdue task*\n*{}*\nDue: {}\n{}{}",
        escape_markdown(&issue.card.title),
        due,
        card_context(issue, base_url, workspace_slug),
        mentions(assignee_usernames)
    )
}

pub fn format_no_due_date_reminder(
    issue: &CardIssue,
    assignee_usernames: &[String],
    base_url: &str,
    workspace_slug: &str,
) -> String {
    format!(
        "📅 *Task needs a due date*\n*{}*\n{}{}",
        escape_markdown(&issue.card.title),
        card_context(issue, base_url, workspace_slug),
        mentions(assignee_usernames)
    )
}

pub fn format_vague_reminder(
    issue: &CardIssue,
    assignee_usernames: &[String],
    base_url: &str,
    workspace_slug: &str,
) -> String {
    let reason = issue
        .vague_reason
        .as_deref()
        .map(|r| format!("\nWhy: {}", escape_markdown(r)))
        .unwrap_or_default();
    format!(
        "❓ *Task could use more detail*\n*{}*{}\n{}{}",
        escape_markdown(&issue.card.title),
        reason,
        card_context(issue, base_url, workspace_slug),
        mentions(assignee_usernames)
    )
}

pub fn format_stale_reminder(
    issue: &CardIssue,
    assignee_usernames: &[String],
    base_url: &str,
    workspace_slug: &str,
) -> String {
    let days = issue.days_in_list.unwrap_or(0);
    format!(
        "🐌 *Stale task*\n*{}*\nNo activity for {} days\n{}{}",
        escape_markdown(&issue.card.title),
        days,
        card_context(issue, base_url, workspace_slug),
        mentions(assignee_usernames)
    )
}

pub fn format_unassigned_reminder(
    issue: &CardIssue,
    base_url: &str,
    workspace_slug: &str,
) -> String {
    format!(
        "👤 *Unassigned task*\n*{}*\n{}",
        escape_markdown(&issue.card.title),
        card_context(issue, base_url, workspace_slug)
    )
}

pub fn format_no_tasks_reminder(
    telegram_username: &str,
    member_name: Option<&str>,
    workspace_slug: &str,
) -> String {
    let name = member_name
        .map(escape_markdown)
        .unwrap_or_else(|| escape_markdown(telegram_username));
    format!(
        "📋 @{} \\({}\\) has no tasks assigned in *{}*\\. Time to pick something up\\!",
        escape_markdown(telegram_username),
        name,
        escape_markdown(workspace_slug)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kan::Card;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 20, 12, 0, 0).unwrap()
    }

    fn issue(title: &str) -> CardIssue {
        CardIssue {
            card: Card {
                public_id: "card_1".to_string(),
                title: title.to_string(),
                description: None,
                due_date: None,
                created_at: None,
                updated_at: None,
                members: Vec::new(),
            },
            board_name: "Main".to_string(),
            board_slug: "main".to_string(),
            list_name: "In Progress".to_string(),
            days_in_list: None,
            vague_reason: None,
        }
    }

    #[test]
    fn test_escape_markdown() {
        assert_eq!(escape_markdown("a_b*c"), "a\\_b\\*c");
        assert_eq!(escape_markdown("v1.2 (beta)!"), "v1\\.2 \\(beta\\)\\!");
        assert_eq!(escape_markdown("plain"), "plain");
    }

    #[test]
    fn test_format_due_date_relative() {
        let today = now();
        assert!(format_due_date(today, now()).contains("(today)"));
        assert!(format_due_date(today + chrono::Duration::days(1), now()).contains("(tomorrow)"));
        assert!(format_due_date(today + chrono::Duration::days(3), now()).contains("(in 3 days)"));
        assert!(
            format_due_date(today - chrono::Duration::days(1), now()).contains("(1 day overdue)")
        );
        assert!(
            format_due_date(today - chrono::Duration::days(4), now()).contains("(4 days overdue)")
        );
        // Far future: no relative suffix
        assert!(!format_due_date(today + chrono::Duration::days(30), now()).contains("("));
    }

    #[test]
    fn test_format_due_date_cross_year() {
        let next_year = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        assert!(format_due_date(next_year, now()).contains("2026"));
    }

    #[test]
    fn test_overdue_reminder_contents() {
        let mut i = issue("Ship release");
        i.card.due_date = Some(now() - chrono::Duration::days(2));
        let msg = format_overdue_reminder(&i, &["ada".to_string()], "https://kan.test", "acme", now());

        assert!(msg.contains("Overdue task"));
        assert!(msg.contains("Ship release"));
        assert!(msg.contains("2 days overdue"));
        assert!(msg.contains("@ada"));
        assert!(msg.contains("https://kan.test/acme/main?card=card_1"));
    }

    #[test]
    fn test_stale_reminder_days() {
        let mut i = issue("Refactor auth");
        i.days_in_list = Some(20);
        let msg = format_stale_reminder(&i, &[], "https://kan.test", "acme");
        assert!(msg.contains("No activity for 20 days"));
        assert!(!msg.contains("cc "));
    }

    #[test]
    fn test_vague_reminder_reason() {
        let mut i = issue("Do stuff");
        i.vague_reason = Some("no deliverable specified".to_string());
        let msg = format_vague_reminder(&i, &[], "https://kan.test", "acme");
        assert!(msg.contains("Why: no deliverable specified"));
    }

    #[test]
    fn test_unassigned_reminder() {
        let msg = format_unassigned_reminder(&issue("Orphan task"), "https://kan.test", "acme");
        assert!(msg.contains("Unassigned task"));
        assert!(msg.contains("Orphan task"));
    }

    #[test]
    fn test_no_tasks_reminder() {
        let msg = format_no_tasks_reminder("ada", Some("Ada Lovelace"), "acme");
        assert!(msg.contains("@ada"));
        assert!(msg.contains("Ada Lovelace"));
        assert!(msg.contains("acme"));
    }

    #[test]
    fn test_titles_are_escaped() {
        let msg = format_unassigned_reminder(&issue("Fix v1.2 (urgent)"), "https://kan.test", "acme");
        assert!(msg.contains("Fix v1\\.2 \\(urgent\\)"));
    }
}
