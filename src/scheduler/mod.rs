//! The scan/notify control loop.
//!
//! Every tick: snapshot the workspace and user links, fan the linked
//! workspaces out concurrently, run the applicable detectors for each
//! workspace concurrently, and walk each detector's findings sequentially
//! through dedup -> render -> dispatch -> record. A tick-in-flight guard
//! keeps overlapping timer fires from racing the ledger; the daily ledger
//! prune and the hourly classifier cache sweep run on their own timers.
//!
//! Error policy per instance: ledger errors suppress the send (fail-closed),
//! dispatch errors skip the ledger record so the next eligible tick retries.
//! Nothing inside a tick can crash the process.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::detect;
use crate::domain::{CardIssue, DedupSubject, IssueType};
use crate::kan::{BoardSource, Card};
use crate::ledger::ReminderLedger;
use crate::notify::Notifier;
use crate::render;
use crate::sprint::SprintCalendar;
use crate::store::{LinkStore, UserLinkMap, WorkspaceLink, user_links_by_email};
use crate::vagueness::{SWEEP_INTERVAL, VaguenessEvaluator};

/// Delay before the one-shot startup tick.
const STARTUP_DELAY: Duration = Duration::from_secs(5);

/// Interval between ledger prune runs.
const PRUNE_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Scheduler knobs, split out from the full config so tests can build
/// them without credentials.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Time between scan ticks.
    pub tick_interval: Duration,
    /// Days of inactivity before an in-progress card counts as stale.
    pub stale_days: i64,
    /// Ledger retention horizon for the daily prune.
    pub retention_days: i64,
    /// Base URL used in rendered card links.
    pub kan_base_url: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(60 * 60),
            stale_days: 14,
            retention_days: 7,
            kan_base_url: "https://tasks.xdeca.com".to_string(),
        }
    }
}

impl From<&Config> for SchedulerConfig {
    fn from(config: &Config) -> Self {
        Self {
            tick_interval: Duration::from_secs(config.reminder_interval_hours * 60 * 60),
            stale_days: config.stale_days,
            retention_days: config.retention_days,
            kan_base_url: config.kan_base_url.clone(),
        }
    }
}

/// What happened during one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Workspaces scanned to completion.
    pub workspaces_scanned: usize,
    /// Workspaces skipped because their metadata could not be resolved.
    pub workspaces_skipped: usize,
    /// Reminders dispatched and recorded.
    pub sent: usize,
    /// Issue instances suppressed by an active cooldown.
    pub skipped_cooldown: usize,
    /// Instance-level failures (source, ledger, or dispatch).
    pub errors: usize,
    /// True when the tick was skipped because another was still running.
    pub tick_in_flight: bool,
}

impl TickReport {
    fn absorb(&mut self, stats: DispatchStats) {
        self.sent += stats.sent;
        self.skipped_cooldown += stats.skipped;
        self.errors += stats.errors;
    }
}

/// Outcome counts for one detector's dispatch loop.
#[derive(Debug, Clone, Copy, Default)]
struct DispatchStats {
    sent: usize,
    skipped: usize,
    errors: usize,
}

/// The reminder scheduler. All collaborators are injected; nothing here
/// owns global state beyond the tick guard.
pub struct Scheduler {
    source: Arc<dyn BoardSource>,
    links: Arc<LinkStore>,
    ledger: Arc<ReminderLedger>,
    evaluator: Arc<VaguenessEvaluator>,
    notifier: Arc<dyn Notifier>,
    calendar: SprintCalendar,
    config: SchedulerConfig,
    tick_guard: tokio::sync::Mutex<()>,
}

impl Scheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: Arc<dyn BoardSource>,
        links: Arc<LinkStore>,
        ledger: Arc<ReminderLedger>,
        evaluator: Arc<VaguenessEvaluator>,
        notifier: Arc<dyn Notifier>,
        calendar: SprintCalendar,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            source,
            links,
            ledger,
            evaluator,
            notifier,
            calendar,
            config,
            tick_guard: tokio::sync::Mutex::new(()),
        }
    }

    /// Run the daemon: a startup tick, then the recurring scan timer, with
    /// the prune and cache-sweep timers alongside. Never returns.
    pub async fn run(self: Arc<Self>) {
        info!(
            interval_secs = self.config.tick_interval.as_secs(),
            "Starting task checker"
        );

        let pruner = self.clone();
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(PRUNE_INTERVAL);
            timer.tick().await; // first tick fires immediately
            loop {
                timer.tick().await;
                pruner.prune_ledger(Utc::now());
            }
        });

        let sweeper = self.clone();
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(SWEEP_INTERVAL);
            timer.tick().await;
            loop {
                timer.tick().await;
                let evicted = sweeper.evaluator.sweep_expired(Utc::now());
                if evicted > 0 {
                    debug!(evicted, "Evicted expired vagueness cache entries");
                }
            }
        });

        tokio::time::sleep(STARTUP_DELAY).await;
        info!("Running initial task check");
        self.tick().await;

        let mut timer = tokio::time::interval(self.config.tick_interval);
        timer.tick().await;
        loop {
            timer.tick().await;
            self.tick().await;
        }
    }

    /// Run one tick against the wall clock.
    pub async fn tick(&self) -> TickReport {
        self.tick_at(Utc::now()).await
    }

    /// Run one tick at the given instant. Awaitable so tests drive ticks
    /// synchronously and assert on the report.
    pub async fn tick_at(&self, now: DateTime<Utc>) -> TickReport {
        // A still-running tick wins; this fire is dropped, not queued.
        let Ok(_guard) = self.tick_guard.try_lock() else {
            warn!("Previous tick still running, skipping this one");
            return TickReport {
                tick_in_flight: true,
                ..TickReport::default()
            };
        };

        let mut report = TickReport::default();

        let workspace_links = match self.links.all_workspace_links() {
            Ok(links) => links,
            Err(e) => {
                error!(error = %e, "Failed to load workspace links");
                report.errors += 1;
                return report;
            }
        };

        if workspace_links.is_empty() {
            info!("No workspace links configured, skipping check");
            return report;
        }

        let user_links = match self.links.all_user_links() {
            Ok(links) => user_links_by_email(links),
            Err(e) => {
                error!(error = %e, "Failed to load user links");
                report.errors += 1;
                return report;
            }
        };

        let outcomes = join_all(
            workspace_links
                .iter()
                .map(|link| self.process_workspace(link, &user_links, now)),
        )
        .await;

        for outcome in outcomes {
            match outcome {
                Some(stats) => {
                    report.workspaces_scanned += 1;
                    report.absorb(stats);
                }
                None => report.workspaces_skipped += 1,
            }
        }

        info!(
            scanned = report.workspaces_scanned,
            skipped = report.workspaces_skipped,
            sent = report.sent,
            "Task check complete"
        );
        report
    }

    /// Prune the ledger on its retention horizon.
    pub fn prune_ledger(&self, now: DateTime<Utc>) {
        match self.ledger.prune_older_than(self.config.retention_days, now) {
            Ok(deleted) => {
                if deleted > 0 {
                    info!(deleted, "Pruned old reminders");
                }
            }
            Err(e) => error!(error = %e, "Failed to prune reminders"),
        }
    }

    /// Scan one workspace. Returns None when the workspace had to be
    /// skipped (metadata unreachable); the next timer tick is the retry.
    async fn process_workspace(
        &self,
        link: &WorkspaceLink,
        user_links: &UserLinkMap,
        now: DateTime<Utc>,
    ) -> Option<DispatchStats> {
        let workspace = match self.source.get_workspace(&link.workspace_public_id).await {
            Ok(workspace) => workspace,
            Err(e) => {
                warn!(
                    workspace = %link.workspace_name,
                    error = %e,
                    "Cannot access workspace, skipping for this tick"
                );
                return None;
            }
        };
        let slug = workspace.slug;

        let sprint = self.calendar.info(now);
        debug!(
            workspace = %link.workspace_name,
            sprint_day = sprint.day,
            planning_window = sprint.is_planning_window,
            "Checking workspace"
        );

        let mut pipelines: Vec<futures::future::BoxFuture<'_, DispatchStats>> = vec![
            Box::pin(self.card_pipeline(IssueType::Overdue, link, &slug, user_links, now)),
            Box::pin(self.card_pipeline(IssueType::Stale, link, &slug, user_links, now)),
            Box::pin(self.card_pipeline(IssueType::Unassigned, link, &slug, user_links, now)),
        ];

        // The nag-type detectors only run while the sprint is being planned
        if sprint.is_planning_window {
            pipelines.push(Box::pin(self.card_pipeline(
                IssueType::NoDueDate,
                link,
                &slug,
                user_links,
                now,
            )));
            pipelines.push(Box::pin(self.card_pipeline(
                IssueType::Vague,
                link,
                &slug,
                user_links,
                now,
            )));
            pipelines.push(Box::pin(self.no_tasks_pipeline(link, &slug, user_links, now)));
        }

        let mut total = DispatchStats::default();
        for stats in join_all(pipelines).await {
            total.sent += stats.sent;
            total.skipped += stats.skipped;
            total.errors += stats.errors;
        }
        Some(total)
    }

    /// Detect and dispatch one card-based issue type for a workspace.
    async fn card_pipeline(
        &self,
        issue_type: IssueType,
        link: &WorkspaceLink,
        workspace_slug: &str,
        user_links: &UserLinkMap,
        now: DateTime<Utc>,
    ) -> DispatchStats {
        let source = self.source.as_ref();
        let ws = &link.workspace_public_id;
        let detected = match issue_type {
            IssueType::Overdue => detect::overdue_cards(source, ws, now).await,
            IssueType::NoDueDate => detect::no_due_date_cards(source, ws).await,
            IssueType::Vague => detect::vague_candidates(source, ws).await,
            IssueType::Stale => {
                detect::stale_cards(source, ws, self.config.stale_days, now).await
            }
            IssueType::Unassigned => detect::unassigned_cards(source, ws).await,
            IssueType::NoTasks => unreachable!("no_tasks is member-based"),
        };

        let issues = match detected {
            Ok(issues) => issues,
            Err(e) => {
                error!(
                    workspace = %link.workspace_name,
                    issue_type = %issue_type,
                    error = %e,
                    "Error checking tasks"
                );
                return DispatchStats {
                    errors: 1,
                    ..DispatchStats::default()
                };
            }
        };

        self.dispatch_card_issues(issue_type, issues, link, workspace_slug, user_links, now)
            .await
    }

    /// Sequential dedup -> render -> send -> record loop for card issues.
    /// Sequencing per detector preserves message ordering per chat and
    /// keeps same-key ledger checks from racing their own records.
    async fn dispatch_card_issues(
        &self,
        issue_type: IssueType,
        issues: Vec<CardIssue>,
        link: &WorkspaceLink,
        workspace_slug: &str,
        user_links: &UserLinkMap,
        now: DateTime<Utc>,
    ) -> DispatchStats {
        let mut stats = DispatchStats::default();

        for mut issue in issues {
            let subject = issue.subject();

            match self.ledger.due_for(&subject, link.chat_id, issue_type, now) {
                Ok(true) => {}
                Ok(false) => {
                    stats.skipped += 1;
                    continue;
                }
                Err(e) => {
                    // Fail closed: never risk a double send on ledger trouble
                    error!(error = %e, card = %issue.card.public_id, "Ledger lookup failed, suppressing send");
                    stats.errors += 1;
                    continue;
                }
            }

            if issue_type == IssueType::Vague {
                let verdict = self
                    .evaluator
                    .evaluate(
                        &issue.card.title,
                        issue.card.description.as_deref(),
                        &issue.list_name,
                        now,
                    )
                    .await;
                if !verdict.is_vague {
                    continue;
                }
                issue.vague_reason = verdict.reason;
            }

            let assignees = assignee_usernames(&issue.card, user_links);
            let message = self.render_card_message(issue_type, &issue, &assignees, workspace_slug, now);

            if let Err(e) = self.notifier.send(link.chat_id, &message).await {
                // No record written: the next eligible tick retries
                error!(
                    chat_id = link.chat_id,
                    issue_type = %issue_type,
                    error = %e,
                    "Failed to send reminder"
                );
                stats.errors += 1;
                continue;
            }

            match self.ledger.record(&subject, link.chat_id, issue_type, now) {
                Ok(()) => {
                    info!(
                        issue_type = %issue_type,
                        card = %issue.card.title,
                        chat_id = link.chat_id,
                        "Sent reminder"
                    );
                    stats.sent += 1;
                }
                Err(e) => {
                    error!(error = %e, "Failed to record sent reminder");
                    stats.errors += 1;
                }
            }
        }

        stats
    }

    /// Detect and dispatch members with no assigned tasks. Members without
    /// a linked Telegram username are skipped entirely (they could not see
    /// the nag) and no ledger record is written for them.
    async fn no_tasks_pipeline(
        &self,
        link: &WorkspaceLink,
        workspace_slug: &str,
        user_links: &UserLinkMap,
        now: DateTime<Utc>,
    ) -> DispatchStats {
        let mut stats = DispatchStats::default();

        let members = match detect::members_with_no_tasks(
            self.source.as_ref(),
            &link.workspace_public_id,
        )
        .await
        {
            Ok(members) => members,
            Err(e) => {
                error!(
                    workspace = %link.workspace_name,
                    error = %e,
                    "Error checking members with no tasks"
                );
                stats.errors += 1;
                return stats;
            }
        };

        for member in members {
            let subject = DedupSubject::Member(member.public_id.clone());

            match self.ledger.due_for(&subject, link.chat_id, IssueType::NoTasks, now) {
                Ok(true) => {}
                Ok(false) => {
                    stats.skipped += 1;
                    continue;
                }
                Err(e) => {
                    error!(error = %e, member = %member.public_id, "Ledger lookup failed, suppressing send");
                    stats.errors += 1;
                    continue;
                }
            }

            let Some(username) = user_links
                .get(&member.email.to_lowercase())
                .and_then(|l| l.telegram_username.as_deref())
            else {
                continue;
            };

            let message =
                render::format_no_tasks_reminder(username, member.name.as_deref(), workspace_slug);

            if let Err(e) = self.notifier.send(link.chat_id, &message).await {
                error!(chat_id = link.chat_id, error = %e, "Failed to send no-tasks reminder");
                stats.errors += 1;
                continue;
            }

            match self.ledger.record(&subject, link.chat_id, IssueType::NoTasks, now) {
                Ok(()) => {
                    info!(member = %member.email, chat_id = link.chat_id, "Sent no-tasks reminder");
                    stats.sent += 1;
                }
                Err(e) => {
                    error!(error = %e, "Failed to record sent reminder");
                    stats.errors += 1;
                }
            }
        }

        stats
    }

    fn render_card_message(
        &self,
        issue_type: IssueType,
        issue: &CardIssue,
        assignees: &[String],
        workspace_slug: &str,
        now: DateTime<Utc>,
    ) -> String {
        let base = &self.config.kan_base_url;
        match issue_type {
            IssueType::Overdue => {
                render::format_overdue_reminder(issue, assignees, base, workspace_slug, now)
            }
            IssueType::NoDueDate => {
                render::format_no_due_date_reminder(issue, assignees, base, workspace_slug)
            }
            IssueType::Vague => render::format_vague_reminder(issue, assignees, base, workspace_slug),
            IssueType::Stale => render::format_stale_reminder(issue, assignees, base, workspace_slug),
            IssueType::Unassigned => {
                render::format_unassigned_reminder(issue, base, workspace_slug)
            }
            IssueType::NoTasks => unreachable!("no_tasks renders separately"),
        }
    }
}

/// Telegram usernames of a card's assignees, resolved through the linked
/// accounts. Unlinked assignees are silently omitted.
fn assignee_usernames(card: &Card, user_links: &UserLinkMap) -> Vec<String> {
    card.members
        .iter()
        .filter_map(|member| {
            user_links
                .get(&member.email.to_lowercase())
                .and_then(|link| link.telegram_username.clone())
        })
        .collect()
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.config)
            .finish()
    }
}
