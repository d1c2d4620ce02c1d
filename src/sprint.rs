//! Sprint timing.
//!
//! Sprints are 13 working days plus one break day, giving a fixed 14-day
//! cycle anchored at a configurable epoch (any past sprint start). The
//! cycle position is pure wall-clock arithmetic, so the calendar can be
//! evaluated for any instant, including instants before the epoch.

use chrono::{DateTime, NaiveDate, Utc};

use crate::config::{SPRINT_CYCLE_DAYS, parse_sprint_epoch};

/// Sprint cycle calendar.
#[derive(Debug, Clone)]
pub struct SprintCalendar {
    /// A known sprint start date. Day 1 of every cycle.
    pub epoch: NaiveDate,
    /// Cycle length in days.
    pub cycle_days: i64,
}

/// Snapshot of the current cycle position, used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SprintInfo {
    pub day: i64,
    pub is_planning_window: bool,
    pub is_mid_sprint: bool,
    pub is_sprint_end: bool,
    pub is_break: bool,
}

impl Default for SprintCalendar {
    fn default() -> Self {
        Self::new(parse_sprint_epoch(None))
    }
}

impl SprintCalendar {
    /// Create a calendar with the standard 14-day cycle.
    pub fn new(epoch: NaiveDate) -> Self {
        Self {
            epoch,
            cycle_days: SPRINT_CYCLE_DAYS,
        }
    }

    /// Current day of the sprint, in `[1, cycle_days]`.
    ///
    /// Day 1 = sprint start (Sunday), day 7 = mid-sprint Saturday,
    /// day 13 = sprint-end Friday, day 14 = break Saturday.
    ///
    /// The double modulo keeps the result in range when `now` predates the
    /// epoch (negative elapsed-day counts).
    pub fn day_in_cycle(&self, now: DateTime<Utc>) -> i64 {
        let days_since_epoch = now
            .date_naive()
            .signed_duration_since(self.epoch)
            .num_days();
        let day = ((days_since_epoch % self.cycle_days) + self.cycle_days) % self.cycle_days;
        day + 1
    }

    /// True during the sprint planning window (days 1-2), when the bot
    /// additionally nags about vague tasks, missing due dates, and members
    /// with no tasks.
    pub fn is_planning_window(&self, now: DateTime<Utc>) -> bool {
        self.day_in_cycle(now) <= 2
    }

    /// True on the mid-sprint Saturday (day 7).
    pub fn is_mid_sprint(&self, now: DateTime<Utc>) -> bool {
        self.day_in_cycle(now) == 7
    }

    /// True on the last working day of the sprint (day 13).
    pub fn is_sprint_end(&self, now: DateTime<Utc>) -> bool {
        self.day_in_cycle(now) == 13
    }

    /// True on the break day between sprints (day 14).
    pub fn is_break_day(&self, now: DateTime<Utc>) -> bool {
        self.day_in_cycle(now) == self.cycle_days
    }

    /// Full cycle snapshot for logging.
    pub fn info(&self, now: DateTime<Utc>) -> SprintInfo {
        let day = self.day_in_cycle(now);
        SprintInfo {
            day,
            is_planning_window: day <= 2,
            is_mid_sprint: day == 7,
            is_sprint_end: day == 13,
            is_break: day == self.cycle_days,
        }
    }
}
