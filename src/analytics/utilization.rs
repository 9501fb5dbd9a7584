//! Utilization scoring. Pure functions: given a task set and an explicit
//! "now", the same inputs always produce the same outputs. No I/O happens
//! here.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::store::records::TaskRecord;
use crate::time_util;

/// Classification buckets. Every task lands in exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskBucket {
    Completed,
    InProgress,
    Overdue,
    Pending,
}

/// Classify a single task. Overdue takes priority over in-progress and
/// pending; completed tasks are never overdue.
pub fn classify(task: &TaskRecord, now: DateTime<Utc>) -> TaskBucket {
    let status = task.status.trim().to_lowercase();
    if matches!(status.as_str(), "completed" | "done") {
        return TaskBucket::Completed;
    }
    if let Some(due) = time_util::to_utc_opt(task.due_date.as_ref()) {
        if due < now {
            return TaskBucket::Overdue;
        }
    }
    if matches!(status.as_str(), "in-progress" | "in_progress" | "review") {
        return TaskBucket::InProgress;
    }
    // todo / pending / not-started and any free-form variant
    TaskBucket::Pending
}

/// Bucket counts for a task set, plus the deadline pressure used by the
/// caution rule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskBreakdown {
    pub completed: u64,
    pub in_progress: u64,
    pub overdue: u64,
    pub pending: u64,
    /// Open tasks due within the next 7 days.
    pub upcoming_deadlines: u64,
}

impl TaskBreakdown {
    pub fn total(&self) -> u64 {
        self.completed + self.in_progress + self.overdue + self.pending
    }
}

pub fn breakdown(tasks: &[TaskRecord], now: DateTime<Utc>) -> TaskBreakdown {
    let horizon = now + Duration::days(7);
    let mut b = TaskBreakdown::default();
    for task in tasks {
        let bucket = classify(task, now);
        match bucket {
            TaskBucket::Completed => b.completed += 1,
            TaskBucket::InProgress => b.in_progress += 1,
            TaskBucket::Overdue => b.overdue += 1,
            TaskBucket::Pending => b.pending += 1,
        }
        if bucket != TaskBucket::Completed && bucket != TaskBucket::Overdue {
            if let Some(due) = time_util::to_utc_opt(task.due_date.as_ref()) {
                if due >= now && due <= horizon {
                    b.upcoming_deadlines += 1;
                }
            }
        }
    }
    b
}

/// Weighted completion-pressure score. Overdue work weighs heaviest; barely
/// started work weighs least.
pub fn weighted_score(b: &TaskBreakdown) -> f64 {
    b.completed as f64 * 1.0
        + b.in_progress as f64 * 0.8
        + b.overdue as f64 * 1.2
        + b.pending as f64 * 0.2
}

/// Utilization percentage in `[0, 100]`. An empty task set is 0, not an
/// error.
pub fn utilization(b: &TaskBreakdown) -> f64 {
    let total = b.total();
    if total == 0 {
        return 0.0;
    }
    (weighted_score(b) / total as f64 * 100.0).min(100.0)
}

/// Member-level load status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MemberLoad {
    Balanced,
    Caution,
    Overloaded,
}

pub fn member_status(b: &TaskBreakdown) -> MemberLoad {
    if b.overdue > 0 {
        return MemberLoad::Overloaded;
    }
    let caution = b.upcoming_deadlines > 2
        || (b.in_progress > 5 && b.total() > 10)
        || utilization(b) >= 80.0;
    if caution {
        MemberLoad::Caution
    } else {
        MemberLoad::Balanced
    }
}

/// Facility-level load status; an independent scale from [`MemberLoad`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FacilityLoad {
    Low,
    Steady,
    Caution,
    Critical,
}

pub fn facility_status(utilization: f64) -> FacilityLoad {
    if utilization >= 90.0 {
        FacilityLoad::Critical
    } else if utilization >= 80.0 {
        FacilityLoad::Caution
    } else if utilization < 40.0 {
        FacilityLoad::Low
    } else {
        FacilityLoad::Steady
    }
}

/// Period-over-period trend in completed-task count, as a bounded
/// percentage.
///
/// The fallback ladder is asymmetric on purpose: dividing by a zero
/// previous period would either crash or produce absurd percentages, so
/// those branches substitute bounded estimates instead of the ratio.
pub fn trend(
    completed_cur: u64,
    completed_prev: u64,
    total_cur: u64,
    total_prev: u64,
) -> i64 {
    if completed_prev > 0 {
        let ratio =
            (completed_cur as f64 - completed_prev as f64) / completed_prev as f64 * 100.0;
        return ratio.round().clamp(-100.0, 100.0) as i64;
    }
    if completed_cur > 0 {
        if total_prev > 0 {
            let estimate =
                (completed_cur as f64 / total_prev as f64 * 100.0).round() as i64;
            return estimate.min(50);
        }
        return (completed_cur as i64 * 5).min(25);
    }
    if total_cur > 0 {
        return -((total_cur as i64 * 2).min(15));
    }
    0
}

/// Round to one decimal place for presentation-level percentages.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
