use chrono::{DateTime, Utc};
use serde::Serialize;

use super::utilization::{FacilityLoad, MemberLoad};
use crate::insights::Insight;
use crate::store::records::Role;

/// Envelope common to every report payload. The wire shape is camelCase to
/// match what the dashboard client already consumes.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportMeta {
    pub generated_at: DateTime<Utc>,
    pub range: String,
    pub scope: String,
}

/// Deduplicated task-status counts. Overdue is mutually exclusive with the
/// other buckets, so the five always sum to `total`.
#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatusCounts {
    pub done: u64,
    pub in_progress: u64,
    pub review: u64,
    pub pending: u64,
    pub overdue: u64,
}

impl TaskStatusCounts {
    pub fn total(&self) -> u64 {
        self.done + self.in_progress + self.review + self.pending + self.overdue
    }

    /// Share of finished work, in percent. Zero tasks reads as zero.
    pub fn completion_rate(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            self.done as f64 / total as f64 * 100.0
        }
    }

    /// Share of in-flight work (in-progress + review), in percent.
    pub fn ongoing_rate(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            (self.in_progress + self.review) as f64 / total as f64 * 100.0
        }
    }
}

// ── Global report ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalKpis {
    pub active_members: u64,
    pub total_facilities: u64,
    pub avg_utilization: f64,
    pub critical_facilities: u64,
}

/// Per-member counts of member load statuses within one facility.
#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadDistribution {
    pub balanced: u64,
    pub caution: u64,
    pub overloaded: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FacilitySummary {
    pub facility_id: String,
    pub name: String,
    pub utilization: f64,
    pub status: FacilityLoad,
    pub member_count: u64,
    pub task_count: u64,
    pub distribution: LoadDistribution,
}

/// One row per (user, facility) pair. A user in N facilities yields N rows,
/// each scored against that facility's task subset only.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberSummary {
    pub user_id: String,
    pub facility_id: String,
    pub name: String,
    pub role: Role,
    pub utilization: f64,
    pub status: MemberLoad,
    pub total_tasks: u64,
    pub completed_tasks: u64,
    pub in_progress_tasks: u64,
    pub overdue_tasks: u64,
    pub trend: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalReport {
    pub meta: ReportMeta,
    pub kpis: GlobalKpis,
    pub facilities: Vec<FacilitySummary>,
    pub members: Vec<MemberSummary>,
    pub task_counts: TaskStatusCounts,
    pub insights: Vec<Insight>,
}

// ── Facility report ────────────────────────────────────────────────

/// Lightweight task reference for pending/overdue listings.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRef {
    pub task_id: String,
    pub title: String,
    pub project_id: String,
    pub status: String,
    pub due_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FacilityKpis {
    pub active_members: u64,
    pub avg_utilization: f64,
    pub pending_tasks: Vec<TaskRef>,
    pub overdue_tasks: Vec<TaskRef>,
}

/// One day of the current-month workload calendar.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarDay {
    pub date: String,
    pub task_count: u64,
    pub utilization: f64,
}

/// One 7-day window of the range-wide utilization series.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyPoint {
    pub week_start: String,
    pub task_count: u64,
    pub utilization: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FacilityCharts {
    pub status_distribution: TaskStatusCounts,
    pub weekly_utilization: Vec<WeeklyPoint>,
    pub calendar: Vec<CalendarDay>,
}

/// Tasks no assignee-matching rule could attribute to a member. Surfaced as
/// its own bucket instead of being redistributed.
#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnassignedBucket {
    pub task_count: u64,
    pub overdue_count: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FacilityInfo {
    pub facility_id: String,
    pub name: String,
    pub status: FacilityLoad,
    pub utilization: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FacilityReport {
    pub meta: ReportMeta,
    pub facility: FacilityInfo,
    pub kpis: FacilityKpis,
    pub charts: FacilityCharts,
    pub members: Vec<MemberSummary>,
    pub unassigned: UnassignedBucket,
    pub insights: Vec<Insight>,
}

// ── Member report ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberInfo {
    pub user_id: String,
    pub name: String,
    pub email: Option<String>,
    pub profile_picture: Option<String>,
    /// False when the id could not be resolved and this is a stub.
    pub resolved: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberKpis {
    pub total_tasks: u64,
    pub ongoing_tasks: u64,
    pub completed_tasks: u64,
    pub overdue_tasks: u64,
    pub utilization: f64,
    pub trend: i64,
}

/// One day of the member's activity chart.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyPoint {
    pub date: String,
    pub total: u64,
    pub completed: u64,
    pub in_progress: u64,
    pub pending: u64,
    pub overdue: u64,
    pub utilization: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberCharts {
    pub daily: Vec<DailyPoint>,
}

/// One of the member's most recent tasks, resolved to its parent project.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEntry {
    pub task_id: String,
    pub title: String,
    pub project_id: String,
    pub project_name: Option<String>,
    pub status: String,
    pub due_date: Option<DateTime<Utc>>,
    pub touched_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberReport {
    pub meta: ReportMeta,
    pub member: MemberInfo,
    pub kpis: MemberKpis,
    pub charts: MemberCharts,
    pub timeline: Vec<TimelineEntry>,
    pub insights: Vec<Insight>,
}
