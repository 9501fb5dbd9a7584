//! Rule-based insights. Stateless: each function scans already-aggregated
//! numbers and emits ranked observations. Rules fire independently; the
//! result is truncated to the four most severe, and a synthesized fallback
//! guarantees the list is never empty.

use serde::Serialize;

use crate::analytics::types::{FacilitySummary, GlobalKpis, MemberKpis, MemberSummary, TaskStatusCounts};
use crate::analytics::utilization::MemberLoad;

pub const MAX_INSIGHTS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InsightKind {
    Danger,
    Warning,
    Info,
    Success,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Insight {
    pub id: String,
    pub kind: InsightKind,
    pub severity: u8,
    pub message: String,
    pub action: String,
}

impl Insight {
    fn new(
        id: &str,
        kind: InsightKind,
        severity: u8,
        message: String,
        action: &str,
    ) -> Self {
        Self {
            id: id.to_string(),
            kind,
            severity,
            message,
            action: action.to_string(),
        }
    }
}

/// Rank by severity, keep the top four, and synthesize a fallback when no
/// rule fired.
fn finalize(mut insights: Vec<Insight>, utilization: f64) -> Vec<Insight> {
    if insights.is_empty() {
        insights.push(fallback(utilization));
    }
    insights.sort_by(|a, b| b.severity.cmp(&a.severity));
    insights.truncate(MAX_INSIGHTS);
    insights
}

fn fallback(utilization: f64) -> Insight {
    if utilization < 40.0 {
        Insight::new(
            "steady-underutilized",
            InsightKind::Info,
            10,
            format!("Utilization is at {utilization:.0}% with capacity to spare"),
            "Consider pulling forward planned work",
        )
    } else if utilization < 80.0 {
        Insight::new(
            "steady-stable",
            InsightKind::Success,
            10,
            "Operations are running smoothly".to_string(),
            "Keep the current cadence",
        )
    } else {
        Insight::new(
            "steady-optimal",
            InsightKind::Success,
            10,
            format!("Utilization is at an optimal {utilization:.0}%"),
            "Monitor for overload as new work lands",
        )
    }
}

/// Insights over the cross-facility dashboard.
pub fn global_insights(
    kpis: &GlobalKpis,
    facilities: &[FacilitySummary],
    members: &[MemberSummary],
    counts: &TaskStatusCounts,
) -> Vec<Insight> {
    let mut out = Vec::new();

    if kpis.critical_facilities > 0 {
        out.push(Insight::new(
            "critical-facilities",
            InsightKind::Danger,
            95,
            format!(
                "{} of {} facilities are running at 90%+ utilization",
                kpis.critical_facilities, kpis.total_facilities
            ),
            "Rebalance workload away from critical facilities",
        ));
    }

    let overloaded = members
        .iter()
        .filter(|m| m.status == MemberLoad::Overloaded)
        .count();
    if overloaded > 0 {
        out.push(Insight::new(
            "overloaded-members",
            InsightKind::Warning,
            85,
            format!("{overloaded} member(s) are carrying overdue work"),
            "Review overdue tasks and redistribute where possible",
        ));
    }

    if counts.total() > 0 && counts.completion_rate() < 50.0 {
        out.push(Insight::new(
            "low-completion",
            InsightKind::Warning,
            70,
            format!(
                "Completion rate is {:.0}% across all facilities",
                counts.completion_rate()
            ),
            "Unblock stalled tasks before taking on new work",
        ));
    }

    if counts.total() > 0 && counts.ongoing_rate() > 40.0 {
        out.push(Insight::new(
            "high-ongoing",
            InsightKind::Info,
            55,
            format!("{:.0}% of tasks are currently in flight", counts.ongoing_rate()),
            "Limit work in progress to improve throughput",
        ));
    }

    let low = facilities
        .iter()
        .filter(|f| f.utilization < 40.0)
        .count();
    if low > 0 {
        out.push(Insight::new(
            "low-facilities",
            InsightKind::Info,
            45,
            format!("{low} facility(ies) are below 40% utilization"),
            "Capacity is available for additional projects",
        ));
    }

    finalize(out, kpis.avg_utilization)
}

/// Insights for a single facility.
pub fn facility_insights(
    name: &str,
    utilization: f64,
    counts: &TaskStatusCounts,
    members: &[MemberSummary],
) -> Vec<Insight> {
    let mut out = Vec::new();

    if utilization >= 100.0 {
        out.push(Insight::new(
            "facility-overloaded",
            InsightKind::Danger,
            95,
            format!("{name} is past capacity at {utilization:.0}% utilization"),
            "Pause intake and clear overdue work first",
        ));
    } else if utilization >= 90.0 {
        out.push(Insight::new(
            "facility-high-utilization",
            InsightKind::Warning,
            85,
            format!("{name} is running hot at {utilization:.0}% utilization"),
            "Watch closely; small slips will cascade",
        ));
    }

    if counts.overdue > 0 {
        out.push(Insight::new(
            "facility-overdue",
            InsightKind::Warning,
            80,
            format!("{} task(s) are past their due date", counts.overdue),
            "Triage overdue tasks in the next standup",
        ));
    }

    if counts.total() > 0 && counts.completion_rate() < 60.0 {
        out.push(Insight::new(
            "facility-low-completion",
            InsightKind::Warning,
            65,
            format!("Completion rate is {:.0}%", counts.completion_rate()),
            "Break large tasks down and close finished work",
        ));
    }

    if counts.total() > 0 && counts.ongoing_rate() > 50.0 {
        out.push(Insight::new(
            "facility-high-ongoing",
            InsightKind::Info,
            55,
            format!("{:.0}% of tasks are in progress or review", counts.ongoing_rate()),
            "Finish open items before starting new ones",
        ));
    }

    if utilization < 40.0 && counts.total() > 0 {
        out.push(Insight::new(
            "facility-underutilized",
            InsightKind::Info,
            45,
            format!("{name} is underutilized at {utilization:.0}%"),
            "Capacity is available for additional projects",
        ));
    }

    let overloaded = members
        .iter()
        .filter(|m| m.status == MemberLoad::Overloaded)
        .count();
    if overloaded > 0 {
        out.push(Insight::new(
            "facility-overloaded-members",
            InsightKind::Warning,
            75,
            format!("{overloaded} member(s) in {name} carry overdue work"),
            "Redistribute overdue tasks across the team",
        ));
    }

    finalize(out, utilization)
}

/// Insights for a single member.
pub fn member_insights(name: &str, kpis: &MemberKpis) -> Vec<Insight> {
    let mut out = Vec::new();
    let total = kpis.total_tasks;

    if kpis.utilization >= 100.0 {
        out.push(Insight::new(
            "member-overloaded",
            InsightKind::Danger,
            95,
            format!("{name} is overloaded at {:.0}% utilization", kpis.utilization),
            "Reassign part of this workload now",
        ));
    } else if kpis.utilization >= 90.0 {
        out.push(Insight::new(
            "member-high-utilization",
            InsightKind::Warning,
            85,
            format!("{name} is near capacity at {:.0}%", kpis.utilization),
            "Avoid assigning additional tasks this week",
        ));
    }

    if kpis.overdue_tasks > 0 {
        out.push(Insight::new(
            "member-overdue",
            InsightKind::Warning,
            80,
            format!("{} task(s) assigned to {name} are overdue", kpis.overdue_tasks),
            "Agree on new due dates or hand tasks off",
        ));
    }

    if total > 0 {
        let completion = kpis.completed_tasks as f64 / total as f64 * 100.0;
        if completion < 60.0 {
            out.push(Insight::new(
                "member-low-completion",
                InsightKind::Warning,
                65,
                format!("Completion rate is {completion:.0}%"),
                "Close finished work and surface blockers",
            ));
        }

        let ongoing = kpis.ongoing_tasks as f64 / total as f64 * 100.0;
        if ongoing > 50.0 {
            out.push(Insight::new(
                "member-high-ongoing",
                InsightKind::Info,
                55,
                format!("{ongoing:.0}% of this workload is in flight"),
                "Focus on finishing before picking up new tasks",
            ));
        }
    }

    if kpis.trend <= -50 {
        out.push(Insight::new(
            "member-slowing",
            InsightKind::Info,
            50,
            format!("Completed-task count is down {}% period over period", -kpis.trend),
            "Check whether priorities shifted or work is stuck",
        ));
    }

    finalize(out, kpis.utilization)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::types::{FacilitySummary, LoadDistribution};

    fn facility_summary(id: &str, utilization: f64) -> FacilitySummary {
        FacilitySummary {
            facility_id: id.into(),
            name: format!("Facility {id}"),
            utilization,
            status: crate::analytics::utilization::facility_status(utilization),
            member_count: 3,
            task_count: 10,
            distribution: LoadDistribution::default(),
        }
    }

    #[test]
    fn test_quiet_input_yields_fallback() {
        let kpis = GlobalKpis {
            active_members: 3,
            total_facilities: 1,
            avg_utilization: 65.0,
            critical_facilities: 0,
        };
        let counts = TaskStatusCounts {
            done: 7,
            in_progress: 2,
            pending: 1,
            ..Default::default()
        };
        let insights = global_insights(&kpis, &[facility_summary("f1", 65.0)], &[], &counts);
        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].id, "steady-stable");
        assert_eq!(insights[0].kind, InsightKind::Success);
    }

    #[test]
    fn test_never_empty_even_for_zeroed_input() {
        let insights = global_insights(
            &GlobalKpis::default(),
            &[],
            &[],
            &TaskStatusCounts::default(),
        );
        assert!(!insights.is_empty());
    }

    #[test]
    fn test_truncated_to_four_most_severe() {
        // Drive every facility rule at once
        let counts = TaskStatusCounts {
            done: 1,
            in_progress: 6,
            review: 1,
            pending: 1,
            overdue: 3,
        };
        let members = vec![MemberSummary {
            user_id: "u1".into(),
            facility_id: "f1".into(),
            name: "Ada".into(),
            role: crate::store::records::Role::Member,
            utilization: 100.0,
            status: MemberLoad::Overloaded,
            total_tasks: 5,
            completed_tasks: 0,
            in_progress_tasks: 2,
            overdue_tasks: 3,
            trend: 0,
        }];
        let insights = facility_insights("North", 101.0, &counts, &members);
        assert_eq!(insights.len(), MAX_INSIGHTS);
        // Ranked most severe first
        for pair in insights.windows(2) {
            assert!(pair[0].severity >= pair[1].severity);
        }
        assert_eq!(insights[0].id, "facility-overloaded");
    }

    #[test]
    fn test_critical_and_low_facilities_both_reported() {
        // One facility at 95%, one at 30%
        let kpis = GlobalKpis {
            active_members: 6,
            total_facilities: 2,
            avg_utilization: 62.5,
            critical_facilities: 1,
        };
        let counts = TaskStatusCounts {
            done: 10,
            in_progress: 2,
            pending: 3,
            ..Default::default()
        };
        let facilities = vec![facility_summary("f1", 95.0), facility_summary("f2", 30.0)];
        let insights = global_insights(&kpis, &facilities, &[], &counts);

        let ids: Vec<&str> = insights.iter().map(|i| i.id.as_str()).collect();
        assert!(ids.contains(&"critical-facilities"));
        assert!(ids.contains(&"low-facilities"));
    }

    #[test]
    fn test_member_overload_outranks_everything() {
        let kpis = MemberKpis {
            total_tasks: 10,
            ongoing_tasks: 2,
            completed_tasks: 2,
            overdue_tasks: 4,
            utilization: 104.0,
            trend: -60,
        };
        let insights = member_insights("Ada", &kpis);
        assert_eq!(insights.len(), MAX_INSIGHTS);
        assert_eq!(insights[0].id, "member-overloaded");
        assert_eq!(insights[0].kind, InsightKind::Danger);
    }

    #[test]
    fn test_underutilized_fallback_mentions_capacity() {
        let kpis = MemberKpis {
            total_tasks: 0,
            ..Default::default()
        };
        let insights = member_insights("Ada", &kpis);
        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].id, "steady-underutilized");
    }
}
