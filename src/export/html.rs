//! HTML rendering of report payloads. The output is a self-contained
//! document (inline CSS, no external assets) suitable for handing straight
//! to a rasterizer.

use std::fmt::Write as _;

use crate::analytics::types::{FacilityReport, GlobalReport, MemberReport};
use crate::insights::{Insight, InsightKind};

fn esc(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn page(title: &str, subtitle: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n<style>\n{}\n</style>\n</head>\n<body>\n<header>\n  <h1>{}</h1>\n  <p class=\"subtitle\">{}</p>\n</header>\n{}\n</body>\n</html>\n",
        esc(title),
        STYLE,
        esc(title),
        esc(subtitle),
        body
    )
}

const STYLE: &str = "\
body { font-family: -apple-system, 'Segoe UI', Helvetica, Arial, sans-serif; color: #1f2733; margin: 40px; }
header { border-bottom: 2px solid #2b6cb0; margin-bottom: 24px; padding-bottom: 12px; }
h1 { margin: 0; font-size: 22px; }
h2 { font-size: 16px; margin: 28px 0 10px; }
.subtitle { color: #5a6678; margin: 4px 0 0; font-size: 13px; }
.kpis { display: flex; gap: 16px; }
.kpi { flex: 1; border: 1px solid #d7dde6; border-radius: 6px; padding: 12px 16px; }
.kpi .value { font-size: 24px; font-weight: 600; }
.kpi .label { color: #5a6678; font-size: 12px; text-transform: uppercase; }
table { border-collapse: collapse; width: 100%; font-size: 13px; }
th, td { text-align: left; padding: 6px 10px; border-bottom: 1px solid #e4e8ee; }
th { color: #5a6678; font-weight: 600; }
.insight { border-left: 4px solid #8a94a3; padding: 8px 12px; margin: 8px 0; background: #f6f8fa; }
.insight.danger { border-color: #c53030; }
.insight.warning { border-color: #c05621; }
.insight.info { border-color: #2b6cb0; }
.insight.success { border-color: #2f855a; }
.insight .action { color: #5a6678; font-size: 12px; }
";

fn kpi(value: &str, label: &str) -> String {
    format!(
        "<div class=\"kpi\"><div class=\"value\">{}</div><div class=\"label\">{}</div></div>",
        esc(value),
        esc(label)
    )
}

fn insights_section(insights: &[Insight]) -> String {
    let mut out = String::from("<h2>Insights</h2>\n");
    for insight in insights {
        let kind = match insight.kind {
            InsightKind::Danger => "danger",
            InsightKind::Warning => "warning",
            InsightKind::Info => "info",
            InsightKind::Success => "success",
        };
        let _ = write!(
            out,
            "<div class=\"insight {kind}\"><div>{}</div><div class=\"action\">{}</div></div>\n",
            esc(&insight.message),
            esc(&insight.action)
        );
    }
    out
}

pub fn render_global(report: &GlobalReport) -> String {
    let mut body = String::new();

    body.push_str("<div class=\"kpis\">\n");
    body.push_str(&kpi(&report.kpis.active_members.to_string(), "Active members"));
    body.push_str(&kpi(&report.kpis.total_facilities.to_string(), "Facilities"));
    body.push_str(&kpi(
        &format!("{:.1}%", report.kpis.avg_utilization),
        "Avg utilization",
    ));
    body.push_str(&kpi(
        &report.kpis.critical_facilities.to_string(),
        "Critical facilities",
    ));
    body.push_str("</div>\n");

    body.push_str("<h2>Facilities</h2>\n<table>\n<tr><th>Facility</th><th>Utilization</th><th>Status</th><th>Members</th><th>Tasks</th></tr>\n");
    for f in &report.facilities {
        let _ = write!(
            body,
            "<tr><td>{}</td><td>{:.1}%</td><td>{:?}</td><td>{}</td><td>{}</td></tr>\n",
            esc(&f.name),
            f.utilization,
            f.status,
            f.member_count,
            f.task_count
        );
    }
    body.push_str("</table>\n");

    body.push_str("<h2>Members</h2>\n<table>\n<tr><th>Member</th><th>Facility</th><th>Role</th><th>Utilization</th><th>Status</th><th>Trend</th></tr>\n");
    for m in &report.members {
        let _ = write!(
            body,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{:.1}%</td><td>{:?}</td><td>{}%</td></tr>\n",
            esc(&m.name),
            esc(&m.facility_id),
            m.role,
            m.utilization,
            m.status,
            m.trend
        );
    }
    body.push_str("</table>\n");

    let c = &report.task_counts;
    body.push_str("<h2>Task status</h2>\n<table>\n<tr><th>Done</th><th>In progress</th><th>Review</th><th>Pending</th><th>Overdue</th><th>Total</th></tr>\n");
    let _ = write!(
        body,
        "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n</table>\n",
        c.done, c.in_progress, c.review, c.pending, c.overdue, c.total()
    );

    body.push_str(&insights_section(&report.insights));

    page(
        "Nexora Analytics — Global Report",
        &format!(
            "Range {} · generated {}",
            report.meta.range,
            report.meta.generated_at.format("%Y-%m-%d %H:%M UTC")
        ),
        &body,
    )
}

pub fn render_facility(report: &FacilityReport) -> String {
    let mut body = String::new();

    body.push_str("<div class=\"kpis\">\n");
    body.push_str(&kpi(&report.kpis.active_members.to_string(), "Active members"));
    body.push_str(&kpi(
        &format!("{:.1}%", report.kpis.avg_utilization),
        "Utilization",
    ));
    body.push_str(&kpi(
        &report.kpis.pending_tasks.len().to_string(),
        "Pending tasks",
    ));
    body.push_str(&kpi(
        &report.kpis.overdue_tasks.len().to_string(),
        "Overdue tasks",
    ));
    body.push_str("</div>\n");

    body.push_str("<h2>Members</h2>\n<table>\n<tr><th>Member</th><th>Role</th><th>Utilization</th><th>Status</th><th>Tasks</th><th>Overdue</th></tr>\n");
    for m in &report.members {
        let _ = write!(
            body,
            "<tr><td>{}</td><td>{}</td><td>{:.1}%</td><td>{:?}</td><td>{}</td><td>{}</td></tr>\n",
            esc(&m.name),
            m.role,
            m.utilization,
            m.status,
            m.total_tasks,
            m.overdue_tasks
        );
    }
    if report.unassigned.task_count > 0 {
        let _ = write!(
            body,
            "<tr><td><em>Unassigned</em></td><td>—</td><td>—</td><td>—</td><td>{}</td><td>{}</td></tr>\n",
            report.unassigned.task_count, report.unassigned.overdue_count
        );
    }
    body.push_str("</table>\n");

    body.push_str("<h2>Weekly utilization</h2>\n<table>\n<tr><th>Week of</th><th>Tasks</th><th>Utilization</th></tr>\n");
    for point in &report.charts.weekly_utilization {
        let _ = write!(
            body,
            "<tr><td>{}</td><td>{}</td><td>{:.1}%</td></tr>\n",
            esc(&point.week_start),
            point.task_count,
            point.utilization
        );
    }
    body.push_str("</table>\n");

    body.push_str("<h2>Overdue tasks</h2>\n<table>\n<tr><th>Task</th><th>Status</th><th>Due</th></tr>\n");
    for task in &report.kpis.overdue_tasks {
        let _ = write!(
            body,
            "<tr><td>{}</td><td>{}</td><td>{}</td></tr>\n",
            esc(&task.title),
            esc(&task.status),
            task.due_date
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "—".into())
        );
    }
    body.push_str("</table>\n");

    body.push_str(&insights_section(&report.insights));

    page(
        &format!("Nexora Analytics — {}", report.facility.name),
        &format!(
            "Facility report · range {} · generated {}",
            report.meta.range,
            report.meta.generated_at.format("%Y-%m-%d %H:%M UTC")
        ),
        &body,
    )
}

pub fn render_member(report: &MemberReport) -> String {
    let mut body = String::new();

    body.push_str("<div class=\"kpis\">\n");
    body.push_str(&kpi(&report.kpis.total_tasks.to_string(), "Total tasks"));
    body.push_str(&kpi(&report.kpis.completed_tasks.to_string(), "Completed"));
    body.push_str(&kpi(&report.kpis.ongoing_tasks.to_string(), "Ongoing"));
    body.push_str(&kpi(
        &format!("{:.1}%", report.kpis.utilization),
        "Utilization",
    ));
    body.push_str(&kpi(&format!("{}%", report.kpis.trend), "Trend"));
    body.push_str("</div>\n");

    body.push_str("<h2>Recent tasks</h2>\n<table>\n<tr><th>Task</th><th>Project</th><th>Status</th><th>Due</th></tr>\n");
    for entry in &report.timeline {
        let _ = write!(
            body,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
            esc(&entry.title),
            esc(entry.project_name.as_deref().unwrap_or(&entry.project_id)),
            esc(&entry.status),
            entry
                .due_date
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "—".into())
        );
    }
    body.push_str("</table>\n");

    body.push_str(&insights_section(&report.insights));

    page(
        &format!("Nexora Analytics — {}", report.member.name),
        &format!(
            "Member report · range {} · generated {}",
            report.meta.range,
            report.meta.generated_at.format("%Y-%m-%d %H:%M UTC")
        ),
        &body,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::types::*;
    use chrono::Utc;

    fn meta(scope: &str) -> ReportMeta {
        ReportMeta {
            generated_at: Utc::now(),
            range: "4w".into(),
            scope: scope.into(),
        }
    }

    #[test]
    fn test_global_render_is_self_contained() {
        let report = GlobalReport {
            meta: meta("global"),
            kpis: GlobalKpis {
                active_members: 5,
                total_facilities: 2,
                avg_utilization: 62.5,
                critical_facilities: 1,
            },
            facilities: Vec::new(),
            members: Vec::new(),
            task_counts: TaskStatusCounts::default(),
            insights: Vec::new(),
        };
        let html = render_global(&report);
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("62.5%"));
        assert!(html.contains("<style>"));
        assert!(!html.contains("http://"));
        assert!(!html.contains("https://"));
    }

    #[test]
    fn test_member_render_escapes_html() {
        let report = MemberReport {
            meta: meta("member"),
            member: MemberInfo {
                user_id: "u1".into(),
                name: "<script>alert(1)</script>".into(),
                email: None,
                profile_picture: None,
                resolved: true,
            },
            kpis: MemberKpis::default(),
            charts: MemberCharts::default(),
            timeline: Vec::new(),
            insights: Vec::new(),
        };
        let html = render_member(&report);
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }
}
