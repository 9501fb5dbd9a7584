//! Aggregation service: builds the global, facility and member report
//! payloads by fanning out reads over the data-access wrappers, normalizing
//! and deduplicating what comes back, scoring with the utilization
//! calculator, and finishing with the insights engine.
//!
//! Failure policy, stated once: a failed facility or project fetch degrades
//! that slice's contribution to empty and logs a warning. The report itself
//! only errors on access denial or when the requested central entity is
//! missing.

pub mod types;
pub mod utilization;

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Datelike, Duration, Utc};
use futures::future::join_all;

use crate::error::{Error, Result};
use crate::insights;
use crate::query::ReportRange;
use crate::store::records::{
    FacilityRecord, MembershipRecord, ProjectRecord, Role, TaskRecord, UserRecord,
};
use crate::store::{repository, Database};
use crate::time_util;

use types::*;
use utilization::{
    breakdown, classify, facility_status, member_status, round1, trend, utilization as score,
    MemberLoad, TaskBucket,
};

// ── Fetch stage ────────────────────────────────────────────────────

/// Everything a facility-scoped computation needs, loaded in one fan-out.
struct FacilityBundle {
    facility: FacilityRecord,
    memberships: Vec<MembershipRecord>,
    projects: Vec<ProjectRecord>,
    tasks: Vec<TaskRecord>,
}

impl FacilityBundle {
    fn empty(facility: FacilityRecord) -> Self {
        Self {
            facility,
            memberships: Vec::new(),
            projects: Vec::new(),
            tasks: Vec::new(),
        }
    }

    /// Distinct member ids: membership rows unioned with the facility
    /// document's member list (which includes the implicit owner).
    fn member_ids(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for m in &self.memberships {
            if !out.contains(&m.user_id) {
                out.push(m.user_id.clone());
            }
        }
        for id in self.facility.all_members() {
            if !out.contains(&id) {
                out.push(id);
            }
        }
        out
    }

    fn project_assignees(&self) -> HashMap<&str, &[String]> {
        self.projects
            .iter()
            .map(|p| (p.id.as_str(), p.assignees.as_slice()))
            .collect()
    }
}

async fn fetch_bundle(db: &Database, facility: FacilityRecord) -> Result<FacilityBundle> {
    let facility_id = facility.id.clone();
    let (memberships, projects) = db
        .reader()
        .call(move |conn| {
            let memberships = repository::list_memberships_for_facility(conn, &facility_id)?;
            let projects = repository::list_projects_for_facility(conn, &facility_id, false)?;
            Ok::<_, rusqlite::Error>((memberships, projects))
        })
        .await?;

    // Sibling task fetches run concurrently; nothing below depends on their
    // completion order.
    let fetches = projects.iter().map(|p| {
        let db = db.clone();
        let project_id = p.id.clone();
        async move {
            let pid = project_id.clone();
            match db
                .reader()
                .call(move |conn| repository::list_tasks_for_project(conn, &pid))
                .await
            {
                Ok(tasks) => tasks,
                Err(e) => {
                    log::warn!("task fetch failed for project {project_id}: {e}");
                    Vec::new()
                }
            }
        }
    });
    let tasks = dedup_tasks(join_all(fetches).await.into_iter().flatten().collect());

    Ok(FacilityBundle {
        facility,
        memberships,
        projects,
        tasks,
    })
}

/// Fetch a bundle, degrading to an empty contribution on failure.
async fn bundle_or_empty(db: &Database, facility: FacilityRecord) -> FacilityBundle {
    let name = facility.id.clone();
    match fetch_bundle(db, facility.clone()).await {
        Ok(bundle) => bundle,
        Err(e) => {
            log::warn!("facility fetch failed for {name}: {e}");
            FacilityBundle::empty(facility)
        }
    }
}

// ── Normalize stage ────────────────────────────────────────────────

/// Drop duplicate task ids, keeping first occurrence. Aggregating the same
/// task twice must never double-count it.
fn dedup_tasks(tasks: Vec<TaskRecord>) -> Vec<TaskRecord> {
    let mut seen = HashSet::new();
    tasks
        .into_iter()
        .filter(|t| seen.insert(t.id.clone()))
        .collect()
}

/// The most recent touch on a task: updated-at, else created-at.
fn touched_at(task: &TaskRecord) -> Option<DateTime<Utc>> {
    time_util::to_utc_opt(task.updated_at.as_ref())
        .or_else(|| time_util::to_utc_opt(task.created_at.as_ref()))
}

fn instant_in(
    raw: Option<&crate::time_util::RawInstant>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> bool {
    match time_util::to_utc_opt(raw) {
        Some(ts) => ts >= start && ts <= end,
        None => false,
    }
}

/// Range membership: active (not completed) tasks are always in range;
/// completed tasks only when created or updated inside the window.
fn in_range(task: &TaskRecord, start: DateTime<Utc>, end: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    if classify(task, now) != TaskBucket::Completed {
        return true;
    }
    instant_in(task.created_at.as_ref(), start, end) || instant_in(task.updated_at.as_ref(), start, end)
}

/// Chart-window relevance: created, updated, or due inside `[start, end)`.
fn in_window(task: &TaskRecord, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
    let end = end - Duration::nanoseconds(1);
    instant_in(task.created_at.as_ref(), start, end)
        || instant_in(task.updated_at.as_ref(), start, end)
        || instant_in(task.due_date.as_ref(), start, end)
}

/// Identity facets used by the assignee-matching ladder.
struct MatchKey<'a> {
    id: &'a str,
    auth_uid: Option<&'a str>,
}

impl<'a> MatchKey<'a> {
    fn for_user(user: &'a UserRecord) -> Self {
        Self {
            id: &user.id,
            auth_uid: user.firebase_uid.as_deref(),
        }
    }
}

/// The assignee-matching ladder, most direct rule first: `assignee_ids`
/// membership, the legacy single-assignee field (string or array), external
/// auth uid, then project-level assignee membership. Tasks matched by no
/// rule stay unattributed; they surface in the unassigned bucket rather
/// than being redistributed.
fn task_matches(
    task: &TaskRecord,
    key: &MatchKey<'_>,
    project_assignees: &HashMap<&str, &[String]>,
) -> bool {
    if task.assignee_ids.iter().any(|id| id == key.id) {
        return true;
    }
    if let Some(field) = &task.assignee_id {
        if field.ids().contains(&key.id) {
            return true;
        }
    }
    if let Some(uid) = key.auth_uid {
        if task.direct_assignees().contains(&uid) {
            return true;
        }
    }
    if let Some(assignees) = project_assignees.get(task.project_id.as_str()) {
        if assignees.iter().any(|a| a == key.id) {
            return true;
        }
    }
    false
}

/// Visibility filter: `member`-role viewers see only their own tasks within
/// a facility; every other role sees the full set.
fn visible_tasks(
    bundle: &FacilityBundle,
    viewer: &UserRecord,
    viewer_role: Role,
) -> Vec<TaskRecord> {
    if viewer_role != Role::Member {
        return bundle.tasks.clone();
    }
    let key = MatchKey::for_user(viewer);
    let assignees = bundle.project_assignees();
    bundle
        .tasks
        .iter()
        .filter(|t| task_matches(t, &key, &assignees))
        .cloned()
        .collect()
}

// ── Score stage ────────────────────────────────────────────────────

/// Deduplicated status counts with overdue taking priority, so the five
/// buckets always sum to the total.
fn status_counts(tasks: &[TaskRecord], now: DateTime<Utc>) -> TaskStatusCounts {
    let mut counts = TaskStatusCounts::default();
    for task in tasks {
        if classify(task, now) == TaskBucket::Overdue {
            counts.overdue += 1;
            continue;
        }
        match task.status.trim().to_lowercase().as_str() {
            "done" | "completed" => counts.done += 1,
            "review" => counts.review += 1,
            "in-progress" | "in_progress" => counts.in_progress += 1,
            _ => counts.pending += 1,
        }
    }
    counts
}

/// Period-over-period trend for a task set: completed counts in the current
/// window vs the immediately preceding window of equal length.
fn window_trend(
    tasks_all: &[TaskRecord],
    total_cur: u64,
    range: ReportRange,
    now: DateTime<Utc>,
) -> i64 {
    let (cur_start, cur_end) = range.bounds(now);
    let (prev_start, prev_end) = range.previous_bounds(now);
    let prev_end = prev_end - Duration::nanoseconds(1);

    let mut completed_cur = 0u64;
    let mut completed_prev = 0u64;
    let mut total_prev = 0u64;
    for task in tasks_all {
        let Some(ts) = touched_at(task) else { continue };
        let completed = classify(task, now) == TaskBucket::Completed;
        if ts >= cur_start && ts <= cur_end && completed {
            completed_cur += 1;
        }
        if ts >= prev_start && ts <= prev_end {
            total_prev += 1;
            if completed {
                completed_prev += 1;
            }
        }
    }
    trend(completed_cur, completed_prev, total_cur, total_prev)
}

fn member_summary_row(
    membership: &MembershipRecord,
    user: &UserRecord,
    tasks_all: &[TaskRecord],
    tasks_in_range: &[TaskRecord],
    range: ReportRange,
    now: DateTime<Utc>,
) -> MemberSummary {
    let b = breakdown(tasks_in_range, now);
    MemberSummary {
        user_id: user.id.clone(),
        facility_id: membership.facility_id.clone(),
        name: user.display_name(),
        role: membership.role,
        utilization: round1(score(&b)),
        status: member_status(&b),
        total_tasks: b.total(),
        completed_tasks: b.completed,
        in_progress_tasks: b.in_progress,
        overdue_tasks: b.overdue,
        trend: window_trend(tasks_all, b.total(), range, now),
    }
}

/// Users for a set of ids, fetched in one read. Missing users become
/// id-only stubs so a dangling membership still yields a row.
async fn load_users(db: &Database, ids: Vec<String>) -> HashMap<String, UserRecord> {
    let wanted = ids.clone();
    let loaded = db
        .reader()
        .call(move |conn| {
            let mut out = HashMap::new();
            for id in &wanted {
                if let Some(user) = repository::get_user(conn, id)? {
                    out.insert(id.clone(), user);
                }
            }
            Ok::<_, rusqlite::Error>(out)
        })
        .await;
    let mut users = match loaded {
        Ok(map) => map,
        Err(e) => {
            log::warn!("user fetch failed: {e}");
            HashMap::new()
        }
    };
    for id in ids {
        users.entry(id.clone()).or_insert_with(|| UserRecord {
            id,
            firebase_uid: None,
            email: None,
            first_name: None,
            last_name: None,
            profile_picture: None,
        });
    }
    users
}

/// One summary row per membership in the bundle, each scored against that
/// member's share of the (already visibility- and range-filtered) task set.
async fn member_summaries(
    db: &Database,
    bundle: &FacilityBundle,
    tasks_all: &[TaskRecord],
    tasks_in_range: &[TaskRecord],
    range: ReportRange,
    now: DateTime<Utc>,
) -> Vec<MemberSummary> {
    let ids: Vec<String> = bundle
        .memberships
        .iter()
        .map(|m| m.user_id.clone())
        .collect();
    let users = load_users(db, ids).await;
    let assignees = bundle.project_assignees();

    let mut rows = Vec::with_capacity(bundle.memberships.len());
    for membership in &bundle.memberships {
        let Some(user) = users.get(&membership.user_id) else {
            continue;
        };
        let key = MatchKey::for_user(user);
        let member_all: Vec<TaskRecord> = tasks_all
            .iter()
            .filter(|t| task_matches(t, &key, &assignees))
            .cloned()
            .collect();
        let member_in_range: Vec<TaskRecord> = tasks_in_range
            .iter()
            .filter(|t| task_matches(t, &key, &assignees))
            .cloned()
            .collect();
        rows.push(member_summary_row(
            membership,
            user,
            &member_all,
            &member_in_range,
            range,
            now,
        ));
    }
    rows
}

fn facility_summary(
    bundle: &FacilityBundle,
    tasks_in_range: &[TaskRecord],
    rows: &[MemberSummary],
    now: DateTime<Utc>,
) -> FacilitySummary {
    let b = breakdown(tasks_in_range, now);
    let utilization = round1(score(&b));
    let mut distribution = LoadDistribution::default();
    for row in rows {
        match row.status {
            MemberLoad::Balanced => distribution.balanced += 1,
            MemberLoad::Caution => distribution.caution += 1,
            MemberLoad::Overloaded => distribution.overloaded += 1,
        }
    }
    FacilitySummary {
        facility_id: bundle.facility.id.clone(),
        name: bundle.facility.name.clone(),
        utilization,
        status: facility_status(utilization),
        member_count: bundle.member_ids().len() as u64,
        task_count: tasks_in_range.len() as u64,
        distribution,
    }
}

fn task_ref(task: &TaskRecord) -> TaskRef {
    TaskRef {
        task_id: task.id.clone(),
        title: task.title.clone(),
        project_id: task.project_id.clone(),
        status: task.status.clone(),
        due_date: time_util::to_utc_opt(task.due_date.as_ref()),
    }
}

/// Order task lists by due date (undated last), then id, so payloads are
/// deterministic for a fixed snapshot.
fn sort_task_refs(mut refs: Vec<TaskRef>) -> Vec<TaskRef> {
    refs.sort_by(|a, b| match (a.due_date, b.due_date) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.task_id.cmp(&b.task_id)),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.task_id.cmp(&b.task_id),
    });
    refs
}

// ── Global report ──────────────────────────────────────────────────

pub async fn global_report(
    db: &Database,
    identity: &UserRecord,
    role: Role,
    range: ReportRange,
) -> Result<GlobalReport> {
    global_report_at(db, identity, role, range, Utc::now()).await
}

pub async fn global_report_at(
    db: &Database,
    identity: &UserRecord,
    role: Role,
    range: ReportRange,
    now: DateTime<Utc>,
) -> Result<GlobalReport> {
    let _ = role; // the caller's claim participates in cache keying upstream
    let uid = identity.id.clone();
    let (my_memberships, facilities) = db
        .reader()
        .call(move |conn| {
            let memberships = repository::list_memberships_for_user(conn, &uid)?;
            let facilities = repository::list_facilities_for_member(conn, &uid)?;
            Ok::<_, rusqlite::Error>((memberships, facilities))
        })
        .await?;

    let meta = ReportMeta {
        generated_at: now,
        range: range.to_key(),
        scope: "global".into(),
    };

    // No memberships is a valid state, not an error: a zeroed report.
    if facilities.is_empty() {
        let kpis = GlobalKpis::default();
        let counts = TaskStatusCounts::default();
        let insights = insights::global_insights(&kpis, &[], &[], &counts);
        return Ok(GlobalReport {
            meta,
            kpis,
            facilities: Vec::new(),
            members: Vec::new(),
            task_counts: counts,
            insights,
        });
    }

    let my_roles: HashMap<String, Role> = my_memberships
        .iter()
        .map(|m| (m.facility_id.clone(), m.role))
        .collect();

    let bundles = join_all(
        facilities
            .into_iter()
            .map(|f| bundle_or_empty(db, f)),
    )
    .await;

    let (start, end) = range.bounds(now);
    let mut facility_rows = Vec::with_capacity(bundles.len());
    let mut member_rows = Vec::new();
    let mut active_members: HashSet<String> = HashSet::new();
    let mut all_in_range: Vec<TaskRecord> = Vec::new();

    for bundle in &bundles {
        let viewer_role = my_roles
            .get(&bundle.facility.id)
            .copied()
            .unwrap_or(Role::Guest);
        let tasks_all = visible_tasks(bundle, identity, viewer_role);
        let tasks_in_range: Vec<TaskRecord> = tasks_all
            .iter()
            .filter(|t| in_range(t, start, end, now))
            .cloned()
            .collect();

        let rows = member_summaries(db, bundle, &tasks_all, &tasks_in_range, range, now).await;
        facility_rows.push(facility_summary(bundle, &tasks_in_range, &rows, now));
        member_rows.extend(rows);

        for m in &bundle.memberships {
            active_members.insert(m.user_id.clone());
        }
        all_in_range.extend(tasks_in_range);
    }

    let avg = if facility_rows.is_empty() {
        0.0
    } else {
        round1(
            facility_rows.iter().map(|f| f.utilization).sum::<f64>()
                / facility_rows.len() as f64,
        )
    };
    let kpis = GlobalKpis {
        active_members: active_members.len() as u64,
        total_facilities: facility_rows.len() as u64,
        avg_utilization: avg,
        critical_facilities: facility_rows
            .iter()
            .filter(|f| f.utilization >= 90.0)
            .count() as u64,
    };

    let task_counts = status_counts(&dedup_tasks(all_in_range), now);
    let insights =
        insights::global_insights(&kpis, &facility_rows, &member_rows, &task_counts);

    Ok(GlobalReport {
        meta,
        kpis,
        facilities: facility_rows,
        members: member_rows,
        task_counts,
        insights,
    })
}

// ── Facility report ────────────────────────────────────────────────

pub async fn facility_report(
    db: &Database,
    facility_id: &str,
    identity: &UserRecord,
    role: Role,
    range: ReportRange,
) -> Result<FacilityReport> {
    facility_report_at(db, facility_id, identity, role, range, Utc::now()).await
}

pub async fn facility_report_at(
    db: &Database,
    facility_id: &str,
    identity: &UserRecord,
    role: Role,
    range: ReportRange,
    now: DateTime<Utc>,
) -> Result<FacilityReport> {
    let _ = role;
    let fid = facility_id.to_string();
    let uid = identity.id.clone();
    let (facility, membership) = db
        .reader()
        .call(move |conn| {
            let facility = repository::get_facility(conn, &fid)?;
            let membership = repository::get_membership(conn, &uid, &fid)?;
            Ok::<_, rusqlite::Error>((facility, membership))
        })
        .await?;

    // The facility is the request's central entity: missing is an error,
    // and non-members get a refusal rather than a partial report.
    let facility =
        facility.ok_or_else(|| Error::NotFound(format!("facility {facility_id}")))?;
    if membership.is_none() {
        return Err(Error::AccessDenied(format!(
            "{} is not a member of facility {facility_id}",
            identity.id
        )));
    }

    let bundle = fetch_bundle(db, facility).await?;
    let (start, end) = range.bounds(now);
    let tasks_all = bundle.tasks.clone();
    let tasks_in_range: Vec<TaskRecord> = tasks_all
        .iter()
        .filter(|t| in_range(t, start, end, now))
        .cloned()
        .collect();

    let rows = member_summaries(db, &bundle, &tasks_all, &tasks_in_range, range, now).await;

    // Tasks no ladder rule could attribute to any member get their own
    // bucket instead of fabricated per-member splits.
    let users = load_users(db, bundle.member_ids()).await;
    let assignees = bundle.project_assignees();
    let mut unassigned = UnassignedBucket::default();
    for task in &tasks_in_range {
        let attributed = users
            .values()
            .any(|u| task_matches(task, &MatchKey::for_user(u), &assignees));
        if !attributed {
            unassigned.task_count += 1;
            if classify(task, now) == TaskBucket::Overdue {
                unassigned.overdue_count += 1;
            }
        }
    }

    let b = breakdown(&tasks_in_range, now);
    let facility_utilization = round1(score(&b));
    let counts = status_counts(&tasks_in_range, now);

    let pending_tasks = sort_task_refs(
        tasks_in_range
            .iter()
            .filter(|t| classify(t, now) == TaskBucket::Pending)
            .map(task_ref)
            .collect(),
    );
    let overdue_tasks = sort_task_refs(
        tasks_in_range
            .iter()
            .filter(|t| classify(t, now) == TaskBucket::Overdue)
            .map(task_ref)
            .collect(),
    );

    let kpis = FacilityKpis {
        active_members: bundle.member_ids().len() as u64,
        avg_utilization: facility_utilization,
        pending_tasks,
        overdue_tasks,
    };

    let charts = FacilityCharts {
        status_distribution: counts,
        weekly_utilization: weekly_series(&tasks_all, start, end, now),
        calendar: month_calendar(&tasks_all, now),
    };

    let insights =
        insights::facility_insights(&bundle.facility.name, facility_utilization, &counts, &rows);

    Ok(FacilityReport {
        meta: ReportMeta {
            generated_at: now,
            range: range.to_key(),
            scope: "facility".into(),
        },
        facility: FacilityInfo {
            facility_id: bundle.facility.id.clone(),
            name: bundle.facility.name.clone(),
            status: facility_status(facility_utilization),
            utilization: facility_utilization,
        },
        kpis,
        charts,
        members: rows,
        unassigned,
        insights,
    })
}

/// Weekly utilization across the range: tasks bucketed into 7-day windows
/// by relevance (created, updated, or due within the window).
fn weekly_series(
    tasks: &[TaskRecord],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Vec<WeeklyPoint> {
    time_util::week_windows(start, end)
        .into_iter()
        .map(|(ws, we)| {
            let bucket: Vec<TaskRecord> = tasks
                .iter()
                .filter(|t| in_window(t, ws, we))
                .cloned()
                .collect();
            let b = breakdown(&bucket, now);
            WeeklyPoint {
                week_start: time_util::day_key(ws),
                task_count: b.total(),
                utilization: round1(score(&b)),
            }
        })
        .collect()
}

/// Current-month workload calendar: tasks grouped by due day, each day
/// scored with the weighted formula.
fn month_calendar(tasks: &[TaskRecord], now: DateTime<Utc>) -> Vec<CalendarDay> {
    let start = time_util::month_start(now);
    let days = time_util::days_in_month(now.year(), now.month());

    let mut by_day: HashMap<String, Vec<TaskRecord>> = HashMap::new();
    for task in tasks {
        if let Some(due) = time_util::to_utc_opt(task.due_date.as_ref()) {
            if due.year() == now.year() && due.month() == now.month() {
                by_day
                    .entry(time_util::day_key(due))
                    .or_default()
                    .push(task.clone());
            }
        }
    }

    (0..days)
        .map(|offset| {
            let date = time_util::day_key(start + Duration::days(offset as i64));
            let day_tasks = by_day.remove(&date).unwrap_or_default();
            let b = breakdown(&day_tasks, now);
            CalendarDay {
                date,
                task_count: b.total(),
                utilization: round1(score(&b)),
            }
        })
        .collect()
}

// ── Member report ──────────────────────────────────────────────────

const TIMELINE_LIMIT: usize = 20;

pub async fn member_report(
    db: &Database,
    member_id: &str,
    identity: &UserRecord,
    role: Role,
    range: ReportRange,
    facility_id: Option<&str>,
) -> Result<MemberReport> {
    member_report_at(db, member_id, identity, role, range, facility_id, Utc::now()).await
}

#[allow(clippy::too_many_arguments)]
pub async fn member_report_at(
    db: &Database,
    member_id: &str,
    identity: &UserRecord,
    role: Role,
    range: ReportRange,
    facility_id: Option<&str>,
    now: DateTime<Utc>,
) -> Result<MemberReport> {
    if !crate::access::can_access_member_analytics(db, member_id, identity, role).await? {
        return Err(Error::AccessDenied(format!(
            "{} may not view analytics for {member_id}",
            identity.id
        )));
    }

    // Unresolvable members degrade to a stub record rather than failing:
    // the dashboard renders an empty panel, not an error page.
    let member = crate::identity::resolve(db, member_id).await?;
    let (info, key_id, key_uid) = match &member {
        Some(user) => (
            MemberInfo {
                user_id: user.id.clone(),
                name: user.display_name(),
                email: user.email.clone(),
                profile_picture: user.profile_picture.clone(),
                resolved: true,
            },
            user.id.clone(),
            user.firebase_uid.clone(),
        ),
        None => (
            MemberInfo {
                user_id: member_id.to_string(),
                name: member_id.to_string(),
                email: None,
                profile_picture: None,
                resolved: false,
            },
            member_id.to_string(),
            None,
        ),
    };

    let tasks_all = member_task_pool(db, &key_id, key_uid.as_deref(), facility_id).await?;
    let (start, end) = range.bounds(now);
    let tasks_in_range: Vec<TaskRecord> = tasks_all
        .iter()
        .filter(|t| in_range(t, start, end, now))
        .cloned()
        .collect();

    let b = breakdown(&tasks_in_range, now);
    let kpis = MemberKpis {
        total_tasks: b.total(),
        ongoing_tasks: b.in_progress,
        completed_tasks: b.completed,
        overdue_tasks: b.overdue,
        utilization: round1(score(&b)),
        trend: window_trend(&tasks_all, b.total(), range, now),
    };

    let charts = MemberCharts {
        daily: daily_series(&tasks_in_range, start, end, now),
    };
    let timeline = build_timeline(db, &tasks_all).await;
    let insights = insights::member_insights(&info.name, &kpis);

    Ok(MemberReport {
        meta: ReportMeta {
            generated_at: now,
            range: range.to_key(),
            scope: "member".into(),
        },
        member: info,
        kpis,
        charts,
        timeline,
        insights,
    })
}

/// Task pool for a member: scoped to the given facility when one is
/// provided (preferred), else the global cross-facility assignee lookup
/// kept for backward compatibility.
async fn member_task_pool(
    db: &Database,
    member_id: &str,
    auth_uid: Option<&str>,
    facility_id: Option<&str>,
) -> Result<Vec<TaskRecord>> {
    if let Some(fid) = facility_id {
        let fid_owned = fid.to_string();
        let facility = db
            .reader()
            .call(move |conn| repository::get_facility(conn, &fid_owned))
            .await?;
        match facility {
            Some(facility) => {
                let bundle = fetch_bundle(db, facility).await?;
                let key = MatchKey {
                    id: member_id,
                    auth_uid,
                };
                let assignees = bundle.project_assignees();
                return Ok(bundle
                    .tasks
                    .iter()
                    .filter(|t| task_matches(t, &key, &assignees))
                    .cloned()
                    .collect());
            }
            None => {
                log::warn!("facility {fid} not found; falling back to assignee lookup");
            }
        }
    }

    let id = member_id.to_string();
    let uid = auth_uid.map(str::to_string);
    let tasks = db
        .reader()
        .call(move |conn| {
            let mut tasks = repository::list_tasks_for_assignee(conn, &id)?;
            if let Some(uid) = uid {
                tasks.extend(repository::list_tasks_for_assignee(conn, &uid)?);
            }
            Ok::<_, rusqlite::Error>(tasks)
        })
        .await?;
    Ok(dedup_tasks(tasks))
}

/// Daily activity chart: each day of the range, tasks relevant to that day
/// (created, updated, or due on it), broken down and scored.
fn daily_series(
    tasks: &[TaskRecord],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Vec<DailyPoint> {
    let days = (end - start).num_days().max(0);
    (0..days)
        .map(|offset| {
            let day_start = start + Duration::days(offset);
            let day_end = day_start + Duration::days(1);
            let bucket: Vec<TaskRecord> = tasks
                .iter()
                .filter(|t| in_window(t, day_start, day_end))
                .cloned()
                .collect();
            let b = breakdown(&bucket, now);
            DailyPoint {
                date: time_util::day_key(day_start),
                total: b.total(),
                completed: b.completed,
                in_progress: b.in_progress,
                pending: b.pending,
                overdue: b.overdue,
                utilization: round1(score(&b)),
            }
        })
        .collect()
}

/// The member's most recent tasks, newest first, resolved to their parent
/// project names.
async fn build_timeline(db: &Database, tasks: &[TaskRecord]) -> Vec<TimelineEntry> {
    let mut ordered: Vec<&TaskRecord> = tasks.iter().collect();
    ordered.sort_by(|a, b| match (touched_at(b), touched_at(a)) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.id.cmp(&b.id)),
        (Some(_), None) => std::cmp::Ordering::Greater,
        (None, Some(_)) => std::cmp::Ordering::Less,
        (None, None) => a.id.cmp(&b.id),
    });
    ordered.truncate(TIMELINE_LIMIT);

    let project_ids: Vec<String> = ordered
        .iter()
        .map(|t| t.project_id.clone())
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    let names = db
        .reader()
        .call(move |conn| {
            let mut out = HashMap::new();
            for id in &project_ids {
                if let Some(project) = repository::get_project(conn, id)? {
                    out.insert(id.clone(), project.name);
                }
            }
            Ok::<_, rusqlite::Error>(out)
        })
        .await
        .unwrap_or_else(|e| {
            log::warn!("project name lookup failed: {e}");
            HashMap::new()
        });

    ordered
        .into_iter()
        .map(|task| TimelineEntry {
            task_id: task.id.clone(),
            title: task.title.clone(),
            project_id: task.project_id.clone(),
            project_name: names.get(&task.project_id).cloned(),
            status: task.status.clone(),
            due_date: time_util::to_utc_opt(task.due_date.as_ref()),
            touched_at: touched_at(task),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::records::AssigneeField;
    use crate::time_util::RawInstant;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap()
    }

    fn user(id: &str) -> UserRecord {
        UserRecord {
            id: id.into(),
            firebase_uid: Some(format!("fb-{id}")),
            email: Some(format!("{id}@example.com")),
            first_name: Some(id.to_uppercase()),
            last_name: None,
            profile_picture: None,
        }
    }

    fn facility(id: &str, name: &str, owner: &str) -> FacilityRecord {
        FacilityRecord {
            id: id.into(),
            name: name.into(),
            owner_id: owner.into(),
            members: Vec::new(),
            status: Some("active".into()),
            created_at: None,
            updated_at: None,
        }
    }

    fn membership(id: &str, uid: &str, fid: &str, role: Role) -> MembershipRecord {
        MembershipRecord {
            id: id.into(),
            user_id: uid.into(),
            facility_id: fid.into(),
            role,
            created_at: None,
            updated_at: None,
        }
    }

    fn project(id: &str, fid: &str, name: &str) -> ProjectRecord {
        ProjectRecord {
            id: id.into(),
            facility_id: fid.into(),
            name: name.into(),
            assignees: Vec::new(),
            status: Some("active".into()),
            archived: false,
            created_at: None,
            updated_at: None,
        }
    }

    fn task(id: &str, pid: &str, status: &str, assignee: Option<&str>, touched: &str) -> TaskRecord {
        TaskRecord {
            id: id.into(),
            project_id: pid.into(),
            title: format!("Task {id}"),
            assignee_id: assignee.map(|a| AssigneeField::One(a.into())),
            assignee_ids: Vec::new(),
            status: status.into(),
            priority: None,
            due_date: None,
            created_at: Some(RawInstant::Iso(format!("{touched}T09:00:00Z"))),
            updated_at: Some(RawInstant::Iso(format!("{touched}T10:00:00Z"))),
            deleted_at: None,
        }
    }

    /// Two facilities: North at exactly 95% utilization (3 done + 1
    /// in-progress), South at exactly 30% (5 pending + 1 in-progress).
    async fn seed_two_facilities() -> Database {
        let db = Database::open_memory().await.unwrap();
        db.writer()
            .call(|conn| {
                for u in ["u1", "u2"] {
                    repository::upsert_user(conn, &user(u))?;
                }
                repository::upsert_facility(conn, &facility("f1", "North", "u1"))?;
                repository::upsert_facility(conn, &facility("f2", "South", "u1"))?;
                repository::upsert_membership(conn, &membership("m1", "u1", "f1", Role::Owner))?;
                repository::upsert_membership(conn, &membership("m2", "u2", "f1", Role::Member))?;
                repository::upsert_membership(conn, &membership("m3", "u1", "f2", Role::Owner))?;
                repository::upsert_project(conn, &project("p1", "f1", "Fit-out"))?;
                repository::upsert_project(conn, &project("p2", "f2", "Remodel"))?;

                // North: 3 done (u1) + 1 in-progress (u2) -> 3.8/4 = 95%
                repository::upsert_task(conn, &task("t1", "p1", "done", Some("u1"), "2025-06-01"))?;
                repository::upsert_task(conn, &task("t2", "p1", "done", Some("u1"), "2025-06-02"))?;
                repository::upsert_task(conn, &task("t3", "p1", "done", Some("u1"), "2025-06-03"))?;
                repository::upsert_task(conn, &task("t4", "p1", "in-progress", Some("u2"), "2025-06-04"))?;

                // South: 4 pending (u1) + 1 pending + 1 in-progress
                // (unassigned) -> 1.8/6 = 30%
                for (i, touched) in [(5, "2025-06-05"), (6, "2025-06-06"), (7, "2025-06-07"), (8, "2025-06-08")] {
                    repository::upsert_task(
                        conn,
                        &task(&format!("t{i}"), "p2", "todo", Some("u1"), touched),
                    )?;
                }
                repository::upsert_task(conn, &task("t9", "p2", "todo", None, "2025-06-09"))?;
                repository::upsert_task(conn, &task("t10", "p2", "in-progress", None, "2025-06-10"))?;
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
        db
    }

    #[test]
    fn test_dedup_tasks_is_idempotent() {
        let tasks = vec![
            task("t1", "p1", "todo", None, "2025-06-01"),
            task("t1", "p1", "todo", None, "2025-06-01"),
            task("t2", "p1", "done", None, "2025-06-02"),
        ];
        let deduped = dedup_tasks(tasks);
        assert_eq!(deduped.len(), 2);
        let again = dedup_tasks(deduped);
        assert_eq!(again.len(), 2);
    }

    #[test]
    fn test_in_range_rules() {
        let start = Utc.with_ymd_and_hms(2025, 5, 18, 0, 0, 0).unwrap();
        let end = now();

        // Active tasks are always in range, whatever their dates
        let old_active = task("t", "p", "todo", None, "2024-01-01");
        assert!(in_range(&old_active, start, end, now()));

        // Completed tasks only when touched inside the window
        let recent_done = task("t", "p", "done", None, "2025-06-01");
        assert!(in_range(&recent_done, start, end, now()));
        let old_done = task("t", "p", "done", None, "2024-01-01");
        assert!(!in_range(&old_done, start, end, now()));

        // Unparseable timestamps exclude the task from date-bounded checks
        let mut odd = task("t", "p", "done", None, "2025-06-01");
        odd.created_at = Some(RawInstant::Iso("whenever".into()));
        odd.updated_at = Some(RawInstant::Iso("later".into()));
        assert!(!in_range(&odd, start, end, now()));
    }

    #[test]
    fn test_status_counts_sum_to_total() {
        let mut tasks = vec![
            task("t1", "p", "done", None, "2025-06-01"),
            task("t2", "p", "in-progress", None, "2025-06-01"),
            task("t3", "p", "review", None, "2025-06-01"),
            task("t4", "p", "todo", None, "2025-06-01"),
            task("t5", "p", "someday", None, "2025-06-01"),
        ];
        // An overdue review task counts as overdue, nothing else
        let mut overdue = task("t6", "p", "review", None, "2025-06-01");
        overdue.due_date = Some(RawInstant::Iso("2025-06-10".into()));
        tasks.push(overdue);

        let counts = status_counts(&tasks, now());
        assert_eq!(counts.done, 1);
        assert_eq!(counts.in_progress, 1);
        assert_eq!(counts.review, 1);
        assert_eq!(counts.pending, 2);
        assert_eq!(counts.overdue, 1);
        assert_eq!(counts.total(), tasks.len() as u64);
    }

    #[test]
    fn test_assignee_ladder() {
        let ada = user("u1");
        let key = MatchKey::for_user(&ada);
        let empty = HashMap::new();

        // assignee_ids membership
        let mut t = task("t", "p", "todo", None, "2025-06-01");
        t.assignee_ids = vec!["u1".into()];
        assert!(task_matches(&t, &key, &empty));

        // legacy field, array form
        let mut t = task("t", "p", "todo", None, "2025-06-01");
        t.assignee_id = Some(AssigneeField::Many(vec!["u9".into(), "u1".into()]));
        assert!(task_matches(&t, &key, &empty));

        // external auth uid
        let t = task("t", "p", "todo", Some("fb-u1"), "2025-06-01");
        assert!(task_matches(&t, &key, &empty));

        // project-level assignees
        let t = task("t", "p", "todo", None, "2025-06-01");
        let assignees: Vec<String> = vec!["u1".into()];
        let mut projects: HashMap<&str, &[String]> = HashMap::new();
        projects.insert("p", assignees.as_slice());
        assert!(task_matches(&t, &key, &projects));

        // no rule matches
        let t = task("t", "p", "todo", Some("u2"), "2025-06-01");
        assert!(!task_matches(&t, &key, &empty));
    }

    #[tokio::test]
    async fn test_global_report_kpis_and_insights() {
        let db = seed_two_facilities().await;
        let report = global_report_at(
            &db,
            &user("u1"),
            Role::Owner,
            ReportRange::default(),
            now(),
        )
        .await
        .unwrap();

        assert_eq!(report.kpis.total_facilities, 2);
        assert_eq!(report.kpis.active_members, 2);
        assert_eq!(report.kpis.avg_utilization, 62.5);
        assert_eq!(report.kpis.critical_facilities, 1);

        let north = report
            .facilities
            .iter()
            .find(|f| f.facility_id == "f1")
            .unwrap();
        assert_eq!(north.utilization, 95.0);
        assert_eq!(north.status, utilization::FacilityLoad::Critical);
        let south = report
            .facilities
            .iter()
            .find(|f| f.facility_id == "f2")
            .unwrap();
        assert_eq!(south.utilization, 30.0);
        assert_eq!(south.status, utilization::FacilityLoad::Low);

        // Both the critical and the underutilized facility are called out
        let ids: Vec<&str> = report.insights.iter().map(|i| i.id.as_str()).collect();
        assert!(ids.contains(&"critical-facilities"));
        assert!(ids.contains(&"low-facilities"));

        // done + inProgress + review + pending + overdue == total
        let c = &report.task_counts;
        assert_eq!(c.total(), 10);
        assert_eq!(c.done, 3);
        assert_eq!(c.in_progress, 2);
        assert_eq!(c.pending, 5);
    }

    #[tokio::test]
    async fn test_global_member_rows_one_per_facility_pair() {
        let db = seed_two_facilities().await;
        let report = global_report_at(
            &db,
            &user("u1"),
            Role::Owner,
            ReportRange::default(),
            now(),
        )
        .await
        .unwrap();

        // u1 belongs to two facilities: two independently scored rows
        let u1_rows: Vec<&MemberSummary> = report
            .members
            .iter()
            .filter(|m| m.user_id == "u1")
            .collect();
        assert_eq!(u1_rows.len(), 2);

        let in_north = u1_rows.iter().find(|m| m.facility_id == "f1").unwrap();
        assert_eq!(in_north.total_tasks, 3);
        assert_eq!(in_north.completed_tasks, 3);
        let in_south = u1_rows.iter().find(|m| m.facility_id == "f2").unwrap();
        assert_eq!(in_south.total_tasks, 4);
        assert_eq!(in_south.completed_tasks, 0);
    }

    #[tokio::test]
    async fn test_global_member_role_sees_own_tasks_only() {
        let db = seed_two_facilities().await;
        let report = global_report_at(
            &db,
            &user("u2"),
            Role::Member,
            ReportRange::default(),
            now(),
        )
        .await
        .unwrap();

        assert_eq!(report.kpis.total_facilities, 1);
        let north = &report.facilities[0];
        // u2 is a member: only their one in-progress task is visible
        assert_eq!(north.task_count, 1);
        assert_eq!(report.task_counts.total(), 1);
        assert_eq!(report.task_counts.in_progress, 1);
    }

    #[tokio::test]
    async fn test_global_report_no_memberships_is_zeroed() {
        let db = Database::open_memory().await.unwrap();
        let report = global_report_at(
            &db,
            &user("u9"),
            Role::Member,
            ReportRange::default(),
            now(),
        )
        .await
        .unwrap();

        assert_eq!(report.kpis.total_facilities, 0);
        assert_eq!(report.kpis.active_members, 0);
        assert_eq!(report.kpis.avg_utilization, 0.0);
        assert!(report.facilities.is_empty());
        assert!(report.members.is_empty());
        assert_eq!(report.task_counts.total(), 0);
        // The fallback insight keeps the list non-empty
        assert!(!report.insights.is_empty());
    }

    #[tokio::test]
    async fn test_facility_report_access() {
        let db = seed_two_facilities().await;

        let missing = facility_report_at(
            &db,
            "nope",
            &user("u1"),
            Role::Owner,
            ReportRange::default(),
            now(),
        )
        .await;
        assert!(matches!(missing, Err(Error::NotFound(_))));

        // u2 holds no membership in South
        let denied = facility_report_at(
            &db,
            "f2",
            &user("u2"),
            Role::Member,
            ReportRange::default(),
            now(),
        )
        .await;
        assert!(matches!(denied, Err(Error::AccessDenied(_))));
    }

    #[tokio::test]
    async fn test_facility_report_shape() {
        let db = seed_two_facilities().await;
        let report = facility_report_at(
            &db,
            "f2",
            &user("u1"),
            Role::Owner,
            ReportRange::default(),
            now(),
        )
        .await
        .unwrap();

        assert_eq!(report.facility.utilization, 30.0);
        assert_eq!(report.kpis.pending_tasks.len(), 5);
        assert_eq!(report.kpis.overdue_tasks.len(), 0);

        // The two tasks nobody matches land in the unassigned bucket
        assert_eq!(report.unassigned.task_count, 2);
        assert_eq!(report.unassigned.overdue_count, 0);

        // 4 weeks -> 4 weekly buckets, all tasks inside the range
        assert_eq!(report.charts.weekly_utilization.len(), 4);
        let bucketed: u64 = report
            .charts
            .weekly_utilization
            .iter()
            .map(|w| w.task_count)
            .sum();
        assert_eq!(bucketed, 6);

        // June has 30 calendar days
        assert_eq!(report.charts.calendar.len(), 30);

        assert!(!report.insights.is_empty());
        assert!(report.insights.len() <= crate::insights::MAX_INSIGHTS);
    }

    #[tokio::test]
    async fn test_facility_calendar_buckets_by_due_day() {
        let db = Database::open_memory().await.unwrap();
        db.writer()
            .call(|conn| {
                repository::upsert_user(conn, &user("u1"))?;
                repository::upsert_facility(conn, &facility("f1", "North", "u1"))?;
                repository::upsert_membership(conn, &membership("m1", "u1", "f1", Role::Owner))?;
                repository::upsert_project(conn, &project("p1", "f1", "Fit-out"))?;
                let mut t = task("t1", "p1", "todo", Some("u1"), "2025-06-01");
                t.due_date = Some(RawInstant::Iso("2025-06-20".into()));
                repository::upsert_task(conn, &t)?;
                let mut t = task("t2", "p1", "todo", Some("u1"), "2025-06-01");
                t.due_date = Some(RawInstant::Iso("2025-06-20".into()));
                repository::upsert_task(conn, &t)?;
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();

        let report = facility_report_at(
            &db,
            "f1",
            &user("u1"),
            Role::Owner,
            ReportRange::default(),
            now(),
        )
        .await
        .unwrap();

        let day = report
            .charts
            .calendar
            .iter()
            .find(|d| d.date == "2025-06-20")
            .unwrap();
        assert_eq!(day.task_count, 2);
        assert!(day.utilization > 0.0);
        let other = report
            .charts
            .calendar
            .iter()
            .find(|d| d.date == "2025-06-21")
            .unwrap();
        assert_eq!(other.task_count, 0);
    }

    async fn seed_member_history() -> Database {
        let db = Database::open_memory().await.unwrap();
        db.writer()
            .call(|conn| {
                repository::upsert_user(conn, &user("u3"))?;
                repository::upsert_facility(conn, &facility("f3", "East", "u3"))?;
                repository::upsert_membership(conn, &membership("m1", "u3", "f3", Role::Owner))?;
                repository::upsert_project(conn, &project("p3", "f3", "Expansion"))?;
                // Five tasks completed in the previous 1w window
                for i in 0..5 {
                    repository::upsert_task(
                        conn,
                        &task(&format!("old{i}"), "p3", "done", Some("u3"), "2025-06-03"),
                    )?;
                }
                // One open task in the current window
                repository::upsert_task(conn, &task("cur", "p3", "todo", Some("u3"), "2025-06-10"))?;
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
        db
    }

    #[tokio::test]
    async fn test_member_report_trend_collapse() {
        let db = seed_member_history().await;
        let report = member_report_at(
            &db,
            "u3",
            &user("u3"),
            Role::Member,
            ReportRange::parse("1w").unwrap(),
            Some("f3"),
            now(),
        )
        .await
        .unwrap();

        // Five completed last period, none this period
        assert_eq!(report.kpis.trend, -100);
        assert_eq!(report.kpis.total_tasks, 1);
        assert_eq!(report.kpis.completed_tasks, 0);
    }

    #[tokio::test]
    async fn test_member_report_timeline_and_charts() {
        let db = seed_member_history().await;
        let range = ReportRange::parse("2w").unwrap();
        let report = member_report_at(
            &db,
            "u3",
            &user("u3"),
            Role::Member,
            range,
            Some("f3"),
            now(),
        )
        .await
        .unwrap();

        assert_eq!(report.timeline.len(), 6);
        // Newest touch first, resolved to the parent project name
        assert_eq!(report.timeline[0].task_id, "cur");
        assert_eq!(report.timeline[0].project_name.as_deref(), Some("Expansion"));

        // One daily point per day of the range
        assert_eq!(report.charts.daily.len(), 14);
        let busy = report
            .charts
            .daily
            .iter()
            .find(|d| d.date == "2025-06-10")
            .unwrap();
        assert_eq!(busy.total, 1);
    }

    #[tokio::test]
    async fn test_member_report_stub_for_unknown_member() {
        let db = seed_two_facilities().await;
        let report = member_report_at(
            &db,
            "ghost",
            &user("u1"),
            Role::Owner,
            ReportRange::default(),
            None,
            now(),
        )
        .await
        .unwrap();

        assert!(!report.member.resolved);
        assert_eq!(report.member.user_id, "ghost");
        assert_eq!(report.kpis.total_tasks, 0);
        assert_eq!(report.kpis.utilization, 0.0);
        assert!(!report.insights.is_empty());
    }

    #[tokio::test]
    async fn test_member_report_global_fallback_without_facility() {
        let db = seed_two_facilities().await;
        // No facility given: the cross-facility assignee lookup finds u1's
        // tasks in both facilities.
        let report = member_report_at(
            &db,
            "u1",
            &user("u1"),
            Role::Owner,
            ReportRange::default(),
            None,
            now(),
        )
        .await
        .unwrap();
        assert_eq!(report.kpis.total_tasks, 7);
        assert_eq!(report.kpis.completed_tasks, 3);
    }

    #[tokio::test]
    async fn test_facility_with_no_tasks_scores_zero() {
        let db = Database::open_memory().await.unwrap();
        db.writer()
            .call(|conn| {
                repository::upsert_user(conn, &user("u1"))?;
                repository::upsert_facility(conn, &facility("f1", "North", "u1"))?;
                repository::upsert_membership(conn, &membership("m1", "u1", "f1", Role::Owner))?;
                repository::upsert_project(conn, &project("p1", "f1", "Fit-out"))?;
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();

        let report = global_report_at(
            &db,
            &user("u1"),
            Role::Owner,
            ReportRange::default(),
            now(),
        )
        .await
        .unwrap();
        assert_eq!(report.kpis.total_facilities, 1);
        assert_eq!(report.facilities[0].task_count, 0);
        assert_eq!(report.facilities[0].utilization, 0.0);
    }
}
