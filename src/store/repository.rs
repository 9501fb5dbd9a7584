//! Thin per-entity data-access wrappers over the snapshot store. Read
//! functions return plain records; the aggregation engine never writes
//! through here except via the snapshot importer's upserts.

use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::records::{
    FacilityRecord, MembershipRecord, ProjectRecord, Role, TaskRecord, UserRecord,
};

fn to_json_text<T: Serialize>(value: &T) -> Option<String> {
    serde_json::to_string(value).ok()
}

fn opt_json_text<T: Serialize>(value: &Option<T>) -> Option<String> {
    value.as_ref().and_then(to_json_text)
}

fn from_json_text<T: DeserializeOwned>(text: Option<String>) -> Option<T> {
    text.and_then(|s| serde_json::from_str(&s).ok())
}

// ── Facilities ─────────────────────────────────────────────────────

pub fn upsert_facility(
    conn: &Connection,
    facility: &FacilityRecord,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO facilities (
            facility_id, name, owner_id, members, status,
            created_at, updated_at, cached_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, datetime('now'))
        ON CONFLICT(facility_id) DO UPDATE SET
            name=excluded.name, owner_id=excluded.owner_id,
            members=excluded.members, status=excluded.status,
            created_at=excluded.created_at, updated_at=excluded.updated_at,
            cached_at=excluded.cached_at",
        params![
            facility.id,
            facility.name,
            facility.owner_id,
            to_json_text(&facility.members).unwrap_or_else(|| "[]".into()),
            facility.status,
            opt_json_text(&facility.created_at),
            opt_json_text(&facility.updated_at),
        ],
    )?;
    Ok(())
}

fn facility_from_row(row: &rusqlite::Row<'_>) -> Result<FacilityRecord, rusqlite::Error> {
    Ok(FacilityRecord {
        id: row.get("facility_id")?,
        name: row.get("name")?,
        owner_id: row.get("owner_id")?,
        members: from_json_text(row.get("members")?).unwrap_or_default(),
        status: row.get("status")?,
        created_at: from_json_text(row.get("created_at")?),
        updated_at: from_json_text(row.get("updated_at")?),
    })
}

pub fn get_facility(
    conn: &Connection,
    facility_id: &str,
) -> Result<Option<FacilityRecord>, rusqlite::Error> {
    conn.query_row(
        "SELECT * FROM facilities WHERE facility_id = ?1",
        params![facility_id],
        facility_from_row,
    )
    .optional()
}

/// Facilities where the user holds any membership, ordered by name.
pub fn list_facilities_for_member(
    conn: &Connection,
    user_id: &str,
) -> Result<Vec<FacilityRecord>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT f.* FROM facilities f
         JOIN user_facilities uf ON uf.facility_id = f.facility_id
         WHERE uf.user_id = ?1
         ORDER BY f.name",
    )?;
    let rows = stmt.query_map(params![user_id], facility_from_row)?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

/// Facilities whose document names the user as owner or in the members
/// array, regardless of membership rows. Used as an access-control fallback
/// when membership records are missing or dangling.
pub fn list_facilities_containing(
    conn: &Connection,
    user_id: &str,
) -> Result<Vec<FacilityRecord>, rusqlite::Error> {
    let needle = format!("\"{user_id}\"");
    let mut stmt = conn.prepare(
        "SELECT * FROM facilities
         WHERE owner_id = ?1 OR members LIKE '%' || ?2 || '%'
         ORDER BY facility_id",
    )?;
    let rows = stmt.query_map(params![user_id, needle], facility_from_row)?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

// ── Users ──────────────────────────────────────────────────────────

pub fn upsert_user(conn: &Connection, user: &UserRecord) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO users (
            user_id, firebase_uid, email, first_name, last_name,
            profile_picture, cached_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, datetime('now'))
        ON CONFLICT(user_id) DO UPDATE SET
            firebase_uid=excluded.firebase_uid, email=excluded.email,
            first_name=excluded.first_name, last_name=excluded.last_name,
            profile_picture=excluded.profile_picture, cached_at=excluded.cached_at",
        params![
            user.id,
            user.firebase_uid,
            user.email,
            user.first_name,
            user.last_name,
            user.profile_picture,
        ],
    )?;
    Ok(())
}

fn user_from_row(row: &rusqlite::Row<'_>) -> Result<UserRecord, rusqlite::Error> {
    Ok(UserRecord {
        id: row.get("user_id")?,
        firebase_uid: row.get("firebase_uid")?,
        email: row.get("email")?,
        first_name: row.get("first_name")?,
        last_name: row.get("last_name")?,
        profile_picture: row.get("profile_picture")?,
    })
}

pub fn get_user(conn: &Connection, user_id: &str) -> Result<Option<UserRecord>, rusqlite::Error> {
    conn.query_row(
        "SELECT * FROM users WHERE user_id = ?1",
        params![user_id],
        user_from_row,
    )
    .optional()
}

pub fn get_user_by_auth_uid(
    conn: &Connection,
    firebase_uid: &str,
) -> Result<Option<UserRecord>, rusqlite::Error> {
    conn.query_row(
        "SELECT * FROM users WHERE firebase_uid = ?1",
        params![firebase_uid],
        user_from_row,
    )
    .optional()
}

pub fn get_user_by_email(
    conn: &Connection,
    email: &str,
) -> Result<Option<UserRecord>, rusqlite::Error> {
    conn.query_row(
        "SELECT * FROM users WHERE email = ?1",
        params![email],
        user_from_row,
    )
    .optional()
}

// ── Memberships ────────────────────────────────────────────────────

/// Upsert a membership. `INSERT OR REPLACE` keys on both the membership id
/// and the (user, facility) uniqueness constraint, so re-imports and
/// re-created relationships both collapse to a single row per pair.
pub fn upsert_membership(
    conn: &Connection,
    membership: &MembershipRecord,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO user_facilities (
            membership_id, user_id, facility_id, role,
            created_at, updated_at, cached_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, datetime('now'))",
        params![
            membership.id,
            membership.user_id,
            membership.facility_id,
            membership.role.as_str(),
            opt_json_text(&membership.created_at),
            opt_json_text(&membership.updated_at),
        ],
    )?;
    Ok(())
}

fn membership_from_row(row: &rusqlite::Row<'_>) -> Result<MembershipRecord, rusqlite::Error> {
    let role: String = row.get("role")?;
    Ok(MembershipRecord {
        id: row.get("membership_id")?,
        user_id: row.get("user_id")?,
        facility_id: row.get("facility_id")?,
        role: Role::parse(&role),
        created_at: from_json_text(row.get("created_at")?),
        updated_at: from_json_text(row.get("updated_at")?),
    })
}

pub fn list_memberships_for_user(
    conn: &Connection,
    user_id: &str,
) -> Result<Vec<MembershipRecord>, rusqlite::Error> {
    let mut stmt =
        conn.prepare("SELECT * FROM user_facilities WHERE user_id = ?1 ORDER BY facility_id")?;
    let rows = stmt.query_map(params![user_id], membership_from_row)?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

pub fn list_memberships_for_facility(
    conn: &Connection,
    facility_id: &str,
) -> Result<Vec<MembershipRecord>, rusqlite::Error> {
    let mut stmt =
        conn.prepare("SELECT * FROM user_facilities WHERE facility_id = ?1 ORDER BY user_id")?;
    let rows = stmt.query_map(params![facility_id], membership_from_row)?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

pub fn get_membership(
    conn: &Connection,
    user_id: &str,
    facility_id: &str,
) -> Result<Option<MembershipRecord>, rusqlite::Error> {
    conn.query_row(
        "SELECT * FROM user_facilities WHERE user_id = ?1 AND facility_id = ?2",
        params![user_id, facility_id],
        membership_from_row,
    )
    .optional()
}

// ── Projects ───────────────────────────────────────────────────────

pub fn upsert_project(
    conn: &Connection,
    project: &ProjectRecord,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO projects (
            project_id, facility_id, name, assignees, status,
            is_archived, created_at, updated_at, cached_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, datetime('now'))
        ON CONFLICT(project_id) DO UPDATE SET
            facility_id=excluded.facility_id, name=excluded.name,
            assignees=excluded.assignees, status=excluded.status,
            is_archived=excluded.is_archived, created_at=excluded.created_at,
            updated_at=excluded.updated_at, cached_at=excluded.cached_at",
        params![
            project.id,
            project.facility_id,
            project.name,
            to_json_text(&project.assignees).unwrap_or_else(|| "[]".into()),
            project.status,
            project.archived as i32,
            opt_json_text(&project.created_at),
            opt_json_text(&project.updated_at),
        ],
    )?;
    Ok(())
}

fn project_from_row(row: &rusqlite::Row<'_>) -> Result<ProjectRecord, rusqlite::Error> {
    Ok(ProjectRecord {
        id: row.get("project_id")?,
        facility_id: row.get("facility_id")?,
        name: row.get("name")?,
        assignees: from_json_text(row.get("assignees")?).unwrap_or_default(),
        status: row.get("status")?,
        archived: row.get::<_, i32>("is_archived")? != 0,
        created_at: from_json_text(row.get("created_at")?),
        updated_at: from_json_text(row.get("updated_at")?),
    })
}

pub fn get_project(
    conn: &Connection,
    project_id: &str,
) -> Result<Option<ProjectRecord>, rusqlite::Error> {
    conn.query_row(
        "SELECT * FROM projects WHERE project_id = ?1",
        params![project_id],
        project_from_row,
    )
    .optional()
}

/// Projects in a facility. Archived projects are excluded unless explicitly
/// requested.
pub fn list_projects_for_facility(
    conn: &Connection,
    facility_id: &str,
    include_archived: bool,
) -> Result<Vec<ProjectRecord>, rusqlite::Error> {
    let sql = if include_archived {
        "SELECT * FROM projects WHERE facility_id = ?1 ORDER BY project_id"
    } else {
        "SELECT * FROM projects WHERE facility_id = ?1 AND is_archived = 0 ORDER BY project_id"
    };
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params![facility_id], project_from_row)?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

// ── Tasks ──────────────────────────────────────────────────────────

pub fn upsert_task(conn: &Connection, task: &TaskRecord) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO tasks (
            task_id, project_id, title, assignee_id, assignee_ids,
            status, priority, due_date, created_at, updated_at,
            deleted_at, cached_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, datetime('now'))
        ON CONFLICT(task_id) DO UPDATE SET
            project_id=excluded.project_id, title=excluded.title,
            assignee_id=excluded.assignee_id, assignee_ids=excluded.assignee_ids,
            status=excluded.status, priority=excluded.priority,
            due_date=excluded.due_date, created_at=excluded.created_at,
            updated_at=excluded.updated_at, deleted_at=excluded.deleted_at,
            cached_at=excluded.cached_at",
        params![
            task.id,
            task.project_id,
            task.title,
            opt_json_text(&task.assignee_id),
            to_json_text(&task.assignee_ids).unwrap_or_else(|| "[]".into()),
            task.status,
            task.priority,
            opt_json_text(&task.due_date),
            opt_json_text(&task.created_at),
            opt_json_text(&task.updated_at),
            opt_json_text(&task.deleted_at),
        ],
    )?;
    Ok(())
}

fn task_from_row(row: &rusqlite::Row<'_>) -> Result<TaskRecord, rusqlite::Error> {
    Ok(TaskRecord {
        id: row.get("task_id")?,
        project_id: row.get("project_id")?,
        title: row.get("title")?,
        assignee_id: from_json_text(row.get("assignee_id")?),
        assignee_ids: from_json_text(row.get("assignee_ids")?).unwrap_or_default(),
        status: row.get("status")?,
        priority: row.get("priority")?,
        due_date: from_json_text(row.get("due_date")?),
        created_at: from_json_text(row.get("created_at")?),
        updated_at: from_json_text(row.get("updated_at")?),
        deleted_at: from_json_text(row.get("deleted_at")?),
    })
}

/// Tasks belonging to a project. Soft-deleted tasks never leave this layer.
pub fn list_tasks_for_project(
    conn: &Connection,
    project_id: &str,
) -> Result<Vec<TaskRecord>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT * FROM tasks WHERE project_id = ?1 AND deleted_at IS NULL ORDER BY task_id",
    )?;
    let rows = stmt.query_map(params![project_id], task_from_row)?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

/// Cross-facility task lookup by assignee. Both assignee columns hold raw
/// JSON, so a quoted-id containment match covers the string and array forms.
pub fn list_tasks_for_assignee(
    conn: &Connection,
    user_id: &str,
) -> Result<Vec<TaskRecord>, rusqlite::Error> {
    let needle = format!("\"{user_id}\"");
    let mut stmt = conn.prepare(
        "SELECT * FROM tasks
         WHERE deleted_at IS NULL
           AND (assignee_id LIKE '%' || ?1 || '%' OR assignee_ids LIKE '%' || ?1 || '%')
         ORDER BY task_id",
    )?;
    let rows = stmt.query_map(params![needle], task_from_row)?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

// ── Config ─────────────────────────────────────────────────────────

pub fn get_config(conn: &Connection, key: &str) -> Result<Option<String>, rusqlite::Error> {
    conn.query_row(
        "SELECT value FROM app_config WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
}

pub fn set_config(conn: &Connection, key: &str, value: &str) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO app_config (key, value) VALUES (?1, ?2)",
        params![key, value],
    )?;
    Ok(())
}

pub fn list_config(conn: &Connection) -> Result<Vec<(String, String)>, rusqlite::Error> {
    let mut stmt = conn.prepare("SELECT key, value FROM app_config ORDER BY key")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

// ── Store status ───────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct StoreCounts {
    pub facilities: i64,
    pub users: i64,
    pub memberships: i64,
    pub projects: i64,
    pub tasks: i64,
}

pub fn entity_counts(conn: &Connection) -> Result<StoreCounts, rusqlite::Error> {
    let count = |sql: &str| -> Result<i64, rusqlite::Error> {
        conn.query_row(sql, [], |row| row.get(0))
    };
    Ok(StoreCounts {
        facilities: count("SELECT COUNT(*) FROM facilities")?,
        users: count("SELECT COUNT(*) FROM users")?,
        memberships: count("SELECT COUNT(*) FROM user_facilities")?,
        projects: count("SELECT COUNT(*) FROM projects")?,
        tasks: count("SELECT COUNT(*) FROM tasks WHERE deleted_at IS NULL")?,
    })
}
