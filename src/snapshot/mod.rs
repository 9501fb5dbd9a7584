//! Snapshot import: loads a JSON export of the hosted document database into
//! the local store. The CRUD application owns writes upstream; this is the
//! only write path on this side.

use std::path::Path;

use serde::Serialize;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::store::records::{
    FacilityRecord, MembershipRecord, ProjectRecord, TaskRecord, UserRecord,
};
use crate::store::{repository, Database};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ImportStatus {
    Success,
    PartialFailure,
    Failed,
}

/// Report returned after a snapshot import completes.
#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub path: String,
    pub status: ImportStatus,
    pub facilities: u64,
    pub users: u64,
    pub memberships: u64,
    pub projects: u64,
    pub tasks: u64,
    /// Records that did not deserialize or carried an empty id.
    pub skipped: u64,
}

impl ImportReport {
    pub fn total(&self) -> u64 {
        self.facilities + self.users + self.memberships + self.projects + self.tasks
    }
}

/// Parse one snapshot section into records, counting malformed entries
/// instead of aborting. A single bad document never sinks the import.
fn parse_section<T: serde::de::DeserializeOwned>(
    doc: &Value,
    key: &str,
    skipped: &mut u64,
) -> Vec<T> {
    let Some(items) = doc.get(key).and_then(Value::as_array) else {
        return Vec::new();
    };
    let mut out = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        match serde_json::from_value::<T>(item.clone()) {
            Ok(record) => out.push(record),
            Err(e) => {
                log::warn!("skipping {key}[{i}]: {e}");
                *skipped += 1;
            }
        }
    }
    out
}

fn has_id(id: &str, section: &str, index: usize, skipped: &mut u64) -> bool {
    if id.is_empty() {
        log::warn!("skipping {section}[{index}]: empty id");
        *skipped += 1;
        false
    } else {
        true
    }
}

/// Import a snapshot file. Returns per-entity counts; malformed records are
/// skipped and logged.
pub async fn import_snapshot(db: &Database, path: impl AsRef<Path>) -> Result<ImportReport> {
    let path_str = path.as_ref().display().to_string();
    let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| Error::Snapshot {
        path: path_str.clone(),
        message: e.to_string(),
    })?;
    let doc: Value = serde_json::from_str(&raw).map_err(|e| Error::Snapshot {
        path: path_str.clone(),
        message: format!("invalid JSON: {e}"),
    })?;

    let mut skipped = 0u64;
    let facilities: Vec<FacilityRecord> = parse_section(&doc, "facilities", &mut skipped);
    let users: Vec<UserRecord> = parse_section(&doc, "users", &mut skipped);
    let memberships: Vec<MembershipRecord> = parse_section(&doc, "memberships", &mut skipped);
    let projects: Vec<ProjectRecord> = parse_section(&doc, "projects", &mut skipped);
    let tasks: Vec<TaskRecord> = parse_section(&doc, "tasks", &mut skipped);

    let report = db
        .writer()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let mut counts = (0u64, 0u64, 0u64, 0u64, 0u64);

            for (i, f) in facilities.iter().enumerate() {
                if !has_id(&f.id, "facilities", i, &mut skipped) {
                    continue;
                }
                repository::upsert_facility(&tx, f)?;
                counts.0 += 1;
            }
            for (i, u) in users.iter().enumerate() {
                if !has_id(&u.id, "users", i, &mut skipped) {
                    continue;
                }
                repository::upsert_user(&tx, u)?;
                counts.1 += 1;
            }
            for (i, m) in memberships.iter().enumerate() {
                if !has_id(&m.id, "memberships", i, &mut skipped)
                    || !has_id(&m.user_id, "memberships", i, &mut skipped)
                {
                    continue;
                }
                repository::upsert_membership(&tx, m)?;
                counts.2 += 1;
            }
            for (i, p) in projects.iter().enumerate() {
                if !has_id(&p.id, "projects", i, &mut skipped) {
                    continue;
                }
                repository::upsert_project(&tx, p)?;
                counts.3 += 1;
            }
            for (i, t) in tasks.iter().enumerate() {
                if !has_id(&t.id, "tasks", i, &mut skipped) {
                    continue;
                }
                repository::upsert_task(&tx, t)?;
                counts.4 += 1;
            }
            tx.commit()?;
            Ok::<(u64, u64, u64, u64, u64, u64), rusqlite::Error>((
                counts.0, counts.1, counts.2, counts.3, counts.4, skipped,
            ))
        })
        .await?;

    let (facilities, users, memberships, projects, tasks, skipped) = report;
    let total = facilities + users + memberships + projects + tasks;
    let status = if skipped == 0 {
        ImportStatus::Success
    } else if total > 0 {
        ImportStatus::PartialFailure
    } else {
        ImportStatus::Failed
    };

    Ok(ImportReport {
        path: path_str,
        status,
        facilities,
        users,
        memberships,
        projects,
        tasks,
        skipped,
    })
}
