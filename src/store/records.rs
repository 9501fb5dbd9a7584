use serde::{Deserialize, Serialize};

use crate::time_util::RawInstant;

/// Membership role within a facility. Determines visibility scope during
/// aggregation; unknown values degrade to `Guest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Manager,
    Member,
    Guest,
}

impl Role {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "owner" => Role::Owner,
            "manager" => Role::Manager,
            "member" => Role::Member,
            _ => Role::Guest,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Manager => "manager",
            Role::Member => "member",
            Role::Guest => "guest",
        }
    }

    /// Roles that can see other members' analytics beyond shared-facility
    /// visibility.
    pub fn is_managerial(&self) -> bool {
        matches!(self, Role::Owner | Role::Manager)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A tenant workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacilityRecord {
    pub id: String,
    pub name: String,
    pub owner_id: String,
    /// User ids. The owner is an implicit member whether or not listed here.
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub created_at: Option<RawInstant>,
    #[serde(default)]
    pub updated_at: Option<RawInstant>,
}

impl FacilityRecord {
    /// Members including the implicit owner, deduplicated, order preserved.
    pub fn all_members(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(self.members.len() + 1);
        if !self.owner_id.is_empty() {
            out.push(self.owner_id.clone());
        }
        for m in &self.members {
            if !out.contains(m) {
                out.push(m.clone());
            }
        }
        out
    }
}

/// A (user, facility) relationship. At most one exists per pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipRecord {
    pub id: String,
    pub user_id: String,
    pub facility_id: String,
    pub role: Role,
    #[serde(default)]
    pub created_at: Option<RawInstant>,
    #[serde(default)]
    pub updated_at: Option<RawInstant>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRecord {
    pub id: String,
    pub facility_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub assignees: Vec<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub created_at: Option<RawInstant>,
    #[serde(default)]
    pub updated_at: Option<RawInstant>,
}

/// The single-assignee field predates `assigneeIds`; old documents carry a
/// bare id, some carry an array. Both forms are still in the wild.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AssigneeField {
    One(String),
    Many(Vec<String>),
}

impl AssigneeField {
    pub fn ids(&self) -> Vec<&str> {
        match self {
            AssigneeField::One(id) => vec![id.as_str()],
            AssigneeField::Many(ids) => ids.iter().map(String::as_str).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    pub id: String,
    pub project_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub assignee_id: Option<AssigneeField>,
    #[serde(default)]
    pub assignee_ids: Vec<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub due_date: Option<RawInstant>,
    #[serde(default)]
    pub created_at: Option<RawInstant>,
    #[serde(default)]
    pub updated_at: Option<RawInstant>,
    #[serde(default)]
    pub deleted_at: Option<RawInstant>,
}

impl TaskRecord {
    /// Every user id the task names directly, across both assignee fields.
    pub fn direct_assignees(&self) -> Vec<&str> {
        let mut out: Vec<&str> = self.assignee_ids.iter().map(String::as_str).collect();
        if let Some(field) = &self.assignee_id {
            for id in field.ids() {
                if !out.contains(&id) {
                    out.push(id);
                }
            }
        }
        out
    }

    pub fn is_unassigned(&self) -> bool {
        self.direct_assignees().is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: String,
    #[serde(default)]
    pub firebase_uid: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub profile_picture: Option<String>,
}

impl UserRecord {
    pub fn display_name(&self) -> String {
        match (&self.first_name, &self.last_name) {
            (Some(f), Some(l)) if !f.is_empty() && !l.is_empty() => format!("{f} {l}"),
            (Some(f), _) if !f.is_empty() => f.clone(),
            (_, Some(l)) if !l.is_empty() => l.clone(),
            _ => self
                .email
                .clone()
                .unwrap_or_else(|| self.id.clone()),
        }
    }
}
