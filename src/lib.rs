pub mod access;
pub mod analytics;
pub mod cache;
pub mod error;
pub mod export;
pub mod identity;
pub mod insights;
pub mod query;
pub mod snapshot;
pub mod store;
pub mod time_util;

pub use analytics::types::{FacilityReport, GlobalReport, MemberReport};
pub use cache::{CachedReport, ReportCache};
pub use error::{Error, Result};
pub use export::ExportArtifact;
pub use insights::{Insight, InsightKind};
pub use query::ReportRange;
pub use snapshot::{ImportReport, ImportStatus};
pub use store::records::Role;
pub use store::Database;

use store::records::UserRecord;
use store::repository;

/// Main entry point for the Nexora analytics engine. Owns the snapshot
/// store and one report cache; every report operation authorizes, consults
/// the cache, computes on a miss, and caches the result.
pub struct NexoraAnalytics {
    db: Database,
    cache: ReportCache,
}

impl NexoraAnalytics {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            cache: ReportCache::new(),
        }
    }

    /// Construct with a custom cache (e.g. a shorter TTL in tests).
    pub fn with_cache(db: Database, cache: ReportCache) -> Self {
        Self { db, cache }
    }

    /// Access the store (for direct queries in the CLI).
    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Resolve the requesting identity to a canonical user. The identity is
    /// central to every request, so an unknown identifier is an error here,
    /// unlike member targets which degrade to stubs.
    async fn require_identity(&self, identity: &str) -> Result<UserRecord> {
        identity::resolve(&self.db, identity)
            .await?
            .ok_or_else(|| Error::NotFound(format!("unknown identity: {identity}")))
    }

    // ── Reports ────────────────────────────────────────────────────

    pub async fn global_analytics(
        &self,
        identity: &str,
        role: Role,
        range: ReportRange,
    ) -> Result<GlobalReport> {
        let user = self.require_identity(identity).await?;
        let key = ReportCache::global_key(&user.id, role, range);
        if let Some(CachedReport::Global(report)) = self.cache.get(&key) {
            return Ok(report);
        }
        let report = analytics::global_report(&self.db, &user, role, range).await?;
        self.cache.put(key, CachedReport::Global(report.clone()));
        Ok(report)
    }

    pub async fn facility_analytics(
        &self,
        facility_id: &str,
        identity: &str,
        role: Role,
        range: ReportRange,
    ) -> Result<FacilityReport> {
        let user = self.require_identity(identity).await?;
        let key = ReportCache::facility_key(facility_id, &user.id, role, range);
        if let Some(CachedReport::Facility(report)) = self.cache.get(&key) {
            return Ok(report);
        }
        let report =
            analytics::facility_report(&self.db, facility_id, &user, role, range).await?;
        self.cache.put(key, CachedReport::Facility(report.clone()));
        Ok(report)
    }

    pub async fn member_analytics(
        &self,
        member_id: &str,
        identity: &str,
        role: Role,
        range: ReportRange,
        facility_id: Option<&str>,
    ) -> Result<MemberReport> {
        let user = self.require_identity(identity).await?;
        let key = ReportCache::member_key(member_id, &user.id, role, range, facility_id);
        if let Some(CachedReport::Member(report)) = self.cache.get(&key) {
            return Ok(report);
        }
        let report =
            analytics::member_report(&self.db, member_id, &user, role, range, facility_id)
                .await?;
        self.cache.put(key, CachedReport::Member(report.clone()));
        Ok(report)
    }

    // ── Exports ────────────────────────────────────────────────────

    pub async fn export_global(
        &self,
        identity: &str,
        role: Role,
        range: ReportRange,
    ) -> Result<ExportArtifact> {
        let report = self.global_analytics(identity, role, range).await?;
        Ok(export::global_artifact(&report, range))
    }

    pub async fn export_facility(
        &self,
        facility_id: &str,
        identity: &str,
        role: Role,
        range: ReportRange,
    ) -> Result<ExportArtifact> {
        let report = self
            .facility_analytics(facility_id, identity, role, range)
            .await?;
        Ok(export::facility_artifact(&report, range))
    }

    pub async fn export_member(
        &self,
        member_id: &str,
        identity: &str,
        role: Role,
        range: ReportRange,
        facility_id: Option<&str>,
    ) -> Result<ExportArtifact> {
        let report = self
            .member_analytics(member_id, identity, role, range, facility_id)
            .await?;
        Ok(export::member_artifact(&report, range))
    }

    // ── Snapshot import ────────────────────────────────────────────

    pub async fn import_snapshot(
        &self,
        path: impl AsRef<std::path::Path>,
    ) -> Result<ImportReport> {
        snapshot::import_snapshot(&self.db, path).await
    }

    // ── Config & status ────────────────────────────────────────────

    pub async fn config_get(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        self.db
            .reader()
            .call(move |conn| repository::get_config(conn, &key))
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    pub async fn config_set(&self, key: &str, value: &str) -> Result<()> {
        let key = key.to_string();
        let value = value.to_string();
        self.db
            .writer()
            .call(move |conn| repository::set_config(conn, &key, &value))
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    pub async fn config_list(&self) -> Result<Vec<(String, String)>> {
        self.db
            .reader()
            .call(|conn| repository::list_config(conn))
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    pub async fn status(&self) -> Result<repository::StoreCounts> {
        self.db
            .reader()
            .call(|conn| repository::entity_counts(conn))
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use store::records::{FacilityRecord, MembershipRecord, UserRecord};

    async fn seeded_hub() -> NexoraAnalytics {
        let db = Database::open_memory().await.unwrap();
        db.writer()
            .call(|conn| {
                repository::upsert_user(
                    conn,
                    &UserRecord {
                        id: "u1".into(),
                        firebase_uid: Some("fb-u1".into()),
                        email: Some("ada@example.com".into()),
                        first_name: Some("Ada".into()),
                        last_name: None,
                        profile_picture: None,
                    },
                )?;
                repository::upsert_facility(
                    conn,
                    &FacilityRecord {
                        id: "f1".into(),
                        name: "North".into(),
                        owner_id: "u1".into(),
                        members: Vec::new(),
                        status: None,
                        created_at: None,
                        updated_at: None,
                    },
                )?;
                repository::upsert_membership(
                    conn,
                    &MembershipRecord {
                        id: "m1".into(),
                        user_id: "u1".into(),
                        facility_id: "f1".into(),
                        role: Role::Owner,
                        created_at: None,
                        updated_at: None,
                    },
                )?;
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
        NexoraAnalytics::new(db)
    }

    #[tokio::test]
    async fn test_repeat_request_hits_cache() {
        let hub = seeded_hub().await;
        let first = hub
            .global_analytics("u1", Role::Owner, ReportRange::default())
            .await
            .unwrap();
        let second = hub
            .global_analytics("u1", Role::Owner, ReportRange::default())
            .await
            .unwrap();
        // The cached payload comes back unmodified, generated-at included
        assert_eq!(first.meta.generated_at, second.meta.generated_at);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[tokio::test]
    async fn test_identity_formats_share_cache_entries() {
        let hub = seeded_hub().await;
        let by_id = hub
            .global_analytics("u1", Role::Owner, ReportRange::default())
            .await
            .unwrap();
        // The same user by email resolves to the same canonical key
        let by_email = hub
            .global_analytics("ada@example.com", Role::Owner, ReportRange::default())
            .await
            .unwrap();
        assert_eq!(by_id.meta.generated_at, by_email.meta.generated_at);
    }

    #[tokio::test]
    async fn test_unknown_identity_is_error() {
        let hub = seeded_hub().await;
        let err = hub
            .global_analytics("nobody", Role::Member, ReportRange::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_export_artifact_names_scope() {
        let hub = seeded_hub().await;
        let artifact = hub
            .export_facility("f1", "u1", Role::Owner, ReportRange::default())
            .await
            .unwrap();
        assert!(artifact.filename.starts_with("nexora-analytics-facility-north-"));
        assert!(artifact.filename.ends_with(".pdf"));
        assert!(artifact.html.contains("North"));
    }
}
