//! Short-TTL memoization of report payloads. The cache is an optimization,
//! never a correctness dependency: a miss or a wiped cache only costs a
//! recompute. There is no write-side invalidation; staleness is bounded by
//! the TTL alone.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::analytics::types::{FacilityReport, GlobalReport, MemberReport};
use crate::query::ReportRange;
use crate::store::records::Role;

pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

/// A cached payload, returned unmodified on a hit — including the original
/// `generatedAt`.
#[derive(Debug, Clone)]
pub enum CachedReport {
    Global(GlobalReport),
    Facility(FacilityReport),
    Member(MemberReport),
}

struct Entry {
    stored_at: Instant,
    payload: CachedReport,
}

/// Process-local report cache, constructed once and handed to the engine.
/// Concurrent get/set is safe; expiry is checked on read and stale entries
/// are purged opportunistically on write.
pub struct ReportCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, Entry>>,
}

impl ReportCache {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn global_key(identity: &str, role: Role, range: ReportRange) -> String {
        format!("global:{identity}:{role}:{}", range.to_key())
    }

    pub fn facility_key(
        facility_id: &str,
        identity: &str,
        role: Role,
        range: ReportRange,
    ) -> String {
        format!("facility:{facility_id}:{identity}:{role}:{}", range.to_key())
    }

    pub fn member_key(
        member_id: &str,
        identity: &str,
        role: Role,
        range: ReportRange,
        facility_id: Option<&str>,
    ) -> String {
        format!(
            "member:{member_id}:{identity}:{role}:{}:{}",
            range.to_key(),
            facility_id.unwrap_or("-")
        )
    }

    pub fn get(&self, key: &str) -> Option<CachedReport> {
        let mut entries = self.entries.lock().ok()?;
        match entries.get(key) {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => {
                Some(entry.payload.clone())
            }
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, key: String, payload: CachedReport) {
        let Ok(mut entries) = self.entries.lock() else {
            return;
        };
        let ttl = self.ttl;
        entries.retain(|_, e| e.stored_at.elapsed() < ttl);
        entries.insert(
            key,
            Entry {
                stored_at: Instant::now(),
                payload,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ReportCache {
    fn default() -> Self {
        Self::new()
    }
}
