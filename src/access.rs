//! Access control for member analytics. Layered from most to least
//! specific; the later checks are fallbacks that only matter when membership
//! records are missing or dangling.

use std::collections::HashSet;

use crate::error::Result;
use crate::identity;
use crate::store::records::{Role, UserRecord};
use crate::store::{repository, Database};

/// May `identity` view analytics for `member_id`?
///
/// Grants, in order: self-access; any facility membership (the global
/// dashboard is intentionally broad — every facility member can query it);
/// a facility document naming both parties; and finally a managerial role
/// claim. Anything else is denied.
pub async fn can_access_member_analytics(
    db: &Database,
    member_id: &str,
    identity: &UserRecord,
    role: Role,
) -> Result<bool> {
    // Self-access is always granted, whichever id format the caller used.
    if member_id == identity.id {
        return Ok(true);
    }
    if identity.firebase_uid.as_deref() == Some(member_id) {
        return Ok(true);
    }
    let target = identity::resolve(db, member_id).await?;
    if let Some(target) = &target {
        if target.id == identity.id {
            return Ok(true);
        }
    }

    let target_id = target
        .map(|t| t.id)
        .unwrap_or_else(|| member_id.to_string());
    let identity_id = identity.id.clone();
    let granted = db
        .reader()
        .call(move |conn| {
            // Any membership at all grants dashboard visibility.
            let mine = repository::list_memberships_for_user(conn, &identity_id)?;
            if !mine.is_empty() {
                return Ok(true);
            }
            // Membership rows can go missing; fall back to the facility
            // documents' own member lists for the shared-facility check.
            let shared: HashSet<String> =
                repository::list_facilities_containing(conn, &identity_id)?
                    .into_iter()
                    .map(|f| f.id)
                    .collect();
            let theirs = repository::list_facilities_containing(conn, &target_id)?;
            Ok::<bool, rusqlite::Error>(theirs.iter().any(|f| shared.contains(&f.id)))
        })
        .await?;
    if granted {
        return Ok(true);
    }

    // Manager fallback: an owner/manager claim may look at members even
    // when the data above could not connect the two.
    Ok(role.is_managerial())
}
