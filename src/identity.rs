//! Canonical identity resolution. Request-supplied identifiers arrive in
//! several formats (internal user id, external auth uid, email); every call
//! site funnels through here instead of guessing the format inline.

use rusqlite::Connection;

use crate::error::Result;
use crate::store::records::UserRecord;
use crate::store::{repository, Database};

/// Resolve a candidate identifier to a canonical user record.
///
/// Tries, in order: internal user id, external auth uid, then email (only
/// when the candidate looks like one). Returns `None` when nothing matches;
/// callers decide whether that is an error or a degrade-to-stub case.
pub fn resolve_user(
    conn: &Connection,
    candidate: &str,
) -> std::result::Result<Option<UserRecord>, rusqlite::Error> {
    let candidate = candidate.trim();
    if candidate.is_empty() {
        return Ok(None);
    }
    if let Some(user) = repository::get_user(conn, candidate)? {
        return Ok(Some(user));
    }
    if let Some(user) = repository::get_user_by_auth_uid(conn, candidate)? {
        return Ok(Some(user));
    }
    if candidate.contains('@') {
        if let Some(user) = repository::get_user_by_email(conn, candidate)? {
            return Ok(Some(user));
        }
    }
    Ok(None)
}

/// Async wrapper over [`resolve_user`] for callers outside a connection
/// closure.
pub async fn resolve(db: &Database, candidate: &str) -> Result<Option<UserRecord>> {
    let candidate = candidate.to_string();
    let user = db
        .reader()
        .call(move |conn| resolve_user(conn, &candidate))
        .await?;
    Ok(user)
}
