use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Bearer tokens expire one hour after issue.
const TOKEN_TTL_MINUTES: i64 = 60;

/// Closed set of roles. Stored as lowercase strings in the users table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Principal,
    Student,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Principal => "principal",
            Role::Student => "student",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "principal" => Some(Role::Principal),
            "student" => Some(Role::Student),
            _ => None,
        }
    }
}

/// A user as resolved by the gate. Never carries secret material.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
    pub role: Role,
    pub student_id: Option<String>,
    pub section: Option<String>,
}

/// Salted SHA-256 credential pair for storage.
pub struct StoredSecret {
    pub salt: String,
    pub hash: String,
}

pub fn hash_secret(salt: &str, secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(secret.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn new_stored_secret(secret: &str) -> StoredSecret {
    let salt = Uuid::new_v4().to_string();
    let hash = hash_secret(&salt, secret);
    StoredSecret { salt, hash }
}

pub fn verify_secret(salt: &str, stored_hash: &str, candidate: &str) -> bool {
    hash_secret(salt, candidate) == stored_hash
}

pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Issues a fresh opaque token for `user_id` and returns (token, expiry).
pub fn issue_token(conn: &Connection, user_id: &str) -> anyhow::Result<(String, String)> {
    // Sweep tokens nobody will ever present again. The stamps share one
    // fixed-width UTC format, so string order is chronological order.
    conn.execute(
        "DELETE FROM auth_tokens WHERE expires_at <= ?",
        [now_rfc3339()],
    )?;

    let token = Uuid::new_v4().to_string();
    let issued = Utc::now();
    let expires = issued + Duration::minutes(TOKEN_TTL_MINUTES);
    let expires_at = expires.to_rfc3339_opts(SecondsFormat::Millis, true);
    conn.execute(
        "INSERT INTO auth_tokens(token, user_id, issued_at, expires_at) VALUES(?, ?, ?, ?)",
        (
            &token,
            user_id,
            issued.to_rfc3339_opts(SecondsFormat::Millis, true),
            &expires_at,
        ),
    )?;
    Ok((token, expires_at))
}

/// Resolves a presented token to its user. Returns `Ok(None)` when the token
/// is unknown, expired, or points at a user that no longer resolves; the
/// caller maps that uniformly onto the unauthenticated error class.
pub fn resolve_token(conn: &Connection, token: &str) -> anyhow::Result<Option<AuthUser>> {
    let row: Option<(String, String)> = conn
        .query_row(
            "SELECT user_id, expires_at FROM auth_tokens WHERE token = ?",
            [token],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;

    let Some((user_id, expires_at)) = row else {
        return Ok(None);
    };

    if is_expired(&expires_at) {
        // Expired tokens are dead; drop the row so the table does not grow
        // without bound.
        conn.execute("DELETE FROM auth_tokens WHERE token = ?", [token])?;
        return Ok(None);
    }

    load_user(conn, &user_id)
}

pub fn load_user(conn: &Connection, user_id: &str) -> anyhow::Result<Option<AuthUser>> {
    let row = conn
        .query_row(
            "SELECT id, email, role, student_id, section FROM users WHERE id = ?",
            [user_id],
            |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, Option<String>>(3)?,
                    r.get::<_, Option<String>>(4)?,
                ))
            },
        )
        .optional()?;

    Ok(row.and_then(|(id, email, role, student_id, section)| {
        Role::parse(&role).map(|role| AuthUser {
            id,
            email,
            role,
            student_id,
            section,
        })
    }))
}

fn is_expired(expires_at: &str) -> bool {
    match DateTime::parse_from_rfc3339(expires_at) {
        Ok(t) => t.with_timezone(&Utc) <= Utc::now(),
        // An unparseable expiry is treated as expired rather than immortal.
        Err(_) => true,
    }
}

/// Role gate: permits continuation only when the user's role is in the set.
pub fn role_allowed(user: &AuthUser, allowed: &[Role]) -> bool {
    allowed.contains(&user.role)
}
