use crate::auth::{self, AuthUser, Role};
use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use log::error;
use rusqlite::Connection;

pub fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    match req.params.get(key).and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        Some(_) => Err(err(
            &req.id,
            "invalid_input",
            format!("{} must not be empty", key),
            None,
        )),
        None => Err(err(
            &req.id,
            "bad_params",
            format!("missing {}", key),
            None,
        )),
    }
}

/// Secrets are taken verbatim (no trimming), so the bytes checked at login
/// are exactly the bytes hashed at account creation.
pub fn required_secret(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    match req.params.get(key).and_then(|v| v.as_str()) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        Some(_) => Err(err(
            &req.id,
            "invalid_input",
            format!("{} must not be empty", key),
            None,
        )),
        None => Err(err(
            &req.id,
            "bad_params",
            format!("missing {}", key),
            None,
        )),
    }
}

pub fn optional_str(req: &Request, key: &str) -> Option<String> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.to_string())
}

pub fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

/// Section names are matched and stored trimmed + upper-cased everywhere.
pub fn normalize_section(name: &str) -> String {
    name.trim().to_uppercase()
}

/// Resolves the request's bearer token to a user, or produces the
/// unauthenticated envelope. Every protected handler calls this first.
pub fn authenticate(conn: &Connection, req: &Request) -> Result<AuthUser, serde_json::Value> {
    let Some(token) = req.params.get("token").and_then(|v| v.as_str()) else {
        return Err(err(&req.id, "unauthenticated", "missing token", None));
    };

    match auth::resolve_token(conn, token) {
        Ok(Some(user)) => Ok(user),
        Ok(None) => Err(err(
            &req.id,
            "unauthenticated",
            "token is invalid or expired",
            None,
        )),
        Err(e) => Err(internal(req, "token resolution", &e)),
    }
}

/// Role gate, composed after [`authenticate`].
pub fn require_role(
    req: &Request,
    user: &AuthUser,
    allowed: &[Role],
) -> Result<(), serde_json::Value> {
    if auth::role_allowed(user, allowed) {
        Ok(())
    } else {
        Err(err(
            &req.id,
            "forbidden",
            format!(
                "role '{}' is not authorized for this operation",
                user.role.as_str()
            ),
            None,
        ))
    }
}

/// Logs the full failure server-side and returns only a generic message to
/// the caller.
pub fn internal(req: &Request, context: &str, e: &dyn std::fmt::Display) -> serde_json::Value {
    error!("{} failed for method {}: {}", context, req.method, e);
    err(&req.id, "internal", "internal error", None)
}
