use crate::auth::{self, Role};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{authenticate, db_conn, internal, required_secret, required_str};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

/// Uniform login failure: the same code and message whether the email is
/// unknown or the secret mismatches, so callers cannot probe which accounts
/// exist.
const INVALID_CREDENTIALS: &str = "invalid credentials";

fn handle_login(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let email = match required_str(req, "email") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let password = match required_secret(req, "password") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let row: Option<(String, String, String, String)> = match conn
        .query_row(
            "SELECT id, password_salt, password_hash, role FROM users WHERE email = ?",
            [&email],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return internal(req, "user lookup", &e),
    };

    let Some((user_id, salt, hash, role)) = row else {
        return err(&req.id, "invalid_input", INVALID_CREDENTIALS, None);
    };
    if !auth::verify_secret(&salt, &hash, &password) {
        return err(&req.id, "invalid_input", INVALID_CREDENTIALS, None);
    }

    match auth::issue_token(conn, &user_id) {
        Ok((token, expires_at)) => ok(
            &req.id,
            json!({
                "userId": user_id,
                "email": email,
                "role": role,
                "token": token,
                "expiresAt": expires_at,
            }),
        ),
        Err(e) => internal(req, "token issue", &e),
    }
}

fn handle_me(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let user = match authenticate(conn, req) {
        Ok(u) => u,
        Err(resp) => return resp,
    };

    ok(
        &req.id,
        json!({
            "userId": user.id,
            "email": user.email,
            "role": user.role.as_str(),
            "studentId": user.student_id,
            "section": user.section,
        }),
    )
}

/// Creates the first principal account. The rest of the surface presumes a
/// principal already exists (students are only ever created by one), so this
/// is the single entry point for seeding and refuses to run twice.
fn handle_bootstrap_principal(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let email = match required_str(req, "email") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let password = match required_secret(req, "password") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let existing: Option<i64> = match conn
        .query_row(
            "SELECT 1 FROM users WHERE role = ? LIMIT 1",
            [Role::Principal.as_str()],
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return internal(req, "principal lookup", &e),
    };
    if existing.is_some() {
        return err(&req.id, "conflict", "a principal account already exists", None);
    }

    let user_id = Uuid::new_v4().to_string();
    let stored = auth::new_stored_secret(&password);
    let insert = conn.execute(
        "INSERT INTO users(id, email, password_salt, password_hash, role, student_id, section, created_at)
         VALUES(?, ?, ?, ?, ?, NULL, NULL, ?)",
        (
            &user_id,
            &email,
            &stored.salt,
            &stored.hash,
            Role::Principal.as_str(),
            auth::now_rfc3339(),
        ),
    );
    match insert {
        Ok(_) => ok(
            &req.id,
            json!({ "userId": user_id, "email": email, "role": Role::Principal.as_str() }),
        ),
        Err(e) if crate::db::is_unique_violation(&e) => {
            err(&req.id, "conflict", "email already in use", None)
        }
        Err(e) => internal(req, "principal insert", &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "auth.login" => Some(handle_login(state, req)),
        "auth.me" => Some(handle_me(state, req)),
        "auth.bootstrapPrincipal" => Some(handle_bootstrap_principal(state, req)),
        _ => None,
    }
}
