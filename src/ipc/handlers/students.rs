use super::catalog::section_exists;
use crate::auth::{self, Role};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    authenticate, db_conn, internal, normalize_section, optional_str, required_secret,
    required_str, require_role,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

fn handle_students_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let user = match authenticate(conn, req) {
        Ok(u) => u,
        Err(resp) => return resp,
    };
    if let Err(resp) = require_role(req, &user, &[Role::Principal]) {
        return resp;
    }

    let email = match required_str(req, "email") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let password = match required_secret(req, "password") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let section = match required_str(req, "section") {
        Ok(v) => normalize_section(&v),
        Err(resp) => return resp,
    };

    match section_exists(conn, &section) {
        Ok(true) => {}
        Ok(false) => {
            return err(
                &req.id,
                "not_found",
                format!("section '{}' does not exist; add it first", section),
                None,
            )
        }
        Err(e) => return internal(req, "section lookup", &e),
    }

    // Friendlier message ahead of the UNIQUE constraints; the constraints
    // remain the real guard.
    let taken: Option<i64> = match conn
        .query_row(
            "SELECT 1 FROM users WHERE email = ? OR student_id = ? LIMIT 1",
            (&email, &student_id),
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return internal(req, "user lookup", &e),
    };
    if taken.is_some() {
        return err(
            &req.id,
            "conflict",
            "student with this email or student id already exists",
            None,
        );
    }

    let user_id = Uuid::new_v4().to_string();
    let stored = auth::new_stored_secret(&password);
    let insert = conn.execute(
        "INSERT INTO users(id, email, password_salt, password_hash, role, student_id, section, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &user_id,
            &email,
            &stored.salt,
            &stored.hash,
            Role::Student.as_str(),
            &student_id,
            &section,
            auth::now_rfc3339(),
        ),
    );
    match insert {
        Ok(_) => ok(
            &req.id,
            json!({
                "userId": user_id,
                "email": email,
                "studentId": student_id,
                "section": section,
            }),
        ),
        Err(e) if crate::db::is_unique_violation(&e) => err(
            &req.id,
            "conflict",
            "student with this email or student id already exists",
            None,
        ),
        Err(e) => internal(req, "student insert", &e),
    }
}

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let user = match authenticate(conn, req) {
        Ok(u) => u,
        Err(resp) => return resp,
    };
    if let Err(resp) = require_role(req, &user, &[Role::Principal]) {
        return resp;
    }

    let section = optional_str(req, "section").map(|s| normalize_section(&s));

    // Secret material never leaves the users table.
    let map = |row: &rusqlite::Row<'_>| {
        let id: String = row.get(0)?;
        let email: String = row.get(1)?;
        let student_id: Option<String> = row.get(2)?;
        let sec: Option<String> = row.get(3)?;
        let created_at: String = row.get(4)?;
        Ok(json!({
            "userId": id,
            "email": email,
            "studentId": student_id,
            "section": sec,
            "createdAt": created_at,
        }))
    };

    let rows = match section {
        Some(sec) => conn
            .prepare(
                "SELECT id, email, student_id, section, created_at FROM users
                 WHERE role = 'student' AND section = ? ORDER BY rowid",
            )
            .and_then(|mut stmt| {
                stmt.query_map([&sec], map)?
                    .collect::<Result<Vec<_>, _>>()
            }),
        None => conn
            .prepare(
                "SELECT id, email, student_id, section, created_at FROM users
                 WHERE role = 'student' ORDER BY rowid",
            )
            .and_then(|mut stmt| stmt.query_map([], map)?.collect::<Result<Vec<_>, _>>()),
    };

    match rows {
        Ok(students) => ok(&req.id, json!({ "students": students })),
        Err(e) => internal(req, "student query", &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.create" => Some(handle_students_create(state, req)),
        "students.list" => Some(handle_students_list(state, req)),
        _ => None,
    }
}
