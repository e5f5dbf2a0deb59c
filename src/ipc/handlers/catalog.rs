use crate::auth::{self, Role};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    authenticate, db_conn, internal, normalize_section, optional_str, required_str, require_role,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

pub fn section_exists(conn: &Connection, name: &str) -> rusqlite::Result<bool> {
    let row: Option<i64> = conn
        .query_row("SELECT 1 FROM sections WHERE name = ?", [name], |r| {
            r.get(0)
        })
        .optional()?;
    Ok(row.is_some())
}

fn handle_sections_create(state: &mut AppState, req: &Request) -> serde_json::Value {
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

    let raw = match optional_str(req, "name") {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing name", None),
    };
    let name = normalize_section(&raw);
    if name.is_empty() {
        return err(&req.id, "invalid_input", "section name must not be empty", None);
    }

    let insert = conn.execute(
        "INSERT INTO sections(name, created_at) VALUES(?, ?)",
        (&name, auth::now_rfc3339()),
    );
    match insert {
        Ok(_) => ok(&req.id, json!({ "name": name })),
        Err(e) if crate::db::is_unique_violation(&e) => err(
            &req.id,
            "conflict",
            format!("section '{}' already exists", name),
            None,
        ),
        Err(e) => internal(req, "section insert", &e),
    }
}

fn handle_sections_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    if let Err(resp) = authenticate(conn, req) {
        return resp;
    }

    let mut stmt = match conn.prepare("SELECT name FROM sections ORDER BY name") {
        Ok(s) => s,
        Err(e) => return internal(req, "section query", &e),
    };
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    match rows {
        Ok(names) => ok(&req.id, json!({ "sections": names })),
        Err(e) => internal(req, "section query", &e),
    }
}

fn subject_rows(
    conn: &Connection,
    section: Option<&str>,
) -> rusqlite::Result<Vec<serde_json::Value>> {
    let map = |row: &rusqlite::Row<'_>| {
        let id: String = row.get(0)?;
        let name: String = row.get(1)?;
        let section: String = row.get(2)?;
        let created_at: String = row.get(3)?;
        Ok(json!({
            "id": id,
            "name": name,
            "section": section,
            "createdAt": created_at,
        }))
    };
    match section {
        Some(sec) => {
            let mut stmt = conn.prepare(
                "SELECT id, name, section, created_at FROM subjects
                 WHERE section = ? ORDER BY rowid",
            )?;
            let rows = stmt.query_map([sec], map)?;
            rows.collect()
        }
        None => {
            let mut stmt =
                conn.prepare("SELECT id, name, section, created_at FROM subjects ORDER BY rowid")?;
            let rows = stmt.query_map([], map)?;
            rows.collect()
        }
    }
}

fn handle_subjects_create(state: &mut AppState, req: &Request) -> serde_json::Value {
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

    let name = match required_str(req, "name") {
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

    let subject_id = Uuid::new_v4().to_string();
    let insert = conn.execute(
        "INSERT INTO subjects(id, name, section, created_at) VALUES(?, ?, ?, ?)",
        (&subject_id, &name, &section, auth::now_rfc3339()),
    );
    match insert {
        Ok(_) => ok(
            &req.id,
            json!({ "subjectId": subject_id, "name": name, "section": section }),
        ),
        Err(e) if crate::db::is_unique_violation(&e) => err(
            &req.id,
            "conflict",
            "subject with this name already exists in this section",
            None,
        ),
        Err(e) => internal(req, "subject insert", &e),
    }
}

fn handle_subjects_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    if let Err(resp) = authenticate(conn, req) {
        return resp;
    }

    match subject_rows(conn, None) {
        Ok(subjects) => ok(&req.id, json!({ "subjects": subjects })),
        Err(e) => internal(req, "subject query", &e),
    }
}

fn handle_subjects_list_by_section(state: &mut AppState, req: &Request) -> serde_json::Value {
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

    let section = match required_str(req, "section") {
        Ok(v) => normalize_section(&v),
        Err(resp) => return resp,
    };
    match subject_rows(conn, Some(&section)) {
        Ok(subjects) => ok(&req.id, json!({ "subjects": subjects })),
        Err(e) => internal(req, "subject query", &e),
    }
}

fn handle_subjects_mine(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let user = match authenticate(conn, req) {
        Ok(u) => u,
        Err(resp) => return resp,
    };
    if let Err(resp) = require_role(req, &user, &[Role::Student]) {
        return resp;
    }

    let Some(section) = user.section.as_deref() else {
        return err(
            &req.id,
            "invalid_input",
            "student section could not be determined",
            None,
        );
    };
    match subject_rows(conn, Some(section)) {
        Ok(subjects) => ok(&req.id, json!({ "subjects": subjects })),
        Err(e) => internal(req, "subject query", &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "sections.create" => Some(handle_sections_create(state, req)),
        "sections.list" => Some(handle_sections_list(state, req)),
        "subjects.create" => Some(handle_subjects_create(state, req)),
        "subjects.list" => Some(handle_subjects_list(state, req)),
        "subjects.listBySection" => Some(handle_subjects_list_by_section(state, req)),
        "subjects.mine" => Some(handle_subjects_mine(state, req)),
        _ => None,
    }
}
