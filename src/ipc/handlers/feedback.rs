use crate::analysis::{self, RatingTriple};
use crate::auth::{self, Role};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{authenticate, db_conn, internal, required_str, require_role};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use std::collections::HashSet;
use uuid::Uuid;

const COMMENT_MAX_CHARS: usize = 500;

fn rating_param(req: &Request, key: &str) -> Result<i64, serde_json::Value> {
    // as_i64 rejects fractional JSON numbers, which must not sneak in as
    // truncated ratings.
    let value = req.params.get(key).and_then(|v| v.as_i64());
    match value {
        Some(v) if analysis::rating_in_range(v) => Ok(v),
        _ => Err(err(
            &req.id,
            "invalid_input",
            format!(
                "{} must be an integer between {} and {}",
                key,
                analysis::RATING_MIN,
                analysis::RATING_MAX
            ),
            None,
        )),
    }
}

fn lookup_subject(
    conn: &Connection,
    subject_id: &str,
) -> rusqlite::Result<Option<(String, String)>> {
    conn.query_row(
        "SELECT name, section FROM subjects WHERE id = ?",
        [subject_id],
        |r| Ok((r.get(0)?, r.get(1)?)),
    )
    .optional()
}

fn handle_submit(state: &mut AppState, req: &Request) -> serde_json::Value {
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

    let teaching = match rating_param(req, "teachingRating") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let knowledge = match rating_param(req, "knowledgeRating") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let behavior = match rating_param(req, "behaviorRating") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let comment = match req.params.get("comment").and_then(|v| v.as_str()) {
        Some(raw) => {
            let trimmed = raw.trim();
            if trimmed.chars().count() > COMMENT_MAX_CHARS {
                return err(
                    &req.id,
                    "invalid_input",
                    format!("comment must be at most {} characters", COMMENT_MAX_CHARS),
                    None,
                );
            }
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        None => None,
    };

    let subject_id = match required_str(req, "subjectId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let Some(student_section) = user.section.clone() else {
        return err(
            &req.id,
            "invalid_input",
            "student section could not be determined",
            None,
        );
    };

    let subject = match lookup_subject(conn, &subject_id) {
        Ok(v) => v,
        Err(e) => return internal(req, "subject lookup", &e),
    };
    let Some((_, subject_section)) = subject else {
        return err(&req.id, "not_found", "subject not found", None);
    };

    // Students rate only subjects of their own section; the stored section is
    // a denormalized copy that must match both sides at write time.
    if subject_section != student_section {
        return err(
            &req.id,
            "forbidden",
            "you can only submit feedback for subjects in your own section",
            None,
        );
    }

    // Pre-check for a friendlier message; the UNIQUE(student, subject,
    // section) constraint below is what actually guarantees at-most-once
    // under concurrent submissions.
    let existing: Option<i64> = match conn
        .query_row(
            "SELECT 1 FROM feedback WHERE student_id = ? AND subject_id = ? AND section = ?",
            (&user.id, &subject_id, &student_section),
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return internal(req, "feedback lookup", &e),
    };
    if existing.is_some() {
        return err(
            &req.id,
            "conflict",
            "feedback for this subject has already been submitted",
            None,
        );
    }

    let feedback_id = Uuid::new_v4().to_string();
    let created_at = auth::now_rfc3339();
    let insert = conn.execute(
        "INSERT INTO feedback(id, subject_id, student_id, section, teaching, knowledge, behavior, comment, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &feedback_id,
            &subject_id,
            &user.id,
            &student_section,
            teaching,
            knowledge,
            behavior,
            &comment,
            &created_at,
        ),
    );
    match insert {
        Ok(_) => ok(
            &req.id,
            json!({
                "feedbackId": feedback_id,
                "subjectId": subject_id,
                "section": student_section,
                "ratings": {
                    "teaching": teaching,
                    "knowledge": knowledge,
                    "behavior": behavior,
                },
                "createdAt": created_at,
            }),
        ),
        Err(e) if crate::db::is_unique_violation(&e) => err(
            &req.id,
            "conflict",
            "feedback for this subject has already been submitted",
            None,
        ),
        Err(e) => internal(req, "feedback insert", &e),
    }
}

fn handle_mine(state: &mut AppState, req: &Request) -> serde_json::Value {
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

    let rows = conn
        .prepare(
            "SELECT f.id, f.subject_id, s.name, s.section, f.teaching, f.knowledge,
                    f.behavior, f.comment, f.created_at
             FROM feedback f
             JOIN subjects s ON s.id = f.subject_id
             WHERE f.student_id = ?
             ORDER BY f.created_at DESC, f.rowid DESC",
        )
        .and_then(|mut stmt| {
            stmt.query_map([&user.id], |row| {
                let id: String = row.get(0)?;
                let subject_id: String = row.get(1)?;
                let subject_name: String = row.get(2)?;
                let section: String = row.get(3)?;
                let teaching: i64 = row.get(4)?;
                let knowledge: i64 = row.get(5)?;
                let behavior: i64 = row.get(6)?;
                let comment: Option<String> = row.get(7)?;
                let created_at: String = row.get(8)?;
                Ok(json!({
                    "feedbackId": id,
                    "subjectId": subject_id,
                    "subjectName": subject_name,
                    "section": section,
                    "ratings": {
                        "teaching": teaching,
                        "knowledge": knowledge,
                        "behavior": behavior,
                    },
                    "comment": comment,
                    "createdAt": created_at,
                }))
            })?
            .collect::<Result<Vec<_>, _>>()
        });

    match rows {
        Ok(feedback) => ok(&req.id, json!({ "feedback": feedback })),
        Err(e) => internal(req, "feedback query", &e),
    }
}

fn handle_analysis(state: &mut AppState, req: &Request) -> serde_json::Value {
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

    let subject_id = match required_str(req, "subjectId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let subject = match lookup_subject(conn, &subject_id) {
        Ok(v) => v,
        Err(e) => return internal(req, "subject lookup", &e),
    };
    let Some((subject_name, section)) = subject else {
        return err(&req.id, "not_found", "subject not found", None);
    };

    // All feedback for the subject, newest first, joined with its author for
    // display (email + student number only).
    struct Entry {
        detail: serde_json::Value,
        author_id: String,
        triple: RatingTriple,
    }
    let entries = conn
        .prepare(
            "SELECT f.id, f.student_id, u.email, u.student_id, f.teaching, f.knowledge,
                    f.behavior, f.comment, f.created_at
             FROM feedback f
             JOIN users u ON u.id = f.student_id
             WHERE f.subject_id = ?
             ORDER BY f.created_at DESC, f.rowid DESC",
        )
        .and_then(|mut stmt| {
            stmt.query_map([&subject_id], |row| {
                let id: String = row.get(0)?;
                let author_id: String = row.get(1)?;
                let email: String = row.get(2)?;
                let student_no: Option<String> = row.get(3)?;
                let teaching: i64 = row.get(4)?;
                let knowledge: i64 = row.get(5)?;
                let behavior: i64 = row.get(6)?;
                let comment: Option<String> = row.get(7)?;
                let created_at: String = row.get(8)?;
                Ok(Entry {
                    detail: json!({
                        "feedbackId": id,
                        "student": { "email": email, "studentId": student_no },
                        "ratings": {
                            "teaching": teaching,
                            "knowledge": knowledge,
                            "behavior": behavior,
                        },
                        "comment": comment,
                        "createdAt": created_at,
                    }),
                    author_id,
                    triple: RatingTriple {
                        teaching,
                        knowledge,
                        behavior,
                    },
                })
            })?
            .collect::<Result<Vec<_>, _>>()
        });
    let entries = match entries {
        Ok(v) => v,
        Err(e) => return internal(req, "feedback query", &e),
    };

    // Roster of the subject's section minus the authors above.
    let roster = conn
        .prepare(
            "SELECT id, email, student_id FROM users
             WHERE role = 'student' AND section = ? ORDER BY rowid",
        )
        .and_then(|mut stmt| {
            stmt.query_map([&section], |row| {
                let id: String = row.get(0)?;
                let email: String = row.get(1)?;
                let student_no: Option<String> = row.get(2)?;
                Ok((id, email, student_no))
            })?
            .collect::<Result<Vec<_>, _>>()
        });
    let roster = match roster {
        Ok(v) => v,
        Err(e) => return internal(req, "roster query", &e),
    };

    let submitted: HashSet<&str> = entries.iter().map(|e| e.author_id.as_str()).collect();
    let unsubmitted: Vec<serde_json::Value> = roster
        .iter()
        .filter(|(id, _, _)| !submitted.contains(id.as_str()))
        .map(|(_, email, student_no)| json!({ "email": email, "studentId": student_no }))
        .collect();

    let triples: Vec<RatingTriple> = entries.iter().map(|e| e.triple).collect();
    let summary = analysis::summarize(&triples);
    let details: Vec<serde_json::Value> = entries.into_iter().map(|e| e.detail).collect();

    ok(
        &req.id,
        json!({
            "subjectName": subject_name,
            "section": section,
            "totalFeedbackEntries": details.len(),
            "feedbackDetails": details,
            "analysis": {
                "overallSentiment": summary.overall_sentiment,
                "averageRatings": summary.average_ratings,
                "unsubmittedStudents": unsubmitted,
            },
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "feedback.submit" => Some(handle_submit(state, req)),
        "feedback.mine" => Some(handle_mine(state, req)),
        "feedback.analysis" => Some(handle_analysis(state, req)),
        _ => None,
    }
}
