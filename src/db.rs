use rusqlite::Connection;
use std::path::Path;

/// Opens (creating if needed) the feedback database inside a workspace
/// directory and applies the schema.
///
/// Uniqueness rules live in the schema itself, not in handler code:
/// - section names are primary keys (stored trimmed + upper-cased),
/// - user emails and student numbers are globally unique,
/// - subject names are unique within their section,
/// - at most one feedback row exists per (student, subject, section) triple.
///
/// The feedback constraint is the authoritative duplicate guard; handler-level
/// pre-checks only exist to produce friendlier messages before the insert.
pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("feedback.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS sections(
            name TEXT PRIMARY KEY,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS users(
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            password_salt TEXT NOT NULL,
            password_hash TEXT NOT NULL,
            role TEXT NOT NULL CHECK(role IN ('principal', 'student')),
            student_id TEXT UNIQUE,
            section TEXT,
            created_at TEXT NOT NULL,
            FOREIGN KEY(section) REFERENCES sections(name)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_users_section ON users(section)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            section TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(section) REFERENCES sections(name),
            UNIQUE(name, section)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subjects_section ON subjects(section)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS feedback(
            id TEXT PRIMARY KEY,
            subject_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            section TEXT NOT NULL,
            teaching INTEGER NOT NULL,
            knowledge INTEGER NOT NULL,
            behavior INTEGER NOT NULL,
            comment TEXT,
            created_at TEXT NOT NULL,
            FOREIGN KEY(subject_id) REFERENCES subjects(id),
            FOREIGN KEY(student_id) REFERENCES users(id),
            UNIQUE(student_id, subject_id, section)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_feedback_subject ON feedback(subject_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_feedback_student ON feedback(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS auth_tokens(
            token TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            issued_at TEXT NOT NULL,
            expires_at TEXT NOT NULL,
            FOREIGN KEY(user_id) REFERENCES users(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_auth_tokens_user ON auth_tokens(user_id)",
        [],
    )?;

    Ok(conn)
}

/// True when the rusqlite error is a UNIQUE/PRIMARY KEY violation. Used to
/// map lost insert races onto the conflict error class instead of internal.
pub fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}
