use crate::bulletin::{GradeEntry, SemesterRank};
use crate::calc::GradeInput;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use uuid::Uuid;

pub const DB_FILE_NAME: &str = "bulletin.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS grade_entries(
            student_id TEXT NOT NULL,
            id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            subject_name TEXT NOT NULL,
            semester_label TEXT NOT NULL,
            value_json TEXT NOT NULL,
            coefficient_json TEXT NOT NULL,
            published INTEGER NOT NULL,
            sort_order INTEGER NOT NULL,
            fetched_at TEXT NOT NULL,
            PRIMARY KEY(student_id, id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grade_entries_student ON grade_entries(student_id, sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS ranks(
            student_id TEXT NOT NULL,
            semester_label TEXT NOT NULL,
            position INTEGER NOT NULL,
            total INTEGER NOT NULL,
            fetched_at TEXT NOT NULL,
            PRIMARY KEY(student_id, semester_label)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS annual_averages(
            student_id TEXT PRIMARY KEY,
            average REAL,
            fetched_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    Ok(conn)
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Replaces the cached projection of a student's grades.
pub fn grade_entries_replace(
    conn: &Connection,
    student_id: &str,
    entries: &[GradeEntry],
) -> anyhow::Result<usize> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "DELETE FROM grade_entries WHERE student_id = ?",
        [student_id],
    )?;

    let fetched_at = now_rfc3339();
    {
        let mut stmt = tx.prepare(
            "INSERT INTO grade_entries(
                id, student_id, subject_id, subject_name, semester_label,
                value_json, coefficient_json, published, sort_order, fetched_at
             ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )?;
        for (i, e) in entries.iter().enumerate() {
            // API ids are only unique per student; fall back to a fresh id.
            let id = match e.id.as_deref().map(str::trim) {
                Some(v) if !v.is_empty() => v.to_string(),
                _ => Uuid::new_v4().to_string(),
            };
            stmt.execute((
                &id,
                student_id,
                &e.subject_id,
                &e.subject_name,
                &e.semester_label,
                serde_json::to_string(&e.grade.value)?,
                serde_json::to_string(&e.grade.coefficient)?,
                e.published as i64,
                i as i64,
                &fetched_at,
            ))?;
        }
    }
    tx.commit()?;
    Ok(entries.len())
}

pub fn grade_entries_list(
    conn: &Connection,
    student_id: &str,
    semester_label: Option<&str>,
) -> anyhow::Result<Vec<GradeEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, subject_id, subject_name, semester_label, value_json, coefficient_json, published
         FROM grade_entries
         WHERE student_id = ?1 AND (?2 IS NULL OR semester_label = ?2)
         ORDER BY sort_order",
    )?;
    let rows = stmt
        .query_map((student_id, semester_label), |r| {
            let value_json: String = r.get(4)?;
            let coefficient_json: String = r.get(5)?;
            Ok(GradeEntry {
                id: Some(r.get(0)?),
                subject_id: r.get(1)?,
                subject_name: r.get(2)?,
                semester_label: r.get(3)?,
                // An unreadable cell degrades to null, which the calc counts as invalid.
                grade: GradeInput {
                    value: serde_json::from_str(&value_json).unwrap_or_default(),
                    coefficient: serde_json::from_str(&coefficient_json).unwrap_or_default(),
                },
                published: r.get::<_, i64>(6)? != 0,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn ranks_replace(
    conn: &Connection,
    student_id: &str,
    ranks: &[SemesterRank],
) -> anyhow::Result<usize> {
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM ranks WHERE student_id = ?", [student_id])?;
    let fetched_at = now_rfc3339();
    for r in ranks {
        tx.execute(
            "INSERT INTO ranks(student_id, semester_label, position, total, fetched_at)
             VALUES(?, ?, ?, ?, ?)
             ON CONFLICT(student_id, semester_label) DO UPDATE SET
               position = excluded.position,
               total = excluded.total,
               fetched_at = excluded.fetched_at",
            (student_id, &r.semester_label, r.position, r.total, &fetched_at),
        )?;
    }
    tx.commit()?;
    Ok(ranks.len())
}

/// Replaces the cached server annual average; `None` clears it.
pub fn annual_average_replace(
    conn: &Connection,
    student_id: &str,
    average: Option<f64>,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO annual_averages(student_id, average, fetched_at) VALUES(?, ?, ?)
         ON CONFLICT(student_id) DO UPDATE SET
           average = excluded.average,
           fetched_at = excluded.fetched_at",
        (student_id, average, now_rfc3339()),
    )?;
    Ok(())
}

pub fn annual_average_get(conn: &Connection, student_id: &str) -> anyhow::Result<Option<f64>> {
    let avg: Option<Option<f64>> = conn
        .query_row(
            "SELECT average FROM annual_averages WHERE student_id = ?",
            [student_id],
            |r| r.get(0),
        )
        .optional()?;
    Ok(avg.flatten())
}

pub fn ranks_list(conn: &Connection, student_id: &str) -> anyhow::Result<Vec<SemesterRank>> {
    let mut stmt = conn.prepare(
        "SELECT semester_label, position, total
         FROM ranks
         WHERE student_id = ?
         ORDER BY semester_label",
    )?;
    let rows = stmt
        .query_map([student_id], |r| {
            Ok(SemesterRank {
                semester_label: r.get(0)?,
                position: r.get(1)?,
                total: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn student_exists(conn: &Connection, student_id: &str) -> anyhow::Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM grade_entries WHERE student_id = ?
             UNION SELECT 1 FROM ranks WHERE student_id = ?
             UNION SELECT 1 FROM annual_averages WHERE student_id = ?
             LIMIT 1",
            (student_id, student_id, student_id),
            |r| r.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &serde_json::Value) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}
