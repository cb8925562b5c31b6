use crate::bulletin::{GradeEntry, SemesterRank};
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, optional_f64, optional_str, required_str};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

const IMPORT_MAX_ENTRIES: usize = 10_000;

struct HandlerErr {
    code: &'static str,
    message: String,
    details: Option<serde_json::Value>,
}

impl HandlerErr {
    fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

fn parse_entries(raw: Option<&serde_json::Value>) -> Result<Vec<GradeEntry>, HandlerErr> {
    let Some(items) = raw.and_then(|v| v.as_array()) else {
        return Err(HandlerErr {
            code: "bad_params",
            message: "entries must be an array".to_string(),
            details: None,
        });
    };
    if items.len() > IMPORT_MAX_ENTRIES {
        return Err(HandlerErr {
            code: "bad_params",
            message: "too many entries".to_string(),
            details: Some(json!({ "count": items.len(), "max": IMPORT_MAX_ENTRIES })),
        });
    }

    let mut out = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        // Only the envelope is validated here; a malformed value is kept and counted later.
        let entry: GradeEntry = serde_json::from_value(item.clone()).map_err(|e| HandlerErr {
            code: "bad_params",
            message: format!("entries[{}]: {}", i, e),
            details: Some(json!({ "index": i })),
        })?;
        if entry.subject_id.trim().is_empty() || entry.semester_label.trim().is_empty() {
            return Err(HandlerErr {
                code: "bad_params",
                message: format!("entries[{}]: subjectId and semesterLabel must be non-empty", i),
                details: Some(json!({ "index": i })),
            });
        }
        out.push(entry);
    }
    Ok(out)
}

fn parse_ranks(raw: Option<&serde_json::Value>) -> Result<Vec<SemesterRank>, HandlerErr> {
    let Some(raw) = raw else {
        return Err(HandlerErr {
            code: "bad_params",
            message: "missing ranks".to_string(),
            details: None,
        });
    };
    serde_json::from_value(raw.clone()).map_err(|e| HandlerErr {
        code: "bad_params",
        message: format!("invalid ranks: {}", e),
        details: None,
    })
}

fn handle_grades_import(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let entries = match parse_entries(req.params.get("entries")) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    match db::grade_entries_replace(conn, &student_id, &entries) {
        Ok(imported) => {
            tracing::info!(student = %student_id, imported, "grades imported");
            ok(
                &req.id,
                json!({ "studentId": student_id, "imported": imported }),
            )
        }
        Err(e) => {
            tracing::warn!(student = %student_id, error = %e, "grades import failed");
            err(&req.id, "db_insert_failed", e.to_string(), None)
        }
    }
}

fn handle_grades_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let semester_label = match optional_str(req, "semesterLabel") {
        Ok(v) => v,
        Err(e) => return e,
    };

    match db::grade_entries_list(conn, &student_id, semester_label.as_deref()) {
        Ok(entries) => ok(&req.id, json!({ "entries": entries })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_ranks_import(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let ranks = match parse_ranks(req.params.get("ranks")) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    // Only touch the cached annual average when the key is sent; null clears it.
    let annual_sent = req.params.get("annualAverage").is_some();
    let annual = match optional_f64(req, "annualAverage") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let stored = db::ranks_replace(conn, &student_id, &ranks).and_then(|imported| {
        if annual_sent {
            db::annual_average_replace(conn, &student_id, annual)?;
        }
        Ok(imported)
    });
    match stored {
        Ok(imported) => ok(
            &req.id,
            json!({
                "studentId": student_id,
                "imported": imported,
                "annualAverage": annual,
            }),
        ),
        Err(e) => {
            tracing::warn!(student = %student_id, error = %e, "ranks import failed");
            err(&req.id, "db_insert_failed", e.to_string(), None)
        }
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "grades.import" => Some(handle_grades_import(state, req)),
        "grades.list" => Some(handle_grades_list(state, req)),
        "ranks.import" => Some(handle_ranks_import(state, req)),
        _ => None,
    }
}
