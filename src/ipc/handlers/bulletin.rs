use crate::bulletin::{self, GradeEntry, SemesterRank};
use crate::calc::CalcError;
use crate::db;
use crate::ipc::error::{calc_err, err, ok};
use crate::ipc::helpers::{db_conn, optional_bool, optional_f64, optional_typed, required_str, required_typed};
use crate::ipc::types::{AppState, Request};
use crate::settings::BulletinSettings;
use serde_json::json;

fn load_settings(state: &AppState, req: &Request) -> Result<BulletinSettings, serde_json::Value> {
    BulletinSettings::load(state.db.as_ref())
        .map_err(|e| err(&req.id, "db_query_failed", e.to_string(), None))
}

fn handle_bulletin_compute(state: &mut AppState, req: &Request) -> serde_json::Value {
    let entries: Vec<GradeEntry> = match required_typed(req, "entries") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let ranks: Vec<SemesterRank> = match optional_typed(req, "ranks") {
        Ok(v) => v.unwrap_or_default(),
        Err(e) => return e,
    };
    let server_annual = match optional_f64(req, "annualAverage") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let published_only = match optional_bool(req, "publishedOnly") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let settings = match load_settings(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };

    let model = bulletin::build_bulletin(
        &entries,
        &ranks,
        server_annual,
        &settings.bulletin_options(published_only),
    );
    ok(&req.id, json!(model))
}

fn handle_bulletin_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let published_only = match optional_bool(req, "publishedOnly") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let server_annual = match optional_f64(req, "annualAverage") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let settings = match load_settings(state, req) {
        Ok(s) => s,
        Err(e) => return e,
    };
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };

    match db::student_exists(conn, &student_id) {
        Ok(true) => {}
        Ok(false) => {
            return calc_err(
                &req.id,
                CalcError::new("not_found", "no cached grades for student")
                    .with_details(json!({ "studentId": student_id })),
            )
        }
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    let entries = match db::grade_entries_list(conn, &student_id, None) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let ranks = match db::ranks_list(conn, &student_id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let server_annual = match server_annual {
        Some(v) => Some(v),
        None => match db::annual_average_get(conn, &student_id) {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        },
    };

    let model = bulletin::build_bulletin(
        &entries,
        &ranks,
        server_annual,
        &settings.bulletin_options(published_only),
    );
    ok(
        &req.id,
        json!({
            "studentId": student_id,
            "bulletin": model,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "bulletin.compute" => Some(handle_bulletin_compute(state, req)),
        "bulletin.open" => Some(handle_bulletin_open(state, req)),
        _ => None,
    }
}
