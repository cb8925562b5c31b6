use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, optional_bool, optional_f64};
use crate::ipc::types::{AppState, Request};
use crate::settings::{valid_threshold, BulletinSettings};
use serde_json::json;

fn handle_settings_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    match BulletinSettings::load(state.db.as_ref()) {
        Ok(s) => ok(&req.id, json!(s)),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_settings_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let pass_threshold = match optional_f64(req, "passThreshold") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let published_only = match optional_bool(req, "publishedOnly") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Some(t) = pass_threshold {
        if !valid_threshold(t) {
            return err(
                &req.id,
                "bad_params",
                "passThreshold must be within 0..=20",
                Some(json!({ "passThreshold": t })),
            );
        }
    }

    let mut settings = match BulletinSettings::load(Some(conn)) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Some(t) = pass_threshold {
        settings.pass_threshold = t;
    }
    if let Some(p) = published_only {
        settings.published_only = p;
    }
    if let Err(e) = settings.save(conn) {
        tracing::warn!(error = %e, "settings save failed");
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }
    ok(&req.id, json!(settings))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "settings.get" => Some(handle_settings_get(state, req)),
        "settings.update" => Some(handle_settings_update(state, req)),
        _ => None,
    }
}
