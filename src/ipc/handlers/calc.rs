use crate::calc::{self, Rank, SubjectSummary};
use crate::ipc::error::{calc_err, err, ok};
use crate::ipc::helpers::required_typed;
use crate::ipc::types::{AppState, Request};
use crate::settings::BulletinSettings;
use serde_json::json;

fn pass_threshold(state: &AppState, req: &Request) -> Result<f64, serde_json::Value> {
    BulletinSettings::load(state.db.as_ref())
        .map(|s| s.pass_threshold)
        .map_err(|e| err(&req.id, "db_query_failed", e.to_string(), None))
}

fn handle_subject_average(state: &mut AppState, req: &Request) -> serde_json::Value {
    let entries = match calc::parse_grade_inputs(req.params.get("entries"), "entries") {
        Ok(v) => v,
        Err(e) => return calc_err(&req.id, e),
    };
    let threshold = match pass_threshold(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let avg = calc::compute_subject_average(&entries);
    if avg.invalid_count > 0 {
        tracing::debug!(invalid = avg.invalid_count, "grades excluded from subject average");
    }
    ok(
        &req.id,
        json!({
            "average": avg.average,
            "invalidCount": avg.invalid_count,
            "validCount": avg.valid_count,
            "totalCoefficient": avg.total_coefficient,
            "display": calc::format_average(avg.average),
            "passStatus": calc::pass_status(avg.average, threshold),
        }),
    )
}

fn handle_overall_average(state: &mut AppState, req: &Request) -> serde_json::Value {
    let subjects: Vec<SubjectSummary> = match required_typed(req, "subjects") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let threshold = match pass_threshold(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let overall = calc::compute_overall_average(&subjects);
    ok(
        &req.id,
        json!({
            "average": overall.average,
            "subjectCount": overall.subject_count,
            "totalCoefficient": overall.total_coefficient,
            "display": calc::format_average(overall.average),
            "passStatus": calc::pass_status(overall.average, threshold),
        }),
    )
}

fn handle_annual_average(state: &mut AppState, req: &Request) -> serde_json::Value {
    let semester_averages: Vec<Option<f64>> = match required_typed(req, "semesterAverages") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let threshold = match pass_threshold(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let average = calc::compute_annual_average(semester_averages);
    ok(
        &req.id,
        json!({
            "average": average,
            "display": calc::format_average(average),
            "passStatus": calc::pass_status(average, threshold),
        }),
    )
}

fn handle_rank_format(_state: &mut AppState, req: &Request) -> serde_json::Value {
    let rank: Rank = match serde_json::from_value(req.params.clone()) {
        Ok(v) => v,
        Err(e) => {
            return err(
                &req.id,
                "bad_params",
                format!("position and total must be integers: {}", e),
                None,
            )
        }
    };
    ok(
        &req.id,
        json!({
            "position": rank.position,
            "total": rank.total,
            "display": calc::format_rank(&rank),
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "calc.subjectAverage" => Some(handle_subject_average(state, req)),
        "calc.overallAverage" => Some(handle_overall_average(state, req)),
        "calc.annualAverage" => Some(handle_annual_average(state, req)),
        "rank.format" => Some(handle_rank_format(state, req)),
        _ => None,
    }
}
