use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub const GRADE_MIN: f64 = 0.0;
pub const GRADE_MAX: f64 = 20.0;
/// Passing boundary on the 20-point scale.
pub const DEFAULT_PASS_THRESHOLD: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GradeValue {
    Valid(f64),
    Invalid,
}

/// One `{ value, coefficient? }` record as delivered by the API.
///
/// Both fields stay raw JSON: a malformed value must reach the aggregation so
/// it can be counted instead of failing deserialization of the whole list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GradeInput {
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub coefficient: Value,
}

impl GradeInput {
    pub fn new(value: impl Into<Value>, coefficient: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            coefficient: coefficient.into(),
        }
    }

    pub fn grade_value(&self) -> GradeValue {
        parse_grade_value(&self.value)
    }

    pub fn effective_coefficient(&self) -> f64 {
        effective_weight(parse_json_number(&self.coefficient))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectAverage {
    pub average: Option<f64>,
    pub invalid_count: usize,
    pub valid_count: usize,
    pub total_coefficient: f64,
}

/// Numeric fields accept the same spellings as grade values; anything else reads as absent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectSummary {
    #[serde(default, deserialize_with = "lenient_number")]
    pub average: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub coefficient: Option<f64>,
}

fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Value::deserialize(deserializer)?;
    Ok(parse_json_number(&raw).filter(|v| v.is_finite()))
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallAverage {
    pub average: Option<f64>,
    pub subject_count: usize,
    pub total_coefficient: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PassStatus {
    Pass,
    Fail,
    NoData,
}

/// Server-computed class rank. Never re-derived here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rank {
    pub position: i64,
    pub total: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CalcError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl CalcError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

fn parse_numeric_str(s: &str) -> Option<f64> {
    let t = s.trim();
    if t.is_empty() {
        return None;
    }
    // French locale front ends send "12,5".
    t.replacen(',', ".", 1).parse::<f64>().ok()
}

fn parse_json_number(raw: &Value) -> Option<f64> {
    match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_numeric_str(s),
        _ => None,
    }
}

pub fn parse_grade_value(raw: &Value) -> GradeValue {
    match parse_json_number(raw) {
        Some(v) if v.is_finite() && (GRADE_MIN..=GRADE_MAX).contains(&v) => GradeValue::Valid(v),
        _ => GradeValue::Invalid,
    }
}

/// Missing, zero, negative or non-finite weights count as 1.
pub fn effective_weight(raw: Option<f64>) -> f64 {
    match raw {
        Some(w) if w.is_finite() && w > 0.0 => w,
        _ => 1.0,
    }
}

pub fn compute_subject_average<'a, I>(entries: I) -> SubjectAverage
where
    I: IntoIterator<Item = &'a GradeInput>,
{
    let mut sum = 0.0_f64;
    let mut denom = 0.0_f64;
    let mut valid_count: usize = 0;
    let mut invalid_count: usize = 0;

    for e in entries {
        match e.grade_value() {
            GradeValue::Invalid => {
                invalid_count += 1;
            }
            GradeValue::Valid(v) => {
                let coef = e.effective_coefficient();
                valid_count += 1;
                sum += v * coef;
                denom += coef;
            }
        }
    }

    // Huge coefficients can overflow the sums; that degrades to no average.
    let average = if valid_count > 0 && denom > 0.0 {
        Some(sum / denom).filter(|v| v.is_finite())
    } else {
        None
    };

    SubjectAverage {
        average,
        invalid_count,
        valid_count,
        total_coefficient: denom,
    }
}

pub fn compute_overall_average<'a, I>(subjects: I) -> OverallAverage
where
    I: IntoIterator<Item = &'a SubjectSummary>,
{
    let mut sum = 0.0_f64;
    let mut denom = 0.0_f64;
    let mut subject_count: usize = 0;

    for s in subjects {
        let Some(avg) = s.average.filter(|v| v.is_finite()) else {
            continue;
        };
        let coef = effective_weight(s.coefficient);
        subject_count += 1;
        sum += avg * coef;
        denom += coef;
    }

    let average = if subject_count > 0 && denom > 0.0 {
        Some(sum / denom).filter(|v| v.is_finite())
    } else {
        None
    };

    OverallAverage {
        average,
        subject_count,
        total_coefficient: denom,
    }
}

/// Unweighted mean of the available semester averages.
pub fn compute_annual_average<I>(semester_averages: I) -> Option<f64>
where
    I: IntoIterator<Item = Option<f64>>,
{
    let mut sum = 0.0_f64;
    let mut count: usize = 0;
    for avg in semester_averages.into_iter().flatten() {
        if !avg.is_finite() {
            continue;
        }
        sum += avg;
        count += 1;
    }
    if count > 0 {
        Some(sum / (count as f64))
    } else {
        None
    }
}

pub fn round_off_2_decimals(x: f64) -> f64 {
    ((100.0 * x) + 0.5).floor() / 100.0
}

pub fn format_average(avg: Option<f64>) -> String {
    match avg.filter(|v| v.is_finite()) {
        Some(v) => format!("{:.2}", round_off_2_decimals(v)),
        None => "-".to_string(),
    }
}

pub fn pass_status(avg: Option<f64>, threshold: f64) -> PassStatus {
    match avg.filter(|v| v.is_finite()) {
        None => PassStatus::NoData,
        Some(v) if v >= threshold => PassStatus::Pass,
        Some(_) => PassStatus::Fail,
    }
}

pub fn format_rank(rank: &Rank) -> String {
    format!("{}/{}", rank.position, rank.total)
}

pub fn parse_grade_inputs(raw: Option<&Value>, key: &str) -> Result<Vec<GradeInput>, CalcError> {
    let Some(raw) = raw else {
        return Err(CalcError::new("bad_params", format!("missing {}", key)));
    };
    let Some(items) = raw.as_array() else {
        return Err(CalcError::new("bad_params", format!("{} must be an array", key)));
    };

    let mut out = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let Some(obj) = item.as_object() else {
            return Err(CalcError::new(
                "bad_params",
                format!("{}[{}] must be an object", key, i),
            ));
        };
        out.push(GradeInput::new(
            obj.get("value").cloned().unwrap_or(Value::Null),
            obj.get("coefficient").cloned().unwrap_or(Value::Null),
        ));
    }
    Ok(out)
}
