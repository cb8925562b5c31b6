use crate::calc::{self, GradeInput, PassStatus, Rank, SubjectSummary};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

fn default_published() -> bool {
    true
}

/// A grade as fetched for one student: subject, semester, raw value, weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub subject_id: String,
    #[serde(default)]
    pub subject_name: String,
    pub semester_label: String,
    #[serde(flatten)]
    pub grade: GradeInput,
    #[serde(default = "default_published", alias = "publishedFlag")]
    pub published: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemesterRank {
    pub semester_label: String,
    pub position: i64,
    pub total: i64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BulletinOptions {
    pub published_only: bool,
    pub pass_threshold: f64,
}

impl Default for BulletinOptions {
    fn default() -> Self {
        Self {
            published_only: true,
            pass_threshold: calc::DEFAULT_PASS_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectLine {
    pub subject_id: String,
    pub subject_name: String,
    pub entry_count: usize,
    pub valid_count: usize,
    pub invalid_count: usize,
    pub total_coefficient: f64,
    pub average: Option<f64>,
    pub display: String,
    pub pass_status: PassStatus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SemesterBlock {
    pub semester_label: String,
    pub subjects: Vec<SubjectLine>,
    pub average: Option<f64>,
    pub display: String,
    pub pass_status: PassStatus,
    pub invalid_count: usize,
    pub rank: Option<Rank>,
    pub rank_display: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnualSource {
    Server,
    Computed,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnualLine {
    pub average: Option<f64>,
    pub display: String,
    pub pass_status: PassStatus,
    pub source: AnnualSource,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulletinModel {
    pub pass_threshold: f64,
    pub published_only: bool,
    pub unpublished_skipped: usize,
    pub semesters: Vec<SemesterBlock>,
    pub annual: AnnualLine,
}

struct SubjectGroup<'a> {
    subject_id: &'a str,
    subject_name: &'a str,
    grades: Vec<&'a GradeInput>,
}

struct SemesterGroup<'a> {
    label: &'a str,
    subjects: Vec<SubjectGroup<'a>>,
    subject_index: HashMap<&'a str, usize>,
}

/// Groups by semester, then subject, both in first-seen order.
fn group_entries<'a, I>(entries: I) -> Vec<SemesterGroup<'a>>
where
    I: IntoIterator<Item = &'a GradeEntry>,
{
    let mut semesters: Vec<SemesterGroup<'a>> = Vec::new();
    let mut semester_index: HashMap<&'a str, usize> = HashMap::new();

    for e in entries {
        let si = *semester_index
            .entry(e.semester_label.as_str())
            .or_insert_with(|| {
                semesters.push(SemesterGroup {
                    label: e.semester_label.as_str(),
                    subjects: Vec::new(),
                    subject_index: HashMap::new(),
                });
                semesters.len() - 1
            });
        let sem = &mut semesters[si];
        let subj_i = match sem.subject_index.get(e.subject_id.as_str()) {
            Some(i) => *i,
            None => {
                sem.subjects.push(SubjectGroup {
                    subject_id: e.subject_id.as_str(),
                    subject_name: e.subject_name.as_str(),
                    grades: Vec::new(),
                });
                let i = sem.subjects.len() - 1;
                sem.subject_index.insert(e.subject_id.as_str(), i);
                i
            }
        };
        sem.subjects[subj_i].grades.push(&e.grade);
    }

    semesters
}

pub fn build_bulletin(
    entries: &[GradeEntry],
    ranks: &[SemesterRank],
    server_annual: Option<f64>,
    opts: &BulletinOptions,
) -> BulletinModel {
    let unpublished_skipped = if opts.published_only {
        entries.iter().filter(|e| !e.published).count()
    } else {
        0
    };
    let groups = group_entries(
        entries
            .iter()
            .filter(|e| e.published || !opts.published_only),
    );

    let mut semesters: Vec<SemesterBlock> = Vec::with_capacity(groups.len());
    for g in groups {
        let mut subjects: Vec<SubjectLine> = Vec::with_capacity(g.subjects.len());
        let mut summaries: Vec<SubjectSummary> = Vec::with_capacity(g.subjects.len());
        let mut invalid_count = 0_usize;

        for s in &g.subjects {
            let avg = calc::compute_subject_average(s.grades.iter().copied());
            invalid_count += avg.invalid_count;
            summaries.push(SubjectSummary {
                average: avg.average,
                coefficient: Some(avg.total_coefficient),
            });
            subjects.push(SubjectLine {
                subject_id: s.subject_id.to_string(),
                subject_name: s.subject_name.to_string(),
                entry_count: s.grades.len(),
                valid_count: avg.valid_count,
                invalid_count: avg.invalid_count,
                total_coefficient: avg.total_coefficient,
                average: avg.average,
                display: calc::format_average(avg.average),
                pass_status: calc::pass_status(avg.average, opts.pass_threshold),
            });
        }

        let overall = calc::compute_overall_average(&summaries);
        let rank = ranks
            .iter()
            .find(|r| r.semester_label == g.label)
            .map(|r| Rank {
                position: r.position,
                total: r.total,
            });

        semesters.push(SemesterBlock {
            semester_label: g.label.to_string(),
            subjects,
            average: overall.average,
            display: calc::format_average(overall.average),
            pass_status: calc::pass_status(overall.average, opts.pass_threshold),
            invalid_count,
            rank_display: rank.as_ref().map(calc::format_rank),
            rank,
        });
    }

    // A ranked semester with no grades left still carries its rank.
    for r in ranks {
        if semesters.iter().any(|s| s.semester_label == r.semester_label) {
            continue;
        }
        let rank = Rank {
            position: r.position,
            total: r.total,
        };
        semesters.push(SemesterBlock {
            semester_label: r.semester_label.clone(),
            subjects: Vec::new(),
            average: None,
            display: calc::format_average(None),
            pass_status: PassStatus::NoData,
            invalid_count: 0,
            rank: Some(rank),
            rank_display: Some(calc::format_rank(&rank)),
        });
    }

    let (annual_avg, source) = match server_annual.filter(|v| v.is_finite()) {
        Some(v) => (Some(v), AnnualSource::Server),
        None => (
            calc::compute_annual_average(semesters.iter().map(|s| s.average)),
            AnnualSource::Computed,
        ),
    };

    BulletinModel {
        pass_threshold: opts.pass_threshold,
        published_only: opts.published_only,
        unpublished_skipped,
        semesters,
        annual: AnnualLine {
            average: annual_avg,
            display: calc::format_average(annual_avg),
            pass_status: calc::pass_status(annual_avg, opts.pass_threshold),
            source,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn grade(subject: &str, semester: &str, value: serde_json::Value, coef: i64) -> GradeEntry {
        GradeEntry {
            id: None,
            subject_id: subject.to_string(),
            subject_name: subject.to_uppercase(),
            semester_label: semester.to_string(),
            grade: GradeInput::new(value, coef),
            published: true,
        }
    }

    #[test]
    fn semester_average_weights_subjects_by_total_coefficient() {
        let entries = vec![
            grade("math", "T1", json!(10), 2),
            grade("math", "T1", json!(16), 1),
            grade("hist", "T1", json!(16), 1),
        ];
        let model = build_bulletin(&entries, &[], None, &BulletinOptions::default());
        assert_eq!(model.semesters.len(), 1);
        let t1 = &model.semesters[0];
        assert_eq!(t1.subjects[0].subject_id, "math");
        assert_eq!(t1.subjects[0].average, Some(12.0));
        assert_eq!(t1.subjects[0].total_coefficient, 3.0);
        assert_eq!(t1.subjects[1].average, Some(16.0));
        // (12*3 + 16*1) / 4
        assert_eq!(t1.average, Some(13.0));
        assert_eq!(t1.display, "13.00");
        assert_eq!(t1.pass_status, PassStatus::Pass);
    }

    #[test]
    fn semesters_keep_first_seen_order_and_annual_is_computed() {
        let entries = vec![
            grade("math", "T2", json!(12), 1),
            grade("math", "T1", json!(8), 1),
            grade("math", "T3", json!("bad"), 1),
        ];
        let model = build_bulletin(&entries, &[], None, &BulletinOptions::default());
        let labels: Vec<&str> = model
            .semesters
            .iter()
            .map(|s| s.semester_label.as_str())
            .collect();
        assert_eq!(labels, vec!["T2", "T1", "T3"]);
        assert_eq!(model.semesters[2].average, None);
        assert_eq!(model.semesters[2].invalid_count, 1);
        assert_eq!(model.semesters[2].pass_status, PassStatus::NoData);
        assert_eq!(model.annual.average, Some(10.0));
        assert_eq!(model.annual.source, AnnualSource::Computed);
    }

    #[test]
    fn server_annual_average_wins() {
        let entries = vec![grade("math", "T1", json!(8), 1)];
        let model = build_bulletin(&entries, &[], Some(11.5), &BulletinOptions::default());
        assert_eq!(model.annual.average, Some(11.5));
        assert_eq!(model.annual.source, AnnualSource::Server);
        assert_eq!(model.annual.display, "11.50");
    }

    #[test]
    fn unpublished_entries_are_skipped_unless_requested() {
        let mut hidden = grade("math", "T1", json!(2), 1);
        hidden.published = false;
        let entries = vec![grade("math", "T1", json!(14), 1), hidden];

        let model = build_bulletin(&entries, &[], None, &BulletinOptions::default());
        assert_eq!(model.unpublished_skipped, 1);
        assert_eq!(model.semesters[0].average, Some(14.0));

        let opts = BulletinOptions {
            published_only: false,
            ..BulletinOptions::default()
        };
        let model = build_bulletin(&entries, &[], None, &opts);
        assert_eq!(model.unpublished_skipped, 0);
        assert_eq!(model.semesters[0].average, Some(8.0));
        assert_eq!(model.semesters[0].pass_status, PassStatus::Fail);
    }

    #[test]
    fn ranks_are_passed_through() {
        let entries = vec![grade("math", "T1", json!(14), 1)];
        let ranks = vec![SemesterRank {
            semester_label: "T1".to_string(),
            position: 4,
            total: 31,
        }];
        let model = build_bulletin(&entries, &ranks, None, &BulletinOptions::default());
        assert_eq!(model.semesters[0].rank, Some(Rank { position: 4, total: 31 }));
        assert_eq!(model.semesters[0].rank_display.as_deref(), Some("4/31"));
    }

    #[test]
    fn ranked_semester_without_remaining_grades_keeps_its_rank() {
        let mut hidden = grade("math", "T2", json!(4), 1);
        hidden.published = false;
        let entries = vec![grade("math", "T1", json!(15), 1), hidden];
        let ranks = vec![
            SemesterRank {
                semester_label: "T1".to_string(),
                position: 1,
                total: 2,
            },
            SemesterRank {
                semester_label: "T2".to_string(),
                position: 3,
                total: 30,
            },
            SemesterRank {
                semester_label: "T3".to_string(),
                position: 5,
                total: 30,
            },
        ];
        let model = build_bulletin(&entries, &ranks, None, &BulletinOptions::default());

        let labels: Vec<&str> = model
            .semesters
            .iter()
            .map(|s| s.semester_label.as_str())
            .collect();
        assert_eq!(labels, vec!["T1", "T2", "T3"]);
        let t2 = &model.semesters[1];
        assert_eq!(t2.rank, Some(Rank { position: 3, total: 30 }));
        assert_eq!(t2.rank_display.as_deref(), Some("3/30"));
        assert_eq!(t2.average, None);
        assert_eq!(t2.display, "-");
        assert_eq!(t2.pass_status, PassStatus::NoData);
        assert!(t2.subjects.is_empty());
        assert_eq!(model.semesters[2].rank_display.as_deref(), Some("5/30"));

        // Rank-only semesters do not pull the annual average down.
        assert_eq!(model.annual.average, Some(15.0));
    }

    #[test]
    fn entry_deserializes_with_defaults() {
        let e: GradeEntry = serde_json::from_value(json!({
            "subjectId": "fr",
            "semesterLabel": "T1",
            "value": "13,5"
        }))
        .expect("deserialize entry");
        assert!(e.published);
        assert_eq!(e.grade.effective_coefficient(), 1.0);

        let e: GradeEntry = serde_json::from_value(json!({
            "subjectId": "fr",
            "semesterLabel": "T1",
            "value": 9,
            "coefficient": 0,
            "publishedFlag": false
        }))
        .expect("deserialize entry");
        assert!(!e.published);
        assert_eq!(e.grade.effective_coefficient(), 1.0);
    }
}
