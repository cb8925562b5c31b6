use crate::bulletin::BulletinOptions;
use crate::calc;
use crate::db;
use rusqlite::Connection;
use serde::Serialize;

pub const PASS_THRESHOLD_KEY: &str = "bulletin.passThreshold";
pub const PUBLISHED_ONLY_KEY: &str = "bulletin.publishedOnly";

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulletinSettings {
    pub pass_threshold: f64,
    pub published_only: bool,
}

impl Default for BulletinSettings {
    fn default() -> Self {
        Self {
            pass_threshold: calc::DEFAULT_PASS_THRESHOLD,
            published_only: true,
        }
    }
}

impl BulletinSettings {
    /// Stored values override the defaults; unreadable ones are ignored.
    pub fn load(conn: Option<&Connection>) -> anyhow::Result<Self> {
        let mut out = Self::default();
        let Some(conn) = conn else {
            return Ok(out);
        };
        if let Some(v) = db::settings_get_json(conn, PASS_THRESHOLD_KEY)?.and_then(|v| v.as_f64()) {
            if valid_threshold(v) {
                out.pass_threshold = v;
            }
        }
        if let Some(v) = db::settings_get_json(conn, PUBLISHED_ONLY_KEY)?.and_then(|v| v.as_bool()) {
            out.published_only = v;
        }
        Ok(out)
    }

    pub fn save(&self, conn: &Connection) -> anyhow::Result<()> {
        db::settings_set_json(conn, PASS_THRESHOLD_KEY, &serde_json::json!(self.pass_threshold))?;
        db::settings_set_json(conn, PUBLISHED_ONLY_KEY, &serde_json::json!(self.published_only))?;
        Ok(())
    }

    pub fn bulletin_options(&self, published_only: Option<bool>) -> BulletinOptions {
        BulletinOptions {
            published_only: published_only.unwrap_or(self.published_only),
            pass_threshold: self.pass_threshold,
        }
    }
}

pub fn valid_threshold(v: f64) -> bool {
    v.is_finite() && (calc::GRADE_MIN..=calc::GRADE_MAX).contains(&v)
}
