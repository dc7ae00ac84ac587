use serde::{Deserialize, Serialize};

/// An already-completed project's track duration, pasted or imported by staff
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoricalCloseMetric {
    /// Dedup identity (sha256 of company, track, dates, duration and delimiter)
    pub source_key: String,
    pub sf_id: Option<String>,
    pub company: String,
    /// `SRA` or `NVA`
    pub track: String,
    /// `MM/DD/YYYY`, may be empty
    pub kickoff_date: String,
    /// `MM/DD/YYYY`, may be empty
    pub final_date: String,
    pub close_days: i64,
    /// `YYYY Qn`, may be empty
    pub quarter_label: String,
    /// Provenance tag, e.g. `paste:tab`
    pub source: String,
    pub imported_at: String,
}

/// Where a close-duration record came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordOrigin {
    Live,
    Historical,
}

/// One close-duration data point used by the metrics report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseRecord {
    pub origin: RecordOrigin,
    pub sf_id: Option<String>,
    pub company: String,
    pub track: String,
    pub kickoff_date: String,
    pub final_date: String,
    pub close_days: i64,
    pub quarter_label: String,
}

impl CloseRecord {
    /// Identity used to drop live rows already covered by an import.
    pub fn dedup_key(&self) -> (String, String, String, String) {
        (
            self.company.trim().to_lowercase(),
            self.track.trim().to_uppercase(),
            self.kickoff_date.trim().to_string(),
            self.final_date.trim().to_string(),
        )
    }
}

impl From<&HistoricalCloseMetric> for CloseRecord {
    fn from(row: &HistoricalCloseMetric) -> Self {
        CloseRecord {
            origin: RecordOrigin::Historical,
            sf_id: row.sf_id.clone(),
            company: row.company.clone(),
            track: row.track.clone(),
            kickoff_date: row.kickoff_date.clone(),
            final_date: row.final_date.clone(),
            close_days: row.close_days,
            quarter_label: row.quarter_label.clone(),
        }
    }
}
