use chrono::NaiveDate;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::util::dates::{format_us_date, parse_us_date};

/// One of the two parallel workflows a client can be enrolled in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Track {
    Sra,
    Nva,
}

impl Track {
    pub const ALL: [Track; 2] = [Track::Sra, Track::Nva];

    /// The metric key section (`sra` / `nva`)
    pub fn as_str(self) -> &'static str {
        match self {
            Track::Sra => "sra",
            Track::Nva => "nva",
        }
    }

    /// Parse a metric key section, case-insensitively
    pub fn from_section(section: &str) -> Option<Track> {
        match section.trim().to_ascii_lowercase().as_str() {
            "sra" => Some(Track::Sra),
            "nva" => Some(Track::Nva),
            _ => None,
        }
    }

    pub fn kickoff_slug(self) -> &'static str {
        match self {
            Track::Sra => "sra_kickoff",
            Track::Nva => "nva_kickoff",
        }
    }

    pub fn present_final_slug(self) -> &'static str {
        match self {
            Track::Sra => "present_final_sra_report",
            Track::Nva => "present_final_nva_report",
        }
    }
}

impl std::fmt::Display for Track {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Track::Sra => write!(f, "SRA"),
            Track::Nva => write!(f, "NVA"),
        }
    }
}

/// Status pill shown next to each step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StepStatus {
    #[default]
    #[serde(rename = "Not Started")]
    NotStarted,
    #[serde(rename = "On Track")]
    OnTrack,
    #[serde(rename = "Potential Roadblock")]
    PotentialRoadblock,
    #[serde(rename = "Roadblock/Overage")]
    RoadblockOverage,
    Completed,
}

impl StepStatus {
    pub fn label(self) -> &'static str {
        match self {
            StepStatus::NotStarted => "Not Started",
            StepStatus::OnTrack => "On Track",
            StepStatus::PotentialRoadblock => "Potential Roadblock",
            StepStatus::RoadblockOverage => "Roadblock/Overage",
            StepStatus::Completed => "Completed",
        }
    }

    /// CSS class of the status badge
    pub fn badge_class(self) -> &'static str {
        match self {
            StepStatus::OnTrack | StepStatus::Completed => "status-pill-green",
            StepStatus::PotentialRoadblock => "status-pill-yellow",
            StepStatus::RoadblockOverage => "status-pill-red",
            StepStatus::NotStarted => "status-pill-neutral",
        }
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Where a step's ECD value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EcdSource {
    /// No ECD
    #[default]
    Blank,
    /// Read straight from a `<track>.<step>.ecd` metric
    Parsed,
    /// Computed from an anchor plus an offset
    Projected,
    /// Copied from an ACD (the step's own, or another track's)
    Mirrored,
    /// Staff-entered manual override
    Override,
}

/// A workflow step reconstituted from metric keys. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub slug: String,
    /// Actual completion date, raw text (usually `MM/DD/YYYY`)
    pub acd: String,
    /// Estimated completion date, raw text
    pub ecd: String,
    pub ecd_source: EcdSource,
    pub status: StepStatus,
    /// Extra named fields in parse order, keyed by display label
    pub extras: IndexMap<String, String>,
    /// Metric key the ACD was read from
    pub acd_key: Option<String>,
    /// Metric key the ECD was read from
    pub ecd_key: Option<String>,
}

impl Step {
    pub fn new(slug: impl Into<String>) -> Self {
        Step {
            slug: slug.into(),
            acd: String::new(),
            ecd: String::new(),
            ecd_source: EcdSource::Blank,
            status: StepStatus::NotStarted,
            extras: IndexMap::new(),
            acd_key: None,
            ecd_key: None,
        }
    }

    pub fn is_kickoff(&self) -> bool {
        self.slug.contains("kickoff")
    }

    pub fn acd_date(&self) -> Option<NaiveDate> {
        parse_us_date(&self.acd)
    }

    pub fn ecd_date(&self) -> Option<NaiveDate> {
        parse_us_date(&self.ecd)
    }

    pub fn has_ecd(&self) -> bool {
        !self.ecd.trim().is_empty()
    }

    pub fn set_ecd(&mut self, date: NaiveDate, source: EcdSource) {
        self.ecd = format_us_date(date);
        self.ecd_source = source;
    }

    pub fn clear_ecd(&mut self) {
        self.ecd.clear();
        self.ecd_source = EcdSource::Blank;
    }

    /// Fields in display order: Status, ECD, ACD, then extras.
    pub fn display_fields(&self) -> IndexMap<String, String> {
        let mut fields = IndexMap::new();
        fields.insert("Status".to_string(), self.status.label().to_string());
        if !self.is_kickoff() {
            fields.insert("ECD".to_string(), self.ecd.clone());
        }
        fields.insert("ACD".to_string(), self.acd.clone());
        for (label, value) in &self.extras {
            fields.insert(label.clone(), value.clone());
        }
        fields
    }
}

/// The ordered steps of one track for one client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub track: Track,
    pub steps: Vec<Step>,
}

impl Schedule {
    pub fn new(track: Track) -> Self {
        Schedule {
            track,
            steps: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn position(&self, slug: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.slug == slug)
    }

    pub fn get(&self, slug: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.slug == slug)
    }

    pub fn get_mut(&mut self, slug: &str) -> Option<&mut Step> {
        self.steps.iter_mut().find(|s| s.slug == slug)
    }

    /// Get the step with `slug`, appending a blank one if it doesn't exist yet.
    pub fn entry(&mut self, slug: &str) -> &mut Step {
        let idx = match self.position(slug) {
            Some(idx) => idx,
            None => {
                self.steps.push(Step::new(slug));
                self.steps.len() - 1
            }
        };
        &mut self.steps[idx]
    }

    pub fn kickoff(&self) -> Option<&Step> {
        self.steps.iter().find(|s| s.is_kickoff())
    }

    pub fn kickoff_mut(&mut self) -> Option<&mut Step> {
        self.steps.iter_mut().find(|s| s.is_kickoff())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_appends_once() {
        let mut schedule = Schedule::new(Track::Sra);
        schedule.entry("review_sra").acd = "03/03/2025".into();
        schedule.entry("review_sra").ecd = "03/04/2025".into();
        assert_eq!(schedule.steps.len(), 1);
        assert_eq!(schedule.get("review_sra").unwrap().acd, "03/03/2025");
    }

    #[test]
    fn kickoff_display_fields_have_no_ecd() {
        let mut step = Step::new("sra_kickoff");
        step.acd = "03/03/2025".into();
        step.ecd = "03/03/2025".into();
        let keys: Vec<_> = step.display_fields().keys().cloned().collect();
        assert_eq!(keys, vec!["Status", "ACD"]);
    }

    #[test]
    fn display_fields_are_in_canonical_order() {
        let mut step = Step::new("scans_complete");
        step.extras.insert("Scan Days".into(), "10".into());
        let keys: Vec<_> = step.display_fields().keys().cloned().collect();
        assert_eq!(keys, vec!["Status", "ECD", "ACD", "Scan Days"]);
    }

    #[test]
    fn status_serializes_as_label() {
        let json = serde_json::to_string(&StepStatus::RoadblockOverage).unwrap();
        assert_eq!(json, "\"Roadblock/Overage\"");
        assert_eq!(StepStatus::Completed.badge_class(), "status-pill-green");
    }
}
