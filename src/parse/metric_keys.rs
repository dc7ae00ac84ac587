use indexmap::IndexMap;

use crate::model::client::Metrics;
use crate::model::step::{EcdSource, Schedule, Track};

/// Metric keys holding the explicit per-track enable flags, in lookup order.
const SRA_FLAG_KEYS: [&str; 3] = ["project.sra_enabled", "sra.enabled", "sra_enabled"];
const NVA_FLAG_KEYS: [&str; 3] = ["project.nva_enabled", "nva.enabled", "nva_enabled"];

/// Explicit per-track enable flags. `None` means the flag was never set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackFlags {
    pub sra: Option<bool>,
    pub nva: Option<bool>,
}

impl TrackFlags {
    pub fn from_metrics(metrics: &Metrics) -> Self {
        TrackFlags {
            sra: first_flag(metrics, &SRA_FLAG_KEYS),
            nva: first_flag(metrics, &NVA_FLAG_KEYS),
        }
    }

    /// Visibility is driven only by an explicit `true`; absent means hidden.
    pub fn enabled(&self, track: Track) -> bool {
        match track {
            Track::Sra => self.sra.unwrap_or(false),
            Track::Nva => self.nva.unwrap_or(false),
        }
    }

    pub fn both_enabled(&self) -> bool {
        self.enabled(Track::Sra) && self.enabled(Track::Nva)
    }
}

fn first_flag(metrics: &Metrics, keys: &[&str]) -> Option<bool> {
    keys.iter()
        .find_map(|k| metrics.get(*k).filter(|v| !v.trim().is_empty()))
        .and_then(|v| parse_bool(v))
        .or_else(|| {
            // A present-but-blank flag reads as false
            keys.iter()
                .any(|k| metrics.contains_key(*k))
                .then_some(false)
        })
}

/// The step-level field a metric key resolves to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldLabel {
    Acd,
    Ecd,
    Extra(String),
}

/// Metrics decomposed into project fields, per-track steps and leftovers
#[derive(Debug, Clone)]
pub struct ParsedMetrics {
    /// Free-text engagement location (onsite / remote)
    pub location: String,
    /// Project-level display label → value
    pub project: IndexMap<String, String>,
    pub sra: Schedule,
    pub nva: Schedule,
    /// Keys that didn't fit any known shape, verbatim
    pub extra: IndexMap<String, String>,
    pub flags: TrackFlags,
}

impl ParsedMetrics {
    pub fn schedule(&self, track: Track) -> &Schedule {
        match track {
            Track::Sra => &self.sra,
            Track::Nva => &self.nva,
        }
    }

    /// True when the location mentions remote work and not onsite work.
    pub fn is_remote_only(&self) -> bool {
        let text = self.location.to_lowercase();
        text.contains("remote") && !text.contains("onsite")
    }
}

/// Split every `section.step.field` key into the per-track step tables.
pub fn parse_metrics(metrics: &Metrics) -> ParsedMetrics {
    let mut parsed = ParsedMetrics {
        location: location_of(metrics),
        project: IndexMap::new(),
        sra: Schedule::new(Track::Sra),
        nva: Schedule::new(Track::Nva),
        extra: IndexMap::new(),
        flags: TrackFlags::from_metrics(metrics),
    };

    for (key, value) in metrics {
        let parts: Vec<&str> = key.split('.').collect();
        if parts.len() < 2 {
            parsed.extra.insert(key.clone(), value.clone());
            continue;
        }

        let section = parts[0].trim().to_lowercase();
        if section == "project" {
            let field_slug = parts[1].trim().to_lowercase();
            if field_slug != "sra_enabled" && field_slug != "nva_enabled" {
                parsed
                    .project
                    .insert(project_field_label(&field_slug), value.clone());
            }
            continue;
        }

        let Some(track) = Track::from_section(&section) else {
            parsed.extra.insert(key.clone(), value.clone());
            continue;
        };
        if parts.len() < 3 {
            parsed.extra.insert(key.clone(), value.clone());
            continue;
        }

        let step_slug = parts[1].trim().to_lowercase();
        let schedule = match track {
            Track::Sra => &mut parsed.sra,
            Track::Nva => &mut parsed.nva,
        };
        let step = schedule.entry(&step_slug);
        match field_label(parts[2]) {
            FieldLabel::Acd => {
                step.acd = value.clone();
                step.acd_key = Some(key.clone());
            }
            FieldLabel::Ecd => {
                step.ecd = value.clone();
                step.ecd_key = Some(key.clone());
                if !value.trim().is_empty() {
                    step.ecd_source = EcdSource::Parsed;
                }
            }
            FieldLabel::Extra(label) => {
                step.extras.insert(label, value.clone());
            }
        }
    }

    parsed
}

/// `project.remote_onsite`, falling back to `project.location`.
pub fn location_of(metrics: &Metrics) -> String {
    ["project.remote_onsite", "project.location"]
        .iter()
        .filter_map(|k| metrics.get(*k))
        .map(|v| v.trim())
        .find(|v| !v.is_empty())
        .unwrap_or("")
        .to_string()
}

pub fn field_label(field_slug: &str) -> FieldLabel {
    match field_slug.trim().to_lowercase().as_str() {
        "date" | "acd" => FieldLabel::Acd,
        "ecd" => FieldLabel::Ecd,
        other => FieldLabel::Extra(apply_acronyms(&to_title_case(other))),
    }
}

/// `review_sra-notes` → `Review Sra Notes`
pub fn to_title_case(raw: &str) -> String {
    raw.replace(['_', '-'], " ")
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Restore the domain acronyms that title-casing lowercased.
pub fn apply_acronyms(text: &str) -> String {
    const ACRONYMS: [(&str, &str); 5] = [
        ("Sra", "SRA"),
        ("Nva", "NVA"),
        ("Baa", "BAA"),
        ("Ecd", "ECD"),
        ("Acd", "ACD"),
    ];
    ACRONYMS
        .iter()
        .fold(text.to_string(), |acc, (from, to)| acc.replace(from, to))
}

pub fn project_field_label(field_slug: &str) -> String {
    match field_slug {
        "project_lead" => "Project Lead".to_string(),
        "project_support" => "Project Support".to_string(),
        "remote_onsite" => "Location".to_string(),
        "time_zone" => "Time Zone".to_string(),
        "contract_signed" => "Contract Signed".to_string(),
        "status" => "Status".to_string(),
        "ecd" => "ECD".to_string(),
        "acd" => "ACD".to_string(),
        "next_steps" => "Next Steps".to_string(),
        other => apply_acronyms(&to_title_case(other)),
    }
}

/// Human-readable name of a step. The two interview steps are named after
/// the engagement location.
pub fn step_title(step_slug: &str, location: &str) -> String {
    let location = location.to_lowercase();
    let onsite = location.contains("onsite");
    let remote = location.contains("remote");

    match step_slug {
        "schedule_onsite_remote_interview" => {
            return match (onsite, remote) {
                (true, false) => "Schedule Onsite Visit",
                (false, true) => "Schedule Interview Sessions",
                _ => "Schedule Onsite/Remote Interview",
            }
            .to_string();
        }
        "go_onsite_have_interview" => {
            return match (onsite, remote) {
                (false, true) => "Conduct Interview Sessions",
                _ => "Go Onsite/Have Interviews",
            }
            .to_string();
        }
        _ => {}
    }

    let label = match step_slug {
        "sra_kickoff" => "SRA Kickoff",
        "receive_policies_and_procedures_baa" => "Receive Policies and Procedures / BAA",
        "review_policies_and_procedures_baa" => "Review Policies and Procedures / BAA",
        "recieve_requested_follow_up_documentation" => "Receive Requested Follow Up Documentation",
        "review_sra" => "Review SRA",
        "schedule_final_sra_report" => "Schedule Final SRA Report",
        "present_final_sra_report" => "Present Final SRA Report",
        "nva_kickoff" => "NVA Kickoff",
        "receive_credentials" => "Receive Credentials",
        "verify_access" => "Verify Access",
        "scans_complete" => "Scans Complete",
        "access_removed" => "Access Removed",
        "compile_report" => "Compile Report",
        "schedule_final_nva_report" => "Schedule Final NVA Report",
        "present_final_nva_report" => "Present Final NVA Report",
        other => return apply_acronyms(&to_title_case(other)),
    };
    label.to_string()
}

/// Checkbox-ish truthiness used by ClickUp exports. Unknown text is `None`.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "y" | "checked" => Some(true),
        "false" | "0" | "no" | "n" | "unchecked" | "" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(pairs: &[(&str, &str)]) -> Metrics {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn routes_step_fields_to_tracks() {
        let parsed = parse_metrics(&metrics(&[
            ("sra.sra_kickoff.date", "03/03/2025"),
            ("sra.review_sra.ecd", "04/01/2025"),
            ("nva.scans_complete.scan_days", "10"),
        ]));

        let kickoff = parsed.sra.get("sra_kickoff").unwrap();
        assert_eq!(kickoff.acd, "03/03/2025");
        assert_eq!(kickoff.acd_key.as_deref(), Some("sra.sra_kickoff.date"));

        let review = parsed.sra.get("review_sra").unwrap();
        assert_eq!(review.ecd, "04/01/2025");
        assert_eq!(review.ecd_source, EcdSource::Parsed);

        let scans = parsed.nva.get("scans_complete").unwrap();
        assert_eq!(scans.extras.get("Scan Days").map(String::as_str), Some("10"));
    }

    #[test]
    fn unrecognized_keys_land_in_extras() {
        let parsed = parse_metrics(&metrics(&[
            ("loose", "a"),
            ("other.thing.field", "b"),
            ("sra.only_two", "c"),
        ]));
        let keys: Vec<_> = parsed.extra.keys().cloned().collect();
        assert_eq!(keys, vec!["loose", "other.thing.field", "sra.only_two"]);
        assert!(parsed.sra.is_empty());
    }

    #[test]
    fn project_fields_use_label_table_and_skip_flags() {
        let parsed = parse_metrics(&metrics(&[
            ("project.project_lead", "Dana"),
            ("project.remote_onsite", "Remote"),
            ("project.sra_enabled", "true"),
            ("project.baa_signed_date", "01/02/2025"),
        ]));
        let labels: Vec<_> = parsed.project.keys().cloned().collect();
        assert_eq!(labels, vec!["Project Lead", "Location", "BAA Signed Date"]);
        assert_eq!(parsed.flags.sra, Some(true));
        assert_eq!(parsed.flags.nva, None);
        assert!(!parsed.flags.enabled(Track::Nva));
    }

    #[test]
    fn blank_flag_reads_false() {
        let flags = TrackFlags::from_metrics(&metrics(&[("project.nva_enabled", "")]));
        assert_eq!(flags.nva, Some(false));
    }

    #[test]
    fn field_labels() {
        assert_eq!(field_label("date"), FieldLabel::Acd);
        assert_eq!(field_label("ACD"), FieldLabel::Acd);
        assert_eq!(field_label("ecd"), FieldLabel::Ecd);
        assert_eq!(
            field_label("sra_notes"),
            FieldLabel::Extra("SRA Notes".to_string())
        );
    }

    #[test]
    fn interview_titles_follow_location() {
        let slug = "schedule_onsite_remote_interview";
        assert_eq!(step_title(slug, "Onsite"), "Schedule Onsite Visit");
        assert_eq!(step_title(slug, "Remote"), "Schedule Interview Sessions");
        assert_eq!(step_title(slug, "Onsite + Remote"), "Schedule Onsite/Remote Interview");
        assert_eq!(step_title(slug, ""), "Schedule Onsite/Remote Interview");

        let go = "go_onsite_have_interview";
        assert_eq!(step_title(go, "onsite"), "Go Onsite/Have Interviews");
        assert_eq!(step_title(go, "remote"), "Conduct Interview Sessions");
        assert_eq!(step_title(go, "remote/onsite"), "Go Onsite/Have Interviews");
    }

    #[test]
    fn unknown_step_titles_fall_back_to_title_case() {
        assert_eq!(step_title("extra_baa-review", ""), "Extra BAA Review");
        assert_eq!(step_title("review_sra", ""), "Review SRA");
    }

    #[test]
    fn bool_parsing() {
        assert_eq!(parse_bool("Checked"), Some(true));
        assert_eq!(parse_bool(" no "), Some(false));
        assert_eq!(parse_bool(""), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
