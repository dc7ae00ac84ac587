use chrono::NaiveDate;
use indexmap::IndexMap;
use regex::Regex;
use serde::Serialize;

use crate::model::client::ClientStatus;
use crate::ops::signing::{LinkSigner, encode_path_segment};
use crate::parse::metric_keys::{apply_acronyms, to_title_case};
use crate::util::dates::{format_us_date, parse_timestamp, parse_us_date, quarter_label, quarter_sort_key};

const FINAL_PRESENTATION_KEYS: [&str; 2] = [
    "sra.present_final_sra_report.date",
    "nva.present_final_nva_report.date",
];

pub const UNKNOWN_PERIOD: &str = "Unknown";

/// One client row on the admin overview
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectRow {
    pub task_name: String,
    pub sf_id: String,
    pub task_status: String,
    pub status_url: String,
    /// `MM/DD/YYYY`, `Unknown`, or `-` for completed projects
    pub start_date_label: String,
    /// `MM/DD/YYYY`, `Unknown`, or `-` for active projects
    pub completed_date_label: String,
    pub period_label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectGroup {
    pub period_label: String,
    pub projects: Vec<ProjectRow>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectOverview {
    pub count: usize,
    pub completed_count: usize,
    pub active_count: usize,
    pub completed: Vec<ProjectGroup>,
    pub active: Vec<ProjectGroup>,
    pub completed_status_counts: IndexMap<String, usize>,
    pub active_status_counts: IndexMap<String, usize>,
}

fn timestamp_date(value: &str) -> Option<NaiveDate> {
    parse_timestamp(value).map(|dt| dt.date_naive())
}

/// Date that places a project in a period: the latest final presentation for
/// completed work (else closed, else last update), the creation date for
/// active work (else last update).
pub fn anchor_date(status: &ClientStatus, completed: bool) -> Option<NaiveDate> {
    if completed {
        FINAL_PRESENTATION_KEYS
            .iter()
            .filter_map(|k| parse_us_date(status.metric(k)))
            .max()
            .or_else(|| timestamp_date(&status.task_closed_at))
            .or_else(|| timestamp_date(&status.source_updated_at))
    } else {
        timestamp_date(&status.task_created_at).or_else(|| timestamp_date(&status.source_updated_at))
    }
}

fn date_label(date: Option<NaiveDate>) -> String {
    date.map(format_us_date).unwrap_or_else(|| UNKNOWN_PERIOD.to_string())
}

fn project_row(status: &ClientStatus, signer: &LinkSigner, admin_key: &str) -> ProjectRow {
    let task_status = apply_acronyms(&to_title_case(&status.task_status));
    let completed = task_status.to_lowercase() == "completed";
    let anchor = anchor_date(status, completed);

    let mut status_url = format!("{}&mode=admin", signer.status_path(&status.sf_id));
    if !admin_key.is_empty() {
        status_url.push_str("&key=");
        status_url.push_str(&encode_path_segment(admin_key));
    }

    ProjectRow {
        task_name: status.task_name.clone(),
        sf_id: status.sf_id.clone(),
        task_status,
        status_url,
        start_date_label: if completed {
            "-".to_string()
        } else {
            date_label(timestamp_date(&status.task_created_at))
        },
        completed_date_label: if completed { date_label(anchor) } else { "-".to_string() },
        period_label: anchor.map(quarter_label).unwrap_or_else(|| UNKNOWN_PERIOD.to_string()),
    }
}

fn is_completed_row(row: &ProjectRow) -> bool {
    row.task_status.to_lowercase() == "completed"
}

/// Group rows by period, newest period first and `Unknown` last.
fn group_by_period(rows: Vec<ProjectRow>) -> Vec<ProjectGroup> {
    let mut groups: IndexMap<String, Vec<ProjectRow>> = IndexMap::new();
    for row in rows {
        groups.entry(row.period_label.clone()).or_default().push(row);
    }
    groups.sort_by(|a, _, b, _| quarter_sort_key(b).cmp(&quarter_sort_key(a)));
    groups
        .into_iter()
        .map(|(period_label, projects)| ProjectGroup { period_label, projects })
        .collect()
}

fn status_counts(rows: &[ProjectRow]) -> IndexMap<String, usize> {
    let mut counts: IndexMap<String, usize> = IndexMap::new();
    for row in rows {
        let key = if row.task_status.is_empty() {
            UNKNOWN_PERIOD.to_string()
        } else {
            row.task_status.clone()
        };
        *counts.entry(key).or_default() += 1;
    }
    counts.sort_by(|a, _, b, _| a.to_lowercase().cmp(&b.to_lowercase()));
    counts
}

/// Build the admin overview. `filter` keeps only clients whose task name matches.
pub fn build_overview(
    statuses: &[ClientStatus],
    signer: &LinkSigner,
    admin_key: &str,
    filter: Option<&Regex>,
) -> ProjectOverview {
    let rows: Vec<ProjectRow> = statuses
        .iter()
        .filter(|s| filter.is_none_or(|re| re.is_match(&s.task_name)))
        .map(|s| project_row(s, signer, admin_key))
        .collect();
    let count = rows.len();
    let (completed, active): (Vec<_>, Vec<_>) = rows.into_iter().partition(is_completed_row);

    ProjectOverview {
        count,
        completed_count: completed.len(),
        active_count: active.len(),
        completed_status_counts: status_counts(&completed),
        active_status_counts: status_counts(&active),
        completed: group_by_period(completed),
        active: group_by_period(active),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn client(sf_id: &str, name: &str, status: &str) -> ClientStatus {
        ClientStatus {
            sf_id: sf_id.into(),
            task_name: name.into(),
            task_status: status.into(),
            ..Default::default()
        }
    }

    fn signer() -> LinkSigner {
        LinkSigner::new("secret").unwrap()
    }

    #[test]
    fn completed_anchor_prefers_latest_final_presentation() {
        let mut c = client("1", "Acme", "complete");
        c.metrics.insert("sra.present_final_sra_report.date".into(), "04/22/2025".into());
        c.metrics.insert("nva.present_final_nva_report.date".into(), "07/02/2025".into());
        c.task_closed_at = "2025-01-01T00:00:00+00:00".into();
        assert_eq!(anchor_date(&c, true), NaiveDate::from_ymd_opt(2025, 7, 2));

        c.metrics.clear();
        assert_eq!(anchor_date(&c, true), NaiveDate::from_ymd_opt(2025, 1, 1));

        c.task_closed_at.clear();
        c.source_updated_at = "2024-11-05T10:00:00Z".into();
        assert_eq!(anchor_date(&c, true), NaiveDate::from_ymd_opt(2024, 11, 5));
    }

    #[test]
    fn active_anchor_prefers_creation() {
        let mut c = client("1", "Acme", "in progress");
        c.task_created_at = "2025-02-10T00:00:00+00:00".into();
        c.source_updated_at = "2025-06-10T00:00:00+00:00".into();
        assert_eq!(anchor_date(&c, false), NaiveDate::from_ymd_opt(2025, 2, 10));
        c.task_created_at.clear();
        assert_eq!(anchor_date(&c, false), NaiveDate::from_ymd_opt(2025, 6, 10));
    }

    #[test]
    fn overview_splits_and_groups() {
        let mut done = client("1", "Acme", "completed");
        done.metrics.insert("sra.present_final_sra_report.date".into(), "04/22/2025".into());
        let mut active_old = client("2", "Beta", "in progress");
        active_old.task_created_at = "2024-12-01T00:00:00+00:00".into();
        let mut active_new = client("3", "Gamma", "scheduling");
        active_new.task_created_at = "2025-03-01T00:00:00+00:00".into();
        let unknown = client("4", "Delta", "in progress");

        let overview = build_overview(&[done, active_old, active_new, unknown], &signer(), "", None);
        assert_eq!(overview.count, 4);
        assert_eq!(overview.completed_count, 1);
        assert_eq!(overview.active_count, 3);

        let completed = &overview.completed[0];
        assert_eq!(completed.period_label, "2025 Q2");
        assert_eq!(completed.projects[0].completed_date_label, "04/22/2025");
        assert_eq!(completed.projects[0].start_date_label, "-");

        let periods: Vec<&str> = overview.active.iter().map(|g| g.period_label.as_str()).collect();
        assert_eq!(periods, vec!["2025 Q1", "2024 Q4", "Unknown"]);
        assert_eq!(overview.active[2].projects[0].start_date_label, "Unknown");

        let counts: Vec<(&str, usize)> = overview.active_status_counts.iter().map(|(k, v)| (k.as_str(), *v)).collect();
        assert_eq!(counts, vec![("In Progress", 2), ("Scheduling", 1)]);
    }

    #[test]
    fn status_url_carries_signature_and_key() {
        let s = signer();
        let overview = build_overview(&[client("001", "Acme", "open")], &s, "k1", None);
        let url = &overview.active[0].projects[0].status_url;
        assert_eq!(url, &format!("/status/001?sig={}&mode=admin&key=k1", s.sign("001")));
    }

    #[test]
    fn filter_limits_rows() {
        let re = Regex::new("(?i)^ac").unwrap();
        let overview = build_overview(
            &[client("1", "Acme", "open"), client("2", "Beta", "open")],
            &signer(),
            "",
            Some(&re),
        );
        assert_eq!(overview.count, 1);
        assert_eq!(overview.active[0].projects[0].task_name, "Acme");
    }
}
