use serde::Serialize;

use crate::model::client::EditLogEntry;
use crate::model::step::{StepStatus, Track};
use crate::ops::dashboard::{DashboardView, StepView};
use crate::ops::history::{CloseStats, HistoryReport};
use crate::ops::overview::{ProjectGroup, ProjectOverview};

// ---------------------------------------------------------------------------
// JSON output structs
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct SyncJson {
    pub synced_clients: usize,
}

#[derive(Serialize)]
pub struct RefreshJson {
    pub sf_id: String,
    pub refreshed: bool,
}

#[derive(Serialize)]
pub struct ImportJson {
    pub parsed: usize,
    pub inserted: usize,
    pub skipped: usize,
    pub delimiter: &'static str,
}

#[derive(Serialize)]
pub struct ShowJson<'a> {
    pub sf_id: &'a str,
    pub task_name: &'a str,
    pub dashboard: &'a DashboardView,
}

// ---------------------------------------------------------------------------
// Human-readable formatting
// ---------------------------------------------------------------------------

fn status_char(status: StepStatus) -> char {
    match status {
        StepStatus::NotStarted => ' ',
        StepStatus::OnTrack => '>',
        StepStatus::PotentialRoadblock => '!',
        StepStatus::RoadblockOverage => '-',
        StepStatus::Completed => 'x',
    }
}

fn or_dash(value: &str) -> &str {
    if value.trim().is_empty() { "-" } else { value }
}

/// One step as a single line
pub fn format_step_line(step: &StepView) -> String {
    let ecd = step
        .ecd
        .as_ref()
        .map(|cell| format!("  ECD {}", or_dash(&cell.value)))
        .unwrap_or_default();
    format!(
        "[{}] {}{}  ACD {}  {} ({})",
        status_char(step.status),
        step.name,
        ecd,
        or_dash(&step.acd.value),
        step.status.label(),
        step.owner
    )
}

/// Full dashboard for one client
pub fn format_dashboard(task_name: &str, sf_id: &str, view: &DashboardView) -> Vec<String> {
    let mut lines = vec![format!("{} ({})", task_name, sf_id)];
    for (label, value) in &view.project_details {
        lines.push(format!("{}: {}", label, value));
    }

    for track in Track::ALL {
        if !view.visible(track) {
            continue;
        }
        lines.push(String::new());
        lines.push(format!("== {} ==", track));
        for step in view.steps(track) {
            lines.push(format_step_line(step));
            for (label, value) in &step.extras {
                if !value.trim().is_empty() {
                    lines.push(format!("    {}: {}", label, value));
                }
            }
        }
    }

    let extras: Vec<_> = view.extra_metrics.iter().filter(|(_, v)| !v.trim().is_empty()).collect();
    if !extras.is_empty() {
        lines.push(String::new());
        lines.push("-- Other --".to_string());
        for (key, value) in extras {
            lines.push(format!("{}: {}", key, value));
        }
    }
    lines
}

fn format_groups(title: &str, count: usize, groups: &[ProjectGroup], completed: bool) -> Vec<String> {
    let mut lines = vec![format!("{} ({})", title, count)];
    for group in groups {
        lines.push(format!("== {} ==", group.period_label));
        for p in &group.projects {
            let date = if completed {
                format!("completed {}", p.completed_date_label)
            } else {
                format!("started {}", p.start_date_label)
            };
            lines.push(format!("  {} ({})  {}  {}", p.task_name, p.sf_id, or_dash(&p.task_status), date));
        }
    }
    lines
}

pub fn format_overview(overview: &ProjectOverview) -> Vec<String> {
    let mut lines = format_groups("Active", overview.active_count, &overview.active, false);
    lines.push(String::new());
    lines.extend(format_groups("Completed", overview.completed_count, &overview.completed, true));

    let counts: Vec<String> = overview
        .active_status_counts
        .iter()
        .map(|(status, n)| format!("{status} {n}"))
        .collect();
    if !counts.is_empty() {
        lines.push(String::new());
        lines.push(format!("active by status: {}", counts.join(", ")));
    }
    lines
}

pub fn format_stats(label: &str, stats: &CloseStats) -> String {
    let tracked = stats
        .tracked_mean
        .map(|m| format!(", tracked mean {:.1} ({})", m, stats.tracked_count))
        .unwrap_or_default();
    format!(
        "{}: {} closed, mean {:.1}, median {}, p90 {}{}",
        label, stats.count, stats.mean, stats.median, stats.p90, tracked
    )
}

pub fn format_report(report: &HistoryReport, show_records: bool) -> Vec<String> {
    let Some(overall) = &report.overall else {
        return vec!["no close durations recorded".to_string()];
    };

    let mut lines = vec![format_stats("Overall", overall)];
    for (track, stats) in &report.by_track {
        lines.push(format_stats(track, stats));
    }

    lines.push(String::new());
    lines.push("By quarter:".to_string());
    for q in &report.quarters {
        lines.push(format!("  {}", format_stats(&q.quarter_label, &q.stats)));
    }

    let quality = &report.quality;
    if !quality.uncovered.is_empty() || !quality.covered_by_import.is_empty() {
        lines.push(String::new());
        lines.push(format!(
            "Missing close dates: {} uncovered, {} covered by import",
            quality.uncovered.len(),
            quality.covered_by_import.len()
        ));
        for m in &quality.uncovered {
            lines.push(format!("  {} {} ({})", m.track, m.company, m.sf_id));
        }
    }

    if show_records {
        lines.push(String::new());
        lines.push("Records:".to_string());
        for r in &report.records {
            lines.push(format!(
                "  {}  {}  {}  {} days",
                or_dash(&r.final_date),
                r.track,
                r.company,
                r.close_days
            ));
        }
    }
    lines
}

pub fn format_edit_log(entries: &[EditLogEntry]) -> Vec<String> {
    entries
        .iter()
        .map(|e| {
            format!(
                "{}  {}: {} -> {}  [{}]",
                e.logged_at,
                e.field_key,
                or_dash(&e.old_value),
                or_dash(&e.new_value),
                e.source
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::dashboard::DateCell;
    use indexmap::IndexMap;
    use insta::assert_snapshot;

    fn cell(value: &str) -> DateCell {
        DateCell {
            value: value.into(),
            editable: false,
            metric_key: String::new(),
            override_key: String::new(),
            input_value: String::new(),
        }
    }

    fn step(name: &str, status: StepStatus, ecd: Option<&str>, acd: &str, owner: &str) -> StepView {
        StepView {
            slug: name.to_lowercase(),
            name: name.into(),
            status,
            status_class: status.badge_class(),
            owner: owner.into(),
            ecd: ecd.map(cell),
            acd: cell(acd),
            extras: IndexMap::new(),
        }
    }

    #[test]
    fn dashboard_text() {
        let view = DashboardView {
            project_details: [("Status", "In Progress"), ("Project Lead", "Dana")]
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            show_sra: true,
            show_nva: false,
            sra_steps: vec![
                step("SRA Kickoff", StepStatus::Completed, None, "03/03/2025", "Joint"),
                step("Receive Policies", StepStatus::OnTrack, Some("03/10/2025"), "", "Acme"),
                step("Review Policies", StepStatus::NotStarted, Some(""), "", "Medcurity"),
            ],
            nva_steps: vec![step("NVA Kickoff", StepStatus::NotStarted, None, "", "Joint")],
            extra_metrics: IndexMap::new(),
        };
        assert_snapshot!(format_dashboard("Acme", "001", &view).join("\n"), @r"
        Acme (001)
        Status: In Progress
        Project Lead: Dana

        == SRA ==
        [x] SRA Kickoff  ACD 03/03/2025  Completed (Joint)
        [>] Receive Policies  ECD 03/10/2025  ACD -  On Track (Acme)
        [ ] Review Policies  ECD -  ACD -  Not Started (Medcurity)
        ");
    }

    #[test]
    fn stats_line() {
        let stats = CloseStats {
            count: 4,
            mean: 12.5,
            median: 15,
            p90: 15,
            tracked_count: 4,
            tracked_mean: Some(12.5),
        };
        assert_eq!(
            format_stats("SRA", &stats),
            "SRA: 4 closed, mean 12.5, median 15, p90 15, tracked mean 12.5 (4)"
        );
    }

    #[test]
    fn empty_report() {
        let report = HistoryReport {
            records: vec![],
            overall: None,
            by_track: IndexMap::new(),
            quarters: vec![],
            quality: Default::default(),
        };
        assert_eq!(format_report(&report, true), vec!["no close durations recorded"]);
    }

    #[test]
    fn edit_log_lines() {
        let entries = vec![EditLogEntry {
            logged_at: "2025-03-10T12:00:00+00:00".into(),
            sf_id: "001".into(),
            task_id: "t1".into(),
            field_key: "override:followup.ecd".into(),
            old_value: String::new(),
            new_value: "04/01/2025".into(),
            source: "admin_update_override".into(),
        }];
        assert_eq!(
            format_edit_log(&entries),
            vec!["2025-03-10T12:00:00+00:00  override:followup.ecd: - -> 04/01/2025  [admin_update_override]"]
        );
    }
}
