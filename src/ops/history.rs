use std::collections::HashSet;

use chrono::NaiveDate;
use indexmap::IndexMap;
use serde::Serialize;

use crate::model::client::ClientStatus;
use crate::model::history::{CloseRecord, HistoricalCloseMetric, RecordOrigin};
use crate::model::step::Track;
use crate::parse::metric_keys::{TrackFlags, parse_metrics};
use crate::util::dates::{business_day_span, format_us_date, parse_us_date, quarter_label, quarter_sort_key};

/// Close durations above this many business days are left out of the tracked mean.
pub const MAX_TRACKED_CLOSE_DAYS: i64 = 180;

const UNKNOWN_QUARTER: &str = "Unknown";

/// Summary statistics over a set of close durations (business days)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CloseStats {
    pub count: usize,
    pub mean: f64,
    pub median: i64,
    pub p90: i64,
    pub tracked_count: usize,
    /// Mean of durations at or below `MAX_TRACKED_CLOSE_DAYS`
    pub tracked_mean: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuarterStats {
    pub quarter_label: String,
    pub stats: CloseStats,
}

/// A completed client with no usable close-date pair for a track
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingClose {
    pub sf_id: String,
    pub company: String,
    pub track: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DataQuality {
    /// Missing live data, but an imported row already stands in for it
    pub covered_by_import: Vec<MissingClose>,
    pub uncovered: Vec<MissingClose>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryReport {
    pub records: Vec<CloseRecord>,
    pub overall: Option<CloseStats>,
    pub by_track: IndexMap<String, CloseStats>,
    /// Newest quarter first, `Unknown` last
    pub quarters: Vec<QuarterStats>,
    pub quality: DataQuality,
}

/// Whether a client's project is finished.
pub fn is_completed(status: &ClientStatus) -> bool {
    let text = status.task_status.trim().to_lowercase();
    match text.as_str() {
        "complete" | "completed" => true,
        "closed" => !status.task_closed_at.trim().is_empty(),
        _ => false,
    }
}

/// A track counts for a client when its flag is true or any metric lives
/// under the track's prefix.
pub fn track_relevant(status: &ClientStatus, track: Track) -> bool {
    let flags = TrackFlags::from_metrics(&status.metrics);
    let flag = match track {
        Track::Sra => flags.sra,
        Track::Nva => flags.nva,
    };
    if flag == Some(true) {
        return true;
    }
    let prefix = format!("{}.", track.as_str());
    status
        .metrics
        .keys()
        .any(|k| k.trim().to_lowercase().starts_with(&prefix))
}

/// Kickoff and final-presentation ACDs, when both parse and are in order.
pub fn close_dates(status: &ClientStatus, track: Track) -> Option<(NaiveDate, NaiveDate)> {
    let parsed = parse_metrics(&status.metrics);
    let schedule = parsed.schedule(track);
    let kickoff = schedule.kickoff()?.acd_date()?;
    let final_date = schedule.get(track.present_final_slug())?.acd_date()?;
    (final_date >= kickoff).then_some((kickoff, final_date))
}

/// Close-duration records derived from completed live clients.
pub fn live_records(statuses: &[ClientStatus]) -> Vec<CloseRecord> {
    let mut records = Vec::new();
    for status in statuses.iter().filter(|s| is_completed(s)) {
        for track in Track::ALL {
            if !track_relevant(status, track) {
                continue;
            }
            if let Some((kickoff, final_date)) = close_dates(status, track) {
                records.push(CloseRecord {
                    origin: RecordOrigin::Live,
                    sf_id: Some(status.sf_id.clone()),
                    company: status.task_name.trim().to_string(),
                    track: track.to_string(),
                    kickoff_date: format_us_date(kickoff),
                    final_date: format_us_date(final_date),
                    close_days: business_day_span(kickoff, final_date),
                    quarter_label: quarter_label(final_date),
                });
            }
        }
    }
    records
}

/// Historical rows plus live rows they don't already cover, newest final date first.
pub fn combine_records(live: Vec<CloseRecord>, historical: &[HistoricalCloseMetric]) -> Vec<CloseRecord> {
    let mut combined: Vec<CloseRecord> = historical.iter().map(CloseRecord::from).collect();
    let imported: HashSet<_> = combined.iter().map(CloseRecord::dedup_key).collect();
    combined.extend(live.into_iter().filter(|r| !imported.contains(&r.dedup_key())));

    // Stable sort keeps import order among equal dates; undated rows go last
    combined.sort_by(|a, b| parse_us_date(&b.final_date).cmp(&parse_us_date(&a.final_date)));
    combined
}

pub fn summarize(days: &[i64]) -> Option<CloseStats> {
    if days.is_empty() {
        return None;
    }
    let mut sorted = days.to_vec();
    sorted.sort_unstable();
    let len = sorted.len();

    let tracked: Vec<i64> = sorted
        .iter()
        .copied()
        .filter(|d| *d <= MAX_TRACKED_CLOSE_DAYS)
        .collect();

    Some(CloseStats {
        count: len,
        mean: mean(&sorted),
        median: sorted[len / 2],
        p90: sorted[(len * 9 / 10).saturating_sub(1)],
        tracked_count: tracked.len(),
        tracked_mean: (!tracked.is_empty()).then(|| mean(&tracked)),
    })
}

fn mean(values: &[i64]) -> f64 {
    values.iter().sum::<i64>() as f64 / values.len() as f64
}

pub fn quarter_stats(records: &[CloseRecord]) -> Vec<QuarterStats> {
    let mut by_quarter: IndexMap<String, Vec<i64>> = IndexMap::new();
    for record in records {
        let label = record.quarter_label.trim();
        let label = if label.is_empty() { UNKNOWN_QUARTER } else { label };
        by_quarter
            .entry(label.to_string())
            .or_default()
            .push(record.close_days);
    }
    by_quarter.sort_by(|a, _, b, _| quarter_sort_key(b).cmp(&quarter_sort_key(a)));
    by_quarter
        .into_iter()
        .filter_map(|(quarter_label, days)| {
            summarize(&days).map(|stats| QuarterStats {
                quarter_label,
                stats,
            })
        })
        .collect()
}

/// Lowercased company name with punctuation, a leading "the" and
/// corporate suffixes removed, for loose matching against imports.
pub fn company_alias(name: &str) -> String {
    const SUFFIXES: [&str; 7] = ["inc", "llc", "pllc", "pc", "pa", "ltd", "corp"];

    let cleaned: String = name
        .to_lowercase()
        .replace('&', " and ")
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    let mut words: Vec<&str> = cleaned.split_whitespace().collect();
    if words.first() == Some(&"the") {
        words.remove(0);
    }
    while words.len() > 1 && words.last().is_some_and(|w| SUFFIXES.contains(w)) {
        words.pop();
    }
    words.join(" ")
}

pub fn data_quality(statuses: &[ClientStatus], historical: &[HistoricalCloseMetric]) -> DataQuality {
    let imported_ids: HashSet<&str> = historical
        .iter()
        .filter_map(|h| h.sf_id.as_deref())
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .collect();
    let imported_aliases: HashSet<String> = historical
        .iter()
        .map(|h| company_alias(&h.company))
        .filter(|alias| !alias.is_empty())
        .collect();

    let mut quality = DataQuality::default();
    for status in statuses.iter().filter(|s| is_completed(s)) {
        for track in Track::ALL {
            if !track_relevant(status, track) || close_dates(status, track).is_some() {
                continue;
            }
            let missing = MissingClose {
                sf_id: status.sf_id.clone(),
                company: status.task_name.trim().to_string(),
                track: track.to_string(),
            };
            let covered = imported_ids.contains(status.sf_id.trim())
                || imported_aliases.contains(&company_alias(&status.task_name));
            if covered {
                quality.covered_by_import.push(missing);
            } else {
                quality.uncovered.push(missing);
            }
        }
    }
    quality
}

/// Build the full close-duration report.
pub fn build_report(statuses: &[ClientStatus], historical: &[HistoricalCloseMetric]) -> HistoryReport {
    let records = combine_records(live_records(statuses), historical);
    let all_days: Vec<i64> = records.iter().map(|r| r.close_days).collect();

    let mut by_track = IndexMap::new();
    for track in Track::ALL {
        let label = track.to_string();
        let days: Vec<i64> = records
            .iter()
            .filter(|r| r.track.trim().eq_ignore_ascii_case(&label))
            .map(|r| r.close_days)
            .collect();
        if let Some(stats) = summarize(&days) {
            by_track.insert(label, stats);
        }
    }

    HistoryReport {
        overall: summarize(&all_days),
        by_track,
        quarters: quarter_stats(&records),
        quality: data_quality(statuses, historical),
        records,
    }
}
