use indexmap::IndexMap;
use sha2::{Digest, Sha256};

use crate::model::history::HistoricalCloseMetric;
use crate::util::dates::{format_us_date, parse_loose_date, quarter_label};

/// Error type for pasted history imports
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("no header row with \"company\" and \"total days\" columns")]
    MissingHeader,
    #[error("could not read pasted table: {0}")]
    Csv(#[from] csv::Error),
}

/// Leading words of footer rows, longest first so `totals` wins over `total`
const SUMMARY_WORDS: [&str; 5] = ["totals", "total", "average", "summary", "avg"];

/// Words that may trail a summary word, e.g. `Average days` or `Total for Q1`
const SUMMARY_TAILS: [&str; 8] = ["days", "day", "close", "for", "of", "all", "rows", "row"];

/// Candidate delimiters, in tie-break order
const DELIMITERS: [(u8, &str); 4] = [(b'\t', "tab"), (b',', "comma"), (b';', "semicolon"), (b'|', "pipe")];

/// Parsed rows of one paste
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportOutcome {
    pub rows: Vec<HistoricalCloseMetric>,
    /// Data rows rejected for a missing or non-positive day count, or summary rows
    pub skipped: usize,
    pub delimiter: &'static str,
}

#[derive(Debug)]
struct Columns {
    company: usize,
    days: usize,
    track: Option<usize>,
    kickoff: Option<usize>,
    final_date: Option<usize>,
    sf_id: Option<usize>,
}

impl Columns {
    /// Map a header row, if it is one.
    fn from_header(cells: &[String]) -> Option<Columns> {
        let find = |pred: &dyn Fn(&str) -> bool| cells.iter().position(|c| pred(c.as_str()));
        let company = find(&|c| c.contains("company"))?;
        let days = find(&|c| c.contains("total days"))?;
        Some(Columns {
            company,
            days,
            track: find(&|c| c == "track" || c == "type" || c == "project type"),
            kickoff: find(&|c| c.contains("kickoff") || c.contains("start")),
            final_date: find(&|c| c.contains("final") || c.contains("end date") || c.contains("close date")),
            sf_id: find(&|c| c == "sf id" || c.contains("salesforce") || c == "sfid"),
        })
    }
}

/// Lowercase and collapse whitespace (underscores count as spaces).
fn normalize_cell(cell: &str) -> String {
    cell.replace('_', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Pick the delimiter that occurs most often on the first line mentioning "company".
pub fn detect_delimiter(text: &str) -> Option<(u8, &'static str)> {
    let header = text.lines().find(|l| l.to_lowercase().contains("company"))?;
    let mut best = DELIMITERS[0];
    let mut best_count = 0;
    for (byte, name) in DELIMITERS {
        let count = header.bytes().filter(|b| *b == byte).count();
        if count > best_count {
            best = (byte, name);
            best_count = count;
        }
    }
    Some(best)
}

/// Parse a pasted spreadsheet of completed-project durations.
///
/// Rows before the header are ignored. `Q<n> <year>` rows set the quarter for
/// the rows that follow, bare `SRA`/`NVA` rows set the track, and total or
/// average rows are skipped.
pub fn parse_history(text: &str, imported_at: &str) -> Result<ImportOutcome, ImportError> {
    let (delimiter, delimiter_name) = detect_delimiter(text).ok_or(ImportError::MissingHeader)?;

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let mut columns: Option<Columns> = None;
    let mut running_quarter: Option<String> = None;
    let mut running_track: Option<&'static str> = None;
    let mut rows: IndexMap<String, HistoricalCloseMetric> = IndexMap::new();
    let mut skipped = 0;

    for record in reader.records() {
        let record = record?;
        let cells: Vec<String> = record.iter().map(str::to_string).collect();
        if columns.is_none() {
            let normalized: Vec<String> = cells.iter().map(|c| normalize_cell(c)).collect();
            columns = Columns::from_header(&normalized);
            continue;
        }
        let Some(cols) = columns.as_ref() else {
            continue;
        };

        let filled: Vec<&str> = cells.iter().map(|c| c.trim()).filter(|c| !c.is_empty()).collect();
        let Some(first) = filled.first() else {
            continue;
        };
        if filled.len() == 1 {
            if let Some(quarter) = quarter_heading(first) {
                running_quarter = Some(quarter);
                continue;
            }
            if let Some(track) = track_label(first) {
                running_track = Some(track);
                continue;
            }
        }

        let cell = |idx: Option<usize>| idx.and_then(|i| cells.get(i)).map(|c| c.trim()).unwrap_or("");
        let company = cell(Some(cols.company));
        if is_summary_row(first) {
            skipped += 1;
            continue;
        }
        if company.is_empty() {
            continue;
        }
        let Some(close_days) = cell(Some(cols.days)).parse::<i64>().ok().filter(|d| *d > 0) else {
            skipped += 1;
            continue;
        };

        let track = track_label(cell(cols.track))
            .or(running_track)
            .unwrap_or("SRA");
        let kickoff = date_cell(cell(cols.kickoff));
        let final_date = date_cell(cell(cols.final_date));
        let quarter = running_quarter.clone().unwrap_or_else(|| {
            parse_loose_date(&final_date).map(quarter_label).unwrap_or_default()
        });
        let sf_id = Some(cell(cols.sf_id)).filter(|s| !s.is_empty()).map(str::to_string);

        let source_key = source_key(company, track, &kickoff, &final_date, close_days, delimiter_name);
        rows.insert(
            source_key.clone(),
            HistoricalCloseMetric {
                source_key,
                sf_id,
                company: company.to_string(),
                track: track.to_string(),
                kickoff_date: kickoff,
                final_date,
                close_days,
                quarter_label: quarter,
                source: format!("paste:{delimiter_name}"),
                imported_at: imported_at.to_string(),
            },
        );
    }

    if columns.is_none() {
        return Err(ImportError::MissingHeader);
    }
    Ok(ImportOutcome {
        rows: rows.into_values().collect(),
        skipped,
        delimiter: delimiter_name,
    })
}

/// `Total`, `Avg:` and `Total days (Q1)` are footers; `Totally Smiles Dental` is a company.
fn is_summary_row(first: &str) -> bool {
    let lead = first.trim().to_lowercase();
    let Some(rest) = SUMMARY_WORDS.iter().find_map(|w| lead.strip_prefix(w)) else {
        return false;
    };
    let rest = rest.strip_prefix(':').unwrap_or(rest);
    if rest.is_empty() {
        return true;
    }
    if !rest.starts_with(char::is_whitespace) {
        return false;
    }
    rest.split_whitespace()
        .map(|word| word.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|word| word.chars().any(char::is_alphabetic))
        .all(|word| SUMMARY_TAILS.contains(&word) || quarter_heading(&format!("{word} 2000")).is_some())
}

/// `Q3 2025` → `2025 Q3`
fn quarter_heading(value: &str) -> Option<String> {
    let mut parts = value.split_whitespace();
    let quarter = parts.next()?;
    let year = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    let quarter: u32 = quarter
        .strip_prefix(['Q', 'q'])?
        .parse()
        .ok()
        .filter(|q| (1..=4).contains(q))?;
    if year.len() != 4 || !year.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(format!("{year} Q{quarter}"))
}

fn track_label(value: &str) -> Option<&'static str> {
    match value.trim().to_ascii_uppercase().as_str() {
        "SRA" => Some("SRA"),
        "NVA" => Some("NVA"),
        _ => None,
    }
}

/// Any recognisable date, rendered `MM/DD/YYYY`; empty otherwise.
fn date_cell(value: &str) -> String {
    parse_loose_date(value).map(format_us_date).unwrap_or_default()
}

/// Stable identity of an imported row.
pub fn source_key(company: &str, track: &str, kickoff: &str, final_date: &str, days: i64, delimiter: &str) -> String {
    let material = format!(
        "{}|{}|{}|{}|{}|{}",
        company.trim().to_lowercase(),
        track.to_uppercase(),
        kickoff,
        final_date,
        days,
        delimiter
    );
    hex::encode(Sha256::digest(material.as_bytes()))
}
