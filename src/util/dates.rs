use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc, Weekday};

/// Date format used everywhere a date is shown to a client or stored in metrics.
pub const US_DATE_FORMAT: &str = "%m/%d/%Y";

/// Date format used by HTML date inputs.
pub const YMD_FORMAT: &str = "%Y-%m-%d";

/// Parse `MM/DD/YYYY`, tolerating surrounding whitespace. Blank or malformed input is `None`.
pub fn parse_us_date(value: &str) -> Option<NaiveDate> {
    let text = value.trim();
    if text.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(text, US_DATE_FORMAT).ok()
}

pub fn format_us_date(date: NaiveDate) -> String {
    date.format(US_DATE_FORMAT).to_string()
}

/// Parse `YYYY-MM-DD`.
pub fn parse_ymd(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), YMD_FORMAT).ok()
}

/// Accept either the US or the ISO form; pasted spreadsheets mix both.
pub fn parse_loose_date(value: &str) -> Option<NaiveDate> {
    parse_us_date(value).or_else(|| parse_ymd(value))
}

/// `MM/DD/YYYY` → `YYYY-MM-DD`, or empty when the input is not a date.
pub fn us_to_ymd(value: &str) -> String {
    parse_us_date(value)
        .map(|d| d.format(YMD_FORMAT).to_string())
        .unwrap_or_default()
}

pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Saturday and Sunday roll forward to the following Monday; weekdays are unchanged.
/// `None` past the last representable date.
pub fn shift_forward_to_monday(date: NaiveDate) -> Option<NaiveDate> {
    match date.weekday() {
        Weekday::Sat => date.checked_add_signed(Duration::days(2)),
        Weekday::Sun => date.checked_add_signed(Duration::days(1)),
        _ => Some(date),
    }
}

/// Saturday and Sunday roll back to the preceding Friday; weekdays are unchanged.
pub fn shift_back_to_friday(date: NaiveDate) -> Option<NaiveDate> {
    match date.weekday() {
        Weekday::Sat => date.checked_sub_signed(Duration::days(1)),
        Weekday::Sun => date.checked_sub_signed(Duration::days(2)),
        _ => Some(date),
    }
}

/// The first weekday strictly after `date`.
pub fn next_business_day(date: NaiveDate) -> Option<NaiveDate> {
    date.checked_add_signed(Duration::days(1))
        .and_then(shift_forward_to_monday)
}

/// `anchor + days`, rolled forward off a weekend.
pub fn offset_forward(anchor: NaiveDate, days: i64) -> Option<NaiveDate> {
    anchor
        .checked_add_signed(Duration::try_days(days)?)
        .and_then(shift_forward_to_monday)
}

/// `date - 1 day`, rolled back off a weekend.
pub fn day_before_backward(date: NaiveDate) -> Option<NaiveDate> {
    date.checked_sub_signed(Duration::days(1))
        .and_then(shift_back_to_friday)
}

/// Shift by a signed number of days. Forward shifts land on or after Monday,
/// backward shifts land on or before Friday.
pub fn shift_by_days(date: NaiveDate, delta: i64) -> Option<NaiveDate> {
    let moved = date.checked_add_signed(Duration::try_days(delta)?)?;
    if delta > 0 {
        shift_forward_to_monday(moved)
    } else if delta < 0 {
        shift_back_to_friday(moved)
    } else {
        Some(date)
    }
}

/// Count of Monday–Friday dates in `start..=end`. Zero when `end` precedes `start`.
pub fn business_day_span(start: NaiveDate, end: NaiveDate) -> i64 {
    if end < start {
        return 0;
    }
    start
        .iter_days()
        .take_while(|d| *d <= end)
        .filter(|d| !is_weekend(*d))
        .count() as i64
}

/// Calendar quarter label in the `2025 Q1` form.
pub fn quarter_label(date: NaiveDate) -> String {
    format!("{} Q{}", date.year(), (date.month() - 1) / 3 + 1)
}

/// Sort key for a `YYYY Qn` label; anything else (including `Unknown`) sorts first.
pub fn quarter_sort_key(label: &str) -> (i32, u32) {
    let mut parts = label.split_whitespace();
    let year = parts.next().and_then(|y| y.parse::<i32>().ok());
    let quarter = parts
        .next()
        .and_then(|q| q.strip_prefix('Q'))
        .and_then(|q| q.parse::<u32>().ok());
    match (year, quarter) {
        (Some(y), Some(q)) => (y, q),
        _ => (-1, 0),
    }
}

/// Parse an RFC 3339 timestamp (a trailing `Z` is accepted).
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let text = value.trim();
    if text.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Epoch milliseconds → `MM/DD/YYYY` in UTC.
pub fn epoch_ms_to_us_date(ms: i64) -> Option<String> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .map(|dt| format_us_date(dt.date_naive()))
}

/// Epoch milliseconds → RFC 3339 in UTC.
pub fn epoch_ms_to_rfc3339(ms: i64) -> Option<String> {
    Utc.timestamp_millis_opt(ms).single().map(|dt| dt.to_rfc3339())
}

/// `YYYY-MM-DD` → epoch milliseconds at 12:00 UTC, the form ClickUp date fields take.
pub fn ymd_to_epoch_ms_noon(value: &str) -> Option<i64> {
    let date = parse_ymd(value)?;
    let noon = date.and_hms_opt(12, 0, 0)?;
    Some(Utc.from_utc_datetime(&noon).timestamp_millis())
}

pub fn utc_now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}
