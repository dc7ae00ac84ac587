use chrono::{Local, NaiveDate};

use crate::model::step::StepStatus;
use crate::util::dates::parse_us_date;

/// Days-until-ECD at or below which a step is flagged as a potential roadblock
pub const AT_RISK_WINDOW_DAYS: i64 = 3;

/// Source of "today" for status classification
pub trait Clock {
    fn today(&self) -> NaiveDate;
}

/// The local wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// A clock pinned to one date, for tests and reports
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

/// Classify a step from its raw ACD/ECD text.
pub fn classify(acd: &str, ecd: &str, is_kickoff: bool, today: NaiveDate) -> StepStatus {
    if parse_us_date(acd).is_some() {
        return if is_kickoff {
            StepStatus::Completed
        } else {
            StepStatus::OnTrack
        };
    }
    if is_kickoff {
        return StepStatus::NotStarted;
    }
    let Some(ecd) = parse_us_date(ecd) else {
        return StepStatus::NotStarted;
    };

    let days_left = (ecd - today).num_days();
    if days_left < 0 {
        StepStatus::RoadblockOverage
    } else if days_left <= AT_RISK_WINDOW_DAYS {
        StepStatus::PotentialRoadblock
    } else {
        StepStatus::OnTrack
    }
}
