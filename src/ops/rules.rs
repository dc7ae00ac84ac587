//! Per-track ECD projection rules.
//!
//! Each non-kickoff step of a track that has a hand-authored dependency is
//! described by one [`Rule`]. Rules are evaluated in table order, so a rule
//! may anchor on any step that appears above it.

use chrono::NaiveDate;
use indexmap::IndexMap;

use crate::model::step::{EcdSource, Schedule, Step, Track};
use crate::util::dates::{day_before_backward, next_business_day, offset_forward};

/// Generic kickoff-relative offsets, also the canonical step order of each track.
pub const SRA_OFFSETS: [(&str, i64); 8] = [
    ("receive_policies_and_procedures_baa", 7),
    ("review_policies_and_procedures_baa", 19),
    ("schedule_onsite_remote_interview", 14),
    ("go_onsite_have_interview", 21),
    ("recieve_requested_follow_up_documentation", 28),
    ("review_sra", 35),
    ("schedule_final_sra_report", 42),
    ("present_final_sra_report", 49),
];

pub const NVA_OFFSETS: [(&str, i64); 7] = [
    ("receive_credentials", 7),
    ("verify_access", 14),
    ("scans_complete", 21),
    ("access_removed", 28),
    ("compile_report", 35),
    ("schedule_final_nva_report", 42),
    ("present_final_nva_report", 49),
];

pub fn offsets(track: Track) -> &'static [(&'static str, i64)] {
    match track {
        Track::Sra => &SRA_OFFSETS,
        Track::Nva => &NVA_OFFSETS,
    }
}

/// The step a rule measures from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    /// Whichever step of the track is the kickoff
    Kickoff,
    Step(&'static str),
}

/// How many days a rule adds to its anchor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Days {
    Fixed(i64),
    /// The step's own extra field when it holds a positive integer
    FromField { label: &'static str, default: i64 },
    /// Shorter lead time for remote-only engagements
    RemoteOnly { remote: i64, otherwise: i64 },
    /// Depends on whether the anchor step already has an ACD
    AnchorComplete { complete: i64, projected: i64 },
}

/// Lower bound applied to a projected date
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Floor {
    None,
    /// Must land after the latest ECD among these steps
    SiblingEcds(&'static [&'static str]),
    /// Must land after the latest anchor date among these steps
    PrerequisiteAnchors(&'static [&'static str]),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    /// `anchor + days`, only when the ECD is blank
    Offset,
    /// The step's own ACD whenever it has one; otherwise `anchor + days` when blank
    MirrorOrOffset,
    /// When blank: the step's own ACD, else `anchor + days`
    MirrorIfBlankOrOffset,
    /// When blank: the day before `final_slug`'s ACD (backward off weekends),
    /// else `anchor + days`
    MirrorMinusOneOr { final_slug: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rule {
    pub slug: &'static str,
    pub kind: RuleKind,
    pub from: Anchor,
    pub days: Days,
    pub floor: Floor,
}

const fn offset(slug: &'static str, from: Anchor, days: i64) -> Rule {
    Rule {
        slug,
        kind: RuleKind::Offset,
        from,
        days: Days::Fixed(days),
        floor: Floor::None,
    }
}

pub const SRA_RULES: [Rule; 8] = [
    offset("receive_policies_and_procedures_baa", Anchor::Kickoff, 7),
    offset(
        "review_policies_and_procedures_baa",
        Anchor::Step("receive_policies_and_procedures_baa"),
        12,
    ),
    offset("schedule_onsite_remote_interview", Anchor::Kickoff, 14),
    Rule {
        slug: "go_onsite_have_interview",
        kind: RuleKind::MirrorOrOffset,
        from: Anchor::Step("review_policies_and_procedures_baa"),
        days: Days::Fixed(7),
        floor: Floor::None,
    },
    offset(
        "recieve_requested_follow_up_documentation",
        Anchor::Step("go_onsite_have_interview"),
        14,
    ),
    offset(
        "schedule_final_sra_report",
        Anchor::Step("go_onsite_have_interview"),
        14,
    ),
    Rule {
        slug: "review_sra",
        kind: RuleKind::MirrorMinusOneOr {
            final_slug: "present_final_sra_report",
        },
        from: Anchor::Step("go_onsite_have_interview"),
        days: Days::Fixed(15),
        floor: Floor::SiblingEcds(&[
            "recieve_requested_follow_up_documentation",
            "schedule_final_sra_report",
        ]),
    },
    Rule {
        slug: "present_final_sra_report",
        kind: RuleKind::MirrorIfBlankOrOffset,
        from: Anchor::Step("review_sra"),
        days: Days::Fixed(7),
        floor: Floor::PrerequisiteAnchors(&[
            "recieve_requested_follow_up_documentation",
            "schedule_final_sra_report",
            "review_sra",
        ]),
    },
];

// `schedule_final_nva_report` is deliberately absent: it only gets the
// generic kickoff offset.
pub const NVA_RULES: [Rule; 6] = [
    offset("receive_credentials", Anchor::Kickoff, 7),
    offset("verify_access", Anchor::Step("receive_credentials"), 7),
    Rule {
        slug: "scans_complete",
        kind: RuleKind::MirrorOrOffset,
        from: Anchor::Step("verify_access"),
        days: Days::FromField {
            label: "Scan Days",
            default: 7,
        },
        floor: Floor::None,
    },
    Rule {
        slug: "access_removed",
        kind: RuleKind::MirrorMinusOneOr {
            final_slug: "present_final_nva_report",
        },
        from: Anchor::Step("scans_complete"),
        days: Days::RemoteOnly {
            remote: 5,
            otherwise: 7,
        },
        floor: Floor::None,
    },
    Rule {
        slug: "compile_report",
        kind: RuleKind::MirrorMinusOneOr {
            final_slug: "present_final_nva_report",
        },
        from: Anchor::Step("scans_complete"),
        days: Days::AnchorComplete {
            complete: 12,
            projected: 21,
        },
        floor: Floor::None,
    },
    Rule {
        slug: "present_final_nva_report",
        kind: RuleKind::MirrorIfBlankOrOffset,
        from: Anchor::Step("compile_report"),
        days: Days::Fixed(19),
        floor: Floor::PrerequisiteAnchors(&["access_removed", "compile_report"]),
    },
];

pub fn rules(track: Track) -> &'static [Rule] {
    match track {
        Track::Sra => &SRA_RULES,
        Track::Nva => &NVA_RULES,
    }
}

/// True when a hand-authored rule owns this slug, so the generic offset must not apply.
pub fn is_covered(track: Track, slug: &str) -> bool {
    rules(track).iter().any(|r| r.slug == slug)
}

/// Per-client inputs the rules read besides the schedule itself
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    /// step slug → anchor on ACD (true, the default) or ECD
    pub anchor_on_acd: &'a IndexMap<String, bool>,
    pub remote_only: bool,
}

/// The date later steps measure from: the preferred one of ACD/ECD, else the other.
pub fn step_anchor(step: &Step, anchor_on_acd: &IndexMap<String, bool>) -> Option<NaiveDate> {
    let prefer_acd = anchor_on_acd.get(&step.slug).copied().unwrap_or(true);
    if prefer_acd {
        step.acd_date().or_else(|| step.ecd_date())
    } else {
        step.ecd_date().or_else(|| step.acd_date())
    }
}

pub fn resolve_anchor<'s>(schedule: &'s Schedule, anchor: Anchor) -> Option<&'s Step> {
    match anchor {
        Anchor::Kickoff => schedule.kickoff(),
        Anchor::Step(slug) => schedule.get(slug),
    }
}

pub fn anchor_date(
    schedule: &Schedule,
    anchor: Anchor,
    anchor_on_acd: &IndexMap<String, bool>,
) -> Option<NaiveDate> {
    resolve_anchor(schedule, anchor).and_then(|step| step_anchor(step, anchor_on_acd))
}

impl Days {
    fn resolve(self, step: &Step, from: Option<&Step>, ctx: &RuleContext<'_>) -> i64 {
        match self {
            Days::Fixed(days) => days,
            Days::FromField { label, default } => step
                .extras
                .get(label)
                .and_then(|v| v.trim().parse::<i64>().ok())
                .filter(|d| *d > 0)
                .unwrap_or(default),
            Days::RemoteOnly { remote, otherwise } => {
                if ctx.remote_only {
                    remote
                } else {
                    otherwise
                }
            }
            Days::AnchorComplete {
                complete,
                projected,
            } => {
                if from.and_then(Step::acd_date).is_some() {
                    complete
                } else {
                    projected
                }
            }
        }
    }
}

impl Floor {
    fn raise(self, candidate: NaiveDate, schedule: &Schedule, ctx: &RuleContext<'_>) -> Option<NaiveDate> {
        let latest = match self {
            Floor::None => None,
            Floor::SiblingEcds(slugs) => slugs
                .iter()
                .filter_map(|s| schedule.get(s).and_then(Step::ecd_date))
                .max(),
            Floor::PrerequisiteAnchors(slugs) => slugs
                .iter()
                .filter_map(|s| schedule.get(s))
                .filter_map(|step| step_anchor(step, ctx.anchor_on_acd))
                .max(),
        };
        match latest {
            Some(latest) if candidate <= latest => next_business_day(latest),
            _ => Some(candidate),
        }
    }
}

impl Rule {
    /// The ECD this rule assigns given the current schedule, or `None` to
    /// leave the step untouched. Rules only ever touch steps that exist.
    pub fn evaluate(&self, schedule: &Schedule, ctx: &RuleContext<'_>) -> Option<(NaiveDate, EcdSource)> {
        let step = schedule.get(self.slug)?;
        let own_acd = step.acd_date();

        if self.kind == RuleKind::MirrorOrOffset
            && let Some(acd) = own_acd
        {
            return Some((acd, EcdSource::Mirrored));
        }
        if step.has_ecd() {
            return None;
        }

        match self.kind {
            RuleKind::MirrorIfBlankOrOffset => {
                if let Some(acd) = own_acd {
                    return Some((acd, EcdSource::Mirrored));
                }
            }
            RuleKind::MirrorMinusOneOr { final_slug } => {
                if let Some(final_acd) = schedule.get(final_slug).and_then(Step::acd_date) {
                    return day_before_backward(final_acd).map(|date| (date, EcdSource::Mirrored));
                }
            }
            RuleKind::Offset | RuleKind::MirrorOrOffset => {}
        }

        let from = resolve_anchor(schedule, self.from);
        let anchor = from.and_then(|s| step_anchor(s, ctx.anchor_on_acd))?;
        let days = self.days.resolve(step, from, ctx);
        let candidate = offset_forward(anchor, days)?;
        let date = self.floor.raise(candidate, schedule, ctx)?;
        Some((date, EcdSource::Projected))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, m, day).unwrap()
    }

    fn schedule(track: Track, rows: &[(&str, &str, &str)]) -> Schedule {
        let mut schedule = Schedule::new(track);
        for (slug, acd, ecd) in rows {
            let step = schedule.entry(slug);
            step.acd = acd.to_string();
            step.ecd = ecd.to_string();
        }
        schedule
    }

    fn ctx(prefs: &IndexMap<String, bool>) -> RuleContext<'_> {
        RuleContext {
            anchor_on_acd: prefs,
            remote_only: false,
        }
    }

    #[test]
    fn every_rule_targets_a_canonical_step() {
        for track in Track::ALL {
            for rule in rules(track) {
                assert!(
                    offsets(track).iter().any(|(s, _)| *s == rule.slug),
                    "{} missing from offsets",
                    rule.slug
                );
            }
        }
        assert!(!is_covered(Track::Nva, "schedule_final_nva_report"));
        assert!(is_covered(Track::Sra, "review_sra"));
    }

    #[test]
    fn anchor_prefers_acd_by_default() {
        let prefs = IndexMap::new();
        let s = schedule(Track::Sra, &[("review_sra", "04/02/2025", "04/01/2025")]);
        assert_eq!(
            anchor_date(&s, Anchor::Step("review_sra"), &prefs),
            Some(d(4, 2))
        );
    }

    #[test]
    fn anchor_preference_can_pick_ecd() {
        let mut prefs = IndexMap::new();
        prefs.insert("review_sra".to_string(), false);
        let s = schedule(Track::Sra, &[("review_sra", "04/02/2025", "04/01/2025")]);
        assert_eq!(
            anchor_date(&s, Anchor::Step("review_sra"), &prefs),
            Some(d(4, 1))
        );

        // Falls back to the other date when the preferred one is blank
        let s = schedule(Track::Sra, &[("review_sra", "04/02/2025", "")]);
        assert_eq!(
            anchor_date(&s, Anchor::Step("review_sra"), &prefs),
            Some(d(4, 2))
        );
    }

    #[test]
    fn offset_rule_skips_existing_ecd() {
        let prefs = IndexMap::new();
        let s = schedule(
            Track::Sra,
            &[
                ("sra_kickoff", "03/03/2025", ""),
                ("receive_policies_and_procedures_baa", "", "03/05/2025"),
            ],
        );
        assert_eq!(SRA_RULES[0].evaluate(&s, &ctx(&prefs)), None);
    }

    #[test]
    fn mirror_or_offset_overrides_existing_ecd_with_acd() {
        let prefs = IndexMap::new();
        let s = schedule(
            Track::Sra,
            &[("go_onsite_have_interview", "03/20/2025", "03/31/2025")],
        );
        assert_eq!(
            SRA_RULES[3].evaluate(&s, &ctx(&prefs)),
            Some((d(3, 20), EcdSource::Mirrored))
        );
    }

    #[test]
    fn review_sra_mirrors_day_before_final_presentation() {
        let prefs = IndexMap::new();
        // 04/14/2025 is a Monday: day before is Sunday, rolls back to Friday
        let s = schedule(
            Track::Sra,
            &[
                ("review_sra", "", ""),
                ("present_final_sra_report", "04/14/2025", ""),
            ],
        );
        assert_eq!(
            SRA_RULES[6].evaluate(&s, &ctx(&prefs)),
            Some((d(4, 11), EcdSource::Mirrored))
        );
    }

    #[test]
    fn review_sra_is_raised_past_sibling_ecds() {
        let prefs = IndexMap::new();
        // go onsite 03/27 (Thu) + 15 = 04/11 (Fri); sibling ECD 04/14 forces 04/15
        let s = schedule(
            Track::Sra,
            &[
                ("go_onsite_have_interview", "", "03/27/2025"),
                ("recieve_requested_follow_up_documentation", "", "04/14/2025"),
                ("review_sra", "", ""),
            ],
        );
        assert_eq!(
            SRA_RULES[6].evaluate(&s, &ctx(&prefs)),
            Some((d(4, 15), EcdSource::Projected))
        );
    }

    #[test]
    fn present_final_uses_review_anchor_plus_seven() {
        let prefs = IndexMap::new();
        let s = schedule(
            Track::Sra,
            &[
                ("review_sra", "", "04/01/2025"),
                ("present_final_sra_report", "", ""),
            ],
        );
        assert_eq!(
            SRA_RULES[7].evaluate(&s, &ctx(&prefs)),
            Some((d(4, 8), EcdSource::Projected))
        );
    }

    #[test]
    fn present_final_is_raised_past_prerequisite_anchors() {
        let prefs = IndexMap::new();
        let s = schedule(
            Track::Sra,
            &[
                ("schedule_final_sra_report", "04/10/2025", ""),
                ("review_sra", "", "04/01/2025"),
                ("present_final_sra_report", "", ""),
            ],
        );
        // candidate 04/08 <= 04/10 prerequisite ACD -> next business day 04/11
        assert_eq!(
            SRA_RULES[7].evaluate(&s, &ctx(&prefs)),
            Some((d(4, 11), EcdSource::Projected))
        );
    }

    #[test]
    fn rule_without_anchor_leaves_step_blank() {
        let prefs = IndexMap::new();
        let s = schedule(Track::Sra, &[("present_final_sra_report", "", "")]);
        assert_eq!(SRA_RULES[7].evaluate(&s, &ctx(&prefs)), None);
    }

    #[test]
    fn scan_window_reads_step_field() {
        let prefs = IndexMap::new();
        let mut s = schedule(
            Track::Nva,
            &[("verify_access", "", "03/17/2025"), ("scans_complete", "", "")],
        );
        s.entry("scans_complete")
            .extras
            .insert("Scan Days".into(), "10".into());
        assert_eq!(
            NVA_RULES[2].evaluate(&s, &ctx(&prefs)),
            Some((d(3, 27), EcdSource::Projected))
        );
    }

    #[test]
    fn access_removal_is_shorter_for_remote_engagements() {
        let prefs = IndexMap::new();
        let s = schedule(
            Track::Nva,
            &[("scans_complete", "", "03/24/2025"), ("access_removed", "", "")],
        );
        let remote = RuleContext {
            anchor_on_acd: &prefs,
            remote_only: true,
        };
        assert_eq!(
            NVA_RULES[3].evaluate(&s, &remote),
            Some((d(3, 31), EcdSource::Projected))
        );
        // 03/24 + 5 = 03/29 (Sat) -> 03/31; make the difference visible from a Wednesday
        let s = schedule(
            Track::Nva,
            &[("scans_complete", "", "03/26/2025"), ("access_removed", "", "")],
        );
        assert_eq!(
            NVA_RULES[3].evaluate(&s, &remote),
            Some((d(3, 31), EcdSource::Projected))
        );
        assert_eq!(
            NVA_RULES[3].evaluate(&s, &ctx(&prefs)),
            Some((d(4, 2), EcdSource::Projected))
        );
    }

    #[test]
    fn compile_report_padding_depends_on_completed_scans() {
        let prefs = IndexMap::new();
        let projected = schedule(
            Track::Nva,
            &[("scans_complete", "", "03/24/2025"), ("compile_report", "", "")],
        );
        assert_eq!(
            NVA_RULES[4].evaluate(&projected, &ctx(&prefs)),
            Some((d(4, 14), EcdSource::Projected))
        );
        let complete = schedule(
            Track::Nva,
            &[("scans_complete", "03/24/2025", ""), ("compile_report", "", "")],
        );
        assert_eq!(
            NVA_RULES[4].evaluate(&complete, &ctx(&prefs)),
            Some((d(4, 7), EcdSource::Projected))
        );
    }
}
