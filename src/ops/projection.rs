use chrono::NaiveDate;
use indexmap::IndexMap;

use crate::model::step::{EcdSource, Schedule, Step, Track};
use crate::ops::rules::{self, RuleContext};
use crate::ops::status::classify;
use crate::util::dates::{format_us_date, offset_forward, parse_us_date, shift_by_days};

/// Per-client inputs to one projection run
#[derive(Debug, Clone, Copy)]
pub struct ProjectionContext<'a> {
    /// step slug → manual ECD override
    pub overrides: &'a IndexMap<String, String>,
    /// step slug → anchor on ACD (true) or ECD (false)
    pub anchor_on_acd: &'a IndexMap<String, bool>,
    /// Both tracks enabled: kickoff and final presentation are shared
    pub link_tracks: bool,
    pub remote_only: bool,
    pub today: NaiveDate,
}

impl<'a> ProjectionContext<'a> {
    fn rules(&self) -> RuleContext<'a> {
        RuleContext {
            anchor_on_acd: self.anchor_on_acd,
            remote_only: self.remote_only,
        }
    }
}

/// Fill in ECDs and statuses for both tracks of one client.
pub fn project_schedules(sra: &mut Schedule, nva: &mut Schedule, ctx: &ProjectionContext<'_>) {
    if ctx.link_tracks {
        seed_nva_kickoff(sra, nva);
    }
    for schedule in [&mut *sra, &mut *nva] {
        normalize_kickoff(schedule, ctx.today);
        apply_chain(schedule, ctx);
    }
    if ctx.link_tracks {
        share_final_presentation(sra, nva);
    }
    for schedule in [sra, nva] {
        apply_fallback(schedule, ctx);
        apply_overrides(schedule, ctx);
        finalize(schedule, ctx.today);
    }
}

fn seed_nva_kickoff(sra: &Schedule, nva: &mut Schedule) {
    let Some(sra_acd) = sra.kickoff().filter(|k| k.acd_date().is_some()).map(|k| k.acd.clone()) else {
        return;
    };
    if nva.kickoff().is_none() {
        nva.steps.insert(0, Step::new(Track::Nva.kickoff_slug()));
    }
    if let Some(kickoff) = nva.kickoff_mut()
        && kickoff.acd.trim().is_empty()
    {
        kickoff.acd = sra_acd;
    }
}

/// The kickoff has no projection of its own: its ECD is its ACD.
fn normalize_kickoff(schedule: &mut Schedule, today: NaiveDate) {
    let Some(kickoff) = schedule.kickoff_mut() else {
        return;
    };
    match kickoff.acd_date() {
        Some(acd) => kickoff.set_ecd(acd, EcdSource::Mirrored),
        None => kickoff.clear_ecd(),
    }
    kickoff.status = classify(&kickoff.acd, &kickoff.ecd, true, today);
}

fn apply_chain(schedule: &mut Schedule, ctx: &ProjectionContext<'_>) {
    let rule_ctx = ctx.rules();
    for rule in rules::rules(schedule.track) {
        if let Some((date, source)) = rule.evaluate(schedule, &rule_ctx)
            && let Some(step) = schedule.get_mut(rule.slug)
        {
            step.set_ecd(date, source);
        }
    }
}

fn share_final_presentation(sra: &Schedule, nva: &mut Schedule) {
    let Some(sra_final) = sra
        .get(Track::Sra.present_final_slug())
        .filter(|s| s.has_ecd())
    else {
        return;
    };
    if let Some(nva_final) = nva.get_mut(Track::Nva.present_final_slug()) {
        nva_final.ecd = sra_final.ecd.clone();
        nva_final.ecd_source = EcdSource::Mirrored;
    }
}

/// Kickoff-relative offsets for steps no explicit rule owns.
fn apply_fallback(schedule: &mut Schedule, ctx: &ProjectionContext<'_>) {
    let track = schedule.track;
    let Some(kickoff_anchor) = schedule
        .kickoff()
        .and_then(|k| rules::step_anchor(k, ctx.anchor_on_acd))
    else {
        return;
    };
    for (slug, days) in rules::offsets(track) {
        if rules::is_covered(track, slug) || slug.contains("kickoff") {
            continue;
        }
        if let Some(step) = schedule.get_mut(slug)
            && !step.has_ecd()
            && let Some(date) = offset_forward(kickoff_anchor, *days)
        {
            step.set_ecd(date, EcdSource::Projected);
        }
    }
}

/// Step indices in canonical order: kickoff, offset-table order, then the rest as parsed.
pub fn canonical_order(schedule: &Schedule) -> Vec<usize> {
    let mut order = Vec::with_capacity(schedule.steps.len());
    if let Some(idx) = schedule.steps.iter().position(|s| s.is_kickoff()) {
        order.push(idx);
    }
    for (slug, _) in rules::offsets(schedule.track) {
        if let Some(idx) = schedule.position(slug)
            && !order.contains(&idx)
        {
            order.push(idx);
        }
    }
    for idx in 0..schedule.steps.len() {
        if !order.contains(&idx) {
            order.push(idx);
        }
    }
    order
}

fn apply_overrides(schedule: &mut Schedule, ctx: &ProjectionContext<'_>) {
    if ctx.overrides.is_empty() {
        return;
    }
    let order = canonical_order(schedule);
    for (pos, &idx) in order.iter().enumerate() {
        let step = &mut schedule.steps[idx];
        if step.is_kickoff() {
            continue;
        }
        let Some(value) = ctx.overrides.get(&step.slug).and_then(|v| parse_us_date(v)) else {
            continue;
        };
        let delta = step
            .ecd_date()
            .map(|current| (value - current).num_days())
            .unwrap_or(0);
        step.set_ecd(value, EcdSource::Override);
        tracing::debug!(track = %schedule.track, step = %step.slug, delta, "applied ECD override");

        if delta == 0 {
            continue;
        }
        for &later in &order[pos + 1..] {
            let step = &mut schedule.steps[later];
            if step.acd_date().is_some() {
                continue;
            }
            match step.ecd_date().map(|current| shift_by_days(current, delta)) {
                Some(Some(shifted)) => step.ecd = format_us_date(shifted),
                Some(None) => step.clear_ecd(),
                None => {}
            }
        }
    }
}

fn finalize(schedule: &mut Schedule, today: NaiveDate) {
    for step in &mut schedule.steps {
        step.status = classify(&step.acd, &step.ecd, step.is_kickoff(), today);
    }
}
