use chrono::NaiveDate;
use indexmap::IndexMap;
use serde::Serialize;

use crate::model::client::{ClientOverrides, ClientStatus};
use crate::model::step::{Schedule, Step, StepStatus, Track};
use crate::ops::projection::{ProjectionContext, project_schedules};
use crate::parse::metric_keys::{apply_acronyms, parse_metrics, step_title, to_title_case};
use crate::util::dates::us_to_ymd;

/// Organisation that performs the staff-side steps
pub const STAFF_OWNER: &str = "Medcurity";

/// Override keys take the form `override:<slug>.ecd`
pub const OVERRIDE_PREFIX: &str = "override:";
pub const OVERRIDE_SUFFIX: &str = ".ecd";

pub fn override_key(slug: &str) -> String {
    format!("{OVERRIDE_PREFIX}{slug}{OVERRIDE_SUFFIX}")
}

/// The step slug named by an override key, if the key is well formed.
pub fn override_slug(key: &str) -> Option<&str> {
    key.strip_prefix(OVERRIDE_PREFIX)
        .and_then(|rest| rest.strip_suffix(OVERRIDE_SUFFIX))
        .filter(|slug| !slug.trim().is_empty())
}

/// One editable date on the dashboard
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateCell {
    pub value: String,
    pub editable: bool,
    /// Writable metric key backing this date, empty when not writable
    pub metric_key: String,
    /// Override key for ECD cells, empty for ACD cells
    #[serde(skip_serializing_if = "String::is_empty")]
    pub override_key: String,
    /// `YYYY-MM-DD`, for pre-filling a date input
    pub input_value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepView {
    pub slug: String,
    pub name: String,
    pub status: StepStatus,
    pub status_class: &'static str,
    pub owner: String,
    /// Absent for the kickoff step
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ecd: Option<DateCell>,
    pub acd: DateCell,
    pub extras: IndexMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardView {
    pub project_details: IndexMap<String, String>,
    pub show_sra: bool,
    pub show_nva: bool,
    pub sra_steps: Vec<StepView>,
    pub nva_steps: Vec<StepView>,
    pub extra_metrics: IndexMap<String, String>,
}

impl DashboardView {
    pub fn steps(&self, track: Track) -> &[StepView] {
        match track {
            Track::Sra => &self.sra_steps,
            Track::Nva => &self.nva_steps,
        }
    }

    pub fn visible(&self, track: Track) -> bool {
        match track {
            Track::Sra => self.show_sra,
            Track::Nva => self.show_nva,
        }
    }
}

/// Everything needed to render one client's page.
#[derive(Debug, Clone, Copy)]
pub struct DashboardInput<'a> {
    pub status: &'a ClientStatus,
    pub overrides: &'a ClientOverrides,
    /// Metric key → task-tracker field id; only mapped keys are writable
    pub field_map: &'a IndexMap<String, String>,
    pub can_edit: bool,
    pub today: NaiveDate,
}

pub fn build_dashboard(input: DashboardInput<'_>) -> DashboardView {
    let mut parsed = parse_metrics(&input.status.metrics);
    let ctx = ProjectionContext {
        overrides: &input.overrides.ecd,
        anchor_on_acd: &input.overrides.anchor_on_acd,
        link_tracks: parsed.flags.both_enabled(),
        remote_only: parsed.is_remote_only(),
        today: input.today,
    };
    project_schedules(&mut parsed.sra, &mut parsed.nva, &ctx);

    let client = input.status.display_name();
    let views = |schedule: &Schedule| -> Vec<StepView> {
        schedule
            .steps
            .iter()
            .map(|step| step_view(schedule.track, step, &parsed.location, client, &input))
            .collect()
    };

    DashboardView {
        project_details: project_details(&input.status.task_status, &parsed.project),
        show_sra: parsed.flags.enabled(Track::Sra),
        show_nva: parsed.flags.enabled(Track::Nva),
        sra_steps: views(&parsed.sra),
        nva_steps: views(&parsed.nva),
        extra_metrics: parsed.extra.clone(),
    }
}

fn step_view(
    track: Track,
    step: &Step,
    location: &str,
    client: &str,
    input: &DashboardInput<'_>,
) -> StepView {
    let writable = |key: &Option<String>| {
        key.as_deref()
            .filter(|k| input.field_map.contains_key(*k))
            .unwrap_or("")
            .to_string()
    };

    let ecd = (!step.is_kickoff()).then(|| {
        let metric_key = writable(&step.ecd_key);
        let override_key = override_key(&step.slug);
        DateCell {
            value: step.ecd.trim().to_string(),
            editable: input.can_edit && (!metric_key.is_empty() || !override_key.is_empty()),
            metric_key,
            override_key,
            input_value: us_to_ymd(&step.ecd),
        }
    });

    let acd_writable = !writable(&step.acd_key).is_empty();
    let acd = DateCell {
        value: step.acd.trim().to_string(),
        editable: input.can_edit && acd_writable,
        metric_key: step.acd_key.clone().unwrap_or_default(),
        override_key: String::new(),
        input_value: us_to_ymd(&step.acd),
    };

    StepView {
        slug: step.slug.clone(),
        name: step_title(&step.slug, location),
        status: step.status,
        status_class: step.status.badge_class(),
        owner: step_owner(track, &step.slug, client),
        ecd,
        acd,
        extras: step.extras.clone(),
    }
}

/// Who is responsible for a step. Unknown steps belong to the client.
pub fn step_owner(track: Track, slug: &str, client: &str) -> String {
    enum Owner {
        Staff,
        Client,
        Joint,
    }

    let owner = match (track, slug) {
        (Track::Sra, "sra_kickoff")
        | (Track::Sra, "review_policies_and_procedures_baa")
        | (Track::Sra, "go_onsite_have_interview")
        | (Track::Sra, "review_sra")
        | (Track::Sra, "present_final_sra_report") => Owner::Staff,
        (Track::Sra, "schedule_onsite_remote_interview")
        | (Track::Sra, "schedule_final_sra_report") => Owner::Joint,

        (Track::Nva, "nva_kickoff")
        | (Track::Nva, "verify_access")
        | (Track::Nva, "scans_complete")
        | (Track::Nva, "compile_report")
        | (Track::Nva, "present_final_nva_report") => Owner::Staff,
        (Track::Nva, "schedule_final_nva_report") => Owner::Joint,

        _ => Owner::Client,
    };

    match owner {
        Owner::Staff => STAFF_OWNER.to_string(),
        Owner::Client => client.to_string(),
        Owner::Joint => format!("{STAFF_OWNER} & {client}"),
    }
}

/// Client-facing project details in fixed display order.
pub fn project_details(task_status: &str, project: &IndexMap<String, String>) -> IndexMap<String, String> {
    let value = |label: &str| {
        project
            .get(label)
            .map(|v| v.trim().to_string())
            .unwrap_or_default()
    };

    let mut details = IndexMap::new();
    details.insert(
        "Status".to_string(),
        apply_acronyms(&to_title_case(task_status)),
    );

    let lead = value("Project Lead");
    details.insert(
        "Project Lead".to_string(),
        if lead.is_empty() { "Not assigned".to_string() } else { lead },
    );

    let location = value("Location");
    if !location.is_empty() {
        details.insert("Location".to_string(), location);
    }

    let next_steps = value("Next Steps");
    details.insert(
        "Next Steps".to_string(),
        if next_steps.is_empty() { "Not set".to_string() } else { next_steps },
    );

    let support = value("Project Support");
    if !support.is_empty() {
        details.insert("Project Support".to_string(), support);
    }
    details
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()
    }

    fn status(pairs: &[(&str, &str)]) -> ClientStatus {
        ClientStatus {
            sf_id: "SF-1".into(),
            task_id: "t1".into(),
            task_name: "Acme Clinic".into(),
            task_status: "in progress".into(),
            metrics: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ..Default::default()
        }
    }

    fn field_map(keys: &[&str]) -> IndexMap<String, String> {
        keys.iter()
            .enumerate()
            .map(|(i, k)| (k.to_string(), format!("field-{i}")))
            .collect()
    }

    fn build(status: &ClientStatus, overrides: &ClientOverrides, map: &IndexMap<String, String>, can_edit: bool) -> DashboardView {
        build_dashboard(DashboardInput {
            status,
            overrides,
            field_map: map,
            can_edit,
            today: today(),
        })
    }

    #[test]
    fn override_keys_round_trip_to_slugs() {
        assert_eq!(override_key("review_sra"), "override:review_sra.ecd");
        assert_eq!(override_slug("override:review_sra.ecd"), Some("review_sra"));
        assert_eq!(override_slug("override:.ecd"), None);
        assert_eq!(override_slug("sra.review_sra.ecd"), None);
        assert_eq!(override_slug("override:review_sra.acd"), None);
    }

    #[test]
    fn visibility_comes_only_from_flags() {
        let s = status(&[
            ("sra.sra_kickoff.date", "03/03/2025"),
            ("nva.nva_kickoff.date", "03/03/2025"),
            ("project.sra_enabled", "true"),
        ]);
        let view = build(&s, &ClientOverrides::default(), &IndexMap::new(), false);
        assert!(view.show_sra);
        assert!(!view.show_nva);
        // Steps are still assembled for hidden tracks
        assert_eq!(view.nva_steps.len(), 1);
    }

    #[test]
    fn editability_follows_field_map_and_mode() {
        let s = status(&[
            ("sra.sra_kickoff.date", "03/03/2025"),
            ("sra.review_sra.ecd", "04/01/2025"),
            ("sra.review_sra.date", ""),
            ("sra.go_onsite_have_interview.date", ""),
        ]);
        let map = field_map(&["sra.review_sra.date"]);

        let view = build(&s, &ClientOverrides::default(), &map, true);
        let review = view.sra_steps.iter().find(|v| v.slug == "review_sra").unwrap();
        let ecd = review.ecd.as_ref().unwrap();
        assert!(ecd.editable);
        assert_eq!(ecd.metric_key, "");
        assert_eq!(ecd.override_key, "override:review_sra.ecd");
        assert_eq!(ecd.input_value, "2025-04-01");
        assert!(review.acd.editable);
        assert_eq!(review.acd.metric_key, "sra.review_sra.date");

        let onsite = view
            .sra_steps
            .iter()
            .find(|v| v.slug == "go_onsite_have_interview")
            .unwrap();
        assert!(!onsite.acd.editable);

        let kickoff = &view.sra_steps[0];
        assert!(kickoff.ecd.is_none());

        let read_only = build(&s, &ClientOverrides::default(), &map, false);
        assert!(read_only.sra_steps.iter().all(|v| !v.acd.editable
            && v.ecd.as_ref().is_none_or(|c| !c.editable)));
    }

    #[test]
    fn owners_by_track() {
        assert_eq!(step_owner(Track::Sra, "sra_kickoff", "Acme"), "Medcurity");
        assert_eq!(
            step_owner(Track::Sra, "receive_policies_and_procedures_baa", "Acme"),
            "Acme"
        );
        assert_eq!(
            step_owner(Track::Sra, "schedule_final_sra_report", "Acme"),
            "Medcurity & Acme"
        );
        assert_eq!(step_owner(Track::Nva, "receive_credentials", "Acme"), "Acme");
        assert_eq!(step_owner(Track::Nva, "scans_complete", "Acme"), "Medcurity");
        assert_eq!(step_owner(Track::Nva, "custom_step", "Acme"), "Acme");
    }

    #[test]
    fn project_details_defaults_and_order() {
        let mut project = IndexMap::new();
        project.insert("Project Support".to_string(), "  ".to_string());
        project.insert("Location".to_string(), "Remote".to_string());
        let details = project_details("in progress", &project);
        let pairs: Vec<(&str, &str)> = details
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("Status", "In Progress"),
                ("Project Lead", "Not assigned"),
                ("Location", "Remote"),
                ("Next Steps", "Not set"),
            ]
        );
    }

    #[test]
    fn override_flows_into_view() {
        let s = status(&[
            ("project.sra_enabled", "true"),
            ("sra.sra_kickoff.date", "03/03/2025"),
            ("sra.review_sra.ecd", ""),
            ("sra.present_final_sra_report.date", ""),
        ]);
        let mut overrides = ClientOverrides::default();
        overrides
            .ecd
            .insert("present_final_sra_report".into(), "05/01/2025".into());
        let view = build(&s, &overrides, &IndexMap::new(), false);
        let present = view
            .sra_steps
            .iter()
            .find(|v| v.slug == "present_final_sra_report")
            .unwrap();
        assert_eq!(present.ecd.as_ref().unwrap().value, "05/01/2025");
        assert_eq!(present.name, "Present Final SRA Report");
        assert_eq!(present.owner, "Medcurity");
    }

    #[test]
    fn client_name_falls_back_for_owner() {
        let mut s = status(&[("sra.receive_policies_and_procedures_baa.date", "")]);
        s.task_name = "  ".into();
        let view = build(&s, &ClientOverrides::default(), &IndexMap::new(), false);
        assert_eq!(view.sra_steps[0].owner, "Not assigned");
    }
}
