/// Pipeline-level tests: validation, scoring, dispatch and full runs with
/// in-process fakes for every external collaborator.
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use steel_lead_pipeline::classifier::Classifier;
use steel_lead_pipeline::contacts::{DirectoryEntry, DirectoryLookup};
use steel_lead_pipeline::dispatcher::{group_by_team, Dispatcher, TeamRecipients};
use steel_lead_pipeline::enrichment::Enricher;
use steel_lead_pipeline::errors::AppError;
use steel_lead_pipeline::ingest::{CandidateSource, JsonFileSource};
use steel_lead_pipeline::models::{
    Contact, Lead, LeadSource, RawCandidate, Requirement, SteelRequirements, TeamId, TeamPayload,
};
use steel_lead_pipeline::notifier::Notifier;
use steel_lead_pipeline::pipeline::{Pipeline, RunStatus};
use steel_lead_pipeline::retry::RetryPolicy;
use steel_lead_pipeline::scoring::{
    PriorityScorer, PriorityWeights, TAG_HIGH_STEEL, TAG_MAJOR_PROJECT, TAG_URGENT,
};
use steel_lead_pipeline::steel::SteelEstimator;
use steel_lead_pipeline::validator::{ValidatorSettings, ValuePolicy, Validator};
use tokio_util::sync::CancellationToken;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 2, 1, 9, 0, 0).unwrap()
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: std::time::Duration::from_millis(1),
        call_timeout: std::time::Duration::from_millis(500),
        inter_call_delay: std::time::Duration::ZERO,
    }
}

fn candidate(title: &str, url: &str) -> RawCandidate {
    RawCandidate {
        title: title.to_string(),
        source_url: url.to_string(),
        ..Default::default()
    }
}

/// Captures every delivery.
#[derive(Default)]
struct CapturingNotifier {
    deliveries: Mutex<Vec<(String, TeamId, usize)>>,
}

#[async_trait]
impl Notifier for CapturingNotifier {
    fn channel(&self) -> &str {
        "capture"
    }

    async fn deliver(&self, recipient: &str, payload: &TeamPayload) -> Result<(), AppError> {
        self.deliveries
            .lock()
            .unwrap()
            .push((recipient.to_string(), payload.team, payload.leads.len()));
        Ok(())
    }
}

#[test]
fn test_titles_differing_in_case_and_spacing_dedup() {
    let outcome = Validator::new(ValidatorSettings::default(), now()).validate_batch(vec![
        candidate("ABC Ltd wins X Project", "https://news.example.in/1"),
        candidate("abc ltd   wins   x project", "https://news.example.in/2"),
    ]);
    assert_eq!(outcome.leads.len(), 1);
    assert_eq!(outcome.leads[0].source_url, "https://news.example.in/1");
    assert_eq!(outcome.rejected.len(), 1);
}

#[test]
fn test_validator_is_idempotent() {
    let validator = Validator::new(ValidatorSettings::default(), now());
    let first = validator.validate_batch(vec![
        RawCandidate {
            description: "Contract value of Rs 640 crore, work to commence from April 2024"
                .to_string(),
            ..candidate(
                "Afcons Infrastructure Limited wins Chenab rail bridge package",
                "https://news.example.in/afcons",
            )
        },
        candidate("NCC Limited bags water project", "https://news.example.in/ncc"),
    ]);
    assert_eq!(first.leads.len(), 2);

    let again = validator.validate_batch(first.leads.iter().map(RawCandidate::from).collect());
    assert_eq!(again.leads.len(), first.leads.len());
    for (a, b) in first.leads.iter().zip(&again.leads) {
        assert_eq!(a.title, b.title);
        assert_eq!(a.company, b.company);
        assert_eq!(a.value, b.value);
        assert_eq!(a.start_date, b.start_date);
        assert_eq!(a.end_date, b.end_date);
    }
}

#[test]
fn test_strict_policy_rejects_missing_value() {
    let settings = ValidatorSettings {
        value_policy: ValuePolicy::Strict,
        ..Default::default()
    };
    let outcome = Validator::new(settings, now()).validate_batch(vec![candidate(
        "NCC Limited bags water project",
        "https://news.example.in/ncc",
    )]);
    assert!(outcome.leads.is_empty());
    assert!(matches!(outcome.rejected[0].reason, AppError::ValidationReject(_)));
}

#[test]
fn test_major_urgent_lead_scores_near_top() {
    let mut lead = Lead::from_text(
        "Mega expressway awarded",
        "https://news.example.in/e",
        LeadSource::Scrape,
        now(),
    );
    lead.value = 2000.0;
    lead.start_date = now().date_naive() + Duration::days(30);
    lead.end_date = lead.start_date + Duration::days(365);
    lead.steel_requirements = SteelRequirements::new(
        Requirement::from_tons("TMT Bars", 9000.0),
        vec![Requirement::from_tons("Hot Rolled Plates", 3000.0)],
        None,
    );
    assert_eq!(lead.steel_requirements.total(), 12000);

    let scored = PriorityScorer::new(PriorityWeights::default(), now()).prioritize_one(lead);
    assert!(scored.priority_score() > 0.95);
    assert!(scored.priority_score() <= 1.0);
    for tag in [TAG_URGENT, TAG_MAJOR_PROJECT, TAG_HIGH_STEEL] {
        assert!(scored.tags().iter().any(|t| t == tag), "missing tag {}", tag);
    }
}

#[test]
fn test_rescoring_after_mutation_reflects_new_value() {
    let scorer = PriorityScorer::new(PriorityWeights::default(), now());
    let mut lead = Lead::from_text("Bridge order", "https://news.example.in/b", LeadSource::Scrape, now());
    lead.value = 100.0;
    let before = scorer.prioritize_one(lead);

    let mut lead = before.clone().into_lead();
    lead.value = 1000.0;
    let after = scorer.prioritize_one(lead);
    assert!(after.priority_score() > before.priority_score());
}

#[test]
fn test_grouping_keeps_multi_team_leads_in_each_group() {
    let scorer = PriorityScorer::new(PriorityWeights::default(), now());
    let mut lead = Lead::from_text("Metro line", "https://news.example.in/m", LeadSource::Scrape, now());
    lead.teams = BTreeSet::from([TeamId::TmtBars, TeamId::HrCrPlates]);
    let payloads = group_by_team(&[scorer.prioritize_one(lead)]);
    assert_eq!(payloads.len(), 2);
    assert!(payloads.iter().all(|p| p.leads.len() == 1));
}

struct StaticSource(Vec<RawCandidate>);

#[async_trait]
impl CandidateSource for StaticSource {
    fn name(&self) -> String {
        "static".to_string()
    }

    async fn fetch(&self) -> Result<Vec<RawCandidate>, AppError> {
        Ok(self.0.clone())
    }
}

struct BrokenSource;

#[async_trait]
impl CandidateSource for BrokenSource {
    fn name(&self) -> String {
        "broken".to_string()
    }

    async fn fetch(&self) -> Result<Vec<RawCandidate>, AppError> {
        Err(AppError::ExternalApiError("search quota exhausted".to_string()))
    }
}

fn build_pipeline(
    sources: Vec<Arc<dyn CandidateSource>>,
    notifier: Arc<CapturingNotifier>,
    recipients: TeamRecipients,
) -> Pipeline {
    let directory = DirectoryLookup::from_entries(vec![DirectoryEntry {
        company: "Larsen & Toubro Limited".to_string(),
        aliases: vec!["L&T".to_string()],
        contacts: vec![Contact {
            name: "Meera Iyer".to_string(),
            role: "Head of Procurement".to_string(),
            email: Some("meera@example.in".to_string()),
            phone: None,
            notes: None,
        }],
    }]);
    let enricher = Enricher::new(
        Classifier::default(),
        SteelEstimator::default(),
        Arc::new(directory),
        fast_retry(),
    );
    Pipeline::new(
        sources,
        ValidatorSettings::default(),
        enricher,
        PriorityWeights::default(),
        7,
        Dispatcher::new(notifier, recipients, fast_retry()),
        fast_retry(),
    )
}

fn announcements() -> Vec<RawCandidate> {
    vec![
        RawCandidate {
            description: "Project is going to start from March 2024 and end by December 2026. Contract Value: Rs. 45.5 Cr".to_string(),
            ..candidate(
                "Larsen & Toubro wins Mumbai Metro Line-3 Station Work",
                "https://news.example.in/lt",
            )
        },
        RawCandidate {
            description: "Order for a 1,200 MW solar park, worth Rs 3,400 crore".to_string(),
            ..candidate(
                "Tata Power Renewable Energy Limited secures solar EPC order",
                "https://news.example.in/tata-solar",
            )
        },
        candidate("Page not found", "https://news.example.in/404"),
        candidate("Viral video of bridge", "https://www.youtube.com/watch?v=1"),
    ]
}

#[tokio::test]
async fn test_full_run_delivers_per_team() {
    let notifier = Arc::new(CapturingNotifier::default());
    let recipients = TeamRecipients::from([
        (TeamId::TmtBars, vec!["tmt@example.in".to_string()]),
        (TeamId::Solar, vec!["solar@example.in".to_string()]),
    ]);
    let pipeline = build_pipeline(
        vec![Arc::new(StaticSource(announcements()))],
        notifier.clone(),
        recipients,
    );

    let report = pipeline.run_at(&CancellationToken::new(), now()).await;

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.counts.scraped, 4);
    assert_eq!(report.counts.rejected, 2);
    assert_eq!(report.counts.prioritized, 2);

    let deliveries = notifier.deliveries.lock().unwrap().clone();
    assert!(deliveries.contains(&("tmt@example.in".to_string(), TeamId::TmtBars, 1)));
    assert!(deliveries.contains(&("solar@example.in".to_string(), TeamId::Solar, 1)));
    // HR/CR and coated teams have no recipients and are reported undelivered
    assert!(report
        .dispatch
        .outcomes
        .iter()
        .any(|o| o.team == TeamId::HrCrPlates && !o.delivered));
}

#[tokio::test]
async fn test_run_fails_when_every_source_fails() {
    let pipeline = build_pipeline(
        vec![Arc::new(BrokenSource)],
        Arc::new(CapturingNotifier::default()),
        TeamRecipients::new(),
    );
    let report = pipeline.run_at(&CancellationToken::new(), now()).await;
    assert_eq!(report.status, RunStatus::Failed);
    assert!(report.summary.contains("source"));
}

#[tokio::test]
async fn test_one_failing_source_does_not_fail_run() {
    let pipeline = build_pipeline(
        vec![
            Arc::new(BrokenSource),
            Arc::new(StaticSource(announcements())),
        ],
        Arc::new(CapturingNotifier::default()),
        TeamRecipients::new(),
    );
    let report = pipeline.run_at(&CancellationToken::new(), now()).await;
    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.counts.validated, 2);
}

#[tokio::test]
async fn test_json_file_source_round_trip() {
    let dir = std::env::temp_dir().join(format!("steel-leads-{}", uuid::Uuid::new_v4()));
    tokio::fs::create_dir_all(&dir).await.unwrap();
    let path = dir.join("candidates.json");
    tokio::fs::write(
        &path,
        r#"[
            {"title": "KEC International Limited wins transmission orders", "url": "https://news.example.in/kec", "value": 1100},
            {"title": "Second item", "link": "https://news.example.in/second", "start_date": "2024-06-01"}
        ]"#,
    )
    .await
    .unwrap();

    let fetched = JsonFileSource::new(&path).fetch().await.unwrap();
    assert_eq!(fetched.len(), 2);
    assert_eq!(fetched[0].source_url, "https://news.example.in/kec");
    assert_eq!(fetched[0].value, Some(1100.0));
    assert_eq!(fetched[1].source_url, "https://news.example.in/second");

    let lead = Validator::new(ValidatorSettings::default(), now())
        .validate_one(&fetched[0])
        .unwrap();
    assert_eq!(lead.company, "KEC International Limited");
    assert!(lead.end_date > lead.start_date);
    assert!(lead.start_date >= NaiveDate::from_ymd_opt(2024, 3, 2).unwrap());

    tokio::fs::remove_dir_all(&dir).await.ok();
}
