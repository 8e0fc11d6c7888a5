/// Orchestrator: scrape → filter → enrich → prioritize → notify.
///
/// Each stage consumes the whole list produced by the previous one.
/// Cancellation is observed between stages; a per-lead failure only drops
/// that lead, while a systemic failure fails the run.
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::classifier::Classifier;
use crate::config::Config;
use crate::contacts::{ContactLookup, DirectoryLookup, HttpContactLookup};
use crate::dispatcher::{DispatchReport, Dispatcher};
use crate::enrichment::Enricher;
use crate::errors::AppError;
use crate::ingest::{self, CandidateSource, JsonFeedSource, JsonFileSource, ResearchFileSource};
use crate::notifier::{LogNotifier, Notifier, WebhookNotifier};
use crate::retry::RetryPolicy;
use crate::scoring::{PriorityScorer, PriorityWeights};
use crate::steel::SteelEstimator;
use crate::validator::{Validator, ValidatorSettings};

pub const NO_LEADS_SUMMARY: &str = "no leads this run";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StageCounts {
    pub scraped: usize,
    pub rejected: usize,
    pub validated: usize,
    pub enriched: usize,
    pub prioritized: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub summary: String,
    pub counts: StageCounts,
    pub dispatch: DispatchReport,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Pipeline stage names, used in logs and cancellation summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Scrape,
    Filter,
    Enrich,
    Prioritize,
    Notify,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Scrape => "scrape",
            Stage::Filter => "filter",
            Stage::Enrich => "enrich",
            Stage::Prioritize => "prioritize",
            Stage::Notify => "notify",
        }
    }
}

pub struct Pipeline {
    sources: Vec<Arc<dyn CandidateSource>>,
    validator: ValidatorSettings,
    enricher: Enricher,
    weights: PriorityWeights,
    max_leads: usize,
    dispatcher: Dispatcher,
    retry: RetryPolicy,
}

impl Pipeline {
    pub fn new(
        sources: Vec<Arc<dyn CandidateSource>>,
        validator: ValidatorSettings,
        enricher: Enricher,
        weights: PriorityWeights,
        max_leads: usize,
        dispatcher: Dispatcher,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            sources,
            validator,
            enricher,
            weights,
            max_leads,
            dispatcher,
            retry,
        }
    }

    /// Wires sources, contacts and transport from configuration.
    pub async fn from_config(config: &Config) -> Result<Self, AppError> {
        let mut sources: Vec<Arc<dyn CandidateSource>> = Vec::new();
        for path in &config.source_files {
            sources.push(Arc::new(JsonFileSource::new(path)));
        }
        for url in &config.source_feeds {
            sources.push(Arc::new(JsonFeedSource::new(url, config.retry.call_timeout)?));
        }
        for path in &config.research_files {
            sources.push(Arc::new(ResearchFileSource::new(path)));
        }

        let contacts: Arc<dyn ContactLookup> = match (&config.contact_api_url, &config.contact_directory_path) {
            (Some(url), _) => Arc::new(HttpContactLookup::new(url, config.retry.call_timeout)?),
            (None, Some(path)) => Arc::new(DirectoryLookup::from_file(path).await?),
            (None, None) => Arc::new(DirectoryLookup::empty()),
        };

        let notifier: Arc<dyn Notifier> = match &config.notify_webhook_url {
            Some(url) => Arc::new(WebhookNotifier::new(
                url,
                &config.notify_channel,
                config.retry.call_timeout,
            )?),
            None => Arc::new(LogNotifier),
        };

        let enricher = Enricher::new(
            Classifier::default(),
            SteelEstimator::default(),
            contacts,
            config.retry,
        )
        .with_concurrency(config.enrich_concurrency);

        Ok(Self::new(
            sources,
            config.validator,
            enricher,
            config.priority_weights,
            config.max_leads,
            Dispatcher::new(notifier, config.team_recipients.clone(), config.retry),
            config.retry,
        ))
    }

    pub async fn run(&self, cancel: &CancellationToken) -> RunReport {
        self.run_at(cancel, Utc::now()).await
    }

    /// One run with the clock frozen at `now`.
    pub async fn run_at(&self, cancel: &CancellationToken, now: DateTime<Utc>) -> RunReport {
        let run_id = Uuid::new_v4();
        let mut counts = StageCounts::default();
        tracing::info!("🚀 Pipeline run {} started", run_id);

        let finish = |status: RunStatus, summary: String, counts: StageCounts, dispatch: DispatchReport| {
            match status {
                RunStatus::Completed => tracing::info!("✓ Run {} completed: {}", run_id, summary),
                _ => tracing::error!("❌ Run {} failed: {}", run_id, summary),
            }
            RunReport {
                run_id,
                status,
                summary,
                counts,
                dispatch,
                started_at: now,
                finished_at: Utc::now(),
            }
        };
        let cancelled = |stage: Stage, counts: StageCounts| {
            finish(
                RunStatus::Failed,
                format!("cancelled after {}", stage.as_str()),
                counts,
                DispatchReport::default(),
            )
        };

        // Step 1: scrape
        let scraped = ingest::scrape(&self.sources, &self.retry).await;
        counts.scraped = scraped.candidates.len();
        tracing::info!(
            "Stage scrape: {} candidate(s) from {} source(s)",
            counts.scraped,
            self.sources.len()
        );
        if scraped.all_failed() {
            return finish(
                RunStatus::Failed,
                format!("all {} source(s) failed", scraped.source_errors.len()),
                counts,
                DispatchReport::default(),
            );
        }
        if cancel.is_cancelled() {
            return cancelled(Stage::Scrape, counts);
        }

        // Step 2: filter
        let validated = Validator::new(self.validator, now).validate_batch(scraped.candidates);
        counts.validated = validated.leads.len();
        counts.rejected = validated.rejected.len();
        tracing::info!(
            "Stage filter: {} kept, {} rejected",
            counts.validated,
            counts.rejected
        );
        if validated.leads.is_empty() {
            return finish(
                RunStatus::Completed,
                NO_LEADS_SUMMARY.to_string(),
                counts,
                DispatchReport::default(),
            );
        }
        if cancel.is_cancelled() {
            return cancelled(Stage::Filter, counts);
        }

        // Step 3: enrich
        let enriched = self.enricher.enrich_all(validated.leads).await;
        counts.enriched = enriched.len();
        tracing::info!("Stage enrich: {} lead(s)", counts.enriched);
        if cancel.is_cancelled() {
            return cancelled(Stage::Enrich, counts);
        }

        // Step 4: prioritize
        let prioritized = PriorityScorer::new(self.weights, now)
            .with_max_leads(self.max_leads)
            .prioritize(enriched);
        counts.prioritized = prioritized.len();
        tracing::info!("Stage prioritize: top {} lead(s)", counts.prioritized);
        if cancel.is_cancelled() {
            return cancelled(Stage::Prioritize, counts);
        }

        // Step 5: notify
        let dispatch = self.dispatcher.dispatch(&prioritized).await;
        let summary = format!(
            "{} lead(s) prioritized, {} delivery(ies) ok, {} failed",
            counts.prioritized,
            dispatch.delivered(),
            dispatch.failed()
        );
        finish(RunStatus::Completed, summary, counts, dispatch)
    }
}
