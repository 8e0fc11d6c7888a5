/// Enrich stage: turns validated leads into routed, estimated leads.
///
/// Per lead:
/// 1. Stated steel mentions from the text
/// 2. Classification (project type + teams)
/// 3. Physical specs and steel requirements (stated, else rate table)
/// 4. Short headline, original title kept
/// 5. Contact lookup with retry; failure leaves the contact list empty
use regex::Regex;
use std::sync::{Arc, OnceLock};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::classifier::Classifier;
use crate::contacts::ContactLookup;
use crate::extractor;
use crate::models::{Lead, SteelRequirements};
use crate::retry::{with_retry, RetryPolicy};
use crate::steel::SteelEstimator;

pub const DEFAULT_ENRICH_CONCURRENCY: usize = 4;
pub const HEADLINE_MAX_CHARS: usize = 80;

#[derive(Clone)]
pub struct Enricher {
    classifier: Arc<Classifier>,
    estimator: Arc<SteelEstimator>,
    contacts: Arc<dyn ContactLookup>,
    retry: RetryPolicy,
    concurrency: usize,
}

impl Enricher {
    pub fn new(
        classifier: Classifier,
        estimator: SteelEstimator,
        contacts: Arc<dyn ContactLookup>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            classifier: Arc::new(classifier),
            estimator: Arc::new(estimator),
            contacts,
            retry,
            concurrency: DEFAULT_ENRICH_CONCURRENCY,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Classification, specs and steel. No I/O.
    pub fn analyze(&self, mut lead: Lead) -> Lead {
        let text = lead.text();
        let stated = SteelRequirements::from_mentions(&extractor::extract_steel_mentions(&text));

        let classification = self.classifier.classify(&text, stated.as_ref(), lead.value);
        lead.project_type = classification.project_type;
        lead.teams = classification.teams;

        if lead.specs.is_empty() {
            lead.specs = extractor::extract_specs(&text);
        }

        lead.steel_requirements = match stated {
            Some(stated) => {
                tracing::debug!("Using stated steel for '{}'", lead.original_title);
                stated
            }
            None => self
                .estimator
                .estimate(lead.project_type, lead.value, &lead.specs),
        };

        lead.title = short_headline(&lead.original_title);
        lead
    }

    /// Full enrichment of one lead, contact lookup included.
    pub async fn enrich_one(&self, lead: Lead) -> Lead {
        let mut lead = self.analyze(lead);
        if lead.company.is_empty() {
            return lead;
        }

        let label = format!("contacts:{}:{}", self.contacts.name(), lead.company);
        let company = lead.company.clone();
        lead.contacts = match with_retry(&self.retry, &label, || self.contacts.lookup(&company)).await {
            Ok(contacts) => contacts,
            Err(e) => {
                tracing::warn!("⚠ Contact lookup failed for {}: {}", company, e);
                Vec::new()
            }
        };
        lead
    }

    /// Enriches every lead with bounded concurrency. Output keeps input order;
    /// a lead whose task panics is logged and dropped.
    pub async fn enrich_all(&self, leads: Vec<Lead>) -> Vec<Lead> {
        let total = leads.len();
        let permits = Arc::new(Semaphore::new(self.concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for (idx, lead) in leads.into_iter().enumerate() {
            let enricher = self.clone();
            let permits = permits.clone();
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                (idx, enricher.enrich_one(lead).await)
            });
        }

        let mut slots: Vec<Option<Lead>> = (0..total).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, lead)) => slots[idx] = Some(lead),
                Err(e) => tracing::error!("❌ Enrichment task failed: {}", e),
            }
        }

        let enriched: Vec<Lead> = slots.into_iter().flatten().collect();
        tracing::info!("✓ Enriched {}/{} lead(s)", enriched.len(), total);
        enriched
    }
}

fn headline_regexes() -> Option<&'static (Regex, Regex)> {
    static CELL: OnceLock<Option<(Regex, Regex)>> = OnceLock::new();
    CELL.get_or_init(|| {
        let parenthesised = Regex::new(r"\([^)]*\)").ok()?;
        let legal = Regex::new(r"(?i)\b(?:ltd|limited|corp|corporation)\b\.?").ok()?;
        Some((parenthesised, legal))
    })
    .as_ref()
}

/// Compact headline for notifications, at most 80 chars.
pub fn short_headline(title: &str) -> String {
    let last_line = title
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .last()
        .unwrap_or("");
    let mut headline: String = last_line
        .chars()
        .filter(|c| !matches!(c, '"' | '\u{201c}' | '\u{201d}'))
        .collect();

    if let Some((parenthesised, legal)) = headline_regexes() {
        headline = parenthesised.replace_all(&headline, " ").into_owned();
        headline = legal.replace_all(&headline, " ").into_owned();
    }
    let headline = headline.split_whitespace().collect::<Vec<_>>().join(" ");

    if headline.chars().count() > HEADLINE_MAX_CHARS {
        let cut: String = headline.chars().take(HEADLINE_MAX_CHARS - 3).collect();
        format!("{}...", cut.trim_end())
    } else {
        headline
    }
}
