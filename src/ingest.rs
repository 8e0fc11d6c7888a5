/// Source adapters and the scrape stage.
///
/// Adapters only fetch and shape records into [`RawCandidate`]; site-specific
/// selectors stay outside this crate. The scrape stage merges every adapter's
/// output and de-duplicates on source URL.
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use crate::errors::{AppError, ResultExt};
use crate::models::{LeadSource, RawCandidate};
use crate::retry::{with_retry, RetryPolicy};

#[async_trait]
pub trait CandidateSource: Send + Sync {
    fn name(&self) -> String;

    async fn fetch(&self) -> Result<Vec<RawCandidate>, AppError>;
}

/// A local JSON array of candidates.
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CandidateSource for JsonFileSource {
    fn name(&self) -> String {
        format!("file:{}", self.path.display())
    }

    async fn fetch(&self) -> Result<Vec<RawCandidate>, AppError> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("reading {}", self.path.display()))?;
        let candidates: Vec<RawCandidate> = serde_json::from_str(&raw)
            .with_context(|| format!("parsing {}", self.path.display()))?;
        Ok(candidates)
    }
}

/// An HTTP endpoint returning a JSON array of candidates.
pub struct JsonFeedSource {
    client: Client,
    url: String,
}

impl JsonFeedSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            AppError::ExternalApiError(format!("Failed to create feed client: {}", e))
        })?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl CandidateSource for JsonFeedSource {
    fn name(&self) -> String {
        format!("feed:{}", self.url)
    }

    async fn fetch(&self) -> Result<Vec<RawCandidate>, AppError> {
        tracing::info!("Fetching candidate feed: {}", self.url);
        let response = self.client.get(&self.url).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::ExternalApiError(format!(
                "Feed {} returned {}: {}",
                self.url, status, error_text
            )));
        }

        let candidates: Vec<RawCandidate> = response.json().await?;
        Ok(candidates)
    }
}

/// A text file holding one or more AI research responses.
pub struct ResearchFileSource {
    path: PathBuf,
}

impl ResearchFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CandidateSource for ResearchFileSource {
    fn name(&self) -> String {
        format!("research:{}", self.path.display())
    }

    async fn fetch(&self) -> Result<Vec<RawCandidate>, AppError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("reading {}", self.path.display()))?;
        Ok(parse_research_response(&content))
    }
}

fn research_regexes() -> Option<&'static (Regex, Regex, Regex)> {
    static CELL: OnceLock<Option<(Regex, Regex, Regex)>> = OnceLock::new();
    CELL.get_or_init(|| {
        let wins = Regex::new(r"(?i)^(.+?)\s+wins\s+(.+?)\.?$").ok()?;
        let timeline =
            Regex::new(r"(?i)start\s+from\s+(.+?)\s+and\s+end\s+by\s+(.+?)\.?$").ok()?;
        let value = Regex::new(r"(?i)rs\.?\s*([0-9][0-9,]*(?:\.[0-9]+)?)\s*cr").ok()?;
        Some((wins, timeline, value))
    })
    .as_ref()
}

fn strip_markup(line: &str) -> &str {
    line.trim()
        .trim_start_matches(|c: char| c.is_ascii_digit() || matches!(c, '.' | ')' | '-' | '*' | '#'))
        .trim()
        .trim_matches('*')
        .trim()
}

/// Parses blank-line separated research blocks of the shape:
///
/// ```text
/// L&T wins Mumbai Metro Line-3 Station Work.
/// Project is going to start from March 2024 and end by December 2026.
/// Contract Value: Rs. 45.5 Cr
/// Source: www.example.com/announcement
/// ```
///
/// Blocks without a `<company> wins <project>` line are skipped.
pub fn parse_research_response(content: &str) -> Vec<RawCandidate> {
    let Some((wins, timeline, value_re)) = research_regexes() else {
        return Vec::new();
    };

    let normalized = content.replace("\r\n", "\n");
    let mut candidates = Vec::new();

    for block in normalized.split("\n\n").map(str::trim).filter(|b| !b.is_empty()) {
        let mut candidate = RawCandidate {
            source: LeadSource::AiResearch,
            description: block.to_string(),
            ..Default::default()
        };

        for line in block.lines().map(strip_markup).filter(|l| !l.is_empty()) {
            let lowered = line.to_lowercase();
            if candidate.company.is_none() {
                if let Some(caps) = wins.captures(line) {
                    candidate.company = Some(caps[1].trim().to_string());
                    candidate.title = line.trim_end_matches('.').to_string();
                    continue;
                }
            }
            if let Some(caps) = timeline.captures(line) {
                candidate.start_date = Some(caps[1].trim().to_string());
                candidate.end_date = Some(caps[2].trim().to_string());
            } else if lowered.contains("value") {
                candidate.value = value_re
                    .captures(line)
                    .and_then(|caps| caps[1].replace(',', "").parse::<f64>().ok());
            } else if let Some(url) = lowered
                .starts_with("source:")
                .then(|| line.get(7..).map(str::trim))
                .flatten()
            {
                candidate.source_url = if url.starts_with("http://") || url.starts_with("https://") {
                    url.to_string()
                } else {
                    format!("https://{}", url)
                };
            }
        }

        if candidate.company.is_some() {
            candidates.push(candidate);
        } else {
            tracing::debug!("Research block skipped (no award line)");
        }
    }

    tracing::info!("Parsed {} research candidate(s)", candidates.len());
    candidates
}

fn url_key(url: &str) -> String {
    url.trim().trim_end_matches('/').to_lowercase()
}

/// Concatenates batches, keeping the first candidate seen per source URL.
/// Candidates without a URL pass through for the validator to reject.
pub fn merge_sources(batches: Vec<Vec<RawCandidate>>) -> Vec<RawCandidate> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut merged = Vec::new();
    for candidate in batches.into_iter().flatten() {
        let key = url_key(&candidate.source_url);
        if key.is_empty() || seen.insert(key) {
            merged.push(candidate);
        } else {
            tracing::debug!("Duplicate URL dropped: {}", candidate.source_url);
        }
    }
    merged
}

/// Result of the scrape stage.
#[derive(Debug, Default)]
pub struct ScrapeOutcome {
    pub candidates: Vec<RawCandidate>,
    pub sources_ok: usize,
    pub source_errors: Vec<(String, AppError)>,
}

impl ScrapeOutcome {
    /// Every configured source failed.
    pub fn all_failed(&self) -> bool {
        self.sources_ok == 0 && !self.source_errors.is_empty()
    }
}

/// Fetches every source (each through the retry policy) and merges them.
pub async fn scrape(sources: &[Arc<dyn CandidateSource>], retry: &RetryPolicy) -> ScrapeOutcome {
    let mut outcome = ScrapeOutcome::default();
    let mut batches = Vec::with_capacity(sources.len());

    for source in sources {
        let name = source.name();
        match with_retry(retry, &name, || source.fetch()).await {
            Ok(batch) => {
                tracing::info!("Source {} yielded {} candidate(s)", name, batch.len());
                outcome.sources_ok += 1;
                batches.push(batch);
            }
            Err(e) => {
                tracing::error!("Source {} failed: {}", name, e);
                outcome.source_errors.push((name, e));
            }
        }
    }

    outcome.candidates = merge_sources(batches);
    outcome
}
