/// Priority scoring, tagging and ranking.
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::errors::AppError;
use crate::models::Lead;

pub const TAG_URGENT: &str = "Urgent Priority";
pub const TAG_HIGH: &str = "High Priority";
pub const TAG_NORMAL: &str = "Normal Priority";
pub const TAG_MAJOR_PROJECT: &str = "Major Project";
pub const TAG_LARGE_PROJECT: &str = "Large Project";
pub const TAG_HIGH_STEEL: &str = "High Steel Requirement";

/// Default number of leads kept per run.
pub const DEFAULT_MAX_LEADS: usize = 7;

const WEIGHT_TOLERANCE: f64 = 1e-6;

/// Weights of the four score factors. Always sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PriorityWeights {
    value: f64,
    steel: f64,
    timeline: f64,
    recency: f64,
}

impl PriorityWeights {
    pub fn new(value: f64, steel: f64, timeline: f64, recency: f64) -> Result<Self, AppError> {
        let all = [value, steel, timeline, recency];
        if all.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(AppError::Config(format!(
                "priority weights must be non-negative, got {:?}",
                all
            )));
        }
        let sum: f64 = all.iter().sum();
        if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(AppError::Config(format!(
                "priority weights must sum to 1.0, got {}",
                sum
            )));
        }
        Ok(Self {
            value,
            steel,
            timeline,
            recency,
        })
    }

    /// Parses `value=0.3,steel=0.2,timeline=0.35,recency=0.15`.
    /// Keys left out keep their default.
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        let defaults = Self::default();
        let (mut value, mut steel, mut timeline, mut recency) =
            (defaults.value, defaults.steel, defaults.timeline, defaults.recency);

        for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, weight) = pair
                .split_once('=')
                .ok_or_else(|| AppError::Config(format!("malformed weight '{}'", pair)))?;
            let weight: f64 = weight
                .trim()
                .parse()
                .map_err(|_| AppError::Config(format!("weight '{}' is not a number", pair)))?;
            match key.trim().to_ascii_lowercase().as_str() {
                "value" => value = weight,
                "steel" => steel = weight,
                "timeline" => timeline = weight,
                "recency" => recency = weight,
                other => {
                    return Err(AppError::Config(format!("unknown weight '{}'", other)));
                }
            }
        }
        Self::new(value, steel, timeline, recency)
    }

    pub fn value(&self) -> f64 {
        self.value
    }
    pub fn steel(&self) -> f64 {
        self.steel
    }
    pub fn timeline(&self) -> f64 {
        self.timeline
    }
    pub fn recency(&self) -> f64 {
        self.recency
    }
}

impl Default for PriorityWeights {
    fn default() -> Self {
        Self {
            value: 0.30,
            steel: 0.20,
            timeline: 0.35,
            recency: 0.15,
        }
    }
}

/// A lead with its score. Only [`PriorityScorer`] builds these.
#[derive(Debug, Clone, Serialize)]
pub struct PrioritizedLead {
    #[serde(flatten)]
    lead: Lead,
    priority_score: f64,
    tags: Vec<String>,
}

impl PrioritizedLead {
    pub fn lead(&self) -> &Lead {
        &self.lead
    }

    pub fn priority_score(&self) -> f64 {
        self.priority_score
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Back to a plain lead; the score does not survive.
    pub fn into_lead(self) -> Lead {
        self.lead
    }
}

/// Individual factor values, exposed for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Factors {
    pub value: f64,
    pub steel: f64,
    pub timeline: f64,
    pub recency: f64,
}

pub struct PriorityScorer {
    weights: PriorityWeights,
    now: DateTime<Utc>,
    max_leads: usize,
}

impl PriorityScorer {
    pub fn new(weights: PriorityWeights, now: DateTime<Utc>) -> Self {
        Self {
            weights,
            now,
            max_leads: DEFAULT_MAX_LEADS,
        }
    }

    pub fn with_max_leads(mut self, max_leads: usize) -> Self {
        self.max_leads = max_leads;
        self
    }

    pub fn factors(&self, lead: &Lead) -> Factors {
        let today = self.now.date_naive();

        let value = (lead.value.max(0.0) / 1000.0).min(1.0);
        let steel = (f64::from(lead.steel_requirements.total()) / 10_000.0).min(1.0);

        let days_until_start = lead.days_until_start(today);
        let months_to_start = (days_until_start as f64 / 30.0).max(1.0);
        let timeline = 1.0 / (1.0 + months_to_start / 12.0);

        let age_days = (self.now - lead.discovered_at).num_days();
        let recency = if age_days < 30 {
            1.0
        } else if age_days < 90 {
            0.8
        } else if age_days < 180 {
            0.6
        } else {
            0.4
        };

        Factors {
            value,
            steel,
            timeline,
            recency,
        }
    }

    pub fn score(&self, lead: &Lead) -> f64 {
        let f = self.factors(lead);
        let w = &self.weights;
        let score = w.value * f.value
            + w.steel * f.steel
            + w.timeline * f.timeline
            + w.recency * f.recency;
        score.clamp(0.0, 1.0)
    }

    pub fn tags(&self, lead: &Lead) -> Vec<String> {
        let days_until_start = lead.days_until_start(self.now.date_naive());
        let urgency = if days_until_start <= 90 {
            TAG_URGENT
        } else if days_until_start <= 180 {
            TAG_HIGH
        } else {
            TAG_NORMAL
        };

        let mut tags = vec![urgency.to_string()];
        if lead.value >= 1000.0 {
            tags.push(TAG_MAJOR_PROJECT.to_string());
        } else if lead.value >= 500.0 {
            tags.push(TAG_LARGE_PROJECT.to_string());
        }
        if lead.steel_requirements.total() >= 10_000 {
            tags.push(TAG_HIGH_STEEL.to_string());
        }
        tags
    }

    pub fn prioritize_one(&self, lead: Lead) -> PrioritizedLead {
        PrioritizedLead {
            priority_score: self.score(&lead),
            tags: self.tags(&lead),
            lead,
        }
    }

    /// Scores every lead, sorts by (score, value, total steel) descending and
    /// keeps the top `max_leads`.
    pub fn prioritize(&self, leads: Vec<Lead>) -> Vec<PrioritizedLead> {
        let mut scored: Vec<PrioritizedLead> =
            leads.into_iter().map(|lead| self.prioritize_one(lead)).collect();

        scored.sort_by(|a, b| {
            b.priority_score
                .total_cmp(&a.priority_score)
                .then_with(|| b.lead.value.total_cmp(&a.lead.value))
                .then_with(|| {
                    b.lead
                        .steel_requirements
                        .total()
                        .cmp(&a.lead.steel_requirements.total())
                })
        });

        if scored.len() > self.max_leads {
            tracing::info!(
                "Keeping top {} of {} scored leads",
                self.max_leads,
                scored.len()
            );
            scored.truncate(self.max_leads);
        }
        scored
    }
}
