/// Candidate gating, normalisation and title de-duplication.
///
/// The validator is pure: it never performs I/O and reads the clock only
/// through the `now` frozen at construction, so validating its own output
/// again yields the same leads.
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::str::FromStr;
use url::Url;

use crate::errors::AppError;
use crate::extractor;
use crate::models::{
    default_teams, resolve_dates, truncate_chars, Lead, ProjectType,
    RawCandidate, SteelRequirements, MAX_DESCRIPTION_CHARS,
};

/// Hosts that never carry a project announcement worth following.
pub const EXCLUDED_HOSTS: &[&str] = &[
    "facebook.com",
    "twitter.com",
    "x.com",
    "instagram.com",
    "linkedin.com",
    "youtube.com",
];

const TITLE_PLACEHOLDERS: &[&str] = &["404", "error", "not found", "page not found"];
const MIN_TITLE_CHARS: usize = 5;
const MIN_COMPANY_CHARS: usize = 3;

/// Default age limit for a candidate without relevance keywords.
pub const DEFAULT_MAX_PROJECT_AGE_DAYS: i64 = 45;

/// What to do with a candidate that has no positive contract value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValuePolicy {
    /// Reject it.
    Strict,
    /// Keep it with `value = 0`.
    #[default]
    Lenient,
}

impl FromStr for ValuePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(ValuePolicy::Strict),
            "lenient" => Ok(ValuePolicy::Lenient),
            other => Err(format!("unknown value policy '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatorSettings {
    pub value_policy: ValuePolicy,
    pub max_project_age_days: i64,
}

impl Default for ValidatorSettings {
    fn default() -> Self {
        Self {
            value_policy: ValuePolicy::Lenient,
            max_project_age_days: DEFAULT_MAX_PROJECT_AGE_DAYS,
        }
    }
}

/// A dropped candidate and why.
#[derive(Debug, Clone)]
pub struct Rejection {
    pub title: String,
    pub source_url: String,
    pub reason: AppError,
}

#[derive(Debug, Clone, Default)]
pub struct ValidationOutcome {
    pub leads: Vec<Lead>,
    pub rejected: Vec<Rejection>,
}

pub struct Validator {
    settings: ValidatorSettings,
    now: DateTime<Utc>,
}

fn reject(msg: impl Into<String>) -> AppError {
    AppError::ValidationReject(msg.into())
}

impl Validator {
    pub fn new(settings: ValidatorSettings, now: DateTime<Utc>) -> Self {
        Self { settings, now }
    }

    /// Validates every candidate and keeps the first of each normalized title.
    pub fn validate_batch(&self, candidates: Vec<RawCandidate>) -> ValidationOutcome {
        let mut outcome = ValidationOutcome::default();
        let mut seen_titles: HashSet<String> = HashSet::new();

        for candidate in candidates {
            match self.validate_one(&candidate) {
                Ok(lead) => {
                    if seen_titles.insert(lead.normalized_title()) {
                        outcome.leads.push(lead);
                    } else {
                        tracing::debug!("Duplicate title dropped: {}", lead.title);
                        outcome.rejected.push(Rejection {
                            title: candidate.title,
                            source_url: candidate.source_url,
                            reason: reject("duplicate title"),
                        });
                    }
                }
                Err(reason) => {
                    tracing::warn!("Dropped '{}': {}", candidate.title, reason);
                    outcome.rejected.push(Rejection {
                        title: candidate.title,
                        source_url: candidate.source_url,
                        reason,
                    });
                }
            }
        }

        tracing::info!(
            "Validation kept {} lead(s), rejected {}",
            outcome.leads.len(),
            outcome.rejected.len()
        );
        outcome
    }

    /// Applies every gate to one candidate and builds the normalized lead.
    pub fn validate_one(&self, candidate: &RawCandidate) -> Result<Lead, AppError> {
        check_url(&candidate.source_url)?;

        let title = candidate.title.split_whitespace().collect::<Vec<_>>().join(" ");
        check_title(&title)?;

        let description = truncate_chars(candidate.description.trim(), MAX_DESCRIPTION_CHARS);
        let text = format!("{} {}", title, description);

        let company = match candidate.company.as_deref().map(str::trim) {
            Some(provided) if !provided.is_empty() => provided.to_string(),
            _ => extractor::extract_company(&text).unwrap_or_default(),
        };
        if company.chars().count() < MIN_COMPANY_CHARS {
            return Err(reject("no company name"));
        }

        let value = candidate
            .value
            .filter(|v| v.is_finite() && *v > 0.0)
            .or_else(|| extractor::extract_value(&text));
        let value = match (value, self.settings.value_policy) {
            (Some(value), _) => value,
            (None, ValuePolicy::Lenient) => 0.0,
            (None, ValuePolicy::Strict) => return Err(reject("no contract value")),
        };

        let discovered_at = candidate.discovered_at.unwrap_or(self.now);
        let age = self.now - discovered_at;
        // An age limit too large for chrono means no limit
        let stale = Duration::try_days(self.settings.max_project_age_days)
            .is_some_and(|limit| age > limit);
        if stale && !extractor::has_relevance_keyword(&text)
        {
            return Err(reject(format!(
                "announcement is {} days old",
                age.num_days()
            )));
        }

        let extracted = extractor::extract_dates(&text);
        let start = candidate
            .start_date
            .as_deref()
            .and_then(extractor::parse_date)
            .or(extracted.start);
        let end = candidate
            .end_date
            .as_deref()
            .and_then(extractor::parse_date)
            .or(extracted.end);
        let (start_date, end_date) =
            resolve_dates(start, end, extracted.duration_days, self.now.date_naive());

        Ok(Lead {
            original_title: title.clone(),
            title,
            specs: extractor::extract_specs(&text),
            description,
            company,
            source_url: candidate.source_url.trim().to_string(),
            source: candidate.source,
            value,
            start_date,
            end_date,
            discovered_at,
            project_type: ProjectType::default(),
            teams: default_teams(),
            steel_requirements: SteelRequirements::default(),
            contacts: Vec::new(),
        })
    }
}

/// Source URL gate: http(s), not social media, not a PDF.
pub fn check_url(raw: &str) -> Result<(), AppError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(reject("missing source url"));
    }
    let url = Url::parse(raw).map_err(|e| reject(format!("unparseable url: {}", e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(reject(format!("unsupported scheme '{}'", url.scheme())));
    }
    let host = url.host_str().unwrap_or_default().to_lowercase();
    if EXCLUDED_HOSTS
        .iter()
        .any(|excluded| host == *excluded || host.ends_with(&format!(".{}", excluded)))
    {
        return Err(reject(format!("excluded host '{}'", host)));
    }
    if url.path().to_lowercase().ends_with(".pdf") {
        return Err(reject("pdf documents are not followed"));
    }
    Ok(())
}

fn check_title(title: &str) -> Result<(), AppError> {
    if title.chars().count() < MIN_TITLE_CHARS {
        return Err(reject("title too short"));
    }
    let lowered = title.to_lowercase();
    if let Some(marker) = TITLE_PLACEHOLDERS.iter().find(|m| lowered.contains(*m)) {
        return Err(reject(format!("placeholder title ({})", marker)));
    }
    Ok(())
}

impl From<&Lead> for RawCandidate {
    fn from(lead: &Lead) -> Self {
        Self {
            title: lead.original_title.clone(),
            description: lead.description.clone(),
            source_url: lead.source_url.clone(),
            source: lead.source,
            company: Some(lead.company.clone()),
            value: (lead.value > 0.0).then_some(lead.value),
            start_date: Some(lead.start_date.to_string()),
            end_date: Some(lead.end_date.to_string()),
            discovered_at: Some(lead.discovered_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LeadSource;
    use chrono::{NaiveDate, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 6, 0, 0).unwrap()
    }

    fn candidate(title: &str, url: &str) -> RawCandidate {
        RawCandidate {
            title: title.to_string(),
            description: "Order worth Rs 120 crore for a new flyover".to_string(),
            source_url: url.to_string(),
            source: LeadSource::Scrape,
            company: Some("Dilip Buildcon".to_string()),
            ..Default::default()
        }
    }

    fn validator(policy: ValuePolicy) -> Validator {
        Validator::new(
            ValidatorSettings {
                value_policy: policy,
                ..Default::default()
            },
            now(),
        )
    }

    #[test]
    fn test_url_gate() {
        assert!(check_url("https://news.example.in/story").is_ok());
        assert!(check_url("ftp://example.com/a").is_err());
        assert!(check_url("https://m.facebook.com/post/1").is_err());
        assert!(check_url("https://x.com/status/1").is_err());
        assert!(check_url("https://example.com/tender.PDF").is_err());
        assert!(check_url("not a url").is_err());
        assert!(check_url("").is_err());
    }

    #[test]
    fn test_title_placeholders() {
        let v = validator(ValuePolicy::Lenient);
        let err = v
            .validate_one(&candidate("404 Page Not Found", "https://a.in/1"))
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationReject(_)));
        assert!(v.validate_one(&candidate("Road", "https://a.in/1")).is_err());
    }

    #[test]
    fn test_company_from_text_when_missing() {
        let v = validator(ValuePolicy::Lenient);
        let mut c = candidate("KEC International bags Rs 1,100 crore orders", "https://a.in/2");
        c.company = None;
        c.description = "Transmission line orders across India".to_string();
        let lead = v.validate_one(&c).unwrap();
        assert_eq!(lead.company, "KEC International");
        assert_eq!(lead.value, 1100.0);
    }

    #[test]
    fn test_value_policy() {
        let mut c = candidate("Dilip Buildcon wins flyover", "https://a.in/3");
        c.description = String::new();
        assert_eq!(validator(ValuePolicy::Lenient).validate_one(&c).unwrap().value, 0.0);
        assert!(validator(ValuePolicy::Strict).validate_one(&c).is_err());

        c.value = Some(-4.0);
        assert_eq!(validator(ValuePolicy::Lenient).validate_one(&c).unwrap().value, 0.0);
    }

    #[test]
    fn test_dates_default_and_clamp() {
        let v = validator(ValuePolicy::Lenient);
        let mut c = candidate("Dilip Buildcon wins flyover", "https://a.in/4");
        let lead = v.validate_one(&c).unwrap();
        assert_eq!(lead.start_date, NaiveDate::from_ymd_opt(2024, 2, 14).unwrap());
        assert_eq!(lead.end_date, NaiveDate::from_ymd_opt(2025, 2, 13).unwrap());

        c.start_date = Some("2024-06-01".to_string());
        c.end_date = Some("01/01/2024".to_string());
        let clamped = v.validate_one(&c).unwrap();
        assert_eq!(clamped.end_date, NaiveDate::from_ymd_opt(2025, 6, 1).unwrap());
    }

    #[test]
    fn test_stale_without_relevance_keyword() {
        let v = validator(ValuePolicy::Lenient);
        let mut c = candidate("Dilip Buildcon flyover progress update", "https://a.in/5");
        c.description = "Work continues on the flyover".to_string();
        c.discovered_at = Some(now() - Duration::days(60));
        assert!(v.validate_one(&c).is_err());

        c.description = "Contract awarded last quarter".to_string();
        assert!(v.validate_one(&c).is_ok());
    }

    #[test]
    fn test_unbounded_age_limit_keeps_old_announcements() {
        let v = Validator::new(
            ValidatorSettings {
                max_project_age_days: i64::MAX,
                ..Default::default()
            },
            now(),
        );
        let mut c = candidate("Dilip Buildcon flyover progress update", "https://a.in/8");
        c.description = "Work continues on the flyover".to_string();
        c.discovered_at = Some(now() - Duration::days(60));
        assert!(v.validate_one(&c).is_ok());
    }

    #[test]
    fn test_title_dedup_keeps_first() {
        let v = validator(ValuePolicy::Lenient);
        let outcome = v.validate_batch(vec![
            candidate("ABC Ltd wins X Project", "https://a.in/6"),
            candidate("abc ltd   wins   x project", "https://a.in/7"),
        ]);
        assert_eq!(outcome.leads.len(), 1);
        assert_eq!(outcome.leads[0].source_url, "https://a.in/6");
        assert_eq!(outcome.rejected.len(), 1);
    }
}
