use std::path::PathBuf;
use std::time::Duration;

use crate::dispatcher::TeamRecipients;
use crate::enrichment::DEFAULT_ENRICH_CONCURRENCY;
use crate::models::TeamId;
use crate::retry::RetryPolicy;
use crate::scoring::{PriorityWeights, DEFAULT_MAX_LEADS};
use crate::validator::{ValidatorSettings, ValuePolicy, DEFAULT_MAX_PROJECT_AGE_DAYS};

/// A century; anything longer is a typo, not a policy.
const MAX_PROJECT_AGE_DAYS_LIMIT: i64 = 36_500;
const DEFAULT_INTERVAL_HOURS: u64 = 6;
const MAX_INTERVAL_HOURS: u64 = 24 * 30;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Period of scheduled runs in `serve` mode; `None` disables them.
    pub run_interval: Option<Duration>,
    pub validator: ValidatorSettings,
    pub max_leads: usize,
    pub priority_weights: PriorityWeights,
    pub retry: RetryPolicy,
    pub enrich_concurrency: usize,
    pub source_files: Vec<PathBuf>,
    pub source_feeds: Vec<String>,
    pub research_files: Vec<PathBuf>,
    pub contact_directory_path: Option<PathBuf>,
    pub contact_api_url: Option<String>,
    pub notify_webhook_url: Option<String>,
    pub notify_channel: String,
    pub team_recipients: TeamRecipients,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            run_interval: Some(Duration::from_secs(DEFAULT_INTERVAL_HOURS * 3600)),
            validator: ValidatorSettings::default(),
            max_leads: DEFAULT_MAX_LEADS,
            priority_weights: PriorityWeights::default(),
            retry: RetryPolicy::default(),
            enrich_concurrency: DEFAULT_ENRICH_CONCURRENCY,
            source_files: Vec::new(),
            source_feeds: Vec::new(),
            research_files: Vec::new(),
            contact_directory_path: None,
            contact_api_url: None,
            notify_webhook_url: None,
            notify_channel: "email".to_string(),
            team_recipients: TeamRecipients::new(),
        }
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: Option<String>, default: T) -> anyhow::Result<T> {
    match raw.filter(|v| !v.trim().is_empty()) {
        None => Ok(default),
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{} must be a valid number, got '{}'", key, v)),
    }
}

fn parse_list(raw: Option<String>) -> Vec<String> {
    raw.map(|v| {
        v.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

fn http_url(key: &str, url: String) -> anyhow::Result<String> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        anyhow::bail!("{} must start with http:// or https://", key);
    }
    Ok(url)
}

/// Parses `TMT_BARS=a@x.in;b@x.in,SOLAR=c@x.in`.
pub fn parse_team_recipients(raw: &str) -> anyhow::Result<TeamRecipients> {
    let mut recipients = TeamRecipients::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let Some((team, list)) = entry.split_once('=') else {
            anyhow::bail!("TEAM_RECIPIENTS entry '{}' must look like TEAM=addr;addr", entry);
        };
        let team: TeamId = team
            .parse()
            .map_err(|e| anyhow::anyhow!("TEAM_RECIPIENTS: {}", e))?;
        recipients.entry(team).or_default().extend(
            list.split(';')
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string),
        );
    }
    Ok(recipients)
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let config = Self::from_lookup(|key| std::env::var(key).ok())?;

        // Log successful configuration load (without endpoints or addresses)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!(
            "Sources: {} file(s), {} feed(s), {} research file(s)",
            config.source_files.len(),
            config.source_feeds.len(),
            config.research_files.len()
        );
        tracing::debug!(
            "Value policy: {:?}, max leads: {}, concurrency: {}",
            config.validator.value_policy,
            config.max_leads,
            config.enrich_concurrency
        );
        if config.notify_webhook_url.is_none() {
            tracing::warn!("⚠ NOTIFY_WEBHOOK_URL not set, deliveries will only be logged");
        }
        if config.team_recipients.is_empty() {
            tracing::warn!("⚠ TEAM_RECIPIENTS not set, no team will be notified");
        }
        match config.run_interval {
            Some(period) => tracing::debug!("Scheduled runs every {}h", period.as_secs() / 3600),
            None => tracing::debug!("Scheduled runs disabled"),
        }
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }

    /// Builds the configuration from any key lookup (the process environment
    /// in production, a map in tests).
    pub fn from_lookup<F>(get: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let value_policy = match get("VALUE_POLICY").filter(|v| !v.trim().is_empty()) {
            Some(v) => v
                .parse::<ValuePolicy>()
                .map_err(|e| anyhow::anyhow!("VALUE_POLICY: {}", e))?,
            None => ValuePolicy::default(),
        };
        let max_project_age_days = parse_number(
            "MAX_PROJECT_AGE_DAYS",
            get("MAX_PROJECT_AGE_DAYS"),
            DEFAULT_MAX_PROJECT_AGE_DAYS,
        )?;
        if max_project_age_days <= 0 {
            anyhow::bail!("MAX_PROJECT_AGE_DAYS must be positive");
        }
        if max_project_age_days > MAX_PROJECT_AGE_DAYS_LIMIT {
            anyhow::bail!(
                "MAX_PROJECT_AGE_DAYS must be at most {}",
                MAX_PROJECT_AGE_DAYS_LIMIT
            );
        }

        let interval_hours = parse_number(
            "PIPELINE_INTERVAL_HOURS",
            get("PIPELINE_INTERVAL_HOURS"),
            DEFAULT_INTERVAL_HOURS,
        )?;
        if interval_hours > MAX_INTERVAL_HOURS {
            anyhow::bail!("PIPELINE_INTERVAL_HOURS must be at most {}", MAX_INTERVAL_HOURS);
        }
        // 0 turns scheduled runs off
        let run_interval =
            (interval_hours > 0).then(|| Duration::from_secs(interval_hours * 3600));

        let priority_weights = match get("PRIORITY_WEIGHTS").filter(|v| !v.trim().is_empty()) {
            Some(v) => PriorityWeights::parse(&v).map_err(|e| anyhow::anyhow!("{}", e))?,
            None => defaults.priority_weights,
        };

        let max_attempts = parse_number("RETRY_MAX_ATTEMPTS", get("RETRY_MAX_ATTEMPTS"), 3u32)?;
        if max_attempts == 0 {
            anyhow::bail!("RETRY_MAX_ATTEMPTS must be at least 1");
        }
        let retry = RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(parse_number(
                "RETRY_BASE_DELAY_MS",
                get("RETRY_BASE_DELAY_MS"),
                1000u64,
            )?),
            call_timeout: Duration::from_secs(parse_number(
                "EXTERNAL_CALL_TIMEOUT_SECS",
                get("EXTERNAL_CALL_TIMEOUT_SECS"),
                30u64,
            )?),
            inter_call_delay: Duration::from_millis(parse_number(
                "EXTERNAL_CALL_DELAY_MS",
                get("EXTERNAL_CALL_DELAY_MS"),
                0u64,
            )?),
        };
        if retry.call_timeout.is_zero() {
            anyhow::bail!("EXTERNAL_CALL_TIMEOUT_SECS must be positive");
        }

        let max_leads = parse_number("PIPELINE_MAX_LEADS", get("PIPELINE_MAX_LEADS"), DEFAULT_MAX_LEADS)?;
        if max_leads == 0 {
            anyhow::bail!("PIPELINE_MAX_LEADS must be at least 1");
        }
        let enrich_concurrency = parse_number(
            "ENRICH_CONCURRENCY",
            get("ENRICH_CONCURRENCY"),
            DEFAULT_ENRICH_CONCURRENCY,
        )?;
        if enrich_concurrency == 0 {
            anyhow::bail!("ENRICH_CONCURRENCY must be at least 1");
        }

        let source_feeds = parse_list(get("SOURCE_FEEDS"))
            .into_iter()
            .map(|url| http_url("SOURCE_FEEDS", url))
            .collect::<anyhow::Result<Vec<_>>>()?;

        let contact_api_url = get("CONTACT_API_URL")
            .filter(|s| !s.trim().is_empty())
            .map(|url| http_url("CONTACT_API_URL", url))
            .transpose()?;
        let notify_webhook_url = get("NOTIFY_WEBHOOK_URL")
            .filter(|s| !s.trim().is_empty())
            .map(|url| http_url("NOTIFY_WEBHOOK_URL", url))
            .transpose()?;

        let team_recipients = match get("TEAM_RECIPIENTS") {
            Some(raw) => parse_team_recipients(&raw)?,
            None => TeamRecipients::new(),
        };

        Ok(Self {
            port: get("PORT")
                .unwrap_or_else(|| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            run_interval,
            validator: ValidatorSettings {
                value_policy,
                max_project_age_days,
            },
            max_leads,
            priority_weights,
            retry,
            enrich_concurrency,
            source_files: parse_list(get("SOURCE_FILES")).into_iter().map(PathBuf::from).collect(),
            source_feeds,
            research_files: parse_list(get("RESEARCH_FILES"))
                .into_iter()
                .map(PathBuf::from)
                .collect(),
            contact_directory_path: get("CONTACT_DIRECTORY_PATH")
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
            contact_api_url,
            notify_webhook_url,
            notify_channel: get("NOTIFY_CHANNEL")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.notify_channel),
            team_recipients,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.max_leads, 7);
        assert_eq!(config.validator.value_policy, ValuePolicy::Lenient);
        assert_eq!(config.retry, RetryPolicy::default());
        assert_eq!(config.notify_channel, "email");
        assert!(config.team_recipients.is_empty());
        assert_eq!(config.run_interval, Some(Duration::from_secs(6 * 3600)));
    }

    #[test]
    fn test_interval_zero_disables_schedule() {
        let config = Config::from_lookup(lookup(&[("PIPELINE_INTERVAL_HOURS", "0")])).unwrap();
        assert!(config.run_interval.is_none());

        let config = Config::from_lookup(lookup(&[("PIPELINE_INTERVAL_HOURS", "12")])).unwrap();
        assert_eq!(config.run_interval, Some(Duration::from_secs(12 * 3600)));

        assert!(Config::from_lookup(lookup(&[("PIPELINE_INTERVAL_HOURS", "100000")])).is_err());
    }

    #[test]
    fn test_rejects_out_of_range_project_age() {
        for raw in ["0", "-3", "36501", "9223372036854775807"] {
            assert!(
                Config::from_lookup(lookup(&[("MAX_PROJECT_AGE_DAYS", raw)])).is_err(),
                "accepted {}",
                raw
            );
        }
        let config = Config::from_lookup(lookup(&[("MAX_PROJECT_AGE_DAYS", "36500")])).unwrap();
        assert_eq!(config.validator.max_project_age_days, 36_500);
    }

    #[test]
    fn test_full_configuration() {
        let config = Config::from_lookup(lookup(&[
            ("VALUE_POLICY", "strict"),
            ("PRIORITY_WEIGHTS", "value=0.25,steel=0.25,timeline=0.25,recency=0.25"),
            ("RETRY_BASE_DELAY_MS", "10"),
            ("SOURCE_FILES", "data/a.json, data/b.json"),
            ("SOURCE_FEEDS", "https://feeds.example.in/awards"),
            ("TEAM_RECIPIENTS", "TMT_BARS=a@x.in;b@x.in,solar=c@x.in"),
        ]))
        .unwrap();

        assert_eq!(config.validator.value_policy, ValuePolicy::Strict);
        assert_eq!(config.priority_weights.value(), 0.25);
        assert_eq!(config.retry.base_delay, Duration::from_millis(10));
        assert_eq!(config.source_files.len(), 2);
        assert_eq!(config.team_recipients[&TeamId::TmtBars].len(), 2);
        assert_eq!(config.team_recipients[&TeamId::Solar], vec!["c@x.in".to_string()]);
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(Config::from_lookup(lookup(&[("PRIORITY_WEIGHTS", "value=0.9")])).is_err());
        assert!(Config::from_lookup(lookup(&[("VALUE_POLICY", "sometimes")])).is_err());
        assert!(Config::from_lookup(lookup(&[("SOURCE_FEEDS", "ftp://x")])).is_err());
        assert!(Config::from_lookup(lookup(&[("TEAM_RECIPIENTS", "STEEL=a@x.in")])).is_err());
        assert!(Config::from_lookup(lookup(&[("ENRICH_CONCURRENCY", "0")])).is_err());
    }
}
