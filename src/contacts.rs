/// Procurement contact lookup for awarded companies.
///
/// Two implementations share the [`ContactLookup`] seam:
/// 1. [`DirectoryLookup`]: an in-memory CRM directory (optionally loaded from JSON)
/// 2. [`HttpContactLookup`]: a remote contact service behind a circuit breaker
///    and a 1h response cache
use async_trait::async_trait;
use moka::future::Cache;
use phonenumber::country::Id as CountryId;
use phonenumber::Mode;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::circuit_breaker::{external_breaker, ExternalBreaker};
use crate::errors::{AppError, ResultExt};
use crate::models::Contact;

#[async_trait]
pub trait ContactLookup: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Contacts for `company`; an unknown company is `Ok(vec![])`.
    async fn lookup(&self, company: &str) -> Result<Vec<Contact>, AppError>;
}

/// Validate and normalize an Indian phone number to E.164 (+919876543210).
///
/// Returns `None` when the number does not parse or is not a valid IN number.
pub fn normalize_in_phone(raw: &str) -> Option<String> {
    if raw.trim().len() < 8 {
        return None;
    }
    match phonenumber::parse(Some(CountryId::IN), raw) {
        Ok(number) if phonenumber::is_valid(&number) => {
            Some(number.format().mode(Mode::E164).to_string())
        }
        Ok(_) => {
            tracing::warn!("❌ Invalid IN phone number: {}", raw);
            None
        }
        Err(e) => {
            tracing::warn!("❌ Failed to parse IN phone '{}': {:?}", raw, e);
            None
        }
    }
}

/// Normalizes the phone of a contact; an invalid phone is dropped, the
/// contact is kept.
pub fn sanitize_contact(mut contact: Contact) -> Contact {
    contact.phone = contact.phone.as_deref().and_then(normalize_in_phone);
    contact.email = contact
        .email
        .map(|e| e.trim().to_string())
        .filter(|e| e.contains('@'));
    contact
}

const NAME_PREFIXES: &[&str] = &["m/s.", "m/s", "messrs.", "messrs"];
const NAME_SUFFIX_WORDS: &[&str] = &[
    "limited", "ltd", "ltd.", "pvt", "pvt.", "private", "public", "corporation", "corp",
    "corp.", "infrastructure", "infra", "construction", "constructions", "engineering",
    "engineers", "projects", "project", "builders", "industries", "enterprises", "company",
];

/// Matching key for a company name: lower-cased, with `M/s`, `and`/`&`,
/// single letters and generic corporate words dropped.
pub fn company_key(name: &str) -> String {
    name.to_lowercase()
        .split_whitespace()
        .filter(|word| {
            word.chars().count() > 1
                && *word != "and"
                && !NAME_PREFIXES.contains(word)
                && !NAME_SUFFIX_WORDS.contains(word)
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// One company as stored in the directory file.
#[derive(Debug, Clone, Deserialize)]
pub struct DirectoryEntry {
    pub company: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub contacts: Vec<Contact>,
}

/// Ordered maps keep partial matching independent of load order.
#[derive(Debug, Default)]
pub struct DirectoryLookup {
    /// Canonical key → contacts.
    contacts: BTreeMap<String, Vec<Contact>>,
    /// Alias key → canonical key.
    aliases: BTreeMap<String, String>,
}

impl DirectoryLookup {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<DirectoryEntry>) -> Self {
        let mut directory = Self::default();
        for entry in entries {
            let canonical = company_key(&entry.company);
            if canonical.is_empty() {
                tracing::warn!("Skipping directory entry with empty name: {}", entry.company);
                continue;
            }
            for alias in &entry.aliases {
                let alias_key = company_key(alias);
                if !alias_key.is_empty() {
                    directory.aliases.insert(alias_key, canonical.clone());
                }
            }
            directory
                .contacts
                .entry(canonical)
                .or_default()
                .extend(entry.contacts.into_iter().map(sanitize_contact));
        }
        directory
    }

    /// Loads a JSON array of [`DirectoryEntry`].
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading contact directory {}", path.display()))?;
        let entries: Vec<DirectoryEntry> = serde_json::from_str(&raw)
            .with_context(|| format!("parsing contact directory {}", path.display()))?;
        tracing::info!(
            "Contact directory loaded: {} companies from {}",
            entries.len(),
            path.display()
        );
        Ok(Self::from_entries(entries))
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    fn resolve(&self, company: &str) -> Option<&Vec<Contact>> {
        let key = company_key(company);
        if key.is_empty() {
            return None;
        }
        if let Some(found) = self.contacts.get(&key) {
            return Some(found);
        }
        if let Some(canonical) = self.aliases.get(&key) {
            return self.contacts.get(canonical);
        }
        // Partial match: "tata" finds "tata power" and the other way round.
        // The key closest in length wins; ties go to the first key in order.
        self.contacts
            .iter()
            .chain(
                self.aliases
                    .iter()
                    .filter_map(|(alias, canonical)| {
                        self.contacts.get(canonical).map(|c| (alias, c))
                    }),
            )
            .filter(|(candidate, _)| {
                candidate.len() >= 3 && (key.contains(candidate.as_str()) || candidate.contains(&key))
            })
            .min_by_key(|(candidate, _)| candidate.len().abs_diff(key.len()))
            .map(|(_, contacts)| contacts)
    }
}

#[async_trait]
impl ContactLookup for DirectoryLookup {
    fn name(&self) -> &str {
        "directory"
    }

    async fn lookup(&self, company: &str) -> Result<Vec<Contact>, AppError> {
        let found = self.resolve(company).cloned().unwrap_or_default();
        if found.is_empty() {
            tracing::debug!("No directory contacts for {}", company);
        } else {
            tracing::info!("Found {} directory contact(s) for {}", found.len(), company);
        }
        Ok(found)
    }
}

#[derive(Debug, Deserialize)]
struct ContactsResponse {
    #[serde(default)]
    contacts: Vec<Contact>,
}

/// Remote contact service: `GET {base}/contacts?company=<name>`.
pub struct HttpContactLookup {
    client: Client,
    base_url: String,
    breaker: ExternalBreaker,
    cache: Cache<String, Vec<Contact>>,
}

impl HttpContactLookup {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            AppError::ExternalApiError(format!("Failed to create contact client: {}", e))
        })?;

        let cache = Cache::builder()
            .time_to_live(Duration::from_secs(3600)) // 1 hour
            .max_capacity(10_000)
            .build();

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            breaker: external_breaker(),
            cache,
        })
    }

    async fn fetch(&self, company: &str) -> Result<Vec<Contact>, AppError> {
        let url = reqwest::Url::parse_with_params(
            &format!("{}/contacts", self.base_url),
            &[("company", company)],
        )
        .map_err(|e| AppError::ExternalApiError(format!("Failed to build URL: {}", e)))?;

        tracing::debug!("Fetching contacts: {}", url);
        let response = self.client.get(url).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::ExternalApiError(format!(
                "Contact service returned {}: {}",
                status, error_text
            )));
        }

        let body: ContactsResponse = response.json().await?;
        Ok(body.contacts.into_iter().map(sanitize_contact).collect())
    }
}

#[async_trait]
impl ContactLookup for HttpContactLookup {
    fn name(&self) -> &str {
        "http"
    }

    async fn lookup(&self, company: &str) -> Result<Vec<Contact>, AppError> {
        let cache_key = company_key(company);
        if let Some(cached) = self.cache.get(&cache_key).await {
            tracing::debug!("Contact cache HIT for {}", company);
            return Ok(cached);
        }

        let result =
            failsafe::futures::CircuitBreaker::call(&self.breaker, self.fetch(company)).await;
        match result {
            Ok(contacts) => {
                self.cache.insert(cache_key, contacts.clone()).await;
                Ok(contacts)
            }
            Err(failsafe::Error::Inner(e)) => Err(e),
            Err(failsafe::Error::Rejected) => Err(AppError::ExternalApiError(
                "contact service circuit open".to_string(),
            )),
        }
    }
}
