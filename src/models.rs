use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::extractor;

/// Steel quantities are never reported below this many metric tons.
pub const MIN_STEEL_QUANTITY: u32 = 100;
/// Steel quantities are rounded to the nearest multiple of this.
pub const STEEL_ROUNDING: f64 = 100.0;
/// Descriptions are truncated to this many characters.
pub const MAX_DESCRIPTION_CHARS: usize = 2000;
/// Start date used when nothing could be parsed: now + this many days.
pub const DEFAULT_START_OFFSET_DAYS: i64 = 30;
/// Project duration assumed when no end date or duration is known.
pub const DEFAULT_DURATION_DAYS: i64 = 365;

// ============ Enumerations ============

/// Where a candidate lead came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LeadSource {
    /// News / announcement scraping.
    #[default]
    Scrape,
    /// AI-assisted research responses.
    AiResearch,
    /// Web search snippets.
    Search,
}

impl LeadSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadSource::Scrape => "scrape",
            LeadSource::AiResearch => "ai_research",
            LeadSource::Search => "search",
        }
    }
}

/// Downstream sales team identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TeamId {
    TmtBars,
    HrCrPlates,
    CoatedProducts,
    Hsla,
    Solar,
    WireRods,
}

impl TeamId {
    pub const ALL: [TeamId; 6] = [
        TeamId::TmtBars,
        TeamId::HrCrPlates,
        TeamId::CoatedProducts,
        TeamId::Hsla,
        TeamId::Solar,
        TeamId::WireRods,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TeamId::TmtBars => "TMT_BARS",
            TeamId::HrCrPlates => "HR_CR_PLATES",
            TeamId::CoatedProducts => "COATED_PRODUCTS",
            TeamId::Hsla => "HSLA",
            TeamId::Solar => "SOLAR",
            TeamId::WireRods => "WIRE_RODS",
        }
    }

    /// Human-facing label ("TMT BARS").
    pub fn label(&self) -> String {
        self.as_str().replace('_', " ")
    }
}

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TeamId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase().replace([' ', '-'], "_");
        TeamId::ALL
            .into_iter()
            .find(|team| team.as_str() == wanted)
            .ok_or_else(|| format!("unknown team id '{}'", s))
    }
}

/// Project category inferred by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProjectType {
    MetroRail,
    RoadBridge,
    Building,
    Industrial,
    Energy,
    Water,
    Defense,
    Marine,
    #[default]
    Infrastructure,
}

impl ProjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectType::MetroRail => "metro_rail",
            ProjectType::RoadBridge => "road_bridge",
            ProjectType::Building => "building",
            ProjectType::Industrial => "industrial",
            ProjectType::Energy => "energy",
            ProjectType::Water => "water",
            ProjectType::Defense => "defense",
            ProjectType::Marine => "marine",
            ProjectType::Infrastructure => "infrastructure",
        }
    }
}

impl fmt::Display for ProjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============ Steel requirements ============

/// One steel product line and its quantity in MT.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
    #[serde(rename = "type")]
    pub product_type: String,
    pub quantity: u32,
}

impl Requirement {
    /// Rounds `tons` to the nearest hundred and floors it at the minimum.
    pub fn from_tons(product_type: impl Into<String>, tons: f64) -> Self {
        Self {
            product_type: product_type.into(),
            quantity: round_tons(tons),
        }
    }
}

/// Rounds a raw tonnage to the reporting grid, never below the floor.
pub fn round_tons(tons: f64) -> u32 {
    if !tons.is_finite() || tons <= 0.0 {
        return MIN_STEEL_QUANTITY;
    }
    let rounded = (tons / STEEL_ROUNDING).round() * STEEL_ROUNDING;
    if rounded >= u32::MAX as f64 {
        return u32::MAX - (u32::MAX % STEEL_ROUNDING as u32);
    }
    (rounded as u32).max(MIN_STEEL_QUANTITY)
}

/// Primary / secondary / tertiary product breakdown of a lead.
///
/// Fields are private so `total` can only be produced by [`SteelRequirements::new`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SteelRequirements {
    primary: Requirement,
    secondary: Vec<Requirement>,
    tertiary: Option<Requirement>,
    total: u32,
}

impl SteelRequirements {
    pub fn new(
        primary: Requirement,
        secondary: Vec<Requirement>,
        tertiary: Option<Requirement>,
    ) -> Self {
        let total = std::iter::once(&primary)
            .chain(secondary.iter())
            .chain(tertiary.iter())
            .map(|r| r.quantity)
            .fold(0u32, u32::saturating_add);
        Self {
            primary,
            secondary,
            tertiary,
            total,
        }
    }

    /// Builds stated requirements from explicit `<n> MT of <product>` mentions.
    ///
    /// Largest mention is primary; with three or more, the smallest becomes
    /// tertiary and the rest are secondary. Returns `None` without mentions.
    pub fn from_mentions(mentions: &[extractor::SteelMention]) -> Option<Self> {
        let mut merged: Vec<(String, f64)> = Vec::new();
        for mention in mentions {
            match merged.iter_mut().find(|(p, _)| *p == mention.product) {
                Some((_, tons)) => *tons = tons.max(mention.tons),
                None => merged.push((mention.product.to_string(), mention.tons)),
            }
        }
        if merged.is_empty() {
            return None;
        }
        merged.sort_by(|a, b| b.1.total_cmp(&a.1));

        let mut lines = merged
            .into_iter()
            .map(|(product, tons)| Requirement::from_tons(product, tons));
        let primary = lines.next()?;
        let mut rest: Vec<Requirement> = lines.collect();
        let tertiary = if rest.len() >= 2 { rest.pop() } else { None };
        Some(Self::new(primary, rest, tertiary))
    }

    pub fn primary(&self) -> &Requirement {
        &self.primary
    }

    pub fn secondary(&self) -> &[Requirement] {
        &self.secondary
    }

    pub fn tertiary(&self) -> Option<&Requirement> {
        self.tertiary.as_ref()
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    /// All requirement lines, primary first.
    pub fn lines(&self) -> impl Iterator<Item = &Requirement> {
        std::iter::once(&self.primary)
            .chain(self.secondary.iter())
            .chain(self.tertiary.iter())
    }
}

impl Default for SteelRequirements {
    fn default() -> Self {
        Self::new(Requirement::from_tons("TMT Bars", 0.0), Vec::new(), None)
    }
}

// ============ Physical specs & contacts ============

/// Optional physical size hints extracted from text.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ProjectSpecs {
    pub length_km: Option<f64>,
    pub area_sqft: Option<f64>,
    pub capacity_mw: Option<f64>,
    pub floors: Option<u32>,
}

impl ProjectSpecs {
    pub fn is_empty(&self) -> bool {
        self.length_km.is_none()
            && self.area_sqft.is_none()
            && self.capacity_mw.is_none()
            && self.floors.is_none()
    }
}

/// Procurement contact attached after enrichment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub name: String,
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

// ============ Candidates & leads ============

/// A raw record as yielded by a source adapter, before validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawCandidate {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, alias = "url", alias = "link")]
    pub source_url: String,
    #[serde(default, alias = "source_tag")]
    pub source: LeadSource,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default, alias = "news_date")]
    pub discovered_at: Option<DateTime<Utc>>,
}

impl RawCandidate {
    /// Title and description joined, the text every extraction runs over.
    pub fn text(&self) -> String {
        format!("{} {}", self.title, self.description)
    }
}

/// The central entity: one candidate contract opportunity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub title: String,
    pub original_title: String,
    pub description: String,
    pub company: String,
    pub source_url: String,
    pub source: LeadSource,
    /// Contract value in crore; 0 means unknown.
    pub value: f64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub discovered_at: DateTime<Utc>,
    pub project_type: ProjectType,
    pub teams: BTreeSet<TeamId>,
    pub specs: ProjectSpecs,
    pub steel_requirements: SteelRequirements,
    #[serde(default)]
    pub contacts: Vec<Contact>,
}

impl Lead {
    /// Builds a fully-defaulted lead from one bare text blob.
    pub fn from_text(
        text: &str,
        source_url: impl Into<String>,
        source: LeadSource,
        now: DateTime<Utc>,
    ) -> Self {
        let title = first_sentence(text);
        let dates = extractor::extract_dates(text);
        let (start_date, end_date) =
            resolve_dates(dates.start, dates.end, dates.duration_days, now.date_naive());

        Self {
            original_title: title.clone(),
            title,
            description: truncate_chars(text.trim(), MAX_DESCRIPTION_CHARS),
            company: extractor::extract_company(text).unwrap_or_default(),
            source_url: source_url.into(),
            source,
            value: extractor::extract_value(text).unwrap_or(0.0),
            start_date,
            end_date,
            discovered_at: now,
            project_type: ProjectType::default(),
            teams: default_teams(),
            specs: extractor::extract_specs(text),
            steel_requirements: SteelRequirements::default(),
            contacts: Vec::new(),
        }
    }

    /// Title plus description, the text classification runs over.
    pub fn text(&self) -> String {
        format!("{} {}", self.original_title, self.description)
    }

    /// Normalized title used as the batch identity key.
    pub fn normalized_title(&self) -> String {
        normalize_title(&self.original_title)
    }

    /// Stable hex fingerprint of the normalized title.
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.normalized_title())
    }

    /// Whole days from `today` until the project starts (negative if started).
    pub fn days_until_start(&self, today: NaiveDate) -> i64 {
        (self.start_date - today).num_days()
    }
}

pub fn default_teams() -> BTreeSet<TeamId> {
    BTreeSet::from([TeamId::TmtBars])
}

/// Collapses whitespace and case-folds a title.
pub fn normalize_title(title: &str) -> String {
    title
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

pub fn fingerprint(normalized: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hex::encode(hasher.finalize())
}

/// Truncates on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

fn first_sentence(text: &str) -> String {
    let trimmed = text.trim();
    let end = trimmed
        .find(". ")
        .or_else(|| trimmed.find('\n'))
        .unwrap_or(trimmed.len());
    let sentence = trimmed[..end].trim_end_matches('.').trim();
    truncate_chars(sentence, 200)
}

/// Applies the date defaults and the `end > start` invariant.
///
/// Missing start → `today + 30d`; missing end → `start + duration` or
/// `start + 365d`; an end on or before the start is clamped to `start + 365d`.
pub fn resolve_dates(
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    duration_days: Option<i64>,
    today: NaiveDate,
) -> (NaiveDate, NaiveDate) {
    let start = start.unwrap_or(today + Duration::days(DEFAULT_START_OFFSET_DAYS));
    let derived_end = || {
        let days = duration_days
            .filter(|d| *d > 0)
            .unwrap_or(DEFAULT_DURATION_DAYS);
        start + Duration::days(days)
    };
    let end = match end {
        Some(end) if end > start => end,
        Some(_) => start + Duration::days(DEFAULT_DURATION_DAYS),
        None => derived_end(),
    };
    (start, end)
}

/// Per-team notification payload built by the dispatcher.
#[derive(Debug, Clone, Serialize)]
pub struct TeamPayload {
    pub team: TeamId,
    pub leads: Vec<crate::scoring::PrioritizedLead>,
    pub total_value: f64,
    pub total_steel: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_round_tons_floor_and_grid() {
        assert_eq!(round_tons(0.0), 100);
        assert_eq!(round_tons(-5.0), 100);
        assert_eq!(round_tons(49.0), 100);
        assert_eq!(round_tons(1592.5), 1600);
        assert_eq!(round_tons(1549.0), 1500);
        assert_eq!(round_tons(f64::NAN), 100);
    }

    #[test]
    fn test_total_is_sum_of_lines() {
        let steel = SteelRequirements::new(
            Requirement::from_tons("TMT Bars", 1600.0),
            vec![
                Requirement::from_tons("Hot Rolled Plates", 546.0),
                Requirement::from_tons("Galvanized Steel", 10.0),
            ],
            Some(Requirement::from_tons("Wire Rods", 136.5)),
        );
        assert_eq!(steel.total(), 1600 + 500 + 100 + 100);
        assert_eq!(steel.lines().count(), 4);
    }

    #[test]
    fn test_from_mentions_orders_by_quantity() {
        let mentions = vec![
            extractor::SteelMention { product: "Hot Rolled Plates", tons: 2000.0 },
            extractor::SteelMention { product: "TMT Bars", tons: 12000.0 },
            extractor::SteelMention { product: "Wire Rods", tons: 300.0 },
        ];
        let steel = SteelRequirements::from_mentions(&mentions).unwrap();
        assert_eq!(steel.primary().product_type, "TMT Bars");
        assert_eq!(steel.secondary().len(), 1);
        assert_eq!(steel.tertiary().unwrap().product_type, "Wire Rods");
        assert_eq!(steel.total(), 14300);
        assert!(SteelRequirements::from_mentions(&[]).is_none());
    }

    #[test]
    fn test_team_id_parsing() {
        assert_eq!("TMT_BARS".parse::<TeamId>().unwrap(), TeamId::TmtBars);
        assert_eq!("hr cr plates".parse::<TeamId>().unwrap(), TeamId::HrCrPlates);
        assert!("STAINLESS".parse::<TeamId>().is_err());
        assert_eq!(TeamId::CoatedProducts.label(), "COATED PRODUCTS");
    }

    #[test]
    fn test_normalize_title_collapses_whitespace_and_case() {
        assert_eq!(
            normalize_title("  ABC Ltd wins   X\tProject "),
            normalize_title("abc ltd   wins   x project")
        );
    }

    #[test]
    fn test_resolve_dates_defaults_and_clamps() {
        let today = date(2024, 1, 1);
        assert_eq!(
            resolve_dates(None, None, None, today),
            (date(2024, 1, 31), date(2025, 1, 30))
        );
        assert_eq!(
            resolve_dates(Some(date(2024, 6, 1)), Some(date(2024, 5, 1)), None, today),
            (date(2024, 6, 1), date(2025, 6, 1))
        );
        assert_eq!(
            resolve_dates(Some(date(2024, 6, 1)), None, Some(90), today),
            (date(2024, 6, 1), date(2024, 8, 30))
        );
    }

    #[test]
    fn test_from_text_is_fully_defaulted() {
        let now = Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap();
        let lead = Lead::from_text("", "https://example.com/a", LeadSource::Search, now);
        assert_eq!(lead.value, 0.0);
        assert!(lead.end_date > lead.start_date);
        assert_eq!(lead.teams, default_teams());
        assert_eq!(lead.project_type, ProjectType::Infrastructure);
        assert_eq!(lead.steel_requirements.total(), MIN_STEEL_QUANTITY);
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("₹₹₹₹", 2), "₹₹");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}
