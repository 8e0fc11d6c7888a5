/// Rule-table extraction of structured fields from free text.
///
/// Every rule family is an ordered `(name, pattern)` table compiled once.
/// Rules are tried in table order; the first candidate that survives
/// clean-up and range checks wins and scanning stops. All functions are
/// total: arbitrary input yields `None` / empty, never a panic.
use chrono::NaiveDate;
use regex::Regex;
use std::sync::OnceLock;

use crate::models::ProjectSpecs;

/// `(rule name, regex pattern)`.
pub type Rule = (&'static str, &'static str);
type CompiledRule = (&'static str, Regex);

/// Company rules, tried in order. Group 1 is the candidate name.
pub const COMPANY_RULES: &[Rule] = &[
    (
        "legal_suffix",
        r"((?:(?:[A-Z][\w&.'-]*|&|and)\s+){1,5}(?:Private\s+Limited|Pvt\.?\s*Ltd|Limited|Ltd|Corporation|Corp)\b\.?)",
    ),
    (
        "joint_venture",
        r"([A-Z][\w&.']*(?:\s+[A-Z][\w&.']*){0,3}\s*-\s*[A-Z][\w&.']*(?:\s+[A-Z][\w&.']*){0,3}?\s+(?:JV|Consortium|Joint\s+Venture))",
    ),
    (
        "award_verb",
        r"((?:[A-Z][\w&.'-]*|&|and)(?:\s+(?:[A-Z][\w&.'-]*|&|and)){0,6})\s+(?i:has\s+been\s+awarded|has\s+won|wins|won|bags|bagged|secures|secured|emerges|selected\s+for)\b",
    ),
    (
        "awarded_to",
        r"(?i:awarded\s+to|bagged\s+by|won\s+by|secured\s+by)\s+(?:M/s\.?\s+)?((?:[A-Z][\w&.'-]*|&|and)(?:\s+(?:[A-Z][\w&.'-]*|&|and)){0,6})",
    ),
    ("acronym", r"\b([A-Z]{2,}(?:&[A-Z]+)?)\b"),
];

/// Value rules in crore, tried in order. Group 1 is the number.
pub const VALUE_RULES: &[Rule] = &[
    (
        "contract_value_of",
        r"(?i)contract\s+value\s+of\s+(?:about\s+|around\s+)?(?:rs\.?\s*|inr\s*|₹\s*)?([0-9][0-9,]*(?:\.[0-9]+)?)\s*(?:crores?|cr)\b",
    ),
    (
        "project_value_of",
        r"(?i)project\s+value\s+of\s+(?:about\s+|around\s+)?(?:rs\.?\s*|inr\s*|₹\s*)?([0-9][0-9,]*(?:\.[0-9]+)?)\s*(?:crores?|cr)\b",
    ),
    (
        "worth",
        r"(?i)worth\s+(?:about\s+|around\s+|over\s+)?(?:rs\.?\s*|inr\s*|₹\s*)?([0-9][0-9,]*(?:\.[0-9]+)?)\s*(?:crores?|cr)\b",
    ),
    (
        "order_valued_at",
        r"(?i)order\s+(?:valued|worth)\s+at\s+(?:rs\.?\s*|inr\s*|₹\s*)?([0-9][0-9,]*(?:\.[0-9]+)?)\s*(?:crores?|cr)\b",
    ),
    (
        "currency_crore",
        r"(?i)(?:rs\.?|inr|₹)\s*([0-9][0-9,]*(?:\.[0-9]+)?)\s*(?:crores?|cr)\b",
    ),
];

/// Date shapes. Named groups `d`, `m`, `y` carry the parts; a missing `d`
/// means "first of the month".
pub const DATE_RULES: &[Rule] = &[
    (
        "iso",
        r"\b(?P<y>\d{4})-(?P<m>\d{2})-(?P<d>\d{2})\b",
    ),
    (
        "numeric_dmy",
        r"\b(?P<d>\d{1,2})[/-](?P<m>\d{1,2})[/-](?P<y>\d{4})\b",
    ),
    (
        "day_month_year",
        r"(?i)\b(?P<d>\d{1,2})(?:st|nd|rd|th)?\s+(?P<m>jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)\.?,?\s+(?P<y>\d{4})\b",
    ),
    (
        "month_year",
        r"(?i)\b(?P<m>jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)\.?,?\s+(?P<y>\d{4})\b",
    ),
];

const DATE_KEYWORD_RULES: &[Rule] = &[(
    "date_keyword",
    r"(?i)\b(start|starts|starting|begin|begins|commence|commences|commencement|from|end|ends|ending|complete|completed|completion|by|till|until)\b",
)];

const DURATION_RULES: &[Rule] = &[(
    "duration",
    r"(?i)(?:duration\s*(?:of|:)?\s*|completion\s+period\s+(?:of\s+)?|within\s+)(\d{1,4})\s*(days?|months?|years?)\b",
)];

/// Words that keep an old announcement relevant.
pub const RELEVANCE_RULES: &[Rule] = &[(
    "relevance",
    r"(?i)\b(?:announced|awarded|tenders?|contracts?|wins|bags|secures|orders?|loa|l1)\b",
)];

/// Steel families. Each pattern matches a tonnage within 40 characters of
/// the product keyword, on either side.
pub const STEEL_RULES: &[Rule] = &[
    ("TMT Bars", r"tmt(?:\s+bars?)?|rebars?|reinforcement\s+steel"),
    (
        "Hot Rolled Plates",
        r"hr\s+plates?|hot[\s-]rolled(?:\s+(?:plates?|coils?|steel))?|steel\s+plates?",
    ),
    (
        "Cold Rolled Steel",
        r"cold[\s-]rolled(?:\s+(?:sheets?|coils?|steel))?|crca",
    ),
    (
        "Special Alloy Steel",
        r"hsla|special\s+alloy(?:\s+steel)?|high[\s-]strength\s+low[\s-]alloy",
    ),
    (
        "Galvanized Steel",
        r"galvani[sz]ed(?:\s+steel)?|galvalume|colou?r[\s-]coated|coated\s+steel",
    ),
    ("Wire Rods", r"wire\s+rods?"),
    ("Solar Structures", r"solar\s+(?:mounting\s+)?structures?"),
];

const TONNAGE: &str = r"([0-9][0-9,]*(?:\.[0-9]+)?)\s*(?:mt|metric\s+tonnes?|tonnes?|tons?)\b";

/// Physical size rules.
pub const SPEC_RULES: &[Rule] = &[
    (
        "length",
        r"(?i)([0-9][0-9,]*(?:\.[0-9]+)?)\s*-?\s*(km|kms|kilomet(?:er|re)s?|met(?:er|re)s?|mtrs?)\b",
    ),
    (
        "area",
        r"(?i)([0-9][0-9,]*(?:\.[0-9]+)?)\s*(lakh\s+)?(sq\.?\s*ft|sqft|square\s+f(?:ee|oo)t|sq\.?\s*m(?:tr?s?)?|sqm|square\s+met(?:er|re)s?)\b",
    ),
    (
        "capacity",
        r"(?i)([0-9][0-9,]*(?:\.[0-9]+)?)\s*(gw|mw|kw)p?\b",
    ),
    (
        "floors",
        r"(?i)\b(\d{1,3})\s*-?\s*(?:floors?|stor(?:e)?ys?|stories|storied)\b",
    ),
    ("ground_plus", r"\b[Gg]\s*\+\s*(\d{1,3})\b"),
];

const SQM_TO_SQFT: f64 = 10.764;
const LAKH: f64 = 100_000.0;
const MIN_VALUE_CRORE: f64 = 1.0;
const MAX_VALUE_CRORE: f64 = 100_000.0;

/// Tokens the acronym rule must not return as a company.
const ACRONYM_STOPLIST: &[&str] = &[
    "INR", "CR", "MT", "MW", "GW", "KW", "KM", "JV", "EPC", "LOA", "PDF", "TMT", "HSLA", "HR",
    "FY", "GST", "PPP", "HAM", "DPR", "RFP", "RFQ", "NIT", "CRORE", "MTPA",
];

const BAD_COMPANY_MARKERS: &[&str] = &["404", "error", "not found", "page"];

fn compile(rules: &'static [Rule]) -> Vec<CompiledRule> {
    rules
        .iter()
        .filter_map(|(name, pattern)| match Regex::new(pattern) {
            Ok(re) => Some((*name, re)),
            Err(e) => {
                tracing::error!("Rule '{}' failed to compile: {}", name, e);
                None
            }
        })
        .collect()
}

fn compiled(
    cell: &'static OnceLock<Vec<CompiledRule>>,
    rules: &'static [Rule],
) -> &'static [CompiledRule] {
    cell.get_or_init(|| compile(rules))
}

fn company_rules() -> &'static [CompiledRule] {
    static CELL: OnceLock<Vec<CompiledRule>> = OnceLock::new();
    compiled(&CELL, COMPANY_RULES)
}

fn value_rules() -> &'static [CompiledRule] {
    static CELL: OnceLock<Vec<CompiledRule>> = OnceLock::new();
    compiled(&CELL, VALUE_RULES)
}

fn date_rules() -> &'static [CompiledRule] {
    static CELL: OnceLock<Vec<CompiledRule>> = OnceLock::new();
    compiled(&CELL, DATE_RULES)
}

fn date_keyword_rules() -> &'static [CompiledRule] {
    static CELL: OnceLock<Vec<CompiledRule>> = OnceLock::new();
    compiled(&CELL, DATE_KEYWORD_RULES)
}

fn duration_rules() -> &'static [CompiledRule] {
    static CELL: OnceLock<Vec<CompiledRule>> = OnceLock::new();
    compiled(&CELL, DURATION_RULES)
}

fn relevance_rules() -> &'static [CompiledRule] {
    static CELL: OnceLock<Vec<CompiledRule>> = OnceLock::new();
    compiled(&CELL, RELEVANCE_RULES)
}

fn spec_rules() -> &'static [CompiledRule] {
    static CELL: OnceLock<Vec<CompiledRule>> = OnceLock::new();
    compiled(&CELL, SPEC_RULES)
}

/// Steel rules wrap each product keyword with the tonnage on both sides.
fn steel_rules() -> &'static [CompiledRule] {
    static CELL: OnceLock<Vec<CompiledRule>> = OnceLock::new();
    CELL.get_or_init(|| {
        STEEL_RULES
            .iter()
            .filter_map(|(product, keyword)| {
                let pattern = format!(
                    r"(?i)(?:{tons}[^.;\n]{{0,40}}?\b(?:{kw})\b)|(?:\b(?:{kw})\b[^.;\n]{{0,40}}?{tons})",
                    tons = TONNAGE,
                    kw = keyword
                );
                match Regex::new(&pattern) {
                    Ok(re) => Some((*product, re)),
                    Err(e) => {
                        tracing::error!("Steel rule '{}' failed to compile: {}", product, e);
                        None
                    }
                }
            })
            .collect()
    })
}

const CLEANUP_RULES: &[Rule] = &[
    ("prefix", r"(?i)^(?:m/s\.?|messrs\.?|the)\s+"),
    ("private_limited", r"(?i)\b(?:pvt\.?\s*ltd\.?|private\s+limited)"),
    ("trailing_word", r"(?i)\s+(?:private|pvt\.?|public|company|and|&)$"),
];

fn cleanup_rules() -> &'static [CompiledRule] {
    static CELL: OnceLock<Vec<CompiledRule>> = OnceLock::new();
    compiled(&CELL, CLEANUP_RULES)
}

// ============ Company ============

/// Company name, or `None` when no rule yields a plausible one.
pub fn extract_company(text: &str) -> Option<String> {
    for (name, re) in company_rules() {
        for caps in re.captures_iter(text) {
            let Some(raw) = caps.get(1) else { continue };
            if *name == "acronym" && ACRONYM_STOPLIST.contains(&raw.as_str()) {
                continue;
            }
            if let Some(company) = clean_company(raw.as_str()) {
                tracing::debug!("Company rule '{}' matched: {}", name, company);
                return Some(company);
            }
        }
    }
    None
}

/// Normalises a raw company capture; `None` when it is implausible.
pub fn clean_company(raw: &str) -> Option<String> {
    let [(_, prefix), (_, pvt), (_, suffix)] = cleanup_rules() else {
        return None;
    };

    let mut name = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    loop {
        let stripped = prefix.replace(&name, "").to_string();
        if stripped == name {
            break;
        }
        name = stripped;
    }
    name = pvt.replace_all(&name, "Limited").to_string();
    loop {
        let trimmed = name.trim_end_matches([',', '.', '-', ':', ';', ' ']);
        let stripped = suffix.replace(trimmed, "").to_string();
        if stripped == name {
            break;
        }
        name = stripped;
    }
    let name = name.replace(" and ", " & ");

    let lowered = name.to_lowercase();
    if name.chars().count() < 4 || BAD_COMPANY_MARKERS.iter().any(|m| lowered.contains(m)) {
        return None;
    }
    Some(name)
}

/// Whether `text` carries an award / tender style keyword.
pub fn has_relevance_keyword(text: &str) -> bool {
    relevance_rules().iter().any(|(_, re)| re.is_match(text))
}

// ============ Value ============

fn parse_number(raw: &str) -> Option<f64> {
    raw.replace(',', "").parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Contract value in crore within `[1, 100000]`.
pub fn extract_value(text: &str) -> Option<f64> {
    for (name, re) in value_rules() {
        for caps in re.captures_iter(text) {
            let Some(value) = caps.get(1).and_then(|m| parse_number(m.as_str())) else {
                continue;
            };
            if (MIN_VALUE_CRORE..=MAX_VALUE_CRORE).contains(&value) {
                tracing::debug!("Value rule '{}' matched: {} cr", name, value);
                return Some(value);
            }
            tracing::debug!("Value rule '{}' skipped out-of-range {} cr", name, value);
        }
    }
    None
}

// ============ Dates ============

/// Dates recovered from free text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractedDates {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub duration_days: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DateRole {
    Start,
    End,
    Unlabelled,
}

fn month_number(raw: &str) -> Option<u32> {
    if let Ok(n) = raw.parse::<u32>() {
        return (1..=12).contains(&n).then_some(n);
    }
    let prefix: String = raw.chars().take(3).collect::<String>().to_lowercase();
    let month = match prefix.as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

fn date_from_captures(caps: &regex::Captures<'_>) -> Option<NaiveDate> {
    let year = caps.name("y")?.as_str().parse::<i32>().ok()?;
    let month = month_number(caps.name("m")?.as_str())?;
    let day = match caps.name("d") {
        Some(d) => d.as_str().parse::<u32>().ok()?,
        None => 1,
    };
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Every date in `text` with its byte span, in reading order, overlaps
/// resolved in favour of the earlier and longer match.
fn dates_with_spans(text: &str) -> Vec<(usize, usize, NaiveDate)> {
    let mut found: Vec<(usize, usize, NaiveDate)> = Vec::new();
    for (_, re) in date_rules() {
        for caps in re.captures_iter(text) {
            let Some(whole) = caps.get(0) else { continue };
            if let Some(date) = date_from_captures(&caps) {
                found.push((whole.start(), whole.end(), date));
            }
        }
    }
    found.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));

    let mut kept: Vec<(usize, usize, NaiveDate)> = Vec::new();
    for span in found {
        if kept.last().is_some_and(|last| span.0 < last.1) {
            continue;
        }
        kept.push(span);
    }
    kept
}

/// Words before a date that may label it ("start from", "commences on").
const ROLE_WINDOW_WORDS: usize = 2;

/// The last few words before a date, never reaching into an earlier sentence.
fn role_window(segment: &str) -> String {
    let clause = segment.rsplit(['.', ';', '\n']).next().unwrap_or("");
    let words: Vec<&str> = clause.split_whitespace().collect();
    words[words.len().saturating_sub(ROLE_WINDOW_WORDS)..].join(" ")
}

fn role_of(segment: &str) -> DateRole {
    let window = role_window(segment);
    let keyword = date_keyword_rules()
        .iter()
        .flat_map(|(_, re)| re.find_iter(&window))
        .max_by_key(|m| m.start());
    match keyword.map(|m| m.as_str().to_lowercase()).as_deref() {
        Some(
            "start" | "starts" | "starting" | "begin" | "begins" | "commence" | "commences"
            | "commencement" | "from",
        ) => DateRole::Start,
        Some(_) => DateRole::End,
        None => DateRole::Unlabelled,
    }
}

/// Duration phrase converted to days (months = 30, years = 365).
pub fn extract_duration_days(text: &str) -> Option<i64> {
    duration_rules().iter().find_map(|(_, re)| {
        let caps = re.captures(text)?;
        let n = caps.get(1)?.as_str().parse::<i64>().ok()?;
        let unit = caps.get(2)?.as_str().to_lowercase();
        let days = if unit.starts_with("day") {
            n
        } else if unit.starts_with("month") {
            n * 30
        } else {
            n * 365
        };
        (days > 0).then_some(days)
    })
}

/// Start / end dates and duration found in `text`.
pub fn extract_dates(text: &str) -> ExtractedDates {
    let mut out = ExtractedDates {
        duration_days: extract_duration_days(text),
        ..Default::default()
    };

    let mut previous_end = 0;
    for (start, end, date) in dates_with_spans(text) {
        let segment = text.get(previous_end..start).unwrap_or("");
        previous_end = end;
        match role_of(segment) {
            DateRole::Start if out.start.is_none() => out.start = Some(date),
            DateRole::End if out.end.is_none() => out.end = Some(date),
            DateRole::Unlabelled if out.start.is_none() => out.start = Some(date),
            DateRole::Unlabelled if out.end.is_none() => out.end = Some(date),
            _ => {}
        }
    }
    out
}

/// Parses a single date string as sent by a source adapter.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    dates_with_spans(raw.trim()).first().map(|(_, _, date)| *date)
}

// ============ Steel mentions ============

/// An explicit `<n> MT of <product>` statement.
#[derive(Debug, Clone, PartialEq)]
pub struct SteelMention {
    pub product: &'static str,
    pub tons: f64,
}

/// Explicit tonnage mentions per product family, in rule order.
pub fn extract_steel_mentions(text: &str) -> Vec<SteelMention> {
    let mut mentions = Vec::new();
    for (product, re) in steel_rules() {
        for caps in re.captures_iter(text) {
            let tons = caps
                .get(1)
                .or_else(|| caps.get(2))
                .and_then(|m| parse_number(m.as_str()));
            if let Some(tons) = tons.filter(|t| *t > 0.0) {
                tracing::debug!("Steel mention: {} MT of {}", tons, product);
                mentions.push(SteelMention { product, tons });
            }
        }
    }
    mentions
}

// ============ Physical specs ============

/// Length, area, capacity and floor counts mentioned in `text`.
pub fn extract_specs(text: &str) -> ProjectSpecs {
    let mut specs = ProjectSpecs::default();
    for (name, re) in spec_rules() {
        let Some(caps) = re.captures(text) else { continue };
        let number = caps.get(1).and_then(|m| parse_number(m.as_str()));
        let Some(number) = number.filter(|n| *n > 0.0) else {
            continue;
        };
        match *name {
            "length" if specs.length_km.is_none() => {
                let unit = caps.get(2).map(|m| m.as_str().to_lowercase()).unwrap_or_default();
                let km = if unit.starts_with('k') { number } else { number / 1000.0 };
                specs.length_km = Some(km);
            }
            "area" if specs.area_sqft.is_none() => {
                let lakh = if caps.get(2).is_some() { LAKH } else { 1.0 };
                let unit = caps.get(3).map(|m| m.as_str().to_lowercase()).unwrap_or_default();
                let per_unit = if unit.contains('f') { 1.0 } else { SQM_TO_SQFT };
                specs.area_sqft = Some(number * lakh * per_unit);
            }
            "capacity" if specs.capacity_mw.is_none() => {
                let unit = caps.get(2).map(|m| m.as_str().to_lowercase()).unwrap_or_default();
                let mw = match unit.as_str() {
                    "gw" => number * 1000.0,
                    "kw" => number / 1000.0,
                    _ => number,
                };
                specs.capacity_mw = Some(mw);
            }
            "floors" if specs.floors.is_none() => specs.floors = Some(number as u32),
            "ground_plus" if specs.floors.is_none() => specs.floors = Some(number as u32 + 1),
            _ => {}
        }
    }
    specs
}
