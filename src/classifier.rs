/// Project type and team routing.
///
/// Tables are plain values handed to [`Classifier::new`]; tests swap them
/// without touching anything process-wide.
use regex::Regex;
use std::collections::BTreeSet;

use crate::models::{default_teams, ProjectType, SteelRequirements, TeamId};

/// One ordered keyword group.
#[derive(Debug, Clone)]
pub struct KeywordGroup {
    pub project_type: ProjectType,
    pub keywords: Vec<String>,
    pub teams: Vec<TeamId>,
}

impl KeywordGroup {
    fn new(project_type: ProjectType, keywords: &[&str], teams: &[TeamId]) -> Self {
        Self {
            project_type,
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            teams: teams.to_vec(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClassifierTables {
    /// Product-name fragment (lower-case) → owning team.
    pub product_teams: Vec<(String, TeamId)>,
    /// Tried in order; first whole-word hit wins.
    pub keyword_groups: Vec<KeywordGroup>,
    /// `(minimum value in crore, teams)`, highest threshold first.
    pub value_tiers: Vec<(f64, Vec<TeamId>)>,
}

impl Default for ClassifierTables {
    fn default() -> Self {
        use ProjectType::*;
        use TeamId::*;

        let product_teams = [
            ("tmt", TmtBars),
            ("rebar", TmtBars),
            ("wire rod", WireRods),
            ("special alloy", Hsla),
            ("hsla", Hsla),
            ("hot rolled", HrCrPlates),
            ("cold rolled", HrCrPlates),
            ("electrical", HrCrPlates),
            ("plate", HrCrPlates),
            ("galvanized", CoatedProducts),
            ("galvalume", CoatedProducts),
            ("coated", CoatedProducts),
            ("solar", Solar),
        ]
        .into_iter()
        .map(|(fragment, team)| (fragment.to_string(), team))
        .collect();

        let keyword_groups = vec![
            KeywordGroup::new(
                MetroRail,
                &["metro", "railway", "rail", "train", "locomotive", "coach", "rolling stock"],
                &[HrCrPlates, TmtBars],
            ),
            KeywordGroup::new(
                RoadBridge,
                &["highway", "road", "bridge", "flyover", "viaduct", "corridor", "expressway"],
                &[TmtBars, HrCrPlates],
            ),
            KeywordGroup::new(
                Building,
                &[
                    "building", "tower", "complex", "mall", "hospital", "hotel", "apartment",
                    "residential",
                ],
                &[TmtBars, CoatedProducts],
            ),
            KeywordGroup::new(
                Industrial,
                &["factory", "plant", "manufacturing", "industrial", "warehouse", "storage"],
                &[HrCrPlates, CoatedProducts],
            ),
            KeywordGroup::new(
                Energy,
                &["power plant", "solar", "renewable", "wind", "energy", "electricity"],
                &[Solar, CoatedProducts],
            ),
            KeywordGroup::new(
                Water,
                &["dam", "reservoir", "canal", "pipeline", "water", "irrigation"],
                &[HrCrPlates, TmtBars],
            ),
            KeywordGroup::new(
                Defense,
                &["defence", "defense", "army", "navy", "air force", "missile", "ammunition"],
                &[Hsla, HrCrPlates],
            ),
            KeywordGroup::new(
                Marine,
                &["port", "harbour", "harbor", "shipyard", "jetty", "berth", "dredging", "offshore"],
                &[HrCrPlates, Hsla],
            ),
        ];

        let value_tiers = vec![
            (1000.0, vec![TmtBars, HrCrPlates, CoatedProducts]),
            (100.0, vec![TmtBars, HrCrPlates]),
        ];

        Self {
            product_teams,
            keyword_groups,
            value_tiers,
        }
    }
}

/// Outcome of classifying one lead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub project_type: ProjectType,
    pub teams: BTreeSet<TeamId>,
}

pub struct Classifier {
    tables: ClassifierTables,
    groups: Vec<(ProjectType, Regex, BTreeSet<TeamId>)>,
}

impl Classifier {
    pub fn new(tables: ClassifierTables) -> Self {
        let groups = tables
            .keyword_groups
            .iter()
            .filter(|group| !group.keywords.is_empty())
            .filter_map(|group| {
                let alternation = group
                    .keywords
                    .iter()
                    .map(|k| regex::escape(&k.to_lowercase()).replace(' ', r"\s+"))
                    .collect::<Vec<_>>()
                    .join("|");
                let pattern = format!(r"(?i)\b(?:{})s?\b", alternation);
                match Regex::new(&pattern) {
                    Ok(re) => Some((group.project_type, re, group.teams.iter().copied().collect())),
                    Err(e) => {
                        tracing::error!("Keyword group {} skipped: {}", group.project_type, e);
                        None
                    }
                }
            })
            .collect();

        Self { tables, groups }
    }

    /// Keyword scan only; `None` when no group matches.
    pub fn project_type_of(&self, text: &str) -> Option<(ProjectType, &BTreeSet<TeamId>)> {
        self.groups
            .iter()
            .find(|(_, re, _)| re.is_match(text))
            .map(|(project_type, _, teams)| (*project_type, teams))
    }

    /// Team owning a product name such as "Hot Rolled Plates".
    pub fn team_for_product(&self, product: &str) -> Option<TeamId> {
        let lowered = product.to_lowercase();
        self.tables
            .product_teams
            .iter()
            .find(|(fragment, _)| lowered.contains(fragment.as_str()))
            .map(|(_, team)| *team)
    }

    pub fn classify(
        &self,
        text: &str,
        stated: Option<&SteelRequirements>,
        value: f64,
    ) -> Classification {
        let keyword_hit = self.project_type_of(text);
        let project_type = keyword_hit
            .map(|(project_type, _)| project_type)
            .unwrap_or_default();

        // Step 1: explicitly stated product families own the routing
        if let Some(stated) = stated {
            let teams: BTreeSet<TeamId> = stated
                .lines()
                .filter_map(|line| self.team_for_product(&line.product_type))
                .collect();
            if !teams.is_empty() {
                tracing::debug!("Teams from stated steel: {:?}", teams);
                return Classification { project_type, teams };
            }
        }

        // Step 2: first keyword group
        if let Some((project_type, teams)) = keyword_hit {
            if !teams.is_empty() {
                return Classification {
                    project_type,
                    teams: teams.clone(),
                };
            }
        }

        // Step 3: value tiers
        let teams = self
            .tables
            .value_tiers
            .iter()
            .find(|(threshold, _)| value >= *threshold)
            .map(|(_, teams)| teams.iter().copied().collect::<BTreeSet<_>>())
            .filter(|teams| !teams.is_empty())
            .unwrap_or_else(default_teams);

        Classification {
            project_type: ProjectType::Infrastructure,
            teams,
        }
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(ClassifierTables::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Requirement;

    fn teams(list: &[TeamId]) -> BTreeSet<TeamId> {
        list.iter().copied().collect()
    }

    #[test]
    fn test_metro_wins_over_later_groups() {
        let classifier = Classifier::default();
        let result = classifier.classify("Mumbai Metro Line-3 Station Work", None, 45.5);
        assert_eq!(result.project_type, ProjectType::MetroRail);
        assert_eq!(result.teams, teams(&[TeamId::HrCrPlates, TeamId::TmtBars]));
    }

    #[test]
    fn test_whole_word_matching() {
        let classifier = Classifier::default();
        // "damage" must not trigger the water group, "towers" still counts
        let result = classifier.classify("Twin towers repaired after damage", None, 0.0);
        assert_eq!(result.project_type, ProjectType::Building);

        let none = classifier.classify("Damage assessment contract", None, 0.0);
        assert_eq!(none.project_type, ProjectType::Infrastructure);
    }

    #[test]
    fn test_value_tiers_without_keywords() {
        let classifier = Classifier::default();
        let big = classifier.classify("Mega order for XYZ", None, 1500.0);
        assert_eq!(
            big.teams,
            teams(&[TeamId::TmtBars, TeamId::HrCrPlates, TeamId::CoatedProducts])
        );
        let mid = classifier.classify("Order for XYZ", None, 150.0);
        assert_eq!(mid.teams, teams(&[TeamId::TmtBars, TeamId::HrCrPlates]));
        let small = classifier.classify("Order for XYZ", None, 10.0);
        assert_eq!(small.teams, teams(&[TeamId::TmtBars]));
        assert_eq!(small.project_type, ProjectType::Infrastructure);
    }

    #[test]
    fn test_stated_steel_routes_to_owning_teams() {
        let classifier = Classifier::default();
        let stated = SteelRequirements::new(
            Requirement::from_tons("Galvanized Steel", 4000.0),
            vec![Requirement::from_tons("Special Alloy Steel", 500.0)],
            None,
        );
        let result = classifier.classify("New highway toll plaza", Some(&stated), 0.0);
        assert_eq!(result.project_type, ProjectType::RoadBridge);
        assert_eq!(result.teams, teams(&[TeamId::CoatedProducts, TeamId::Hsla]));
    }

    #[test]
    fn test_substituted_tables() {
        let tables = ClassifierTables {
            product_teams: Vec::new(),
            keyword_groups: vec![KeywordGroup::new(
                ProjectType::Marine,
                &["dock"],
                &[TeamId::Hsla],
            )],
            value_tiers: Vec::new(),
        };
        let classifier = Classifier::new(tables);
        let result = classifier.classify("New dock at Vizag", None, 5000.0);
        assert_eq!(result.project_type, ProjectType::Marine);
        assert_eq!(result.teams, teams(&[TeamId::Hsla]));

        let fallback = classifier.classify("metro", None, 5000.0);
        assert_eq!(fallback.teams, default_teams());
    }
}
