/// Steel tonnage estimates from project type, value and physical size.
use std::collections::HashMap;

use crate::models::{ProjectSpecs, ProjectType, Requirement, SteelRequirements};

/// Physical quantity a rate is expressed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Driver {
    PerKm,
    PerSqft,
    PerMw,
    PerFloor,
}

impl Driver {
    fn measure(&self, specs: &ProjectSpecs) -> Option<f64> {
        match self {
            Driver::PerKm => specs.length_km,
            Driver::PerSqft => specs.area_sqft,
            Driver::PerMw => specs.capacity_mw,
            Driver::PerFloor => specs.floors.map(f64::from),
        }
        .filter(|v| *v > 0.0)
    }
}

/// Tonnage rule for one product line.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductRate {
    pub product: &'static str,
    /// MT per physical unit, used when that size is known.
    pub physical: Option<(Driver, f64)>,
    /// MT per crore of contract value.
    pub per_crore: f64,
}

impl ProductRate {
    const fn new(product: &'static str, physical: Option<(Driver, f64)>, per_crore: f64) -> Self {
        Self {
            product,
            physical,
            per_crore,
        }
    }

    /// Raw (unrounded) tonnage for this line.
    pub fn tons(&self, value: f64, specs: &ProjectSpecs) -> f64 {
        if let Some((driver, rate)) = self.physical {
            if let Some(measure) = driver.measure(specs) {
                return measure * rate;
            }
        }
        value.max(0.0) * self.per_crore
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RateTable {
    pub primary: ProductRate,
    pub secondary: Vec<ProductRate>,
    pub tertiary: ProductRate,
}

/// Rate tables per project type, with a fallback for unknown types.
#[derive(Debug, Clone)]
pub struct RateTables {
    pub by_type: HashMap<ProjectType, RateTable>,
    pub fallback: RateTable,
}

impl RateTables {
    pub fn table_for(&self, project_type: ProjectType) -> &RateTable {
        self.by_type.get(&project_type).unwrap_or(&self.fallback)
    }
}

impl Default for RateTables {
    fn default() -> Self {
        use Driver::*;
        use ProjectType::*;

        let table = |primary, secondary: Vec<ProductRate>, tertiary| RateTable {
            primary,
            secondary,
            tertiary,
        };
        let infrastructure = table(
            ProductRate::new("TMT Bars", None, 20.0),
            vec![ProductRate::new("Hot Rolled Plates", None, 5.0)],
            ProductRate::new("Wire Rods", None, 2.0),
        );

        let by_type = HashMap::from([
            (
                MetroRail,
                table(
                    ProductRate::new("TMT Bars", Some((PerKm, 175.0)), 35.0),
                    vec![
                        ProductRate::new("Hot Rolled Plates", Some((PerKm, 60.0)), 12.0),
                        ProductRate::new("Galvanized Steel", Some((PerKm, 10.0)), 2.0),
                    ],
                    ProductRate::new("Wire Rods", Some((PerKm, 15.0)), 3.0),
                ),
            ),
            (
                RoadBridge,
                table(
                    ProductRate::new("TMT Bars", Some((PerKm, 125.0)), 30.0),
                    vec![ProductRate::new("Hot Rolled Plates", Some((PerKm, 40.0)), 8.0)],
                    ProductRate::new("Wire Rods", Some((PerKm, 10.0)), 2.0),
                ),
            ),
            (
                Building,
                table(
                    ProductRate::new("TMT Bars", Some((PerFloor, 45.0)), 25.0),
                    vec![ProductRate::new("Galvalume", Some((PerSqft, 0.004)), 4.0)],
                    ProductRate::new("Wire Rods", Some((PerFloor, 5.0)), 1.5),
                ),
            ),
            (
                Industrial,
                table(
                    ProductRate::new("Hot Rolled Plates", Some((PerSqft, 0.2)), 20.0),
                    vec![ProductRate::new("Galvalume", Some((PerSqft, 0.05)), 5.0)],
                    ProductRate::new("TMT Bars", Some((PerSqft, 0.03)), 3.0),
                ),
            ),
            (
                Energy,
                table(
                    ProductRate::new("Galvanized Steel", Some((PerMw, 35.0)), 15.0),
                    vec![ProductRate::new("Electrical Steel", Some((PerMw, 5.0)), 2.0)],
                    ProductRate::new("Hot Rolled Plates", Some((PerMw, 3.0)), 1.0),
                ),
            ),
            (
                Water,
                table(
                    ProductRate::new("Hot Rolled Plates", Some((PerKm, 90.0)), 18.0),
                    vec![ProductRate::new("TMT Bars", Some((PerKm, 40.0)), 8.0)],
                    ProductRate::new("Wire Rods", Some((PerKm, 4.0)), 1.0),
                ),
            ),
            (
                Defense,
                table(
                    ProductRate::new("Special Alloy Steel", None, 12.0),
                    vec![ProductRate::new("Hot Rolled Plates", None, 8.0)],
                    ProductRate::new("TMT Bars", None, 4.0),
                ),
            ),
            (
                Marine,
                table(
                    ProductRate::new("Hot Rolled Plates", None, 25.0),
                    vec![ProductRate::new("Special Alloy Steel", None, 6.0)],
                    ProductRate::new("TMT Bars", None, 5.0),
                ),
            ),
            (Infrastructure, infrastructure.clone()),
        ]);

        Self {
            by_type,
            fallback: infrastructure,
        }
    }
}

pub struct SteelEstimator {
    tables: RateTables,
}

impl SteelEstimator {
    pub fn new(tables: RateTables) -> Self {
        Self { tables }
    }

    /// Estimate for one lead. Every line is rounded to the nearest hundred
    /// and floored at the minimum, so an unknown value still yields a result.
    pub fn estimate(
        &self,
        project_type: ProjectType,
        value: f64,
        specs: &ProjectSpecs,
    ) -> SteelRequirements {
        let table = self.tables.table_for(project_type);
        let line = |rate: &ProductRate| Requirement::from_tons(rate.product, rate.tons(value, specs));

        let steel = SteelRequirements::new(
            line(&table.primary),
            table.secondary.iter().map(line).collect(),
            Some(line(&table.tertiary)),
        );
        tracing::debug!(
            "Steel estimate for {} ({} cr): {} MT",
            project_type,
            value,
            steel.total()
        );
        steel
    }
}

impl Default for SteelEstimator {
    fn default() -> Self {
        Self::new(RateTables::default())
    }
}
