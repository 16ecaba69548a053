//! Data models for items, machines and recipes

use std::fmt;

use serde::{Deserialize, Serialize};

/// Unit used for items when the catalog does not say otherwise
pub const DEFAULT_UNIT: &str = "items/min";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub name: String,
    pub unit: String,
}

impl Item {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            unit: DEFAULT_UNIT.to_string(),
        }
    }
}

/// A machine type that runs recipes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Machine {
    pub id: String,
    pub name: String,
    pub power_mw: f64,
    pub footprint_m2: f64,
}

/// An (item, rate) pair; rates are per machine per minute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flow {
    pub item: String,
    pub rate: f64,
}

impl Flow {
    pub fn new(item: impl Into<String>, rate: f64) -> Self {
        Self {
            item: item.into(),
            rate,
        }
    }
}

/// A transformation run by one machine at 100% clock
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub id: String,
    pub name: String,
    pub machine: Machine,
    pub inputs: Vec<Flow>,
    pub outputs: Vec<Flow>,
    /// Power produced per machine (generators); zero for ordinary recipes
    pub power_generation_mw: f64,
}

impl Recipe {
    /// Consumption rate of `item` per machine, zero if not an input
    pub fn input_rate(&self, item: &str) -> f64 {
        self.inputs
            .iter()
            .find(|f| f.item == item)
            .map_or(0.0, |f| f.rate)
    }

    /// Production rate of `item` per machine, zero if not an output
    pub fn output_rate(&self, item: &str) -> f64 {
        self.outputs
            .iter()
            .find(|f| f.item == item)
            .map_or(0.0, |f| f.rate)
    }

    pub fn produces(&self, item: &str) -> bool {
        self.output_rate(item) > 0.0
    }

    /// The output the recipe is named for: its largest output
    pub fn primary_output(&self) -> Option<&Flow> {
        self.outputs
            .iter()
            .reduce(|best, f| if f.rate > best.rate { f } else { best })
    }

    /// Outputs other than `item`
    pub fn byproducts_of<'a>(&'a self, item: &'a str) -> impl Iterator<Item = &'a Flow> + 'a {
        self.outputs.iter().filter(move |f| f.item != item)
    }

    pub fn is_generator(&self) -> bool {
        self.power_generation_mw > 0.0
    }
}

/// How an item is sourced during resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RecipeSelection {
    Recipe(String),
    Imported,
}

impl RecipeSelection {
    pub const IMPORTED: &'static str = "imported";
}

impl From<String> for RecipeSelection {
    fn from(value: String) -> Self {
        if value == Self::IMPORTED {
            RecipeSelection::Imported
        } else {
            RecipeSelection::Recipe(value)
        }
    }
}

impl From<RecipeSelection> for String {
    fn from(value: RecipeSelection) -> Self {
        match value {
            RecipeSelection::Recipe(id) => id,
            RecipeSelection::Imported => RecipeSelection::IMPORTED.to_string(),
        }
    }
}

impl fmt::Display for RecipeSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecipeSelection::Recipe(id) => write!(f, "{}", id),
            RecipeSelection::Imported => write!(f, "{}", Self::IMPORTED),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refinery() -> Recipe {
        Recipe {
            id: "Plastic".to_string(),
            name: "Plastic".to_string(),
            machine: Machine {
                id: "Refinery".to_string(),
                name: "Refinery".to_string(),
                power_mw: 30.0,
                footprint_m2: 200.0,
            },
            inputs: vec![Flow::new("CrudeOil", 30.0)],
            outputs: vec![Flow::new("Plastic", 20.0), Flow::new("HeavyOilResidue", 10.0)],
            power_generation_mw: 0.0,
        }
    }

    #[test]
    fn rates_default_to_zero_for_unrelated_items() {
        let recipe = refinery();
        assert_eq!(recipe.input_rate("CrudeOil"), 30.0);
        assert_eq!(recipe.input_rate("Water"), 0.0);
        assert_eq!(recipe.output_rate("HeavyOilResidue"), 10.0);
        assert!(!recipe.produces("CrudeOil"));
    }

    #[test]
    fn primary_output_is_largest() {
        let recipe = refinery();
        assert_eq!(recipe.primary_output().map(|f| f.item.as_str()), Some("Plastic"));
    }

    #[test]
    fn byproducts_exclude_target() {
        let recipe = refinery();
        let items: Vec<_> = recipe.byproducts_of("HeavyOilResidue").map(|f| f.item.as_str()).collect();
        assert_eq!(items, vec!["Plastic"]);
    }

    #[test]
    fn selection_serializes_as_plain_string() {
        let json = serde_json::to_string(&RecipeSelection::Imported).unwrap();
        assert_eq!(json, "\"imported\"");
        let parsed: RecipeSelection = serde_json::from_str("\"Alternate: Cast Screw\"").unwrap();
        assert_eq!(parsed, RecipeSelection::Recipe("Alternate: Cast Screw".to_string()));
    }
}
