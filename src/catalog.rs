//! Immutable in-memory catalog of items, machines and recipes
//!
//! A [`Catalog`] is assembled once through a [`CatalogBuilder`] (from the
//! database, the sample set or a test fixture) and then only read. Recipes
//! are held behind `Arc` so production trees can carry them without
//! borrowing the catalog.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::models::{Flow, Item, Machine, Recipe};

/// Inconsistent catalog data detected while building
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum CatalogError {
    #[error("duplicate {kind} id '{id}'")]
    Duplicate { kind: &'static str, id: String },

    #[error("recipe '{recipe}' uses unknown machine '{machine}'")]
    UnknownMachine { recipe: String, machine: String },

    #[error("recipe '{recipe}' has invalid rate {rate} for '{item}'")]
    InvalidRate {
        recipe: String,
        item: String,
        rate: f64,
    },

    #[error("recipe '{recipe}' has no outputs")]
    NoOutputs { recipe: String },

    #[error("default recipe '{recipe}' does not produce '{item}'")]
    InvalidDefault { item: String, recipe: String },
}

/// Recipe definition as registered, referring to its machine by id
#[derive(Debug, Clone)]
pub struct RecipeDef {
    pub id: String,
    pub name: String,
    pub machine: String,
    pub inputs: Vec<Flow>,
    pub outputs: Vec<Flow>,
    pub power_generation_mw: f64,
}

impl RecipeDef {
    pub fn new(id: impl Into<String>, machine: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            machine: machine.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            power_generation_mw: 0.0,
        }
    }

    pub fn input(mut self, item: impl Into<String>, rate: f64) -> Self {
        self.inputs.push(Flow::new(item, rate));
        self
    }

    pub fn output(mut self, item: impl Into<String>, rate: f64) -> Self {
        self.outputs.push(Flow::new(item, rate));
        self
    }

    pub fn generates(mut self, power_mw: f64) -> Self {
        self.power_generation_mw = power_mw;
        self
    }
}

#[derive(Debug, Default)]
pub struct CatalogBuilder {
    items: Vec<Item>,
    machines: Vec<Machine>,
    recipes: Vec<RecipeDef>,
    defaults: Vec<(String, String)>,
}

impl CatalogBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn item(mut self, item: Item) -> Self {
        self.items.push(item);
        self
    }

    pub fn machine(
        mut self,
        id: impl Into<String>,
        name: impl Into<String>,
        power_mw: f64,
        footprint_m2: f64,
    ) -> Self {
        self.machines.push(Machine {
            id: id.into(),
            name: name.into(),
            power_mw,
            footprint_m2,
        });
        self
    }

    pub fn recipe(mut self, recipe: RecipeDef) -> Self {
        self.recipes.push(recipe);
        self
    }

    pub fn default_recipe(mut self, item: impl Into<String>, recipe: impl Into<String>) -> Self {
        self.defaults.push((item.into(), recipe.into()));
        self
    }

    pub fn push_item(&mut self, item: Item) {
        self.items.push(item);
    }

    pub fn push_machine(&mut self, machine: Machine) {
        self.machines.push(machine);
    }

    pub fn push_recipe(&mut self, recipe: RecipeDef) {
        self.recipes.push(recipe);
    }

    pub fn push_default(&mut self, item: String, recipe: String) {
        self.defaults.push((item, recipe));
    }

    /// Validate and freeze the catalog.
    ///
    /// Items referenced by recipes but never registered are added with
    /// their id as display name.
    pub fn build(self) -> Result<Catalog, CatalogError> {
        let mut items = BTreeMap::new();
        for item in self.items {
            if items.contains_key(&item.id) {
                return Err(CatalogError::Duplicate {
                    kind: "item",
                    id: item.id,
                });
            }
            items.insert(item.id.clone(), item);
        }

        let mut machines = HashMap::new();
        for machine in self.machines {
            if machines.contains_key(&machine.id) {
                return Err(CatalogError::Duplicate {
                    kind: "machine",
                    id: machine.id,
                });
            }
            machines.insert(machine.id.clone(), machine);
        }

        let mut recipes: BTreeMap<String, Arc<Recipe>> = BTreeMap::new();
        let mut by_output: HashMap<String, Vec<String>> = HashMap::new();
        let mut recipe_order = Vec::with_capacity(self.recipes.len());
        for def in self.recipes {
            if recipes.contains_key(&def.id) {
                return Err(CatalogError::Duplicate {
                    kind: "recipe",
                    id: def.id,
                });
            }
            let machine = machines
                .get(&def.machine)
                .cloned()
                .ok_or_else(|| CatalogError::UnknownMachine {
                    recipe: def.id.clone(),
                    machine: def.machine.clone(),
                })?;
            if def.outputs.is_empty() {
                return Err(CatalogError::NoOutputs { recipe: def.id });
            }

            let inputs = merge_flows(&def.id, def.inputs)?;
            let outputs = merge_flows(&def.id, def.outputs)?;
            for flow in inputs.iter().chain(outputs.iter()) {
                items
                    .entry(flow.item.clone())
                    .or_insert_with(|| Item::new(flow.item.clone()));
            }
            for flow in &outputs {
                by_output
                    .entry(flow.item.clone())
                    .or_default()
                    .push(def.id.clone());
            }

            recipe_order.push(def.id.clone());
            recipes.insert(
                def.id.clone(),
                Arc::new(Recipe {
                    id: def.id,
                    name: def.name,
                    machine,
                    inputs,
                    outputs,
                    power_generation_mw: def.power_generation_mw,
                }),
            );
        }

        let mut defaults = HashMap::new();
        for (item, recipe) in self.defaults {
            let produces = recipes.get(&recipe).is_some_and(|r| r.produces(&item));
            if !produces {
                return Err(CatalogError::InvalidDefault { item, recipe });
            }
            defaults.insert(item, recipe);
        }

        Ok(Catalog {
            items,
            machines,
            recipes,
            recipe_order,
            by_output,
            defaults,
        })
    }
}

/// Collapse repeated items in a flow list and reject bad rates
fn merge_flows(recipe: &str, flows: Vec<Flow>) -> Result<Vec<Flow>, CatalogError> {
    let mut merged: Vec<Flow> = Vec::with_capacity(flows.len());
    for flow in flows {
        if !flow.rate.is_finite() || flow.rate <= 0.0 {
            return Err(CatalogError::InvalidRate {
                recipe: recipe.to_string(),
                item: flow.item,
                rate: flow.rate,
            });
        }
        match merged.iter_mut().find(|f| f.item == flow.item) {
            Some(existing) => existing.rate += flow.rate,
            None => merged.push(flow),
        }
    }
    Ok(merged)
}

/// Read-only lookup of items and recipes
#[derive(Debug, Default)]
pub struct Catalog {
    items: BTreeMap<String, Item>,
    machines: HashMap<String, Machine>,
    recipes: BTreeMap<String, Arc<Recipe>>,
    recipe_order: Vec<String>,
    by_output: HashMap<String, Vec<String>>,
    defaults: HashMap<String, String>,
}

impl Catalog {
    pub fn builder() -> CatalogBuilder {
        CatalogBuilder::new()
    }

    pub fn get_item(&self, id: &str) -> Option<&Item> {
        self.items.get(id)
    }

    pub fn get_recipe(&self, id: &str) -> Option<&Arc<Recipe>> {
        self.recipes.get(id)
    }

    pub fn get_machine(&self, id: &str) -> Option<&Machine> {
        self.machines.get(id)
    }

    /// Recipes producing `item`, in registration order
    pub fn recipes_for_output(&self, item: &str) -> Vec<&Arc<Recipe>> {
        self.by_output
            .get(item)
            .map(|ids| ids.iter().filter_map(|id| self.recipes.get(id)).collect())
            .unwrap_or_default()
    }

    /// The recorded default for `item`, otherwise its first producer
    pub fn default_recipe(&self, item: &str) -> Option<&Arc<Recipe>> {
        self.defaults
            .get(item)
            .and_then(|id| self.recipes.get(id))
            .or_else(|| self.recipes_for_output(item).into_iter().next())
    }

    /// Explicitly recorded defaults, as (item, recipe) pairs
    pub fn explicit_defaults(&self) -> impl Iterator<Item = (&str, &str)> {
        self.defaults.iter().map(|(i, r)| (i.as_str(), r.as_str()))
    }

    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.items.values()
    }

    /// All recipes in registration order
    pub fn recipes(&self) -> impl Iterator<Item = &Arc<Recipe>> {
        self.recipe_order.iter().filter_map(|id| self.recipes.get(id))
    }

    pub fn machines(&self) -> impl Iterator<Item = &Machine> {
        let mut machines: Vec<_> = self.machines.values().collect();
        machines.sort_by(|a, b| a.id.cmp(&b.id));
        machines.into_iter()
    }

    pub fn is_producible(&self, item: &str) -> bool {
        self.by_output.contains_key(item)
    }

    /// Items consumed by some recipe but produced by none
    pub fn base_resources(&self) -> Vec<&str> {
        let mut base: Vec<&str> = self
            .recipes
            .values()
            .flat_map(|r| r.inputs.iter())
            .map(|f| f.item.as_str())
            .filter(|item| !self.is_producible(item))
            .collect();
        base.sort_unstable();
        base.dedup();
        base
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> CatalogBuilder {
        Catalog::builder()
            .machine("Smelter", "Smelter", 4.0, 54.0)
            .recipe(
                RecipeDef::new("Iron Ingot", "Smelter")
                    .input("IronOre", 30.0)
                    .output("IronIngot", 30.0),
            )
            .recipe(
                RecipeDef::new("Alternate: Pure Iron Ingot", "Smelter")
                    .input("IronOre", 35.0)
                    .input("Water", 20.0)
                    .output("IronIngot", 65.0),
            )
    }

    #[test]
    fn default_falls_back_to_first_producer() {
        let catalog = builder().build().unwrap();
        assert_eq!(catalog.default_recipe("IronIngot").unwrap().id, "Iron Ingot");
        assert!(catalog.default_recipe("IronOre").is_none());
    }

    #[test]
    fn explicit_default_wins() {
        let catalog = builder()
            .default_recipe("IronIngot", "Alternate: Pure Iron Ingot")
            .build()
            .unwrap();
        assert_eq!(
            catalog.default_recipe("IronIngot").unwrap().id,
            "Alternate: Pure Iron Ingot"
        );
    }

    #[test]
    fn default_must_produce_item() {
        let err = builder()
            .default_recipe("IronOre", "Iron Ingot")
            .build()
            .unwrap_err();
        assert!(matches!(err, CatalogError::InvalidDefault { .. }));
    }

    #[test]
    fn referenced_items_are_registered() {
        let catalog = builder().build().unwrap();
        assert_eq!(catalog.get_item("Water").unwrap().name, "Water");
        assert_eq!(catalog.get_machine("Smelter").unwrap().power_mw, 4.0);
        assert_eq!(catalog.base_resources(), vec!["IronOre", "Water"]);
    }

    #[test]
    fn rejects_non_positive_rates() {
        let err = Catalog::builder()
            .machine("Smelter", "Smelter", 4.0, 54.0)
            .recipe(RecipeDef::new("Bad", "Smelter").output("IronIngot", 0.0))
            .build()
            .unwrap_err();
        assert!(matches!(err, CatalogError::InvalidRate { .. }));
    }

    #[test]
    fn rejects_unknown_machine() {
        let err = Catalog::builder()
            .recipe(RecipeDef::new("Iron Ingot", "Smelter").output("IronIngot", 30.0))
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            CatalogError::UnknownMachine {
                recipe: "Iron Ingot".to_string(),
                machine: "Smelter".to_string()
            }
        );
    }

    #[test]
    fn duplicate_inputs_are_merged() {
        let catalog = Catalog::builder()
            .machine("Assembler", "Assembler", 15.0, 150.0)
            .recipe(
                RecipeDef::new("Odd", "Assembler")
                    .input("Screw", 10.0)
                    .input("Screw", 5.0)
                    .output("Thing", 1.0),
            )
            .build()
            .unwrap();
        let recipe = catalog.get_recipe("Odd").unwrap();
        assert_eq!(recipe.inputs.len(), 1);
        assert_eq!(recipe.input_rate("Screw"), 15.0);
    }
}
