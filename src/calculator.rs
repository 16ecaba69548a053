//! Production chain calculator logic
//!
//! Expands a target item and rate into a [`ProductionTree`] by walking the
//! catalog depth first. Recipe cycles are cut by tracking the items on the
//! current branch: a revisit becomes an imported leaf carrying a
//! [`CycleWarning`] instead of recursing again.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::catalog::Catalog;
use crate::models::{Flow, Recipe, RecipeSelection};
use crate::tree::{CycleWarning, ImportReason, NodeSource, ProductionNode, ProductionTree};

/// Which catalog entry a lookup failed on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupTarget {
    Item(String),
    Recipe(String),
}

impl fmt::Display for LookupTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupTarget::Item(id) => write!(f, "item '{}'", id),
            LookupTarget::Recipe(id) => write!(f, "recipe '{}'", id),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ResolveError {
    #[error("unknown {0}")]
    CatalogLookup(LookupTarget),

    #[error("invalid demand of {rate}/min for '{item}': rate must be finite and positive")]
    InvalidDemand { item: String, rate: f64 },

    #[error("recipe '{recipe}' does not produce '{item}'")]
    InvalidSelection { item: String, recipe: String },

    #[error("invalid speed multiplier {multiplier} for recipe '{recipe}'")]
    InvalidSpeed { recipe: String, multiplier: f64 },
}

/// Forces a single tree position imported or expanded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeOverride {
    /// Items from the root down to and including the node
    pub path: Vec<String>,
    pub imported: bool,
}

/// User choices applied while resolving
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectionPolicy {
    /// Item id to recipe choice; unlisted items use the catalog default
    #[serde(default)]
    pub selections: BTreeMap<String, RecipeSelection>,
    /// Recipe id to clock multiplier; unlisted recipes run at 1.0
    #[serde(default)]
    pub speed_multipliers: BTreeMap<String, f64>,
    #[serde(default)]
    pub node_overrides: Vec<NodeOverride>,
}

impl SelectionPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(mut self, item: impl Into<String>, recipe: impl Into<String>) -> Self {
        self.selections
            .insert(item.into(), RecipeSelection::Recipe(recipe.into()));
        self
    }

    pub fn import(mut self, item: impl Into<String>) -> Self {
        self.selections.insert(item.into(), RecipeSelection::Imported);
        self
    }

    pub fn speed(mut self, recipe: impl Into<String>, multiplier: f64) -> Self {
        self.speed_multipliers.insert(recipe.into(), multiplier);
        self
    }

    pub fn override_node<I, S>(mut self, path: I, imported: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let path: Vec<String> = path.into_iter().map(Into::into).collect();
        self.node_overrides.retain(|o| o.path != path);
        self.node_overrides.push(NodeOverride { path, imported });
        self
    }

    pub fn selection(&self, item: &str) -> Option<&RecipeSelection> {
        self.selections.get(item)
    }

    fn node_override(&self, path: &[String]) -> Option<bool> {
        self.node_overrides
            .iter()
            .rev()
            .find(|o| o.path == path)
            .map(|o| o.imported)
    }

    fn speed_for(&self, recipe: &str) -> Result<f64, ResolveError> {
        let multiplier = self.speed_multipliers.get(recipe).copied().unwrap_or(1.0);
        if !multiplier.is_finite() || multiplier <= 0.0 {
            return Err(ResolveError::InvalidSpeed {
                recipe: recipe.to_string(),
                multiplier,
            });
        }
        Ok(multiplier)
    }
}

/// Calculate the production tree for a target item at a given rate
///
/// Lookup and validation errors abort the whole resolution. Cycles do not:
/// the repeated item becomes an imported leaf annotated with a
/// [`CycleWarning`].
pub fn resolve(
    catalog: &Catalog,
    target_item: &str,
    target_rate: f64,
    policy: &SelectionPolicy,
) -> Result<ProductionTree, ResolveError> {
    if !target_rate.is_finite() || target_rate <= 0.0 {
        return Err(ResolveError::InvalidDemand {
            item: target_item.to_string(),
            rate: target_rate,
        });
    }
    if catalog.get_item(target_item).is_none() {
        return Err(ResolveError::CatalogLookup(LookupTarget::Item(
            target_item.to_string(),
        )));
    }

    let mut resolver = Resolver {
        catalog,
        policy,
        path: Vec::new(),
    };
    let root = resolver.expand(target_item, target_rate)?;
    let tree = ProductionTree {
        target_item: target_item.to_string(),
        target_rate,
        root,
    };

    info!(
        item = target_item,
        rate = target_rate,
        nodes = tree.node_count(),
        cycles = tree.warnings().len(),
        "resolved production tree"
    );
    Ok(tree)
}

struct Resolver<'a> {
    catalog: &'a Catalog,
    policy: &'a SelectionPolicy,
    /// Items currently being expanded, root first
    path: Vec<String>,
}

impl Resolver<'_> {
    fn expand(&mut self, item: &str, rate: f64) -> Result<ProductionNode, ResolveError> {
        let on_path = self.path.iter().any(|p| p == item);
        self.path.push(item.to_string());
        let node = self.expand_on_path(item, rate, on_path);
        self.path.pop();
        node
    }

    fn expand_on_path(
        &mut self,
        item: &str,
        rate: f64,
        on_path: bool,
    ) -> Result<ProductionNode, ResolveError> {
        let selection = self.policy.selection(item);
        let imported = match self.policy.node_override(&self.path) {
            Some(true) => Some(ImportReason::NodeOverride),
            Some(false) => None,
            None => matches!(selection, Some(RecipeSelection::Imported))
                .then_some(ImportReason::Selected),
        };
        if let Some(reason) = imported {
            return Ok(ProductionNode::imported(item, rate, reason));
        }

        if !self.catalog.is_producible(item) {
            return Ok(ProductionNode::imported(item, rate, ImportReason::RawResource));
        }

        if on_path {
            warn!(item, path = ?self.path, "recipe cycle broken, treating item as imported");
            let mut node = ProductionNode::imported(item, rate, ImportReason::CycleBroken);
            node.cycle_warning = Some(CycleWarning {
                item: item.to_string(),
                path: self.path.clone(),
            });
            return Ok(node);
        }

        let recipe = self.select_recipe(item, selection)?;
        let speed = self.policy.speed_for(&recipe.id)?;
        let output_rate = recipe.output_rate(item) * speed;
        let machine_count = rate / output_rate;
        let scale = machine_count * speed;

        debug!(
            item,
            rate,
            recipe = %recipe.id,
            machines = machine_count,
            "expanding node"
        );

        let mut children = Vec::with_capacity(recipe.inputs.len());
        for input in &recipe.inputs {
            let child_rate = scale * input.rate;
            children.push(self.expand(&input.item, child_rate)?);
        }

        let byproducts = recipe
            .byproducts_of(item)
            .map(|f| Flow::new(f.item.clone(), scale * f.rate))
            .collect();

        Ok(ProductionNode {
            item: item.to_string(),
            target_rate: rate,
            source: NodeSource::Produced {
                recipe,
                machine_count,
                speed,
            },
            children,
            byproducts,
            cycle_warning: None,
        })
    }

    fn select_recipe(
        &self,
        item: &str,
        selection: Option<&RecipeSelection>,
    ) -> Result<Arc<Recipe>, ResolveError> {
        match selection {
            Some(RecipeSelection::Recipe(id)) => {
                let recipe = self
                    .catalog
                    .get_recipe(id)
                    .ok_or_else(|| ResolveError::CatalogLookup(LookupTarget::Recipe(id.clone())))?;
                if !recipe.produces(item) {
                    return Err(ResolveError::InvalidSelection {
                        item: item.to_string(),
                        recipe: id.clone(),
                    });
                }
                Ok(Arc::clone(recipe))
            }
            // Imported selections overridden back to expansion use the default.
            Some(RecipeSelection::Imported) | None => self
                .catalog
                .default_recipe(item)
                .cloned()
                .ok_or_else(|| ResolveError::CatalogLookup(LookupTarget::Item(item.to_string()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::RecipeDef;

    /// R1: 30 ItemY -> 60 ItemX, 10 MW, 4 m2
    fn example_catalog() -> Catalog {
        Catalog::builder()
            .machine("M1", "Machine One", 10.0, 4.0)
            .recipe(
                RecipeDef::new("R1", "M1")
                    .input("ItemY", 30.0)
                    .output("ItemX", 60.0),
            )
            .build()
            .unwrap()
    }

    fn cyclic_catalog() -> Catalog {
        Catalog::builder()
            .machine("M", "Machine", 1.0, 1.0)
            .recipe(RecipeDef::new("MakeA", "M").input("B", 10.0).output("A", 10.0))
            .recipe(RecipeDef::new("MakeB", "M").input("A", 5.0).output("B", 10.0))
            .build()
            .unwrap()
    }

    #[test]
    fn example_scenario_machine_count() {
        let catalog = example_catalog();
        let tree = resolve(&catalog, "ItemX", 120.0, &SelectionPolicy::new()).unwrap();
        assert_eq!(tree.root.machine_count(), 2.0);
        assert_eq!(tree.root.children.len(), 1);
        let child = &tree.root.children[0];
        assert_eq!(child.item, "ItemY");
        assert_eq!(child.target_rate, 60.0);
        assert_eq!(child.import_reason(), Some(ImportReason::RawResource));
    }

    #[test]
    fn zero_and_negative_demand_rejected() {
        let catalog = example_catalog();
        for rate in [0.0, -5.0, f64::NAN, f64::INFINITY] {
            let err = resolve(&catalog, "ItemX", rate, &SelectionPolicy::new()).unwrap_err();
            assert!(matches!(err, ResolveError::InvalidDemand { .. }), "rate {rate}");
        }
    }

    #[test]
    fn unknown_item_is_lookup_error() {
        let catalog = example_catalog();
        let err = resolve(&catalog, "DoesNotExist", 10.0, &SelectionPolicy::new()).unwrap_err();
        assert_eq!(
            err,
            ResolveError::CatalogLookup(LookupTarget::Item("DoesNotExist".to_string()))
        );
    }

    #[test]
    fn unknown_recipe_is_lookup_error() {
        let catalog = example_catalog();
        let policy = SelectionPolicy::new().select("ItemX", "Nope");
        let err = resolve(&catalog, "ItemX", 10.0, &policy).unwrap_err();
        assert_eq!(
            err,
            ResolveError::CatalogLookup(LookupTarget::Recipe("Nope".to_string()))
        );
    }

    #[test]
    fn selection_must_produce_item() {
        let catalog = cyclic_catalog();
        let policy = SelectionPolicy::new().select("A", "MakeB");
        let err = resolve(&catalog, "A", 10.0, &policy).unwrap_err();
        assert_eq!(
            err,
            ResolveError::InvalidSelection {
                item: "A".to_string(),
                recipe: "MakeB".to_string()
            }
        );
    }

    #[test]
    fn imported_root_is_leaf() {
        let catalog = example_catalog();
        let policy = SelectionPolicy::new().import("ItemX");
        let tree = resolve(&catalog, "ItemX", 42.0, &policy).unwrap();
        assert!(tree.root.children.is_empty());
        assert_eq!(tree.root.import_reason(), Some(ImportReason::Selected));
        assert_eq!(tree.root.target_rate, 42.0);
    }

    #[test]
    fn cycle_terminates_with_warning() {
        let catalog = cyclic_catalog();
        let tree = resolve(&catalog, "A", 10.0, &SelectionPolicy::new()).unwrap();
        // A -> B -> A(cut)
        assert_eq!(tree.node_count(), 3);
        let cut = &tree.root.children[0].children[0];
        assert_eq!(cut.item, "A");
        assert_eq!(cut.import_reason(), Some(ImportReason::CycleBroken));
        let warning = cut.cycle_warning.as_ref().unwrap();
        assert_eq!(warning.path, vec!["A", "B", "A"]);
        assert_eq!(tree.warnings().len(), 1);
    }

    #[test]
    fn node_override_imports_one_position() {
        let catalog = cyclic_catalog();
        let policy = SelectionPolicy::new().override_node(["A", "B"], true);
        let tree = resolve(&catalog, "A", 10.0, &policy).unwrap();
        let b = &tree.root.children[0];
        assert_eq!(b.import_reason(), Some(ImportReason::NodeOverride));
        assert!(tree.warnings().is_empty());
    }

    #[test]
    fn node_override_can_expand_imported_item() {
        let catalog = example_catalog();
        let policy = SelectionPolicy::new()
            .import("ItemX")
            .override_node(["ItemX"], false);
        let tree = resolve(&catalog, "ItemX", 60.0, &policy).unwrap();
        assert_eq!(tree.root.recipe().unwrap().id, "R1");
    }

    #[test]
    fn speed_multiplier_reduces_machines() {
        let catalog = example_catalog();
        let policy = SelectionPolicy::new().speed("R1", 2.0);
        let tree = resolve(&catalog, "ItemX", 120.0, &policy).unwrap();
        assert_eq!(tree.root.machine_count(), 1.0);
        assert_eq!(tree.root.children[0].target_rate, 60.0);
    }

    #[test]
    fn invalid_speed_rejected() {
        let catalog = example_catalog();
        let policy = SelectionPolicy::new().speed("R1", 0.0);
        let err = resolve(&catalog, "ItemX", 120.0, &policy).unwrap_err();
        assert!(matches!(err, ResolveError::InvalidSpeed { .. }));
    }

    #[test]
    fn byproducts_recorded_not_expanded() {
        let catalog = Catalog::builder()
            .machine("Refinery", "Refinery", 30.0, 200.0)
            .recipe(
                RecipeDef::new("Plastic", "Refinery")
                    .input("CrudeOil", 30.0)
                    .output("Plastic", 20.0)
                    .output("HeavyOilResidue", 10.0),
            )
            .build()
            .unwrap();
        let tree = resolve(&catalog, "Plastic", 40.0, &SelectionPolicy::new()).unwrap();
        assert_eq!(tree.root.children.len(), 1);
        assert_eq!(tree.root.byproducts, vec![Flow::new("HeavyOilResidue", 20.0)]);
    }

    #[test]
    fn rate_conservation_holds_exactly() {
        let catalog = example_catalog();
        let tree = resolve(&catalog, "ItemX", 37.3, &SelectionPolicy::new()).unwrap();
        for node in tree.nodes() {
            if let Some(recipe) = node.recipe() {
                for child in &node.children {
                    assert_eq!(node.machine_count() * recipe.input_rate(&child.item), child.target_rate);
                }
            }
        }
    }
}
