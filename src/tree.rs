//! Production tree built by the calculator
//!
//! Every node owns its children outright; the same recipe may appear at
//! several positions with different rates.

use std::collections::VecDeque;
use std::sync::Arc;

use serde::Serialize;

use crate::models::{Flow, Recipe};

/// Why a node was not expanded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportReason {
    /// The selection policy marks the item imported
    Selected,
    /// A per-node override marks this position imported
    NodeOverride,
    /// No recipe in the catalog produces the item
    RawResource,
    /// The item is already being expanded higher up this branch
    CycleBroken,
}

/// Annotation left on a node where a recipe cycle was cut
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleWarning {
    pub item: String,
    /// Items from the root down to and including the revisited item
    pub path: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeSource {
    Produced {
        #[serde(serialize_with = "serialize_recipe_id")]
        recipe: Arc<Recipe>,
        machine_count: f64,
        speed: f64,
    },
    Imported {
        reason: ImportReason,
    },
}

fn serialize_recipe_id<S: serde::Serializer>(recipe: &Arc<Recipe>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&recipe.id)
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductionNode {
    pub item: String,
    pub target_rate: f64,
    pub source: NodeSource,
    pub children: Vec<ProductionNode>,
    /// Extra outputs of the recipe at this node's rate
    pub byproducts: Vec<Flow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cycle_warning: Option<CycleWarning>,
}

impl ProductionNode {
    pub fn imported(item: impl Into<String>, target_rate: f64, reason: ImportReason) -> Self {
        Self {
            item: item.into(),
            target_rate,
            source: NodeSource::Imported { reason },
            children: Vec::new(),
            byproducts: Vec::new(),
            cycle_warning: None,
        }
    }

    pub fn recipe(&self) -> Option<&Arc<Recipe>> {
        match &self.source {
            NodeSource::Produced { recipe, .. } => Some(recipe),
            NodeSource::Imported { .. } => None,
        }
    }

    /// Continuous machine-equivalents; zero for imported leaves
    pub fn machine_count(&self) -> f64 {
        match self.source {
            NodeSource::Produced { machine_count, .. } => machine_count,
            NodeSource::Imported { .. } => 0.0,
        }
    }

    pub fn speed(&self) -> f64 {
        match self.source {
            NodeSource::Produced { speed, .. } => speed,
            NodeSource::Imported { .. } => 1.0,
        }
    }

    pub fn is_imported(&self) -> bool {
        matches!(self.source, NodeSource::Imported { .. })
    }

    pub fn import_reason(&self) -> Option<ImportReason> {
        match self.source {
            NodeSource::Imported { reason } => Some(reason),
            NodeSource::Produced { .. } => None,
        }
    }

    pub fn power_draw(&self) -> f64 {
        self.recipe()
            .map_or(0.0, |r| self.machine_count() * r.machine.power_mw)
    }

    /// Generated power follows the clock like item outputs do
    pub fn power_generation(&self) -> f64 {
        self.recipe().map_or(0.0, |r| {
            self.machine_count() * self.speed() * r.power_generation_mw
        })
    }

    pub fn floor_space(&self) -> f64 {
        self.recipe()
            .map_or(0.0, |r| self.machine_count() * r.machine.footprint_m2)
    }

    /// This node and all descendants, depth first, pre-order
    pub fn iter(&self) -> DepthFirst<'_> {
        DepthFirst { stack: vec![self] }
    }

    pub fn iter_breadth_first(&self) -> BreadthFirst<'_> {
        BreadthFirst {
            queue: VecDeque::from([self]),
        }
    }
}

pub struct DepthFirst<'a> {
    stack: Vec<&'a ProductionNode>,
}

impl<'a> Iterator for DepthFirst<'a> {
    type Item = &'a ProductionNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

pub struct BreadthFirst<'a> {
    queue: VecDeque<&'a ProductionNode>,
}

impl<'a> Iterator for BreadthFirst<'a> {
    type Item = &'a ProductionNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.queue.pop_front()?;
        self.queue.extend(node.children.iter());
        Some(node)
    }
}

/// A resolved demand tree for one target item and rate
#[derive(Debug, Clone, Serialize)]
pub struct ProductionTree {
    pub target_item: String,
    pub target_rate: f64,
    pub root: ProductionNode,
}

impl ProductionTree {
    pub fn nodes(&self) -> DepthFirst<'_> {
        self.root.iter()
    }

    pub fn node_count(&self) -> usize {
        self.nodes().count()
    }

    /// Every cycle that was cut while resolving
    pub fn warnings(&self) -> Vec<&CycleWarning> {
        self.nodes().filter_map(|n| n.cycle_warning.as_ref()).collect()
    }

    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack = vec![(&self.root, 1usize)];
        while let Some((node, depth)) = stack.pop() {
            deepest = deepest.max(depth);
            stack.extend(node.children.iter().map(|c| (c, depth + 1)));
        }
        deepest
    }
}

/// Format a production tree as indented text
pub fn format_production_tree(tree: &ProductionTree) -> String {
    let mut output = String::new();
    let mut stack = vec![(&tree.root, 0usize)];
    while let Some((node, indent)) = stack.pop() {
        format_node(&mut output, node, indent);
        stack.extend(node.children.iter().rev().map(|c| (c, indent + 1)));
    }
    output
}

fn format_node(output: &mut String, node: &ProductionNode, indent: usize) {
    let prefix = "  ".repeat(indent);
    match &node.source {
        NodeSource::Imported { reason } => {
            let note = match reason {
                ImportReason::Selected | ImportReason::NodeOverride => "imported",
                ImportReason::RawResource => "raw input",
                ImportReason::CycleBroken => "cycle broken, imported",
            };
            output.push_str(&format!(
                "{}-> {} @ {:.3}/min ({})\n",
                prefix, node.item, node.target_rate, note
            ));
        }
        NodeSource::Produced {
            recipe,
            machine_count,
            speed,
        } => {
            let clock = if (*speed - 1.0).abs() > f64::EPSILON {
                format!(" @ {:.0}%", speed * 100.0)
            } else {
                String::new()
            };
            output.push_str(&format!(
                "{}{} @ {:.3}/min: {:.2}x {} [{}]{} ({:.1} MW)\n",
                prefix,
                node.item,
                node.target_rate,
                machine_count,
                recipe.machine.name,
                recipe.name,
                clock,
                node.power_draw() - node.power_generation()
            ));
            for byproduct in &node.byproducts {
                output.push_str(&format!(
                    "{}  + byproduct {} @ {:.3}/min\n",
                    prefix, byproduct.item, byproduct.rate
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Machine;

    fn leaf(item: &str, rate: f64) -> ProductionNode {
        ProductionNode::imported(item, rate, ImportReason::RawResource)
    }

    fn sample_tree() -> ProductionTree {
        let mut root = leaf("A", 1.0);
        let mut b = leaf("B", 2.0);
        b.children.push(leaf("D", 4.0));
        root.children.push(b);
        root.children.push(leaf("C", 3.0));
        ProductionTree {
            target_item: "A".to_string(),
            target_rate: 1.0,
            root,
        }
    }

    #[test]
    fn depth_first_is_pre_order() {
        let tree = sample_tree();
        let order: Vec<_> = tree.nodes().map(|n| n.item.as_str()).collect();
        assert_eq!(order, vec!["A", "B", "D", "C"]);
    }

    #[test]
    fn breadth_first_visits_levels() {
        let tree = sample_tree();
        let order: Vec<_> = tree.root.iter_breadth_first().map(|n| n.item.as_str()).collect();
        assert_eq!(order, vec!["A", "B", "C", "D"]);
    }

    #[test]
    fn depth_counts_levels() {
        assert_eq!(sample_tree().depth(), 3);
        assert_eq!(sample_tree().node_count(), 4);
    }

    #[test]
    fn imported_leaf_has_no_machines() {
        let node = leaf("IronOre", 60.0);
        assert!(node.is_imported());
        assert_eq!(node.machine_count(), 0.0);
        assert_eq!(node.power_draw(), 0.0);
        assert!(node.recipe().is_none());
    }

    #[test]
    fn overclocked_generator_scales_generation_not_draw() {
        let recipe = Recipe {
            id: "Coal Power".to_string(),
            name: "Coal Power".to_string(),
            machine: Machine {
                id: "CoalGenerator".to_string(),
                name: "Coal Generator".to_string(),
                power_mw: 2.0,
                footprint_m2: 260.0,
            },
            inputs: vec![Flow::new("Coal", 15.0)],
            outputs: vec![Flow::new("Power", 75.0)],
            power_generation_mw: 75.0,
        };
        let node = ProductionNode {
            item: "Power".to_string(),
            target_rate: 150.0,
            source: NodeSource::Produced {
                recipe: Arc::new(recipe),
                machine_count: 1.0,
                speed: 2.0,
            },
            children: Vec::new(),
            byproducts: Vec::new(),
            cycle_warning: None,
        };
        assert_eq!(node.power_generation(), 150.0);
        assert_eq!(node.power_draw(), 2.0);
        assert_eq!(node.floor_space(), 260.0);
    }

    #[test]
    fn format_marks_raw_inputs() {
        let text = format_production_tree(&sample_tree());
        assert!(text.starts_with("-> A @ 1.000/min (raw input)"));
        assert!(text.contains("\n    -> D @ 4.000/min"));
    }
}
