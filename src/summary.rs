//! Reduction of a production tree into totals
//!
//! Every field of a [`Summary`] is a sum over nodes. Terms are collected
//! first and summed in sorted order, so the result does not depend on the
//! order in which nodes are visited.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use tracing::info;

use crate::tree::{ProductionNode, ProductionTree};

/// Net balances below this are treated as a deficit
pub const BALANCE_TOLERANCE: f64 = 1e-3;

/// Node visit order used while aggregating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Traversal {
    #[default]
    DepthFirst,
    BreadthFirst,
}

/// Totals for a production tree or a linear combination of trees
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Summary {
    /// Requested output per target item
    pub targets: BTreeMap<String, f64>,
    /// Primary output of every produced node plus all byproducts
    pub production: BTreeMap<String, f64>,
    /// Input demand of every produced node, summed over consumers
    pub consumption: BTreeMap<String, f64>,
    pub net_balance: BTreeMap<String, f64>,
    /// Demand met from outside the chain
    pub imports: BTreeMap<String, f64>,
    /// Machine-equivalents per recipe id
    pub machine_counts: BTreeMap<String, f64>,
    /// Machine-equivalents per machine id
    pub machine_counts_by_type: BTreeMap<String, f64>,
    pub power_consumption: f64,
    pub power_generation: f64,
    /// Consumption minus generation (MW)
    pub power_total: f64,
    /// m²
    pub floor_space_total: f64,
}

impl Summary {
    /// Items whose net balance is a deficit, with the missing rate
    pub fn base_resources(&self) -> BTreeMap<&str, f64> {
        self.net_balance
            .iter()
            .filter(|(_, net)| **net < -BALANCE_TOLERANCE)
            .map(|(item, net)| (item.as_str(), -net))
            .collect()
    }

    /// Whole machines to build per recipe
    pub fn rounded_machine_counts(&self) -> BTreeMap<&str, u64> {
        self.machine_counts
            .iter()
            .map(|(recipe, count)| (recipe.as_str(), whole_machines(*count)))
            .collect()
    }

    pub fn net(&self, item: &str) -> f64 {
        self.net_balance.get(item).copied().unwrap_or(0.0)
    }
}

/// Round a fractional machine count up, ignoring float noise just above an integer
fn whole_machines(count: f64) -> u64 {
    if count <= 0.0 {
        return 0;
    }
    let nearest = count.round();
    if (count - nearest).abs() < 1e-9 {
        nearest as u64
    } else {
        count.ceil() as u64
    }
}

/// Per-key terms, summed canonically on finish
#[derive(Default)]
struct Terms(BTreeMap<String, Vec<f64>>);

impl Terms {
    fn add(&mut self, key: &str, value: f64) {
        self.0.entry(key.to_string()).or_default().push(value);
    }

    fn finish(self) -> BTreeMap<String, f64> {
        self.0
            .into_iter()
            .map(|(key, values)| (key, canonical_sum(values)))
            .collect()
    }
}

fn canonical_sum(mut values: Vec<f64>) -> f64 {
    values.sort_by(f64::total_cmp);
    values.into_iter().fold(0.0, |acc, v| acc + v)
}

#[derive(Default)]
struct Collector {
    production: Terms,
    consumption: Terms,
    imports: Terms,
    machine_counts: Terms,
    machine_counts_by_type: Terms,
    power_consumption: Vec<f64>,
    power_generation: Vec<f64>,
    floor_space: Vec<f64>,
}

impl Collector {
    fn visit(&mut self, node: &ProductionNode) {
        let Some(recipe) = node.recipe() else {
            self.imports.add(&node.item, node.target_rate);
            return;
        };

        self.production.add(&node.item, node.target_rate);
        for byproduct in &node.byproducts {
            self.production.add(&byproduct.item, byproduct.rate);
        }
        for child in &node.children {
            self.consumption.add(&child.item, child.target_rate);
        }

        let count = node.machine_count();
        self.machine_counts.add(&recipe.id, count);
        self.machine_counts_by_type.add(&recipe.machine.id, count);
        self.power_consumption.push(node.power_draw());
        self.power_generation.push(node.power_generation());
        self.floor_space.push(node.floor_space());
    }

    fn finish(self, target_item: &str, target_rate: f64) -> Summary {
        let production = self.production.finish();
        let consumption = self.consumption.finish();
        let power_consumption = canonical_sum(self.power_consumption);
        let power_generation = canonical_sum(self.power_generation);

        Summary {
            targets: BTreeMap::from([(target_item.to_string(), target_rate)]),
            net_balance: net_balance(&production, &consumption),
            production,
            consumption,
            imports: self.imports.finish(),
            machine_counts: self.machine_counts.finish(),
            machine_counts_by_type: self.machine_counts_by_type.finish(),
            power_consumption,
            power_generation,
            power_total: power_consumption - power_generation,
            floor_space_total: canonical_sum(self.floor_space),
        }
    }
}

pub(crate) fn net_balance(
    production: &BTreeMap<String, f64>,
    consumption: &BTreeMap<String, f64>,
) -> BTreeMap<String, f64> {
    let mut net = BTreeMap::new();
    for (item, rate) in production {
        net.insert(item.clone(), *rate - consumption.get(item).copied().unwrap_or(0.0));
    }
    for (item, rate) in consumption {
        net.entry(item.clone()).or_insert(-*rate);
    }
    net
}

/// Aggregate a tree, visiting nodes depth first
pub fn aggregate(tree: &ProductionTree) -> Summary {
    aggregate_with(tree, Traversal::DepthFirst)
}

pub fn aggregate_with(tree: &ProductionTree, traversal: Traversal) -> Summary {
    let mut collector = Collector::default();
    match traversal {
        Traversal::DepthFirst => tree.root.iter().for_each(|n| collector.visit(n)),
        Traversal::BreadthFirst => tree
            .root
            .iter_breadth_first()
            .for_each(|n| collector.visit(n)),
    }
    let summary = collector.finish(&tree.target_item, tree.target_rate);

    info!(
        item = %tree.target_item,
        power_mw = summary.power_total,
        floor_m2 = summary.floor_space_total,
        "aggregated production tree"
    );
    summary
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Production Summary ===")?;
        for (item, rate) in &self.targets {
            writeln!(f, "Target: {} @ {:.3}/min", item, rate)?;
        }
        writeln!(f)?;

        writeln!(f, "Machines required:")?;
        let rounded = self.rounded_machine_counts();
        for (recipe, count) in &self.machine_counts {
            let whole = rounded.get(recipe.as_str()).copied().unwrap_or(0);
            writeln!(f, "  {:.2}x {} (build {})", count, recipe, whole)?;
        }
        if !self.machine_counts_by_type.is_empty() {
            writeln!(f, "  by machine:")?;
            for (machine, count) in &self.machine_counts_by_type {
                writeln!(f, "    {:.2}x {}", count, machine)?;
            }
        }
        writeln!(f)?;

        writeln!(f, "Imported inputs:")?;
        for (item, rate) in &self.imports {
            writeln!(f, "  {} @ {:.3}/min", item, rate)?;
        }
        writeln!(f)?;

        writeln!(f, "Net balance:")?;
        for (item, net) in &self.net_balance {
            if net.abs() < BALANCE_TOLERANCE {
                continue;
            }
            let label = if *net > 0.0 { "surplus" } else { "deficit" };
            writeln!(f, "  {} {:+.3}/min ({})", item, net, label)?;
        }
        writeln!(f)?;

        writeln!(f, "Power:")?;
        writeln!(f, "  Consumption: {:.1} MW", self.power_consumption)?;
        writeln!(f, "  Generation:  {:.1} MW", self.power_generation)?;
        writeln!(f, "  Net draw:    {:.1} MW", self.power_total)?;
        writeln!(f)?;

        writeln!(f, "Floor space: {:.1} m²", self.floor_space_total)?;

        Ok(())
    }
}
