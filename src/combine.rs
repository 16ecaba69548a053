//! Linear combination of production chains
//!
//! Chains are combined at the summary level: each tree is aggregated on its
//! own, scaled by its weight and added field by field. Negative weights go
//! through the same arithmetic.

use std::collections::BTreeMap;

use tracing::info;

use crate::summary::{Summary, aggregate};
use crate::tree::ProductionTree;

fn scale_map(map: &BTreeMap<String, f64>, weight: f64) -> BTreeMap<String, f64> {
    map.iter().map(|(k, v)| (k.clone(), v * weight)).collect()
}

fn add_map(into: &mut BTreeMap<String, f64>, from: &BTreeMap<String, f64>) {
    for (key, value) in from {
        *into.entry(key.clone()).or_insert(0.0) += value;
    }
}

impl Summary {
    /// Every numeric field multiplied by `weight`
    pub fn scaled(&self, weight: f64) -> Summary {
        Summary {
            targets: scale_map(&self.targets, weight),
            production: scale_map(&self.production, weight),
            consumption: scale_map(&self.consumption, weight),
            net_balance: scale_map(&self.net_balance, weight),
            imports: scale_map(&self.imports, weight),
            machine_counts: scale_map(&self.machine_counts, weight),
            machine_counts_by_type: scale_map(&self.machine_counts_by_type, weight),
            power_consumption: self.power_consumption * weight,
            power_generation: self.power_generation * weight,
            power_total: self.power_total * weight,
            floor_space_total: self.floor_space_total * weight,
        }
    }

    /// Add `other` field by field; keys missing on either side count as zero
    pub fn accumulate(&mut self, other: &Summary) {
        add_map(&mut self.targets, &other.targets);
        add_map(&mut self.production, &other.production);
        add_map(&mut self.consumption, &other.consumption);
        add_map(&mut self.net_balance, &other.net_balance);
        add_map(&mut self.imports, &other.imports);
        add_map(&mut self.machine_counts, &other.machine_counts);
        add_map(&mut self.machine_counts_by_type, &other.machine_counts_by_type);
        self.power_consumption += other.power_consumption;
        self.power_generation += other.power_generation;
        self.power_total += other.power_total;
        self.floor_space_total += other.floor_space_total;
    }
}

/// Weighted sum of already aggregated summaries
pub fn combine_summaries<'a, I>(summaries: I) -> Summary
where
    I: IntoIterator<Item = (&'a Summary, f64)>,
{
    let mut combined = Summary::default();
    for (summary, weight) in summaries {
        combined.accumulate(&summary.scaled(weight));
    }
    combined
}

/// Aggregate each tree and sum the weighted summaries
pub fn combine(chains: &[(&ProductionTree, f64)]) -> Summary {
    let summaries: Vec<(Summary, f64)> = chains
        .iter()
        .map(|(tree, weight)| (aggregate(tree), *weight))
        .collect();
    let combined = combine_summaries(summaries.iter().map(|(s, w)| (s, *w)));

    info!(
        chains = chains.len(),
        power_mw = combined.power_total,
        "combined production chains"
    );
    combined
}
