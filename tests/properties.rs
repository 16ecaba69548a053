//! Property tests for resolution and aggregation over the sample catalog.

use proptest::prelude::*;

use factory_planner::sample::sample_catalog;
use factory_planner::{
    SelectionPolicy, Summary, Traversal, aggregate, aggregate_with, combine, resolve,
};

/// Targets whose trees contain no cycle and neither consume nor byproduce the target
const ACYCLIC_TARGETS: &[&str] = &[
    "IronIngot",
    "IronPlate",
    "Screw",
    "ReinforcedIronPlate",
    "Plastic",
    "Fuel",
    "Power",
];

fn arb_target() -> impl Strategy<Value = &'static str> {
    prop::sample::select(ACYCLIC_TARGETS)
}

fn arb_rate() -> impl Strategy<Value = f64> {
    0.01f64..5000.0
}

/// Random choices among the sample alternates, including imports
fn arb_policy() -> impl Strategy<Value = SelectionPolicy> {
    (
        prop::sample::select(vec!["Screw", "Alternate: Cast Screw", "imported"]),
        prop::sample::select(vec![
            "Reinforced Iron Plate",
            "Alternate: Bolted Iron Plate",
        ]),
        prop::sample::select(vec!["Iron Ingot", "Alternate: Pure Iron Ingot", "imported"]),
    )
        .prop_map(|(screw, plate, ingot)| {
            let mut policy = SelectionPolicy::new().select("ReinforcedIronPlate", plate);
            policy = match screw {
                "imported" => policy.import("Screw"),
                recipe => policy.select("Screw", recipe),
            };
            match ingot {
                "imported" => policy.import("IronIngot"),
                recipe => policy.select("IronIngot", recipe),
            }
        })
}

fn assert_field_sum(combined: &Summary, a: &Summary, b: &Summary) -> Result<(), TestCaseError> {
    let maps = [
        (&combined.production, &a.production, &b.production),
        (&combined.consumption, &a.consumption, &b.consumption),
        (&combined.net_balance, &a.net_balance, &b.net_balance),
        (&combined.imports, &a.imports, &b.imports),
        (&combined.machine_counts, &a.machine_counts, &b.machine_counts),
    ];
    for (sum, left, right) in maps {
        for (key, value) in sum {
            let expected = 0.0
                + left.get(key).copied().unwrap_or(0.0)
                + right.get(key).copied().unwrap_or(0.0);
            prop_assert_eq!(*value, expected, "key {}", key);
        }
    }
    prop_assert_eq!(combined.power_total, a.power_total + b.power_total);
    prop_assert_eq!(combined.floor_space_total, a.floor_space_total + b.floor_space_total);
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// The root item nets exactly the requested rate.
    #[test]
    fn root_balance_equals_demand(target in arb_target(), rate in arb_rate()) {
        let catalog = sample_catalog().unwrap();
        let tree = resolve(&catalog, target, rate, &SelectionPolicy::new()).unwrap();
        let summary = aggregate(&tree);
        prop_assert_eq!(summary.net_balance[target], rate);
    }

    /// Every child rate is its parent's machine count times the recipe input rate.
    #[test]
    fn rates_are_conserved(rate in arb_rate(), policy in arb_policy()) {
        let catalog = sample_catalog().unwrap();
        let tree = resolve(&catalog, "ReinforcedIronPlate", rate, &policy).unwrap();
        for node in tree.nodes() {
            match node.recipe() {
                Some(recipe) => {
                    prop_assert_eq!(node.children.len(), recipe.inputs.len());
                    for child in &node.children {
                        prop_assert_eq!(
                            node.machine_count() * recipe.input_rate(&child.item),
                            child.target_rate
                        );
                    }
                }
                None => prop_assert!(node.children.is_empty()),
            }
        }
    }

    /// Visit order does not change a single bit of the summary.
    #[test]
    fn aggregation_ignores_visit_order(rate in arb_rate(), policy in arb_policy()) {
        let catalog = sample_catalog().unwrap();
        let tree = resolve(&catalog, "ReinforcedIronPlate", rate, &policy).unwrap();
        prop_assert_eq!(
            aggregate_with(&tree, Traversal::DepthFirst),
            aggregate_with(&tree, Traversal::BreadthFirst)
        );
    }

    /// A single weighted chain is the scaled summary.
    #[test]
    fn weighting_scales_every_field(
        target in arb_target(),
        rate in arb_rate(),
        weight in -10.0f64..10.0,
    ) {
        let catalog = sample_catalog().unwrap();
        let tree = resolve(&catalog, target, rate, &SelectionPolicy::new()).unwrap();
        prop_assert_eq!(combine(&[(&tree, weight)]), aggregate(&tree).scaled(weight));
    }

    /// Two unit-weight chains sum field by field.
    #[test]
    fn unit_weights_sum(
        first in arb_target(),
        second in arb_target(),
        rate_a in arb_rate(),
        rate_b in arb_rate(),
    ) {
        let catalog = sample_catalog().unwrap();
        let a = resolve(&catalog, first, rate_a, &SelectionPolicy::new()).unwrap();
        let b = resolve(&catalog, second, rate_b, &SelectionPolicy::new()).unwrap();
        let combined = combine(&[(&a, 1.0), (&b, 1.0)]);
        assert_field_sum(&combined, &aggregate(&a), &aggregate(&b))?;
    }

    /// Doubling the demand doubles the totals, up to rounding.
    #[test]
    fn resolution_is_linear_in_rate(target in arb_target(), rate in arb_rate()) {
        let catalog = sample_catalog().unwrap();
        let single = aggregate(&resolve(&catalog, target, rate, &SelectionPolicy::new()).unwrap());
        let double = aggregate(&resolve(&catalog, target, 2.0 * rate, &SelectionPolicy::new()).unwrap());
        let tolerance = 1e-9 * (1.0 + single.power_total.abs());
        prop_assert!((double.power_total - 2.0 * single.power_total).abs() <= 2.0 * tolerance);
        for (recipe, count) in &single.machine_counts {
            let diff = (double.machine_counts[recipe] - 2.0 * count).abs();
            prop_assert!(diff <= 1e-9 * (1.0 + count.abs()), "recipe {}", recipe);
        }
    }
}
