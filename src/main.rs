//! Factory Planner CLI
//!
//! Production chain planner over a SQLite recipe catalog.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use factory_planner::storage::ChainStorage;
use factory_planner::tree::format_production_tree;
use factory_planner::{
    Catalog, ProductionTree, SavedChain, SelectionPolicy, Summary, aggregate, combine, db, import,
    resolve, sample,
};

#[derive(Parser)]
#[command(name = "factory-planner")]
#[command(about = "Production chain planner: machines, power and floor space for a target rate")]
struct Cli {
    /// Path to the SQLite catalog database
    #[arg(short, long, env = "FACTORY_PLANNER_DB", default_value = "factory_data.db")]
    database: PathBuf,

    /// Directory holding saved chains
    #[arg(long, env = "FACTORY_PLANNER_CHAINS", default_value = "saved_chains")]
    chains_dir: PathBuf,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, env = "FACTORY_PLANNER_LOG", default_value = "warn")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize empty database with schema
    Init,

    /// Import recipe tables (a .tsv file or a directory of them)
    Import {
        source: PathBuf,

        /// Clear existing catalog before importing
        #[arg(long)]
        clear: bool,
    },

    /// Load the built-in sample catalog
    LoadSample,

    /// Calculate the production chain for a target item
    Calc {
        /// Target item id (e.g. "ReinforcedIronPlate")
        item: String,

        /// Target production rate per minute
        #[arg(short, long, default_value = "1.0")]
        rate: f64,

        /// Recipe choice as ITEM=RECIPE (repeatable)
        #[arg(long = "recipe", value_name = "ITEM=RECIPE")]
        recipes: Vec<String>,

        /// Treat an item as imported (repeatable)
        #[arg(long = "import", value_name = "ITEM")]
        imports: Vec<String>,

        /// Clock multiplier as RECIPE=FACTOR (repeatable)
        #[arg(long = "speed", value_name = "RECIPE=FACTOR")]
        speeds: Vec<String>,

        /// Import one tree position, given as ROOT>...>ITEM (repeatable)
        #[arg(long = "import-at", value_name = "PATH")]
        import_at: Vec<String>,

        /// Expand one tree position even if its item is imported (repeatable)
        #[arg(long = "expand-at", value_name = "PATH")]
        expand_at: Vec<String>,

        /// Show detailed production tree
        #[arg(short, long)]
        verbose: bool,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,

        /// Save the chain under this name
        #[arg(long)]
        save: Option<String>,
    },

    /// Re-resolve a saved chain against the current catalog
    Load {
        path: PathBuf,

        #[arg(short, long)]
        verbose: bool,

        #[arg(long)]
        json: bool,
    },

    /// Combine saved chains as PATH[:WEIGHT] (weight defaults to 1)
    Combine {
        #[arg(required = true)]
        chains: Vec<String>,

        #[arg(long)]
        json: bool,
    },

    /// List all items in the catalog
    ListItems,

    /// List machines, or show one machine and the recipes it runs
    ListMachines { id: Option<String> },

    /// List recipes, optionally only those producing ITEM
    ListRecipes { item: Option<String> },

    /// Show details for a specific recipe
    Recipe { id: String },

    /// List saved chains
    ListChains,

    /// Delete a saved chain file
    DeleteChain { path: PathBuf },
}

fn init_logging(cli: &Cli) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    let registry = tracing_subscriber::registry().with(env_filter);
    if cli.log_json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

/// Split `KEY=VALUE`
fn parse_pair(raw: &str) -> Result<(String, String)> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() && !value.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => bail!("expected KEY=VALUE, got '{}'", raw),
    }
}

/// Split `PATH[:WEIGHT]`; a suffix that is not a number is part of the path
fn parse_weighted(raw: &str) -> (PathBuf, f64) {
    if let Some((path, weight)) = raw.rsplit_once(':') {
        if let Ok(weight) = weight.parse::<f64>() {
            return (PathBuf::from(path), weight);
        }
    }
    (PathBuf::from(raw), 1.0)
}

/// Split a `ROOT>...>ITEM` tree position
fn parse_node_path(raw: &str) -> Result<Vec<String>> {
    let path: Vec<String> = raw.split('>').map(|s| s.trim().to_string()).collect();
    if path.iter().any(|s| s.is_empty()) {
        bail!("expected ROOT>...>ITEM, got '{}'", raw);
    }
    Ok(path)
}

fn build_policy(
    recipes: &[String],
    imports: &[String],
    speeds: &[String],
    overrides: &[(&[String], bool)],
) -> Result<SelectionPolicy> {
    let mut policy = SelectionPolicy::new();
    for raw in recipes {
        let (item, recipe) = parse_pair(raw)?;
        policy = policy.select(item, recipe);
    }
    for item in imports {
        policy = policy.import(item.clone());
    }
    for raw in speeds {
        let (recipe, factor) = parse_pair(raw)?;
        let factor: f64 = factor
            .parse()
            .with_context(|| format!("invalid speed factor in '{}'", raw))?;
        policy = policy.speed(recipe, factor);
    }
    for (paths, imported) in overrides {
        for raw in paths.iter() {
            policy = policy.override_node(parse_node_path(raw)?, *imported);
        }
    }
    Ok(policy)
}

fn print_result(tree: &ProductionTree, summary: &Summary, verbose: bool, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }

    if verbose {
        println!("Production chain:\n");
        println!("{}", format_production_tree(tree));
    }
    for warning in tree.warnings() {
        println!(
            "warning: cycle broken at {} (path: {})",
            warning.item,
            warning.path.join(" -> ")
        );
    }
    println!("{}", summary);
    Ok(())
}

fn open_catalog(conn: &Connection) -> Result<Catalog> {
    let catalog = db::load_catalog(conn)?;
    if catalog.recipes().next().is_none() {
        println!("No recipes in database. Run 'import' or 'load-sample' first.");
    }
    Ok(catalog)
}

fn load_chain(storage: &ChainStorage, catalog: &Catalog, path: &Path) -> Result<ProductionTree> {
    let (_, tree) = storage
        .load_resolved(path, catalog)
        .with_context(|| format!("Failed to load chain {}", path.display()))?;
    Ok(tree)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    let mut conn = Connection::open(&cli.database)
        .with_context(|| format!("Failed to open {}", cli.database.display()))?;
    db::init_schema(&conn)?;

    match cli.command {
        Commands::Init => {
            println!("Database initialized at: {}", cli.database.display());
        }

        Commands::Import { source, clear } => {
            if clear {
                println!("Clearing existing catalog...");
                db::clear_catalog(&conn)?;
            }
            let stats = import::import_to_database(&mut conn, &source)?;
            println!("{}", stats);
            // Surface inconsistencies now rather than at the next calc.
            db::load_catalog(&conn)?;
        }

        Commands::LoadSample => {
            let catalog = sample::load_sample_data(&mut conn)?;
            println!(
                "Loaded {} sample recipes ({} items)",
                catalog.recipes().count(),
                catalog.items().count()
            );
        }

        Commands::Calc {
            item,
            rate,
            recipes,
            imports,
            speeds,
            import_at,
            expand_at,
            verbose,
            json,
            save,
        } => {
            let catalog = open_catalog(&conn)?;
            let overrides = [(import_at.as_slice(), true), (expand_at.as_slice(), false)];
            let policy = build_policy(&recipes, &imports, &speeds, &overrides)?;
            let tree = resolve(&catalog, &item, rate, &policy)?;
            let summary = aggregate(&tree);
            print_result(&tree, &summary, verbose, json)?;

            if let Some(name) = save {
                let storage = ChainStorage::new(&cli.chains_dir)?;
                let mut chain = SavedChain::new(name, item, rate, &policy);
                let path = storage.save(&mut chain)?;
                println!("Saved chain to {}", path.display());
            }
        }

        Commands::Load {
            path,
            verbose,
            json,
        } => {
            let catalog = open_catalog(&conn)?;
            let storage = ChainStorage::new(&cli.chains_dir)?;
            let tree = load_chain(&storage, &catalog, &path)?;
            print_result(&tree, &aggregate(&tree), verbose, json)?;
        }

        Commands::Combine { chains, json } => {
            let catalog = open_catalog(&conn)?;
            let storage = ChainStorage::new(&cli.chains_dir)?;

            let mut trees = Vec::with_capacity(chains.len());
            for raw in &chains {
                let (path, weight) = parse_weighted(raw);
                trees.push((load_chain(&storage, &catalog, &path)?, weight));
            }
            let weighted: Vec<_> = trees.iter().map(|(tree, w)| (tree, *w)).collect();
            let summary = combine(&weighted);

            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("{}", summary);
            }
        }

        Commands::ListItems => {
            let catalog = open_catalog(&conn)?;
            println!("{:<30} {:<12} {}", "Item", "Unit", "Recipes");
            println!("{}", "-".repeat(52));
            for item in catalog.items() {
                println!(
                    "{:<30} {:<12} {}",
                    item.name,
                    item.unit,
                    catalog.recipes_for_output(&item.id).len()
                );
            }
        }

        Commands::ListMachines { id } => {
            let catalog = open_catalog(&conn)?;
            let machines: Vec<_> = match &id {
                Some(id) => catalog.get_machine(id).into_iter().collect(),
                None => catalog.machines().collect(),
            };
            if machines.is_empty() {
                println!("No machines found");
            }
            println!("{:<24} {:<24} {:>10} {:>10}", "Machine", "Name", "Power (MW)", "Area (m²)");
            println!("{}", "-".repeat(71));
            for m in &machines {
                println!(
                    "{:<24} {:<24} {:>10.1} {:>10.1}",
                    m.id, m.name, m.power_mw, m.footprint_m2
                );
            }
            if let [machine] = machines.as_slice() {
                for r in catalog.recipes().filter(|r| r.machine.id == machine.id) {
                    println!("  runs {}", r.id);
                }
            }
        }

        Commands::ListRecipes { item } => {
            let catalog = open_catalog(&conn)?;
            let recipes: Vec<_> = match &item {
                Some(item) => catalog.recipes_for_output(item),
                None => catalog.recipes().collect(),
            };
            println!("{:<36} {:<18} {:>10} {:>10}", "Recipe", "Machine", "Power (MW)", "Area (m²)");
            println!("{}", "-".repeat(77));
            for r in recipes {
                println!(
                    "{:<36} {:<18} {:>10.1} {:>10.1}",
                    r.id, r.machine.name, r.machine.power_mw, r.machine.footprint_m2
                );
            }
        }

        Commands::Recipe { id } => {
            let catalog = open_catalog(&conn)?;
            if let Some(r) = catalog.get_recipe(&id) {
                println!("Recipe: {}", r.name);
                println!("  Machine: {}", r.machine.name);
                println!("  Power: {} MW", r.machine.power_mw);
                println!("  Footprint: {} m²", r.machine.footprint_m2);
                if r.is_generator() {
                    println!("  Generates: {} MW", r.power_generation_mw);
                }
                if !r.inputs.is_empty() {
                    println!("  Inputs:");
                    for i in &r.inputs {
                        println!("    {} @ {}/min", i.item, i.rate);
                    }
                }
                println!("  Outputs:");
                for o in &r.outputs {
                    println!("    {} @ {}/min", o.item, o.rate);
                }
            } else {
                println!("Recipe '{}' not found", id);
            }
        }

        Commands::ListChains => {
            let storage = ChainStorage::new(&cli.chains_dir)?;
            let chains = storage.list();
            if chains.is_empty() {
                println!("No saved chains in {}", storage.dir().display());
            }
            for c in chains {
                println!(
                    "{:<30} {} @ {:.3}/min  ({})",
                    c.name,
                    c.target_item,
                    c.target_rate,
                    c.path.display()
                );
            }
        }

        Commands::DeleteChain { path } => {
            let storage = ChainStorage::new(&cli.chains_dir)?;
            if storage.delete(&path)? {
                println!("Deleted {}", path.display());
            } else {
                println!("No chain at {}", path.display());
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pairs() {
        assert_eq!(
            parse_pair("Screw=Alternate: Cast Screw").unwrap(),
            ("Screw".to_string(), "Alternate: Cast Screw".to_string())
        );
        assert!(parse_pair("Screw").is_err());
        assert!(parse_pair("=x").is_err());
    }

    #[test]
    fn parses_weights() {
        assert_eq!(parse_weighted("a.json:2.5"), (PathBuf::from("a.json"), 2.5));
        assert_eq!(parse_weighted("a.json:-1"), (PathBuf::from("a.json"), -1.0));
        assert_eq!(parse_weighted("a.json"), (PathBuf::from("a.json"), 1.0));
        assert_eq!(parse_weighted("C:\\chains\\a.json"), (PathBuf::from("C:\\chains\\a.json"), 1.0));
    }

    #[test]
    fn builds_policy_from_flags() {
        let positions = vec!["ReinforcedIronPlate > Screw".to_string()];
        let policy = build_policy(
            &["Screw=Alternate: Cast Screw".to_string()],
            &["IronOre".to_string()],
            &["Iron Plate=1.5".to_string()],
            &[(positions.as_slice(), true)],
        )
        .unwrap();
        assert_eq!(policy.speed_multipliers["Iron Plate"], 1.5);
        assert_eq!(policy.node_overrides[0].path, vec!["ReinforcedIronPlate", "Screw"]);
        assert!(policy.node_overrides[0].imported);
        assert!(build_policy(&[], &[], &["Iron Plate=fast".to_string()], &[]).is_err());
        assert!(parse_node_path("A>>B").is_err());
    }
}
