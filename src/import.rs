//! Recipe table import
//!
//! Reads tab-separated recipe tables into the catalog database. Each row is
//! one ingredient of one recipe:
//!
//! ```text
//! Recipe  Building  Draw  Size  Runtime  Item       Amount
//! Screw   Constructor 4   80    6        Iron Rod   -1
//! Screw   Constructor 4   80    6        Screw      4
//! ```
//!
//! Negative amounts are inputs. Amounts are per cycle and converted to
//! per-minute rates with `60 / Runtime`. An output named `MW` marks a
//! generator.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use rusqlite::Connection;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::catalog::RecipeDef;
use crate::db;
use crate::models::Machine;

/// Pseudo-item used by generator rows
const POWER_ITEM: &str = "MW";
/// Item id generator recipes output in the catalog
pub const POWER_OUTPUT: &str = "Power";

/// Recipes and machines parsed from one table
#[derive(Debug, Default)]
pub struct ParsedTable {
    pub machines: Vec<Machine>,
    pub recipes: Vec<RecipeDef>,
    pub skipped: usize,
}

struct Columns {
    recipe: usize,
    building: usize,
    draw: Option<usize>,
    size: Option<usize>,
    runtime: usize,
    item: usize,
    amount: usize,
}

impl Columns {
    fn from_header(header: &str) -> Result<Self> {
        let names: Vec<&str> = header.split('\t').map(str::trim).collect();
        let find = |name: &str| names.iter().position(|n| n.eq_ignore_ascii_case(name));
        let require = |name: &'static str| {
            find(name).with_context(|| format!("recipe table has no '{name}' column"))
        };
        Ok(Self {
            recipe: require("Recipe")?,
            building: require("Building")?,
            draw: find("Draw"),
            size: find("Size"),
            runtime: require("Runtime")?,
            item: require("Item")?,
            amount: require("Amount")?,
        })
    }
}

fn field<'a>(row: &[&'a str], index: usize) -> &'a str {
    row.get(index).map_or("", |s| s.trim())
}

fn number(row: &[&str], index: Option<usize>) -> f64 {
    index
        .map(|i| field(row, i))
        .and_then(|s| s.parse().ok())
        .unwrap_or(0.0)
}

/// Parse the text of a recipe table
pub fn parse_recipe_table(content: &str) -> Result<ParsedTable> {
    let mut lines = content.lines().filter(|l| !l.trim().is_empty());
    let Some(header) = lines.next() else {
        bail!("recipe table is empty");
    };
    let columns = Columns::from_header(header)?;

    // Group rows by recipe, keeping first-seen order
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<Vec<&str>>> = HashMap::new();
    for line in lines {
        let row: Vec<&str> = line.split('\t').collect();
        let recipe = field(&row, columns.recipe);
        let building = field(&row, columns.building);
        if recipe.is_empty() || recipe == "xxx" || building.is_empty() || building.starts_with('#') {
            continue;
        }
        if !groups.contains_key(recipe) {
            order.push(recipe.to_string());
        }
        groups.entry(recipe.to_string()).or_default().push(row);
    }

    let mut table = ParsedTable::default();
    for name in order {
        let rows = &groups[&name];
        let first = &rows[0];
        let building = field(first, columns.building);

        if !table.machines.iter().any(|m| m.id == building) {
            table.machines.push(Machine {
                id: building.to_string(),
                name: building.to_string(),
                power_mw: number(first, columns.draw),
                footprint_m2: number(first, columns.size),
            });
        }

        let runtime = number(first, Some(columns.runtime));
        if runtime <= 0.0 {
            debug!(recipe = %name, "skipping recipe without a positive runtime");
            table.skipped += 1;
            continue;
        }
        let cycles_per_min = 60.0 / runtime;

        let mut recipe = RecipeDef::new(name.clone(), building);
        for row in rows {
            let item = field(row, columns.item);
            let amount = number(row, Some(columns.amount));
            if item.is_empty() || amount == 0.0 {
                continue;
            }
            let rate = amount.abs() * cycles_per_min;
            if amount < 0.0 {
                recipe = recipe.input(item, rate);
            } else if item == POWER_ITEM {
                recipe = recipe.output(POWER_OUTPUT, rate).generates(rate);
            } else {
                recipe = recipe.output(item, rate);
            }
        }

        if recipe.outputs.is_empty() {
            debug!(recipe = %name, "skipping recipe without outputs");
            table.skipped += 1;
            continue;
        }
        table.recipes.push(recipe);
    }

    Ok(table)
}

/// Find recipe tables: the path itself, or every `.tsv` file below it
pub fn find_recipe_tables(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut tables = Vec::new();
    for entry in WalkDir::new(path)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if entry.file_type().is_file() && path.extension().is_some_and(|ext| ext == "tsv") {
            tables.push(path.to_path_buf());
        }
    }
    Ok(tables)
}

/// Import every recipe table under `source` into the database
pub fn import_to_database(conn: &mut Connection, source: &Path) -> Result<ImportStats> {
    let mut stats = ImportStats::default();

    let tables = find_recipe_tables(source)?;
    info!(source = %source.display(), tables = tables.len(), "importing recipe tables");

    let tx = conn.transaction()?;
    for path in &tables {
        let parsed = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))
            .and_then(|content| parse_recipe_table(&content));
        let table = match parsed {
            Ok(table) => table,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "failed to parse recipe table");
                stats.errors += 1;
                continue;
            }
        };

        for machine in &table.machines {
            db::upsert_machine(&tx, machine)?;
        }
        for recipe in &table.recipes {
            db::upsert_recipe(&tx, recipe)?;
            stats.inputs += recipe.inputs.len();
            stats.outputs += recipe.outputs.len();
        }
        stats.tables += 1;
        stats.machines += table.machines.len();
        stats.recipes += table.recipes.len();
        stats.skipped += table.skipped;

        debug!(
            file = %path.display(),
            recipes = table.recipes.len(),
            machines = table.machines.len(),
            "imported recipe table"
        );
    }
    tx.commit()?;

    Ok(stats)
}

#[derive(Debug, Default)]
pub struct ImportStats {
    pub tables: usize,
    pub machines: usize,
    pub recipes: usize,
    pub inputs: usize,
    pub outputs: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl std::fmt::Display for ImportStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Imported {} recipes on {} machines from {} tables ({} inputs, {} outputs). Skipped: {}, Errors: {}",
            self.recipes, self.machines, self.tables, self.inputs, self.outputs, self.skipped, self.errors
        )
    }
}
