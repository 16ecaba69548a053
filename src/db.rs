//! Database schema and operations
//!
//! The SQLite file is the durable form of the catalog. It is read once at
//! startup by [`load_catalog`]; resolution never touches the connection.

use anyhow::{Context, Result};
use rusqlite::Connection;
use tracing::info;

use crate::catalog::{Catalog, CatalogBuilder, RecipeDef};
use crate::models::{Flow, Item, Machine};

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS items (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            unit TEXT NOT NULL DEFAULT 'items/min'
        );

        -- Machine types with per-machine power draw and footprint
        CREATE TABLE IF NOT EXISTS machines (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            power_mw REAL NOT NULL DEFAULT 0,
            footprint_m2 REAL NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS recipes (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            machine_id TEXT NOT NULL,
            power_generation_mw REAL NOT NULL DEFAULT 0,
            position INTEGER NOT NULL
        );

        -- Rates are per machine per minute at 100% clock
        CREATE TABLE IF NOT EXISTS recipe_inputs (
            recipe_id TEXT,
            item_id TEXT,
            rate_per_min REAL NOT NULL,
            position INTEGER NOT NULL,
            PRIMARY KEY (recipe_id, item_id)
        );

        CREATE TABLE IF NOT EXISTS recipe_outputs (
            recipe_id TEXT,
            item_id TEXT,
            rate_per_min REAL NOT NULL,
            position INTEGER NOT NULL,
            PRIMARY KEY (recipe_id, item_id)
        );

        CREATE TABLE IF NOT EXISTS default_recipes (
            item_id TEXT PRIMARY KEY,
            recipe_id TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_recipe_outputs_item ON recipe_outputs(item_id);
        "#,
    )?;
    Ok(())
}

/// Clear all catalog data (for re-import)
pub fn clear_catalog(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        DELETE FROM default_recipes;
        DELETE FROM recipe_outputs;
        DELETE FROM recipe_inputs;
        DELETE FROM recipes;
        DELETE FROM machines;
        DELETE FROM items;
        "#,
    )?;
    Ok(())
}

pub fn upsert_item(conn: &Connection, item: &Item) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO items (id, name, unit) VALUES (?1, ?2, ?3)",
        (&item.id, &item.name, &item.unit),
    )?;
    Ok(())
}

/// Insert an item only if it is not already known
pub fn ensure_item(conn: &Connection, id: &str) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO items (id, name) VALUES (?1, ?1)",
        [id],
    )?;
    Ok(())
}

pub fn upsert_machine(conn: &Connection, machine: &Machine) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO machines (id, name, power_mw, footprint_m2)
         VALUES (?1, ?2, ?3, ?4)",
        (
            &machine.id,
            &machine.name,
            machine.power_mw,
            machine.footprint_m2,
        ),
    )?;
    Ok(())
}

/// Insert or replace a recipe together with its inputs and outputs
pub fn upsert_recipe(conn: &Connection, recipe: &RecipeDef) -> Result<()> {
    let position: i64 = conn.query_row(
        "SELECT COALESCE(
             (SELECT position FROM recipes WHERE id = ?1),
             (SELECT COALESCE(MAX(position) + 1, 0) FROM recipes))",
        [&recipe.id],
        |row| row.get(0),
    )?;

    conn.execute(
        "INSERT OR REPLACE INTO recipes (id, name, machine_id, power_generation_mw, position)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        (
            &recipe.id,
            &recipe.name,
            &recipe.machine,
            recipe.power_generation_mw,
            position,
        ),
    )?;
    conn.execute("DELETE FROM recipe_inputs WHERE recipe_id = ?1", [&recipe.id])?;
    conn.execute("DELETE FROM recipe_outputs WHERE recipe_id = ?1", [&recipe.id])?;

    for (i, flow) in recipe.inputs.iter().enumerate() {
        ensure_item(conn, &flow.item)?;
        conn.execute(
            "INSERT OR REPLACE INTO recipe_inputs (recipe_id, item_id, rate_per_min, position)
             VALUES (?1, ?2, ?3, ?4)",
            (&recipe.id, &flow.item, flow.rate, i as i64),
        )?;
    }
    for (i, flow) in recipe.outputs.iter().enumerate() {
        ensure_item(conn, &flow.item)?;
        conn.execute(
            "INSERT OR REPLACE INTO recipe_outputs (recipe_id, item_id, rate_per_min, position)
             VALUES (?1, ?2, ?3, ?4)",
            (&recipe.id, &flow.item, flow.rate, i as i64),
        )?;
    }
    Ok(())
}

pub fn set_default_recipe(conn: &Connection, item: &str, recipe: &str) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO default_recipes (item_id, recipe_id) VALUES (?1, ?2)",
        (item, recipe),
    )?;
    Ok(())
}

/// Write a whole catalog, replacing whatever the database held
pub fn save_catalog(conn: &mut Connection, catalog: &Catalog) -> Result<()> {
    let tx = conn.transaction()?;
    clear_catalog(&tx)?;
    for item in catalog.items() {
        upsert_item(&tx, item)?;
    }
    for machine in catalog.machines() {
        upsert_machine(&tx, machine)?;
    }
    for recipe in catalog.recipes() {
        upsert_recipe(
            &tx,
            &RecipeDef {
                id: recipe.id.clone(),
                name: recipe.name.clone(),
                machine: recipe.machine.id.clone(),
                inputs: recipe.inputs.clone(),
                outputs: recipe.outputs.clone(),
                power_generation_mw: recipe.power_generation_mw,
            },
        )?;
    }
    for (item, recipe) in catalog.explicit_defaults() {
        set_default_recipe(&tx, item, recipe)?;
    }
    tx.commit()?;
    Ok(())
}

fn flows(conn: &Connection, table: &str, recipe_id: &str) -> Result<Vec<Flow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT item_id, rate_per_min FROM {table} WHERE recipe_id = ?1 ORDER BY position"
    ))?;
    let rows = stmt.query_map([recipe_id], |row| {
        Ok(Flow {
            item: row.get(0)?,
            rate: row.get(1)?,
        })
    })?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

/// Read the whole catalog into memory
pub fn load_catalog(conn: &Connection) -> Result<Catalog> {
    let mut builder = CatalogBuilder::new();

    let mut stmt = conn.prepare("SELECT id, name, unit FROM items ORDER BY id")?;
    let items = stmt.query_map([], |row| {
        Ok(Item {
            id: row.get(0)?,
            name: row.get(1)?,
            unit: row.get(2)?,
        })
    })?;
    for item in items {
        builder.push_item(item?);
    }

    for machine in list_machines(conn)? {
        builder.push_machine(machine);
    }

    let mut stmt = conn.prepare(
        "SELECT id, name, machine_id, power_generation_mw FROM recipes ORDER BY position",
    )?;
    let recipes = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, f64>(3)?,
        ))
    })?;
    for row in recipes {
        let (id, name, machine, power_generation_mw) = row?;
        builder.push_recipe(RecipeDef {
            inputs: flows(conn, "recipe_inputs", &id)?,
            outputs: flows(conn, "recipe_outputs", &id)?,
            id,
            name,
            machine,
            power_generation_mw,
        });
    }

    let mut stmt = conn.prepare("SELECT item_id, recipe_id FROM default_recipes")?;
    let defaults = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    for pair in defaults {
        let (item, recipe) = pair?;
        builder.push_default(item, recipe);
    }

    let catalog = builder.build().context("catalog in database is inconsistent")?;
    info!(
        items = catalog.items().count(),
        recipes = catalog.recipes().count(),
        "loaded catalog"
    );
    Ok(catalog)
}

/// List all machine types in the database
pub fn list_machines(conn: &Connection) -> Result<Vec<Machine>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, power_mw, footprint_m2 FROM machines ORDER BY name",
    )?;

    let rows = stmt.query_map([], |row| {
        Ok(Machine {
            id: row.get(0)?,
            name: row.get(1)?,
            power_mw: row.get(2)?,
            footprint_m2: row.get(3)?,
        })
    })?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}
