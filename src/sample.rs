//! Built-in sample catalog for trying the planner without a recipe table
//!
//! Rates are per machine per minute. Covers alternates (screws, reinforced
//! plates, iron ingots), byproducts (oil refining), a generator, and the
//! plastic/rubber recycling loop.

use anyhow::Result;
use rusqlite::Connection;

use crate::catalog::{Catalog, CatalogError, RecipeDef};
use crate::db;
use crate::models::Item;

fn item(id: &str, name: &str, unit: &str) -> Item {
    Item {
        id: id.to_string(),
        name: name.to_string(),
        unit: unit.to_string(),
    }
}

pub fn sample_catalog() -> Result<Catalog, CatalogError> {
    const FLUID: &str = "m³/min";

    Catalog::builder()
        .item(item("IronOre", "Iron Ore", "items/min"))
        .item(item("IronIngot", "Iron Ingot", "items/min"))
        .item(item("IronPlate", "Iron Plate", "items/min"))
        .item(item("IronRod", "Iron Rod", "items/min"))
        .item(item("Screw", "Screw", "items/min"))
        .item(item("ReinforcedIronPlate", "Reinforced Iron Plate", "items/min"))
        .item(item("Water", "Water", FLUID))
        .item(item("CrudeOil", "Crude Oil", FLUID))
        .item(item("HeavyOilResidue", "Heavy Oil Residue", FLUID))
        .item(item("Fuel", "Fuel", FLUID))
        .item(item("Plastic", "Plastic", "items/min"))
        .item(item("Rubber", "Rubber", "items/min"))
        .item(item("Coal", "Coal", "items/min"))
        .item(item("Power", "Power", "MW"))
        .machine("Smelter", "Smelter", 4.0, 54.0)
        .machine("Constructor", "Constructor", 4.0, 80.0)
        .machine("Assembler", "Assembler", 15.0, 150.0)
        .machine("Refinery", "Refinery", 30.0, 200.0)
        .machine("WaterExtractor", "Water Extractor", 20.0, 400.0)
        .machine("CoalGenerator", "Coal Generator", 0.0, 260.0)
        .recipe(
            RecipeDef::new("Iron Ingot", "Smelter")
                .input("IronOre", 30.0)
                .output("IronIngot", 30.0),
        )
        .recipe(
            RecipeDef::new("Alternate: Pure Iron Ingot", "Refinery")
                .input("IronOre", 35.0)
                .input("Water", 20.0)
                .output("IronIngot", 65.0),
        )
        .recipe(
            RecipeDef::new("Iron Plate", "Constructor")
                .input("IronIngot", 30.0)
                .output("IronPlate", 20.0),
        )
        .recipe(
            RecipeDef::new("Iron Rod", "Constructor")
                .input("IronIngot", 15.0)
                .output("IronRod", 15.0),
        )
        .recipe(
            RecipeDef::new("Screw", "Constructor")
                .input("IronRod", 10.0)
                .output("Screw", 40.0),
        )
        .recipe(
            RecipeDef::new("Alternate: Cast Screw", "Constructor")
                .input("IronIngot", 12.5)
                .output("Screw", 50.0),
        )
        .recipe(
            RecipeDef::new("Reinforced Iron Plate", "Assembler")
                .input("IronPlate", 30.0)
                .input("Screw", 60.0)
                .output("ReinforcedIronPlate", 5.0),
        )
        .recipe(
            RecipeDef::new("Alternate: Bolted Iron Plate", "Assembler")
                .input("IronPlate", 90.0)
                .input("Screw", 250.0)
                .output("ReinforcedIronPlate", 15.0),
        )
        .recipe(RecipeDef::new("Water", "WaterExtractor").output("Water", 120.0))
        .recipe(
            RecipeDef::new("Plastic", "Refinery")
                .input("CrudeOil", 30.0)
                .output("Plastic", 20.0)
                .output("HeavyOilResidue", 10.0),
        )
        .recipe(
            RecipeDef::new("Rubber", "Refinery")
                .input("CrudeOil", 30.0)
                .output("Rubber", 20.0)
                .output("HeavyOilResidue", 20.0),
        )
        .recipe(
            RecipeDef::new("Residual Fuel", "Refinery")
                .input("HeavyOilResidue", 60.0)
                .output("Fuel", 40.0),
        )
        .recipe(
            RecipeDef::new("Alternate: Recycled Plastic", "Refinery")
                .input("Rubber", 30.0)
                .input("Fuel", 30.0)
                .output("Plastic", 60.0),
        )
        .recipe(
            RecipeDef::new("Alternate: Recycled Rubber", "Refinery")
                .input("Plastic", 30.0)
                .input("Fuel", 30.0)
                .output("Rubber", 60.0),
        )
        .recipe(
            RecipeDef::new("Coal Power", "CoalGenerator")
                .input("Coal", 15.0)
                .input("Water", 45.0)
                .output("Power", 75.0)
                .generates(75.0),
        )
        .default_recipe("Screw", "Screw")
        .default_recipe("Rubber", "Rubber")
        .build()
}

/// Replace the database contents with the sample catalog
pub fn load_sample_data(conn: &mut Connection) -> Result<Catalog> {
    let catalog = sample_catalog()?;
    db::save_catalog(conn, &catalog)?;
    Ok(catalog)
}
