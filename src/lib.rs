//! Factory Planner
//!
//! Resolves how to produce an item at a target rate from a recipe catalog,
//! then totals machines, power, floor space and item balances. Resolved
//! chains can be scaled and summed to plan shared factories.

pub mod calculator;
pub mod catalog;
pub mod combine;
pub mod db;
pub mod import;
pub mod models;
pub mod sample;
pub mod storage;
pub mod summary;
pub mod tree;

pub use calculator::{LookupTarget, NodeOverride, ResolveError, SelectionPolicy, resolve};
pub use catalog::{Catalog, CatalogBuilder, CatalogError, RecipeDef};
pub use combine::{combine, combine_summaries};
pub use models::{Flow, Item, Machine, Recipe, RecipeSelection};
pub use storage::{ChainStorage, SavedChain, StorageError};
pub use summary::{Summary, Traversal, aggregate, aggregate_with};
pub use tree::{CycleWarning, ImportReason, NodeSource, ProductionNode, ProductionTree};
