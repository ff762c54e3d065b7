//! Sea-ORM entities for tenant settings and the read-only catalog tables

pub mod ingredient;
pub mod pricing_settings;
pub mod product;
pub mod recipe;
pub mod recipe_item;
