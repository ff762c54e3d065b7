//! Measurement units for recipe items and ingredient stock.
//!
//! Quantities convert only inside one dimension. Mass and volume are not
//! interchangeable because ingredient densities are not tracked.

use rust_decimal::Decimal;
use sea_orm::sea_query::StringLen;
use sea_orm::{DeriveActiveEnum, EnumIter};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{PricingError, PricingResult};

/// Physical dimension of a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Dimension {
    Mass,
    Volume,
    Count,
}

/// Unit of measure
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    DeriveActiveEnum,
    EnumIter,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(8))")]
pub enum Unit {
    #[serde(rename = "mg")]
    #[strum(serialize = "mg")]
    #[sea_orm(string_value = "mg")]
    Milligram,
    #[serde(rename = "g")]
    #[strum(serialize = "g")]
    #[sea_orm(string_value = "g")]
    Gram,
    #[serde(rename = "kg")]
    #[strum(serialize = "kg")]
    #[sea_orm(string_value = "kg")]
    Kilogram,
    #[serde(rename = "ml")]
    #[strum(serialize = "ml")]
    #[sea_orm(string_value = "ml")]
    Milliliter,
    #[serde(rename = "l")]
    #[strum(serialize = "l")]
    #[sea_orm(string_value = "l")]
    Liter,
    #[serde(rename = "un")]
    #[strum(serialize = "un")]
    #[sea_orm(string_value = "un")]
    Each,
    #[serde(rename = "dz")]
    #[strum(serialize = "dz")]
    #[sea_orm(string_value = "dz")]
    Dozen,
}

impl Unit {
    pub fn dimension(self) -> Dimension {
        match self {
            Unit::Milligram | Unit::Gram | Unit::Kilogram => Dimension::Mass,
            Unit::Milliliter | Unit::Liter => Dimension::Volume,
            Unit::Each | Unit::Dozen => Dimension::Count,
        }
    }

    /// How many base units (g, ml, un) one of this unit holds
    fn base_factor(self) -> Decimal {
        match self {
            Unit::Milligram => Decimal::new(1, 3),
            Unit::Gram | Unit::Milliliter | Unit::Each => Decimal::ONE,
            Unit::Kilogram | Unit::Liter => Decimal::from(1000),
            Unit::Dozen => Decimal::from(12),
        }
    }
}

/// Convert `quantity` expressed in `from` into `to`.
///
/// `ingredient_id` is only used to build the error.
pub fn convert(
    quantity: Decimal,
    from: Unit,
    to: Unit,
    ingredient_id: Uuid,
) -> PricingResult<Decimal> {
    if from == to {
        return Ok(quantity);
    }

    if from.dimension() != to.dimension() {
        return Err(PricingError::IncompatibleUnits {
            ingredient_id,
            from,
            to,
        });
    }

    quantity
        .checked_mul(from.base_factor())
        .map(|base| base / to.base_factor())
        .ok_or_else(|| PricingError::validation("quantity", "value too large to convert"))
}
