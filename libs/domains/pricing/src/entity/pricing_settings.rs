use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::models::{SettingsLayer, StoredSettings};

/// Sea-ORM Entity for pricing_settings table
///
/// One row per tenant. NULL columns are unset and fall back to defaults.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "pricing_settings")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub tenant_id: Uuid,
    #[sea_orm(column_type = "Decimal(Some((12, 4)))", nullable)]
    pub labor_cost_per_minute: Option<Decimal>,
    #[sea_orm(column_type = "Decimal(Some((12, 4)))", nullable)]
    pub default_packaging_cost: Option<Decimal>,
    #[sea_orm(column_type = "Decimal(Some((7, 3)))", nullable)]
    pub default_margin_percent: Option<Decimal>,
    #[sea_orm(column_type = "Decimal(Some((14, 2)))", nullable)]
    pub fixed_monthly_costs: Option<Decimal>,
    #[sea_orm(column_type = "Decimal(Some((7, 3)))", nullable)]
    pub variable_cost_percent: Option<Decimal>,
    #[sea_orm(column_type = "Decimal(Some((7, 3)))", nullable)]
    pub default_tax_rate: Option<Decimal>,
    #[sea_orm(column_type = "Decimal(Some((14, 2)))", nullable)]
    pub default_sales_volume: Option<Decimal>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for StoredSettings {
    fn from(model: Model) -> Self {
        Self {
            tenant_id: model.tenant_id,
            values: SettingsLayer {
                labor_cost_per_minute: model.labor_cost_per_minute,
                packaging_cost: model.default_packaging_cost,
                margin_percent: model.default_margin_percent,
                fixed_monthly_costs: model.fixed_monthly_costs,
                variable_cost_percent: model.variable_cost_percent,
                tax_rate: model.default_tax_rate,
                sales_volume: model.default_sales_volume,
            },
            updated_at: model.updated_at.into(),
        }
    }
}
