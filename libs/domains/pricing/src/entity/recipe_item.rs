use sea_orm::entity::prelude::*;

use crate::catalog::RecipeItem;
use crate::units::Unit;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "recipe_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub recipe_id: Uuid,
    pub ingredient_id: Uuid,
    #[sea_orm(column_type = "Decimal(Some((14, 4)))")]
    pub quantity: Decimal,
    pub unit: Unit,
    #[sea_orm(column_type = "Decimal(Some((5, 4)))")]
    pub waste_factor: Decimal,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for RecipeItem {
    fn from(model: Model) -> Self {
        Self {
            ingredient_id: model.ingredient_id,
            quantity: model.quantity,
            unit: model.unit,
            waste_factor: model.waste_factor,
        }
    }
}
