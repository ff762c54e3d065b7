use sea_orm::entity::prelude::*;

use crate::catalog::Product;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: Uuid,
    #[sea_orm(column_type = "String(StringLen::N(255))")]
    pub name: String,
    pub recipe_id: Option<Uuid>,
    #[sea_orm(column_type = "Decimal(Some((12, 4)))", nullable)]
    pub packaging_cost: Option<Decimal>,
    #[sea_orm(column_type = "Decimal(Some((7, 3)))", nullable)]
    pub margin_percent: Option<Decimal>,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))", nullable)]
    pub sale_price: Option<Decimal>,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for Product {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            tenant_id: model.tenant_id,
            name: model.name,
            recipe_id: model.recipe_id,
            packaging_cost: model.packaging_cost,
            margin_percent: model.margin_percent,
            sale_price: model.sale_price,
        }
    }
}
