use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Ingredients::Table)
                    .if_not_exists()
                    .col(pk_uuid(Ingredients::Id))
                    .col(uuid(Ingredients::TenantId))
                    .col(string_len(Ingredients::Name, 255))
                    .col(string_len(Ingredients::Unit, 8))
                    .col(decimal_len(Ingredients::UnitCost, 14, 6))
                    .col(
                        timestamp_with_time_zone(Ingredients::UpdatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Recipes::Table)
                    .if_not_exists()
                    .col(pk_uuid(Recipes::Id))
                    .col(uuid(Recipes::TenantId))
                    .col(string_len(Recipes::Name, 255))
                    .col(decimal_len(Recipes::YieldQuantity, 12, 3).default(1))
                    .col(decimal_len(Recipes::ProductionTimeMinutes, 10, 2).default(0))
                    .col(
                        timestamp_with_time_zone(Recipes::UpdatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(RecipeItems::Table)
                    .if_not_exists()
                    .col(pk_uuid(RecipeItems::Id))
                    .col(uuid(RecipeItems::TenantId))
                    .col(uuid(RecipeItems::RecipeId))
                    .col(uuid(RecipeItems::IngredientId))
                    .col(decimal_len(RecipeItems::Quantity, 14, 4))
                    .col(string_len(RecipeItems::Unit, 8))
                    .col(decimal_len(RecipeItems::WasteFactor, 5, 4).default(0))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_recipe_items_recipe")
                            .from(RecipeItems::Table, RecipeItems::RecipeId)
                            .to(Recipes::Table, Recipes::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_recipe_items_ingredient")
                            .from(RecipeItems::Table, RecipeItems::IngredientId)
                            .to(Ingredients::Table, Ingredients::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Products::Table)
                    .if_not_exists()
                    .col(pk_uuid(Products::Id))
                    .col(uuid(Products::TenantId))
                    .col(string_len(Products::Name, 255))
                    .col(uuid_null(Products::RecipeId))
                    .col(decimal_len_null(Products::PackagingCost, 12, 4))
                    .col(decimal_len_null(Products::MarginPercent, 7, 3))
                    .col(decimal_len_null(Products::SalePrice, 12, 2))
                    .col(
                        timestamp_with_time_zone(Products::UpdatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_products_recipe")
                            .from(Products::Table, Products::RecipeId)
                            .to(Recipes::Table, Recipes::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        // Tenant-scoped lookups
        manager
            .create_index(
                Index::create()
                    .name("idx_ingredients_tenant")
                    .table(Ingredients::Table)
                    .col(Ingredients::TenantId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_recipe_items_tenant_recipe")
                    .table(RecipeItems::Table)
                    .col(RecipeItems::TenantId)
                    .col(RecipeItems::RecipeId)
                    .to_owned(),
            )
            .await?;

        // Fan-out of ingredient price changes to the recipes that use them
        manager
            .create_index(
                Index::create()
                    .name("idx_recipe_items_tenant_ingredient")
                    .table(RecipeItems::Table)
                    .col(RecipeItems::TenantId)
                    .col(RecipeItems::IngredientId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_products_tenant")
                    .table(Products::Table)
                    .col(Products::TenantId)
                    .to_owned(),
            )
            .await?;

        for table in ["ingredients", "recipes", "products"] {
            manager
                .get_connection()
                .execute_unprepared(&format!(
                    "CREATE TRIGGER {table}_touch_updated_at \
                     BEFORE UPDATE ON {table} \
                     FOR EACH ROW EXECUTE FUNCTION util.touch_updated_at()"
                ))
                .await?;
        }

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Products::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(RecipeItems::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Recipes::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Ingredients::Table).if_exists().to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Ingredients {
    Table,
    Id,
    TenantId,
    Name,
    Unit,
    UnitCost,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Recipes {
    Table,
    Id,
    TenantId,
    Name,
    YieldQuantity,
    ProductionTimeMinutes,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum RecipeItems {
    Table,
    Id,
    TenantId,
    RecipeId,
    IngredientId,
    Quantity,
    Unit,
    WasteFactor,
}

#[derive(DeriveIden)]
enum Products {
    Table,
    Id,
    TenantId,
    Name,
    RecipeId,
    PackagingCost,
    MarginPercent,
    SalePrice,
    UpdatedAt,
}
