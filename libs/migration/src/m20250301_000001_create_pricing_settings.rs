use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // One row per tenant; NULL means "not set, use the default"
        manager
            .create_table(
                Table::create()
                    .table(PricingSettings::Table)
                    .if_not_exists()
                    .col(pk_uuid(PricingSettings::TenantId))
                    .col(decimal_len_null(PricingSettings::LaborCostPerMinute, 12, 4))
                    .col(decimal_len_null(PricingSettings::DefaultPackagingCost, 12, 4))
                    .col(decimal_len_null(PricingSettings::DefaultMarginPercent, 7, 3))
                    .col(decimal_len_null(PricingSettings::FixedMonthlyCosts, 14, 2))
                    .col(decimal_len_null(PricingSettings::VariableCostPercent, 7, 3))
                    .col(decimal_len_null(PricingSettings::DefaultTaxRate, 7, 3))
                    .col(decimal_len_null(PricingSettings::DefaultSalesVolume, 14, 2))
                    .col(
                        timestamp_with_time_zone(PricingSettings::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(PricingSettings::UpdatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .get_connection()
            .execute_unprepared(
                r#"
                CREATE TRIGGER pricing_settings_touch_updated_at
                    BEFORE UPDATE ON pricing_settings
                    FOR EACH ROW
                    EXECUTE FUNCTION util.touch_updated_at()
                "#,
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(
                "DROP TRIGGER IF EXISTS pricing_settings_touch_updated_at ON pricing_settings",
            )
            .await?;

        manager
            .drop_table(Table::drop().table(PricingSettings::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum PricingSettings {
    Table,
    TenantId,
    LaborCostPerMinute,
    DefaultPackagingCost,
    DefaultMarginPercent,
    FixedMonthlyCosts,
    VariableCostPercent,
    DefaultTaxRate,
    DefaultSalesVolume,
    CreatedAt,
    UpdatedAt,
}
