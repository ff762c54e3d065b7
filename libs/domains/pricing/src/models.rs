use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{PricingError, PricingResult};

/// Innate defaults applied when a tenant has no stored value for a field
pub mod defaults {
    use rust_decimal::Decimal;

    pub const LABOR_COST_PER_MINUTE: Decimal = Decimal::from_parts(65, 0, 0, false, 2);
    pub const PACKAGING_COST: Decimal = Decimal::from_parts(35, 0, 0, false, 2);
    pub const MARGIN_PERCENT: Decimal = Decimal::from_parts(300, 0, 0, false, 1);
    pub const FIXED_MONTHLY_COSTS: Decimal = Decimal::ZERO;
    pub const VARIABLE_COST_PERCENT: Decimal = Decimal::ZERO;
    pub const TAX_RATE: Decimal = Decimal::ZERO;
    pub const SALES_VOLUME: Decimal = Decimal::ZERO;
}

/// Serializes currency amounts rounded to cents; values stay exact in memory
pub(crate) mod money {
    use rust_decimal::{Decimal, RoundingStrategy};
    use serde::{Serialize, Serializer};

    pub fn round(value: Decimal) -> Decimal {
        value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    }

    pub fn serialize<S: Serializer>(value: &Decimal, serializer: S) -> Result<S::Ok, S::Error> {
        Serialize::serialize(&round(*value), serializer)
    }

    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(
            value: &Option<Decimal>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            Serialize::serialize(&value.map(round), serializer)
        }
    }
}

fn ensure_non_negative(field: &str, value: Option<Decimal>) -> PricingResult<()> {
    match value {
        Some(v) if v.is_sign_negative() && !v.is_zero() => Err(PricingError::validation(
            field,
            "must be greater than or equal to 0",
        )),
        _ => Ok(()),
    }
}

/// One layer of the settings merge. `None` means "not set at this layer",
/// which keeps a stored `0` distinct from an absent value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettingsLayer {
    pub labor_cost_per_minute: Option<Decimal>,
    pub packaging_cost: Option<Decimal>,
    pub margin_percent: Option<Decimal>,
    pub fixed_monthly_costs: Option<Decimal>,
    pub variable_cost_percent: Option<Decimal>,
    pub tax_rate: Option<Decimal>,
    pub sales_volume: Option<Decimal>,
}

impl SettingsLayer {
    /// The bottom layer: every field set to its innate default
    pub fn innate() -> Self {
        Self {
            labor_cost_per_minute: Some(defaults::LABOR_COST_PER_MINUTE),
            packaging_cost: Some(defaults::PACKAGING_COST),
            margin_percent: Some(defaults::MARGIN_PERCENT),
            fixed_monthly_costs: Some(defaults::FIXED_MONTHLY_COSTS),
            variable_cost_percent: Some(defaults::VARIABLE_COST_PERCENT),
            tax_rate: Some(defaults::TAX_RATE),
            sales_volume: Some(defaults::SALES_VOLUME),
        }
    }

    /// Fields set on `self` win; unset fields fall through to `lower`.
    pub fn over(self, lower: &SettingsLayer) -> SettingsLayer {
        SettingsLayer {
            labor_cost_per_minute: self.labor_cost_per_minute.or(lower.labor_cost_per_minute),
            packaging_cost: self.packaging_cost.or(lower.packaging_cost),
            margin_percent: self.margin_percent.or(lower.margin_percent),
            fixed_monthly_costs: self.fixed_monthly_costs.or(lower.fixed_monthly_costs),
            variable_cost_percent: self.variable_cost_percent.or(lower.variable_cost_percent),
            tax_rate: self.tax_rate.or(lower.tax_rate),
            sales_volume: self.sales_volume.or(lower.sales_volume),
        }
    }

    /// Collapse onto the innate defaults so no field can stay unset.
    pub fn resolve(self) -> EffectiveSettings {
        let full = self.over(&SettingsLayer::innate());
        EffectiveSettings {
            labor_cost_per_minute: full
                .labor_cost_per_minute
                .unwrap_or(defaults::LABOR_COST_PER_MINUTE),
            packaging_cost: full.packaging_cost.unwrap_or(defaults::PACKAGING_COST),
            margin_percent: full.margin_percent.unwrap_or(defaults::MARGIN_PERCENT),
            fixed_monthly_costs: full
                .fixed_monthly_costs
                .unwrap_or(defaults::FIXED_MONTHLY_COSTS),
            variable_cost_percent: full
                .variable_cost_percent
                .unwrap_or(defaults::VARIABLE_COST_PERCENT),
            tax_rate: full.tax_rate.unwrap_or(defaults::TAX_RATE),
            sales_volume_monthly: full.sales_volume.unwrap_or(defaults::SALES_VOLUME),
        }
    }

    pub fn validate(&self) -> PricingResult<()> {
        ensure_non_negative("labor_cost_per_minute", self.labor_cost_per_minute)?;
        ensure_non_negative("packaging_cost", self.packaging_cost)?;
        ensure_non_negative("margin_percent", self.margin_percent)?;
        ensure_non_negative("fixed_monthly_costs", self.fixed_monthly_costs)?;
        ensure_non_negative("variable_cost_percent", self.variable_cost_percent)?;
        ensure_non_negative("tax_rate", self.tax_rate)?;
        ensure_non_negative("sales_volume_monthly", self.sales_volume)
    }
}

/// Tenant settings row as persisted; unset columns are `None`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSettings {
    pub tenant_id: Uuid,
    pub values: SettingsLayer,
    pub updated_at: DateTime<Utc>,
}

impl StoredSettings {
    /// A freshly seeded row: exists, but every field is unset
    pub fn seeded(tenant_id: Uuid) -> Self {
        Self {
            tenant_id,
            values: SettingsLayer::default(),
            updated_at: Utc::now(),
        }
    }
}

/// Tenant pricing settings with defaults applied. Never contains nulls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PricingSettings {
    pub tenant_id: Uuid,
    pub labor_cost_per_minute: Decimal,
    pub default_packaging_cost: Decimal,
    pub default_margin_percent: Decimal,
    pub fixed_monthly_costs: Decimal,
    pub variable_cost_percent: Decimal,
    pub default_tax_rate: Decimal,
    pub default_sales_volume: Decimal,
}

impl PricingSettings {
    pub fn from_effective(tenant_id: Uuid, effective: &EffectiveSettings) -> Self {
        Self {
            tenant_id,
            labor_cost_per_minute: effective.labor_cost_per_minute,
            default_packaging_cost: effective.packaging_cost,
            default_margin_percent: effective.margin_percent,
            fixed_monthly_costs: effective.fixed_monthly_costs,
            variable_cost_percent: effective.variable_cost_percent,
            default_tax_rate: effective.tax_rate,
            default_sales_volume: effective.sales_volume_monthly,
        }
    }
}

/// Partial update for tenant settings (`PUT /pricing/settings`)
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct UpdatePricingSettings {
    pub labor_cost_per_minute: Option<Decimal>,
    pub default_packaging_cost: Option<Decimal>,
    pub default_margin_percent: Option<Decimal>,
    pub fixed_monthly_costs: Option<Decimal>,
    pub variable_cost_percent: Option<Decimal>,
    pub default_tax_rate: Option<Decimal>,
    pub default_sales_volume: Option<Decimal>,
}

impl UpdatePricingSettings {
    pub fn validate(&self) -> PricingResult<()> {
        ensure_non_negative("labor_cost_per_minute", self.labor_cost_per_minute)?;
        ensure_non_negative("default_packaging_cost", self.default_packaging_cost)?;
        ensure_non_negative("default_margin_percent", self.default_margin_percent)?;
        ensure_non_negative("fixed_monthly_costs", self.fixed_monthly_costs)?;
        ensure_non_negative("variable_cost_percent", self.variable_cost_percent)?;
        ensure_non_negative("default_tax_rate", self.default_tax_rate)?;
        ensure_non_negative("default_sales_volume", self.default_sales_volume)
    }

    pub fn as_layer(&self) -> SettingsLayer {
        SettingsLayer {
            labor_cost_per_minute: self.labor_cost_per_minute,
            packaging_cost: self.default_packaging_cost,
            margin_percent: self.default_margin_percent,
            fixed_monthly_costs: self.fixed_monthly_costs,
            variable_cost_percent: self.variable_cost_percent,
            tax_rate: self.default_tax_rate,
            sales_volume: self.default_sales_volume,
        }
    }
}

/// Settings actually used for one computation (defaults, stored values and
/// request overrides already merged)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct EffectiveSettings {
    pub labor_cost_per_minute: Decimal,
    pub packaging_cost: Decimal,
    pub margin_percent: Decimal,
    pub fixed_monthly_costs: Decimal,
    pub variable_cost_percent: Decimal,
    pub tax_rate: Decimal,
    pub sales_volume_monthly: Decimal,
}

impl Default for EffectiveSettings {
    fn default() -> Self {
        SettingsLayer::innate().resolve()
    }
}

/// Settings resolved for a tenant, with provenance of the stored layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedSettings {
    pub effective: EffectiveSettings,
    /// Stored settings came from the last-known copy because the store was unavailable
    pub stale: bool,
}

/// Request body for `POST /pricing/suggest`
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct PricingSuggestionInput {
    pub recipe_id: Option<Uuid>,
    pub product_id: Option<Uuid>,
    pub margin_percent: Option<Decimal>,
    pub packaging_cost: Option<Decimal>,
    pub fixed_monthly_costs: Option<Decimal>,
    pub variable_cost_percent: Option<Decimal>,
    pub labor_cost_per_minute: Option<Decimal>,
    pub sales_volume_monthly: Option<Decimal>,
    pub tax_rate: Option<Decimal>,
    pub current_price: Option<Decimal>,
    #[serde(default)]
    pub include_tax: bool,
}

impl PricingSuggestionInput {
    pub fn validate(&self) -> PricingResult<()> {
        if self.recipe_id.is_none() && self.product_id.is_none() {
            return Err(PricingError::validation(
                "recipe_id",
                "either recipe_id or product_id is required",
            ));
        }

        self.overrides().validate()?;
        ensure_non_negative("current_price", self.current_price)
    }

    /// Request-level layer of the settings merge
    pub fn overrides(&self) -> SettingsLayer {
        SettingsLayer {
            labor_cost_per_minute: self.labor_cost_per_minute,
            packaging_cost: self.packaging_cost,
            margin_percent: self.margin_percent,
            fixed_monthly_costs: self.fixed_monthly_costs,
            variable_cost_percent: self.variable_cost_percent,
            tax_rate: self.tax_rate,
            sales_volume: self.sales_volume_monthly,
        }
    }
}

/// Override-independent part of a recipe's cost; this is what gets cached.
/// Serialized as decimal strings so a round trip through Redis stays exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostBasis {
    #[serde(with = "rust_decimal::serde::str")]
    pub ingredient_cost: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub yield_quantity: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub production_time_minutes: Decimal,
}

/// Cost of one recipe batch at one point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RecipeCostSnapshot {
    pub ingredient_cost: Decimal,
    pub labor_cost: Decimal,
    pub packaging_cost: Decimal,
    pub yield_quantity: Decimal,
    pub production_time_minutes: Decimal,
}

/// Per-request terms that are not settings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SuggestionTerms {
    pub include_tax: bool,
    pub current_price: Option<Decimal>,
}

/// Batch and per-unit cost breakdown
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct CostComponents {
    #[serde(with = "money")]
    pub ingredient_cost: Decimal,
    #[serde(with = "money")]
    pub labor_cost: Decimal,
    #[serde(with = "money")]
    pub packaging_cost: Decimal,
    pub yield_quantity: Decimal,
    pub production_time_minutes: Decimal,
    #[serde(with = "money")]
    pub ingredient_cost_per_unit: Decimal,
    #[serde(with = "money")]
    pub labor_cost_per_unit: Decimal,
    #[serde(with = "money")]
    pub packaging_cost_per_unit: Decimal,
}

/// Degraded-input and risk indicators, evaluated on every suggestion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct SuggestionFlags {
    pub missing_sales_volume: bool,
    pub low_margin: bool,
    pub below_break_even: bool,
    pub high_fixed_cost_impact: bool,
    pub stale_settings: bool,
}

/// Inputs echoed back with the suggestion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct SuggestionInputs {
    #[serde(flatten)]
    pub settings: EffectiveSettings,
    pub include_tax: bool,
    #[serde(with = "money::option")]
    pub current_price: Option<Decimal>,
}

/// Suggested price and every intermediate quantity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct PricingSuggestion {
    pub recipe_id: Option<Uuid>,
    pub product_id: Option<Uuid>,
    #[serde(with = "money")]
    pub unit_cost: Decimal,
    #[serde(with = "money")]
    pub fixed_cost_per_unit: Decimal,
    #[serde(with = "money")]
    pub variable_cost_per_unit: Decimal,
    #[serde(with = "money")]
    pub pre_margin_cost: Decimal,
    #[serde(with = "money")]
    pub price_before_tax: Decimal,
    #[serde(with = "money")]
    pub tax_value: Decimal,
    #[serde(with = "money")]
    pub suggested_price: Decimal,
    #[serde(with = "money")]
    pub break_even_price: Decimal,
    #[serde(with = "money")]
    pub contribution_margin: Decimal,
    #[serde(with = "money::option")]
    pub delta_vs_current: Option<Decimal>,
    pub components: CostComponents,
    pub inputs: SuggestionInputs,
    pub flags: SuggestionFlags,
}
