//! Price suggestion arithmetic.
//!
//! Pure and deterministic: no I/O, no clock. Degraded inputs (no sales
//! volume, thin margin) are reported through [`SuggestionFlags`]; the only
//! error is an amount too large to represent, reported against the input
//! that drove it.

use rust_decimal::Decimal;

use crate::error::{PricingError, PricingResult};
use crate::models::{
    CostComponents, EffectiveSettings, PricingSuggestion, RecipeCostSnapshot, SuggestionFlags,
    SuggestionInputs, SuggestionTerms,
};

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Margins below this percentage raise `low_margin`
pub const LOW_MARGIN_PERCENT: Decimal = Decimal::from_parts(20, 0, 0, false, 0);

/// Fixed-cost share of the suggested price above which `high_fixed_cost_impact` is raised
pub const HIGH_FIXED_COST_RATIO: Decimal = Decimal::from_parts(30, 0, 0, false, 2);

/// Unwrap a checked operation, blaming `field` on overflow
pub(crate) fn checked(value: Option<Decimal>, field: &str) -> PricingResult<Decimal> {
    value.ok_or_else(|| PricingError::validation(field, "value too large to compute a price"))
}

/// Compute the suggested price for one unit of a recipe.
///
/// The result carries no recipe/product ids; callers attach them.
pub fn suggest(
    settings: &EffectiveSettings,
    snapshot: &RecipeCostSnapshot,
    terms: &SuggestionTerms,
) -> PricingResult<PricingSuggestion> {
    // Yields below one unit would inflate the per-unit cost; treat them as one.
    let units = snapshot.yield_quantity.max(Decimal::ONE);

    let batch_cost = checked(
        snapshot.ingredient_cost.checked_add(snapshot.labor_cost),
        "labor_cost_per_minute",
    )?;
    let batch_cost = checked(batch_cost.checked_add(snapshot.packaging_cost), "packaging_cost")?;
    let unit_cost = checked(batch_cost.checked_div(units), "yield_quantity")?;

    let missing_sales_volume = settings.sales_volume_monthly <= Decimal::ZERO;
    let fixed_cost_per_unit = if missing_sales_volume {
        Decimal::ZERO
    } else {
        checked(
            settings
                .fixed_monthly_costs
                .checked_div(settings.sales_volume_monthly),
            "fixed_monthly_costs",
        )?
    };

    let base_cost = checked(unit_cost.checked_add(fixed_cost_per_unit), "fixed_monthly_costs")?;
    let variable_cost_per_unit = checked(
        base_cost.checked_mul(settings.variable_cost_percent),
        "variable_cost_percent",
    )? / HUNDRED;
    let pre_margin_cost = checked(
        base_cost.checked_add(variable_cost_per_unit),
        "variable_cost_percent",
    )?;

    let markup = checked(
        Decimal::ONE.checked_add(settings.margin_percent / HUNDRED),
        "margin_percent",
    )?;
    let price_before_tax = checked(pre_margin_cost.checked_mul(markup), "margin_percent")?;
    let tax_value = if terms.include_tax {
        checked(price_before_tax.checked_mul(settings.tax_rate), "tax_rate")? / HUNDRED
    } else {
        Decimal::ZERO
    };

    let suggested_price = checked(price_before_tax.checked_add(tax_value), "tax_rate")?;
    let break_even_price = checked(pre_margin_cost.checked_add(tax_value), "tax_rate")?;
    let contribution_margin = suggested_price - pre_margin_cost - tax_value;
    let delta_vs_current = terms
        .current_price
        .map(|current| checked(suggested_price.checked_sub(current), "current_price"))
        .transpose()?;

    let high_fixed_cost_impact = suggested_price > Decimal::ZERO
        && fixed_cost_per_unit
            .checked_div(suggested_price)
            .is_none_or(|ratio| ratio > HIGH_FIXED_COST_RATIO);

    let flags = SuggestionFlags {
        missing_sales_volume,
        low_margin: settings.margin_percent < LOW_MARGIN_PERCENT,
        below_break_even: terms
            .current_price
            .is_some_and(|current| current < break_even_price),
        high_fixed_cost_impact,
        stale_settings: false,
    };

    // Each share is at most the batch cost, which already fit.
    let components = CostComponents {
        ingredient_cost: snapshot.ingredient_cost,
        labor_cost: snapshot.labor_cost,
        packaging_cost: snapshot.packaging_cost,
        yield_quantity: snapshot.yield_quantity,
        production_time_minutes: snapshot.production_time_minutes,
        ingredient_cost_per_unit: snapshot.ingredient_cost / units,
        labor_cost_per_unit: snapshot.labor_cost / units,
        packaging_cost_per_unit: snapshot.packaging_cost / units,
    };

    Ok(PricingSuggestion {
        recipe_id: None,
        product_id: None,
        unit_cost,
        fixed_cost_per_unit,
        variable_cost_per_unit,
        pre_margin_cost,
        price_before_tax,
        tax_value,
        suggested_price,
        break_even_price,
        contribution_margin,
        delta_vs_current,
        components,
        inputs: SuggestionInputs {
            settings: *settings,
            include_tax: terms.include_tax,
            current_price: terms.current_price,
        },
        flags,
    })
}
