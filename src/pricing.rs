// Pure pricing calculator. No I/O, no clock reads: `today` is an input, so
// identical inputs always produce a bit-identical PricingCalculation. The
// application order of the steps below is load-bearing.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};

use crate::config::PricingConfig;
use crate::models::PricingCalculation;

fn round_cents(amount: f64) -> i64 {
    amount.round() as i64
}

pub fn calculate_pricing(
    config: &PricingConfig,
    base_rate_cents: i64,
    checkin: NaiveDate,
    checkout: NaiveDate,
    today: NaiveDate,
) -> PricingCalculation {
    let nights = (checkout - checkin).num_days().max(0);
    let mut breakdown = BTreeMap::new();

    // 1. Base subtotal
    let mut subtotal = base_rate_cents * nights;
    breakdown.insert("base".to_string(), subtotal);

    // 2. Weekend markup, proportional to the nights falling on weekend days
    let weekend_nights = checkin
        .iter_days()
        .take(nights as usize)
        .filter(|night| config.weekend_nights.contains(&night.weekday()))
        .count() as i64;
    if weekend_nights > 0 && config.weekend_markup != 1.0 {
        let markup = round_cents(
            base_rate_cents as f64 * weekend_nights as f64 * (config.weekend_markup - 1.0),
        );
        subtotal += markup;
        breakdown.insert("weekend_markup".to_string(), markup);
    }

    // 3. Peak-season markup when the check-in date falls inside the window
    if let Some((start, end)) = config.peak_window {
        if checkin >= start && checkin <= end && config.peak_multiplier != 1.0 {
            let markup = round_cents(subtotal as f64 * (config.peak_multiplier - 1.0));
            subtotal += markup;
            breakdown.insert("peak_markup".to_string(), markup);
        }
    }

    // 4. Early-booking discount, computed on the marked-up subtotal
    let advance_days = (checkin - today).num_days();
    let mut discounts = 0;
    if advance_days > config.early_booking_days && config.early_booking_multiplier < 1.0 {
        discounts = round_cents(subtotal as f64 * (1.0 - config.early_booking_multiplier));
        breakdown.insert("early_booking_discount".to_string(), -discounts);
    }

    // 5. Taxes and flat service fee
    let taxes = round_cents(subtotal as f64 * config.tax_rate);
    let fees = config.service_fee_cents;
    breakdown.insert("taxes".to_string(), taxes);
    breakdown.insert("service_fee".to_string(), fees);

    // 6. Total, clamped at zero
    let total = (subtotal + taxes + fees - discounts).max(0);

    PricingCalculation {
        base_rate_cents,
        nights,
        subtotal_cents: subtotal,
        taxes_cents: taxes,
        fees_cents: fees,
        discounts_cents: discounts,
        total_cents: total,
        currency: config.currency.clone(),
        breakdown,
    }
}
