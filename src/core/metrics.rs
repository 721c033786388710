use super::types::{ProjectionMetrics, ProjectionPoint};

/// A ratio is only meaningful against a positive, finite base and a finite end value.
fn comparable(initial: f64, final_value: f64) -> bool {
    initial.is_finite() && initial > 0.0 && final_value.is_finite()
}

pub fn total_return_pct(initial: f64, final_value: f64) -> Option<f64> {
    comparable(initial, final_value)
        .then(|| (final_value - initial) / initial * 100.0)
        .filter(|v| v.is_finite())
}

pub fn final_multiple(initial: f64, final_value: f64) -> Option<f64> {
    comparable(initial, final_value)
        .then(|| final_value / initial)
        .filter(|v| v.is_finite())
}

/// Compound annual growth rate in percent. Undefined for zero years, a
/// non-positive starting value, a negative ending value or non-finite inputs.
pub fn cagr_pct(initial: f64, final_value: f64, years: u32) -> Option<f64> {
    if years == 0 || !comparable(initial, final_value) || final_value < 0.0 {
        return None;
    }
    let cagr = ((final_value / initial).powf(1.0 / years as f64) - 1.0) * 100.0;
    cagr.is_finite().then_some(cagr)
}

/// Rule-of-72 doubling time. Undefined unless growth is positive and finite.
pub fn years_to_double(cagr_pct: f64) -> Option<f64> {
    (cagr_pct.is_finite() && cagr_pct > 0.0).then(|| 72.0 / cagr_pct)
}

/// Monthly deposit that grows `initial` to `target` over `total_months` at
/// `monthly_rate`, with deposits landing after each month's growth.
///
/// Returns 0 when the target is already covered by `initial`, and `None` when
/// a shortfall cannot be closed because there are no months left.
pub fn required_monthly_contribution(
    target: f64,
    initial: f64,
    monthly_rate: f64,
    total_months: u32,
) -> Option<f64> {
    if target <= initial {
        return Some(0.0);
    }
    if total_months == 0 {
        return None;
    }

    let n = total_months as f64;
    if monthly_rate == 0.0 {
        return Some(((target - initial) / n).max(0.0));
    }

    let growth = (1.0 + monthly_rate).powf(n);
    let annuity_factor = (growth - 1.0) / monthly_rate;
    Some(((target - initial * growth) / annuity_factor).max(0.0))
}

pub fn summarize(series: &[ProjectionPoint], baseline: f64) -> ProjectionMetrics {
    let (final_value, years) = series
        .last()
        .map(|p| (p.portfolio_value, p.period_index))
        .unwrap_or((baseline, 0));
    let cagr = cagr_pct(baseline, final_value, years);

    ProjectionMetrics {
        initial_value: baseline,
        final_value,
        years,
        total_return_pct: total_return_pct(baseline, final_value),
        cagr_pct: cagr,
        final_multiple: final_multiple(baseline, final_value),
        years_to_double: cagr.and_then(years_to_double),
    }
}

/// Renders an optional metric for display, `N/A` when undefined.
pub fn display_metric(value: Option<f64>, decimals: usize) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{v:.decimals$}"),
        _ => "N/A".to_string(),
    }
}

/// Renders a dollar amount with the sign ahead of the currency symbol, `N/A`
/// when undefined.
pub fn display_dollars(value: Option<f64>, decimals: usize) -> String {
    match value {
        Some(v) if v.is_finite() => {
            let magnitude = format!("{:.decimals$}", v.abs());
            let rounds_to_zero = !magnitude.chars().any(|c| matches!(c, '1'..='9'));
            if v < 0.0 && !rounds_to_zero {
                format!("-${magnitude}")
            } else {
                format!("${magnitude}")
            }
        }
        _ => "N/A".to_string(),
    }
}
