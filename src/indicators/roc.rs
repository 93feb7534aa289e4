// =============================================================================
// Rate of Change (ROC) — Momentum Indicator
// =============================================================================
//
//   ROC = ((value - value_n) / value_n) * 100

/// ROC series, one value per input starting at index `period`. A zero base
/// value yields 0.
pub fn calculate_roc(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() <= period {
        return Vec::new();
    }

    values
        .iter()
        .zip(&values[period..])
        .map(|(&prev, &cur)| if prev == 0.0 { 0.0 } else { (cur - prev) / prev * 100.0 })
        .collect()
}
