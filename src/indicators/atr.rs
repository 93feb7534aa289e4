// =============================================================================
// Average True Range (ATR) — Wilder's Smoothing Method
// =============================================================================
//
// True Range (TR) for each bar:
//   TR = max(H - L, |H - prevClose|, |L - prevClose|)
//
// ATR is the smoothed average of TR using Wilder's method:
//   ATR_0   = SMA of first `period` TR values
//   ATR_t   = (ATR_{t-1} * (period - 1) + TR_t) / period
//
// Inputs are the parallel high / low / close series of a properties cache.
// =============================================================================

/// ATR series, one value per bar starting at index `period`.
///
/// Empty when `period` is zero, the series lengths differ, fewer than
/// `period + 1` bars exist, or the seed is non-finite. A non-finite smoothed
/// value truncates the series.
pub fn calculate_atr(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<f64> {
    let len = close.len();
    if period == 0 || high.len() != len || low.len() != len || len < period + 1 {
        return Vec::new();
    }

    // --- Step 1: True Range for each consecutive pair ------------------------
    let tr_values: Vec<f64> = (1..len)
        .map(|i| {
            let prev_close = close[i - 1];
            let hl = high[i] - low[i];
            let hc = (high[i] - prev_close).abs();
            let lc = (low[i] - prev_close).abs();
            hl.max(hc).max(lc)
        })
        .collect();

    // --- Step 2: Seed with SMA of first `period` TR values -------------------
    let seed: f64 = tr_values[..period].iter().sum::<f64>() / period as f64;
    if !seed.is_finite() {
        return Vec::new();
    }

    // --- Step 3: Wilder's smoothing ------------------------------------------
    let period_f = period as f64;
    let mut result = Vec::with_capacity(tr_values.len() - period + 1);
    result.push(seed);

    let mut atr = seed;
    for &tr in &tr_values[period..] {
        atr = (atr * (period_f - 1.0) + tr) / period_f;
        if !atr.is_finite() {
            break;
        }
        result.push(atr);
    }

    result
}
