//! Normalized pointwise mutual information for node pairs.

/// Narrowest visual edge width.
pub const MIN_EDGE_WIDTH: f64 = 0.0;
/// Widest visual edge width; weights are scaled onto `[0, MAX_EDGE_WIDTH]`.
pub const MAX_EDGE_WIDTH: f64 = 20.0;

/// Value returned whenever NPMI is undefined or support is too low.
pub const DAMPENED_DEFAULT: f64 = MIN_EDGE_WIDTH / MAX_EDGE_WIDTH;

/// Minimum weighted article count an endpoint needs before its NPMI may
/// exceed [`DAMPENED_DEFAULT`].
pub const MIN_SUPPORT: f64 = 2.0;

/// NPMI of a pair given weighted counts `n_x`, `n_y`, joint count `n_xy`
/// and corpus size `n`.
///
/// Never panics: non-positive or non-finite inputs resolve to
/// [`DAMPENED_DEFAULT`], and the result is clamped to `[-1, 1]`.
pub fn npmi(n_x: f64, n_y: f64, n_xy: f64, n: f64, min_support: f64) -> f64 {
    if ![n_x, n_y, n_xy, n].iter().all(|v| v.is_finite() && *v > 0.0) {
        return DAMPENED_DEFAULT;
    }

    let mut value = if n_xy == n {
        1.0
    } else {
        let p_x = n_x / n;
        let p_y = n_y / n;
        let p_xy = n_xy / n;

        let log_xy = p_xy.log2();
        if p_x <= 0.0 || p_y <= 0.0 || p_xy <= 0.0 || log_xy == 0.0 {
            return DAMPENED_DEFAULT;
        }

        -1.0 + (p_x.log2() + p_y.log2()) / log_xy
    };

    if !value.is_finite() {
        return DAMPENED_DEFAULT;
    }

    if n_x < min_support || n_y < min_support {
        value = value.min(DAMPENED_DEFAULT);
    }

    value.clamp(-1.0, 1.0)
}
