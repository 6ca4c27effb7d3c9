use std::ops::Range;

use crate::error::{AppError, Result};

/// Row ranges of consecutive windows of `window_len` rows over `n` rows.
/// Window i covers `[i * len, min((i + 1) * len, n))`; only the last may be short.
pub fn window_bounds(n: usize, window_len: usize) -> Result<Vec<Range<usize>>> {
    if window_len == 0 {
        return Err(AppError::InvalidWindowLength(window_len));
    }
    Ok((0..window_count(n, window_len))
        .map(|i| {
            let start = i * window_len;
            start..((i + 1) * window_len).min(n)
        })
        .collect())
}

/// `ceil(n / window_len)`; `window_len` must be non-zero.
pub fn window_count(n: usize, window_len: usize) -> usize {
    n.div_ceil(window_len)
}
