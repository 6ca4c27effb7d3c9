//! Streaming dispersion statistics for one window.

/// Welford accumulator: mean and sum of squared deviations in one pass.
///
/// Values are accumulated divided by the largest magnitude seen so far, so
/// readings near `f64::MAX` do not overflow the intermediate squares.
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: usize,
    scale: f64,
    mean: f64,
    m2: f64,
}

impl RunningStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, x: f64) {
        let magnitude = x.abs();
        if magnitude > self.scale {
            if self.scale > 0.0 {
                let r = self.scale / magnitude;
                self.mean *= r;
                self.m2 *= r * r;
            }
            self.scale = magnitude;
        }
        let x = if self.scale > 0.0 { x / self.scale } else { x };

        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (x - self.mean);
    }

    /// Sample standard deviation (n - 1 denominator). NaN below two samples.
    pub fn sample_stdev(&self) -> f64 {
        if self.count < 2 {
            return f64::NAN;
        }
        let unit = (self.m2 / (self.count - 1) as f64).sqrt();
        if self.scale > 0.0 {
            unit * self.scale
        } else {
            unit
        }
    }
}

pub fn sample_stdev<I>(values: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    let mut acc = RunningStats::new();
    for v in values {
        acc.push(v);
    }
    acc.sample_stdev()
}
