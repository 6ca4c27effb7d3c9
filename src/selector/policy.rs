use crate::error::{AppError, Result};
use crate::types::WindowStats;

/// Decides whether a window is worth rendering.
///
/// Any `Fn(&WindowStats, f64) -> bool` is a policy, so callers can plug in a
/// rule without a new type. A NaN stdev (single-row window) must fail; both
/// named policies get that for free since every comparison with NaN is false.
pub trait SelectionPolicy {
    fn accepts(&self, stats: &WindowStats, threshold: f64) -> bool;
}

impl<F> SelectionPolicy for F
where
    F: Fn(&WindowStats, f64) -> bool,
{
    fn accepts(&self, stats: &WindowStats, threshold: f64) -> bool {
        self(stats, threshold)
    }
}

/// The rules the plotting scripts have used over time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NamedPolicy {
    /// `stdev > threshold`
    Above,
    /// `stdev > threshold || stdev < flat_cutoff`, also catching near-flat windows.
    AboveOrFlat { flat_cutoff: f64 },
}

impl NamedPolicy {
    pub fn from_name(name: &str, flat_cutoff: f64) -> Result<Self> {
        match name {
            "above" => Ok(NamedPolicy::Above),
            "above_or_flat" => Ok(NamedPolicy::AboveOrFlat { flat_cutoff }),
            other => Err(AppError::Config(format!(
                "SELECT_POLICY must be 'above' or 'above_or_flat', got '{other}'"
            ))),
        }
    }
}

impl SelectionPolicy for NamedPolicy {
    fn accepts(&self, stats: &WindowStats, threshold: f64) -> bool {
        match *self {
            NamedPolicy::Above => stats.stdev > threshold,
            NamedPolicy::AboveOrFlat { flat_cutoff } => {
                stats.stdev > threshold || stats.stdev < flat_cutoff
            }
        }
    }
}

impl std::fmt::Display for NamedPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NamedPolicy::Above => write!(f, "above"),
            NamedPolicy::AboveOrFlat { flat_cutoff } => write!(f, "above_or_flat(<{flat_cutoff})"),
        }
    }
}

/// Returns the records the policy accepts, in their original order.
pub fn select<'a, P>(stats: &'a [WindowStats], threshold: f64, policy: &P) -> Vec<&'a WindowStats>
where
    P: SelectionPolicy + ?Sized,
{
    stats
        .iter()
        .filter(|s| policy.accepts(s, threshold))
        .collect()
}
