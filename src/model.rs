use serde::{Deserialize, Serialize};

/// A percentage expressed in percent units.
///
/// 13.0 means 13%.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Percent(pub f64);

impl Percent {
    pub const fn new(value: f64) -> Self {
        Self(value)
    }

    /// 13% -> 0.13
    pub fn fraction(&self) -> f64 {
        self.0 / 100.0
    }

    /// Returns the part of `amount` this percentage represents.
    pub fn of(&self, amount: f64) -> f64 {
        amount * self.fraction()
    }

    /// Returns amount * (1 - pct/100)
    pub fn markdown(&self, amount: f64) -> f64 {
        amount * (1.0 - self.fraction())
    }

    pub fn is_valid_rate(&self) -> bool {
        self.0.is_finite() && self.0 >= 0.0
    }
}
