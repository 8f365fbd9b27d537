// =============================================================================
// Shared types used across the chart feed
// =============================================================================

use serde::{Deserialize, Serialize};

/// Chart timeframe, expressed as the number of days of history requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum Timeframe {
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

impl Timeframe {
    pub const ALL: [Timeframe; 5] = [
        Self::Day,
        Self::Week,
        Self::Month,
        Self::Quarter,
        Self::Year,
    ];

    pub fn days(self) -> u32 {
        match self {
            Self::Day => 1,
            Self::Week => 7,
            Self::Month => 30,
            Self::Quarter => 90,
            Self::Year => 365,
        }
    }
}

impl Default for Timeframe {
    fn default() -> Self {
        Self::Month
    }
}

impl TryFrom<u32> for Timeframe {
    type Error = String;

    fn try_from(days: u32) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|tf| tf.days() == days)
            .ok_or_else(|| format!("unsupported timeframe: {days} days (expected 1, 7, 30, 90 or 365)"))
    }
}

impl From<Timeframe> for u32 {
    fn from(tf: Timeframe) -> Self {
        tf.days()
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}d", self.days())
    }
}

/// An indicator the user can toggle on the chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Indicator {
    Sma,
    Ema,
    Bollinger,
}

impl Indicator {
    /// Canonical overlay order.
    pub const ALL: [Indicator; 3] = [Self::Sma, Self::Ema, Self::Bollinger];

    fn bit(self) -> u8 {
        match self {
            Self::Sma => 0b001,
            Self::Ema => 0b010,
            Self::Bollinger => 0b100,
        }
    }
}

impl std::fmt::Display for Indicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sma => write!(f, "SMA"),
            Self::Ema => write!(f, "EMA"),
            Self::Bollinger => write!(f, "BOLLINGER"),
        }
    }
}

/// Set of active indicators. Iteration always yields the canonical order
/// (SMA, EMA, Bollinger) regardless of insertion order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<Indicator>", into = "Vec<Indicator>")]
pub struct IndicatorSet(u8);

impl IndicatorSet {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn contains(&self, indicator: Indicator) -> bool {
        self.0 & indicator.bit() != 0
    }

    pub fn insert(&mut self, indicator: Indicator) {
        self.0 |= indicator.bit();
    }

    pub fn remove(&mut self, indicator: Indicator) {
        self.0 &= !indicator.bit();
    }

    /// Flip a single indicator, mirroring a toolbar toggle.
    pub fn toggle(&mut self, indicator: Indicator) {
        self.0 ^= indicator.bit();
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Indicator> + '_ {
        Indicator::ALL.into_iter().filter(|i| self.contains(*i))
    }
}

impl FromIterator<Indicator> for IndicatorSet {
    fn from_iter<T: IntoIterator<Item = Indicator>>(iter: T) -> Self {
        let mut set = Self::empty();
        for indicator in iter {
            set.insert(indicator);
        }
        set
    }
}

impl From<Vec<Indicator>> for IndicatorSet {
    fn from(list: Vec<Indicator>) -> Self {
        list.into_iter().collect()
    }
}

impl From<IndicatorSet> for Vec<Indicator> {
    fn from(set: IndicatorSet) -> Self {
        set.iter().collect()
    }
}

/// Kind of a derived overlay series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OverlayKind {
    Sma,
    Ema,
    BollingerUpper,
    BollingerLower,
}
