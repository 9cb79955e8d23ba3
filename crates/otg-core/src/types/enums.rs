//! Enumerations shared by orders, trades and positions.
//!
//! On the wire every enum is an upper-case string (`"BUY"`, `"CLOSE_TODAY"`,
//! `"FINISHED"`). The `Unknown` variants exist so that a record created by
//! get-or-create is a valid zero value before the driver fills it in.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Notification classes
// ---------------------------------------------------------------------------

/// Notify class for a short message shown to the user.
pub const NOTIFY_TYPE_MESSAGE: i64 = 1;

/// Notify class for a longer free text (e.g. a settlement statement).
pub const NOTIFY_TYPE_TEXT: i64 = 2;

// ---------------------------------------------------------------------------
// Order / trade attributes
// ---------------------------------------------------------------------------

/// Buy or sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    #[default]
    Unknown,
    Buy,
    Sell,
}

impl Direction {
    /// The other direction: `Buy` and `Sell` swap, `Unknown` stays.
    ///
    /// A close order reduces the position held on `direction.opposite()`:
    /// a `Sell` + `Close` reduces the long position.
    pub fn opposite(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
            Self::Unknown => Self::Unknown,
        }
    }
}

/// Open or close a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Offset {
    #[default]
    Unknown,
    Open,
    /// Close, taking historical volume first.
    Close,
    /// Close today's volume only.
    CloseToday,
}

impl Offset {
    pub fn is_close(self) -> bool {
        matches!(self, Self::Close | Self::CloseToday)
    }
}

/// Order lifecycle. An order is `Alive` until fully filled, cancelled or rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    #[default]
    Alive,
    Finished,
}

/// Price type for order placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PriceType {
    #[default]
    Unknown,
    Limit,
    Any,
    Best,
    FiveLevel,
}

/// Volume condition: any volume, at least a minimum, or all at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VolumeCondition {
    #[default]
    Any,
    Min,
    All,
}

/// Time condition (time-in-force).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeCondition {
    /// Immediate or cancel.
    Ioc,
    /// Good for section.
    Gfs,
    /// Good for day.
    #[default]
    Gfd,
    /// Good till date.
    Gtd,
    /// Good till cancelled.
    Gtc,
    /// Good for auction.
    Gfa,
}

/// Hedge flag attached to an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HedgeFlag {
    #[default]
    Speculation,
    Arbitrage,
    Hedge,
    MarketMaker,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_are_upper_case() {
        assert_eq!(serde_json::to_string(&Direction::Buy).unwrap(), "\"BUY\"");
        assert_eq!(serde_json::to_string(&Offset::CloseToday).unwrap(), "\"CLOSE_TODAY\"");
        assert_eq!(serde_json::to_string(&PriceType::FiveLevel).unwrap(), "\"FIVE_LEVEL\"");
        let tc: TimeCondition = serde_json::from_str("\"GTC\"").unwrap();
        assert_eq!(tc, TimeCondition::Gtc);
    }

    #[test]
    fn close_offsets() {
        assert!(Offset::Close.is_close());
        assert!(Offset::CloseToday.is_close());
        assert!(!Offset::Open.is_close());
        assert_eq!(Direction::Sell.opposite(), Direction::Buy);
        assert_eq!(Direction::Unknown.opposite(), Direction::Unknown);
    }
}
