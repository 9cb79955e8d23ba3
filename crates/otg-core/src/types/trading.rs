//! Trading records mirrored from the broker: orders, trades, positions,
//! accounts, bank links and transfer logs, plus the login request and the
//! ephemeral notification record.
//!
//! Every keyed record carries a private `changed` flag (see
//! [`Dirtyable`](crate::dirty::Dirtyable)). The flag never reaches the wire.

use serde::{Deserialize, Serialize};

use super::enums::*;
use crate::dirty::impl_dirtyable;

// ---------------------------------------------------------------------------
// Login request (consumer → session)
// ---------------------------------------------------------------------------

/// Broker connection override a caller may force instead of the server's
/// broker list entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BrokerConfig {
    #[serde(default)]
    pub broker_name: String,
    #[serde(default)]
    pub broker_type: String,
    #[serde(default)]
    pub trading_fronts: Vec<String>,
    #[serde(default)]
    pub product_info: String,
    #[serde(default)]
    pub auth_code: String,
}

/// Login request captured by `start`. Kept for the whole session so a driver
/// can replay it when it reconnects.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReqLogin {
    /// Requesting application tag (`"req_login"` from most front-ends).
    #[serde(default)]
    pub aid: String,
    /// Broker id, matching an entry of the server's broker list.
    #[serde(default)]
    pub bid: String,
    pub user_name: String,
    /// Accepted on input, never echoed back.
    #[serde(default, skip_serializing)]
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broker: Option<BrokerConfig>,
}

impl ReqLogin {
    /// Structural check only; whether the credentials are good is the
    /// broker's call.
    pub fn validate(&self) -> Result<(), crate::error::GatewayError> {
        use crate::error::GatewayError;
        if self.bid.trim().is_empty() {
            return Err(GatewayError::Validation("login request has no broker id (bid)".into()));
        }
        if self.user_name.trim().is_empty() {
            return Err(GatewayError::Validation("login request has no user_name".into()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Orders and trades
// ---------------------------------------------------------------------------

/// One order of the session, keyed by the caller-assigned `order_id`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Order {
    // Set by the caller before insertion, never changed afterwards.
    pub order_id: String,
    pub exchange_id: String,
    pub instrument_id: String,
    pub direction: Direction,
    pub offset: Offset,
    pub volume_orign: i64,
    pub price_type: PriceType,
    pub limit_price: f64,
    pub time_condition: TimeCondition,
    pub volume_condition: VolumeCondition,
    pub hedge_flag: HedgeFlag,

    // Assigned once by the broker after acceptance.
    pub insert_date_time: i64,
    pub exchange_order_id: String,

    // Current state.
    pub status: OrderStatus,
    pub volume_left: i64,
    pub last_msg: String,

    #[serde(skip)]
    pub(crate) changed: bool,
}

impl Order {
    pub fn is_alive(&self) -> bool {
        self.status == OrderStatus::Alive
    }

    /// Volume already filled.
    pub fn volume_traded(&self) -> i64 {
        self.volume_orign - self.volume_left
    }
}

/// One fill against an order, keyed by `trade_id`. Immutable once recorded.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Trade {
    pub trade_id: String,
    pub order_id: String,
    pub exchange_trade_id: String,
    pub exchange_id: String,
    pub instrument_id: String,
    pub direction: Direction,
    pub offset: Offset,
    pub volume: i64,
    pub price: f64,
    /// Epoch nanoseconds.
    pub trade_date_time: i64,
    pub commission: f64,

    #[serde(skip)]
    pub(crate) changed: bool,
}

// ---------------------------------------------------------------------------
// Positions
// ---------------------------------------------------------------------------

/// Contract parameters the position arithmetic needs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InstrumentSpec {
    /// Contract multiplier (units per lot).
    pub volume_multiple: f64,
    /// Margin as a fraction of notional.
    pub margin_rate: f64,
}

impl Default for InstrumentSpec {
    fn default() -> Self {
        Self { volume_multiple: 1.0, margin_rate: 0.0 }
    }
}

/// Net holding in one instrument, keyed by `"<exchange_id>.<instrument_id>"`.
///
/// Volumes are split by side and by today/historical; frozen counts are the
/// part of each bucket already promised to a pending close order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Position {
    pub exchange_id: String,
    pub instrument_id: String,

    pub volume_long_today: i64,
    pub volume_long_his: i64,
    pub volume_long: i64,
    pub volume_long_frozen_today: i64,
    pub volume_long_frozen_his: i64,
    pub volume_short_today: i64,
    pub volume_short_his: i64,
    pub volume_short: i64,
    pub volume_short_frozen_today: i64,
    pub volume_short_frozen_his: i64,

    pub open_price_long: f64,
    pub open_price_short: f64,
    pub open_cost_long: f64,
    pub open_cost_short: f64,
    pub position_price_long: f64,
    pub position_price_short: f64,
    pub position_cost_long: f64,
    pub position_cost_short: f64,
    pub last_price: f64,
    pub float_profit_long: f64,
    pub float_profit_short: f64,
    pub float_profit: f64,
    pub position_profit_long: f64,
    pub position_profit_short: f64,
    pub position_profit: f64,

    pub margin_long: f64,
    pub margin_short: f64,
    pub margin: f64,

    #[serde(skip)]
    pub(crate) changed: bool,
}

/// Frozen volume taken from each bucket by one close order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrozenSplit {
    pub today: i64,
    pub his: i64,
}

impl FrozenSplit {
    pub fn total(&self) -> i64 {
        self.today + self.his
    }
}

impl Position {
    /// Position key for an exchange/instrument pair.
    pub fn key(exchange_id: &str, instrument_id: &str) -> String {
        format!("{exchange_id}.{instrument_id}")
    }

    /// Volume of `side` not yet frozen by pending close orders.
    pub fn closable(&self, side: Direction, offset: Offset) -> i64 {
        let (today, his, ft, fh) = self.buckets(side);
        match offset {
            Offset::CloseToday => today - ft,
            Offset::Close => (today - ft) + (his - fh),
            _ => 0,
        }
    }

    /// Freeze `volume` lots of `side` for a close order.
    ///
    /// `Close` takes historical volume first, `CloseToday` only today's.
    /// Returns `None` (and freezes nothing) if not enough volume is free.
    pub fn freeze(&mut self, side: Direction, offset: Offset, volume: i64) -> Option<FrozenSplit> {
        if volume <= 0 || self.closable(side, offset) < volume {
            return None;
        }
        let (today, his, ft, fh) = self.buckets(side);
        let split = match offset {
            Offset::CloseToday => FrozenSplit { today: volume, his: 0 },
            _ => {
                let from_his = volume.min(his - fh);
                FrozenSplit { today: volume - from_his, his: from_his }
            }
        };
        debug_assert!(split.today <= today - ft);
        let (ft, fh) = self.frozen_mut(side);
        *ft += split.today;
        *fh += split.his;
        Some(split)
    }

    /// Release volume frozen by [`freeze`](Self::freeze).
    pub fn unfreeze(&mut self, side: Direction, split: FrozenSplit) {
        let (ft, fh) = self.frozen_mut(side);
        *ft = (*ft - split.today).max(0);
        *fh = (*fh - split.his).max(0);
    }

    /// Add `volume` lots opened today at `price`.
    pub fn apply_open(&mut self, side: Direction, volume: i64, price: f64, spec: &InstrumentSpec) {
        let cost = price * volume as f64 * spec.volume_multiple;
        match side {
            Direction::Buy => {
                self.volume_long_today += volume;
                self.open_cost_long += cost;
                self.position_cost_long += cost;
            }
            Direction::Sell => {
                self.volume_short_today += volume;
                self.open_cost_short += cost;
                self.position_cost_short += cost;
            }
            Direction::Unknown => return,
        }
        self.sync_volumes();
    }

    /// Add `volume` lots held since a previous trading day at `price`.
    pub fn add_history(&mut self, side: Direction, volume: i64, price: f64, spec: &InstrumentSpec) {
        let cost = price * volume as f64 * spec.volume_multiple;
        match side {
            Direction::Buy => {
                self.volume_long_his += volume;
                self.open_cost_long += cost;
                self.position_cost_long += cost;
            }
            Direction::Sell => {
                self.volume_short_his += volume;
                self.open_cost_short += cost;
                self.position_cost_short += cost;
            }
            Direction::Unknown => return,
        }
        self.sync_volumes();
    }

    /// Buckets a close of `volume` lots would take when no freeze decided it:
    /// `Close` historical first, `CloseToday` today's only. Capped at what
    /// `side` holds.
    pub fn close_split(&self, side: Direction, offset: Offset, volume: i64) -> FrozenSplit {
        let (today, his, _, _) = self.buckets(side);
        let volume = volume.max(0);
        match offset {
            Offset::CloseToday => FrozenSplit { today: volume.min(today), his: 0 },
            Offset::Close => {
                let from_his = volume.min(his);
                FrozenSplit { today: (volume - from_his).min(today), his: from_his }
            }
            _ => FrozenSplit::default(),
        }
    }

    /// Remove the lots of `split` from the matching buckets of `side`, closed
    /// at `price`; returns the realised close profit measured against the
    /// position cost.
    ///
    /// Volume beyond what a bucket holds is ignored.
    pub fn apply_close(&mut self, side: Direction, split: FrozenSplit, price: f64, spec: &InstrumentSpec) -> f64 {
        let (today, his, _, _) = self.buckets(side);
        let take_today = split.today.clamp(0, today);
        let take_his = split.his.clamp(0, his);
        let closed = take_today + take_his;
        let held = today + his;
        if closed <= 0 || held <= 0 {
            return 0.0;
        }

        let ratio = closed as f64 / held as f64;
        let notional = price * closed as f64 * spec.volume_multiple;
        let profit = match side {
            Direction::Buy => {
                let pos_cost = self.position_cost_long * ratio;
                self.open_cost_long -= self.open_cost_long * ratio;
                self.position_cost_long -= pos_cost;
                self.volume_long_today -= take_today;
                self.volume_long_his -= take_his;
                notional - pos_cost
            }
            Direction::Sell => {
                let pos_cost = self.position_cost_short * ratio;
                self.open_cost_short -= self.open_cost_short * ratio;
                self.position_cost_short -= pos_cost;
                self.volume_short_today -= take_today;
                self.volume_short_his -= take_his;
                pos_cost - notional
            }
            Direction::Unknown => 0.0,
        };
        self.sync_volumes();
        profit
    }

    pub fn update_last_price(&mut self, last_price: f64) {
        self.last_price = last_price;
    }

    /// Recompute every derived figure from volumes, costs and `last_price`.
    pub fn recalc(&mut self, spec: &InstrumentSpec) {
        self.sync_volumes();
        let mult = spec.volume_multiple;

        let lots_long = self.volume_long as f64 * mult;
        let lots_short = self.volume_short as f64 * mult;
        if self.volume_long == 0 {
            self.open_cost_long = 0.0;
            self.position_cost_long = 0.0;
        }
        if self.volume_short == 0 {
            self.open_cost_short = 0.0;
            self.position_cost_short = 0.0;
        }
        self.open_price_long = avg(self.open_cost_long, lots_long);
        self.open_price_short = avg(self.open_cost_short, lots_short);
        self.position_price_long = avg(self.position_cost_long, lots_long);
        self.position_price_short = avg(self.position_cost_short, lots_short);

        if self.last_price > 0.0 {
            let value_long = self.last_price * lots_long;
            let value_short = self.last_price * lots_short;
            self.float_profit_long = value_long - self.open_cost_long;
            self.float_profit_short = self.open_cost_short - value_short;
            self.position_profit_long = value_long - self.position_cost_long;
            self.position_profit_short = self.position_cost_short - value_short;
            self.margin_long = value_long * spec.margin_rate;
            self.margin_short = value_short * spec.margin_rate;
        } else {
            self.float_profit_long = 0.0;
            self.float_profit_short = 0.0;
            self.position_profit_long = 0.0;
            self.position_profit_short = 0.0;
            self.margin_long = self.position_cost_long * spec.margin_rate;
            self.margin_short = self.position_cost_short * spec.margin_rate;
        }
        self.float_profit = self.float_profit_long + self.float_profit_short;
        self.position_profit = self.position_profit_long + self.position_profit_short;
        self.margin = self.margin_long + self.margin_short;
    }

    /// Re-establish the volume totals and clamp frozen counts to their buckets.
    fn sync_volumes(&mut self) {
        self.volume_long = self.volume_long_today + self.volume_long_his;
        self.volume_short = self.volume_short_today + self.volume_short_his;
        self.volume_long_frozen_today = self.volume_long_frozen_today.clamp(0, self.volume_long_today);
        self.volume_long_frozen_his = self.volume_long_frozen_his.clamp(0, self.volume_long_his);
        self.volume_short_frozen_today = self.volume_short_frozen_today.clamp(0, self.volume_short_today);
        self.volume_short_frozen_his = self.volume_short_frozen_his.clamp(0, self.volume_short_his);
    }

    /// `(today, his, frozen_today, frozen_his)` for one side.
    fn buckets(&self, side: Direction) -> (i64, i64, i64, i64) {
        match side {
            Direction::Buy => (
                self.volume_long_today,
                self.volume_long_his,
                self.volume_long_frozen_today,
                self.volume_long_frozen_his,
            ),
            Direction::Sell => (
                self.volume_short_today,
                self.volume_short_his,
                self.volume_short_frozen_today,
                self.volume_short_frozen_his,
            ),
            Direction::Unknown => (0, 0, 0, 0),
        }
    }

    fn frozen_mut(&mut self, side: Direction) -> (&mut i64, &mut i64) {
        match side {
            Direction::Sell => (&mut self.volume_short_frozen_today, &mut self.volume_short_frozen_his),
            // Unknown never reaches here: freeze() rejects it via closable() == 0
            _ => (&mut self.volume_long_frozen_today, &mut self.volume_long_frozen_his),
        }
    }
}

#[inline]
fn avg(cost: f64, lots: f64) -> f64 {
    if lots > 0.0 { cost / lots } else { 0.0 }
}

// ---------------------------------------------------------------------------
// Account
// ---------------------------------------------------------------------------

/// Funds of one trading account, keyed by `account_id`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Account {
    pub account_id: String,
    pub currency: String,

    /// Balance before the trading day opened.
    pub pre_balance: f64,

    // Cash events of the day.
    pub deposit: f64,
    pub withdraw: f64,
    pub close_profit: f64,
    pub commission: f64,
    pub premium: f64,
    pub static_balance: f64,

    // Open positions.
    pub position_profit: f64,
    pub float_profit: f64,

    /// Current equity.
    pub balance: f64,

    pub margin: f64,
    pub frozen_margin: f64,
    pub frozen_commission: f64,
    pub frozen_premium: f64,
    pub available: f64,
    pub risk_ratio: f64,

    #[serde(skip)]
    pub(crate) changed: bool,
}

impl Account {
    /// Pull position profit, float profit and margin from `positions`.
    pub fn absorb_positions<'a>(&mut self, positions: impl IntoIterator<Item = &'a Position>) {
        let (mut position_profit, mut float_profit, mut margin) = (0.0, 0.0, 0.0);
        for p in positions {
            position_profit += p.position_profit;
            float_profit += p.float_profit;
            margin += p.margin;
        }
        self.position_profit = position_profit;
        self.float_profit = float_profit;
        self.margin = margin;
    }

    /// Recompute balance, available funds and risk ratio from their inputs.
    pub fn recalc(&mut self) {
        self.static_balance = self.pre_balance + self.deposit - self.withdraw;
        self.balance = self.static_balance + self.close_profit - self.commission - self.premium
            + self.position_profit;
        self.available = self.balance
            - self.margin
            - self.frozen_margin
            - self.frozen_commission
            - self.frozen_premium;
        self.risk_ratio = if self.balance > 0.0 { self.margin / self.balance } else { 0.0 };
    }
}

// ---------------------------------------------------------------------------
// Bank links and transfers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bank {
    pub bank_id: String,
    pub bank_brch_id: String,
    pub bank_name: String,
    pub bank_account: String,
}

/// One bank ↔ futures account transfer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransferLog {
    pub seq_no: String,
    pub bank_account: String,
    pub trade_type: String,
    pub amount: f64,
    pub datetime: String,
    pub memo: String,
}

// ---------------------------------------------------------------------------
// Notification (session → consumer, not retained)
// ---------------------------------------------------------------------------

/// A transient message for the consumer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Notify {
    /// Notify class, e.g. [`NOTIFY_TYPE_MESSAGE`].
    #[serde(rename = "type")]
    pub notify_type: i64,
    pub code: i64,
    /// `"INFO"`, `"WARNING"` or `"ERROR"`.
    pub level: String,
    /// `"MESSAGE"` or `"TEXT"`.
    pub kind: String,
    pub content: String,
}

impl_dirtyable!(Order, Trade, Position, Account);

#[cfg(test)]
mod tests {
    use super::*;

    const CU: InstrumentSpec = InstrumentSpec { volume_multiple: 5.0, margin_rate: 0.1 };

    fn assert_volume_invariants(p: &Position) {
        assert_eq!(p.volume_long, p.volume_long_today + p.volume_long_his);
        assert_eq!(p.volume_short, p.volume_short_today + p.volume_short_his);
        assert!(p.volume_long_frozen_today <= p.volume_long_today);
        assert!(p.volume_long_frozen_his <= p.volume_long_his);
        assert!(p.volume_short_frozen_today <= p.volume_short_today);
        assert!(p.volume_short_frozen_his <= p.volume_short_his);
    }

    #[test]
    fn open_then_mark_to_market() {
        let mut p = Position::default();
        p.apply_open(Direction::Buy, 2, 100.0, &CU);
        p.update_last_price(110.0);
        p.recalc(&CU);
        assert_volume_invariants(&p);
        assert_eq!(p.volume_long, 2);
        assert_eq!(p.open_price_long, 100.0);
        assert_eq!(p.float_profit_long, 100.0); // (110 - 100) * 2 * 5
        assert_eq!(p.position_profit, 100.0);
        assert!((p.margin_long - 110.0).abs() < 1e-9); // 110 * 2 * 5 * 0.1
    }

    #[test]
    fn short_profit_sign() {
        let mut p = Position::default();
        p.apply_open(Direction::Sell, 1, 100.0, &CU);
        p.update_last_price(90.0);
        p.recalc(&CU);
        assert_eq!(p.float_profit_short, 50.0);
        assert_eq!(p.volume_short, 1);
    }

    #[test]
    fn close_takes_history_first() {
        let mut p = Position::default();
        p.add_history(Direction::Buy, 1, 100.0, &CU);
        p.apply_open(Direction::Buy, 1, 120.0, &CU);
        let split = p.close_split(Direction::Buy, Offset::Close, 1);
        assert_eq!(split, FrozenSplit { today: 0, his: 1 });
        let profit = p.apply_close(Direction::Buy, split, 130.0, &CU);
        assert_eq!(p.volume_long_his, 0);
        assert_eq!(p.volume_long_today, 1);
        // average position cost per lot is (500 + 600) / 2
        assert!((profit - (650.0 - 550.0)).abs() < 1e-9);
        p.recalc(&CU);
        assert_volume_invariants(&p);
    }

    #[test]
    fn close_today_leaves_history() {
        let mut p = Position::default();
        p.add_history(Direction::Buy, 3, 100.0, &CU);
        p.apply_open(Direction::Buy, 1, 100.0, &CU);
        let split = p.close_split(Direction::Buy, Offset::CloseToday, 5);
        assert_eq!(split, FrozenSplit { today: 1, his: 0 });
        p.apply_close(Direction::Buy, split, 100.0, &CU);
        assert_eq!(p.volume_long_today, 0);
        assert_eq!(p.volume_long_his, 3);
        assert_eq!(p.volume_long, 3);
    }

    #[test]
    fn freeze_respects_closable_volume() {
        let mut p = Position::default();
        p.add_history(Direction::Sell, 1, 10.0, &CU);
        p.apply_open(Direction::Sell, 2, 10.0, &CU);
        assert_eq!(p.closable(Direction::Sell, Offset::Close), 3);

        let split = p.freeze(Direction::Sell, Offset::Close, 2).unwrap();
        assert_eq!(split, FrozenSplit { today: 1, his: 1 });
        assert!(p.freeze(Direction::Sell, Offset::Close, 2).is_none());
        assert_eq!(p.closable(Direction::Sell, Offset::CloseToday), 1);

        p.unfreeze(Direction::Sell, split);
        assert_eq!(p.closable(Direction::Sell, Offset::Close), 3);
        assert_volume_invariants(&p);
    }

    #[test]
    fn frozen_released_with_the_closed_lots() {
        let mut p = Position::default();
        p.apply_open(Direction::Buy, 2, 10.0, &CU);
        let split = p.freeze(Direction::Buy, Offset::CloseToday, 2).unwrap();
        p.unfreeze(Direction::Buy, split);
        p.apply_close(Direction::Buy, split, 11.0, &CU);
        assert_eq!(p.volume_long_frozen_today, 0);
        assert_eq!(p.volume_long, 0);
        assert_volume_invariants(&p);
    }

    #[test]
    fn filling_one_close_keeps_the_other_frozen() {
        let mut p = Position::default();
        p.add_history(Direction::Buy, 1, 100.0, &CU);
        p.apply_open(Direction::Buy, 1, 100.0, &CU);
        let first = p.freeze(Direction::Buy, Offset::Close, 1).unwrap();
        let second = p.freeze(Direction::Buy, Offset::Close, 1).unwrap();
        assert_eq!(first, FrozenSplit { today: 0, his: 1 });
        assert_eq!(second, FrozenSplit { today: 1, his: 0 });

        // the second order fills: exactly the lot it froze goes away
        p.unfreeze(Direction::Buy, second);
        p.apply_close(Direction::Buy, second, 105.0, &CU);
        assert_eq!(p.volume_long_today, 0);
        assert_eq!(p.volume_long_his, 1);
        assert_eq!(p.volume_long_frozen_his, 1);
        assert_eq!(p.closable(Direction::Buy, Offset::Close), 0);
        assert_volume_invariants(&p);
    }

    #[test]
    fn account_balance_identity() {
        let mut a = Account {
            pre_balance: 1000.0,
            deposit: 200.0,
            withdraw: 50.0,
            close_profit: 30.0,
            commission: 5.0,
            premium: 2.0,
            frozen_margin: 10.0,
            frozen_commission: 1.0,
            ..Default::default()
        };
        let mut p = Position::default();
        p.apply_open(Direction::Buy, 1, 100.0, &CU);
        p.update_last_price(104.0);
        p.recalc(&CU);
        a.absorb_positions([&p]);
        a.recalc();

        assert_eq!(a.static_balance, 1150.0);
        assert_eq!(a.position_profit, 20.0);
        assert_eq!(a.balance, 1150.0 + 30.0 - 5.0 - 2.0 + 20.0);
        assert!((a.available - (a.balance - a.margin - 10.0 - 1.0)).abs() < 1e-9);
        assert!((a.risk_ratio - a.margin / a.balance).abs() < 1e-12);
    }

    #[test]
    fn risk_ratio_zero_without_equity() {
        let mut a = Account { margin: 10.0, ..Default::default() };
        a.recalc();
        assert_eq!(a.risk_ratio, 0.0);
    }

    #[test]
    fn login_validation_and_password_not_echoed() {
        let login: ReqLogin = serde_json::from_str(
            r#"{"aid":"req_login","bid":"simnow","user_name":"u","password":"secret"}"#,
        )
        .unwrap();
        assert!(login.validate().is_ok());
        assert_eq!(login.password, "secret");
        let echoed = serde_json::to_string(&login).unwrap();
        assert!(!echoed.contains("secret"));

        let bad = ReqLogin { user_name: "u".into(), ..Default::default() };
        assert!(bad.validate().is_err());
    }
}
