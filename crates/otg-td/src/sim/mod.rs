//! Sim (paper broker) trading driver.
//!
//! Implements [`TraderDriver`](crate::TraderDriver) without any broker
//! connection: orders are accepted locally and filled when a `rtn_trade`
//! report arrives on the same input stream. Used by the runner for dry runs
//! and by the session tests.
//!
//! # Message flow
//!
//! ```text
//! insert_order ──► Order(Alive) ──rtn_trade──► Trade + Position + Account
//!      │                 └─cancel_order──► Order(Finished), frozen released
//!      └─ close offset: freeze closable volume of the opposite side
//! rtn_quote    ──► Position mark-to-market ──► Account
//! peek_message ──► next non-empty diff goes out
//! ```
//!
//! Diffs follow the peek protocol: after a `peek_message` the next change
//! set is emitted as soon as there is one, then the driver waits for the
//! next peek.

pub mod config;
pub mod message;

use ahash::AHashMap;
use anyhow::{Context, Result};
use otg_core::diff::Section;
use otg_core::time_util::now_ns;
use otg_core::{
    Direction, Dirtyable, FrozenSplit, NOTIFY_TYPE_TEXT, Offset, OrderStatus, Position,
    TransferLog, User,
};
use tracing::{debug, info, warn};

use self::config::SimConfig;
use self::message::{ActionCancelOrder, ActionInsertOrder, ReqTransfer, RtnQuote, RtnTrade, SimMessage};
use crate::{SessionContext, TraderDriver};

/// Paper broker driver.
pub struct SimDriver {
    config: SimConfig,
    /// Account id in use for the current run.
    account_id: String,
    /// A `peek_message` is outstanding.
    peeking: bool,
    /// Exchange order id counter.
    order_seq: u64,
    transfer_seq: u64,
    /// Transfers changed since the last emitted diff.
    transfers_changed: bool,
    /// Volume frozen by each alive close order.
    frozen: AHashMap<String, FrozenSplit>,
    /// Last quote by position key, for positions opened after the quote.
    last_prices: AHashMap<String, f64>,
    /// `(level, content)` messages raised while the state was locked.
    notices: Vec<(&'static str, String)>,
    fills: u64,
}

impl SimDriver {
    pub fn new(config: SimConfig) -> Self {
        Self {
            config,
            account_id: String::new(),
            peeking: false,
            order_seq: 0,
            transfer_seq: 0,
            transfers_changed: false,
            frozen: AHashMap::new(),
            last_prices: AHashMap::new(),
            notices: Vec::new(),
            fills: 0,
        }
    }

    /// Build from the raw `driver` block of a session entry.
    pub fn from_value(value: &serde_json::Value) -> Result<Self> {
        Ok(Self::new(SimConfig::from_value(value)?))
    }

    fn warn(&mut self, content: String) {
        self.notices.push(("WARNING", content));
    }

    /// Send the messages queued by [`warn`](Self::warn); the state must not be locked.
    fn send_notices(&mut self, ctx: &SessionContext) {
        for (level, content) in self.notices.drain(..) {
            match level {
                "WARNING" => ctx.notify_warning(content),
                _ => ctx.notify_info(content),
            }
        }
    }

    fn apply(&mut self, ctx: &SessionContext, user: &mut User, msg: SimMessage) {
        match msg {
            SimMessage::InsertOrder(req) => self.insert_order(ctx, user, req),
            SimMessage::CancelOrder(req) => self.cancel_order(ctx, user, req),
            SimMessage::ReqTransfer(req) => self.req_transfer(ctx, user, req),
            SimMessage::RtnTrade(rtn) => self.rtn_trade(ctx, user, rtn),
            SimMessage::RtnQuote(rtn) => self.rtn_quote(user, rtn),
            SimMessage::PeekMessage => self.peeking = true,
        }
    }

    // -----------------------------------------------------------------------
    // Client actions
    // -----------------------------------------------------------------------

    fn insert_order(&mut self, ctx: &SessionContext, user: &mut User, req: ActionInsertOrder) {
        if user.orders.contains_key(&req.order_id) {
            warn!("[{}] duplicate order id {}", ctx.label(), req.order_id);
            self.warn(format!("order {} rejected: duplicate order id", req.order_id));
            return;
        }

        let key = Position::key(&req.exchange_id, &req.instrument_id);
        let spec = self.config.instrument(&key);
        let rejection = if req.volume <= 0 {
            Some(format!("invalid volume {}", req.volume))
        } else if req.direction == Direction::Unknown || req.offset == Offset::Unknown {
            Some("direction and offset are required".to_string())
        } else if req.offset.is_close() {
            let side = req.direction.opposite();
            let pos = user.positions.get_mut(&key);
            match pos.and_then(|pos| pos.freeze(side, req.offset, req.volume).map(|split| (pos, split))) {
                Some((pos, split)) => {
                    pos.mark_dirty();
                    self.frozen.insert(req.order_id.clone(), split);
                    None
                }
                None => Some(format!("insufficient closable volume in {key}")),
            }
        } else {
            let required = req.limit_price * req.volume as f64 * spec.volume_multiple * spec.margin_rate
                + req.volume as f64 * self.config.commission_per_lot;
            let available = user.account(&self.account_id).map_or(0.0, |a| a.available);
            (required > available).then(|| format!("insufficient funds: need {required:.2}, have {available:.2}"))
        };

        let order = user.get_or_create_order(&req.order_id);
        order.exchange_id = req.exchange_id;
        order.instrument_id = req.instrument_id;
        order.direction = req.direction;
        order.offset = req.offset;
        order.volume_orign = req.volume;
        order.volume_left = req.volume;
        order.price_type = req.price_type;
        order.limit_price = req.limit_price;
        order.time_condition = req.time_condition;
        order.volume_condition = req.volume_condition;
        order.hedge_flag = req.hedge_flag;
        order.insert_date_time = now_ns();
        match rejection {
            Some(reason) => {
                order.status = OrderStatus::Finished;
                order.last_msg = reason.clone();
                order.mark_dirty();
                info!("[{}] order {} rejected: {reason}", ctx.label(), req.order_id);
                self.warn(format!("order {} rejected: {reason}", req.order_id));
            }
            None => {
                self.order_seq += 1;
                order.exchange_order_id = format!("{:08}", self.order_seq);
                order.status = OrderStatus::Alive;
                order.last_msg = "accepted".into();
                order.mark_dirty();
                debug!("[{}] order {} accepted as {}", ctx.label(), req.order_id, order.exchange_order_id);
            }
        }
        self.refresh_account(user);
    }

    fn cancel_order(&mut self, ctx: &SessionContext, user: &mut User, req: ActionCancelOrder) {
        let Some(order) = user.orders.get_mut(&req.order_id) else {
            self.warn(format!("cancel of {} rejected: unknown order", req.order_id));
            return;
        };
        if !order.is_alive() {
            self.warn(format!("cancel of {} rejected: order already finished", req.order_id));
            return;
        }
        order.status = OrderStatus::Finished;
        order.last_msg = "cancelled".into();
        order.mark_dirty();

        let side = order.direction.opposite();
        let key = Position::key(&order.exchange_id, &order.instrument_id);
        if let Some(split) = self.frozen.remove(&req.order_id) {
            if let Some(pos) = user.positions.get_mut(&key) {
                pos.unfreeze(side, split);
                pos.mark_dirty();
            }
        }
        info!("[{}] order {} cancelled", ctx.label(), req.order_id);
        self.refresh_account(user);
    }

    fn req_transfer(&mut self, ctx: &SessionContext, user: &mut User, req: ReqTransfer) {
        let Some(bank_account) = user.banks.get(&req.bank_id).map(|b| b.bank_account.clone()) else {
            self.warn(format!("transfer rejected: unknown bank {}", req.bank_id));
            return;
        };
        if req.amount == 0.0 || !req.amount.is_finite() {
            self.warn(format!("transfer rejected: invalid amount {}", req.amount));
            return;
        }
        let account = user.get_or_create_account(&self.account_id);
        if req.amount < 0.0 && -req.amount > account.available {
            self.warn(format!(
                "transfer rejected: withdraw {:.2} exceeds available {:.2}",
                -req.amount, account.available
            ));
            return;
        }
        let trade_type = if req.amount > 0.0 {
            account.deposit += req.amount;
            "deposit"
        } else {
            account.withdraw += -req.amount;
            "withdraw"
        };

        self.transfer_seq += 1;
        user.push_transfer(TransferLog {
            seq_no: self.transfer_seq.to_string(),
            bank_account,
            trade_type: trade_type.into(),
            amount: req.amount,
            datetime: now_ns().to_string(),
            memo: req.memo,
        });
        self.transfers_changed = true;
        self.notices.push(("INFO", format!("{trade_type} of {:.2} succeeded", req.amount.abs())));
        self.refresh_account(user);
    }

    // -----------------------------------------------------------------------
    // Broker reports
    // -----------------------------------------------------------------------

    fn rtn_trade(&mut self, ctx: &SessionContext, user: &mut User, rtn: RtnTrade) {
        if user.trades.contains_key(&rtn.trade_id) {
            debug!("[{}] duplicate trade {} ignored", ctx.label(), rtn.trade_id);
            return;
        }
        let Some(order) = user.orders.get_mut(&rtn.order_id) else {
            self.warn(format!("trade {} refers to unknown order {}", rtn.trade_id, rtn.order_id));
            return;
        };
        if !order.is_alive() || rtn.volume <= 0 {
            self.warn(format!("trade {} ignored: order {} not fillable", rtn.trade_id, rtn.order_id));
            return;
        }

        let volume = rtn.volume.min(order.volume_left);
        order.volume_left -= volume;
        let traded = order.volume_traded();
        if order.volume_left == 0 {
            order.status = OrderStatus::Finished;
            order.last_msg = "filled".into();
        }
        order.mark_dirty();
        let (direction, offset, finished) = (order.direction, order.offset, !order.is_alive());
        let (exchange_id, instrument_id) = (order.exchange_id.clone(), order.instrument_id.clone());

        let key = Position::key(&exchange_id, &instrument_id);
        let spec = self.config.instrument(&key);
        let commission = self.config.commission_per_lot * volume as f64;

        let trade = user.get_or_create_trade(&rtn.trade_id);
        trade.order_id = rtn.order_id.clone();
        trade.exchange_trade_id = rtn.exchange_trade_id;
        trade.exchange_id = exchange_id;
        trade.instrument_id = instrument_id;
        trade.direction = direction;
        trade.offset = offset;
        trade.volume = volume;
        trade.price = rtn.price;
        trade.trade_date_time = rtn.trade_date_time.unwrap_or_else(now_ns);
        trade.commission = commission;
        trade.mark_dirty();

        let pos = user.get_or_create_position(&key);
        let close_profit = if offset.is_close() {
            let side = direction.opposite();
            // a frozen order closes exactly the lots it reserved
            let closed = match self.frozen.get_mut(&rtn.order_id) {
                Some(split) => {
                    let his = volume.min(split.his);
                    let today = (volume - his).min(split.today);
                    split.his -= his;
                    split.today -= today;
                    let closed = FrozenSplit { today, his };
                    pos.unfreeze(side, closed);
                    closed
                }
                None => pos.close_split(side, offset, volume),
            };
            pos.apply_close(side, closed, rtn.price, &spec)
        } else {
            pos.apply_open(direction, volume, rtn.price, &spec);
            0.0
        };
        if let Some(&last) = self.last_prices.get(&key) {
            pos.update_last_price(last);
        }
        pos.recalc(&spec);
        pos.mark_dirty();
        if finished {
            self.frozen.remove(&rtn.order_id);
        }
        self.fills += 1;

        let account = user.get_or_create_account(&self.account_id);
        account.commission += commission;
        account.close_profit += close_profit;
        info!(
            "[{}] fill {} on {}: {volume} @ {} ({traded} traded, close_profit={close_profit:.2})",
            ctx.label(),
            rtn.trade_id,
            rtn.order_id,
            rtn.price
        );
        self.refresh_account(user);
    }

    fn rtn_quote(&mut self, user: &mut User, rtn: RtnQuote) {
        let key = Position::key(&rtn.exchange_id, &rtn.instrument_id);
        self.last_prices.insert(key.clone(), rtn.last_price);
        let Some(pos) = user.positions.get_mut(&key) else {
            return;
        };
        pos.update_last_price(rtn.last_price);
        pos.recalc(&self.config.instrument(&key));
        pos.mark_dirty();
        self.refresh_account(user);
    }

    // -----------------------------------------------------------------------
    // Derived state
    // -----------------------------------------------------------------------

    /// Recompute the account from alive orders and current positions.
    fn refresh_account(&self, user: &mut User) {
        let User { accounts, positions, orders, .. } = user;
        let (mut frozen_margin, mut frozen_commission) = (0.0, 0.0);
        for order in orders.values().filter(|o| o.is_alive()) {
            frozen_commission += order.volume_left as f64 * self.config.commission_per_lot;
            if order.offset == Offset::Open {
                let spec = self.config.instrument(&Position::key(&order.exchange_id, &order.instrument_id));
                frozen_margin +=
                    order.limit_price * order.volume_left as f64 * spec.volume_multiple * spec.margin_rate;
            }
        }
        let Some(account) = accounts.get_mut(&self.account_id) else {
            return;
        };
        account.frozen_margin = frozen_margin;
        account.frozen_commission = frozen_commission;
        account.absorb_positions(positions.values());
        account.recalc();
        account.mark_dirty();
    }

    /// Emit pending changes if the consumer asked for them.
    fn flush_if_peeking(&mut self, ctx: &SessionContext) -> Result<()> {
        if !self.peeking {
            return Ok(());
        }
        let sections: &[Section<'_>] = if self.transfers_changed { &[Section::Transfers] } else { &[] };
        if ctx.flush_dirty(sections)? {
            self.peeking = false;
            self.transfers_changed = false;
        }
        Ok(())
    }
}

impl TraderDriver for SimDriver {
    fn name(&self) -> &str {
        "sim"
    }

    fn on_init(&mut self, ctx: &SessionContext) -> Result<()> {
        let login = ctx.login().context("session started without a login request")?;
        self.account_id = if self.config.account_id.is_empty() {
            login.user_name.clone()
        } else {
            self.config.account_id.clone()
        };
        self.peeking = false;
        self.transfers_changed = false;
        self.frozen.clear();
        self.last_prices.clear();
        self.notices.clear();
        self.fills = 0;

        {
            let mut user = ctx.state();
            let account = user.get_or_create_account(&self.account_id);
            account.currency = self.config.currency.clone();
            account.pre_balance = self.config.pre_balance;
            account.mark_dirty();
            for (key, seed) in &self.config.positions {
                let spec = self.config.instrument(key);
                let pos = user.get_or_create_position(key);
                pos.add_history(Direction::Buy, seed.volume_long_his, seed.price, &spec);
                pos.add_history(Direction::Sell, seed.volume_short_his, seed.price, &spec);
                pos.update_last_price(seed.price);
                pos.recalc(&spec);
                pos.mark_dirty();
            }
            for bank in &self.config.banks {
                *user.get_or_create_bank(&bank.bank_id) = bank.clone();
            }
            self.refresh_account(&mut user);
        }
        ctx.emit_diff_with(&[Section::Login(&login), Section::Banks])?;
        info!("[{}] sim account {} ready (pre_balance={})", ctx.label(), self.account_id, self.config.pre_balance);
        ctx.notify_info("login succeeded");
        Ok(())
    }

    fn on_idle(&mut self, ctx: &SessionContext) -> Result<()> {
        self.flush_if_peeking(ctx)
    }

    fn on_finish(&mut self, ctx: &SessionContext) -> Result<()> {
        self.send_notices(ctx);
        let summary = format!("session closed after {} order(s) and {} fill(s)", self.order_seq, self.fills);
        ctx.emit_notification(NOTIFY_TYPE_TEXT, summary, "INFO", "TEXT");
        Ok(())
    }

    fn process_input(&mut self, ctx: &SessionContext, msg: &str) -> Result<()> {
        let msg: SimMessage =
            serde_json::from_str(msg).with_context(|| format!("unrecognized message: {msg}"))?;
        {
            let mut user = ctx.state();
            self.apply(ctx, &mut user, msg);
        }
        self.send_notices(ctx);
        self.flush_if_peeking(ctx)
    }
}
