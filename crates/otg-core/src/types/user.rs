//! The [`User`] aggregate: everything the broker reports for one login.
//!
//! Keyed collections use get-or-create access. A second insert with an
//! existing key never fails; it hands back the existing record for in-place
//! update, which is how key uniqueness is kept.
//!
//! # Thread safety
//!
//! None. The session engine keeps its `User` behind one mutex and every
//! reader or writer goes through that lock.

use ahash::AHashMap;

use super::trading::*;
use crate::dirty::Dirtyable;

#[derive(Debug, Clone, Default)]
pub struct User {
    pub user_id: String,
    pub accounts: AHashMap<String, Account>,
    pub positions: AHashMap<String, Position>,
    pub orders: AHashMap<String, Order>,
    pub trades: AHashMap<String, Trade>,
    pub banks: AHashMap<String, Bank>,
    pub transfers: AHashMap<String, TransferLog>,
}

impl User {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self { user_id: user_id.into(), ..Default::default() }
    }

    pub fn get_or_create_account(&mut self, key: &str) -> &mut Account {
        self.accounts.entry(key.to_string()).or_insert_with(|| Account {
            account_id: key.to_string(),
            ..Default::default()
        })
    }

    /// `key` is `"<exchange_id>.<instrument_id>"`; a key without a dot is
    /// taken as a bare instrument id.
    pub fn get_or_create_position(&mut self, key: &str) -> &mut Position {
        self.positions.entry(key.to_string()).or_insert_with(|| {
            let (exchange_id, instrument_id) = key.split_once('.').unwrap_or(("", key));
            Position {
                exchange_id: exchange_id.to_string(),
                instrument_id: instrument_id.to_string(),
                ..Default::default()
            }
        })
    }

    pub fn get_or_create_order(&mut self, key: &str) -> &mut Order {
        self.orders.entry(key.to_string()).or_insert_with(|| Order {
            order_id: key.to_string(),
            ..Default::default()
        })
    }

    pub fn get_or_create_trade(&mut self, key: &str) -> &mut Trade {
        self.trades.entry(key.to_string()).or_insert_with(|| Trade {
            trade_id: key.to_string(),
            ..Default::default()
        })
    }

    pub fn get_or_create_bank(&mut self, key: &str) -> &mut Bank {
        self.banks.entry(key.to_string()).or_insert_with(|| Bank {
            bank_id: key.to_string(),
            ..Default::default()
        })
    }

    /// Record a transfer, replacing any earlier entry with the same `seq_no`.
    pub fn push_transfer(&mut self, log: TransferLog) {
        self.transfers.insert(log.seq_no.clone(), log);
    }

    pub fn account(&self, key: &str) -> Option<&Account> {
        self.accounts.get(key)
    }

    pub fn position(&self, key: &str) -> Option<&Position> {
        self.positions.get(key)
    }

    pub fn order(&self, key: &str) -> Option<&Order> {
        self.orders.get(key)
    }

    pub fn trade(&self, key: &str) -> Option<&Trade> {
        self.trades.get(key)
    }

    /// Whether any record is waiting to be emitted.
    pub fn has_dirty(&self) -> bool {
        self.accounts.values().any(|r| r.is_dirty())
            || self.positions.values().any(|r| r.is_dirty())
            || self.orders.values().any(|r| r.is_dirty())
            || self.trades.values().any(|r| r.is_dirty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_or_create_is_idempotent() {
        let mut u = User::new("u1");
        u.get_or_create_order("O1").volume_orign = 3;
        let again = u.get_or_create_order("O1");
        assert_eq!(again.volume_orign, 3);
        assert_eq!(again.order_id, "O1");
        assert_eq!(u.orders.len(), 1);
    }

    #[test]
    fn position_key_is_split() {
        let mut u = User::default();
        let p = u.get_or_create_position("SHFE.cu2001");
        assert_eq!(p.exchange_id, "SHFE");
        assert_eq!(p.instrument_id, "cu2001");
        assert_eq!(Position::key("SHFE", "cu2001"), "SHFE.cu2001");

        let bare = u.get_or_create_position("IF2001");
        assert_eq!(bare.exchange_id, "");
        assert_eq!(bare.instrument_id, "IF2001");
    }

    #[test]
    fn new_records_are_clean() {
        let mut u = User::default();
        u.get_or_create_account("A");
        u.get_or_create_trade("T1");
        assert!(!u.has_dirty());
        u.get_or_create_trade("T1").mark_dirty();
        assert!(u.has_dirty());
    }

    #[test]
    fn transfers_keyed_by_seq_no() {
        let mut u = User::default();
        u.push_transfer(TransferLog { seq_no: "1".into(), amount: 10.0, ..Default::default() });
        u.push_transfer(TransferLog { seq_no: "1".into(), amount: 20.0, ..Default::default() });
        assert_eq!(u.transfers.len(), 1);
        assert_eq!(u.transfers["1"].amount, 20.0);
        u.get_or_create_bank("B1").bank_name = "bank".into();
        assert_eq!(u.banks["B1"].bank_id, "B1");
    }
}
