//! Change-filtered serialization of a [`User`].
//!
//! A diff carries, per collection, only the records whose dirty flag is set:
//!
//! ```json
//! {
//!   "accounts":  { "<account_id>": {...} },
//!   "positions": { "<exchange_id>.<instrument_id>": {...} },
//!   "orders":    { "<order_id>": {...} },
//!   "trades":    { "<trade_id>": {...} }
//! }
//! ```
//!
//! Producing a diff clears the flags it emitted, so a record that is not
//! touched again never shows up twice. The clear happens in a second phase,
//! after every record of every collection converted successfully: a failed
//! call leaves all flags exactly as it found them and the next call retries.
//!
//! Rarely changing sections (login echo, bank links, transfers) are not
//! dirty-tracked; they are written in full whenever a caller names them.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::dirty::Dirtyable;
use crate::error::Result;
use crate::types::{Notify, ReqLogin, User};

pub const KEY_ACCOUNTS: &str = "accounts";
pub const KEY_POSITIONS: &str = "positions";
pub const KEY_ORDERS: &str = "orders";
pub const KEY_TRADES: &str = "trades";
pub const KEY_NOTIFY: &str = "notify";

/// A section written in full, independent of dirty tracking.
#[derive(Debug, Clone, Copy)]
pub enum Section<'a> {
    /// Echo of the login request under `"login"` (password never included).
    Login(&'a ReqLogin),
    /// All bank links under `"banks"`.
    Banks,
    /// All transfer records under `"transfers"`.
    Transfers,
}

/// Dirty records of one collection, converted but not yet committed.
struct Pending<'a, T> {
    section: Map<String, Value>,
    visited: Vec<&'a mut T>,
}

impl<'a, T: Dirtyable> Pending<'a, T> {
    /// Clear the flags of every converted record and hand out the section.
    fn commit(self) -> Value {
        for record in self.visited {
            record.clear_dirty();
        }
        Value::Object(self.section)
    }
}

fn collect_dirty<'a, T, I>(records: I) -> Result<Pending<'a, T>>
where
    T: Serialize + Dirtyable + 'a,
    I: IntoIterator<Item = (&'a String, &'a mut T)>,
{
    let mut section = Map::new();
    let mut visited = Vec::new();
    for (key, record) in records {
        if record.is_dirty() {
            section.insert(key.clone(), serde_json::to_value(&*record)?);
            visited.push(record);
        }
    }
    Ok(Pending { section, visited })
}

fn full_section<'a, T, I>(records: I) -> Result<Value>
where
    T: Serialize + 'a,
    I: IntoIterator<Item = (&'a String, &'a T)>,
{
    let mut section = Map::new();
    for (key, record) in records {
        section.insert(key.clone(), serde_json::to_value(record)?);
    }
    Ok(Value::Object(section))
}

/// Diff of the dirty records of `user`; see the module docs.
pub fn serialize_dirty(user: &mut User) -> Result<Map<String, Value>> {
    serialize_with(user, &[])
}

/// Diff of the dirty records plus the named full `sections`.
///
/// The four collection keys are always present, possibly as empty objects.
pub fn serialize_with(user: &mut User, sections: &[Section<'_>]) -> Result<Map<String, Value>> {
    // Phase 1: convert. Any error returns here with no flag touched.
    let mut extra = Map::new();
    for section in sections {
        match section {
            Section::Login(login) => {
                extra.insert("login".into(), serde_json::to_value(login)?);
            }
            Section::Banks => {
                extra.insert("banks".into(), full_section(user.banks.iter())?);
            }
            Section::Transfers => {
                extra.insert("transfers".into(), full_section(user.transfers.iter())?);
            }
        }
    }
    let accounts = collect_dirty(user.accounts.iter_mut())?;
    let positions = collect_dirty(user.positions.iter_mut())?;
    let orders = collect_dirty(user.orders.iter_mut())?;
    let trades = collect_dirty(user.trades.iter_mut())?;

    // Phase 2: commit.
    let mut out = Map::new();
    out.insert(KEY_ACCOUNTS.into(), accounts.commit());
    out.insert(KEY_POSITIONS.into(), positions.commit());
    out.insert(KEY_ORDERS.into(), orders.commit());
    out.insert(KEY_TRADES.into(), trades.commit());
    out.extend(extra);
    Ok(out)
}

/// `{"notify": {"<id>": {...}}}` for one notification.
pub fn serialize_notify(id: &str, notify: &Notify) -> Result<Map<String, Value>> {
    let mut entry = Map::new();
    entry.insert(id.to_string(), serde_json::to_value(notify)?);
    let mut out = Map::new();
    out.insert(KEY_NOTIFY.into(), Value::Object(entry));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use ahash::AHashMap;

    use super::*;
    use crate::types::{Bank, OrderStatus};

    #[test]
    fn dirty_record_emitted_once() {
        let mut u = User::default();
        let o = u.get_or_create_order("O1");
        o.volume_left = 2;
        o.mark_dirty();

        let first = serialize_dirty(&mut u).unwrap();
        assert!(first[KEY_ORDERS].get("O1").is_some());
        assert_eq!(first[KEY_ORDERS]["O1"]["volume_left"], 2);
        assert!(first[KEY_ORDERS]["O1"].get("changed").is_none());

        let second = serialize_dirty(&mut u).unwrap();
        assert!(second[KEY_ORDERS].as_object().unwrap().is_empty());
        assert!(second.values().all(|v| v.as_object().is_some_and(|m| m.is_empty())));
    }

    #[test]
    fn clean_records_are_filtered_out() {
        let mut u = User::default();
        u.get_or_create_account("A1");
        u.get_or_create_trade("T1").mark_dirty();
        u.get_or_create_trade("T2");
        let p = u.get_or_create_position("SHFE.cu2001");
        p.mark_dirty();

        let diff = serialize_dirty(&mut u).unwrap();
        assert!(diff[KEY_ACCOUNTS].as_object().unwrap().is_empty());
        let trades = diff[KEY_TRADES].as_object().unwrap();
        assert_eq!(trades.len(), 1);
        assert!(trades.contains_key("T1"));
        assert!(diff[KEY_POSITIONS].get("SHFE.cu2001").is_some());
        assert!(!u.has_dirty());
    }

    #[test]
    fn retouched_record_reappears() {
        let mut u = User::default();
        u.get_or_create_order("O1").mark_dirty();
        serialize_dirty(&mut u).unwrap();

        let o = u.get_or_create_order("O1");
        o.status = OrderStatus::Finished;
        o.mark_dirty();
        let diff = serialize_dirty(&mut u).unwrap();
        assert_eq!(diff[KEY_ORDERS]["O1"]["status"], "FINISHED");
    }

    #[test]
    fn named_sections_ignore_dirty_state() {
        let mut u = User::default();
        *u.get_or_create_bank("B1") = Bank {
            bank_id: "B1".into(),
            bank_name: "ICBC".into(),
            ..Default::default()
        };
        let login = ReqLogin {
            aid: "req_login".into(),
            bid: "simnow".into(),
            user_name: "u".into(),
            password: "p".into(),
            broker: None,
        };
        for _ in 0..2 {
            let diff = serialize_with(&mut u, &[Section::Login(&login), Section::Banks]).unwrap();
            assert_eq!(diff["banks"]["B1"]["bank_name"], "ICBC");
            assert_eq!(diff["login"]["user_name"], "u");
            assert!(diff["login"].get("password").is_none());
            assert!(diff.get("transfers").is_none());
        }
    }

    #[test]
    fn notify_payload_shape() {
        let n = Notify {
            notify_type: 1,
            code: 0,
            level: "INFO".into(),
            kind: "MESSAGE".into(),
            content: "connected".into(),
        };
        let out = serialize_notify("N1", &n).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[KEY_NOTIFY]["N1"]["type"], 1);
        assert_eq!(out[KEY_NOTIFY]["N1"]["content"], "connected");
    }

    /// A record whose conversion always fails (non-string map keys).
    #[derive(Default, Serialize)]
    struct Broken {
        by_pair: HashMap<(i32, i32), i32>,
        #[serde(skip)]
        changed: bool,
    }
    crate::dirty::impl_dirtyable!(Broken);

    #[derive(Default, Serialize)]
    struct Fine {
        v: i32,
        #[serde(skip)]
        changed: bool,
    }
    crate::dirty::impl_dirtyable!(Fine);

    #[test]
    fn failed_conversion_clears_nothing() {
        let mut fine: AHashMap<String, Fine> = AHashMap::new();
        fine.entry("a".into()).or_default().mark_dirty();
        let mut broken: AHashMap<String, Broken> = AHashMap::new();
        let b = broken.entry("b".into()).or_default();
        b.by_pair.insert((1, 2), 3);
        b.mark_dirty();

        let mut attempt = || -> Result<(Value, Value)> {
            let f = collect_dirty(fine.iter_mut())?;
            let b = collect_dirty(broken.iter_mut())?;
            Ok((f.commit(), b.commit()))
        };
        assert!(attempt().is_err());
        assert!(fine.get("a").unwrap().is_dirty());
        assert!(broken.get("b").unwrap().is_dirty());
    }
}
