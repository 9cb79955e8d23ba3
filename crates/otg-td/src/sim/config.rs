//! Sim driver configuration.
//!
//! Everything has a default, so an empty or missing `driver` block yields a
//! usable paper account.

use ahash::AHashMap;
use otg_core::{Bank, InstrumentSpec};
use serde::Deserialize;

/// Configuration for the sim (paper broker) driver.
#[derive(Debug, Clone, Deserialize)]
pub struct SimConfig {
    /// Account id; defaults to the login user name when empty.
    #[serde(default)]
    pub account_id: String,

    #[serde(default = "default_currency")]
    pub currency: String,

    /// Balance the account opens the day with.
    #[serde(default = "default_pre_balance")]
    pub pre_balance: f64,

    /// Flat commission charged per filled lot.
    #[serde(default)]
    pub commission_per_lot: f64,

    /// Contract parameters by position key (`"SHFE.cu2001"`).
    #[serde(default)]
    pub instruments: AHashMap<String, InstrumentSpec>,

    /// Used for instruments missing from `instruments`.
    #[serde(default)]
    pub default_instrument: InstrumentSpec,

    /// Bank links reported at login.
    #[serde(default)]
    pub banks: Vec<Bank>,

    /// Positions carried over from the previous trading day, by position key.
    #[serde(default)]
    pub positions: AHashMap<String, SeedPosition>,
}

/// Historical volume a sim account starts the day with.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct SeedPosition {
    pub volume_long_his: i64,
    pub volume_short_his: i64,
    /// Settlement price of the previous day, used as cost and last price.
    pub price: f64,
}

impl SimConfig {
    /// Parse the raw `driver` block of a session entry (`null` → defaults).
    pub fn from_value(value: &serde_json::Value) -> anyhow::Result<Self> {
        if value.is_null() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_value(value.clone())?)
    }

    pub fn instrument(&self, position_key: &str) -> InstrumentSpec {
        self.instruments.get(position_key).copied().unwrap_or(self.default_instrument)
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            account_id: String::new(),
            currency: default_currency(),
            pre_balance: default_pre_balance(),
            commission_per_lot: 0.0,
            instruments: AHashMap::new(),
            default_instrument: InstrumentSpec::default(),
            banks: Vec::new(),
            positions: AHashMap::new(),
        }
    }
}

fn default_currency() -> String {
    "CNY".into()
}

fn default_pre_balance() -> f64 {
    1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_block_gives_defaults() {
        let cfg = SimConfig::from_value(&serde_json::Value::Null).unwrap();
        assert_eq!(cfg.pre_balance, 1_000_000.0);
        assert_eq!(cfg.currency, "CNY");
        assert_eq!(cfg.instrument("X.y"), InstrumentSpec::default());
    }

    #[test]
    fn instrument_lookup_falls_back() {
        let cfg = SimConfig::from_value(&serde_json::json!({
            "pre_balance": 5000.0,
            "instruments": { "SHFE.cu2001": { "volume_multiple": 5.0, "margin_rate": 0.1 } },
            "banks": [{ "bank_id": "1", "bank_brch_id": "", "bank_name": "ICBC", "bank_account": "6222" }],
            "positions": { "SHFE.cu2001": { "volume_long_his": 2, "price": 100.0 } }
        }))
        .unwrap();
        assert_eq!(cfg.instrument("SHFE.cu2001").volume_multiple, 5.0);
        assert_eq!(cfg.instrument("DCE.m2001").volume_multiple, 1.0);
        assert_eq!(cfg.banks.len(), 1);
        assert_eq!(cfg.positions["SHFE.cu2001"].volume_long_his, 2);
        assert_eq!(cfg.positions["SHFE.cu2001"].volume_short_his, 0);
    }
}
