//! Inbound messages understood by the sim driver, tagged by `"aid"`.
//!
//! Client actions (`insert_order`, `cancel_order`, `req_transfer`,
//! `peek_message`) and broker reports (`rtn_trade`, `rtn_quote`) share one
//! stream, the way a real driver sees its own replies interleaved with
//! consumer requests.

use otg_core::{Direction, HedgeFlag, Offset, PriceType, TimeCondition, VolumeCondition};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "aid", rename_all = "snake_case")]
pub enum SimMessage {
    InsertOrder(ActionInsertOrder),
    CancelOrder(ActionCancelOrder),
    ReqTransfer(ReqTransfer),
    RtnTrade(RtnTrade),
    RtnQuote(RtnQuote),
    /// The consumer is ready for the next diff.
    PeekMessage,
}

/// New order request.
#[derive(Debug, Clone, Deserialize)]
pub struct ActionInsertOrder {
    pub order_id: String,
    pub exchange_id: String,
    #[serde(alias = "ins_id")]
    pub instrument_id: String,
    pub direction: Direction,
    pub offset: Offset,
    pub volume: i64,
    #[serde(default = "default_price_type")]
    pub price_type: PriceType,
    #[serde(default)]
    pub limit_price: f64,
    #[serde(default)]
    pub volume_condition: VolumeCondition,
    #[serde(default)]
    pub time_condition: TimeCondition,
    #[serde(default)]
    pub hedge_flag: HedgeFlag,
}

fn default_price_type() -> PriceType {
    PriceType::Limit
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActionCancelOrder {
    pub order_id: String,
}

/// Bank transfer; positive `amount` moves money into the trading account.
#[derive(Debug, Clone, Deserialize)]
pub struct ReqTransfer {
    pub bank_id: String,
    pub amount: f64,
    #[serde(default)]
    pub memo: String,
}

/// Fill report from the broker.
#[derive(Debug, Clone, Deserialize)]
pub struct RtnTrade {
    pub order_id: String,
    pub trade_id: String,
    pub volume: i64,
    pub price: f64,
    #[serde(default)]
    pub exchange_trade_id: String,
    /// Epoch nanoseconds; the local clock is used when absent.
    #[serde(default)]
    pub trade_date_time: Option<i64>,
}

/// Latest price of one instrument.
#[derive(Debug, Clone, Deserialize)]
pub struct RtnQuote {
    pub exchange_id: String,
    pub instrument_id: String,
    pub last_price: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tagged_messages() {
        let m: SimMessage = serde_json::from_str(
            r#"{"aid":"insert_order","order_id":"O1","exchange_id":"SHFE","ins_id":"cu2001",
                "direction":"BUY","offset":"OPEN","volume":2,"limit_price":100.5}"#,
        )
        .unwrap();
        let SimMessage::InsertOrder(o) = m else { panic!("wrong variant") };
        assert_eq!(o.instrument_id, "cu2001");
        assert_eq!(o.price_type, PriceType::Limit);
        assert_eq!(o.time_condition, TimeCondition::Gfd);

        let peek: SimMessage = serde_json::from_str(r#"{"aid":"peek_message"}"#).unwrap();
        assert!(matches!(peek, SimMessage::PeekMessage));
    }

    #[test]
    fn unknown_aid_is_an_error() {
        assert!(serde_json::from_str::<SimMessage>(r#"{"aid":"subscribe_quote"}"#).is_err());
    }
}
