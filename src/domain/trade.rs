// ============================================================================
// Trade Domain Model
// ============================================================================

use crate::domain::order::OrderId;
use crate::domain::pair::{TradingPair, UserId};
use crate::numeric::{Amount, Price, Quantity};
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TradeId(Uuid);

impl TradeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TradeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TradeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A settled fill between a resting maker order and an incoming taker.
/// Immutable once written; the price is always the maker's limit price
/// at execution time.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Trade {
    pub id: TradeId,
    pub pair: TradingPair,
    pub maker_order_id: OrderId,
    pub taker_order_id: OrderId,
    pub maker_user_id: UserId,
    pub taker_user_id: UserId,
    pub price: Price,
    pub quantity: Quantity,
    pub maker_fee: Amount,
    pub taker_fee: Amount,
    pub executed_at: DateTime<Utc>,
    /// Position in the pair's total operation order; strictly increasing.
    pub sequence: u64,
}

impl Trade {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pair: TradingPair,
        maker_order_id: OrderId,
        taker_order_id: OrderId,
        maker_user_id: UserId,
        taker_user_id: UserId,
        price: Price,
        quantity: Quantity,
        maker_fee: Amount,
        taker_fee: Amount,
        sequence: u64,
    ) -> Self {
        Self {
            id: TradeId::new(),
            pair,
            maker_order_id,
            taker_order_id,
            maker_user_id,
            taker_user_id,
            price,
            quantity,
            maker_fee,
            taker_fee,
            executed_at: Utc::now(),
            sequence,
        }
    }

    /// Quote value of the fill (`price × quantity`), truncated to scale 8.
    pub fn notional(&self) -> Amount {
        self.price
            .checked_mul(self.quantity)
            .unwrap_or(Amount::ZERO)
    }
}

#[cfg(all(test, feature = "serde"))]
mod serde_tests {
    use super::*;

    #[test]
    fn test_trade_serializes_decimals_as_strings() {
        let trade = Trade::new(
            "BTC/USDT".parse().unwrap(),
            OrderId::new(),
            OrderId::new(),
            UserId(1),
            UserId(2),
            "50000".parse().unwrap(),
            "0.5".parse().unwrap(),
            "25".parse().unwrap(),
            "25".parse().unwrap(),
            1,
        );

        let json = serde_json::to_string(&trade).unwrap();
        assert!(json.contains("\"50000.00000000\""));
        assert!(json.contains("\"0.50000000\""));

        let back: Trade = serde_json::from_str(&json).unwrap();
        assert_eq!(back.price, trade.price);
        assert_eq!(back.quantity, trade.quantity);
        assert_eq!(back.maker_fee, trade.maker_fee);
    }
}
