// ============================================================================
// Order Domain Model
// ============================================================================

use crate::domain::pair::{Asset, TradingPair, UserId};
use crate::error::ExchangeError;
use crate::numeric::{Amount, Price, Quantity};
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

// ============================================================================
// Value Objects
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OrderId(Uuid);

impl OrderId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum OrderType {
    Limit,
    Market,
}

// ============================================================================
// Order Status Machine
// ============================================================================

/// Order lifecycle state.
///
/// Transitions are monotone: once an order reaches `Filled`, `Cancelled`,
/// or `Rejected` it never leaves that state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum OrderStatus {
    Pending,
    Open,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected
        )
    }

    pub fn can_cancel(&self) -> bool {
        matches!(self, OrderStatus::Open | OrderStatus::PartiallyFilled)
    }

    /// Whether moving to `next` is a legal lifecycle step.
    pub fn can_transition(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        match (self, next) {
            (Pending, Open | PartiallyFilled | Filled | Cancelled | Rejected) => true,
            (Open, PartiallyFilled | Filled | Cancelled) => true,
            (PartiallyFilled, PartiallyFilled | Filled | Cancelled) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Open => "open",
            OrderStatus::PartiallyFilled => "partially_filled",
            OrderStatus::Filled => "filled",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

// ============================================================================
// Order Request (API boundary)
// ============================================================================

/// Parameters accepted from the HTTP layer when placing an order.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OrderRequest {
    pub user_id: UserId,
    pub pair: TradingPair,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: Quantity,
    /// Required for limit orders, rejected for market orders.
    pub limit_price: Option<Price>,
    /// Required for market buys: the maximum quote amount to spend,
    /// locked up front and drawn down fill by fill.
    pub quote_budget: Option<Amount>,
}

// ============================================================================
// Order Record
// ============================================================================

/// Durable order record. The store holds the authoritative copy; the book
/// only keeps `(order_id, remaining)` entries pointing back here.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub pair: TradingPair,
    pub side: Side,
    pub order_type: OrderType,
    pub limit_price: Option<Price>,
    pub quote_budget: Option<Amount>,
    pub original_quantity: Quantity,
    pub filled_quantity: Quantity,
    /// Fees accrued so far, denominated in the quote asset.
    pub accrued_fee: Amount,
    /// Exact amount still locked in the ledger for this order: quote for
    /// buys, base for sells. Cancellation and terminal fills release
    /// precisely this value, never a recomputation from the limit price.
    pub remaining_lock: Amount,
    pub status: OrderStatus,
    pub fee_asset: Asset,
    /// Arrival sequence within the pair; the time-priority key.
    pub sequence: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub filled_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Build a `Pending` record from a validated request; `locked` is the
    /// amount admission just locked in the ledger.
    pub fn from_request(request: &OrderRequest, locked: Amount) -> Self {
        let now = Utc::now();
        Self {
            id: OrderId::new(),
            user_id: request.user_id,
            pair: request.pair.clone(),
            side: request.side,
            order_type: request.order_type,
            limit_price: request.limit_price,
            quote_budget: request.quote_budget,
            original_quantity: request.quantity,
            filled_quantity: Quantity::ZERO,
            accrued_fee: Amount::ZERO,
            remaining_lock: locked,
            status: OrderStatus::Pending,
            fee_asset: request.pair.quote.clone(),
            sequence: 0,
            created_at: now,
            updated_at: now,
            filled_at: None,
            cancelled_at: None,
        }
    }

    pub fn remaining_quantity(&self) -> Quantity {
        self.original_quantity - self.filled_quantity
    }

    /// The asset admission locked for this order.
    pub fn lock_asset(&self) -> &Asset {
        match self.side {
            Side::Buy => &self.pair.quote,
            Side::Sell => &self.pair.base,
        }
    }

    pub fn is_limit(&self) -> bool {
        self.order_type == OrderType::Limit
    }

    pub fn is_market(&self) -> bool {
        self.order_type == OrderType::Market
    }

    /// Record a fill of `quantity`, charging `fee` and consuming
    /// `lock_spent` from the remaining lock.
    ///
    /// Returns the surplus lock released when the order just became
    /// `Filled` (fills at better-than-limit prices or an unspent market
    /// budget leave residue behind).
    pub fn apply_fill(
        &mut self,
        quantity: Quantity,
        fee: Amount,
        lock_spent: Amount,
    ) -> Result<Amount, ExchangeError> {
        if quantity > self.remaining_quantity() {
            return Err(ExchangeError::Internal(format!(
                "fill {} exceeds remaining {} on order {}",
                quantity,
                self.remaining_quantity(),
                self.id
            )));
        }
        if lock_spent > self.remaining_lock {
            return Err(ExchangeError::Internal(format!(
                "lock consumption {} exceeds remaining lock {} on order {}",
                lock_spent, self.remaining_lock, self.id
            )));
        }

        let next = if self.remaining_quantity() == quantity {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };
        if !self.status.can_transition(next) {
            return Err(ExchangeError::Internal(format!(
                "illegal transition {} -> {} on order {}",
                self.status, next, self.id
            )));
        }

        self.filled_quantity = self.filled_quantity.checked_add(quantity)?;
        self.accrued_fee = self.accrued_fee.checked_add(fee)?;
        self.remaining_lock = self.remaining_lock.checked_sub(lock_spent)?;
        self.status = next;
        let now = Utc::now();
        self.updated_at = now;

        if next == OrderStatus::Filled {
            self.filled_at = Some(now);
            let surplus = self.remaining_lock;
            self.remaining_lock = Amount::ZERO;
            Ok(surplus)
        } else {
            Ok(Amount::ZERO)
        }
    }

    /// Mark the order resting in the book after a matching walk.
    pub fn mark_resting(&mut self) {
        self.status = if self.filled_quantity.is_zero() {
            OrderStatus::Open
        } else {
            OrderStatus::PartiallyFilled
        };
        self.updated_at = Utc::now();
    }

    /// Cancel the order, returning the lock amount to release.
    pub fn cancel(&mut self) -> Result<Amount, ExchangeError> {
        if !self.status.can_cancel() {
            return Err(ExchangeError::NotCancellable);
        }
        let now = Utc::now();
        self.status = OrderStatus::Cancelled;
        self.cancelled_at = Some(now);
        self.updated_at = now;
        let released = self.remaining_lock;
        self.remaining_lock = Amount::ZERO;
        Ok(released)
    }

    /// Reject the order (admission failure or no-liquidity market order),
    /// returning the lock amount to release.
    pub fn reject(&mut self) -> Amount {
        self.status = OrderStatus::Rejected;
        self.updated_at = Utc::now();
        let released = self.remaining_lock;
        self.remaining_lock = Amount::ZERO;
        released
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(side: Side, order_type: OrderType) -> OrderRequest {
        OrderRequest {
            user_id: UserId(7),
            pair: "BTC/USDT".parse().unwrap(),
            side,
            order_type,
            quantity: "2".parse().unwrap(),
            limit_price: Some("50000".parse().unwrap()),
            quote_budget: None,
        }
    }

    #[test]
    fn test_new_order_is_pending() {
        let order = Order::from_request(
            &request(Side::Buy, OrderType::Limit),
            "100000".parse().unwrap(),
        );
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.remaining_quantity(), "2".parse().unwrap());
        assert_eq!(order.fee_asset.as_str(), "USDT");
        assert_eq!(order.lock_asset().as_str(), "USDT");
    }

    #[test]
    fn test_apply_fill_partial_then_full() {
        let mut order = Order::from_request(
            &request(Side::Buy, OrderType::Limit),
            "100000".parse().unwrap(),
        );

        let surplus = order
            .apply_fill(
                "0.5".parse().unwrap(),
                "25".parse().unwrap(),
                "25000".parse().unwrap(),
            )
            .unwrap();
        assert!(surplus.is_zero());
        assert_eq!(order.status, OrderStatus::PartiallyFilled);
        assert_eq!(order.remaining_quantity(), "1.5".parse().unwrap());

        // filling the rest at a better price leaves lock surplus behind
        let surplus = order
            .apply_fill(
                "1.5".parse().unwrap(),
                "73.5".parse().unwrap(),
                "73500".parse().unwrap(),
            )
            .unwrap();
        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(surplus, "1500".parse().unwrap());
        assert!(order.remaining_lock.is_zero());
        assert!(order.filled_at.is_some());
    }

    #[test]
    fn test_overfill_is_internal_error() {
        let mut order = Order::from_request(
            &request(Side::Sell, OrderType::Limit),
            "2".parse().unwrap(),
        );
        let err = order
            .apply_fill("3".parse().unwrap(), Amount::ZERO, Amount::ZERO)
            .unwrap_err();
        assert!(matches!(err, ExchangeError::Internal(_)));
        assert_eq!(order.status, OrderStatus::Pending);
    }

    #[test]
    fn test_cancel_releases_exact_lock() {
        let mut order = Order::from_request(
            &request(Side::Buy, OrderType::Limit),
            "100000".parse().unwrap(),
        );
        order.mark_resting();
        assert_eq!(order.status, OrderStatus::Open);

        let released = order.cancel().unwrap();
        assert_eq!(released, "100000".parse().unwrap());
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert!(order.cancelled_at.is_some());
    }

    #[test]
    fn test_terminal_states_stick() {
        let mut order = Order::from_request(
            &request(Side::Buy, OrderType::Limit),
            "100000".parse().unwrap(),
        );
        order.mark_resting();
        order.cancel().unwrap();
        assert!(matches!(order.cancel(), Err(ExchangeError::NotCancellable)));
        assert!(!OrderStatus::Filled.can_transition(OrderStatus::Open));
        assert!(!OrderStatus::Rejected.can_transition(OrderStatus::Filled));
    }
}
