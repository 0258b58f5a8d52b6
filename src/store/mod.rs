// ============================================================================
// Durable Stores
// Authoritative order records and the append-only trade log
// ============================================================================

use crate::domain::order::{Order, OrderId, OrderStatus};
use crate::domain::pair::{TradingPair, UserId};
use crate::domain::trade::Trade;
use crate::error::{ExchangeError, ExchangeResult};
use crossbeam_skiplist::SkipMap;
use dashmap::DashMap;
use std::sync::Arc;

// ============================================================================
// Order Store
// ============================================================================

/// Filter for order history queries.
#[derive(Debug, Clone)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub pair: Option<TradingPair>,
    pub limit: usize,
}

impl Default for OrderFilter {
    fn default() -> Self {
        Self {
            status: None,
            pair: None,
            limit: 50,
        }
    }
}

/// Authoritative order records, keyed by order id.
///
/// The in-memory book only carries `(order_id, remaining)` entries; status
/// and fee accrual live here exclusively.
#[derive(Default)]
pub struct OrderStore {
    orders: DashMap<OrderId, Order>,
}

impl OrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, order: Order) {
        self.orders.insert(order.id, order);
    }

    pub fn get(&self, id: OrderId) -> Option<Order> {
        self.orders.get(&id).map(|entry| entry.clone())
    }

    /// Fetch an order owned by `user`, hiding other users' orders behind
    /// `NotFound`.
    pub fn get_for_user(&self, user: UserId, id: OrderId) -> ExchangeResult<Order> {
        match self.orders.get(&id) {
            Some(entry) if entry.user_id == user => Ok(entry.clone()),
            _ => Err(ExchangeError::NotFound),
        }
    }

    /// Replace the stored record with an updated copy.
    pub fn update(&self, order: Order) -> ExchangeResult<()> {
        match self.orders.get_mut(&order.id) {
            Some(mut entry) => {
                *entry = order;
                Ok(())
            },
            None => Err(ExchangeError::Internal(format!(
                "update of unknown order {}",
                order.id
            ))),
        }
    }

    /// A user's orders, newest first.
    pub fn list(&self, user: UserId, filter: &OrderFilter) -> Vec<Order> {
        let mut orders: Vec<Order> = self
            .orders
            .iter()
            .filter(|entry| entry.user_id == user)
            .filter(|entry| filter.status.map_or(true, |s| entry.status == s))
            .filter(|entry| {
                filter
                    .pair
                    .as_ref()
                    .map_or(true, |p| &entry.pair == p)
            })
            .map(|entry| entry.clone())
            .collect();

        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.sequence.cmp(&a.sequence)));
        orders.truncate(filter.limit);
        orders
    }
}

// ============================================================================
// Trade Store
// ============================================================================

/// Append-only trade log.
///
/// Each pair keeps its trades in a concurrent skip map keyed by the pair's
/// execution sequence, so time-range and most-recent queries walk a sorted
/// index without blocking writers.
#[derive(Default)]
pub struct TradeStore {
    by_pair: DashMap<TradingPair, Arc<SkipMap<u64, Trade>>>,
}

impl TradeStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn index(&self, pair: &TradingPair) -> Arc<SkipMap<u64, Trade>> {
        self.by_pair.entry(pair.clone()).or_default().clone()
    }

    pub fn append(&self, trade: Trade) {
        self.index(&trade.pair).insert(trade.sequence, trade);
    }

    /// Most recent trades for a pair, newest first.
    pub fn recent(&self, pair: &TradingPair, limit: usize) -> Vec<Trade> {
        self.index(pair)
            .iter()
            .rev()
            .take(limit)
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Trades executed within `[from, to]` of a pair's sequence range.
    pub fn range(&self, pair: &TradingPair, from: u64, to: u64) -> Vec<Trade> {
        self.index(pair)
            .range(from..=to)
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// A user's fills across all pairs, newest first.
    pub fn for_user(&self, user: UserId, limit: usize) -> Vec<Trade> {
        let mut trades: Vec<Trade> = self
            .by_pair
            .iter()
            .flat_map(|entry| {
                entry
                    .value()
                    .iter()
                    .filter(|t| {
                        t.value().maker_user_id == user || t.value().taker_user_id == user
                    })
                    .map(|t| t.value().clone())
                    .collect::<Vec<_>>()
            })
            .collect();

        trades.sort_by(|a, b| b.executed_at.cmp(&a.executed_at).then(b.sequence.cmp(&a.sequence)));
        trades.truncate(limit);
        trades
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{OrderRequest, OrderType, Side};
    use crate::numeric::Amount;

    fn make_order(user: UserId, pair: &str) -> Order {
        let request = OrderRequest {
            user_id: user,
            pair: pair.parse().unwrap(),
            side: Side::Buy,
            order_type: OrderType::Limit,
            quantity: "1".parse().unwrap(),
            limit_price: Some("100".parse().unwrap()),
            quote_budget: None,
        };
        Order::from_request(&request, "100".parse().unwrap())
    }

    fn make_trade(pair: &str, maker: UserId, taker: UserId, seq: u64) -> Trade {
        Trade::new(
            pair.parse().unwrap(),
            OrderId::new(),
            OrderId::new(),
            maker,
            taker,
            "100".parse().unwrap(),
            "1".parse().unwrap(),
            Amount::ZERO,
            Amount::ZERO,
            seq,
        )
    }

    #[test]
    fn test_order_store_ownership() {
        let store = OrderStore::new();
        let order = make_order(UserId(1), "BTC/USDT");
        let id = order.id;
        store.insert(order);

        assert!(store.get_for_user(UserId(1), id).is_ok());
        assert!(matches!(
            store.get_for_user(UserId(2), id),
            Err(ExchangeError::NotFound)
        ));
    }

    #[test]
    fn test_order_list_filters() {
        let store = OrderStore::new();
        for _ in 0..3 {
            store.insert(make_order(UserId(1), "BTC/USDT"));
        }
        store.insert(make_order(UserId(1), "ETH/USDT"));
        store.insert(make_order(UserId(2), "BTC/USDT"));

        let all = store.list(UserId(1), &OrderFilter::default());
        assert_eq!(all.len(), 4);

        let btc_only = store.list(
            UserId(1),
            &OrderFilter {
                pair: Some("BTC/USDT".parse().unwrap()),
                ..Default::default()
            },
        );
        assert_eq!(btc_only.len(), 3);

        let capped = store.list(
            UserId(1),
            &OrderFilter {
                limit: 2,
                ..Default::default()
            },
        );
        assert_eq!(capped.len(), 2);
    }

    #[test]
    fn test_trade_store_recent_is_newest_first() {
        let store = TradeStore::new();
        for seq in 1..=5 {
            store.append(make_trade("BTC/USDT", UserId(1), UserId(2), seq));
        }

        let recent = store.recent(&"BTC/USDT".parse().unwrap(), 3);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].sequence, 5);
        assert_eq!(recent[2].sequence, 3);
    }

    #[test]
    fn test_trade_store_range() {
        let store = TradeStore::new();
        for seq in 1..=10 {
            store.append(make_trade("BTC/USDT", UserId(1), UserId(2), seq));
        }
        let mid = store.range(&"BTC/USDT".parse().unwrap(), 4, 6);
        assert_eq!(mid.len(), 3);
        assert_eq!(mid[0].sequence, 4);
    }

    #[test]
    fn test_trade_store_user_history_spans_pairs() {
        let store = TradeStore::new();
        store.append(make_trade("BTC/USDT", UserId(1), UserId(2), 1));
        store.append(make_trade("ETH/USDT", UserId(3), UserId(1), 1));
        store.append(make_trade("ETH/USDT", UserId(3), UserId(4), 2));

        let mine = store.for_user(UserId(1), 10);
        assert_eq!(mine.len(), 2);
        let theirs = store.for_user(UserId(4), 10);
        assert_eq!(theirs.len(), 1);
    }
}
