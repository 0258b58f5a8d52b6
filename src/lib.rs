// ============================================================================
// Exchange Core Library
// Spot-exchange order matching and settlement engine
// ============================================================================

//! # Exchange Core
//!
//! The order-matching and settlement engine of a spot crypto exchange:
//! price-time-priority order books per trading pair, pluggable level
//! allocation (FIFO or pro-rata), an exact fixed-point money type, a
//! balance ledger with atomic fill settlement, and live trade/book
//! event streams.
//!
//! ## Architecture
//!
//! - **One worker thread per pair** owns that pair's book and processes
//!   admissions, cancellations, and snapshots strictly in arrival order,
//!   so every pair has a total operation order while pairs progress
//!   independently.
//! - **The ledger is shared** across pairs; each fill commits its balance
//!   moves, fee transfer, order updates, and trade row as one atomic unit
//!   that rolls back wholesale on failure.
//! - **Books are compact**: they hold `(order_id, remaining)` entries
//!   only, and the order store stays the single source of truth for
//!   status and fees.
//!
//! ## Example
//!
//! ```
//! use exchange_core::prelude::*;
//!
//! let exchange = Exchange::new(ExchangeConfig::default()).unwrap();
//! let alice = UserId(1);
//! let bob = UserId(2);
//!
//! let btc = Asset::new("BTC");
//! let usdt = Asset::new("USDT");
//! exchange.deposit(alice, &btc, "1".parse().unwrap()).unwrap();
//! exchange.deposit(bob, &usdt, "60000".parse().unwrap()).unwrap();
//!
//! let ask = exchange
//!     .submit_order(OrderRequest {
//!         user_id: alice,
//!         pair: "BTC/USDT".parse().unwrap(),
//!         side: Side::Sell,
//!         order_type: OrderType::Limit,
//!         quantity: "0.5".parse().unwrap(),
//!         limit_price: Some("50000".parse().unwrap()),
//!         quote_budget: None,
//!     })
//!     .unwrap();
//! assert_eq!(ask.status, OrderStatus::Open);
//!
//! let bid = exchange
//!     .submit_order(OrderRequest {
//!         user_id: bob,
//!         pair: "BTC/USDT".parse().unwrap(),
//!         side: Side::Buy,
//!         order_type: OrderType::Limit,
//!         quantity: "0.5".parse().unwrap(),
//!         limit_price: Some("50000".parse().unwrap()),
//!         quote_budget: None,
//!     })
//!     .unwrap();
//! assert_eq!(bid.status, OrderStatus::Filled);
//! ```

pub mod book;
pub mod domain;
pub mod engine;
pub mod error;
pub mod events;
pub mod ledger;
pub mod numeric;
pub mod store;

// Re-exports for convenience
pub mod prelude {
    pub use crate::book::{BookSnapshot, LevelView};
    pub use crate::domain::{
        Asset, ExchangeConfig, MatchingAlgorithmType, Order, OrderId, OrderRequest, OrderStatus,
        OrderType, Side, Trade, TradeId, TradingPair, UserId,
    };
    pub use crate::engine::Exchange;
    pub use crate::error::{ExchangeError, ExchangeResult};
    pub use crate::events::MarketEvent;
    pub use crate::ledger::BalanceSnapshot;
    pub use crate::numeric::{Amount, FixedDecimal, Price, Quantity};
    pub use crate::store::OrderFilter;
}
