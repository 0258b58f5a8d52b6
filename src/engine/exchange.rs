// ============================================================================
// Exchange Facade
// Admission, cancellation, queries, and funds movement for all pairs
// ============================================================================

use crate::book::BookSnapshot;
use crate::domain::config::ExchangeConfig;
use crate::domain::order::{Order, OrderId, OrderRequest, OrderType, Side};
use crate::domain::pair::{Asset, TradingPair, UserId};
use crate::domain::trade::Trade;
use crate::engine::allocation::allocator_for;
use crate::engine::settlement::SettlementCoordinator;
use crate::engine::worker::{EngineOp, PairWorker};
use crate::error::{ExchangeError, ExchangeResult};
use crate::events::{MarketEvent, Publisher};
use crate::ledger::{BalanceSnapshot, Ledger};
use crate::numeric::Amount;
use crate::store::{OrderFilter, OrderStore, TradeStore};
use crossbeam::channel::{bounded, unbounded, Sender};
use std::collections::HashMap;
use std::thread::JoinHandle;
use std::sync::Arc;
use tracing::info;

struct EngineHandle {
    ops: Sender<EngineOp>,
    thread: Option<JoinHandle<()>>,
}

/// The exchange core: one matching worker per supported pair over a
/// shared ledger, order store, trade log, and event publisher.
///
/// All methods are safe to call from any thread; operations on the same
/// pair are linearized by its worker, operations on different pairs run
/// concurrently.
pub struct Exchange {
    config: ExchangeConfig,
    ledger: Arc<Ledger>,
    orders: Arc<OrderStore>,
    trades: Arc<TradeStore>,
    publisher: Arc<Publisher>,
    engines: HashMap<TradingPair, EngineHandle>,
}

impl Exchange {
    pub fn new(config: ExchangeConfig) -> ExchangeResult<Self> {
        config
            .validate()
            .map_err(ExchangeError::InvalidRequest)?;

        let ledger = Arc::new(Ledger::new());
        let orders = Arc::new(OrderStore::new());
        let trades = Arc::new(TradeStore::new());
        let publisher = Arc::new(Publisher::default());
        let settlement = Arc::new(SettlementCoordinator::new(
            Arc::clone(&ledger),
            Arc::clone(&orders),
            Arc::clone(&trades),
            config.fee_rate,
        ));

        let mut engines = HashMap::new();
        for pair in &config.supported_pairs {
            let (tx, rx) = unbounded();
            let thread = PairWorker::spawn(
                pair.clone(),
                Arc::clone(&orders),
                Arc::clone(&settlement),
                Arc::clone(&publisher),
                allocator_for(config.matching_algorithm),
                config.snapshot_depth,
                rx,
            );
            engines.insert(
                pair.clone(),
                EngineHandle {
                    ops: tx,
                    thread: Some(thread),
                },
            );
        }

        info!(pairs = engines.len(), "exchange started");
        Ok(Self {
            config,
            ledger,
            orders,
            trades,
            publisher,
            engines,
        })
    }

    fn engine(&self, pair: &TradingPair) -> ExchangeResult<&EngineHandle> {
        self.engines
            .get(pair)
            .ok_or_else(|| ExchangeError::InvalidRequest(format!("unsupported pair {pair}")))
    }

    // ========================================================================
    // Trading
    // ========================================================================

    /// Validate, lock funds, persist, and hand the order to its pair
    /// worker. Returns the record as it stands after the matching step.
    pub fn submit_order(&self, request: OrderRequest) -> ExchangeResult<Order> {
        self.validate_request(&request)?;
        let (lock_asset, lock_amount) = required_lock(&request)?;

        self.ledger
            .lock(request.user_id, &lock_asset, lock_amount)?;

        let order = Order::from_request(&request, lock_amount);
        let order_id = order.id;
        self.orders.insert(order.clone());

        let engine = self.engine(&request.pair)?;
        let (reply_tx, reply_rx) = bounded(1);
        if engine
            .ops
            .send(EngineOp::Admit {
                order_id,
                reply: reply_tx,
            })
            .is_err()
        {
            // worker is gone and never saw the order: undo admission
            self.refund_unprocessed(order)?;
            return Err(ExchangeError::EngineStopped);
        }

        reply_rx
            .recv()
            .map_err(|_| ExchangeError::EngineStopped)?
    }

    /// Cancel a resting order. Linearized with the pair's admissions, so
    /// it can never outrun a matching step already in the queue.
    pub fn cancel_order(&self, user_id: UserId, order_id: OrderId) -> ExchangeResult<Order> {
        let order = self.orders.get_for_user(user_id, order_id)?;
        let engine = self.engine(&order.pair)?;

        let (reply_tx, reply_rx) = bounded(1);
        engine
            .ops
            .send(EngineOp::Cancel {
                order_id,
                user_id,
                reply: reply_tx,
            })
            .map_err(|_| ExchangeError::EngineStopped)?;
        reply_rx
            .recv()
            .map_err(|_| ExchangeError::EngineStopped)?
    }

    pub fn get_order(&self, user_id: UserId, order_id: OrderId) -> ExchangeResult<Order> {
        self.orders.get_for_user(user_id, order_id)
    }

    pub fn list_orders(&self, user_id: UserId, filter: &OrderFilter) -> Vec<Order> {
        self.orders.list(user_id, filter)
    }

    // ========================================================================
    // Market data
    // ========================================================================

    /// Point-in-time book depth, serviced in the pair's operation stream.
    pub fn book_snapshot(
        &self,
        pair: &TradingPair,
        depth: Option<usize>,
    ) -> ExchangeResult<BookSnapshot> {
        let engine = self.engine(pair)?;
        let (reply_tx, reply_rx) = bounded(1);
        engine
            .ops
            .send(EngineOp::Snapshot {
                depth: depth.unwrap_or(self.config.snapshot_depth),
                reply: reply_tx,
            })
            .map_err(|_| ExchangeError::EngineStopped)?;
        reply_rx
            .recv()
            .map_err(|_| ExchangeError::EngineStopped)?
    }

    pub fn recent_trades(&self, pair: &TradingPair, limit: usize) -> ExchangeResult<Vec<Trade>> {
        self.engine(pair)?;
        Ok(self.trades.recent(pair, limit))
    }

    pub fn user_trades(&self, user_id: UserId, limit: usize) -> Vec<Trade> {
        self.trades.for_user(user_id, limit)
    }

    /// Live event stream for one pair: trades in execution order plus a
    /// book update per step. Lagging subscribers lose events and should
    /// resync via [`Exchange::book_snapshot`].
    pub fn subscribe(
        &self,
        pair: &TradingPair,
    ) -> ExchangeResult<tokio::sync::broadcast::Receiver<MarketEvent>> {
        self.engine(pair)?;
        Ok(self.publisher.subscribe(pair))
    }

    // ========================================================================
    // Funds (wallet subsystem entry points)
    // ========================================================================

    pub fn deposit(
        &self,
        user_id: UserId,
        asset: &Asset,
        amount: Amount,
    ) -> ExchangeResult<BalanceSnapshot> {
        if !amount.is_positive() {
            return Err(ExchangeError::InvalidRequest(
                "deposit amount must be positive".to_string(),
            ));
        }
        self.ledger.credit(user_id, asset, amount)?;
        Ok(self.ledger.balance(user_id, asset))
    }

    pub fn withdraw(
        &self,
        user_id: UserId,
        asset: &Asset,
        amount: Amount,
    ) -> ExchangeResult<BalanceSnapshot> {
        if !amount.is_positive() {
            return Err(ExchangeError::InvalidRequest(
                "withdrawal amount must be positive".to_string(),
            ));
        }
        self.ledger.debit(user_id, asset, amount)?;
        Ok(self.ledger.balance(user_id, asset))
    }

    pub fn balance(&self, user_id: UserId, asset: &Asset) -> BalanceSnapshot {
        self.ledger.balance(user_id, asset)
    }

    /// Sum of one asset across every account; constant under trading.
    pub fn asset_supply(&self, asset: &Asset) -> Amount {
        self.ledger.asset_supply(asset)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Stop every pair worker and wait for them to drain.
    pub fn shutdown(&mut self) {
        for (pair, mut handle) in self.engines.drain() {
            drop(handle.ops);
            if let Some(thread) = handle.thread.take() {
                let _ = thread.join();
            }
            info!(%pair, "pair worker joined");
        }
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn validate_request(&self, request: &OrderRequest) -> ExchangeResult<()> {
        if !self.config.supports(&request.pair) {
            return Err(ExchangeError::InvalidRequest(format!(
                "unsupported pair {}",
                request.pair
            )));
        }
        if !request.quantity.is_positive() {
            return Err(ExchangeError::InvalidRequest(
                "quantity must be positive".to_string(),
            ));
        }

        match request.order_type {
            OrderType::Limit => {
                match request.limit_price {
                    Some(price) if price.is_positive() => {},
                    _ => {
                        return Err(ExchangeError::InvalidRequest(
                            "limit orders require a positive price".to_string(),
                        ))
                    },
                }
                if request.quote_budget.is_some() {
                    return Err(ExchangeError::InvalidRequest(
                        "quote budget is only valid on market buys".to_string(),
                    ));
                }
            },
            OrderType::Market => {
                if request.limit_price.is_some() {
                    return Err(ExchangeError::InvalidRequest(
                        "market orders cannot carry a price".to_string(),
                    ));
                }
                match (request.side, request.quote_budget) {
                    (Side::Buy, Some(budget)) if budget.is_positive() => {},
                    (Side::Buy, _) => {
                        return Err(ExchangeError::InvalidRequest(
                            "market buys require a positive quote budget".to_string(),
                        ))
                    },
                    (Side::Sell, None) => {},
                    (Side::Sell, Some(_)) => {
                        return Err(ExchangeError::InvalidRequest(
                            "quote budget is only valid on market buys".to_string(),
                        ))
                    },
                }
            },
        }

        Ok(())
    }

    /// Undo an admission whose worker never saw the order.
    fn refund_unprocessed(&self, mut order: Order) -> ExchangeResult<()> {
        let released = order.reject();
        self.ledger
            .unlock(order.user_id, order.lock_asset(), released)?;
        self.orders.update(order)
    }
}

impl Drop for Exchange {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Asset and amount admission must lock for a validated request.
fn required_lock(request: &OrderRequest) -> ExchangeResult<(Asset, Amount)> {
    match (request.side, request.order_type) {
        (Side::Buy, OrderType::Limit) => {
            let price = request.limit_price.ok_or_else(|| {
                ExchangeError::InvalidRequest("limit orders require a price".to_string())
            })?;
            Ok((
                request.pair.quote.clone(),
                request.quantity.checked_mul(price)?,
            ))
        },
        (Side::Buy, OrderType::Market) => {
            let budget = request.quote_budget.ok_or_else(|| {
                ExchangeError::InvalidRequest("market buys require a quote budget".to_string())
            })?;
            Ok((request.pair.quote.clone(), budget))
        },
        (Side::Sell, _) => Ok((request.pair.base.clone(), request.quantity)),
    }
}

// ============================================================================
// Tests — end-to-end scenarios
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::MatchingAlgorithmType;
    use crate::domain::order::OrderStatus;
    use crate::numeric::Quantity;

    fn amt(s: &str) -> Amount {
        s.parse().unwrap()
    }

    fn btc_usdt() -> TradingPair {
        "BTC/USDT".parse().unwrap()
    }

    fn usdt() -> Asset {
        Asset::new("USDT")
    }

    fn btc() -> Asset {
        Asset::new("BTC")
    }

    fn exchange(algorithm: MatchingAlgorithmType) -> Exchange {
        let config = ExchangeConfig::new(vec![btc_usdt(), "ETH/USDT".parse().unwrap()])
            .with_matching_algorithm(algorithm);
        Exchange::new(config).unwrap()
    }

    fn limit(user: u64, side: Side, quantity: &str, price: &str) -> OrderRequest {
        OrderRequest {
            user_id: UserId(user),
            pair: btc_usdt(),
            side,
            order_type: OrderType::Limit,
            quantity: quantity.parse().unwrap(),
            limit_price: Some(price.parse().unwrap()),
            quote_budget: None,
        }
    }

    fn market_buy(user: u64, quantity: &str, budget: &str) -> OrderRequest {
        OrderRequest {
            user_id: UserId(user),
            pair: btc_usdt(),
            side: Side::Buy,
            order_type: OrderType::Market,
            quantity: quantity.parse().unwrap(),
            limit_price: None,
            quote_budget: Some(budget.parse().unwrap()),
        }
    }

    #[test]
    fn scenario_exact_match_fifo() {
        let ex = exchange(MatchingAlgorithmType::Fifo);
        let a = UserId(1);
        let b = UserId(2);
        ex.deposit(a, &btc(), amt("1")).unwrap();
        ex.deposit(b, &usdt(), amt("26000")).unwrap();

        let sell = ex.submit_order(limit(1, Side::Sell, "0.5", "50000")).unwrap();
        assert_eq!(sell.status, OrderStatus::Open);

        let buy = ex.submit_order(limit(2, Side::Buy, "0.5", "50000")).unwrap();
        assert_eq!(buy.status, OrderStatus::Filled);

        // seller credited 25000 × (1 − 0.001) = 24975
        assert_eq!(ex.balance(a, &usdt()).total, amt("24975"));
        assert_eq!(ex.balance(a, &btc()).total, amt("0.5"));
        // buyer paid 25000 + 25 fee
        assert_eq!(ex.balance(b, &usdt()).total, amt("975"));
        assert_eq!(ex.balance(b, &btc()).total, amt("0.5"));

        let seller_order = ex.get_order(a, sell.id).unwrap();
        assert_eq!(seller_order.status, OrderStatus::Filled);

        let trades = ex.recent_trades(&btc_usdt(), 10).unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].price, amt("50000"));
        assert_eq!(trades[0].quantity, amt("0.5"));
    }

    #[test]
    fn scenario_partial_fill_then_rest() {
        let ex = exchange(MatchingAlgorithmType::Fifo);
        ex.deposit(UserId(1), &btc(), amt("2")).unwrap();
        ex.deposit(UserId(2), &usdt(), amt("20000")).unwrap();

        let sell = ex.submit_order(limit(1, Side::Sell, "2", "50000")).unwrap();
        let buy = ex.submit_order(limit(2, Side::Buy, "0.3", "50000")).unwrap();

        assert_eq!(buy.status, OrderStatus::Filled);
        let sell = ex.get_order(UserId(1), sell.id).unwrap();
        assert_eq!(sell.status, OrderStatus::PartiallyFilled);
        assert_eq!(sell.remaining_quantity(), amt("1.7"));

        let snapshot = ex.book_snapshot(&btc_usdt(), None).unwrap();
        assert_eq!(snapshot.asks[0].quantity, amt("1.7"));
        assert!(snapshot.bids.is_empty());
    }

    #[test]
    fn scenario_price_priority() {
        let ex = exchange(MatchingAlgorithmType::Fifo);
        ex.deposit(UserId(1), &btc(), amt("1")).unwrap();
        ex.deposit(UserId(2), &btc(), amt("1")).unwrap();
        ex.deposit(UserId(3), &usdt(), amt("20000")).unwrap();

        let a = ex.submit_order(limit(1, Side::Sell, "0.1", "49000")).unwrap();
        let b = ex.submit_order(limit(2, Side::Sell, "0.1", "50000")).unwrap();
        let c = ex.submit_order(limit(3, Side::Buy, "0.2", "51000")).unwrap();

        assert_eq!(c.status, OrderStatus::Filled);

        let trades = ex.recent_trades(&btc_usdt(), 10).unwrap();
        assert_eq!(trades.len(), 2);
        // newest first: the 50000 fill came second
        assert_eq!(trades[0].price, amt("50000"));
        assert_eq!(trades[0].maker_order_id, b.id);
        assert_eq!(trades[1].price, amt("49000"));
        assert_eq!(trades[1].maker_order_id, a.id);

        // buyer paid maker prices, not the 51000 limit
        let spent = amt("20000") - ex.balance(UserId(3), &usdt()).total;
        let expected = amt("4900") + amt("5000") + amt("9.9"); // notionals + taker fees
        assert_eq!(spent, expected);
    }

    #[test]
    fn scenario_pro_rata_allocation() {
        let ex = exchange(MatchingAlgorithmType::ProRata);
        ex.deposit(UserId(1), &btc(), amt("0.5")).unwrap();
        ex.deposit(UserId(2), &btc(), amt("1")).unwrap();
        ex.deposit(UserId(3), &btc(), amt("0.5")).unwrap();
        ex.deposit(UserId(4), &usdt(), amt("60000")).unwrap();

        let s1 = ex.submit_order(limit(1, Side::Sell, "0.5", "50000")).unwrap();
        let s2 = ex.submit_order(limit(2, Side::Sell, "1.0", "50000")).unwrap();
        let s3 = ex.submit_order(limit(3, Side::Sell, "0.5", "50000")).unwrap();

        let buy = ex.submit_order(limit(4, Side::Buy, "1.0", "50000")).unwrap();
        assert_eq!(buy.status, OrderStatus::Filled);

        // shares 0.25 / 0.50 / 0.25, no residue
        let s1 = ex.get_order(UserId(1), s1.id).unwrap();
        let s2 = ex.get_order(UserId(2), s2.id).unwrap();
        let s3 = ex.get_order(UserId(3), s3.id).unwrap();
        assert_eq!(s1.remaining_quantity(), amt("0.25"));
        assert_eq!(s2.remaining_quantity(), amt("0.5"));
        assert_eq!(s3.remaining_quantity(), amt("0.25"));
        assert_eq!(s1.status, OrderStatus::PartiallyFilled);
        assert_eq!(s2.status, OrderStatus::PartiallyFilled);
        assert_eq!(s3.status, OrderStatus::PartiallyFilled);

        let snapshot = ex.book_snapshot(&btc_usdt(), None).unwrap();
        assert_eq!(snapshot.asks[0].quantity, amt("1"));
        assert_eq!(snapshot.asks[0].order_count, 3);
    }

    #[test]
    fn scenario_cancellation_releases_funds() {
        let ex = exchange(MatchingAlgorithmType::Fifo);
        let buyer = UserId(1);
        ex.deposit(buyer, &usdt(), amt("30000")).unwrap();

        let buy = ex.submit_order(limit(1, Side::Buy, "0.5", "50000")).unwrap();
        assert_eq!(buy.status, OrderStatus::Open);
        assert_eq!(ex.balance(buyer, &usdt()).locked, amt("25000"));

        let cancelled = ex.cancel_order(buyer, buy.id).unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        let b = ex.balance(buyer, &usdt());
        assert_eq!(b.locked, Amount::ZERO);
        assert_eq!(b.total, amt("30000"));

        // idempotence: second cancel is a rejected no-op
        assert!(matches!(
            ex.cancel_order(buyer, buy.id),
            Err(ExchangeError::NotCancellable)
        ));

        let snapshot = ex.book_snapshot(&btc_usdt(), None).unwrap();
        assert!(snapshot.bids.is_empty());
    }

    #[test]
    fn scenario_market_with_thin_book() {
        let ex = exchange(MatchingAlgorithmType::Fifo);
        ex.deposit(UserId(1), &btc(), amt("0.1")).unwrap();
        ex.deposit(UserId(2), &usdt(), amt("20000")).unwrap();

        ex.submit_order(limit(1, Side::Sell, "0.1", "49000")).unwrap();

        let order = ex.submit_order(market_buy(2, "0.3", "15000")).unwrap();

        // one fill at 49000 for the full resting 0.1, then the book is
        // empty: the taker ends partially filled with its residual
        // discarded and the unspent budget unlocked
        assert_eq!(order.status, OrderStatus::PartiallyFilled);
        assert_eq!(order.filled_quantity, amt("0.1"));

        let trades = ex.recent_trades(&btc_usdt(), 10).unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].price, amt("49000"));
        assert_eq!(trades[0].quantity, amt("0.1"));

        // spent 4900 notional + 4.9 fee out of the 15000 budget; the
        // rest is unlocked, nothing rests in the book
        let b = ex.balance(UserId(2), &usdt());
        assert_eq!(b.locked, Amount::ZERO);
        assert_eq!(b.total, amt("20000") - amt("4904.9"));
        let snapshot = ex.book_snapshot(&btc_usdt(), None).unwrap();
        assert!(snapshot.bids.is_empty());
        assert!(snapshot.asks.is_empty());
    }

    #[test]
    fn market_buy_without_budget_is_rejected() {
        let ex = exchange(MatchingAlgorithmType::Fifo);
        let request = OrderRequest {
            quote_budget: None,
            ..market_buy(1, "1", "1")
        };
        assert!(matches!(
            ex.submit_order(request),
            Err(ExchangeError::InvalidRequest(_))
        ));
    }

    #[test]
    fn market_order_against_empty_book_is_no_liquidity() {
        let ex = exchange(MatchingAlgorithmType::Fifo);
        ex.deposit(UserId(1), &usdt(), amt("1000")).unwrap();

        let err = ex.submit_order(market_buy(1, "0.1", "1000")).unwrap_err();
        assert!(matches!(err, ExchangeError::NoLiquidity));

        // lock fully refunded
        let b = ex.balance(UserId(1), &usdt());
        assert_eq!(b.total, amt("1000"));
        assert_eq!(b.locked, Amount::ZERO);
    }

    #[test]
    fn insufficient_balance_rejects_admission() {
        let ex = exchange(MatchingAlgorithmType::Fifo);
        ex.deposit(UserId(1), &usdt(), amt("100")).unwrap();

        let err = ex
            .submit_order(limit(1, Side::Buy, "0.5", "50000"))
            .unwrap_err();
        assert!(matches!(err, ExchangeError::InsufficientBalance { .. }));
        assert_eq!(ex.balance(UserId(1), &usdt()).locked, Amount::ZERO);
    }

    #[test]
    fn residual_lock_after_better_priced_fills_is_released_on_cancel() {
        let ex = exchange(MatchingAlgorithmType::Fifo);
        ex.deposit(UserId(1), &btc(), amt("0.2")).unwrap();
        ex.deposit(UserId(2), &usdt(), amt("60000")).unwrap();

        // maker asks 49000; buyer bids 50000 for 1.0 and locks 50000
        ex.submit_order(limit(1, Side::Sell, "0.2", "49000")).unwrap();
        let buy = ex.submit_order(limit(2, Side::Buy, "1.0", "50000")).unwrap();
        assert_eq!(buy.status, OrderStatus::PartiallyFilled);

        // cost so far: 0.2 × 49000 × 1.001 = 9809.8 consumed from the lock
        let locked = ex.balance(UserId(2), &usdt()).locked;
        assert_eq!(locked, amt("50000") - amt("9809.8"));

        // cancelling returns exactly the tracked remainder, not
        // remaining × limit price (which would be 40000)
        ex.cancel_order(UserId(2), buy.id).unwrap();
        let b = ex.balance(UserId(2), &usdt());
        assert_eq!(b.locked, Amount::ZERO);
        assert_eq!(b.total, amt("60000") - amt("9809.8"));
    }

    #[test]
    fn deposit_withdraw_roundtrip() {
        let ex = exchange(MatchingAlgorithmType::Fifo);
        let user = UserId(9);

        ex.deposit(user, &usdt(), amt("123.45")).unwrap();
        ex.withdraw(user, &usdt(), amt("123.45")).unwrap();
        assert_eq!(ex.balance(user, &usdt()).total, Amount::ZERO);

        assert!(matches!(
            ex.withdraw(user, &usdt(), amt("1")),
            Err(ExchangeError::InsufficientBalance { .. })
        ));
        assert!(matches!(
            ex.deposit(user, &usdt(), Amount::ZERO),
            Err(ExchangeError::InvalidRequest(_))
        ));
    }

    #[test]
    fn conservation_holds_across_trading() {
        let ex = exchange(MatchingAlgorithmType::Fifo);
        ex.deposit(UserId(1), &btc(), amt("3")).unwrap();
        ex.deposit(UserId(2), &usdt(), amt("200000")).unwrap();
        ex.deposit(UserId(3), &usdt(), amt("100000")).unwrap();

        let btc_supply = ex.asset_supply(&btc());
        let usdt_supply = ex.asset_supply(&usdt());

        ex.submit_order(limit(1, Side::Sell, "1", "50000")).unwrap();
        ex.submit_order(limit(2, Side::Buy, "0.6", "50000")).unwrap();
        ex.submit_order(limit(3, Side::Buy, "0.7", "51000")).unwrap();
        ex.submit_order(limit(1, Side::Sell, "1", "50500")).unwrap();

        assert_eq!(ex.asset_supply(&btc()), btc_supply);
        assert_eq!(ex.asset_supply(&usdt()), usdt_supply);
    }

    #[test]
    fn events_are_published_per_step() {
        let ex = exchange(MatchingAlgorithmType::Fifo);
        ex.deposit(UserId(1), &btc(), amt("1")).unwrap();
        ex.deposit(UserId(2), &usdt(), amt("60000")).unwrap();

        let mut rx = ex.subscribe(&btc_usdt()).unwrap();

        ex.submit_order(limit(1, Side::Sell, "0.5", "50000")).unwrap();
        ex.submit_order(limit(2, Side::Buy, "0.5", "50000")).unwrap();

        // resting order: book update only
        assert!(matches!(rx.try_recv().unwrap(), MarketEvent::BookUpdate(_)));
        // matching step: trade first, then the book update
        match rx.try_recv().unwrap() {
            MarketEvent::Trade(trade) => {
                assert_eq!(trade.quantity, amt("0.5"));
                assert_eq!(trade.price, amt("50000"));
            },
            other => panic!("expected trade event, got {other:?}"),
        }
        assert!(matches!(rx.try_recv().unwrap(), MarketEvent::BookUpdate(_)));
    }

    #[test]
    fn pairs_do_not_interfere() {
        let ex = exchange(MatchingAlgorithmType::Fifo);
        let eth: TradingPair = "ETH/USDT".parse().unwrap();
        ex.deposit(UserId(1), &Asset::new("ETH"), amt("10")).unwrap();
        ex.deposit(UserId(2), &usdt(), amt("10000")).unwrap();

        let sell = OrderRequest {
            user_id: UserId(1),
            pair: eth.clone(),
            side: Side::Sell,
            order_type: OrderType::Limit,
            quantity: "2".parse().unwrap(),
            limit_price: Some("3000".parse().unwrap()),
            quote_budget: None,
        };
        ex.submit_order(sell).unwrap();

        let btc_snapshot = ex.book_snapshot(&btc_usdt(), None).unwrap();
        assert!(btc_snapshot.asks.is_empty());
        let eth_snapshot = ex.book_snapshot(&eth, None).unwrap();
        assert_eq!(eth_snapshot.asks.len(), 1);
    }

    #[test]
    fn fifo_time_priority_within_level() {
        let ex = exchange(MatchingAlgorithmType::Fifo);
        ex.deposit(UserId(1), &btc(), amt("1")).unwrap();
        ex.deposit(UserId(2), &btc(), amt("1")).unwrap();
        ex.deposit(UserId(3), &usdt(), amt("60000")).unwrap();

        let first = ex.submit_order(limit(1, Side::Sell, "1", "50000")).unwrap();
        let second = ex.submit_order(limit(2, Side::Sell, "1", "50000")).unwrap();

        // takes 1.0: the earlier order must fill completely before the
        // later one is touched
        ex.submit_order(limit(3, Side::Buy, "1", "50000")).unwrap();

        let first = ex.get_order(UserId(1), first.id).unwrap();
        let second = ex.get_order(UserId(2), second.id).unwrap();
        assert_eq!(first.status, OrderStatus::Filled);
        assert_eq!(second.status, OrderStatus::Open);
        assert_eq!(second.remaining_quantity(), Quantity::from_integer(1).unwrap());
    }

    #[test]
    fn snapshot_is_stable_between_operations() {
        let ex = exchange(MatchingAlgorithmType::Fifo);
        ex.deposit(UserId(1), &btc(), amt("1")).unwrap();
        ex.submit_order(limit(1, Side::Sell, "1", "50000")).unwrap();

        let a = ex.book_snapshot(&btc_usdt(), None).unwrap();
        let b = ex.book_snapshot(&btc_usdt(), None).unwrap();
        assert_eq!(a.asks[0].price, b.asks[0].price);
        assert_eq!(a.asks[0].quantity, b.asks[0].quantity);
        assert_eq!(a.asks[0].order_count, b.asks[0].order_count);
    }
}
