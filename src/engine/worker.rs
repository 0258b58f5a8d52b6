// ============================================================================
// Pair Worker
// One owning thread per trading pair; the linearization point for all
// admissions, cancellations, and snapshots on that pair
// ============================================================================

use crate::book::{Book, BookEntry, BookSnapshot};
use crate::domain::order::{Order, OrderId, OrderType, Side};
use crate::domain::pair::{TradingPair, UserId};
use crate::domain::trade::Trade;
use crate::engine::allocation::LevelAllocator;
use crate::engine::settlement::SettlementCoordinator;
use crate::error::{ExchangeError, ExchangeResult};
use crate::events::{MarketEvent, Publisher};
use crate::numeric::{Amount, Quantity};
use crate::store::OrderStore;
use crossbeam::channel::{Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{error, info, warn};

/// Operations accepted by a pair worker. Processed strictly in arrival
/// order, which makes the per-pair operation stream the observable
/// linearization for clients.
pub enum EngineOp {
    Admit {
        order_id: OrderId,
        reply: Sender<ExchangeResult<Order>>,
    },
    Cancel {
        order_id: OrderId,
        user_id: UserId,
        reply: Sender<ExchangeResult<Order>>,
    },
    Snapshot {
        depth: usize,
        reply: Sender<ExchangeResult<BookSnapshot>>,
    },
}

pub struct PairWorker {
    pair: TradingPair,
    book: Book,
    orders: Arc<OrderStore>,
    settlement: Arc<SettlementCoordinator>,
    publisher: Arc<Publisher>,
    allocator: Box<dyn LevelAllocator>,
    book_event_depth: usize,
    /// Monotonic per-pair counter; stamps order time priority and trade
    /// execution order.
    sequence: u64,
    /// Set when an invariant violation halts this pair. All further
    /// operations are refused; other pairs keep running.
    poisoned: Option<String>,
}

impl PairWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn spawn(
        pair: TradingPair,
        orders: Arc<OrderStore>,
        settlement: Arc<SettlementCoordinator>,
        publisher: Arc<Publisher>,
        allocator: Box<dyn LevelAllocator>,
        book_event_depth: usize,
        ops: Receiver<EngineOp>,
    ) -> JoinHandle<()> {
        let worker = PairWorker {
            book: Book::new(pair.clone()),
            pair: pair.clone(),
            orders,
            settlement,
            publisher,
            allocator,
            book_event_depth,
            sequence: 0,
            poisoned: None,
        };

        std::thread::Builder::new()
            .name(format!("engine-{pair}"))
            .spawn(move || worker.run(ops))
            .expect("failed to spawn pair worker thread")
    }

    fn run(mut self, ops: Receiver<EngineOp>) {
        info!(pair = %self.pair, algorithm = self.allocator.name(), "pair worker started");

        while let Ok(op) = ops.recv() {
            match op {
                EngineOp::Admit { order_id, reply } => {
                    let result = self.guarded(|w| w.handle_admit(order_id));
                    let _ = reply.send(result);
                },
                EngineOp::Cancel {
                    order_id,
                    user_id,
                    reply,
                } => {
                    let result = self.guarded(|w| w.handle_cancel(order_id, user_id));
                    let _ = reply.send(result);
                },
                EngineOp::Snapshot { depth, reply } => {
                    let result = self.guarded(|w| Ok(w.book.snapshot(depth)));
                    let _ = reply.send(result);
                },
            }
        }

        info!(pair = %self.pair, "pair worker stopped");
    }

    /// Run an operation unless the worker is poisoned; poison it when the
    /// operation dies with an internal invariant violation.
    fn guarded<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> ExchangeResult<T>,
    ) -> ExchangeResult<T> {
        if let Some(reason) = &self.poisoned {
            return Err(ExchangeError::Internal(format!(
                "pair {} halted: {reason}",
                self.pair
            )));
        }
        let result = f(self);
        if let Err(ExchangeError::Internal(reason)) = &result {
            error!(pair = %self.pair, %reason, "internal error, halting pair worker");
            self.poisoned = Some(reason.clone());
        }
        result
    }

    // ========================================================================
    // Admission
    // ========================================================================

    fn handle_admit(&mut self, order_id: OrderId) -> ExchangeResult<Order> {
        let mut order = self.orders.get(order_id).ok_or_else(|| {
            ExchangeError::Internal(format!("admitted order {order_id} missing from store"))
        })?;

        self.sequence += 1;
        order.sequence = self.sequence;

        let mut trades = Vec::new();
        let step = match order.order_type {
            OrderType::Market => self.match_market(&mut order, &mut trades),
            OrderType::Limit => self.match_limit(&mut order, &mut trades),
        };

        if let Err(err) = step {
            return self.abort_step(order, err, &trades);
        }

        self.orders.update(order.clone())?;
        debug_assert!(!self.book.is_crossed());

        self.publish_step(&trades, true);
        Ok(order)
    }

    /// A matching step died mid-walk. Fills committed so far stand (each
    /// was atomic) and their events still go out; the residual is never
    /// rested, and its lock is released. No progress means the order is
    /// rejected outright.
    fn abort_step(
        &mut self,
        mut order: Order,
        err: ExchangeError,
        trades: &[Trade],
    ) -> ExchangeResult<Order> {
        if matches!(err, ExchangeError::Internal(_)) {
            return Err(err);
        }

        warn!(
            pair = %self.pair,
            order_id = %order.id,
            %err,
            "matching step aborted"
        );

        let released = if order.filled_quantity.is_zero() {
            order.reject()
        } else {
            order.cancel()?
        };
        self.settlement.release_lock(&order, released)?;
        self.orders.update(order.clone())?;
        self.publish_step(trades, !trades.is_empty());

        if order.filled_quantity.is_zero() {
            Err(err)
        } else {
            // partial progress is real, committed state; hand the caller
            // the final record instead of discarding it behind an error
            Ok(order)
        }
    }

    // ========================================================================
    // Matching walks
    // ========================================================================

    fn match_limit(&mut self, order: &mut Order, trades: &mut Vec<Trade>) -> ExchangeResult<()> {
        let limit = order.limit_price.ok_or_else(|| {
            ExchangeError::Internal(format!("limit order {} without price", order.id))
        })?;

        let opposite = order.side.opposite();

        while order.remaining_quantity().is_positive() {
            let Some(best) = self.book.side(opposite).best_price() else {
                break;
            };
            let crossable = match order.side {
                Side::Buy => limit >= best,
                Side::Sell => limit <= best,
            };
            if !crossable {
                break;
            }

            self.consume_level(order, order.remaining_quantity(), trades)?;
        }

        if order.remaining_quantity().is_positive() {
            order.mark_resting();
            self.book.side_mut(order.side).insert(
                limit,
                BookEntry {
                    order_id: order.id,
                    user_id: order.user_id,
                    remaining: order.remaining_quantity(),
                    sequence: order.sequence,
                },
            );
        }

        Ok(())
    }

    fn match_market(&mut self, order: &mut Order, trades: &mut Vec<Trade>) -> ExchangeResult<()> {
        let opposite = order.side.opposite();
        if self.book.side(opposite).is_empty() {
            return Err(ExchangeError::NoLiquidity);
        }

        while order.remaining_quantity().is_positive() {
            let Some(best) = self.book.side(opposite).best_price() else {
                break;
            };

            // A market buy spends its locked quote budget; clamp the
            // quantity to what the budget still affords at this level.
            let effective = if order.side == Side::Buy {
                let afford = self.affordable_quantity(order.remaining_lock, best)?;
                order.remaining_quantity().min(afford)
            } else {
                order.remaining_quantity()
            };
            if effective.is_zero() {
                break;
            }

            self.consume_level(order, effective, trades)?;
        }

        // Market orders never rest. A residual after the walk means the
        // book or the budget ran dry: release the leftover lock and leave
        // the order partially filled (terminal for matching purposes,
        // since market orders are not cancellable).
        if order.remaining_quantity().is_positive() {
            if order.filled_quantity.is_zero() {
                return Err(ExchangeError::NoLiquidity);
            }
            let leftover = order.remaining_lock;
            order.remaining_lock = Amount::ZERO;
            self.settlement.release_lock(order, leftover)?;
        }

        Ok(())
    }

    /// Max base quantity purchasable with `budget` at `price`, fee
    /// included, truncated to scale 8.
    fn affordable_quantity(
        &self,
        budget: Amount,
        price: Amount,
    ) -> ExchangeResult<Quantity> {
        let gross_price =
            price.checked_mul(Amount::ONE.checked_add(self.settlement.fee_rate())?)?;
        Ok(budget.checked_div(gross_price)?)
    }

    /// Allocate `quantity` against the best opposite level and settle each
    /// resulting fill in allocation order.
    fn consume_level(
        &mut self,
        order: &mut Order,
        quantity: Quantity,
        trades: &mut Vec<Trade>,
    ) -> ExchangeResult<()> {
        let opposite = order.side.opposite();

        let (price, allocations) = {
            let level = self.book.side(opposite).best_level().ok_or_else(|| {
                ExchangeError::Internal("consume_level on empty book side".to_string())
            })?;
            (level.price, self.allocator.allocate(quantity, level))
        };

        if allocations.is_empty() {
            return Err(ExchangeError::Internal(
                "allocator returned no fills for a non-empty level".to_string(),
            ));
        }

        for allocation in allocations {
            let maker = self.orders.get(allocation.order_id).ok_or_else(|| {
                ExchangeError::Internal(format!(
                    "resting order {} missing from store",
                    allocation.order_id
                ))
            })?;

            self.sequence += 1;
            let outcome = self.settlement.execute_fill(
                order,
                &maker,
                allocation.quantity,
                price,
                self.sequence,
            )?;

            *order = outcome.taker;
            if !self
                .book
                .side_mut(opposite)
                .reduce(price, allocation.order_id, allocation.quantity)
            {
                return Err(ExchangeError::Internal(format!(
                    "book entry {} out of sync at price {price}",
                    allocation.order_id
                )));
            }
            trades.push(outcome.trade);
        }

        Ok(())
    }

    // ========================================================================
    // Cancellation
    // ========================================================================

    fn handle_cancel(&mut self, order_id: OrderId, user_id: UserId) -> ExchangeResult<Order> {
        let mut order = self.orders.get_for_user(user_id, order_id)?;

        // Market orders never rest, so there is nothing to cancel.
        if order.is_market() || !order.status.can_cancel() {
            return Err(ExchangeError::NotCancellable);
        }

        let price = order.limit_price.ok_or_else(|| {
            ExchangeError::Internal(format!("resting order {} without price", order.id))
        })?;
        if self
            .book
            .side_mut(order.side)
            .remove(price, order.id)
            .is_none()
        {
            return Err(ExchangeError::Internal(format!(
                "cancellable order {} missing from book",
                order.id
            )));
        }

        let released = order.cancel()?;
        self.settlement.release_lock(&order, released)?;
        self.orders.update(order.clone())?;

        info!(pair = %self.pair, order_id = %order.id, "order cancelled");
        self.publish_step(&[], true);
        Ok(order)
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// Emit per-trade events in execution order, then one book update.
    /// Only called after the step's state changes have committed.
    fn publish_step(&self, trades: &[Trade], book_changed: bool) {
        for trade in trades {
            self.publisher
                .publish(&self.pair, MarketEvent::Trade(trade.clone()));
        }
        if book_changed {
            self.publisher.publish(
                &self.pair,
                MarketEvent::BookUpdate(self.book.snapshot(self.book_event_depth)),
            );
        }
    }
}

// ============================================================================
// Tests (worker internals; end-to-end flows live in the exchange tests)
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::OrderStatus;

    #[test]
    fn test_market_orders_are_not_cancellable_status() {
        // The cancel handler refuses market orders before any book
        // lookup; statuses confirm the decision table.
        assert!(OrderStatus::Open.can_cancel());
        assert!(OrderStatus::PartiallyFilled.can_cancel());
        assert!(!OrderStatus::Filled.can_cancel());
        assert!(!OrderStatus::Rejected.can_cancel());
        assert!(!OrderStatus::Pending.can_cancel());
    }
}
