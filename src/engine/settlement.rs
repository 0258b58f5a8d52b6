// ============================================================================
// Settlement Coordinator
// Applies one fill atomically: balances, fees, order records, trade row
// ============================================================================

use crate::domain::order::{Order, Side};
use crate::domain::pair::UserId;
use crate::domain::trade::Trade;
use crate::error::{ExchangeError, ExchangeResult};
use crate::ledger::Ledger;
use crate::numeric::{Amount, Price, Quantity};
use crate::store::{OrderStore, TradeStore};
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of a committed fill: the trade row plus both updated order
/// records (already persisted to the order store).
#[derive(Debug)]
pub struct FillOutcome {
    pub trade: Trade,
    pub taker: Order,
    pub maker: Order,
}

/// Executes fills as all-or-nothing units.
///
/// Balance mutations run inside a [`Ledger`] transaction; order records
/// are updated on private clones and only written back after the ledger
/// commit, so a failed fill leaves no trace anywhere.
pub struct SettlementCoordinator {
    ledger: Arc<Ledger>,
    orders: Arc<OrderStore>,
    trades: Arc<TradeStore>,
    fee_rate: Amount,
}

impl SettlementCoordinator {
    pub fn new(
        ledger: Arc<Ledger>,
        orders: Arc<OrderStore>,
        trades: Arc<TradeStore>,
        fee_rate: Amount,
    ) -> Self {
        Self {
            ledger,
            orders,
            trades,
            fee_rate,
        }
    }

    pub fn fee_rate(&self) -> Amount {
        self.fee_rate
    }

    /// Execute a fill of `quantity` at `price` between the incoming
    /// `taker` and the resting `maker`.
    ///
    /// The buyer pays `notional + fee` in quote (drawn from the order's
    /// remaining lock first, then from available funds) and receives the
    /// base quantity; the seller's locked base is consumed and the quote
    /// proceeds net of fee are credited. Both fees go to the fee account,
    /// so per-asset supply is conserved.
    pub fn execute_fill(
        &self,
        taker: &Order,
        maker: &Order,
        quantity: Quantity,
        price: Price,
        sequence: u64,
    ) -> ExchangeResult<FillOutcome> {
        if !quantity.is_positive() {
            return Err(ExchangeError::Internal(
                "fill quantity must be positive".to_string(),
            ));
        }

        let pair = &taker.pair;
        let base = &pair.base;
        let quote = &pair.quote;

        let notional = quantity.checked_mul(price)?;
        let maker_fee = notional.checked_mul(self.fee_rate)?;
        let taker_fee = notional.checked_mul(self.fee_rate)?;

        let mut taker = taker.clone();
        let mut maker = maker.clone();

        let (buyer, seller, buyer_fee, seller_fee) = match taker.side {
            Side::Buy => (&mut taker, &mut maker, taker_fee, maker_fee),
            Side::Sell => (&mut maker, &mut taker, maker_fee, taker_fee),
        };

        // Quote cost of the fill for the buyer. The admission lock covers
        // the notional at the buyer's own limit (or budget); any gap,
        // typically the fee, is debited from available quote.
        let cost = notional.checked_add(buyer_fee)?;
        let buyer_lock_spent = buyer.remaining_lock.min(cost);
        let shortfall = cost - buyer_lock_spent;

        let buyer_id = buyer.user_id;
        let seller_id = seller.user_id;

        let mut txn = self.ledger.begin(&[
            (buyer_id, quote),
            (buyer_id, base),
            (seller_id, base),
            (seller_id, quote),
            (UserId::FEE_ACCOUNT, quote),
        ]);

        txn.settle_locked(buyer_id, quote, buyer_lock_spent)?;
        if shortfall.is_positive() {
            debug!(%buyer_id, %shortfall, "fill cost exceeds order lock, debiting available quote");
            txn.debit(buyer_id, quote, shortfall)?;
        }
        txn.credit(buyer_id, base, quantity)?;

        txn.settle_locked(seller_id, base, quantity)?;
        txn.credit(seller_id, quote, notional.checked_sub(seller_fee)?)?;

        txn.credit(
            UserId::FEE_ACCOUNT,
            quote,
            buyer_fee.checked_add(seller_fee)?,
        )?;

        // Order bookkeeping on the clones; surplus lock from fills at
        // better-than-limit prices is released when an order completes.
        let buyer_surplus = buyer.apply_fill(quantity, buyer_fee, buyer_lock_spent)?;
        if buyer_surplus.is_positive() {
            txn.unlock(buyer_id, quote, buyer_surplus)?;
        }
        let seller_surplus = seller.apply_fill(quantity, seller_fee, quantity)?;
        if seller_surplus.is_positive() {
            txn.unlock(seller_id, base, seller_surplus)?;
        }

        let trade = Trade::new(
            pair.clone(),
            maker.id,
            taker.id,
            maker.user_id,
            taker.user_id,
            price,
            quantity,
            maker_fee,
            taker_fee,
            sequence,
        );

        txn.commit();

        self.orders.update(taker.clone())?;
        self.orders.update(maker.clone())?;
        self.trades.append(trade.clone());

        debug!(
            trade_id = %trade.id,
            %pair,
            %price,
            %quantity,
            maker = %maker.id,
            taker = %taker.id,
            "fill settled"
        );

        Ok(FillOutcome {
            trade,
            taker,
            maker,
        })
    }

    /// Release an order's remaining lock outside a fill (rejection or
    /// residual market-order termination).
    pub fn release_lock(&self, order: &Order, amount: Amount) -> ExchangeResult<()> {
        if amount.is_positive() {
            if let Err(err) = self.ledger.unlock(order.user_id, order.lock_asset(), amount) {
                warn!(order_id = %order.id, %err, "failed to release order lock");
                return Err(err);
            }
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
