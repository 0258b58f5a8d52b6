// ============================================================================
// Price-Level Book
// Per-pair resting orders, sorted by price with FIFO queues per level
// ============================================================================

use crate::domain::order::{OrderId, Side};
use crate::domain::pair::{TradingPair, UserId};
use crate::numeric::{Price, Quantity};
use std::collections::{BTreeMap, VecDeque};

// ============================================================================
// Book Entry
// ============================================================================

/// Compact representation of a resting order. The order store holds the
/// authoritative record; the book tracks only what matching needs.
#[derive(Debug, Clone)]
pub struct BookEntry {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub remaining: Quantity,
    /// Arrival sequence; lower means earlier, the FIFO key.
    pub sequence: u64,
}

// ============================================================================
// Price Level
// ============================================================================

/// Resting orders at a single price on one side, in arrival order.
#[derive(Debug)]
pub struct PriceLevel {
    pub price: Price,
    entries: VecDeque<BookEntry>,
    total_remaining: Quantity,
}

impl PriceLevel {
    fn new(price: Price) -> Self {
        Self {
            price,
            entries: VecDeque::new(),
            total_remaining: Quantity::ZERO,
        }
    }

    fn push_back(&mut self, entry: BookEntry) {
        self.total_remaining = self.total_remaining + entry.remaining;
        self.entries.push_back(entry);
    }

    pub fn total_remaining(&self) -> Quantity {
        self.total_remaining
    }

    pub fn order_count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in arrival order.
    pub fn iter(&self) -> impl Iterator<Item = &BookEntry> {
        self.entries.iter()
    }

    /// Reduce an entry's remaining quantity, removing it when exhausted.
    /// Returns false if the order is not at this level or the reduction
    /// exceeds its remaining quantity.
    fn reduce(&mut self, order_id: OrderId, quantity: Quantity) -> bool {
        let Some(pos) = self.entries.iter().position(|e| e.order_id == order_id) else {
            return false;
        };
        if self.entries[pos].remaining < quantity {
            return false;
        }
        self.entries[pos].remaining = self.entries[pos].remaining - quantity;
        self.total_remaining = self.total_remaining - quantity;
        if self.entries[pos].remaining.is_zero() {
            self.entries.remove(pos);
        }
        true
    }

    fn remove(&mut self, order_id: OrderId) -> Option<BookEntry> {
        let pos = self.entries.iter().position(|e| e.order_id == order_id)?;
        let entry = self.entries.remove(pos)?;
        self.total_remaining = self.total_remaining - entry.remaining;
        Some(entry)
    }
}

// ============================================================================
// Book Side
// ============================================================================

/// One side of a pair's book. Levels are keyed by the raw price so the
/// BTreeMap keeps them sorted; bids walk the map in reverse.
#[derive(Debug)]
pub struct BookSide {
    side: Side,
    levels: BTreeMap<i64, PriceLevel>,
}

impl BookSide {
    pub fn new(side: Side) -> Self {
        Self {
            side,
            levels: BTreeMap::new(),
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Insert a resting order at the tail of its price level.
    pub fn insert(&mut self, price: Price, entry: BookEntry) {
        self.levels
            .entry(price.raw_value())
            .or_insert_with(|| PriceLevel::new(price))
            .push_back(entry);
    }

    /// Best price on this side: highest bid or lowest ask.
    pub fn best_price(&self) -> Option<Price> {
        match self.side {
            Side::Buy => self.levels.values().next_back().map(|l| l.price),
            Side::Sell => self.levels.values().next().map(|l| l.price),
        }
    }

    pub fn best_level(&self) -> Option<&PriceLevel> {
        match self.side {
            Side::Buy => self.levels.values().next_back(),
            Side::Sell => self.levels.values().next(),
        }
    }

    /// Consume `quantity` from an order at `price`, dropping the level if
    /// it empties out.
    pub fn reduce(&mut self, price: Price, order_id: OrderId, quantity: Quantity) -> bool {
        let key = price.raw_value();
        let Some(level) = self.levels.get_mut(&key) else {
            return false;
        };
        let reduced = level.reduce(order_id, quantity);
        if level.is_empty() {
            self.levels.remove(&key);
        }
        reduced
    }

    /// Remove an order from the book entirely (cancellation).
    pub fn remove(&mut self, price: Price, order_id: OrderId) -> Option<BookEntry> {
        let key = price.raw_value();
        let level = self.levels.get_mut(&key)?;
        let entry = level.remove(order_id);
        if level.is_empty() {
            self.levels.remove(&key);
        }
        entry
    }

    /// Top `depth` levels, best first.
    pub fn depth(&self, depth: usize) -> Vec<LevelView> {
        let iter: Box<dyn Iterator<Item = &PriceLevel>> = match self.side {
            Side::Buy => Box::new(self.levels.values().rev()),
            Side::Sell => Box::new(self.levels.values()),
        };
        iter.take(depth)
            .map(|level| LevelView {
                price: level.price,
                quantity: level.total_remaining(),
                order_count: level.order_count(),
            })
            .collect()
    }
}

// ============================================================================
// Book
// ============================================================================

/// The full two-sided book for one pair. Owned exclusively by the pair's
/// worker; no interior locking.
#[derive(Debug)]
pub struct Book {
    pub pair: TradingPair,
    bids: BookSide,
    asks: BookSide,
}

impl Book {
    pub fn new(pair: TradingPair) -> Self {
        Self {
            pair,
            bids: BookSide::new(Side::Buy),
            asks: BookSide::new(Side::Sell),
        }
    }

    pub fn side(&self, side: Side) -> &BookSide {
        match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        }
    }

    pub fn side_mut(&mut self, side: Side) -> &mut BookSide {
        match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        }
    }

    /// True when the best bid meets or exceeds the best ask. Must be
    /// false after every completed matching step.
    pub fn is_crossed(&self) -> bool {
        match (self.bids.best_price(), self.asks.best_price()) {
            (Some(bid), Some(ask)) => bid >= ask,
            _ => false,
        }
    }

    pub fn snapshot(&self, depth: usize) -> BookSnapshot {
        BookSnapshot {
            pair: self.pair.clone(),
            bids: self.bids.depth(depth),
            asks: self.asks.depth(depth),
        }
    }
}

// ============================================================================
// Snapshot Views
// ============================================================================

/// Aggregated view of one price level.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LevelView {
    pub price: Price,
    pub quantity: Quantity,
    pub order_count: usize,
}

/// Point-in-time depth view of a pair's book, best levels first.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BookSnapshot {
    pub pair: TradingPair,
    pub bids: Vec<LevelView>,
    pub asks: Vec<LevelView>,
}

impl BookSnapshot {
    pub fn best_bid(&self) -> Option<Price> {
        self.bids.first().map(|l| l.price)
    }

    pub fn best_ask(&self) -> Option<Price> {
        self.asks.first().map(|l| l.price)
    }

    pub fn spread(&self) -> Option<Price> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => ask.checked_sub(bid).ok(),
            _ => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
