// ============================================================================
// Level Allocation Algorithms
// How an incoming order's quantity is split across a crossed price level
// ============================================================================

use crate::book::PriceLevel;
use crate::domain::config::MatchingAlgorithmType;
use crate::domain::order::OrderId;
use crate::domain::pair::UserId;
use crate::numeric::Quantity;
use smallvec::SmallVec;

/// One maker fill decided by an allocator. Execution (settlement, book
/// mutation) happens afterwards in allocation order.
#[derive(Debug, Clone)]
pub struct Allocation {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub quantity: Quantity,
}

pub type Allocations = SmallVec<[Allocation; 4]>;

/// Strategy interface for splitting a taker's quantity across the resting
/// orders of a single price level.
///
/// Implementations must be deterministic in `(taker_remaining, entry
/// remainders, arrival order)` and must never allocate more than an
/// entry's remaining quantity.
pub trait LevelAllocator: Send + Sync {
    fn allocate(&self, taker_remaining: Quantity, level: &PriceLevel) -> Allocations;

    /// Algorithm name for logging.
    fn name(&self) -> &str;
}

/// Build the allocator configured for the exchange.
pub fn allocator_for(algorithm: MatchingAlgorithmType) -> Box<dyn LevelAllocator> {
    match algorithm {
        MatchingAlgorithmType::Fifo => Box::new(FifoAllocator),
        MatchingAlgorithmType::ProRata => Box::new(ProRataAllocator),
    }
}

// ============================================================================
// FIFO (price-time priority)
// ============================================================================

/// Consume resting orders strictly in arrival order. An earlier order is
/// fully filled before a later one at the same price sees any quantity.
pub struct FifoAllocator;

impl LevelAllocator for FifoAllocator {
    fn allocate(&self, taker_remaining: Quantity, level: &PriceLevel) -> Allocations {
        let mut allocations = Allocations::new();
        let mut left = taker_remaining;

        for entry in level.iter() {
            if left.is_zero() {
                break;
            }
            let take = left.min(entry.remaining);
            allocations.push(Allocation {
                order_id: entry.order_id,
                user_id: entry.user_id,
                quantity: take,
            });
            left = left - take;
        }

        allocations
    }

    fn name(&self) -> &str {
        "FIFO"
    }
}

// ============================================================================
// Pro-Rata
// ============================================================================

/// Split the taker's quantity proportionally to each entry's remaining
/// size. Shares are truncated to the 8th fractional digit; the truncation
/// residue is handed out in arrival order, one minimum increment (10⁻⁸)
/// at a time, skipping entries already at capacity.
pub struct ProRataAllocator;

impl LevelAllocator for ProRataAllocator {
    fn allocate(&self, taker_remaining: Quantity, level: &PriceLevel) -> Allocations {
        let total = level.total_remaining();

        // Taker swallows the whole level: plain FIFO full fills.
        if taker_remaining >= total {
            return level
                .iter()
                .map(|entry| Allocation {
                    order_id: entry.order_id,
                    user_id: entry.user_id,
                    quantity: entry.remaining,
                })
                .collect();
        }

        let q = taker_remaining.raw_value() as i128;
        let l = total.raw_value() as i128;

        // floor(Q × r / L) per entry, in raw units
        let mut granted: Vec<i64> = Vec::with_capacity(level.order_count());
        let mut allocated: i128 = 0;
        for entry in level.iter() {
            let share = (q * entry.remaining.raw_value() as i128) / l;
            granted.push(share as i64);
            allocated += share;
        }

        // Distribute the truncation residue FIFO, one increment at a time.
        // Σ remaining = L > Q, so capacity always exists and this
        // terminates.
        let mut residue = (q - allocated) as i64;
        while residue > 0 {
            for (slot, entry) in granted.iter_mut().zip(level.iter()) {
                if residue == 0 {
                    break;
                }
                if *slot < entry.remaining.raw_value() {
                    *slot += 1;
                    residue -= 1;
                }
            }
        }

        granted
            .into_iter()
            .zip(level.iter())
            .filter(|(share, _)| *share > 0)
            .map(|(share, entry)| Allocation {
                order_id: entry.order_id,
                user_id: entry.user_id,
                quantity: Quantity::from_raw(share),
            })
            .collect()
    }

    fn name(&self) -> &str {
        "PRO_RATA"
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::{BookEntry, BookSide};
    use crate::domain::order::Side;
    use crate::numeric::Price;

    fn qty(s: &str) -> Quantity {
        s.parse().unwrap()
    }

    fn level_of(remainders: &[&str]) -> BookSide {
        let mut side = BookSide::new(Side::Sell);
        for (i, r) in remainders.iter().enumerate() {
            side.insert(
                Price::from_integer(50_000).unwrap(),
                BookEntry {
                    order_id: OrderId::new(),
                    user_id: UserId(i as u64 + 1),
                    remaining: qty(r),
                    sequence: i as u64 + 1,
                },
            );
        }
        side
    }

    #[test]
    fn test_fifo_respects_arrival_order() {
        let side = level_of(&["1", "2", "3"]);
        let level = side.best_level().unwrap();

        let allocations = FifoAllocator.allocate(qty("2.5"), level);
        let quantities: Vec<Quantity> = allocations.iter().map(|a| a.quantity).collect();
        assert_eq!(quantities, vec![qty("1"), qty("1.5")]);
        // third entry untouched before the second is exhausted
        assert_eq!(allocations.len(), 2);
    }

    #[test]
    fn test_fifo_consumes_whole_level() {
        let side = level_of(&["1", "2"]);
        let level = side.best_level().unwrap();
        let allocations = FifoAllocator.allocate(qty("5"), level);
        let total: Quantity = allocations
            .iter()
            .fold(Quantity::ZERO, |acc, a| acc + a.quantity);
        assert_eq!(total, qty("3"));
    }

    #[test]
    fn test_pro_rata_exact_proportions() {
        // 0.5 / 1.0 / 0.5 resting, incoming 1.0: shares divide evenly
        let side = level_of(&["0.5", "1.0", "0.5"]);
        let level = side.best_level().unwrap();

        let allocations = ProRataAllocator.allocate(qty("1"), level);
        let quantities: Vec<Quantity> = allocations.iter().map(|a| a.quantity).collect();
        assert_eq!(quantities, vec![qty("0.25"), qty("0.5"), qty("0.25")]);
    }

    #[test]
    fn test_pro_rata_residue_goes_to_earliest() {
        // L = 3, Q = 1: each share is 1/3 truncated, leaving one raw
        // unit of residue for the earliest entry.
        let side = level_of(&["1", "1", "1"]);
        let level = side.best_level().unwrap();

        let allocations = ProRataAllocator.allocate(qty("1"), level);
        let total: i64 = allocations.iter().map(|a| a.quantity.raw_value()).sum();
        assert_eq!(total, qty("1").raw_value());
        assert_eq!(allocations[0].quantity.raw_value(), 33_333_334);
        assert_eq!(allocations[1].quantity.raw_value(), 33_333_333);
        assert_eq!(allocations[2].quantity.raw_value(), 33_333_333);
    }

    #[test]
    fn test_pro_rata_never_overfills() {
        let side = level_of(&["0.00000002", "5"]);
        let level = side.best_level().unwrap();

        let allocations = ProRataAllocator.allocate(qty("4"), level);
        for (allocation, entry) in allocations.iter().zip(level.iter()) {
            assert!(allocation.quantity <= entry.remaining);
        }
        let total: Quantity = allocations
            .iter()
            .fold(Quantity::ZERO, |acc, a| acc + a.quantity);
        assert_eq!(total, qty("4"));
    }

    #[test]
    fn test_pro_rata_full_sweep_fills_everyone() {
        let side = level_of(&["1", "2"]);
        let level = side.best_level().unwrap();
        let allocations = ProRataAllocator.allocate(qty("3"), level);
        assert_eq!(allocations.len(), 2);
        assert_eq!(allocations[0].quantity, qty("1"));
        assert_eq!(allocations[1].quantity, qty("2"));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use crate::book::{BookEntry, BookSide};
    use crate::domain::order::Side;
    use crate::numeric::Price;
    use proptest::prelude::*;

    proptest! {
        // Σ shares = min(Q, L), no entry over-filled, determinism
        #[test]
        fn pro_rata_allocation_is_exact(
            remainders in proptest::collection::vec(1i64..1_000_000_000, 1..12),
            q_raw in 1i64..2_000_000_000,
        ) {
            let mut side = BookSide::new(Side::Sell);
            for (i, raw) in remainders.iter().enumerate() {
                side.insert(Price::from_integer(100).unwrap(), BookEntry {
                    order_id: OrderId::new(),
                    user_id: UserId(i as u64),
                    remaining: Quantity::from_raw(*raw),
                    sequence: i as u64,
                });
            }
            let level = side.best_level().unwrap();
            let q = Quantity::from_raw(q_raw);
            let l = level.total_remaining();

            let first = ProRataAllocator.allocate(q, level);
            let second = ProRataAllocator.allocate(q, level);

            let total: i64 = first.iter().map(|a| a.quantity.raw_value()).sum();
            prop_assert_eq!(total, q.min(l).raw_value());

            for allocation in &first {
                let entry = level.iter().find(|e| e.order_id == allocation.order_id).unwrap();
                prop_assert!(allocation.quantity <= entry.remaining);
                prop_assert!(allocation.quantity.is_positive());
            }

            let a: Vec<i64> = first.iter().map(|x| x.quantity.raw_value()).collect();
            let b: Vec<i64> = second.iter().map(|x| x.quantity.raw_value()).collect();
            prop_assert_eq!(a, b);
        }
    }
}
