// ============================================================================
// Event Publisher
// Best-effort fan-out of trades and book updates to per-pair subscribers
// ============================================================================

use crate::book::BookSnapshot;
use crate::domain::pair::TradingPair;
use crate::domain::trade::Trade;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::trace;

/// Events delivered to market-data subscribers of a pair.
///
/// Delivery is at-most-once: a subscriber that falls behind the channel
/// capacity loses the oldest events and is expected to resync from a
/// book snapshot.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum MarketEvent {
    /// A settled fill, emitted in execution order.
    Trade(Trade),
    /// Depth update emitted once per committed matching step or
    /// cancellation.
    BookUpdate(BookSnapshot),
}

/// Per-pair broadcast hub.
pub struct Publisher {
    channels: DashMap<TradingPair, broadcast::Sender<MarketEvent>>,
    capacity: usize,
}

impl Publisher {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            capacity,
        }
    }

    fn channel(&self, pair: &TradingPair) -> broadcast::Sender<MarketEvent> {
        self.channels
            .entry(pair.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    /// Subscribe to one pair's event stream.
    pub fn subscribe(&self, pair: &TradingPair) -> broadcast::Receiver<MarketEvent> {
        self.channel(pair).subscribe()
    }

    /// Publish an event to the pair's subscribers. A send error only
    /// means nobody is listening right now.
    pub fn publish(&self, pair: &TradingPair, event: MarketEvent) {
        let receivers = self.channel(pair).send(event).unwrap_or(0);
        trace!(%pair, receivers, "published market event");
    }
}

impl Default for Publisher {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::Book;
    use crate::domain::order::OrderId;
    use crate::domain::pair::UserId;
    use crate::numeric::Amount;

    fn pair() -> TradingPair {
        "BTC/USDT".parse().unwrap()
    }

    fn trade(seq: u64) -> Trade {
        Trade::new(
            pair(),
            OrderId::new(),
            OrderId::new(),
            UserId(1),
            UserId(2),
            "100".parse().unwrap(),
            "1".parse().unwrap(),
            Amount::ZERO,
            Amount::ZERO,
            seq,
        )
    }

    #[test]
    fn test_subscriber_receives_in_order() {
        let publisher = Publisher::default();
        let mut rx = publisher.subscribe(&pair());

        publisher.publish(&pair(), MarketEvent::Trade(trade(1)));
        publisher.publish(&pair(), MarketEvent::Trade(trade(2)));
        publisher.publish(
            &pair(),
            MarketEvent::BookUpdate(Book::new(pair()).snapshot(5)),
        );

        match rx.try_recv().unwrap() {
            MarketEvent::Trade(t) => assert_eq!(t.sequence, 1),
            other => panic!("unexpected event: {other:?}"),
        }
        match rx.try_recv().unwrap() {
            MarketEvent::Trade(t) => assert_eq!(t.sequence, 2),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(matches!(
            rx.try_recv().unwrap(),
            MarketEvent::BookUpdate(_)
        ));
    }

    #[test]
    fn test_publish_without_subscribers_is_noop() {
        let publisher = Publisher::default();
        publisher.publish(&pair(), MarketEvent::Trade(trade(1)));
    }

    #[test]
    fn test_pairs_are_isolated() {
        let publisher = Publisher::default();
        let mut btc_rx = publisher.subscribe(&pair());
        let eth: TradingPair = "ETH/USDT".parse().unwrap();

        publisher.publish(&eth, MarketEvent::Trade(trade(1)));
        assert!(btc_rx.try_recv().is_err());
    }
}
