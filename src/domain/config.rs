// ============================================================================
// Exchange Configuration
// ============================================================================

use crate::domain::pair::TradingPair;
use crate::numeric::Amount;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

// ============================================================================
// Matching Algorithm Type
// ============================================================================

/// How an incoming order's quantity is allocated across resting orders at
/// a crossed price level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MatchingAlgorithmType {
    /// Price/time priority: within a level, consume strictly in arrival
    /// order. The default, and what most spot venues run.
    Fifo,
    /// Size-proportional allocation within a level; truncation residue is
    /// handed out in arrival order one minimum increment at a time.
    ProRata,
}

impl Default for MatchingAlgorithmType {
    fn default() -> Self {
        MatchingAlgorithmType::Fifo
    }
}

// ============================================================================
// Exchange Configuration
// ============================================================================

/// Static configuration for an exchange instance.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ExchangeConfig {
    /// Markets the engine accepts orders for; one worker is spawned per
    /// entry at startup.
    pub supported_pairs: Vec<TradingPair>,

    /// Flat fee rate applied to both maker and taker notional.
    pub fee_rate: Amount,

    /// Level allocation algorithm, shared by every pair.
    pub matching_algorithm: MatchingAlgorithmType,

    /// Number of price levels returned per side when a snapshot request
    /// does not specify a depth.
    pub snapshot_depth: usize,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            supported_pairs: vec![
                TradingPair::new("BTC", "USDT"),
                TradingPair::new("ETH", "USDT"),
            ],
            fee_rate: "0.001".parse().expect("valid default fee rate"),
            matching_algorithm: MatchingAlgorithmType::Fifo,
            snapshot_depth: 20,
        }
    }
}

impl ExchangeConfig {
    pub fn new(supported_pairs: Vec<TradingPair>) -> Self {
        Self {
            supported_pairs,
            ..Self::default()
        }
    }

    /// Builder method: set the fee rate.
    pub fn with_fee_rate(mut self, fee_rate: Amount) -> Self {
        self.fee_rate = fee_rate;
        self
    }

    /// Builder method: set the allocation algorithm.
    pub fn with_matching_algorithm(mut self, algorithm: MatchingAlgorithmType) -> Self {
        self.matching_algorithm = algorithm;
        self
    }

    /// Builder method: set the default snapshot depth.
    pub fn with_snapshot_depth(mut self, depth: usize) -> Self {
        self.snapshot_depth = depth;
        self
    }

    pub fn supports(&self, pair: &TradingPair) -> bool {
        self.supported_pairs.contains(pair)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.supported_pairs.is_empty() {
            return Err("at least one trading pair is required".to_string());
        }
        if self.fee_rate.is_negative() || self.fee_rate >= Amount::ONE {
            return Err("fee rate must be in [0, 1)".to_string());
        }
        if self.snapshot_depth == 0 {
            return Err("snapshot depth must be positive".to_string());
        }
        Ok(())
    }
}
