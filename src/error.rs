// ============================================================================
// Exchange Errors
// ============================================================================

use crate::domain::pair::Asset;
use crate::numeric::{Amount, NumericError};
use thiserror::Error;

/// Errors surfaced to callers of the exchange.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum ExchangeError {
    /// Malformed input: unsupported pair, bad side/type combination,
    /// non-positive quantity, missing limit price or quote budget.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A ledger lock, debit, or settle could not be covered.
    #[error("insufficient {asset} balance: required {required}, available {available}")]
    InsufficientBalance {
        asset: Asset,
        required: Amount,
        available: Amount,
    },

    /// Unknown order id (or an order belonging to another user).
    #[error("order not found")]
    NotFound,

    /// The order is already in a terminal state.
    #[error("order cannot be cancelled")]
    NotCancellable,

    /// Market order submitted against an empty opposite side.
    #[error("no liquidity on the opposite side")]
    NoLiquidity,

    /// Decimal arithmetic left the representable range.
    #[error("arithmetic overflow in decimal computation")]
    ArithmeticOverflow,

    /// Transient conflict in the durable store; the caller may retry.
    #[error("transient storage conflict, retry")]
    Conflict,

    /// The pair's worker has stopped (shutdown or poisoned by an
    /// internal error); other pairs keep running.
    #[error("engine stopped for this trading pair")]
    EngineStopped,

    /// Invariant violation. The affected pair's worker halts and refuses
    /// further operations.
    #[error("internal invariant violation: {0}")]
    Internal(String),
}

impl From<NumericError> for ExchangeError {
    fn from(_: NumericError) -> Self {
        ExchangeError::ArithmeticOverflow
    }
}

/// Result type alias used across the crate.
pub type ExchangeResult<T> = Result<T, ExchangeError>;
