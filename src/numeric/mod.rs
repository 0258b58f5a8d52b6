// ============================================================================
// Numeric Module
// Exact fixed-point arithmetic for the trading hot path
// ============================================================================

mod errors;
mod fixed_decimal;

pub use errors::{NumericError, NumericResult};
pub use fixed_decimal::{Amount, FixedDecimal, Price, Quantity, SCALE_DIGITS};
