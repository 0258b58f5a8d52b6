// ============================================================================
// Fixed-Point Decimal
// Exact base-10 monetary arithmetic at scale 8
// ============================================================================

use super::errors::{NumericError, NumericResult};
use std::fmt;
use std::ops::{Add, Sub};

/// Fixed-point decimal with 8 fractional digits.
///
/// Internally stores `value × 10^8` as an i64, which covers values up to
/// ±92 billion at full 10⁻⁸ precision. All prices, quantities, balances,
/// and fees in the engine use this representation; nothing on the hot
/// path touches floating point.
///
/// Multiplication and division truncate toward zero to scale 8. The
/// truncation direction matters: pro-rata allocation relies on
/// `trunc(a × b / c)` never exceeding the exact quotient.
///
/// # Example
/// ```
/// use exchange_core::numeric::FixedDecimal;
///
/// let price: FixedDecimal = "50000".parse().unwrap();
/// let qty: FixedDecimal = "0.5".parse().unwrap();
/// let notional = price.checked_mul(qty).unwrap();
/// assert_eq!(notional.to_string(), "25000.00000000");
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct FixedDecimal(i64);

/// Number of fractional digits carried by every value.
pub const SCALE_DIGITS: u32 = 8;

impl FixedDecimal {
    /// The scale factor (10^8)
    pub const SCALE: i64 = 100_000_000;

    /// Zero value
    pub const ZERO: Self = Self(0);

    /// One (1.0)
    pub const ONE: Self = Self(Self::SCALE);

    /// Maximum representable value
    pub const MAX: Self = Self(i64::MAX);

    // ========================================================================
    // Construction
    // ========================================================================

    /// Create from the raw scaled representation (`value × 10^8`).
    #[inline]
    pub const fn from_raw(raw: i64) -> Self {
        Self(raw)
    }

    /// Create from an integer value.
    #[inline]
    pub fn from_integer(value: i64) -> NumericResult<Self> {
        match value.checked_mul(Self::SCALE) {
            Some(raw) => Ok(Self(raw)),
            None => Err(NumericError::Overflow),
        }
    }

    /// Create from an integer part and an already-scaled fractional part.
    /// `from_parts(123, 45_600_000)` is `123.456`; the fraction always
    /// points away from zero.
    #[inline]
    pub fn from_parts(integer: i64, fraction: u64) -> NumericResult<Self> {
        if fraction >= Self::SCALE as u64 {
            return Err(NumericError::InvalidInput);
        }
        let whole = Self::from_integer(integer)?;
        let frac = if integer < 0 {
            -(fraction as i64)
        } else {
            fraction as i64
        };
        whole.checked_add(Self(frac))
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Raw scaled value (`self × 10^8`).
    #[inline]
    pub const fn raw_value(self) -> i64 {
        self.0
    }

    /// Integer part, truncated toward zero.
    #[inline]
    pub const fn integer_part(self) -> i64 {
        self.0 / Self::SCALE
    }

    /// Fractional part as a positive scaled value.
    #[inline]
    pub const fn fractional_part(self) -> u64 {
        self.0.unsigned_abs() % (Self::SCALE as u64)
    }

    #[inline]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    // ========================================================================
    // Arithmetic
    // ========================================================================

    /// Checked addition.
    #[inline]
    pub fn checked_add(self, rhs: Self) -> NumericResult<Self> {
        match self.0.checked_add(rhs.0) {
            Some(raw) => Ok(Self(raw)),
            None if rhs.0 > 0 => Err(NumericError::Overflow),
            None => Err(NumericError::Underflow),
        }
    }

    /// Checked subtraction.
    #[inline]
    pub fn checked_sub(self, rhs: Self) -> NumericResult<Self> {
        match self.0.checked_sub(rhs.0) {
            Some(raw) => Ok(Self(raw)),
            None if rhs.0 < 0 => Err(NumericError::Overflow),
            None => Err(NumericError::Underflow),
        }
    }

    /// Checked multiplication, truncated toward zero to scale 8.
    ///
    /// Uses an i128 intermediate so the product cannot overflow before
    /// rescaling.
    #[inline]
    pub fn checked_mul(self, rhs: Self) -> NumericResult<Self> {
        let product = (self.0 as i128) * (rhs.0 as i128);
        // i128 division truncates toward zero, which is exactly the
        // rounding the monetary model requires.
        let rescaled = product / (Self::SCALE as i128);
        if rescaled > i64::MAX as i128 {
            Err(NumericError::Overflow)
        } else if rescaled < i64::MIN as i128 {
            Err(NumericError::Underflow)
        } else {
            Ok(Self(rescaled as i64))
        }
    }

    /// Checked division, truncated toward zero to scale 8.
    #[inline]
    pub fn checked_div(self, rhs: Self) -> NumericResult<Self> {
        if rhs.0 == 0 {
            return Err(NumericError::DivisionByZero);
        }
        let numerator = (self.0 as i128) * (Self::SCALE as i128);
        let quotient = numerator / (rhs.0 as i128);
        if quotient > i64::MAX as i128 {
            Err(NumericError::Overflow)
        } else if quotient < i64::MIN as i128 {
            Err(NumericError::Underflow)
        } else {
            Ok(Self(quotient as i64))
        }
    }

    /// Absolute value.
    #[inline]
    pub fn abs(self) -> NumericResult<Self> {
        self.0
            .checked_abs()
            .map(Self)
            .ok_or(NumericError::Overflow)
    }

    // ========================================================================
    // Comparison helpers
    // ========================================================================

    #[inline]
    pub fn min(self, other: Self) -> Self {
        Self(self.0.min(other.0))
    }

    #[inline]
    pub fn max(self, other: Self) -> Self {
        Self(self.0.max(other.0))
    }
}

// Infallible Add/Sub for test ergonomics; engine code uses checked_* and `?`.
impl Add for FixedDecimal {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self::Output {
        self.checked_add(rhs).expect("fixed-point add out of range")
    }
}

impl Sub for FixedDecimal {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self::Output {
        self.checked_sub(rhs).expect("fixed-point sub out of range")
    }
}

// ============================================================================
// Display and Debug
// ============================================================================

impl fmt::Debug for FixedDecimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FixedDecimal({self})")
    }
}

impl fmt::Display for FixedDecimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Sign-magnitude keeps `-0.x` values printing their sign, which
        // signed integer division would silently drop.
        let sign = if self.0 < 0 { "-" } else { "" };
        let magnitude = self.0.unsigned_abs();
        let scale = Self::SCALE as u64;
        write!(f, "{sign}{}.{:08}", magnitude / scale, magnitude % scale)
    }
}

// ============================================================================
// Boundary conversions
// ============================================================================

impl FixedDecimal {
    /// Convert from `rust_decimal::Decimal` at the API boundary.
    ///
    /// Works on the decimal's mantissa directly: rescale it to 8
    /// fractional digits, refusing to discard non-zero digits.
    ///
    /// # Errors
    /// `PrecisionLoss` if the input has more than 8 significant fractional
    /// digits, `Overflow` if the value does not fit.
    pub fn from_decimal(value: rust_decimal::Decimal) -> NumericResult<Self> {
        let mantissa = value.mantissa();
        let scale = value.scale();

        let rescaled = if scale <= SCALE_DIGITS {
            let factor = 10i128.pow(SCALE_DIGITS - scale);
            mantissa.checked_mul(factor).ok_or(NumericError::Overflow)?
        } else {
            let factor = 10i128.pow(scale - SCALE_DIGITS);
            if mantissa % factor != 0 {
                return Err(NumericError::PrecisionLoss);
            }
            mantissa / factor
        };

        i64::try_from(rescaled)
            .map(Self)
            .map_err(|_| NumericError::Overflow)
    }

    /// Convert to `rust_decimal::Decimal` for display or API output.
    pub fn to_decimal(self) -> rust_decimal::Decimal {
        rust_decimal::Decimal::from_i128_with_scale(self.0 as i128, SCALE_DIGITS)
    }
}

impl std::str::FromStr for FixedDecimal {
    type Err = NumericError;

    /// Parse from a decimal string; the only accepted boundary input format.
    ///
    /// - `"123"` -> 123.00000000
    /// - `"0.5"` -> 0.50000000
    /// - `"-0.001"` -> -0.00100000
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        fn digit(byte: u8) -> NumericResult<i64> {
            if byte.is_ascii_digit() {
                Ok((byte - b'0') as i64)
            } else {
                Err(NumericError::InvalidInput)
            }
        }

        let text = input.trim();
        let (sign, body) = match text.strip_prefix('-') {
            Some(rest) => (-1i64, rest),
            None => (1, text),
        };

        let (whole, frac) = body.split_once('.').unwrap_or((body, ""));
        if whole.is_empty() && frac.is_empty() {
            return Err(NumericError::InvalidInput);
        }
        if frac.len() > SCALE_DIGITS as usize {
            return Err(NumericError::PrecisionLoss);
        }

        // Accumulate the integer digits, then scale up.
        let mut raw: i64 = 0;
        for byte in whole.bytes() {
            let d = digit(byte)?;
            raw = raw
                .checked_mul(10)
                .and_then(|v| v.checked_add(d))
                .ok_or(NumericError::Overflow)?;
        }
        raw = raw.checked_mul(Self::SCALE).ok_or(NumericError::Overflow)?;

        // Fractional digits weighted from 10^7 downward; fewer than 8
        // digits means the remaining weights simply go unused.
        let mut weight = Self::SCALE / 10;
        for byte in frac.bytes() {
            raw = raw
                .checked_add(digit(byte)? * weight)
                .ok_or(NumericError::Overflow)?;
            weight /= 10;
        }

        Ok(Self(sign * raw))
    }
}

// Decimal values cross serialization boundaries as strings, never as
// floats.
#[cfg(feature = "serde")]
impl serde::Serialize for FixedDecimal {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for FixedDecimal {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Domain aliases
// ============================================================================

/// Price in quote units per base unit
pub type Price = FixedDecimal;

/// Quantity in base units
pub type Quantity = FixedDecimal;

/// Generic monetary amount (balances, fees, notionals)
pub type Amount = FixedDecimal;

// ============================================================================
// Tests
// ============================================================================
