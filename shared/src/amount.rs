//! Overflow-checked decimal arithmetic
//!
//! `Decimal`'s operators panic when a result leaves the 96-bit range. Ledger
//! sums and products go through these helpers instead so an out-of-range
//! figure surfaces as an error.

use rust_decimal::Decimal;
use thiserror::Error;

/// A ledger figure left the representable decimal range.
///
/// Carries the name of the figure being computed.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("{0} exceeds the supported range")]
pub struct AmountOverflow(pub &'static str);

pub fn checked_sum<I>(values: I, figure: &'static str) -> Result<Decimal, AmountOverflow>
where
    I: IntoIterator<Item = Decimal>,
{
    values
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, v| acc.checked_add(v).ok_or(AmountOverflow(figure)))
}

pub fn checked_product(a: Decimal, b: Decimal, figure: &'static str) -> Result<Decimal, AmountOverflow> {
    a.checked_mul(b).ok_or(AmountOverflow(figure))
}

/// Sum of fallible terms, stopping at the first overflow
pub fn try_sum<I>(values: I, figure: &'static str) -> Result<Decimal, AmountOverflow>
where
    I: IntoIterator<Item = Result<Decimal, AmountOverflow>>,
{
    values.into_iter().try_fold(Decimal::ZERO, |acc, v| {
        acc.checked_add(v?).ok_or(AmountOverflow(figure))
    })
}
