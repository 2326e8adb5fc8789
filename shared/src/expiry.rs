//! Expiring-batch selection
//!
//! One definition of "expiring within N days" shared by the stores and the
//! WASM client.

use chrono::{Duration, NaiveDate};

use crate::models::{fifo_order, StockBatch};
use crate::validation::validate_expiry_window;

/// Inclusive date range `[today, today + days]`
pub fn expiry_window(today: NaiveDate, days: i64) -> Result<(NaiveDate, NaiveDate), &'static str> {
    validate_expiry_window(days)?;
    let until = today
        .checked_add_signed(Duration::days(days))
        .ok_or("Expiry window is out of range")?;
    Ok((today, until))
}

/// Whether a batch still holds stock that expires within `[from, until]`
pub fn expires_within(batch: &StockBatch, from: NaiveDate, until: NaiveDate) -> bool {
    batch.is_available() && matches!(batch.expiry_date, Some(d) if d >= from && d <= until)
}

/// Available batches expiring within `[from, until]`, soonest expiry first,
/// then FIFO order
pub fn select_expiring<'a, I>(batches: I, from: NaiveDate, until: NaiveDate) -> Vec<StockBatch>
where
    I: IntoIterator<Item = &'a StockBatch>,
{
    let mut expiring: Vec<StockBatch> = batches
        .into_iter()
        .filter(|b| expires_within(b, from, until))
        .cloned()
        .collect();
    expiring.sort_by(|a, b| a.expiry_date.cmp(&b.expiry_date).then_with(|| fifo_order(a, b)));
    expiring
}
