//! # Domain Models
//!
//! Canonical types flowing through the extraction stage.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Symbol`] | Validated ticker symbol |
//! | [`DateWindow`] | Half-open `[start, end)` trading-day window |
//! | [`PriceRecord`] | One day of OHLCV data |
//! | [`SymbolFrame`] | Ordered history for one symbol |
//! | [`CombinedDataset`] | All fetched frames of a run, stamped with one [`LoadBatch`] |

mod price;
mod symbol;

pub use price::{
    iso_date, iso_timestamp, CombinedDataset, CombinedRecord, DateWindow, LoadBatch, PriceRecord,
    SymbolFrame, SymbolRows,
};
pub use symbol::Symbol;
