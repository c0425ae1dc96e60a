use std::fmt::{Display, Formatter};

use stockpipe_warehouse::RawPriceRow;
use time::{Date, Duration, OffsetDateTime, UtcOffset};

use crate::{Symbol, ValidationError};

/// Half-open trading-day window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DateWindow {
    start: Date,
    end: Date,
}

impl DateWindow {
    pub fn new(start: Date, end: Date) -> Result<Self, ValidationError> {
        if start >= end {
            return Err(ValidationError::InvalidWindow {
                start: iso_date(start),
                end: iso_date(end),
            });
        }
        Ok(Self { start, end })
    }

    /// The `history_days` calendar days ending at `now` (UTC), `now` excluded.
    pub fn trailing(now: OffsetDateTime, history_days: u32) -> Result<Self, ValidationError> {
        let end = now.to_offset(UtcOffset::UTC).date();
        let start = end
            .checked_sub(Duration::days(i64::from(history_days)))
            .ok_or_else(|| ValidationError::InvalidHistoryDays {
                value: history_days.to_string(),
            })?;
        Self::new(start, end)
    }

    pub const fn start(self) -> Date {
        self.start
    }

    pub const fn end(self) -> Date {
        self.end
    }

    pub fn contains(self, date: Date) -> bool {
        self.start <= date && date < self.end
    }
}

impl Display for DateWindow {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", iso_date(self.start), iso_date(self.end))
    }
}

/// One trading day of OHLCV data as returned by a provider.
///
/// Prices stay optional: providers report halted or partial days with gaps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceRecord {
    pub date: Date,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub adj_close: Option<f64>,
    pub volume: Option<i64>,
}

/// Daily history for a single symbol, ordered by date.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolFrame {
    symbol: Symbol,
    records: Vec<PriceRecord>,
}

impl SymbolFrame {
    pub fn new(symbol: Symbol, mut records: Vec<PriceRecord>) -> Self {
        records.sort_by_key(|record| record.date);
        Self { symbol, records }
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn records(&self) -> &[PriceRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Batch identity stamped on every record of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadBatch {
    pub load_timestamp: OffsetDateTime,
    pub load_date: Date,
}

impl LoadBatch {
    pub fn at(now: OffsetDateTime) -> Self {
        let load_timestamp = now.to_offset(UtcOffset::UTC);
        Self {
            load_timestamp,
            load_date: load_timestamp.date(),
        }
    }
}

/// A provider record tagged with its symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct CombinedRecord {
    pub symbol: Symbol,
    pub price: PriceRecord,
}

/// Row count contributed by one symbol.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SymbolRows {
    pub symbol: String,
    pub rows: usize,
}

/// Every successfully fetched frame of a run, concatenated in symbol order.
#[derive(Debug, Clone, PartialEq)]
pub struct CombinedDataset {
    batch: LoadBatch,
    records: Vec<CombinedRecord>,
}

impl CombinedDataset {
    /// Concatenate frames in the given order, keeping each frame's row order.
    pub fn merge(frames: Vec<SymbolFrame>, batch: LoadBatch) -> Self {
        let capacity = frames.iter().map(SymbolFrame::len).sum();
        let mut records = Vec::with_capacity(capacity);
        for frame in frames {
            let SymbolFrame { symbol, records: prices } = frame;
            records.extend(prices.into_iter().map(|price| CombinedRecord {
                symbol: symbol.clone(),
                price,
            }));
        }
        Self { batch, records }
    }

    pub const fn batch(&self) -> LoadBatch {
        self.batch
    }

    pub fn records(&self) -> &[CombinedRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Distinct symbols in first-appearance order.
    pub fn symbols(&self) -> Vec<String> {
        self.rows_per_symbol()
            .into_iter()
            .map(|entry| entry.symbol)
            .collect()
    }

    /// Row counts per symbol in first-appearance order.
    pub fn rows_per_symbol(&self) -> Vec<SymbolRows> {
        let mut counts: Vec<SymbolRows> = Vec::new();
        for record in &self.records {
            match counts
                .iter_mut()
                .find(|entry| entry.symbol == record.symbol.as_str())
            {
                Some(entry) => entry.rows += 1,
                None => counts.push(SymbolRows {
                    symbol: record.symbol.to_string(),
                    rows: 1,
                }),
            }
        }
        counts
    }

    /// Warehouse rows in raw table column order.
    pub fn to_raw_rows(&self) -> Vec<RawPriceRow> {
        let load_timestamp = iso_timestamp(self.batch.load_timestamp);
        let load_date = iso_date(self.batch.load_date);
        self.records
            .iter()
            .map(|record| RawPriceRow {
                date: iso_date(record.price.date),
                symbol: record.symbol.to_string(),
                open: record.price.open,
                high: record.price.high,
                low: record.price.low,
                close: record.price.close,
                adj_close: record.price.adj_close,
                volume: record.price.volume,
                load_timestamp: load_timestamp.clone(),
                load_date: load_date.clone(),
            })
            .collect()
    }
}

/// `YYYY-MM-DD`.
pub fn iso_date(date: Date) -> String {
    format!(
        "{:04}-{:02}-{:02}",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}

/// `YYYY-MM-DD HH:MM:SS.ffffff` in UTC.
pub fn iso_timestamp(value: OffsetDateTime) -> String {
    let value = value.to_offset(UtcOffset::UTC);
    format!(
        "{} {:02}:{:02}:{:02}.{:06}",
        iso_date(value.date()),
        value.hour(),
        value.minute(),
        value.second(),
        value.microsecond()
    )
}
