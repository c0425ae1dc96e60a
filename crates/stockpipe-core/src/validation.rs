//! Advisory data-quality checks over a combined dataset.
//!
//! Findings are counted and logged; they never block the load.

use serde::Serialize;

use crate::CombinedDataset;

/// Row counts for each data-quality finding.
///
/// A row may count towards several findings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    /// Rows where any of open, high, low or close is negative.
    pub negative_price_rows: usize,
    /// Rows where high is below low.
    pub high_less_than_low_rows: usize,
    /// Rows missing date, symbol, open or close.
    pub missing_key_field_rows: usize,
}

impl ValidationReport {
    pub fn compute(dataset: &CombinedDataset) -> Self {
        let mut report = Self::default();
        for record in dataset.records() {
            let price = &record.price;

            let negative = [price.open, price.high, price.low, price.close]
                .into_iter()
                .flatten()
                .any(|value| value < 0.0);
            if negative {
                report.negative_price_rows += 1;
            }

            if let (Some(high), Some(low)) = (price.high, price.low) {
                if high < low {
                    report.high_less_than_low_rows += 1;
                }
            }

            // Date and symbol are required by construction.
            if price.open.is_none() || price.close.is_none() {
                report.missing_key_field_rows += 1;
            }
        }
        report
    }

    pub const fn is_clean(&self) -> bool {
        self.negative_price_rows == 0
            && self.high_less_than_low_rows == 0
            && self.missing_key_field_rows == 0
    }

    /// Emit one warning per non-zero finding.
    pub fn log_findings(&self) {
        if self.negative_price_rows > 0 {
            tracing::warn!(rows = self.negative_price_rows, "rows with negative prices");
        }
        if self.high_less_than_low_rows > 0 {
            tracing::warn!(rows = self.high_less_than_low_rows, "rows where high < low");
        }
        if self.missing_key_field_rows > 0 {
            tracing::warn!(rows = self.missing_key_field_rows, "rows missing key fields");
        }
    }
}
