use std::future::Future;
use std::pin::Pin;

use time::{Duration, Weekday};

use crate::data_source::{FetchError, HistoryRequest, MarketDataSource};
use crate::{PriceRecord, Symbol, SymbolFrame};

/// Deterministic offline source.
///
/// Produces one bar per weekday in the window. Values depend only on the
/// symbol and the date, so overlapping windows agree on shared days and reruns
/// produce identical data.
#[derive(Debug, Clone, Default)]
pub struct SyntheticSource {
    unavailable: Vec<Symbol>,
}

impl SyntheticSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make fetches for `symbol` fail as if the provider were down.
    pub fn with_unavailable(mut self, symbol: Symbol) -> Self {
        self.unavailable.push(symbol);
        self
    }

    fn generate(&self, req: &HistoryRequest) -> Result<SymbolFrame, FetchError> {
        if self.unavailable.contains(&req.symbol) {
            return Err(FetchError::unavailable(format!(
                "synthetic provider unavailable for '{}'",
                req.symbol
            )));
        }

        let seed = symbol_seed(&req.symbol);
        let base = 40.0 + (seed % 4_000) as f64 / 10.0;
        let mut records = Vec::new();
        let mut date = req.window.start();
        while date < req.window.end() {
            if !matches!(date.weekday(), Weekday::Saturday | Weekday::Sunday) {
                records.push(synthetic_bar(seed, base, date));
            }
            date = date
                .checked_add(Duration::days(1))
                .ok_or_else(|| FetchError::internal("synthetic window overflows the calendar"))?;
        }

        Ok(SymbolFrame::new(req.symbol.clone(), records))
    }
}

impl MarketDataSource for SyntheticSource {
    fn id(&self) -> &'static str {
        "synthetic"
    }

    fn fetch_history<'a>(
        &'a self,
        req: HistoryRequest,
    ) -> Pin<Box<dyn Future<Output = Result<SymbolFrame, FetchError>> + Send + 'a>> {
        let result = self.generate(&req);
        Box::pin(async move { result })
    }
}

fn synthetic_bar(seed: u64, base: f64, date: time::Date) -> PriceRecord {
    let day = u64::try_from(date.to_julian_day()).unwrap_or_default();
    let mut rng = fastrand::Rng::with_seed(seed ^ day.wrapping_mul(0x9E37_79B9_7F4A_7C15));

    let close = round2(base * (0.9 + 0.2 * rng.f64()));
    let open = round2(close * (1.0 + (rng.f64() - 0.5) * 0.03));
    let high = round2(open.max(close) * (1.0 + rng.f64() * 0.01));
    let low = round2(open.min(close) * (1.0 - rng.f64() * 0.01));
    let volume = 1_000_000 + i64::from(rng.u32(0..5_000_000));

    PriceRecord {
        date,
        open: Some(open),
        high: Some(high),
        low: Some(low),
        close: Some(close),
        adj_close: Some(close),
        volume: Some(volume),
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn symbol_seed(symbol: &Symbol) -> u64 {
    symbol.as_str().bytes().fold(0_u64, |acc, byte| {
        acc.wrapping_mul(33).wrapping_add(u64::from(byte))
    })
}
